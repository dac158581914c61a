//! Classic BPF programs admitting only the Echo Replies this process waits
//! on, evaluated kernel-side before the datagram is queued on the socket.

use crate::net::Family;
use socket2::SockFilter;

/// Identifier count beyond which the program degrades to a type-only match.
///
/// Conditional jump offsets are 8 bits wide, and a long identifier chain is
/// evaluated per packet; past this point the per-identifier match stops
/// paying for itself.
pub(crate) const MAX_FILTER_IDS: usize = 64;

const ICMP_V4_REPLY: u32 = 0;
const ICMP_V6_REPLY: u32 = 129;

// Offsets into the datagram as a raw socket delivers it. IPv4 includes the IP
// header; a fixed 20 byte header is assumed here, packets carrying IP options
// miss the fast path and are judged in user space. IPv6 delivers the ICMP
// message directly.
const V4_TYPE_OFFSET: u32 = 20;
const V4_ID_OFFSET: u32 = 24;
const V6_TYPE_OFFSET: u32 = 0;
const V6_ID_OFFSET: u32 = 4;

#[repr(u16)]
enum Op {
    Ret = 0x06,
    Jeq = 0x15,
    Ldh = 0x28,
    Ldb = 0x30,
}

#[inline(always)]
fn ldb(k: u32) -> SockFilter {
    SockFilter::new(Op::Ldb as u16, 0, 0, k)
}

#[inline(always)]
fn ldh(k: u32) -> SockFilter {
    SockFilter::new(Op::Ldh as u16, 0, 0, k)
}

#[inline(always)]
fn jeq(jt: u8, jf: u8, k: u32) -> SockFilter {
    SockFilter::new(Op::Jeq as u16, jt, jf, k)
}

#[inline(always)]
fn ret(k: u32) -> SockFilter {
    SockFilter::new(Op::Ret as u16, 0, 0, k)
}

/// Build a program accepting Echo Replies whose identifier is in
/// `identifiers`.
///
/// An empty or oversized identifier set admits every Echo Reply: the filter
/// is an optimisation, user space stays the arbiter.
pub(crate) fn echo_reply_program(family: Family, identifiers: &[u16]) -> Vec<SockFilter> {
    let (type_offset, id_offset, reply_type) = match family {
        Family::Ipv4 => (V4_TYPE_OFFSET, V4_ID_OFFSET, ICMP_V4_REPLY),
        Family::Ipv6 => (V6_TYPE_OFFSET, V6_ID_OFFSET, ICMP_V6_REPLY),
    };
    let count = identifiers.len();
    if count == 0 || count > MAX_FILTER_IDS {
        return vec![
            ldb(type_offset),
            jeq(0, 1, reply_type),
            ret(u32::MAX),
            ret(0),
        ];
    }
    // Layout:
    //   0        ldb type_offset
    //   1        jeq reply_type       else jump to drop
    //   2        ldh id_offset
    //   3..3+n   jeq id[k]            hit jumps to accept
    //   3+n      ret 0                drop
    //   4+n      ret 0xffffffff       accept
    let mut prog = Vec::with_capacity(count + 5);
    prog.push(ldb(type_offset));
    prog.push(jeq(0, (count + 1) as u8, reply_type));
    prog.push(ldh(id_offset));
    for (i, id) in identifiers.iter().enumerate() {
        prog.push(jeq((count - i) as u8, 0, u32::from(*id)));
    }
    prog.push(ret(0));
    prog.push(ret(u32::MAX));
    prog
}
