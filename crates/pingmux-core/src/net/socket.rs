use crate::config::SocketMode;
use crate::error::IoResult;
use crate::net::Family;
use std::net::SocketAddr;

/// The operations the prober needs from a non-blocking ICMP socket.
///
/// All calls are non-blocking; `send_to` and `recv_from` surface
/// `WouldBlock` for the caller to retry after readiness.
#[cfg_attr(test, mockall::automock)]
pub(crate) trait Socket
where
    Self: Sized,
{
    /// Create an IPv4 socket for ICMP echo probes.
    fn new_icmp_ipv4(mode: SocketMode) -> IoResult<Self>;
    /// Create an IPv6 socket for ICMP echo probes.
    fn new_icmp_ipv6(mode: SocketMode) -> IoResult<Self>;
    fn bind(&self, address: SocketAddr) -> IoResult<()>;
    fn set_ttl(&self, ttl: u8) -> IoResult<()>;
    fn set_tos(&self, tos: u8) -> IoResult<()>;
    fn set_unicast_hops_v6(&self, hops: u8) -> IoResult<()>;
    fn set_tclass_v6(&self, tclass: u8) -> IoResult<()>;
    /// Ask the kernel to fill the `ICMPv6` checksum at the given offset.
    fn set_checksum_offset_v6(&self, offset: u32) -> IoResult<()>;
    /// Install a kernel-side filter admitting Echo Replies for the given
    /// identifier set. Best-effort; a no-op where unsupported.
    fn attach_echo_filter(&self, family: Family, identifiers: &[u16]) -> IoResult<()>;
    fn send_to(&self, buf: &[u8], addr: SocketAddr) -> IoResult<usize>;
    fn recv_from(&self, buf: &mut [u8]) -> IoResult<(usize, Option<SocketAddr>)>;
}
