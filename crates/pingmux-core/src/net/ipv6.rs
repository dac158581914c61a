use crate::constants::{ECHO_HEADER_SIZE, TIMESTAMP_SIZE};
use crate::error::Result;
use crate::probe::EchoReply;
use crate::types::{ProbeId, Sequence};
use pingmux_packet::icmpv6::echo_reply::EchoReplyPacket;
use pingmux_packet::icmpv6::echo_request::EchoRequestPacket;
use pingmux_packet::icmpv6::{IcmpCode, IcmpType};

/// Build an `ICMPv6` echo request carrying the timestamp and session pattern.
///
/// The checksum is left zero; the kernel computes the pseudo-header checksum
/// on the way out.
pub(crate) fn make_echo_request(
    identifier: ProbeId,
    sequence: Sequence,
    timestamp: u64,
    pattern: &[u8],
) -> Result<Vec<u8>> {
    let mut buf = vec![0_u8; ECHO_HEADER_SIZE + TIMESTAMP_SIZE + pattern.len()];
    buf[ECHO_HEADER_SIZE..ECHO_HEADER_SIZE + TIMESTAMP_SIZE]
        .copy_from_slice(&timestamp.to_be_bytes());
    buf[ECHO_HEADER_SIZE + TIMESTAMP_SIZE..].copy_from_slice(pattern);
    let mut icmp = EchoRequestPacket::new(&mut buf)?;
    icmp.set_icmp_type(IcmpType::EchoRequest);
    icmp.set_icmp_code(IcmpCode(0));
    icmp.set_identifier(identifier.0);
    icmp.set_sequence(sequence.0);
    Ok(buf)
}

/// Decode an `ICMPv6` echo reply from a received datagram.
///
/// The kernel strips the IPv6 header and verifies the checksum for both raw
/// and DGRAM sockets, so the ICMP message arrives directly on both. Anything
/// that is not a well formed echo reply is ignored.
pub(crate) fn parse_echo_reply(datagram: &[u8]) -> Option<EchoReply<'_>> {
    let icmp = EchoReplyPacket::new_view(datagram).ok()?;
    if icmp.get_icmp_type() != IcmpType::EchoReply || icmp.get_icmp_code() != IcmpCode(0) {
        return None;
    }
    Some(EchoReply {
        identifier: icmp.get_identifier(),
        sequence: icmp.get_sequence(),
        payload: &datagram[ECHO_HEADER_SIZE..],
    })
}
