use crate::constants::{ECHO_HEADER_SIZE, TIMESTAMP_SIZE};
use crate::config::SocketMode;
use crate::error::Result;
use crate::probe::EchoReply;
use crate::types::{ProbeId, Sequence};
use pingmux_packet::checksum::{icmp_ipv4_checksum, icmp_ipv4_checksum_valid};
use pingmux_packet::icmpv4::echo_reply::EchoReplyPacket;
use pingmux_packet::icmpv4::echo_request::EchoRequestPacket;
use pingmux_packet::icmpv4::{IcmpCode, IcmpType};
use pingmux_packet::ipv4::Ipv4Packet;
use pingmux_packet::IpProtocol;

/// Build an `ICMPv4` echo request carrying the timestamp and session pattern.
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
    icmp.set_checksum(icmp_ipv4_checksum(icmp.packet()));
    Ok(buf)
}

/// Decode an `ICMPv4` echo reply from a received datagram.
///
/// Raw sockets deliver the IPv4 header ahead of the ICMP message and the
/// header length follows the `IHL` field; DGRAM sockets deliver the ICMP
/// message directly. Anything that is not a well formed echo reply is
/// ignored, including packets whose checksum does not verify.
pub(crate) fn parse_echo_reply(datagram: &[u8], mode: SocketMode) -> Option<EchoReply<'_>> {
    let icmp_bytes = match mode {
        SocketMode::Raw => {
            let ip = Ipv4Packet::new_view(datagram).ok()?;
            if ip.get_version() != 4 || ip.get_protocol() != IpProtocol::Icmp {
                return None;
            }
            let header_size = usize::from(ip.get_header_length()) * 4;
            if header_size < Ipv4Packet::minimum_packet_size() || header_size > datagram.len() {
                return None;
            }
            &datagram[header_size..]
        }
        SocketMode::Dgram => datagram,
    };
    let icmp = EchoReplyPacket::new_view(icmp_bytes).ok()?;
    if icmp.get_icmp_type() != IcmpType::EchoReply || icmp.get_icmp_code() != IcmpCode(0) {
        return None;
    }
    if !icmp_ipv4_checksum_valid(icmp_bytes) {
        return None;
    }
    Some(EchoReply {
        identifier: icmp.get_identifier(),
        sequence: icmp.get_sequence(),
        payload: &icmp_bytes[ECHO_HEADER_SIZE..],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    const PATTERN: &[u8] = &hex!("aa bb cc dd ee ff 00 11");

    fn reply_from_request(request: &[u8]) -> Vec<u8> {
        let mut reply = request.to_vec();
        reply[0] = 0;
        reply[2..4].copy_from_slice(&[0, 0]);
        let checksum = icmp_ipv4_checksum(&reply);
        reply[2..4].copy_from_slice(&checksum.to_be_bytes());
        reply
    }

    fn with_ip_header(icmp: &[u8]) -> Vec<u8> {
        let mut datagram =
            hex!("45 00 00 00 00 01 00 00 40 01 00 00 7f 00 00 01 7f 00 00 01").to_vec();
        datagram.extend_from_slice(icmp);
        datagram
    }

    #[test]
    fn test_make_echo_request() {
        let packet =
            make_echo_request(ProbeId(0x0102), Sequence(1), 0x0102_0304, &[0_u8; 8]).unwrap();
        assert_eq!(
            packet,
            hex!("08 00 f2 f6 01 02 00 01 00 00 00 00 01 02 03 04 00 00 00 00 00 00 00 00")
        );
    }

    #[test]
    fn test_request_checksum_verifies() {
        let packet = make_echo_request(ProbeId(99), Sequence(3), 12345, PATTERN).unwrap();
        assert!(icmp_ipv4_checksum_valid(&packet));
    }

    #[test]
    fn test_round_trip_raw() {
        let request = make_echo_request(ProbeId(0x0102), Sequence(7), 99, PATTERN).unwrap();
        let datagram = with_ip_header(&reply_from_request(&request));
        let reply = parse_echo_reply(&datagram, SocketMode::Raw).unwrap();
        assert_eq!(0x0102, reply.identifier);
        assert_eq!(7, reply.sequence);
        assert_eq!(Some(99), reply.timestamp_nanos());
        assert_eq!(PATTERN, &reply.payload[TIMESTAMP_SIZE..]);
    }

    #[test]
    fn test_round_trip_dgram() {
        let request = make_echo_request(ProbeId(0x0102), Sequence(8), 100, PATTERN).unwrap();
        let datagram = reply_from_request(&request);
        let reply = parse_echo_reply(&datagram, SocketMode::Dgram).unwrap();
        assert_eq!(0x0102, reply.identifier);
        assert_eq!(8, reply.sequence);
        assert_eq!(Some(100), reply.timestamp_nanos());
    }

    #[test]
    fn test_parse_honours_ip_options() {
        let request = make_echo_request(ProbeId(1), Sequence(1), 1, PATTERN).unwrap();
        let mut datagram =
            hex!("46 00 00 00 00 01 00 00 40 01 00 00 7f 00 00 01 7f 00 00 01 94 04 00 00")
                .to_vec();
        datagram.extend_from_slice(&reply_from_request(&request));
        let reply = parse_echo_reply(&datagram, SocketMode::Raw).unwrap();
        assert_eq!(1, reply.sequence);
    }

    #[test]
    fn test_parse_ignores_echo_request() {
        let request = make_echo_request(ProbeId(1), Sequence(1), 1, PATTERN).unwrap();
        assert!(parse_echo_reply(&with_ip_header(&request), SocketMode::Raw).is_none());
        assert!(parse_echo_reply(&request, SocketMode::Dgram).is_none());
    }

    #[test]
    fn test_parse_ignores_corrupt_checksum() {
        let request = make_echo_request(ProbeId(1), Sequence(1), 1, PATTERN).unwrap();
        let mut reply = reply_from_request(&request);
        let last = reply.len() - 1;
        reply[last] ^= 0xff;
        assert!(parse_echo_reply(&with_ip_header(&reply), SocketMode::Raw).is_none());
    }

    #[test]
    fn test_parse_ignores_short_datagram() {
        assert!(parse_echo_reply(&[0_u8; 7], SocketMode::Dgram).is_none());
        assert!(parse_echo_reply(&[0_u8; 19], SocketMode::Raw).is_none());
    }

    #[test]
    fn test_parse_ignores_non_icmp_protocol() {
        let request = make_echo_request(ProbeId(1), Sequence(1), 1, PATTERN).unwrap();
        let mut datagram = with_ip_header(&reply_from_request(&request));
        datagram[9] = 17;
        assert!(parse_echo_reply(&datagram, SocketMode::Raw).is_none());
    }
}
