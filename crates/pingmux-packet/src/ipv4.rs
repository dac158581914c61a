use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::IpProtocol;
use std::fmt::{Debug, Formatter};
use std::net::Ipv4Addr;

const VERSION_OFFSET: usize = 0;
const PROTOCOL_OFFSET: usize = 9;
const SOURCE_OFFSET: usize = 12;

/// Represents an `IPv4` packet.
///
/// Only the receive side is modelled: raw `IPv4` sockets deliver the full IP
/// header ahead of the ICMP message and the header length is governed by the
/// `IHL` field, not a fixed 20 bytes.
///
/// The internal representation is held in network byte order (big-endian) and
/// all accessor methods take and return data in host byte order, converting
/// as necessary for the given architecture.
pub struct Ipv4Packet<'a> {
    buf: Buffer<'a>,
}

impl<'a> Ipv4Packet<'a> {
    pub fn new_view(packet: &'a [u8]) -> Result<Self> {
        if packet.len() >= Self::minimum_packet_size() {
            Ok(Self {
                buf: Buffer::Immutable(packet),
            })
        } else {
            Err(Error::InsufficientPacketBuffer(
                String::from("Ipv4Packet"),
                Self::minimum_packet_size(),
                packet.len(),
            ))
        }
    }

    #[must_use]
    pub const fn minimum_packet_size() -> usize {
        20
    }

    #[must_use]
    pub fn get_version(&self) -> u8 {
        (self.buf.read(VERSION_OFFSET) & 0xf0) >> 4
    }

    /// The header length in 32-bit words.
    #[must_use]
    pub fn get_header_length(&self) -> u8 {
        self.buf.read(VERSION_OFFSET) & 0x0f
    }

    #[must_use]
    pub fn get_protocol(&self) -> IpProtocol {
        IpProtocol::from(self.buf.read(PROTOCOL_OFFSET))
    }

    #[must_use]
    pub fn get_source(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.buf.get_bytes::<4>(SOURCE_OFFSET))
    }

    #[must_use]
    pub fn packet(&self) -> &[u8] {
        self.buf.as_slice()
    }

    /// The bytes after the `IHL`-indicated header, if any.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        let header_size = usize::from(self.get_header_length()) * 4;
        let packet = self.buf.as_slice();
        if header_size < Self::minimum_packet_size() || header_size > packet.len() {
            return &[];
        }
        &packet[header_size..]
    }
}

impl Debug for Ipv4Packet<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ipv4Packet")
            .field("version", &self.get_version())
            .field("header_length", &self.get_header_length())
            .field("protocol", &self.get_protocol())
            .field("source", &self.get_source())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_view() {
        let buf = hex!(
            "45 00 00 1c 00 01 00 00 40 01 7c ce 7f 00 00 01 7f 00 00 01"
            "00 00 00 00 00 00 00 00"
        );
        let packet = Ipv4Packet::new_view(&buf).unwrap();
        assert_eq!(4, packet.get_version());
        assert_eq!(5, packet.get_header_length());
        assert_eq!(IpProtocol::Icmp, packet.get_protocol());
        assert_eq!(Ipv4Addr::new(127, 0, 0, 1), packet.get_source());
        assert_eq!(hex!("00 00 00 00 00 00 00 00"), packet.payload());
    }

    #[test]
    fn test_payload_honours_header_length() {
        // IHL of 6: a 4 byte option precedes the payload.
        let buf = hex!(
            "46 00 00 20 00 01 00 00 40 01 7c ce 7f 00 00 01 7f 00 00 01"
            "94 04 00 00"
            "de ad be ef"
        );
        let packet = Ipv4Packet::new_view(&buf).unwrap();
        assert_eq!(6, packet.get_header_length());
        assert_eq!(hex!("de ad be ef"), packet.payload());
    }

    #[test]
    fn test_payload_empty_for_bogus_header_length() {
        // An IHL below 5 would point inside the fixed header.
        let buf = hex!("42 00 00 14 00 01 00 00 40 01 7c ce 7f 00 00 01 7f 00 00 01");
        let packet = Ipv4Packet::new_view(&buf).unwrap();
        assert!(packet.payload().is_empty());
    }

    #[test]
    fn test_payload_empty_for_truncated_packet() {
        // An IHL of 7 overruns this 20 byte buffer.
        let buf = hex!("47 00 00 14 00 01 00 00 40 01 7c ce 7f 00 00 01 7f 00 00 01");
        let packet = Ipv4Packet::new_view(&buf).unwrap();
        assert!(packet.payload().is_empty());
    }

    #[test]
    fn test_new_view_insufficient_buffer() {
        const SIZE: usize = Ipv4Packet::minimum_packet_size();
        let buf = [0_u8; SIZE - 1];
        let err = Ipv4Packet::new_view(&buf).unwrap_err();
        assert_eq!(
            Error::InsufficientPacketBuffer(String::from("Ipv4Packet"), SIZE, SIZE - 1),
            err
        );
    }
}
