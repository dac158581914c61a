/// The smallest payload we allow.
///
/// Must accommodate the 8 byte send timestamp plus at least 8 bytes of the
/// session pattern used to validate replies.
pub const MIN_PAYLOAD_SIZE: u16 = 16;

/// The largest payload that fits a maximum size IPv4 datagram.
///
/// 65,535 minus the 20 byte IPv4 header minus the 8 byte ICMP header.
pub const MAX_PAYLOAD_SIZE: u16 = 65_507;

/// The size of the ICMP echo header.
pub(crate) const ECHO_HEADER_SIZE: usize = 8;

/// Leading payload bytes carrying the send timestamp in nanoseconds,
/// network byte order.
pub(crate) const TIMESTAMP_SIZE: usize = 8;

/// Receive buffer large enough for any IP datagram.
pub(crate) const RECV_BUFFER_SIZE: usize = 65_535;

/// Offset of the checksum field within the ICMP echo header, handed to the
/// kernel via `IPV6_CHECKSUM`.
pub(crate) const V6_CHECKSUM_OFFSET: u32 = 2;
