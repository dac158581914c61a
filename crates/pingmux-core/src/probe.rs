use crate::constants::TIMESTAMP_SIZE;

/// A decoded ICMP Echo Reply, borrowed from the receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EchoReply<'a> {
    /// The echoed identifier; kernel-assigned on DGRAM sockets.
    pub(crate) identifier: u16,
    /// The echoed sequence number.
    pub(crate) sequence: u16,
    /// The echoed payload: timestamp then session pattern.
    pub(crate) payload: &'a [u8],
}

impl EchoReply<'_> {
    /// The send timestamp carried in the leading payload bytes.
    pub(crate) fn timestamp_nanos(&self) -> Option<u64> {
        self.payload
            .get(..TIMESTAMP_SIZE)
            .map(|bytes| u64::from_be_bytes(bytes.try_into().expect("timestamp bytes")))
    }
}
