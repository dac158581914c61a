use pingmux_packet::error::Error as PacketError;
use std::fmt::{Display, Formatter};
use std::io;
use std::net::{IpAddr, SocketAddr};
use thiserror::Error;

/// A prober error result.
pub type Result<T> = std::result::Result<T, Error>;

/// A prober error.
///
/// Session construction failures (bad config, identifier exhaustion) and
/// socket-layer failures (permission, bind) are fatal for the session;
/// per-probe conditions such as timeouts or unreachable destinations are not
/// errors and degrade to an absent RTT instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid packet: {0}")]
    PacketError(#[from] PacketError),
    #[error("invalid config: {0}")]
    BadConfig(String),
    #[error("IO error: {0}")]
    IoError(#[from] IoError),
    #[error("source IP address {0} could not be used")]
    InvalidSourceAddr(IpAddr),
    #[error("all probe identifiers are in use")]
    IdentifiersExhausted,
}

impl Error {
    /// True for kernel verdicts that fail a single probe rather than the
    /// session.
    #[must_use]
    pub fn is_unreachable(&self) -> bool {
        match self {
            Self::IoError(err) => matches!(
                ErrorKind::from(err),
                ErrorKind::HostUnreachable | ErrorKind::NetUnreachable
            ),
            _ => false,
        }
    }
}

/// Custom IO error result.
pub type IoResult<T> = std::result::Result<T, IoError>;

/// Custom IO error.
#[derive(Error, Debug)]
pub enum IoError {
    #[error("Bind error for {1}: {0}")]
    Bind(io::Error, SocketAddr),
    #[error("Sendto error for {1}: {0}")]
    SendTo(io::Error, SocketAddr),
    #[error("Failed to {1}: {0}")]
    Other(io::Error, IoOperation),
}

impl IoError {
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Bind(e, _) | Self::SendTo(e, _) | Self::Other(e, _) => e.raw_os_error(),
        }
    }
    pub fn kind(&self) -> io::ErrorKind {
        match self {
            Self::Bind(e, _) | Self::SendTo(e, _) | Self::Other(e, _) => e.kind(),
        }
    }
}

/// Io operation.
#[derive(Debug)]
pub enum IoOperation {
    NewSocket,
    SetNonBlocking,
    SetTtl,
    SetTos,
    SetTclassV6,
    SetUnicastHopsV6,
    SetChecksumV6,
    AttachFilter,
    RecvFrom,
    RegisterReactor,
    Readiness,
}

impl Display for IoOperation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NewSocket => write!(f, "create new socket"),
            Self::SetNonBlocking => write!(f, "set non-blocking"),
            Self::SetTtl => write!(f, "set TTL"),
            Self::SetTos => write!(f, "set TOS"),
            Self::SetTclassV6 => write!(f, "set traffic class v6"),
            Self::SetUnicastHopsV6 => write!(f, "set unicast hops v6"),
            Self::SetChecksumV6 => write!(f, "set checksum offset v6"),
            Self::AttachFilter => write!(f, "attach filter"),
            Self::RecvFrom => write!(f, "recv from"),
            Self::RegisterReactor => write!(f, "register with reactor"),
            Self::Readiness => write!(f, "await readiness"),
        }
    }
}

/// A classification of IO errors the prober reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    HostUnreachable,
    NetUnreachable,
    NoBufferSpace,
    Std(io::ErrorKind),
}

impl From<&io::Error> for ErrorKind {
    fn from(value: &io::Error) -> Self {
        if value.raw_os_error() == io::Error::from(nix::Error::EHOSTUNREACH).raw_os_error() {
            Self::HostUnreachable
        } else if value.raw_os_error() == io::Error::from(nix::Error::ENETUNREACH).raw_os_error() {
            Self::NetUnreachable
        } else if value.raw_os_error() == io::Error::from(nix::Error::ENOBUFS).raw_os_error() {
            Self::NoBufferSpace
        } else {
            Self::Std(value.kind())
        }
    }
}

impl From<&IoError> for ErrorKind {
    fn from(value: &IoError) -> Self {
        match value {
            IoError::Bind(e, _) | IoError::SendTo(e, _) | IoError::Other(e, _) => Self::from(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, SocketAddr};

    #[test]
    fn test_error_kind_mapping() {
        let err = io::Error::from(nix::Error::EHOSTUNREACH);
        assert_eq!(ErrorKind::HostUnreachable, ErrorKind::from(&err));
        let err = io::Error::from(nix::Error::ENETUNREACH);
        assert_eq!(ErrorKind::NetUnreachable, ErrorKind::from(&err));
        let err = io::Error::from(nix::Error::ENOBUFS);
        assert_eq!(ErrorKind::NoBufferSpace, ErrorKind::from(&err));
        let err = io::Error::from(io::ErrorKind::WouldBlock);
        assert_eq!(ErrorKind::Std(io::ErrorKind::WouldBlock), ErrorKind::from(&err));
    }

    #[test]
    fn test_unreachable_is_not_fatal() {
        let addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0);
        let io_err = io::Error::from(nix::Error::EHOSTUNREACH);
        let err = Error::IoError(IoError::SendTo(io_err, addr));
        assert!(err.is_unreachable());
        let err = Error::BadConfig(String::from("nope"));
        assert!(!err.is_unreachable());
    }
}
