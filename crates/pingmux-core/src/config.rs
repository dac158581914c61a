use crate::types::{PayloadSize, TimeToLive, TypeOfService};
use std::fmt::{Display, Formatter};
use std::net::IpAddr;
use std::time::Duration;

/// Default values for configuration.
pub mod defaults {
    use crate::config::SelectionPolicy;
    use std::time::Duration;

    /// The default value for `payload-size`.
    pub const DEFAULT_PAYLOAD_SIZE: u16 = 56;

    /// The default value for `timeout`.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

    /// The default value for `interval`.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

    /// The default value for `policy`.
    pub const DEFAULT_POLICY: SelectionPolicy = SelectionPolicy::Auto;
}

/// The socket selection policy.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SelectionPolicy {
    /// Raw sockets only; requires privilege.
    Raw,
    /// DGRAM ICMP sockets only; unprivileged where the platform offers them.
    Dgram,
    /// Try DGRAM first, fall back to raw.
    Auto,
}

impl SelectionPolicy {
    /// Socket modes to attempt, in order.
    pub(crate) const fn candidates(self) -> &'static [SocketMode] {
        match self {
            Self::Raw => &[SocketMode::Raw],
            Self::Dgram => &[SocketMode::Dgram],
            Self::Auto => &[SocketMode::Dgram, SocketMode::Raw],
        }
    }
}

impl Display for SelectionPolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Raw => write!(f, "raw"),
            Self::Dgram => write!(f, "dgram"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

/// The socket mode a channel ended up with after policy resolution.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SocketMode {
    /// `SOCK_RAW` with the ICMP protocol.
    Raw,
    /// `SOCK_DGRAM` with the ICMP protocol.
    Dgram,
}

impl Display for SocketMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Raw => write!(f, "raw"),
            Self::Dgram => write!(f, "dgram"),
        }
    }
}

/// A validated session configuration.
///
/// Sessions are immutable once constructed; build a second session to probe
/// with different settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// The ICMP payload size in bytes.
    pub payload_size: PayloadSize,
    /// Outgoing TTL (IPv4) / hop limit (IPv6); OS default when unset.
    pub ttl: Option<TimeToLive>,
    /// Outgoing DS field (IPv4 `ToS` / IPv6 traffic class); OS default when
    /// unset. The low 2 ECN bits are passed through untouched.
    pub tos: Option<TypeOfService>,
    /// Per-probe timeout.
    pub timeout: Duration,
    /// Pause between probes of a series; zero means back-to-back.
    pub interval: Duration,
    /// Source address to bind, per family.
    pub source_addr: Option<IpAddr>,
    /// The socket selection policy.
    pub policy: SelectionPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            payload_size: PayloadSize(defaults::DEFAULT_PAYLOAD_SIZE),
            ttl: None,
            tos: None,
            timeout: defaults::DEFAULT_TIMEOUT,
            interval: defaults::DEFAULT_INTERVAL,
            source_addr: None,
            policy: defaults::DEFAULT_POLICY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidates() {
        assert_eq!(&[SocketMode::Raw][..], SelectionPolicy::Raw.candidates());
        assert_eq!(&[SocketMode::Dgram][..], SelectionPolicy::Dgram.candidates());
        assert_eq!(
            &[SocketMode::Dgram, SocketMode::Raw][..],
            SelectionPolicy::Auto.candidates()
        );
    }

    #[test]
    fn test_display() {
        assert_eq!("auto", format!("{}", SelectionPolicy::Auto));
        assert_eq!("raw", format!("{}", SelectionPolicy::Raw));
        assert_eq!("dgram", format!("{}", SelectionPolicy::Dgram));
        assert_eq!("raw", format!("{}", SocketMode::Raw));
        assert_eq!("dgram", format!("{}", SocketMode::Dgram));
    }

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(56, config.payload_size.0);
        assert_eq!(None, config.ttl);
        assert_eq!(None, config.tos);
        assert_eq!(Duration::from_secs(1), config.timeout);
        assert_eq!(Duration::from_secs(1), config.interval);
        assert_eq!(None, config.source_addr);
        assert_eq!(SelectionPolicy::Auto, config.policy);
    }
}
