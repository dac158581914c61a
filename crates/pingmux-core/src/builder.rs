use crate::config::{SelectionPolicy, SessionConfig};
use crate::constants::{MAX_PAYLOAD_SIZE, MIN_PAYLOAD_SIZE, TIMESTAMP_SIZE};
use crate::error::{Error, Result};
use crate::ping::Ping;
use crate::registry::IdPool;
use crate::types::{PayloadSize, TimeToLive, TypeOfService};
use rand::RngCore;
use std::net::IpAddr;
use std::time::Duration;

/// A builder for creating instances of [`Ping`].
///
/// # Examples
///
/// ```no_run
/// # fn main() -> anyhow::Result<()> {
/// use pingmux_core::{Builder, SelectionPolicy};
/// use std::time::Duration;
///
/// let session = Builder::new()
///     .payload_size(64)
///     .timeout(Duration::from_millis(500))
///     .policy(SelectionPolicy::Dgram)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct Builder {
    config: SessionConfig,
}

impl Builder {
    /// Initializes a new `Builder` with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the ICMP payload size in bytes.
    ///
    /// Valid values are 16..=65507; the first 8 bytes carry the send
    /// timestamp.
    #[must_use]
    pub fn payload_size(mut self, size: u16) -> Self {
        self.config.payload_size = PayloadSize(size);
        self
    }

    /// Sets the TTL (IPv4) / hop limit (IPv6) of outgoing probes.
    #[must_use]
    pub fn ttl(mut self, ttl: u8) -> Self {
        self.config.ttl = Some(TimeToLive(ttl));
        self
    }

    /// Sets the DS field (`ToS` / traffic class) of outgoing probes.
    #[must_use]
    pub fn tos(mut self, tos: u8) -> Self {
        self.config.tos = Some(TypeOfService(tos));
        self
    }

    /// Sets the per-probe timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Sets the pause between probes of a series; zero means back-to-back.
    #[must_use]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    /// Sets the source address to bind.
    #[must_use]
    pub fn source_addr(mut self, source_addr: Option<IpAddr>) -> Self {
        self.config.source_addr = source_addr;
        self
    }

    /// Sets the socket selection policy.
    #[must_use]
    pub fn policy(mut self, policy: SelectionPolicy) -> Self {
        self.config.policy = policy;
        self
    }

    /// Validates the configuration and builds the session.
    ///
    /// Claims an ICMP identifier from the process-wide pool and fixes the
    /// session's random payload pattern; sockets are opened lazily on first
    /// use per address family.
    pub fn build(self) -> Result<Ping> {
        let config = self.config;
        if !(MIN_PAYLOAD_SIZE..=MAX_PAYLOAD_SIZE).contains(&config.payload_size.0) {
            return Err(Error::BadConfig(format!(
                "payload size must be in {MIN_PAYLOAD_SIZE}..={MAX_PAYLOAD_SIZE}, got {}",
                config.payload_size.0
            )));
        }
        if config.ttl == Some(TimeToLive(0)) {
            return Err(Error::BadConfig(String::from("ttl must be non-zero")));
        }
        if config.timeout.is_zero() {
            return Err(Error::BadConfig(String::from("timeout must be non-zero")));
        }
        let identifier = IdPool::global().claim()?;
        let mut pattern = vec![0_u8; usize::from(config.payload_size.0) - TIMESTAMP_SIZE];
        rand::rng().fill_bytes(&mut pattern);
        Ok(Ping::new(config, identifier, pattern.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(15; "below minimum")]
    #[test_case(0; "zero")]
    #[test_case(65_508; "above maximum")]
    fn test_invalid_payload_size(size: u16) {
        let err = Builder::new().payload_size(size).build().unwrap_err();
        assert!(matches!(err, Error::BadConfig(_)));
    }

    #[test_case(16; "minimum")]
    #[test_case(56; "default")]
    #[test_case(65_507; "maximum")]
    fn test_valid_payload_size(size: u16) {
        let session = Builder::new().payload_size(size).build().unwrap();
        assert_eq!(size, session.config().payload_size.0);
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let err = Builder::new().ttl(0).build().unwrap_err();
        assert!(matches!(err, Error::BadConfig(_)));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = Builder::new().timeout(Duration::ZERO).build().unwrap_err();
        assert!(matches!(err, Error::BadConfig(_)));
    }

    #[test]
    fn test_zero_interval_allowed() {
        let session = Builder::new().interval(Duration::ZERO).build().unwrap();
        assert!(session.config().interval.is_zero());
    }

    #[test]
    fn test_sessions_hold_distinct_identifiers() {
        let sessions: Vec<Ping> = (0..32).map(|_| Builder::new().build().unwrap()).collect();
        let mut identifiers: Vec<u16> = sessions.iter().map(|s| s.identifier().0).collect();
        identifiers.sort_unstable();
        identifiers.dedup();
        assert_eq!(32, identifiers.len());
    }

    #[test]
    fn test_settings_reach_config() {
        let session = Builder::new()
            .ttl(12)
            .tos(0x28)
            .policy(SelectionPolicy::Raw)
            .build()
            .unwrap();
        assert_eq!(Some(TimeToLive(12)), session.config().ttl);
        assert_eq!(Some(TypeOfService(0x28)), session.config().tos);
        assert_eq!(SelectionPolicy::Raw, session.config().policy);
    }
}
