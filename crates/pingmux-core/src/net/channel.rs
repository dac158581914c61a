use crate::clock::Clock;
use crate::config::{SelectionPolicy, SessionConfig, SocketMode};
use crate::constants::{RECV_BUFFER_SIZE, TIMESTAMP_SIZE, V6_CHECKSUM_OFFSET};
use crate::error::{Error, ErrorKind, IoError, IoOperation, Result};
use crate::net::socket::Socket;
use crate::net::{ipv4, ipv6, Family, SocketImpl};
use crate::registry::{IdPool, Registry, WaiterHandle};
use crate::types::ProbeId;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::unix::{AsyncFd, AsyncFdReadyGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::instrument;

/// How long to back off when the kernel reports exhausted buffers.
const SEND_RETRY_PAUSE: Duration = Duration::from_millis(1);

/// A per-family probe socket with its demultiplexer task.
///
/// The receive side of the socket is owned exclusively by the demultiplexer
/// task; the send side is shared by every probe issued through this channel.
/// Both live until the owning session is dropped.
pub(crate) struct ProbeChannel {
    shared: Arc<ChannelShared>,
    demux: JoinHandle<()>,
}

struct ChannelShared {
    io: AsyncFd<SocketImpl>,
    family: Family,
    mode: SocketMode,
    identifier: ProbeId,
    pattern: Arc<[u8]>,
    registry: Arc<Registry>,
    clock: Clock,
}

impl ProbeChannel {
    /// Open and configure the socket for `family` and spawn its
    /// demultiplexer task.
    #[instrument(skip(config, pattern), level = "debug")]
    pub(crate) fn open(
        family: Family,
        config: &SessionConfig,
        identifier: ProbeId,
        pattern: Arc<[u8]>,
    ) -> Result<Self> {
        let (socket, mode) = open_socket::<SocketImpl>(family, config.policy)?;
        configure(&socket, family, mode, config)?;
        if mode == SocketMode::Raw {
            // Best-effort: a stale or missing filter costs CPU, never
            // correctness.
            if let Err(err) = socket.attach_echo_filter(family, &IdPool::global().snapshot()) {
                tracing::warn!(%err, "could not attach reply filter");
            }
        }
        let io = AsyncFd::new(socket)
            .map_err(|err| Error::IoError(IoError::Other(err, IoOperation::RegisterReactor)))?;
        let registry = Arc::new(Registry::new(identifier, mode));
        let shared = Arc::new(ChannelShared {
            io,
            family,
            mode,
            identifier,
            pattern,
            registry,
            clock: Clock::new(),
        });
        let demux = tokio::spawn(demux_loop(
            Arc::clone(&shared),
            IdPool::global().subscribe(),
        ));
        tracing::debug!(?family, %mode, "probe channel open");
        Ok(Self { shared, demux })
    }

    /// Issue one probe: register a waiter, build the request, send it.
    ///
    /// The waiter is registered before the send so a fast reply can never
    /// miss it; a failed send drops the handle and thereby the waiter.
    #[instrument(skip(self), level = "debug")]
    pub(crate) async fn probe(&self, dest: IpAddr, timeout: Duration) -> Result<WaiterHandle> {
        let shared = &self.shared;
        let handle = shared.registry.register(dest, timeout).await;
        let timestamp = shared.clock.now_nanos();
        let packet = match shared.family {
            Family::Ipv4 => ipv4::make_echo_request(
                shared.identifier,
                handle.sequence(),
                timestamp,
                &shared.pattern,
            )?,
            Family::Ipv6 => ipv6::make_echo_request(
                shared.identifier,
                handle.sequence(),
                timestamp,
                &shared.pattern,
            )?,
        };
        self.send_to(&packet, SocketAddr::new(dest, 0), handle.deadline())
            .await?;
        Ok(handle)
    }

    /// Send with writability retry until `deadline`.
    ///
    /// Backpressure that persists past the deadline is left to surface as a
    /// timeout on the waiter.
    async fn send_to(
        &self,
        packet: &[u8],
        dest: SocketAddr,
        deadline: tokio::time::Instant,
    ) -> Result<()> {
        loop {
            let mut guard = match tokio::time::timeout_at(deadline, self.shared.io.writable()).await
            {
                Ok(Ok(guard)) => guard,
                Ok(Err(err)) => {
                    return Err(Error::IoError(IoError::Other(err, IoOperation::Readiness)))
                }
                Err(_) => {
                    tracing::debug!(?dest, "send backpressure past deadline");
                    return Ok(());
                }
            };
            match self.shared.io.get_ref().send_to(packet, dest) {
                Ok(_) => return Ok(()),
                Err(err) => match ErrorKind::from(&err) {
                    ErrorKind::Std(io::ErrorKind::WouldBlock) => guard.clear_ready(),
                    ErrorKind::NoBufferSpace => tokio::time::sleep(SEND_RETRY_PAUSE).await,
                    _ => return Err(Error::IoError(err)),
                },
            }
        }
    }
}

impl Drop for ProbeChannel {
    fn drop(&mut self) {
        self.demux.abort();
    }
}

impl ChannelShared {
    /// Decode one datagram and hand it to the registry.
    fn handle_datagram(&self, datagram: &[u8]) {
        let reply = match self.family {
            Family::Ipv4 => ipv4::parse_echo_reply(datagram, self.mode),
            Family::Ipv6 => ipv6::parse_echo_reply(datagram),
        };
        let Some(reply) = reply else { return };
        let key = self.registry.reply_key(reply.identifier, reply.sequence);
        let payload_ok = self.payload_matches(reply.payload);
        let rtt = reply
            .timestamp_nanos()
            .and_then(|sent| self.clock.elapsed_since(sent));
        let outcome = self.registry.dispatch(key, payload_ok, rtt, Instant::now());
        tracing::trace!(?key, ?outcome);
    }

    /// Bit-exact payload check: timestamp prefix aside, the reply must echo
    /// the session pattern. Defeats cross-process replies on DGRAM sockets
    /// where the kernel assigns the identifier.
    fn payload_matches(&self, payload: &[u8]) -> bool {
        payload.len() == TIMESTAMP_SIZE + self.pattern.len()
            && payload[TIMESTAMP_SIZE..] == *self.pattern
    }
}

/// The per-family receive loop: drain datagrams into the registry and keep
/// the kernel reply filter in step with the identifier pool.
///
/// Lives until the channel is dropped; per-packet errors never kill it.
async fn demux_loop(shared: Arc<ChannelShared>, mut identifiers: watch::Receiver<Vec<u16>>) {
    let mut buf = vec![0_u8; RECV_BUFFER_SIZE];
    let mut watch_open = shared.mode == SocketMode::Raw;
    loop {
        tokio::select! {
            readable = shared.io.readable() => {
                match readable {
                    Ok(mut guard) => drain(&shared, &mut guard, &mut buf),
                    Err(err) => {
                        tracing::debug!(%err, "probe socket readiness lost");
                        return;
                    }
                }
            }
            changed = identifiers.changed(), if watch_open => {
                match changed {
                    Ok(()) => {
                        let ids = identifiers.borrow_and_update().clone();
                        if let Err(err) = shared.io.get_ref().attach_echo_filter(shared.family, &ids) {
                            tracing::debug!(%err, "reply filter refresh failed");
                        }
                    }
                    Err(_) => watch_open = false,
                }
            }
        }
    }
}

fn drain(shared: &ChannelShared, guard: &mut AsyncFdReadyGuard<'_, SocketImpl>, buf: &mut [u8]) {
    loop {
        match shared.io.get_ref().recv_from(buf) {
            Ok((len, _addr)) => shared.handle_datagram(&buf[..len]),
            Err(err) if ErrorKind::from(&err) == ErrorKind::Std(io::ErrorKind::WouldBlock) => {
                guard.clear_ready();
                return;
            }
            Err(err) => {
                tracing::trace!(%err, "recv error ignored");
            }
        }
    }
}

/// Resolve the selection policy into an open socket.
fn open_socket<S: Socket>(family: Family, policy: SelectionPolicy) -> Result<(S, SocketMode)> {
    let mut last_err = None;
    for &mode in policy.candidates() {
        let created = match family {
            Family::Ipv4 => S::new_icmp_ipv4(mode),
            Family::Ipv6 => S::new_icmp_ipv6(mode),
        };
        match created {
            Ok(socket) => return Ok((socket, mode)),
            Err(err) => {
                tracing::debug!(%err, %mode, "socket mode unavailable");
                last_err = Some(err);
            }
        }
    }
    Err(Error::IoError(last_err.expect("policy has candidates")))
}

/// Apply the session settings; any failure discards the socket.
fn configure<S: Socket>(
    socket: &S,
    family: Family,
    mode: SocketMode,
    config: &SessionConfig,
) -> Result<()> {
    match family {
        Family::Ipv4 => {
            if let Some(ttl) = config.ttl {
                socket.set_ttl(ttl.0)?;
            }
            if let Some(tos) = config.tos {
                socket.set_tos(tos.0)?;
            }
        }
        Family::Ipv6 => {
            if let Some(ttl) = config.ttl {
                socket.set_unicast_hops_v6(ttl.0)?;
            }
            if let Some(tos) = config.tos {
                socket.set_tclass_v6(tos.0)?;
            }
            if mode == SocketMode::Raw {
                socket.set_checksum_offset_v6(V6_CHECKSUM_OFFSET)?;
            }
        }
    }
    if let Some(src) = config.source_addr {
        let family_matches = matches!(
            (family, src),
            (Family::Ipv4, IpAddr::V4(_)) | (Family::Ipv6, IpAddr::V6(_))
        );
        if !family_matches {
            return Err(Error::InvalidSourceAddr(src));
        }
        socket.bind(SocketAddr::new(src, 0))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::socket::MockSocket;
    use crate::types::{TimeToLive, TypeOfService};
    use mockall::predicate::eq;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn test_configure_ipv6_applies_hops_and_tclass() {
        let mut mocket = MockSocket::new();
        mocket
            .expect_set_unicast_hops_v6()
            .with(eq(42))
            .times(1)
            .returning(|_| Ok(()));
        mocket
            .expect_set_tclass_v6()
            .with(eq(0x28))
            .times(1)
            .returning(|_| Ok(()));
        mocket
            .expect_set_checksum_offset_v6()
            .with(eq(V6_CHECKSUM_OFFSET))
            .times(1)
            .returning(|_| Ok(()));
        let config = SessionConfig {
            ttl: Some(TimeToLive(42)),
            tos: Some(TypeOfService(0x28)),
            ..SessionConfig::default()
        };
        configure(&mocket, Family::Ipv6, SocketMode::Raw, &config).unwrap();
    }

    #[test]
    fn test_configure_ipv6_dgram_skips_checksum_offset() {
        let mut mocket = MockSocket::new();
        mocket
            .expect_set_unicast_hops_v6()
            .with(eq(7))
            .times(1)
            .returning(|_| Ok(()));
        let config = SessionConfig {
            ttl: Some(TimeToLive(7)),
            ..SessionConfig::default()
        };
        configure(&mocket, Family::Ipv6, SocketMode::Dgram, &config).unwrap();
    }

    #[test]
    fn test_configure_ipv4_applies_ttl_and_tos() {
        let mut mocket = MockSocket::new();
        mocket
            .expect_set_ttl()
            .with(eq(64))
            .times(1)
            .returning(|_| Ok(()));
        mocket
            .expect_set_tos()
            .with(eq(0xb8))
            .times(1)
            .returning(|_| Ok(()));
        let config = SessionConfig {
            ttl: Some(TimeToLive(64)),
            tos: Some(TypeOfService(0xb8)),
            ..SessionConfig::default()
        };
        configure(&mocket, Family::Ipv4, SocketMode::Raw, &config).unwrap();
    }

    #[test]
    fn test_configure_defaults_touch_nothing() {
        let mocket = MockSocket::new();
        configure(&mocket, Family::Ipv4, SocketMode::Dgram, &SessionConfig::default()).unwrap();
    }

    #[test]
    fn test_configure_binds_source_address() {
        let src = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 10));
        let mut mocket = MockSocket::new();
        mocket
            .expect_bind()
            .with(eq(SocketAddr::new(src, 0)))
            .times(1)
            .returning(|_| Ok(()));
        let config = SessionConfig {
            source_addr: Some(src),
            ..SessionConfig::default()
        };
        configure(&mocket, Family::Ipv4, SocketMode::Raw, &config).unwrap();
    }

    #[test]
    fn test_configure_rejects_source_family_mismatch() {
        let mocket = MockSocket::new();
        let config = SessionConfig {
            source_addr: Some(IpAddr::V6(Ipv6Addr::LOCALHOST)),
            ..SessionConfig::default()
        };
        let err = configure(&mocket, Family::Ipv4, SocketMode::Dgram, &config).unwrap_err();
        assert!(matches!(err, Error::InvalidSourceAddr(_)));
    }

    #[test]
    fn test_open_socket_auto_falls_back_to_raw() {
        let ctx = MockSocket::new_icmp_ipv4_context();
        ctx.expect()
            .with(eq(SocketMode::Dgram))
            .times(1)
            .returning(|_| {
                Err(IoError::Other(
                    io::Error::from(io::ErrorKind::PermissionDenied),
                    IoOperation::NewSocket,
                ))
            });
        ctx.expect()
            .with(eq(SocketMode::Raw))
            .times(1)
            .returning(|_| Ok(MockSocket::new()));
        let (_socket, mode) =
            open_socket::<MockSocket>(Family::Ipv4, SelectionPolicy::Auto).unwrap();
        assert_eq!(SocketMode::Raw, mode);
    }
}
