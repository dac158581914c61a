use crate::builder::Builder;
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::net::channel::ProbeChannel;
use crate::net::Family;
use crate::registry::{IdPool, WaiterHandle};
use crate::types::ProbeId;
use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::instrument;

/// An asynchronous ICMP echo prober session.
///
/// A session bundles an immutable configuration with one ICMP identifier
/// claimed from the process-wide pool. All probes of a session share a single
/// socket per address family, opened lazily on first use and demultiplexed by
/// one receive task; tens of thousands of probes can be in flight at once.
///
/// Dropping the session cancels its receive tasks and returns the identifier
/// to the pool.
pub struct Ping {
    config: SessionConfig,
    identifier: ProbeId,
    pattern: Arc<[u8]>,
    ipv4: OnceCell<ProbeChannel>,
    ipv6: OnceCell<ProbeChannel>,
}

impl std::fmt::Debug for Ping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ping")
            .field("config", &self.config)
            .field("identifier", &self.identifier)
            .finish_non_exhaustive()
    }
}

impl Ping {
    /// A [`Builder`] with default settings.
    #[must_use]
    pub fn builder() -> Builder {
        Builder::new()
    }

    pub(crate) fn new(config: SessionConfig, identifier: ProbeId, pattern: Arc<[u8]>) -> Self {
        Self {
            config,
            identifier,
            pattern,
            ipv4: OnceCell::new(),
            ipv6: OnceCell::new(),
        }
    }

    /// The session configuration.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[cfg(test)]
    pub(crate) const fn identifier(&self) -> ProbeId {
        self.identifier
    }

    /// The channel serving the destination's address family, opened on first
    /// use.
    async fn channel(&self, dest: IpAddr) -> Result<&ProbeChannel> {
        if let Some(src) = self.config.source_addr {
            if src.is_ipv4() != dest.is_ipv4() {
                return Err(Error::InvalidSourceAddr(src));
            }
        }
        let family = Family::of(dest);
        let cell = match family {
            Family::Ipv4 => &self.ipv4,
            Family::Ipv6 => &self.ipv6,
        };
        cell.get_or_try_init(|| async {
            ProbeChannel::open(family, &self.config, self.identifier, Arc::clone(&self.pattern))
        })
        .await
    }

    /// Send a single echo request and await the reply.
    ///
    /// Returns `Ok(Some(rtt))` on a matching reply and `Ok(None)` when the
    /// probe timed out or the destination was unreachable. Failures beyond
    /// that, such as a denied raw socket, are errors and fatal for the
    /// session.
    #[instrument(skip(self), level = "debug")]
    pub async fn ping(&self, dest: IpAddr) -> Result<Option<Duration>> {
        let channel = self.channel(dest).await?;
        match channel.probe(dest, self.config.timeout).await {
            Ok(waiter) => Ok(waiter.wait().await),
            Err(err) if err.is_unreachable() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Probe `dest` repeatedly, yielding one result per probe.
    ///
    /// The series produces `count` results, unbounded when `None`. Probes
    /// are paced by the session interval on an absolute schedule; results
    /// are yielded in send order and a reply arriving after its probe's
    /// deadline reads as a timeout, never as a late result. Consuming the
    /// session's series twice gives two independent series with distinct
    /// sequence numbers.
    pub async fn iter_rtt(&self, dest: IpAddr, count: Option<usize>) -> Result<RttIter<'_>> {
        let channel = self.channel(dest).await?;
        Ok(RttIter {
            channel,
            dest,
            timeout: self.config.timeout,
            interval: self.config.interval,
            count,
            sent: 0,
            yielded: 0,
            ticker: None,
            current: None,
            queue: VecDeque::new(),
        })
    }
}

impl Drop for Ping {
    fn drop(&mut self) {
        IdPool::global().release(self.identifier);
    }
}

/// A lazily-evaluated series of probes to one destination.
///
/// While a result is being awaited the next probes are still sent on
/// schedule, so a silent destination does not stretch the cadence. Dropping
/// the iterator cancels every in-flight probe of the series.
pub struct RttIter<'a> {
    channel: &'a ProbeChannel,
    dest: IpAddr,
    timeout: Duration,
    interval: Duration,
    count: Option<usize>,
    sent: usize,
    yielded: usize,
    ticker: Option<Interval>,
    current: Option<Pending>,
    queue: VecDeque<Pending>,
}

enum Pending {
    Waiter(WaiterHandle),
    Failed,
}

impl RttIter<'_> {
    /// The next probe result; `None` once the series is exhausted.
    ///
    /// Yields `Some(Some(rtt))` for a matching reply and `Some(None)` for a
    /// timeout or a failed send.
    pub async fn next(&mut self) -> Option<Option<Duration>> {
        if self.count.is_some_and(|count| self.yielded >= count) {
            return None;
        }
        if !self.interval.is_zero() && self.ticker.is_none() {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
            self.ticker = Some(ticker);
        }
        loop {
            if self.current.is_none() {
                self.current = self.queue.pop_front();
            }
            let may_send = self.count.is_none_or(|count| self.sent < count)
                && (!self.interval.is_zero() || (self.current.is_none() && self.queue.is_empty()));
            if self.current.is_none() && self.queue.is_empty() && !may_send {
                return None;
            }
            tokio::select! {
                biased;
                result = recv_pending(self.current.as_mut()) => {
                    self.current = None;
                    self.yielded += 1;
                    return Some(result);
                }
                () = next_slot(self.ticker.as_mut()), if may_send => {
                    let pending = match self.channel.probe(self.dest, self.timeout).await {
                        Ok(handle) => Pending::Waiter(handle),
                        Err(err) => {
                            tracing::debug!(%err, "probe failed");
                            Pending::Failed
                        }
                    };
                    self.sent += 1;
                    self.queue.push_back(pending);
                }
            }
        }
    }
}

async fn recv_pending(pending: Option<&mut Pending>) -> Option<Duration> {
    match pending {
        Some(Pending::Waiter(handle)) => handle.recv().await,
        Some(Pending::Failed) => None,
        None => std::future::pending().await,
    }
}

async fn next_slot(ticker: Option<&mut Interval>) {
    if let Some(ticker) = ticker {
        ticker.tick().await;
    }
}
