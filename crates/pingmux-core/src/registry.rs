use crate::config::SocketMode;
use crate::error::{Error, Result};
use crate::types::{ProbeId, Sequence};
use parking_lot::Mutex;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::pin::pin;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, watch, Notify};

/// How a waiter is keyed for reply dispatch.
///
/// DGRAM ICMP sockets have their identifier rewritten by the kernel, so
/// waiters on those sockets are keyed by sequence alone and disambiguated by
/// payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum WaiterKey {
    Identified(u16, u16),
    SequenceOnly(u16),
}

/// The process-wide ICMP identifier pool.
///
/// Sessions claim one identifier each; concurrent probes within a session
/// share it and differ by sequence number. An identifier returns to the pool
/// when the session is dropped, which cannot happen while any of its waiters
/// exist.
pub(crate) struct IdPool {
    inner: Mutex<IdPoolInner>,
    changed: watch::Sender<Vec<u16>>,
}

struct IdPoolInner {
    in_use: HashSet<u16>,
    next: u16,
}

impl IdPool {
    fn new() -> Self {
        let (changed, _) = watch::channel(Vec::new());
        Self {
            inner: Mutex::new(IdPoolInner {
                in_use: HashSet::new(),
                next: rand::rng().random(),
            }),
            changed,
        }
    }

    /// The pool shared by every session in this process.
    pub(crate) fn global() -> &'static Self {
        static POOL: OnceLock<IdPool> = OnceLock::new();
        POOL.get_or_init(Self::new)
    }

    /// Claim a free identifier.
    pub(crate) fn claim(&self) -> Result<ProbeId> {
        let (id, snapshot) = {
            let mut inner = self.inner.lock();
            if inner.in_use.len() == usize::from(u16::MAX) + 1 {
                return Err(Error::IdentifiersExhausted);
            }
            while inner.in_use.contains(&inner.next) {
                inner.next = inner.next.wrapping_add(1);
            }
            let id = inner.next;
            inner.next = inner.next.wrapping_add(1);
            inner.in_use.insert(id);
            (id, sorted(&inner.in_use))
        };
        self.changed.send_replace(snapshot);
        Ok(ProbeId(id))
    }

    /// Return an identifier to the pool.
    pub(crate) fn release(&self, id: ProbeId) {
        let snapshot = {
            let mut inner = self.inner.lock();
            inner.in_use.remove(&id.0);
            sorted(&inner.in_use)
        };
        self.changed.send_replace(snapshot);
    }

    /// Observe identifier-set changes; drives kernel filter regeneration.
    pub(crate) fn subscribe(&self) -> watch::Receiver<Vec<u16>> {
        self.changed.subscribe()
    }

    /// The identifiers currently claimed.
    pub(crate) fn snapshot(&self) -> Vec<u16> {
        self.changed.borrow().clone()
    }
}

fn sorted(ids: &HashSet<u16>) -> Vec<u16> {
    let mut ids: Vec<u16> = ids.iter().copied().collect();
    ids.sort_unstable();
    ids
}

/// The set of waiters pending on one probe socket.
///
/// All mutation happens under a single lock that is never held across a
/// suspension point: waiters are inserted before the request is sent and a
/// dispatch that removes a waiter completes before any later lookup can miss.
pub(crate) struct Registry {
    identifier: ProbeId,
    identified: bool,
    inner: Mutex<RegistryInner>,
    slot_freed: Notify,
}

struct RegistryInner {
    waiters: HashMap<WaiterKey, Waiter>,
    next_seq: u16,
}

struct Waiter {
    tx: oneshot::Sender<Duration>,
    deadline: Instant,
    sent_at: Instant,
    dest: IpAddr,
}

/// The outcome of dispatching one decoded reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dispatch {
    /// The waiter was fulfilled with an RTT.
    Delivered,
    /// No waiter is registered under this key; duplicate or foreign reply.
    NoWaiter,
    /// The payload does not echo the session pattern; the waiter is kept.
    ForeignPayload,
    /// The reply arrived past the waiter's deadline and was discarded.
    Expired,
    /// The waiter was cancelled concurrently.
    Cancelled,
}

impl Registry {
    pub(crate) fn new(identifier: ProbeId, mode: SocketMode) -> Self {
        Self {
            identifier,
            identified: mode == SocketMode::Raw,
            inner: Mutex::new(RegistryInner {
                waiters: HashMap::new(),
                next_seq: rand::rng().random(),
            }),
            slot_freed: Notify::new(),
        }
    }

    /// The key a reply with the given echoed fields dispatches under.
    pub(crate) fn reply_key(&self, identifier: u16, sequence: u16) -> WaiterKey {
        if self.identified {
            WaiterKey::Identified(identifier, sequence)
        } else {
            WaiterKey::SequenceOnly(sequence)
        }
    }

    /// Register a waiter under the next free sequence number.
    ///
    /// The sequence counter wraps mod 2^16 but never lands on a slot with an
    /// outstanding waiter; with all 65,536 slots occupied the issuer is
    /// suspended until one frees.
    pub(crate) async fn register(
        self: &Arc<Self>,
        dest: IpAddr,
        timeout: Duration,
    ) -> WaiterHandle {
        loop {
            let mut freed = pin!(self.slot_freed.notified());
            freed.as_mut().enable();
            if let Some(handle) = self.try_register(dest, timeout) {
                return handle;
            }
            freed.await;
        }
    }

    fn try_register(self: &Arc<Self>, dest: IpAddr, timeout: Duration) -> Option<WaiterHandle> {
        let now = Instant::now();
        let deadline = now + timeout;
        let mut inner = self.inner.lock();
        let first = inner.next_seq;
        let mut seq = first;
        loop {
            let key = if self.identified {
                WaiterKey::Identified(self.identifier.0, seq)
            } else {
                WaiterKey::SequenceOnly(seq)
            };
            if !inner.waiters.contains_key(&key) {
                inner.next_seq = seq.wrapping_add(1);
                let (tx, rx) = oneshot::channel();
                inner.waiters.insert(
                    key,
                    Waiter {
                        tx,
                        deadline,
                        sent_at: now,
                        dest,
                    },
                );
                return Some(WaiterHandle {
                    registry: Arc::clone(self),
                    key,
                    sequence: Sequence(seq),
                    deadline: tokio::time::Instant::from_std(deadline),
                    rx,
                });
            }
            seq = seq.wrapping_add(1);
            if seq == first {
                return None;
            }
        }
    }

    /// Deliver a decoded reply to its waiter, at most once.
    ///
    /// `rtt` is the round trip computed from the echoed payload timestamp;
    /// when absent the waiter's recorded send time stands in.
    pub(crate) fn dispatch(
        &self,
        key: WaiterKey,
        payload_ok: bool,
        rtt: Option<Duration>,
        now: Instant,
    ) -> Dispatch {
        let waiter = {
            let mut inner = self.inner.lock();
            if !inner.waiters.contains_key(&key) {
                return Dispatch::NoWaiter;
            }
            if !payload_ok {
                return Dispatch::ForeignPayload;
            }
            inner.waiters.remove(&key).expect("waiter present")
        };
        self.slot_freed.notify_waiters();
        if now > waiter.deadline {
            return Dispatch::Expired;
        }
        let rtt = rtt.unwrap_or_else(|| now.saturating_duration_since(waiter.sent_at));
        if waiter.tx.send(rtt).is_err() {
            return Dispatch::Cancelled;
        }
        tracing::trace!(dest = ?waiter.dest, ?rtt, "reply delivered");
        Dispatch::Delivered
    }

    /// Remove a waiter, if still registered.
    pub(crate) fn cancel(&self, key: WaiterKey) {
        let removed = self.inner.lock().waiters.remove(&key);
        if removed.is_some() {
            self.slot_freed.notify_waiters();
        }
    }

    #[cfg(test)]
    pub(crate) fn waiter_count(&self) -> usize {
        self.inner.lock().waiters.len()
    }

    #[cfg(test)]
    fn set_next_seq(&self, seq: u16) {
        self.inner.lock().next_seq = seq;
    }
}

#[cfg(test)]
impl IdPool {
    fn fill_except(&self, keep: ProbeId) {
        let mut inner = self.inner.lock();
        for id in 0..=u16::MAX {
            if id != keep.0 {
                inner.in_use.insert(id);
            }
        }
    }
}

/// The issuing side of a pending probe.
///
/// Dropping the handle cancels the probe: the waiter is removed from the
/// registry and a late reply is discarded silently.
pub(crate) struct WaiterHandle {
    registry: Arc<Registry>,
    key: WaiterKey,
    sequence: Sequence,
    deadline: tokio::time::Instant,
    rx: oneshot::Receiver<Duration>,
}

impl WaiterHandle {
    pub(crate) const fn sequence(&self) -> Sequence {
        self.sequence
    }

    pub(crate) const fn deadline(&self) -> tokio::time::Instant {
        self.deadline
    }

    /// Await the reply or the deadline.
    pub(crate) async fn recv(&mut self) -> Option<Duration> {
        match tokio::time::timeout_at(self.deadline, &mut self.rx).await {
            Ok(Ok(rtt)) => Some(rtt),
            Ok(Err(_)) | Err(_) => None,
        }
    }

    /// Await the reply or the deadline, consuming the handle.
    pub(crate) async fn wait(mut self) -> Option<Duration> {
        self.recv().await
    }
}

impl Drop for WaiterHandle {
    fn drop(&mut self) {
        self.registry.cancel(self.key);
    }
}
