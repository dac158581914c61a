//! A high-throughput asynchronous ICMP echo prober for IPv4 and IPv6.
//!
//! This crate sends ICMP Echo Requests, matches the returning Echo Replies
//! and measures round-trip time. All probes of a session are multiplexed
//! over one shared socket per address family, so tens of thousands of
//! probes can be in flight from a single process. Replies are matched on
//! identifier and sequence number and additionally validated against a
//! per-session payload pattern, with a kernel-side BPF filter keeping
//! foreign traffic off the socket where the platform supports it.
//!
//! Raw sockets require privilege; on Linux, DGRAM ICMP sockets work
//! unprivileged for callers admitted by `net.ipv4.ping_group_range`. The
//! [`SelectionPolicy`] governs which is used.
//!
//! # Example
//!
//! Probe a single destination once:
//!
//! ```no_run
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> anyhow::Result<()> {
//! use pingmux_core::Builder;
//! use std::net::IpAddr;
//! use std::str::FromStr;
//!
//! let session = Builder::new().build()?;
//! let addr = IpAddr::from_str("1.1.1.1")?;
//! match session.ping(addr).await? {
//!     Some(rtt) => println!("{rtt:?}"),
//!     None => println!("timed out"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Probe repeatedly at a fixed cadence:
//!
//! ```no_run
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> anyhow::Result<()> {
//! use pingmux_core::Builder;
//! use std::net::IpAddr;
//! use std::str::FromStr;
//! use std::time::Duration;
//!
//! let session = Builder::new().interval(Duration::from_millis(100)).build()?;
//! let addr = IpAddr::from_str("1.1.1.1")?;
//! let mut series = session.iter_rtt(addr, Some(5)).await?;
//! while let Some(rtt) = series.next().await {
//!     println!("{rtt:?}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # See Also
//!
//! - [`Builder`] - Build a [`Ping`] session.
//! - [`Ping::ping`] - A single probe.
//! - [`Ping::iter_rtt`] - A series of probes.
#![warn(clippy::all, clippy::pedantic, clippy::nursery, rust_2018_idioms)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_const_for_fn,
    clippy::cast_possible_truncation,
    clippy::option_if_let_else
)]
#![deny(unsafe_code)]

mod builder;
mod clock;
mod config;
mod constants;
mod error;
mod net;
mod ping;
mod probe;
mod registry;
mod types;

pub use builder::Builder;
pub use config::{defaults, SelectionPolicy, SessionConfig, SocketMode};
pub use constants::{MAX_PAYLOAD_SIZE, MIN_PAYLOAD_SIZE};
pub use error::{Error, ErrorKind, IoError, IoOperation, Result};
pub use ping::{Ping, RttIter};
pub use types::{PayloadSize, ProbeId, Sequence, TimeToLive, TypeOfService};
