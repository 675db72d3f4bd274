//! Single-shot ICMP echo probing over raw IPv4 sockets.
//!
//! [`Pinger::start`] sends one echo request, correlates replies (including
//! time-exceeded notifications from intermediate routers) and returns exactly
//! one [`ProbeResult`].

pub mod address;
pub mod failure;
pub mod messages;
pub mod packet;
pub mod parser;
pub mod pinger;
pub mod transport;

pub use messages::{ConfigError, ProbeConfig, ProbeRequest, ProbeResult, ProbeState};
pub use pinger::{CancelToken, Pinger};
pub use transport::{Connector, RawConnector, Transport};
