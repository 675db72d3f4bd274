use crate::address::{address_to_u32, u32_to_address};
use crate::packet::MAX_PAYLOAD_LEN;
use crate::parser::ReceivedDatagram;
use std::net::Ipv4Addr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_TIMEOUT_SECONDS: f64 = 2.0;
pub const DEFAULT_PAYLOAD_SIZE: usize = 1;
pub const DEFAULT_TTL: u8 = 128;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid IPv4 address: {0:?}")]
    InvalidAddress(String),
    #[error("timeout must be a positive number of seconds, got {0}")]
    InvalidTimeout(f64),
    #[error("ttl must be between 1 and 255, got {0}")]
    InvalidTtl(u8),
    #[error("payload of {0} bytes does not fit in one IPv4 datagram")]
    PayloadTooLarge(usize),
}

/// Probe options as supplied by the caller, before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeConfig {
    pub target_address: String,
    pub timeout_seconds: f64,
    pub payload_size_bytes: usize,
    pub ttl: u8,
    pub dont_fragment: bool,
}

impl ProbeConfig {
    pub fn new(target_address: impl Into<String>) -> ProbeConfig {
        ProbeConfig { target_address: target_address.into(), ..Default::default() }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        ProbeConfig {
            target_address: String::new(),
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            payload_size_bytes: DEFAULT_PAYLOAD_SIZE,
            ttl: DEFAULT_TTL,
            dont_fragment: false,
        }
    }
}

/// Validated, immutable configuration of one probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRequest {
    target: u32,
    timeout: Duration,
    payload_size: usize,
    ttl: u8,
    dont_fragment: bool,
}

impl ProbeRequest {
    pub fn target(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.target)
    }

    pub fn target_u32(&self) -> u32 {
        self.target
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn payload_size(&self) -> usize {
        self.payload_size
    }

    pub fn ttl(&self) -> u8 {
        self.ttl
    }

    pub fn dont_fragment(&self) -> bool {
        self.dont_fragment
    }
}

impl TryFrom<ProbeConfig> for ProbeRequest {
    type Error = ConfigError;

    fn try_from(config: ProbeConfig) -> Result<Self, Self::Error> {
        let target = address_to_u32(config.target_address.trim())
            .ok_or_else(|| ConfigError::InvalidAddress(config.target_address.clone()))?;

        if !config.timeout_seconds.is_finite() || config.timeout_seconds <= 0.0 {
            return Err(ConfigError::InvalidTimeout(config.timeout_seconds));
        }
        let timeout = Duration::try_from_secs_f64(config.timeout_seconds)
            .map_err(|_| ConfigError::InvalidTimeout(config.timeout_seconds))?;

        if config.ttl == 0 {
            return Err(ConfigError::InvalidTtl(config.ttl));
        }
        if config.payload_size_bytes > MAX_PAYLOAD_LEN {
            return Err(ConfigError::PayloadTooLarge(config.payload_size_bytes));
        }

        Ok(ProbeRequest {
            target,
            timeout,
            payload_size: config.payload_size_bytes,
            ttl: config.ttl,
            dont_fragment: config.dont_fragment,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    Idle,
    Sending,
    AwaitingReply,
    Succeeded,
    FailedProtocol,
    TimedOut,
    SendError,
    Cancelled,
}

impl ProbeState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ProbeState::Idle | ProbeState::Sending | ProbeState::AwaitingReply)
    }
}

/// Outcome of one probe. Every field is populated; fields that do not apply
/// to the outcome hold zero or empty values.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub state: ProbeState,
    pub success: bool,
    pub round_trip_time_ms: f64,
    pub responding_address: String,
    pub responding_destination: u32,
    pub ttl_observed: u8,
    pub icmp_type: u8,
    pub icmp_code: u8,
    pub icmp_checksum: u16,
    pub icmp_identifier: u16,
    pub icmp_sequence: u16,
    pub icmp_data: Vec<u8>,
    pub payload_size_observed: usize,
    /// False only when no correlated datagram arrived.
    pub received_any_reply: bool,
    pub failure_description: String,
}

impl ProbeResult {
    fn empty(state: ProbeState) -> ProbeResult {
        ProbeResult {
            state,
            success: false,
            round_trip_time_ms: 0.0,
            responding_address: String::new(),
            responding_destination: 0,
            ttl_observed: 0,
            icmp_type: 0,
            icmp_code: 0,
            icmp_checksum: 0,
            icmp_identifier: 0,
            icmp_sequence: 0,
            icmp_data: Vec::new(),
            payload_size_observed: 0,
            received_any_reply: false,
            failure_description: String::new(),
        }
    }

    pub(crate) fn send_error(error_text: String) -> ProbeResult {
        ProbeResult { failure_description: error_text, ..ProbeResult::empty(ProbeState::SendError) }
    }

    /// The round-trip time of a timed-out probe is the full configured timeout.
    pub(crate) fn timed_out(timeout: Duration) -> ProbeResult {
        ProbeResult {
            round_trip_time_ms: duration_ms(timeout),
            failure_description: "timeout".to_string(),
            ..ProbeResult::empty(ProbeState::TimedOut)
        }
    }

    pub(crate) fn cancelled(elapsed: Duration) -> ProbeResult {
        ProbeResult {
            round_trip_time_ms: duration_ms(elapsed),
            failure_description: "cancelled".to_string(),
            ..ProbeResult::empty(ProbeState::Cancelled)
        }
    }

    /// Result for a datagram correlated to the probe; `failure` is `None`
    /// for a successful echo reply.
    pub(crate) fn from_reply(
        datagram: ReceivedDatagram,
        round_trip: Duration,
        failure: Option<String>,
    ) -> ProbeResult {
        let success = failure.is_none();
        ProbeResult {
            state: if success { ProbeState::Succeeded } else { ProbeState::FailedProtocol },
            success,
            round_trip_time_ms: duration_ms(round_trip),
            responding_address: u32_to_address(datagram.source),
            responding_destination: datagram.destination,
            ttl_observed: datagram.ttl,
            icmp_type: datagram.icmp_type,
            icmp_code: datagram.icmp_code,
            icmp_checksum: datagram.checksum,
            icmp_identifier: datagram.identifier,
            icmp_sequence: datagram.sequence,
            payload_size_observed: datagram.payload.len(),
            icmp_data: datagram.payload,
            received_any_reply: true,
            failure_description: failure.unwrap_or_default(),
        }
    }
}

fn duration_ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}
