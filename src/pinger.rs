use crate::failure::describe;
use crate::messages::{ProbeRequest, ProbeResult, ProbeState};
use crate::packet::{encode, filler_payload, ICMP_ECHO_REPLY, ICMP_ECHO_REQUEST, ICMP_TIME_EXCEEDED};
use crate::parser::{decode_ip_icmp, ReceivedDatagram};
use crate::transport::{Connector, RawConnector, Transport};
use log::{debug, trace, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Longest single receive wait while a [`CancelToken`] is attached.
pub const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Cooperative cancellation flag shared between a caller and its probes.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The request on the wire, as needed to recognise its replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outstanding {
    identifier: u16,
    sequence: u16,
    target: u32,
    packet: Vec<u8>,
}

impl Outstanding {
    pub fn new(identifier: u16, sequence: u16, target: u32, payload: &[u8]) -> Outstanding {
        Outstanding { identifier, sequence, target, packet: encode(identifier, sequence, payload) }
    }

    pub fn identifier(&self) -> u16 {
        self.identifier
    }

    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    /// The encoded ICMP echo request.
    pub fn packet(&self) -> &[u8] {
        &self.packet
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Succeeded,
    Failed(String),
    /// Not caused by this probe; keep waiting.
    Unrelated,
}

/// Decides whether `datagram` answers `outstanding`.
///
/// A direct reply must echo both identifier and sequence and must not be an
/// echo request itself (our own packet looped back). A time-exceeded
/// notification is attributed only when it quotes the original destination
/// and the exact bytes we sent. Anything else is unrelated.
pub fn classify(outstanding: &Outstanding, datagram: &ReceivedDatagram) -> Verdict {
    if datagram.identifier == outstanding.identifier()
        && datagram.sequence == outstanding.sequence()
        && datagram.icmp_type != ICMP_ECHO_REQUEST
    {
        if datagram.icmp_type == ICMP_ECHO_REPLY && datagram.icmp_code == 0 {
            return Verdict::Succeeded;
        }
        return Verdict::Failed(describe(datagram.icmp_type, datagram.icmp_code));
    }

    if datagram.icmp_type == ICMP_TIME_EXCEEDED {
        if let Some(quoted) = &datagram.quoted {
            if quoted.destination == outstanding.target && quoted.icmp == outstanding.packet {
                return Verdict::Failed(describe(datagram.icmp_type, datagram.icmp_code));
            }
        }
    }

    Verdict::Unrelated
}

/// Runs single ICMP echo probes: one request out, replies correlated until a
/// decision or the deadline.
pub struct Pinger<C = RawConnector> {
    connector: C,
    cancel: Option<CancelToken>,
    state: ProbeState,
}

impl Pinger<RawConnector> {
    pub fn new() -> Pinger<RawConnector> {
        Pinger::with_connector(RawConnector)
    }
}

impl Default for Pinger<RawConnector> {
    fn default() -> Self {
        Pinger::new()
    }
}

impl<C: Connector> Pinger<C> {
    pub fn with_connector(connector: C) -> Pinger<C> {
        Pinger { connector, cancel: None, state: ProbeState::Idle }
    }

    /// Checks `token` before every receive and caps each wait at
    /// [`CANCEL_POLL_INTERVAL`].
    pub fn with_cancel(mut self, token: CancelToken) -> Pinger<C> {
        self.cancel = Some(token);
        self
    }

    pub fn state(&self) -> ProbeState {
        self.state
    }

    /// Sends one echo request and waits for its outcome. Network conditions
    /// never surface as errors: exactly one result is always returned.
    pub fn start(&mut self, request: &ProbeRequest) -> ProbeResult {
        self.state = ProbeState::Idle;
        self.transition(request, ProbeState::Sending);

        let payload = filler_payload(request.payload_size());
        let outstanding = Outstanding::new(
            rand::random::<u16>(),
            rand::random::<u16>(),
            request.target_u32(),
            &payload,
        );
        debug!(
            "probe {}: id={:#06x} seq={:#06x} size={} ttl={} df={}",
            request.target(),
            outstanding.identifier(),
            outstanding.sequence(),
            payload.len(),
            request.ttl(),
            request.dont_fragment()
        );

        // dropped, and so closed, on every return below
        let mut transport = match self.connector.open(request) {
            Ok(transport) => transport,
            Err(e) => return self.finish(request, ProbeResult::send_error(e.to_string())),
        };

        let sent_at = Instant::now();
        if let Err(e) = transport.send_to(outstanding.packet(), request.target()) {
            return self.finish(request, ProbeResult::send_error(e.to_string()));
        }

        self.transition(request, ProbeState::AwaitingReply);
        let result = self.await_reply(&mut transport, request, &outstanding, sent_at);
        self.finish(request, result)
    }

    fn await_reply(
        &self,
        transport: &mut C::Transport,
        request: &ProbeRequest,
        outstanding: &Outstanding,
        sent_at: Instant,
    ) -> ProbeResult {
        let timeout = request.timeout();
        loop {
            if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                return ProbeResult::cancelled(sent_at.elapsed());
            }

            let elapsed = sent_at.elapsed();
            if elapsed >= timeout {
                return ProbeResult::timed_out(timeout);
            }

            // re-armed with what is left, never the full timeout
            let mut bound = timeout - elapsed;
            if self.cancel.is_some() {
                bound = bound.min(CANCEL_POLL_INTERVAL);
            }

            let datagram = match transport.recv_timeout(bound) {
                Ok(Some(datagram)) => datagram,
                Ok(None) => continue,
                Err(e) => {
                    warn!("probe {}: receive failed: {}", request.target(), e);
                    return ProbeResult::timed_out(timeout);
                }
            };
            let round_trip = sent_at.elapsed();

            let decoded = match decode_ip_icmp(&datagram) {
                Ok(decoded) => decoded,
                Err(e) => {
                    trace!("probe {}: skipping datagram: {}", request.target(), e);
                    continue;
                }
            };

            match classify(outstanding, &decoded) {
                Verdict::Succeeded => return ProbeResult::from_reply(decoded, round_trip, None),
                Verdict::Failed(description) => {
                    return ProbeResult::from_reply(decoded, round_trip, Some(description));
                }
                Verdict::Unrelated => trace!(
                    "probe {}: ignoring type={} code={} id={:#06x} seq={:#06x}",
                    request.target(),
                    decoded.icmp_type,
                    decoded.icmp_code,
                    decoded.identifier,
                    decoded.sequence
                ),
            }
        }
    }

    fn transition(&mut self, request: &ProbeRequest, next: ProbeState) {
        debug!("probe {}: {:?} -> {:?}", request.target(), self.state, next);
        self.state = next;
    }

    fn finish(&mut self, request: &ProbeRequest, result: ProbeResult) -> ProbeResult {
        debug_assert!(result.state.is_terminal(), "{:?} is not terminal", result.state);
        self.transition(request, result.state);
        result
    }
}
