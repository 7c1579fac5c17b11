//! Outgoing command arbitration
//!
//! Producers hand commands to a [`CommandSender`]; the worker's
//! [`CommandRouter`] decides once per cycle what, if anything, is written.
//!
//! # Per-cycle decision
//! 1. Pending real-time bytes are all written, bypassing flow control.
//! 2. Otherwise the head of the streaming queue is considered:
//!    - a jog waits while G-code is streaming
//!    - G-code after a jog first cancels the jog
//!    - the line is written only if the send buffer admits it
//! 3. A streaming session with no new line for the idle timeout ends.

use super::protocol::{encode_line, is_jog_command, is_slow_command, realtime, wire_length};
use crate::communication::{SendBuffer, Transport};
use grblkit_core::{thread_safe_deque, ProtocolError, Result, ThreadSafeDeque};
use std::time::{Duration, Instant};

/// What the router is currently driving
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RouterMode {
    /// Nothing in flight
    #[default]
    Idle,
    /// A G-code stream is running
    Streaming,
    /// Jog commands are running
    Jogging,
}

impl RouterMode {
    /// Build a mode from the `running_gcode`/`running_jog` flag pair.
    ///
    /// Both flags set is an internal consistency failure.
    pub fn from_flags(running_gcode: bool, running_jog: bool) -> Result<Self> {
        match (running_gcode, running_jog) {
            (false, false) => Ok(RouterMode::Idle),
            (true, false) => Ok(RouterMode::Streaming),
            (false, true) => Ok(RouterMode::Jogging),
            (true, true) => Err(ProtocolError::ModeConflict.into()),
        }
    }

    /// G-code streaming flag
    pub fn running_gcode(&self) -> bool {
        *self == RouterMode::Streaming
    }

    /// Jogging flag
    pub fn running_jog(&self) -> bool {
        *self == RouterMode::Jogging
    }
}

impl std::fmt::Display for RouterMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouterMode::Idle => write!(f, "idle"),
            RouterMode::Streaming => write!(f, "streaming"),
            RouterMode::Jogging => write!(f, "jogging"),
        }
    }
}

/// Cloneable producer handle for the router queues.
///
/// Safe to use from any thread while the worker drains the queues.
#[derive(Debug, Clone)]
pub struct CommandSender {
    immediate: ThreadSafeDeque<Vec<u8>>,
    streaming: ThreadSafeDeque<String>,
}

impl CommandSender {
    fn new() -> Self {
        Self {
            immediate: thread_safe_deque(),
            streaming: thread_safe_deque(),
        }
    }

    /// Queue real-time bytes (`?`, `!`, `~`, jog cancel, overrides)
    pub fn enqueue_immediate(&self, bytes: impl Into<Vec<u8>>) {
        self.immediate.lock().push_back(bytes.into());
    }

    /// Queue a G-code or `$J=` jog line, without terminator
    pub fn enqueue_streaming(&self, line: impl Into<String>) {
        self.streaming.lock().push_back(line.into());
    }

    /// Request a status report
    pub fn query_status(&self) {
        self.enqueue_immediate(vec![realtime::STATUS_QUERY]);
    }

    /// Pause motion
    pub fn feed_hold(&self) {
        self.enqueue_immediate(vec![realtime::FEED_HOLD]);
    }

    /// Resume after a feed hold
    pub fn cycle_start(&self) {
        self.enqueue_immediate(vec![realtime::CYCLE_START]);
    }

    /// Reset the controller
    pub fn soft_reset(&self) {
        self.enqueue_immediate(vec![realtime::SOFT_RESET]);
    }

    /// Stop the active jog
    pub fn cancel_jog(&self) {
        self.enqueue_immediate(vec![realtime::JOG_CANCEL]);
    }

    /// Real-time entries waiting
    pub fn immediate_len(&self) -> usize {
        self.immediate.lock().len()
    }

    /// Streaming lines waiting
    pub fn streaming_len(&self) -> usize {
        self.streaming.lock().len()
    }
}

/// Result of one routing decision
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteOutcome {
    /// Real-time entries written
    pub immediate_sent: usize,
    /// Streaming line written this cycle
    pub streamed: Option<String>,
    /// A jog cancel was written ahead of G-code
    pub jog_cancelled: bool,
}

/// Mode arbiter and owner of the outgoing queues
#[derive(Debug)]
pub struct CommandRouter {
    queues: CommandSender,
    mode: RouterMode,
    last_stream_send: Option<Instant>,
    idle_timeout: Duration,
}

impl CommandRouter {
    /// Create a router that ends streaming sessions after `idle_timeout`
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            queues: CommandSender::new(),
            mode: RouterMode::Idle,
            last_stream_send: None,
            idle_timeout,
        }
    }

    /// Producer handle sharing this router's queues
    pub fn sender(&self) -> CommandSender {
        self.queues.clone()
    }

    /// Current mode
    pub fn mode(&self) -> RouterMode {
        self.mode
    }

    /// G-code streaming in progress
    pub fn running_gcode(&self) -> bool {
        self.mode.running_gcode()
    }

    /// Jogging in progress
    pub fn running_jog(&self) -> bool {
        self.mode.running_jog()
    }

    /// Forget the current mode without touching the queues (device reset)
    pub fn reset_mode(&mut self) {
        self.mode = RouterMode::Idle;
        self.last_stream_send = None;
    }

    /// Drop everything queued and return to idle.
    ///
    /// Returns the number of immediate and streaming entries discarded.
    pub fn discard_queued(&mut self) -> (usize, usize) {
        let immediate = std::mem::take(&mut *self.queues.immediate.lock()).len();
        let streaming = std::mem::take(&mut *self.queues.streaming.lock()).len();
        self.mode = RouterMode::Idle;
        self.last_stream_send = None;
        (immediate, streaming)
    }

    /// Make one send decision and perform its writes
    pub fn route<T: Transport + ?Sized>(
        &mut self,
        buffer: &mut SendBuffer<String>,
        transport: &mut T,
        now: Instant,
    ) -> Result<RouteOutcome> {
        let mut outcome = RouteOutcome::default();

        let immediate: Vec<Vec<u8>> = self
            .queues
            .immediate
            .lock()
            .drain(..)
            .filter(|b| !b.is_empty())
            .collect();
        if !immediate.is_empty() {
            for bytes in immediate {
                transport.write(&bytes)?;
                tracing::debug!(">> realtime {:02X?}", bytes);
                if bytes == [realtime::JOG_CANCEL] && self.mode == RouterMode::Jogging {
                    self.mode = RouterMode::Idle;
                }
                outcome.immediate_sent += 1;
            }
        } else {
            self.route_streaming(buffer, transport, now, &mut outcome)?;
        }

        self.expire_stream(now);
        Ok(outcome)
    }

    fn route_streaming<T: Transport + ?Sized>(
        &mut self,
        buffer: &mut SendBuffer<String>,
        transport: &mut T,
        now: Instant,
        outcome: &mut RouteOutcome,
    ) -> Result<()> {
        loop {
            let Some(line) = self.queues.streaming.lock().front().cloned() else {
                return Ok(());
            };
            let command = line.trim();

            if command.is_empty() {
                self.queues.streaming.lock().pop_front();
                tracing::debug!("Dropping empty command");
                continue;
            }

            let length = wire_length(command);
            if length > buffer.capacity() {
                self.queues.streaming.lock().pop_front();
                tracing::error!(
                    "Dropping command longer than the receive buffer ({} > {}): {}",
                    length,
                    buffer.capacity(),
                    command
                );
                continue;
            }

            let admitted = if is_jog_command(command) {
                if self.mode == RouterMode::Streaming {
                    tracing::trace!("Jog held back while streaming");
                    return Ok(());
                }
                let admitted = buffer.try_admit(length, command.to_string());
                if admitted {
                    self.mode = RouterMode::Jogging;
                }
                admitted
            } else {
                if self.mode == RouterMode::Jogging {
                    transport.write(&[realtime::JOG_CANCEL])?;
                    tracing::debug!(">> jog cancel");
                    self.mode = RouterMode::Idle;
                    outcome.jog_cancelled = true;
                }
                let admitted = if is_slow_command(command) {
                    buffer.try_admit_slow(length, command.to_string())
                } else {
                    buffer.try_admit(length, command.to_string())
                };
                if admitted {
                    self.mode = RouterMode::Streaming;
                    self.last_stream_send = Some(now);
                }
                admitted
            };

            if admitted {
                self.queues.streaming.lock().pop_front();
                transport.write(&encode_line(command))?;
                tracing::debug!(">> {}", command);
                outcome.streamed = Some(command.to_string());
            }
            return Ok(());
        }
    }

    fn expire_stream(&mut self, now: Instant) {
        if self.mode != RouterMode::Streaming {
            return;
        }
        let expired = self
            .last_stream_send
            .is_none_or(|sent| now.saturating_duration_since(sent) > self.idle_timeout);
        if expired {
            tracing::debug!("Streaming idle for {:?}, back to idle", self.idle_timeout);
            self.mode = RouterMode::Idle;
            self.last_stream_send = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grblkit_core::AckKind;

    #[derive(Default)]
    struct RecordingTransport {
        written: Vec<Vec<u8>>,
    }

    impl Transport for RecordingTransport {
        fn read(&mut self) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }

        fn write(&mut self, data: &[u8]) -> Result<()> {
            self.written.push(data.to_vec());
            Ok(())
        }

        fn is_open(&self) -> bool {
            true
        }

        fn name(&self) -> String {
            "recording".to_string()
        }
    }

    fn setup() -> (CommandRouter, SendBuffer<String>, RecordingTransport) {
        (
            CommandRouter::new(Duration::from_secs(2)),
            SendBuffer::new(128),
            RecordingTransport::default(),
        )
    }

    #[test]
    fn test_gcode_after_jog_cancels_jog() {
        let (mut router, mut buffer, mut transport) = setup();
        let sender = router.sender();
        let now = Instant::now();

        sender.enqueue_streaming("$J=G91 X1 F100");
        router.route(&mut buffer, &mut transport, now).unwrap();
        assert!(router.running_jog());

        transport.written.clear();
        sender.enqueue_streaming("G1 X1");
        let outcome = router.route(&mut buffer, &mut transport, now).unwrap();
        assert!(outcome.jog_cancelled);
        assert_eq!(transport.written, vec![vec![0x85], b"G1 X1\n".to_vec()]);
        assert!(router.running_gcode());
        assert!(!router.running_jog());
    }

    #[test]
    fn test_jog_blocked_while_streaming() {
        let (mut router, mut buffer, mut transport) = setup();
        let sender = router.sender();
        let now = Instant::now();

        sender.enqueue_streaming("G1 X10");
        sender.enqueue_streaming("$J=G91 X1 F100");
        router.route(&mut buffer, &mut transport, now).unwrap();
        let outcome = router.route(&mut buffer, &mut transport, now).unwrap();
        assert_eq!(outcome.streamed, None);
        assert_eq!(sender.streaming_len(), 1);
        assert!(router.running_gcode());
    }

    #[test]
    fn test_immediate_first_and_unaccounted() {
        let (mut router, mut buffer, mut transport) = setup();
        let sender = router.sender();
        sender.enqueue_streaming("G0 X0");
        sender.enqueue_immediate(vec![b'?']);
        sender.enqueue_immediate(vec![b'!']);

        let outcome = router.route(&mut buffer, &mut transport, Instant::now()).unwrap();
        assert_eq!(outcome.immediate_sent, 2);
        assert_eq!(transport.written, vec![b"?".to_vec(), b"!".to_vec()]);
        assert_eq!(buffer.pending_bytes(), 0);
        assert_eq!(sender.streaming_len(), 1);
    }

    #[test]
    fn test_empty_immediates_do_not_stall_streaming() {
        let (mut router, mut buffer, mut transport) = setup();
        let sender = router.sender();
        sender.enqueue_immediate(Vec::new());
        sender.enqueue_streaming("G0 X0");

        let outcome = router.route(&mut buffer, &mut transport, Instant::now()).unwrap();
        assert_eq!(outcome.immediate_sent, 0);
        assert_eq!(outcome.streamed.as_deref(), Some("G0 X0"));
        assert_eq!(transport.written, vec![b"G0 X0\n".to_vec()]);
        assert_eq!(sender.immediate_len(), 0);
    }

    #[test]
    fn test_rejected_jog_keeps_mode() {
        let (mut router, _, mut transport) = setup();
        let mut buffer = SendBuffer::new(10);
        let sender = router.sender();
        let now = Instant::now();

        sender.enqueue_streaming("$J=G91");
        router.route(&mut buffer, &mut transport, now).unwrap();
        router.reset_mode();
        sender.enqueue_streaming("$J=G91 X1");
        let outcome = router.route(&mut buffer, &mut transport, now).unwrap();
        assert_eq!(outcome.streamed, None);
        assert_eq!(router.mode(), RouterMode::Idle);
        assert_eq!(sender.streaming_len(), 1);
    }

    #[test]
    fn test_backpressure_leaves_line_queued() {
        let (mut router, mut buffer, mut transport) = setup();
        let sender = router.sender();
        let now = Instant::now();
        let long = format!("G1 X{}", "1".repeat(120));

        sender.enqueue_streaming(long.clone());
        sender.enqueue_streaming("G1 Y1");
        router.route(&mut buffer, &mut transport, now).unwrap();
        let outcome = router.route(&mut buffer, &mut transport, now).unwrap();
        assert_eq!(outcome.streamed, None);
        assert_eq!(sender.streaming_len(), 1);

        assert_eq!(buffer.acknowledge(AckKind::Ok).unwrap(), long);
        let outcome = router.route(&mut buffer, &mut transport, now).unwrap();
        assert_eq!(outcome.streamed.as_deref(), Some("G1 Y1"));
    }

    #[test]
    fn test_empty_and_oversized_dropped() {
        let (mut router, mut buffer, mut transport) = setup();
        let sender = router.sender();
        sender.enqueue_streaming("   ");
        sender.enqueue_streaming("G1 X".to_string() + &"9".repeat(200));
        sender.enqueue_streaming("G0 Z5");

        let outcome = router.route(&mut buffer, &mut transport, Instant::now()).unwrap();
        assert_eq!(outcome.streamed.as_deref(), Some("G0 Z5"));
        assert_eq!(buffer.len(), 1);
        assert_eq!(transport.written, vec![b"G0 Z5\n".to_vec()]);
    }

    #[test]
    fn test_streaming_idle_timeout() {
        let (mut router, mut buffer, mut transport) = setup();
        let sender = router.sender();
        let start = Instant::now();

        sender.enqueue_streaming("G1 X1");
        router.route(&mut buffer, &mut transport, start).unwrap();
        assert!(router.running_gcode());

        router
            .route(&mut buffer, &mut transport, start + Duration::from_secs(1))
            .unwrap();
        assert!(router.running_gcode());

        router
            .route(&mut buffer, &mut transport, start + Duration::from_secs(3))
            .unwrap();
        assert_eq!(router.mode(), RouterMode::Idle);
    }

    #[test]
    fn test_immediate_jog_cancel_ends_jogging() {
        let (mut router, mut buffer, mut transport) = setup();
        let sender = router.sender();
        sender.enqueue_streaming("$J=G91 Y1 F100");
        router.route(&mut buffer, &mut transport, Instant::now()).unwrap();
        assert!(router.running_jog());

        sender.enqueue_immediate(vec![realtime::JOG_CANCEL]);
        router.route(&mut buffer, &mut transport, Instant::now()).unwrap();
        assert_eq!(router.mode(), RouterMode::Idle);
    }

    #[test]
    fn test_slow_command_waits_for_drain() {
        let (mut router, mut buffer, mut transport) = setup();
        let sender = router.sender();
        let now = Instant::now();
        sender.enqueue_streaming("G0 X1");
        sender.enqueue_streaming("$$");
        sender.enqueue_streaming("G0 X2");

        router.route(&mut buffer, &mut transport, now).unwrap();
        assert_eq!(router.route(&mut buffer, &mut transport, now).unwrap().streamed, None);

        buffer.acknowledge(AckKind::Ok).unwrap();
        let outcome = router.route(&mut buffer, &mut transport, now).unwrap();
        assert_eq!(outcome.streamed.as_deref(), Some("$$"));
        assert_eq!(router.route(&mut buffer, &mut transport, now).unwrap().streamed, None);
    }

    #[test]
    fn test_mode_from_flags() {
        assert_eq!(RouterMode::from_flags(true, false).unwrap(), RouterMode::Streaming);
        assert!(RouterMode::from_flags(true, true).unwrap_err().is_fatal());
    }

    #[test]
    fn test_discard_queued() {
        let (mut router, _, _) = setup();
        let sender = router.sender();
        sender.enqueue_immediate(vec![b'?']);
        sender.enqueue_streaming("G0 X1");
        sender.enqueue_streaming("G0 X2");
        assert_eq!(router.discard_queued(), (1, 2));
        assert_eq!(sender.streaming_len(), 0);
    }
}
