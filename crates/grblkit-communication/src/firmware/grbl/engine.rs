//! Per-connection protocol engine
//!
//! [`ControllerEngine::poll`] is one I/O cycle: read what the transport has,
//! reassemble lines, route acknowledgments to the send buffer and everything
//! else to the status parser, then let the router make one send decision.
//! It never blocks and is driven either by [`EngineWorker`](super::EngineWorker)
//! or directly by a test.
//!
//! # Connection lifecycle
//! - `connect`: CONNECTING, then BLOCKED, MISSING_RESOURCE or CONNECTED
//! - a fatal fault moves to FAIL and releases the port
//! - `disconnect`: DISCONNECTING, CLEANUP, NOT_CONNECTED
//!
//! No byte is read or written unless the state is CONNECTED.

use super::command_router::{CommandRouter, CommandSender};
use super::config::EngineConfig;
use super::error_decoder::{
    describe_alarm, describe_error, format_alarm, format_error, parse_error_code,
};
use super::machine_state::MachineState;
use super::protocol::is_system_command;
use super::status_parser::{ParseOutcome, StatusParser};
use crate::communication::{
    Clock, LineReassembler, PortRegistry, PortReservation, SendBuffer, SystemClock, Transport,
};
use grblkit_core::{
    thread_safe_rw, AckKind, ChangeCallback, ConnectionError, ConnectionState, EngineEvent, Error,
    EventDispatcher, Result, ThreadSafeRw,
};
use std::sync::Arc;
use std::time::Instant;

/// Activity of one poll cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    /// Complete lines received
    pub lines: usize,
    /// Acknowledgments consumed
    pub acknowledged: usize,
    /// Real-time entries written
    pub immediate_sent: usize,
    /// Streaming line written
    pub streamed: Option<String>,
}

/// Protocol engine for one GRBL device
pub struct ControllerEngine {
    config: EngineConfig,
    transport: Box<dyn Transport>,
    clock: Arc<dyn Clock>,
    reassembler: LineReassembler,
    send_buffer: SendBuffer<String>,
    router: CommandRouter,
    parser: StatusParser,
    machine_state: ThreadSafeRw<MachineState>,
    connection_state: ThreadSafeRw<ConnectionState>,
    events: EventDispatcher,
    reservation: Option<PortReservation>,
    unparsed_count: u64,
    last_status_query: Option<Instant>,
}

impl ControllerEngine {
    /// Create an engine on the system clock
    pub fn new(config: EngineConfig, transport: Box<dyn Transport>) -> Result<Self> {
        Self::with_clock(config, transport, Arc::new(SystemClock))
    }

    /// Create an engine with an injected clock
    pub fn with_clock(
        config: EngineConfig,
        transport: Box<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            send_buffer: SendBuffer::new(config.rx_buffer_capacity),
            router: CommandRouter::new(config.gcode_idle_timeout()),
            events: EventDispatcher::new(config.event_buffer_size),
            config,
            transport,
            clock,
            reassembler: LineReassembler::new(),
            parser: StatusParser::new(),
            machine_state: thread_safe_rw(MachineState::new()),
            connection_state: thread_safe_rw(ConnectionState::NotConnected),
            reservation: None,
            unparsed_count: 0,
            last_status_query: None,
        })
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Producer handle for the outgoing queues
    pub fn sender(&self) -> CommandSender {
        self.router.sender()
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Event dispatcher shared with consumers
    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    /// Register a machine state change listener.
    ///
    /// The listener runs on the worker while the state is locked, so it must
    /// not read the shared state back.
    pub fn set_change_listener(&self, listener: ChangeCallback) {
        self.machine_state.write().set_listener(listener);
    }

    /// Snapshot of the machine state
    pub fn machine_state(&self) -> MachineState {
        self.machine_state.read().clone()
    }

    /// Shared handle to the machine state
    pub fn shared_machine_state(&self) -> ThreadSafeRw<MachineState> {
        self.machine_state.clone()
    }

    /// Current connection state
    pub fn connection_state(&self) -> ConnectionState {
        *self.connection_state.read()
    }

    /// Shared handle to the connection state
    pub fn shared_connection_state(&self) -> ThreadSafeRw<ConnectionState> {
        self.connection_state.clone()
    }

    /// Router mode and queues
    pub fn router(&self) -> &CommandRouter {
        &self.router
    }

    /// Receive buffer bookkeeping
    pub fn send_buffer(&self) -> &SendBuffer<String> {
        &self.send_buffer
    }

    /// `ok` acknowledgments since connect
    pub fn ok_count(&self) -> u64 {
        self.send_buffer.ok_count()
    }

    /// `error:` acknowledgments since connect
    pub fn error_count(&self) -> u64 {
        self.send_buffer.error_count()
    }

    /// Lines dropped as malformed or unrecognized since connect
    pub fn unparsed_count(&self) -> u64 {
        self.unparsed_count
    }

    fn set_state(&self, next: ConnectionState) -> Result<()> {
        let mut state = self.connection_state.write();
        let from = *state;
        if from == next {
            return Ok(());
        }
        if !from.can_transition_to(next) {
            return Err(ConnectionError::InvalidTransition {
                from: from.to_string(),
                to: next.to_string(),
            }
            .into());
        }
        *state = next;
        drop(state);

        tracing::info!("Connection {} -> {}", from, next);
        self.events.publish(EngineEvent::ConnectionChanged(next));
        Ok(())
    }

    /// Move to FAIL after a fatal fault, release the port and drop queued commands
    fn fail(&mut self, error: Error) -> Error {
        tracing::error!("Connection to {} failed: {}", self.transport.name(), error);
        let previous = std::mem::replace(&mut *self.connection_state.write(), ConnectionState::Fail);
        self.reservation = None;
        // Commands queued for the failed session never reach the next one
        let (immediate, streaming) = self.router.discard_queued();
        if immediate + streaming > 0 {
            tracing::warn!(
                "Discarded {} immediate and {} streaming commands after failure",
                immediate,
                streaming
            );
        }
        if previous != ConnectionState::Fail {
            self.events
                .publish(EngineEvent::ConnectionChanged(ConnectionState::Fail));
        }
        error
    }

    /// Reserve the transport and start a session
    pub fn connect(&mut self) -> Result<()> {
        self.set_state(ConnectionState::Connecting)?;

        let port = self.transport.name();
        let reservation = match PortRegistry::reserve(&port) {
            Ok(reservation) => reservation,
            Err(e) => {
                self.set_state(ConnectionState::Blocked)?;
                return Err(e);
            }
        };

        if !self.transport.is_open() {
            drop(reservation);
            self.set_state(ConnectionState::MissingResource)?;
            return Err(ConnectionError::MissingResource { port }.into());
        }

        self.reservation = Some(reservation);
        self.reassembler.reset();
        self.send_buffer.clear();
        self.send_buffer.reset_counters();
        self.router.reset_mode();
        self.unparsed_count = 0;
        self.last_status_query = None;
        self.set_state(ConnectionState::Connected)?;

        let sender = self.router.sender();
        for command in &self.config.startup_commands {
            sender.enqueue_streaming(command.clone());
        }
        Ok(())
    }

    /// Run one I/O cycle.
    ///
    /// Returns an error only for faults that ended the connection; the state
    /// is FAIL when it does.
    pub fn poll(&mut self) -> Result<CycleReport> {
        let mut report = CycleReport::default();
        if !self.connection_state().is_connected() {
            return Ok(report);
        }
        let now = self.clock.now();

        let chunk = match self.transport.read() {
            Ok(chunk) => chunk,
            Err(e) => return Err(self.fail(e)),
        };

        for line in self.reassembler.feed(&chunk) {
            report.lines += 1;
            match self.handle_line(&line) {
                Ok(true) => report.acknowledged += 1,
                Ok(false) => {}
                Err(e) => return Err(self.fail(e)),
            }
        }

        self.schedule_status_query(now);

        let outcome = match self
            .router
            .route(&mut self.send_buffer, self.transport.as_mut(), now)
        {
            Ok(outcome) => outcome,
            Err(e) => return Err(self.fail(e)),
        };

        if let Some(command) = &outcome.streamed {
            if !is_system_command(command) {
                let applied = {
                    let mut state = self.machine_state.write();
                    self.parser.apply_modal_words(command, &mut state)
                };
                if let Err(e) = applied {
                    return Err(self.fail(e));
                }
            }
        }

        report.immediate_sent = outcome.immediate_sent;
        report.streamed = outcome.streamed;
        Ok(report)
    }

    /// Handle one received line; `Ok(true)` when it was an acknowledgment
    fn handle_line(&mut self, line: &str) -> Result<bool> {
        tracing::debug!("<< {}", line);

        if line == "ok" {
            self.acknowledge(AckKind::Ok)?;
            return Ok(true);
        }
        if line.starts_with("error:") {
            self.acknowledge(AckKind::Error)?;
            let code = parse_error_code(line).unwrap_or(0);
            let description = describe_error(code).to_string();
            tracing::warn!("Device rejected command: {}", format_error(code));
            self.events
                .publish(EngineEvent::DeviceError { code, description });
            return Ok(true);
        }

        let parsed = {
            let mut state = self.machine_state.write();
            self.parser.parse(line, &mut state)
        };

        match parsed {
            Ok(ParseOutcome::Alarm(code)) => {
                let description = describe_alarm(code).to_string();
                tracing::warn!("Device alarm: {}", format_alarm(code));
                self.events.publish(EngineEvent::Alarm { code, description });
            }
            Ok(ParseOutcome::Message(message)) => {
                tracing::info!("Device message: {}", message);
                self.events.publish(EngineEvent::Message(message));
            }
            Ok(ParseOutcome::Startup(banner)) => {
                if banner.starts_with("Grbl ") {
                    // A reset empties the device buffer; nothing pending will be acknowledged
                    let dropped = self.send_buffer.clear();
                    self.router.reset_mode();
                    if dropped > 0 {
                        tracing::warn!("Device reset with {} commands pending", dropped);
                    }
                }
                self.events.publish(EngineEvent::Startup(banner));
            }
            Ok(_) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                self.unparsed_count += 1;
                tracing::warn!("Ignoring line: {}", e);
                self.events.publish(EngineEvent::Unparsed {
                    line: line.to_string(),
                    reason: e.to_string(),
                });
            }
        }
        Ok(false)
    }

    fn acknowledge(&mut self, kind: AckKind) -> Result<()> {
        let command = self.send_buffer.acknowledge(kind)?;
        tracing::debug!("{} <- {}", kind, command);
        self.events.publish(EngineEvent::Acknowledged {
            kind,
            ok_count: self.send_buffer.ok_count(),
            error_count: self.send_buffer.error_count(),
        });
        Ok(())
    }

    fn schedule_status_query(&mut self, now: Instant) {
        let Some(interval) = self.config.status_query_interval() else {
            return;
        };
        let due = self
            .last_status_query
            .is_none_or(|last| now.saturating_duration_since(last) >= interval);
        if due {
            self.router.sender().query_status();
            self.last_status_query = Some(now);
        }
    }

    /// End the session: drop queued and pending commands and release the port
    pub fn disconnect(&mut self) -> Result<()> {
        if matches!(
            self.connection_state(),
            ConnectionState::NotConnected | ConnectionState::Unknown
        ) {
            return Ok(());
        }

        self.set_state(ConnectionState::Disconnecting)?;
        self.set_state(ConnectionState::Cleanup)?;

        let (immediate, streaming) = self.router.discard_queued();
        let pending = self.send_buffer.clear();
        self.reassembler.reset();
        self.reservation = None;
        tracing::info!(
            "Discarded {} immediate, {} streaming and {} pending commands",
            immediate,
            streaming,
            pending
        );

        self.set_state(ConnectionState::NotConnected)
    }
}

impl std::fmt::Debug for ControllerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerEngine")
            .field("transport", &self.transport.name())
            .field("connection_state", &self.connection_state())
            .field("mode", &self.router.mode())
            .field("pending_bytes", &self.send_buffer.pending_bytes())
            .finish()
    }
}
