//! Event system for engine notifications
//!
//! Provides:
//! - Event types for connection, acknowledgment, and unparsed-input signals
//! - Event dispatcher for publishing events to subscribers

use crate::data::ConnectionState;
use tokio::sync::broadcast;

/// Kind of acknowledgment received from the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AckKind {
    /// `ok`
    Ok,
    /// `error:<code>`
    Error,
}

impl std::fmt::Display for AckKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AckKind::Ok => write!(f, "ok"),
            AckKind::Error => write!(f, "error"),
        }
    }
}

/// Engine event types
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Connection lifecycle state changed
    ConnectionChanged(ConnectionState),
    /// A pending command was acknowledged
    Acknowledged {
        /// `ok` or `error`
        kind: AckKind,
        /// Total `ok` acknowledgments since connect
        ok_count: u64,
        /// Total `error:` acknowledgments since connect
        error_count: u64,
    },
    /// The device rejected a command with `error:<code>`
    DeviceError {
        /// GRBL error code
        code: u8,
        /// Decoded description
        description: String,
    },
    /// The device raised `ALARM:<code>`
    Alarm {
        /// GRBL alarm code
        code: u8,
        /// Decoded description
        description: String,
    },
    /// A line could not be interpreted
    Unparsed {
        /// The raw line
        line: String,
        /// Why it was not interpreted
        reason: String,
    },
    /// A `[MSG:...]` feedback message
    Message(String),
    /// A startup banner (`Grbl ...` or `>...`)
    Startup(String),
}

impl std::fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineEvent::ConnectionChanged(state) => write!(f, "Connection: {}", state),
            EngineEvent::Acknowledged {
                kind,
                ok_count,
                error_count,
            } => write!(f, "Ack {} (ok={}, error={})", kind, ok_count, error_count),
            EngineEvent::DeviceError { code, description } => {
                write!(f, "error:{} ({})", code, description)
            }
            EngineEvent::Alarm { code, description } => {
                write!(f, "ALARM:{} ({})", code, description)
            }
            EngineEvent::Unparsed { line, reason } => write!(f, "Unparsed '{}': {}", line, reason),
            EngineEvent::Message(msg) => write!(f, "Message: {}", msg),
            EngineEvent::Startup(banner) => write!(f, "Startup: {}", banner),
        }
    }
}

/// Event dispatcher for publishing events to subscribers
#[derive(Clone)]
pub struct EventDispatcher {
    /// Broadcast sender channel for engine events.
    tx: broadcast::Sender<EngineEvent>,
}

impl EventDispatcher {
    /// Create a new event dispatcher
    ///
    /// # Arguments
    /// * `buffer_size` - Size of the broadcast buffer (default 100)
    pub fn new(buffer_size: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer_size.max(1));
        Self { tx }
    }

    /// Create a new event dispatcher with default buffer size
    pub fn default_with_buffer() -> Self {
        Self::new(100)
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Publish an event to all subscribers.
    ///
    /// Returns the number of subscribers reached; zero subscribers is not an error.
    pub fn publish(&self, event: EngineEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Get number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::default_with_buffer()
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
