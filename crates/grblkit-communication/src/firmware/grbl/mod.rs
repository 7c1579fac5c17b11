//! GRBL 1.1 protocol engine
//!
//! # Components
//! - [`StatusParser`] and [`MachineState`]: received lines to device state
//! - [`CommandRouter`]: outgoing queues and jog/stream arbitration
//! - [`ControllerEngine`]: the per-cycle orchestrator and connection lifecycle
//! - [`EngineWorker`]: tokio task driving an engine

pub mod command_router;
pub mod config;
pub mod engine;
pub mod error_decoder;
pub mod machine_state;
pub mod protocol;
pub mod status_parser;
pub mod tables;
pub mod worker;

pub use command_router::{CommandRouter, CommandSender, RouteOutcome, RouterMode};
pub use config::EngineConfig;
pub use engine::{ControllerEngine, CycleReport};
pub use error_decoder::{describe_alarm, describe_error, format_alarm, format_error};
pub use machine_state::{Condition, MachineState, ProbeResult};
pub use protocol::{
    gcode_words, is_jog_command, is_slow_command, realtime, JOG_PREFIX, LINE_TERMINATOR,
};
pub use status_parser::{ParseOutcome, StatusParser};
pub use worker::{EngineWorker, WorkerHandle};
