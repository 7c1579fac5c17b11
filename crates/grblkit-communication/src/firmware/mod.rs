//! Firmware dialects
//!
//! Only GRBL 1.1 is implemented.

pub mod grbl;

pub use grbl::{
    CommandRouter, CommandSender, ControllerEngine, EngineConfig, EngineWorker, MachineState,
    StatusParser, WorkerHandle,
};
