//! # GrblKit Communication
//!
//! Transport-facing building blocks and the GRBL protocol engine.
//!
//! - [`communication`]: transport trait, line reassembly, receive buffer
//!   flow control, clock and port registry
//! - [`firmware`]: GRBL report parsing, command routing and the engine

pub mod communication;
pub mod firmware;

pub use communication::{
    Clock, LineReassembler, ManualClock, PendingCommand, PortRegistry, PortReservation,
    SendBuffer, SystemClock, Transport, DEFAULT_RX_BUFFER_CAPACITY,
};

pub use firmware::grbl::{
    CommandRouter, CommandSender, ControllerEngine, CycleReport, EngineConfig, EngineWorker,
    MachineState, ParseOutcome, RouterMode, StatusParser, WorkerHandle,
};
