//! # GrblKit Core
//!
//! Core types, errors, and events for GrblKit.
//! Provides the shared vocabulary between the communication engine and
//! whatever consumes it: connection and machine states, per-axis values,
//! change-notification payloads, and the error taxonomy.

pub mod core;
pub mod data;
pub mod error;
pub mod types;

pub use core::event::{AckKind, EngineEvent, EventDispatcher};

pub use data::{
    axis_values, Axis, AxisValues, ConnectionState, FieldValue, MachineStateKind, Units,
};

pub use error::{ConfigError, ConnectionError, Error, ProtocolError, Result};

pub use types::{
    thread_safe, thread_safe_deque, thread_safe_rw, ChangeCallback, ThreadSafe, ThreadSafeDeque,
    ThreadSafeRw,
};
