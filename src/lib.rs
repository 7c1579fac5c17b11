//! # GrblKit
//!
//! Host-side communication engine for GRBL-family CNC motion controllers.
//!
//! ## Architecture
//!
//! GrblKit is organized as a workspace with two crates:
//!
//! 1. **grblkit-core** - Error taxonomy, shared data types, engine events
//! 2. **grblkit-communication** - Line reassembly, flow control, mode arbitration,
//!    status parsing and the per-cycle controller engine
//! 3. **grblkit** - This crate: logging setup and re-exports
//!
//! ## Data flow
//!
//! ```text
//! transport -> LineReassembler -> ControllerEngine -> { SendBuffer (acks), StatusParser (reports) }
//! producers -> CommandSender -> CommandRouter -> SendBuffer admission -> transport
//! ```

pub use grblkit_communication::communication;
pub use grblkit_communication::firmware;
pub use grblkit_core::data;

pub use grblkit_core::{
    Axis, AxisValues, ConnectionState, Error, EngineEvent, EventDispatcher, FieldValue,
    MachineStateKind, Result, Units,
};

pub use grblkit_communication::{
    CommandRouter, CommandSender, ControllerEngine, EngineConfig, EngineWorker, LineReassembler,
    MachineState, SendBuffer, StatusParser, Transport, WorkerHandle,
};

/// Initialize the tracing subscriber.
///
/// Honors `RUST_LOG` (defaults to INFO). Setting `GRBLKIT_LOG_FORMAT=json`
/// switches the output to one JSON object per line, which is what log
/// collectors on headless hosts expect.
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("GRBLKIT_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stdout)
            .with_target(true)
            .with_level(true)
            .with_thread_names(true)
            .json();

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    } else {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stdout)
            .with_target(true)
            .with_level(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_line_number(true)
            .pretty();

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    }

    tracing::debug!("logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_only_once() {
        assert!(init_logging().is_ok());
        assert!(init_logging().is_err());
    }
}
