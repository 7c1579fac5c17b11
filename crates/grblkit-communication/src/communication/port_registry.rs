//! Process-wide reservation of transport identifiers
//!
//! At most one engine may be attached to a given device at a time. The
//! reservation is released when the [`PortReservation`] guard is dropped.

use grblkit_core::{ConnectionError, Result};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::OnceLock;

static RESERVED_PORTS: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();

fn reserved() -> &'static Mutex<HashSet<String>> {
    RESERVED_PORTS.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Registry of reserved transport identifiers
pub struct PortRegistry;

impl PortRegistry {
    /// Reserve `port` for the caller, failing if another engine holds it
    pub fn reserve(port: &str) -> Result<PortReservation> {
        let mut ports = reserved().lock();
        if !ports.insert(port.to_string()) {
            tracing::warn!("Port {} is already reserved", port);
            return Err(ConnectionError::PortInUse {
                port: port.to_string(),
            }
            .into());
        }
        tracing::debug!("Reserved port {}", port);
        Ok(PortReservation {
            port: port.to_string(),
        })
    }

    /// Check whether `port` is currently reserved
    pub fn is_reserved(port: &str) -> bool {
        reserved().lock().contains(port)
    }
}

/// RAII guard for a reserved transport identifier
#[derive(Debug)]
pub struct PortReservation {
    port: String,
}

impl PortReservation {
    /// The reserved identifier
    pub fn port(&self) -> &str {
        &self.port
    }
}

impl Drop for PortReservation {
    fn drop(&mut self) {
        reserved().lock().remove(&self.port);
        tracing::debug!("Released port {}", self.port);
    }
}
