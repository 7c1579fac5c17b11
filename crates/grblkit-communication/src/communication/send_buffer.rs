//! Flow control for the device receive buffer
//!
//! Implements the GRBL character-counting streaming protocol: the host tracks
//! the byte length of every command written to the device and only writes a
//! new one when it fits in what remains of the receive buffer. Each `ok` or
//! `error:` acknowledgment frees the oldest entry, since GRBL completes
//! commands in the order they were sent.
//!
//! # Features
//! - Capacity-checked admission
//! - Strict FIFO acknowledgment with desync detection
//! - Slow commands that must run alone (settings queries, homing)
//! - OK/ERROR counters

use grblkit_core::{AckKind, ProtocolError, Result};
use std::collections::VecDeque;

/// Default GRBL receive buffer size in bytes
pub const DEFAULT_RX_BUFFER_CAPACITY: usize = 128;

/// A command written to the device and awaiting acknowledgment
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCommand<A> {
    /// Bytes it occupies in the device buffer, terminator included
    pub byte_length: usize,
    /// Caller bookkeeping token returned on acknowledgment
    pub action: A,
    /// Must drain alone before anything else is admitted
    pub slow: bool,
}

/// Bookkeeping of the device's finite receive capacity
#[derive(Debug)]
pub struct SendBuffer<A = String> {
    /// Device receive buffer size in bytes
    capacity: usize,
    /// Commands awaiting acknowledgment, oldest first
    pending: VecDeque<PendingCommand<A>>,
    /// Sum of `byte_length` over `pending`
    pending_bytes: usize,
    ok_count: u64,
    error_count: u64,
}

impl<A> SendBuffer<A> {
    /// Create a buffer for a device with `capacity` bytes of receive space
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            pending: VecDeque::new(),
            pending_bytes: 0,
            ok_count: 0,
            error_count: 0,
        }
    }

    /// Admit an ordinary command of `length` bytes if it fits.
    ///
    /// Returns `false` when the caller must not write to the transport yet.
    pub fn try_admit(&mut self, length: usize, action: A) -> bool {
        self.admit(length, action, false)
    }

    /// Admit a slow command; it only goes out once everything pending has
    /// been acknowledged, and nothing follows it until it is acknowledged.
    pub fn try_admit_slow(&mut self, length: usize, action: A) -> bool {
        self.admit(length, action, true)
    }

    fn admit(&mut self, length: usize, action: A, slow: bool) -> bool {
        if length == 0 {
            tracing::debug!("Refusing zero-length command");
            return false;
        }

        if self.pending.iter().any(|p| p.slow) {
            tracing::trace!("Admission deferred: slow command outstanding");
            return false;
        }

        if slow && !self.pending.is_empty() {
            tracing::trace!(
                "Slow command deferred until {} pending commands drain",
                self.pending.len()
            );
            return false;
        }

        if self.pending_bytes + length > self.capacity {
            tracing::trace!(
                "Admission deferred: {} + {} > {}",
                self.pending_bytes,
                length,
                self.capacity
            );
            return false;
        }

        self.pending_bytes += length;
        self.pending.push_back(PendingCommand {
            byte_length: length,
            action,
            slow,
        });
        true
    }

    /// Consume the oldest pending command and return its action.
    ///
    /// An acknowledgment with nothing pending means the host has lost track
    /// of the device and is reported as a protocol violation.
    pub fn acknowledge(&mut self, kind: AckKind) -> Result<A> {
        let Some(command) = self.pending.pop_front() else {
            return Err(ProtocolError::ProtocolViolation {
                reason: format!("'{}' received with no command pending", kind),
            }
            .into());
        };

        self.pending_bytes = self.pending_bytes.saturating_sub(command.byte_length);
        match kind {
            AckKind::Ok => self.ok_count += 1,
            AckKind::Error => self.error_count += 1,
        }

        Ok(command.action)
    }

    /// Drop all pending entries without expecting acknowledgments.
    ///
    /// Returns how many were discarded.
    pub fn clear(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        self.pending_bytes = 0;
        dropped
    }

    /// Reset the OK/ERROR counters
    pub fn reset_counters(&mut self) {
        self.ok_count = 0;
        self.error_count = 0;
    }

    /// Device receive buffer size in bytes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently awaiting acknowledgment
    pub fn pending_bytes(&self) -> usize {
        self.pending_bytes
    }

    /// Bytes still free in the device buffer
    pub fn available(&self) -> usize {
        self.capacity.saturating_sub(self.pending_bytes)
    }

    /// Number of commands awaiting acknowledgment
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Check if nothing is awaiting acknowledgment
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Iterate pending commands, oldest first
    pub fn pending(&self) -> impl Iterator<Item = &PendingCommand<A>> {
        self.pending.iter()
    }

    /// Total `ok` acknowledgments
    pub fn ok_count(&self) -> u64 {
        self.ok_count
    }

    /// Total `error:` acknowledgments
    pub fn error_count(&self) -> u64 {
        self.error_count
    }

    /// Get the current buffer usage as a percentage
    pub fn usage_percent(&self) -> u32 {
        if self.capacity == 0 {
            return 0;
        }

        ((self.pending_bytes as f64 / self.capacity as f64) * 100.0) as u32
    }
}

impl<A> Default for SendBuffer<A> {
    fn default() -> Self {
        Self::new(DEFAULT_RX_BUFFER_CAPACITY)
    }
}
