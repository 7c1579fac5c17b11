#![allow(dead_code)]

use grblkit_communication::{EngineConfig, Transport};
use grblkit_core::{ConnectionError, EngineEvent, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

#[derive(Default)]
struct MockState {
    incoming: VecDeque<Vec<u8>>,
    written: Vec<Vec<u8>>,
    reads: usize,
    closed: bool,
    fail_writes: bool,
    fail_reads: bool,
}

// Mock transport; clones share the same scripted device
#[derive(Clone)]
pub struct MockTransport {
    name: String,
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Queue a chunk for the next read
    pub fn push(&self, data: &str) {
        self.state.lock().unwrap().incoming.push_back(data.as_bytes().to_vec());
    }

    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().written.clone()
    }

    /// Everything written, concatenated as text
    pub fn written_text(&self) -> String {
        let written = self.written();
        String::from_utf8_lossy(&written.concat()).to_string()
    }

    pub fn clear_written(&self) {
        self.state.lock().unwrap().written.clear();
    }

    pub fn reads(&self) -> usize {
        self.state.lock().unwrap().reads
    }

    pub fn close(&self) {
        self.state.lock().unwrap().closed = true;
    }

    pub fn fail_writes(&self) {
        self.state.lock().unwrap().fail_writes = true;
    }

    pub fn fail_reads(&self) {
        self.state.lock().unwrap().fail_reads = true;
    }
}

impl Transport for MockTransport {
    fn read(&mut self) -> Result<Vec<u8>> {
        let mut state = self.state.lock().unwrap();
        state.reads += 1;
        if state.fail_reads {
            return Err(ConnectionError::TransportFailed {
                reason: "read failed".into(),
            }
            .into());
        }
        Ok(state.incoming.pop_front().unwrap_or_default())
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            return Err(ConnectionError::TransportFailed {
                reason: "write failed".into(),
            }
            .into());
        }
        state.written.push(data.to_vec());
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.state.lock().unwrap().closed
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

/// Config with no automatic traffic
pub fn quiet_config() -> EngineConfig {
    EngineConfig {
        status_query_interval_ms: 0,
        startup_commands: Vec::new(),
        ..EngineConfig::default()
    }
}

/// Drain every event received so far
pub fn drain_events(rx: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
