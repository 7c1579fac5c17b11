//! Background worker driving an engine
//!
//! The worker task owns the engine, and with it the transport, for the
//! whole session. Other tasks interact only through the [`WorkerHandle`]:
//! queue commands, read shared state, subscribe to events.

use super::command_router::CommandSender;
use super::engine::ControllerEngine;
use super::machine_state::MachineState;
use grblkit_core::{ConnectionState, EngineEvent, Error, Result, ThreadSafeRw};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Spawns the poll loop of a connected engine
pub struct EngineWorker;

impl EngineWorker {
    /// Run `engine.poll()` on a tokio interval until shut down or failed.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(mut engine: ControllerEngine) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let period = engine.config().poll_interval();

        let sender = engine.sender();
        let machine_state = engine.shared_machine_state();
        let connection_state = engine.shared_connection_state();
        let events = engine.events().clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        tracing::debug!("Worker shutdown requested");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = engine.poll() {
                            tracing::error!("Worker stopped: {}", e);
                            break;
                        }
                    }
                }
            }
            engine
        });

        WorkerHandle {
            sender,
            machine_state,
            connection_state,
            events,
            shutdown: Some(shutdown_tx),
            task,
        }
    }
}

/// Handle to a running worker
pub struct WorkerHandle {
    sender: CommandSender,
    machine_state: ThreadSafeRw<MachineState>,
    connection_state: ThreadSafeRw<ConnectionState>,
    events: grblkit_core::EventDispatcher,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<ControllerEngine>,
}

impl WorkerHandle {
    /// Producer handle for the outgoing queues
    pub fn sender(&self) -> CommandSender {
        self.sender.clone()
    }

    /// Snapshot of the machine state
    pub fn machine_state(&self) -> MachineState {
        self.machine_state.read().clone()
    }

    /// Current connection state
    pub fn connection_state(&self) -> ConnectionState {
        *self.connection_state.read()
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Check if the poll loop has exited on its own
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the poll loop between cycles, disconnect and hand back the engine
    pub async fn disconnect(mut self) -> Result<ControllerEngine> {
        if let Some(shutdown) = self.shutdown.take() {
            // The loop may already have exited after a fault
            let _ = shutdown.send(());
        }
        let mut engine = self
            .task
            .await
            .map_err(|e| Error::other(format!("Worker task failed: {}", e)))?;
        engine.disconnect()?;
        Ok(engine)
    }
}
