//! Runs a set of supervisors and stops them together.

use crate::supervisor::{Adapter, Supervisor};
use odo_core::{Error, Result};
use odo_network::BusClient;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Final outcome of one adapter.
#[derive(Debug)]
pub struct AdapterExit {
    pub name: String,
    pub result: Result<()>,
}

/// Owns the tasks of every running adapter.
///
/// Each adapter gets a child of the manager's cancellation token, so
/// [`terminate`](AdapterManager::terminate) stops all of them at once.
#[derive(Debug, Default)]
pub struct AdapterManager {
    cancel: CancellationToken,
    tasks: JoinSet<AdapterExit>,
}

impl AdapterManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `supervisor` on its own task.
    pub fn start<A, B>(&mut self, supervisor: Supervisor<A, B>)
    where
        A: Adapter + 'static,
        B: BusClient + 'static,
    {
        let name = supervisor.name().to_string();
        let cancel = self.cancel.child_token();
        info!(adapter = %name, "Starting adapter");

        self.tasks.spawn(async move {
            let result = supervisor.run(cancel).await;
            AdapterExit { name, result }
        });
    }

    /// Number of adapters still running.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Request every adapter to stop.
    pub fn terminate(&self) {
        self.cancel.cancel();
    }

    /// Wait for the next adapter to stop, whatever the reason.
    pub async fn next_exit(&mut self) -> Option<AdapterExit> {
        let joined = self.tasks.join_next().await?;
        Some(joined.unwrap_or_else(|e| AdapterExit {
            name: "unknown".to_string(),
            result: Err(Error::Panic(e.to_string())),
        }))
    }

    /// Wait for every adapter to stop.
    ///
    /// # Errors
    /// Returns the first adapter failure, after all adapters have stopped.
    pub async fn join(mut self) -> Result<()> {
        let mut first = None;

        while let Some(exit) = self.next_exit().await {
            match exit.result {
                Ok(()) => info!(adapter = %exit.name, "Adapter exited"),
                Err(e) => {
                    error!(adapter = %exit.name, error = %e, "Adapter exited with error");
                    first.get_or_insert(e);
                }
            }
        }

        first.map_or(Ok(()), Err)
    }
}
