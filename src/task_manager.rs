//! Manages the lifecycle of the service's background tasks.
use futures::future::join_all;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Keeps track of spawned tasks so shutdown can wait for all of them.
///
/// Every task is expected to watch the shared shutdown receiver and return
/// once it changes.
#[derive(Clone, Debug)]
pub struct TaskManager {
    handles: Arc<Mutex<Vec<(&'static str, JoinHandle<()>)>>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl TaskManager {
    pub fn new(shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            handles: Arc::new(Mutex::new(Vec::new())),
            shutdown_rx,
        }
    }

    /// Spawns a named task and keeps its handle.
    pub fn spawn<F>(&self, name: &'static str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        debug!(task_name = name, "Spawning task");
        let handle = tokio::spawn(future);
        match self.handles.lock() {
            Ok(mut handles) => handles.push((name, handle)),
            Err(poisoned) => poisoned.into_inner().push((name, handle)),
        }
    }

    pub fn get_shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Waits for every managed task and returns the names of those that panicked.
    pub async fn shutdown(self) -> Vec<&'static str> {
        let handles: Vec<_> = match self.handles.lock() {
            Ok(mut handles) => handles.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        };
        info!("Waiting for {} tasks to complete...", handles.len());

        let (names, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        let results = join_all(handles).await;

        let panicked: Vec<&'static str> = names
            .into_iter()
            .zip(results)
            .filter_map(|(name, result)| match result {
                Ok(()) => {
                    debug!(task_name = name, "Task shut down gracefully.");
                    None
                }
                Err(e) => {
                    error!(task_name = name, error = %e, "Task failed during shutdown.");
                    Some(name)
                }
            })
            .collect();

        if panicked.is_empty() {
            info!("All tasks shut down gracefully.");
        }
        panicked
    }
}
