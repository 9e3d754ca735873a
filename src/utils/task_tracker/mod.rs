//! Registry of detached background tasks.
//!
//! Revocation timers are spawned through here. On shutdown they are told to
//! fire early and given a grace period before anything left is aborted.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct TaskTracker {
    tasks: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
    shutdown: watch::Sender<bool>,
}

impl TaskTracker {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            tasks: Arc::new(Mutex::new(HashMap::new())),
            shutdown,
        }
    }

    /// Resolves once [`shutdown`](Self::shutdown) starts. Never resolves if
    /// the tracker is dropped first.
    pub fn shutdown_requested(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.shutdown.subscribe();
        async move {
            if rx.wait_for(|stopping| *stopping).await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Spawn a tracked task under a fresh `<prefix>-<uuid>` name that removes
    /// itself on completion. Returns the generated name.
    pub async fn spawn_detached<F>(&self, prefix: &str, future: F) -> String
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let name = format!("{}-{}", prefix, uuid::Uuid::new_v4());
        let tasks = self.tasks.clone();
        let name_clone = name.clone();

        // The lock is held across spawn + insert: a task that finishes instantly
        // must find its own entry when it tries to remove it.
        let mut tasks_guard = self.tasks.lock().await;
        let handle = tokio::spawn(async move {
            future.await;
            tasks.lock().await.remove(&name_clone);
            debug!("Task '{}' completed and removed from tracker", name_clone);
        });
        tasks_guard.insert(name.clone(), handle);
        name
    }

    /// Number of tasks still pending.
    pub async fn pending(&self) -> usize {
        self.tasks.lock().await.len()
    }

    /// Signal shutdown and wait up to `grace` for tracked tasks to finish.
    /// Whatever is still running afterwards is aborted.
    pub async fn shutdown(&self, grace: Duration) {
        self.shutdown.send_replace(true);
        let mut tasks: Vec<(String, JoinHandle<()>)> = {
            let mut guard = self.tasks.lock().await;
            guard.drain().collect()
        };
        if tasks.is_empty() {
            return;
        }
        info!("Waiting for {} tracked tasks to finish", tasks.len());

        let drained = tokio::time::timeout(grace, async {
            for (_, handle) in tasks.iter_mut() {
                let _ = handle.await;
            }
        })
        .await;
        if drained.is_ok() {
            return;
        }
        for (name, handle) in tasks {
            if !handle.is_finished() {
                handle.abort();
                warn!("Aborted task '{}' after {}s shutdown grace", name, grace.as_secs());
            }
        }
    }
}

impl Default for TaskTracker {
    fn default() -> Self {
        Self::new()
    }
}
