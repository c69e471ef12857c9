// ABOUTME: Background log collection: one follower task per container.
// ABOUTME: Lines are re-emitted through tracing under the `container` target.

use crate::runtime::{LogOptions, LogStream, Runtime};
use crate::types::{ContainerId, Domain};
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Manages one log-following task per tracked container.
pub struct LogCollector {
    tasks: Mutex<HashMap<ContainerId, JoinHandle<()>>>,
}

impl LogCollector {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Start following a container's logs. Replaces any existing follower for
    /// the same id. Best-effort: stream errors end the task with a warning.
    pub fn start(&self, runtime: Arc<dyn Runtime>, id: ContainerId, domain: Domain) {
        let task_id = id.clone();
        let handle = tokio::spawn(async move {
            let opts = LogOptions::follow_all();
            let mut stream = match runtime.container_logs(&task_id, &opts).await {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::warn!(container = %task_id, error = %e, "log follow failed to start");
                    return;
                }
            };

            while let Some(line) = stream.next().await {
                match line {
                    Ok(line) => {
                        let content = line.content.trim_end_matches('\n');
                        match line.stream {
                            LogStream::Stderr => {
                                tracing::warn!(target: "container", domain = %domain, "{content}");
                            }
                            LogStream::Stdout => {
                                tracing::info!(target: "container", domain = %domain, "{content}");
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(container = %task_id, error = %e, "log stream ended");
                        break;
                    }
                }
            }
        });

        if let Some(old) = self.tasks.lock().insert(id, handle) {
            old.abort();
        }
    }

    /// Stop the follower for one container, if any.
    pub fn stop(&self, id: &ContainerId) {
        if let Some(handle) = self.tasks.lock().remove(id) {
            handle.abort();
        }
    }

    /// Stop every follower.
    pub fn stop_all(&self) {
        let mut tasks = self.tasks.lock();
        for (_, handle) in tasks.drain() {
            handle.abort();
        }
    }
}

impl Default for LogCollector {
    fn default() -> Self {
        Self::new()
    }
}
