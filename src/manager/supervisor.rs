// ABOUTME: Supervision loop: restart crashed containers with crash-loop backoff.
// ABOUTME: Unhealthy running containers are restarted; exit code 0 never is.

use crate::config::SupervisorSettings;
use crate::manager::{Container, ContainerManager};
use crate::runtime::HealthState;
use crate::types::Domain;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

const RESTART_TIMEOUT: Duration = Duration::from_secs(10);
const BASE_BACKOFF: Duration = Duration::from_secs(60);
/// 2^4 minutes is already past the cap; saturating here keeps the shift sane.
const MAX_BACKOFF_SHIFT: u32 = 4;

/// Per-domain crash bookkeeping.
#[derive(Debug, Default)]
struct RestartRecord {
    /// Crash timestamps inside the crash-loop window.
    attempts: Vec<Instant>,
    /// Monotonic consecutive crash count; drives the backoff exponent.
    consecutive: u32,
    backoff_until: Option<Instant>,
    /// First moment the container was observed running since the last crash.
    last_seen: Option<Instant>,
}

/// Periodically inspects tracked containers and restarts the ones that
/// crashed, subject to crash-loop backoff.
pub struct Supervisor {
    manager: Arc<ContainerManager>,
    settings: SupervisorSettings,
    records: Mutex<HashMap<Domain, RestartRecord>>,
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Supervisor {
    pub fn new(manager: Arc<ContainerManager>, settings: SupervisorSettings) -> Arc<Self> {
        Arc::new(Self {
            manager,
            settings,
            records: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
            handle: Mutex::new(None),
        })
    }

    /// Start the tick loop as a single long-lived task.
    pub fn start(self: &Arc<Self>) {
        let supervisor = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(supervisor.settings.tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = supervisor.cancel.cancelled() => break,
                    _ = interval.tick() => supervisor.check_once().await,
                }
            }
            tracing::debug!("supervisor loop exited");
        });
        *self.handle.lock() = Some(handle);
    }

    /// Signal termination and wait for the loop to exit.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// One inspection pass over the tracked containers. Public so tests can
    /// drive ticks deterministically under paused time.
    pub async fn check_once(&self) {
        let tracked = self.manager.tracked();
        for (domain, container) in tracked {
            self.check_container(&domain, &container).await;
        }
    }

    /// Whether a domain is currently inside its crash-loop backoff.
    pub fn is_backing_off(&self, domain: &Domain) -> bool {
        self.backoff_deadline(domain)
            .is_some_and(|until| Instant::now() < until)
    }

    /// The end of the domain's current backoff, if one is set.
    pub fn backoff_deadline(&self, domain: &Domain) -> Option<Instant> {
        self.records
            .lock()
            .get(domain)
            .and_then(|rec| rec.backoff_until)
    }

    async fn check_container(&self, domain: &Domain, tracked: &Container) {
        let info = match self.manager.runtime.inspect_container(&tracked.id).await {
            Ok(info) => info,
            Err(e) => {
                // The container may have just been replaced by a deploy.
                tracing::debug!(domain = %domain, error = %e, "inspect failed, skipping");
                return;
            }
        };

        if info.state.is_running() {
            self.check_running(domain, tracked).await;
            return;
        }

        if !info.state.is_exited() {
            return;
        }

        match info.exit_code.unwrap_or(0) {
            0 => {} // graceful exit, never restarted
            code => self.handle_crash(domain, tracked, code).await,
        }
    }

    async fn check_running(&self, domain: &Domain, tracked: &Container) {
        match self.manager.runtime.container_health(&tracked.id).await {
            Ok(health) if health.has_check && health.state == HealthState::Unhealthy => {
                tracing::warn!(domain = %domain, container = %tracked.id, "container unhealthy, restarting");
                if let Err(e) = self
                    .manager
                    .runtime
                    .restart_container(&tracked.id, RESTART_TIMEOUT)
                    .await
                {
                    tracing::warn!(domain = %domain, error = %e, "unhealthy restart failed");
                }
                return;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(domain = %domain, error = %e, "health probe failed");
            }
        }

        let now = Instant::now();
        let mut records = self.records.lock();
        let recovered = match records.get_mut(domain) {
            Some(record) => match record.last_seen {
                None => {
                    record.last_seen = Some(now);
                    false
                }
                Some(seen) => {
                    now.duration_since(seen) >= self.settings.stable_running_duration
                }
            },
            None => return,
        };
        if recovered {
            tracing::info!(domain = %domain, "container stable, clearing restart record");
            records.remove(domain);
        }
    }

    async fn handle_crash(&self, domain: &Domain, tracked: &Container, exit_code: i64) {
        let now = Instant::now();

        let should_restart = {
            let mut records = self.records.lock();
            let record = records.entry(domain.clone()).or_default();

            if let Some(until) = record.backoff_until
                && now < until
            {
                return;
            }

            record.attempts.push(now);
            record.consecutive += 1;
            record.last_seen = None;
            let window = self.settings.crash_loop_window;
            record.attempts.retain(|t| now.duration_since(*t) <= window);

            if record.attempts.len() >= self.settings.crash_loop_threshold {
                let shift = record
                    .consecutive
                    .saturating_sub(self.settings.crash_loop_threshold as u32)
                    .min(MAX_BACKOFF_SHIFT);
                let backoff = (BASE_BACKOFF * 2u32.pow(shift)).min(self.settings.backoff_cap);
                record.backoff_until = Some(now + backoff);
                tracing::warn!(
                    domain = %domain,
                    crashes = record.attempts.len(),
                    backoff_secs = backoff.as_secs(),
                    "crash loop detected, backing off"
                );
                false
            } else {
                true
            }
        };

        if !should_restart {
            return;
        }

        // A deploy may have replaced the container since the snapshot; a fresh
        // one is live then and must not be touched.
        match self.manager.get(domain) {
            Some(current) if current.id == tracked.id => {}
            _ => return,
        }

        tracing::info!(domain = %domain, container = %tracked.id, exit_code, "restarting crashed container");
        if let Err(e) = self.manager.runtime.start_container(&tracked.id).await {
            tracing::warn!(domain = %domain, error = %e, "crash restart failed");
        }
    }
}
