// ABOUTME: Embedded event bus: event types, publisher seam, ordered dispatch.
// ABOUTME: One task per handled event; delivery order follows publish order.

use crate::manager::DeployError;
use crate::routes::RouteStoreError;
use crate::types::{ContainerId, Domain};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Everything that flows over the bus.
#[derive(Debug, Clone)]
pub enum Event {
    /// The embedded registry accepted a manifest upload.
    ImagePushed {
        name: String,
        reference: String,
        manifest: Bytes,
    },
    /// The configuration store reloaded its file.
    ConfigReload,
    /// An operator asked for a reconcile without restarts.
    ManualReload,
    /// An operator asked for a deploy of one domain.
    ManualDeploy { domain: Domain },
    /// A deploy completed; consumed by external listeners, not by handlers here.
    ContainerDeployed {
        container_id: ContainerId,
        domain: Domain,
        at: DateTime<Utc>,
    },
}

/// Discriminant used by `EventHandler::can_handle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    ImagePushed,
    ConfigReload,
    ManualReload,
    ManualDeploy,
    ContainerDeployed,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::ImagePushed { .. } => EventKind::ImagePushed,
            Event::ConfigReload => EventKind::ConfigReload,
            Event::ManualReload => EventKind::ManualReload,
            Event::ManualDeploy { .. } => EventKind::ManualDeploy,
            Event::ContainerDeployed { .. } => EventKind::ContainerDeployed,
        }
    }
}

#[derive(Debug, Error)]
pub enum EventError {
    #[error("event bus closed")]
    Closed,
}

/// Errors surfaced by event handlers to the bus (logged) or to callers.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Deploy(#[from] DeployError),

    #[error("route store error: {0}")]
    Routes(#[from] RouteStoreError),

    #[error("auto-route failed: {0}")]
    AutoRoute(String),

    #[error("{failed} of {total} deploys failed")]
    Partial { failed: usize, total: usize },
}

/// Publishes events onto the bus. The deploy pipeline uses this seam for
/// `ContainerDeployed` so tests can observe emissions without a bus.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: Event) -> Result<(), EventError>;
}

/// A subscriber reacting to one or more event kinds.
#[async_trait]
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &'static str;

    fn can_handle(&self, kind: EventKind) -> bool;

    async fn handle(&self, event: Event, cancel: CancellationToken) -> Result<(), HandlerError>;
}

/// In-process event bus.
///
/// Events are queued in publish order and dispatched from a single loop; each
/// event gets its own task, so handling may overlap across events but a single
/// event's handlers run sequentially.
pub struct EventBus {
    tx: mpsc::UnboundedSender<Event>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<Event>>>,
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
    cancel: CancellationToken,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
            handlers: RwLock::new(Vec::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Register a handler. Handlers registered after `start` still receive
    /// subsequent events.
    pub fn register(&self, handler: Arc<dyn EventHandler>) {
        self.handlers.write().push(handler);
    }

    pub fn send(&self, event: Event) -> Result<(), EventError> {
        self.tx.send(event).map_err(|_| EventError::Closed)
    }

    /// Start the dispatch loop. Panics if called twice.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let mut rx = self
            .rx
            .lock()
            .take()
            .expect("event bus dispatch loop already started");
        let bus = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = bus.cancel.cancelled() => break,
                    event = rx.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };

                let handlers: Vec<Arc<dyn EventHandler>> = bus
                    .handlers
                    .read()
                    .iter()
                    .filter(|h| h.can_handle(event.kind()))
                    .cloned()
                    .collect();

                if handlers.is_empty() {
                    continue;
                }

                let cancel = bus.cancel.child_token();
                tokio::spawn(async move {
                    for handler in handlers {
                        if let Err(e) = handler.handle(event.clone(), cancel.clone()).await {
                            tracing::warn!(
                                handler = handler.name(),
                                error = %e,
                                "event handler failed"
                            );
                        }
                    }
                });
            }
        })
    }

    /// Stop the dispatch loop and cancel in-flight handlers.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for EventBus {
    async fn publish(&self, event: Event) -> Result<(), EventError> {
        self.send(event)
    }
}
