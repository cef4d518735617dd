//! Availability watcher for the management service
//!
//! Probes the service owner at a fixed interval and turns owner changes into
//! [`ServiceEvent`]s. The first probe only records a baseline.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::RemoteService;

/// Change in the service's registration on the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceEvent {
    /// The service appeared
    Registered,
    /// The service went away
    Unregistered,
    /// The service was replaced by a different instance
    OwnerChanged { old: String, new: String },
}

/// Event implied by two consecutive owner observations
pub fn transition(prev: Option<&str>, next: Option<&str>) -> Option<ServiceEvent> {
    match (prev, next) {
        (None, Some(_)) => Some(ServiceEvent::Registered),
        (Some(_), None) => Some(ServiceEvent::Unregistered),
        (Some(old), Some(new)) if old != new => Some(ServiceEvent::OwnerChanged {
            old: old.to_string(),
            new: new.to_string(),
        }),
        _ => None,
    }
}

pub struct ServiceWatcher {
    service: Arc<dyn RemoteService>,
    interval: Duration,
}

impl ServiceWatcher {
    pub fn new(service: Arc<dyn RemoteService>, interval: Duration) -> Self {
        Self { service, interval }
    }

    async fn probe(&self) -> Option<String> {
        let limit = self.interval.max(Duration::from_millis(100));
        match tokio::time::timeout(limit, self.service.owner()).await {
            Ok(Ok(owner)) => owner,
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "Service probe failed");
                None
            }
            Err(_) => {
                tracing::debug!("Service probe timed out");
                None
            }
        }
    }

    /// Start polling in the background
    ///
    /// The loop ends once the receiver is dropped.
    pub fn spawn(self) -> (mpsc::UnboundedReceiver<ServiceEvent>, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();

        let handle = tokio::spawn(async move {
            let mut owner = self.probe().await;
            tracing::debug!(owner = ?owner, "Service watcher started");

            let mut ticker = tokio::time::interval(self.interval);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if tx.is_closed() {
                    break;
                }

                let next = self.probe().await;
                if let Some(event) = transition(owner.as_deref(), next.as_deref()) {
                    tracing::info!(?event, "Service availability changed");
                    if tx.send(event).is_err() {
                        break;
                    }
                }
                owner = next;
            }

            tracing::debug!("Service watcher stopped");
        });

        (rx, handle)
    }
}
