use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::client::PulseClient;
use super::registry::UnloadReport;
use super::routing_machine::{RoutingPhase, RoutingStatusHandle};

/// Tears down everything the routing machine created, exactly once.
#[derive(Clone)]
pub struct ShutdownHandler {
    client: PulseClient,
    status: RoutingStatusHandle,
    cancel: CancellationToken,
    fired: Arc<AtomicBool>,
}

impl ShutdownHandler {
    pub fn new(client: PulseClient, status: RoutingStatusHandle) -> Self {
        Self {
            client,
            status,
            cancel: CancellationToken::new(),
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Token cancelled when shutdown starts; long-running tasks select on it.
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Stop the watch task and unload every registered module.
    ///
    /// Only the first call does any work; later calls return `None`.
    pub async fn shutdown(&self) -> Option<UnloadReport> {
        if self.fired.swap(true, Ordering::SeqCst) {
            return None;
        }

        self.status.set(RoutingPhase::ShuttingDown).await;
        self.cancel.cancel();

        let report = self.client.registry().unload_all(&self.client).await;
        if report.failed.is_empty() {
            info!("Removed {} virtual audio module(s)", report.unloaded.len());
        } else {
            warn!(
                "Removed {} virtual audio module(s), {} could not be unloaded: {:?}",
                report.unloaded.len(),
                report.failed.len(),
                report.failed
            );
        }

        self.status.set(RoutingPhase::Terminated).await;
        Some(report)
    }
}
