use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::client::PulseClient;
use super::types::ModuleRecord;

/// Outcome of [`ModuleRegistry::unload_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnloadReport {
    pub unloaded: Vec<u32>,
    pub failed: Vec<u32>,
}

/// Every module this process loaded, in load order.
///
/// Cloning yields another handle to the same list.
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    inner: Arc<Mutex<Vec<ModuleRecord>>>,
}

impl ModuleRegistry {
    pub async fn record(&self, record: ModuleRecord) {
        self.inner.lock().await.push(record);
    }

    pub async fn snapshot(&self) -> Vec<ModuleRecord> {
        self.inner.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    /// Unload every recorded module.
    ///
    /// The list is drained first, so calling this again is a no-op. Failures
    /// are logged and the remaining modules are still unloaded.
    pub async fn unload_all(&self, client: &PulseClient) -> UnloadReport {
        let records = std::mem::take(&mut *self.inner.lock().await);
        let mut report = UnloadReport::default();

        for record in records {
            match client.unload_module(record.index).await {
                Ok(()) => {
                    info!("Unloaded {} (module {})", record.kind, record.index);
                    report.unloaded.push(record.index);
                }
                Err(e) => {
                    warn!("Failed to unload module {}: {}", record.index, e);
                    report.failed.push(record.index);
                }
            }
        }

        report
    }
}
