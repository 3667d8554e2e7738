use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use crate::client::ClientRegistry;
use crate::config::{ConfigHandle, ConfigSubscriber, SchedulerTunables};
use crate::group::JobGroupComposer;
use crate::optimizing::OptimizingController;
use crate::repository::sqlite::SqliteRepository;
use crate::repository::Repository;
use crate::scheduler::SchedulerCore;

/// Owns every shared service and is the single place the binary constructs
/// and tears them down, mirroring `rust-srec`'s `ServiceContainer`.
pub struct ServiceContainer {
    pub repository: Arc<dyn Repository>,
    pub registry: Arc<ClientRegistry>,
    pub scheduler: Arc<SchedulerCore>,
    pub optimizing_controller: Arc<OptimizingController>,
    pub group_composer: Arc<JobGroupComposer>,
    pub config: ConfigHandle,
    scheduler_task: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl ServiceContainer {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        let registry = Arc::new(ClientRegistry::new());
        let (config, subscriber) = ConfigHandle::new(SchedulerTunables::default());
        let scheduler = SchedulerCore::new(repository.clone(), registry.clone(), subscriber);
        let optimizing_controller = OptimizingController::new(repository.clone(), scheduler.clone());
        scheduler.set_optimizing_status(optimizing_controller.clone());
        let group_composer = JobGroupComposer::new(repository.clone(), scheduler.clone(), optimizing_controller.clone());
        Self {
            repository,
            registry,
            scheduler,
            optimizing_controller,
            group_composer,
            config,
            scheduler_task: tokio::sync::Mutex::new(None),
        }
    }

    pub fn config_subscriber(&self) -> ConfigSubscriber {
        self.config.subscribe()
    }

    /// Recovers outstanding jobs from the repository and starts the
    /// scheduler loop on a background task.
    pub async fn initialize(&self) -> anyhow::Result<()> {
        let recovered = self.scheduler.recover().await?;
        info!(recovered, "recovered non-terminal jobs from repository");
        let recovered_optimizing = self.optimizing_controller.recover().await?;
        info!(recovered_optimizing, "recovered non-terminal optimizing jobs from repository");
        let scheduler = self.scheduler.clone();
        let handle = tokio::spawn(async move { scheduler.run().await });
        *self.scheduler_task.lock().await = Some(handle);
        Ok(())
    }

    pub async fn shutdown(&self) {
        self.scheduler.shutdown();
        if let Some(handle) = self.scheduler_task.lock().await.take() {
            let _ = handle.await;
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        std::env::var("LOADGEN_BIND_ADDR")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(|| "0.0.0.0:7420".parse().unwrap())
    }
}
