use std::path::PathBuf;
use std::sync::Arc;

use futures::StreamExt;
use tokio::net::TcpListener;
use tokio_util::codec::Framed;
use tracing::{error, info, warn};

use loadgen_scheduler::client::registry::RegistryError;
use loadgen_scheduler::container::ServiceContainer;
use loadgen_scheduler::domain::client::{ClientKind, ClientRecord};
use loadgen_scheduler::logging::init_logging;
use loadgen_scheduler::optimizing::algorithm::score_from_stat_payload;
use loadgen_scheduler::repository::sqlite::{create_pool, SqliteRepository};
use loadgen_scheduler::repository::Repository;
use loadgen_scheduler::scheduler::JobOutcome;
use loadgen_scheduler::wire::{Envelope, EnvelopeCodec, Message};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let log_dir = std::env::var("LOADGEN_LOG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./logs"));
    let _logging = init_logging(&log_dir)?;

    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://loadgen.db".to_string());
    let pool = create_pool(&database_url).await?;
    let repository: Arc<dyn Repository> = Arc::new(SqliteRepository::new(pool));

    let container = Arc::new(ServiceContainer::new(repository));
    container.initialize().await?;

    let bind_addr = container.bind_addr();
    let listener = TcpListener::bind(bind_addr).await?;
    info!(%bind_addr, "listening for client connections");

    let accept_container = container.clone();
    let accept_task = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, peer)) => {
                    let container = accept_container.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(container, socket, peer.to_string()).await {
                            warn!(peer = %peer, error = %e, "client connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                }
            }
        }
    });

    #[cfg(unix)]
    async fn wait_for_sigterm() {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        term.recv().await;
    }

    #[cfg(not(unix))]
    async fn wait_for_sigterm() {
        std::future::pending::<()>().await;
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => { info!("received ctrl-c, shutting down"); }
        _ = wait_for_sigterm() => { info!("received SIGTERM, shutting down"); }
    }

    accept_task.abort();
    container.shutdown().await;
    Ok(())
}

/// Per-connection read loop: the first frame must be a hello identifying the
/// peer as a worker, monitor, or client manager (§4.4); every frame after
/// that updates client liveness or reports a finished job.
async fn handle_connection(
    container: Arc<ServiceContainer>,
    socket: tokio::net::TcpStream,
    peer: String,
) -> anyhow::Result<()> {
    let mut framed = Framed::new(socket, EnvelopeCodec);

    let Some(first) = framed.next().await else {
        return Ok(());
    };
    let first = first?;

    let client_id = match first.message {
        Message::ClientHello { restricted_mode, .. } => {
            let mut record = ClientRecord::new(ClientKind::Worker, peer.clone());
            record.restricted = restricted_mode;
            let id = record.id;
            container.registry.register(record)?;
            Some(id)
        }
        Message::MonitorClientHello { monitor_classes, restricted_mode, .. } => {
            let mut record = ClientRecord::new(ClientKind::Monitor, peer.clone());
            record.restricted = restricted_mode;
            record.monitor_classes = monitor_classes;
            let id = record.id;
            container.registry.register(record)?;
            Some(id)
        }
        Message::ClientManagerHello { client_manager_id, max_clients } => {
            container.registry.register_manager(client_manager_id, max_clients);
            None
        }
        other => {
            warn!(peer = %peer, message = ?other, "connection did not open with a hello message");
            return Ok(());
        }
    };

    while let Some(frame) = framed.next().await {
        let envelope: Envelope = frame?;
        match envelope.message {
            Message::KeepAlive => {
                if let Some(id) = client_id {
                    container.registry.touch(id)?;
                }
            }
            Message::ClientDisconnect { .. } => break,
            Message::JobCompleted { job_id, job_state, stat_tracker_payload, .. } => {
                let Ok(job_id) = job_id.parse() else {
                    warn!(%job_id, "malformed job id in completion report");
                    continue;
                };
                let outcome = if job_state == "Completed" {
                    JobOutcome::Completed { score: score_from_stat_payload(&stat_tracker_payload) }
                } else {
                    JobOutcome::Error
                };
                container.scheduler.handle().job_finished(job_id, outcome).await;
                container.optimizing_controller.on_job_finished(job_id, outcome).await.ok();
            }
            other => {
                warn!(peer = %peer, message = ?other, "unexpected message from client");
            }
        }
    }

    if let Some(id) = client_id {
        if let Err(RegistryError::ClientNotFound(_)) = container.registry.mark_disconnected(id) {
            // already removed, nothing to do
        }
    }
    Ok(())
}
