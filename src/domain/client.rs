use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::job::Job;
use crate::id::ClientId;

/// Kind of connection a registered peer represents. Worker clients run job
/// load; monitors observe without being assignable to a job's client
/// requirement; managers spawn workers but never run jobs themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientKind {
    Worker,
    Monitor,
    Manager,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientStatus {
    Idle,
    Reserved,
    Disconnected,
}

/// One connected peer (§3.4). `restricted` mirrors the wire hello's
/// `restricted_mode` flag: a restricted client only ever runs a job that
/// names it explicitly in `requestedClients` (§4.4). `monitor_classes` is
/// only meaningful for `ClientKind::Monitor` connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRecord {
    pub id: ClientId,
    pub kind: ClientKind,
    pub status: ClientStatus,
    pub address: String,
    #[serde(default)]
    pub version: (u8, u8, u8),
    #[serde(default)]
    pub restricted: bool,
    #[serde(default)]
    pub monitor_classes: Vec<String>,
    pub max_clients: Option<u32>,
    pub connected_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl ClientRecord {
    pub fn new(kind: ClientKind, address: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ClientId::new(),
            kind,
            status: ClientStatus::Idle,
            address: address.into(),
            version: (0, 0, 0),
            restricted: false,
            monitor_classes: Vec::new(),
            max_clients: None,
            connected_at: now,
            last_seen: now,
        }
    }

    pub fn is_assignable(&self) -> bool {
        self.kind == ClientKind::Worker && self.status == ClientStatus::Idle
    }

    /// Eligibility for `job` specifically: idle worker clients qualify
    /// unconditionally unless `restricted`, in which case the job must name
    /// this client explicitly in `requested_clients` (§4.4).
    pub fn is_assignable_for(&self, job: &Job) -> bool {
        self.is_assignable() && (!self.restricted || job.requested_clients.contains(&self.id))
    }

    /// Whether this monitor client can serve a job: it must support at least
    /// one of the job's requested monitor-class identifiers and share a host
    /// with an already-reserved worker client (§4.4 "monitor clients if
    /// available" rule).
    pub fn supports_any_monitor_class(&self, wanted: &[String]) -> bool {
        wanted.iter().any(|w| self.monitor_classes.iter().any(|m| m == w))
    }

    pub fn host(&self) -> &str {
        self.address.rsplit_once(':').map(|(host, _)| host).unwrap_or(&self.address)
    }

    pub fn touch(&mut self) {
        self.last_seen = Utc::now();
    }
}
