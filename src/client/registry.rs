use std::collections::HashMap;

use parking_lot::RwLock;

use crate::domain::client::{ClientKind, ClientRecord, ClientStatus};
use crate::domain::job::Job;
use crate::id::ClientId;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("client {0} is already registered")]
    ClientExists(ClientId),
    #[error("client {0} not found")]
    ClientNotFound(ClientId),
    #[error("not enough idle worker clients: need {needed}, have {available}")]
    InsufficientClients { needed: u32, available: u32 },
}

/// Tracks every connected client and arbitrates which worker clients are
/// reserved against a job's `client_requirement` (C3, §4.4).
///
/// Worker and monitor clients share one map; `ClientManagerHello` connections
/// are tracked separately and never count toward a job's requirement (Open
/// Question (c)).
pub struct ClientRegistry {
    clients: RwLock<HashMap<ClientId, ClientRecord>>,
    managers: RwLock<HashMap<String, u32>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            managers: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, record: ClientRecord) -> Result<(), RegistryError> {
        let mut clients = self.clients.write();
        if clients.contains_key(&record.id) {
            return Err(RegistryError::ClientExists(record.id));
        }
        clients.insert(record.id, record);
        Ok(())
    }

    pub fn register_manager(&self, manager_id: String, max_clients: u32) {
        self.managers.write().insert(manager_id, max_clients);
    }

    pub fn spawn_capacity(&self, manager_id: &str) -> Option<u32> {
        self.managers.read().get(manager_id).copied()
    }

    pub fn remove(&self, id: ClientId) -> Result<ClientRecord, RegistryError> {
        self.clients
            .write()
            .remove(&id)
            .ok_or(RegistryError::ClientNotFound(id))
    }

    pub fn touch(&self, id: ClientId) -> Result<(), RegistryError> {
        let mut clients = self.clients.write();
        let record = clients.get_mut(&id).ok_or(RegistryError::ClientNotFound(id))?;
        record.touch();
        Ok(())
    }

    pub fn mark_disconnected(&self, id: ClientId) -> Result<(), RegistryError> {
        let mut clients = self.clients.write();
        let record = clients.get_mut(&id).ok_or(RegistryError::ClientNotFound(id))?;
        record.status = ClientStatus::Disconnected;
        Ok(())
    }

    pub fn available_worker_count(&self) -> u32 {
        self.clients
            .read()
            .values()
            .filter(|c| c.is_assignable())
            .count() as u32
    }

    /// Attempts to reserve `count` idle worker clients atomically: either all
    /// are reserved, or none are, per §4.1's admission/dispatch check. Does
    /// not consider restricted-mode eligibility; callers with a `Job` in hand
    /// should prefer [`Self::try_reserve_for`].
    pub fn try_reserve(&self, count: u32) -> Result<Vec<ClientId>, RegistryError> {
        let mut clients = self.clients.write();
        let candidates: Vec<ClientId> = clients
            .values()
            .filter(|c| c.is_assignable())
            .take(count as usize)
            .map(|c| c.id)
            .collect();
        if candidates.len() < count as usize {
            return Err(RegistryError::InsufficientClients {
                needed: count,
                available: candidates.len() as u32,
            });
        }
        for id in &candidates {
            if let Some(record) = clients.get_mut(id) {
                record.status = ClientStatus::Reserved;
            }
        }
        Ok(candidates)
    }

    /// As [`Self::try_reserve`], but honors restricted-mode eligibility
    /// (§4.4): a restricted client is only a candidate when `job` names it in
    /// `requested_clients`.
    pub fn try_reserve_for(&self, job: &Job) -> Result<Vec<ClientId>, RegistryError> {
        let mut clients = self.clients.write();
        let count = job.client_requirement as usize;
        let candidates: Vec<ClientId> = clients
            .values()
            .filter(|c| c.is_assignable_for(job))
            .take(count)
            .map(|c| c.id)
            .collect();
        if candidates.len() < count {
            let available = clients.values().filter(|c| c.is_assignable_for(job)).count();
            return Err(RegistryError::InsufficientClients { needed: job.client_requirement, available: available as u32 });
        }
        for id in &candidates {
            if let Some(record) = clients.get_mut(id) {
                record.status = ClientStatus::Reserved;
            }
        }
        Ok(candidates)
    }

    /// Best-effort monitor reservation (§4.4): an idle monitor client is
    /// reserved alongside `reserved_workers` only if it supports one of the
    /// job's requested monitor classes and shares a host with at least one
    /// of those workers. Never fails — the job's `report in-progress stats`
    /// stays best-effort regardless of monitor availability.
    pub fn reserve_monitors_for(&self, job: &Job, reserved_workers: &[ClientId]) -> Vec<ClientId> {
        if job.requested_monitor_clients.is_empty() {
            return Vec::new();
        }
        let mut clients = self.clients.write();
        let worker_hosts: Vec<String> = reserved_workers
            .iter()
            .filter_map(|id| clients.get(id).map(|c| c.host().to_string()))
            .collect();
        let mut reserved = Vec::new();
        for id in &job.requested_monitor_clients {
            let eligible = clients.get(id).map(|c| {
                c.kind == ClientKind::Monitor
                    && c.status == ClientStatus::Idle
                    && worker_hosts.iter().any(|h| h == c.host())
            });
            if eligible == Some(true) {
                if let Some(record) = clients.get_mut(id) {
                    record.status = ClientStatus::Reserved;
                }
                reserved.push(*id);
            }
        }
        reserved
    }

    pub fn release(&self, ids: &[ClientId]) {
        let mut clients = self.clients.write();
        for id in ids {
            if let Some(record) = clients.get_mut(id) {
                if record.status == ClientStatus::Reserved {
                    record.status = ClientStatus::Idle;
                }
            }
        }
    }

    pub fn kind_of(&self, id: ClientId) -> Option<ClientKind> {
        self.clients.read().get(&id).map(|c| c.kind)
    }

    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker() -> ClientRecord {
        ClientRecord::new(ClientKind::Worker, "127.0.0.1:9000")
    }

    #[test]
    fn reserve_all_or_nothing() {
        let registry = ClientRegistry::new();
        registry.register(worker()).unwrap();
        let err = registry.try_reserve(2).unwrap_err();
        assert!(matches!(err, RegistryError::InsufficientClients { needed: 2, available: 1 }));
        assert_eq!(registry.available_worker_count(), 1);
    }

    #[test]
    fn reserve_then_release_restores_availability() {
        let registry = ClientRegistry::new();
        let a = worker();
        let b = worker();
        registry.register(a.clone()).unwrap();
        registry.register(b.clone()).unwrap();
        let reserved = registry.try_reserve(2).unwrap();
        assert_eq!(registry.available_worker_count(), 0);
        registry.release(&reserved);
        assert_eq!(registry.available_worker_count(), 2);
    }

    #[test]
    fn duplicate_registration_rejected() {
        let registry = ClientRegistry::new();
        let a = worker();
        registry.register(a.clone()).unwrap();
        assert!(matches!(registry.register(a), Err(RegistryError::ClientExists(_))));
    }

    #[test]
    fn manager_hello_does_not_count_toward_worker_availability() {
        let registry = ClientRegistry::new();
        registry.register_manager("mgr-1".into(), 10);
        assert_eq!(registry.available_worker_count(), 0);
        assert_eq!(registry.spawn_capacity("mgr-1"), Some(10));
    }

    #[test]
    fn restricted_client_ineligible_unless_named_by_job() {
        let registry = ClientRegistry::new();
        let mut restricted = worker();
        restricted.restricted = true;
        let restricted_id = restricted.id;
        registry.register(restricted).unwrap();

        let job = Job::new("probe", 1, Vec::new());
        assert!(registry.try_reserve_for(&job).is_err());

        let mut named_job = Job::new("probe", 1, Vec::new());
        named_job.requested_clients.push(restricted_id);
        let reserved = registry.try_reserve_for(&named_job).unwrap();
        assert_eq!(reserved, vec![restricted_id]);
    }

    #[test]
    fn monitor_reserved_only_when_sharing_host_with_worker() {
        let registry = ClientRegistry::new();
        let on_host = worker();
        let worker_id = on_host.id;
        registry.register(on_host).unwrap();

        let mut monitor = ClientRecord::new(ClientKind::Monitor, "127.0.0.1:9500");
        monitor.monitor_classes = vec!["cpu".into()];
        let monitor_id = monitor.id;
        registry.register(monitor).unwrap();

        let mut off_host_monitor = ClientRecord::new(ClientKind::Monitor, "10.0.0.5:9500");
        off_host_monitor.monitor_classes = vec!["cpu".into()];
        let off_host_id = off_host_monitor.id;
        registry.register(off_host_monitor).unwrap();

        let mut job = Job::new("probe", 1, Vec::new());
        job.requested_monitor_clients = vec![monitor_id, off_host_id];

        let reserved_monitors = registry.reserve_monitors_for(&job, &[worker_id]);
        assert_eq!(reserved_monitors, vec![monitor_id]);
    }
}
