//! Process-wide connection registry: a single exclusive lock guarding a map
//! from tenant id to the bounded set of its active stream descriptors.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use serde::Serialize;
use uuid::Uuid;

pub const MAX_STREAMS_PER_TENANT: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ConnectionDescriptor {
    pub connection_id: Uuid,
    pub topic_name: String,
}

#[derive(Default)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<Uuid, HashSet<ConnectionDescriptor>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a new stream for `tenant`. Fails if the tenant already holds
    /// `MAX_STREAMS_PER_TENANT` or more active connections.
    pub fn admit(&self, tenant: Uuid, topic_name: &str) -> Option<Uuid> {
        let mut guard = self.connections.lock().expect("connection registry lock poisoned");
        let set = guard.entry(tenant).or_default();
        if set.len() >= MAX_STREAMS_PER_TENANT {
            return None;
        }
        let connection_id = Uuid::new_v4();
        set.insert(ConnectionDescriptor { connection_id, topic_name: topic_name.to_string() });
        Some(connection_id)
    }

    /// Remove a connection. Idempotent; prunes the tenant's entry entirely
    /// once its last descriptor is gone.
    pub fn remove(&self, tenant: Uuid, connection_id: Uuid) {
        let mut guard = self.connections.lock().expect("connection registry lock poisoned");
        if let Some(set) = guard.get_mut(&tenant) {
            set.retain(|d| d.connection_id != connection_id);
            if set.is_empty() {
                guard.remove(&tenant);
            }
        }
    }

    /// A deep-copied snapshot of every active connection, for observability.
    pub fn snapshot(&self) -> HashMap<Uuid, Vec<ConnectionDescriptor>> {
        let guard = self.connections.lock().expect("connection registry lock poisoned");
        guard.iter().map(|(tenant, set)| (*tenant, set.iter().cloned().collect())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_the_limit_then_rejects() {
        let registry = ConnectionRegistry::new();
        let tenant = Uuid::new_v4();
        for _ in 0..MAX_STREAMS_PER_TENANT {
            assert!(registry.admit(tenant, "events").is_some());
        }
        assert!(registry.admit(tenant, "events").is_none());
    }

    #[test]
    fn removing_a_connection_frees_a_slot() {
        let registry = ConnectionRegistry::new();
        let tenant = Uuid::new_v4();
        let ids: Vec<Uuid> = (0..MAX_STREAMS_PER_TENANT)
            .map(|_| registry.admit(tenant, "events").unwrap())
            .collect();
        assert!(registry.admit(tenant, "events").is_none());

        registry.remove(tenant, ids[0]);
        assert!(registry.admit(tenant, "events").is_some());
    }

    #[test]
    fn remove_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let tenant = Uuid::new_v4();
        registry.remove(tenant, Uuid::new_v4());
        let id = registry.admit(tenant, "events").unwrap();
        registry.remove(tenant, id);
        registry.remove(tenant, id);
        assert!(registry.snapshot().get(&tenant).is_none());
    }

    #[test]
    fn snapshot_is_grouped_by_tenant() {
        let registry = ConnectionRegistry::new();
        let tenant_a = Uuid::new_v4();
        let tenant_b = Uuid::new_v4();
        registry.admit(tenant_a, "events").unwrap();
        registry.admit(tenant_b, "clicks").unwrap();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.get(&tenant_a).unwrap().len(), 1);
        assert_eq!(snapshot.get(&tenant_b).unwrap()[0].topic_name, "clicks");
    }
}
