use std::collections::HashMap;
use std::hash::Hash;
use std::sync::RwLock;

use propcrm_core::OrganizationId;
use std::sync::Arc;

/// Organization-isolated key/value store for disposable read models.
pub trait OrganizationStore<K, V>: Send + Sync {
    fn get(&self, organization_id: OrganizationId, key: &K) -> Option<V>;
    fn upsert(&self, organization_id: OrganizationId, key: K, value: V);
    fn list(&self, organization_id: OrganizationId) -> Vec<V>;
    /// Clear all records of an organization (rebuild support).
    fn clear_organization(&self, organization_id: OrganizationId);
}

impl<K, V, S> OrganizationStore<K, V> for Arc<S>
where
    S: OrganizationStore<K, V> + ?Sized,
{
    fn get(&self, organization_id: OrganizationId, key: &K) -> Option<V> {
        (**self).get(organization_id, key)
    }

    fn upsert(&self, organization_id: OrganizationId, key: K, value: V) {
        (**self).upsert(organization_id, key, value)
    }

    fn list(&self, organization_id: OrganizationId) -> Vec<V> {
        (**self).list(organization_id)
    }

    fn clear_organization(&self, organization_id: OrganizationId) {
        (**self).clear_organization(organization_id)
    }
}

#[derive(Debug)]
pub struct InMemoryOrganizationStore<K, V> {
    inner: RwLock<HashMap<(OrganizationId, K), V>>,
}

impl<K, V> InMemoryOrganizationStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryOrganizationStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> OrganizationStore<K, V> for InMemoryOrganizationStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, organization_id: OrganizationId, key: &K) -> Option<V> {
        let map = self.inner.read().ok()?;
        map.get(&(organization_id, key.clone())).cloned()
    }

    fn upsert(&self, organization_id: OrganizationId, key: K, value: V) {
        if let Ok(mut map) = self.inner.write() {
            map.insert((organization_id, key), value);
        }
    }

    fn list(&self, organization_id: OrganizationId) -> Vec<V> {
        let Ok(map) = self.inner.read() else {
            return vec![];
        };

        map.iter()
            .filter(|((org, _), _)| *org == organization_id)
            .map(|(_, v)| v.clone())
            .collect()
    }

    fn clear_organization(&self, organization_id: OrganizationId) {
        if let Ok(mut map) = self.inner.write() {
            map.retain(|(org, _), _| *org != organization_id);
        }
    }
}
