//! TTL-backed node registry
//!
//! Maps node ids to [`NodeRecord`]s with a heartbeat window: a record stays
//! visible for `ttl` after the last add or refresh, then silently expires.
//! There is no background sweeper; expired state is reclaimed lazily by
//! [`NodeRegistry::list`].

use std::time::Duration;

use dashmap::{DashMap, DashSet};
use tokio::time::Instant;

use crate::types::{NodeId, NodeRecord};

/// Default heartbeat window for registered nodes
pub const DEFAULT_NODE_TTL: Duration = Duration::from_secs(180);

struct Entry {
    record: NodeRecord,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at <= Instant::now()
    }
}

/// Concurrent store of live nodes, keyed by node id
///
/// The id index and the payload map are written separately, in that order of
/// payload-then-index on add and index-then-payload on remove. An index
/// entry without a payload (interrupted add, expired record) is an expected
/// state; `list` prunes it the next time it is seen, and nothing else ever
/// corrects it.
///
/// All operations are key-scoped; concurrent lifecycles of different nodes
/// never contend beyond the maps' own sharding.
pub struct NodeRegistry {
    ttl: Duration,
    ids: DashSet<NodeId>,
    entries: DashMap<NodeId, Entry>,
}

impl NodeRegistry {
    /// Create a registry whose records expire `ttl` after add or refresh
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            ids: DashSet::new(),
            entries: DashMap::new(),
        }
    }

    /// Store a record under its id and mark the id known
    ///
    /// Re-adding an id overwrites the payload and restarts its TTL
    /// (last writer wins).
    pub fn add(&self, record: NodeRecord) {
        let id = record.id.clone();
        self.entries.insert(
            id.clone(),
            Entry {
                record,
                expires_at: Instant::now() + self.ttl,
            },
        );
        self.ids.insert(id);
    }

    /// Remove a node; removing an absent id is a silent success
    pub fn remove(&self, id: &NodeId) {
        self.ids.remove(id);
        self.entries.remove(id);
    }

    /// Fetch a record if it has not expired
    ///
    /// Never touches the id index.
    pub fn get(&self, id: &NodeId) -> Option<NodeRecord> {
        let entry = self.entries.get(id)?;
        if entry.is_expired() {
            return None;
        }
        Some(entry.record.clone())
    }

    /// Whether a live (unexpired) payload exists for this id
    pub fn exists(&self, id: &NodeId) -> bool {
        self.entries
            .get(id)
            .map(|entry| !entry.is_expired())
            .unwrap_or(false)
    }

    /// Restart the TTL clock for a live record
    ///
    /// Returns `false` when the id was never added, was removed, or has
    /// already expired; callers should surface that as "not found".
    pub fn refresh_ttl(&self, id: &NodeId) -> bool {
        let Some(mut entry) = self.entries.get_mut(id) else {
            return false;
        };
        if entry.is_expired() {
            return false;
        }
        entry.expires_at = Instant::now() + self.ttl;
        true
    }

    /// All live records
    ///
    /// Ids whose payload is gone (expired, or an add that never completed)
    /// are dropped from the index as a side effect.
    pub fn list(&self) -> Vec<NodeRecord> {
        let mut live = Vec::new();
        let mut stale = Vec::new();

        for id in self.ids.iter() {
            match self.get(id.key()) {
                Some(record) => live.push(record),
                None => stale.push(id.key().clone()),
            }
        }

        for id in stale {
            self.ids.remove(&id);
            self.entries.remove(&id);
        }

        live
    }

    /// Number of ids currently indexed, live or not
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the index is empty
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_NODE_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> NodeRecord {
        NodeRecord {
            id: NodeId::new(id),
            name: id.to_string(),
            url: format!("http://{id}.internal:8080"),
            started_at: "2026-02-16T00:00:00Z".to_string(),
            os: "linux".to_string(),
            arch: "x86_64".to_string(),
            daemon_version: "0.1.0".to_string(),
            machine_name: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_returns_record_until_ttl_elapses() {
        let registry = NodeRegistry::new(Duration::from_secs(180));
        registry.add(record("n1"));

        let id = NodeId::new("n1");
        assert!(registry.get(&id).is_some());

        tokio::time::advance(Duration::from_secs(179)).await;
        assert!(registry.get(&id).is_some());
        assert!(registry.exists(&id));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(registry.get(&id).is_none());
        assert!(!registry.exists(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_ttl_extends_visibility() {
        let registry = NodeRegistry::new(Duration::from_secs(180));
        registry.add(record("n1"));
        let id = NodeId::new("n1");

        tokio::time::advance(Duration::from_secs(170)).await;
        assert!(registry.refresh_ttl(&id));

        // Past the original expiry, still within the refreshed window.
        tokio::time::advance(Duration::from_secs(170)).await;
        assert!(registry.get(&id).is_some());

        tokio::time::advance(Duration::from_secs(20)).await;
        assert!(registry.get(&id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_ttl_false_for_missing_removed_or_expired() {
        let registry = NodeRegistry::new(Duration::from_secs(60));
        let id = NodeId::new("n1");

        assert!(!registry.refresh_ttl(&id));

        registry.add(record("n1"));
        registry.remove(&id);
        assert!(!registry.refresh_ttl(&id));

        registry.add(record("n1"));
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(!registry.refresh_ttl(&id));
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let registry = NodeRegistry::default();
        let id = NodeId::new("never-added");
        registry.remove(&id);
        registry.remove(&id);
        assert!(registry.get(&id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_omits_expired_and_prunes_index() {
        let registry = NodeRegistry::new(Duration::from_secs(60));
        registry.add(record("old"));

        tokio::time::advance(Duration::from_secs(61)).await;
        registry.add(record("fresh"));

        let listed = registry.list();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id.as_str(), "fresh");

        // The stale id was reclaimed from the index by the listing.
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_list_prunes_dangling_index_entry() {
        let registry = NodeRegistry::default();

        // An add interrupted between its two writes leaves an indexed id
        // with no payload.
        registry.ids.insert(NodeId::new("ghost"));
        registry.add(record("real"));

        let listed = registry.list();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id.as_str(), "real");
        assert_eq!(registry.len(), 1);

        assert_eq!(registry.list().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reregistration_overwrites_payload_and_restarts_ttl() {
        let registry = NodeRegistry::new(Duration::from_secs(60));
        registry.add(record("n1"));

        tokio::time::advance(Duration::from_secs(50)).await;
        let mut updated = record("n1");
        updated.url = "http://10.0.0.9:8080".to_string();
        registry.add(updated);

        tokio::time::advance(Duration::from_secs(50)).await;
        let got = registry.get(&NodeId::new("n1")).expect("still live");
        assert_eq!(got.url, "http://10.0.0.9:8080");
        assert_eq!(registry.list().len(), 1);
    }
}
