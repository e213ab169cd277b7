//! # LoRa Tag Data Cache
//!
//! Two-index TTL cache over the most recent uplink per device: the primary
//! index is keyed by DevEui (what the uplink stream knows), the secondary by
//! UWB node id (what the downstream readers ask for), derived through the
//! static device mapping. Both indices hold the same logical record.
//!
//! GPS-bearing records expire on the stricter `gps_ttl`; everything else on
//! `sensor_ttl`. A background sweep deletes expired keys; lookups also apply
//! the TTL so a record is never served past its window between sweeps.

use crate::cache::{DevEui, LoraRecord};
use crate::constants::{DEFAULT_GPS_TTL_SECONDS, DEFAULT_SENSOR_TTL_SECONDS};
use crate::network::config::DevEuiMap;
use crate::util::unix_time;
use crate::uwb::NodeId;
use log::debug;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Statistics for cache monitoring.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct CacheStats {
    /// Uplinks successfully parsed and cached.
    pub messages_cached: u64,
    /// Uplinks dropped because the JSON could not be understood.
    pub parse_errors: u64,
    /// Entries deleted by eviction sweeps.
    pub evictions: u64,
}

#[derive(Debug, Default)]
struct CacheInner {
    by_dev_eui: HashMap<DevEui, LoraRecord>,
    by_node: HashMap<NodeId, LoraRecord>,
    stats: CacheStats,
}

/// Thread-safe cache of the latest LoRa telemetry per device.
///
/// Cloning is cheap and shares the underlying storage; the ingestion task
/// writes while readers copy records out under the lock.
#[derive(Debug, Clone)]
pub struct LoraTagCache {
    inner: Arc<RwLock<CacheInner>>,
    mapping: Arc<DevEuiMap>,
    gps_ttl: f64,
    sensor_ttl: f64,
}

impl LoraTagCache {
    pub fn new(mapping: Arc<DevEuiMap>, gps_ttl: f64, sensor_ttl: f64) -> Self {
        LoraTagCache {
            inner: Arc::new(RwLock::new(CacheInner::default())),
            mapping,
            gps_ttl,
            sensor_ttl,
        }
    }

    pub fn with_default_ttls(mapping: Arc<DevEuiMap>) -> Self {
        Self::new(mapping, DEFAULT_GPS_TTL_SECONDS, DEFAULT_SENSOR_TTL_SECONDS)
    }

    pub fn gps_ttl(&self) -> f64 {
        self.gps_ttl
    }

    /// Insert or overwrite the record in both indices.
    pub fn insert(&self, record: LoraRecord) {
        let node = self.mapping.node_for(record.dev_eui);
        let mut inner = self.inner.write().unwrap();
        inner.stats.messages_cached += 1;
        if let Some(node) = node {
            debug!("Cached data for dev_eui={} -> UWB id={}", record.dev_eui, node);
            inner.by_node.insert(node, record.clone());
        } else {
            debug!("No UWB mapping for dev_eui={}", record.dev_eui);
        }
        inner.by_dev_eui.insert(record.dev_eui, record);
    }

    /// Count an uplink whose JSON could not be parsed.
    pub fn record_parse_error(&self) {
        let mut inner = self.inner.write().unwrap();
        inner.stats.parse_errors += 1;
    }

    /// Look up by UWB node id, TTL-filtered, at the current wall clock.
    pub fn get_by_node(
        &self,
        node: NodeId,
        max_age: Option<f64>,
        check_gps_staleness: bool,
    ) -> Option<LoraRecord> {
        self.get_by_node_at(node, max_age, check_gps_staleness, unix_time())
    }

    /// Look up by UWB node id, TTL-filtered against the given clock.
    pub fn get_by_node_at(
        &self,
        node: NodeId,
        max_age: Option<f64>,
        check_gps_staleness: bool,
        now: f64,
    ) -> Option<LoraRecord> {
        let inner = self.inner.read().unwrap();
        inner
            .by_node
            .get(&node)
            .filter(|record| self.is_fresh(record, now, max_age, check_gps_staleness))
            .cloned()
    }

    /// Look up by DevEui without TTL filtering (diagnostics).
    pub fn get_by_dev_eui(&self, dev_eui: DevEui) -> Option<LoraRecord> {
        let inner = self.inner.read().unwrap();
        inner.by_dev_eui.get(&dev_eui).cloned()
    }

    /// Copy out every node-indexed record still fresh at `now`.
    ///
    /// The materialiser works from this snapshot so no lock is held across
    /// serialisation or publishing.
    pub fn snapshot_at(&self, now: f64) -> HashMap<NodeId, LoraRecord> {
        let inner = self.inner.read().unwrap();
        inner
            .by_node
            .iter()
            .filter(|(_, record)| self.is_fresh(record, now, None, true))
            .map(|(node, record)| (*node, record.clone()))
            .collect()
    }

    /// Snapshot at the current wall clock.
    pub fn snapshot(&self) -> HashMap<NodeId, LoraRecord> {
        self.snapshot_at(unix_time())
    }

    /// Delete expired entries from both indices. Returns how many were removed.
    pub fn evict_expired_at(&self, now: f64) -> usize {
        let mut inner = self.inner.write().unwrap();
        let before = inner.by_dev_eui.len() + inner.by_node.len();

        let gps_ttl = self.gps_ttl;
        let sensor_ttl = self.sensor_ttl;
        let fresh = |record: &LoraRecord| {
            let age = now - record.captured_at;
            !(record.has_gps() && age > gps_ttl) && age <= sensor_ttl
        };
        inner.by_dev_eui.retain(|_, record| fresh(record));
        inner.by_node.retain(|_, record| fresh(record));

        let removed = before - (inner.by_dev_eui.len() + inner.by_node.len());
        inner.stats.evictions += removed as u64;
        if removed > 0 {
            debug!("Evicted {removed} expired cache entries");
        }
        removed
    }

    /// Evict against the current wall clock.
    pub fn evict_expired(&self) -> usize {
        self.evict_expired_at(unix_time())
    }

    /// Entry counts: (dev_eui index, node index).
    pub fn len(&self) -> (usize, usize) {
        let inner = self.inner.read().unwrap();
        (inner.by_dev_eui.len(), inner.by_node.len())
    }

    pub fn is_empty(&self) -> bool {
        let inner = self.inner.read().unwrap();
        inner.by_dev_eui.is_empty() && inner.by_node.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.read().unwrap();
        inner.stats
    }

    fn is_fresh(
        &self,
        record: &LoraRecord,
        now: f64,
        max_age: Option<f64>,
        check_gps_staleness: bool,
    ) -> bool {
        let age = now - record.captured_at;
        if check_gps_staleness && record.has_gps() {
            let gps_max = max_age.unwrap_or(self.gps_ttl);
            if age > gps_max {
                return false;
            }
        }
        let sensor_max = max_age.unwrap_or(self.sensor_ttl);
        age <= sensor_max
    }
}
