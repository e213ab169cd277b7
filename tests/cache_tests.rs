//! Integration tests for the LoRa tag cache: dual indices, TTL semantics
//! and eviction sweeps.

use std::sync::Arc;
use uwb_bridge_rs::cache::{DecodedTelemetry, DevEui, LoraLocation, LoraRecord, UplinkMeta};
use uwb_bridge_rs::network::DevEuiMap;
use uwb_bridge_rs::uwb::NodeId;
use uwb_bridge_rs::LoraTagCache;

const GPS_TTL: f64 = 300.0;
const SENSOR_TTL: f64 = 600.0;

fn eui(value: u64) -> DevEui {
    DevEui(value)
}

fn record(dev_eui: DevEui, captured_at: f64, with_gps: bool) -> LoraRecord {
    LoraRecord {
        dev_eui,
        captured_at,
        received_at: None,
        decoded: DecodedTelemetry {
            battery: Some(85.0),
            ..DecodedTelemetry::default()
        },
        location: with_gps.then(|| LoraLocation {
            latitude: 51.5238,
            longitude: -0.7514,
            altitude: Some(50.8),
            accuracy: Some(5.0),
            source: "frm-payload".to_string(),
        }),
        meta: UplinkMeta::default(),
        gateways: Vec::new(),
    }
}

fn cache_with_mapping() -> LoraTagCache {
    let mapping = DevEuiMap::from_pairs([(eui(0xF4CE366381C3C7BD), NodeId(0xB98A))]);
    LoraTagCache::new(Arc::new(mapping), GPS_TTL, SENSOR_TTL)
}

/// A mapped record lands in both indices with equal contents.
#[test]
fn test_insert_populates_both_indices() {
    let cache = cache_with_mapping();
    cache.insert(record(eui(0xF4CE366381C3C7BD), 1000.0, true));

    assert_eq!(cache.len(), (1, 1));
    let by_node = cache
        .get_by_node_at(NodeId(0xB98A), None, true, 1001.0)
        .unwrap();
    let by_eui = cache.get_by_dev_eui(eui(0xF4CE366381C3C7BD)).unwrap();
    assert_eq!(by_node, by_eui);
}

/// Unmapped devices only appear in the DevEui index.
#[test]
fn test_unmapped_device_has_no_node_entry() {
    let cache = cache_with_mapping();
    cache.insert(record(eui(0xDEAD), 1000.0, false));
    assert_eq!(cache.len(), (1, 0));
    assert!(cache.get_by_dev_eui(eui(0xDEAD)).is_some());
}

/// GPS-bearing records obey the GPS TTL exactly at the boundary.
#[test]
fn test_gps_ttl_boundary() {
    let cache = cache_with_mapping();
    cache.insert(record(eui(0xF4CE366381C3C7BD), 1000.0, true));

    let node = NodeId(0xB98A);
    let just_inside = 1000.0 + GPS_TTL - 0.001;
    let just_outside = 1000.0 + GPS_TTL + 0.001;
    assert!(cache.get_by_node_at(node, None, true, just_inside).is_some());
    assert!(cache.get_by_node_at(node, None, true, just_outside).is_none());

    // Skipping the GPS staleness check falls back to the sensor TTL.
    assert!(cache.get_by_node_at(node, None, false, just_outside).is_some());
    assert!(cache
        .get_by_node_at(node, None, false, 1000.0 + SENSOR_TTL + 0.001)
        .is_none());
}

/// Sensor-only records live until the sensor TTL.
#[test]
fn test_sensor_ttl_boundary() {
    let cache = cache_with_mapping();
    cache.insert(record(eui(0xF4CE366381C3C7BD), 1000.0, false));

    let node = NodeId(0xB98A);
    assert!(cache
        .get_by_node_at(node, None, true, 1000.0 + SENSOR_TTL - 0.001)
        .is_some());
    assert!(cache
        .get_by_node_at(node, None, true, 1000.0 + SENSOR_TTL + 0.001)
        .is_none());
}

/// An explicit max-age override replaces the configured TTLs.
#[test]
fn test_max_age_override() {
    let cache = cache_with_mapping();
    cache.insert(record(eui(0xF4CE366381C3C7BD), 1000.0, true));

    let node = NodeId(0xB98A);
    assert!(cache
        .get_by_node_at(node, Some(10.0), true, 1015.0)
        .is_none());
    assert!(cache
        .get_by_node_at(node, Some(20.0), true, 1015.0)
        .is_some());
}

/// The DevEui lookup serves stale entries (diagnostics path).
#[test]
fn test_dev_eui_lookup_ignores_ttl() {
    let cache = cache_with_mapping();
    cache.insert(record(eui(0xF4CE366381C3C7BD), 1000.0, true));
    // Well past both TTLs, but not yet swept.
    assert!(cache.get_by_dev_eui(eui(0xF4CE366381C3C7BD)).is_some());
}

/// Eviction removes expired entries from both indices.
#[test]
fn test_eviction_sweep() {
    let cache = cache_with_mapping();
    cache.insert(record(eui(0xF4CE366381C3C7BD), 1000.0, true));
    cache.insert(record(eui(0xDEAD), 1000.0, false));

    // GPS record expired, sensor record still alive.
    let removed = cache.evict_expired_at(1000.0 + GPS_TTL + 1.0);
    assert_eq!(removed, 2); // both indices held the GPS record
    assert_eq!(cache.len(), (1, 0));

    // Sensor record expires on the longer TTL.
    let removed = cache.evict_expired_at(1000.0 + SENSOR_TTL + 1.0);
    assert_eq!(removed, 1);
    assert_eq!(cache.len(), (0, 0));
    assert_eq!(cache.stats().evictions, 3);
}

/// Snapshots only carry fresh records.
#[test]
fn test_snapshot_filters_stale_entries() {
    let cache = cache_with_mapping();
    cache.insert(record(eui(0xF4CE366381C3C7BD), 1000.0, true));

    let fresh = cache.snapshot_at(1010.0);
    assert_eq!(fresh.len(), 1);
    assert!(fresh.contains_key(&NodeId(0xB98A)));

    let stale = cache.snapshot_at(1000.0 + GPS_TTL + 1.0);
    assert!(stale.is_empty());
}

/// A new uplink overwrites the previous record in place.
#[test]
fn test_overwrite_on_new_message() {
    let cache = cache_with_mapping();
    cache.insert(record(eui(0xF4CE366381C3C7BD), 1000.0, true));
    cache.insert(record(eui(0xF4CE366381C3C7BD), 1200.0, true));

    assert_eq!(cache.len(), (1, 1));
    let current = cache
        .get_by_node_at(NodeId(0xB98A), None, true, 1201.0)
        .unwrap();
    assert_eq!(current.captured_at, 1200.0);
    assert_eq!(cache.stats().messages_cached, 2);
}
