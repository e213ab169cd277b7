//! # Static Positioning Configuration
//!
//! Loaders for the two immutable tables the materialiser and cache depend
//! on: the anchor map (node id to surveyed position) and the dev-EUI mapping
//! (LoRa device identity to UWB node id). Both are loaded once at startup
//! and shared read-only; bad entries are warned about and skipped rather
//! than failing the load.

use crate::cache::DevEui;
use crate::error::UwbBridgeError;
use crate::uwb::NodeId;
use log::{info, warn};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct AnchorFile {
    anchors: Vec<AnchorEntry>,
}

#[derive(Debug, Deserialize)]
struct AnchorEntry {
    id: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    #[serde(default)]
    alt: Option<f64>,
}

/// Finite mapping from node id to a surveyed (lat, lon, alt).
#[derive(Debug, Clone, Default)]
pub struct AnchorMap {
    map: HashMap<NodeId, [f64; 3]>,
}

impl AnchorMap {
    /// Load from a JSON file of the form
    /// `{"anchors": [{"id": "B5A4", "lat": ..., "lon": ..., "alt": ...}]}`.
    pub fn load(path: &Path) -> Result<AnchorMap, UwbBridgeError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| UwbBridgeError::ConfigError(format!("{}: {e}", path.display())))?;
        let file: AnchorFile = serde_json::from_str(&raw)
            .map_err(|e| UwbBridgeError::ConfigError(format!("{}: {e}", path.display())))?;

        let mut map = HashMap::new();
        for entry in file.anchors {
            let (id, lat, lon) = match (&entry.id, entry.lat, entry.lon) {
                (Some(id), Some(lat), Some(lon)) => (id, lat, lon),
                _ => {
                    warn!("Invalid anchor entry: {entry:?}");
                    continue;
                }
            };
            match id.parse::<NodeId>() {
                Ok(node) => {
                    map.insert(node, [lat, lon, entry.alt.unwrap_or(0.0)]);
                }
                Err(_) => warn!("Invalid anchor id: {id}"),
            }
        }
        info!("Loaded {} anchor points from config", map.len());
        Ok(AnchorMap { map })
    }

    /// Build directly from entries (tests and simulations).
    pub fn from_entries(entries: impl IntoIterator<Item = (NodeId, [f64; 3])>) -> AnchorMap {
        AnchorMap {
            map: entries.into_iter().collect(),
        }
    }

    pub fn get(&self, node: NodeId) -> Option<[f64; 3]> {
        self.map.get(&node).copied()
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.map.contains_key(&node)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct DevEuiFile {
    dev_eui_to_uwb_id: HashMap<String, String>,
}

/// Finite mapping from LoRa DevEui to UWB node id.
///
/// Keys and values in the file are compared case-insensitively; the parsed
/// numeric identities are the canonical form.
#[derive(Debug, Clone, Default)]
pub struct DevEuiMap {
    map: HashMap<DevEui, NodeId>,
}

impl DevEuiMap {
    /// Load from a JSON file of the form
    /// `{"dev_eui_to_uwb_id": {"F4CE366381C3C7BD": "B98A"}}`.
    pub fn load(path: &Path) -> Result<DevEuiMap, UwbBridgeError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| UwbBridgeError::ConfigError(format!("{}: {e}", path.display())))?;
        let file: DevEuiFile = serde_json::from_str(&raw)
            .map_err(|e| UwbBridgeError::ConfigError(format!("{}: {e}", path.display())))?;

        let mut map = HashMap::new();
        for (eui, node) in file.dev_eui_to_uwb_id {
            match (eui.parse::<DevEui>(), node.parse::<NodeId>()) {
                (Ok(eui), Ok(node)) => {
                    map.insert(eui, node);
                }
                _ => warn!("Invalid dev_eui mapping entry: {eui} -> {node}"),
            }
        }
        info!("Loaded {} dev_eui to UWB id mappings", map.len());
        Ok(DevEuiMap { map })
    }

    /// Build directly from pairs (tests and simulations).
    pub fn from_pairs(pairs: impl IntoIterator<Item = (DevEui, NodeId)>) -> DevEuiMap {
        DevEuiMap {
            map: pairs.into_iter().collect(),
        }
    }

    pub fn node_for(&self, dev_eui: DevEui) -> Option<NodeId> {
        self.map.get(&dev_eui).copied()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
