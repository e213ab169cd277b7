//! # Network Materialiser
//!
//! Converts one distance packet's edge list into the enriched network
//! document: one node per distinct id seen in the edges, positions resolved
//! from the anchor map or fresh LoRa GPS, telemetry copied from the cache
//! snapshot, and every edge attached to both of its endpoints.
//!
//! The builder is a pure function of its inputs (edge list, cache snapshot,
//! wall clock); the anchor map and configuration are fixed at construction.

use crate::cache::LoraRecord;
use crate::network::confidence::ConfidenceScorer;
use crate::network::config::AnchorMap;
use crate::resilience::validator::DataValidator;
use crate::uwb::{Edge, NodeId};
use log::warn;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// When to emit the device-GPS diagnostic fields (`gpsFixType`,
/// `gpsSatellites`) from the decoded payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GpsDiagnostics {
    /// Emit whenever the decoded payload carries them.
    #[default]
    Always,
    /// Emit only when the node's position did not come from a LoRa location.
    FallbackOnly,
}

/// Which clock `lastPositionUpdateTime` reflects for an anchor that also has
/// a fresh LoRa location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnchorTimestamp {
    /// The publish wall clock (anchor positions are static).
    #[default]
    WallClock,
    /// The LoRa record's capture timestamp.
    LoraCapture,
}

/// Materialiser behaviour switches.
#[derive(Debug, Clone, Default)]
pub struct NetworkConfig {
    pub gps_diagnostics: GpsDiagnostics,
    pub anchor_timestamp: AnchorTimestamp,
    /// Emit `positionConfidence` per node.
    pub confidence_scoring: bool,
}

/// Placeholder local-frame position; the bridge never solves positions.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// One edge as published, attached to both endpoints.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NetworkEdge {
    pub end0: NodeId,
    pub end1: NodeId,
    /// Metres, truncated to millimetre precision on emission.
    pub distance: f64,
}

/// One node of the published network document.
#[derive(Debug, Clone, Serialize)]
pub struct UwbNode {
    pub id: NodeId,
    #[serde(rename = "triageStatus")]
    pub triage_status: i64,
    pub position: Position,
    #[serde(rename = "latLonAlt")]
    pub lat_lon_alt: [f64; 3],
    #[serde(rename = "positionKnown")]
    pub position_known: bool,
    #[serde(rename = "lastPositionUpdateTime")]
    pub last_position_update_time: f64,
    #[serde(rename = "positionAccuracy")]
    pub position_accuracy: f64,
    pub edges: Vec<NetworkEdge>,
    #[serde(rename = "positionSource", skip_serializing_if = "Option::is_none")]
    pub position_source: Option<String>,
    #[serde(rename = "positionConfidence", skip_serializing_if = "Option::is_none")]
    pub position_confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rssi: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snr: Option<f64>,
    #[serde(rename = "loraGatewayCount", skip_serializing_if = "Option::is_none")]
    pub lora_gateway_count: Option<usize>,
    #[serde(rename = "loraDataTimestamp", skip_serializing_if = "Option::is_none")]
    pub lora_data_timestamp: Option<f64>,
    #[serde(rename = "loraReceivedAt", skip_serializing_if = "Option::is_none")]
    pub lora_received_at: Option<String>,
    #[serde(rename = "loraFrameCount", skip_serializing_if = "Option::is_none")]
    pub lora_frame_count: Option<u32>,
    #[serde(rename = "loraPort", skip_serializing_if = "Option::is_none")]
    pub lora_port: Option<u8>,
    #[serde(rename = "loraDeviceId", skip_serializing_if = "Option::is_none")]
    pub lora_device_id: Option<String>,
    #[serde(rename = "gpsFixType", skip_serializing_if = "Option::is_none")]
    pub gps_fix_type: Option<i64>,
    #[serde(rename = "gpsSatellites", skip_serializing_if = "Option::is_none")]
    pub gps_satellites: Option<i64>,
    /// Remaining decoded-payload fields, each key prefixed `lora_`.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl UwbNode {
    fn unknown(id: NodeId, now: f64) -> UwbNode {
        UwbNode {
            id,
            triage_status: 0,
            position: Position::default(),
            lat_lon_alt: [0.0, 0.0, 0.0],
            position_known: false,
            last_position_update_time: now,
            position_accuracy: 0.0,
            edges: Vec::new(),
            position_source: None,
            position_confidence: None,
            battery: None,
            temperature: None,
            humidity: None,
            rssi: None,
            snr: None,
            lora_gateway_count: None,
            lora_data_timestamp: None,
            lora_received_at: None,
            lora_frame_count: None,
            lora_port: None,
            lora_device_id: None,
            gps_fix_type: None,
            gps_satellites: None,
            extra: BTreeMap::new(),
        }
    }
}

/// The published network document.
#[derive(Debug, Clone, Serialize)]
pub struct Network {
    pub uwbs: Vec<UwbNode>,
}

/// Materialises network documents from edge lists.
pub struct NetworkBuilder {
    anchors: Arc<AnchorMap>,
    config: NetworkConfig,
    validator: Option<Arc<DataValidator>>,
    scorer: ConfidenceScorer,
    gps_ttl_seconds: f64,
}

impl NetworkBuilder {
    pub fn new(anchors: Arc<AnchorMap>, config: NetworkConfig, gps_ttl_seconds: f64) -> Self {
        NetworkBuilder {
            anchors,
            config,
            validator: None,
            scorer: ConfidenceScorer::default(),
            gps_ttl_seconds,
        }
    }

    pub fn with_validator(mut self, validator: Arc<DataValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Build the network document for one distance packet.
    ///
    /// `cache` is a freshness-filtered snapshot taken at `now`; edges must
    /// already have passed distance validation.
    pub fn build(
        &self,
        edges: &[Edge],
        cache: Option<&HashMap<NodeId, LoraRecord>>,
        now: f64,
    ) -> Network {
        let mut ids: BTreeSet<NodeId> = BTreeSet::new();
        for edge in edges {
            ids.insert(edge.a);
            ids.insert(edge.b);
        }

        let mut uwbs: Vec<UwbNode> = ids
            .iter()
            .map(|&id| self.build_node(id, cache.and_then(|c| c.get(&id)), now))
            .collect();

        let index: HashMap<NodeId, usize> = uwbs
            .iter()
            .enumerate()
            .map(|(i, node)| (node.id, i))
            .collect();

        for edge in edges {
            let published = NetworkEdge {
                end0: edge.a,
                end1: edge.b,
                distance: (edge.distance_m as f64 * 1000.0).round() / 1000.0,
            };
            if let Some(&i) = index.get(&edge.a) {
                uwbs[i].edges.push(published.clone());
            }
            if let Some(&i) = index.get(&edge.b) {
                uwbs[i].edges.push(published);
            }
        }

        Network { uwbs }
    }

    fn build_node(&self, id: NodeId, record: Option<&LoraRecord>, now: f64) -> UwbNode {
        let mut node = UwbNode::unknown(id, now);
        let anchor = self.anchors.get(id);
        let mut record = record;
        let mut lora_position = false;

        if let Some(pos) = anchor {
            node.position_known = true;
            node.lat_lon_alt = pos;
            node.position_source = Some("anchor_config".to_string());
        } else if let Some(rec) = record {
            if let Some(loc) = &rec.location {
                let gps_ok = match &self.validator {
                    Some(validator) => {
                        let result = validator.validate_gps_coordinates(
                            loc.latitude,
                            loc.longitude,
                            loc.altitude,
                            Some(id),
                        );
                        if !result.is_valid {
                            warn!(
                                "GPS validation failed for UWB {id}: {}",
                                result.reason.as_deref().unwrap_or("unknown")
                            );
                        }
                        result.is_valid
                    }
                    None => true,
                };
                if gps_ok {
                    node.lat_lon_alt = [loc.latitude, loc.longitude, loc.altitude.unwrap_or(0.0)];
                    node.position_known = true;
                    node.last_position_update_time = rec.captured_at;
                    node.position_source = Some(loc.source.clone());
                    lora_position = true;
                } else {
                    // An implausible fix taints the whole record.
                    record = None;
                }
            }
        }

        if let Some(rec) = record {
            if let Some(validator) = &self.validator {
                let (_, failures) = validator.validate_lora_data(rec, Some(id));
                for failure in failures {
                    warn!("LoRa data validation failure for UWB {id}: {failure}");
                }
            }

            node.lora_data_timestamp = Some(rec.captured_at);
            node.lora_received_at = rec.received_at.clone();
            node.battery = rec.decoded.battery;
            node.temperature = rec.decoded.temperature;
            node.humidity = rec.decoded.humidity;
            if let Some(triage) = rec.decoded.triage {
                node.triage_status = triage;
            }

            let emit_diagnostics = match self.config.gps_diagnostics {
                GpsDiagnostics::Always => true,
                GpsDiagnostics::FallbackOnly => !lora_position,
            };
            if emit_diagnostics {
                node.gps_fix_type = rec.decoded.fix_type;
                node.gps_satellites = rec.decoded.satellites;
            }

            for (key, value) in &rec.decoded.extra {
                node.extra.insert(format!("lora_{key}"), value.clone());
            }

            if let Some(loc) = &rec.location {
                if let Some(accuracy) = loc.accuracy {
                    node.position_accuracy = accuracy;
                }
                if anchor.is_some() {
                    // Anchor coordinates win; record both provenances.
                    node.position_source = Some(format!("anchor_config,lora_{}", loc.source));
                    if self.config.anchor_timestamp == AnchorTimestamp::LoraCapture {
                        node.last_position_update_time = rec.captured_at;
                    }
                }
            }

            node.lora_frame_count = rec.meta.f_cnt;
            node.lora_port = rec.meta.f_port;
            node.lora_device_id = rec.meta.device_id.clone();

            if !rec.gateways.is_empty() {
                node.rssi = rec.best_rssi();
                node.snr = rec.best_snr();
                node.lora_gateway_count = Some(rec.gateways.len());
            }
        }

        if self.config.confidence_scoring {
            node.position_confidence = Some(self.scorer.calculate(
                anchor.is_some(),
                record,
                self.gps_ttl_seconds,
                now,
            ));
        }

        node
    }
}
