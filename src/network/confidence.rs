//! # Position Confidence Scoring
//!
//! Scores how much trust to place in a node's published position. Anchors
//! are surveyed and score 1.0; LoRa GPS positions start from a base score,
//! decay with age relative to the GPS TTL, and are adjusted by reported
//! accuracy, gateway diversity and link quality.

use crate::cache::LoraRecord;

/// Tunable weights for the confidence calculation.
#[derive(Debug, Clone)]
pub struct ConfidenceScorer {
    pub anchor_confidence: f64,
    pub lora_gps_base_confidence: f64,
    pub lora_gps_min_confidence: f64,
    /// Confidence lost per elapsed TTL period.
    pub lora_gps_decay_rate: f64,
    pub gps_accuracy_weight: f64,
    pub gateway_count_weight: f64,
    pub rssi_weight: f64,
}

impl Default for ConfidenceScorer {
    fn default() -> Self {
        ConfidenceScorer {
            anchor_confidence: 1.0,
            lora_gps_base_confidence: 0.7,
            lora_gps_min_confidence: 0.3,
            lora_gps_decay_rate: 0.1,
            gps_accuracy_weight: 0.2,
            gateway_count_weight: 0.1,
            rssi_weight: 0.1,
        }
    }
}

impl ConfidenceScorer {
    /// Score one node's position.
    ///
    /// Returns the anchor score for anchors, a decayed/adjusted score for
    /// records carrying a location, and 0.0 when no position data exists.
    pub fn calculate(
        &self,
        is_anchor: bool,
        record: Option<&LoraRecord>,
        gps_ttl_seconds: f64,
        now: f64,
    ) -> f64 {
        if is_anchor {
            return self.anchor_confidence;
        }
        let record = match record {
            Some(r) if r.has_gps() => r,
            _ => return 0.0,
        };

        let mut confidence = self.lora_gps_base_confidence;

        let age = now - record.captured_at;
        let ttl_ratio = if gps_ttl_seconds > 0.0 {
            age / gps_ttl_seconds
        } else {
            1.0
        };
        confidence -= self.lora_gps_decay_rate * ttl_ratio;

        if let Some(accuracy) = record.location.as_ref().and_then(|l| l.accuracy) {
            confidence += if accuracy <= 10.0 {
                self.gps_accuracy_weight * 0.5
            } else if accuracy <= 50.0 {
                self.gps_accuracy_weight * 0.2
            } else if accuracy <= 100.0 {
                0.0
            } else {
                -self.gps_accuracy_weight * 0.3
            };
        }

        let gateway_count = record.gateways.len();
        if gateway_count > 0 {
            confidence += if gateway_count >= 3 {
                self.gateway_count_weight * 0.5
            } else if gateway_count >= 2 {
                self.gateway_count_weight * 0.2
            } else {
                0.0
            };

            if let Some(rssi) = record.best_rssi() {
                confidence += if rssi >= -80.0 {
                    self.rssi_weight * 0.3
                } else if rssi >= -100.0 {
                    0.0
                } else {
                    -self.rssi_weight * 0.2
                };
            }
            if let Some(snr) = record.best_snr() {
                confidence += if snr >= 5.0 {
                    self.rssi_weight * 0.2
                } else if snr >= 0.0 {
                    0.0
                } else {
                    -self.rssi_weight * 0.1
                };
            }
        }

        let clamped = confidence
            .max(self.lora_gps_min_confidence)
            .min(self.lora_gps_base_confidence);
        (clamped * 1000.0).round() / 1000.0
    }
}
