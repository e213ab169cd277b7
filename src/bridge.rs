//! # Bridge Orchestration
//!
//! Wires the subsystems together and runs the main ingestion loop: serial
//! byte pump, framer, parser, validation, materialisation and publish, with
//! the health report ticking inline and device resets dispatched through
//! the recovery layer's backoff gate.

use crate::cache::{LoraCacheConfig, LoraCacheService, LoraTagCache};
use crate::error::UwbBridgeError;
use crate::mqtt::{MqttPublisherConfig, UwbMqttPublisher};
use crate::network::{AnchorMap, DevEuiMap, NetworkBuilder, NetworkConfig};
use crate::resilience::{
    DataValidator, ErrorRecovery, ErrorType, HealthConfig, HealthMonitor, RecoveryConfig,
    ValidatorConfig,
};
use crate::util::unix_time;
use crate::uwb::{Edge, FrameBuffer, PacketEvent, TwrParser, UwbSerialHandle};
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Everything the bridge needs to run.
#[derive(Debug, Clone, Default)]
pub struct BridgeConfig {
    /// Serial port of the UWB device, e.g. `/dev/ttyUSB0`.
    pub uart: String,
    /// Run every subsystem except the serial reader (test switch).
    pub disable_serial: bool,
    /// Publish the enriched network document instead of the raw edge list.
    pub cga_format: bool,
    pub anchor_config: Option<PathBuf>,
    pub dev_eui_mapping: Option<PathBuf>,
    /// Outbound broker; `None` disables MQTT publishing entirely.
    pub mqtt: Option<MqttPublisherConfig>,
    /// TTN subscription; `None` disables the LoRa cache.
    pub lora: Option<LoraCacheConfig>,
    /// Range validation; `None` disables the validator.
    pub validation: Option<ValidatorConfig>,
    pub recovery: RecoveryConfig,
    pub network: NetworkConfig,
    pub health: HealthConfig,
}

struct Pipeline {
    framer: FrameBuffer,
    parser: TwrParser,
    recovery: ErrorRecovery,
    health: Arc<HealthMonitor>,
    validator: Option<Arc<DataValidator>>,
    builder: Option<NetworkBuilder>,
    cache: Option<LoraTagCache>,
    publisher: Option<UwbMqttPublisher>,
}

impl Pipeline {
    /// Drain complete frames from the framer through the parser.
    ///
    /// Returns true when the parsing-error threshold has been reached and
    /// the backoff gate allows a reset now.
    async fn process_frames(&mut self) -> bool {
        while let Some(payload) = self.framer.next_payload() {
            match self.parser.handle_payload(&payload) {
                Ok(PacketEvent::AssignmentUpdated) => {
                    self.health.record_successful_packet();
                }
                Ok(PacketEvent::Ignored) => {}
                Ok(PacketEvent::Edges(edges)) => {
                    self.health.record_successful_packet();
                    self.publish(edges).await;
                }
                Err(e) => {
                    warn!("Packet parsing error: {e}");
                    self.health.record_parsing_error();
                    if self.recovery.record_error(ErrorType::Parsing)
                        && self.recovery.should_reset_with_backoff()
                    {
                        // The reset clears the buffer; drop what remains.
                        return true;
                    }
                }
            }
        }
        false
    }

    async fn publish(&mut self, edges: Vec<Edge>) {
        if edges.is_empty() {
            return;
        }
        let now = unix_time();
        let (valid, failures) = match &self.validator {
            Some(validator) => validator.validate_edge_list(&edges, now),
            None => (edges, Vec::new()),
        };

        let publisher = match &self.publisher {
            Some(publisher) => publisher,
            None => return,
        };
        if !failures.is_empty() {
            if let Err(e) = publisher.publish_validation_failures(&failures).await {
                warn!("Failed to publish validation failures: {e}");
            }
        }
        if valid.is_empty() {
            return;
        }

        let result = match &self.builder {
            Some(builder) => {
                let snapshot = self.cache.as_ref().map(|cache| cache.snapshot_at(now));
                let network = builder.build(&valid, snapshot.as_ref(), now);
                publisher.publish_network(&network).await
            }
            None => publisher.publish_edges(&valid).await,
        };
        if let Err(e) = result {
            warn!("Failed to serialise publish payload: {e}");
        }
    }

    /// Publish and persist the health document when a report is due.
    async fn health_tick(&mut self) {
        if !self.health.report_due() {
            return;
        }
        let document = self.health.document();
        if let Err(e) = HealthMonitor::write_health_file(&document) {
            warn!("Failed to write health file: {e}");
        }
        if let Some(publisher) = &self.publisher {
            if let Err(e) = publisher.publish_health(&document).await {
                warn!("Failed to publish health report: {e}");
            }
        }
        self.health.mark_reported();
    }

    /// Pulse the device reset line and restore a clean parsing state.
    ///
    /// Only the triggering class's counter is cleared; the others carry on.
    async fn perform_reset(&mut self, serial: Option<&mut UwbSerialHandle>, trigger: ErrorType) {
        if let Some(serial) = serial {
            if let Err(e) = serial.reset_device().await {
                error!("Device reset failed: {e}");
            }
            if let Err(e) = serial.clear_input() {
                warn!("Failed to clear serial input: {e}");
            }
        }
        self.framer.clear();
        self.parser.reset();
        self.recovery.record_reset();
        self.recovery.reset_error_counts(Some(trigger));
        self.health.record_device_reset();
    }
}

/// Run the bridge until interrupted.
pub async fn run(config: BridgeConfig) -> Result<(), UwbBridgeError> {
    let health = Arc::new(HealthMonitor::new(config.health.clone()));

    let mapping = Arc::new(match &config.dev_eui_mapping {
        Some(path) => DevEuiMap::load(path)?,
        None => DevEuiMap::default(),
    });
    let anchors = Arc::new(match &config.anchor_config {
        Some(path) => AnchorMap::load(path)?,
        None => AnchorMap::default(),
    });

    let lora_service = match config.lora.clone() {
        Some(lora_config) => Some(LoraCacheService::start(
            lora_config,
            mapping.clone(),
            health.clone(),
        )?),
        None => None,
    };
    let cache = lora_service.as_ref().map(|service| service.cache());

    let validator = config
        .validation
        .clone()
        .map(|cfg| Arc::new(DataValidator::new(cfg)));

    let builder = config.cga_format.then(|| {
        let gps_ttl = config
            .lora
            .as_ref()
            .map(|l| l.gps_ttl_seconds)
            .unwrap_or(crate::constants::DEFAULT_GPS_TTL_SECONDS);
        let mut builder = NetworkBuilder::new(anchors.clone(), config.network.clone(), gps_ttl);
        if let Some(validator) = &validator {
            builder = builder.with_validator(validator.clone());
        }
        builder
    });

    let publisher = match config.mqtt.clone() {
        Some(mqtt_config) => Some(UwbMqttPublisher::connect(mqtt_config, health.clone())?),
        None => None,
    };

    let mut pipeline = Pipeline {
        framer: FrameBuffer::new(),
        parser: TwrParser::new(),
        recovery: ErrorRecovery::new(config.recovery.clone()),
        health: health.clone(),
        validator,
        builder,
        cache,
        publisher,
    };

    info!("UWB bridge starting...");
    let mut serial = if config.disable_serial {
        info!("Serial port disabled - running in test mode");
        // No port to lose; do not let the classifier call that degraded.
        health.set_serial_connected(true);
        None
    } else {
        info!("Serial port: {}", config.uart);
        let mut serial = UwbSerialHandle::connect(&config.uart).await?;
        health.set_serial_connected(true);
        serial.reset_device().await?;
        sleep(Duration::from_millis(500)).await;
        serial.clear_input()?;
        serial.send_start_command().await?;
        Some(serial)
    };

    info!("Data processing started...");
    let mut read_buf = [0u8; 1024];
    loop {
        match serial.as_mut() {
            Some(port) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        info!("Shutting down...");
                        break;
                    }
                    read = port.read_bytes(&mut read_buf) => match read {
                        Ok(0) => {}
                        Ok(n) => {
                            pipeline.framer.push(&read_buf[..n]);
                            if pipeline.process_frames().await {
                                pipeline.perform_reset(Some(port), ErrorType::Parsing).await;
                            }
                        }
                        Err(e) => {
                            error!("Serial read error: {e}");
                            health.record_connection_error();
                            if pipeline.recovery.record_error(ErrorType::Serial)
                                && pipeline.recovery.should_reset_with_backoff()
                            {
                                pipeline.perform_reset(Some(port), ErrorType::Serial).await;
                            }
                            sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
            }
            None => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        info!("Shutting down...");
                        break;
                    }
                    _ = sleep(Duration::from_secs(1)) => {}
                }
            }
        }
        pipeline.health_tick().await;
    }

    // Orderly teardown: cache tasks first, then the publisher, then the port.
    if let Some(service) = lora_service {
        service.stop().await;
    }
    if let Some(publisher) = pipeline.publisher.take() {
        publisher.shutdown().await;
    }
    drop(serial.take());
    info!("Cleanup complete, exiting");
    Ok(())
}
