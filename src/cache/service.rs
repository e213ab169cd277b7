//! # LoRa Cache Service
//!
//! Owns the TLS-MQTT session to the TTN broker and the two background tasks
//! of the cache: the ingestion loop (network client) and the periodic
//! eviction sweep. Connection loss is never fatal; the client reconnects and
//! the cache keeps serving whatever is still within TTL.

use crate::cache::{ttn, LoraTagCache};
use crate::constants::{
    DEFAULT_CLEANUP_INTERVAL_SECONDS, DEFAULT_GPS_TTL_SECONDS, DEFAULT_SENSOR_TTL_SECONDS,
};
use crate::error::UwbBridgeError;
use crate::mqtt::insecure_tls_transport;
use crate::network::config::DevEuiMap;
use crate::resilience::health::HealthMonitor;
use crate::util::unix_time;
use log::{debug, error, info, warn};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, timeout};

/// How long `stop()` waits for each background task to finish.
const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration of the TTN uplink subscription.
#[derive(Debug, Clone)]
pub struct LoraCacheConfig {
    pub broker: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Topic pattern to subscribe to, commonly `#`.
    pub topic_pattern: String,
    pub gps_ttl_seconds: f64,
    pub sensor_ttl_seconds: f64,
    pub cleanup_interval_seconds: f64,
    /// Ordered `locations` keys to consult when extracting a position.
    pub location_priority: Vec<String>,
}

impl Default for LoraCacheConfig {
    fn default() -> Self {
        LoraCacheConfig {
            broker: "eu1.cloud.thethings.network".to_string(),
            port: 8883,
            username: None,
            password: None,
            topic_pattern: "#".to_string(),
            gps_ttl_seconds: DEFAULT_GPS_TTL_SECONDS,
            sensor_ttl_seconds: DEFAULT_SENSOR_TTL_SECONDS,
            cleanup_interval_seconds: DEFAULT_CLEANUP_INTERVAL_SECONDS,
            location_priority: ttn::default_location_priority(),
        }
    }
}

/// Running cache service: the shared cache plus its two background tasks.
pub struct LoraCacheService {
    cache: LoraTagCache,
    shutdown: watch::Sender<bool>,
    ingest_task: JoinHandle<()>,
    evict_task: JoinHandle<()>,
}

impl LoraCacheService {
    /// Connect to the TTN broker and start the ingestion and eviction tasks.
    pub fn start(
        config: LoraCacheConfig,
        mapping: Arc<DevEuiMap>,
        health: Arc<HealthMonitor>,
    ) -> Result<LoraCacheService, UwbBridgeError> {
        let cache = LoraTagCache::new(
            mapping,
            config.gps_ttl_seconds,
            config.sensor_ttl_seconds,
        );

        let mut options = MqttOptions::new(
            format!("uwb-bridge-lora-{}", std::process::id()),
            config.broker.clone(),
            config.port,
        );
        options.set_keep_alive(Duration::from_secs(60));
        if let (Some(user), Some(pass)) = (config.username.clone(), config.password.clone()) {
            options.set_credentials(user, pass);
        }
        options.set_transport(insecure_tls_transport()?);

        let (client, eventloop) = AsyncClient::new(options, 64);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let ingest_task = tokio::spawn(ingest_loop(
            client,
            eventloop,
            cache.clone(),
            config.clone(),
            health,
            shutdown_rx.clone(),
        ));
        let evict_task = tokio::spawn(evict_loop(
            cache.clone(),
            config.cleanup_interval_seconds,
            shutdown_rx,
        ));

        info!(
            "LoRa tag cache started (GPS TTL: {}s, sensor TTL: {}s)",
            config.gps_ttl_seconds, config.sensor_ttl_seconds
        );
        Ok(LoraCacheService {
            cache,
            shutdown,
            ingest_task,
            evict_task,
        })
    }

    /// Handle to the shared cache for readers.
    pub fn cache(&self) -> LoraTagCache {
        self.cache.clone()
    }

    /// Stop both tasks, waiting up to five seconds for each.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if timeout(STOP_JOIN_TIMEOUT, self.ingest_task).await.is_err() {
            warn!("LoRa ingestion task did not stop within timeout");
        }
        if timeout(STOP_JOIN_TIMEOUT, self.evict_task).await.is_err() {
            warn!("LoRa eviction task did not stop within timeout");
        }
        info!("LoRa tag cache stopped");
    }
}

async fn ingest_loop(
    client: AsyncClient,
    mut eventloop: rumqttc::EventLoop,
    cache: LoraTagCache,
    config: LoraCacheConfig,
    health: Arc<HealthMonitor>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                let _ = client.disconnect().await;
                break;
            }
            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!(
                        "Connected to TTN MQTT broker {}:{}",
                        config.broker, config.port
                    );
                    health.set_lora_cache_connected(true);
                    if let Err(e) = client
                        .subscribe(config.topic_pattern.clone(), QoS::AtMostOnce)
                        .await
                    {
                        error!("Failed to subscribe to {}: {e}", config.topic_pattern);
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    debug!("Received message on topic: {}", publish.topic);
                    match ttn::parse_uplink(
                        &publish.payload,
                        unix_time(),
                        &config.location_priority,
                    ) {
                        Ok(record) => cache.insert(record),
                        Err(e) => {
                            warn!("Failed to parse uplink payload: {e}");
                            cache.record_parse_error();
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("TTN MQTT connection error: {e}");
                    health.set_lora_cache_connected(false);
                    // rumqttc reconnects on the next poll; pace the retries.
                    sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }
}

async fn evict_loop(cache: LoraTagCache, period_seconds: f64, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval(Duration::from_secs_f64(period_seconds.max(1.0)));
    ticker.tick().await; // first tick fires immediately, skip it
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                cache.evict_expired();
            }
        }
    }
}
