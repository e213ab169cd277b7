//! # Outbound MQTT Publisher
//!
//! Single TLS session to the outbound broker. Network documents go out at
//! QoS 1 behind the rate limit; the `<topic>/cmd` subscription retunes the
//! rate limit live; health reports go to `<topic>/health` and rejected
//! inputs, when configured, to `<topic>/validation_failures`.
//!
//! A dropped publish never blocks the pipeline: failures are logged, counted
//! in the health metrics, and superseded by the next tick's fresh data.

use crate::constants::DEFAULT_RATE_LIMIT_SECONDS;
use crate::error::UwbBridgeError;
use crate::mqtt::{insecure_tls_transport, RateLimit};
use crate::network::Network;
use crate::resilience::health::{HealthDocument, HealthMonitor};
use crate::resilience::validator::ValidationFailure;
use crate::uwb::Edge;
use log::{debug, error, info, warn};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

/// Configuration of the outbound broker session.
#[derive(Debug, Clone)]
pub struct MqttPublisherConfig {
    pub broker: String,
    pub port: u16,
    pub topic: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub rate_limit_seconds: f64,
    /// Publish rejected inputs to `<topic>/validation_failures`.
    pub publish_validation_failures: bool,
}

impl Default for MqttPublisherConfig {
    fn default() -> Self {
        MqttPublisherConfig {
            broker: "mqtt.dynamicdevices.co.uk".to_string(),
            port: 8883,
            topic: "uwb/positions".to_string(),
            username: None,
            password: None,
            rate_limit_seconds: DEFAULT_RATE_LIMIT_SECONDS,
            publish_validation_failures: false,
        }
    }
}

/// MQTT client for publishing network documents and receiving commands.
pub struct UwbMqttPublisher {
    client: AsyncClient,
    topic: String,
    health_topic: String,
    validation_topic: Option<String>,
    rate_limit: Arc<RateLimit>,
    health: Arc<HealthMonitor>,
    shutdown: watch::Sender<bool>,
    event_task: JoinHandle<()>,
}

impl UwbMqttPublisher {
    /// Build the session and start its event-loop task.
    pub fn connect(
        config: MqttPublisherConfig,
        health: Arc<HealthMonitor>,
    ) -> Result<UwbMqttPublisher, UwbBridgeError> {
        let rate_limit = Arc::new(RateLimit::new(config.rate_limit_seconds));
        let command_topic = format!("{}/cmd", config.topic);
        let health_topic = format!("{}/health", config.topic);
        let validation_topic = config
            .publish_validation_failures
            .then(|| format!("{}/validation_failures", config.topic));

        let mut options = MqttOptions::new(
            format!("uwb-bridge-{}", std::process::id()),
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

        let event_task = tokio::spawn(event_loop(
            client.clone(),
            eventloop,
            command_topic,
            rate_limit.clone(),
            health.clone(),
            shutdown_rx,
        ));

        info!(
            "MQTT client configured for {}:{}",
            config.broker, config.port
        );
        Ok(UwbMqttPublisher {
            client,
            topic: config.topic,
            health_topic,
            validation_topic,
            rate_limit,
            health,
            shutdown,
            event_task,
        })
    }

    /// The rate limit shared with the command subscription.
    pub fn rate_limit(&self) -> Arc<RateLimit> {
        self.rate_limit.clone()
    }

    /// Publish a network document, subject to the rate limit.
    pub async fn publish_network(&self, network: &Network) -> Result<(), UwbBridgeError> {
        if !self.rate_limit.try_acquire() {
            debug!("Publish skipped by rate limit");
            return Ok(());
        }
        let payload = serde_json::to_vec(network)?;
        self.publish_json(&self.topic, payload).await;
        Ok(())
    }

    /// Publish a raw edge list (CGA format disabled), subject to the rate
    /// limit. Entries are `[end0, end1, distance]` with 3-decimal distances.
    pub async fn publish_edges(&self, edges: &[Edge]) -> Result<(), UwbBridgeError> {
        if !self.rate_limit.try_acquire() {
            debug!("Publish skipped by rate limit");
            return Ok(());
        }
        let formatted: Vec<(String, String, f64)> = edges
            .iter()
            .map(|e| {
                (
                    e.a.to_string(),
                    e.b.to_string(),
                    (e.distance_m as f64 * 1000.0).round() / 1000.0,
                )
            })
            .collect();
        let payload = serde_json::to_vec(&formatted)?;
        self.publish_json(&self.topic, payload).await;
        Ok(())
    }

    /// Publish a health document to the health topic (not rate limited).
    pub async fn publish_health(&self, document: &HealthDocument) -> Result<(), UwbBridgeError> {
        let payload = serde_json::to_vec(document)?;
        self.publish_json(&self.health_topic, payload).await;
        Ok(())
    }

    /// Publish one batch of rejected inputs, when a topic is configured.
    pub async fn publish_validation_failures(
        &self,
        failures: &[ValidationFailure],
    ) -> Result<(), UwbBridgeError> {
        let topic = match &self.validation_topic {
            Some(topic) if !failures.is_empty() => topic.clone(),
            _ => return Ok(()),
        };
        let payload = serde_json::to_vec(failures)?;
        self.publish_json(&topic, payload).await;
        Ok(())
    }

    async fn publish_json(&self, topic: &str, payload: Vec<u8>) {
        match self
            .client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
        {
            Ok(()) => {
                debug!("Published to MQTT topic '{topic}'");
                self.health.record_mqtt_publish(true);
            }
            Err(e) => {
                warn!("Failed to publish to MQTT topic '{topic}': {e}");
                self.health.record_mqtt_publish(false);
            }
        }
    }

    /// Disconnect and stop the event-loop task.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.client.disconnect().await;
        if timeout(Duration::from_secs(5), self.event_task).await.is_err() {
            warn!("MQTT event loop did not stop within timeout");
        }
    }
}

/// Parse the only recognised command: `set rate_limit <positive-float>`.
pub fn parse_rate_limit_command(payload: &str) -> Option<f64> {
    let rest = payload.trim().strip_prefix("set rate_limit ")?;
    let value: f64 = rest.trim().parse().ok()?;
    (value > 0.0).then_some(value)
}

async fn event_loop(
    client: AsyncClient,
    mut eventloop: rumqttc::EventLoop,
    command_topic: String,
    rate_limit: Arc<RateLimit>,
    health: Arc<HealthMonitor>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("Connected to MQTT broker");
                    health.set_mqtt_connected(true);
                    if let Err(e) = client
                        .subscribe(command_topic.clone(), QoS::AtLeastOnce)
                        .await
                    {
                        error!("Failed to subscribe to command topic: {e}");
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    if publish.topic == command_topic {
                        let payload = String::from_utf8_lossy(&publish.payload);
                        match parse_rate_limit_command(&payload) {
                            Some(value) => rate_limit.set_interval_seconds(value),
                            None => warn!("Ignoring unparseable command: {}", payload.trim()),
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("MQTT connection error: {e}");
                    health.set_mqtt_connected(false);
                    sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rate_limit_command() {
        assert_eq!(parse_rate_limit_command("set rate_limit 2"), Some(2.0));
        assert_eq!(parse_rate_limit_command("set rate_limit 0.5\n"), Some(0.5));
        assert_eq!(parse_rate_limit_command("set rate_limit 0"), None);
        assert_eq!(parse_rate_limit_command("set rate_limit -3"), None);
        assert_eq!(parse_rate_limit_command("set rate_limit abc"), None);
        assert_eq!(parse_rate_limit_command("set something 2"), None);
        assert_eq!(parse_rate_limit_command(""), None);
    }
}
