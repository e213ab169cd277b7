use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use uwb_bridge_rs::bridge::{self, BridgeConfig};
use uwb_bridge_rs::cache::LoraCacheConfig;
use uwb_bridge_rs::logging::init_logger_with_level;
use uwb_bridge_rs::mqtt::MqttPublisherConfig;
use uwb_bridge_rs::network::{AnchorTimestamp, GpsDiagnostics, NetworkConfig};
use uwb_bridge_rs::resilience::{HealthConfig, RecoveryConfig, ValidatorConfig};

#[derive(Clone, Copy, ValueEnum)]
enum GpsDiagnosticsArg {
    Always,
    FallbackOnly,
}

#[derive(Clone, Copy, ValueEnum)]
enum AnchorTimestampArg {
    WallClock,
    LoraCapture,
}

#[derive(Parser)]
#[command(name = "uwb-bridge")]
#[command(about = "Bridges UWB ranging telemetry and LoRa/TTN uplinks to MQTT")]
struct Cli {
    /// Serial port of the UWB device
    #[arg(default_value = "/dev/ttyUSB0")]
    uart: String,

    /// MQTT broker hostname
    #[arg(long, default_value = "mqtt.dynamicdevices.co.uk")]
    mqtt_broker: String,
    /// MQTT broker port
    #[arg(long, default_value_t = 8883)]
    mqtt_port: u16,
    /// MQTT topic to publish to
    #[arg(long, default_value = "uwb/positions")]
    mqtt_topic: String,
    /// MQTT username
    #[arg(long)]
    mqtt_username: Option<String>,
    /// MQTT password
    #[arg(long)]
    mqtt_password: Option<String>,
    /// Minimum seconds between MQTT publishes
    #[arg(long, default_value_t = 10.0)]
    mqtt_rate_limit: f64,
    /// Disable MQTT publishing
    #[arg(long)]
    disable_mqtt: bool,

    /// Publish in CGA network format
    #[arg(long)]
    cga_format: bool,
    /// Path to anchor config JSON
    #[arg(long)]
    anchor_config: Option<PathBuf>,
    /// Path to dev_eui mapping JSON
    #[arg(long)]
    dev_eui_mapping: Option<PathBuf>,

    /// LoRa MQTT broker hostname
    #[arg(long, default_value = "eu1.cloud.thethings.network")]
    lora_broker: String,
    /// LoRa MQTT broker port
    #[arg(long, default_value_t = 8883)]
    lora_port: u16,
    /// LoRa MQTT username
    #[arg(long)]
    lora_username: Option<String>,
    /// LoRa MQTT password
    #[arg(long)]
    lora_password: Option<String>,
    /// LoRa MQTT topic pattern
    #[arg(long, default_value = "#")]
    lora_topic: String,
    /// Enable LoRa tag data caching
    #[arg(long)]
    enable_lora_cache: bool,
    /// TTL for cached GPS data in seconds
    #[arg(long, default_value_t = 300.0)]
    gps_ttl: f64,
    /// TTL for cached sensor data in seconds
    #[arg(long, default_value_t = 600.0)]
    sensor_ttl: f64,
    /// Cache eviction sweep period in seconds
    #[arg(long, default_value_t = 60.0)]
    cache_cleanup_interval: f64,
    /// Ordered location keys consulted in the uplink's locations object
    #[arg(long, value_delimiter = ',', default_value = "frm-payload,user,gps")]
    location_priority: Vec<String>,

    /// Enable range validation of distances, GPS and telemetry
    #[arg(long)]
    enable_validation: bool,
    /// Minimum valid distance in metres
    #[arg(long, default_value_t = 0.0)]
    min_distance: f64,
    /// Maximum valid distance in metres
    #[arg(long, default_value_t = 300.0)]
    max_distance: f64,
    /// Minimum valid battery percentage
    #[arg(long, default_value_t = 0.0)]
    min_battery: f64,
    /// Maximum valid battery percentage
    #[arg(long, default_value_t = 100.0)]
    max_battery: f64,
    /// Minimum valid temperature in Celsius
    #[arg(long, default_value_t = -40.0)]
    min_temperature: f64,
    /// Maximum valid temperature in Celsius
    #[arg(long, default_value_t = 85.0)]
    max_temperature: f64,
    /// Accept GPS fixes at exactly (0, 0)
    #[arg(long)]
    allow_zero_gps: bool,
    /// Publish rejected inputs to <topic>/validation_failures
    #[arg(long)]
    publish_validation_failures: bool,

    /// Parsing errors tolerated before a device reset
    #[arg(long, default_value_t = 3)]
    parsing_error_threshold: u32,
    /// Connection errors tolerated before a device reset
    #[arg(long, default_value_t = 3)]
    connection_error_threshold: u32,
    /// Initial reset backoff in seconds
    #[arg(long, default_value_t = 1.0)]
    initial_backoff: f64,
    /// Maximum reset backoff in seconds
    #[arg(long, default_value_t = 60.0)]
    max_backoff: f64,
    /// Exponential backoff multiplier
    #[arg(long, default_value_t = 2.0)]
    backoff_multiplier: f64,

    /// Seconds between health reports
    #[arg(long, default_value_t = 60.0)]
    health_report_interval: f64,

    /// When to emit device-GPS diagnostic fields
    #[arg(long, value_enum, default_value_t = GpsDiagnosticsArg::Always)]
    gps_diagnostics: GpsDiagnosticsArg,
    /// Clock used for lastPositionUpdateTime on anchors with fresh LoRa GPS
    #[arg(long, value_enum, default_value_t = AnchorTimestampArg::WallClock)]
    anchor_timestamp: AnchorTimestampArg,
    /// Emit positionConfidence per node
    #[arg(long)]
    enable_confidence: bool,

    /// Disable serial port reading (testing mode)
    #[arg(long)]
    disable_serial: bool,
    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
    /// Enable quiet mode (minimal logging)
    #[arg(long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logger_with_level(cli.verbose, cli.quiet);

    let mqtt = (!cli.disable_mqtt).then(|| MqttPublisherConfig {
        broker: cli.mqtt_broker.clone(),
        port: cli.mqtt_port,
        topic: cli.mqtt_topic.clone(),
        username: cli.mqtt_username.clone(),
        password: cli.mqtt_password.clone(),
        rate_limit_seconds: cli.mqtt_rate_limit,
        publish_validation_failures: cli.publish_validation_failures,
    });

    let lora = cli.enable_lora_cache.then(|| LoraCacheConfig {
        broker: cli.lora_broker.clone(),
        port: cli.lora_port,
        username: cli.lora_username.clone(),
        password: cli.lora_password.clone(),
        topic_pattern: cli.lora_topic.clone(),
        gps_ttl_seconds: cli.gps_ttl,
        sensor_ttl_seconds: cli.sensor_ttl,
        cleanup_interval_seconds: cli.cache_cleanup_interval,
        location_priority: cli.location_priority.clone(),
    });

    let validation = cli.enable_validation.then(|| ValidatorConfig {
        min_distance_meters: cli.min_distance,
        max_distance_meters: cli.max_distance,
        min_battery_percent: cli.min_battery,
        max_battery_percent: cli.max_battery,
        min_temperature_celsius: cli.min_temperature,
        max_temperature_celsius: cli.max_temperature,
        reject_zero_gps: !cli.allow_zero_gps,
        ..ValidatorConfig::default()
    });

    let config = BridgeConfig {
        uart: cli.uart.clone(),
        disable_serial: cli.disable_serial,
        cga_format: cli.cga_format,
        anchor_config: cli.anchor_config.clone(),
        dev_eui_mapping: cli.dev_eui_mapping.clone(),
        mqtt,
        lora,
        validation,
        recovery: RecoveryConfig {
            parsing_error_threshold: cli.parsing_error_threshold,
            connection_error_threshold: cli.connection_error_threshold,
            serial_error_threshold: cli.connection_error_threshold,
            mqtt_error_threshold: cli.connection_error_threshold,
            initial_backoff_seconds: cli.initial_backoff,
            max_backoff_seconds: cli.max_backoff,
            backoff_multiplier: cli.backoff_multiplier,
        },
        network: NetworkConfig {
            gps_diagnostics: match cli.gps_diagnostics {
                GpsDiagnosticsArg::Always => GpsDiagnostics::Always,
                GpsDiagnosticsArg::FallbackOnly => GpsDiagnostics::FallbackOnly,
            },
            anchor_timestamp: match cli.anchor_timestamp {
                AnchorTimestampArg::WallClock => AnchorTimestamp::WallClock,
                AnchorTimestampArg::LoraCapture => AnchorTimestamp::LoraCapture,
            },
            confidence_scoring: cli.enable_confidence,
        },
        health: HealthConfig {
            report_interval_seconds: cli.health_report_interval,
            ..HealthConfig::default()
        },
    };

    bridge::run(config).await?;
    Ok(())
}
