//! End-to-end scenarios: literal byte streams through framer, parser,
//! validator and materialiser, plus the backoff and rate-limit behaviours
//! around them.

use std::sync::Arc;
use std::time::{Duration, Instant};
use uwb_bridge_rs::cache::{DecodedTelemetry, DevEui, LoraLocation, LoraRecord, UplinkMeta};
use uwb_bridge_rs::mqtt::publisher::parse_rate_limit_command;
use uwb_bridge_rs::mqtt::RateLimit;
use uwb_bridge_rs::network::{AnchorMap, DevEuiMap, NetworkBuilder, NetworkConfig};
use uwb_bridge_rs::resilience::{
    DataValidator, ErrorRecovery, ErrorType, RecoveryConfig, ValidatorConfig,
};
use uwb_bridge_rs::uwb::{Edge, FrameBuffer, NodeId, PacketEvent, TwrParser};
use uwb_bridge_rs::LoraTagCache;

const TWR_TO_METERS: f64 = 0.004690384;
const GPS_TTL: f64 = 300.0;

fn frame(payload: &[u8]) -> Vec<u8> {
    let mut out = vec![0xDC, 0xAC];
    out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

fn assignment_payload(g1: &[u16], g2: &[u16], g3: &[u16]) -> Vec<u8> {
    let mut p = vec![0x02, 0x00, 0x00, 0x00, 0x00, 0x00];
    p.push(g1.len() as u8);
    p.push(g2.len() as u8);
    p.push(g3.len() as u8);
    for id in g1.iter().chain(g2).chain(g3) {
        p.extend_from_slice(&id.to_le_bytes());
    }
    p
}

fn distance_payload(values: &[u16]) -> Vec<u8> {
    let mut p = vec![0x04, 0x00, 0x00, 0x00];
    for v in values {
        p.extend_from_slice(&v.to_le_bytes());
    }
    p
}

/// Push a byte stream through framer and parser, collecting emitted edges.
fn pump(stream: &[u8]) -> (Vec<Vec<Edge>>, u32) {
    let mut framer = FrameBuffer::new();
    let mut parser = TwrParser::new();
    let mut batches = Vec::new();
    let mut parse_errors = 0;

    framer.push(stream);
    while let Some(payload) = framer.next_payload() {
        match parser.handle_payload(&payload) {
            Ok(PacketEvent::Edges(edges)) => batches.push(edges),
            Ok(_) => {}
            Err(_) => parse_errors += 1,
        }
    }
    (batches, parse_errors)
}

fn scenario_stream() -> Vec<u8> {
    // Assignment: groups {B4D3}, {B98A}, {B4F1}; then a distance packet
    // with TWR 1066 (0x042A) for each of the three pairs.
    let mut stream = frame(&assignment_payload(&[0xB4D3], &[0xB98A], &[0xB4F1]));
    stream.extend_from_slice(&frame(&distance_payload(&[1066, 1066, 1066])));
    stream
}

fn tag_record(captured_at: f64) -> LoraRecord {
    LoraRecord {
        dev_eui: DevEui(0xF4CE366381C3C7BD),
        captured_at,
        received_at: None,
        decoded: DecodedTelemetry {
            battery: Some(85.0),
            triage: Some(0),
            ..DecodedTelemetry::default()
        },
        location: Some(LoraLocation {
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

fn plain_builder() -> NetworkBuilder {
    NetworkBuilder::new(
        Arc::new(AnchorMap::default()),
        NetworkConfig::default(),
        GPS_TTL,
    )
}

/// Scenario A: plain assignment + distance round trip. Three nodes, all
/// position-unknown, three symmetric edges of about five metres.
#[test]
fn scenario_a_plain_round_trip() {
    let (batches, errors) = pump(&scenario_stream());
    assert_eq!(errors, 0);
    assert_eq!(batches.len(), 1);

    let network = plain_builder().build(&batches[0], None, 1000.0);

    let ids: Vec<String> = network.uwbs.iter().map(|n| n.id.to_string()).collect();
    assert_eq!(ids, vec!["B4D3", "B4F1", "B98A"]);

    let expected = ((TWR_TO_METERS * 1066.0) * 1000.0).round() / 1000.0;
    for node in &network.uwbs {
        assert!(!node.position_known);
        assert_eq!(node.edges.len(), 2);
        for edge in &node.edges {
            assert!((edge.distance - expected).abs() < 0.001);
            assert!(edge.distance > 0.0 && edge.distance < 300.0);
        }
    }

    // Each edge is carried by both of its endpoints.
    let total_edge_refs: usize = network.uwbs.iter().map(|n| n.edges.len()).sum();
    assert_eq!(total_edge_refs, 2 * 3);
}

/// Scenario A, split delivery: the same stream split at arbitrary octet
/// boundaries produces the same edge sequence.
#[test]
fn scenario_a_split_delivery() {
    let stream = scenario_stream();
    let (expected, _) = pump(&stream);

    for split in 1..stream.len() {
        let mut framer = FrameBuffer::new();
        let mut parser = TwrParser::new();
        let mut batches = Vec::new();
        for chunk in [&stream[..split], &stream[split..]] {
            framer.push(chunk);
            while let Some(payload) = framer.next_payload() {
                if let Ok(PacketEvent::Edges(edges)) = parser.handle_payload(&payload) {
                    batches.push(edges);
                }
            }
        }
        assert_eq!(batches, expected, "split at {split}");
    }
}

/// Scenario B: an anchor map entry overrides one node's position.
#[test]
fn scenario_b_anchor_override() {
    let (batches, _) = pump(&scenario_stream());
    let anchors = AnchorMap::from_entries([(NodeId(0xB4D3), [51.52, -0.75, 0.0])]);
    let builder = NetworkBuilder::new(Arc::new(anchors), NetworkConfig::default(), GPS_TTL);
    let network = builder.build(&batches[0], None, 1000.0);

    for node in &network.uwbs {
        if node.id == NodeId(0xB4D3) {
            assert!(node.position_known);
            assert_eq!(node.lat_lon_alt, [51.52, -0.75, 0.0]);
            assert_eq!(node.position_source.as_deref(), Some("anchor_config"));
        } else {
            assert!(!node.position_known);
        }
    }
}

/// Scenario C: a mapped LoRa record captured 10 s ago injects GPS and
/// telemetry into its node.
#[test]
fn scenario_c_lora_gps_injection() {
    let now = 10_000.0;
    let mapping = DevEuiMap::from_pairs([(DevEui(0xF4CE366381C3C7BD), NodeId(0xB98A))]);
    let cache = LoraTagCache::new(Arc::new(mapping), GPS_TTL, 600.0);
    cache.insert(tag_record(now - 10.0));

    let (batches, _) = pump(&scenario_stream());
    let snapshot = cache.snapshot_at(now);
    let network = plain_builder().build(&batches[0], Some(&snapshot), now);

    let tagged = network
        .uwbs
        .iter()
        .find(|n| n.id == NodeId(0xB98A))
        .unwrap();
    assert!(tagged.position_known);
    assert_eq!(tagged.lat_lon_alt, [51.5238, -0.7514, 50.8]);
    assert_eq!(tagged.position_accuracy, 5.0);
    assert_eq!(tagged.position_source.as_deref(), Some("frm-payload"));
    assert_eq!(tagged.battery, Some(85.0));
    assert_eq!(tagged.last_position_update_time, now - 10.0);

    assert!(network
        .uwbs
        .iter()
        .filter(|n| n.id != NodeId(0xB98A))
        .all(|n| !n.position_known));
}

/// Scenario C continued: once the record ages past the GPS TTL the snapshot
/// no longer carries it and the node reverts to unknown.
#[test]
fn scenario_c_ttl_expiry() {
    let mapping = DevEuiMap::from_pairs([(DevEui(0xF4CE366381C3C7BD), NodeId(0xB98A))]);
    let cache = LoraTagCache::new(Arc::new(mapping), GPS_TTL, 600.0);
    cache.insert(tag_record(1000.0));

    let late = 1000.0 + GPS_TTL + 0.5;
    let snapshot = cache.snapshot_at(late);
    assert!(snapshot.is_empty());

    let (batches, _) = pump(&scenario_stream());
    let network = plain_builder().build(&batches[0], Some(&snapshot), late);
    assert!(network.uwbs.iter().all(|n| !n.position_known));
}

/// Scenario D: a distance outside the validator's bounds is excluded from
/// the publish and lands in the validation-failures batch instead.
#[test]
fn scenario_d_validation_rejection() {
    // TWR encoding ~250 m; the parser accepts it (under the 300 m cap) and
    // the validator, tightened to 200 m, rejects it.
    let twr_250m = (250.0 / TWR_TO_METERS).round() as u16;
    let mut stream = frame(&assignment_payload(&[0xB4D3], &[0xB98A], &[0xB4F1]));
    stream.extend_from_slice(&frame(&distance_payload(&[1066, twr_250m, 1066])));

    let (batches, _) = pump(&stream);
    assert_eq!(batches[0].len(), 3);

    let validator = Arc::new(DataValidator::new(ValidatorConfig {
        max_distance_meters: 200.0,
        ..ValidatorConfig::default()
    }));
    let (valid, failures) = validator.validate_edge_list(&batches[0], 1000.0);

    assert_eq!(valid.len(), 2);
    assert_eq!(failures.len(), 1);
    let failure = &failures[0];
    assert_eq!(failure.kind, "distance");
    assert_eq!(failure.edge.0, NodeId(0xB4D3));
    assert_eq!(failure.edge.1, NodeId(0xB4F1));
    assert!(failure.reason.contains("maximum 200m"));

    // The rejected edge is absent from the materialised network.
    let builder = NetworkBuilder::new(
        Arc::new(AnchorMap::default()),
        NetworkConfig::default(),
        GPS_TTL,
    )
    .with_validator(validator);
    let network = builder.build(&valid, None, 1000.0);
    for node in &network.uwbs {
        assert!(node.edges.iter().all(|e| e.distance < 200.0));
    }
}

/// Scenario E: the parsing-error threshold triggers one reset; further
/// bursts are held back by the backoff window, which then doubles.
#[test]
fn scenario_e_exponential_backoff() {
    let mut recovery = ErrorRecovery::new(RecoveryConfig::default());
    let mut parser = TwrParser::new();
    parser
        .handle_payload(&assignment_payload(&[0xB4D3], &[0xB98A], &[0xB4F1]))
        .unwrap();

    // Distance payload truncated mid-value: a parse error every time.
    let mut malformed = distance_payload(&[1066, 1066, 1066]);
    malformed.truncate(malformed.len() - 1);

    let mut resets: Vec<f64> = Vec::new();
    let mut feed = |parser: &mut TwrParser, recovery: &mut ErrorRecovery, resets: &mut Vec<f64>, at: f64| {
        assert!(parser.handle_payload(&malformed).is_err());
        if recovery.record_error(ErrorType::Parsing) && recovery.should_reset_with_backoff_at(at) {
            recovery.record_reset_at(at);
            recovery.reset_error_counts(Some(ErrorType::Parsing));
            resets.push(at);
        }
    };

    // Three malformed payloads: exactly one reset, on the third.
    for at in [100.0, 100.1, 100.2] {
        feed(&mut parser, &mut recovery, &mut resets, at);
    }
    assert_eq!(resets, vec![100.2]);

    // Three more within the one-second window: the threshold fires but the
    // backoff suppresses a second reset.
    for at in [100.3, 100.4, 100.5] {
        feed(&mut parser, &mut recovery, &mut resets, at);
    }
    assert_eq!(resets.len(), 1);

    // Past the window the pending threshold fires again.
    feed(&mut parser, &mut recovery, &mut resets, 101.3);
    assert_eq!(resets.len(), 2);

    // After the second reset the window is at least two seconds.
    assert!(recovery.current_backoff_seconds() >= 2.0);
    for at in [102.0, 102.1, 102.2] {
        feed(&mut parser, &mut recovery, &mut resets, at);
    }
    assert_eq!(resets.len(), 2);
    feed(&mut parser, &mut recovery, &mut resets, 103.4);
    assert_eq!(resets.len(), 3);
}

/// Scenario F: a command on the cmd topic lowers the rate limit live.
#[test]
fn scenario_f_command_driven_rate_change() {
    let limit = RateLimit::new(10.0);
    let t0 = Instant::now();
    assert!(limit.try_acquire_at(t0));

    let value = parse_rate_limit_command("set rate_limit 2").unwrap();
    limit.set_interval_seconds(value);

    let t1 = t0 + Duration::from_secs_f64(2.1);
    assert!(limit.try_acquire_at(t1), "publish within 2.1s must go out");
    assert!(
        !limit.try_acquire_at(t1 + Duration::from_secs_f64(1.9)),
        "attempt within 1.9s must be suppressed"
    );
}

/// Boundary TWR values around the 300 m cap, end to end: only the strictly
/// in-range values survive into the published edges.
#[test]
fn scenario_boundary_twr_values() {
    let floor = (300.0 / TWR_TO_METERS).floor() as u16; // 63960
    let ceil = (300.0 / TWR_TO_METERS).ceil() as u16; // 63961
    let mut stream = frame(&assignment_payload(&[0xB4D3], &[0xB98A], &[0xB4F1]));
    stream.extend_from_slice(&frame(&distance_payload(&[0, 1, floor])));
    stream.extend_from_slice(&frame(&distance_payload(&[ceil, ceil, ceil])));

    let (batches, errors) = pump(&stream);
    assert_eq!(errors, 0);
    assert_eq!(batches.len(), 2);

    let first: Vec<f64> = batches[0].iter().map(|e| e.distance_m as f64).collect();
    assert_eq!(first.len(), 2);
    assert!(first.iter().all(|d| *d > 0.0 && *d < 300.0));
    assert!(batches[1].is_empty());
}

/// G3 sentinel resolution end to end: the trailing id in the distance
/// packet fills the open slot and the pairings use the resolved id.
#[test]
fn scenario_sentinel_resolution() {
    let mut distance = distance_payload(&[1066, 1066, 1066]);
    distance.extend_from_slice(&0xB4F1_u16.to_le_bytes());
    let mut stream = frame(&assignment_payload(&[0xB4D3], &[0xB98A], &[0]));
    stream.extend_from_slice(&frame(&distance));

    let (batches, errors) = pump(&stream);
    assert_eq!(errors, 0);
    let pairs: Vec<(u16, u16)> = batches[0].iter().map(|e| (e.a.0, e.b.0)).collect();
    assert_eq!(
        pairs,
        vec![(0xB4D3, 0xB98A), (0xB4D3, 0xB4F1), (0xB98A, 0xB4F1)]
    );

    // A network built from these edges never contains the sentinel id.
    let network = plain_builder().build(&batches[0], None, 1000.0);
    assert!(network.uwbs.iter().all(|n| n.id != NodeId(0)));
}

/// Rate-limit invariant: no two grants closer than the interval.
#[test]
fn scenario_rate_limit_floor() {
    let limit = RateLimit::new(3.0);
    let t0 = Instant::now();
    let mut granted = Vec::new();
    for tenths in 0..100u64 {
        let at = t0 + Duration::from_millis(tenths * 100);
        if limit.try_acquire_at(at) {
            granted.push(tenths);
        }
    }
    assert!(granted.len() > 1);
    for pair in granted.windows(2) {
        assert!(pair[1] - pair[0] >= 30, "grants too close: {pair:?}");
    }
}
