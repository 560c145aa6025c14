use std::path::PathBuf;

use minitcp_simulator::scenario_runner::{load_scenario, run, run_scenario};

fn scenario_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("scenarios")
        .join(name)
}

#[test]
fn basic_transfer() {
    let report = run_scenario(&scenario_path("basic.toml")).expect("basic scenario");
    assert!(!report.aborted);
    assert_eq!(report.delivered_data, b"Hello, world!");
}

#[test]
fn lost_segment_is_retransmitted() {
    let report = run_scenario(&scenario_path("lost_segment.toml")).expect("lost segment");
    assert_eq!(report.retransmissions, 1);
    assert!(
        report
            .link_events
            .iter()
            .any(|e| e.description.contains("DROP (deterministic seq) seq=1"))
    );
}

#[test]
fn lost_ack_triggers_one_retransmission() {
    let report = run_scenario(&scenario_path("lost_ack.toml")).expect("lost ack");
    assert_eq!(report.retransmissions, 1);
    // The RTO doubled once and came back down when the ack finally arrived.
    let rto = &report.metrics["rto_ms"];
    assert!(rto.iter().any(|&(_, v)| v == 2000.0));
    assert_eq!(rto.last().map(|&(_, v)| v), Some(1000.0));
}

#[test]
fn lossy_channel() {
    let report = run_scenario(&scenario_path("lossy.toml")).expect("lossy scenario");
    assert!(report.stream_finished);
    assert!(report.retransmissions > 0);
    assert!(
        report
            .link_events
            .iter()
            .any(|e| e.description.contains("DROP (random loss)"))
    );
}

#[test]
fn small_window_throttles_sender() {
    let report = run_scenario(&scenario_path("small_window.toml")).expect("small window");
    let in_flight = &report.metrics["in_flight"];
    assert!(in_flight.iter().all(|&(_, v)| v <= 4.0));
    assert!(report.sender_packet_count >= 12);
}

#[test]
fn dead_link_aborts() {
    let scenario = load_scenario(&scenario_path("dead_link.toml")).expect("parse");
    let report = run(&scenario).expect("no assertions to fail");
    assert!(report.aborted);
    assert!(!report.stream_finished);
    assert!(report.delivered_data.is_empty());
    assert_eq!(report.retransmissions, 4);
}

#[test]
fn every_bundled_scenario_parses() {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("scenarios");
    let mut count = 0;
    for entry in std::fs::read_dir(dir).expect("scenario dir") {
        let path = entry.expect("dir entry").path();
        if path.extension().is_some_and(|ext| ext == "toml") {
            load_scenario(&path).unwrap_or_else(|e| panic!("{}: {e:#}", path.display()));
            count += 1;
        }
    }
    assert_eq!(count, 6);
}
