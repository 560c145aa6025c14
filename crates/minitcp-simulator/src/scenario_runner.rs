use anyhow::{Context, anyhow};
use minitcp_abstract::{SimConfig, TcpConfig, TestAction, TestAssertion, TestScenario};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::engine::Simulator;
use crate::trace::SimulationReport;

/// Simulated time allowed when a scenario has no `max_duration` assertion.
pub const DEFAULT_MAX_DURATION_MS: u64 = 60_000;

pub fn load_scenario(path: &Path) -> anyhow::Result<TestScenario> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
    parse_scenario(&content)
}

pub fn parse_scenario(content: &str) -> anyhow::Result<TestScenario> {
    toml::from_str(content).context("Failed to parse scenario")
}

pub fn run_scenario(scenario_path: &Path) -> anyhow::Result<SimulationReport> {
    let scenario = load_scenario(scenario_path)?;
    run(&scenario)
}

/// Build a simulator for `scenario`, with all of its actions scheduled.
pub fn build_simulator(scenario: &TestScenario) -> anyhow::Result<Simulator> {
    let mut config = SimConfig::default();
    scenario.config.apply_to(&mut config);
    let mut tcp = TcpConfig::default();
    scenario.tcp.apply_to(&mut tcp);

    let mut sim = Simulator::new(config, tcp)
        .with_context(|| format!("Scenario '{}' has an invalid config", scenario.name))?;
    configure_actions(&mut sim, &scenario.actions);
    Ok(sim)
}

pub fn configure_actions(sim: &mut Simulator, actions: &[TestAction]) {
    for action in actions {
        match action {
            TestAction::AppSend { time, data } => {
                sim.schedule_app_send(*time, data.as_bytes().to_vec());
            }
            TestAction::AppClose { time } => {
                sim.schedule_app_close(*time);
            }
            TestAction::DropNextFromSenderSeq { seq } => {
                sim.add_drop_sender_seq_once(*seq);
            }
            TestAction::DropNextFromReceiverAck { ack } => {
                sim.add_drop_receiver_ack_once(*ack);
            }
        }
    }
}

/// Run `scenario` to completion and check its assertions.
pub fn run(scenario: &TestScenario) -> anyhow::Result<SimulationReport> {
    info!("Running Scenario: {}", scenario.name);
    if !scenario.description.is_empty() {
        info!("Description: {}", scenario.description);
    }

    let mut sim = build_simulator(scenario)?;
    sim.init();

    let max_duration = scenario
        .assertions
        .iter()
        .find_map(|a| match a {
            TestAssertion::MaxDuration { ms } => Some(*ms),
            _ => None,
        })
        .unwrap_or(DEFAULT_MAX_DURATION_MS);

    while let Some(next) = sim.peek_next_event_time() {
        if next > max_duration {
            return Err(anyhow!("Test timed out after {} ms", max_duration));
        }
        sim.step();
    }

    let report = sim.export_report();
    check_assertions(&scenario.assertions, &report)?;
    info!("Test Scenario Passed!");
    Ok(report)
}

pub fn check_assertions(
    assertions: &[TestAssertion],
    report: &SimulationReport,
) -> anyhow::Result<()> {
    for assertion in assertions {
        match assertion {
            TestAssertion::DataDelivered { data } => {
                if report.delivered_data != data.as_bytes() {
                    return Err(anyhow!(
                        "Assertion Failed: expected {:?} to be delivered, got {:?}",
                        data,
                        String::from_utf8_lossy(&report.delivered_data)
                    ));
                }
            }
            TestAssertion::StreamFinished => {
                if !report.stream_finished {
                    return Err(anyhow!(
                        "Assertion Failed: inbound stream did not finish (aborted: {})",
                        report.aborted
                    ));
                }
            }
            TestAssertion::SenderPacketCount { min, max } => {
                if report.sender_packet_count < *min {
                    return Err(anyhow!(
                        "Assertion Failed: Sender sent {} packets, expected min {}",
                        report.sender_packet_count,
                        min
                    ));
                }
                if let Some(max) = max
                    && report.sender_packet_count > *max
                {
                    return Err(anyhow!(
                        "Assertion Failed: Sender sent {} packets, expected max {}",
                        report.sender_packet_count,
                        max
                    ));
                }
            }
            TestAssertion::MaxRetransmissions { max } => {
                if report.retransmissions > *max {
                    return Err(anyhow!(
                        "Assertion Failed: {} retransmissions, expected at most {}",
                        report.retransmissions,
                        max
                    ));
                }
            }
            TestAssertion::MaxDuration { .. } => {} // Already checked
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLEAN: &str = r#"
        name = "clean"

        [tcp]
        fixed_isn = 100

        [[actions]]
        type = "app_send"
        time = 0
        data = "ping"

        [[actions]]
        type = "app_close"
        time = 0

        [[assertions]]
        type = "data_delivered"
        data = "ping"

        [[assertions]]
        type = "stream_finished"

        [[assertions]]
        type = "max_retransmissions"
        max = 0
    "#;

    #[test]
    fn clean_scenario_passes() {
        let scenario = parse_scenario(CLEAN).expect("parse");
        let report = run(&scenario).expect("scenario passes");
        assert_eq!(report.delivered_data, b"ping");
        assert_eq!(report.tcp.fixed_isn, Some(100));
    }

    #[test]
    fn wrong_data_fails_assertion() {
        let mut scenario = parse_scenario(CLEAN).expect("parse");
        scenario.assertions.push(TestAssertion::DataDelivered {
            data: "pong".to_string(),
        });
        let err = run(&scenario).expect_err("data mismatch");
        assert!(err.to_string().contains("pong"));
    }

    #[test]
    fn timeout_is_reported() {
        let scenario = parse_scenario(
            r#"
            name = "dead link"
            [config]
            loss_rate = 1.0
            [tcp]
            max_retx_attempts = 30
            [[actions]]
            type = "app_send"
            time = 0
            data = "x"
            [[assertions]]
            type = "max_duration"
            ms = 5000
            "#,
        )
        .expect("parse");
        let err = run(&scenario).expect_err("times out");
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn packet_count_bounds() {
        let report = SimulationReport {
            config: SimConfig::default(),
            tcp: TcpConfig::default(),
            duration_ms: 0,
            delivered_data: Vec::new(),
            stream_finished: false,
            aborted: false,
            sender_packet_count: 5,
            retransmissions: 0,
            metrics: Default::default(),
            link_events: Vec::new(),
        };
        let within = [TestAssertion::SenderPacketCount {
            min: 3,
            max: Some(5),
        }];
        assert!(check_assertions(&within, &report).is_ok());
        let above = [TestAssertion::SenderPacketCount { min: 6, max: None }];
        assert!(check_assertions(&above, &report).is_err());
        let finished = [TestAssertion::StreamFinished];
        assert!(check_assertions(&finished, &report).is_err());
    }
}
