use serde::Serialize;
use std::collections::HashMap;

use minitcp_abstract::{SimConfig, TcpConfig};

use crate::engine::LinkEventSummary;

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub config: SimConfig,
    pub tcp: TcpConfig,
    pub duration_ms: u64,
    /// Bytes the receiving application read from the inbound stream.
    pub delivered_data: Vec<u8>,
    pub stream_finished: bool,
    /// Set when the sender gave up after too many consecutive retransmissions.
    pub aborted: bool,
    pub sender_packet_count: u32,
    pub retransmissions: u32,
    pub metrics: HashMap<String, Vec<(u64, f64)>>,
    pub link_events: Vec<LinkEventSummary>,
}
