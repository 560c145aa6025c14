use crate::config::{SimConfig, TcpConfig};
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct TestScenario {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub config: SimConfigOverride,
    #[serde(default)]
    pub tcp: TcpConfigOverride,
    #[serde(default)]
    pub actions: Vec<TestAction>,
    #[serde(default)]
    pub assertions: Vec<TestAssertion>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct SimConfigOverride {
    pub loss_rate: Option<f64>,
    pub duplicate_rate: Option<f64>,
    pub min_latency: Option<u64>,
    pub max_latency: Option<u64>,
    pub tick_ms: Option<u64>,
    pub seed: Option<u64>,
}

impl SimConfigOverride {
    pub fn apply_to(&self, config: &mut SimConfig) {
        if let Some(v) = self.loss_rate {
            config.loss_rate = v;
        }
        if let Some(v) = self.duplicate_rate {
            config.duplicate_rate = v;
        }
        if let Some(v) = self.min_latency {
            config.min_latency = v;
        }
        if let Some(v) = self.max_latency {
            config.max_latency = v;
        }
        if let Some(v) = self.tick_ms {
            config.tick_ms = v;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct TcpConfigOverride {
    pub capacity: Option<u64>,
    pub max_payload_size: Option<usize>,
    pub rt_timeout_ms: Option<u64>,
    pub max_retx_attempts: Option<u64>,
    pub fixed_isn: Option<u32>,
}

impl TcpConfigOverride {
    pub fn apply_to(&self, config: &mut TcpConfig) {
        if let Some(v) = self.capacity {
            config.capacity = v;
        }
        if let Some(v) = self.max_payload_size {
            config.max_payload_size = v;
        }
        if let Some(v) = self.rt_timeout_ms {
            config.rt_timeout_ms = v;
        }
        if let Some(v) = self.max_retx_attempts {
            config.max_retx_attempts = v;
        }
        if let Some(v) = self.fixed_isn {
            config.fixed_isn = Some(v);
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestAction {
    /// Application writes data into the outbound stream at a specific time
    AppSend { time: u64, data: String },
    /// Application closes the outbound stream at a specific time
    AppClose { time: u64 },
    /// Deterministically drop the first segment sent by Sender with given seq number
    DropNextFromSenderSeq { seq: u32 },
    /// Deterministically drop the first ACK sent by Receiver with given ack number
    DropNextFromReceiverAck { ack: u32 },
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestAssertion {
    /// Assert that the inbound stream carried exactly this data
    DataDelivered { data: String },
    /// Assert that the inbound stream was closed and drained
    StreamFinished,
    /// Assert that the total number of segments sent by Sender is within range
    SenderPacketCount { min: u32, max: Option<u32> },
    /// Assert that the sender never needed more than `max` retransmissions in total
    MaxRetransmissions { max: u32 },
    /// Assert that simulation finishes within time
    MaxDuration { ms: u64 },
}
