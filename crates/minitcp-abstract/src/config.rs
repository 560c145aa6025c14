use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rejected configuration values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("stream capacity must be non-zero")]
    ZeroCapacity,
    #[error("max payload size must be non-zero")]
    ZeroPayloadSize,
    #[error("retransmission timeout must be non-zero")]
    ZeroTimeout,
    #[error("{name} must lie within [0, 1], got {value}")]
    Probability { name: &'static str, value: f64 },
    #[error("min latency {min} ms exceeds max latency {max} ms")]
    LatencyRange { min: u64, max: u64 },
    #[error("tick interval must be non-zero")]
    ZeroTick,
}

/// Parameters of one TCP endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TcpConfig {
    /// Capacity of the inbound and outbound byte streams.
    pub capacity: u64,
    /// Largest payload carried by a single segment.
    pub max_payload_size: usize,
    /// Initial retransmission timeout in milliseconds.
    pub rt_timeout_ms: u64,
    /// Consecutive retransmissions tolerated before the connection is given up.
    pub max_retx_attempts: u64,
    /// Use this ISN instead of drawing one from the random source.
    pub fixed_isn: Option<u32>,
}

impl TcpConfig {
    pub const DEFAULT_CAPACITY: u64 = 64_000;
    pub const MAX_PAYLOAD_SIZE: usize = 1000;
    pub const TIMEOUT_DFLT: u64 = 1000;
    pub const MAX_RETX_ATTEMPTS: u64 = 8;

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.max_payload_size == 0 {
            return Err(ConfigError::ZeroPayloadSize);
        }
        if self.rt_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            capacity: Self::DEFAULT_CAPACITY,
            max_payload_size: Self::MAX_PAYLOAD_SIZE,
            rt_timeout_ms: Self::TIMEOUT_DFLT,
            max_retx_attempts: Self::MAX_RETX_ATTEMPTS,
            fixed_isn: None,
        }
    }
}

/// Behaviour of the simulated datagram channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    pub loss_rate: f64,
    pub duplicate_rate: f64,
    pub min_latency: u64,
    pub max_latency: u64,
    /// Interval between sender clock ticks, in ms.
    pub tick_ms: u64,
    pub seed: u64,
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("loss_rate", self.loss_rate),
            ("duplicate_rate", self.duplicate_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Probability { name, value });
            }
        }
        if self.min_latency > self.max_latency {
            return Err(ConfigError::LatencyRange {
                min: self.min_latency,
                max: self.max_latency,
            });
        }
        if self.tick_ms == 0 {
            return Err(ConfigError::ZeroTick);
        }
        Ok(())
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            duplicate_rate: 0.0,
            min_latency: 10,
            max_latency: 100,
            tick_ms: 10,
            seed: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(TcpConfig::default().validate(), Ok(()));
        assert_eq!(SimConfig::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_bad_values() {
        let tcp = TcpConfig {
            max_payload_size: 0,
            ..Default::default()
        };
        assert_eq!(tcp.validate(), Err(ConfigError::ZeroPayloadSize));

        let sim = SimConfig {
            loss_rate: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            sim.validate(),
            Err(ConfigError::Probability {
                name: "loss_rate",
                ..
            })
        ));

        let sim = SimConfig {
            min_latency: 50,
            max_latency: 5,
            ..Default::default()
        };
        assert_eq!(
            sim.validate(),
            Err(ConfigError::LatencyRange { min: 50, max: 5 })
        );
    }
}
