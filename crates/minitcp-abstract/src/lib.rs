pub mod config;
pub mod interface;
pub mod message;
pub mod packet;
pub mod scenario;
pub mod wrap32;

pub use interface::{Reader, Writer};
pub use message::{TcpReceiverMessage, TcpSenderMessage};
pub use packet::{Packet, TcpHeader};
pub use packet::flags;
pub use wrap32::Wrap32;

pub use config::{ConfigError, SimConfig, TcpConfig};
pub use scenario::{
    SimConfigOverride, TcpConfigOverride, TestAction, TestAssertion, TestScenario,
};
