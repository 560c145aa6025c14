//! A minimal TCP data-transfer engine: byte streams, segment reassembly, and
//! the sending and receiving halves of a connection.
//!
//! Everything here is synchronous. The caller owns the clock and the
//! datagram channel and drives the engine by feeding it segments, stream
//! bytes and elapsed time.

pub mod byte_stream;
pub mod reassembler;
pub mod receiver;
pub mod sender;
pub mod timer;

pub use byte_stream::ByteStream;
pub use reassembler::Reassembler;
pub use receiver::TcpReceiver;
pub use sender::TcpSender;
pub use timer::RetransmitTimer;

pub use minitcp_abstract::{Reader, TcpConfig, TcpReceiverMessage, TcpSenderMessage, Wrap32, Writer};
