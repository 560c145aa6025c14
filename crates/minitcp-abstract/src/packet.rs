use bytes::Bytes;

use crate::message::{TcpReceiverMessage, TcpSenderMessage};
use crate::wrap32::Wrap32;

/// TCP Header flags
pub mod flags {
    pub const FIN: u8 = 0x01;
    pub const SYN: u8 = 0x02;
    pub const ACK: u8 = 0x10;
}

/// The header fields this engine reads or writes. Byte layout and checksums
/// belong to the IP/TCP codec sitting below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TcpHeader {
    /// Sequence Number
    pub seq_num: u32,
    /// Acknowledgment Number, meaningful only with the ACK flag
    pub ack_num: u32,
    pub flags: u8,
    /// Window Size
    pub window_size: u16,
}

impl TcpHeader {
    pub fn new(seq: u32, ack: u32, flags: u8, wnd: u16) -> Self {
        Self {
            seq_num: seq,
            ack_num: ack,
            flags,
            window_size: wnd,
        }
    }

    pub fn is_syn(&self) -> bool {
        self.flags & flags::SYN != 0
    }
    pub fn is_ack(&self) -> bool {
        self.flags & flags::ACK != 0
    }
    pub fn is_fin(&self) -> bool {
        self.flags & flags::FIN != 0
    }
}

/// One datagram on the simulated channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: TcpHeader,
    pub payload: Bytes,
}

impl Packet {
    pub fn new(header: TcpHeader, payload: Bytes) -> Self {
        Self { header, payload }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn sender_message(&self) -> TcpSenderMessage {
        TcpSenderMessage {
            seqno: Wrap32::new(self.header.seq_num),
            syn: self.header.is_syn(),
            payload: self.payload.clone(),
            fin: self.header.is_fin(),
        }
    }

    pub fn receiver_message(&self) -> TcpReceiverMessage {
        TcpReceiverMessage {
            ackno: self
                .header
                .is_ack()
                .then(|| Wrap32::new(self.header.ack_num)),
            window_size: self.header.window_size,
        }
    }
}

impl From<TcpSenderMessage> for Packet {
    fn from(msg: TcpSenderMessage) -> Self {
        let mut bits = 0;
        if msg.syn {
            bits |= flags::SYN;
        }
        if msg.fin {
            bits |= flags::FIN;
        }
        Packet::new(
            TcpHeader::new(msg.seqno.raw_value(), 0, bits, 0),
            msg.payload,
        )
    }
}

impl From<TcpReceiverMessage> for Packet {
    fn from(msg: TcpReceiverMessage) -> Self {
        let (ack, bits) = match msg.ackno {
            Some(ackno) => (ackno.raw_value(), flags::ACK),
            None => (0, 0),
        };
        Packet::new(TcpHeader::new(0, ack, bits, msg.window_size), Bytes::new())
    }
}
