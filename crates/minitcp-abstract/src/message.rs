use bytes::Bytes;

use crate::wrap32::Wrap32;

/// A segment travelling from a sender to the peer's receiver.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TcpSenderMessage {
    pub seqno: Wrap32,
    pub syn: bool,
    pub payload: Bytes,
    pub fin: bool,
}

impl TcpSenderMessage {
    /// Sequence numbers occupied by this segment; SYN and FIN count one each.
    pub fn sequence_length(&self) -> u64 {
        self.payload.len() as u64 + u64::from(self.syn) + u64::from(self.fin)
    }
}

/// Acknowledgment and flow-control feedback from a receiver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TcpReceiverMessage {
    /// Next sequence number the receiver needs; absent before a SYN arrived.
    pub ackno: Option<Wrap32>,
    pub window_size: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_length_counts_flags() {
        let msg = TcpSenderMessage {
            seqno: Wrap32::new(9),
            syn: true,
            payload: Bytes::from_static(b"hello"),
            fin: true,
        };
        assert_eq!(msg.sequence_length(), 7);
        assert_eq!(TcpSenderMessage::default().sequence_length(), 0);
    }
}
