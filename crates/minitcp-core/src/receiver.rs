use minitcp_abstract::{TcpReceiverMessage, TcpSenderMessage, Wrap32, Writer};
use tracing::{debug, trace};

use crate::reassembler::Reassembler;

/// Receiving half of a TCP connection.
///
/// Maps incoming segments onto stream indices for the reassembler and
/// reports how far the inbound stream has got, plus how much room is left.
#[derive(Debug, Default)]
pub struct TcpReceiver {
    isn: Option<Wrap32>,
}

impl TcpReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// The peer's ISN, once its SYN has arrived.
    pub fn isn(&self) -> Option<Wrap32> {
        self.isn
    }

    pub fn receive(
        &mut self,
        message: &TcpSenderMessage,
        reassembler: &mut Reassembler,
        inbound: &mut dyn Writer,
    ) {
        let isn = match self.isn {
            Some(isn) => isn,
            None if message.syn => {
                debug!(isn = %message.seqno, "connection established");
                self.isn = Some(message.seqno);
                message.seqno
            }
            None => {
                trace!(seqno = %message.seqno, "segment before SYN, dropped");
                return;
            }
        };

        let checkpoint = inbound.bytes_pushed() + 1;
        let abs_seqno = message.seqno.unwrap(isn, checkpoint);
        let first_index = if message.syn {
            0
        } else if abs_seqno == 0 {
            // Only the SYN may occupy absolute sequence number zero.
            trace!(seqno = %message.seqno, "non-SYN segment at the ISN, dropped");
            return;
        } else {
            abs_seqno - 1
        };

        reassembler.insert(first_index, &message.payload, message.fin, inbound);
    }

    pub fn send(&self, inbound: &dyn Writer) -> TcpReceiverMessage {
        let closed = u64::from(inbound.is_closed());
        match self.isn {
            // Leave room for the SYN and FIN that have yet to arrive.
            None => TcpReceiverMessage {
                ackno: None,
                window_size: clamp_window(inbound.available_capacity() + 2),
            },
            Some(isn) => TcpReceiverMessage {
                ackno: Some(Wrap32::wrap(inbound.bytes_pushed() + 1 + closed, isn)),
                window_size: clamp_window(inbound.available_capacity() + closed),
            },
        }
    }
}

fn clamp_window(window: u64) -> u16 {
    u16::try_from(window).unwrap_or(u16::MAX)
}
