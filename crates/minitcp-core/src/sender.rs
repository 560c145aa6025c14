use std::collections::VecDeque;

use minitcp_abstract::{Reader, TcpConfig, TcpReceiverMessage, TcpSenderMessage, Wrap32};
use rand::Rng;
use tracing::{debug, trace};

use crate::timer::RetransmitTimer;

/// A segment that has been queued but not yet fully acknowledged.
#[derive(Debug, Clone)]
struct OutstandingSegment {
    abs_seqno: u64,
    message: TcpSenderMessage,
}

impl OutstandingSegment {
    fn end(&self) -> u64 {
        self.abs_seqno + self.message.sequence_length()
    }
}

/// Sending half of a TCP connection.
///
/// Turns bytes read from an outbound stream into segments that fit the
/// peer's advertised window, keeps every segment until it is acknowledged,
/// and resends the oldest one whenever the retransmission timer fires.
#[derive(Debug)]
pub struct TcpSender {
    isn: Wrap32,
    max_payload_size: u64,
    timer: RetransmitTimer,

    next_abs_seqno: u64,
    acked_abs_seqno: u64,
    /// Last advertised window, zero included.
    window_size: u16,
    syn_sent: bool,
    fin_sent: bool,

    to_send: VecDeque<TcpSenderMessage>,
    outstanding: VecDeque<OutstandingSegment>,
    in_flight: u64,
    consecutive_retransmissions: u64,
}

impl TcpSender {
    /// Build a sender. The ISN comes from `config.fixed_isn` when set and is
    /// drawn from `rng` otherwise.
    pub fn new(config: &TcpConfig, rng: &mut impl Rng) -> Self {
        let isn = match config.fixed_isn {
            Some(raw) => Wrap32::new(raw),
            None => Wrap32::new(rng.random()),
        };
        Self {
            isn,
            max_payload_size: config.max_payload_size as u64,
            timer: RetransmitTimer::new(config.rt_timeout_ms),
            next_abs_seqno: 0,
            acked_abs_seqno: 0,
            window_size: 1,
            syn_sent: false,
            fin_sent: false,
            to_send: VecDeque::new(),
            outstanding: VecDeque::new(),
            in_flight: 0,
            consecutive_retransmissions: 0,
        }
    }

    pub fn isn(&self) -> Wrap32 {
        self.isn
    }

    /// Fill the window with segments built from `outbound`.
    pub fn push(&mut self, outbound: &mut dyn Reader) {
        while !self.fin_sent {
            let mut message = TcpSenderMessage {
                seqno: Wrap32::wrap(self.next_abs_seqno, self.isn),
                ..Default::default()
            };

            if !self.syn_sent {
                // The SYN goes out alone, with FIN riding along if the
                // stream is already over.
                message.syn = true;
                message.fin = outbound.is_finished();
            } else {
                // A zero window is probed as if it were one byte wide.
                let window = u64::from(self.window_size.max(1));
                let room = window.saturating_sub(self.in_flight);
                if room == 0 {
                    break;
                }
                message.payload = outbound.read(room.min(self.max_payload_size));
                message.fin =
                    outbound.is_finished() && (message.payload.len() as u64) < room;
            }

            if message.sequence_length() == 0 {
                break;
            }
            self.queue(message);
        }
    }

    fn queue(&mut self, message: TcpSenderMessage) {
        let len = message.sequence_length();
        trace!(
            abs_seqno = self.next_abs_seqno,
            len,
            syn = message.syn,
            fin = message.fin,
            "queue segment"
        );
        self.syn_sent |= message.syn;
        self.fin_sent |= message.fin;
        self.outstanding.push_back(OutstandingSegment {
            abs_seqno: self.next_abs_seqno,
            message: message.clone(),
        });
        self.to_send.push_back(message);
        self.next_abs_seqno += len;
        self.in_flight += len;
    }

    /// Next segment to put on the wire, if any.
    pub fn maybe_send(&mut self) -> Option<TcpSenderMessage> {
        let message = self.to_send.pop_front()?;
        if !self.timer.is_running() && !self.outstanding.is_empty() {
            self.timer.start();
        }
        Some(message)
    }

    /// A segment occupying no sequence space, for pure acknowledgments.
    pub fn send_empty_message(&self) -> TcpSenderMessage {
        TcpSenderMessage {
            seqno: Wrap32::wrap(self.next_abs_seqno, self.isn),
            ..Default::default()
        }
    }

    pub fn receive(&mut self, message: &TcpReceiverMessage) {
        let abs_ackno = message
            .ackno
            .map(|ackno| ackno.unwrap(self.isn, self.next_abs_seqno));
        if let Some(abs_ackno) = abs_ackno
            && abs_ackno > self.next_abs_seqno
        {
            debug!(
                abs_ackno,
                next = self.next_abs_seqno,
                "ignoring ack for data never sent"
            );
            return;
        }

        self.window_size = message.window_size;

        let Some(abs_ackno) = abs_ackno else {
            return;
        };
        if abs_ackno <= self.acked_abs_seqno {
            return;
        }
        self.acked_abs_seqno = abs_ackno;

        while let Some(front) = self.outstanding.front()
            && front.end() <= abs_ackno
        {
            self.in_flight -= front.message.sequence_length();
            self.outstanding.pop_front();
        }
        let (isn, next) = (self.isn, self.next_abs_seqno);
        self.to_send.retain(|queued| {
            queued.seqno.unwrap(isn, next) + queued.sequence_length() > abs_ackno
        });

        self.timer.reset_rto();
        self.consecutive_retransmissions = 0;
        if self.outstanding.is_empty() {
            self.timer.stop();
        } else {
            self.timer.start();
        }
    }

    /// Let `ms_since_last_tick` milliseconds pass.
    pub fn tick(&mut self, ms_since_last_tick: u64) {
        if !self.timer.advance(ms_since_last_tick) {
            return;
        }
        let Some(oldest) = self.outstanding.front() else {
            self.timer.stop();
            return;
        };

        debug!(
            abs_seqno = oldest.abs_seqno,
            rto_ms = self.timer.rto_ms(),
            window = self.window_size,
            "retransmission timeout"
        );
        self.to_send.push_front(oldest.message.clone());
        self.consecutive_retransmissions += 1;
        // No backoff while the peer advertises a zero window.
        if self.window_size != 0 {
            self.timer.back_off();
        }
        self.timer.start();
    }

    /// Sequence numbers queued or sent but not yet acknowledged.
    pub fn sequence_numbers_in_flight(&self) -> u64 {
        self.in_flight
    }

    pub fn consecutive_retransmissions(&self) -> u64 {
        self.consecutive_retransmissions
    }

    /// Current retransmission timeout in milliseconds.
    pub fn current_rto_ms(&self) -> u64 {
        self.timer.rto_ms()
    }

    /// Whether the FIN has been queued; after this no more segments are built.
    pub fn is_fin_sent(&self) -> bool {
        self.fin_sent
    }
}
