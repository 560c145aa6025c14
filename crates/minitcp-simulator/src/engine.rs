use crate::trace::SimulationReport;
use anyhow::Context;
use minitcp_abstract::{Packet, SimConfig, TcpConfig, flags};
use minitcp_core::{ByteStream, Reader, Reassembler, TcpReceiver, TcpSender, Writer};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeId {
    Sender,
    Receiver,
}

impl NodeId {
    pub fn peer(&self) -> Self {
        match self {
            NodeId::Sender => NodeId::Receiver,
            NodeId::Receiver => NodeId::Sender,
        }
    }
}

#[derive(Debug)]
pub enum EventType {
    PacketArrival { to: NodeId, packet: Packet },
    /// Periodic clock tick delivered to the sender.
    Tick,
    AppSend { data: Vec<u8> },
    AppClose,
}

#[derive(Debug)]
struct Event {
    time: u64,
    event_type: EventType,
    id: u64, // Unique ID to differentiate events at same time
}

// Custom Ord for Min-Heap (smallest time pops first)
impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.id == other.id
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// A compact textual summary of one link-layer event.
#[derive(Debug, Clone, Serialize)]
pub struct LinkEventSummary {
    pub time: u64,
    pub description: String,
}

/// The sending host: an application-facing outbound stream feeding a sender.
struct SenderHost {
    outbound: ByteStream,
    sender: TcpSender,
    /// Application bytes still waiting for room in `outbound`.
    backlog: Vec<u8>,
    close_requested: bool,
}

impl SenderHost {
    /// Move as much of the backlog as fits into the outbound stream, then
    /// close it if the application asked to and nothing is left behind.
    fn feed(&mut self) {
        if !self.backlog.is_empty() {
            let room = self.outbound.available_capacity();
            let n = (self.backlog.len() as u64).min(room) as usize;
            self.outbound.push(&self.backlog[..n]);
            self.backlog.drain(..n);
        }
        if self.close_requested && self.backlog.is_empty() && !self.outbound.is_closed() {
            self.outbound.close();
        }
    }
}

/// The receiving host: receiver, reassembler and the inbound stream they fill.
struct ReceiverHost {
    receiver: TcpReceiver,
    reassembler: Reassembler,
    inbound: ByteStream,
}

/// Deterministic discrete-event loopback between one sender and one receiver.
///
/// All randomness (ISN, loss, duplication, latency) is drawn from a single
/// generator seeded by `SimConfig::seed`, so a run is fully reproducible.
pub struct Simulator {
    time: u64,
    event_queue: BinaryHeap<Event>,
    event_id_counter: u64,

    config: SimConfig,
    tcp: TcpConfig,
    rng: StdRng,

    sender_host: SenderHost,
    receiver_host: ReceiverHost,

    pub delivered_data: Vec<u8>,
    pub sender_packet_count: u32,
    pub retransmissions: u32,
    pub aborted: bool,

    /// Key: metric name (e.g., "rto_ms"), Value: Vec<(time_ms, value)>
    pub metrics: HashMap<String, Vec<(u64, f64)>>,

    // Deterministic fault injection: drop first segment from Sender with given seq numbers
    drop_sender_seq_once: Vec<u32>,
    // Deterministic fault injection: drop first ACK from Receiver with given ack numbers
    drop_receiver_ack_once: Vec<u32>,

    pub link_events: Vec<LinkEventSummary>,
}

impl Simulator {
    pub fn new(config: SimConfig, tcp: TcpConfig) -> anyhow::Result<Self> {
        config.validate().context("Invalid simulation config")?;
        tcp.validate().context("Invalid TCP config")?;

        let mut rng = StdRng::seed_from_u64(config.seed);
        let sender = TcpSender::new(&tcp, &mut rng);
        debug!(isn = %sender.isn(), "sender initialised");

        Ok(Self {
            time: 0,
            event_queue: BinaryHeap::new(),
            event_id_counter: 0,
            sender_host: SenderHost {
                outbound: ByteStream::new(tcp.capacity),
                sender,
                backlog: Vec::new(),
                close_requested: false,
            },
            receiver_host: ReceiverHost {
                receiver: TcpReceiver::new(),
                reassembler: Reassembler::new(),
                inbound: ByteStream::new(tcp.capacity),
            },
            config,
            tcp,
            rng,
            delivered_data: Vec::new(),
            sender_packet_count: 0,
            retransmissions: 0,
            aborted: false,
            metrics: HashMap::new(),
            drop_sender_seq_once: Vec::new(),
            drop_receiver_ack_once: Vec::new(),
            link_events: Vec::new(),
        })
    }

    /// Register a deterministic fault: drop the first segment sent by Sender whose seq equals `seq`.
    pub fn add_drop_sender_seq_once(&mut self, seq: u32) {
        self.drop_sender_seq_once.push(seq);
    }

    /// Register a deterministic fault: drop the first ACK sent by Receiver whose ack equals `ack`.
    pub fn add_drop_receiver_ack_once(&mut self, ack: u32) {
        self.drop_receiver_ack_once.push(ack);
    }

    pub fn metric_series(&self, name: &str) -> Option<&[(u64, f64)]> {
        self.metrics.get(name).map(|v| v.as_slice())
    }

    /// Whether the inbound stream has been closed and fully read.
    pub fn stream_finished(&self) -> bool {
        self.receiver_host.inbound.is_finished()
    }

    pub fn inbound_has_error(&self) -> bool {
        Writer::has_error(&self.receiver_host.inbound)
    }

    fn push_event(&mut self, time: u64, event_type: EventType) {
        self.event_queue.push(Event {
            time,
            event_type,
            id: self.event_id_counter,
        });
        self.event_id_counter += 1;
    }

    pub fn schedule_app_send(&mut self, time: u64, data: Vec<u8>) {
        self.push_event(time, EventType::AppSend { data });
    }

    pub fn schedule_app_close(&mut self, time: u64) {
        self.push_event(time, EventType::AppClose);
    }

    /// Send the SYN and start the clock. Call once, after scheduling actions.
    pub fn init(&mut self) {
        info!(
            seed = self.config.seed,
            loss_rate = self.config.loss_rate,
            duplicate_rate = self.config.duplicate_rate,
            "simulation starting"
        );
        self.pump_sender();
        self.push_event(self.time + self.config.tick_ms, EventType::Tick);
    }

    pub fn peek_next_event_time(&self) -> Option<u64> {
        self.event_queue.peek().map(|e| e.time)
    }

    pub fn current_time(&self) -> u64 {
        self.time
    }

    /// Process the next event. Returns true if an event was processed, false if queue is empty.
    pub fn step(&mut self) -> bool {
        let Some(event) = self.event_queue.pop() else {
            return false;
        };

        self.time = event.time;

        match event.event_type {
            EventType::PacketArrival { to: NodeId::Receiver, packet } => {
                self.on_segment(&packet);
            }
            EventType::PacketArrival { to: NodeId::Sender, packet } => {
                self.sender_host
                    .sender
                    .receive(&packet.receiver_message());
                self.pump_sender();
            }
            EventType::Tick => self.on_tick(),
            EventType::AppSend { data } => {
                debug!(time = self.time, len = data.len(), "application write");
                self.sender_host.backlog.extend_from_slice(&data);
                self.pump_sender();
            }
            EventType::AppClose => {
                debug!(time = self.time, "application close");
                self.sender_host.close_requested = true;
                self.pump_sender();
            }
        }
        true
    }

    /// Produce a serializable snapshot of the current simulation state.
    pub fn export_report(&self) -> SimulationReport {
        SimulationReport {
            config: self.config.clone(),
            tcp: self.tcp.clone(),
            duration_ms: self.time,
            delivered_data: self.delivered_data.clone(),
            stream_finished: self.stream_finished(),
            aborted: self.aborted,
            sender_packet_count: self.sender_packet_count,
            retransmissions: self.retransmissions,
            metrics: self.metrics.clone(),
            link_events: self.link_events.clone(),
        }
    }

    pub fn run_until_complete(&mut self) {
        self.init();
        while self.step() {}
    }

    fn on_segment(&mut self, packet: &Packet) {
        let host = &mut self.receiver_host;
        let was_finished = host.inbound.is_finished();
        host.receiver.receive(
            &packet.sender_message(),
            &mut host.reassembler,
            &mut host.inbound,
        );

        // The application drains everything that arrived in order.
        let available = host.inbound.bytes_buffered();
        let data = host.inbound.read(available);
        if !data.is_empty() {
            self.link_events.push(LinkEventSummary {
                time: self.time,
                description: format!("[Receiver] DELIVERED {} bytes to application", data.len()),
            });
            self.delivered_data.extend_from_slice(&data);
        }
        if !was_finished && self.receiver_host.inbound.is_finished() {
            info!(
                time = self.time,
                bytes = self.delivered_data.len(),
                "inbound stream finished"
            );
        }

        let reply = self.receiver_host.receiver.send(&self.receiver_host.inbound);
        self.transmit(NodeId::Receiver, reply.into());
    }

    fn on_tick(&mut self) {
        let before = self.sender_host.sender.consecutive_retransmissions();
        self.sender_host.sender.tick(self.config.tick_ms);
        let after = self.sender_host.sender.consecutive_retransmissions();

        if after > before {
            self.retransmissions += 1;
            self.record_metric("consecutive_retransmissions", after as f64);
        }
        if after > self.tcp.max_retx_attempts {
            warn!(
                time = self.time,
                attempts = after,
                limit = self.tcp.max_retx_attempts,
                "too many consecutive retransmissions, aborting connection"
            );
            self.link_events.push(LinkEventSummary {
                time: self.time,
                description: format!("[Sender] ABORT after {after} consecutive retransmissions"),
            });
            self.receiver_host.inbound.set_error();
            self.aborted = true;
            self.event_queue.clear();
            return;
        }

        self.pump_sender();

        // Keep the clock running while anything is still outstanding or scheduled.
        if self.sender_host.sender.sequence_numbers_in_flight() > 0 || !self.event_queue.is_empty()
        {
            self.push_event(self.time + self.config.tick_ms, EventType::Tick);
        }
    }

    /// Let the sender read from its outbound stream and put every ready segment on the wire.
    fn pump_sender(&mut self) {
        let host = &mut self.sender_host;
        loop {
            host.feed();
            let popped = host.outbound.bytes_popped();
            host.sender.push(&mut host.outbound);
            if host.backlog.is_empty() || host.outbound.bytes_popped() == popped {
                break;
            }
        }
        while let Some(message) = self.sender_host.sender.maybe_send() {
            self.transmit(NodeId::Sender, message.into());
        }
        let rto = self.sender_host.sender.current_rto_ms();
        let in_flight = self.sender_host.sender.sequence_numbers_in_flight();
        self.record_metric("rto_ms", rto as f64);
        self.record_metric("in_flight", in_flight as f64);
    }

    fn record_metric(&mut self, name: &str, value: f64) {
        let series = self.metrics.entry(name.to_string()).or_default();
        // Only record changes to keep the series compact.
        if series.last().is_some_and(|&(_, last)| last == value) {
            return;
        }
        series.push((self.time, value));
    }

    /// Push one datagram through the channel.
    fn transmit(&mut self, source_node: NodeId, packet: Packet) {
        let target_node = source_node.peer();

        if source_node == NodeId::Sender {
            self.sender_packet_count += 1;

            if let Some(pos) = self
                .drop_sender_seq_once
                .iter()
                .position(|s| *s == packet.header.seq_num)
            {
                self.link_events.push(LinkEventSummary {
                    time: self.time,
                    description: format!(
                        "[Sender->Receiver] DROP (deterministic seq) seq={}",
                        packet.header.seq_num
                    ),
                });
                debug!(
                    seq = packet.header.seq_num,
                    "deterministically dropping sender segment"
                );
                self.drop_sender_seq_once.remove(pos);
                return;
            }
        }

        if source_node == NodeId::Receiver
            && packet.header.flags & flags::ACK != 0
            && let Some(pos) = self
                .drop_receiver_ack_once
                .iter()
                .position(|a| *a == packet.header.ack_num)
        {
            self.link_events.push(LinkEventSummary {
                time: self.time,
                description: format!(
                    "[Receiver->Sender] DROP (deterministic ack) ack={}",
                    packet.header.ack_num
                ),
            });
            debug!(
                ack = packet.header.ack_num,
                "deterministically dropping receiver ACK"
            );
            self.drop_receiver_ack_once.remove(pos);
            return;
        }

        // 1. Check Loss
        if self.rng.random::<f64>() < self.config.loss_rate {
            self.link_events.push(LinkEventSummary {
                time: self.time,
                description: format!(
                    "[{:?}->{:?}] DROP (random loss) seq={} ack={}",
                    source_node, target_node, packet.header.seq_num, packet.header.ack_num
                ),
            });
            debug!("Packet lost in channel");
            return;
        }

        // 2. Check Duplication
        let copies = if self.rng.random::<f64>() < self.config.duplicate_rate {
            self.link_events.push(LinkEventSummary {
                time: self.time,
                description: format!(
                    "[{:?}->{:?}] DUPLICATE seq={} ack={}",
                    source_node, target_node, packet.header.seq_num, packet.header.ack_num
                ),
            });
            debug!("Packet duplicated in channel");
            2
        } else {
            1
        };

        // 3. Independent latency per copy, which is what reorders the channel.
        for _ in 0..copies {
            let latency = self
                .rng
                .random_range(self.config.min_latency..=self.config.max_latency);

            self.link_events.push(LinkEventSummary {
                time: self.time,
                description: format!(
                    "[{:?}->{:?}] SEND seq={} ack={} len={} (latency={}ms)",
                    source_node,
                    target_node,
                    packet.header.seq_num,
                    packet.header.ack_num,
                    packet.len(),
                    latency
                ),
            });

            self.push_event(
                self.time + latency,
                EventType::PacketArrival {
                    to: target_node,
                    packet: packet.clone(),
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(config: SimConfig, tcp: TcpConfig, data: &[u8]) -> Simulator {
        let mut sim = Simulator::new(config, tcp).expect("valid config");
        sim.schedule_app_send(5, data.to_vec());
        sim.schedule_app_close(5);
        sim.run_until_complete();
        sim
    }

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 97) as u8).collect()
    }

    #[test]
    fn clean_channel_delivers_in_order() {
        let data = payload(5_000);
        let sim = run(SimConfig::default(), TcpConfig::default(), &data);
        assert_eq!(sim.delivered_data, data);
        assert!(sim.stream_finished());
        assert!(!sim.aborted);
        assert_eq!(sim.retransmissions, 0);
    }

    #[test]
    fn lossy_duplicating_channel_still_delivers() {
        let data = payload(20_000);
        for seed in 0..4 {
            let config = SimConfig {
                loss_rate: 0.2,
                duplicate_rate: 0.1,
                min_latency: 5,
                max_latency: 80,
                seed,
                ..SimConfig::default()
            };
            let tcp = TcpConfig {
                rt_timeout_ms: 200,
                max_retx_attempts: 64,
                ..TcpConfig::default()
            };
            let sim = run(config, tcp, &data);
            assert_eq!(sim.delivered_data, data, "seed {seed}");
            assert!(sim.stream_finished(), "seed {seed}");
            assert!(sim.retransmissions > 0, "seed {seed}");
        }
    }

    #[test]
    fn same_seed_same_run() {
        let config = SimConfig {
            loss_rate: 0.3,
            duplicate_rate: 0.2,
            seed: 7,
            ..SimConfig::default()
        };
        let tcp = TcpConfig {
            max_retx_attempts: 64,
            ..TcpConfig::default()
        };
        let a = run(config.clone(), tcp.clone(), b"determinism").export_report();
        let b = run(config, tcp, b"determinism").export_report();
        assert_eq!(a.duration_ms, b.duration_ms);
        assert_eq!(a.sender_packet_count, b.sender_packet_count);
        assert_eq!(a.link_events.len(), b.link_events.len());
    }

    #[test]
    fn dead_link_aborts_after_retransmission_limit() {
        let config = SimConfig {
            loss_rate: 1.0,
            ..SimConfig::default()
        };
        let tcp = TcpConfig {
            rt_timeout_ms: 100,
            max_retx_attempts: 3,
            ..TcpConfig::default()
        };
        let sim = run(config, tcp, b"lost");
        assert!(sim.aborted);
        assert!(sim.inbound_has_error());
        assert!(!sim.stream_finished());
        assert_eq!(sim.retransmissions, 4);
        // 100 + 200 + 400 + 800 ms of waiting.
        assert_eq!(sim.current_time(), 1500);
    }

    #[test]
    fn deterministic_drop_forces_one_retransmission() {
        let tcp = TcpConfig {
            fixed_isn: Some(1000),
            ..TcpConfig::default()
        };
        let mut sim = Simulator::new(SimConfig::default(), tcp).expect("valid config");
        // First data byte sits right after the SYN.
        sim.add_drop_sender_seq_once(1001);
        sim.schedule_app_send(0, b"hello".to_vec());
        sim.schedule_app_close(0);
        sim.run_until_complete();

        assert_eq!(sim.delivered_data, b"hello");
        assert!(sim.stream_finished());
        assert_eq!(sim.retransmissions, 1);
        assert!(
            sim.link_events
                .iter()
                .any(|e| e.description.contains("DROP (deterministic seq) seq=1001"))
        );
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = SimConfig {
            min_latency: 50,
            max_latency: 10,
            ..SimConfig::default()
        };
        assert!(Simulator::new(config, TcpConfig::default()).is_err());
    }

    #[test]
    fn metrics_track_rto_and_in_flight() {
        let sim = run(SimConfig::default(), TcpConfig::default(), b"abc");
        let rto = sim.metric_series("rto_ms").expect("rto recorded");
        assert_eq!(rto[0].1, TcpConfig::TIMEOUT_DFLT as f64);
        let in_flight = sim.metric_series("in_flight").expect("in_flight recorded");
        assert_eq!(in_flight.last().map(|&(_, v)| v), Some(0.0));
    }
}
