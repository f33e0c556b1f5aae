#![allow(unused)]
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::ops::{Deref, DerefMut};
use std::rc::Rc;
use std::sync::Once;

use stream_conditioner::api::conditioner_control::{EncoderControl, TransportStatsProvider};
use stream_conditioner::api::transport::{ConnectionId, TransportStats};
use stream_conditioner::api::units::{DataRate, TimeDelta, Timestamp};
use stream_conditioner::{AdaptiveMode, Conditioner, ConditionerSettings, EncoderError};

pub const T0: Timestamp = Timestamp::from_seconds(10_000);

// Payload per packet used when synthesizing traffic.
const PACKET_PAYLOAD: i64 = 1_000;
const PACKET_OVERHEAD: i64 = 44;

pub fn bps(value: i64) -> DataRate {
    DataRate::from_bits_per_sec(value)
}

/// Shared view of what the encoder was told, kept by the test after the
/// encoder itself moved into the conditioner.
#[derive(Debug, Clone, Default)]
pub struct EncoderLog {
    commands: Rc<RefCell<Vec<DataRate>>>,
    failing: Rc<Cell<bool>>,
}

impl EncoderLog {
    pub fn commands(&self) -> Vec<DataRate> {
        self.commands.borrow().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.set(failing);
    }
}

#[derive(Debug)]
pub struct FakeEncoder {
    capturing: bool,
    log: EncoderLog,
}

impl FakeEncoder {
    pub fn capturing() -> (Self, EncoderLog) {
        let log = EncoderLog::default();
        let encoder = Self {
            capturing: true,
            log: log.clone(),
        };
        (encoder, log)
    }

    pub fn idle() -> Self {
        Self {
            capturing: false,
            log: EncoderLog::default(),
        }
    }
}

impl EncoderControl for FakeEncoder {
    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn set_bitrate(&mut self, bitrate: DataRate) -> Result<(), EncoderError> {
        if self.log.failing.get() {
            return Err(EncoderError::Released);
        }
        self.log.commands.borrow_mut().push(bitrate);
        Ok(())
    }
}

/// Cumulative counters for a set of connections.
#[derive(Debug, Default)]
pub struct FakeTransport {
    connections: HashMap<ConnectionId, TransportStats>,
    // Connections whose counters keep running but aren't reported.
    muted: HashSet<ConnectionId>,
}

impl FakeTransport {
    pub fn connect(&mut self, id: ConnectionId) {
        self.connections.insert(id, TransportStats::default());
    }

    pub fn disconnect(&mut self, id: ConnectionId) {
        self.connections.remove(&id);
    }

    /// One interval of traffic pushed at `required`, with the transport
    /// reporting `real` as its bandwidth.
    pub fn send(&mut self, id: ConnectionId, required: DataRate, real: DataRate, interval: TimeDelta) {
        let stats = self.connections.entry(id).or_default();
        let payload = (required.bytes_per_sec_float() * interval.seconds_float()).round() as i64;
        let packets = (payload + PACKET_PAYLOAD - 1) / PACKET_PAYLOAD;
        stats.bytes_sent_unique += (payload + packets * PACKET_OVERHEAD) as u64;
        stats.packets_sent_unique += packets as u64;
        stats.bandwidth_mbps = real.bps_float() / 1_000_000.0;
    }

    pub fn mute(&mut self, id: ConnectionId) {
        self.muted.insert(id);
    }

    pub fn unmute(&mut self, id: ConnectionId) {
        self.muted.remove(&id);
    }

    pub fn lose(&mut self, id: ConnectionId, audio: u64, video: u64) {
        let stats = self.connections.entry(id).or_default();
        stats.audio_frames_lost += audio;
        stats.video_frames_lost += video;
    }
}

impl TransportStatsProvider for FakeTransport {
    fn connection_stats(&self, id: ConnectionId) -> Option<TransportStats> {
        if self.muted.contains(&id) {
            return None;
        }
        self.connections.get(&id).copied()
    }
}

/// A running session driven by simulated time.
pub struct TestSession {
    pub conditioner: Conditioner<FakeEncoder>,
    pub transport: FakeTransport,
    pub encoder: EncoderLog,
    pub now: Timestamp,
}

impl TestSession {
    pub fn start(mode: AdaptiveMode, full_bitrate: DataRate) -> Self {
        init_log();

        let mut conditioner: Conditioner<FakeEncoder> =
            Conditioner::from_settings(ConditionerSettings::with_mode(mode))
                .expect("valid settings")
                .expect("adaptive mode enabled");
        let (encoder, log) = FakeEncoder::capturing();
        conditioner
            .start(encoder, full_bitrate, T0)
            .expect("session starts");

        Self {
            conditioner,
            transport: FakeTransport::default(),
            encoder: log,
            now: T0,
        }
    }

    pub fn connect(&mut self, id: ConnectionId) {
        self.transport.connect(id);
        self.conditioner.add_connection(id).expect("id in range");
    }

    /// Advances to the next scheduled check and runs it.
    pub fn tick(&mut self) {
        self.now = self.conditioner.poll_timeout().expect("check scheduled");
        let result = self.conditioner.handle_timeout(self.now, &self.transport);
        result.expect("tick succeeds");
    }

    /// Sends one interval of traffic on `id`, then ticks.
    pub fn tick_sending(&mut self, id: ConnectionId, required: DataRate, real: DataRate) {
        let interval = self.conditioner.check_interval();
        self.transport.send(id, required, real, interval);
        self.tick();
    }

    pub fn current(&self) -> DataRate {
        self.conditioner.current_bitrate().expect("session running")
    }

    /// Timestamps of committed changes, excluding the start entry.
    pub fn change_times(&self) -> Vec<Timestamp> {
        self.conditioner
            .bitrate_history()
            .iter()
            .skip(1)
            .map(|entry| entry.at_time)
            .collect()
    }
}

impl Deref for TestSession {
    type Target = Conditioner<FakeEncoder>;

    fn deref(&self) -> &Self::Target {
        &self.conditioner
    }
}

impl DerefMut for TestSession {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conditioner
    }
}

pub fn init_log() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    static START: Once = Once::new();

    START.call_once(|| {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(env_filter)
            .init();
    });
}
