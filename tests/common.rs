#![allow(unused)]
use std::sync::Once;
use std::time::{Duration, Instant};

use airlink::metrics::LinkQualitySample;
use airlink::{AdaptiveLink, Bitrate, Datarate, Event, Input, LinkId, Output, PeerId, RadioLinks};

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

/// A radio with one usable link and a linear ladder: rung n carries
/// 4 * (n + 1) Mbit/s, 6 rungs total, rung 3 assigned.
pub struct TestRadio {
    pub assigned: Datarate,
    pub usable: bool,
}

impl Default for TestRadio {
    fn default() -> Self {
        TestRadio {
            assigned: Datarate::new(3),
            usable: true,
        }
    }
}

pub const RUNGS: u8 = 6;

impl TestRadio {
    fn rung_bitrate(rung: u8) -> Bitrate {
        Bitrate::mbps(4 * (rung as u64 + 1))
    }
}

impl RadioLinks for TestRadio {
    fn links(&self) -> Vec<LinkId> {
        vec![LinkId::new(0)]
    }

    fn is_usable_for_adaptive_video(&self, _link: LinkId) -> bool {
        self.usable
    }

    fn assigned_datarate(&self, _link: LinkId) -> Option<Datarate> {
        Some(self.assigned)
    }

    fn max_bitrate(&self, datarate: Datarate, _link: LinkId) -> Option<Bitrate> {
        (datarate.rung() < RUNGS).then(|| Self::rung_bitrate(datarate.rung()))
    }

    fn required_datarate(&self, bitrate: Bitrate, _link: LinkId) -> Option<Datarate> {
        (0..RUNGS)
            .map(Datarate::new)
            .find(|d| Self::rung_bitrate(d.rung()).as_u64() >= bitrate.as_u64())
    }
}

/// A healthy interval: radio active, video flowing, nothing lost.
pub fn clean_sample(at: Instant) -> LinkQualitySample {
    LinkQualitySample {
        at,
        rx_packets: 200,
        lost_packets: 0,
        retransmissions: 0,
        video_blocks: 30,
        ec_used_blocks: 0,
        ec_max_blocks: 0,
        bad_video: false,
        rssi_margin: None,
        snr_margin: None,
    }
}

/// An interval with heavy packet loss (and nothing else wrong, so the
/// loss-percentage criterion is the one that fires).
pub fn lossy_sample(at: Instant) -> LinkQualitySample {
    LinkQualitySample {
        lost_packets: 40,
        ..clean_sample(at)
    }
}

/// Feed `n` samples ending at `now`, spaced one tick (50 ms) apart.
pub fn feed_samples(
    engine: &mut AdaptiveLink,
    peer: PeerId,
    now: Instant,
    n: u32,
    make: impl Fn(Instant) -> LinkQualitySample,
) {
    for i in (0..n).rev() {
        let at = now - Duration::from_millis(50 * i as u64);
        engine.handle_input(at, Input::Sample(peer, make(at)));
    }
}

/// Drain all queued transmits and events.
pub fn drain(engine: &mut AdaptiveLink) -> (Vec<(PeerId, airlink::wire::ControlMessage)>, Vec<Event>) {
    let mut transmits = Vec::new();
    let mut events = Vec::new();
    loop {
        match engine.poll_output() {
            Output::Transmit(peer, message) => transmits.push((peer, message)),
            Output::Event(event) => events.push(event),
            Output::Timeout(_) => return (transmits, events),
        }
    }
}

/// An engine with one paired, active peer observed at `now`.
pub fn engine_with_peer(peer: PeerId, now: Instant) -> AdaptiveLink {
    let mut engine = AdaptiveLink::new();
    engine.handle_input(now, Input::PeerPaired(peer));
    engine
}
