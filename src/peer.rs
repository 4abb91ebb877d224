//! Per-peer adaptive state.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::AdaptiveConfig;
use crate::engine::handshake::MIN_SEND_DELTA;
use crate::engine::Criterion;
use crate::links::LinkId;
use crate::metrics::MetricsWindow;
use crate::units::{Bitrate, Datarate, EcScheme};

/// Identifies a tracked peer (a vehicle, possibly reached via relay).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(u32);

impl PeerId {
    /// Peer id from a raw vehicle id.
    pub const fn new(v: u32) -> Self {
        PeerId(v)
    }
}

impl From<u32> for PeerId {
    fn from(v: u32) -> Self {
        PeerId(v)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        #[cfg(feature = "pii")]
        return write!(f, "peer(..)");
        #[cfg(not(feature = "pii"))]
        write!(f, "peer({})", self.0)
    }
}

/// The full adaptive state the engine holds for one peer.
///
/// Created when the peer is first observed, destroyed when it disconnects
/// or restarts. All fields mutate synchronously within a tick.
#[derive(Debug)]
pub struct PeerLinkState {
    pub(crate) id: PeerId,
    pub(crate) paired: bool,
    pub(crate) active: bool,

    pub(crate) adaptive_level: u32,
    pub(crate) target_bitrate: Bitrate,
    pub(crate) ec_scheme: EcScheme,
    pub(crate) dr_boost: Option<u8>,
    pub(crate) keyframe_ms: Option<i32>,
    pub(crate) link_datarate: Vec<(LinkId, Datarate)>,
    pub(crate) on_floor: bool,

    pub(crate) pending_bitrate: Option<Bitrate>,
    pub(crate) pending_ec: Option<EcScheme>,
    pub(crate) pending_boost: Option<u8>,
    pub(crate) pending_keyframe: Option<i32>,
    pub(crate) pending_datarate: Option<Datarate>,

    pub(crate) request_id: u32,
    pub(crate) ack_id: u32,
    pub(crate) last_send: Option<Instant>,
    pub(crate) last_ack: Option<Instant>,
    pub(crate) first_ack: Option<Instant>,
    pub(crate) last_rtt: Option<Duration>,
    pub(crate) min_send_delta: Duration,
    pub(crate) last_activity: Option<Instant>,
    pub(crate) dead_link_logged: bool,

    pub(crate) window: MetricsWindow,
    pub(crate) last_breach: Option<Option<Criterion>>,
    pub(crate) improve_streak: u32,
}

impl PeerLinkState {
    pub(crate) fn new(id: PeerId, config: &AdaptiveConfig) -> Self {
        // Random start point so an acknowledgment from before an engine
        // restart cannot match a fresh request.
        let request_id = crate::util::NonCryptographicRng::u32();

        PeerLinkState {
            id,
            paired: false,
            active: true,

            adaptive_level: 0,
            target_bitrate: config.initial_bitrate,
            ec_scheme: EcScheme::Default,
            dr_boost: config.allow_dr_boost.then_some(config.default_dr_boost),
            keyframe_ms: None,
            link_datarate: Vec::new(),
            on_floor: false,

            pending_bitrate: None,
            pending_ec: None,
            pending_boost: None,
            pending_keyframe: None,
            pending_datarate: None,

            request_id,
            ack_id: request_id,
            last_send: None,
            last_ack: None,
            first_ack: None,
            last_rtt: None,
            min_send_delta: MIN_SEND_DELTA,
            last_activity: None,
            dead_link_logged: false,

            window: MetricsWindow::default(),
            last_breach: None,
            improve_streak: 0,
        }
    }

    /// The peer id.
    pub fn id(&self) -> PeerId {
        self.id
    }

    /// Degradation counter, 0 is best quality.
    pub fn adaptive_level(&self) -> u32 {
        self.adaptive_level
    }

    /// Current target video bitrate.
    pub fn target_bitrate(&self) -> Bitrate {
        self.target_bitrate
    }

    /// Current EC scheme.
    pub fn ec_scheme(&self) -> EcScheme {
        self.ec_scheme
    }

    /// Current datarate boost, None while the profile forbids boosting.
    pub fn dr_boost(&self) -> Option<u8> {
        self.dr_boost
    }

    /// Whether the degrade ladder has reached its last rung.
    pub fn is_on_floor(&self) -> bool {
        self.on_floor
    }

    /// Whether adaptive control currently governs this peer.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Round-trip time of the last matched handshake.
    pub fn last_rtt(&self) -> Option<Duration> {
        self.last_rtt
    }

    /// The current handshake request id.
    pub fn request_id(&self) -> u32 {
        self.request_id
    }

    /// The datarate last selected for a link, if any.
    pub fn datarate_for(&self, link: LinkId) -> Option<Datarate> {
        self.link_datarate
            .iter()
            .find(|(l, _)| *l == link)
            .map(|(_, d)| *d)
    }

    pub(crate) fn set_datarate_for(&mut self, link: LinkId, datarate: Datarate) {
        if let Some(entry) = self.link_datarate.iter_mut().find(|(l, _)| *l == link) {
            entry.1 = datarate;
        } else {
            self.link_datarate.push((link, datarate));
        }
    }

    /// Whether any configuration delta awaits transmission.
    pub fn has_pending(&self) -> bool {
        self.pending_bitrate.is_some()
            || self.pending_ec.is_some()
            || self.pending_boost.is_some()
            || self.pending_keyframe.is_some()
    }

    /// Whether a request is in flight without a matching acknowledgment.
    pub fn outstanding(&self) -> bool {
        self.request_id != self.ack_id
    }

    pub(crate) fn clear_pending(&mut self) {
        self.pending_bitrate = None;
        self.pending_ec = None;
        self.pending_boost = None;
        self.pending_keyframe = None;
        self.pending_datarate = None;
    }

    /// The look-back clamp: metrics must not span across an unresolved
    /// handshake step.
    pub(crate) fn lookback_clamp(&self, now: Instant) -> Option<Duration> {
        let since_send = self.last_send.map(|t| now.saturating_duration_since(t));
        let since_ack = self.last_ack.map(|t| now.saturating_duration_since(t));

        match (since_send, since_ack) {
            (Some(s), Some(a)) => Some(s.min(a)),
            (Some(s), None) => Some(s),
            (None, Some(a)) => Some(a),
            (None, None) => None,
        }
    }
}

/// All peers the engine currently tracks.
///
/// A bounded collection with linear scans; peers that vanished are removed
/// outright, so there are no placeholder slots to skip.
#[derive(Debug, Default)]
pub(crate) struct PeerTable {
    peers: Vec<PeerLinkState>,
}

/// Concurrently tracked peers, including relayed vehicles.
pub(crate) const MAX_PEERS: usize = 8;

impl PeerTable {
    pub fn get_mut(&mut self, id: PeerId) -> Option<&mut PeerLinkState> {
        self.peers.iter_mut().find(|p| p.id == id)
    }

    pub fn get(&self, id: PeerId) -> Option<&PeerLinkState> {
        self.peers.iter().find(|p| p.id == id)
    }

    /// Look up or create the state for a newly observed peer. None when
    /// the table is full.
    pub fn ensure(&mut self, id: PeerId, config: &AdaptiveConfig) -> Option<&mut PeerLinkState> {
        if let Some(i) = self.peers.iter().position(|p| p.id == id) {
            return Some(&mut self.peers[i]);
        }
        if self.peers.len() >= MAX_PEERS {
            warn!("Peer table full, not tracking {}", id);
            return None;
        }
        self.peers.push(PeerLinkState::new(id, config));
        self.peers.last_mut()
    }

    pub fn remove(&mut self, id: PeerId) {
        self.peers.retain(|p| p.id != id);
    }

    /// Iterate peers that completed initial pairing.
    pub fn iter_paired_mut(&mut self) -> impl Iterator<Item = &mut PeerLinkState> {
        self.peers.iter_mut().filter(|p| p.paired)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PeerLinkState> {
        self.peers.iter_mut()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
