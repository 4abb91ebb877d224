//! Reliable delivery of configuration deltas over the unreliable control
//! channel.
//!
//! At most one request is in flight per peer: the ladder bumps the request
//! id, this module retransmits the pending delta until an acknowledgment
//! with a matching id arrives. Retransmission is paced by a minimum send
//! delta that self-tunes with acknowledgment latency.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::peer::{PeerId, PeerLinkState};
use crate::stats::EngineStats;
use crate::wire::ControlMessage;
use crate::Event;

/// Floor for the adaptive minimum send delta.
pub(crate) const MIN_SEND_DELTA: Duration = Duration::from_millis(10);
/// Ceiling for the adaptive minimum send delta.
pub(crate) const MAX_SEND_DELTA: Duration = Duration::from_millis(100);
/// How much the delta grows per paced send while acknowledgments lag.
const SEND_DELTA_STEP: Duration = Duration::from_millis(10);
/// An outstanding request older than this counts as "acknowledgments lag".
const ACK_LAG: Duration = Duration::from_millis(100);
/// A round trip at most this long resets the delta to its floor.
const ACK_CAUGHT_UP: Duration = Duration::from_millis(500);
/// No radio activity for this long marks the link presumed dead.
const DEAD_LINK_AFTER: Duration = Duration::from_secs(1);
/// Dead-link detection only starts once the engine has run this long.
const ENGINE_WARMUP: Duration = Duration::from_secs(5);

/// Drive one peer's handshake for this tick.
pub(crate) fn drive(
    peer: &mut PeerLinkState,
    now: Instant,
    started_at: Instant,
    test_mode: bool,
    stats: &mut EngineStats,
    out: &mut VecDeque<(PeerId, ControlMessage)>,
) {
    if !peer.has_pending() && !peer.outstanding() {
        return;
    }

    if let Some(last) = peer.last_send {
        if now.saturating_duration_since(last) < peer.min_send_delta {
            stats.paced_skips += 1;
            return;
        }

        // Grow the pacing while the remote is slow to confirm. The reset
        // happens in on_ack once a round trip lands quickly again.
        if peer.outstanding() && now.saturating_duration_since(last) > ACK_LAG {
            peer.min_send_delta = (peer.min_send_delta + SEND_DELTA_STEP).min(MAX_SEND_DELTA);
        }
    }

    // Do not add control traffic to a link that looks dead.
    let warmed_up = now.saturating_duration_since(started_at) >= ENGINE_WARMUP;
    let silent = peer
        .last_activity
        .map_or(true, |a| now.saturating_duration_since(a) > DEAD_LINK_AFTER);
    if warmed_up && silent {
        if !peer.dead_link_logged {
            warn!("{} presumed dead, holding control messages", peer.id);
            peer.dead_link_logged = true;
        }
        stats.dead_link_skips += 1;
        return;
    }

    let message = ControlMessage {
        request_id: peer.request_id,
        stream_index: 0,
        keyframe_interval_ms: peer.pending_keyframe,
        video_bitrate: peer.pending_bitrate,
        ec_scheme: peer.pending_ec,
        dr_boost: peer.pending_boost,
        datarate_hint: peer.pending_datarate,
        test_mode,
    };

    trace!("{} request {} sent", peer.id, peer.request_id);
    out.push_back((peer.id, message));
    peer.last_send = Some(now);
    stats.requests_sent += 1;
}

/// Reconcile a received acknowledgment.
pub(crate) fn on_ack(
    peer: &mut PeerLinkState,
    request_id: u32,
    now: Instant,
    stats: &mut EngineStats,
    events: &mut VecDeque<Event>,
) {
    // Whatever the id, the peer's radio is alive.
    peer.last_activity = Some(now);
    peer.dead_link_logged = false;

    if request_id != peer.request_id {
        // Stale or duplicate; ignored for state purposes.
        trace!("{} stale ack {} (outstanding {})", peer.id, request_id, peer.request_id);
        stats.acks_stale += 1;
        return;
    }

    let rtt = peer.last_send.map(|t| now.saturating_duration_since(t));

    if peer.first_ack.is_none() {
        peer.first_ack = Some(now);
        events.push_back(Event::HandshakeCompleted { peer: peer.id, rtt });
    }

    peer.ack_id = request_id;
    peer.last_ack = Some(now);
    peer.last_rtt = rtt;
    peer.clear_pending();
    stats.acks_matched += 1;

    if let Some(rtt) = rtt {
        if rtt <= ACK_CAUGHT_UP {
            peer.min_send_delta = MIN_SEND_DELTA;
        }
    }
}
