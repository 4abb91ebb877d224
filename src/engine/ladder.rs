//! The ladder of reversible adjustments.
//!
//! Exactly one action per call, in a fixed order: datarate boost, per-link
//! bitrate/datarate, EC scheme. Every applied action moves the adaptive
//! level by one and arms the handshake with the pending delta.

use crate::config::AdaptiveConfig;
use crate::links::{LinkId, RadioLinks};
use crate::peer::PeerLinkState;
use crate::units::{Bitrate, Datarate, EcScheme};

/// Rungs forbidden in medium-adaptive mode (the two lowest).
const MEDIUM_ADAPTIVE_MIN_RUNG: u8 = 2;

/// Which way a ladder step went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDirection {
    /// Configuration was degraded for robustness.
    Down,
    /// Configuration was improved towards nominal.
    Up,
}

/// Try the first applicable degrade action. Returns whether any change was
/// applied. With nothing left to reduce the peer is flagged on-floor, which
/// is a normal terminal state.
pub(crate) fn switch_lower(
    peer: &mut PeerLinkState,
    links: &dyn RadioLinks,
    config: &AdaptiveConfig,
) -> bool {
    // Without any usable link there is no video to adjust. Keep polling,
    // capability may return.
    if usable(links).next().is_none() {
        return false;
    }

    // 1: give up boost headroom first, it is the cheapest robustness win.
    if config.allow_dr_boost {
        if let Some(boost) = peer.dr_boost {
            if boost > 0 {
                let new = boost - 1;
                peer.dr_boost = Some(new);
                peer.pending_boost = Some(new);
                commit(peer, StepDirection::Down);
                debug!("{} boost lowered to {}", peer.id, new);
                return true;
            }
        }
    }

    // 2: step the video bitrate down one datarate rung.
    if let Some((link, rung, bitrate)) = best_stepdown(peer, links, config) {
        if bitrate.as_u64() != peer.target_bitrate.as_u64() {
            peer.target_bitrate = bitrate;
            peer.pending_bitrate = Some(bitrate);
            peer.pending_datarate = Some(rung);
            peer.set_datarate_for(link, rung);
            commit(peer, StepDirection::Down);
            debug!("{} bitrate lowered to {} ({} {})", peer.id, bitrate, link, rung);
            return true;
        }
    }

    // 3: last resort, engage the worst-case EC scheme at the floor bitrate.
    if peer.ec_scheme == EcScheme::Default {
        let ec = worst_case_ec(config);
        let floor = floor_bitrate(config);

        peer.ec_scheme = ec;
        peer.pending_ec = Some(ec);
        peer.target_bitrate = floor;
        peer.pending_bitrate = Some(floor);
        peer.on_floor = true;
        commit(peer, StepDirection::Down);
        info!("{} on floor: {} at {}", peer.id, ec, floor);
        return true;
    }

    // Nothing lower exists.
    peer.on_floor = true;
    false
}

/// Try the first applicable improve action, the mirror of [`switch_lower`].
pub(crate) fn switch_higher(
    peer: &mut PeerLinkState,
    links: &dyn RadioLinks,
    config: &AdaptiveConfig,
) -> bool {
    if usable(links).next().is_none() {
        return false;
    }

    // 1: leave the floor by reverting EC and meeting the link halfway.
    if peer.on_floor && peer.ec_scheme != EcScheme::Default {
        let bitrate = match best_sustained(links) {
            Some(sustain) => {
                Bitrate::from((peer.target_bitrate.as_f64() + sustain.as_f64()) / 2.0)
            }
            None => peer.target_bitrate,
        };

        peer.ec_scheme = EcScheme::Default;
        peer.pending_ec = Some(EcScheme::Default);
        peer.target_bitrate = bitrate;
        peer.pending_bitrate = Some(bitrate);
        peer.on_floor = false;
        commit(peer, StepDirection::Up);
        debug!("{} off floor at {}", peer.id, bitrate);
        return true;
    }

    // 2: take the smallest available bitrate increase one rung up.
    if let Some((link, rung, bitrate)) = best_stepup(peer, links, config) {
        let rung_changed = peer.datarate_for(link) != Some(rung);

        peer.target_bitrate = bitrate;
        peer.pending_bitrate = Some(bitrate);
        peer.pending_datarate = Some(rung);
        peer.set_datarate_for(link, rung);
        commit_request(peer);
        if rung_changed {
            lower_level(peer);
        }
        debug!("{} bitrate raised to {} ({} {})", peer.id, bitrate, link, rung);
        return true;
    }

    // 3: regain boost headroom last.
    if config.allow_dr_boost {
        if let Some(boost) = peer.dr_boost {
            if boost < config.max_dr_boost {
                let new = boost + 1;
                peer.dr_boost = Some(new);
                peer.pending_boost = Some(new);
                commit(peer, StepDirection::Up);
                debug!("{} boost raised to {}", peer.id, new);
                return true;
            }
        }
    }

    false
}

/// The link/rung pair one rung below the currently required datarate that
/// still yields the highest achievable bitrate.
fn best_stepdown(
    peer: &PeerLinkState,
    links: &dyn RadioLinks,
    config: &AdaptiveConfig,
) -> Option<(LinkId, Datarate, Bitrate)> {
    let margin = 1.0 - config.stepdown_margin_percent as f64 / 100.0;
    let mut best: Option<(LinkId, Datarate, Bitrate)> = None;

    for link in usable(links) {
        let Some(required) = links.required_datarate(peer.target_bitrate, link) else {
            continue;
        };
        let Some(lower) = required.step_down() else {
            continue;
        };
        if config.medium_adaptive && lower.rung() < MEDIUM_ADAPTIVE_MIN_RUNG {
            continue;
        }
        let Some(max) = links.max_bitrate(lower, link) else {
            continue;
        };
        let candidate = max * margin;

        if best.map_or(true, |(_, _, b)| candidate > b) {
            best = Some((link, lower, candidate));
        }
    }

    best
}

/// The link/rung pair one rung above the assigned datarate that yields the
/// smallest bitrate increase, bounded by the link load limit.
fn best_stepup(
    peer: &PeerLinkState,
    links: &dyn RadioLinks,
    config: &AdaptiveConfig,
) -> Option<(LinkId, Datarate, Bitrate)> {
    let mut best: Option<(LinkId, Datarate, Bitrate)> = None;

    for link in usable(links) {
        let Some(current) = links.assigned_datarate(link) else {
            continue;
        };
        let Some(next) = current.step_up() else {
            continue;
        };
        let Some(nominal) = links.max_bitrate(next, link) else {
            continue;
        };
        let candidate = nominal * config.max_link_load as f64;

        // Only rungs with actual headroom over the current target count.
        if candidate.as_u64() <= peer.target_bitrate.as_u64() {
            continue;
        }

        if best.map_or(true, |(_, _, b)| candidate < b) {
            best = Some((link, next, candidate));
        }
    }

    best
}

/// Highest bitrate any usable link sustains at its currently assigned
/// datarate.
fn best_sustained(links: &dyn RadioLinks) -> Option<Bitrate> {
    usable(links)
        .filter_map(|link| {
            let assigned = links.assigned_datarate(link)?;
            links.max_bitrate(assigned, link)
        })
        .max_by(|a, b| a.as_f64().total_cmp(&b.as_f64()))
}

fn usable<'l>(links: &'l dyn RadioLinks) -> impl Iterator<Item = LinkId> + 'l {
    links
        .links()
        .into_iter()
        .filter(move |l| links.is_usable_for_adaptive_video(*l))
}

fn worst_case_ec(config: &AdaptiveConfig) -> EcScheme {
    let total = config.ec_block_total;
    let ec = (total as f32 * config.ec_max_percent_max / 100.0).ceil() as u8;
    let ec = ec.clamp(1, total - 1);

    // total >= 2 is enforced by config validation.
    EcScheme::Fixed { total, ec }
}

fn floor_bitrate(config: &AdaptiveConfig) -> Bitrate {
    let mut floor = config.floor_bitrate;
    if config.high_sensitivity_sensor {
        floor = floor * 2.0;
    }
    if config.medium_adaptive {
        floor = floor * 0.5;
    }
    floor
}

fn commit(peer: &mut PeerLinkState, direction: StepDirection) {
    match direction {
        StepDirection::Down => peer.adaptive_level += 1,
        StepDirection::Up => lower_level(peer),
    }
    commit_request(peer);
}

fn lower_level(peer: &mut PeerLinkState) {
    peer.adaptive_level = peer.adaptive_level.saturating_sub(1);
}

fn commit_request(peer: &mut PeerLinkState) {
    peer.request_id = peer.request_id.wrapping_add(1);
}
