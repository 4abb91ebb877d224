//! The control loop.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::config::AdaptiveConfig;
use crate::links::RadioLinks;
use crate::metrics;
use crate::peer::{PeerId, PeerLinkState, PeerTable};
use crate::stats::EngineStats;
use crate::util::{already_happened, not_happening};
use crate::wire::ControlMessage;
use crate::{Event, Input, LinkError, Output};

pub(crate) mod handshake;
pub(crate) mod ladder;
pub(crate) mod thresholds;

pub use ladder::StepDirection;
pub use thresholds::Criterion;

/// Hard ceiling for the global pause.
const MAX_PAUSE: Duration = Duration::from_secs(40);

/// The adaptive link control engine.
///
/// Owns the per-peer state and takes every decision; all I/O and radio
/// specifics stay with the caller. Drive it with
/// [`handle_input`][AdaptiveLink::handle_input],
/// [`handle_timeout`][AdaptiveLink::handle_timeout] and
/// [`poll_output`][AdaptiveLink::poll_output].
pub struct AdaptiveLink {
    config: AdaptiveConfig,
    peers: PeerTable,
    out: VecDeque<(PeerId, ControlMessage)>,
    events: VecDeque<Event>,
    stats: EngineStats,
    started_at: Option<Instant>,
    last_tick: Option<Instant>,
    pause_until: Option<Instant>,
    test_mode: Option<TestMode>,
}

/// Deterministic ladder exercise used for QA. Walks one direction until a
/// switch reports no change, then turns around.
#[derive(Debug)]
struct TestMode {
    down: bool,
    last_step: Option<Instant>,
}

impl AdaptiveLink {
    /// Engine with the default config.
    pub fn new() -> Self {
        // The defaults always validate.
        Self::with_config(AdaptiveConfig::default()).expect("default config to validate")
    }

    /// Engine with a custom config. Fails when the config does not
    /// validate.
    pub fn with_config(config: AdaptiveConfig) -> Result<Self, LinkError> {
        config.validate()?;
        Ok(AdaptiveLink {
            config,
            peers: PeerTable::default(),
            out: VecDeque::new(),
            events: VecDeque::new(),
            stats: EngineStats::default(),
            started_at: None,
            last_tick: None,
            pause_until: None,
            test_mode: None,
        })
    }

    /// Feed externally produced data into the engine.
    pub fn handle_input(&mut self, now: Instant, input: Input) {
        match input {
            Input::Sample(id, sample) => {
                let Some(peer) = self.peers.ensure(id, &self.config) else {
                    return;
                };
                if sample.rx_packets > 0 {
                    peer.last_activity = Some(now);
                    peer.dead_link_logged = false;
                }
                peer.window.push(sample);
            }

            Input::Ack(id, ack) => {
                let Some(peer) = self.peers.get_mut(id) else {
                    debug!("Ack for unknown {}", id);
                    return;
                };
                handshake::on_ack(peer, ack.request_id, now, &mut self.stats, &mut self.events);
            }

            Input::PeerPaired(id) => {
                if let Some(peer) = self.peers.ensure(id, &self.config) {
                    peer.paired = true;
                }
            }

            Input::PeerActive(id, active) => {
                let Some(peer) = self.peers.get_mut(id) else {
                    debug!("Activity change for unknown {}", id);
                    return;
                };
                peer.active = active;
                peer.improve_streak = 0;
            }

            Input::PeerGone(id) => {
                self.peers.remove(id);
            }
        }
    }

    /// Run one control tick. The caller invokes this at the cadence
    /// returned by [`Output::Timeout`], or immediately on trigger
    /// conditions such as end-of-video-frame.
    pub fn handle_timeout(&mut self, now: Instant, links: &dyn RadioLinks) {
        let started_at = *self.started_at.get_or_insert(now);
        self.last_tick = Some(now);

        // An elapsed pause resumes on the next tick.
        if let Some(until) = self.pause_until {
            if now < until {
                return;
            }
            self.pause_until = None;
            self.events.push_back(Event::Resumed);
            for peer in self.peers.iter_mut() {
                reset_handshake_anchor(peer, now);
            }
        }

        if self.test_mode.is_some() {
            self.tick_test_mode(now, links, started_at);
            return;
        }

        let AdaptiveLink {
            config,
            peers,
            out,
            events,
            stats,
            ..
        } = self;

        for peer in peers.iter_paired_mut() {
            if !peer.active {
                continue;
            }

            let clamp = peer.lookback_clamp(now);
            let m = metrics::aggregate(&peer.window, config, now, clamp);

            // A window without any radio activity supports no conclusion
            // in either direction.
            if m.active_intervals == 0 {
                peer.improve_streak = 0;
                handshake::drive(peer, now, started_at, false, stats, out);
                continue;
            }

            let breach = thresholds::first_breach(&m, config, config.strength);
            if let Some(criterion) = breach {
                stats.record_breach(criterion);
            }
            if peer.last_breach != Some(breach) {
                match breach {
                    Some(criterion) => {
                        debug!("{} breached {}", peer.id, criterion);
                        events.push_back(Event::CriterionBreach {
                            peer: peer.id,
                            criterion,
                        });
                    }
                    None => events.push_back(Event::LinkHealthy { peer: peer.id }),
                }
                peer.last_breach = Some(breach);
            }

            // Exactly one of degrade, improve or no-op per peer and tick,
            // degrade checked first.
            if breach.is_some() {
                peer.improve_streak = 0;
                if ladder::switch_lower(peer, links, config) {
                    stats.degrades += 1;
                    events.push_back(Event::LevelChange {
                        peer: peer.id,
                        level: peer.adaptive_level,
                        direction: StepDirection::Down,
                    });
                } else {
                    stats.floor_hits += 1;
                }
            } else if thresholds::should_improve(&m, config) {
                peer.improve_streak += 1;
                if peer.improve_streak >= config.improve_streak {
                    peer.improve_streak = 0;
                    if ladder::switch_higher(peer, links, config) {
                        stats.improves += 1;
                        events.push_back(Event::LevelChange {
                            peer: peer.id,
                            level: peer.adaptive_level,
                            direction: StepDirection::Up,
                        });
                    }
                }
            } else {
                peer.improve_streak = 0;
            }

            handshake::drive(peer, now, started_at, false, stats, out);
        }
    }

    fn tick_test_mode(&mut self, now: Instant, links: &dyn RadioLinks, started_at: Instant) {
        let AdaptiveLink {
            config,
            peers,
            out,
            events,
            stats,
            test_mode,
            ..
        } = self;

        let Some(tm) = test_mode else {
            return;
        };

        let due = tm
            .last_step
            .map_or(true, |t| now.saturating_duration_since(t) >= config.test_step_interval);

        for peer in peers.iter_paired_mut() {
            if !peer.active {
                continue;
            }

            if due {
                tm.last_step = Some(now);

                let changed = if tm.down {
                    ladder::switch_lower(peer, links, config)
                } else {
                    ladder::switch_higher(peer, links, config)
                };

                if changed {
                    let direction = if tm.down {
                        stats.degrades += 1;
                        StepDirection::Down
                    } else {
                        stats.improves += 1;
                        StepDirection::Up
                    };
                    events.push_back(Event::LevelChange {
                        peer: peer.id,
                        level: peer.adaptive_level,
                        direction,
                    });
                } else {
                    // End of the ladder in this direction, turn around.
                    tm.down = !tm.down;
                }
            }

            handshake::drive(peer, now, started_at, true, stats, out);
        }
    }

    /// Drain queued output. Call until [`Output::Timeout`] comes back.
    pub fn poll_output(&mut self) -> Output {
        if let Some((peer, message)) = self.out.pop_front() {
            return Output::Transmit(peer, message);
        }
        if let Some(event) = self.events.pop_front() {
            return Output::Event(event);
        }
        Output::Timeout(self.next_timeout())
    }

    fn next_timeout(&self) -> Instant {
        if self.peers.is_empty() {
            // Nothing to control until a peer is observed.
            return not_happening();
        }
        let Some(last) = self.last_tick else {
            return already_happened();
        };
        last + self.config.tick_interval
    }

    /// Suspend all adaptive control. The duration is clamped to a hard
    /// ceiling and an already running pause can only be extended, never
    /// shortened.
    pub fn pause(&mut self, now: Instant, duration: Duration) {
        let until = now + duration.min(MAX_PAUSE);

        match self.pause_until {
            None => {
                info!("Adaptive control paused for {:?}", duration.min(MAX_PAUSE));
                self.pause_until = Some(until);
                self.events.push_back(Event::Paused { until });
            }
            Some(current) if until > current => {
                self.pause_until = Some(until);
            }
            _ => {}
        }
    }

    /// Lift the pause and reset every peer's handshake anchors so stale
    /// look-back windows are not reused after a long blackout.
    pub fn resume(&mut self, now: Instant) {
        if self.pause_until.take().is_some() {
            self.events.push_back(Event::Resumed);
        }
        for peer in self.peers.iter_mut() {
            reset_handshake_anchor(peer, now);
        }
    }

    /// Reset one peer's handshake anchors, e.g. after its link profile
    /// changed.
    pub fn resume_peer(&mut self, now: Instant, id: PeerId) {
        if let Some(peer) = self.peers.get_mut(id) {
            reset_handshake_anchor(peer, now);
        }
    }

    /// The end of the current pause, if one is running.
    pub fn paused_until(&self) -> Option<Instant> {
        self.pause_until
    }

    /// Toggle the deterministic ladder exercise. Takes effect on the next
    /// tick and fully supersedes the metrics-driven path until cleared.
    pub fn set_test_mode(&mut self, enabled: bool) {
        if enabled && self.test_mode.is_none() {
            info!("Test mode on");
            self.test_mode = Some(TestMode {
                down: true,
                last_step: None,
            });
        } else if !enabled {
            self.test_mode = None;
        }
    }

    /// Request a new key-frame interval for a peer. Delivered through the
    /// same handshake as the ladder's own adjustments.
    pub fn set_keyframe_interval(&mut self, id: PeerId, interval_ms: i32) {
        let Some(peer) = self.peers.get_mut(id) else {
            debug!("Keyframe change for unknown {}", id);
            return;
        };
        if peer.keyframe_ms == Some(interval_ms) && peer.pending_keyframe.is_none() {
            return;
        }
        peer.keyframe_ms = Some(interval_ms);
        peer.pending_keyframe = Some(interval_ms);
        peer.request_id = peer.request_id.wrapping_add(1);
    }

    /// Counters accumulated since engine start.
    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    /// Read access to a peer's adaptive state.
    pub fn peer(&self, id: PeerId) -> Option<&PeerLinkState> {
        self.peers.get(id)
    }
}

impl Default for AdaptiveLink {
    fn default() -> Self {
        Self::new()
    }
}

fn reset_handshake_anchor(peer: &mut PeerLinkState, now: Instant) {
    peer.last_send = Some(now);
    peer.last_ack = Some(now);
}
