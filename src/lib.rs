//! A Sans I/O adaptive link controller for long-range FPV video.
//!
//! This is a [Sans I/O][sansio] implementation meaning the [`AdaptiveLink`]
//! instance itself is not doing any network talking. Furthermore it has no
//! internal threads or async tasks. All operations are happening from the
//! calls of the public API.
//!
//! The engine is the decision half of an adaptive FPV video link: a ground
//! station and an airborne unit exchange framed radio packets over multiple
//! physical radio interfaces, and the airborne encoder's bitrate, the
//! forward-error-correction overhead, the radio datarate boost and the
//! key-frame interval must follow the instantaneous quality of that link
//! without operator intervention. Everything physical (interface drivers,
//! the mapping of interfaces to logical links, packet framing and
//! encryption, relaying) stays with the caller and is reached through the
//! [`RadioLinks`] trait and the [`Input`]/[`Output`] exchange.
//!
//! # Run loop
//!
//! Driving the engine forward is a run loop that, regardless of sync or
//! async, looks like this.
//!
//! ```no_run
//! use std::time::Instant;
//! use airlink::{AdaptiveLink, Input, Output, RadioLinks};
//!
//! let mut engine = AdaptiveLink::new();
//! # struct Radio;
//! # impl RadioLinks for Radio {
//! #     fn links(&self) -> Vec<airlink::LinkId> { vec![] }
//! #     fn is_usable_for_adaptive_video(&self, _: airlink::LinkId) -> bool { false }
//! #     fn assigned_datarate(&self, _: airlink::LinkId) -> Option<airlink::Datarate> { None }
//! #     fn max_bitrate(&self, _: airlink::Datarate, _: airlink::LinkId) -> Option<airlink::Bitrate> { None }
//! #     fn required_datarate(&self, _: airlink::Bitrate, _: airlink::LinkId) -> Option<airlink::Datarate> { None }
//! # }
//! # let radio = Radio;
//! # fn wait_for_input_until(_t: Instant) -> Option<(airlink::PeerId, airlink::LinkQualitySample)> { None }
//!
//! loop {
//!     // Poll output until we get a timeout. Transmits are handed to the
//!     // radio's control channel, events to telemetry.
//!     let timeout = match engine.poll_output() {
//!         Output::Timeout(v) => v,
//!         Output::Transmit(_peer, message) => {
//!             let _bytes = message.to_bytes();
//!             // send on the control channel...
//!             continue;
//!         }
//!         Output::Event(event) => {
//!             println!("{:?}", event);
//!             continue;
//!         }
//!     };
//!
//!     // Feed samples/acks as they arrive, tick when the timeout is due.
//!     if let Some((peer, sample)) = wait_for_input_until(timeout) {
//!         engine.handle_input(Instant::now(), Input::Sample(peer, sample));
//!     } else {
//!         engine.handle_timeout(Instant::now(), &radio);
//!     }
//! }
//! ```
//!
//! # Decision model
//!
//! Per tick and peer, windowed link telemetry is aggregated and judged
//! against seven prioritized criteria. One breach degrades the
//! configuration one ladder rung; only a sustained all-clear (judged one
//! strength step stricter) improves it again. Every change travels to the
//! remote peer through an idempotent request/acknowledge handshake with at
//! most one request in flight.
//!
//! [sansio]: https://sans-io.readthedocs.io

#![forbid(unsafe_code)]
#![allow(clippy::new_without_default)]
#![allow(clippy::bool_to_int_with_if)]
#![allow(clippy::manual_range_contains)]
#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

use std::time::{Duration, Instant};

use thiserror::Error;

mod config;
pub use config::{AdaptiveConfig, Strength};

mod engine;
pub use engine::{AdaptiveLink, Criterion, StepDirection};

mod links;
pub use links::{LinkId, RadioLinks};

pub mod metrics;
pub use metrics::{AggregatedMetrics, LinkQualitySample};

mod peer;
pub use peer::{PeerId, PeerLinkState};

mod stats;
pub use stats::EngineStats;

mod units;
pub use units::{Bitrate, Datarate, EcScheme};

mod util;

pub mod wire;
use wire::{AckFrame, ControlMessage};

/// Errors for the whole engine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LinkError {
    /// A config value the engine cannot operate on.
    #[error("config: {0}")]
    Config(String),

    /// Control channel frame errors.
    #[error("{0}")]
    Wire(#[from] wire::WireError),
}

/// Externally produced data fed into [`AdaptiveLink::handle_input`].
#[derive(Debug)]
pub enum Input {
    /// One control interval's link-quality counters for a peer. The peer
    /// is created when first observed.
    Sample(PeerId, LinkQualitySample),

    /// An acknowledgment frame received on the control channel.
    Ack(PeerId, AckFrame),

    /// The peer completed initial pairing; adaptive control may engage.
    PeerPaired(PeerId),

    /// Whether adaptive control governs this peer. False while a
    /// fixed-rate or one-way profile is in effect or negotiation runs.
    PeerActive(PeerId, bool),

    /// The peer disconnected or restarted; its state is dropped.
    PeerGone(PeerId),
}

/// Output polled from [`AdaptiveLink::poll_output`].
#[derive(Debug)]
pub enum Output {
    /// When to call [`AdaptiveLink::handle_timeout`] next.
    Timeout(Instant),

    /// A control message to put on the transport queue towards the peer.
    Transmit(PeerId, ControlMessage),

    /// An observability event. Edge-triggered, never repeated while the
    /// underlying state is unchanged.
    Event(Event),
}

/// Edge-triggered observability events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// A criterion started breaching for this peer.
    CriterionBreach {
        /// The affected peer.
        peer: PeerId,
        /// The highest-priority breached criterion.
        criterion: Criterion,
    },

    /// All criteria pass again for this peer.
    LinkHealthy {
        /// The affected peer.
        peer: PeerId,
    },

    /// A ladder action was applied.
    LevelChange {
        /// The affected peer.
        peer: PeerId,
        /// The adaptive level after the change.
        level: u32,
        /// Which way the ladder moved.
        direction: StepDirection,
    },

    /// The first acknowledgment from this peer arrived.
    HandshakeCompleted {
        /// The affected peer.
        peer: PeerId,
        /// Round-trip time of the completing exchange, when measurable.
        rtt: Option<Duration>,
    },

    /// Adaptive control entered the global pause.
    Paused {
        /// When the pause ends, unless extended.
        until: Instant,
    },

    /// The global pause was lifted.
    Resumed,
}
