//! The radio link collaborator surface.
//!
//! Enumerating physical interfaces, mapping them to logical links and
//! choosing a transmit interface per link all happen outside this crate.
//! The engine only asks the questions below, freshly every tick, and never
//! caches the answers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::units::{Bitrate, Datarate};

/// Identifies a logical radio link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LinkId(u8);

impl LinkId {
    /// Link id from an index.
    pub const fn new(v: u8) -> Self {
        LinkId(v)
    }
}

impl From<u8> for LinkId {
    fn from(v: u8) -> Self {
        LinkId(v)
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link{}", self.0)
    }
}

/// Queries the engine makes against the radio layer.
///
/// All methods are pure queries. A query answered `None` (link unknown,
/// rung not present on that link's ladder) makes the corresponding ladder
/// action a no-op for this tick; the engine keeps polling so behavior
/// self-corrects once capability returns.
pub trait RadioLinks {
    /// The logical links currently configured.
    fn links(&self) -> Vec<LinkId>;

    /// Whether this link may carry adaptive video at all.
    fn is_usable_for_adaptive_video(&self, link: LinkId) -> bool;

    /// The datarate currently assigned to carry video on this link.
    fn assigned_datarate(&self, link: LinkId) -> Option<Datarate>;

    /// The maximum video bitrate this link sustains at the given datarate.
    fn max_bitrate(&self, datarate: Datarate, link: LinkId) -> Option<Bitrate>;

    /// The lowest datarate able to carry the given bitrate on this link.
    fn required_datarate(&self, bitrate: Bitrate, link: LinkId) -> Option<Datarate>;
}
