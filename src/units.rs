//! Value types shared across the engine.

use std::fmt;
use std::ops::Mul;

use serde::{Deserialize, Serialize};

/// A video bitrate expressed as bits per second (bps).
///
/// Internally the value is tracked as a floating point number for accuracy in
/// the presence of repeated calculations that can yield decimal values.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Bitrate(f64);

impl Bitrate {
    /// A bitrate of 0 bps.
    pub const ZERO: Self = Self::new(0);

    /// Bitrate from bits per second.
    pub const fn new(bps: u64) -> Self {
        Bitrate(bps as f64)
    }

    /// Bitrate from kilobits per second.
    pub const fn kbps(kbps: u64) -> Self {
        Self::new(kbps * 10_u64.pow(3))
    }

    /// Bitrate from megabits per second.
    pub const fn mbps(mbps: u64) -> Self {
        Self::new(mbps * 10_u64.pow(6))
    }

    /// The bitrate as a float of bits per second.
    pub fn as_f64(&self) -> f64 {
        self.0
    }

    /// The bitrate rounded up to entire bits per second.
    pub fn as_u64(&self) -> u64 {
        self.0.ceil() as u64
    }

    /// Clamp this bitrate between a min and max.
    pub fn clamp(&self, min: Self, max: Self) -> Self {
        Self(self.0.clamp(min.0, max.0))
    }
}

impl From<u64> for Bitrate {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl From<f64> for Bitrate {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

impl Mul<f64> for Bitrate {
    type Output = Bitrate;

    fn mul(self, rhs: f64) -> Self::Output {
        Bitrate(self.0 * rhs)
    }
}

impl fmt::Display for Bitrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rate = self.0;
        let log = rate.log10().floor() as u64;

        match log {
            0..=2 => write!(f, "{rate}bit/s"),
            3..=5 => write!(f, "{:.3}kbit/s", rate / 10.0_f64.powf(3.0)),
            6..=8 => write!(f, "{:.3}Mbit/s", rate / 10.0_f64.powf(6.0)),
            _ => write!(f, "{:.3}Gbit/s", rate / 10.0_f64.powf(9.0)),
        }
    }
}

/// A rung on a radio's modulation/datarate ladder.
///
/// Rung 0 is the slowest, most robust modulation. What bitrate a rung can
/// carry is a property of the physical link and answered by
/// [`RadioLinks`][crate::RadioLinks].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Datarate(u8);

impl Datarate {
    /// The lowest, most robust rung.
    pub const FLOOR: Self = Datarate(0);

    /// Datarate from a ladder rung index.
    pub const fn new(rung: u8) -> Self {
        Datarate(rung)
    }

    /// The rung index.
    pub fn rung(&self) -> u8 {
        self.0
    }

    /// One rung down, or None when already at the bottom.
    pub fn step_down(&self) -> Option<Datarate> {
        self.0.checked_sub(1).map(Datarate)
    }

    /// One rung up. Whether the rung exists on a given link is for
    /// [`RadioLinks`][crate::RadioLinks] to answer.
    pub fn step_up(&self) -> Option<Datarate> {
        self.0.checked_add(1).map(Datarate)
    }
}

impl fmt::Display for Datarate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rung{}", self.0)
    }
}

/// Forward-error-correction block shape.
///
/// The wire encoding (a packed two byte field with sentinels) exists only at
/// the transport boundary in [`wire`][crate::wire].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EcScheme {
    /// The encoder profile's default scheme. Also the "no change" request.
    Default,
    /// Error correction turned off entirely.
    Disabled,
    /// A fixed block shape: `total` units per block of which `ec` are
    /// redundant. Invariant: `0 < ec < total`.
    Fixed {
        /// Total units per block.
        total: u8,
        /// Redundant (error-correction) units per block.
        ec: u8,
    },
}

impl EcScheme {
    /// A fixed scheme, or None unless `0 < ec < total`.
    pub fn fixed(total: u8, ec: u8) -> Option<EcScheme> {
        if ec == 0 || ec >= total {
            return None;
        }
        Some(EcScheme::Fixed { total, ec })
    }

    /// EC overhead as a percentage of the block, 0 for Default/Disabled.
    pub fn overhead_percent(&self) -> f32 {
        match self {
            EcScheme::Fixed { total, ec } => *ec as f32 * 100.0 / *total as f32,
            _ => 0.0,
        }
    }
}

impl fmt::Display for EcScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcScheme::Default => write!(f, "ec-default"),
            EcScheme::Disabled => write!(f, "ec-off"),
            EcScheme::Fixed { total, ec } => write!(f, "ec{}/{}", ec, total),
        }
    }
}
