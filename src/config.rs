use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::units::Bitrate;
use crate::LinkError;

/// How aggressively the controller reacts, 1..=10.
///
/// Lower is slower and more conservative: longer look-back, more tolerant
/// thresholds. The improve direction is always evaluated one step stricter
/// via [`Strength::stricter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Strength(u8);

impl Strength {
    /// The most conservative setting.
    pub const MIN: Strength = Strength(1);
    /// The most aggressive setting.
    pub const MAX: Strength = Strength(10);

    /// A strength in 1..=10, or None outside that range.
    pub fn new(v: u8) -> Option<Strength> {
        if v < 1 || v > 10 {
            return None;
        }
        Some(Strength(v))
    }

    /// The raw 1..=10 value.
    pub fn as_u8(&self) -> u8 {
        self.0
    }

    /// One step more aggressive, saturating at the maximum.
    ///
    /// Used for the improve direction so that relaxing the configuration is
    /// always held to a stricter bar than degrading it.
    pub fn stricter(&self) -> Strength {
        Strength((self.0 + 1).min(Self::MAX.0))
    }

    /// Base metrics look-back for this strength.
    ///
    /// Monotonically non-increasing in strength: a conservative controller
    /// judges a longer history.
    pub(crate) fn base_lookback(&self) -> Duration {
        Duration::from_millis(150 * (11 - self.0 as u64))
    }

    /// Ceiling for intervals with bad output video, scaled from the
    /// configured base. Monotonically non-increasing in strength, and never
    /// below one.
    pub(crate) fn bad_video_ceiling(&self, base: u32) -> u32 {
        (base * (11 - self.0 as u32) / 10).max(1)
    }
}

impl Default for Strength {
    fn default() -> Self {
        Strength(5)
    }
}

/// Tuning for the adaptive link control engine.
///
/// ```
/// use airlink::{AdaptiveConfig, Strength};
///
/// let config = AdaptiveConfig::new()
///     .set_strength(Strength::new(7).unwrap())
///     .set_max_loss_percent(10.0);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveConfig {
    pub(crate) strength: Strength,

    // Degrade thresholds.
    pub(crate) max_bad_video_intervals: u32,
    pub(crate) max_retransmissions: u32,
    pub(crate) max_loss_percent: f32,
    pub(crate) ec_used_percent_max: f32,
    pub(crate) ec_max_percent_max: f32,
    pub(crate) min_rssi_margin: Option<i16>,
    pub(crate) min_snr_margin: Option<i16>,

    // Per-criterion look-back windows.
    pub(crate) retransmission_lookback: Duration,
    pub(crate) loss_lookback: Duration,

    // Encoding/radio profile.
    pub(crate) allow_dr_boost: bool,
    pub(crate) max_dr_boost: u8,
    pub(crate) default_dr_boost: u8,
    pub(crate) medium_adaptive: bool,
    pub(crate) initial_bitrate: Bitrate,
    pub(crate) floor_bitrate: Bitrate,
    pub(crate) high_sensitivity_sensor: bool,
    pub(crate) max_link_load: f32,
    pub(crate) stepdown_margin_percent: f32,
    pub(crate) ec_block_total: u8,

    // Cadence.
    pub(crate) tick_interval: Duration,
    pub(crate) improve_streak: u32,
    pub(crate) test_step_interval: Duration,
}

impl AdaptiveConfig {
    /// Creates a new default config.
    pub fn new() -> Self {
        AdaptiveConfig::default()
    }

    /// Adjustment strength, 1..=10.
    pub fn set_strength(mut self, v: Strength) -> Self {
        self.strength = v;
        self
    }

    /// Ceiling (before strength scaling) for intervals whose output video
    /// had skipped or bad blocks.
    pub fn set_max_bad_video_intervals(mut self, v: u32) -> Self {
        self.max_bad_video_intervals = v;
        self
    }

    /// Maximum retransmission requests tolerated inside the look-back.
    pub fn set_max_retransmissions(mut self, v: u32) -> Self {
        self.max_retransmissions = v;
        self
    }

    /// Maximum percentage of active intervals with lost packets.
    pub fn set_max_loss_percent(mut self, v: f32) -> Self {
        self.max_loss_percent = v;
        self
    }

    /// Ceiling for the share of video intervals that needed EC.
    pub fn set_ec_used_percent_max(mut self, v: f32) -> Self {
        self.ec_used_percent_max = v;
        self
    }

    /// Ceiling for the share of video intervals that hit maximum EC.
    pub fn set_ec_max_percent_max(mut self, v: f32) -> Self {
        self.ec_max_percent_max = v;
        self
    }

    /// Minimum RSSI margin (dB above sensitivity) before degrading.
    /// None disables the criterion.
    pub fn set_min_rssi_margin(mut self, v: Option<i16>) -> Self {
        self.min_rssi_margin = v;
        self
    }

    /// Minimum SNR margin (dB) before degrading. None disables the criterion.
    pub fn set_min_snr_margin(mut self, v: Option<i16>) -> Self {
        self.min_snr_margin = v;
        self
    }

    /// Look-back required before the retransmission criterion applies.
    pub fn set_retransmission_lookback(mut self, v: Duration) -> Self {
        self.retransmission_lookback = v;
        self
    }

    /// Look-back required before the loss criterion applies.
    pub fn set_loss_lookback(mut self, v: Duration) -> Self {
        self.loss_lookback = v;
        self
    }

    /// Whether the encoding profile permits a radio datarate boost.
    pub fn set_allow_dr_boost(mut self, v: bool) -> Self {
        self.allow_dr_boost = v;
        self
    }

    /// Upper bound for the datarate boost.
    pub fn set_max_dr_boost(mut self, v: u8) -> Self {
        self.max_dr_boost = v;
        self
    }

    /// Boost applied to newly observed peers.
    pub fn set_default_dr_boost(mut self, v: u8) -> Self {
        self.default_dr_boost = v;
        self
    }

    /// Medium-adaptive mode: forbids the two lowest datarate rungs and
    /// halves the floor bitrate.
    pub fn set_medium_adaptive(mut self, v: bool) -> Self {
        self.medium_adaptive = v;
        self
    }

    /// Target video bitrate for newly observed peers.
    pub fn set_initial_bitrate(mut self, v: Bitrate) -> Self {
        self.initial_bitrate = v;
        self
    }

    /// The fixed minimum bitrate used once the EC fallback engages.
    pub fn set_floor_bitrate(mut self, v: Bitrate) -> Self {
        self.floor_bitrate = v;
        self
    }

    /// Doubles the floor bitrate for sensors that need it.
    pub fn set_high_sensitivity_sensor(mut self, v: bool) -> Self {
        self.high_sensitivity_sensor = v;
        self
    }

    /// Fraction of a rung's nominal bitrate the improve direction may plan
    /// for, 0..=1.
    pub fn set_max_link_load(mut self, v: f32) -> Self {
        self.max_link_load = v;
        self
    }

    /// Safety margin subtracted from the achievable bitrate when stepping a
    /// datarate down, in percent.
    pub fn set_stepdown_margin_percent(mut self, v: f32) -> Self {
        self.stepdown_margin_percent = v;
        self
    }

    /// Total units per EC block for the worst-case fallback scheme.
    pub fn set_ec_block_total(mut self, v: u8) -> Self {
        self.ec_block_total = v;
        self
    }

    /// The control tick cadence, used for timeout scheduling.
    pub fn set_tick_interval(mut self, v: Duration) -> Self {
        self.tick_interval = v;
        self
    }

    /// Consecutive improve-clean ticks required before relaxing.
    pub fn set_improve_streak(mut self, v: u32) -> Self {
        self.improve_streak = v;
        self
    }

    /// Interval between ladder steps in test mode.
    pub fn set_test_step_interval(mut self, v: Duration) -> Self {
        self.test_step_interval = v;
        self
    }

    /// The configured strength.
    pub fn strength(&self) -> Strength {
        self.strength
    }

    /// Checks the config for values the engine cannot operate on.
    pub fn validate(&self) -> Result<(), LinkError> {
        fn percent(name: &str, v: f32) -> Result<(), LinkError> {
            if !(0.0..=100.0).contains(&v) {
                return Err(LinkError::Config(format!("{} out of range: {}", name, v)));
            }
            Ok(())
        }

        percent("max_loss_percent", self.max_loss_percent)?;
        percent("ec_used_percent_max", self.ec_used_percent_max)?;
        percent("ec_max_percent_max", self.ec_max_percent_max)?;
        percent("stepdown_margin_percent", self.stepdown_margin_percent)?;

        if !(0.0..=1.0).contains(&self.max_link_load) || self.max_link_load == 0.0 {
            return Err(LinkError::Config(format!(
                "max_link_load out of range: {}",
                self.max_link_load
            )));
        }
        if self.default_dr_boost > self.max_dr_boost {
            return Err(LinkError::Config(format!(
                "default_dr_boost {} above max_dr_boost {}",
                self.default_dr_boost, self.max_dr_boost
            )));
        }
        if self.ec_block_total < 2 {
            return Err(LinkError::Config("ec_block_total below 2".into()));
        }
        if self.floor_bitrate <= Bitrate::ZERO {
            return Err(LinkError::Config("floor_bitrate must be positive".into()));
        }
        if self.tick_interval.is_zero() {
            return Err(LinkError::Config("tick_interval must be positive".into()));
        }

        Ok(())
    }

    /// The widest look-back the aggregator may want, before handshake
    /// clamping.
    pub(crate) fn wanted_lookback(&self) -> Duration {
        self.strength
            .base_lookback()
            .max(self.retransmission_lookback)
            .max(self.loss_lookback)
    }
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        AdaptiveConfig {
            strength: Strength::default(),

            max_bad_video_intervals: 10,
            max_retransmissions: 30,
            max_loss_percent: 15.0,
            ec_used_percent_max: 50.0,
            ec_max_percent_max: 20.0,
            min_rssi_margin: None,
            min_snr_margin: None,

            retransmission_lookback: Duration::from_millis(600),
            loss_lookback: Duration::from_millis(800),

            allow_dr_boost: true,
            max_dr_boost: 2,
            default_dr_boost: 1,
            medium_adaptive: false,
            initial_bitrate: Bitrate::mbps(10),
            floor_bitrate: Bitrate::mbps(1),
            high_sensitivity_sensor: false,
            max_link_load: 0.75,
            stepdown_margin_percent: 10.0,
            ec_block_total: 12,

            tick_interval: Duration::from_millis(50),
            improve_streak: 3,
            test_step_interval: Duration::from_millis(200),
        }
    }
}
