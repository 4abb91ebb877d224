//! The degrade/improve decision.
//!
//! Seven criteria, evaluated in a fixed priority order, most urgent first.
//! Degrading needs one breach (short-circuit OR); improving needs all seven
//! to pass, evaluated one strength step stricter (short-circuit AND).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{AdaptiveConfig, Strength};
use crate::metrics::AggregatedMetrics;

/// One of the link-quality criteria, in documented priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Criterion {
    /// Output video had more intervals with skipped/bad blocks than the
    /// strength-scaled ceiling allows.
    BadVideo,
    /// More retransmissions than configured, with the look-back covered.
    Retransmissions,
    /// Loss percentage above the configured maximum, look-back covered.
    Loss,
    /// Share of video intervals needing EC at or above the ceiling.
    EcUsed,
    /// Share of video intervals at maximum EC at or above the ceiling.
    EcMax,
    /// RSSI margin below the configured minimum.
    RssiMargin,
    /// SNR margin below the configured minimum.
    SnrMargin,
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Criterion::BadVideo => "bad-video",
            Criterion::Retransmissions => "retransmissions",
            Criterion::Loss => "loss",
            Criterion::EcUsed => "ec-used",
            Criterion::EcMax => "ec-max",
            Criterion::RssiMargin => "rssi-margin",
            Criterion::SnrMargin => "snr-margin",
        };
        write!(f, "{}", s)
    }
}

/// Priority order, most urgent first. Both directions walk this list.
pub(crate) const PRIORITY: [Criterion; 7] = [
    Criterion::BadVideo,
    Criterion::Retransmissions,
    Criterion::Loss,
    Criterion::EcUsed,
    Criterion::EcMax,
    Criterion::RssiMargin,
    Criterion::SnrMargin,
];

/// Which way the evaluation leans when a criterion cannot be judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    /// A criterion whose look-back is not covered cannot force a degrade.
    Degrade,
    /// A criterion whose look-back is not covered cannot vouch for an
    /// improve either.
    Improve,
}

/// The highest-priority criterion that forces a degrade at the given
/// strength, if any. One breach is enough to degrade; the walk
/// short-circuits at the most urgent one.
pub(crate) fn first_breach(
    m: &AggregatedMetrics,
    config: &AdaptiveConfig,
    strength: Strength,
) -> Option<Criterion> {
    PRIORITY
        .iter()
        .copied()
        .find(|c| is_breached(*c, m, config, strength, Direction::Degrade))
}

/// Whether the link is clean enough to try improving. Judged one strength
/// step stricter than the degrade direction so both can never hold for the
/// same snapshot, and every criterion must be verifiable: a look-back the
/// window does not cover blocks improving rather than passing it.
pub(crate) fn should_improve(m: &AggregatedMetrics, config: &AdaptiveConfig) -> bool {
    let strength = config.strength.stricter();
    !PRIORITY
        .iter()
        .copied()
        .any(|c| is_breached(c, m, config, strength, Direction::Improve))
}

fn is_breached(
    criterion: Criterion,
    m: &AggregatedMetrics,
    config: &AdaptiveConfig,
    strength: Strength,
    direction: Direction,
) -> bool {
    match criterion {
        Criterion::BadVideo => {
            m.bad_video_intervals > strength.bad_video_ceiling(config.max_bad_video_intervals)
        }
        Criterion::Retransmissions => counted(
            m.lookback >= config.retransmission_lookback,
            m.retransmissions > config.max_retransmissions,
            direction,
        ),
        Criterion::Loss => counted(
            m.lookback >= config.loss_lookback,
            m.loss_percent > config.max_loss_percent,
            direction,
        ),
        Criterion::EcUsed => m.ec_used_percent >= config.ec_used_percent_max,
        Criterion::EcMax => m.ec_max_percent >= config.ec_max_percent_max,
        Criterion::RssiMargin => margin_below(m.min_rssi_margin, config.min_rssi_margin),
        Criterion::SnrMargin => margin_below(m.min_snr_margin, config.min_snr_margin),
    }
}

/// The count criteria only apply once the window actually covers their
/// configured look-back.
fn counted(covered: bool, over: bool, direction: Direction) -> bool {
    match direction {
        Direction::Degrade => covered && over,
        Direction::Improve => !covered || over,
    }
}

fn margin_below(observed: Option<i16>, configured: Option<i16>) -> bool {
    match (observed, configured) {
        (Some(o), Some(c)) => o < c,
        _ => false,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;

    fn clean_metrics() -> AggregatedMetrics {
        AggregatedMetrics {
            lookback: Duration::from_secs(2),
            intervals: 40,
            active_intervals: 40,
            ..AggregatedMetrics::default()
        }
    }

    fn should_degrade(m: &AggregatedMetrics, config: &AdaptiveConfig) -> bool {
        first_breach(m, config, config.strength()).is_some()
    }

    #[test]
    fn clean_link_improves_not_degrades() {
        let config = AdaptiveConfig::default();
        let m = clean_metrics();
        assert!(!should_degrade(&m, &config));
        assert!(should_improve(&m, &config));
    }

    #[test]
    fn priority_order_picks_most_urgent() {
        let config = AdaptiveConfig::default();
        let mut m = clean_metrics();
        m.loss_percent = 90.0;
        m.ec_used_percent = 90.0;
        m.bad_video_intervals = 100;

        assert_eq!(
            first_breach(&m, &config, config.strength()),
            Some(Criterion::BadVideo)
        );

        m.bad_video_intervals = 0;
        assert_eq!(
            first_breach(&m, &config, config.strength()),
            Some(Criterion::Loss)
        );
    }

    #[test]
    fn lookback_guard_disables_count_criteria() {
        let config = AdaptiveConfig::default();
        let mut m = clean_metrics();
        m.loss_percent = 90.0;
        m.retransmissions = 1000;

        // Window much shorter than the configured criterion look-backs.
        m.lookback = Duration::from_millis(100);
        assert!(!should_degrade(&m, &config));

        m.lookback = Duration::from_secs(2);
        assert!(should_degrade(&m, &config));
    }

    #[test]
    fn uncovered_lookback_blocks_improve() {
        let config = AdaptiveConfig::default();
        let mut m = clean_metrics();

        // Too little history to verify the count criteria: neither
        // direction may act.
        m.lookback = Duration::from_millis(100);
        assert!(!should_degrade(&m, &config));
        assert!(!should_improve(&m, &config));

        m.lookback = Duration::from_secs(2);
        assert!(should_improve(&m, &config));
    }

    #[test]
    fn margins_need_configured_threshold() {
        let mut config = AdaptiveConfig::default();
        let mut m = clean_metrics();
        m.min_rssi_margin = Some(-5);

        assert!(!should_degrade(&m, &config));

        config = config.set_min_rssi_margin(Some(10));
        assert!(should_degrade(&m, &config));
        assert_eq!(
            first_breach(&m, &config, config.strength()),
            Some(Criterion::RssiMargin)
        );
    }

    #[test]
    fn degrade_implies_no_improve() {
        // The stricter improve bar: whatever makes the degrade direction
        // fire must also block the improve direction.
        let base = AdaptiveConfig::default();

        let snapshots = [
            AggregatedMetrics {
                bad_video_intervals: 50,
                ..clean_metrics()
            },
            AggregatedMetrics {
                retransmissions: 500,
                ..clean_metrics()
            },
            AggregatedMetrics {
                loss_percent: 99.0,
                ..clean_metrics()
            },
            AggregatedMetrics {
                ec_used_percent: 70.0,
                ec_max_percent: 70.0,
                ..clean_metrics()
            },
        ];

        for s in 1..=10 {
            let config = base.clone().set_strength(Strength::new(s).unwrap());
            for m in &snapshots {
                if should_degrade(m, &config) {
                    assert!(!should_improve(m, &config), "strength {}", s);
                }
            }
        }
    }
}
