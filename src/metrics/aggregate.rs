use std::time::{Duration, Instant};

use crate::config::AdaptiveConfig;

use super::MetricsWindow;

/// A windowed summary of a peer's link quality, recomputed every tick and
/// never persisted.
#[derive(Debug, Clone, Copy, Default)]
pub struct AggregatedMetrics {
    /// The look-back actually covered by samples, after clamping. Criteria
    /// with a configured look-back longer than this are not applied.
    pub lookback: Duration,
    /// Intervals examined.
    pub intervals: u32,
    /// Intervals with any radio activity.
    pub active_intervals: u32,
    /// Intervals whose output video had skipped/bad blocks.
    pub bad_video_intervals: u32,
    /// Total retransmissions requested.
    pub retransmissions: u32,
    /// Percentage of active intervals that saw lost or retransmitted
    /// packets, 0..=100.
    pub loss_percent: f32,
    /// Percentage of video-carrying intervals that needed EC, 0..=100.
    pub ec_used_percent: f32,
    /// Percentage of video-carrying intervals at maximum EC, 0..=100.
    pub ec_max_percent: f32,
    /// Smallest RSSI margin observed. Only tracked when the config defines
    /// a threshold for it.
    pub min_rssi_margin: Option<i16>,
    /// Smallest SNR margin observed. Only tracked when the config defines a
    /// threshold for it.
    pub min_snr_margin: Option<i16>,
}

/// Summarize the window over the configured look-back.
///
/// `clamp` is the time since the last unresolved handshake step (request
/// sent / acknowledgment received), so metrics never span across an
/// unresolved exchange. The walk stops early when the ring holds less
/// history than wanted; the window silently shortens rather than reading
/// out-of-range samples.
pub(crate) fn aggregate(
    window: &MetricsWindow,
    config: &AdaptiveConfig,
    now: Instant,
    clamp: Option<Duration>,
) -> AggregatedMetrics {
    let mut wanted = config.wanted_lookback();
    if let Some(clamp) = clamp {
        wanted = wanted.min(clamp);
    }

    let cutoff = now.checked_sub(wanted).unwrap_or(now);

    let mut m = AggregatedMetrics::default();

    let mut lossy_intervals = 0u32;
    let mut video_intervals = 0u32;
    let mut ec_used_intervals = 0u32;
    let mut ec_max_intervals = 0u32;
    let mut oldest = None;

    for s in window.newest_first() {
        if s.at < cutoff || s.at > now {
            break;
        }
        oldest = Some(s.at);

        m.intervals += 1;

        if s.rx_packets > 0 {
            m.active_intervals += 1;
            if s.lost_packets > 0 || s.retransmissions > 0 {
                lossy_intervals += 1;
            }
        }

        m.retransmissions += s.retransmissions;

        if s.bad_video {
            m.bad_video_intervals += 1;
        }

        if s.video_blocks > 0 {
            video_intervals += 1;
            if s.ec_used_blocks > 0 {
                ec_used_intervals += 1;
            }
            if s.ec_max_blocks > 0 {
                ec_max_intervals += 1;
            }
        }

        if config.min_rssi_margin.is_some() {
            m.min_rssi_margin = min_opt(m.min_rssi_margin, s.rssi_margin);
        }
        if config.min_snr_margin.is_some() {
            m.min_snr_margin = min_opt(m.min_snr_margin, s.snr_margin);
        }
    }

    m.lookback = oldest.map(|o| now - o).unwrap_or(Duration::ZERO);
    m.loss_percent = percentage(lossy_intervals, m.active_intervals);
    m.ec_used_percent = percentage(ec_used_intervals, video_intervals);
    m.ec_max_percent = percentage(ec_max_intervals, video_intervals);

    m
}

fn percentage(part: u32, whole: u32) -> f32 {
    if whole == 0 {
        return 0.0;
    }
    part as f32 * 100.0 / whole as f32
}

fn min_opt(acc: Option<i16>, v: Option<i16>) -> Option<i16> {
    match (acc, v) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (None, b) => b,
        (a, None) => a,
    }
}
