//! Windowed link-quality telemetry.
//!
//! Samples are produced once per control interval by the radio/video
//! pipeline outside this crate and pushed in via
//! [`Input::Sample`][crate::Input]. The window is a pure data holder; all
//! interpretation happens in the tick's aggregation into
//! [`AggregatedMetrics`].

use std::collections::VecDeque;
use std::time::Instant;

mod aggregate;
pub use aggregate::AggregatedMetrics;
pub(crate) use aggregate::aggregate;

/// How many control intervals of history a peer keeps around.
const WINDOW_CAPACITY: usize = 256;

/// One control interval's worth of link-quality counters for a peer.
#[derive(Debug, Clone, Copy)]
pub struct LinkQualitySample {
    /// When the interval ended.
    pub at: Instant,
    /// Packets received over any physical interface. Zero means the radio
    /// was silent this interval.
    pub rx_packets: u32,
    /// Packets known lost this interval.
    pub lost_packets: u32,
    /// Retransmissions requested this interval.
    pub retransmissions: u32,
    /// Video-carrying blocks this interval.
    pub video_blocks: u32,
    /// Video blocks that needed error correction.
    pub ec_used_blocks: u32,
    /// Video blocks that needed the maximum error correction.
    pub ec_max_blocks: u32,
    /// Whether the output video for this interval had skipped/bad blocks.
    pub bad_video: bool,
    /// Smallest RSSI margin (dB above sensitivity) across interfaces.
    pub rssi_margin: Option<i16>,
    /// Smallest SNR margin (dB) across interfaces.
    pub snr_margin: Option<i16>,
}

impl LinkQualitySample {
    /// A silent interval at `at`. Mostly useful in tests.
    pub fn quiet(at: Instant) -> Self {
        LinkQualitySample {
            at,
            rx_packets: 0,
            lost_packets: 0,
            retransmissions: 0,
            video_blocks: 0,
            ec_used_blocks: 0,
            ec_max_blocks: 0,
            bad_video: false,
            rssi_margin: None,
            snr_margin: None,
        }
    }
}

/// Fixed-capacity ring of per-interval samples, newest at the back.
#[derive(Debug, Default)]
pub(crate) struct MetricsWindow {
    samples: VecDeque<LinkQualitySample>,
}

impl MetricsWindow {
    pub fn push(&mut self, sample: LinkQualitySample) {
        if self.samples.len() == WINDOW_CAPACITY {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Iterate newest to oldest.
    pub fn newest_first(&self) -> impl Iterator<Item = &LinkQualitySample> {
        self.samples.iter().rev()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.samples.len()
    }
}
