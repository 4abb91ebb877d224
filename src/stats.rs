//! Engine counters.

use serde::Serialize;

use crate::engine::Criterion;

/// Named counters accumulated over the engine's lifetime.
///
/// Counters only ever increase. A host wanting rates should diff two
/// snapshots taken via [`AdaptiveLink::stats`][crate::AdaptiveLink::stats].
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct EngineStats {
    /// Breaches of the bad-output-video criterion.
    pub bad_video_breaches: u64,
    /// Breaches of the retransmission-count criterion.
    pub retransmission_breaches: u64,
    /// Breaches of the loss-percentage criterion.
    pub loss_breaches: u64,
    /// Breaches of the EC-used ceiling.
    pub ec_used_breaches: u64,
    /// Breaches of the EC-max ceiling.
    pub ec_max_breaches: u64,
    /// Breaches of the RSSI margin floor.
    pub rssi_breaches: u64,
    /// Breaches of the SNR margin floor.
    pub snr_breaches: u64,

    /// Ladder steps taken downwards.
    pub degrades: u64,
    /// Ladder steps taken upwards.
    pub improves: u64,
    /// Degrade attempts with nothing left to reduce.
    pub floor_hits: u64,

    /// Control messages handed to the transport.
    pub requests_sent: u64,
    /// Acknowledgments matching the outstanding request.
    pub acks_matched: u64,
    /// Stale or duplicate acknowledgments.
    pub acks_stale: u64,
    /// Handshake sends skipped because the peer looked dead.
    pub dead_link_skips: u64,
    /// Handshake sends skipped by the minimum send delta.
    pub paced_skips: u64,
}

impl EngineStats {
    pub(crate) fn record_breach(&mut self, criterion: Criterion) {
        let counter = match criterion {
            Criterion::BadVideo => &mut self.bad_video_breaches,
            Criterion::Retransmissions => &mut self.retransmission_breaches,
            Criterion::Loss => &mut self.loss_breaches,
            Criterion::EcUsed => &mut self.ec_used_breaches,
            Criterion::EcMax => &mut self.ec_max_breaches,
            Criterion::RssiMargin => &mut self.rssi_breaches,
            Criterion::SnrMargin => &mut self.snr_breaches,
        };
        *counter += 1;
    }
}
