//! The metrics-driven degrade/improve path through the public API.

use std::time::{Duration, Instant};

use airlink::{
    AdaptiveConfig, AdaptiveLink, Criterion, Event, Input, PeerId, StepDirection, Strength,
};

mod common;
use common::{clean_sample, drain, engine_with_peer, feed_samples, lossy_sample, TestRadio};

const TICK: Duration = Duration::from_millis(50);

#[test]
fn silent_peer_never_degrades() {
    common::init_log();

    let peer = PeerId::new(1);
    let now = Instant::now();
    let mut engine = engine_with_peer(peer, now);
    let radio = TestRadio::default();

    // A window full of intervals with zero radio activity.
    feed_samples(&mut engine, peer, now, 30, |at| {
        airlink::LinkQualitySample::quiet(at)
    });

    for i in 0..10 {
        engine.handle_timeout(now + TICK * i, &radio);
    }

    let state = engine.peer(peer).unwrap();
    assert_eq!(state.adaptive_level(), 0);
    assert_eq!(engine.stats().degrades, 0);

    // Nothing pending means nothing transmitted either.
    let (transmits, _) = drain(&mut engine);
    assert!(transmits.is_empty());
}

#[test]
fn loss_breach_degrades_one_step_per_tick() {
    common::init_log();

    let peer = PeerId::new(1);
    let now = Instant::now();
    let config = AdaptiveConfig::new().set_strength(Strength::new(5).unwrap());
    let mut engine = AdaptiveLink::with_config(config).unwrap();
    engine.handle_input(now, Input::PeerPaired(peer));
    let radio = TestRadio::default();

    // A second of continuous heavy loss, enough to cover the loss
    // criterion's look-back.
    feed_samples(&mut engine, peer, now, 21, lossy_sample);

    engine.handle_timeout(now, &radio);

    let state = engine.peer(peer).unwrap();
    // Exactly one ladder step: the boost is the first available action.
    assert_eq!(state.adaptive_level(), 1);
    assert_eq!(state.dr_boost(), Some(0));
    assert!(state.has_pending());
    let request_id = state.request_id();
    assert_eq!(engine.stats().degrades, 1);

    let (transmits, events) = drain(&mut engine);
    assert_eq!(transmits.len(), 1);
    let (_, message) = &transmits[0];
    assert_eq!(message.dr_boost, Some(0));
    assert_eq!(message.request_id, request_id);

    assert!(events.contains(&Event::CriterionBreach {
        peer,
        criterion: Criterion::Loss,
    }));
    assert!(events.contains(&Event::LevelChange {
        peer,
        level: 1,
        direction: StepDirection::Down,
    }));
}

#[test]
fn breach_events_are_edge_triggered() {
    common::init_log();

    let peer = PeerId::new(1);
    let mut now = Instant::now();
    let mut engine = engine_with_peer(peer, now);
    let radio = TestRadio::default();

    feed_samples(&mut engine, peer, now, 21, lossy_sample);

    // Several ticks against the same breach report it once.
    for _ in 0..4 {
        engine.handle_timeout(now, &radio);
        now += TICK;
        engine.handle_input(now, Input::Sample(peer, lossy_sample(now)));
    }

    let (_, events) = drain(&mut engine);
    let breaches = events
        .iter()
        .filter(|e| matches!(e, Event::CriterionBreach { .. }))
        .count();
    assert_eq!(breaches, 1);
}

#[test]
fn sustained_clean_window_improves() {
    common::init_log();

    let peer = PeerId::new(1);
    let mut now = Instant::now();
    let mut engine = engine_with_peer(peer, now);
    let radio = TestRadio::default();

    // Degrade once.
    feed_samples(&mut engine, peer, now, 21, lossy_sample);
    engine.handle_timeout(now, &radio);
    assert_eq!(engine.peer(peer).unwrap().adaptive_level(), 1);

    // Resolve the handshake so the look-back clamp anchors at the ack.
    let req = engine.peer(peer).unwrap().request_id();
    now += Duration::from_millis(20);
    engine.handle_input(now, Input::Ack(peer, airlink::wire::AckFrame { request_id: req }));

    // Improving needs a clean window long enough to re-cover the count
    // criteria (the clamp anchors at the ack), plus three consecutive
    // clean ticks of hysteresis on top.
    let mut improved_at = None;
    for k in 1..=25u32 {
        let t = now + TICK * k;
        engine.handle_input(t, Input::Sample(peer, clean_sample(t)));
        engine.handle_timeout(t, &radio);

        if engine.peer(peer).unwrap().adaptive_level() == 0 {
            improved_at = Some(k);
            break;
        }
    }

    // Loss look-back (800 ms) is re-covered at tick 17; the three-tick
    // streak completes at tick 19.
    assert_eq!(improved_at, Some(19));
    assert_eq!(engine.stats().improves, 1);

    let (_, events) = drain(&mut engine);
    assert!(events.contains(&Event::LinkHealthy { peer }));
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::LevelChange { direction: StepDirection::Up, .. })));
}

#[test]
fn degrade_walks_ladder_to_floor_and_stays() {
    common::init_log();

    let peer = PeerId::new(1);
    let mut now = Instant::now();
    let mut engine = engine_with_peer(peer, now);
    let radio = TestRadio::default();

    feed_samples(&mut engine, peer, now, 21, lossy_sample);

    // Tick under continuous loss, acknowledging every request so the next
    // degrade window can rebuild behind the clamp.
    let mut last_level = 0;
    let mut ticks = 0;
    while !engine.peer(peer).unwrap().is_on_floor() {
        engine.handle_timeout(now, &radio);

        let state = engine.peer(peer).unwrap();
        // Level moves at most one per tick and never backwards here.
        assert!(state.adaptive_level() >= last_level);
        assert!(state.adaptive_level() - last_level <= 1);
        last_level = state.adaptive_level();

        let (transmits, _) = drain(&mut engine);
        for (p, message) in transmits {
            let ack = airlink::wire::AckFrame {
                request_id: message.request_id,
            };
            engine.handle_input(now, Input::Ack(p, ack));
        }

        now += TICK;
        engine.handle_input(now, Input::Sample(peer, lossy_sample(now)));

        ticks += 1;
        assert!(ticks < 200, "ladder must reach the floor");
    }

    // Boost, two datarate rungs, then the EC fallback.
    assert_eq!(engine.peer(peer).unwrap().adaptive_level(), 4);

    // The floor is idempotent: more breaching ticks change nothing.
    for _ in 0..20 {
        engine.handle_timeout(now, &radio);
        let (transmits, _) = drain(&mut engine);
        for (p, message) in transmits {
            let ack = airlink::wire::AckFrame {
                request_id: message.request_id,
            };
            engine.handle_input(now, Input::Ack(p, ack));
        }
        now += TICK;
        engine.handle_input(now, Input::Sample(peer, lossy_sample(now)));
    }
    assert_eq!(engine.peer(peer).unwrap().adaptive_level(), 4);
    assert!(engine.stats().floor_hits > 0);
}

#[test]
fn unpaired_peer_is_ignored() {
    common::init_log();

    let peer = PeerId::new(1);
    let now = Instant::now();
    let mut engine = AdaptiveLink::new();
    let radio = TestRadio::default();

    // Observed via samples but never paired.
    feed_samples(&mut engine, peer, now, 21, lossy_sample);
    engine.handle_timeout(now, &radio);

    assert_eq!(engine.peer(peer).unwrap().adaptive_level(), 0);
    assert_eq!(engine.stats().degrades, 0);
}

#[test]
fn inactive_peer_is_ignored() {
    common::init_log();

    let peer = PeerId::new(1);
    let now = Instant::now();
    let mut engine = engine_with_peer(peer, now);
    let radio = TestRadio::default();

    engine.handle_input(now, Input::PeerActive(peer, false));
    feed_samples(&mut engine, peer, now, 21, lossy_sample);
    engine.handle_timeout(now, &radio);

    assert_eq!(engine.peer(peer).unwrap().adaptive_level(), 0);

    // Re-activated, the same window degrades.
    engine.handle_input(now, Input::PeerActive(peer, true));
    engine.handle_timeout(now + TICK, &radio);
    assert_eq!(engine.peer(peer).unwrap().adaptive_level(), 1);
}

#[test]
fn ack_for_unknown_peer_is_a_noop() {
    common::init_log();

    let now = Instant::now();
    let mut engine = AdaptiveLink::new();

    // Must not panic or create state.
    engine.handle_input(
        now,
        Input::Ack(PeerId::new(9), airlink::wire::AckFrame { request_id: 1 }),
    );
    assert!(engine.peer(PeerId::new(9)).is_none());
}
