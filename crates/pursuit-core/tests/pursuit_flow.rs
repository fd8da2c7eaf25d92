use std::collections::BTreeMap;

use contracts::{
    CivilianConfig, EngineEventKind, EpisodeOrigin, Notice, Outbound, ParticipantId,
    PursuitConfig, Role, TelemetrySample, UiEvent, Vec3, VehicleDescriptor,
};
use pursuit_core::PursuitEngine;

fn id(raw: &str) -> ParticipantId {
    ParticipantId::from(raw)
}

fn at(x: f64, y: f64, vx: f64, vy: f64) -> TelemetrySample {
    TelemetrySample {
        position: Vec3::new(x, y, 0.0),
        velocity: Vec3::new(vx, vy, 0.0),
    }
}

fn count(engine: &PursuitEngine, kind: EngineEventKind) -> usize {
    engine
        .events()
        .iter()
        .filter(|event| event.kind == kind)
        .count()
}

#[test]
fn speeding_pursuit_and_capture_end_to_end() {
    let mut engine = PursuitEngine::new(PursuitConfig::default(), Vec::new());
    for (raw, name) in [("civ", "Civ"), ("cop_a", "Cop A"), ("cop_b", "Cop B")] {
        engine.connect(&id(raw), name, 0);
    }
    let livery = VehicleDescriptor(r#"patrol {"parts":{"skin":"vehicles/police.dds"}}"#.into());
    let descriptors = BTreeMap::from([
        (id("civ"), None),
        (id("cop_a"), Some(livery.clone())),
        (id("cop_b"), Some(livery)),
    ]);
    assert_eq!(engine.classify_roles(0, &descriptors), 2);
    assert_eq!(engine.ledger().role(&id("cop_a")), Role::Pursuer);

    // Speeding far away from the pursuers.
    let start = BTreeMap::from([
        (id("civ"), at(0.0, 0.0, 35.0, 0.0)),
        (id("cop_a"), at(2_000.0, 0.0, 0.0, 0.0)),
        (id("cop_b"), at(2_000.0, 50.0, 0.0, 0.0)),
    ]);
    engine.combined_tick(1_000, &start);
    let wanted_until = engine.runtime(&id("civ")).and_then(|state| state.wanted_until);
    assert_eq!(wanted_until, Some(61_000));
    let balance_after_open = engine.ledger().balance(&id("civ")).expect("balance");

    // Pursuers close in; the target keeps moving slowly.
    let chased = BTreeMap::from([
        (id("civ"), at(0.0, 0.0, 0.0, 4.0)),
        (id("cop_a"), at(12.0, 0.0, 0.0, 0.0)),
        (id("cop_b"), at(0.0, 80.0, 0.0, 0.0)),
    ]);
    engine.combined_tick(3_000, &chased);
    // 2 s at 1/s with two pursuers in proximity.
    assert_eq!(
        engine.ledger().balance(&id("civ")),
        Some(balance_after_open + 4)
    );
    assert_eq!(count(&engine, EngineEventKind::TargetAccrualPaid), 1);

    // Stop next to cop_a for the full dwell.
    let stopped = BTreeMap::from([
        (id("civ"), at(0.0, 0.0, 0.0, 0.0)),
        (id("cop_a"), at(12.0, 0.0, 0.0, 0.0)),
        (id("cop_b"), at(0.0, 80.0, 0.0, 0.0)),
    ]);
    let cop_a_before = engine.ledger().balance(&id("cop_a")).expect("balance");
    let cop_b_before = engine.ledger().balance(&id("cop_b")).expect("balance");
    let civ_before = engine.ledger().balance(&id("civ")).expect("balance");
    engine.drain_outbox();

    let mut now = 4_000;
    let mut captured_at = None;
    while now <= 20_000 {
        if engine.combined_tick(now, &stopped).captures > 0 {
            captured_at = Some(now);
            break;
        }
        now += 1_000;
    }
    assert_eq!(captured_at, Some(11_000));
    assert_eq!(count(&engine, EngineEventKind::Captured), 1);
    assert_eq!(count(&engine, EngineEventKind::CaptureBonusPaid), 1);

    let outbox = engine.drain_outbox();
    assert!(outbox.contains(&Outbound::Broadcast {
        notice: Notice::TargetBusted {
            target_name: "Civ".to_string()
        }
    }));
    assert!(outbox.contains(&Outbound::Ui {
        to: id("civ"),
        event: UiEvent::Wanted { seconds: 0 }
    }));

    // Between the stop and the capture the target earned accrual, then paid
    // the penalty; cop_a earned accrual plus exactly one capture bonus.
    let civ_after = engine.ledger().balance(&id("civ")).expect("balance");
    let target_accrual = engine
        .events()
        .iter()
        .filter(|event| event.participant_id == id("civ"))
        .filter(|event| event.kind == EngineEventKind::TargetAccrualPaid)
        .filter(|event| event.timestamp_ms >= 4_000)
        .filter_map(|event| event.details.as_ref()?.get("amount")?.as_u64())
        .sum::<u64>();
    assert_eq!(civ_after, civ_before + target_accrual - 50);

    let cop_a_after = engine.ledger().balance(&id("cop_a")).expect("balance");
    let cop_b_after = engine.ledger().balance(&id("cop_b")).expect("balance");
    assert!(cop_a_after >= cop_a_before + 100);
    assert!(cop_b_after > cop_b_before);
    assert!(cop_b_after < cop_b_before + 100);
}

#[test]
fn zigzag_through_the_engine_opens_once() {
    let config = PursuitConfig {
        civilian: CivilianConfig {
            zigzag_min_turns: 3,
            ..CivilianConfig::default()
        },
        ..PursuitConfig::default()
    };
    let mut engine = PursuitEngine::new(config, Vec::new());
    engine.connect(&id("civ"), "Civ", 0);

    for (step, degrees) in [0.0_f64, 30.0, 0.0, 30.0, 0.0].iter().enumerate() {
        let rad = degrees.to_radians();
        let samples = BTreeMap::from([(id("civ"), at(0.0, 0.0, 15.0 * rad.cos(), 15.0 * rad.sin()))]);
        engine.combined_tick(1_000 * (step as u64 + 1), &samples);
        let opened = count(&engine, EngineEventKind::WantedOpened);
        assert_eq!(opened, usize::from(step >= 3), "after sample {step}");
    }

    let opened = engine
        .events()
        .iter()
        .find(|event| event.kind == EngineEventKind::WantedOpened)
        .expect("opened");
    assert_eq!(opened.timestamp_ms, 4_000);
    assert_eq!(
        opened.details.as_ref().and_then(|d| d.get("origin")).and_then(|o| o.as_str()),
        Some(EpisodeOrigin::Zigzag.as_str())
    );
    let state = engine.runtime(&id("civ")).expect("session");
    assert_eq!(state.wanted_until, Some(4_000 + 120_000));
    assert!(state.zigzag_episode.is_some());
}
