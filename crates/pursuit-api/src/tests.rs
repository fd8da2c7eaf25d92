use std::collections::BTreeSet;

use contracts::{Notice, Role, TelemetrySample, Vec3, VehicleDescriptor};

use super::*;

#[derive(Debug, Default)]
struct FakeHost {
    names: BTreeMap<ParticipantId, String>,
    online: BTreeSet<ParticipantId>,
    telemetry: BTreeMap<ParticipantId, TelemetrySample>,
    descriptors: BTreeMap<ParticipantId, VehicleDescriptor>,
    broken_telemetry: BTreeSet<ParticipantId>,
    unreachable: BTreeSet<ParticipantId>,
    notices: Vec<(ParticipantId, String, Notice)>,
    broadcasts: Vec<Notice>,
    ui: Vec<(ParticipantId, String, String)>,
}

impl FakeHost {
    fn join(&mut self, raw: &str, name: &str) -> ParticipantId {
        let id = ParticipantId::from(raw);
        self.names.insert(id.clone(), name.to_string());
        self.online.insert(id.clone());
        id
    }

    fn drive(&mut self, id: &ParticipantId, x: f64, vx: f64) {
        self.telemetry.insert(
            id.clone(),
            TelemetrySample {
                position: Vec3::new(x, 0.0, 0.0),
                velocity: Vec3::new(vx, 0.0, 0.0),
            },
        );
    }

    fn notice_keys(&self, id: &ParticipantId) -> Vec<&'static str> {
        self.notices
            .iter()
            .filter(|(to, _, _)| to == id)
            .map(|(_, _, notice)| notice.key())
            .collect()
    }
}

impl HostRuntime for FakeHost {
    fn connected_participants(&self) -> Result<Vec<ParticipantId>, HostError> {
        Ok(self.online.iter().cloned().collect())
    }

    fn display_name(&self, id: &ParticipantId) -> Result<String, HostError> {
        self.names
            .get(id)
            .cloned()
            .ok_or_else(|| HostError::NotConnected(id.clone()))
    }

    fn is_connected(&self, id: &ParticipantId) -> bool {
        self.online.contains(id)
    }

    fn telemetry(&self, id: &ParticipantId) -> Result<Option<TelemetrySample>, HostError> {
        if self.broken_telemetry.contains(id) {
            return Err(HostError::Call {
                call: "telemetry",
                message: "vehicle query timed out".to_string(),
            });
        }
        Ok(self.telemetry.get(id).copied())
    }

    fn vehicle_descriptor(
        &self,
        id: &ParticipantId,
    ) -> Result<Option<VehicleDescriptor>, HostError> {
        Ok(self.descriptors.get(id).cloned())
    }

    fn send_notice(
        &mut self,
        to: &ParticipantId,
        locale: &str,
        notice: &Notice,
    ) -> Result<(), HostError> {
        if self.unreachable.contains(to) {
            return Err(HostError::NotConnected(to.clone()));
        }
        self.notices
            .push((to.clone(), locale.to_string(), notice.clone()));
        Ok(())
    }

    fn broadcast_notice(&mut self, notice: &Notice) -> Result<(), HostError> {
        self.broadcasts.push(notice.clone());
        Ok(())
    }

    fn send_ui_event(
        &mut self,
        to: &ParticipantId,
        event_name: &str,
        payload: &str,
    ) -> Result<(), HostError> {
        if self.unreachable.contains(to) {
            return Err(HostError::NotConnected(to.clone()));
        }
        self.ui
            .push((to.clone(), event_name.to_string(), payload.to_string()));
        Ok(())
    }
}

fn police_livery() -> VehicleDescriptor {
    VehicleDescriptor(r#"interceptor {"parts":{"skin":"vehicles/police.dds"}}"#.to_string())
}

fn connect(server: &mut PursuitServer, host: &mut FakeHost, id: &ParticipantId, now: u64) {
    server.handle_event(
        host,
        HostEvent::Connected {
            id: id.clone(),
            display_name: None,
        },
        now,
    );
}

#[test]
fn welcome_is_delayed_after_connect() {
    let mut host = FakeHost::default();
    let ana = host.join("ana", "Ana");
    let mut server = PursuitServer::from_config(PursuitConfig::default(), 0);

    connect(&mut server, &mut host, &ana, 0);
    assert_eq!(
        host.ui,
        vec![(
            ana.clone(),
            "balance_update".to_string(),
            r#"{"balance":3333}"#.to_string()
        )]
    );
    assert_eq!(
        server.scheduler().due_at(&TaskKey::for_participant(TaskKind::Welcome, ana.clone())),
        Some(2_000)
    );

    server.pump(&mut host, 1_000);
    assert!(host.notice_keys(&ana).is_empty());

    server.pump(&mut host, 2_000);
    assert_eq!(host.notice_keys(&ana), vec!["welcome", "role_welcome_target"]);
    assert_eq!(
        server.engine().account(&ana).map(|record| record.display_name.as_str()),
        Some("Ana")
    );
}

#[test]
fn vehicle_swap_fails_episode_and_rechecks_role() {
    let mut host = FakeHost::default();
    let ana = host.join("ana", "Ana");
    let mut server = PursuitServer::from_config(PursuitConfig::default(), 0);
    connect(&mut server, &mut host, &ana, 0);

    host.drive(&ana, 0.0, 40.0);
    server.pump(&mut host, 1_000);
    assert_eq!(
        server.engine().runtime(&ana).and_then(|state| state.wanted_until),
        Some(61_000)
    );

    host.descriptors.insert(ana.clone(), police_livery());
    server.handle_event(
        &mut host,
        HostEvent::Vehicle {
            id: ana.clone(),
            change: VehicleChange::Swapped,
        },
        1_200,
    );
    assert!(server
        .engine()
        .runtime(&ana)
        .is_some_and(|state| state.wanted_until.is_none()));
    assert_eq!(server.engine().ledger().balance(&ana), Some(3_333 - 50));
    assert_eq!(server.engine().ledger().role(&ana), Role::Target);

    let report = server.pump(&mut host, 1_700);
    assert_eq!(report.tasks_run, 1);
    assert_eq!(server.engine().ledger().role(&ana), Role::Pursuer);
    let keys = host.notice_keys(&ana);
    assert!(keys.contains(&"wanted_failed"));
    assert_eq!(keys.last(), Some(&"role_welcome_pursuer"));
}

#[test]
fn disconnect_and_language_change_are_persisted() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("accounts.sqlite");
    let mut host = FakeHost::default();
    let ana = host.join("ana", "Ana");

    {
        let mut server = PursuitServer::from_config(PursuitConfig::default(), 0);
        assert_eq!(server.attach_account_store(&db_path).expect("attach"), 0);
        connect(&mut server, &mut host, &ana, 0);
        server.handle_event(
            &mut host,
            HostEvent::Ui {
                id: ana.clone(),
                payload: r#"{"type":"set_language","locale":"de"}"#.to_string(),
            },
            500,
        );
        server.handle_event(&mut host, HostEvent::Disconnected { id: ana.clone() }, 1_500);

        assert!(!server.engine().is_connected(&ana));
        assert!(!server
            .scheduler()
            .is_scheduled(&TaskKey::for_participant(TaskKind::Welcome, ana.clone())));
        assert_eq!(server.last_persistence_error(), None);
    }

    let mut server = PursuitServer::from_config(PursuitConfig::default(), 0);
    assert_eq!(server.attach_account_store(&db_path).expect("reattach"), 1);
    let record = server.engine().account(&ana).expect("stored account");
    assert_eq!(record.locale, "de");
    assert_eq!(record.balance, 3_333);
}

#[test]
fn malformed_presentation_payload_is_ignored() {
    let mut host = FakeHost::default();
    let ana = host.join("ana", "Ana");
    let mut server = PursuitServer::from_config(PursuitConfig::default(), 0);
    connect(&mut server, &mut host, &ana, 0);

    for payload in [
        "not json",
        r#"{"type":"set_volume","level":3}"#,
        r#"{"type":"set_language","locale":"  "}"#,
    ] {
        server.handle_event(
            &mut host,
            HostEvent::Ui {
                id: ana.clone(),
                payload: payload.to_string(),
            },
            100,
        );
    }
    assert_eq!(
        server.engine().account(&ana).map(|record| record.locale.as_str()),
        Some("en")
    );
}

#[test]
fn telemetry_failure_skips_only_that_participant() {
    let mut host = FakeHost::default();
    let ana = host.join("ana", "Ana");
    let bo = host.join("bo", "Bo");
    let mut server = PursuitServer::from_config(PursuitConfig::default(), 0);
    connect(&mut server, &mut host, &ana, 0);
    connect(&mut server, &mut host, &bo, 0);

    host.drive(&ana, 0.0, 40.0);
    host.drive(&bo, 500.0, 40.0);
    host.broken_telemetry.insert(ana.clone());

    let report = server.pump(&mut host, 1_000);
    assert_eq!(report.combined_ticks, 1);
    assert!(server
        .engine()
        .runtime(&ana)
        .is_some_and(|state| state.wanted_until.is_none()));
    assert_eq!(
        server.engine().runtime(&bo).and_then(|state| state.wanted_until),
        Some(61_000)
    );
}

#[test]
fn combined_tick_reaps_participants_the_host_dropped() {
    let mut host = FakeHost::default();
    let ana = host.join("ana", "Ana");
    let bo = host.join("bo", "Bo");
    let mut server = PursuitServer::from_config(PursuitConfig::default(), 0);
    assert_eq!(server.adopt_connected(&mut host, 0), 2);
    assert_eq!(server.adopt_connected(&mut host, 0), 0);

    host.online.remove(&bo);
    server.pump(&mut host, 1_000);
    assert!(server.engine().is_connected(&ana));
    assert!(!server.engine().is_connected(&bo));
    assert!(!server
        .scheduler()
        .is_scheduled(&TaskKey::for_participant(TaskKind::Welcome, bo.clone())));
}

#[test]
fn disabled_cadences_are_never_scheduled() {
    let mut config = PursuitConfig::default();
    config.features.cool_message_enabled = false;
    let mut host = FakeHost::default();
    let ana = host.join("ana", "Ana");
    let mut server = PursuitServer::from_config(config, 0);
    assert!(!server
        .scheduler()
        .is_scheduled(&TaskKey::global(TaskKind::CoolMessage)));
    assert_eq!(
        server.scheduler().due_at(&TaskKey::global(TaskKind::MoneyPerMinute)),
        Some(60_000)
    );

    connect(&mut server, &mut host, &ana, 0);
    server.pump(&mut host, 60_000);
    assert_eq!(server.engine().ledger().balance(&ana), Some(3_343));
    assert!(host.broadcasts.is_empty());
    assert_eq!(
        server.scheduler().due_at(&TaskKey::global(TaskKind::MoneyPerMinute)),
        Some(120_000)
    );
}

#[test]
fn undeliverable_messages_are_counted_and_dropped() {
    let mut host = FakeHost::default();
    let ana = host.join("ana", "Ana");
    let mut server = PursuitServer::from_config(PursuitConfig::default(), 0);
    connect(&mut server, &mut host, &ana, 0);

    host.unreachable.insert(ana.clone());
    let report = server.pump(&mut host, 2_000);
    assert!(report.failed_deliveries >= 2);
    assert_eq!(report.delivered, 0);
    assert!(host.notice_keys(&ana).is_empty());
}

#[test]
fn save_all_requires_an_attached_store() {
    let mut server = PursuitServer::from_config(PursuitConfig::default(), 0);
    assert!(matches!(
        server.save_all(0),
        Err(PersistenceError::NotAttached)
    ));
}

#[test]
fn an_hour_of_pumping_retains_no_engine_records() {
    let mut host = FakeHost::default();
    let ana = host.join("ana", "Ana");
    let mut server = PursuitServer::from_config(PursuitConfig::default(), 0);
    connect(&mut server, &mut host, &ana, 0);
    host.drive(&ana, 0.0, 40.0);

    for second in 1..=3_600_u64 {
        server.pump(&mut host, second * 1_000);
        assert!(server.engine().events().is_empty());
        assert!(server.engine().ledger().entries().is_empty());
    }
    assert_eq!(server.event_counts().get("participant_connected"), Some(&1));
    assert_eq!(server.event_counts().get("money_per_minute_paid"), Some(&60));
    assert!(server.event_counts().get("wanted_opened").is_some_and(|count| *count > 1));
    assert!(server.ledger_entries_seen() >= 60);
}
