//! Host-facing facade: drives the pursuit core on the delayed-task scheduler,
//! keeps accounts in SQLite, and delivers the engine outbox to the host.

mod host;
mod outbound;
mod persistence;

use std::collections::BTreeMap;
use std::path::Path;

use contracts::{
    AccountRecord, InboundUiEvent, ParticipantId, PursuitConfig, TimestampMs, VehicleChange,
};
use persistence::SqliteAccountStore;
use pursuit_core::{PursuitEngine, TaskKey, TaskKind, TaskScheduler};
use tracing::{debug, info, warn};

pub use host::{HostError, HostEvent, HostRuntime};
pub use outbound::{deliver, encode_ui_payload, DeliveryReport};
pub use persistence::{AccountLoad, PersistenceError};

const WELCOME_DELAY_MS: u64 = 2_000;
const ROLE_RECHECK_DELAY_MS: u64 = 500;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpReport {
    pub tasks_run: u64,
    pub combined_ticks: u64,
    pub delivered: usize,
    pub failed_deliveries: usize,
}

#[derive(Debug)]
pub struct PursuitServer {
    engine: PursuitEngine,
    scheduler: TaskScheduler,
    store: Option<SqliteAccountStore>,
    last_persistence_error: Option<String>,
    event_counts: BTreeMap<&'static str, u64>,
    ledger_entries_seen: u64,
}

impl PursuitServer {
    /// Builds the engine and schedules every enabled cadence relative to `now`.
    pub fn from_config(config: PursuitConfig, now: TimestampMs) -> Self {
        let mut server = Self {
            engine: PursuitEngine::new(config, Vec::new()),
            scheduler: TaskScheduler::new(),
            store: None,
            last_persistence_error: None,
            event_counts: BTreeMap::new(),
            ledger_entries_seen: 0,
        };
        for kind in [
            TaskKind::CombinedTick,
            TaskKind::RoleCheck,
            TaskKind::MoneyPerMinute,
            TaskKind::CoolMessage,
            TaskKind::Autosave,
        ] {
            server.reschedule(kind, now);
        }
        server
    }

    /// Opens the account store and merges its records into the ledger. A
    /// store that opens but cannot be read leaves the book empty.
    pub fn attach_account_store(
        &mut self,
        path: impl AsRef<Path>,
    ) -> Result<usize, PersistenceError> {
        let store = SqliteAccountStore::open(path)?;
        let imported = match store.load_all() {
            Ok(load) => {
                if load.skipped > 0 {
                    warn!(skipped = load.skipped, "some stored accounts were unreadable");
                }
                self.engine.import_accounts(load.records)
            }
            Err(err) => {
                warn!(error = %err, "account load failed, starting with an empty book");
                self.last_persistence_error = Some(err.to_string());
                0
            }
        };
        info!(imported, "account store attached");
        self.store = Some(store);
        Ok(imported)
    }

    pub fn engine(&self) -> &PursuitEngine {
        &self.engine
    }

    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    pub fn config(&self) -> &PursuitConfig {
        self.engine.config()
    }

    pub fn last_persistence_error(&self) -> Option<&str> {
        self.last_persistence_error.as_deref()
    }

    /// Engine events seen so far, by kind.
    pub fn event_counts(&self) -> &BTreeMap<&'static str, u64> {
        &self.event_counts
    }

    pub fn ledger_entries_seen(&self) -> u64 {
        self.ledger_entries_seen
    }

    pub fn next_due(&self) -> Option<TimestampMs> {
        self.scheduler.next_due()
    }

    /// Connects everyone the host already reports, e.g. after a restart.
    pub fn adopt_connected(&mut self, host: &mut impl HostRuntime, now: TimestampMs) -> usize {
        let participants = match host.connected_participants() {
            Ok(participants) => participants,
            Err(err) => {
                warn!(error = %err, "could not enumerate connected participants");
                return 0;
            }
        };
        let mut adopted = 0;
        for id in participants {
            if self.engine.is_connected(&id) {
                continue;
            }
            self.connect(&*host, &id, None, now);
            adopted += 1;
        }
        self.flush_outbox(host);
        adopted
    }

    pub fn handle_event(
        &mut self,
        host: &mut impl HostRuntime,
        event: HostEvent,
        now: TimestampMs,
    ) -> DeliveryReport {
        match event {
            HostEvent::Connected { id, display_name } => {
                self.connect(&*host, &id, display_name, now);
            }
            HostEvent::Disconnected { id } => self.disconnect(&id, now),
            HostEvent::Vehicle { id, change } => self.vehicle_changed(&id, change, now),
            HostEvent::Ui { id, payload } => self.ui_event(&id, &payload, now),
        }
        self.flush_outbox(host)
    }

    /// Runs every task due at `now`, then delivers the outbox.
    pub fn pump(&mut self, host: &mut impl HostRuntime, now: TimestampMs) -> PumpReport {
        let mut report = PumpReport::default();
        while let Some(task) = self.scheduler.pop_due(now) {
            report.tasks_run += 1;
            let TaskKey { kind, participant } = task.key;
            match (kind, participant) {
                (TaskKind::CombinedTick, _) => {
                    self.combined_tick(&*host, now);
                    report.combined_ticks += 1;
                }
                (TaskKind::RoleCheck, _) => self.role_check(&*host, now),
                (TaskKind::MoneyPerMinute, _) => {
                    self.engine.pay_money_per_minute(now);
                }
                (TaskKind::CoolMessage, _) => {
                    self.engine.broadcast_next_tip();
                }
                (TaskKind::Autosave, _) => {
                    if self.store.is_some() {
                        // Failures are kept in last_persistence_error.
                        let _ = self.save_all(now);
                    }
                }
                (TaskKind::Welcome, Some(id)) => {
                    self.engine.send_welcome(&id);
                }
                (TaskKind::RoleRecheck, Some(id)) => self.recheck_role(&*host, &id, now),
                (kind, None) => {
                    debug!(?kind, "participant task without a participant ignored");
                }
            }
            if kind.is_periodic() {
                self.reschedule(kind, now);
            }
        }

        let delivery = self.flush_outbox(host);
        report.delivered = delivery.delivered;
        report.failed_deliveries = delivery.failed;
        report
    }

    /// Persists every known account.
    pub fn save_all(&mut self, now: TimestampMs) -> Result<usize, PersistenceError> {
        let Some(store) = self.store.as_mut() else {
            return Err(PersistenceError::NotAttached);
        };
        match store.save_all(self.engine.ledger().records(), now) {
            Ok(saved) => {
                debug!(saved, "accounts saved");
                self.last_persistence_error = None;
                Ok(saved)
            }
            Err(err) => {
                warn!(error = %err, "account save failed");
                self.last_persistence_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Host events
    // -----------------------------------------------------------------------

    fn connect(
        &mut self,
        host: &impl HostRuntime,
        id: &ParticipantId,
        display_name: Option<String>,
        now: TimestampMs,
    ) {
        let display_name = display_name
            .or_else(|| {
                host.display_name(id)
                    .map_err(|err| debug!(participant = %id, error = %err, "display name unavailable"))
                    .ok()
            })
            .unwrap_or_else(|| id.to_string());
        self.engine.connect(id, &display_name, now);
        self.scheduler.schedule_after(
            TaskKey::for_participant(TaskKind::Welcome, id.clone()),
            now,
            WELCOME_DELAY_MS,
        );
    }

    fn disconnect(&mut self, id: &ParticipantId, now: TimestampMs) {
        let cancelled = self.scheduler.cancel_participant(id);
        if let Some(record) = self.engine.disconnect(id, now) {
            debug!(participant = %id, cancelled, "pending tasks dropped on disconnect");
            self.persist(&record, now);
        }
    }

    fn vehicle_changed(&mut self, id: &ParticipantId, change: VehicleChange, now: TimestampMs) {
        self.engine.handle_vehicle_change(id, change, now);
        if change.affects_livery() && self.engine.is_connected(id) {
            self.scheduler.schedule_after(
                TaskKey::for_participant(TaskKind::RoleRecheck, id.clone()),
                now,
                ROLE_RECHECK_DELAY_MS,
            );
        }
    }

    fn ui_event(&mut self, id: &ParticipantId, payload: &str, now: TimestampMs) {
        let event = match serde_json::from_str::<InboundUiEvent>(payload) {
            Ok(event) => event,
            Err(err) => {
                warn!(participant = %id, error = %err, "malformed presentation event ignored");
                return;
            }
        };
        match event {
            InboundUiEvent::SetLanguage { locale } => {
                if !self.engine.set_locale(id, &locale) {
                    return;
                }
                if let Some(record) = self.engine.account(id).cloned() {
                    self.persist(&record, now);
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Cadences
    // -----------------------------------------------------------------------

    fn combined_tick(&mut self, host: &impl HostRuntime, now: TimestampMs) {
        for id in self.engine.connected() {
            if !host.is_connected(&id) {
                info!(participant = %id, "host no longer reports participant, disconnecting");
                self.disconnect(&id, now);
            }
        }

        let mut samples = BTreeMap::new();
        for id in self.engine.connected() {
            match host.telemetry(&id) {
                Ok(Some(sample)) => {
                    samples.insert(id, sample);
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(participant = %id, error = %err, "telemetry unavailable this tick");
                }
            }
        }
        self.engine.combined_tick(now, &samples);
    }

    fn role_check(&mut self, host: &impl HostRuntime, now: TimestampMs) {
        let mut descriptors = BTreeMap::new();
        for id in self.engine.connected() {
            match host.vehicle_descriptor(&id) {
                Ok(descriptor) => {
                    descriptors.insert(id, descriptor);
                }
                Err(err) => {
                    warn!(participant = %id, error = %err, "vehicle descriptor unavailable, role kept");
                }
            }
        }
        let changed = self.engine.classify_roles(now, &descriptors);
        if changed > 0 {
            debug!(changed, "role check changed roles");
        }
    }

    fn recheck_role(&mut self, host: &impl HostRuntime, id: &ParticipantId, now: TimestampMs) {
        match host.vehicle_descriptor(id) {
            Ok(descriptor) => {
                self.engine.classify_participant(id, descriptor.as_ref(), now);
            }
            Err(err) => {
                warn!(participant = %id, error = %err, "vehicle descriptor unavailable, role kept");
            }
        }
    }

    fn reschedule(&mut self, kind: TaskKind, now: TimestampMs) {
        let config = self.engine.config();
        let interval = match kind {
            TaskKind::CombinedTick => Some(config.general.combined_tick_interval_ms),
            TaskKind::RoleCheck => Some(config.general.role_check_interval_ms),
            TaskKind::MoneyPerMinute => config
                .features
                .money_per_minute_enabled
                .then_some(config.money.money_per_minute_interval_ms),
            TaskKind::CoolMessage => (config.features.cool_message_enabled
                && !config.general.cool_messages.is_empty())
            .then_some(config.money.cool_message_interval_ms),
            TaskKind::Autosave => Some(config.general.autosave_interval_ms),
            TaskKind::Welcome | TaskKind::RoleRecheck => None,
        };
        if let Some(interval) = interval {
            self.scheduler
                .schedule_after(TaskKey::global(kind), now, interval.max(1));
        }
    }

    // -----------------------------------------------------------------------
    // Output
    // -----------------------------------------------------------------------

    fn persist(&mut self, record: &AccountRecord, now: TimestampMs) {
        let Some(store) = self.store.as_mut() else {
            return;
        };
        if let Err(err) = store.save(record, now) {
            warn!(participant = %record.id, error = %err, "account save failed");
            self.last_persistence_error = Some(err.to_string());
        }
    }

    fn flush_outbox(&mut self, host: &mut impl HostRuntime) -> DeliveryReport {
        self.drain_records();
        let messages = self.engine.drain_outbox();
        if messages.is_empty() {
            return DeliveryReport::default();
        }
        deliver(host, messages)
    }

    /// Folds the engine's event log and ledger journal into counters.
    fn drain_records(&mut self) {
        for event in self.engine.drain_events() {
            *self.event_counts.entry(event.kind.as_str()).or_default() += 1;
        }
        let entries = self.engine.drain_ledger_entries();
        for entry in &entries {
            debug!(
                entry = %entry.entry_id,
                participant = %entry.account,
                delta = entry.delta,
                cause = %entry.cause,
                "ledger entry"
            );
        }
        self.ledger_entries_seen += entries.len() as u64;
    }
}

#[cfg(test)]
mod tests;
