//! The participant registry and every operation that mutates it.
//!
//! `PursuitEngine` owns one `RuntimeState` per connected participant, the
//! account ledger, and an outbox of messages for the host. It never talks to
//! the host directly: callers feed it telemetry and lifecycle events and
//! drain the outbox afterwards.

use std::collections::{BTreeMap, BTreeSet};

mod episode;
mod lifecycle;
mod step;


use contracts::{
    AccountRecord, EngineEvent, EngineEventKind, Notice, Outbound, ParticipantId, PursuitConfig,
    TimestampMs, UiEvent, DEFAULT_LOCALE,
};
use serde_json::Value;
use tracing::warn;

use crate::detectors::{SpeedingDetector, ZigzagDetector};
use crate::ledger::{AccountLedger, LedgerEntry};
use crate::proximity::ProximitySettings;
use crate::roles::RoleClassifier;
use crate::runtime::RuntimeState;

pub use episode::FailOutcome;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickMetrics {
    pub participants: u64,
    pub detections: u64,
    pub expiries: u64,
    pub captures: u64,
    pub payments: u64,
}

#[derive(Debug)]
pub struct PursuitEngine {
    config: PursuitConfig,
    speeding: SpeedingDetector,
    zigzag: ZigzagDetector,
    classifier: RoleClassifier,
    proximity: ProximitySettings,
    ledger: AccountLedger,
    sessions: BTreeMap<ParticipantId, RuntimeState>,
    outbox: Vec<Outbound>,
    event_log: Vec<EngineEvent>,
    next_event_sequence: u64,
    next_tip_index: usize,
    spatial_pool: Option<rayon::ThreadPool>,
    pending_balance_updates: BTreeSet<ParticipantId>,
    last_tick_metrics: TickMetrics,
}

impl PursuitEngine {
    pub fn new(config: PursuitConfig, accounts: impl IntoIterator<Item = AccountRecord>) -> Self {
        let worker_threads = usize::try_from(config.general.worker_threads.max(1)).unwrap_or(1);
        let spatial_pool = if worker_threads > 1 {
            rayon::ThreadPoolBuilder::new()
                .num_threads(worker_threads)
                .build()
                .map_err(|err| warn!(error = %err, "spatial pool unavailable, running sequentially"))
                .ok()
        } else {
            None
        };
        Self {
            speeding: SpeedingDetector::new(&config.civilian),
            zigzag: ZigzagDetector::new(&config.civilian),
            classifier: RoleClassifier::new(&config.police),
            proximity: ProximitySettings::from_config(&config.police),
            ledger: AccountLedger::new(accounts),
            config,
            sessions: BTreeMap::new(),
            outbox: Vec::new(),
            event_log: Vec::new(),
            next_event_sequence: 0,
            next_tip_index: 0,
            spatial_pool,
            pending_balance_updates: BTreeSet::new(),
            last_tick_metrics: TickMetrics::default(),
        }
    }

    pub fn config(&self) -> &PursuitConfig {
        &self.config
    }

    pub fn ledger(&self) -> &AccountLedger {
        &self.ledger
    }

    pub fn account(&self, id: &ParticipantId) -> Option<&AccountRecord> {
        self.ledger.account(id)
    }

    /// Merges persisted accounts; records already in memory win.
    pub fn import_accounts(&mut self, records: impl IntoIterator<Item = AccountRecord>) -> usize {
        self.ledger.import(records)
    }

    pub fn runtime(&self, id: &ParticipantId) -> Option<&RuntimeState> {
        self.sessions.get(id)
    }

    pub fn is_connected(&self, id: &ParticipantId) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn connected(&self) -> Vec<ParticipantId> {
        self.sessions.keys().cloned().collect()
    }

    /// Events recorded since the last drain.
    pub fn events(&self) -> &[EngineEvent] {
        &self.event_log
    }

    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.event_log)
    }

    pub fn drain_ledger_entries(&mut self) -> Vec<LedgerEntry> {
        self.ledger.drain_entries()
    }

    pub fn last_tick_metrics(&self) -> TickMetrics {
        self.last_tick_metrics
    }

    pub fn drain_outbox(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbox)
    }

    // -----------------------------------------------------------------------
    // Outbox helpers
    // -----------------------------------------------------------------------

    fn notify(&mut self, to: &ParticipantId, notice: Notice) {
        let locale = self
            .ledger
            .account(to)
            .map(|record| record.locale.clone())
            .unwrap_or_else(|| DEFAULT_LOCALE.to_string());
        self.outbox.push(Outbound::Notice {
            to: to.clone(),
            locale,
            notice,
        });
    }

    fn broadcast(&mut self, notice: Notice) {
        self.outbox.push(Outbound::Broadcast { notice });
    }

    fn push_ui(&mut self, to: &ParticipantId, event: UiEvent) {
        self.outbox.push(Outbound::Ui {
            to: to.clone(),
            event,
        });
    }

    /// Sends the remaining wanted seconds when they differ from the last
    /// value sent to this participant.
    fn report_wanted_seconds(&mut self, id: &ParticipantId, now: TimestampMs) {
        let Some(state) = self.sessions.get_mut(id) else {
            return;
        };
        let seconds = state.remaining_wanted_seconds(now);
        if state.last_reported_wanted_seconds == Some(seconds) {
            return;
        }
        state.last_reported_wanted_seconds = Some(seconds);
        self.push_ui(id, UiEvent::Wanted { seconds });
    }

    fn mark_balance_dirty(&mut self, id: &ParticipantId) {
        self.pending_balance_updates.insert(id.clone());
    }

    /// Sends one balance update per participant whose balance changed since
    /// the last flush. Runs after all credits of an operation are applied.
    fn flush_balance_updates(&mut self) {
        let pending = std::mem::take(&mut self.pending_balance_updates);
        for id in pending {
            if !self.sessions.contains_key(&id) {
                continue;
            }
            if let Some(balance) = self.ledger.balance(&id) {
                self.push_ui(&id, UiEvent::Balance { balance });
            }
        }
    }

    fn push_event(
        &mut self,
        now: TimestampMs,
        participant: &ParticipantId,
        kind: EngineEventKind,
        details: Option<Value>,
    ) {
        self.next_event_sequence += 1;
        self.event_log.push(EngineEvent {
            sequence: self.next_event_sequence,
            timestamp_ms: now,
            participant_id: participant.clone(),
            kind,
            details,
        });
    }

    fn display_name(&self, id: &ParticipantId) -> String {
        self.ledger
            .account(id)
            .map(|record| record.display_name.clone())
            .unwrap_or_else(|| id.to_string())
    }
}
