use super::*;

use contracts::{FailReason, VehicleChange};
use serde_json::json;
use tracing::{debug, info};

impl PursuitEngine {
    /// Registers a connection with a fresh runtime state. Unknown ids get a
    /// new account funded with the starting money.
    pub fn connect(
        &mut self,
        id: &ParticipantId,
        display_name: &str,
        now: TimestampMs,
    ) -> AccountRecord {
        let starting = self.config.money.starting_money;
        let record = self.ledger.ensure_account(id, display_name, starting).clone();
        if self.sessions.insert(id.clone(), RuntimeState::default()).is_some() {
            debug!(participant = %id, "reconnect replaced an existing session");
        }

        info!(
            participant = %id,
            name = %record.display_name,
            balance = record.balance,
            role = record.role.as_str(),
            "participant connected"
        );
        self.push_ui(id, UiEvent::Balance {
            balance: record.balance,
        });
        self.push_event(
            now,
            id,
            EngineEventKind::ParticipantConnected,
            Some(json!({ "balance": record.balance, "role": record.role.as_str() })),
        );
        record
    }

    /// Delayed greeting. Returns false when the participant already left.
    pub fn send_welcome(&mut self, id: &ParticipantId) -> bool {
        if !self.sessions.contains_key(id) {
            return false;
        }
        let Some(record) = self.ledger.account(id) else {
            return false;
        };
        let welcome = Notice::Welcome {
            display_name: record.display_name.clone(),
            balance: record.balance,
        };
        let role = record.role;
        self.notify(id, welcome);
        self.notify(id, Notice::RoleWelcome { role });
        true
    }

    /// Forfeits any open episode and drops the runtime state. Returns the
    /// account as it should be persisted.
    pub fn disconnect(&mut self, id: &ParticipantId, now: TimestampMs) -> Option<AccountRecord> {
        if !self.sessions.contains_key(id) {
            debug!(participant = %id, "disconnect for unknown participant ignored");
            return None;
        }
        self.fail_episode(id, FailReason::Disconnected, now);
        self.sessions.remove(id);
        self.pending_balance_updates.remove(id);

        let record = self.ledger.account(id).cloned();
        info!(participant = %id, "participant disconnected");
        self.push_event(now, id, EngineEventKind::ParticipantDisconnected, None);
        self.flush_balance_updates();
        record
    }

    /// Vehicle lifecycle hook. Returns the failure outcome for changes that
    /// forfeit an open episode.
    pub fn handle_vehicle_change(
        &mut self,
        id: &ParticipantId,
        change: VehicleChange,
        now: TimestampMs,
    ) -> Option<FailOutcome> {
        let reason = change.fail_reason()?;
        Some(self.fail(id, reason, now))
    }

    /// Stores a new preferred locale. Blank locales are rejected.
    pub fn set_locale(&mut self, id: &ParticipantId, locale: &str) -> bool {
        let locale = locale.trim();
        if locale.is_empty() {
            return false;
        }
        match self.ledger.set_locale(id, locale) {
            Ok(()) => {
                info!(participant = %id, locale, "locale changed");
                true
            }
            Err(err) => {
                warn!(participant = %id, error = %err, "locale not stored");
                false
            }
        }
    }
}
