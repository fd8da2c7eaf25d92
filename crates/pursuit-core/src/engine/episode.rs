use super::*;

use contracts::{EpisodeOrigin, FailReason, Role, MS_PER_SECOND};
use serde_json::json;
use tracing::{debug, info};

use crate::runtime::EpisodeClock;

/// Result of a forced failure. Everything except `Failed` is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    Failed { penalty: u64 },
    NotWanted,
    NotTarget,
    UnknownParticipant,
}

impl FailOutcome {
    pub fn is_failed(self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    fn no_op_reason(self) -> &'static str {
        match self {
            Self::Failed { .. } => "failed",
            Self::NotWanted => "not_wanted",
            Self::NotTarget => "not_target",
            Self::UnknownParticipant => "unknown_participant",
        }
    }
}

impl PursuitEngine {
    /// Opens a wanted window on an idle participant, or adds `duration_ms`
    /// to the running one. A deadline that already passed is settled as an
    /// evasion first.
    pub fn open_or_extend(
        &mut self,
        id: &ParticipantId,
        duration_ms: u64,
        origin: EpisodeOrigin,
        now: TimestampMs,
    ) {
        self.open_or_extend_episode(id, duration_ms, origin, now);
        self.flush_balance_updates();
    }

    /// Balance updates are left pending for the caller to flush.
    pub(super) fn open_or_extend_episode(
        &mut self,
        id: &ParticipantId,
        duration_ms: u64,
        origin: EpisodeOrigin,
        now: TimestampMs,
    ) {
        let expiring = match self.sessions.get(id) {
            Some(state) => state.is_expiring(now),
            None => {
                debug!(participant = %id, reason = "unknown_participant", "open_or_extend ignored");
                return;
            }
        };
        if expiring {
            self.expire(id, now);
        }

        let Some(state) = self.sessions.get_mut(id) else {
            return;
        };
        let clock = match origin {
            EpisodeOrigin::Speeding => &mut state.speeding_episode,
            EpisodeOrigin::Zigzag => &mut state.zigzag_episode,
        };
        clock.get_or_insert_with(|| EpisodeClock::started(now));

        let (notice, kind, until) = match state.wanted_until.filter(|until| *until > now) {
            None => {
                let until = now.saturating_add(duration_ms);
                state.wanted_until = Some(until);
                let notice = Notice::WantedOpened {
                    origin,
                    seconds: duration_ms.div_ceil(MS_PER_SECOND),
                };
                (notice, EngineEventKind::WantedOpened, until)
            }
            Some(previous) => {
                let until = previous.saturating_add(duration_ms);
                state.wanted_until = Some(until);
                let notice = Notice::WantedExtended {
                    origin,
                    added_seconds: duration_ms.div_ceil(MS_PER_SECOND),
                    seconds: state.remaining_wanted_seconds(now),
                };
                (notice, EngineEventKind::WantedExtended, until)
            }
        };

        info!(
            participant = %id,
            origin = origin.as_str(),
            wanted_until = until,
            opened = kind == EngineEventKind::WantedOpened,
            "wanted window updated"
        );
        self.notify(id, notice);
        self.push_event(
            now,
            id,
            kind,
            Some(json!({
                "origin": origin.as_str(),
                "duration_ms": duration_ms,
                "wanted_until": until,
            })),
        );
        self.report_wanted_seconds(id, now);
    }

    /// Forfeits an open wanted window: penalty, full runtime reset, notice.
    pub fn fail(&mut self, id: &ParticipantId, reason: FailReason, now: TimestampMs) -> FailOutcome {
        let outcome = self.fail_episode(id, reason, now);
        self.flush_balance_updates();
        outcome
    }

    pub(super) fn fail_episode(
        &mut self,
        id: &ParticipantId,
        reason: FailReason,
        now: TimestampMs,
    ) -> FailOutcome {
        if let Err(outcome) = self.check_failable(id, now) {
            debug!(
                participant = %id,
                fail_reason = reason.as_str(),
                reason = outcome.no_op_reason(),
                "wanted failure is a no-op"
            );
            return outcome;
        }

        let penalty = match self.ledger.penalize(
            id,
            self.config.civilian.wanted_fail_penalty,
            reason.as_str(),
            now,
        ) {
            Ok(deducted) => deducted,
            Err(err) => {
                warn!(participant = %id, error = %err, "penalty not applied");
                0
            }
        };
        if let Some(state) = self.sessions.get_mut(id) {
            state.reset();
        }

        info!(participant = %id, reason = reason.as_str(), penalty, "wanted episode failed");
        self.notify(id, Notice::WantedFailed { reason, penalty });
        self.report_wanted_seconds(id, now);
        self.mark_balance_dirty(id);
        self.push_event(
            now,
            id,
            EngineEventKind::WantedFailed,
            Some(json!({ "reason": reason.as_str(), "penalty": penalty })),
        );
        FailOutcome::Failed { penalty }
    }

    fn check_failable(&self, id: &ParticipantId, now: TimestampMs) -> Result<(), FailOutcome> {
        let state = self
            .sessions
            .get(id)
            .ok_or(FailOutcome::UnknownParticipant)?;
        if self.ledger.role(id) != Role::Target {
            return Err(FailOutcome::NotTarget);
        }
        if !state.is_wanted(now) {
            return Err(FailOutcome::NotWanted);
        }
        Ok(())
    }

    /// Natural expiry. Credits the evasion bonus and clears the deadline.
    /// Episode clocks and cooldowns are left in place.
    pub(super) fn expire(&mut self, id: &ParticipantId, now: TimestampMs) {
        let Some(state) = self.sessions.get_mut(id) else {
            return;
        };
        state.wanted_until = None;
        state.last_reported_wanted_seconds = None;
        state.capture_dwell_started_at = None;

        let bonus = self.config.civilian.zigzag_final_bonus_amount;
        if let Err(err) = self.ledger.credit(id, bonus, "wanted_evaded", now) {
            warn!(participant = %id, error = %err, "evasion bonus not credited");
        }
        info!(participant = %id, bonus, "wanted episode evaded");
        self.notify(id, Notice::WantedEvaded { bonus });
        self.report_wanted_seconds(id, now);
        self.mark_balance_dirty(id);
        self.push_event(
            now,
            id,
            EngineEventKind::WantedEvaded,
            Some(json!({ "bonus": bonus })),
        );
    }

    /// Capture of a wanted target by the pursuers inside the capture radius.
    /// Pursuer credits are independent; a failed credit is logged and the
    /// remaining pursuers are still paid.
    pub(super) fn capture(
        &mut self,
        target: &ParticipantId,
        capturing: &[ParticipantId],
        now: TimestampMs,
    ) -> bool {
        let target_name = self.display_name(target);
        let outcome = self.fail_episode(target, FailReason::Captured, now);
        if !outcome.is_failed() {
            return false;
        }

        info!(participant = %target, pursuers = capturing.len(), "target captured");
        self.broadcast(Notice::TargetBusted {
            target_name: target_name.clone(),
        });
        self.push_event(
            now,
            target,
            EngineEventKind::Captured,
            Some(json!({ "pursuers": capturing.iter().map(ParticipantId::as_str).collect::<Vec<_>>() })),
        );

        let amount = self.config.police.bust_bonus_amount;
        for pursuer in capturing {
            if let Err(err) = self.ledger.credit(pursuer, amount, "capture_bonus", now) {
                warn!(participant = %pursuer, error = %err, "capture bonus not credited");
                continue;
            }
            self.notify(
                pursuer,
                Notice::CaptureBonus {
                    target_name: target_name.clone(),
                    amount,
                },
            );
            self.mark_balance_dirty(pursuer);
            self.push_event(
                now,
                pursuer,
                EngineEventKind::CaptureBonusPaid,
                Some(json!({ "target": target.as_str(), "amount": amount })),
            );
        }
        true
    }
}
