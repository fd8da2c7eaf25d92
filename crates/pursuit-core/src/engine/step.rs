use super::*;

use contracts::{FailReason, Role, TelemetrySample, VehicleDescriptor};
use serde_json::json;
use tracing::{debug, info};

use crate::accrual::{accrue_pursuer, accrue_target, AccrualPayment, TargetRates};
use crate::detectors::Detection;
use crate::proximity::{advance_dwell, resolve, DwellOutcome, ProximityReport};
use crate::telemetry::TelemetrySnapshot;

impl PursuitEngine {
    /// One combined tick over every connected participant.
    ///
    /// Phases run in a fixed order against a snapshot taken up front:
    /// detection, expiry, proximity and capture, then accrual. `samples` holds
    /// whatever telemetry the host could provide; a missing entry means "no
    /// data this tick" for that participant.
    pub fn combined_tick(
        &mut self,
        now: TimestampMs,
        samples: &BTreeMap<ParticipantId, TelemetrySample>,
    ) -> TickMetrics {
        let snapshot = self.take_snapshot(now, samples);
        let mut metrics = TickMetrics {
            participants: snapshot.len() as u64,
            ..TickMetrics::default()
        };

        metrics.detections = self.run_detectors(&snapshot, now);
        metrics.expiries = self.sweep_expired(now);

        let report = if self.config.features.police_active() {
            let report = self.resolve_proximity(&snapshot, now);
            metrics.captures = self.advance_captures(&snapshot, &report, now);
            report
        } else {
            for state in self.sessions.values_mut() {
                state.capture_dwell_started_at = None;
            }
            ProximityReport::default()
        };

        metrics.payments = self.pay_accruals(&report, now);
        self.flush_balance_updates();

        debug!(
            participants = metrics.participants,
            detections = metrics.detections,
            expiries = metrics.expiries,
            captures = metrics.captures,
            payments = metrics.payments,
            "combined tick complete"
        );
        self.last_tick_metrics = metrics;
        metrics
    }

    fn take_snapshot(
        &self,
        now: TimestampMs,
        samples: &BTreeMap<ParticipantId, TelemetrySample>,
    ) -> TelemetrySnapshot {
        let mut snapshot = TelemetrySnapshot::new(now);
        for id in self.sessions.keys() {
            snapshot.insert(id.clone(), self.ledger.role(id), samples.get(id).copied());
        }
        snapshot
    }

    fn run_detectors(&mut self, snapshot: &TelemetrySnapshot, now: TimestampMs) -> u64 {
        let speeding_on = self.config.features.speeding_active();
        let zigzag_on = self.config.features.zigzag_active();
        if !speeding_on && !zigzag_on {
            return 0;
        }

        let mut detections: Vec<(ParticipantId, Detection)> = Vec::new();
        for (id, frame) in snapshot.frames() {
            if frame.role != Role::Target {
                continue;
            }
            let Some(state) = self.sessions.get_mut(id) else {
                continue;
            };
            if speeding_on {
                if let Some(hit) =
                    self.speeding
                        .observe(state, frame.role, frame.speed_kmh(), now)
                {
                    detections.push((id.clone(), hit));
                }
            }
            if zigzag_on {
                if let Some(hit) = self
                    .zigzag
                    .observe(state, frame.role, frame.sample.as_ref(), now)
                {
                    detections.push((id.clone(), hit));
                }
            }
        }

        for (id, detection) in &detections {
            self.open_or_extend_episode(id, detection.duration_ms, detection.origin, now);
        }
        detections.len() as u64
    }

    /// Settles every passed deadline, then refreshes everyone's wanted
    /// countdown.
    fn sweep_expired(&mut self, now: TimestampMs) -> u64 {
        let expired = self
            .sessions
            .iter()
            .filter(|(_, state)| state.is_expiring(now))
            .map(|(id, _)| id.clone())
            .collect::<Vec<_>>();
        for id in &expired {
            self.expire(id, now);
        }
        for id in self.connected() {
            self.report_wanted_seconds(&id, now);
        }
        expired.len() as u64
    }

    fn resolve_proximity(&self, snapshot: &TelemetrySnapshot, now: TimestampMs) -> ProximityReport {
        let targets = snapshot
            .positioned(Role::Target)
            .into_iter()
            .filter(|(id, _)| self.sessions.get(id).is_some_and(|state| state.is_wanted(now)))
            .collect::<Vec<_>>();
        if targets.is_empty() {
            return ProximityReport::default();
        }
        let pursuers = snapshot.positioned(Role::Pursuer);
        resolve(&targets, &pursuers, self.proximity, self.spatial_pool.as_ref())
    }

    fn advance_captures(
        &mut self,
        snapshot: &TelemetrySnapshot,
        report: &ProximityReport,
        now: TimestampMs,
    ) -> u64 {
        let speed_limit = self.config.police.busted_speed_limit_kmh as f64;
        let capture_radius = self.proximity.capture_radius_m;
        let dwell_ms = self.config.police.busted_stop_time_ms;

        let mut captures = Vec::new();
        for (id, state) in self.sessions.iter_mut() {
            let Some(entry) = report.targets.get(id) else {
                state.capture_dwell_started_at = None;
                continue;
            };
            let slow = snapshot
                .frame(id)
                .and_then(|frame| frame.speed_kmh())
                .is_some_and(|speed| speed < speed_limit);
            let holds = slow && entry.closest_within(capture_radius);
            match advance_dwell(&mut state.capture_dwell_started_at, holds, now, dwell_ms) {
                DwellOutcome::Capture => {
                    captures.push((id.clone(), entry.capturing_pursuers.clone()));
                }
                DwellOutcome::Started => {
                    debug!(participant = %id, "capture dwell started");
                }
                DwellOutcome::Reset | DwellOutcome::Holding { .. } => {}
            }
        }

        let mut captured = 0;
        for (target, pursuers) in &captures {
            if self.capture(target, pursuers, now) {
                captured += 1;
            }
        }
        captured
    }

    fn pay_accruals(&mut self, report: &ProximityReport, now: TimestampMs) -> u64 {
        let police_on = self.config.features.police_active();
        let pursuer_rate = self.config.police.police_bonus_per_second;
        let rates = TargetRates {
            speeding_per_second: self.config.civilian.speeding_bonus_per_second,
            zigzag_per_second: self.config.civilian.zigzag_prorated_bonus,
        };

        let mut payments: Vec<(ParticipantId, Role, AccrualPayment)> = Vec::new();
        for (id, state) in self.sessions.iter_mut() {
            let role = self.ledger.role(id);
            let payment = match role {
                Role::Pursuer if police_on => {
                    accrue_pursuer(state, pursuer_rate, report.targets_near(id), now)
                }
                Role::Pursuer => None,
                Role::Target if state.is_wanted(now) => {
                    accrue_target(state, rates, report.proximate_pursuers(id), now)
                }
                Role::Target => None,
            };
            if let Some(payment) = payment.filter(|payment| payment.amount > 0) {
                payments.push((id.clone(), role, payment));
            }
        }

        for (id, role, payment) in &payments {
            if let Err(err) = self.ledger.credit(id, payment.amount, "accrual", now) {
                warn!(participant = %id, error = %err, "accrual not credited");
                continue;
            }
            let kind = match role {
                Role::Pursuer => EngineEventKind::PursuerAccrualPaid,
                Role::Target => EngineEventKind::TargetAccrualPaid,
            };
            self.mark_balance_dirty(id);
            self.push_event(
                now,
                id,
                kind,
                Some(json!({ "amount": payment.amount, "seconds": payment.seconds })),
            );
        }
        payments.len() as u64
    }

    // -----------------------------------------------------------------------
    // Roles
    // -----------------------------------------------------------------------

    /// Applies a role. A wanted target switching to pursuer forfeits its
    /// episode first. Returns whether the role changed.
    pub fn apply_role(&mut self, id: &ParticipantId, role: Role, now: TimestampMs) -> bool {
        if !self.sessions.contains_key(id) {
            debug!(participant = %id, "role change for unknown participant ignored");
            return false;
        }
        let previous = self.ledger.role(id);
        if previous == role {
            return false;
        }

        if role == Role::Pursuer {
            self.fail_episode(id, FailReason::BecamePursuer, now);
        }
        if let Err(err) = self.ledger.set_role(id, role) {
            warn!(participant = %id, error = %err, "role not stored");
            return false;
        }
        if let Some(state) = self.sessions.get_mut(id) {
            let reported = state.last_reported_wanted_seconds;
            state.reset();
            state.last_reported_wanted_seconds = reported;
        }

        info!(participant = %id, from = previous.as_str(), to = role.as_str(), "role changed");
        self.notify(id, Notice::RoleWelcome { role });
        self.report_wanted_seconds(id, now);
        self.push_event(
            now,
            id,
            EngineEventKind::RoleChanged,
            Some(json!({ "from": previous.as_str(), "to": role.as_str() })),
        );
        self.flush_balance_updates();
        true
    }

    /// Classifies one participant from its vehicle descriptor.
    pub fn classify_participant(
        &mut self,
        id: &ParticipantId,
        descriptor: Option<&VehicleDescriptor>,
        now: TimestampMs,
    ) -> bool {
        let role = self.classifier.classify(descriptor);
        self.apply_role(id, role, now)
    }

    /// Role-check cadence. Participants missing from `descriptors` had no
    /// readable vehicle data this round and keep their role.
    pub fn classify_roles(
        &mut self,
        now: TimestampMs,
        descriptors: &BTreeMap<ParticipantId, Option<VehicleDescriptor>>,
    ) -> u64 {
        let mut changed = 0;
        for (id, descriptor) in descriptors {
            if self.classify_participant(id, descriptor.as_ref(), now) {
                changed += 1;
            }
        }
        changed
    }

    // -----------------------------------------------------------------------
    // Flat income and tips
    // -----------------------------------------------------------------------

    pub fn pay_money_per_minute(&mut self, now: TimestampMs) -> u64 {
        if !self.config.features.money_per_minute_enabled {
            return 0;
        }
        let amount = self.config.money.money_per_minute_amount;
        let mut paid = 0;
        for id in self.connected() {
            if let Err(err) = self.ledger.credit(&id, amount, "money_per_minute", now) {
                warn!(participant = %id, error = %err, "money per minute not credited");
                continue;
            }
            self.notify(&id, Notice::MoneyPerMinute { amount });
            self.mark_balance_dirty(&id);
            self.push_event(
                now,
                &id,
                EngineEventKind::MoneyPerMinutePaid,
                Some(json!({ "amount": amount })),
            );
            paid += 1;
        }
        self.flush_balance_updates();
        paid
    }

    /// Broadcasts the next rotating tip. Returns its key.
    pub fn broadcast_next_tip(&mut self) -> Option<String> {
        if !self.config.features.cool_message_enabled {
            return None;
        }
        let tips = &self.config.general.cool_messages;
        if tips.is_empty() {
            return None;
        }
        let tip_key = tips[self.next_tip_index % tips.len()].clone();
        self.next_tip_index = (self.next_tip_index + 1) % tips.len();
        self.broadcast(Notice::Tip {
            tip_key: tip_key.clone(),
        });
        Some(tip_key)
    }
}
