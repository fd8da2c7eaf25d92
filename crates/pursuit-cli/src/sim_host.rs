//! Deterministic in-process host for `simulate`.
//!
//! Pursuers park on their own lane 200 m apart. Each target cruises, then
//! speeds, then weaves; afterwards even-numbered targets pull over next to
//! their lane's pursuer and odd-numbered ones keep cruising far away.

use std::collections::{BTreeMap, BTreeSet};

use contracts::{
    InboundUiEvent, Notice, ParticipantId, TelemetrySample, TimestampMs, Vec3, VehicleChange,
    VehicleDescriptor, MS_PER_SECOND,
};
use pursuit_api::{HostError, HostEvent, HostRuntime};
use tracing::{debug, info};

const LANE_SPACING_M: f64 = 200.0;
const PARKED_OFFSET_M: f64 = 10.0;
const CRUISE_MS: f64 = 20.0;
const SPEEDING_MS: f64 = 35.0;
const WEAVE_DEG: f64 = 30.0;

#[derive(Debug, Default)]
pub struct ScriptedHost {
    clock: TimestampMs,
    targets: Vec<ParticipantId>,
    pursuers: Vec<ParticipantId>,
    departed: BTreeSet<ParticipantId>,
    script: Vec<(TimestampMs, HostEvent)>,
    pub notices: BTreeMap<&'static str, u64>,
    pub broadcasts: BTreeMap<&'static str, u64>,
    pub ui_events: u64,
}

impl ScriptedHost {
    pub fn new(targets: usize, pursuers: usize) -> Self {
        let targets = (1..=targets)
            .map(|n| ParticipantId::new(format!("target_{n:02}")))
            .collect::<Vec<_>>();
        let pursuers = (1..=pursuers)
            .map(|n| ParticipantId::new(format!("pursuer_{n:02}")))
            .collect::<Vec<_>>();

        let mut script = Vec::new();
        if let Some(first) = targets.first() {
            let payload = serde_json::to_string(&InboundUiEvent::SetLanguage {
                locale: "de".to_string(),
            })
            .unwrap_or_default();
            script.push((
                3_000,
                HostEvent::Ui {
                    id: first.clone(),
                    payload,
                },
            ));
        }
        if let Some(second) = targets.get(1) {
            script.push((
                25_000,
                HostEvent::Vehicle {
                    id: second.clone(),
                    change: VehicleChange::Reset,
                },
            ));
            script.push((
                26_000,
                HostEvent::Vehicle {
                    id: second.clone(),
                    change: VehicleChange::Spawned,
                },
            ));
        }

        Self {
            targets,
            pursuers,
            script,
            ..Self::default()
        }
    }

    pub fn advance(&mut self, now: TimestampMs) {
        self.clock = now;
    }

    /// Scripted events due at or before `now`, in script order.
    pub fn due_events(&mut self, now: TimestampMs) -> Vec<HostEvent> {
        let split = self.script.partition_point(|(at, _)| *at <= now);
        self.script
            .drain(..split)
            .map(|(_, event)| event)
            .collect()
    }

    pub fn disconnect_all(&mut self) -> Vec<HostEvent> {
        let everyone = self
            .targets
            .iter()
            .chain(self.pursuers.iter())
            .filter(|id| !self.departed.contains(*id))
            .cloned()
            .collect::<Vec<_>>();
        self.departed.extend(everyone.iter().cloned());
        everyone
            .into_iter()
            .map(|id| HostEvent::Disconnected { id })
            .collect()
    }

    fn lane_y(&self, index: usize) -> f64 {
        let lanes = self.pursuers.len().max(1);
        (index % lanes) as f64 * LANE_SPACING_M
    }

    fn target_sample(&self, index: usize) -> TelemetrySample {
        let t = self.clock as f64 / MS_PER_SECOND as f64;
        let lane = self.lane_y(index);
        let start_x = 2_000.0 + 500.0 * index as f64;

        let (position, velocity) = if t < 5.0 {
            (Vec3::new(start_x + CRUISE_MS * t, lane, 0.0), Vec3::new(CRUISE_MS, 0.0, 0.0))
        } else if t < 10.0 {
            let x = start_x + 100.0 + SPEEDING_MS * (t - 5.0);
            (Vec3::new(x, lane, 0.0), Vec3::new(SPEEDING_MS, 0.0, 0.0))
        } else if t < 20.0 {
            let sign = if (t as u64) % 2 == 0 { 1.0 } else { -1.0 };
            let angle = (sign * WEAVE_DEG).to_radians();
            let x = start_x + 275.0 + CRUISE_MS * (t - 10.0);
            (
                Vec3::new(x, lane, 0.0),
                Vec3::new(CRUISE_MS * angle.cos(), CRUISE_MS * angle.sin(), 0.0),
            )
        } else if index % 2 == 0 {
            (Vec3::new(PARKED_OFFSET_M, lane, 0.0), Vec3::default())
        } else {
            let x = start_x + 475.0 + CRUISE_MS * (t - 20.0);
            (Vec3::new(x, lane, 0.0), Vec3::new(CRUISE_MS, 0.0, 0.0))
        };
        TelemetrySample { position, velocity }
    }

    fn target_index(&self, id: &ParticipantId) -> Option<usize> {
        self.targets.iter().position(|candidate| candidate == id)
    }

    fn pursuer_index(&self, id: &ParticipantId) -> Option<usize> {
        self.pursuers.iter().position(|candidate| candidate == id)
    }
}

impl HostRuntime for ScriptedHost {
    fn connected_participants(&self) -> Result<Vec<ParticipantId>, HostError> {
        Ok(self
            .targets
            .iter()
            .chain(self.pursuers.iter())
            .filter(|id| !self.departed.contains(*id))
            .cloned()
            .collect())
    }

    fn display_name(&self, id: &ParticipantId) -> Result<String, HostError> {
        if let Some(index) = self.target_index(id) {
            return Ok(format!("Driver {}", index + 1));
        }
        if let Some(index) = self.pursuer_index(id) {
            return Ok(format!("Officer {}", index + 1));
        }
        Err(HostError::NotConnected(id.clone()))
    }

    fn is_connected(&self, id: &ParticipantId) -> bool {
        !self.departed.contains(id)
            && (self.target_index(id).is_some() || self.pursuer_index(id).is_some())
    }

    fn telemetry(&self, id: &ParticipantId) -> Result<Option<TelemetrySample>, HostError> {
        if let Some(index) = self.pursuer_index(id) {
            let position = Vec3::new(0.0, index as f64 * LANE_SPACING_M, 0.0);
            return Ok(Some(TelemetrySample {
                position,
                velocity: Vec3::default(),
            }));
        }
        let Some(index) = self.target_index(id) else {
            return Err(HostError::NotConnected(id.clone()));
        };
        // The third driver's vehicle handle goes stale now and then.
        if index == 2 && (self.clock / MS_PER_SECOND) % 17 == 0 {
            return Err(HostError::Call {
                call: "telemetry",
                message: "stale vehicle handle".to_string(),
            });
        }
        Ok(Some(self.target_sample(index)))
    }

    fn vehicle_descriptor(
        &self,
        id: &ParticipantId,
    ) -> Result<Option<VehicleDescriptor>, HostError> {
        if self.pursuer_index(id).is_some() {
            return Ok(Some(VehicleDescriptor(
                r#"interceptor {"parts":{"skin":"vehicles/interceptor/police.dds"}}"#.to_string(),
            )));
        }
        if self.target_index(id).is_some() {
            return Ok(Some(VehicleDescriptor(
                r#"coupe {"parts":{"paint_design":"vehicles/coupe/red_stripes.dds"}}"#.to_string(),
            )));
        }
        Err(HostError::NotConnected(id.clone()))
    }

    fn send_notice(
        &mut self,
        to: &ParticipantId,
        locale: &str,
        notice: &Notice,
    ) -> Result<(), HostError> {
        if !self.is_connected(to) {
            return Err(HostError::NotConnected(to.clone()));
        }
        debug!(participant = %to, locale, key = notice.key(), "notice");
        *self.notices.entry(notice.key()).or_default() += 1;
        Ok(())
    }

    fn broadcast_notice(&mut self, notice: &Notice) -> Result<(), HostError> {
        info!(key = notice.key(), ?notice, "broadcast");
        *self.broadcasts.entry(notice.key()).or_default() += 1;
        Ok(())
    }

    fn send_ui_event(
        &mut self,
        to: &ParticipantId,
        event_name: &str,
        payload: &str,
    ) -> Result<(), HostError> {
        if !self.is_connected(to) {
            return Err(HostError::NotConnected(to.clone()));
        }
        debug!(participant = %to, event_name, payload, "ui event");
        self.ui_events += 1;
        Ok(())
    }
}
