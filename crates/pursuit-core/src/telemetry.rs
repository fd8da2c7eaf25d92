//! Read-only capture of roles and kinematics taken at the start of a tick.
//!
//! Every later phase of the tick reads this snapshot instead of live state,
//! so detectors and the resolver never observe each other's partial updates.

use std::collections::BTreeMap;

use contracts::{ParticipantId, Role, TelemetrySample, TimestampMs, Vec3};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticipantFrame {
    pub role: Role,
    pub sample: Option<TelemetrySample>,
}

impl ParticipantFrame {
    pub fn position(&self) -> Option<Vec3> {
        self.sample.map(|sample| sample.position)
    }

    pub fn velocity(&self) -> Option<Vec3> {
        self.sample.map(|sample| sample.velocity)
    }

    pub fn speed_kmh(&self) -> Option<f64> {
        self.sample.map(|sample| sample.horizontal_speed_kmh())
    }
}

#[derive(Debug, Clone, Default)]
pub struct TelemetrySnapshot {
    pub taken_at: TimestampMs,
    frames: BTreeMap<ParticipantId, ParticipantFrame>,
}

impl TelemetrySnapshot {
    pub fn new(taken_at: TimestampMs) -> Self {
        Self {
            taken_at,
            frames: BTreeMap::new(),
        }
    }

    /// Records a participant. Non-finite samples count as "no data".
    pub fn insert(&mut self, id: ParticipantId, role: Role, sample: Option<TelemetrySample>) {
        let sample = sample
            .filter(|sample| sample.position.is_finite() && sample.velocity.is_finite());
        self.frames.insert(id, ParticipantFrame { role, sample });
    }

    pub fn frame(&self, id: &ParticipantId) -> Option<&ParticipantFrame> {
        self.frames.get(id)
    }

    pub fn frames(&self) -> impl Iterator<Item = (&ParticipantId, &ParticipantFrame)> {
        self.frames.iter()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Participants of `role` with a known position, in id order.
    pub fn positioned(&self, role: Role) -> Vec<(ParticipantId, Vec3)> {
        self.frames
            .iter()
            .filter(|(_, frame)| frame.role == role)
            .filter_map(|(id, frame)| frame.position().map(|position| (id.clone(), position)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_finite_samples_are_dropped() {
        let mut snapshot = TelemetrySnapshot::new(10);
        snapshot.insert(
            ParticipantId::from("a"),
            Role::Target,
            Some(TelemetrySample {
                position: Vec3::new(f64::NAN, 0.0, 0.0),
                velocity: Vec3::default(),
            }),
        );
        let frame = snapshot.frame(&ParticipantId::from("a")).expect("frame");
        assert!(frame.sample.is_none());
        assert!(frame.speed_kmh().is_none());
    }

    #[test]
    fn positioned_filters_by_role_and_position() {
        let mut snapshot = TelemetrySnapshot::new(10);
        let sample = TelemetrySample {
            position: Vec3::new(1.0, 2.0, 3.0),
            velocity: Vec3::default(),
        };
        snapshot.insert(ParticipantId::from("cop"), Role::Pursuer, Some(sample));
        snapshot.insert(ParticipantId::from("cop2"), Role::Pursuer, None);
        snapshot.insert(ParticipantId::from("civ"), Role::Target, Some(sample));

        let pursuers = snapshot.positioned(Role::Pursuer);
        assert_eq!(pursuers.len(), 1);
        assert_eq!(pursuers[0].0, ParticipantId::from("cop"));
    }
}
