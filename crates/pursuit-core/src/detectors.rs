//! Violation detectors.
//!
//! Each detector inspects one participant's frame of the tick snapshot and
//! its `RuntimeState`. When it fires it records its own episode clock and
//! cooldown and returns a `Detection`; opening or extending the wanted
//! window is left to the episode manager.

use contracts::{CivilianConfig, EpisodeOrigin, Role, TelemetrySample, TimestampMs};

use crate::geometry::{normalize_delta, velocity_heading, TurnDirection};
use crate::runtime::{cooldown_active, EpisodeClock, RuntimeState, ZigzagTurnState};

/// Request to open or extend the wanted window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    pub origin: EpisodeOrigin,
    pub duration_ms: u64,
}

// ---------------------------------------------------------------------------
// Speeding
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct SpeedingDetector {
    limit_kmh: f64,
    duration_ms: u64,
    cooldown_ms: u64,
}

impl SpeedingDetector {
    pub fn new(config: &CivilianConfig) -> Self {
        Self {
            limit_kmh: config.speeding_limit_kmh as f64,
            duration_ms: config.speeding_bonus_duration_ms,
            cooldown_ms: config.speeding_cooldown_ms,
        }
    }

    /// A missing speed reading counts as "not speeding".
    pub fn observe(
        &self,
        state: &mut RuntimeState,
        role: Role,
        speed_kmh: Option<f64>,
        now: TimestampMs,
    ) -> Option<Detection> {
        if role != Role::Target {
            return None;
        }
        let speed = speed_kmh?;
        if speed <= self.limit_kmh || cooldown_active(state.speeding_cooldown_until, now) {
            return None;
        }

        state
            .speeding_episode
            .get_or_insert_with(|| EpisodeClock::started(now));
        state.speeding_cooldown_until = Some(now.saturating_add(self.cooldown_ms));
        Some(Detection {
            origin: EpisodeOrigin::Speeding,
            duration_ms: self.duration_ms,
        })
    }
}

// ---------------------------------------------------------------------------
// Zigzag
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ZigzagDetector {
    min_speed_kmh: f64,
    /// Heading deltas below this (radians) are treated as noise.
    min_angle_rad: f64,
    min_turns: u32,
    duration_ms: u64,
    cooldown_ms: u64,
}

impl ZigzagDetector {
    pub fn new(config: &CivilianConfig) -> Self {
        Self {
            min_speed_kmh: config.min_speed_kmh_for_zigzag as f64,
            min_angle_rad: (config.zigzag_min_angle_deg as f64).to_radians(),
            min_turns: u32::try_from(config.zigzag_min_turns.max(1)).unwrap_or(u32::MAX),
            duration_ms: config.zigzag_bonus_duration_ms,
            cooldown_ms: config.zigzag_cooldown_ms,
        }
    }

    pub fn observe(
        &self,
        state: &mut RuntimeState,
        role: Role,
        sample: Option<&TelemetrySample>,
        now: TimestampMs,
    ) -> Option<Detection> {
        if role != Role::Target {
            return None;
        }
        let sample = sample?;
        if sample.horizontal_speed_kmh() < self.min_speed_kmh {
            state.zigzag_turn_state = None;
            return None;
        }
        if cooldown_active(state.zigzag_cooldown_until, now) {
            return None;
        }

        let heading = velocity_heading(&sample.velocity);
        let Some(turns) = state.zigzag_turn_state.as_mut() else {
            state.zigzag_turn_state = Some(ZigzagTurnState::new(heading));
            return None;
        };

        let delta = normalize_delta(heading - turns.last_heading);
        if delta.abs() < self.min_angle_rad {
            return None;
        }
        turns.last_heading = heading;
        let direction = TurnDirection::of(delta)?;

        if turns.last_turn != Some(direction) {
            turns.consecutive_alternations += 1;
        } else {
            turns.consecutive_alternations = 1;
        }
        turns.last_turn = Some(direction);

        if turns.consecutive_alternations < self.min_turns {
            return None;
        }

        state.zigzag_turn_state = None;
        state
            .zigzag_episode
            .get_or_insert_with(|| EpisodeClock::started(now));
        state.zigzag_cooldown_until = Some(now.saturating_add(self.cooldown_ms));
        Some(Detection {
            origin: EpisodeOrigin::Zigzag,
            duration_ms: self.duration_ms,
        })
    }
}
