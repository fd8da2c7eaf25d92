//! Per-participant transient state owned by the core.
//!
//! A `RuntimeState` exists exactly while its participant is connected. It is
//! created empty on connect and reset wholesale on forced failure, role
//! change, and disconnect. Balances are not part of it; they live in the
//! account ledger and survive reconnects.

use contracts::{TimestampMs, MS_PER_SECOND};

use crate::geometry::TurnDirection;

/// Accrual bookkeeping of one detector-owned episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpisodeClock {
    pub started_at: TimestampMs,
    pub last_paid_at: TimestampMs,
}

impl EpisodeClock {
    pub fn started(now: TimestampMs) -> Self {
        Self {
            started_at: now,
            last_paid_at: now,
        }
    }
}

/// Sliding steering-reversal counter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZigzagTurnState {
    pub last_heading: f64,
    pub consecutive_alternations: u32,
    pub last_turn: Option<TurnDirection>,
}

impl ZigzagTurnState {
    pub fn new(heading: f64) -> Self {
        Self {
            last_heading: heading,
            consecutive_alternations: 0,
            last_turn: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuntimeState {
    pub wanted_until: Option<TimestampMs>,
    pub last_reported_wanted_seconds: Option<u64>,
    pub speeding_episode: Option<EpisodeClock>,
    pub zigzag_episode: Option<EpisodeClock>,
    pub speeding_cooldown_until: Option<TimestampMs>,
    pub zigzag_cooldown_until: Option<TimestampMs>,
    pub zigzag_turn_state: Option<ZigzagTurnState>,
    pub capture_dwell_started_at: Option<TimestampMs>,
    pub last_pursuer_payment_at: Option<TimestampMs>,
}

impl RuntimeState {
    /// An episode is open while its deadline lies strictly in the future.
    pub fn is_wanted(&self, now: TimestampMs) -> bool {
        self.wanted_until.is_some_and(|until| until > now)
    }

    /// Whether a deadline is recorded but has already passed.
    pub fn is_expiring(&self, now: TimestampMs) -> bool {
        self.wanted_until.is_some_and(|until| until <= now)
    }

    /// Remaining wanted time rounded up to whole seconds; zero when idle.
    pub fn remaining_wanted_seconds(&self, now: TimestampMs) -> u64 {
        match self.wanted_until {
            Some(until) if until > now => (until - now).div_ceil(MS_PER_SECOND),
            _ => 0,
        }
    }

    pub fn has_open_episode_clock(&self) -> bool {
        self.speeding_episode.is_some() || self.zigzag_episode.is_some()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

pub(crate) fn cooldown_active(cooldown_until: Option<TimestampMs>, now: TimestampMs) -> bool {
    cooldown_until.is_some_and(|until| now < until)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wanted_requires_future_deadline() {
        let mut state = RuntimeState::default();
        assert!(!state.is_wanted(1_000));
        state.wanted_until = Some(5_000);
        assert!(state.is_wanted(4_999));
        assert!(!state.is_wanted(5_000));
        assert!(state.is_expiring(5_000));
    }

    #[test]
    fn remaining_seconds_round_up() {
        let state = RuntimeState {
            wanted_until: Some(10_500),
            ..RuntimeState::default()
        };
        assert_eq!(state.remaining_wanted_seconds(10_000), 1);
        assert_eq!(state.remaining_wanted_seconds(9_500), 1);
        assert_eq!(state.remaining_wanted_seconds(9_499), 2);
        assert_eq!(state.remaining_wanted_seconds(10_500), 0);
    }

    #[test]
    fn reset_clears_every_field() {
        let mut state = RuntimeState {
            wanted_until: Some(9),
            last_reported_wanted_seconds: Some(3),
            speeding_episode: Some(EpisodeClock::started(1)),
            zigzag_episode: Some(EpisodeClock::started(2)),
            speeding_cooldown_until: Some(4),
            zigzag_cooldown_until: Some(5),
            zigzag_turn_state: Some(ZigzagTurnState::new(0.3)),
            capture_dwell_started_at: Some(6),
            last_pursuer_payment_at: Some(7),
        };
        state.reset();
        assert_eq!(state, RuntimeState::default());
    }
}
