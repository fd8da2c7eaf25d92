//! Per-second accrual for pursuers and wanted targets.
//!
//! Payments are computed from whole elapsed seconds since an anchor. An
//! anchor only moves when something is paid, so seconds spent with nobody
//! nearby are carried to the next tick that has company.

use contracts::{TimestampMs, MS_PER_SECOND};

use crate::runtime::RuntimeState;

pub fn whole_seconds_since(anchor: TimestampMs, now: TimestampMs) -> u64 {
    now.saturating_sub(anchor) / MS_PER_SECOND
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetRates {
    pub speeding_per_second: u64,
    pub zigzag_per_second: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccrualPayment {
    pub amount: u64,
    pub seconds: u64,
}

/// Pursuer side. The anchor is created one second in the past on first use.
pub fn accrue_pursuer(
    state: &mut RuntimeState,
    rate_per_second: u64,
    nearby_targets: u64,
    now: TimestampMs,
) -> Option<AccrualPayment> {
    let anchor = *state
        .last_pursuer_payment_at
        .get_or_insert_with(|| now.saturating_sub(MS_PER_SECOND));
    let seconds = whole_seconds_since(anchor, now);
    if seconds == 0 || nearby_targets == 0 {
        return None;
    }
    let amount = seconds
        .saturating_mul(rate_per_second)
        .saturating_mul(nearby_targets);
    state.last_pursuer_payment_at = Some(now);
    Some(AccrualPayment { amount, seconds })
}

/// Wanted-target side. Elapsed seconds come from one anchor, the speeding
/// clock when open and the zigzag clock otherwise; every open episode pays
/// those seconds at its own rate, prorated by the number of proximate
/// pursuers. All open clocks advance together.
pub fn accrue_target(
    state: &mut RuntimeState,
    rates: TargetRates,
    proximate_pursuers: u64,
    now: TimestampMs,
) -> Option<AccrualPayment> {
    let anchor = state
        .speeding_episode
        .or(state.zigzag_episode)
        .map(|clock| clock.last_paid_at)?;
    let seconds = whole_seconds_since(anchor, now);
    if seconds == 0 || proximate_pursuers == 0 {
        return None;
    }

    let mut amount = 0u64;
    for (clock, rate) in [
        (state.speeding_episode.as_mut(), rates.speeding_per_second),
        (state.zigzag_episode.as_mut(), rates.zigzag_per_second),
    ] {
        let Some(clock) = clock else {
            continue;
        };
        amount = amount.saturating_add(
            seconds
                .saturating_mul(rate)
                .saturating_mul(proximate_pursuers),
        );
        clock.last_paid_at = now;
    }

    Some(AccrualPayment { amount, seconds })
}
