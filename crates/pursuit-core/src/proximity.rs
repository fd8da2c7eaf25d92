//! Pursuer/target spatial join and the capture dwell state machine.

use std::collections::BTreeMap;

use contracts::{ParticipantId, PoliceConfig, TimestampMs, Vec3};
use rayon::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProximitySettings {
    pub proximity_radius_m: f64,
    pub capture_radius_m: f64,
}

impl ProximitySettings {
    pub fn from_config(config: &PoliceConfig) -> Self {
        Self {
            proximity_radius_m: config.police_proximity_range_m as f64,
            capture_radius_m: config.busted_range_m as f64,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetProximity {
    pub proximate_pursuers: u64,
    pub closest_distance_m: Option<f64>,
    /// Pursuers inside the capture radius, in id order.
    pub capturing_pursuers: Vec<ParticipantId>,
}

impl TargetProximity {
    pub fn closest_within(&self, radius_m: f64) -> bool {
        self.closest_distance_m
            .is_some_and(|distance| distance <= radius_m)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProximityReport {
    pub targets: BTreeMap<ParticipantId, TargetProximity>,
    /// Distinct wanted targets within proximity of each pursuer. Pursuers
    /// with nothing nearby are absent.
    pub pursuer_counts: BTreeMap<ParticipantId, u64>,
}

impl ProximityReport {
    pub fn proximate_pursuers(&self, target: &ParticipantId) -> u64 {
        self.targets
            .get(target)
            .map(|entry| entry.proximate_pursuers)
            .unwrap_or(0)
    }

    pub fn targets_near(&self, pursuer: &ParticipantId) -> u64 {
        self.pursuer_counts.get(pursuer).copied().unwrap_or(0)
    }
}

/// Joins every wanted target against every pursuer. With a pool the targets
/// are scanned in parallel; the merged report is identical either way.
pub fn resolve(
    targets: &[(ParticipantId, Vec3)],
    pursuers: &[(ParticipantId, Vec3)],
    settings: ProximitySettings,
    pool: Option<&rayon::ThreadPool>,
) -> ProximityReport {
    let scan = |(target_id, target_pos): &(ParticipantId, Vec3)| {
        scan_target(target_id, target_pos, pursuers, settings)
    };

    let mut rows = match pool {
        Some(pool) if targets.len() > 1 => {
            pool.install(|| targets.par_iter().map(scan).collect::<Vec<_>>())
        }
        _ => targets.iter().map(scan).collect::<Vec<_>>(),
    };
    rows.sort_by(|a, b| a.0.cmp(&b.0));

    let mut report = ProximityReport::default();
    for (target_id, entry, nearby) in rows {
        for pursuer_id in nearby {
            *report.pursuer_counts.entry(pursuer_id).or_insert(0) += 1;
        }
        report.targets.insert(target_id, entry);
    }
    report
}

fn scan_target(
    target_id: &ParticipantId,
    target_pos: &Vec3,
    pursuers: &[(ParticipantId, Vec3)],
    settings: ProximitySettings,
) -> (ParticipantId, TargetProximity, Vec<ParticipantId>) {
    let mut entry = TargetProximity::default();
    let mut nearby = Vec::new();
    for (pursuer_id, pursuer_pos) in pursuers {
        let distance = target_pos.distance(pursuer_pos);
        if !distance.is_finite() {
            continue;
        }
        if distance <= settings.proximity_radius_m {
            entry.proximate_pursuers += 1;
            nearby.push(pursuer_id.clone());
        }
        if distance <= settings.capture_radius_m {
            entry.capturing_pursuers.push(pursuer_id.clone());
        }
        entry.closest_distance_m = Some(match entry.closest_distance_m {
            Some(best) => best.min(distance),
            None => distance,
        });
    }
    entry.capturing_pursuers.sort();
    (target_id.clone(), entry, nearby)
}

// ---------------------------------------------------------------------------
// Capture dwell
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DwellOutcome {
    /// Condition broken; any running dwell was discarded.
    Reset,
    Started,
    Holding { elapsed_ms: u64 },
    Capture,
}

/// Advances one target's dwell. `holds` is "slow enough and a pursuer inside
/// the capture radius" for this tick. An interruption discards the dwell.
pub fn advance_dwell(
    started_at: &mut Option<TimestampMs>,
    holds: bool,
    now: TimestampMs,
    dwell_ms: u64,
) -> DwellOutcome {
    if !holds {
        *started_at = None;
        return DwellOutcome::Reset;
    }
    match *started_at {
        None => {
            *started_at = Some(now);
            DwellOutcome::Started
        }
        Some(since) => {
            let elapsed_ms = now.saturating_sub(since);
            if elapsed_ms >= dwell_ms {
                DwellOutcome::Capture
            } else {
                DwellOutcome::Holding { elapsed_ms }
            }
        }
    }
}
