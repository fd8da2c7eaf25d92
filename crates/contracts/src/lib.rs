//! Cross-boundary contracts shared by the pursuit core, the host facade, and tooling.

pub mod config;
pub mod messages;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use config::{
    CivilianConfig, ConfigError, ConfigIssue, ConfigIssueKind, FeatureFlags, GeneralConfig,
    MoneyConfig, PoliceConfig, PursuitConfig,
};
pub use messages::{InboundUiEvent, Notice, Outbound, UiEvent};

pub const DEFAULT_LOCALE: &str = "en";
pub const MS_PER_SECOND: u64 = 1_000;

/// Milliseconds on the host's wall clock.
pub type TimestampMs = u64;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Target,
    Pursuer,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Target => "target",
            Self::Pursuer => "pursuer",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "target" | "civilian" => Some(Self::Target),
            "pursuer" | "police" => Some(Self::Pursuer),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance(&self, other: &Vec3) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Magnitude in the horizontal (x/y) plane.
    pub fn horizontal_magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// One position + velocity sample reported by the host. Velocity is in m/s.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TelemetrySample {
    pub position: Vec3,
    pub velocity: Vec3,
}

impl TelemetrySample {
    pub fn horizontal_speed_kmh(&self) -> f64 {
        self.velocity.horizontal_magnitude() * 3.6
    }
}

/// Opaque vehicle configuration as handed over by the host.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct VehicleDescriptor(pub String);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountRecord {
    pub id: ParticipantId,
    pub display_name: String,
    pub balance: u64,
    #[serde(default)]
    pub role: Role,
    #[serde(default = "default_locale")]
    pub locale: String,
}

impl AccountRecord {
    pub fn new(id: ParticipantId, display_name: impl Into<String>, balance: u64) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            balance,
            role: Role::Target,
            locale: default_locale(),
        }
    }
}

fn default_locale() -> String {
    DEFAULT_LOCALE.to_string()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeOrigin {
    Speeding,
    Zigzag,
}

impl EpisodeOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Speeding => "speeding",
            Self::Zigzag => "zigzag",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FailReason {
    VehicleEdited,
    VehicleSwapped,
    VehicleReset,
    VehicleExited,
    VehicleDeleted,
    BecamePursuer,
    Disconnected,
    Captured,
}

impl FailReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::VehicleEdited => "vehicle_edited",
            Self::VehicleSwapped => "vehicle_swapped",
            Self::VehicleReset => "vehicle_reset",
            Self::VehicleExited => "vehicle_exited",
            Self::VehicleDeleted => "vehicle_deleted",
            Self::BecamePursuer => "became_pursuer",
            Self::Disconnected => "disconnected",
            Self::Captured => "captured",
        }
    }
}

/// Vehicle lifecycle notifications forwarded by the host.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VehicleChange {
    Spawned,
    Edited,
    Swapped,
    Reset,
    Exited,
    Deleted,
}

impl VehicleChange {
    /// The reason an open wanted episode is forfeited by this change, if any.
    pub fn fail_reason(self) -> Option<FailReason> {
        match self {
            Self::Spawned => None,
            Self::Edited => Some(FailReason::VehicleEdited),
            Self::Swapped => Some(FailReason::VehicleSwapped),
            Self::Reset => Some(FailReason::VehicleReset),
            Self::Exited => Some(FailReason::VehicleExited),
            Self::Deleted => Some(FailReason::VehicleDeleted),
        }
    }

    /// Whether the livery may have changed and the role should be re-checked.
    pub fn affects_livery(self) -> bool {
        matches!(self, Self::Spawned | Self::Edited | Self::Swapped)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EngineEventKind {
    ParticipantConnected,
    ParticipantDisconnected,
    RoleChanged,
    WantedOpened,
    WantedExtended,
    WantedEvaded,
    WantedFailed,
    Captured,
    CaptureBonusPaid,
    TargetAccrualPaid,
    PursuerAccrualPaid,
    MoneyPerMinutePaid,
}

impl EngineEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ParticipantConnected => "participant_connected",
            Self::ParticipantDisconnected => "participant_disconnected",
            Self::RoleChanged => "role_changed",
            Self::WantedOpened => "wanted_opened",
            Self::WantedExtended => "wanted_extended",
            Self::WantedEvaded => "wanted_evaded",
            Self::WantedFailed => "wanted_failed",
            Self::Captured => "captured",
            Self::CaptureBonusPaid => "capture_bonus_paid",
            Self::TargetAccrualPaid => "target_accrual_paid",
            Self::PursuerAccrualPaid => "pursuer_accrual_paid",
            Self::MoneyPerMinutePaid => "money_per_minute_paid",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineEvent {
    pub sequence: u64,
    pub timestamp_ms: TimestampMs,
    pub participant_id: ParticipantId,
    pub kind: EngineEventKind,
    pub details: Option<Value>,
}
