//! Outbound notices and presentation-layer payloads.
//!
//! The core never renders text. A `Notice` carries a stable localization key
//! plus typed parameters, and the host translates it for the recipient's
//! locale.

use serde::{Deserialize, Serialize};

use crate::{EpisodeOrigin, FailReason, ParticipantId, Role};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "key", rename_all = "snake_case")]
pub enum Notice {
    Welcome {
        display_name: String,
        balance: u64,
    },
    RoleWelcome {
        role: Role,
    },
    WantedOpened {
        origin: EpisodeOrigin,
        seconds: u64,
    },
    WantedExtended {
        origin: EpisodeOrigin,
        added_seconds: u64,
        seconds: u64,
    },
    WantedEvaded {
        bonus: u64,
    },
    WantedFailed {
        reason: FailReason,
        penalty: u64,
    },
    TargetBusted {
        target_name: String,
    },
    CaptureBonus {
        target_name: String,
        amount: u64,
    },
    MoneyPerMinute {
        amount: u64,
    },
    Tip {
        tip_key: String,
    },
}

impl Notice {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Welcome { .. } => "welcome",
            Self::RoleWelcome { role: Role::Target } => "role_welcome_target",
            Self::RoleWelcome { role: Role::Pursuer } => "role_welcome_pursuer",
            Self::WantedOpened { .. } => "wanted_opened",
            Self::WantedExtended { .. } => "wanted_extended",
            Self::WantedEvaded { .. } => "wanted_evaded",
            Self::WantedFailed { .. } => "wanted_failed",
            Self::TargetBusted { .. } => "target_busted",
            Self::CaptureBonus { .. } => "capture_bonus",
            Self::MoneyPerMinute { .. } => "money_per_minute",
            Self::Tip { .. } => "tip",
        }
    }
}

/// Presentation-facing payloads. Each encodes as a single-field object.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum UiEvent {
    Balance { balance: u64 },
    Wanted { seconds: u64 },
}

impl UiEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Balance { .. } => "balance_update",
            Self::Wanted { .. } => "wanted_update",
        }
    }

    /// The single numeric field, used when structured encoding is unavailable.
    pub fn numeric_value(&self) -> u64 {
        match self {
            Self::Balance { balance } => *balance,
            Self::Wanted { seconds } => *seconds,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundUiEvent {
    SetLanguage { locale: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "channel", rename_all = "snake_case")]
pub enum Outbound {
    Notice {
        to: ParticipantId,
        locale: String,
        notice: Notice,
    },
    Broadcast {
        notice: Notice,
    },
    Ui {
        to: ParticipantId,
        event: UiEvent,
    },
}

impl Outbound {
    pub fn recipient(&self) -> Option<&ParticipantId> {
        match self {
            Self::Notice { to, .. } | Self::Ui { to, .. } => Some(to),
            Self::Broadcast { .. } => None,
        }
    }
}
