//! Boundary to the vehicle-simulation host.
//!
//! Every query can fail; the server treats a failure as "no data this tick"
//! for the participant concerned and carries on with everyone else.

use contracts::{Notice, ParticipantId, TelemetrySample, VehicleChange, VehicleDescriptor};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("participant {0} is not connected")]
    NotConnected(ParticipantId),
    #[error("host call {call} failed: {message}")]
    Call { call: &'static str, message: String },
}

pub trait HostRuntime {
    fn connected_participants(&self) -> Result<Vec<ParticipantId>, HostError>;

    fn display_name(&self, id: &ParticipantId) -> Result<String, HostError>;

    fn is_connected(&self, id: &ParticipantId) -> bool;

    /// Latest position/velocity sample; `None` while the participant has no
    /// vehicle.
    fn telemetry(&self, id: &ParticipantId) -> Result<Option<TelemetrySample>, HostError>;

    fn vehicle_descriptor(
        &self,
        id: &ParticipantId,
    ) -> Result<Option<VehicleDescriptor>, HostError>;

    fn send_notice(
        &mut self,
        to: &ParticipantId,
        locale: &str,
        notice: &Notice,
    ) -> Result<(), HostError>;

    fn broadcast_notice(&mut self, notice: &Notice) -> Result<(), HostError>;

    /// Delivers an encoded payload to the participant's presentation layer.
    fn send_ui_event(
        &mut self,
        to: &ParticipantId,
        event_name: &str,
        payload: &str,
    ) -> Result<(), HostError>;
}

/// Inbound notifications from the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HostEvent {
    Connected {
        id: ParticipantId,
        #[serde(default)]
        display_name: Option<String>,
    },
    Disconnected {
        id: ParticipantId,
    },
    Vehicle {
        id: ParticipantId,
        change: VehicleChange,
    },
    /// Raw JSON sent by the participant's presentation layer.
    Ui {
        id: ParticipantId,
        payload: String,
    },
}

impl HostEvent {
    pub fn participant(&self) -> &ParticipantId {
        match self {
            Self::Connected { id, .. }
            | Self::Disconnected { id }
            | Self::Vehicle { id, .. }
            | Self::Ui { id, .. } => id,
        }
    }
}
