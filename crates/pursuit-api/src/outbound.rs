//! Delivery of the engine outbox to the host.

use contracts::{Outbound, UiEvent};
use tracing::warn;

use crate::host::HostRuntime;

/// JSON encoding of a presentation payload, falling back to the bare number
/// when structured encoding fails.
pub fn encode_ui_payload(event: &UiEvent) -> String {
    match serde_json::to_string(event) {
        Ok(encoded) => encoded,
        Err(err) => {
            warn!(event = event.event_name(), error = %err, "ui payload encoding failed, sending numeric value");
            event.numeric_value().to_string()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Best-effort delivery; a failed message is logged and dropped.
pub fn deliver(host: &mut impl HostRuntime, messages: Vec<Outbound>) -> DeliveryReport {
    let mut report = DeliveryReport::default();
    for message in messages {
        let result = match &message {
            Outbound::Notice { to, locale, notice } => host.send_notice(to, locale, notice),
            Outbound::Broadcast { notice } => host.broadcast_notice(notice),
            Outbound::Ui { to, event } => {
                let payload = encode_ui_payload(event);
                host.send_ui_event(to, event.event_name(), &payload)
            }
        };
        match result {
            Ok(()) => report.delivered += 1,
            Err(err) => {
                warn!(
                    recipient = message.recipient().map(|id| id.as_str()).unwrap_or("*"),
                    error = %err,
                    "outbound message dropped"
                );
                report.failed += 1;
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ui_payloads_encode_as_single_field_objects() {
        assert_eq!(
            encode_ui_payload(&UiEvent::Wanted { seconds: 42 }),
            r#"{"seconds":42}"#
        );
        assert_eq!(
            encode_ui_payload(&UiEvent::Balance { balance: 0 }),
            r#"{"balance":0}"#
        );
    }
}
