//! Action intents: requests a UI wants a signing layer to execute.
//!
//! The projector never validates or executes them; the resulting on-chain
//! events are what change the state.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One user action, tagged by `"action"`:
///
/// ```json
/// {"action":"createFlow","token":"0x…","receiver":"0x…","flowRate":"385802469135"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ActionIntent {
    #[serde(rename_all = "camelCase")]
    CreateFlow {
        token: String,
        receiver: String,
        flow_rate: String,
    },
    #[serde(rename_all = "camelCase")]
    UpdateFlow {
        token: String,
        receiver: String,
        flow_rate: String,
    },
    DeleteFlow {
        token: String,
        sender: String,
        receiver: String,
    },
    #[serde(rename_all = "camelCase")]
    Deposit {
        token: String,
        amount: String,
        /// Deposit from an external wallet rather than the agent.
        is_external: bool,
    },
    Withdraw {
        token: String,
        receiver: String,
        amount: String,
    },
    /// Wrap underlying tokens into the super token.
    Upgrade { token: String, amount: String },
    /// Unwrap super tokens into the underlying token.
    Downgrade { token: String, amount: String },
    SetAgent { address: String },
}

/// Returned by `POST /intents`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentReceipt {
    pub id: Uuid,
}

/// An accepted intent as broadcast on `GET /intents/ws`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentEnvelope {
    pub id: Uuid,
    pub received_at: u64,
    pub intent: ActionIntent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_wire_format() {
        let intent = ActionIntent::Deposit {
            token: "0x01".into(),
            amount: "1000".into(),
            is_external: true,
        };
        let json = serde_json::to_value(&intent).unwrap_or_default();
        assert_eq!(
            json,
            serde_json::json!({
                "action": "deposit",
                "token": "0x01",
                "amount": "1000",
                "isExternal": true,
            })
        );

        let parsed: Result<ActionIntent, _> = serde_json::from_str(
            r#"{"action":"createFlow","token":"0x01","receiver":"0x02","flowRate":"5"}"#,
        );
        assert!(matches!(
            parsed,
            Ok(ActionIntent::CreateFlow { ref flow_rate, .. }) if flow_rate == "5"
        ));
    }
}
