//! Downstream wire shapes (§6.2): the tick envelope pushed to every
//! subscriber, and the subscribe/unsubscribe control a client sends back.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `{"type":"tick","token":N,"ts":MICROS,"mode":"LTP|QUOTE|FULL","data":{...}}`
///
/// `data` is left as an untyped `Value` here — this crate only owns the
/// envelope shape, not the canonical `Tick` payload schema (that lives in
/// `tickgate-data`, which serializes its `Tick` into this field).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename = "tick")]
pub struct TickEnvelope {
    pub token: u32,
    pub ts: i64,
    pub mode: String,
    pub data: Value,
}

impl TickEnvelope {
    pub fn new(token: u32, ts_micros: i64, mode: impl Into<String>, data: Value) -> Self {
        Self {
            token,
            ts: ts_micros,
            mode: mode.into(),
            data,
        }
    }

    pub fn to_json(&self) -> Result<String, crate::error::IntegrationError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// `{"action":"subscribe"|"unsubscribe","tokens":[...],"mode":"..."}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientControl {
    pub action: ClientAction,
    pub tokens: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientAction {
    Subscribe,
    Unsubscribe,
}

impl ClientControl {
    pub fn from_json(raw: &str) -> Result<Self, crate::error::IntegrationError> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Error message pushed to a client connection, distinct from the broker
/// protocol's own error surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename = "error")]
pub struct ClientErrorEnvelope {
    pub code: String,
    pub message: String,
}

impl ClientErrorEnvelope {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> Result<String, crate::error::IntegrationError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tick_envelope_round_trips() {
        let env = TickEnvelope::new(256265, 1_700_000_000_000_000, "LTP", json!({"last_price": "100.10"}));
        let raw = env.to_json().unwrap();
        assert!(raw.contains("\"type\":\"tick\""));
        assert!(raw.contains("\"token\":256265"));
    }

    #[test]
    fn client_control_parses_subscribe() {
        let raw = r#"{"action":"subscribe","tokens":[1,2],"mode":"FULL"}"#;
        let control = ClientControl::from_json(raw).unwrap();
        assert_eq!(control.action, ClientAction::Subscribe);
        assert_eq!(control.tokens, vec![1, 2]);
        assert_eq!(control.mode.as_deref(), Some("FULL"));
    }
}
