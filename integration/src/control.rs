//! Outbound control messages sent to the upstream broker socket (§6.1):
//! `{"a":"subscribe"|"unsubscribe"|"mode","v":[...]}`.

use serde::{Deserialize, Serialize};

use crate::wire::PacketKind;

/// Upstream-facing data tier, distinct from `tickgate_markets::SubscriptionMode`
/// only in that it serializes to the broker's wire spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireMode {
    Ltp,
    Quote,
    Full,
}

impl From<PacketKind> for WireMode {
    fn from(kind: PacketKind) -> Self {
        match kind {
            PacketKind::Ltp => WireMode::Ltp,
            PacketKind::Quote => WireMode::Quote,
            PacketKind::Full => WireMode::Full,
        }
    }
}

/// The value carried by `v` varies with the action: a bare token array for
/// subscribe/unsubscribe, or `[mode, [tokens...]]` for a mode change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ControlValue {
    Tokens(Vec<u32>),
    ModeChange(WireMode, Vec<u32>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamControl {
    #[serde(rename = "a")]
    pub action: ControlAction,
    #[serde(rename = "v")]
    pub value: ControlValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    Subscribe,
    Unsubscribe,
    Mode,
}

impl UpstreamControl {
    pub fn subscribe(tokens: Vec<u32>) -> Self {
        Self {
            action: ControlAction::Subscribe,
            value: ControlValue::Tokens(tokens),
        }
    }

    pub fn unsubscribe(tokens: Vec<u32>) -> Self {
        Self {
            action: ControlAction::Unsubscribe,
            value: ControlValue::Tokens(tokens),
        }
    }

    pub fn mode(mode: WireMode, tokens: Vec<u32>) -> Self {
        Self {
            action: ControlAction::Mode,
            value: ControlValue::ModeChange(mode, tokens),
        }
    }

    pub fn to_json(&self) -> Result<String, crate::error::IntegrationError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_serializes_to_bare_token_array() {
        let control = UpstreamControl::subscribe(vec![1, 2, 3]);
        let json = control.to_json().unwrap();
        assert_eq!(json, r#"{"a":"subscribe","v":[1,2,3]}"#);
    }

    #[test]
    fn mode_serializes_to_tuple_form() {
        let control = UpstreamControl::mode(WireMode::Full, vec![256265]);
        let json = control.to_json().unwrap();
        assert_eq!(json, r#"{"a":"mode","v":["full",[256265]]}"#);
    }
}
