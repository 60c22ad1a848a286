//! Maps wire-level [`IntegrationError`] onto the shared
//! [`GatewayError`] taxonomy (§7). Everything else in this crate returns
//! `GatewayError` directly.

use tickgate_core::GatewayError;
use tickgate_integration::IntegrationError;

impl From<IntegrationError> for GatewayError {
    fn from(err: IntegrationError) -> Self {
        match err {
            IntegrationError::FrameTooShort { .. } | IntegrationError::UnknownPacketLength(_) => {
                GatewayError::Protocol(err.to_string())
            }
            IntegrationError::Transport(_) | IntegrationError::ClosedByUpstream { .. } => {
                GatewayError::Transient(err.to_string())
            }
            IntegrationError::AuthRejected(_) => GatewayError::Auth(err.to_string()),
            IntegrationError::Json(_) => GatewayError::Protocol(err.to_string()),
        }
    }
}
