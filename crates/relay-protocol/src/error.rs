//! Protocol validation errors.

use thiserror::Error;

/// Errors raised while validating inbound API payloads.
///
/// These are rejected at the administrative surface and never reach the hub.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Neither `targetUserId` nor `targetSessionId` was provided
    #[error("Either targetUserId or targetSessionId must be specified")]
    MissingTarget,
}
