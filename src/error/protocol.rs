// Protocol error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Protocol error code constants
///
/// Error code range: 2001-2005
pub struct ProtocolErrorCodes {}

impl ProtocolErrorCodes {
    /// Recipient context is gone or its inbox is closed
    pub const RECIPIENT_UNAVAILABLE: i32 = 2001;

    /// Settings store read failed
    pub const STORE_READ: i32 = 2002;

    /// Settings store write failed
    pub const STORE_WRITE: i32 = 2003;

    /// Message could not be decoded
    pub const DECODE: i32 = 2004;

    /// Context acted before receiving the coordinator's state
    pub const NOT_SYNCED: i32 = 2005;
}

/// Log a protocol error with structured context
pub fn log_protocol_error(err: &ProtocolError, context: &str) {
    error!(
        "Protocol error in {}: code={}, component=Coordination, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Cross-context coordination errors
///
/// None of these are fatal: fan-out reports them per recipient and the
/// coordinator keeps serving the remaining contexts.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolError {
    RecipientUnavailable { recipient: String },
    StoreRead { reason: String },
    StoreWrite { reason: String },
    Decode { reason: String },
    NotSynced,
}

impl ErrorCode for ProtocolError {
    fn code(&self) -> i32 {
        match self {
            ProtocolError::RecipientUnavailable { .. } => ProtocolErrorCodes::RECIPIENT_UNAVAILABLE,
            ProtocolError::StoreRead { .. } => ProtocolErrorCodes::STORE_READ,
            ProtocolError::StoreWrite { .. } => ProtocolErrorCodes::STORE_WRITE,
            ProtocolError::Decode { .. } => ProtocolErrorCodes::DECODE,
            ProtocolError::NotSynced => ProtocolErrorCodes::NOT_SYNCED,
        }
    }

    fn message(&self) -> String {
        match self {
            ProtocolError::RecipientUnavailable { recipient } => {
                format!("Recipient {} is unavailable", recipient)
            }
            ProtocolError::StoreRead { reason } => format!("Settings read failed: {}", reason),
            ProtocolError::StoreWrite { reason } => format!("Settings write failed: {}", reason),
            ProtocolError::Decode { reason } => format!("Message decode failed: {}", reason),
            ProtocolError::NotSynced => {
                "Context has not received coordinator state yet".to_string()
            }
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ProtocolError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for ProtocolError {}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        ProtocolError::Decode {
            reason: err.to_string(),
        }
    }
}
