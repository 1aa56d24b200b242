// Error types for the ad volume reducer
//
// This module defines typed errors for the detector pipeline and the
// cross-context coordination protocol. Every error carries a numeric code so
// observers and logs can report it without string matching.

mod detector;
mod protocol;

pub use detector::{log_detector_error, DetectorError, DetectorErrorCodes};
pub use protocol::{log_protocol_error, ProtocolError, ProtocolErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent reporting across context
/// boundaries.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
