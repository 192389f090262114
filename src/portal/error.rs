//! Domain error taxonomy shared by the OTP manager, locator and access gate.

use thiserror::Error;

/// Verification failures returned by [`crate::portal::otp::OtpManager::verify`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum OtpError {
    #[error("no OTP found for this email")]
    NotFound,
    #[error("OTP has expired")]
    Expired,
    #[error("invalid OTP")]
    InvalidCode,
}

/// Reasons the access gate refuses a preview or download.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AccessError {
    #[error("OTP verification required")]
    Unauthenticated,
    #[error("requested roll number does not match the verified session")]
    Mismatch,
    #[error("certificate file not found")]
    NotFound,
}

/// Object store failures. `Unavailable` triggers the local fallback.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object store unavailable: {0}")]
    Unavailable(String),
    #[error("object store request could not be signed: {0}")]
    Signing(String),
}
