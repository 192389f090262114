//! Access gate for certificate previews and downloads.
//!
//! A preview only needs a verified session bound to the requested roll
//! number. A download additionally claims the session, resolves the file,
//! records the access, and then consumes the session so the code cannot be
//! reused.

use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::ToSchema;

use super::error::AccessError;
use super::identity::RollNumber;
use super::locator::{AccessPurpose, CertificateHandle, ObjectLocator};
use super::otp::OtpManager;
use super::registry::CertificateRegistry;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Authorization {
    Ok,
    Unauthenticated,
    Mismatch,
}

impl Authorization {
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl From<Result<(), AccessError>> for Authorization {
    fn from(result: Result<(), AccessError>) -> Self {
        match result {
            Ok(()) => Self::Ok,
            Err(AccessError::Mismatch) => Self::Mismatch,
            Err(AccessError::Unauthenticated | AccessError::NotFound) => Self::Unauthenticated,
        }
    }
}

pub struct AccessGate {
    otp: Arc<OtpManager>,
    locator: Arc<ObjectLocator>,
    registry: Arc<dyn CertificateRegistry>,
}

impl AccessGate {
    #[must_use]
    pub fn new(
        otp: Arc<OtpManager>,
        locator: Arc<ObjectLocator>,
        registry: Arc<dyn CertificateRegistry>,
    ) -> Self {
        Self {
            otp,
            locator,
            registry,
        }
    }

    pub async fn authorize(&self, email: &str, roll_number: &RollNumber) -> Authorization {
        self.otp.authorize(email, roll_number).await.into()
    }

    /// Resolve a short-lived handle for inline viewing. The session is kept.
    ///
    /// # Errors
    /// `Unauthenticated` or `Mismatch` when the session does not allow access,
    /// `NotFound` when no source holds the certificate.
    pub async fn preview(
        &self,
        email: &str,
        roll_number: &RollNumber,
    ) -> Result<CertificateHandle, AccessError> {
        self.otp.authorize(email, roll_number).await?;

        let handle = self
            .locator
            .resolve_preview(roll_number)
            .await
            .ok_or(AccessError::NotFound)?;

        if let Err(err) = self
            .registry
            .append_download_log(roll_number, email, AccessPurpose::Preview)
            .await
        {
            warn!("failed to log preview of {roll_number}: {err:#}");
        }

        Ok(handle)
    }

    /// Resolve the certificate for download and consume the session.
    ///
    /// # Errors
    /// `Unauthenticated` or `Mismatch` when the session does not allow access
    /// (including a download already in flight for it), `NotFound` when no
    /// source holds the certificate. On `NotFound` the session stays usable.
    pub async fn download(
        &self,
        email: &str,
        roll_number: &RollNumber,
    ) -> Result<CertificateHandle, AccessError> {
        let claim = self.otp.claim(email, roll_number).await?;

        let Some(handle) = self.locator.resolve(roll_number).await else {
            self.otp.release(claim).await;
            return Err(AccessError::NotFound);
        };

        if let Err(err) = self
            .registry
            .record_download(claim.roll_number(), claim.email())
            .await
        {
            error!("failed to record download of {roll_number}: {err:#}");
        }

        if !self.otp.consume(claim).await {
            warn!("OTP session for {roll_number} was replaced during download");
        }
        info!("certificate {roll_number} released for download");

        Ok(handle)
    }
}
