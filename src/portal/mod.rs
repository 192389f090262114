//! Certificate portal domain: identity rules, one-time passcodes, certificate
//! lookup, and the access gate that ties them together.

pub mod clock;
pub mod error;
pub mod gate;
pub mod identity;
pub mod locator;
pub mod otp;
pub mod registry;
pub mod s3;

#[cfg(test)]
pub(crate) mod testing;

pub use clock::{Clock, SystemClock};
pub use error::{AccessError, OtpError, StoreError};
pub use gate::{AccessGate, Authorization};
pub use identity::{IdentityValidator, RollNumber};
pub use locator::{AccessPurpose, CertificateHandle, KeyLayout, LinkTtl, ObjectLocator};
pub use otp::{OtpConfig, OtpManager};
pub use registry::{CertificateRecord, CertificateRegistry, PgRegistry};
pub use s3::{ObjectEntry, ObjectStore, S3Client, S3Config};
