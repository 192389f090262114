//! # certportal (Certificate Download Portal)
//!
//! `certportal` hands out PDF certificates to students who prove control of
//! their institutional email address with a one-time passcode (OTP).
//!
//! ## Flow
//!
//! 1. The student submits `name.<roll number>@<institution domain>`. The roll
//!    number is extracted and must have a certificate record marked available.
//! 2. A 6-digit OTP bound to that roll number is issued and emailed. Codes live
//!    in process memory only and expire after 10 minutes.
//! 3. Verifying the code moves the entry into the `Verified` phase. Previews may
//!    be repeated while verified; a completed download consumes the entry.
//!
//! ## Certificate lookup
//!
//! Certificates are looked up through an ordered chain of resolvers: the
//! S3-compatible object store (upper-case key, then lower-case key) and then a
//! local directory scan. The first resolver that finds the file wins.
//!
//! ## Bookkeeping
//!
//! Every preview and download is appended to `download_logs`; downloads also
//! bump the per-certificate counter in the same transaction.

pub mod api;
pub mod cli;
pub mod portal;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
