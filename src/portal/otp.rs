//! In-memory OTP store and its per-email state machine.
//!
//! ```text
//! (none) --issue--> Issued --verify ok--> Verified --claim--> Claimed --consume--> (none)
//!                     |                     ^                   |
//!                     | expiry / re-issue   +------release------+
//! ```
//!
//! Entries are never persisted; a restart drops every pending code. All
//! transitions for one email happen under the store lock, and a claim carries the
//! session id of the entry it claimed so a concurrent re-issue is never deleted
//! by a finishing download.

use chrono::{DateTime, Duration, Utc};
use rand::{Rng, rngs::OsRng};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;
use ulid::Ulid;

use super::clock::Clock;
use super::error::{AccessError, OtpError};
use super::identity::{RollNumber, normalize_email};

pub const DEFAULT_OTP_TTL_SECONDS: i64 = 10 * 60;
pub const DEMO_OTP_CODE: &str = "123456";
const OTP_SPACE: u32 = 1_000_000;

#[derive(Clone, Debug)]
pub struct OtpConfig {
    ttl_seconds: i64,
    demo_email: Option<String>,
}

impl OtpConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ttl_seconds: DEFAULT_OTP_TTL_SECONDS,
            demo_email: None,
        }
    }

    #[must_use]
    pub fn with_ttl_seconds(mut self, seconds: i64) -> Self {
        self.ttl_seconds = seconds.max(1);
        self
    }

    /// Designate an account that always receives [`DEMO_OTP_CODE`].
    #[must_use]
    pub fn with_demo_email(mut self, email: Option<String>) -> Self {
        self.demo_email = email
            .map(|email| normalize_email(&email))
            .filter(|email| !email.is_empty());
        self
    }

    #[must_use]
    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }

    #[must_use]
    pub fn demo_email(&self) -> Option<&str> {
        self.demo_email.as_deref()
    }

    #[must_use]
    pub fn is_demo(&self, email: &str) -> bool {
        self.demo_email
            .as_deref()
            .is_some_and(|demo| demo == normalize_email(email))
    }

    fn ttl(&self) -> Duration {
        Duration::seconds(self.ttl_seconds)
    }
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpPhase {
    /// Code sent, not yet verified.
    Issued,
    /// Code verified; previews allowed, one download pending.
    Verified,
    /// A download is resolving the certificate.
    Claimed,
}

#[derive(Clone, Debug)]
struct OtpEntry {
    code: String,
    roll_number: RollNumber,
    expires_at: DateTime<Utc>,
    phase: OtpPhase,
    session: Ulid,
}

impl OtpEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

#[derive(Clone, Debug)]
pub struct IssuedOtp {
    pub code: String,
    pub roll_number: RollNumber,
    pub expires_at: DateTime<Utc>,
}

/// Exclusive right to finish one download for a verified session.
#[derive(Debug)]
pub struct Claim {
    email: String,
    roll_number: RollNumber,
    session: Ulid,
}

impl Claim {
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    #[must_use]
    pub fn roll_number(&self) -> &RollNumber {
        &self.roll_number
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct OtpSnapshot {
    pub email: String,
    pub phase: OtpPhase,
    pub expires_at: DateTime<Utc>,
}

pub struct OtpManager {
    entries: Mutex<HashMap<String, OtpEntry>>,
    clock: Arc<dyn Clock>,
    config: OtpConfig,
}

impl OtpManager {
    #[must_use]
    pub fn new(config: OtpConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &OtpConfig {
        &self.config
    }

    /// Issue a fresh code for `email`, replacing any previous entry.
    pub async fn issue(&self, email: &str, roll_number: RollNumber) -> IssuedOtp {
        let email = normalize_email(email);
        let code = if self.config.is_demo(&email) {
            DEMO_OTP_CODE.to_string()
        } else {
            generate_code()
        };
        let expires_at = self.clock.now() + self.config.ttl();

        let entry = OtpEntry {
            code: code.clone(),
            roll_number: roll_number.clone(),
            expires_at,
            phase: OtpPhase::Issued,
            session: Ulid::new(),
        };

        let replaced = self.entries.lock().await.insert(email, entry).is_some();
        if replaced {
            debug!("replaced previous OTP entry");
        }

        IssuedOtp {
            code,
            roll_number,
            expires_at,
        }
    }

    /// Check a submitted code. The expiry set at issue is never extended.
    ///
    /// # Errors
    /// `NotFound` without an entry, `Expired` (entry removed) past expiry, and
    /// `InvalidCode` on mismatch (entry kept so the student can retry).
    pub async fn verify(&self, email: &str, submitted: &str) -> Result<RollNumber, OtpError> {
        let email = normalize_email(email);
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;

        let Some(entry) = entries.get_mut(&email) else {
            return Err(OtpError::NotFound);
        };

        if entry.is_expired(now) {
            entries.remove(&email);
            return Err(OtpError::Expired);
        }

        if entry.code != submitted.trim() {
            return Err(OtpError::InvalidCode);
        }

        match entry.phase {
            OtpPhase::Issued | OtpPhase::Verified => entry.phase = OtpPhase::Verified,
            OtpPhase::Claimed => {}
        }

        Ok(entry.roll_number.clone())
    }

    /// Check that `email` holds a verified session bound to `requested`.
    ///
    /// # Errors
    /// `Unauthenticated` unless a live verified entry exists, `Mismatch` if it is
    /// bound to another roll number.
    pub async fn authorize(&self, email: &str, requested: &RollNumber) -> Result<(), AccessError> {
        let email = normalize_email(email);
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;

        let entry = live_verified_entry(&mut entries, &email, now)?;
        if &entry.roll_number != requested {
            return Err(AccessError::Mismatch);
        }

        Ok(())
    }

    /// Move a verified entry into `Claimed` so no other download can use it.
    ///
    /// # Errors
    /// Same as [`Self::authorize`]; an entry that is already claimed counts as
    /// unauthenticated.
    pub async fn claim(&self, email: &str, requested: &RollNumber) -> Result<Claim, AccessError> {
        let email = normalize_email(email);
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;

        let entry = live_verified_entry(&mut entries, &email, now)?;
        if &entry.roll_number != requested {
            return Err(AccessError::Mismatch);
        }
        if entry.phase == OtpPhase::Claimed {
            return Err(AccessError::Unauthenticated);
        }

        entry.phase = OtpPhase::Claimed;

        Ok(Claim {
            email,
            roll_number: entry.roll_number.clone(),
            session: entry.session,
        })
    }

    /// Return a claim without consuming it (the download did not happen).
    pub async fn release(&self, claim: Claim) {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(&claim.email)
            && entry.session == claim.session
            && entry.phase == OtpPhase::Claimed
        {
            entry.phase = OtpPhase::Verified;
        }
    }

    /// Delete the claimed entry. Returns `false` if it was replaced meanwhile.
    pub async fn consume(&self, claim: Claim) -> bool {
        let mut entries = self.entries.lock().await;
        let same_session = entries
            .get(&claim.email)
            .is_some_and(|entry| entry.session == claim.session);
        if same_session {
            entries.remove(&claim.email);
        }
        same_session
    }

    pub async fn snapshot(&self) -> Vec<OtpSnapshot> {
        let entries = self.entries.lock().await;
        let mut snapshot: Vec<OtpSnapshot> = entries
            .iter()
            .map(|(email, entry)| OtpSnapshot {
                email: email.clone(),
                phase: entry.phase,
                expires_at: entry.expires_at,
            })
            .collect();
        snapshot.sort_by(|a, b| a.email.cmp(&b.email));
        snapshot
    }
}

fn live_verified_entry<'a>(
    entries: &'a mut HashMap<String, OtpEntry>,
    email: &str,
    now: DateTime<Utc>,
) -> Result<&'a mut OtpEntry, AccessError> {
    let expired = match entries.get(email) {
        None => return Err(AccessError::Unauthenticated),
        Some(entry) => entry.is_expired(now),
    };
    if expired {
        entries.remove(email);
        return Err(AccessError::Unauthenticated);
    }

    match entries.get_mut(email) {
        Some(entry) if entry.phase != OtpPhase::Issued => Ok(entry),
        _ => Err(AccessError::Unauthenticated),
    }
}

fn generate_code() -> String {
    format!("{:06}", OsRng.gen_range(0..OTP_SPACE))
}
