//! In-memory fakes shared by unit tests.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::{
    collections::BTreeMap,
    sync::{
        Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use super::clock::Clock;
use super::error::StoreError;
use super::identity::RollNumber;
use super::locator::AccessPurpose;
use super::registry::{CertificateRecord, CertificateRegistry, DownloadLogEntry};
use super::s3::{ObjectEntry, ObjectStore, StoreDescription};
use crate::api::email::{EmailMessage, EmailSender};

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.lock().expect("clock lock");
        *now += delta;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::at(
            Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0)
                .single()
                .expect("fixed timestamp"),
        )
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock lock")
    }
}

pub const MEMORY_OBJECT_MODIFIED: &str = "2025-05-30T09:15:02.000Z";

/// Object store holding a fixed set of keys and their sizes.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: BTreeMap<String, u64>,
    unavailable: bool,
}

impl MemoryObjectStore {
    pub fn with_keys<'a>(keys: impl IntoIterator<Item = &'a str>) -> Self {
        Self::with_objects(keys.into_iter().map(|key| (key, 1024)))
    }

    pub fn with_objects<'a>(objects: impl IntoIterator<Item = (&'a str, u64)>) -> Self {
        Self {
            objects: objects
                .into_iter()
                .map(|(key, size)| (key.to_string(), size))
                .collect(),
            unavailable: false,
        }
    }

    /// Every call fails as if the endpoint were down.
    pub fn unavailable() -> Self {
        Self {
            objects: BTreeMap::new(),
            unavailable: true,
        }
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.unavailable {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn head(&self, key: &str) -> Result<bool, StoreError> {
        self.check_online()?;
        Ok(self.objects.contains_key(key))
    }

    fn presign(&self, key: &str, ttl: std::time::Duration) -> Result<String, StoreError> {
        Ok(format!("memory://certificates/{key}?ttl={}", ttl.as_secs()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_online()
    }

    async fn list(&self, prefix: &str, max_keys: usize) -> Result<Vec<ObjectEntry>, StoreError> {
        self.check_online()?;
        Ok(self
            .objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .take(max_keys)
            .map(|(key, size)| ObjectEntry {
                key: key.clone(),
                size: *size,
                last_modified: MEMORY_OBJECT_MODIFIED.to_string(),
            })
            .collect())
    }

    fn describe(&self) -> StoreDescription {
        StoreDescription {
            endpoint: "memory://".to_string(),
            bucket: "certificates".to_string(),
        }
    }
}

/// Registry kept in process memory; `fail_writes` makes bookkeeping fail.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    records: Mutex<BTreeMap<String, CertificateRecord>>,
    logs: Mutex<Vec<DownloadLogEntry>>,
    fail_writes: AtomicBool,
    offline: AtomicBool,
}

impl MemoryRegistry {
    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    pub fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    pub fn logs(&self) -> Vec<DownloadLogEntry> {
        self.logs.lock().expect("logs lock").clone()
    }

    pub fn download_count(&self, roll_number: &RollNumber) -> i64 {
        self.records
            .lock()
            .expect("records lock")
            .get(roll_number.as_str())
            .map_or(0, |record| record.download_count)
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("registry writes disabled"));
        }
        Ok(())
    }
}

#[async_trait]
impl CertificateRegistry for MemoryRegistry {
    async fn get_certificate_record(
        &self,
        roll_number: &RollNumber,
    ) -> Result<Option<CertificateRecord>> {
        Ok(self
            .records
            .lock()
            .expect("records lock")
            .get(roll_number.as_str())
            .cloned())
    }

    async fn upsert_certificate(
        &self,
        roll_number: &RollNumber,
        has_certificate: bool,
    ) -> Result<()> {
        self.check_writable()?;
        let mut records = self.records.lock().expect("records lock");
        records
            .entry(roll_number.as_str().to_string())
            .and_modify(|record| record.has_certificate = has_certificate)
            .or_insert_with(|| CertificateRecord {
                roll_number: roll_number.clone(),
                has_certificate,
                download_count: 0,
                last_downloaded: None,
                created_at: Utc::now(),
            });
        Ok(())
    }

    async fn append_download_log(
        &self,
        roll_number: &RollNumber,
        email: &str,
        purpose: AccessPurpose,
    ) -> Result<()> {
        self.check_writable()?;
        self.logs.lock().expect("logs lock").push(DownloadLogEntry {
            roll_number: roll_number.clone(),
            email: email.to_string(),
            purpose,
            downloaded_at: Utc::now(),
        });
        Ok(())
    }

    async fn increment_download_count(&self, roll_number: &RollNumber) -> Result<()> {
        self.check_writable()?;
        if let Some(record) = self
            .records
            .lock()
            .expect("records lock")
            .get_mut(roll_number.as_str())
        {
            record.download_count += 1;
            record.last_downloaded = Some(Utc::now());
        }
        Ok(())
    }

    async fn list_certificates(&self) -> Result<Vec<CertificateRecord>> {
        Ok(self
            .records
            .lock()
            .expect("records lock")
            .values()
            .cloned()
            .collect())
    }

    async fn remove_certificate(&self, roll_number: &RollNumber) -> Result<bool> {
        self.check_writable()?;
        Ok(self
            .records
            .lock()
            .expect("records lock")
            .remove(roll_number.as_str())
            .is_some())
    }

    async fn ping(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(anyhow!("registry offline"));
        }
        Ok(())
    }
}

/// Captures messages instead of delivering them.
#[derive(Debug, Default)]
pub struct RecordingEmailSender {
    sent: Mutex<Vec<EmailMessage>>,
}

impl RecordingEmailSender {
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().expect("sent lock").clone()
    }
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, message: &EmailMessage) -> Result<()> {
        self.sent.lock().expect("sent lock").push(message.clone());
        Ok(())
    }
}

/// Rejects every message.
#[derive(Debug, Default)]
pub struct FailingEmailSender;

#[async_trait]
impl EmailSender for FailingEmailSender {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn send(&self, _message: &EmailMessage) -> Result<()> {
        Err(anyhow!("relay rejected message"))
    }
}
