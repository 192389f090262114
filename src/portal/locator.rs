//! Certificate lookup through an ordered chain of resolvers.
//!
//! The default chain is the object store (upper-case key, then lower-case key)
//! followed by a scan of a local directory. The first resolver that finds the
//! certificate wins; a resolver that fails is logged and skipped.

use async_trait::async_trait;
use serde::Serialize;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tracing::{debug, warn};

use super::error::StoreError;
use super::identity::RollNumber;
use super::s3::ObjectStore;

pub const DEFAULT_PREVIEW_TTL_SECONDS: u64 = 15 * 60;
pub const DEFAULT_DOWNLOAD_TTL_SECONDS: u64 = 60 * 60;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessPurpose {
    Preview,
    Download,
}

impl AccessPurpose {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Preview => "preview",
            Self::Download => "download",
        }
    }
}

/// A resolved certificate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CertificateHandle {
    /// Presigned URL into the object store.
    Remote { key: String, url: String },
    /// File found by the local directory scan.
    Local { path: PathBuf },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyCase {
    Upper,
    Lower,
}

#[derive(Clone, Debug)]
pub struct KeyLayout {
    prefix: String,
    tenure: String,
}

impl KeyLayout {
    #[must_use]
    pub fn new(prefix: &str, tenure: &str) -> Self {
        Self {
            prefix: prefix.trim_matches('/').to_string(),
            tenure: tenure.trim().to_string(),
        }
    }

    /// Prefix shared by every certificate of the tenure, e.g. `certificates/tenure2024-25/`.
    #[must_use]
    pub fn tenure_prefix(&self) -> String {
        if self.prefix.is_empty() {
            format!("tenure{}/", self.tenure)
        } else {
            format!("{}/tenure{}/", self.prefix, self.tenure)
        }
    }

    #[must_use]
    pub fn key(&self, roll_number: &RollNumber, case: KeyCase) -> String {
        let name = match case {
            KeyCase::Upper => roll_number.to_upper(),
            KeyCase::Lower => roll_number.as_str().to_string(),
        };
        format!("{}{name}.pdf", self.tenure_prefix())
    }
}

impl Default for KeyLayout {
    fn default() -> Self {
        Self::new("certificates", "2024-25")
    }
}

#[derive(Clone, Copy, Debug)]
pub struct LinkTtl {
    preview: Duration,
    download: Duration,
}

impl LinkTtl {
    #[must_use]
    pub fn new(preview_seconds: u64, download_seconds: u64) -> Self {
        Self {
            preview: Duration::from_secs(preview_seconds.max(1)),
            download: Duration::from_secs(download_seconds.max(1)),
        }
    }

    #[must_use]
    pub fn for_purpose(&self, purpose: AccessPurpose) -> Duration {
        match purpose {
            AccessPurpose::Preview => self.preview,
            AccessPurpose::Download => self.download,
        }
    }
}

impl Default for LinkTtl {
    fn default() -> Self {
        Self::new(DEFAULT_PREVIEW_TTL_SECONDS, DEFAULT_DOWNLOAD_TTL_SECONDS)
    }
}

/// One lookup strategy in the chain.
#[async_trait]
pub trait Resolver: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` means the certificate is not there.
    ///
    /// # Errors
    /// Returns an error when the backing source could not be queried.
    async fn resolve(
        &self,
        roll_number: &RollNumber,
        purpose: AccessPurpose,
    ) -> Result<Option<CertificateHandle>, StoreError>;
}

/// Looks up `<prefix>/tenure<period>/<ROLL>.pdf` in the object store, trying
/// each key case in order.
pub struct ObjectStoreResolver {
    store: Arc<dyn ObjectStore>,
    layout: KeyLayout,
    cases: Vec<KeyCase>,
    ttl: LinkTtl,
}

impl ObjectStoreResolver {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, layout: KeyLayout, ttl: LinkTtl) -> Self {
        Self {
            store,
            layout,
            cases: vec![KeyCase::Upper, KeyCase::Lower],
            ttl,
        }
    }
}

#[async_trait]
impl Resolver for ObjectStoreResolver {
    fn name(&self) -> &'static str {
        "object-store"
    }

    async fn resolve(
        &self,
        roll_number: &RollNumber,
        purpose: AccessPurpose,
    ) -> Result<Option<CertificateHandle>, StoreError> {
        for case in &self.cases {
            let key = self.layout.key(roll_number, *case);
            // An unreachable store fails the whole resolver; the next case would too.
            if self.store.head(&key).await? {
                let url = self.store.presign(&key, self.ttl.for_purpose(purpose))?;
                return Ok(Some(CertificateHandle::Remote { key, url }));
            }
            debug!("object {key} not found");
        }

        Ok(None)
    }
}

/// Finds the first `*.pdf` in a directory whose name contains the roll number.
pub struct LocalDirResolver {
    dir: PathBuf,
}

impl LocalDirResolver {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl Resolver for LocalDirResolver {
    fn name(&self) -> &'static str {
        "local-dir"
    }

    async fn resolve(
        &self,
        roll_number: &RollNumber,
        _purpose: AccessPurpose,
    ) -> Result<Option<CertificateHandle>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) => {
                debug!("cannot read {}: {err}", self.dir.display());
                return Ok(None);
            }
        };

        let needle = roll_number.as_str();
        let mut matches = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().to_lowercase();
            if name.ends_with(".pdf") && name.contains(needle) {
                let is_file = entry
                    .file_type()
                    .await
                    .is_ok_and(|file_type| file_type.is_file());
                if is_file {
                    matches.push(entry.path());
                }
            }
        }

        // read_dir order is platform dependent
        matches.sort();
        Ok(matches
            .into_iter()
            .next()
            .map(|path| CertificateHandle::Local { path }))
    }
}

/// First-match-wins chain of resolvers.
pub struct ObjectLocator {
    resolvers: Vec<Box<dyn Resolver>>,
}

impl ObjectLocator {
    #[must_use]
    pub fn new(resolvers: Vec<Box<dyn Resolver>>) -> Self {
        Self { resolvers }
    }

    /// Standard chain: object store (when configured) then the local directory.
    #[must_use]
    pub fn standard(
        store: Option<Arc<dyn ObjectStore>>,
        layout: KeyLayout,
        ttl: LinkTtl,
        local_dir: impl Into<PathBuf>,
    ) -> Self {
        let mut resolvers: Vec<Box<dyn Resolver>> = Vec::new();
        if let Some(store) = store {
            resolvers.push(Box::new(ObjectStoreResolver::new(store, layout, ttl)));
        }
        resolvers.push(Box::new(LocalDirResolver::new(local_dir)));
        Self::new(resolvers)
    }

    #[must_use]
    pub fn resolver_names(&self) -> Vec<&'static str> {
        self.resolvers.iter().map(|resolver| resolver.name()).collect()
    }

    pub async fn resolve(&self, roll_number: &RollNumber) -> Option<CertificateHandle> {
        self.resolve_for(roll_number, AccessPurpose::Download).await
    }

    pub async fn resolve_preview(&self, roll_number: &RollNumber) -> Option<CertificateHandle> {
        self.resolve_for(roll_number, AccessPurpose::Preview).await
    }

    pub async fn resolve_for(
        &self,
        roll_number: &RollNumber,
        purpose: AccessPurpose,
    ) -> Option<CertificateHandle> {
        for resolver in &self.resolvers {
            match resolver.resolve(roll_number, purpose).await {
                Ok(Some(handle)) => {
                    debug!(resolver = resolver.name(), "certificate {roll_number} resolved");
                    return Some(handle);
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(resolver = resolver.name(), "certificate lookup failed: {err}");
                }
            }
        }

        None
    }
}
