//! S3-compatible object store client (MinIO, path-style addressing).
//!
//! Requests are authorized with AWS Signature Version 4 query-string presigning,
//! so the same code produces the URLs handed to browsers, the `HEAD` requests
//! that check whether a certificate exists and the `ListObjectsV2` listing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use regex::Regex;
use reqwest::{Client, Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::{
    sync::{Arc, LazyLock},
    time::Duration,
};
use tracing::{Instrument, debug, info_span};
use url::Url;

use super::clock::Clock;
use super::error::StoreError;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";
const MAX_PRESIGN_SECONDS: u64 = 7 * 24 * 60 * 60;
const REQUEST_PRESIGN_SECONDS: u64 = 60;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

static CONTENTS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<Contents>(.*?)</Contents>").expect("static regex is valid")
});

#[derive(Clone, Debug, Serialize)]
pub struct StoreDescription {
    pub endpoint: String,
    pub bucket: String,
}

/// One object from a bucket listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ObjectEntry {
    pub key: String,
    pub size: u64,
    /// ISO 8601 timestamp as reported by the store.
    pub last_modified: String,
}

/// Object store operations needed to locate and hand out certificates.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// `Ok(true)` if the key exists, `Ok(false)` if it is absent.
    ///
    /// # Errors
    /// `StoreError::Unavailable` when the store cannot answer.
    async fn head(&self, key: &str) -> Result<bool, StoreError>;

    /// Time-limited `GET` URL for `key`.
    ///
    /// # Errors
    /// `StoreError::Signing` if the URL cannot be built.
    fn presign(&self, key: &str, ttl: Duration) -> Result<String, StoreError>;

    /// Check that the bucket is reachable with the configured credentials.
    ///
    /// # Errors
    /// `StoreError::Unavailable` when it is not.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Up to `max_keys` objects whose key starts with `prefix`, in key order.
    ///
    /// # Errors
    /// `StoreError::Unavailable` when the listing fails.
    async fn list(&self, prefix: &str, max_keys: usize) -> Result<Vec<ObjectEntry>, StoreError>;

    fn describe(&self) -> StoreDescription;
}

#[derive(Clone, Debug)]
pub struct S3Config {
    endpoint: Url,
    bucket: String,
    region: String,
    access_key: String,
    secret_key: SecretString,
}

impl S3Config {
    #[must_use]
    pub fn new(endpoint: Url, access_key: String, secret_key: SecretString) -> Self {
        Self {
            endpoint,
            bucket: "certificates".to_string(),
            region: "us-east-1".to_string(),
            access_key,
            secret_key,
        }
    }

    #[must_use]
    pub fn with_bucket(mut self, bucket: String) -> Self {
        self.bucket = bucket;
        self
    }

    #[must_use]
    pub fn with_region(mut self, region: String) -> Self {
        self.region = region;
        self
    }

    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

pub struct S3Client {
    config: S3Config,
    http: Client,
    clock: Arc<dyn Clock>,
}

impl S3Client {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: S3Config, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        let http = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| StoreError::Unavailable(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            config,
            http,
            clock,
        })
    }

    fn object_path(&self, key: &str) -> String {
        let base = self.config.endpoint.path().trim_end_matches('/');
        let key = key.trim_start_matches('/');
        if key.is_empty() {
            format!("{base}/{}", self.config.bucket)
        } else {
            format!("{base}/{}/{key}", self.config.bucket)
        }
    }

    fn presign_method(
        &self,
        method: &str,
        key: &str,
        query: &[(&str, String)],
        ttl: Duration,
    ) -> Result<String, StoreError> {
        let host = self
            .config
            .endpoint
            .host_str()
            .ok_or_else(|| StoreError::Signing("endpoint has no host".to_string()))?;
        let host = match self.config.endpoint.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let path = self.object_path(key);

        presign_url(&PresignRequest {
            method,
            scheme: self.config.endpoint.scheme(),
            host: &host,
            path: &path,
            query,
            region: &self.config.region,
            access_key: &self.config.access_key,
            secret_key: self.config.secret_key.expose_secret(),
            timestamp: self.clock.now(),
            expires_seconds: ttl.as_secs(),
        })
    }
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn head(&self, key: &str) -> Result<bool, StoreError> {
        let url = self.presign_method(
            "HEAD",
            key,
            &[],
            Duration::from_secs(REQUEST_PRESIGN_SECONDS),
        )?;
        let span = info_span!("s3.head", s3.bucket = %self.config.bucket, s3.key = key);
        let response = self
            .http
            .request(Method::HEAD, url)
            .send()
            .instrument(span)
            .await
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;

        let status = response.status();
        debug!("HEAD {key} -> {status}");
        match status {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND | StatusCode::FORBIDDEN => Ok(false),
            status => Err(StoreError::Unavailable(format!(
                "unexpected status {status} for {key}"
            ))),
        }
    }

    fn presign(&self, key: &str, ttl: Duration) -> Result<String, StoreError> {
        self.presign_method("GET", key, &[], ttl)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let url = self.presign_method(
            "HEAD",
            "",
            &[],
            Duration::from_secs(REQUEST_PRESIGN_SECONDS),
        )?;
        let span = info_span!("s3.ping", s3.bucket = %self.config.bucket);
        let response = self
            .http
            .request(Method::HEAD, url)
            .send()
            .instrument(span)
            .await
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(StoreError::Unavailable(format!(
                "bucket {} answered {}",
                self.config.bucket,
                response.status()
            )))
        }
    }

    async fn list(&self, prefix: &str, max_keys: usize) -> Result<Vec<ObjectEntry>, StoreError> {
        let query = [
            ("list-type", "2".to_string()),
            ("max-keys", max_keys.to_string()),
            ("prefix", prefix.to_string()),
        ];
        let url = self.presign_method(
            "GET",
            "",
            &query,
            Duration::from_secs(REQUEST_PRESIGN_SECONDS),
        )?;
        let span = info_span!("s3.list", s3.bucket = %self.config.bucket, s3.prefix = prefix);
        let response = self
            .http
            .get(url)
            .send()
            .instrument(span)
            .await
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Unavailable(format!(
                "listing {prefix} in {} answered {status}",
                self.config.bucket
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        let mut entries = parse_list_objects(&body);
        entries.truncate(max_keys);
        debug!("listed {} objects under {prefix}", entries.len());
        Ok(entries)
    }

    fn describe(&self) -> StoreDescription {
        StoreDescription {
            endpoint: self.config.endpoint.to_string(),
            bucket: self.config.bucket.clone(),
        }
    }
}

/// Inputs for a SigV4 presigned URL with `host` as the only signed header.
pub(crate) struct PresignRequest<'a> {
    pub(crate) method: &'a str,
    pub(crate) scheme: &'a str,
    /// Host header value, including the port when it is not the default.
    pub(crate) host: &'a str,
    /// Unencoded absolute path.
    pub(crate) path: &'a str,
    /// Unencoded request parameters signed alongside the `X-Amz-*` ones.
    pub(crate) query: &'a [(&'a str, String)],
    pub(crate) region: &'a str,
    pub(crate) access_key: &'a str,
    pub(crate) secret_key: &'a str,
    pub(crate) timestamp: DateTime<Utc>,
    pub(crate) expires_seconds: u64,
}

pub(crate) fn presign_url(request: &PresignRequest<'_>) -> Result<String, StoreError> {
    let amz_date = request.timestamp.format("%Y%m%dT%H%M%SZ").to_string();
    let date = request.timestamp.format("%Y%m%d").to_string();
    let scope = format!("{date}/{}/s3/aws4_request", request.region);
    let credential = format!("{}/{scope}", request.access_key);
    let expires = request.expires_seconds.clamp(1, MAX_PRESIGN_SECONDS).to_string();

    let mut query = [
        ("X-Amz-Algorithm", ALGORITHM.to_string()),
        ("X-Amz-Credential", credential),
        ("X-Amz-Date", amz_date.clone()),
        ("X-Amz-Expires", expires),
        ("X-Amz-SignedHeaders", "host".to_string()),
    ]
    .iter()
    .chain(request.query)
    .map(|(key, value)| (uri_encode(key, true), uri_encode(value, true)))
    .collect::<Vec<_>>();
    query.sort();
    let canonical_query = query
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");

    let canonical_uri = uri_encode(request.path, false);
    let canonical_request = format!(
        "{}\n{canonical_uri}\n{canonical_query}\nhost:{}\n\nhost\n{UNSIGNED_PAYLOAD}",
        request.method, request.host
    );

    let string_to_sign = format!(
        "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );

    let signing_key = [request.region, "s3", "aws4_request"].iter().try_fold(
        hmac_sha256(
            format!("AWS4{}", request.secret_key).as_bytes(),
            date.as_bytes(),
        )?,
        |key, part| hmac_sha256(&key, part.as_bytes()),
    )?;
    let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes())?);

    Ok(format!(
        "{}://{}{canonical_uri}?{canonical_query}&X-Amz-Signature={signature}",
        request.scheme, request.host
    ))
}

/// Extract `<Contents>` entries from a `ListObjectsV2` response body.
fn parse_list_objects(xml: &str) -> Vec<ObjectEntry> {
    CONTENTS_RE
        .captures_iter(xml)
        .filter_map(|contents| {
            let block = contents.get(1)?.as_str();
            Some(ObjectEntry {
                key: xml_unescape(element_text(block, "Key")?),
                size: element_text(block, "Size")
                    .and_then(|size| size.trim().parse().ok())
                    .unwrap_or_default(),
                last_modified: element_text(block, "LastModified")
                    .map(str::to_string)
                    .unwrap_or_default(),
            })
        })
        .collect()
}

fn element_text<'a>(block: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let start = block.find(&open)? + open.len();
    let end = start + block[start..].find(&format!("</{tag}>"))?;
    Some(&block[start..end])
}

fn xml_unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, StoreError> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|err| StoreError::Signing(err.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// RFC 3986 encoding as required by SigV4; `/` is kept when encoding paths.
fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut encoded = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(char::from(byte));
            }
            b'/' if !encode_slash => encoded.push('/'),
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}
