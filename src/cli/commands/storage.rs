//! Object store and local fallback arguments, shared by the server and the
//! `certificates` subcommand.

use anyhow::{Context, Result, bail};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;
use std::path::PathBuf;
use url::Url;

use crate::portal::locator::{DEFAULT_DOWNLOAD_TTL_SECONDS, DEFAULT_PREVIEW_TTL_SECONDS};

pub const ARG_S3_ENDPOINT: &str = "s3-endpoint";
pub const ARG_S3_BUCKET: &str = "s3-bucket";
pub const ARG_S3_REGION: &str = "s3-region";
pub const ARG_S3_ACCESS_KEY: &str = "s3-access-key";
pub const ARG_S3_SECRET_KEY: &str = "s3-secret-key";
pub const ARG_OBJECT_PREFIX: &str = "object-prefix";
pub const ARG_TENURE: &str = "tenure";
pub const ARG_LOCAL_CERTIFICATES_DIR: &str = "local-certificates-dir";
pub const ARG_PREVIEW_TTL_SECONDS: &str = "preview-ttl-seconds";
pub const ARG_DOWNLOAD_TTL_SECONDS: &str = "download-ttl-seconds";

#[derive(Debug, Clone)]
pub struct RemoteOptions {
    pub endpoint: Url,
    pub bucket: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: SecretString,
}

#[derive(Debug, Clone)]
pub struct Options {
    /// `None` when no endpoint is configured; lookups then use the local directory only.
    pub remote: Option<RemoteOptions>,
    pub prefix: String,
    pub tenure: String,
    pub local_dir: PathBuf,
    pub preview_ttl_seconds: u64,
    pub download_ttl_seconds: u64,
}

/// Accept bare hosts like `s3.zenithclub.in` by assuming https.
fn parse_endpoint(raw: &str) -> Result<Url> {
    let raw = raw.trim();
    let with_scheme = if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };
    Url::parse(&with_scheme).with_context(|| format!("invalid --{ARG_S3_ENDPOINT}: {raw}"))
}

impl Options {
    /// Parse storage arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the endpoint is invalid or given without credentials.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let get_non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
        };

        let remote = match get_non_empty(ARG_S3_ENDPOINT) {
            Some(raw) => {
                let endpoint = parse_endpoint(&raw)?;
                let Some(access_key) = get_non_empty(ARG_S3_ACCESS_KEY) else {
                    bail!("missing required argument: --{ARG_S3_ACCESS_KEY} (required with --{ARG_S3_ENDPOINT})");
                };
                let Some(secret_key) = get_non_empty(ARG_S3_SECRET_KEY) else {
                    bail!("missing required argument: --{ARG_S3_SECRET_KEY} (required with --{ARG_S3_ENDPOINT})");
                };
                Some(RemoteOptions {
                    endpoint,
                    bucket: get_non_empty(ARG_S3_BUCKET).unwrap_or_else(|| "certificates".to_string()),
                    region: get_non_empty(ARG_S3_REGION).unwrap_or_else(|| "us-east-1".to_string()),
                    access_key,
                    secret_key: SecretString::from(secret_key),
                })
            }
            None => None,
        };

        Ok(Self {
            remote,
            prefix: matches
                .get_one::<String>(ARG_OBJECT_PREFIX)
                .cloned()
                .unwrap_or_default(),
            tenure: get_non_empty(ARG_TENURE).unwrap_or_else(|| "2024-25".to_string()),
            local_dir: PathBuf::from(
                get_non_empty(ARG_LOCAL_CERTIFICATES_DIR).unwrap_or_else(|| ".".to_string()),
            ),
            preview_ttl_seconds: matches
                .get_one::<u64>(ARG_PREVIEW_TTL_SECONDS)
                .copied()
                .unwrap_or(DEFAULT_PREVIEW_TTL_SECONDS),
            download_ttl_seconds: matches
                .get_one::<u64>(ARG_DOWNLOAD_TTL_SECONDS)
                .copied()
                .unwrap_or(DEFAULT_DOWNLOAD_TTL_SECONDS),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_S3_ENDPOINT)
                .long(ARG_S3_ENDPOINT)
                .help("S3-compatible endpoint (MinIO); omit to serve from the local directory only")
                .env("CERTPORTAL_S3_ENDPOINT")
                .global(true),
        )
        .arg(
            Arg::new(ARG_S3_BUCKET)
                .long(ARG_S3_BUCKET)
                .help("Bucket holding the certificates")
                .env("CERTPORTAL_S3_BUCKET")
                .default_value("certificates")
                .global(true),
        )
        .arg(
            Arg::new(ARG_S3_REGION)
                .long(ARG_S3_REGION)
                .help("Region used for request signing")
                .env("CERTPORTAL_S3_REGION")
                .default_value("us-east-1")
                .global(true),
        )
        .arg(
            Arg::new(ARG_S3_ACCESS_KEY)
                .long(ARG_S3_ACCESS_KEY)
                .help("Object store access key")
                .env("CERTPORTAL_S3_ACCESS_KEY")
                .global(true),
        )
        .arg(
            Arg::new(ARG_S3_SECRET_KEY)
                .long(ARG_S3_SECRET_KEY)
                .help("Object store secret key")
                .env("CERTPORTAL_S3_SECRET_KEY")
                .hide_env_values(true)
                .global(true),
        )
        .arg(
            Arg::new(ARG_OBJECT_PREFIX)
                .long(ARG_OBJECT_PREFIX)
                .help("Key prefix in front of tenure<period>/<ROLL>.pdf")
                .env("CERTPORTAL_OBJECT_PREFIX")
                .default_value("certificates")
                .global(true),
        )
        .arg(
            Arg::new(ARG_TENURE)
                .long(ARG_TENURE)
                .help("Tenure period, e.g. 2024-25")
                .env("CERTPORTAL_TENURE")
                .default_value("2024-25")
                .global(true),
        )
        .arg(
            Arg::new(ARG_LOCAL_CERTIFICATES_DIR)
                .long(ARG_LOCAL_CERTIFICATES_DIR)
                .help("Directory scanned for *.pdf when the object store misses")
                .env("CERTPORTAL_LOCAL_CERTIFICATES_DIR")
                .default_value(".")
                .global(true),
        )
        .arg(
            Arg::new(ARG_PREVIEW_TTL_SECONDS)
                .long(ARG_PREVIEW_TTL_SECONDS)
                .help("Lifetime of presigned preview links in seconds")
                .env("CERTPORTAL_PREVIEW_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(u64).range(1..=604_800))
                .global(true),
        )
        .arg(
            Arg::new(ARG_DOWNLOAD_TTL_SECONDS)
                .long(ARG_DOWNLOAD_TTL_SECONDS)
                .help("Lifetime of presigned download links in seconds")
                .env("CERTPORTAL_DOWNLOAD_TTL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(u64).range(1..=604_800))
                .global(true),
        )
}
