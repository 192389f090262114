//! Development-only diagnostics. Not mounted when running with `--environment prod`.

use axum::{
    extract::Extension,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use crate::api::PortalState;
use crate::portal::ObjectEntry;
use crate::portal::otp::OtpSnapshot;

#[derive(Serialize, Debug)]
pub struct DebugInfo {
    environment: &'static str,
    is_production: bool,
    database: &'static str,
    object_store_endpoint: Option<String>,
    bucket_name: Option<String>,
    resolvers: Vec<&'static str>,
    email_sender: &'static str,
    otp_ttl_seconds: i64,
    demo_email: Option<String>,
    docs_enabled: bool,
    message: &'static str,
}

pub async fn info(state: Extension<Arc<PortalState>>) -> impl IntoResponse {
    let description = state.store().map(|store| store.describe());
    let otp_config = state.otp().config();

    Json(DebugInfo {
        environment: state.environment().as_str(),
        is_production: state.environment().is_production(),
        database: "postgresql",
        object_store_endpoint: description.as_ref().map(|d| d.endpoint.clone()),
        bucket_name: description.map(|d| d.bucket),
        resolvers: state.locator().resolver_names(),
        email_sender: state.email().name(),
        otp_ttl_seconds: otp_config.ttl_seconds(),
        demo_email: otp_config.demo_email().map(str::to_string),
        docs_enabled: true,
        message: "Debug mode is active",
    })
}

#[derive(Serialize, Debug)]
pub struct OtpStore {
    otp_count: usize,
    emails: Vec<String>,
    entries: Vec<OtpSnapshot>,
    message: &'static str,
}

pub async fn otp_store(state: Extension<Arc<PortalState>>) -> impl IntoResponse {
    let entries = state.otp().snapshot().await;

    Json(OtpStore {
        otp_count: entries.len(),
        emails: entries.iter().map(|entry| entry.email.clone()).collect(),
        entries,
        message: "This endpoint is only available in development mode",
    })
}

/// Matches the store's default `max-keys`.
const LIST_MAX_KEYS: usize = 1000;
const LISTED_FILES_SHOWN: usize = 10;

#[derive(Serialize, Debug)]
pub struct StoreCheck {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    endpoint: Option<String>,
    bucket: Option<String>,
    prefix: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    files_found: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    files: Vec<ObjectEntry>,
}

/// List certificates under the tenure prefix with the configured credentials.
pub async fn test_s3(state: Extension<Arc<PortalState>>) -> impl IntoResponse {
    let prefix = state.layout().tenure_prefix();
    let Some(store) = state.store() else {
        return Json(StoreCheck {
            status: "error",
            error: Some("S3 client not available".to_string()),
            endpoint: None,
            bucket: None,
            prefix,
            files_found: None,
            files: Vec::new(),
        });
    };

    let description = store.describe();
    let mut check = StoreCheck {
        status: "success",
        error: None,
        endpoint: Some(description.endpoint),
        bucket: Some(description.bucket),
        prefix,
        files_found: None,
        files: Vec::new(),
    };

    match store.list(&check.prefix, LIST_MAX_KEYS).await {
        Ok(mut files) => {
            check.files_found = Some(files.len());
            files.truncate(LISTED_FILES_SHOWN);
            check.files = files;
        }
        Err(err) => {
            warn!("Object store listing failed: {err}");
            check.status = "error";
            check.error = Some(err.to_string());
        }
    }

    Json(check)
}
