//! Certificate preview and download endpoints.

use axum::{
    body::Body,
    extract::{Extension, Path, Query},
    http::{
        HeaderValue, StatusCode,
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    },
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use std::{path::Path as FsPath, sync::Arc};
use tokio_util::io::ReaderStream;
use tracing::{Instrument, error, info_span, warn};
use utoipa::IntoParams;

use super::{ErrorBody, error_response};
use crate::api::PortalState;
use crate::portal::{AccessError, CertificateHandle, RollNumber};

const PDF_CONTENT_TYPE: &str = "application/pdf";

#[derive(IntoParams, Deserialize, Debug)]
#[into_params(parameter_in = Query)]
pub struct AccessQuery {
    /// Email that completed OTP verification.
    email: Option<String>,
}

#[derive(Clone, Copy)]
enum Disposition {
    Attachment,
    Inline,
}

fn access_denied(err: AccessError) -> Response {
    match err {
        AccessError::Unauthenticated => error_response(
            StatusCode::FORBIDDEN,
            "Please complete OTP verification first",
        ),
        AccessError::Mismatch => error_response(StatusCode::FORBIDDEN, "Invalid access"),
        AccessError::NotFound => error_response(StatusCode::NOT_FOUND, "Certificate file not found"),
    }
}

/// Validate path and query. Roll numbers that cannot be parsed never match a session.
fn access_request(raw_roll: &str, query: AccessQuery) -> Result<(RollNumber, String), Response> {
    let Some(email) = query.email.filter(|email| !email.trim().is_empty()) else {
        return Err(access_denied(AccessError::Unauthenticated));
    };
    let Some(roll_number) = RollNumber::parse(raw_roll) else {
        return Err(access_denied(AccessError::Mismatch));
    };
    Ok((roll_number, email))
}

fn pdf_response(body: Body, roll_number: &RollNumber, disposition: Disposition) -> Response {
    let kind = match disposition {
        Disposition::Attachment => "attachment",
        Disposition::Inline => "inline",
    };
    let value = format!(
        "{kind}; filename=\"{}_certificate.pdf\"",
        roll_number.to_upper()
    );

    let mut response = (StatusCode::OK, body).into_response();
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(PDF_CONTENT_TYPE));
    match HeaderValue::from_str(&value) {
        Ok(value) => {
            headers.insert(CONTENT_DISPOSITION, value);
        }
        Err(err) => error!("Failed to build content-disposition header: {err}"),
    }
    response
}

async fn local_file_response(
    path: &FsPath,
    roll_number: &RollNumber,
    disposition: Disposition,
) -> Response {
    match tokio::fs::File::open(path).await {
        Ok(file) => pdf_response(
            Body::from_stream(ReaderStream::new(file)),
            roll_number,
            disposition,
        ),
        Err(err) => {
            error!("Failed to open {}: {err}", path.display());
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "An error occurred while reading the certificate",
            )
        }
    }
}

/// Stream the object through the portal; fall back to a redirect if that fails.
async fn remote_download_response(
    state: &PortalState,
    url: &str,
    roll_number: &RollNumber,
) -> Response {
    let span = info_span!("object_store.fetch", http.method = "GET");
    let fetched = state
        .http()
        .get(url)
        .send()
        .instrument(span)
        .await
        .and_then(reqwest::Response::error_for_status);

    match fetched {
        Ok(response) => pdf_response(
            Body::from_stream(response.bytes_stream()),
            roll_number,
            Disposition::Attachment,
        ),
        Err(err) => {
            warn!("Failed to fetch certificate from object store, redirecting: {err}");
            Redirect::temporary(url).into_response()
        }
    }
}

/// Download the certificate; a successful download consumes the OTP session.
#[utoipa::path(
    get,
    path = "/download/{roll_number}",
    params(
        ("roll_number" = String, Path, description = "Roll number bound to the verified session"),
        AccessQuery
    ),
    responses(
        (status = 200, description = "Certificate PDF"),
        (status = 307, description = "Redirect to a presigned object store URL"),
        (status = 403, description = "OTP verification required or roll number mismatch", body = ErrorBody),
        (status = 404, description = "Certificate file not found", body = ErrorBody)
    ),
    tag = "certificates"
)]
pub async fn download(
    state: Extension<Arc<PortalState>>,
    Path(raw_roll): Path<String>,
    Query(query): Query<AccessQuery>,
) -> Response {
    let (roll_number, email) = match access_request(&raw_roll, query) {
        Ok(request) => request,
        Err(response) => return response,
    };

    match state.gate().download(&email, &roll_number).await {
        Ok(CertificateHandle::Remote { url, .. }) => {
            remote_download_response(&state, &url, &roll_number).await
        }
        Ok(CertificateHandle::Local { path }) => {
            local_file_response(&path, &roll_number, Disposition::Attachment).await
        }
        Err(err) => access_denied(err),
    }
}

/// Preview the certificate inline. The OTP session stays valid.
#[utoipa::path(
    get,
    path = "/preview/{roll_number}",
    params(
        ("roll_number" = String, Path, description = "Roll number bound to the verified session"),
        AccessQuery
    ),
    responses(
        (status = 200, description = "Certificate PDF served inline"),
        (status = 307, description = "Redirect to a short-lived presigned URL"),
        (status = 403, description = "OTP verification required or roll number mismatch", body = ErrorBody),
        (status = 404, description = "Certificate file not found", body = ErrorBody)
    ),
    tag = "certificates"
)]
pub async fn preview(
    state: Extension<Arc<PortalState>>,
    Path(raw_roll): Path<String>,
    Query(query): Query<AccessQuery>,
) -> Response {
    let (roll_number, email) = match access_request(&raw_roll, query) {
        Ok(request) => request,
        Err(response) => return response,
    };

    match state.gate().preview(&email, &roll_number).await {
        Ok(CertificateHandle::Remote { url, .. }) => Redirect::temporary(&url).into_response(),
        Ok(CertificateHandle::Local { path }) => {
            local_file_response(&path, &roll_number, Disposition::Inline).await
        }
        Err(err) => access_denied(err),
    }
}
