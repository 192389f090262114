//! OTP issue and verification endpoints.

use axum::{
    Form, Json,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::ToSchema;

use super::{ErrorBody, error_response};
use crate::api::{PortalState, email::render_otp_email};
use crate::portal::{OtpError, identity::normalize_email};

#[derive(ToSchema, Deserialize, Debug)]
pub struct SendOtpForm {
    email: String,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct VerifyOtpForm {
    email: String,
    otp: String,
}

/// What happened to the OTP email.
#[derive(ToSchema, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    Sent,
    /// Demo account; the fixed code is not mailed.
    Skipped,
    Failed,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct SendOtpResponse {
    message: String,
    delivery: Delivery,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct DeliveryFailure {
    error: String,
    delivery: Delivery,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct VerifyOtpResponse {
    success: bool,
    roll_number: String,
}

/// Issue an OTP for a student email that has a certificate on record.
#[utoipa::path(
    post,
    path = "/send-otp",
    request_body(content = SendOtpForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "OTP issued", body = SendOtpResponse),
        (status = 400, description = "Invalid email", body = ErrorBody),
        (status = 404, description = "No certificate for this roll number", body = ErrorBody),
        (status = 502, description = "OTP issued but the email could not be delivered", body = DeliveryFailure),
        (status = 503, description = "Certificate registry unavailable", body = ErrorBody)
    ),
    tag = "otp"
)]
pub async fn send_otp(
    state: Extension<Arc<PortalState>>,
    payload: Option<Form<SendOtpForm>>,
) -> Response {
    let Some(Form(form)) = payload else {
        return error_response(StatusCode::BAD_REQUEST, "Missing email");
    };

    let validator = state.validator();
    if !validator.validate(&form.email) {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!(
                "Invalid email format. Email must be in format: name.rollnumber@{}",
                validator.domain()
            ),
        );
    }

    let Some(roll_number) = validator.extract_roll_number(&form.email) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Could not extract roll number from email",
        );
    };

    match state.registry().get_certificate_record(&roll_number).await {
        Ok(Some(record)) if record.has_certificate => {}
        Ok(_) => {
            return error_response(
                StatusCode::NOT_FOUND,
                format!(
                    "No certificate found for roll number: {}",
                    roll_number.to_upper()
                ),
            );
        }
        Err(err) => {
            error!("Failed to lookup certificate record: {err:#}");
            return error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "Certificate registry unavailable",
            );
        }
    }

    let email = normalize_email(&form.email);
    let issued = state.otp().issue(&email, roll_number).await;

    if !state.environment().is_production() {
        info!("OTP for {email}: {}", issued.code);
    }

    if state.otp().config().is_demo(&email) {
        return Json(SendOtpResponse {
            message: "OTP sent successfully (demo account)".to_string(),
            delivery: Delivery::Skipped,
        })
        .into_response();
    }

    let ttl_minutes = state.otp().config().ttl_seconds() / 60;
    let message = render_otp_email(&email, &issued.code, ttl_minutes);
    match state.email().send(&message).await {
        Ok(()) => Json(SendOtpResponse {
            message: "OTP sent successfully".to_string(),
            delivery: Delivery::Sent,
        })
        .into_response(),
        Err(err) => {
            warn!(
                sender = state.email().name(),
                "Failed to deliver OTP email: {err:#}"
            );
            (
                StatusCode::BAD_GATEWAY,
                Json(DeliveryFailure {
                    error: "Failed to deliver OTP email".to_string(),
                    delivery: Delivery::Failed,
                }),
            )
                .into_response()
        }
    }
}

/// Check a submitted code and report the roll number it unlocks.
#[utoipa::path(
    post,
    path = "/verify-otp",
    request_body(content = VerifyOtpForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "OTP verified", body = VerifyOtpResponse),
        (status = 400, description = "Missing, expired or invalid OTP", body = ErrorBody)
    ),
    tag = "otp"
)]
pub async fn verify_otp(
    state: Extension<Arc<PortalState>>,
    payload: Option<Form<VerifyOtpForm>>,
) -> Response {
    let Some(Form(form)) = payload else {
        return error_response(StatusCode::BAD_REQUEST, "Missing email or OTP");
    };

    match state.otp().verify(&form.email, &form.otp).await {
        Ok(roll_number) => Json(VerifyOtpResponse {
            success: true,
            roll_number: roll_number.to_upper(),
        })
        .into_response(),
        Err(err) => {
            let message = match err {
                OtpError::NotFound => "No OTP found for this email",
                OtpError::Expired => "OTP has expired. Please request a new one.",
                OtpError::InvalidCode => "Invalid OTP",
            };
            error_response(StatusCode::BAD_REQUEST, message)
        }
    }
}
