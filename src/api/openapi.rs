#![allow(clippy::needless_for_each)]

use super::handlers::{
    ErrorBody,
    certificates::{__path_download, __path_preview},
    health,
    health::__path_health,
    otp,
    otp::{__path_send_otp, __path_verify_otp},
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(health, send_otp, verify_otp, download, preview),
    components(schemas(
        health::Health,
        ErrorBody,
        otp::SendOtpForm,
        otp::VerifyOtpForm,
        otp::SendOtpResponse,
        otp::DeliveryFailure,
        otp::VerifyOtpResponse,
        otp::Delivery
    )),
    tags(
        (name = "certportal", description = "Certificate download portal with OTP verification"),
        (name = "otp", description = "One-time passcode issue and verification"),
        (name = "certificates", description = "Certificate preview and download")
    )
)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}
