use super::*;
use crate::api::email::EmailSender;
use crate::portal::testing::{
    FailingEmailSender, MEMORY_OBJECT_MODIFIED, ManualClock, MemoryObjectStore, MemoryRegistry,
    RecordingEmailSender,
};
use crate::portal::{LinkTtl, OtpConfig, RollNumber};
use axum::http::{
    Method, StatusCode,
    header::{CONTENT_DISPOSITION, CONTENT_TYPE, LOCATION},
};
use http_body_util::BodyExt;
use regex::Regex;
use serde_json::Value;
use tower::ServiceExt;

const DEMO_EMAIL: &str = "dummy.220btccse000@sushantuniversity.edu.in";
const STUDENT_EMAIL: &str = "aditya.220btccse004@sushantuniversity.edu.in";

struct Harness {
    state: Arc<PortalState>,
    registry: Arc<MemoryRegistry>,
}

struct Options {
    environment: Environment,
    store: Option<Arc<dyn ObjectStore>>,
    local_dir: PathBuf,
    email: Arc<dyn EmailSender>,
}

impl Default for Options {
    fn default() -> Self {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::with_keys([
            "certificates/tenure2024-25/220BTCCSE000.pdf",
            "certificates/tenure2024-25/220btccse004.pdf",
        ]));
        Self {
            environment: Environment::Dev,
            store: Some(store),
            local_dir: PathBuf::from("/nonexistent/certportal"),
            email: Arc::new(RecordingEmailSender::default()),
        }
    }
}

fn roll(raw: &str) -> RollNumber {
    RollNumber::parse(raw).expect("valid roll number")
}

async fn harness(options: Options) -> Harness {
    let registry = Arc::new(MemoryRegistry::default());
    registry
        .upsert_certificate(&roll("220btccse000"), true)
        .await
        .expect("seed demo");
    registry
        .upsert_certificate(&roll("220btccse004"), true)
        .await
        .expect("seed student");
    registry
        .upsert_certificate(&roll("220btccse009"), false)
        .await
        .expect("seed unavailable");

    let otp = Arc::new(OtpManager::new(
        OtpConfig::new().with_demo_email(Some(DEMO_EMAIL.to_string())),
        Arc::new(ManualClock::default()),
    ));
    let layout = KeyLayout::default();
    let locator = Arc::new(ObjectLocator::standard(
        options.store.clone(),
        layout.clone(),
        LinkTtl::default(),
        options.local_dir,
    ));

    let state = PortalState::new(PortalParts {
        environment: options.environment,
        validator: IdentityValidator::default(),
        otp,
        locator,
        layout,
        store: options.store,
        registry: registry.clone(),
        email: options.email,
        static_dir: PathBuf::from("/nonexistent/certportal-static"),
    })
    .expect("portal state");

    Harness {
        state: Arc::new(state),
        registry,
    }
}

fn form(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

async fn call(state: &Arc<PortalState>, request: Request<Body>) -> axum::response::Response {
    router(state.clone())
        .oneshot(request)
        .await
        .expect("infallible router")
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

async fn verify_demo(state: &Arc<PortalState>) {
    let response = call(state, form("/send-otp", &format!("email={DEMO_EMAIL}"))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["delivery"], "skipped");

    let response = call(
        state,
        form("/verify-otp", &format!("email={DEMO_EMAIL}&otp=123456")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["roll_number"], "220BTCCSE000");
}

#[tokio::test]
async fn send_otp_rejects_foreign_domain() {
    let h = harness(Options::default()).await;
    let response = call(&h.state, form("/send-otp", "email=test@gmail.com")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(
        body["error"]
            .as_str()
            .is_some_and(|msg| msg.contains("sushantuniversity.edu.in"))
    );
}

#[tokio::test]
async fn send_otp_requires_an_available_certificate() {
    let h = harness(Options::default()).await;

    let response = call(
        &h.state,
        form("/send-otp", "email=x.220btccse009@sushantuniversity.edu.in"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(
        body["error"],
        "No certificate found for roll number: 220BTCCSE009"
    );

    let response = call(
        &h.state,
        form("/send-otp", "email=x.220btccse777@sushantuniversity.edu.in"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn mailed_code_verifies() {
    let sender = Arc::new(RecordingEmailSender::default());
    let h = harness(Options {
        email: sender.clone(),
        ..Options::default()
    })
    .await;

    let response = call(&h.state, form("/send-otp", &format!("email={STUDENT_EMAIL}"))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["delivery"], "sent");

    let sent = sender.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to_email, STUDENT_EMAIL);
    let code = Regex::new(r">(\d{6})</h3>")
        .expect("regex")
        .captures(&sent[0].html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .expect("code in email");

    let response = call(
        &h.state,
        form("/verify-otp", &format!("email={STUDENT_EMAIL}&otp=000000x")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "Invalid OTP");

    let response = call(
        &h.state,
        form("/verify-otp", &format!("email={STUDENT_EMAIL}&otp={code}")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["roll_number"], "220BTCCSE004");
}

#[tokio::test]
async fn delivery_failure_is_reported_but_code_stays_issued() {
    let h = harness(Options {
        email: Arc::new(FailingEmailSender),
        ..Options::default()
    })
    .await;

    let response = call(&h.state, form("/send-otp", &format!("email={STUDENT_EMAIL}"))).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = json_body(response).await;
    assert_eq!(body["delivery"], "failed");

    let snapshot = h.state.otp().snapshot().await;
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].email, STUDENT_EMAIL);
}

#[tokio::test]
async fn verify_without_code_is_not_found() {
    let h = harness(Options::default()).await;
    let response = call(
        &h.state,
        form("/verify-otp", &format!("email={STUDENT_EMAIL}&otp=123456")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(response).await["error"],
        "No OTP found for this email"
    );
}

#[tokio::test]
async fn download_requires_verification() {
    let h = harness(Options::default()).await;

    let response = call(
        &h.state,
        get_request(&format!("/download/220BTCCSE000?email={DEMO_EMAIL}")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        json_body(response).await["error"],
        "Please complete OTP verification first"
    );

    let response = call(&h.state, get_request("/download/220BTCCSE000")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn other_roll_number_is_invalid_access() {
    let h = harness(Options::default()).await;
    verify_demo(&h.state).await;

    for uri in [
        format!("/download/220BTCCSE004?email={DEMO_EMAIL}"),
        format!("/preview/220BTCCSE004?email={DEMO_EMAIL}"),
        format!("/download/not-a-roll?email={DEMO_EMAIL}"),
    ] {
        let response = call(&h.state, get_request(&uri)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{uri}");
        assert_eq!(json_body(response).await["error"], "Invalid access");
    }
}

#[tokio::test]
async fn preview_redirects_and_download_consumes_session() {
    let h = harness(Options::default()).await;
    verify_demo(&h.state).await;

    for _ in 0..2 {
        let response = call(
            &h.state,
            get_request(&format!("/preview/220btccse000?email={DEMO_EMAIL}")),
        )
        .await;
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        assert!(location.contains("ttl=900"), "{location}");
    }

    // memory:// links cannot be fetched, so the handler redirects instead of streaming.
    let response = call(
        &h.state,
        get_request(&format!("/download/220BTCCSE000?email={DEMO_EMAIL}")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    let location = response
        .headers()
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    assert!(location.contains("ttl=3600"), "{location}");
    assert_eq!(h.registry.download_count(&roll("220btccse000")), 1);

    let response = call(
        &h.state,
        get_request(&format!("/download/220BTCCSE000?email={DEMO_EMAIL}")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn local_fallback_serves_attachment() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("Zenith_220BTCCSE000.pdf"), b"%PDF-1.4 demo").expect("pdf");

    let offline: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::unavailable());
    let h = harness(Options {
        store: Some(offline),
        local_dir: dir.path().to_path_buf(),
        ..Options::default()
    })
    .await;
    verify_demo(&h.state).await;

    let response = call(
        &h.state,
        get_request(&format!("/preview/220BTCCSE000?email={DEMO_EMAIL}")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(CONTENT_DISPOSITION).and_then(|v| v.to_str().ok()),
        Some("inline; filename=\"220BTCCSE000_certificate.pdf\"")
    );

    let response = call(
        &h.state,
        get_request(&format!("/download/220BTCCSE000?email={DEMO_EMAIL}")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(CONTENT_TYPE).and_then(|v| v.to_str().ok()),
        Some("application/pdf")
    );
    assert_eq!(
        response.headers().get(CONTENT_DISPOSITION).and_then(|v| v.to_str().ok()),
        Some("attachment; filename=\"220BTCCSE000_certificate.pdf\"")
    );
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    assert_eq!(&bytes[..], b"%PDF-1.4 demo");
}

#[tokio::test]
async fn local_fallback_streams_large_files_intact() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pdf: Vec<u8> = (0..512 * 1024).map(|i| (i % 251) as u8).collect();
    std::fs::write(dir.path().join("220btccse000.pdf"), &pdf).expect("pdf");

    let h = harness(Options {
        store: None,
        local_dir: dir.path().to_path_buf(),
        ..Options::default()
    })
    .await;
    verify_demo(&h.state).await;

    let response = call(
        &h.state,
        get_request(&format!("/preview/220BTCCSE000?email={DEMO_EMAIL}")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    assert_eq!(bytes.len(), pdf.len());
    assert_eq!(&bytes[..], &pdf[..]);
}

#[tokio::test]
async fn missing_file_is_not_found_and_session_survives() {
    let h = harness(Options {
        store: None,
        ..Options::default()
    })
    .await;
    verify_demo(&h.state).await;

    let response = call(
        &h.state,
        get_request(&format!("/download/220BTCCSE000?email={DEMO_EMAIL}")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(
        h.state
            .gate()
            .authorize(DEMO_EMAIL, &roll("220btccse000"))
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn health_reports_database_and_storage() {
    let h = harness(Options::default()).await;

    let response = call(&h.state, get_request("/health")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("X-App"));
    assert!(response.headers().contains_key("x-request-id"));
    let body = json_body(response).await;
    assert_eq!(body["database"], "ok");
    assert_eq!(body["storage"], "object-store");

    h.registry.go_offline();
    let response = call(&h.state, get_request("/health")).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn debug_routes_follow_environment() {
    let h = harness(Options::default()).await;
    verify_demo(&h.state).await;

    let response = call(&h.state, get_request("/debug/otp-store")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["otp_count"], 1);
    assert_eq!(body["entries"][0]["phase"], "verified");

    let response = call(&h.state, get_request("/test-s3")).await;
    assert_eq!(json_body(response).await["status"], "success");

    let prod = harness(Options {
        environment: Environment::Prod,
        ..Options::default()
    })
    .await;
    for uri in ["/debug/info", "/debug/otp-store", "/test-s3", "/openapi.json"] {
        let response = call(&prod.state, get_request(uri)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
    }
}

#[tokio::test]
async fn test_s3_lists_tenure_certificates() {
    let keys: Vec<String> = (0..12)
        .map(|n| format!("certificates/tenure2024-25/220BTCCSE{n:03}.pdf"))
        .chain(["certificates/tenure2023-24/210BTCCSE001.pdf".to_string()])
        .collect();
    let store: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::with_objects(
        keys.iter().map(|key| (key.as_str(), 2048)),
    ));
    let h = harness(Options {
        store: Some(store),
        ..Options::default()
    })
    .await;

    let response = call(&h.state, get_request("/test-s3")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "success");
    assert_eq!(body["prefix"], "certificates/tenure2024-25/");
    assert_eq!(body["files_found"], 12);
    assert_eq!(body["files"].as_array().map(Vec::len), Some(10));
    assert_eq!(
        body["files"][0]["key"],
        "certificates/tenure2024-25/220BTCCSE000.pdf"
    );
    assert_eq!(body["files"][0]["size"], 2048);
    assert_eq!(body["files"][0]["last_modified"], MEMORY_OBJECT_MODIFIED);

    let offline: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::unavailable());
    let h = harness(Options {
        store: Some(offline),
        ..Options::default()
    })
    .await;
    let body = json_body(call(&h.state, get_request("/test-s3")).await).await;
    assert_eq!(body["status"], "error");
    assert!(body["error"].as_str().is_some_and(|e| e.contains("offline")));
    assert!(body.get("files_found").is_none());
}

#[tokio::test]
async fn root_serves_bundled_index() {
    let h = harness(Options::default()).await;
    let response = call(&h.state, get_request("/")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    assert!(String::from_utf8_lossy(&bytes).contains("/send-otp"));
}

#[test]
fn environment_parsing() {
    assert_eq!(Environment::parse("PROD"), Some(Environment::Prod));
    assert_eq!(Environment::parse("development"), Some(Environment::Dev));
    assert_eq!(Environment::parse("staging"), None);
}
