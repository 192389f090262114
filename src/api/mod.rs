use crate::api::handlers::{certificates, debug, health, otp, root};
use crate::portal::{
    AccessGate, CertificateRegistry, IdentityValidator, KeyLayout, ObjectLocator, ObjectStore,
    OtpManager,
};
use anyhow::{Context, Result};
use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    routing::{get, post},
};
use serde::Serialize;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::{
    net::TcpListener,
    signal::{self, unix::SignalKind},
};
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer,
    services::{ServeDir, ServeFile},
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{Span, error, info, info_span};
use ulid::Ulid;
use utoipa_swagger_ui::SwaggerUi;

pub mod email;
pub mod handlers;
mod openapi;

#[cfg(test)]
mod tests;

pub use openapi::openapi;

use self::email::EmailSender;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

impl Environment {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "dev" | "development" => Some(Self::Dev),
            "prod" | "production" => Some(Self::Prod),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Prod => "prod",
        }
    }

    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Prod)
    }
}

/// Everything the handlers need, shared behind an `Arc` extension.
pub struct PortalState {
    environment: Environment,
    validator: IdentityValidator,
    otp: Arc<OtpManager>,
    gate: AccessGate,
    locator: Arc<ObjectLocator>,
    layout: KeyLayout,
    store: Option<Arc<dyn ObjectStore>>,
    registry: Arc<dyn CertificateRegistry>,
    email: Arc<dyn EmailSender>,
    http: reqwest::Client,
    static_dir: PathBuf,
}

/// Collaborators wired into [`PortalState`].
pub struct PortalParts {
    pub environment: Environment,
    pub validator: IdentityValidator,
    pub otp: Arc<OtpManager>,
    pub locator: Arc<ObjectLocator>,
    pub layout: KeyLayout,
    pub store: Option<Arc<dyn ObjectStore>>,
    pub registry: Arc<dyn CertificateRegistry>,
    pub email: Arc<dyn EmailSender>,
    pub static_dir: PathBuf,
}

impl PortalState {
    /// # Errors
    /// Returns an error if the HTTP client used to stream certificates cannot be built.
    pub fn new(parts: PortalParts) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("Failed to build object store HTTP client")?;

        let gate = AccessGate::new(
            parts.otp.clone(),
            parts.locator.clone(),
            parts.registry.clone(),
        );

        Ok(Self {
            environment: parts.environment,
            validator: parts.validator,
            otp: parts.otp,
            gate,
            locator: parts.locator,
            layout: parts.layout,
            store: parts.store,
            registry: parts.registry,
            email: parts.email,
            http,
            static_dir: parts.static_dir,
        })
    }

    #[must_use]
    pub fn environment(&self) -> Environment {
        self.environment
    }

    #[must_use]
    pub fn validator(&self) -> &IdentityValidator {
        &self.validator
    }

    #[must_use]
    pub fn otp(&self) -> &OtpManager {
        &self.otp
    }

    #[must_use]
    pub fn gate(&self) -> &AccessGate {
        &self.gate
    }

    #[must_use]
    pub fn locator(&self) -> &ObjectLocator {
        &self.locator
    }

    #[must_use]
    pub fn layout(&self) -> &KeyLayout {
        &self.layout
    }

    #[must_use]
    pub fn store(&self) -> Option<&Arc<dyn ObjectStore>> {
        self.store.as_ref()
    }

    #[must_use]
    pub fn registry(&self) -> &dyn CertificateRegistry {
        self.registry.as_ref()
    }

    #[must_use]
    pub fn email(&self) -> &dyn EmailSender {
        self.email.as_ref()
    }

    #[must_use]
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    #[must_use]
    pub fn static_dir(&self) -> &Path {
        &self.static_dir
    }
}

/// Build the portal router. Debug routes and Swagger UI are only mounted outside production.
pub fn router(state: Arc<PortalState>) -> Router {
    let static_dir = state.static_dir().to_path_buf();

    let mut app = Router::new()
        .route("/", get(root::root))
        .route("/health", get(health::health).options(health::health))
        .route("/send-otp", post(otp::send_otp))
        .route("/verify-otp", post(otp::verify_otp))
        .route("/download/:roll_number", get(certificates::download))
        .route("/preview/:roll_number", get(certificates::preview))
        .route_service("/favicon.ico", ServeFile::new(static_dir.join("favicon.ico")))
        .nest_service("/static", ServeDir::new(static_dir));

    if !state.environment().is_production() {
        app = app
            .route("/debug/info", get(debug::info))
            .route("/debug/otp-store", get(debug::otp_store))
            .route("/test-s3", get(debug::test_s3))
            .merge(SwaggerUi::new("/docs").url("/openapi.json", openapi()));
    }

    app.layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(Extension(state)),
    )
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, state: Arc<PortalState>) -> Result<()> {
    let app = router(state);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!("Failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Gracefully shutdown");
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
