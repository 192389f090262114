use crate::api::PortalState;
use axum::{extract::Extension, response::Html};
use std::sync::Arc;
use tracing::debug;

const BUNDLED_INDEX: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/static/index.html"));

/// Portal page; `<static-dir>/index.html` overrides the bundled copy.
pub async fn root(state: Extension<Arc<PortalState>>) -> Html<String> {
    let path = state.static_dir().join("index.html");
    match tokio::fs::read_to_string(&path).await {
        Ok(page) => Html(page),
        Err(err) => {
            debug!("Serving bundled index page, {} unreadable: {err}", path.display());
            Html(BUNDLED_INDEX.to_string())
        }
    }
}
