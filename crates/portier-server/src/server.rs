//! ============================================================================
//! Webhook HTTP Server
//! ============================================================================
//! Axum routes for the telephony platform's callbacks. Each handler is a
//! thin shell: validate the signature, decode the continuation token, hand
//! off to the call flow, serialize the directive document as XML. Business
//! logic lives in portier-core.
//! ============================================================================

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use portier_core::auth::SIGNATURE_HEADER;
use portier_core::{CallContext, CallFlow, RequestAuthenticator, Step, VoiceResponse};

/// Application state shared across routes.
#[derive(Clone)]
pub struct AppState {
    pub flow: Arc<CallFlow>,
    pub authenticator: Arc<RequestAuthenticator>,
}

/// Build the webhook router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", post(entry))
        .route("/ask", post(ask))
        .route("/action", post(action))
        .route("/actionRequest", post(action_request))
        .route("/checkActionResult", post(check_action_result))
        .route("/version", post(version))
        .route("/health", get(health))
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn run(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let app = router(state);

    info!("webhook server listening on {}", addr);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Liveness signal for the platform's monitoring. Unauthenticated by design.
async fn health() -> &'static str {
    "OK"
}

async fn entry(state: State<AppState>, uri: Uri, headers: HeaderMap, body: Bytes) -> Response {
    handle_webhook(state.0, Step::Entry, uri, headers, body).await
}

async fn ask(state: State<AppState>, uri: Uri, headers: HeaderMap, body: Bytes) -> Response {
    handle_webhook(state.0, Step::Ask, uri, headers, body).await
}

async fn action(state: State<AppState>, uri: Uri, headers: HeaderMap, body: Bytes) -> Response {
    handle_webhook(state.0, Step::Action, uri, headers, body).await
}

async fn action_request(
    state: State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    handle_webhook(state.0, Step::ActionRequest, uri, headers, body).await
}

async fn check_action_result(
    state: State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    handle_webhook(state.0, Step::CheckActionResult, uri, headers, body).await
}

async fn version(state: State<AppState>, uri: Uri, headers: HeaderMap, body: Bytes) -> Response {
    handle_webhook(state.0, Step::Version, uri, headers, body).await
}

/// Common path for every state-bearing callback.
async fn handle_webhook(
    state: AppState,
    step: Step,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let form: Vec<(String, String)> = serde_urlencoded::from_bytes(&body).unwrap_or_default();
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| step.path());

    // Authentication happens before any other work.
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    if !state.authenticator.validate(path_and_query, &form, signature) {
        warn!(step = ?step, "rejected unauthenticated callback");
        return StatusCode::FORBIDDEN.into_response();
    }

    let query: Vec<(String, String)> = uri
        .query()
        .and_then(|q| serde_urlencoded::from_str(q).ok())
        .unwrap_or_default();
    let ctx = CallContext::from_params(&query, &form);

    let document = document_or_apology(step, state.flow.handle(step, &ctx).await);
    Xml(document.to_xml()).into_response()
}

/// Map a flow outcome to the document spoken to the caller. The caller
/// always gets a closing message; a broken invariant goes to the log.
fn document_or_apology(step: Step, result: anyhow::Result<VoiceResponse>) -> VoiceResponse {
    match result {
        Ok(document) => document,
        Err(e) => {
            error!(step = ?step, "call flow failed: {:#}", e);
            CallFlow::fallback_apology()
        }
    }
}

/// XML response body with the platform's expected content type.
struct Xml(String);

impl IntoResponse for Xml {
    fn into_response(self) -> Response {
        (
            [(header::CONTENT_TYPE, "application/xml")],
            self.0,
        )
            .into_response()
    }
}
