//! HTTP endpoint the gateway relay posts inbound chat events to.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::{FromRequestParts, State},
    http::{StatusCode, header, request::Parts},
    response::IntoResponse,
    routing::{get, post},
};
use serde::Serialize;
use technews_core::InboundEvent;
use technews_core::security::SecretValue;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

#[derive(Clone)]
pub struct IngressState {
    events: mpsc::Sender<InboundEvent>,
    token: Arc<SecretValue>,
}

impl IngressState {
    pub fn new(events: mpsc::Sender<InboundEvent>, token: SecretValue) -> Self {
        Self {
            events,
            token: Arc::new(token),
        }
    }
}

pub fn ingress_router(state: IngressState) -> Router {
    Router::new()
        .route("/health/live", get(live))
        .route("/events", post(accept_event))
        .with_state(state)
}

/// Bind `addr` and serve the router until `shutdown` resolves.
pub async fn spawn_ingress(
    addr: &str,
    state: IngressState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<JoinHandle<()>> {
    let listener = TcpListener::bind(addr).await?;
    info!(address = %listener.local_addr()?, "inbound event endpoint listening");

    let app = ingress_router(state);
    Ok(tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await
        {
            error!(error = %err, "inbound event endpoint stopped with error");
        }
    }))
}

#[derive(Serialize)]
struct Status {
    status: &'static str,
}

async fn live() -> Json<Status> {
    Json(Status { status: "ok" })
}

#[instrument(skip_all, fields(kind = event_kind(&event)))]
async fn accept_event(
    _: Authorized,
    State(state): State<IngressState>,
    Json(event): Json<InboundEvent>,
) -> Result<(StatusCode, Json<Status>), IngressError> {
    state.events.send(event).await.map_err(|_| {
        warn!("event dispatcher is gone; rejecting inbound event");
        IngressError::new(StatusCode::SERVICE_UNAVAILABLE, "dispatcher unavailable")
    })?;
    debug!("inbound event queued");
    Ok((StatusCode::ACCEPTED, Json(Status { status: "accepted" })))
}

fn event_kind(event: &InboundEvent) -> &'static str {
    match event {
        InboundEvent::Message(_) => "message",
        InboundEvent::Command(_) => "command",
    }
}

/// Rejects requests whose bearer token does not match the configured one.
struct Authorized;

#[async_trait]
impl FromRequestParts<IngressState> for Authorized {
    type Rejection = IngressError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &IngressState,
    ) -> Result<Self, Self::Rejection> {
        let provided = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim);

        match provided {
            Some(token) if token == state.token.expose() => Ok(Authorized),
            _ => Err(IngressError::new(
                StatusCode::UNAUTHORIZED,
                "invalid auth token",
            )),
        }
    }
}

#[derive(Debug)]
pub struct IngressError {
    status: StatusCode,
    message: String,
}

impl IngressError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for IngressError {
    fn into_response(self) -> axum::response::Response {
        let payload = ErrorResponse {
            error: self.message,
        };
        (self.status, Json(payload)).into_response()
    }
}

impl fmt::Display for IngressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for IngressError {}
