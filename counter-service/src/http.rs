//! HTTP surface: `POST /track` and `GET /count`.
//!
//! Everything else, including the wrong method on a known path, is a 404.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, rejection::QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

use crate::{
    audit::AuditSink,
    store::{KeyValueStore, StoreClient},
    track::TrackRequest,
};

/// Store key holding the aggregate count.
pub const COUNTER_KEY: &str = "count";

/// Body sent when the counter cannot be read.
pub const COUNT_UNAVAILABLE: &str = "Oops... Try again later!";

struct AppState<S> {
    store: StoreClient<S>,
    sink: Arc<AuditSink>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            sink: Arc::clone(&self.sink),
        }
    }
}

pub fn router<S: KeyValueStore>(store: StoreClient<S>, sink: Arc<AuditSink>) -> Router {
    Router::new()
        .route("/track", post(track::<S>).fallback(not_found))
        .route("/count", get(count::<S>).fallback(not_found))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { store, sink })
}

async fn track<S: KeyValueStore>(
    State(state): State<AppState<S>>,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> StatusCode {
    let params = match query {
        Ok(Query(params)) => params,
        Err(rejection) => {
            debug!(%rejection, "unreadable track query, recording it as empty");
            Vec::new()
        }
    };
    let request = TrackRequest::new(params);

    if let Err(err) = state.sink.append(&request.audit_record()) {
        warn!(error = %err, "failed to record track request");
    }

    match request.increment() {
        Some(delta) => state.store.increment(COUNTER_KEY, delta),
        None => debug!(count = ?request.raw_count(), "ignoring track request without a usable count"),
    }

    // Acknowledge receipt only; the store write lands on its own.
    StatusCode::OK
}

async fn count<S: KeyValueStore>(State(state): State<AppState<S>>) -> Response {
    match state.store.get(COUNTER_KEY).await {
        Ok(value) => (StatusCode::OK, value.unwrap_or(0).to_string()).into_response(),
        Err(err) => {
            error!(error = %err, "error retrieving counter from store");
            (StatusCode::INTERNAL_SERVER_ERROR, COUNT_UNAVAILABLE).into_response()
        }
    }
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}
