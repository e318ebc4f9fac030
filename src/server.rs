use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Path, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{
        Html, IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::get,
};
use futures::{Stream, StreamExt, stream};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::AppState;
use crate::chat::{Draft, MessageId, MessageRecord, SaveOutcome, Submission};
use crate::config::AppConfig;
use crate::error::ChatError;
use crate::render;
use crate::store;
use crate::sync::{LiveSync, ViewUpdate};

/// Page title.
const TITLE: &str = "Live Chat";

/// Start the Axum server with the provided configuration.
pub async fn start_server(config: Arc<AppConfig>) -> anyhow::Result<()> {
    let store = store::connect(&config.store).await?;
    let state = AppState::new(Arc::clone(&config), store);

    state.sync.start().await?;

    let app = build_router(state.clone());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.sync.stop().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Build the router over already wired state.
pub fn build_router(state: AppState) -> Router {
    // A year stands in for "no timeout" so the layer stack keeps one type.
    let timeout_duration = if state.config.resilience.timeout_disabled {
        Duration::from_secs(365 * 24 * 60 * 60)
    } else {
        Duration::from_secs(state.config.resilience.request_timeout_secs)
    };

    Router::new()
        .route("/", get(index))
        .route("/api/messages", get(list_messages).post(create_message))
        .route(
            "/api/messages/{id}",
            axum::routing::put(update_message).delete(delete_message),
        )
        .route("/messages/{id}/edit", get(edit_overlay))
        .route("/api/stream", get(stream_updates))
        .nest_service("/static", ServeDir::new(&state.config.server.static_dir))
        .layer(DefaultBodyLimit::max(64 * 1024))
        .layer(axum::middleware::from_fn(
            move |req: Request, next: Next| async move {
                // Only bounds the time to the response head; SSE bodies keep streaming.
                match tokio::time::timeout(timeout_duration, next.run(req)).await {
                    Ok(res) => res,
                    Err(_) => (StatusCode::REQUEST_TIMEOUT, "Request timed out").into_response(),
                }
            },
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// GET / - Page with the current message list.
async fn index(State(state): State<AppState>) -> Html<String> {
    Html(render::page::page(TITLE, &state.sync.render()))
}

/// GET /api/messages - All messages ordered by date.
async fn list_messages(
    State(state): State<AppState>,
) -> Result<Json<Vec<MessageRecord>>, ChatError> {
    Ok(Json(state.store.query_ordered().await?))
}

/// POST /api/messages - Submit a message.
async fn create_message(
    State(state): State<AppState>,
    Json(draft): Json<Draft>,
) -> Result<Response, ChatError> {
    match state.composer.submit(draft).await? {
        Submission::Sent(id) => Ok((StatusCode::CREATED, Json(json!({ "id": id }))).into_response()),
        Submission::Skipped => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

/// PUT /api/messages/{id} - Save an edited message.
async fn update_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(draft): Json<Draft>,
) -> Result<StatusCode, ChatError> {
    let id = MessageId::from(id);
    match state.editor.save(&id, draft).await? {
        SaveOutcome::Saved | SaveOutcome::Skipped => Ok(StatusCode::NO_CONTENT),
    }
}

/// DELETE /api/messages/{id} - Delete a message.
async fn delete_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ChatError> {
    let id = MessageId::from(id);
    state.store.delete(&id).await?;
    info!(name: "message.deleted", id = %id, "Message deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /messages/{id}/edit - Edit overlay for a rendered message.
async fn edit_overlay(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Html<String>, ChatError> {
    let id = MessageId::from(id);
    state
        .editor
        .open(&state.sync, &id)
        .map(|node| Html(node.to_html()))
        .ok_or(ChatError::NotFound(id))
}

/// GET /api/stream - Rendered view updates as SSE.
async fn stream_updates(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send> {
    let events = view_updates(Arc::clone(&state.sync)).map(|update| Ok(update.to_sse_event()));
    Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

/// Updates for one browser.
///
/// Starts with a `reset` of the current list; a client that falls behind
/// gets another `reset` instead of the updates it missed.
fn view_updates(sync: Arc<LiveSync>) -> impl Stream<Item = ViewUpdate> + Send {
    let (list, rx) = sync.snapshot();
    let initial = ViewUpdate::Reset {
        html: list.to_html(),
    };

    let live = BroadcastStream::new(rx).map(move |res| match res {
        Ok(update) => update,
        Err(err) => {
            debug!(error = %err, "SSE client lagged, sending a fresh list");
            ViewUpdate::Reset {
                html: sync.render().to_html(),
            }
        }
    });

    stream::once(async move { initial }).chain(live)
}
