//! HTTP and realtime handlers for the Tourney server.
//!
//! The server holds the single persisted snapshot. Writes arrive over HTTP;
//! every accepted write is pushed to authenticated WebSocket clients.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        DefaultBodyLimit, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tourney_core::{bracket, MemoryStore, StoreChange};
use tourney_protocol::{codec, Event, TournamentSnapshot};
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// The persisted tournament.
    pub store: MemoryStore,
    /// Server configuration.
    pub config: Config,
    next_connection: AtomicU64,
}

impl AppState {
    /// Create new app state with an empty store.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            store: MemoryStore::new(),
            config,
            next_connection: AtomicU64::new(1),
        }
    }

    fn next_connection_id(&self) -> String {
        format!("conn_{}", self.next_connection.fetch_add(1, Ordering::Relaxed))
    }
}

/// HTTP API errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The posted snapshot violates bracket invariants.
    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::InvalidSnapshot(_) => StatusCode::UNPROCESSABLE_ENTITY,
        };
        (
            status,
            Json(serde_json::json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}

/// Build the application router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let ws_path = state.config.transport.websocket_path.clone();
    let body_limit = state.config.limits.max_message_size;

    Router::new()
        .route("/tournament", get(get_tournament).post(save_tournament))
        .route("/tournament/reset", post(reset_tournament))
        .route("/health", get(health_handler))
        .route(&ws_path, get(ws_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Run the HTTP/WebSocket server until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    if config.admins.is_empty() {
        warn!("No admins configured; nobody will be reported as an editor");
    }

    let addr = config.bind_addr()?;
    let ws_path = config.transport.websocket_path.clone();
    let app = build_router(Arc::new(AppState::new(config)));
    let listener = TcpListener::bind(addr).await?;

    info!("Tourney server listening on {}", addr);
    info!("WebSocket endpoint: ws://{}{}", addr, ws_path);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Tourney server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// `GET /tournament`: the snapshot, or `null`.
async fn get_tournament(State(state): State<Arc<AppState>>) -> Json<Option<TournamentSnapshot>> {
    Json(state.store.get())
}

/// `POST /tournament`: replace the snapshot.
async fn save_tournament(
    State(state): State<Arc<AppState>>,
    Json(snapshot): Json<TournamentSnapshot>,
) -> Result<StatusCode, ApiError> {
    let start = Instant::now();

    if let Err(e) = check_snapshot(&snapshot) {
        warn!(error = %e, "Rejected snapshot");
        metrics::record_error("invalid_snapshot");
        return Err(e);
    }

    let last_updated = snapshot.last_updated;
    let listeners = state.store.set(snapshot);
    metrics::record_snapshot_write("save", start.elapsed().as_secs_f64());
    debug!(last_updated, listeners, "Snapshot saved");

    Ok(StatusCode::OK)
}

/// `POST /tournament/reset`: drop the snapshot.
async fn reset_tournament(State(state): State<Arc<AppState>>) -> StatusCode {
    let start = Instant::now();
    let listeners = state.store.remove();
    metrics::record_snapshot_write("reset", start.elapsed().as_secs_f64());
    info!(listeners, "Tournament reset");
    StatusCode::OK
}

fn check_snapshot(snapshot: &TournamentSnapshot) -> Result<(), ApiError> {
    bracket::validate(&snapshot.bracket).map_err(|e| ApiError::InvalidSnapshot(e.to_string()))?;

    if snapshot.size != snapshot.bracket.size {
        return Err(ApiError::InvalidSnapshot(format!(
            "size {} does not match bracket size {}",
            snapshot.size, snapshot.bracket.size
        )));
    }
    if snapshot.champion != snapshot.bracket.champion {
        return Err(ApiError::InvalidSnapshot(
            "champion does not match bracket".to_string(),
        ));
    }
    Ok(())
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.max_message_size(state.config.limits.max_message_size)
        .on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle a WebSocket connection.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) {
    let _metrics_guard = ConnectionMetricsGuard::new();
    let connection_id = state.next_connection_id();

    debug!(connection = %connection_id, "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();

    let auth = tokio::time::timeout(
        state.config.transport.auth_timeout(),
        await_auth(&mut receiver),
    )
    .await;
    let user_id = match auth {
        Ok(Ok(user_id)) => user_id,
        Ok(Err(reason)) => {
            reject(&mut sender, &connection_id, reason).await;
            return;
        }
        Err(_) => {
            reject(&mut sender, &connection_id, "Authentication timed out".to_string()).await;
            return;
        }
    };

    let admin = state.config.admins.is_admin(&user_id);
    info!(connection = %connection_id, user = %user_id, admin, "Authenticated");

    // Subscribe before reading the current snapshot so no write is missed.
    let mut changes = state.store.subscribe();

    if send_event(&mut sender, &Event::authenticated(&user_id, admin))
        .await
        .is_err()
    {
        return;
    }
    if let Some(snapshot) = state.store.get() {
        if send_event(&mut sender, &Event::tournament_updated(snapshot))
            .await
            .is_err()
        {
            return;
        }
    }

    loop {
        tokio::select! {
            change = changes.recv() => {
                let event = match change {
                    Ok(StoreChange::Saved(snapshot)) => Event::tournament_updated(snapshot),
                    Ok(StoreChange::Cleared) => Event::TournamentReset,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(connection = %connection_id, skipped, "Client lagged; sending current state");
                        current_event(&state)
                    }
                    Err(RecvError::Closed) => break,
                };
                if let Err(e) = send_event(&mut sender, &event).await {
                    debug!(connection = %connection_id, error = %e, "Send failed");
                    break;
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => handle_text(&connection_id, &text),
                    Some(Ok(Message::Binary(data))) => {
                        debug!(connection = %connection_id, size = data.len(), "Ignoring binary frame");
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(connection = %connection_id, "WebSocket closed by client");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                }
            }
        }
    }

    debug!(connection = %connection_id, user = %user_id, "WebSocket disconnected");
}

/// Wait for the first text frame and require it to be `auth`.
async fn await_auth(receiver: &mut SplitStream<WebSocket>) -> Result<String, String> {
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                metrics::record_event(text.len(), "inbound");
                return match codec::decode(&text) {
                    Ok(Event::Auth { user_id }) if !user_id.trim().is_empty() => Ok(user_id),
                    Ok(Event::Auth { .. }) => Err("Missing user id".to_string()),
                    Ok(other) => Err(format!("Expected auth, got {}", other.type_name())),
                    Err(e) => Err(format!("Malformed auth frame: {e}")),
                };
            }
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }
    Err("Connection closed before auth".to_string())
}

async fn reject(sender: &mut SplitSink<WebSocket, Message>, connection_id: &str, reason: String) {
    warn!(connection = %connection_id, %reason, "Rejecting connection");
    metrics::record_error("auth");

    if let Err(e) = send_event(sender, &Event::error(reason)).await {
        debug!(connection = %connection_id, error = %e, "Could not deliver rejection");
    }
    if let Err(e) = sender.close().await {
        debug!(connection = %connection_id, error = %e, "Close failed");
    }
}

/// Inbound traffic after auth carries nothing the server acts on.
fn handle_text(connection_id: &str, text: &str) {
    metrics::record_event(text.len(), "inbound");

    match codec::decode(text) {
        Ok(event) => {
            debug!(connection = %connection_id, event_type = %event.type_name(), "Ignoring client event");
        }
        Err(e) => {
            warn!(connection = %connection_id, error = %e, "Dropping malformed event");
            metrics::record_error("decode");
        }
    }
}

fn current_event(state: &AppState) -> Event {
    match state.store.get() {
        Some(snapshot) => Event::tournament_updated(snapshot),
        None => Event::TournamentReset,
    }
}

/// Send an event to the WebSocket.
async fn send_event(sender: &mut SplitSink<WebSocket, Message>, event: &Event) -> Result<()> {
    let text = codec::encode(event)?;
    metrics::record_event(text.len(), "outbound");
    sender.send(Message::Text(text)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tourney_core::{
        bracket::SlotField, AdminPolicy, EventDispatcher, Role, SyncConfig, SyncCoordinator,
    };
    use tourney_protocol::{BracketSize, EventKind, Slot};
    use tourney_transport::{
        Connector, ConnectionSession, HttpStore, SessionConfig, SessionState, WebSocketConnector,
    };
    use tower::ServiceExt;

    fn test_config() -> Config {
        Config {
            admins: AdminPolicy::new(["alice"]),
            ..Config::default()
        }
    }

    fn snapshot(size: u32) -> TournamentSnapshot {
        TournamentSnapshot::new(bracket::initialize(size).unwrap(), 7)
    }

    async fn request(app: Router, method: &str, uri: &str, body: Option<String>) -> (StatusCode, String) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    async fn spawn_server(config: Config) -> (SocketAddr, Arc<AppState>) {
        let state = Arc::new(AppState::new(config));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = build_router(Arc::clone(&state));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (addr, state)
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        for _ in 0..250 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("condition not met within 5s");
    }

    #[tokio::test]
    async fn test_health() {
        let app = build_router(Arc::new(AppState::new(test_config())));
        let (status, body) = request(app, "GET", "/health", None).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("\"status\":\"ok\""));
    }

    #[tokio::test]
    async fn test_snapshot_lifecycle() {
        let state = Arc::new(AppState::new(test_config()));
        let app = build_router(Arc::clone(&state));
        let mut changes = state.store.subscribe();

        let (status, body) = request(app.clone(), "GET", "/tournament", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "null");

        let json = serde_json::to_string(&snapshot(8)).unwrap();
        let (status, _) = request(app.clone(), "POST", "/tournament", Some(json)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(changes.recv().await.unwrap(), StoreChange::Saved(snapshot(8)));

        let (_, body) = request(app.clone(), "GET", "/tournament", None).await;
        let loaded: Option<TournamentSnapshot> = serde_json::from_str(&body).unwrap();
        assert_eq!(loaded, Some(snapshot(8)));

        let (status, _) = request(app.clone(), "POST", "/tournament/reset", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(changes.recv().await.unwrap(), StoreChange::Cleared);

        let (_, body) = request(app, "GET", "/tournament", None).await;
        assert_eq!(body, "null");
    }

    #[tokio::test]
    async fn test_invalid_snapshot_is_rejected() {
        let state = Arc::new(AppState::new(test_config()));
        let app = build_router(Arc::clone(&state));

        let mut completed_without_winner = snapshot(4);
        completed_without_winner.bracket.rounds[0].matches[0].completed = true;
        let json = serde_json::to_string(&completed_without_winner).unwrap();
        let (status, body) = request(app.clone(), "POST", "/tournament", Some(json)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body.contains("Invalid snapshot"));

        let mut wrong_size = snapshot(4);
        wrong_size.size = BracketSize::Sixteen;
        let json = serde_json::to_string(&wrong_size).unwrap();
        let (status, _) = request(app.clone(), "POST", "/tournament", Some(json)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = request(app, "POST", "/tournament", Some("{\"size\":5}".into())).await;
        assert!(status.is_client_error());
        assert!(state.store.get().is_none());
    }

    #[tokio::test]
    async fn test_session_receives_pushed_snapshots() {
        let (addr, state) = spawn_server(test_config()).await;

        let dispatcher = Arc::new(EventDispatcher::new());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        dispatcher.subscribe(EventKind::TournamentUpdated, move |event| {
            if let Event::TournamentUpdated { snapshot } = event {
                let _ = tx.send(snapshot.clone());
            }
        });

        let session = ConnectionSession::new(
            Arc::new(WebSocketConnector::default()),
            dispatcher,
            SessionConfig {
                url: format!("ws://{addr}/ws"),
                ..SessionConfig::default()
            },
        );
        session.connect("alice");
        eventually(|| session.is_admin() == Some(true)).await;

        state.store.set(snapshot(16));
        let pushed = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pushed, snapshot(16));

        session.close();
        session.join().await;
    }

    #[tokio::test]
    async fn test_blank_user_is_rejected() {
        let (addr, _) = spawn_server(test_config()).await;

        let session = ConnectionSession::new(
            Arc::new(WebSocketConnector::default()),
            Arc::new(EventDispatcher::new()),
            SessionConfig {
                url: format!("ws://{addr}/ws"),
                ..SessionConfig::default()
            },
        );
        session.connect("  ");
        eventually(|| session.is_closed()).await;

        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.last_error().as_deref(), Some("Missing user id"));
    }

    #[tokio::test]
    async fn test_silent_socket_times_out() {
        let config = Config {
            transport: crate::config::TransportConfig {
                auth_timeout_ms: 100,
                ..Default::default()
            },
            ..test_config()
        };
        let (addr, _) = spawn_server(config).await;

        let mut conn = WebSocketConnector::default()
            .connect(&format!("ws://{addr}/ws"))
            .await
            .map_err(|e| e.to_string())
            .unwrap();
        let event = tokio::time::timeout(Duration::from_secs(5), conn.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, Some(Event::error("Authentication timed out")));
    }

    #[tokio::test]
    async fn test_coordinators_sync_over_http() {
        let (addr, state) = spawn_server(test_config()).await;
        let base = format!("http://{addr}");
        let config = SyncConfig {
            debounce_ms: 50,
            ..SyncConfig::default()
        };

        let admin = SyncCoordinator::new(
            Role::Admin,
            Arc::new(HttpStore::new(&base).unwrap()),
            config.clone(),
        );
        admin.bootstrap().await.unwrap();
        assert_eq!(state.store.get().unwrap().size, BracketSize::Eight);

        admin
            .record_slot("Round 1", 0, Slot::Player1, SlotField::Name("Alice".into()))
            .unwrap();
        eventually(|| {
            state
                .store
                .get()
                .and_then(|s| s.bracket.match_at("Round 1", 0).map(|m| m.player1.name.clone()))
                .as_deref()
                == Some("Alice")
        })
        .await;

        let viewer = SyncCoordinator::new(Role::Viewer, Arc::new(HttpStore::new(&base).unwrap()), config);
        assert!(viewer.poll_once().await.unwrap());
        assert!(!viewer.poll_once().await.unwrap());
        assert_eq!(viewer.snapshot(), state.store.get());

        admin.shutdown();
    }
}
