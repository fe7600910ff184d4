//! chatwatch webhook receiver.
//!
//! Accepts the events the monitor posts (`/m`, `/ef`, `/alert`) and stores
//! them in a SQLite table. `GET /events?limit=N` returns the most recent ones.
//!
//! Usage: `chatwatch-receiver [db_path] [bind_addr]`
//! (defaults: `chatwatch-events.db`, `127.0.0.1:8720`).

use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{path::Path, sync::Arc};
use tokio::sync::Mutex;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

// ── Event kinds ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventKind {
    Outgoing,
    Incoming,
    Alert,
}

impl EventKind {
    /// JSON field carrying the message text
    fn field(self) -> &'static str {
        match self {
            EventKind::Alert => "alert",
            EventKind::Outgoing | EventKind::Incoming => "data",
        }
    }

    fn direction(self) -> &'static str {
        match self {
            EventKind::Outgoing => "outgoing",
            EventKind::Incoming => "incoming",
            EventKind::Alert => "alert",
        }
    }

    fn stored_message(self) -> &'static str {
        match self {
            EventKind::Alert => "Alert stored successfully",
            EventKind::Outgoing | EventKind::Incoming => "Event stored successfully",
        }
    }
}

// ── Storage ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, PartialEq)]
struct StoredEvent {
    id: String,
    chat_id: String,
    timestamp: String,
    direction: String,
    message: String,
}

#[derive(Clone)]
struct EventStore {
    conn: Arc<Mutex<Connection>>,
}

impl EventStore {
    fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let _: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        Self::run_migrations(&conn)?;
        info!("Event store initialized at: {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    #[cfg(test)]
    fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn run_migrations(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                chat_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                direction TEXT NOT NULL,
                message TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_events_chat_time
                ON events(chat_id, timestamp);
            ",
        )
        .context("Failed to run event store migrations")?;
        Ok(())
    }

    async fn insert(&self, chat_id: &str, kind: EventKind, message: &str) -> Result<StoredEvent> {
        let event = StoredEvent {
            id: Uuid::new_v4().to_string(),
            chat_id: chat_id.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
            direction: kind.direction().to_string(),
            message: message.to_string(),
        };

        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO events (id, chat_id, timestamp, direction, message)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                event.id,
                event.chat_id,
                event.timestamp,
                event.direction,
                event.message,
            ],
        )
        .context("Failed to insert event")?;

        Ok(event)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<StoredEvent>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT id, chat_id, timestamp, direction, message
                 FROM events ORDER BY timestamp DESC, rowid DESC LIMIT ?1",
            )
            .context("Failed to prepare events query")?;
        let events = stmt
            .query_map(rusqlite::params![limit as i64], |row| {
                Ok(StoredEvent {
                    id: row.get(0)?,
                    chat_id: row.get(1)?,
                    timestamp: row.get(2)?,
                    direction: row.get(3)?,
                    message: row.get(4)?,
                })
            })
            .context("Failed to query events")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to collect events")?;
        Ok(events)
    }
}

// ── Shared state ───────────────────────────────────────────────────────────────

#[derive(Clone)]
struct AppState {
    store: EventStore,
    chat_id: String,
}

// ── Handlers ───────────────────────────────────────────────────────────────────

fn reply(status: StatusCode, body: Value) -> (StatusCode, Json<Value>) {
    (status, Json(body))
}

/// Validate a posted body and store it. Shared by the three POST routes.
async fn store_event(state: &AppState, kind: EventKind, body: &str) -> (StatusCode, Json<Value>) {
    if body.trim().is_empty() {
        return reply(
            StatusCode::BAD_REQUEST,
            json!({ "error": "Request body is required" }),
        );
    }

    let parsed: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => {
            return reply(
                StatusCode::BAD_REQUEST,
                json!({ "error": "Request body must be JSON" }),
            )
        }
    };

    let Some(text) = parsed.get(kind.field()).and_then(Value::as_str) else {
        return reply(
            StatusCode::BAD_REQUEST,
            json!({ "error": format!("Missing '{}' field", kind.field()) }),
        );
    };

    match state.store.insert(&state.chat_id, kind, text).await {
        Ok(event) => {
            info!(direction = %event.direction, "Stored event: {}", event.message);
            reply(StatusCode::OK, json!({ "message": kind.stored_message() }))
        }
        Err(e) => {
            error!("Error processing {} event: {:#}", kind.direction(), e);
            reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "Internal server error" }),
            )
        }
    }
}

async fn receive_outgoing(State(state): State<AppState>, body: String) -> (StatusCode, Json<Value>) {
    store_event(&state, EventKind::Outgoing, &body).await
}

async fn receive_incoming(State(state): State<AppState>, body: String) -> (StatusCode, Json<Value>) {
    store_event(&state, EventKind::Incoming, &body).await
}

async fn receive_alert(State(state): State<AppState>, body: String) -> (StatusCode, Json<Value>) {
    store_event(&state, EventKind::Alert, &body).await
}

#[derive(Deserialize)]
struct EventsQuery {
    limit: Option<usize>,
}

async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<Vec<StoredEvent>>, StatusCode> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    state.store.recent(limit).await.map(Json).map_err(|e| {
        error!("Failed to list events: {:#}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/m", post(receive_outgoing))
        .route("/ef", post(receive_incoming))
        .route("/alert", post(receive_alert))
        .route("/events", get(list_events))
        .with_state(state)
}

// ── Entry point ────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,chatwatch_receiver=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let db_path = args
        .get(1)
        .cloned()
        .unwrap_or_else(|| "chatwatch-events.db".to_string());
    let addr = args
        .get(2)
        .cloned()
        .unwrap_or_else(|| "127.0.0.1:8720".to_string());
    let chat_id = std::env::var("CHATWATCH_CHAT_ID").unwrap_or_else(|_| "default".to_string());

    let store = EventStore::open(Path::new(&db_path))?;
    let app = router(AppState { store, chat_id });

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!("Webhook receiver listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("Server error")?;

    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────────────────────
