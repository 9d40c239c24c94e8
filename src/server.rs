//! HTTP surface
//!
//! axum router exposing the browser client, the WebSocket upgrade and the
//! two administrative room routes:
//!
//! - `GET /`: the chat page
//! - `GET /static/{*path}`: the page's script
//! - `GET /ws`: upgrade; the socket becomes a new connection
//! - `POST /room/{name}`: create a room (`201`, or `409` if taken)
//! - `GET /rooms`: JSON array of room names

use std::sync::Arc;

use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tracing::info;

use crate::config::Config;
use crate::error::{AppError, RegistryError};
use crate::handler::handle_socket;
use crate::registry::Registry;
use crate::types::RoomName;

const INDEX_HTML: &str = include_str!("../web/templates/index.html");
const MAIN_JS: &str = include_str!("../web/static/js/main.js");

/// State shared with every request handler
#[derive(Debug, Clone)]
pub struct AppState {
    pub registry: Registry,
    pub config: Arc<Config>,
}

impl AppState {
    /// Fresh state with an empty registry built from `config`
    pub fn new(config: Config) -> Self {
        Self {
            registry: Registry::new(config.room),
            config: Arc::new(config),
        }
    }
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        match self {
            RegistryError::AlreadyExists(_) => {
                (StatusCode::CONFLICT, "Room already exists").into_response()
            }
        }
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/static/{*path}", get(static_asset))
        .route("/ws", get(ws_upgrade))
        .route("/room/{name}", post(create_room))
        .route("/rooms", get(list_rooms))
        .with_state(state)
}

/// Serve the router on an already bound listener
pub async fn serve(listener: TcpListener, state: AppState) -> Result<(), AppError> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn static_asset(Path(path): Path<String>) -> Response {
    match path.as_str() {
        "js/main.js" => ([(header::CONTENT_TYPE, "text/javascript")], MAIN_JS).into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let capacity = state.config.mailbox_capacity;
    ws.on_upgrade(move |socket| handle_socket(socket, state.registry, capacity))
}

async fn create_room(
    Path(name): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, RegistryError> {
    info!("Received request to create room: {}", name);
    state.registry.create(&RoomName::from(name)).await?;
    Ok((StatusCode::CREATED, "Room created successfully"))
}

async fn list_rooms(State(state): State<AppState>) -> Json<Vec<RoomName>> {
    Json(state.registry.list().await)
}
