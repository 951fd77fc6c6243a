//! Inkboard board server
//!
//! Stores whiteboard boards and the workspaces that group them. Board content
//! is an opaque JSON array of marks, replaced wholesale on every save.
//!
//! ## Routes
//!
//! ```text
//! GET  /health
//! GET  /boards/{id}          -> { id, title, content, workspaceId }
//! POST /boards/{id}/save     { content }            -> { success: true }
//! GET  /workspaces           -> { workspaces: [...] }
//! POST /workspaces           { name }               -> { workspace }
//! POST /workspaces           { name, workspaceId }  -> { board }
//! ```
//!
//! Every route except `/health` requires `Authorization: Bearer <token>`.

pub mod config;

use axum::{
    Json, Router,
    extract::{FromRequestParts, Path, State, rejection::JsonRejection},
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{SecondsFormat, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

pub use config::ServerConfig;

const DEFAULT_WORKSPACE_NAME: &str = "My Workspace";
const DEFAULT_BOARD_TITLE: &str = "Untitled Board";

/// Errors returned by the API as `{"error": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Forbidden")]
    Forbidden,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A stored board.
#[derive(Debug, Clone)]
pub struct Board {
    pub id: String,
    pub title: String,
    pub content: Value,
    pub workspace_id: String,
    pub owner_id: String,
    pub updated_at: String,
    order: u64,
}

/// A workspace and its members.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub members: HashSet<String>,
    order: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BoardSummary {
    id: String,
    title: String,
    updated_at: String,
}

#[derive(Debug, Serialize)]
struct WorkspaceSummary {
    id: String,
    name: String,
    boards: Vec<BoardSummary>,
}

/// Shared application state.
#[derive(Default)]
pub struct AppState {
    boards: DashMap<String, Board>,
    workspaces: DashMap<String, Workspace>,
    /// Bearer token to user id.
    sessions: DashMap<String, String>,
    counter: AtomicU64,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        let state = Self::new();
        for (token, user) in &config.sessions {
            state.add_session(token, user);
        }
        state
    }

    /// Register a bearer token for a user.
    pub fn add_session(&self, token: &str, user_id: &str) {
        self.sessions.insert(token.to_string(), user_id.to_string());
    }

    fn next_order(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }

    /// Create a workspace owned by `owner_id`.
    pub fn create_workspace(&self, name: &str, owner_id: &str) -> Workspace {
        let workspace = Workspace {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            owner_id: owner_id.to_string(),
            members: HashSet::from([owner_id.to_string()]),
            order: self.next_order(),
        };
        self.workspaces.insert(workspace.id.clone(), workspace.clone());
        workspace
    }

    /// Add a member to an existing workspace.
    pub fn add_member(&self, workspace_id: &str, user_id: &str) -> bool {
        match self.workspaces.get_mut(workspace_id) {
            Some(mut workspace) => {
                workspace.members.insert(user_id.to_string());
                true
            }
            None => false,
        }
    }

    /// Create an empty board inside a workspace.
    pub fn create_board(&self, workspace_id: &str, title: &str, owner_id: &str) -> Board {
        let board = Board {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            content: Value::Array(Vec::new()),
            workspace_id: workspace_id.to_string(),
            owner_id: owner_id.to_string(),
            updated_at: now_rfc3339(),
            order: self.next_order(),
        };
        self.boards.insert(board.id.clone(), board.clone());
        board
    }

    pub fn board(&self, board_id: &str) -> Option<Board> {
        self.boards.get(board_id).map(|b| b.clone())
    }

    fn user_for_token(&self, token: &str) -> Option<String> {
        self.sessions.get(token).map(|u| u.clone())
    }

    fn is_member(&self, workspace_id: &str, user_id: &str) -> bool {
        self.workspaces
            .get(workspace_id)
            .is_some_and(|w| w.members.contains(user_id))
    }

    /// Fetch a board the user may access.
    fn accessible_board(&self, board_id: &str, user_id: &str) -> ApiResult<Board> {
        let board = self.board(board_id).ok_or(ApiError::NotFound("Board"))?;
        if board.owner_id != user_id && !self.is_member(&board.workspace_id, user_id) {
            return Err(ApiError::Forbidden);
        }
        Ok(board)
    }

    fn workspaces_for(&self, user_id: &str) -> Vec<Workspace> {
        let mut workspaces: Vec<Workspace> = self
            .workspaces
            .iter()
            .filter(|w| w.members.contains(user_id))
            .map(|w| w.clone())
            .collect();
        workspaces.sort_by_key(|w| w.order);
        workspaces
    }

    fn summarize(&self, workspace: Workspace) -> WorkspaceSummary {
        let mut boards: Vec<Board> = self
            .boards
            .iter()
            .filter(|b| b.workspace_id == workspace.id)
            .map(|b| b.clone())
            .collect();
        boards.sort_by_key(|b| b.order);
        WorkspaceSummary {
            id: workspace.id,
            name: workspace.name,
            boards: boards
                .into_iter()
                .map(|b| BoardSummary {
                    id: b.id,
                    title: b.title,
                    updated_at: b.updated_at,
                })
                .collect(),
        }
    }
}

/// The authenticated caller.
#[derive(Debug, Clone)]
pub struct AuthUser(pub String);

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .ok_or(ApiError::Unauthorized)?;
        state
            .user_for_token(token)
            .map(AuthUser)
            .ok_or(ApiError::Unauthorized)
    }
}

#[derive(Debug, Deserialize)]
struct SaveBody {
    content: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateBody {
    name: String,
    #[serde(default)]
    workspace_id: Option<String>,
}

async fn health() -> &'static str {
    "ok"
}

async fn get_board(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(board_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let board = state.accessible_board(&board_id, &user)?;
    Ok(Json(json!({
        "id": board.id,
        "title": board.title,
        "content": board.content,
        "workspaceId": board.workspace_id,
    })))
}

async fn save_board(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(board_id): Path<String>,
    body: Result<Json<SaveBody>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    state.accessible_board(&board_id, &user)?;
    let Json(SaveBody { content }) = body?;
    let Value::Array(marks) = content else {
        return Err(ApiError::BadRequest("content must be an array".to_string()));
    };
    let count = marks.len();
    match state.boards.get_mut(&board_id) {
        Some(mut board) => {
            board.content = Value::Array(marks);
            board.updated_at = now_rfc3339();
        }
        None => return Err(ApiError::NotFound("Board")),
    }
    info!("Saved board {} ({} marks) for {}", board_id, count, user);
    Ok(Json(json!({ "success": true })))
}

async fn list_workspaces(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<Value>> {
    let mut workspaces = state.workspaces_for(&user);
    if workspaces.is_empty() {
        let workspace = state.create_workspace(DEFAULT_WORKSPACE_NAME, &user);
        state.create_board(&workspace.id, DEFAULT_BOARD_TITLE, &user);
        info!("Bootstrapped workspace {} for {}", workspace.id, user);
        workspaces.push(workspace);
    }
    let summaries: Vec<WorkspaceSummary> = workspaces
        .into_iter()
        .map(|w| state.summarize(w))
        .collect();
    Ok(Json(json!({ "workspaces": summaries })))
}

async fn create(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    body: Result<Json<CreateBody>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(CreateBody { name, workspace_id }) = body?;
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Name is required".to_string()));
    }
    match workspace_id {
        Some(workspace_id) => {
            if !state.workspaces.contains_key(&workspace_id) {
                return Err(ApiError::NotFound("Workspace"));
            }
            if !state.is_member(&workspace_id, &user) {
                warn!("{} tried to add a board to workspace {}", user, workspace_id);
                return Err(ApiError::Forbidden);
            }
            let board = state.create_board(&workspace_id, name, &user);
            info!("Created board {} in workspace {}", board.id, workspace_id);
            Ok(Json(json!({
                "board": {
                    "id": board.id,
                    "title": board.title,
                    "updatedAt": board.updated_at,
                    "workspaceId": board.workspace_id,
                }
            })))
        }
        None => {
            let workspace = state.create_workspace(name, &user);
            info!("Created workspace {} for {}", workspace.id, user);
            Ok(Json(json!({ "workspace": state.summarize(workspace) })))
        }
    }
}

/// Build the HTTP router over shared state.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/boards/{board_id}", get(get_board))
        .route("/boards/{board_id}/save", post(save_board))
        .route("/workspaces", get(list_workspaces).post(create))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
