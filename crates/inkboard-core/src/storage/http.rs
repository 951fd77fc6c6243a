//! HTTP client for the board server.

use super::{BoardDocument, BoardStore, BoxFuture, StorageError, StorageResult};
use crate::marks::Mark;
use crate::transfer::marks_from_value;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use url::Url;

/// Board entry in a workspace listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardSummary {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Workspace with its boards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub boards: Vec<BoardSummary>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FetchedBoard {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: Value,
    #[serde(default)]
    workspace_id: Option<String>,
}

#[derive(Deserialize)]
struct WorkspaceList {
    workspaces: Vec<WorkspaceSummary>,
}

#[derive(Deserialize)]
struct CreatedWorkspace {
    workspace: WorkspaceSummary,
}

#[derive(Deserialize)]
struct CreatedBoard {
    board: BoardSummary,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Board store backed by the board server's REST API.
#[derive(Debug, Clone)]
pub struct HttpBoardStore {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpBoardStore {
    pub fn new(base_url: Url, token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url,
            token,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> StorageResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StorageError::Other(format!("Invalid base URL: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> StorageResult<Response> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))?;
        check_status(response, what).await
    }

    /// List the caller's workspaces, bootstrapping one on first use.
    pub async fn list_workspaces(&self) -> StorageResult<Vec<WorkspaceSummary>> {
        let url = self.endpoint(&["workspaces"])?;
        let response = self.send(self.client.get(url), "workspaces").await?;
        Ok(decode::<WorkspaceList>(response).await?.workspaces)
    }

    pub async fn create_workspace(&self, name: &str) -> StorageResult<WorkspaceSummary> {
        let url = self.endpoint(&["workspaces"])?;
        let request = self.client.post(url).json(&json!({ "name": name }));
        let response = self.send(request, "workspace").await?;
        Ok(decode::<CreatedWorkspace>(response).await?.workspace)
    }

    /// Create an empty board inside a workspace.
    pub async fn create_board(&self, workspace_id: &str, name: &str) -> StorageResult<BoardSummary> {
        let url = self.endpoint(&["workspaces"])?;
        let request = self
            .client
            .post(url)
            .json(&json!({ "name": name, "workspaceId": workspace_id }));
        let response = self.send(request, workspace_id).await?;
        Ok(decode::<CreatedBoard>(response).await?.board)
    }
}

async fn check_status(response: Response, what: &str) -> StorageResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    match status {
        StatusCode::UNAUTHORIZED => Err(StorageError::Unauthorized),
        StatusCode::FORBIDDEN => Err(StorageError::Forbidden),
        StatusCode::NOT_FOUND => Err(StorageError::NotFound(what.to_string())),
        _ => {
            let message = match response.json::<ErrorBody>().await {
                Ok(body) => body.error,
                Err(_) => status.to_string(),
            };
            Err(StorageError::Other(format!("{} ({})", message, status.as_u16())))
        }
    }
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> StorageResult<T> {
    response
        .json::<T>()
        .await
        .map_err(|e| StorageError::Serialization(e.to_string()))
}

impl BoardStore for HttpBoardStore {
    fn fetch(&self, board_id: &str) -> BoxFuture<'_, StorageResult<BoardDocument>> {
        let board_id = board_id.to_string();
        Box::pin(async move {
            let url = self.endpoint(&["boards", &board_id])?;
            let response = self.send(self.client.get(url), &board_id).await?;
            let fetched = decode::<FetchedBoard>(response).await?;
            log::debug!("Fetched board {}", fetched.id);
            Ok(BoardDocument {
                id: fetched.id,
                title: fetched.title,
                content: marks_from_value(fetched.content),
                workspace_id: fetched.workspace_id,
            })
        })
    }

    fn save(&self, board_id: &str, content: &[Mark]) -> BoxFuture<'_, StorageResult<()>> {
        let board_id = board_id.to_string();
        let body = json!({ "content": content });
        Box::pin(async move {
            let url = self.endpoint(&["boards", &board_id, "save"])?;
            self.send(self.client.post(url).json(&body), &board_id).await?;
            Ok(())
        })
    }
}
