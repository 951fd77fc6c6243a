//! Storage abstraction for board persistence.

mod file;
mod http;
mod memory;

pub use file::DraftStore;
pub use http::{BoardSummary, HttpBoardStore, WorkspaceSummary};
pub use memory::MemoryBoardStore;

use crate::marks::Mark;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Storage errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Not signed in")]
    Unauthorized,
    #[error("Access to this board is forbidden")]
    Forbidden,
    #[error("Board not found: {0}")]
    NotFound(String),
    #[error("Network error: {0}")]
    Transport(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Storage error: {0}")]
    Other(String),
}

impl StorageError {
    /// Whether retrying the same call later might succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StorageError::Transport(_) | StorageError::Io(_) | StorageError::Other(_)
        )
    }

    /// Authentication or authorization failure.
    pub fn is_auth(&self) -> bool {
        matches!(self, StorageError::Unauthorized | StorageError::Forbidden)
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Boxed future for storage calls.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A board as returned by a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardDocument {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: Vec<Mark>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
}

impl BoardDocument {
    pub fn new(id: impl Into<String>, content: Vec<Mark>) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            content,
            workspace_id: None,
        }
    }
}

/// A backend that can fetch and fully replace a board's content.
pub trait BoardStore: Send + Sync {
    /// Fetch a board.
    fn fetch(&self, board_id: &str) -> BoxFuture<'_, StorageResult<BoardDocument>>;

    /// Replace a board's content.
    fn save(&self, board_id: &str, content: &[Mark]) -> BoxFuture<'_, StorageResult<()>>;
}

#[cfg(test)]
pub(crate) fn block_on<F: Future>(f: F) -> F::Output {
    use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

    fn dummy_raw_waker() -> RawWaker {
        fn no_op(_: *const ()) {}
        fn clone(_: *const ()) -> RawWaker {
            dummy_raw_waker()
        }
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, no_op, no_op, no_op);
        RawWaker::new(std::ptr::null(), &VTABLE)
    }

    let waker = unsafe { Waker::from_raw(dummy_raw_waker()) };
    let mut cx = Context::from_waker(&waker);
    let mut f = std::pin::pin!(f);

    loop {
        if let Poll::Ready(result) = f.as_mut().poll(&mut cx) {
            return result;
        }
    }
}
