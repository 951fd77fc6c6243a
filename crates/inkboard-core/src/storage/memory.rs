//! In-memory board store.

use super::{BoardDocument, BoardStore, BoxFuture, StorageError, StorageResult};
use crate::marks::Mark;
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// In-memory store for testing and ephemeral use.
///
/// Can be switched offline to simulate an unreachable backend.
#[derive(Default)]
pub struct MemoryBoardStore {
    boards: RwLock<HashMap<String, BoardDocument>>,
    offline: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryBoardStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a board.
    pub fn insert(&self, document: BoardDocument) -> StorageResult<()> {
        let mut boards = self
            .boards
            .write()
            .map_err(|e| StorageError::Other(format!("Lock error: {}", e)))?;
        boards.insert(document.id.clone(), document);
        Ok(())
    }

    /// Current content of a board, if present.
    pub fn content(&self, board_id: &str) -> Option<Vec<Mark>> {
        let boards = self.boards.read().ok()?;
        boards.get(board_id).map(|doc| doc.content.clone())
    }

    /// Make every call fail with a transport error until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> StorageResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StorageError::Transport("store is offline".to_string()))
        } else {
            Ok(())
        }
    }
}

impl BoardStore for MemoryBoardStore {
    fn fetch(&self, board_id: &str) -> BoxFuture<'_, StorageResult<BoardDocument>> {
        let board_id = board_id.to_string();
        Box::pin(async move {
            self.check_online()?;
            let boards = self
                .boards
                .read()
                .map_err(|e| StorageError::Other(format!("Lock error: {}", e)))?;
            boards
                .get(&board_id)
                .cloned()
                .ok_or(StorageError::NotFound(board_id))
        })
    }

    fn save(&self, board_id: &str, content: &[Mark]) -> BoxFuture<'_, StorageResult<()>> {
        let board_id = board_id.to_string();
        let content = content.to_vec();
        Box::pin(async move {
            self.check_online()?;
            let mut boards = self
                .boards
                .write()
                .map_err(|e| StorageError::Other(format!("Lock error: {}", e)))?;
            boards
                .entry(board_id.clone())
                .or_insert_with(|| BoardDocument::new(board_id, Vec::new()))
                .content = content;
            self.saves.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}
