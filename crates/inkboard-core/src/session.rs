//! One open board: local state, autosave and the load/save lifecycle.

use crate::board::Board;
use crate::config::ClientConfig;
use crate::marks::Mark;
use crate::storage::{BoardDocument, BoardStore, DraftStore, HttpBoardStore, StorageError, StorageResult};
use crate::sync::{AutoSaver, SaveRequest, SaveStatus, StoreTarget, SyncCommand, SyncEvent, SyncWorker};
use crate::transfer::{ImportReport, TransferResult, export_json, import_json};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

/// Progress of the initial fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    Loading,
    Loaded,
    /// The remote copy could not be fetched. Remote saves are suspended.
    Failed(StorageError),
}

/// Drives a [`Board`] against its stores.
///
/// Call [`BoardSession::tick`] regularly from the UI thread.
pub struct BoardSession {
    board: Board,
    saver: AutoSaver,
    worker: SyncWorker,
    load_state: LoadState,
    has_drafts: bool,
    draft_restored: bool,
    seen_revision: u64,
    title: String,
    workspace_id: Option<String>,
    closed: bool,
}

impl BoardSession {
    /// Open a board and start fetching it.
    pub fn open(
        board_id: &str,
        remote: Arc<dyn BoardStore>,
        drafts: Option<Arc<dyn BoardStore>>,
        config: &ClientConfig,
    ) -> StorageResult<Self> {
        let has_drafts = drafts.is_some();
        let worker = SyncWorker::spawn(remote, drafts)?;
        let board = Board::with_history_limit(board_id, config.history_limit);
        let saver = AutoSaver::with_timing(board_id, config.save_debounce(), config.saved_display());
        let mut session = Self {
            seen_revision: board.content_revision(),
            board,
            saver,
            worker,
            load_state: LoadState::Loading,
            has_drafts,
            draft_restored: false,
            title: String::new(),
            workspace_id: None,
            closed: false,
        };
        session.fetch(StoreTarget::Remote);
        log::info!("Opening board {board_id}");
        Ok(session)
    }

    /// Open a board against the server and draft directory named by `config`.
    pub fn connect(board_id: &str, config: &ClientConfig) -> StorageResult<Self> {
        let remote: Arc<dyn BoardStore> = Arc::new(HttpBoardStore::new(
            config.api_base_url.clone(),
            config.session_token.clone(),
        ));
        let drafts = DraftStore::from_config(config)?.map(|store| Arc::new(store) as Arc<dyn BoardStore>);
        Self::open(board_id, remote, drafts, config)
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut Board {
        &mut self.board
    }

    pub fn status(&self) -> &SaveStatus {
        self.saver.status()
    }

    pub fn load_state(&self) -> &LoadState {
        &self.load_state
    }

    pub fn is_dirty(&self) -> bool {
        self.saver.is_dirty()
    }

    /// Whether a draft store backs this session.
    pub fn has_drafts(&self) -> bool {
        self.has_drafts
    }

    /// Whether the local draft replaced the (unreachable) remote content.
    pub fn draft_restored(&self) -> bool {
        self.draft_restored
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn workspace_id(&self) -> Option<&str> {
        self.workspace_id.as_deref()
    }

    fn fetch(&mut self, target: StoreTarget) {
        let command = SyncCommand::Fetch {
            board_id: self.board.id().to_string(),
            target,
        };
        if !self.worker.send(command) {
            log::error!("Sync worker is not running");
        }
    }

    /// Apply worker results, feed changes to the autosaver and dispatch due saves.
    pub fn tick(&mut self, now: Instant) {
        for event in self.worker.poll_events() {
            self.handle_event(event, now);
        }
        if self.closed {
            return;
        }
        if self.board.content_revision() != self.seen_revision {
            self.seen_revision = self.board.content_revision();
            if self.load_state != LoadState::Loading {
                self.saver.note_change(self.board.marks(), now);
            }
        }
        if let Some(request) = self.saver.poll(now) {
            self.dispatch(request, now);
        }
    }

    fn handle_event(&mut self, event: SyncEvent, now: Instant) {
        match event {
            SyncEvent::Fetched {
                target: StoreTarget::Remote,
                result,
                ..
            } => match result {
                Ok(document) => self.apply_remote(document, now),
                Err(err) => {
                    log::warn!("Failed to load board {}: {err}", self.board.id());
                    self.saver.set_error(err.to_string());
                    self.load_state = LoadState::Failed(err);
                    if self.has_drafts {
                        self.fetch(StoreTarget::Draft);
                    }
                }
            },
            SyncEvent::Fetched {
                target: StoreTarget::Draft,
                result,
                ..
            } => match result {
                Ok(document) if matches!(self.load_state, LoadState::Failed(_)) => {
                    log::info!("Restored local draft of board {}", self.board.id());
                    let merged = merge_local(document.content, self.board.marks());
                    self.board.load(merged);
                    self.seen_revision = self.board.content_revision();
                    self.draft_restored = true;
                }
                Ok(_) => log::debug!("Ignoring draft for {}; remote copy loaded", self.board.id()),
                Err(StorageError::NotFound(_)) => log::debug!("No local draft for {}", self.board.id()),
                Err(err) => log::warn!("Failed to read draft for {}: {err}", self.board.id()),
            },
            SyncEvent::Saved { seq, target, result } => {
                let applied = self.saver.complete(seq, &result, now);
                if applied && target == StoreTarget::Draft {
                    self.restate_load_error();
                }
            }
        }
    }

    fn apply_remote(&mut self, document: BoardDocument, now: Instant) {
        let remote_len = document.content.len();
        self.saver.mark_loaded(&document.content);
        let merged = merge_local(document.content, self.board.marks());
        let merged_extra = merged.len() - remote_len;
        self.board.load(merged);
        self.seen_revision = self.board.content_revision();
        self.title = document.title;
        self.workspace_id = document.workspace_id;
        self.load_state = LoadState::Loaded;
        self.draft_restored = false;
        log::info!("Loaded board {} ({remote_len} marks)", self.board.id());
        if merged_extra > 0 {
            log::info!("Keeping {merged_extra} local marks missing from the remote copy");
            self.saver.note_change(self.board.marks(), now);
        }
    }

    fn restate_load_error(&mut self) {
        if let LoadState::Failed(err) = &self.load_state {
            self.saver.set_error(err.to_string());
        }
    }

    fn dispatch(&mut self, request: SaveRequest, now: Instant) {
        let target = match self.load_state {
            LoadState::Loaded => StoreTarget::Remote,
            _ if self.has_drafts => StoreTarget::Draft,
            _ => {
                // Nowhere to save; release the request so later changes can fire.
                let suspended = Err(StorageError::Other("Remote saves suspended".to_string()));
                self.saver.complete(request.seq, &suspended, now);
                self.restate_load_error();
                return;
            }
        };
        let seq = request.seq;
        if !self.worker.send(SyncCommand::Save { request, target }) {
            let stopped = Err(StorageError::Other("Sync worker stopped".to_string()));
            self.saver.complete(seq, &stopped, now);
        }
    }

    /// Fetch the remote copy again after a failed load.
    pub fn retry_load(&mut self) -> bool {
        if !matches!(self.load_state, LoadState::Failed(_)) {
            return false;
        }
        self.load_state = LoadState::Loading;
        self.fetch(StoreTarget::Remote);
        true
    }

    /// Export the committed marks as JSON.
    pub fn export_json(&self) -> TransferResult<String> {
        export_json(self.board.marks())
    }

    /// Replace the board with imported marks (undoable).
    pub fn import_json(&mut self, json: &str) -> TransferResult<ImportReport> {
        let report = import_json(json)?;
        self.board.replace_all(report.marks.clone());
        Ok(report)
    }

    /// Flush pending changes and stop autosaving.
    pub fn close(&mut self, now: Instant) {
        if self.closed {
            return;
        }
        if self.board.content_revision() != self.seen_revision && self.load_state != LoadState::Loading {
            self.seen_revision = self.board.content_revision();
            self.saver.note_change(self.board.marks(), now);
        }
        if self.load_state != LoadState::Loading {
            if let Some(request) = self.saver.flush(now) {
                self.dispatch(request, now);
            }
        }
        self.saver.cancel();
        self.closed = true;
        log::info!("Closed board {}", self.board.id());
    }
}

/// `base` followed by the marks of `local` whose ids are absent from `base`.
fn merge_local(base: Vec<Mark>, local: &[Mark]) -> Vec<Mark> {
    let known: HashSet<&str> = base.iter().map(|m| m.id.as_str()).collect();
    let extra: Vec<Mark> = local
        .iter()
        .filter(|m| !known.contains(m.id.as_str()))
        .cloned()
        .collect();
    let mut merged = base;
    merged.extend(extra);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marks::{SessionId, Tool};
    use crate::storage::MemoryBoardStore;
    use kurbo::Point;
    use std::time::Duration;

    fn config() -> ClientConfig {
        ClientConfig {
            save_debounce_ms: 20,
            saved_display_ms: 20,
            ..ClientConfig::default()
        }
    }

    fn pen(x: f64) -> Mark {
        let mut mark = Mark::new(Tool::Pen, Point::new(x, 0.0), "#000000", 5.0, 1.0);
        mark.extend(Point::new(x, 10.0));
        mark
    }

    fn tick_until(session: &mut BoardSession, mut done: impl FnMut(&BoardSession) -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            session.tick(Instant::now());
            if done(session) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    fn draw(session: &mut BoardSession, x: f64) {
        let board = session.board_mut();
        board.start(Point::new(x, 0.0), SessionId::Mouse);
        board.add_point(Point::new(x, 20.0), SessionId::Mouse);
        board.end(SessionId::Mouse);
    }

    #[test]
    fn test_merge_local() {
        let a = pen(1.0);
        let b = pen(2.0);
        let c = pen(3.0);
        let merged = merge_local(vec![a.clone(), b.clone()], &[b.clone(), c.clone()]);
        assert_eq!(merged, vec![a, b, c]);
    }

    #[test]
    fn test_open_loads_and_autosaves() {
        let remote = Arc::new(MemoryBoardStore::new());
        let mut doc = BoardDocument::new("b1", vec![pen(1.0)]);
        doc.title = "Ideas".to_string();
        remote.insert(doc).unwrap();
        let drafts = Arc::new(MemoryBoardStore::new());

        let mut session = BoardSession::open("b1", remote.clone(), Some(drafts.clone()), &config()).unwrap();
        assert!(tick_until(&mut session, |s| s.load_state() == &LoadState::Loaded));
        assert_eq!(session.board().marks().len(), 1);
        assert_eq!(session.title(), "Ideas");
        assert!(!session.board().can_undo());
        assert!(!session.is_dirty());

        draw(&mut session, 50.0);
        assert!(tick_until(&mut session, |s| s.status() == &SaveStatus::Saved));
        assert_eq!(remote.content("b1").map(|c| c.len()), Some(2));
        assert_eq!(drafts.content("b1").map(|c| c.len()), Some(2));
        assert!(tick_until(&mut session, |s| s.status() == &SaveStatus::Idle));
    }

    #[test]
    fn test_unchanged_board_is_not_saved() {
        let remote = Arc::new(MemoryBoardStore::new());
        remote.insert(BoardDocument::new("b1", vec![pen(1.0)])).unwrap();
        let mut session = BoardSession::open("b1", remote.clone(), None, &config()).unwrap();
        assert!(tick_until(&mut session, |s| s.load_state() == &LoadState::Loaded));

        draw(&mut session, 5.0);
        session.board_mut().undo();
        std::thread::sleep(Duration::from_millis(60));
        session.tick(Instant::now());
        std::thread::sleep(Duration::from_millis(60));
        session.tick(Instant::now());
        assert_eq!(remote.save_count(), 0);
    }

    #[test]
    fn test_failed_load_restores_draft_and_suspends_remote() {
        let shared = pen(1.0);
        let remote = Arc::new(MemoryBoardStore::new());
        remote.insert(BoardDocument::new("b1", vec![shared.clone()])).unwrap();
        remote.set_offline(true);
        let drafts = Arc::new(MemoryBoardStore::new());
        drafts.insert(BoardDocument::new("b1", vec![shared, pen(2.0)])).unwrap();

        let mut session = BoardSession::open("b1", remote.clone(), Some(drafts.clone()), &config()).unwrap();
        assert!(tick_until(&mut session, |s| s.draft_restored()));
        assert!(matches!(session.load_state(), LoadState::Failed(StorageError::Transport(_))));
        assert!(matches!(session.status(), SaveStatus::Error(_)));
        assert_eq!(session.board().marks().len(), 2);

        // Edits land in the draft store only.
        remote.set_offline(false);
        draw(&mut session, 3.0);
        assert!(tick_until(&mut session, |_| drafts.content("b1").map(|c| c.len()) == Some(3)));
        assert_eq!(remote.save_count(), 0);
        assert!(matches!(session.status(), SaveStatus::Error(_)));

        // Retrying merges the local-only marks into the remote copy and saves them.
        assert!(session.retry_load());
        assert!(tick_until(&mut session, |_| remote.content("b1").map(|c| c.len()) == Some(3)));
        assert_eq!(session.load_state(), &LoadState::Loaded);
        let remote_ids: Vec<_> = remote.content("b1").unwrap().into_iter().map(|m| m.id).collect();
        let local_ids: Vec<_> = session.board().marks().iter().map(|m| m.id.clone()).collect();
        assert_eq!(remote_ids, local_ids);
    }

    #[test]
    fn test_not_found_without_drafts() {
        let remote = Arc::new(MemoryBoardStore::new());
        let mut session = BoardSession::open("missing", remote.clone(), None, &config()).unwrap();
        assert!(tick_until(&mut session, |s| matches!(s.load_state(), LoadState::Failed(_))));

        draw(&mut session, 1.0);
        std::thread::sleep(Duration::from_millis(60));
        session.tick(Instant::now());
        assert_eq!(remote.save_count(), 0);
        assert!(matches!(session.status(), SaveStatus::Error(_)));
        assert_eq!(session.board().marks().len(), 1);
    }

    fn unreachable_server(draft_dir: Option<std::path::PathBuf>) -> ClientConfig {
        ClientConfig {
            api_base_url: url::Url::parse("http://127.0.0.1:1/").unwrap(),
            drafts_enabled: draft_dir.is_some(),
            draft_dir,
            ..config()
        }
    }

    #[test]
    fn test_connect_without_drafts() {
        let mut session = BoardSession::connect("b1", &unreachable_server(None)).unwrap();
        assert!(!session.has_drafts());
        assert!(tick_until(&mut session, |s| matches!(s.load_state(), LoadState::Failed(_))));

        draw(&mut session, 1.0);
        std::thread::sleep(Duration::from_millis(60));
        session.tick(Instant::now());
        assert!(matches!(session.status(), SaveStatus::Error(_)));
        assert!(!session.draft_restored());
    }

    #[test]
    fn test_connect_saves_drafts_to_configured_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = BoardSession::connect("team/b1", &unreachable_server(Some(dir.path().to_path_buf()))).unwrap();
        assert!(session.has_drafts());
        assert!(tick_until(&mut session, |s| matches!(s.load_state(), LoadState::Failed(_))));

        draw(&mut session, 1.0);
        let draft = dir.path().join("team_2Fb1.json");
        assert!(tick_until(&mut session, |_| draft.exists()));
        let drafts = DraftStore::new(dir.path()).unwrap();
        assert_eq!(drafts.list().unwrap(), vec!["team/b1".to_string()]);
    }

    #[test]
    fn test_close_flushes_then_stops() {
        let remote = Arc::new(MemoryBoardStore::new());
        remote.insert(BoardDocument::new("b1", vec![])).unwrap();
        let long_debounce = ClientConfig {
            save_debounce_ms: 60_000,
            ..ClientConfig::default()
        };
        let mut session = BoardSession::open("b1", remote.clone(), None, &long_debounce).unwrap();
        assert!(tick_until(&mut session, |s| s.load_state() == &LoadState::Loaded));

        draw(&mut session, 1.0);
        session.close(Instant::now());
        assert!(tick_until(&mut session, |_| remote.save_count() == 1));

        draw(&mut session, 2.0);
        session.tick(Instant::now() + Duration::from_secs(120));
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(remote.save_count(), 1);
        assert_eq!(remote.content("b1").map(|c| c.len()), Some(1));
    }

    #[test]
    fn test_import_export() {
        let remote = Arc::new(MemoryBoardStore::new());
        remote.insert(BoardDocument::new("b1", vec![pen(1.0)])).unwrap();
        let mut session = BoardSession::open("b1", remote, None, &config()).unwrap();
        assert!(tick_until(&mut session, |s| s.load_state() == &LoadState::Loaded));

        let exported = session.export_json().unwrap();
        draw(&mut session, 9.0);
        let report = session.import_json(&exported).unwrap();
        assert_eq!(report.marks.len(), 1);
        assert_eq!(session.board().marks().len(), 1);
        assert!(session.board_mut().undo());
        assert_eq!(session.board().marks().len(), 2);
    }
}
