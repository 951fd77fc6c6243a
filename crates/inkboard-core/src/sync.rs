//! Debounced persistence of a board's committed marks.
//!
//! [`AutoSaver`] decides *when* to save and tracks status; it performs no IO.
//! [`SyncWorker`] executes fetch and save calls on a background thread and
//! reports results as [`SyncEvent`]s that the UI thread polls.

use crate::marks::Mark;
use crate::storage::{BoardDocument, BoardStore, StorageError, StorageResult};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::{DEFAULT_SAVE_DEBOUNCE_MS, DEFAULT_SAVED_DISPLAY_MS};

/// User-visible persistence status.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SaveStatus {
    #[default]
    Idle,
    Saving,
    Saved,
    Error(String),
}

/// A save the caller must execute, then report through [`AutoSaver::complete`].
#[derive(Debug, Clone, PartialEq)]
pub struct SaveRequest {
    pub seq: u64,
    pub board_id: String,
    pub content: Vec<Mark>,
}

#[derive(Debug, Clone)]
struct Snapshot {
    content: Vec<Mark>,
    serialized: String,
}

#[derive(Debug, Clone)]
struct InFlight {
    seq: u64,
    serialized: String,
}

/// Debounce and status state machine for one board.
#[derive(Debug)]
pub struct AutoSaver {
    board_id: String,
    debounce: Duration,
    saved_display: Duration,
    /// Serialization of the content last known to be stored.
    baseline: Option<String>,
    current: Option<Snapshot>,
    deadline: Option<Instant>,
    in_flight: Option<InFlight>,
    next_seq: u64,
    status: SaveStatus,
    saved_at: Option<Instant>,
    cancelled: bool,
}

impl AutoSaver {
    pub fn new(board_id: impl Into<String>) -> Self {
        Self::with_timing(
            board_id,
            Duration::from_millis(DEFAULT_SAVE_DEBOUNCE_MS),
            Duration::from_millis(DEFAULT_SAVED_DISPLAY_MS),
        )
    }

    pub fn with_timing(board_id: impl Into<String>, debounce: Duration, saved_display: Duration) -> Self {
        Self {
            board_id: board_id.into(),
            debounce,
            saved_display,
            baseline: None,
            current: None,
            deadline: None,
            in_flight: None,
            next_seq: 1,
            status: SaveStatus::Idle,
            saved_at: None,
            cancelled: false,
        }
    }

    pub fn board_id(&self) -> &str {
        &self.board_id
    }

    pub fn status(&self) -> &SaveStatus {
        &self.status
    }

    /// Whether the latest content differs from what is stored.
    pub fn is_dirty(&self) -> bool {
        match &self.current {
            Some(current) => self.baseline.as_deref() != Some(current.serialized.as_str()),
            None => false,
        }
    }

    /// Whether a debounce deadline is armed.
    pub fn has_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn in_flight_seq(&self) -> Option<u64> {
        self.in_flight.as_ref().map(|f| f.seq)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Offer the committed sequence after a change.
    ///
    /// Content differing from the baseline (re)arms the debounce deadline;
    /// content equal to it disarms any pending deadline.
    pub fn note_change(&mut self, content: &[Mark], now: Instant) {
        if self.cancelled {
            return;
        }
        let Some(snapshot) = snapshot(content) else {
            return;
        };
        self.current = Some(snapshot);
        if self.is_dirty() {
            self.deadline = Some(now + self.debounce);
        } else {
            self.deadline = None;
        }
    }

    /// Record freshly loaded content as the stored baseline.
    pub fn mark_loaded(&mut self, content: &[Mark]) {
        let Some(snapshot) = snapshot(content) else {
            return;
        };
        self.baseline = Some(snapshot.serialized.clone());
        self.current = Some(snapshot);
        self.deadline = None;
        if self.in_flight.take().is_some() {
            log::debug!("Load superseded in-flight save for {}", self.board_id);
        }
        self.status = SaveStatus::Idle;
    }

    /// Advance time. Returns a save to execute when the deadline has passed.
    pub fn poll(&mut self, now: Instant) -> Option<SaveRequest> {
        if self.status == SaveStatus::Saved
            && self.saved_at.is_some_and(|at| now >= at + self.saved_display)
        {
            self.status = SaveStatus::Idle;
        }
        if self.cancelled || self.in_flight.is_some() {
            return None;
        }
        let deadline = self.deadline?;
        if now < deadline {
            return None;
        }
        self.deadline = None;
        self.fire()
    }

    /// Save immediately if there are unsaved changes.
    ///
    /// With a save already in flight, the flush fires once it completes.
    pub fn flush(&mut self, now: Instant) -> Option<SaveRequest> {
        if self.cancelled || !self.is_dirty() {
            return None;
        }
        if self.in_flight.is_some() {
            self.deadline = Some(now);
            return None;
        }
        self.deadline = None;
        self.fire()
    }

    /// Abandon any pending deadline. No save fires afterwards.
    pub fn cancel(&mut self) {
        self.deadline = None;
        self.cancelled = true;
    }

    fn fire(&mut self) -> Option<SaveRequest> {
        if !self.is_dirty() {
            return None;
        }
        let current = self.current.as_ref()?;
        let seq = self.next_seq;
        self.next_seq += 1;
        self.in_flight = Some(InFlight {
            seq,
            serialized: current.serialized.clone(),
        });
        self.status = SaveStatus::Saving;
        log::debug!("Saving board {} (seq {seq})", self.board_id);
        Some(SaveRequest {
            seq,
            board_id: self.board_id.clone(),
            content: current.content.clone(),
        })
    }

    /// Apply the outcome of a save. Returns false for a stale completion.
    pub fn complete(&mut self, seq: u64, result: &StorageResult<()>, now: Instant) -> bool {
        let Some(in_flight) = self.in_flight.take_if(|f| f.seq == seq) else {
            log::debug!("Discarding stale save completion {seq} for {}", self.board_id);
            return false;
        };
        match result {
            Ok(()) => {
                self.baseline = Some(in_flight.serialized);
                self.status = SaveStatus::Saved;
                self.saved_at = Some(now);
                if !self.is_dirty() {
                    self.deadline = None;
                }
            }
            Err(err) => {
                log::warn!("Save of board {} failed: {err}", self.board_id);
                self.status = SaveStatus::Error(err.to_string());
            }
        }
        true
    }

    /// Report an error that is not tied to a save (for example a failed load).
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.status = SaveStatus::Error(message.into());
    }
}

fn snapshot(content: &[Mark]) -> Option<Snapshot> {
    match serde_json::to_string(content) {
        Ok(serialized) => Some(Snapshot {
            content: content.to_vec(),
            serialized,
        }),
        Err(err) => {
            log::error!("Failed to serialize board content: {err}");
            None
        }
    }
}

// ============================================================================
// Background worker
// ============================================================================

/// Which store a command targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreTarget {
    Remote,
    Draft,
}

/// Commands sent to the worker thread.
#[derive(Debug, Clone)]
pub enum SyncCommand {
    Fetch {
        board_id: String,
        target: StoreTarget,
    },
    Save {
        request: SaveRequest,
        target: StoreTarget,
    },
    Shutdown,
}

/// Results reported by the worker thread.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    Fetched {
        board_id: String,
        target: StoreTarget,
        result: StorageResult<BoardDocument>,
    },
    Saved {
        seq: u64,
        target: StoreTarget,
        result: StorageResult<()>,
    },
}

/// Executes store calls on a dedicated thread with its own tokio runtime.
pub struct SyncWorker {
    cmd_tx: Sender<SyncCommand>,
    event_rx: Receiver<SyncEvent>,
    _thread: Option<JoinHandle<()>>,
}

impl SyncWorker {
    /// Start the worker thread.
    pub fn spawn(remote: Arc<dyn BoardStore>, drafts: Option<Arc<dyn BoardStore>>) -> StorageResult<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| StorageError::Io(format!("Failed to start sync runtime: {}", e)))?;

        let (cmd_tx, cmd_rx) = channel::<SyncCommand>();
        let (event_tx, event_rx) = channel::<SyncEvent>();

        let handle = thread::Builder::new()
            .name("inkboard-sync".to_string())
            .spawn(move || {
                log::info!("Sync worker started");
                while let Ok(command) = cmd_rx.recv() {
                    let event = match command {
                        SyncCommand::Shutdown => break,
                        SyncCommand::Fetch { board_id, target } => {
                            let result = match store_for(&remote, drafts.as_ref(), target) {
                                Some(store) => runtime.block_on(store.fetch(&board_id)),
                                None => Err(StorageError::Other("No draft store configured".to_string())),
                            };
                            SyncEvent::Fetched {
                                board_id,
                                target,
                                result,
                            }
                        }
                        SyncCommand::Save { request, target } => {
                            let result = match store_for(&remote, drafts.as_ref(), target) {
                                Some(store) => runtime.block_on(store.save(&request.board_id, &request.content)),
                                None => Err(StorageError::Other("No draft store configured".to_string())),
                            };
                            if let (Ok(()), StoreTarget::Remote, Some(drafts)) = (&result, target, drafts.as_ref()) {
                                // Best-effort local copy of what the server now holds.
                                if let Err(err) = runtime.block_on(drafts.save(&request.board_id, &request.content)) {
                                    log::warn!("Failed to write draft for {}: {err}", request.board_id);
                                }
                            }
                            SyncEvent::Saved {
                                seq: request.seq,
                                target,
                                result,
                            }
                        }
                    };
                    if event_tx.send(event).is_err() {
                        break;
                    }
                }
                log::info!("Sync worker exiting");
            })
            .map_err(|e| StorageError::Io(format!("Failed to spawn sync worker: {}", e)))?;

        Ok(Self {
            cmd_tx,
            event_rx,
            _thread: Some(handle),
        })
    }

    /// Queue a command. Returns false if the worker has stopped.
    pub fn send(&self, command: SyncCommand) -> bool {
        self.cmd_tx.send(command).is_ok()
    }

    /// Drain pending events without blocking.
    pub fn poll_events(&self) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        loop {
            match self.event_rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    log::warn!("Sync worker channel disconnected");
                    break;
                }
            }
        }
        events
    }
}

impl Drop for SyncWorker {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(SyncCommand::Shutdown);
    }
}

fn store_for<'a>(
    remote: &'a Arc<dyn BoardStore>,
    drafts: Option<&'a Arc<dyn BoardStore>>,
    target: StoreTarget,
) -> Option<&'a Arc<dyn BoardStore>> {
    match target {
        StoreTarget::Remote => Some(remote),
        StoreTarget::Draft => drafts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marks::Tool;
    use crate::storage::MemoryBoardStore;
    use kurbo::Point;

    const DEBOUNCE: Duration = Duration::from_millis(2000);

    fn saver() -> AutoSaver {
        let mut saver = AutoSaver::new("b1");
        saver.mark_loaded(&[]);
        saver
    }

    fn marks(n: usize) -> Vec<Mark> {
        (0..n)
            .map(|i| Mark::new(Tool::Pen, Point::new(i as f64, 0.0), "#000000", 5.0, 1.0))
            .collect()
    }

    #[test]
    fn test_debounce_restarts_on_change() {
        let t0 = Instant::now();
        let mut saver = saver();
        let content = marks(2);

        saver.note_change(&content[..1], t0);
        saver.note_change(&content, t0 + Duration::from_millis(1500));
        assert!(saver.poll(t0 + DEBOUNCE).is_none());

        let request = saver.poll(t0 + Duration::from_millis(3500)).unwrap();
        assert_eq!(request.content, content);
        assert_eq!(request.board_id, "b1");
        assert_eq!(saver.status(), &SaveStatus::Saving);
    }

    #[test]
    fn test_loaded_content_does_not_save() {
        let t0 = Instant::now();
        let mut saver = AutoSaver::new("b1");
        let content = marks(3);
        saver.mark_loaded(&content);
        saver.note_change(&content, t0);
        assert!(!saver.has_pending());
        assert!(saver.poll(t0 + DEBOUNCE * 2).is_none());
    }

    #[test]
    fn test_return_to_baseline_cancels_pending() {
        let t0 = Instant::now();
        let mut saver = saver();
        saver.note_change(&marks(1), t0);
        assert!(saver.has_pending());
        saver.note_change(&[], t0 + Duration::from_millis(10));
        assert!(!saver.has_pending());
        assert!(saver.poll(t0 + DEBOUNCE * 2).is_none());
    }

    #[test]
    fn test_saved_then_idle() {
        let t0 = Instant::now();
        let mut saver = saver();
        saver.note_change(&marks(1), t0);
        let request = saver.poll(t0 + DEBOUNCE).unwrap();

        let done = t0 + Duration::from_millis(2100);
        assert!(saver.complete(request.seq, &Ok(()), done));
        assert_eq!(saver.status(), &SaveStatus::Saved);
        assert!(!saver.is_dirty());

        saver.poll(done + Duration::from_millis(1999));
        assert_eq!(saver.status(), &SaveStatus::Saved);
        saver.poll(done + Duration::from_millis(2000));
        assert_eq!(saver.status(), &SaveStatus::Idle);
    }

    #[test]
    fn test_error_persists_until_success() {
        let t0 = Instant::now();
        let mut saver = saver();
        saver.note_change(&marks(1), t0);
        let request = saver.poll(t0 + DEBOUNCE).unwrap();
        let err = Err(StorageError::Transport("offline".to_string()));
        saver.complete(request.seq, &err, t0 + DEBOUNCE);
        assert!(matches!(saver.status(), SaveStatus::Error(_)));

        saver.poll(t0 + DEBOUNCE * 10);
        assert!(matches!(saver.status(), SaveStatus::Error(_)));
        assert!(saver.is_dirty());

        saver.note_change(&marks(2), t0 + DEBOUNCE * 10);
        let retry = saver.poll(t0 + DEBOUNCE * 11).unwrap();
        saver.complete(retry.seq, &Ok(()), t0 + DEBOUNCE * 11);
        assert_eq!(saver.status(), &SaveStatus::Saved);
    }

    #[test]
    fn test_one_save_in_flight() {
        let t0 = Instant::now();
        let mut saver = saver();
        let content = marks(2);
        saver.note_change(&content[..1], t0);
        let first = saver.poll(t0 + DEBOUNCE).unwrap();

        saver.note_change(&content, t0 + DEBOUNCE);
        // Deadline passes while the first save is still running.
        assert!(saver.poll(t0 + DEBOUNCE * 3).is_none());

        saver.complete(first.seq, &Ok(()), t0 + DEBOUNCE * 3);
        let second = saver.poll(t0 + DEBOUNCE * 3).unwrap();
        assert!(second.seq > first.seq);
        assert_eq!(second.content, content);
    }

    #[test]
    fn test_stale_completion_ignored() {
        let t0 = Instant::now();
        let mut saver = saver();
        saver.note_change(&marks(1), t0);
        let request = saver.poll(t0 + DEBOUNCE).unwrap();

        assert!(!saver.complete(request.seq + 10, &Ok(()), t0 + DEBOUNCE));
        assert_eq!(saver.status(), &SaveStatus::Saving);
        assert!(saver.is_dirty());

        // A load supersedes the in-flight save; its completion is stale afterwards.
        saver.mark_loaded(&marks(1));
        let status = saver.status().clone();
        assert!(!saver.complete(request.seq, &Err(StorageError::Forbidden), t0 + DEBOUNCE));
        assert_eq!(saver.status(), &status);
    }

    #[test]
    fn test_flush_and_cancel() {
        let t0 = Instant::now();
        let mut saver = saver();
        assert!(saver.flush(t0).is_none());

        saver.note_change(&marks(1), t0);
        let request = saver.flush(t0).unwrap();
        saver.complete(request.seq, &Ok(()), t0);

        saver.note_change(&marks(2), t0);
        saver.cancel();
        assert!(saver.poll(t0 + DEBOUNCE * 5).is_none());
        assert!(saver.flush(t0 + DEBOUNCE * 5).is_none());
        saver.note_change(&marks(3), t0 + DEBOUNCE * 5);
        assert!(saver.poll(t0 + DEBOUNCE * 10).is_none());
    }

    #[test]
    fn test_flush_waits_for_in_flight() {
        let t0 = Instant::now();
        let mut saver = saver();
        saver.note_change(&marks(1), t0);
        let first = saver.poll(t0 + DEBOUNCE).unwrap();
        saver.note_change(&marks(2), t0 + DEBOUNCE);
        assert!(saver.flush(t0 + DEBOUNCE).is_none());
        saver.complete(first.seq, &Ok(()), t0 + DEBOUNCE);
        assert!(saver.poll(t0 + DEBOUNCE).is_some());
    }

    fn wait_for_events(worker: &SyncWorker, count: usize) -> Vec<SyncEvent> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut events = Vec::new();
        while events.len() < count && Instant::now() < deadline {
            events.extend(worker.poll_events());
            std::thread::sleep(Duration::from_millis(5));
        }
        events
    }

    #[test]
    fn test_worker_save_and_fetch() {
        let remote = Arc::new(MemoryBoardStore::new());
        let drafts = Arc::new(MemoryBoardStore::new());
        let worker = SyncWorker::spawn(remote.clone(), Some(drafts.clone())).unwrap();

        let content = marks(2);
        let request = SaveRequest {
            seq: 1,
            board_id: "b1".to_string(),
            content: content.clone(),
        };
        assert!(worker.send(SyncCommand::Save {
            request,
            target: StoreTarget::Remote,
        }));
        assert!(worker.send(SyncCommand::Fetch {
            board_id: "b1".to_string(),
            target: StoreTarget::Remote,
        }));

        let events = wait_for_events(&worker, 2);
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], SyncEvent::Saved { seq: 1, result: Ok(()), .. }));
        match &events[1] {
            SyncEvent::Fetched { result: Ok(doc), .. } => assert_eq!(doc.content, content),
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(drafts.content("b1"), Some(content));
    }

    #[test]
    fn test_worker_without_drafts() {
        let remote = Arc::new(MemoryBoardStore::new());
        let worker = SyncWorker::spawn(remote, None).unwrap();
        worker.send(SyncCommand::Fetch {
            board_id: "b1".to_string(),
            target: StoreTarget::Draft,
        });
        let events = wait_for_events(&worker, 1);
        assert!(matches!(
            &events[0],
            SyncEvent::Fetched { target: StoreTarget::Draft, result: Err(StorageError::Other(_)), .. }
        ));
    }
}
