//! The board store: capture engine, history and tool settings for one open board.
//!
//! A `Board` is owned by the UI thread. Views observe it either by polling
//! [`Board::revision`] or by subscribing a callback that receives a
//! [`BoardEvent`] after every change.

use crate::capture::CaptureEngine;
use crate::history::{DEFAULT_HISTORY_LIMIT, History};
use crate::marks::{Mark, MarkId, SessionId, Tool};
use crate::tools::{ToolSettings, WidthPreset};
use kurbo::Point;
use std::collections::HashMap;

/// What part of the board changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardChange {
    /// An in-progress mark started or grew.
    Active,
    /// The committed sequence changed.
    Committed,
    /// The selection changed.
    Selection,
    /// Tool settings changed.
    Tool,
    /// Content was loaded from storage; history was reset.
    Loaded,
}

/// Notification delivered to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardEvent {
    pub change: BoardChange,
    /// Board revision after the change.
    pub revision: u64,
}

/// Handle returned by [`Board::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn FnMut(&BoardEvent)>;

/// State of one open board.
pub struct Board {
    id: String,
    settings: ToolSettings,
    engine: CaptureEngine,
    history: History,
    revision: u64,
    content_revision: u64,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: u64,
}

impl std::fmt::Debug for Board {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Board")
            .field("id", &self.id)
            .field("marks", &self.engine.committed().len())
            .field("revision", &self.revision)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Board {
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_history_limit(id, DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_history_limit(id: impl Into<String>, limit: usize) -> Self {
        Self {
            id: id.into(),
            settings: ToolSettings::default(),
            engine: CaptureEngine::new(),
            history: History::new(limit),
            revision: 0,
            content_revision: 0,
            listeners: Vec::new(),
            next_subscription: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Incremented on every observable change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Incremented only when the committed sequence changes.
    pub fn content_revision(&self) -> u64 {
        self.content_revision
    }

    pub fn marks(&self) -> &[Mark] {
        self.engine.committed()
    }

    pub fn active(&self) -> &HashMap<SessionId, Mark> {
        self.engine.active()
    }

    /// In-progress marks in a stable order, for drawing.
    pub fn active_marks(&self) -> Vec<&Mark> {
        self.engine.active_sorted()
    }

    pub fn selected(&self) -> Option<&MarkId> {
        self.engine.selected()
    }

    pub fn settings(&self) -> &ToolSettings {
        &self.settings
    }

    pub fn tool(&self) -> Tool {
        self.settings.tool()
    }

    // --- subscriptions ---

    /// Register a change callback.
    pub fn subscribe(&mut self, listener: impl FnMut(&BoardEvent) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a change callback. Returns false if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sid, _)| *sid != id);
        self.listeners.len() != before
    }

    fn notify(&mut self, change: BoardChange) {
        self.revision += 1;
        if matches!(change, BoardChange::Committed | BoardChange::Loaded) {
            self.content_revision += 1;
        }
        let event = BoardEvent {
            change,
            revision: self.revision,
        };
        for (_, listener) in &mut self.listeners {
            listener(&event);
        }
    }

    // --- tool settings ---

    pub fn set_tool(&mut self, tool: Tool) {
        self.settings.set_tool(tool);
        self.notify(BoardChange::Tool);
    }

    pub fn set_color(&mut self, color: impl Into<String>) {
        self.settings.set_color(color);
        self.notify(BoardChange::Tool);
    }

    pub fn set_width(&mut self, width: f64) {
        self.settings.set_width(width);
        self.notify(BoardChange::Tool);
    }

    pub fn set_preset(&mut self, preset: WidthPreset) {
        self.settings.set_preset(preset);
        self.notify(BoardChange::Tool);
    }

    // --- capture ---

    /// Begin a mark for an input session.
    pub fn start(&mut self, point: Point, session: SessionId) {
        let had_selection = self.engine.selected().is_some();
        if self.engine.start(point, session, &self.settings) {
            self.notify(BoardChange::Active);
        } else if had_selection {
            self.notify(BoardChange::Selection);
        }
    }

    pub fn add_point(&mut self, point: Point, session: SessionId) {
        if self.engine.add_point(point, session) {
            self.notify(BoardChange::Active);
        }
    }

    /// Commit the in-progress mark of a session.
    pub fn end(&mut self, session: SessionId) -> Option<MarkId> {
        if !self.engine.is_capturing(session) {
            return None;
        }
        let before = self.engine.committed().to_vec();
        let id = self.engine.end(session)?;
        self.history.record(before, self.engine.committed());
        self.notify(BoardChange::Committed);
        Some(id)
    }

    /// Commit a text label at a logical point.
    pub fn add_text(&mut self, text: &str, point: Point) -> MarkId {
        let before = self.engine.committed().to_vec();
        let id = self.engine.add_text(text, point, &self.settings);
        self.history.record(before, self.engine.committed());
        self.notify(BoardChange::Committed);
        id
    }

    /// Remove every mark. Recorded as one undo entry when anything was removed.
    pub fn clear(&mut self) {
        let before = self.engine.committed().to_vec();
        let had_active = !self.engine.active().is_empty();
        self.engine.clear();
        if self.history.record(before, self.engine.committed()) {
            self.notify(BoardChange::Committed);
        } else if had_active {
            self.notify(BoardChange::Active);
        }
    }

    pub fn select(&mut self, id: Option<MarkId>) {
        if self.engine.selected() != id.as_ref() {
            self.engine.select(id);
            self.notify(BoardChange::Selection);
        }
    }

    /// Select the topmost mark under a logical point (or clear the selection).
    pub fn select_at(&mut self, point: Point, tolerance: f64) -> Option<MarkId> {
        let hit = self.engine.mark_at(point, tolerance).map(|m| m.id.clone());
        self.select(hit.clone());
        hit
    }

    pub fn mark_at(&self, point: Point, tolerance: f64) -> Option<&Mark> {
        self.engine.mark_at(point, tolerance)
    }

    /// Replace all marks, as an undoable import.
    pub fn replace_all(&mut self, marks: Vec<Mark>) {
        let before = self.engine.committed().to_vec();
        self.engine.replace_all(marks);
        self.history.record(before, self.engine.committed());
        self.notify(BoardChange::Committed);
    }

    /// Replace all marks with stored content and reset history.
    pub fn load(&mut self, marks: Vec<Mark>) {
        self.engine.replace_all(marks);
        self.history.reset();
        self.notify(BoardChange::Loaded);
    }

    // --- history ---

    pub fn undo(&mut self) -> bool {
        let current = self.engine.committed().to_vec();
        match self.history.undo(current) {
            Some(snapshot) => {
                self.engine.restore(snapshot);
                self.notify(BoardChange::Committed);
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        let current = self.engine.committed().to_vec();
        match self.history.redo(current) {
            Some(snapshot) => {
                self.engine.restore(snapshot);
                self.notify(BoardChange::Committed);
                true
            }
            None => false,
        }
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn past_count(&self) -> usize {
        self.history.past_count()
    }

    pub fn future_count(&self) -> usize {
        self.history.future_count()
    }
}
