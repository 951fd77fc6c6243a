//! Stroke capture: one in-progress mark per input session, committed on release.

use crate::marks::{Mark, MarkId, SessionId, Tool};
use crate::tools::ToolSettings;
use kurbo::Point;
use std::collections::HashMap;

/// Committed marks, in-progress marks and the current selection.
#[derive(Debug, Clone, Default)]
pub struct CaptureEngine {
    committed: Vec<Mark>,
    active: HashMap<SessionId, Mark>,
    selected: Option<MarkId>,
}

impl CaptureEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed marks in commit order.
    pub fn committed(&self) -> &[Mark] {
        &self.committed
    }

    /// In-progress marks keyed by session.
    pub fn active(&self) -> &HashMap<SessionId, Mark> {
        &self.active
    }

    /// In-progress marks in a stable order (mouse first, then touches by id).
    pub fn active_sorted(&self) -> Vec<&Mark> {
        let mut sessions: Vec<_> = self.active.keys().copied().collect();
        sessions.sort_by_key(|s| match s {
            SessionId::Mouse => (0, 0),
            SessionId::Touch(id) => (1, *id),
        });
        sessions.iter().filter_map(|s| self.active.get(s)).collect()
    }

    pub fn selected(&self) -> Option<&MarkId> {
        self.selected.as_ref()
    }

    pub fn is_capturing(&self, session: SessionId) -> bool {
        self.active.contains_key(&session)
    }

    /// Begin a mark for `session`. Returns false when the tool draws nothing.
    ///
    /// An existing in-progress mark for the same session is replaced.
    pub fn start(&mut self, point: Point, session: SessionId, settings: &ToolSettings) -> bool {
        self.selected = None;
        let tool = settings.tool();
        if !tool.is_drawable() || tool == Tool::Text {
            return false;
        }
        let mark = Mark::new(tool, point, settings.color(), settings.width(), settings.opacity());
        if self.active.insert(session, mark).is_some() {
            log::debug!("Replaced in-progress mark for {session}");
        }
        true
    }

    /// Extend the in-progress mark of `session`, if any.
    pub fn add_point(&mut self, point: Point, session: SessionId) -> bool {
        match self.active.get_mut(&session) {
            Some(mark) => {
                mark.extend(point);
                true
            }
            None => false,
        }
    }

    /// Commit the in-progress mark of `session`. Returns the committed id.
    pub fn end(&mut self, session: SessionId) -> Option<MarkId> {
        let mark = self.active.remove(&session)?;
        let id = mark.id.clone();
        self.committed.push(mark);
        Some(id)
    }

    /// Commit a text label immediately.
    pub fn add_text(&mut self, text: &str, point: Point, settings: &ToolSettings) -> MarkId {
        let mark = Mark::text(text, point, settings.color(), settings.width(), settings.opacity());
        let id = mark.id.clone();
        self.committed.push(mark);
        id
    }

    /// Remove all marks and the selection.
    pub fn clear(&mut self) {
        self.committed.clear();
        self.active.clear();
        self.selected = None;
    }

    pub fn select(&mut self, id: Option<MarkId>) {
        self.selected = id;
    }

    /// Replace the committed sequence wholesale.
    pub fn replace_all(&mut self, marks: Vec<Mark>) {
        self.committed = marks;
        self.active.clear();
        self.selected = None;
    }

    /// Restore a committed sequence from history without touching capture state.
    pub(crate) fn restore(&mut self, marks: Vec<Mark>) {
        if let Some(id) = &self.selected {
            if !marks.iter().any(|m| &m.id == id) {
                self.selected = None;
            }
        }
        self.committed = marks;
    }

    /// Topmost committed mark under a logical point.
    pub fn mark_at(&self, point: Point, tolerance: f64) -> Option<&Mark> {
        self.committed.iter().rev().find(|m| m.hit_test(point, tolerance))
    }
}
