//! Undo/redo over snapshots of the committed sequence.

use crate::marks::Mark;

/// Default number of undo entries kept.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Bounded undo/redo stacks of committed-sequence snapshots.
#[derive(Debug, Clone)]
pub struct History {
    past: Vec<Vec<Mark>>,
    future: Vec<Vec<Mark>>,
    limit: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl History {
    pub fn new(limit: usize) -> Self {
        Self {
            past: Vec::new(),
            future: Vec::new(),
            limit: limit.max(1),
        }
    }

    /// Record a commit boundary.
    ///
    /// `before` is the sequence prior to the mutation. Nothing is recorded when
    /// the mutation left the sequence unchanged. Returns whether an entry was pushed.
    pub fn record(&mut self, before: Vec<Mark>, after: &[Mark]) -> bool {
        if before.as_slice() == after {
            return false;
        }
        self.past.push(before);
        self.future.clear();
        if self.past.len() > self.limit {
            self.past.remove(0);
        }
        true
    }

    /// Step back. Returns the snapshot to restore, or `None` when there is nothing to undo.
    pub fn undo(&mut self, current: Vec<Mark>) -> Option<Vec<Mark>> {
        let snapshot = self.past.pop()?;
        self.future.push(current);
        Some(snapshot)
    }

    /// Step forward. Returns the snapshot to restore, or `None` when there is nothing to redo.
    pub fn redo(&mut self, current: Vec<Mark>) -> Option<Vec<Mark>> {
        let snapshot = self.future.pop()?;
        self.past.push(current);
        Some(snapshot)
    }

    /// Forget all entries.
    pub fn reset(&mut self) {
        self.past.clear();
        self.future.clear();
    }

    pub fn past_count(&self) -> usize {
        self.past.len()
    }

    pub fn future_count(&self) -> usize {
        self.future.len()
    }

    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marks::Tool;
    use kurbo::Point;

    fn mark() -> Mark {
        Mark::new(Tool::Pen, Point::ZERO, "#000000", 5.0, 1.0)
    }

    #[test]
    fn test_unchanged_records_nothing() {
        let mut history = History::default();
        assert!(!history.record(Vec::new(), &[]));
        assert!(!history.can_undo());
    }

    #[test]
    fn test_undo_redo_cycle() {
        let mut history = History::default();
        let a = mark();
        let mut current = vec![];
        let before = current.clone();
        current.push(a.clone());
        assert!(history.record(before, &current));

        let restored = history.undo(current.clone()).unwrap();
        assert!(restored.is_empty());
        assert_eq!(history.future_count(), 1);

        let again = history.redo(restored).unwrap();
        assert_eq!(again, vec![a]);
        assert_eq!(history.past_count(), 1);
        assert_eq!(history.future_count(), 0);
    }

    #[test]
    fn test_new_record_clears_future() {
        let mut history = History::default();
        history.record(vec![], &[mark()]);
        history.undo(vec![mark()]);
        assert!(history.can_redo());
        history.record(vec![], &[mark()]);
        assert!(!history.can_redo());
    }

    #[test]
    fn test_limit_drops_oldest() {
        let mut history = History::new(3);
        let mut seq = Vec::new();
        for _ in 0..5 {
            let before = seq.clone();
            seq.push(mark());
            history.record(before, &seq);
        }
        assert_eq!(history.past_count(), 3);

        let mut current = seq;
        while let Some(prev) = history.undo(current.clone()) {
            current = prev;
        }
        // The two oldest states fell off the stack.
        assert_eq!(current.len(), 2);
    }

    #[test]
    fn test_empty_stacks() {
        let mut history = History::default();
        assert!(history.undo(vec![]).is_none());
        assert!(history.redo(vec![]).is_none());
    }
}
