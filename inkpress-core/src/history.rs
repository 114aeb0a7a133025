use std::collections::VecDeque;

use tracing::debug;

use crate::annotation::Annotation;

pub const HISTORY_CAPACITY: usize = 50;

/// Bounded undo stack of deep annotation snapshots.
///
/// Entries are taken *before* a mutation, so popping one restores the exact
/// pre-mutation state. Push and pop happen at the top; a full stack silently
/// evicts its oldest entry instead of refusing the push. There is no redo:
/// once undone, a state is gone. That is a deliberate limitation, not an
/// oversight.
#[derive(Debug)]
pub struct HistoryStack {
    entries: VecDeque<Vec<Annotation>>,
    capacity: usize,
}

impl Default for HistoryStack {
    fn default() -> Self {
        Self::new(HISTORY_CAPACITY)
    }
}

impl HistoryStack {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn push(&mut self, snapshot: Vec<Annotation>) {
        self.entries.push_back(snapshot);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
            debug!(capacity = self.capacity, "evicted oldest undo snapshot");
        }
    }

    /// `None` means no history; callers treat that as a no-op, not an error.
    pub fn pop(&mut self) -> Option<Vec<Annotation>> {
        self.entries.pop_back()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{Color, PixelPoint, TextAnnotation};

    fn snapshot_of(label: &str) -> Vec<Annotation> {
        vec![Annotation::Text(
            TextAnnotation::new(0, PixelPoint::new(0.0, 0.0), label, 18.0, Color::BLACK).unwrap(),
        )]
    }

    fn label_of(snapshot: &[Annotation]) -> &str {
        match &snapshot[0] {
            Annotation::Text(text) => &text.text,
            Annotation::Stroke(_) => "<stroke>",
        }
    }

    #[test]
    fn pop_returns_most_recent_first() {
        let mut history = HistoryStack::default();
        history.push(snapshot_of("first"));
        history.push(snapshot_of("second"));

        assert_eq!(label_of(&history.pop().unwrap()), "second");
        assert_eq!(label_of(&history.pop().unwrap()), "first");
        assert!(history.pop().is_none());
    }

    #[test]
    fn pop_on_empty_reports_none() {
        let mut history = HistoryStack::default();
        assert!(history.pop().is_none());
        assert!(history.is_empty());
    }

    #[test]
    fn capacity_evicts_oldest_entries() {
        let mut history = HistoryStack::default();
        for n in 0..55 {
            history.push(snapshot_of(&format!("edit {n}")));
        }
        assert_eq!(history.len(), HISTORY_CAPACITY);

        // The 50 most recent snapshots are retrievable, newest first; the
        // five oldest were evicted from the bottom.
        for n in (5..55).rev() {
            let snapshot = history.pop().expect("snapshot within capacity");
            assert_eq!(label_of(&snapshot), format!("edit {n}"));
        }
        assert!(history.pop().is_none());
    }

    #[test]
    fn clear_drops_everything() {
        let mut history = HistoryStack::default();
        history.push(snapshot_of("only"));
        history.clear();
        assert!(history.pop().is_none());
    }
}
