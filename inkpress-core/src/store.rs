use std::collections::HashMap;

use tracing::debug;

use crate::annotation::{Annotation, Color, PixelPoint, StrokeAnnotation};

/// Grants append access to exactly one in-flight stroke. Handles go stale
/// when the stroke ends or the collection is replaced or reset; a stale
/// handle can never touch another stroke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrokeHandle {
    token: u64,
}

/// The live, ordered annotation sequence for one document session.
///
/// The store never pushes history itself: callers snapshot before mutating,
/// which keeps "what counts as one undo step" a call-site policy.
#[derive(Debug, Default)]
pub struct AnnotationStore {
    annotations: Vec<Annotation>,
    active_strokes: HashMap<u64, usize>,
    next_token: u64,
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    /// Annotations bound to one page, in append order.
    pub fn for_page(&self, page_index: usize) -> impl Iterator<Item = &Annotation> + '_ {
        self.annotations
            .iter()
            .filter(move |annotation| annotation.page_index() == page_index)
    }

    /// Deep copy for the history stack; shares no mutable structure with the
    /// live sequence.
    pub fn snapshot(&self) -> Vec<Annotation> {
        self.annotations.clone()
    }

    pub fn append(&mut self, annotation: Annotation) {
        self.annotations.push(annotation);
    }

    pub fn begin_stroke(
        &mut self,
        page_index: usize,
        first: PixelPoint,
        width: f32,
        color: Color,
    ) -> StrokeHandle {
        let token = self.next_token;
        self.next_token += 1;
        let index = self.annotations.len();
        self.annotations.push(Annotation::Stroke(StrokeAnnotation::new(
            page_index, first, width, color,
        )));
        self.active_strokes.insert(token, index);
        StrokeHandle { token }
    }

    /// Extends the handle's stroke while it is active. Returns the stroke's
    /// page index on success; a stale handle is a no-op and returns `None`.
    pub fn append_point(&mut self, handle: StrokeHandle, point: PixelPoint) -> Option<usize> {
        let Some(&index) = self.active_strokes.get(&handle.token) else {
            debug!(token = handle.token, "ignoring point for stale stroke handle");
            return None;
        };
        match self.annotations.get_mut(index) {
            Some(Annotation::Stroke(stroke)) => {
                stroke.push_point(point);
                Some(stroke.page_index)
            }
            _ => None,
        }
    }

    /// Freezes the handle's stroke. Idempotent; unknown handles are ignored.
    pub fn end_stroke(&mut self, handle: StrokeHandle) {
        self.active_strokes.remove(&handle.token);
    }

    /// Installs a historical snapshot. Used exclusively by undo.
    pub fn replace_all(&mut self, annotations: Vec<Annotation>) {
        self.annotations = annotations;
        self.active_strokes.clear();
    }

    /// Clears to empty, for new-document or load.
    pub fn reset(&mut self) {
        self.annotations.clear();
        self.active_strokes.clear();
    }
}
