use tracing::debug;

use crate::annotation::{Annotation, Color};
use crate::backend::{DocumentMutator, LineDraw, TextDraw};
use crate::error::ExportError;
use crate::session::DocumentSession;
use crate::transform::{PageTransform, PhysicalPoint};

/// Every flattened annotation is written in this color, whatever color it
/// carried on screen.
pub const FLATTEN_COLOR: Color = Color::CRIMSON;

/// Bakes the session's annotations into a fresh copy of the document and
/// returns the serialized bytes. The session bytes and store are read only;
/// a re-export after further edits starts again from the originals.
pub fn flatten(
    session: &DocumentSession,
    mutator: &dyn DocumentMutator,
) -> Result<Vec<u8>, ExportError> {
    let mut document = mutator.load(session.bytes()).map_err(serialization_failed)?;

    for annotation in session.store().annotations() {
        let page_index = annotation.page_index();
        let Some(view) = session.page_view(page_index) else {
            debug!(page_index, "skipping annotation, no such page in session");
            continue;
        };
        let Some(physical) = document.page_size(page_index) else {
            debug!(page_index, "skipping annotation, no such page in output");
            continue;
        };
        let transform = PageTransform::new(view, physical);

        match annotation {
            Annotation::Text(text) => {
                let at = transform.text_baseline(text.anchor, text.font_size);
                document
                    .draw_text(
                        page_index,
                        &text.text,
                        TextDraw {
                            at,
                            size: text.font_size,
                            color: FLATTEN_COLOR,
                        },
                    )
                    .map_err(serialization_failed)?;
            }
            Annotation::Stroke(stroke) => {
                let points: Vec<PhysicalPoint> = stroke
                    .points
                    .iter()
                    .map(|point| transform.to_physical(*point))
                    .collect();
                for pair in points.windows(2) {
                    document
                        .draw_line(
                            page_index,
                            LineDraw {
                                from: pair[0],
                                to: pair[1],
                                width: stroke.width,
                                color: FLATTEN_COLOR,
                            },
                        )
                        .map_err(serialization_failed)?;
                }
            }
        }
    }

    document.serialize().map_err(serialization_failed)
}

fn serialization_failed(err: anyhow::Error) -> ExportError {
    ExportError::SerializationFailed(format!("{err:#}"))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::{anyhow, Result};
    use parking_lot::Mutex;

    use super::*;
    use crate::annotation::PixelPoint;
    use crate::backend::{MutableDocument, PageRaster, RenderBackend, RenderProvider, RenderRequest};
    use crate::error::LoadError;
    use crate::session::{Command, Editor};
    use crate::transform::PhysicalSize;

    const EPSILON: f32 = 1e-3;

    struct FixedBackend {
        pages: Vec<(u32, u32)>,
    }

    impl RenderBackend for FixedBackend {
        fn page_count(&self) -> usize {
            self.pages.len()
        }

        fn render_page(&self, request: RenderRequest) -> Result<PageRaster> {
            let (width, height) = self
                .pages
                .get(request.page_index)
                .copied()
                .ok_or_else(|| anyhow!("page {} out of range", request.page_index))?;
            Ok(PageRaster {
                width,
                height,
                pixels: vec![0xff; width as usize * height as usize * 4],
            })
        }
    }

    struct FixedProvider {
        pages: Vec<(u32, u32)>,
    }

    #[async_trait::async_trait]
    impl RenderProvider for FixedProvider {
        async fn open(&self, _bytes: &[u8]) -> Result<Arc<dyn RenderBackend>, LoadError> {
            Ok(Arc::new(FixedBackend {
                pages: self.pages.clone(),
            }))
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum DrawCall {
        Text {
            page_index: usize,
            text: String,
            at: PhysicalPoint,
            size: f32,
            color: Color,
        },
        Line {
            page_index: usize,
            from: PhysicalPoint,
            to: PhysicalPoint,
            width: f32,
            color: Color,
        },
    }

    struct RecordingMutator {
        calls: Arc<Mutex<Vec<DrawCall>>>,
        pages: Vec<PhysicalSize>,
        fail_serialize: bool,
    }

    impl RecordingMutator {
        fn new(pages: Vec<PhysicalSize>) -> Self {
            Self {
                calls: Arc::new(Mutex::new(Vec::new())),
                pages,
                fail_serialize: false,
            }
        }

        fn letter_pages(count: usize) -> Self {
            Self::new(vec![PhysicalSize::new(612.0, 792.0); count])
        }

        fn calls(&self) -> Vec<DrawCall> {
            self.calls.lock().clone()
        }
    }

    impl DocumentMutator for RecordingMutator {
        fn load(&self, _bytes: &[u8]) -> Result<Box<dyn MutableDocument>> {
            Ok(Box::new(RecordingDocument {
                calls: Arc::clone(&self.calls),
                pages: self.pages.clone(),
                fail_serialize: self.fail_serialize,
            }))
        }

        fn create(&self, pages: &[PhysicalSize]) -> Result<Box<dyn MutableDocument>> {
            Ok(Box::new(RecordingDocument {
                calls: Arc::clone(&self.calls),
                pages: pages.to_vec(),
                fail_serialize: self.fail_serialize,
            }))
        }
    }

    struct RecordingDocument {
        calls: Arc<Mutex<Vec<DrawCall>>>,
        pages: Vec<PhysicalSize>,
        fail_serialize: bool,
    }

    impl MutableDocument for RecordingDocument {
        fn page_count(&self) -> usize {
            self.pages.len()
        }

        fn page_size(&self, page_index: usize) -> Option<PhysicalSize> {
            self.pages.get(page_index).copied()
        }

        fn draw_text(&mut self, page_index: usize, text: &str, op: TextDraw) -> Result<()> {
            self.calls.lock().push(DrawCall::Text {
                page_index,
                text: text.to_string(),
                at: op.at,
                size: op.size,
                color: op.color,
            });
            Ok(())
        }

        fn draw_line(&mut self, page_index: usize, op: LineDraw) -> Result<()> {
            self.calls.lock().push(DrawCall::Line {
                page_index,
                from: op.from,
                to: op.to,
                width: op.width,
                color: op.color,
            });
            Ok(())
        }

        fn serialize(&mut self) -> Result<Vec<u8>> {
            if self.fail_serialize {
                return Err(anyhow!("disk full"));
            }
            Ok(b"%PDF-flattened".to_vec())
        }
    }

    async fn letter_editor() -> Editor {
        let mut editor = Editor::new();
        editor
            .open_with(&FixedProvider { pages: vec![(900, 1400)] }, b"%PDF-doc".to_vec())
            .await
            .unwrap();
        editor
    }

    fn text_at(page_index: usize, x: f32, y: f32, text: &str) -> Command {
        Command::AddText {
            page_index,
            anchor: PixelPoint::new(x, y),
            text: text.to_string(),
            font_size: 18.0,
            color: Color::INK_BLUE,
        }
    }

    fn stroke_on(page_index: usize, points: Vec<PixelPoint>) -> Command {
        Command::AddStroke {
            page_index,
            points,
            width: 2.0,
            color: Color::INK_BLUE,
        }
    }

    #[tokio::test]
    async fn text_lands_at_flipped_baseline() {
        let mut editor = letter_editor().await;
        editor.apply(text_at(0, 50.0, 50.0, "Hi")).unwrap();

        let mutator = RecordingMutator::letter_pages(1);
        let bytes = editor.export_with(&mutator).unwrap();
        assert_eq!(bytes, b"%PDF-flattened");

        let calls = mutator.calls();
        assert_eq!(calls.len(), 1);
        match &calls[0] {
            DrawCall::Text { at, size, text, .. } => {
                assert_eq!(text, "Hi");
                assert_eq!(*size, 18.0);
                // 50 px across a 900 px view of a 612 pt page.
                assert!((at.x - 34.0).abs() < EPSILON);
                // Flip then drop one font size below the anchor.
                assert!((at.y - 745.714).abs() < EPSILON);
            }
            other => panic!("expected text draw, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn flatten_preserves_append_order() {
        let mut editor = letter_editor().await;
        editor
            .apply(stroke_on(
                0,
                vec![PixelPoint::new(0.0, 0.0), PixelPoint::new(10.0, 0.0)],
            ))
            .unwrap();
        editor.apply(text_at(0, 100.0, 100.0, "between")).unwrap();
        editor
            .apply(stroke_on(
                0,
                vec![PixelPoint::new(0.0, 10.0), PixelPoint::new(10.0, 10.0)],
            ))
            .unwrap();

        let mutator = RecordingMutator::letter_pages(1);
        editor.export_with(&mutator).unwrap();

        let kinds: Vec<&'static str> = mutator
            .calls()
            .iter()
            .map(|call| match call {
                DrawCall::Line { .. } => "line",
                DrawCall::Text { .. } => "text",
            })
            .collect();
        assert_eq!(kinds, ["line", "text", "line"]);
    }

    #[tokio::test]
    async fn stroke_yields_one_segment_per_consecutive_pair() {
        let mut editor = letter_editor().await;
        let points = vec![
            PixelPoint::new(0.0, 0.0),
            PixelPoint::new(10.0, 0.0),
            PixelPoint::new(20.0, 10.0),
            PixelPoint::new(30.0, 10.0),
        ];
        editor.apply(stroke_on(0, points)).unwrap();

        let mutator = RecordingMutator::letter_pages(1);
        editor.export_with(&mutator).unwrap();

        let calls = mutator.calls();
        assert_eq!(calls.len(), 3);
        for pair in calls.windows(2) {
            match (&pair[0], &pair[1]) {
                (DrawCall::Line { to, .. }, DrawCall::Line { from, .. }) => {
                    assert_eq!(to, from);
                }
                other => panic!("expected line draws, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn degenerate_strokes_draw_nothing() {
        let mut editor = letter_editor().await;
        editor.apply(stroke_on(0, vec![PixelPoint::new(5.0, 5.0)])).unwrap();
        editor.apply(stroke_on(0, Vec::new())).unwrap();

        let mutator = RecordingMutator::letter_pages(1);
        let bytes = editor.export_with(&mutator).unwrap();

        assert_eq!(bytes, b"%PDF-flattened");
        assert!(mutator.calls().is_empty());
    }

    #[tokio::test]
    async fn dangling_page_is_skipped() {
        let mut editor = letter_editor().await;
        editor.apply(text_at(7, 10.0, 10.0, "nowhere")).unwrap();
        editor.apply(text_at(0, 10.0, 10.0, "here")).unwrap();

        let mutator = RecordingMutator::letter_pages(1);
        editor.export_with(&mutator).unwrap();

        let calls = mutator.calls();
        assert_eq!(calls.len(), 1);
        assert!(matches!(
            &calls[0],
            DrawCall::Text { page_index: 0, text, .. } if text == "here"
        ));
    }

    #[tokio::test]
    async fn page_missing_from_output_is_skipped() {
        let mut editor = Editor::new();
        editor
            .open_with(
                &FixedProvider {
                    pages: vec![(900, 1400), (900, 1400)],
                },
                b"%PDF-doc".to_vec(),
            )
            .await
            .unwrap();
        editor.apply(text_at(1, 10.0, 10.0, "second page")).unwrap();

        // The output document only has one page to draw on.
        let mutator = RecordingMutator::letter_pages(1);
        editor.export_with(&mutator).unwrap();
        assert!(mutator.calls().is_empty());
    }

    #[tokio::test]
    async fn flattened_color_is_fixed() {
        let mut editor = letter_editor().await;
        editor.apply(text_at(0, 10.0, 10.0, "tinted")).unwrap();
        editor
            .apply(stroke_on(
                0,
                vec![PixelPoint::new(0.0, 0.0), PixelPoint::new(10.0, 0.0)],
            ))
            .unwrap();

        let mutator = RecordingMutator::letter_pages(1);
        editor.export_with(&mutator).unwrap();

        for call in mutator.calls() {
            let color = match call {
                DrawCall::Text { color, .. } => color,
                DrawCall::Line { color, .. } => color,
            };
            assert_eq!(color, FLATTEN_COLOR);
        }
    }

    #[tokio::test]
    async fn serialize_failure_is_reported() {
        let mut editor = letter_editor().await;
        editor.apply(text_at(0, 10.0, 10.0, "doomed")).unwrap();

        let mut mutator = RecordingMutator::letter_pages(1);
        mutator.fail_serialize = true;

        let err = editor.export_with(&mutator).unwrap_err();
        assert!(matches!(err, ExportError::SerializationFailed(_)));
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn export_without_document_fails() {
        let editor = Editor::new();
        let mutator = RecordingMutator::letter_pages(1);
        let err = editor.export_with(&mutator).unwrap_err();
        assert!(matches!(err, ExportError::NoDocumentLoaded));
    }
}
