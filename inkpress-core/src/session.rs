use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::annotation::{Annotation, Color, PixelPoint, StrokeAnnotation, TextAnnotation};
use crate::backend::{DocumentMutator, PageRaster, RenderBackend, RenderProvider, RenderRequest};
use crate::error::{ExportError, LoadError};
use crate::history::HistoryStack;
use crate::store::{AnnotationStore, StrokeHandle};
use crate::transform::PhysicalSize;

pub type SessionId = Uuid;

static FINGERPRINT_NAMESPACE: Lazy<Uuid> = Lazy::new(|| {
    Uuid::parse_str("9f1c6d84-3b72-5e0a-8c55-1de94c7a6b31").expect("valid namespace UUID")
});

/// Stable identifier for a document's byte content. Two sessions over the
/// same bytes report the same fingerprint even though their session ids
/// differ.
pub fn document_fingerprint(bytes: &[u8]) -> Uuid {
    Uuid::new_v5(&FINGERPRINT_NAMESPACE, bytes)
}

/// Pixel geometry of one rendered page at the session scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageView {
    pub index: usize,
    pub pixel_width: u32,
    pub pixel_height: u32,
}

const RENDER_CACHE_CAPACITY: usize = 8;

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
struct CacheKey {
    page_index: usize,
    scale_milli: u32,
}

impl CacheKey {
    fn new(page_index: usize, scale: f32) -> Self {
        Self {
            page_index,
            scale_milli: quantize_scale(scale),
        }
    }

    fn distance(&self, reference_page: usize) -> usize {
        self.page_index.abs_diff(reference_page)
    }
}

fn quantize_scale(scale: f32) -> u32 {
    let scaled = (scale * 1000.0).round();
    if !scaled.is_finite() || scaled <= 0.0 {
        1
    } else if scaled > u32::MAX as f32 {
        u32::MAX
    } else {
        scaled as u32
    }
}

/// One loaded document plus everything layered on top of it: the annotation
/// store, the undo history, and a small render cache.
pub struct DocumentSession {
    id: SessionId,
    fingerprint: Uuid,
    bytes: Vec<u8>,
    scale: f32,
    pages: Vec<PageView>,
    backend: Arc<dyn RenderBackend>,
    store: AnnotationStore,
    history: HistoryStack,
    render_cache: Mutex<HashMap<CacheKey, PageRaster>>,
}

impl DocumentSession {
    fn new(bytes: Vec<u8>, scale: f32, pages: Vec<PageView>, backend: Arc<dyn RenderBackend>) -> Self {
        Self {
            id: Uuid::new_v4(),
            fingerprint: document_fingerprint(&bytes),
            bytes,
            scale,
            pages,
            backend,
            store: AnnotationStore::new(),
            history: HistoryStack::default(),
            render_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn fingerprint(&self) -> Uuid {
        self.fingerprint
    }

    /// The original document bytes, untouched by any annotation.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn page_views(&self) -> &[PageView] {
        &self.pages
    }

    pub fn page_view(&self, page_index: usize) -> Option<PageView> {
        self.pages.get(page_index).copied()
    }

    pub fn store(&self) -> &AnnotationStore {
        &self.store
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn render_page(&self, page_index: usize) -> Result<PageRaster> {
        if page_index >= self.pages.len() {
            return Err(anyhow!("page {} out of range", page_index));
        }

        let key = CacheKey::new(page_index, self.scale);
        if let Some(raster) = self.render_cache.lock().get(&key) {
            return Ok(raster.clone());
        }

        let raster = self.backend.render_page(RenderRequest {
            page_index,
            scale: self.scale,
        })?;
        self.store_cached_render(key, &raster, page_index);
        Ok(raster)
    }

    fn store_cached_render(&self, key: CacheKey, raster: &PageRaster, reference_page: usize) {
        let mut cache = self.render_cache.lock();
        cache.insert(key, raster.clone());

        if cache.len() > RENDER_CACHE_CAPACITY {
            let mut keys: Vec<_> = cache.keys().cloned().collect();
            keys.sort_by_key(|k| k.distance(reference_page));
            for stale in keys.into_iter().skip(RENDER_CACHE_CAPACITY) {
                cache.remove(&stale);
            }
        }
    }
}

/// Annotation edits accepted by [`Editor::apply`].
#[derive(Debug, Clone)]
pub enum Command {
    AddText {
        page_index: usize,
        anchor: PixelPoint,
        text: String,
        font_size: f32,
        color: Color,
    },
    AddStroke {
        page_index: usize,
        points: Vec<PixelPoint>,
        width: f32,
        color: Color,
    },
    Undo,
    ClearAnnotations,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    DocumentLoaded(SessionId),
    LoadSuperseded { generation: u64 },
    AnnotationsChanged(SessionId),
    OverlayDirty { session: SessionId, page_index: usize },
    UndoApplied { session: SessionId, restored: bool },
    ExportCompleted { session: SessionId, bytes: usize },
}

/// Claim on an in-flight load. Only the ticket from the most recent
/// [`Editor::begin_load`] may still install a session.
#[derive(Debug, Clone, Copy)]
pub struct LoadTicket {
    generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    Superseded,
}

/// Owns at most one [`DocumentSession`] and mediates every mutation so that
/// undo snapshots are taken exactly once per user-visible edit.
pub struct Editor {
    session: Option<DocumentSession>,
    scale: f32,
    generation: u64,
    events: Arc<Mutex<Vec<SessionEvent>>>,
}

impl Default for Editor {
    fn default() -> Self {
        Self::new()
    }
}

impl Editor {
    pub fn new() -> Self {
        Self::with_scale(1.0)
    }

    /// `scale` applies to every document this editor loads; it stays fixed
    /// for the lifetime of each session.
    pub fn with_scale(scale: f32) -> Self {
        Self {
            session: None,
            scale,
            generation: 0,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn events(&self) -> Arc<Mutex<Vec<SessionEvent>>> {
        Arc::clone(&self.events)
    }

    pub fn session(&self) -> Option<&DocumentSession> {
        self.session.as_ref()
    }

    /// Starts a load and invalidates the tickets of all earlier loads that
    /// have not committed yet.
    pub fn begin_load(&mut self) -> LoadTicket {
        self.generation += 1;
        LoadTicket {
            generation: self.generation,
        }
    }

    /// Installs a freshly opened backend as the current session, unless the
    /// ticket went stale or page geometry cannot be computed. On error the
    /// previous session stays in place.
    pub fn commit_load(
        &mut self,
        ticket: LoadTicket,
        bytes: Vec<u8>,
        backend: Arc<dyn RenderBackend>,
    ) -> Result<LoadOutcome, LoadError> {
        if ticket.generation != self.generation {
            debug!(
                ticket = ticket.generation,
                current = self.generation,
                "discarding superseded load"
            );
            self.events.lock().push(SessionEvent::LoadSuperseded {
                generation: ticket.generation,
            });
            return Ok(LoadOutcome::Superseded);
        }

        let mut pages = Vec::with_capacity(backend.page_count());
        for index in 0..backend.page_count() {
            let raster = backend
                .render_page(RenderRequest {
                    page_index: index,
                    scale: self.scale,
                })
                .map_err(|err| LoadError::Malformed(format!("page {index}: {err:#}")))?;
            pages.push(PageView {
                index,
                pixel_width: raster.width,
                pixel_height: raster.height,
            });
        }

        let session = DocumentSession::new(bytes, self.scale, pages, backend);
        let id = session.id();
        self.session = Some(session);
        self.events.lock().push(SessionEvent::DocumentLoaded(id));
        Ok(LoadOutcome::Loaded)
    }

    #[instrument(skip(self, provider, bytes), fields(len = bytes.len()))]
    pub async fn open_with<P: RenderProvider>(
        &mut self,
        provider: &P,
        bytes: Vec<u8>,
    ) -> Result<LoadOutcome, LoadError> {
        let ticket = self.begin_load();
        let backend = provider.open(&bytes).await?;
        self.commit_load(ticket, bytes, backend)
    }

    /// Builds a blank document through `mutator`, then loads it like any
    /// other byte stream.
    #[instrument(skip(self, mutator, provider), fields(pages = page_sizes.len()))]
    pub async fn create_with<P: RenderProvider>(
        &mut self,
        mutator: &dyn DocumentMutator,
        page_sizes: &[PhysicalSize],
        provider: &P,
    ) -> Result<LoadOutcome> {
        let mut document = mutator.create(page_sizes)?;
        let bytes = document.serialize()?;
        Ok(self.open_with(provider, bytes).await?)
    }

    pub fn apply(&mut self, command: Command) -> Result<()> {
        let Some(session) = self.session.as_mut() else {
            debug!(?command, "command ignored, no document loaded");
            return Ok(());
        };
        let id = session.id;
        match command {
            Command::AddText {
                page_index,
                anchor,
                text,
                font_size,
                color,
            } => {
                let Some(annotation) = TextAnnotation::new(page_index, anchor, text, font_size, color)
                else {
                    debug!(page_index, "rejected empty text annotation");
                    return Ok(());
                };
                session.history.push(session.store.snapshot());
                session.store.append(Annotation::Text(annotation));
                let mut events = self.events.lock();
                events.push(SessionEvent::AnnotationsChanged(id));
                events.push(SessionEvent::OverlayDirty {
                    session: id,
                    page_index,
                });
            }
            Command::AddStroke {
                page_index,
                points,
                width,
                color,
            } => {
                session.history.push(session.store.snapshot());
                session
                    .store
                    .append(Annotation::Stroke(StrokeAnnotation::from_points(
                        page_index, points, width, color,
                    )));
                let mut events = self.events.lock();
                events.push(SessionEvent::AnnotationsChanged(id));
                events.push(SessionEvent::OverlayDirty {
                    session: id,
                    page_index,
                });
            }
            Command::Undo => match session.history.pop() {
                Some(snapshot) => {
                    session.store.replace_all(snapshot);
                    let mut events = self.events.lock();
                    events.push(SessionEvent::UndoApplied {
                        session: id,
                        restored: true,
                    });
                    events.push(SessionEvent::AnnotationsChanged(id));
                }
                None => {
                    self.events.lock().push(SessionEvent::UndoApplied {
                        session: id,
                        restored: false,
                    });
                }
            },
            Command::ClearAnnotations => {
                if session.store.is_empty() {
                    return Ok(());
                }
                session.history.push(session.store.snapshot());
                session.store.reset();
                self.events.lock().push(SessionEvent::AnnotationsChanged(id));
            }
        }
        Ok(())
    }

    /// Opens a drag gesture at `at`. The single undo snapshot for the whole
    /// gesture is taken here; the points that follow extend the same step.
    pub fn begin_stroke(
        &mut self,
        page_index: usize,
        at: PixelPoint,
        width: f32,
        color: Color,
    ) -> Option<StrokeHandle> {
        let session = self.session.as_mut()?;
        if page_index >= session.pages.len() {
            debug!(page_index, "stroke refused, page out of range");
            return None;
        }
        session.history.push(session.store.snapshot());
        let handle = session.store.begin_stroke(page_index, at, width, color);
        let id = session.id;
        let mut events = self.events.lock();
        events.push(SessionEvent::AnnotationsChanged(id));
        events.push(SessionEvent::OverlayDirty {
            session: id,
            page_index,
        });
        Some(handle)
    }

    pub fn append_stroke_point(&mut self, handle: StrokeHandle, point: PixelPoint) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if let Some(page_index) = session.store.append_point(handle, point) {
            let id = session.id;
            self.events.lock().push(SessionEvent::OverlayDirty {
                session: id,
                page_index,
            });
        }
    }

    pub fn end_stroke(&mut self, handle: StrokeHandle) {
        if let Some(session) = self.session.as_mut() {
            session.store.end_stroke(handle);
        }
    }

    /// Flattens the current annotations into a fresh copy of the document
    /// and returns the serialized result. The session itself is untouched.
    pub fn export_with(&self, mutator: &dyn DocumentMutator) -> Result<Vec<u8>, ExportError> {
        let session = self.session.as_ref().ok_or(ExportError::NoDocumentLoaded)?;
        let bytes = crate::export::flatten(session, mutator)?;
        self.events.lock().push(SessionEvent::ExportCompleted {
            session: session.id,
            bytes: bytes.len(),
        });
        Ok(bytes)
    }
}
