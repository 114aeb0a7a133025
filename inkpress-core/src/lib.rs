//! Session, annotation, and flattening engine for marking up paged
//! documents. Rendering and output formats live behind the traits in
//! [`backend`]; this crate owns everything in between, from the pixel-space
//! annotation store to the physical-space export pipeline.

mod annotation;
mod backend;
mod error;
mod export;
mod history;
mod overlay;
mod session;
mod store;
mod transform;

pub use ab_glyph::FontArc;

pub use annotation::{
    Annotation, Color, ColorParseError, PixelPoint, StrokeAnnotation, TextAnnotation,
    DEFAULT_FONT_SIZE, DEFAULT_STROKE_WIDTH,
};
pub use backend::{
    DocumentMutator, LineDraw, MutableDocument, PageRaster, RenderBackend, RenderProvider,
    RenderRequest, TextDraw,
};
pub use error::{ExportError, LoadError};
pub use export::{flatten, FLATTEN_COLOR};
pub use history::{HistoryStack, HISTORY_CAPACITY};
pub use overlay::{OverlayPainter, OverlaySurface};
pub use session::{
    document_fingerprint, Command, DocumentSession, Editor, LoadOutcome, LoadTicket, PageView,
    SessionEvent, SessionId,
};
pub use store::{AnnotationStore, StrokeHandle};
pub use transform::{PageTransform, PhysicalPoint, PhysicalSize};
