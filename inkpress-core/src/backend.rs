use std::sync::Arc;

use anyhow::Result;

use crate::annotation::Color;
use crate::error::LoadError;
use crate::transform::{PhysicalPoint, PhysicalSize};

#[derive(Debug, Clone, Copy)]
pub struct RenderRequest {
    pub page_index: usize,
    pub scale: f32,
}

impl Default for RenderRequest {
    fn default() -> Self {
        Self {
            page_index: 0,
            scale: 1.0,
        }
    }
}

/// Opaque RGBA raster of one rendered page.
#[derive(Debug, Clone)]
pub struct PageRaster {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Read side of an opened document: page geometry and pixels.
pub trait RenderBackend: Send + Sync {
    fn page_count(&self) -> usize;
    fn render_page(&self, request: RenderRequest) -> Result<PageRaster>;
}

/// Opens raw bytes into a render backend. Opening may suspend the caller;
/// a failed open must leave the caller free to keep its current state.
#[async_trait::async_trait]
pub trait RenderProvider: Send + Sync {
    async fn open(&self, bytes: &[u8]) -> Result<Arc<dyn RenderBackend>, LoadError>;
}

#[derive(Debug, Clone, Copy)]
pub struct TextDraw {
    pub at: PhysicalPoint,
    pub size: f32,
    pub color: Color,
}

#[derive(Debug, Clone, Copy)]
pub struct LineDraw {
    pub from: PhysicalPoint,
    pub to: PhysicalPoint,
    pub width: f32,
    pub color: Color,
}

/// Write side: a document held open for mutation and reserialization.
/// Coordinates are physical page space (origin bottom-left, y up).
pub trait MutableDocument {
    fn page_count(&self) -> usize;
    fn page_size(&self, page_index: usize) -> Option<PhysicalSize>;
    fn draw_text(&mut self, page_index: usize, text: &str, op: TextDraw) -> Result<()>;
    fn draw_line(&mut self, page_index: usize, op: LineDraw) -> Result<()>;
    fn serialize(&mut self) -> Result<Vec<u8>>;
}

/// Factory for mutable documents, from existing bytes or from scratch.
pub trait DocumentMutator {
    fn load(&self, bytes: &[u8]) -> Result<Box<dyn MutableDocument>>;
    fn create(&self, pages: &[PhysicalSize]) -> Result<Box<dyn MutableDocument>>;
}
