use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use pdfium_render::prelude::*;
use tracing::{debug, instrument};

use inkpress_core::{LoadError, PageRaster, RenderBackend, RenderProvider, RenderRequest};

/// Full-fidelity rasterizer backed by a native pdfium library.
pub struct PdfiumRasterizer {
    pdfium: Arc<Pdfium>,
}

impl PdfiumRasterizer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            pdfium: Arc::new(bind_pdfium()?),
        })
    }
}

#[async_trait]
impl RenderProvider for PdfiumRasterizer {
    async fn open(&self, bytes: &[u8]) -> Result<Arc<dyn RenderBackend>, LoadError> {
        let page_count = {
            let document = self
                .pdfium
                .load_pdf_from_byte_slice(bytes, None)
                .map_err(load_error)?;
            usize::from(document.pages().len())
        };
        if page_count == 0 {
            return Err(LoadError::Malformed("document has no pages".into()));
        }
        debug!(bytes = bytes.len(), pages = page_count, "opened document with pdfium");

        Ok(Arc::new(PdfiumPages {
            pdfium: Arc::clone(&self.pdfium),
            bytes: bytes.to_vec(),
            page_count,
        }))
    }
}

fn load_error(err: PdfiumError) -> LoadError {
    match err {
        PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError) => {
            LoadError::PasswordProtected
        }
        other => LoadError::Malformed(other.to_string()),
    }
}

/// Keeps the raw bytes and reopens the document per render. Reopening is
/// cheap next to rasterization and sidesteps holding a pdfium document
/// handle across calls.
struct PdfiumPages {
    pdfium: Arc<Pdfium>,
    bytes: Vec<u8>,
    page_count: usize,
}

impl RenderBackend for PdfiumPages {
    fn page_count(&self) -> usize {
        self.page_count
    }

    #[instrument(skip(self))]
    fn render_page(&self, request: RenderRequest) -> Result<PageRaster> {
        let document = self
            .pdfium
            .load_pdf_from_byte_slice(&self.bytes, None)
            .map_err(|err| anyhow!("failed to reopen document: {err}"))?;

        let page_index: PdfPageIndex = request
            .page_index
            .try_into()
            .map_err(|_| anyhow!("page {} is out of supported range", request.page_index))?;
        let page = document
            .pages()
            .get(page_index)
            .with_context(|| format!("page {} out of range", request.page_index))?;

        let config = PdfRenderConfig::new().scale_page_by_factor(request.scale.max(0.1));
        let bitmap = page
            .render_with_config(&config)
            .with_context(|| format!("failed to render page {}", request.page_index))?;
        let pixels = bitmap.as_rgba_bytes();

        Ok(PageRaster {
            width: u32::try_from(bitmap.width()).unwrap_or_default(),
            height: u32::try_from(bitmap.height()).unwrap_or_default(),
            pixels,
        })
    }
}

fn bind_pdfium() -> Result<Pdfium> {
    let mut errors = Vec::new();

    let cwd_path = Pdfium::pdfium_platform_library_name_at_path("./");
    match Pdfium::bind_to_library(&cwd_path) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("{}: {}", cwd_path.display(), err));
        }
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("system: {err}"));
            Err(anyhow!(
                "failed to bind to a pdfium library; ensure it is installed ({})",
                errors.join(", ")
            ))
        }
    }
}
