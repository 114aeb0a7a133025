//! lopdf-backed implementations of the inkpress-core document traits.
//!
//! The default rasterizer parses real page geometry but paints placeholder
//! page images; enable the `pdfium` feature for full-fidelity rendering.
//! Writing, by contrast, is always real: [`LopdfMutator`] draws annotations
//! into actual content streams.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use lopdf::{Document, Object, ObjectId};
use tracing::debug;

use inkpress_core::{
    LoadError, PageRaster, PhysicalSize, RenderBackend, RenderProvider, RenderRequest,
};

mod compose;
#[cfg(feature = "pdfium")]
mod pdfium;

pub use compose::LopdfMutator;
#[cfg(feature = "pdfium")]
pub use pdfium::PdfiumRasterizer;

const FALLBACK_MEDIA_BOX: PhysicalSize = PhysicalSize {
    width: 612.0,
    height: 792.0,
};

const BORDER_GREY: [u8; 3] = [220, 220, 220];

/// Opens PDF bytes with lopdf and serves placeholder rasters sized from the
/// true page geometry. Good enough to drive overlays and previews without a
/// native rendering library.
#[derive(Debug, Default)]
pub struct LopdfRasterizer;

impl LopdfRasterizer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RenderProvider for LopdfRasterizer {
    async fn open(&self, bytes: &[u8]) -> Result<Arc<dyn RenderBackend>, LoadError> {
        let sizes = probe(bytes)?;
        debug!(bytes = bytes.len(), pages = sizes.len(), "opened document with lopdf");
        Ok(Arc::new(LopdfPages { sizes }))
    }
}

fn probe(bytes: &[u8]) -> Result<Vec<PhysicalSize>, LoadError> {
    if bytes
        .windows(b"/Encrypt".len())
        .any(|window| window == b"/Encrypt")
    {
        return Err(LoadError::PasswordProtected);
    }

    let document =
        Document::load_mem(bytes).map_err(|err| LoadError::Malformed(err.to_string()))?;
    let sizes = page_sizes(&document);
    if sizes.is_empty() {
        return Err(LoadError::Malformed("document has no pages".into()));
    }
    Ok(sizes)
}

pub(crate) fn page_sizes(document: &Document) -> Vec<PhysicalSize> {
    document
        .get_pages()
        .into_iter()
        .map(|(_, page_id)| media_box(document, page_id).unwrap_or(FALLBACK_MEDIA_BOX))
        .collect()
}

fn media_box(document: &Document, page_id: ObjectId) -> Option<PhysicalSize> {
    // MediaBox may be inherited from an ancestor Pages node.
    let mut current = page_id;
    for _ in 0..32 {
        let dict = document.get_dictionary(current).ok()?;
        if let Ok(object) = dict.get(b"MediaBox") {
            let array = object.as_array().ok()?;
            if array.len() != 4 {
                return None;
            }
            let x0 = number(&array[0])?;
            let y0 = number(&array[1])?;
            let x1 = number(&array[2])?;
            let y1 = number(&array[3])?;
            return Some(PhysicalSize {
                width: (x1 - x0).abs(),
                height: (y1 - y0).abs(),
            });
        }
        current = dict.get(b"Parent").ok()?.as_reference().ok()?;
    }
    None
}

fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value),
        _ => None,
    }
}

struct LopdfPages {
    sizes: Vec<PhysicalSize>,
}

impl RenderBackend for LopdfPages {
    fn page_count(&self) -> usize {
        self.sizes.len()
    }

    fn render_page(&self, request: RenderRequest) -> Result<PageRaster> {
        let size = self
            .sizes
            .get(request.page_index)
            .copied()
            .ok_or_else(|| anyhow!("page {} out of range", request.page_index))?;
        let scale = if request.scale <= 0.0 { 1.0 } else { request.scale };

        let width = (size.width * scale).round().max(1.0) as u32;
        let height = (size.height * scale).round().max(1.0) as u32;
        let mut pixels = vec![0xff; width as usize * height as usize * 4];

        if width >= 4 && height >= 4 {
            for x in 0..width {
                paint_border(&mut pixels, width, x, 0);
                paint_border(&mut pixels, width, x, height - 1);
            }
            for y in 0..height {
                paint_border(&mut pixels, width, 0, y);
                paint_border(&mut pixels, width, width - 1, y);
            }
        }

        Ok(PageRaster {
            width,
            height,
            pixels,
        })
    }
}

fn paint_border(pixels: &mut [u8], width: u32, x: u32, y: u32) {
    let index = (y as usize * width as usize + x as usize) * 4;
    pixels[index..index + 3].copy_from_slice(&BORDER_GREY);
}

#[cfg(test)]
mod tests {
    use lopdf::dictionary;

    use super::*;
    use inkpress_core::DocumentMutator;

    fn two_page_pdf() -> Vec<u8> {
        let mutator = LopdfMutator::new();
        let mut document = mutator
            .create(&[
                PhysicalSize::new(612.0, 792.0),
                PhysicalSize::new(400.0, 400.0),
            ])
            .unwrap();
        document.serialize().unwrap()
    }

    #[tokio::test]
    async fn opens_pdf_and_reads_page_geometry() {
        let backend = LopdfRasterizer::new().open(&two_page_pdf()).await.unwrap();
        assert_eq!(backend.page_count(), 2);

        let raster = backend
            .render_page(RenderRequest {
                page_index: 1,
                scale: 1.0,
            })
            .unwrap();
        assert_eq!((raster.width, raster.height), (400, 400));
    }

    #[tokio::test]
    async fn placeholder_raster_tracks_scale() {
        let backend = LopdfRasterizer::new().open(&two_page_pdf()).await.unwrap();
        let raster = backend
            .render_page(RenderRequest {
                page_index: 0,
                scale: 1.5,
            })
            .unwrap();
        assert_eq!((raster.width, raster.height), (918, 1188));
        // White body, grey frame.
        assert_eq!(&raster.pixels[..4], &[220, 220, 220, 255]);
        let center = ((raster.height / 2) as usize * raster.width as usize
            + (raster.width / 2) as usize)
            * 4;
        assert_eq!(&raster.pixels[center..center + 4], &[255, 255, 255, 255]);
    }

    #[tokio::test]
    async fn garbage_bytes_are_malformed() {
        let result = LopdfRasterizer::new().open(b"this is not a pdf").await;
        assert!(matches!(result, Err(LoadError::Malformed(_))));
    }

    #[tokio::test]
    async fn encrypted_documents_are_refused() {
        let mut bytes = two_page_pdf();
        bytes.extend_from_slice(b"/Encrypt");
        let result = LopdfRasterizer::new().open(&bytes).await;
        assert!(matches!(result, Err(LoadError::PasswordProtected)));
    }

    #[test]
    fn media_box_falls_back_to_letter() {
        let mut document = Document::with_version("1.7");
        let page_id = document.add_object(dictionary! {
            "Type" => "Page",
        });
        let pages_id = document.add_object(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1,
        });
        if let Ok(page) = document.get_object_mut(page_id) {
            if let Ok(dict) = page.as_dict_mut() {
                dict.set("Parent", Object::Reference(pages_id));
            }
        }
        let catalog_id = document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        document.trailer.set("Root", Object::Reference(catalog_id));

        let sizes = page_sizes(&document);
        assert_eq!(sizes, vec![FALLBACK_MEDIA_BOX]);
    }

    #[test]
    fn media_box_inherited_from_pages_node() {
        let mut document = Document::with_version("1.7");
        let page_id = document.add_object(dictionary! {
            "Type" => "Page",
        });
        let pages_id = document.add_object(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1,
            "MediaBox" => vec![0.into(), 0.into(), 300.into(), 500.into()],
        });
        if let Ok(page) = document.get_object_mut(page_id) {
            if let Ok(dict) = page.as_dict_mut() {
                dict.set("Parent", Object::Reference(pages_id));
            }
        }
        let catalog_id = document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        document.trailer.set("Root", Object::Reference(catalog_id));

        let sizes = page_sizes(&document);
        assert_eq!(sizes, vec![PhysicalSize::new(300.0, 500.0)]);
    }
}
