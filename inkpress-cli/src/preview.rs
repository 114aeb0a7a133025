use std::fs;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use inkpress_core::{DocumentSession, OverlayPainter, OverlaySurface, PageRaster};
use png::{BitDepth, ColorType, Encoder};

/// Renders one page at the session scale and composites that page's
/// annotations on top.
pub fn render_preview(
    session: &DocumentSession,
    painter: &OverlayPainter,
    page_index: usize,
) -> Result<PageRaster> {
    let view = session
        .page_view(page_index)
        .ok_or_else(|| anyhow!("page {} out of range", page_index))?;
    let mut raster = session.render_page(page_index)?;

    let mut surface = OverlaySurface::for_view(view);
    painter.repaint(&mut surface, session.store().for_page(page_index));
    surface.composite_onto(&mut raster);
    Ok(raster)
}

/// Writes one composited PNG per page into `dir`, named by the session's
/// content fingerprint. Returns the written paths in page order.
pub fn write_previews(
    session: &DocumentSession,
    painter: &OverlayPainter,
    dir: &Path,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {:?}", dir))?;
    let mut written = Vec::with_capacity(session.page_count());
    for view in session.page_views() {
        let raster = render_preview(session, painter, view.index)?;
        let path = dir.join(format!("{}-page{}.png", session.fingerprint(), view.index));
        write_png(&path, &raster)?;
        written.push(path);
    }
    Ok(written)
}

pub fn write_png(path: &Path, raster: &PageRaster) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {:?}", path))?;
    let mut encoder = Encoder::new(BufWriter::new(file), raster.width, raster.height);
    encoder.set_color(ColorType::Rgba);
    encoder.set_depth(BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(&raster.pixels)?;
    writer.finish()?;
    Ok(())
}
