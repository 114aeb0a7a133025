use ab_glyph::{Font, FontArc, GlyphId, PxScale, ScaleFont};
use tracing::warn;

use crate::annotation::{Annotation, Color, PixelPoint, StrokeAnnotation, TextAnnotation};
use crate::backend::PageRaster;
use crate::session::PageView;

/// Transparent straight-alpha RGBA surface stacked on top of a page raster.
#[derive(Debug, Clone)]
pub struct OverlaySurface {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl OverlaySurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn for_view(view: PageView) -> Self {
        Self::new(view.pixel_width, view.pixel_height)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn clear(&mut self) {
        self.pixels.fill(0);
    }

    fn pixel_mut(&mut self, x: i32, y: i32) -> Option<&mut [u8]> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return None;
        }
        let index = (y as usize * self.width as usize + x as usize) * 4;
        Some(&mut self.pixels[index..index + 4])
    }

    /// Source-over blend of `color` at `coverage` into the surface.
    fn blend(&mut self, x: i32, y: i32, color: Color, coverage: f32) {
        let Some(pixel) = self.pixel_mut(x, y) else {
            return;
        };
        let src_a = (color.a as f32 / 255.0) * coverage.clamp(0.0, 1.0);
        if src_a <= 0.0 {
            return;
        }
        let dst_a = pixel[3] as f32 / 255.0;
        let out_a = src_a + dst_a * (1.0 - src_a);
        if out_a <= 0.0 {
            return;
        }
        let src = [color.r as f32, color.g as f32, color.b as f32];
        for channel in 0..3 {
            let dst = pixel[channel] as f32;
            let blended = (src[channel] * src_a + dst * dst_a * (1.0 - src_a)) / out_a;
            pixel[channel] = blended.round().clamp(0.0, 255.0) as u8;
        }
        pixel[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    }

    /// Alpha-composites this overlay onto an opaque page raster in place.
    pub fn composite_onto(&self, base: &mut PageRaster) {
        let width = self.width.min(base.width) as usize;
        let height = self.height.min(base.height) as usize;
        for y in 0..height {
            for x in 0..width {
                let src_index = (y * self.width as usize + x) * 4;
                let alpha = self.pixels[src_index + 3] as f32 / 255.0;
                if alpha <= 0.0 {
                    continue;
                }
                let inv = 1.0 - alpha;
                let dst_index = (y * base.width as usize + x) * 4;
                for channel in 0..3 {
                    let src = self.pixels[src_index + channel] as f32;
                    let dst = base.pixels[dst_index + channel] as f32;
                    base.pixels[dst_index + channel] =
                        (src * alpha + dst * inv).round().clamp(0.0, 255.0) as u8;
                }
            }
        }
    }
}

/// Repaints page overlays from the live annotation sequence.
///
/// Annotations draw in append order, later ones over earlier ones; that
/// order is the only z-ordering mechanism and survives undo because undo
/// restores the sequence exactly.
pub struct OverlayPainter {
    font: Option<FontArc>,
}

impl Default for OverlayPainter {
    fn default() -> Self {
        Self::new()
    }
}

impl OverlayPainter {
    /// A painter without a font draws strokes only; text annotations are
    /// skipped with a warning. Flattened exports are unaffected.
    pub fn new() -> Self {
        Self { font: None }
    }

    pub fn with_font(font: FontArc) -> Self {
        Self { font: Some(font) }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    pub fn repaint<'a, I>(&self, surface: &mut OverlaySurface, annotations: I)
    where
        I: IntoIterator<Item = &'a Annotation>,
    {
        surface.clear();
        let mut skipped_text = 0usize;
        for annotation in annotations {
            match annotation {
                Annotation::Stroke(stroke) => draw_stroke(surface, stroke),
                Annotation::Text(text) => match &self.font {
                    Some(font) => draw_text(surface, font, text),
                    None => skipped_text += 1,
                },
            }
        }
        if skipped_text > 0 {
            warn!(skipped_text, "no overlay font configured, text annotations not painted");
        }
    }
}

fn draw_stroke(surface: &mut OverlaySurface, stroke: &StrokeAnnotation) {
    // Fewer than two points is an interrupted drag; nothing to show.
    if stroke.points.len() < 2 {
        return;
    }
    let radius = (stroke.width / 2.0).max(0.5);
    for pair in stroke.points.windows(2) {
        stamp_segment(surface, pair[0], pair[1], radius, stroke.color);
    }
}

fn stamp_segment(
    surface: &mut OverlaySurface,
    from: PixelPoint,
    to: PixelPoint,
    radius: f32,
    color: Color,
) {
    let dx = to.x - from.x;
    let dy = to.y - from.y;
    let length = (dx * dx + dy * dy).sqrt();
    let step = (radius * 0.5).max(0.5);
    let count = (length / step).ceil() as usize + 1;
    for i in 0..count {
        let t = if count <= 1 {
            0.0
        } else {
            i as f32 / (count - 1) as f32
        };
        stamp_disc(surface, from.x + dx * t, from.y + dy * t, radius, color);
    }
}

fn stamp_disc(surface: &mut OverlaySurface, cx: f32, cy: f32, radius: f32, color: Color) {
    let min_x = (cx - radius - 1.0).floor() as i32;
    let max_x = (cx + radius + 1.0).ceil() as i32;
    let min_y = (cy - radius - 1.0).floor() as i32;
    let max_y = (cy + radius + 1.0).ceil() as i32;
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let px = x as f32 + 0.5;
            let py = y as f32 + 0.5;
            let distance = ((px - cx).powi(2) + (py - cy).powi(2)).sqrt();
            let coverage = (radius + 0.5 - distance).clamp(0.0, 1.0);
            if coverage > 0.0 {
                surface.blend(x, y, color, coverage);
            }
        }
    }
}

fn draw_text(surface: &mut OverlaySurface, font: &FontArc, text: &TextAnnotation) {
    let scaled = font.as_scaled(PxScale::from(text.font_size.max(1.0)));
    // The anchor is the visual top-left of the label; glyphs position from
    // the baseline, one ascent below it.
    let baseline_y = text.anchor.y + scaled.ascent();
    let mut caret_x = text.anchor.x;
    let mut previous: Option<GlyphId> = None;
    for ch in text.text.chars() {
        if ch.is_control() {
            continue;
        }
        let mut glyph = scaled.scaled_glyph(ch);
        if let Some(prev) = previous {
            caret_x += scaled.kern(prev, glyph.id);
        }
        glyph.position = ab_glyph::point(caret_x, baseline_y);
        caret_x += scaled.h_advance(glyph.id);
        previous = Some(glyph.id);
        if let Some(outlined) = font.outline_glyph(glyph) {
            let bounds = outlined.px_bounds();
            outlined.draw(|x, y, coverage| {
                surface.blend(
                    bounds.min.x as i32 + x as i32,
                    bounds.min.y as i32 + y as i32,
                    text.color,
                    coverage,
                );
            });
        }
    }
}
