use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};
use thiserror::Error;

pub const DEFAULT_FONT_SIZE: f32 = 18.0;
pub const DEFAULT_STROKE_WIDTH: f32 = 2.0;

/// A point in overlay-pixel space: origin at the page's top-left corner,
/// y growing downward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: f32,
    pub y: f32,
}

impl PixelPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// RGBA color. Displays as `#rrggbb`, or `#rrggbbaa` when not fully opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0x00, 0x00, 0x00);
    pub const CRIMSON: Color = Color::rgb(0xd6, 0x28, 0x28);
    pub const INK_BLUE: Color = Color::rgb(0x1d, 0x35, 0x57);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 0xff }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_normalized(self) -> [f32; 4] {
        [
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
            self.a as f32 / 255.0,
        ]
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.a == 0xff {
            write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            write!(f, "#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

#[derive(Debug, Error)]
#[error("invalid color {0:?}, expected #rrggbb or #rrggbbaa")]
pub struct ColorParseError(String);

impl FromStr for Color {
    type Err = ColorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ColorParseError(s.to_string());
        let hex = s.strip_prefix('#').ok_or_else(err)?;
        if !hex.is_ascii() || !(hex.len() == 6 || hex.len() == 8) {
            return Err(err());
        }
        let channel =
            |index: usize| u8::from_str_radix(&hex[index * 2..index * 2 + 2], 16).map_err(|_| err());
        Ok(Color {
            r: channel(0)?,
            g: channel(1)?,
            b: channel(2)?,
            a: if hex.len() == 8 { channel(3)? } else { 0xff },
        })
    }
}

/// A text label anchored at its visual top-left click point.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextAnnotation {
    pub page_index: usize,
    pub anchor: PixelPoint,
    pub text: String,
    pub font_size: f32,
    #[serde_as(as = "DisplayFromStr")]
    pub color: Color,
}

impl TextAnnotation {
    /// Returns `None` for empty text; a label always carries content.
    pub fn new(
        page_index: usize,
        anchor: PixelPoint,
        text: impl Into<String>,
        font_size: f32,
        color: Color,
    ) -> Option<Self> {
        let text = text.into();
        if text.is_empty() {
            return None;
        }
        Some(Self {
            page_index,
            anchor,
            text,
            font_size,
            color,
        })
    }
}

/// A freehand polyline. Interrupted drags can leave zero or one point; such
/// strokes are valid but render nothing.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrokeAnnotation {
    pub page_index: usize,
    pub points: Vec<PixelPoint>,
    pub width: f32,
    #[serde_as(as = "DisplayFromStr")]
    pub color: Color,
}

impl StrokeAnnotation {
    pub fn new(page_index: usize, first: PixelPoint, width: f32, color: Color) -> Self {
        Self {
            page_index,
            points: vec![first],
            width,
            color,
        }
    }

    pub fn from_points(page_index: usize, points: Vec<PixelPoint>, width: f32, color: Color) -> Self {
        Self {
            page_index,
            points,
            width,
            color,
        }
    }

    pub(crate) fn push_point(&mut self, point: PixelPoint) {
        self.points.push(point);
    }
}

/// The two mark variants. Exhaustively matched by the overlay renderer and
/// the flattening exporter, so a new variant is a compile-time-checked
/// change everywhere it must be handled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Annotation {
    Text(TextAnnotation),
    Stroke(StrokeAnnotation),
}

impl Annotation {
    pub fn page_index(&self) -> usize {
        match self {
            Annotation::Text(text) => text.page_index,
            Annotation::Stroke(stroke) => stroke.page_index,
        }
    }
}

impl From<TextAnnotation> for Annotation {
    fn from(text: TextAnnotation) -> Self {
        Annotation::Text(text)
    }
}

impl From<StrokeAnnotation> for Annotation {
    fn from(stroke: StrokeAnnotation) -> Self {
        Annotation::Stroke(stroke)
    }
}
