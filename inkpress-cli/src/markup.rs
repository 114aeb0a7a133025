use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use inkpress_core::{Color, Command, PixelPoint};
use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr};

use crate::config::Config;

/// One step of a markup script. A script is a JSON array of steps, applied
/// in order against the loaded document.
#[serde_as]
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MarkupOp {
    /// Place a text label anchored at view pixels.
    Text {
        page: usize,
        x: f32,
        y: f32,
        text: String,
        #[serde(default)]
        size: Option<f32>,
        #[serde_as(as = "Option<DisplayFromStr>")]
        #[serde(default)]
        color: Option<Color>,
    },
    /// Draw a polyline through view-pixel points.
    Stroke {
        page: usize,
        points: Vec<[f32; 2]>,
        #[serde(default)]
        width: Option<f32>,
        #[serde_as(as = "Option<DisplayFromStr>")]
        #[serde(default)]
        color: Option<Color>,
    },
    /// Roll back the latest step.
    Undo,
    /// Drop every annotation.
    Clear,
}

pub fn read_script(path: &Path) -> Result<Vec<MarkupOp>> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("failed to read script {:?}", path))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid markup script {:?}", path))
}

/// Lowers a script step to an editor command, filling gaps from `config`.
pub fn to_command(step: MarkupOp, config: &Config) -> Command {
    match step {
        MarkupOp::Text {
            page,
            x,
            y,
            text,
            size,
            color,
        } => Command::AddText {
            page_index: page,
            anchor: PixelPoint::new(x, y),
            text,
            font_size: size.unwrap_or(config.font_size),
            color: color.unwrap_or(config.text_color),
        },
        MarkupOp::Stroke {
            page,
            points,
            width,
            color,
        } => Command::AddStroke {
            page_index: page,
            points: points
                .into_iter()
                .map(|[x, y]| PixelPoint::new(x, y))
                .collect(),
            width: width.unwrap_or(config.stroke_width),
            color: color.unwrap_or(config.stroke_color),
        },
        MarkupOp::Undo => Command::Undo,
        MarkupOp::Clear => Command::ClearAnnotations,
    }
}
