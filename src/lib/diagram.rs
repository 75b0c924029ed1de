//! Diagram cells.
//!
//! Each scramble gets its own [`DiagramCanvas`], filled with the neutral background and handed
//! to the puzzle's drawing routine. A drawing failure, returned or panicked, turns into a text
//! cell so the rest of the sheet still renders.

use std::panic::{self, AssertUnwindSafe};

use log::warn;
use tiny_skia::Color;

use crate::puzzle::{ColorScheme, DiagramCanvas, DiagramError, DiagramSize, Puzzle};

/// Prefix of the text shown in place of a diagram that could not be drawn.
pub const DIAGRAM_ERROR_PREFIX: &str = "Error drawing scramble:";

/// A rendered diagram, PNG encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    pub png: Vec<u8>,
    pub width_px: u32,
    pub height_px: u32,
    /// Size the bitmap occupies on the page, in points.
    pub size: DiagramSize,
}

/// Content of a table cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    Text(String),
    Image(Bitmap),
}

impl Cell {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(text) => Some(text),
            Cell::Image(_) => None,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, Cell::Image(_))
    }

    fn diagram_error(cause: impl std::fmt::Display) -> Self {
        Cell::Text(format!("{} {}", DIAGRAM_ERROR_PREFIX, cause))
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "diagram renderer panicked".to_string()
    }
}

fn draw(
    puzzle: &dyn Puzzle,
    scramble: &str,
    size: DiagramSize,
    scheme: &ColorScheme,
    background: Color,
) -> Result<Bitmap, DiagramError> {
    let mut canvas = DiagramCanvas::new(size)?;
    canvas.fill(background);

    panic::catch_unwind(AssertUnwindSafe(|| {
        puzzle.draw_scramble(&mut canvas, scramble, scheme)
    }))
    .map_err(|payload| DiagramError::new(panic_message(payload.as_ref())))??;

    let (width_px, height_px) = canvas.pixel_size();
    Ok(Bitmap {
        png: canvas.encode_png()?,
        width_px,
        height_px,
        size,
    })
}

/// Renders the diagram of one scramble into a table cell.
///
/// Never fails: a drawing error produces `Cell::Text("Error drawing scramble: <cause>")`.
pub fn produce_cell(
    puzzle: &dyn Puzzle,
    scramble: &str,
    size: DiagramSize,
    scheme: &ColorScheme,
    background: (u8, u8, u8),
) -> Cell {
    let (r, g, b) = background;
    match draw(
        puzzle,
        scramble,
        size,
        scheme,
        Color::from_rgba8(r, g, b, 255),
    ) {
        Ok(bitmap) => Cell::Image(bitmap),
        Err(e) => {
            warn!("Failed to draw scramble '{}': {}", scramble, e);
            Cell::diagram_error(e)
        }
    }
}
