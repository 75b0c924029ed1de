//! The puzzle interface consumed by the renderer.
//!
//! Scramble sheets never draw puzzles themselves: a [`Puzzle`] implementation supplies the
//! display name, the preferred diagram size, the color scheme parser and the drawing routine.
//! Drawing happens on a [`DiagramCanvas`], an off-screen `tiny_skia` surface whose coordinate
//! system is expressed in points.

use std::collections::BTreeMap;
use std::fmt;

use tiny_skia::{Color, Paint, Pixmap, PixmapMut, Rect, Transform};

/// Resolution at which diagram surfaces are rasterised. It matches the default image resolution
/// of the document engine, so a surface of `w` points is placed `w` points wide.
pub const DIAGRAM_DPI: f32 = 300.0;

/// Width and height of a diagram, in points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagramSize {
    pub width: u32,
    pub height: u32,
}

impl DiagramSize {
    pub const fn new(width: u32, height: u32) -> Self {
        DiagramSize { width, height }
    }
}

impl fmt::Display for DiagramSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Failure reported by a puzzle while parsing a scheme or drawing a diagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramError {
    message: String,
}

impl DiagramError {
    pub fn new(message: impl Into<String>) -> Self {
        DiagramError {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for DiagramError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for DiagramError {}

impl From<String> for DiagramError {
    fn from(message: String) -> Self {
        DiagramError::new(message)
    }
}

impl From<&str> for DiagramError {
    fn from(message: &str) -> Self {
        DiagramError::new(message)
    }
}

/// Mapping from puzzle part names (faces, facets, pieces) to colors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColorScheme {
    colors: BTreeMap<String, Color>,
}

impl ColorScheme {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, part: impl Into<String>, color: Color) -> Self {
        self.insert(part, color);
        self
    }

    pub fn insert(&mut self, part: impl Into<String>, color: Color) {
        self.colors.insert(part.into(), color);
    }

    pub fn get(&self, part: &str) -> Option<Color> {
        self.colors.get(part).copied()
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Color)> {
        self.colors.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Off-screen drawing surface for one diagram.
///
/// The pixel buffer is larger than the diagram size; [`DiagramCanvas::transform`] maps point
/// coordinates (origin top-left, `size.width` x `size.height`) onto it.
pub struct DiagramCanvas {
    pixmap: Pixmap,
    size: DiagramSize,
    transform: Transform,
}

impl DiagramCanvas {
    /// Allocates a surface of exactly `size` points.
    ///
    /// The pixel dimensions are rounded down so the placed image never exceeds `size`.
    pub fn new(size: DiagramSize) -> Result<Self, DiagramError> {
        let px_per_pt = DIAGRAM_DPI / 72.0;
        let width_px = ((size.width as f32 * px_per_pt).floor() as u32).max(1);
        let height_px = ((size.height as f32 * px_per_pt).floor() as u32).max(1);
        let pixmap = Pixmap::new(width_px, height_px).ok_or_else(|| {
            DiagramError::new(format!(
                "invalid diagram surface {}x{} px for {}",
                width_px, height_px, size
            ))
        })?;
        let transform = Transform::from_scale(
            width_px as f32 / size.width.max(1) as f32,
            height_px as f32 / size.height.max(1) as f32,
        );
        Ok(DiagramCanvas {
            pixmap,
            size,
            transform,
        })
    }

    pub fn size(&self) -> DiagramSize {
        self.size
    }

    /// Point-to-pixel transform to pass to `tiny_skia` drawing calls.
    pub fn transform(&self) -> Transform {
        self.transform
    }

    pub fn pixel_size(&self) -> (u32, u32) {
        (self.pixmap.width(), self.pixmap.height())
    }

    pub fn pixmap_mut(&mut self) -> PixmapMut<'_> {
        self.pixmap.as_mut()
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    /// Fills the whole surface.
    pub fn fill(&mut self, color: Color) {
        self.pixmap.fill(color);
    }

    /// Fills a rectangle given in points. Degenerate rectangles are ignored.
    pub fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: Color) {
        if let Some(rect) = Rect::from_xywh(x, y, width, height) {
            let mut paint = Paint::default();
            paint.set_color(color);
            paint.anti_alias = true;
            self.pixmap.fill_rect(rect, &paint, self.transform, None);
        }
    }

    pub(crate) fn encode_png(&self) -> Result<Vec<u8>, DiagramError> {
        self.pixmap
            .encode_png()
            .map_err(|e| DiagramError::new(format!("png encode failed: {e}")))
    }
}

/// A puzzle type as seen by the scramble sheet renderer.
///
/// Implementations must be `Sync`: diagram cells may be produced from several threads.
pub trait Puzzle: Sync {
    fn short_name(&self) -> &str;

    /// Name printed in the page header.
    fn long_name(&self) -> &str;

    /// Diagram size for the requested bounding box, honoring the puzzle's aspect ratio.
    fn preferred_size(&self, width: u32, height: u32) -> DiagramSize;

    /// Resolves a scheme identifier, `None` meaning the puzzle's default scheme.
    fn parse_color_scheme(&self, scheme: Option<&str>) -> Result<ColorScheme, DiagramError>;

    /// Draws the scrambled state of `scramble` onto `canvas`.
    fn draw_scramble(
        &self,
        canvas: &mut DiagramCanvas,
        scramble: &str,
        scheme: &ColorScheme,
    ) -> Result<(), DiagramError>;
}
