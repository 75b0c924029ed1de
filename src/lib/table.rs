//! Scramble table assembly.
//!
//! The table is built in two phases. [`TableBuilder::collect_rows`] creates one immutable
//! [`TableRow`] per scramble (index label, scramble text, diagram cell) and tracks the widest
//! index label on the way. [`TableBuilder::balance`] then fixes the [`ColumnWidths`] once, wraps
//! every scramble to the final text column and computes the row heights used to center cells
//! vertically.
//!
//! Column widths are kept in hundredths of a point. The three columns always add up to the
//! content width, and the same integers are handed to the document engine as column weights.

use log::{debug, info};
use rayon::prelude::*;

use crate::config::ReportConfig;
use crate::diagram::{produce_cell, Bitmap, Cell};
use crate::measure::TextMeasurer;
use crate::puzzle::{ColorScheme, DiagramSize, Puzzle, DIAGRAM_DPI};
use crate::RenderError;

/// Smallest font size a scramble is shrunk to when one of its tokens is wider than the column.
pub const MIN_SCRAMBLE_FONT_SIZE: u8 = 6;

/// Horizontal space taken by the frame lines drawn around each cell, in points.
pub const FRAME_ALLOWANCE: f32 = 0.6;

/// Scale and placed height of a diagram image inside a column of `column_width` points.
///
/// The bitmap is placed at its native size unless the framed column is narrower.
pub fn image_placement(bitmap: &Bitmap, column_width: f32) -> (f32, f32) {
    let width = bitmap.width_px as f32 * 72.0 / DIAGRAM_DPI;
    let height = bitmap.height_px as f32 * 72.0 / DIAGRAM_DPI;
    let available = column_width - FRAME_ALLOWANCE;
    let scale = if width > available && width > 0.0 {
        available / width
    } else {
        1.0
    };
    (scale, height * scale)
}

/// Rejects diagrams at least as wide as the content area of the page, and diagrams whose row
/// would be taller than a page's content area.
pub fn check_diagram_fits(size: DiagramSize, config: &ReportConfig) -> Result<(), RenderError> {
    let usable_width = config.content_width();
    if size.width as f32 >= usable_width {
        return Err(RenderError::DiagramTooLarge {
            diagram_width: size.width as f32,
            usable_width,
            suggestion: format!("Request a diagram narrower than {:.0}pt", usable_width),
        });
    }

    let usable_height = config.content_height();
    let row_height = size.height as f32 + 2.0 * config.cell_padding;
    if row_height > usable_height {
        return Err(RenderError::DiagramTooTall {
            diagram_height: size.height as f32,
            usable_height,
            suggestion: format!(
                "Request a diagram at most {:.0}pt high",
                (usable_height - 2.0 * config.cell_padding).floor()
            ),
        });
    }
    Ok(())
}

/// Label of the scramble at `position` (0-based): `"1."`, `"2."`, ...
pub fn index_label(position: usize) -> String {
    format!("{}.", position + 1)
}

/// One scramble of the sheet, as produced by the first phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    pub label: String,
    pub scramble: String,
    pub diagram: Cell,
}

/// Column widths in hundredths of a point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnWidths {
    index: u32,
    text: u32,
    diagram: u32,
}

fn hundredths(points: f32) -> i64 {
    (points * 100.0).round() as i64
}

impl ColumnWidths {
    /// `index = safety_factor * max_label_width`, `diagram = diagram_width` and the scramble
    /// column takes whatever is left of `content_width`.
    pub fn compute(
        max_label_width: f32,
        safety_factor: f32,
        diagram_width: u32,
        content_width: f32,
    ) -> Result<Self, RenderError> {
        let total = hundredths(content_width);
        let index = (max_label_width * safety_factor * 100.0).ceil() as i64;
        let diagram = i64::from(diagram_width) * 100;
        let text = total - index - diagram;

        if text <= 0 || index < 0 {
            return Err(RenderError::Layout {
                message: format!(
                    "no room left for the scramble column ({:.2}pt index, {}pt diagram, {:.2}pt content)",
                    index as f32 / 100.0,
                    diagram_width,
                    content_width
                ),
                suggestion: "Request a narrower diagram".to_string(),
            });
        }

        Ok(ColumnWidths {
            index: index as u32,
            text: text as u32,
            diagram: diagram as u32,
        })
    }

    pub fn index(&self) -> f32 {
        self.index as f32 / 100.0
    }

    pub fn text(&self) -> f32 {
        self.text as f32 / 100.0
    }

    pub fn diagram(&self) -> f32 {
        self.diagram as f32 / 100.0
    }

    pub fn total(&self) -> f32 {
        (self.index + self.text + self.diagram) as f32 / 100.0
    }

    /// Column weights for the engine's table layout; they sum to the content width.
    pub fn weights(&self) -> Vec<usize> {
        vec![
            self.index as usize,
            self.text as usize,
            self.diagram as usize,
        ]
    }
}

/// Wraps `text` at spaces so each line measures at most `max_width`.
///
/// Tokens are never split: a token wider than `max_width` sits alone on its line. Runs of spaces
/// collapse, and `\n` always starts a new line.
pub fn wrap_on_spaces(text: &str, max_width: f32, measure: impl Fn(&str) -> f32) -> Vec<String> {
    let mut lines = Vec::new();

    for hard_line in text.split('\n') {
        let mut current = String::new();
        for token in hard_line.split(' ').filter(|t| !t.is_empty()) {
            if current.is_empty() {
                current.push_str(token);
                continue;
            }
            let candidate = format!("{} {}", current, token);
            if measure(&candidate) <= max_width {
                current = candidate;
            } else {
                lines.push(std::mem::replace(&mut current, token.to_string()));
            }
        }
        lines.push(current);
    }

    lines
}

/// Largest font size in `MIN_SCRAMBLE_FONT_SIZE..=preferred` at which every token of `text`
/// fits into `max_width`. Falls back to the minimum when even that is too wide.
pub fn fit_font_size(
    text: &str,
    max_width: f32,
    preferred: u8,
    measure: impl Fn(&str, f32) -> f32,
) -> u8 {
    let widest = |size: u8| {
        text.split(|c| c == ' ' || c == '\n')
            .map(|token| measure(token, f32::from(size)))
            .fold(0.0, f32::max)
    };

    let mut size = preferred.max(MIN_SCRAMBLE_FONT_SIZE);
    while size > MIN_SCRAMBLE_FONT_SIZE && widest(size) > max_width {
        size -= 1;
    }
    size
}

/// Truncates `line` to its longest prefix that measures at most `max_width`.
///
/// Only a single token can be wider than its column after wrapping; it is cut off at the column
/// edge instead of being continued on the next line.
pub fn clip_to_width(line: &str, max_width: f32, measure: impl Fn(&str) -> f32) -> String {
    if measure(line) <= max_width {
        return line.to_string();
    }
    let mut end = 0;
    for (i, c) in line.char_indices() {
        let next = i + c.len_utf8();
        if measure(&line[..next]) > max_width {
            break;
        }
        end = next;
    }
    line[..end].to_string()
}

/// Room left for text in a framed cell of `column_width` points.
pub fn cell_text_width(column_width: f32, cell_padding: f32) -> f32 {
    column_width - 2.0 * cell_padding - FRAME_ALLOWANCE
}

/// Wraps `text` with [`wrap_on_spaces`], then clips every line to `max_width`.
pub fn fit_lines(text: &str, max_width: f32, measure: impl Fn(&str) -> f32) -> Vec<String> {
    wrap_on_spaces(text, max_width, &measure)
        .into_iter()
        .map(|line| {
            let clipped = clip_to_width(&line, max_width, &measure);
            if clipped.len() < line.len() {
                debug!("Clipped '{}' to '{}' to fit {:.1}pt", line, clipped, max_width);
            }
            clipped
        })
        .collect()
}

/// Placement of one cell inside its row, in points.
#[derive(Debug, Clone, PartialEq)]
pub struct CellLayout {
    /// Text lines of the cell; empty for image cells.
    pub lines: Vec<String>,
    pub font_size: u8,
    /// Height of the content without padding.
    pub content_height: f32,
    /// Space above the content. It centers the content in the row.
    pub top_padding: f32,
    pub bottom_padding: f32,
}

/// Balanced layout of one row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowLayout {
    pub index: CellLayout,
    pub scramble: CellLayout,
    pub diagram: CellLayout,
    pub height: f32,
}

/// The finished table: rows in input order, their layout and the column widths.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrambleTable {
    rows: Vec<TableRow>,
    layout: Vec<RowLayout>,
    widths: ColumnWidths,
    diagram_size: DiagramSize,
    cell_padding: f32,
}

impl ScrambleTable {
    pub fn rows(&self) -> &[TableRow] {
        &self.rows
    }

    pub fn layout(&self) -> &[RowLayout] {
        &self.layout
    }

    pub fn widths(&self) -> ColumnWidths {
        self.widths
    }

    pub fn diagram_size(&self) -> DiagramSize {
        self.diagram_size
    }

    pub fn cell_padding(&self) -> f32 {
        self.cell_padding
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TableRow, &RowLayout)> {
        self.rows.iter().zip(self.layout.iter())
    }

    /// Number of diagram cells that hold an error message instead of an image.
    pub fn failed_diagrams(&self) -> usize {
        self.rows.iter().filter(|r| !r.diagram.is_image()).count()
    }
}

/// Builds a [`ScrambleTable`] for one puzzle.
pub struct TableBuilder<'a> {
    puzzle: &'a dyn Puzzle,
    config: &'a ReportConfig,
    body: &'a TextMeasurer,
    scramble: &'a TextMeasurer,
}

impl<'a> TableBuilder<'a> {
    /// `body` measures index labels and error cells, `scramble` measures the scramble text.
    pub fn new(
        puzzle: &'a dyn Puzzle,
        config: &'a ReportConfig,
        body: &'a TextMeasurer,
        scramble: &'a TextMeasurer,
    ) -> Self {
        TableBuilder {
            puzzle,
            config,
            body,
            scramble,
        }
    }

    /// Runs both phases.
    ///
    /// A diagram at least as wide as the content area is rejected before any row is built, so
    /// the puzzle's drawing routine is never called in that case.
    pub fn build(
        &self,
        scrambles: &[String],
        size: DiagramSize,
        scheme: &ColorScheme,
    ) -> Result<ScrambleTable, RenderError> {
        check_diagram_fits(size, self.config)?;

        let (rows, max_label_width) = self.collect_rows(scrambles, size, scheme);
        self.balance(rows, max_label_width, size)
    }

    /// First phase: one row per scramble, in input order, plus the widest index label.
    pub fn collect_rows(
        &self,
        scrambles: &[String],
        size: DiagramSize,
        scheme: &ColorScheme,
    ) -> (Vec<TableRow>, f32) {
        let puzzle = self.puzzle;
        let background = self.config.diagram_background;
        let diagrams: Vec<Cell> = if self.config.parallel_diagrams {
            debug!("Drawing {} diagrams in parallel", scrambles.len());
            scrambles
                .par_iter()
                .map(|s| produce_cell(puzzle, s, size, scheme, background))
                .collect()
        } else {
            scrambles
                .iter()
                .map(|s| produce_cell(puzzle, s, size, scheme, background))
                .collect()
        };

        let text_size = f32::from(self.config.text_size);
        let mut max_label_width: f32 = 0.0;
        let rows = scrambles
            .iter()
            .zip(diagrams)
            .enumerate()
            .map(|(i, (scramble, diagram))| {
                let label = index_label(i);
                max_label_width = max_label_width.max(self.body.width(&label, text_size));
                TableRow {
                    label,
                    scramble: scramble.clone(),
                    diagram,
                }
            })
            .collect();

        (rows, max_label_width)
    }

    fn text_cell(&self, lines: Vec<String>, font_size: u8, measurer: &TextMeasurer) -> CellLayout {
        let content_height = lines.len() as f32 * measurer.line_height(f32::from(font_size));
        CellLayout {
            lines,
            font_size,
            content_height,
            top_padding: 0.0,
            bottom_padding: 0.0,
        }
    }

    /// Second phase: fixes the column widths and lays every row out against them.
    pub fn balance(
        &self,
        rows: Vec<TableRow>,
        max_label_width: f32,
        size: DiagramSize,
    ) -> Result<ScrambleTable, RenderError> {
        let widths = ColumnWidths::compute(
            max_label_width,
            self.config.index_width_safety_factor,
            size.width,
            self.config.content_width(),
        )?;
        let pad = self.config.cell_padding;
        let text_size = self.config.text_size;
        let text_width = cell_text_width(widths.text(), pad);
        let diagram_text_width = cell_text_width(widths.diagram(), pad);

        let layout = rows
            .iter()
            .map(|row| {
                let index = self.text_cell(vec![row.label.clone()], text_size, self.body);

                let scramble_size =
                    fit_font_size(&row.scramble, text_width, self.config.scramble_size, |t, s| {
                        self.scramble.extent(t, s)
                    });
                if scramble_size < self.config.scramble_size {
                    debug!(
                        "Scramble '{}' shrunk to {}pt to fit {:.1}pt",
                        row.scramble, scramble_size, text_width
                    );
                }
                let lines = fit_lines(&row.scramble, text_width, |t| {
                    self.scramble.extent(t, f32::from(scramble_size))
                });
                let scramble = self.text_cell(lines, scramble_size, self.scramble);

                let diagram = match &row.diagram {
                    Cell::Image(bitmap) => CellLayout {
                        lines: Vec::new(),
                        font_size: text_size,
                        content_height: image_placement(bitmap, widths.diagram()).1,
                        top_padding: 0.0,
                        bottom_padding: 0.0,
                    },
                    Cell::Text(message) => {
                        let lines = fit_lines(message, diagram_text_width, |t| {
                            self.body.extent(t, f32::from(text_size))
                        });
                        self.text_cell(lines, text_size, self.body)
                    }
                };

                center_row(index, scramble, diagram, pad)
            })
            .collect();

        info!(
            "Balanced {} rows: index {:.2}pt, scramble {:.2}pt, diagram {:.2}pt",
            rows.len(),
            widths.index(),
            widths.text(),
            widths.diagram()
        );

        Ok(ScrambleTable {
            rows,
            layout,
            widths,
            diagram_size: size,
            cell_padding: pad,
        })
    }
}

/// The row is as tall as its tallest cell plus padding; every cell is centered in it.
fn center_row(
    mut index: CellLayout,
    mut scramble: CellLayout,
    mut diagram: CellLayout,
    pad: f32,
) -> RowLayout {
    let content = index
        .content_height
        .max(scramble.content_height)
        .max(diagram.content_height);
    let height = content + 2.0 * pad;

    for cell in [&mut index, &mut scramble, &mut diagram] {
        let slack = content - cell.content_height;
        cell.top_padding = pad + slack / 2.0;
        cell.bottom_padding = height - cell.top_padding - cell.content_height;
    }

    RowLayout {
        index,
        scramble,
        diagram,
        height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagram::DIAGRAM_ERROR_PREFIX;
    use crate::fonts::load_report_fonts;
    use crate::puzzle::{DiagramCanvas, DiagramError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Every character is one point wide.
    fn chars(text: &str) -> f32 {
        text.chars().count() as f32
    }

    struct Blocks {
        fail: bool,
        calls: AtomicUsize,
    }

    impl Blocks {
        fn new(fail: bool) -> Self {
            Blocks {
                fail,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Puzzle for Blocks {
        fn short_name(&self) -> &str {
            "blocks"
        }

        fn long_name(&self) -> &str {
            "Blocks"
        }

        fn preferred_size(&self, width: u32, height: u32) -> DiagramSize {
            DiagramSize::new(width, height)
        }

        fn parse_color_scheme(&self, _scheme: Option<&str>) -> Result<ColorScheme, DiagramError> {
            Ok(ColorScheme::default())
        }

        fn draw_scramble(
            &self,
            _canvas: &mut DiagramCanvas,
            scramble: &str,
            _scheme: &ColorScheme,
        ) -> Result<(), DiagramError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(DiagramError::new(format!("cannot draw {}", scramble)))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_index_labels() {
        assert_eq!(index_label(0), "1.");
        assert_eq!(index_label(99), "100.");
    }

    #[test]
    fn test_column_widths_sum_exactly() {
        let widths = ColumnWidths::compute(13.348, 2.0, 200, 462.0).unwrap();
        assert_eq!(widths.index(), 26.7);
        assert_eq!(widths.diagram(), 200.0);
        assert_eq!(widths.total(), 462.0);
        assert!(widths.text() > 0.0);
        assert_eq!(widths.weights().iter().sum::<usize>(), 46200);
    }

    #[test]
    fn test_column_widths_reject_empty_text_column() {
        assert!(matches!(
            ColumnWidths::compute(20.0, 2.0, 422, 462.0),
            Err(RenderError::Layout { .. })
        ));
        assert!(ColumnWidths::compute(20.0, 2.0, 421, 462.0).is_ok());
    }

    #[test]
    fn test_wrap_on_spaces() {
        let lines = wrap_on_spaces("R U R' U' F2", 7.0, chars);
        assert_eq!(lines, vec!["R U R'", "U' F2"]);

        // Tokens are never split, even when wider than the column
        let lines = wrap_on_spaces("ABCDEFGHIJ K", 4.0, chars);
        assert_eq!(lines, vec!["ABCDEFGHIJ", "K"]);

        // No spaces means a single line
        assert_eq!(wrap_on_spaces("R2U2F2B2", 3.0, chars), vec!["R2U2F2B2"]);
    }

    #[test]
    fn test_wrap_hard_breaks_and_space_runs() {
        let lines = wrap_on_spaces("R  U\nF   B", 100.0, chars);
        assert_eq!(lines, vec!["R U", "F B"]);
        assert_eq!(wrap_on_spaces("", 10.0, chars), vec![""]);
    }

    #[test]
    fn test_clip_to_width() {
        assert_eq!(clip_to_width("R U", 5.0, chars), "R U");
        assert_eq!(clip_to_width("ABCDEFGHIJ", 4.0, chars), "ABCD");
        assert_eq!(clip_to_width("ABC", 0.5, chars), "");
        // multi-byte characters are never cut in half
        assert_eq!(clip_to_width("ÄÖÜß", 2.0, chars), "ÄÖ");
    }

    #[test]
    fn test_fit_lines_clips_only_wide_tokens() {
        let lines = fit_lines("R U ABCDEFGHIJ F2", 4.0, chars);
        assert_eq!(lines, vec!["R U", "ABCD", "F2"]);
        for line in &lines {
            assert!(chars(line) <= 4.0);
        }
    }

    #[test]
    fn test_fit_font_size() {
        let measure = |t: &str, size: f32| chars(t) * size / 2.0;
        // "ABCD" is 24pt wide at 12pt
        assert_eq!(fit_font_size("R ABCD", 30.0, 12, measure), 12);
        assert_eq!(fit_font_size("R ABCD", 20.0, 12, measure), 10);
        assert_eq!(fit_font_size("R ABCD", 1.0, 12, measure), MIN_SCRAMBLE_FONT_SIZE);
    }

    #[test]
    fn test_image_placement() {
        let bitmap = |w: u32, h: u32| Bitmap {
            png: Vec::new(),
            width_px: w,
            height_px: h,
            size: DiagramSize::new(w * 72 / 300, h * 72 / 300),
        };
        // 150 px at 300 DPI is 36pt, it fits a 40pt column unscaled
        assert_eq!(image_placement(&bitmap(150, 300), 40.0), (1.0, 72.0));

        let (scale, height) = image_placement(&bitmap(300, 300), 72.0);
        assert!(scale < 1.0);
        assert!((72.0 * scale - (72.0 - FRAME_ALLOWANCE)).abs() < 0.001);
        assert!((height - 72.0 * scale).abs() < 0.001);
    }

    #[test]
    fn test_center_row() {
        let cell = |h: f32| CellLayout {
            lines: Vec::new(),
            font_size: 12,
            content_height: h,
            top_padding: 0.0,
            bottom_padding: 0.0,
        };
        let row = center_row(cell(14.0), cell(28.0), cell(100.0), 2.0);
        assert_eq!(row.height, 104.0);
        assert_eq!(row.index.top_padding, 45.0);
        assert_eq!(row.scramble.top_padding, 38.0);
        assert_eq!(row.diagram.top_padding, 2.0);
        for c in [&row.index, &row.scramble, &row.diagram] {
            assert_eq!(c.top_padding + c.content_height + c.bottom_padding, row.height);
        }
    }

    fn with_measurers(f: impl FnOnce(&ReportConfig, &TextMeasurer, &TextMeasurer)) {
        let config = ReportConfig::default();
        let fonts = load_report_fonts(&config).expect("test font");
        let body = TextMeasurer::new(&fonts.body);
        let scramble = TextMeasurer::new(&fonts.scramble);
        f(&config, &body, &scramble);
    }

    fn scrambles(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("R U{} F2", i)).collect()
    }

    #[test]
    fn test_build_keeps_order_and_labels() {
        with_measurers(|config, body, scramble| {
            let puzzle = Blocks::new(false);
            let builder = TableBuilder::new(&puzzle, config, body, scramble);
            let table = builder
                .build(&scrambles(12), DiagramSize::new(100, 60), &ColorScheme::default())
                .unwrap();

            assert_eq!(table.len(), 12);
            for (i, row) in table.rows().iter().enumerate() {
                assert_eq!(row.label, format!("{}.", i + 1));
                assert_eq!(row.scramble, format!("R U{} F2", i));
                assert!(row.diagram.is_image());
            }
            assert_eq!(table.widths().total(), config.content_width());
            assert_eq!(table.widths().diagram(), 100.0);
            assert!(table.widths().text() > 0.0);
            assert_eq!(table.failed_diagrams(), 0);
        });
    }

    #[test]
    fn test_index_column_uses_widest_label() {
        with_measurers(|config, body, scramble| {
            let puzzle = Blocks::new(false);
            let builder = TableBuilder::new(&puzzle, config, body, scramble);
            let table = builder
                .build(&scrambles(10), DiagramSize::new(50, 20), &ColorScheme::default())
                .unwrap();
            let widest = body.width("10.", 12.0);
            let expected = (widest * 2.0 * 100.0).ceil() / 100.0;
            assert!((table.widths().index() - expected).abs() < 0.011);
        });
    }

    #[test]
    fn test_failing_diagrams_become_error_cells() {
        with_measurers(|config, body, scramble| {
            let puzzle = Blocks::new(true);
            let builder = TableBuilder::new(&puzzle, config, body, scramble);
            let table = builder
                .build(&scrambles(3), DiagramSize::new(200, 158), &ColorScheme::default())
                .unwrap();
            assert_eq!(table.failed_diagrams(), 3);
            for (row, layout) in table.iter() {
                let text = row.diagram.as_text().unwrap();
                assert!(text.starts_with(DIAGRAM_ERROR_PREFIX));
                assert!(!layout.diagram.lines.is_empty());
            }
        });
    }

    #[test]
    fn test_oversized_diagram_is_rejected_before_drawing() {
        with_measurers(|config, body, scramble| {
            let puzzle = Blocks::new(false);
            let builder = TableBuilder::new(&puzzle, config, body, scramble);
            let result = builder.build(
                &scrambles(5),
                DiagramSize::new(462, 100),
                &ColorScheme::default(),
            );
            assert!(matches!(result, Err(RenderError::DiagramTooLarge { .. })));
            assert_eq!(puzzle.calls.load(Ordering::SeqCst), 0);
        });
    }

    #[test]
    fn test_space_free_scramble_stays_on_one_line() {
        with_measurers(|config, body, scramble| {
            let puzzle = Blocks::new(false);
            let builder = TableBuilder::new(&puzzle, config, body, scramble);
            let long = "RUFLDB".repeat(4);
            let table = builder
                .build(&[long.clone()], DiagramSize::new(200, 100), &ColorScheme::default())
                .unwrap();
            let layout = &table.layout()[0];
            assert_eq!(layout.scramble.lines, vec![long]);
        });
    }

    #[test]
    fn test_over_wide_scramble_is_clipped_to_the_column() {
        with_measurers(|config, body, scramble| {
            let puzzle = Blocks::new(false);
            let builder = TableBuilder::new(&puzzle, config, body, scramble);
            let long = "RUR'U'".repeat(25);
            let table = builder
                .build(&[long.clone()], DiagramSize::new(200, 100), &ColorScheme::default())
                .unwrap();
            let layout = &table.layout()[0].scramble;
            let text_width = cell_text_width(table.widths().text(), config.cell_padding);
            assert_eq!(layout.font_size, MIN_SCRAMBLE_FONT_SIZE);
            assert_eq!(layout.lines.len(), 1);
            assert!(long.starts_with(&layout.lines[0]));
            assert!(layout.lines[0].len() < long.len());
            assert!(scramble.extent(&layout.lines[0], f32::from(layout.font_size)) <= text_width);
        });
    }

    #[test]
    fn test_long_error_tokens_are_clipped() {
        with_measurers(|config, body, scramble| {
            let puzzle = Blocks::new(true);
            let builder = TableBuilder::new(&puzzle, config, body, scramble);
            let token = "X".repeat(60);
            let table = builder
                .build(&[token], DiagramSize::new(200, 158), &ColorScheme::default())
                .unwrap();
            let layout = &table.layout()[0].diagram;
            let width = cell_text_width(table.widths().diagram(), config.cell_padding);
            assert!(layout.lines.len() >= 2);
            for line in &layout.lines {
                assert!(body.extent(line, f32::from(config.text_size)) <= width);
            }
        });
    }

    #[test]
    fn test_tall_diagram_is_rejected_before_drawing() {
        with_measurers(|config, body, scramble| {
            let puzzle = Blocks::new(false);
            let builder = TableBuilder::new(&puzzle, config, body, scramble);
            let result = builder.build(
                &scrambles(2),
                DiagramSize::new(200, 700),
                &ColorScheme::default(),
            );
            assert!(matches!(result, Err(RenderError::DiagramTooTall { .. })));
            assert_eq!(puzzle.calls.load(Ordering::SeqCst), 0);

            // 638pt plus 2pt padding on each side exactly fills 642pt
            assert!(check_diagram_fits(DiagramSize::new(200, 638), config).is_ok());
            assert!(check_diagram_fits(DiagramSize::new(200, 639), config).is_err());
        });
    }

    #[test]
    fn test_parallel_matches_sequential() {
        with_measurers(|config, body, scramble| {
            let puzzle = Blocks::new(false);
            let sequential = TableBuilder::new(&puzzle, config, body, scramble)
                .build(&scrambles(20), DiagramSize::new(80, 40), &ColorScheme::default())
                .unwrap();

            let parallel_config = ReportConfig {
                parallel_diagrams: true,
                ..config.clone()
            };
            let parallel = TableBuilder::new(&puzzle, &parallel_config, body, scramble)
                .build(&scrambles(20), DiagramSize::new(80, 40), &ColorScheme::default())
                .unwrap();
            assert_eq!(sequential, parallel);
        });
    }

    #[test]
    fn test_rows_are_vertically_centered() {
        with_measurers(|config, body, scramble| {
            let puzzle = Blocks::new(false);
            let table = TableBuilder::new(&puzzle, config, body, scramble)
                .build(&scrambles(2), DiagramSize::new(200, 158), &ColorScheme::default())
                .unwrap();
            let Cell::Image(bitmap) = &table.rows()[0].diagram else {
                panic!("expected an image cell");
            };
            let (_, image_height) = image_placement(bitmap, table.widths().diagram());
            assert!(image_height > 157.0 && image_height <= 158.0);
            for layout in table.layout() {
                assert_eq!(layout.height, image_height + 2.0 * config.cell_padding);
                assert_eq!(layout.diagram.top_padding, config.cell_padding);
                let label = &layout.index;
                assert!((label.top_padding - label.bottom_padding).abs() < 0.001);
            }
        });
    }
}
