//! Page header and the page hook handed to the document engine.
//!
//! Every page starts with one line, `<puzzle name> [<title>] page <n>`, centered horizontally in
//! the art box with its baseline on the art box's top edge. The header text is fixed when the
//! document is created; only the page number changes from page to page.

use genpdfi_extended::error::Error;
use genpdfi_extended::render::Area;
use genpdfi_extended::style::Style;
use genpdfi_extended::{Context, Margins, PageDecorator, Position};
use log::{trace, warn};

use crate::config::{ArtBox, Insets};
use crate::measure::TextMeasurer;

/// Converts PDF points to the millimeters used by the document engine.
pub(crate) fn pt_to_mm(points: f32) -> f32 {
    printpdf::Mm::from(printpdf::Pt(points)).0
}

/// The header line of a scramble sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageHeader {
    header: String,
}

impl PageHeader {
    /// An empty or blank title is left out.
    pub fn new(long_name: &str, title: Option<&str>) -> Self {
        let header = match title.map(str::trim).filter(|t| !t.is_empty()) {
            Some(title) => format!("{} {}", long_name, title),
            None => long_name.to_string(),
        };
        PageHeader { header }
    }

    pub fn text(&self) -> &str {
        &self.header
    }

    /// The line printed on page `page_number` (1-based).
    pub fn line(&self, page_number: usize) -> String {
        format!("{} page {}", self.header, page_number)
    }

    /// Top-left corner of the header text, in points from the page's top-left corner, and its
    /// baseline.
    ///
    /// The text is centered between the art box's left and right edges; a line wider than the
    /// box starts at its left edge.
    pub fn placement(art: &ArtBox, text_width: f32) -> (f32, f32) {
        let x = (art.center_x() - text_width / 2.0).max(art.left);
        (x, art.top)
    }
}

/// Page hook registered with the document: counts pages, prints the header and reserves the
/// content margins.
pub struct EnginePageHook {
    header: PageHeader,
    measurer: TextMeasurer,
    art: ArtBox,
    margins: Insets,
    font_size: u8,
    page: usize,
}

impl EnginePageHook {
    pub fn new(
        header: PageHeader,
        measurer: TextMeasurer,
        art: ArtBox,
        margins: Insets,
        font_size: u8,
    ) -> Self {
        EnginePageHook {
            header,
            measurer,
            art,
            margins,
            font_size,
            page: 0,
        }
    }

    /// Number of pages decorated so far.
    pub fn pages(&self) -> usize {
        self.page
    }

    /// Position of the header text for `line`, in millimeters, as expected by the engine.
    fn text_position(&self, line: &str) -> Position {
        let size = f32::from(self.font_size);
        let (x, baseline) = PageHeader::placement(&self.art, self.measurer.width(line, size));
        // The engine positions text by the top of its line box
        let top = baseline - self.measurer.ascent(size);
        Position::new(pt_to_mm(x), pt_to_mm(top))
    }
}

impl PageDecorator for EnginePageHook {
    fn decorate_page<'a>(
        &mut self,
        context: &Context,
        mut area: Area<'a>,
        style: Style,
    ) -> Result<Area<'a>, Error> {
        self.page += 1;
        let line = self.header.line(self.page);
        trace!("Decorating page {}: '{}'", self.page, line);

        let printed = area.print_str(
            &context.font_cache,
            self.text_position(&line),
            style.with_font_size(self.font_size),
            &line,
        )?;
        if !printed {
            warn!("Header '{}' does not fit on page {}", line, self.page);
        }

        area.add_margins(Margins::trbl(
            pt_to_mm(self.margins.top),
            pt_to_mm(self.margins.right),
            pt_to_mm(self.margins.bottom),
            pt_to_mm(self.margins.left),
        ));
        Ok(area)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReportConfig;

    #[test]
    fn test_header_line() {
        let header = PageHeader::new("3x3x3", Some("Round 1"));
        assert_eq!(header.text(), "3x3x3 Round 1");
        assert_eq!(header.line(1), "3x3x3 Round 1 page 1");
        assert_eq!(header.line(12), "3x3x3 Round 1 page 12");
    }

    #[test]
    fn test_header_without_title() {
        assert_eq!(PageHeader::new("Pyraminx", None).line(2), "Pyraminx page 2");
        assert_eq!(PageHeader::new("Pyraminx", Some("  ")).line(1), "Pyraminx page 1");
    }

    #[test]
    fn test_placement_centers_in_art_box() {
        let art = ReportConfig::default().art_box();
        let (x, y) = PageHeader::placement(&art, 100.0);
        assert_eq!(x, 256.0);
        assert_eq!(y, 54.0);
        assert_eq!(x + 50.0, art.center_x());
    }

    #[test]
    fn test_placement_clamps_wide_lines() {
        let art = ReportConfig::default().art_box();
        let (x, _) = PageHeader::placement(&art, 1000.0);
        assert_eq!(x, art.left);
    }

    #[test]
    fn test_pt_to_mm() {
        assert!((pt_to_mm(72.0) - 25.4).abs() < 0.001);
        assert_eq!(pt_to_mm(0.0), 0.0);
    }
}
