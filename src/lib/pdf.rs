//! PDF generation for scramble sheets.
//!
//! [`Renderer::render`] drives one render call from start to finish: it validates the request,
//! resolves the diagram size and color scheme through the puzzle, loads the fonts, builds the
//! balanced [`ScrambleTable`], hands the table to the document engine as its single flowing body
//! element and finally stamps the document information dictionary and brings the file into its
//! reproducible form (see [`crate::canonical`]).
//!
//! Each call owns its document and is synchronous; a `Renderer` can be shared between threads
//! and used for any number of sheets.

use std::io::Cursor;

use chrono::{DateTime, Utc};
use genpdfi_extended::elements::{
    FrameCellDecorator, Image, LinearLayout, PaddedElement, Paragraph, TableLayout,
};
use genpdfi_extended::fonts::{Font, FontFamily};
use genpdfi_extended::style::Style;
use genpdfi_extended::{Alignment, Document, Element, Margins, Scale, Size};
use log::{debug, info, warn};
use lopdf::{Dictionary, Object};

use crate::canonical::canonicalize;
use crate::config::{load_config_from_source, ConfigSource, ReportConfig};
use crate::decorator::{pt_to_mm, EnginePageHook, PageHeader};
use crate::diagram::{Bitmap, Cell, DIAGRAM_ERROR_PREFIX};
use crate::fonts::{load_report_fonts, ReportFonts};
use crate::measure::TextMeasurer;
use crate::puzzle::{DiagramSize, Puzzle};
use crate::scrambles::ScrambleSet;
use crate::table::{
    cell_text_width, check_diagram_fits, fit_lines, image_placement, CellLayout, ScrambleTable,
    TableBuilder,
};
use crate::{RenderError, RenderRequest};

/// Content type of the produced bytes.
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Suggested content disposition: sheets are meant to be displayed, not downloaded.
pub const PDF_CONTENT_DISPOSITION: &str = "inline";

/// Identity written as author, creator and producer of every sheet.
pub const PRODUCER: &str = concat!("scramble2pdf ", env!("CARGO_PKG_VERSION"));

/// Renders `scrambles` with the default configuration and the current time as creation date.
pub fn render(
    puzzle: &dyn Puzzle,
    scrambles: &ScrambleSet,
    request: &RenderRequest,
) -> Result<Vec<u8>, RenderError> {
    Renderer::default().render(puzzle, scrambles, request, Utc::now())
}

/// Formats a timestamp as a PDF date string.
pub fn pdf_date(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("D:%Y%m%d%H%M%SZ").to_string()
}

fn engine_error(context: &str, e: impl std::fmt::Display) -> RenderError {
    RenderError::Document {
        message: format!("{}: {}", context, e),
        suggestion: None,
    }
}

/// Scramble sheet renderer bound to one layout configuration.
#[derive(Debug, Clone, Default)]
pub struct Renderer {
    config: ReportConfig,
}

impl Renderer {
    pub fn new(config: ReportConfig) -> Self {
        Renderer { config }
    }

    pub fn from_source(source: ConfigSource) -> Self {
        Self::new(load_config_from_source(source))
    }

    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    /// Diagram size for a request, absent dimensions taking the configured defaults.
    pub fn resolve_size(&self, puzzle: &dyn Puzzle, request: &RenderRequest) -> DiagramSize {
        let width = request.width.unwrap_or(self.config.default_diagram_width);
        let height = request
            .height
            .unwrap_or_else(|| self.config.default_diagram_height());
        puzzle.preferred_size(width, height)
    }

    /// Runs every step that precedes the document engine and returns the balanced table.
    pub fn build_table(
        &self,
        puzzle: &dyn Puzzle,
        scrambles: &ScrambleSet,
        request: &RenderRequest,
        fonts: &ReportFonts,
    ) -> Result<ScrambleTable, RenderError> {
        let size = self.prepare(puzzle, scrambles, request)?;
        let scheme = puzzle
            .parse_color_scheme(request.scheme.as_deref())
            .map_err(|e| RenderError::InvalidRequest {
                message: format!(
                    "invalid color scheme '{}': {}",
                    request.scheme.as_deref().unwrap_or_default(),
                    e
                ),
                suggestion: format!("Use a color scheme supported by {}", puzzle.long_name()),
            })?;

        let body = TextMeasurer::new(&fonts.body);
        let scramble = TextMeasurer::new(&fonts.scramble);
        TableBuilder::new(puzzle, &self.config, &body, &scramble).build(scrambles, size, &scheme)
    }

    /// Checks the request against the configuration and resolves the diagram size.
    fn prepare(
        &self,
        puzzle: &dyn Puzzle,
        scrambles: &ScrambleSet,
        request: &RenderRequest,
    ) -> Result<DiagramSize, RenderError> {
        request.validate()?;
        if scrambles.len() > self.config.max_count {
            return Err(RenderError::InvalidRequest {
                message: format!(
                    "{} scrambles requested, at most {} are allowed",
                    scrambles.len(),
                    self.config.max_count
                ),
                suggestion: format!(
                    "Split the sheet into chunks of {} scrambles",
                    self.config.max_count
                ),
            });
        }
        let size = self.resolve_size(puzzle, request);
        check_diagram_fits(size, &self.config)?;
        Ok(size)
    }

    /// Renders a complete scramble sheet.
    ///
    /// `created` is written as the document creation date, so identical inputs and timestamps
    /// give byte-identical documents.
    pub fn render(
        &self,
        puzzle: &dyn Puzzle,
        scrambles: &ScrambleSet,
        request: &RenderRequest,
        created: DateTime<Utc>,
    ) -> Result<Vec<u8>, RenderError> {
        info!(
            "Rendering {} {} scrambles",
            scrambles.len(),
            puzzle.short_name()
        );
        // Fail on caller errors before touching fonts or the puzzle's renderer
        self.prepare(puzzle, scrambles, request)?;

        let fonts = load_report_fonts(&self.config)?;
        let table = self.build_table(puzzle, scrambles, request, &fonts)?;
        if table.failed_diagrams() > 0 {
            warn!(
                "{} of {} diagrams could not be drawn",
                table.failed_diagrams(),
                table.len()
            );
        }

        let header = PageHeader::new(puzzle.long_name(), request.title.as_deref());
        let document = self.render_into_document(&table, &fonts, header)?;

        let mut buffer = Cursor::new(Vec::new());
        document
            .render(&mut buffer)
            .map_err(|e| engine_error("failed to render document", e))?;
        let bytes = buffer.into_inner();
        debug!("Engine produced {} bytes", bytes.len());

        let stamped = stamp_metadata(&bytes, request.title.as_deref(), &created)?;
        info!("Rendered scramble sheet ({} bytes)", stamped.len());
        Ok(stamped)
    }

    /// Creates the engine document with the page hook registered and the table pushed.
    fn render_into_document(
        &self,
        table: &ScrambleTable,
        fonts: &ReportFonts,
        header: PageHeader,
    ) -> Result<Document, RenderError> {
        let family = fonts
            .body
            .to_font_family()
            .map_err(|e| engine_error("failed to embed body font", e))?;
        let mut doc = Document::new(family);
        doc.set_title(header.text());
        doc.set_paper_size(Size::new(
            pt_to_mm(self.config.page_width),
            pt_to_mm(self.config.page_height),
        ));
        doc.set_font_size(self.config.text_size);

        doc.set_page_decorator(EnginePageHook::new(
            header,
            TextMeasurer::new(&fonts.body),
            self.config.art_box(),
            self.config.margins,
            self.config.header_size,
        ));

        let scramble_family = fonts
            .scramble
            .to_font_family()
            .map_err(|e| engine_error("failed to embed scramble font", e))?;
        let scramble_font = doc.add_font_family(scramble_family);

        let body = TextMeasurer::new(&fonts.body);
        doc.push(self.table_layout(table, scramble_font, &body)?);
        Ok(doc)
    }

    fn table_layout(
        &self,
        table: &ScrambleTable,
        scramble_font: FontFamily<Font>,
        body: &TextMeasurer,
    ) -> Result<TableLayout, RenderError> {
        let pad = table.cell_padding();
        let mut layout = TableLayout::new(table.widths().weights());
        layout.set_cell_decorator(FrameCellDecorator::new(true, true, false));

        let body_style = Style::new();
        let scramble_style = Style::new().with_font_override(scramble_font);

        for (row, cells) in table.iter() {
            let mut table_row = layout.row();
            table_row.push_element(text_element(&cells.index, body_style, pad));
            table_row.push_element(text_element(&cells.scramble, scramble_style, pad));
            match &row.diagram {
                Cell::Image(bitmap) => match image_element(bitmap, &cells.diagram, table) {
                    Ok(image) => table_row.push_element(image),
                    Err(e) => {
                        warn!("Diagram for '{}' could not be embedded: {}", row.scramble, e);
                        let size = cells.diagram.font_size;
                        let message = format!("{} {}", DIAGRAM_ERROR_PREFIX, e);
                        let width = cell_text_width(table.widths().diagram(), pad);
                        let lines =
                            fit_lines(&message, width, |t| body.extent(t, f32::from(size)));
                        let fallback = CellLayout {
                            lines,
                            ..cells.diagram.clone()
                        };
                        table_row.push_element(text_element(&fallback, body_style, pad));
                    }
                },
                Cell::Text(_) => table_row.push_element(text_element(&cells.diagram, body_style, pad)),
            }
            table_row
                .push()
                .map_err(|e| engine_error(&format!("failed to add row {}", row.label), e))?;
        }

        Ok(layout)
    }
}

fn text_element(cell: &CellLayout, style: Style, pad: f32) -> PaddedElement<LinearLayout> {
    let mut lines = LinearLayout::vertical();
    for line in &cell.lines {
        let mut para = Paragraph::default();
        para.push_styled(line.clone(), style.with_font_size(cell.font_size));
        lines.push(para);
    }
    lines.padded(Margins::trbl(
        pt_to_mm(cell.top_padding),
        pt_to_mm(pad),
        pt_to_mm(cell.bottom_padding),
        pt_to_mm(pad),
    ))
}

fn image_element(
    bitmap: &Bitmap,
    cell: &CellLayout,
    table: &ScrambleTable,
) -> Result<PaddedElement<Image>, genpdfi_extended::error::Error> {
    let (scale, _) = image_placement(bitmap, table.widths().diagram());
    let image = Image::from_reader(Cursor::new(bitmap.png.clone()))?
        .with_alignment(Alignment::Center)
        .with_scale(Scale::new(scale, scale));
    Ok(image.padded(Margins::trbl(
        pt_to_mm(cell.top_padding),
        0.0,
        pt_to_mm(cell.bottom_padding),
        0.0,
    )))
}

/// Writes author, creator, producer, creation date and title into the document information
/// dictionary of `pdf` and rewrites the file into its reproducible form.
///
/// The information dictionary is rebuilt from these fields alone, so the result only depends on
/// the drawn pages, `title` and `created`.
pub fn stamp_metadata(
    pdf: &[u8],
    title: Option<&str>,
    created: &DateTime<Utc>,
) -> Result<Vec<u8>, RenderError> {
    let mut doc = lopdf::Document::load_mem(pdf)
        .map_err(|e| engine_error("failed to reopen rendered document", e))?;

    let date = pdf_date(created);
    let mut info = Dictionary::new();
    info.set("Author", Object::string_literal(PRODUCER));
    info.set("Creator", Object::string_literal(PRODUCER));
    info.set("Producer", Object::string_literal(PRODUCER));
    info.set("CreationDate", Object::string_literal(date.clone()));
    info.set("ModDate", Object::string_literal(date));
    if let Some(title) = title.map(str::trim).filter(|t| !t.is_empty()) {
        info.set("Title", Object::string_literal(title));
    }
    let info_id = doc.add_object(info);
    doc.trailer.set("Info", Object::Reference(info_id));

    canonicalize(&mut doc).map_err(|e| engine_error("failed to normalize document", e))?;

    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|e| engine_error("failed to write document metadata", e))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::puzzle::{ColorScheme, DiagramCanvas, DiagramError};
    use chrono::TimeZone;

    struct Strict;

    impl Puzzle for Strict {
        fn short_name(&self) -> &str {
            "strict"
        }

        fn long_name(&self) -> &str {
            "Strict"
        }

        fn preferred_size(&self, width: u32, height: u32) -> DiagramSize {
            DiagramSize::new(width, height)
        }

        fn parse_color_scheme(&self, scheme: Option<&str>) -> Result<ColorScheme, DiagramError> {
            match scheme {
                None | Some("default") => Ok(ColorScheme::default()),
                Some(other) => Err(DiagramError::new(format!("unknown scheme {}", other))),
            }
        }

        fn draw_scramble(
            &self,
            _canvas: &mut DiagramCanvas,
            _scramble: &str,
            _scheme: &ColorScheme,
        ) -> Result<(), DiagramError> {
            Ok(())
        }
    }

    fn two_scrambles() -> ScrambleSet {
        ScrambleSet::new(vec!["R U".to_string(), "F2 B2".to_string()]).unwrap()
    }

    #[test]
    fn test_content_hints() {
        assert_eq!(PDF_CONTENT_TYPE, "application/pdf");
        assert_eq!(PDF_CONTENT_DISPOSITION, "inline");
        assert!(PRODUCER.starts_with("scramble2pdf "));
    }

    #[test]
    fn test_pdf_date() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(pdf_date(&ts), "D:20240309140507Z");
    }

    #[test]
    fn test_resolve_size_defaults() {
        let renderer = Renderer::default();
        assert_eq!(
            renderer.resolve_size(&Strict, &RenderRequest::default()),
            DiagramSize::new(200, 158)
        );
        assert_eq!(
            renderer.resolve_size(&Strict, &RenderRequest::default().with_size(120, 80)),
            DiagramSize::new(120, 80)
        );
    }

    #[test]
    fn test_invalid_requests_fail_early() {
        let renderer = Renderer::default();
        let ts = Utc::now();
        let zero = RenderRequest {
            width: Some(0),
            ..RenderRequest::default()
        };
        assert!(matches!(
            renderer.render(&Strict, &two_scrambles(), &zero, ts),
            Err(RenderError::InvalidRequest { .. })
        ));

        let wide = RenderRequest::default().with_size(500, 100);
        assert!(matches!(
            renderer.render(&Strict, &two_scrambles(), &wide, ts),
            Err(RenderError::DiagramTooLarge { .. })
        ));

        let tall = RenderRequest::default().with_size(200, 100_000);
        assert!(matches!(
            renderer.render(&Strict, &two_scrambles(), &tall, ts),
            Err(RenderError::DiagramTooTall { .. })
        ));
    }

    #[test]
    fn test_configured_max_count_applies() {
        let renderer = Renderer::new(ReportConfig {
            max_count: 1,
            ..ReportConfig::default()
        });
        let result = renderer.render(&Strict, &two_scrambles(), &RenderRequest::default(), Utc::now());
        assert!(matches!(result, Err(RenderError::InvalidRequest { .. })));
    }

    #[test]
    fn test_unknown_scheme_is_invalid_request() {
        let renderer = Renderer::default();
        let fonts = load_report_fonts(renderer.config()).expect("test font");
        let request = RenderRequest::default().with_scheme("neon");
        let result = renderer.build_table(&Strict, &two_scrambles(), &request, &fonts);
        match result {
            Err(RenderError::InvalidRequest { message, .. }) => {
                assert!(message.contains("neon"));
            }
            other => panic!("expected InvalidRequest, got {:?}", other),
        }
    }

    #[test]
    fn test_build_table_for_two_scrambles() {
        let renderer = Renderer::default();
        let fonts = load_report_fonts(renderer.config()).expect("test font");
        let table = renderer
            .build_table(&Strict, &two_scrambles(), &RenderRequest::default(), &fonts)
            .unwrap();
        let labels: Vec<&str> = table.rows().iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["1.", "2."]);
        assert_eq!(table.widths().diagram(), 200.0);
        assert_eq!(table.widths().total(), 462.0);
    }
}
