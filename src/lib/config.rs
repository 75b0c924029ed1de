//! Configuration module for the scramble sheet layout.
//!
//! Every constant that shapes a scramble sheet (page size, margins, the header art box,
//! request limits, diagram defaults and fonts) lives in [`ReportConfig`]. The values are plain
//! configuration handed to the renderer; nothing here is process-wide state.
//!
//! # Configuration Structure
//!
//! The configuration uses TOML format. All sections and keys are optional:
//! - `page` sets the page `width` and `height` in points (default: US Letter, 612 x 792)
//! - `margin` sets the content margins `top`, `right`, `bottom`, `left` in points (default 75)
//! - `art` sets the header box insets `horizontal` and `vertical` in points (default 36 / 54)
//! - `limits` sets `max_count`, the largest accepted number of scrambles (default 100)
//! - `diagram` sets `width`, `height_fraction`, `background` and `parallel`
//! - `index` sets `safety_factor`, the multiplier applied to the widest index label
//! - `font` sets `body`, `scramble`, `size`, `scramble_size`, `header_size` and `cell_padding`
//!
//! # Configuration Example
//!
//! ```toml
//! [margin]
//! top = 60.0
//! bottom = 60.0
//!
//! [diagram]
//! width = 180
//! background = { r = 200, g = 200, b = 200 }
//! parallel = true
//!
//! [font]
//! scramble = "DejaVu Sans Mono"
//! scramble_size = 11
//! ```
//!
//! Invalid TOML or mistyped values never fail: the affected settings keep their defaults.

use std::fs;
use std::path::Path;
use toml::Value;

/// Configuration source for the report configuration.
#[derive(Debug, Clone)]
pub enum ConfigSource<'a> {
    /// Use the built-in defaults
    Default,
    /// Load configuration from a file path
    File(&'a str),
    /// Use an embedded TOML configuration string
    Embedded(&'a str),
}

/// Distances from the page edges, in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Insets {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
}

impl Insets {
    pub const fn uniform(value: f32) -> Self {
        Insets {
            top: value,
            right: value,
            bottom: value,
            left: value,
        }
    }

    pub const fn symmetric(vertical: f32, horizontal: f32) -> Self {
        Insets {
            top: vertical,
            right: horizontal,
            bottom: vertical,
            left: horizontal,
        }
    }
}

/// Rectangle reserved for the page header, in points measured from the top-left page corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArtBox {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl ArtBox {
    pub fn center_x(&self) -> f32 {
        (self.left + self.right) / 2.0
    }
}

/// Complete layout configuration of a scramble sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportConfig {
    pub page_width: f32,
    pub page_height: f32,
    pub margins: Insets,
    pub art_insets: Insets,
    /// Largest accepted scramble count; larger requests are clamped by the scramble source
    /// helpers and rejected by [`crate::scrambles::ScrambleSet`].
    pub max_count: usize,
    pub default_diagram_width: u32,
    /// Default diagram height as a fraction of the page height (one fifth fits five rows).
    pub diagram_height_fraction: f32,
    pub diagram_background: (u8, u8, u8),
    pub parallel_diagrams: bool,
    /// Multiplier applied to the widest measured index label.
    pub index_width_safety_factor: f32,
    pub body_font: String,
    pub scramble_font: String,
    pub text_size: u8,
    pub scramble_size: u8,
    pub header_size: u8,
    /// Inner padding of every table cell, in points.
    pub cell_padding: f32,
}

/// The measured index width is doubled to keep labels from clipping against the cell frame.
pub const INDEX_WIDTH_SAFETY_FACTOR: f32 = 2.0;

pub const DEFAULT_MAX_COUNT: usize = 100;
pub const DEFAULT_DIAGRAM_WIDTH: u32 = 200;

impl Default for ReportConfig {
    fn default() -> Self {
        ReportConfig {
            page_width: 612.0,
            page_height: 792.0,
            margins: Insets::uniform(75.0),
            art_insets: Insets::symmetric(54.0, 36.0),
            max_count: DEFAULT_MAX_COUNT,
            default_diagram_width: DEFAULT_DIAGRAM_WIDTH,
            diagram_height_fraction: 0.2,
            diagram_background: (128, 128, 128),
            parallel_diagrams: false,
            index_width_safety_factor: INDEX_WIDTH_SAFETY_FACTOR,
            body_font: "DejaVu Sans".to_string(),
            scramble_font: "DejaVu Sans Mono".to_string(),
            text_size: 12,
            scramble_size: 12,
            header_size: 12,
            cell_padding: 2.0,
        }
    }
}

impl ReportConfig {
    /// Width between the left and right content margins.
    pub fn content_width(&self) -> f32 {
        self.page_width - self.margins.left - self.margins.right
    }

    /// Height between the top and bottom content margins.
    pub fn content_height(&self) -> f32 {
        self.page_height - self.margins.top - self.margins.bottom
    }

    pub fn art_box(&self) -> ArtBox {
        ArtBox {
            left: self.art_insets.left,
            top: self.art_insets.top,
            right: self.page_width - self.art_insets.right,
            bottom: self.page_height - self.art_insets.bottom,
        }
    }

    pub fn default_diagram_height(&self) -> u32 {
        (self.page_height * self.diagram_height_fraction) as u32
    }
}

fn parse_f32(value: Option<&Value>, key: &str) -> Option<f32> {
    value.and_then(|v| v.get(key)).and_then(|v| {
        v.as_float()
            .or_else(|| v.as_integer().map(|i| i as f64))
            .map(|f| f as f32)
    })
}

fn parse_u32(value: Option<&Value>, key: &str) -> Option<u32> {
    value
        .and_then(|v| v.get(key))
        .and_then(|v| v.as_integer())
        .filter(|i| *i > 0)
        .and_then(|i| u32::try_from(i).ok())
}

fn parse_u8(value: Option<&Value>, key: &str) -> Option<u8> {
    value
        .and_then(|v| v.get(key))
        .and_then(|v| v.as_integer())
        .filter(|i| *i > 0)
        .and_then(|i| u8::try_from(i).ok())
}

fn parse_string(value: Option<&Value>, key: &str) -> Option<String> {
    value
        .and_then(|v| v.get(key))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

/// Parses an RGB color table `{ r = .., g = .., b = .. }`.
fn parse_color(value: Option<&Value>, field: &str) -> Option<(u8, u8, u8)> {
    value.and_then(|c| {
        let color = c.get(field)?;
        let channel = |name: &str| u8::try_from(color.get(name)?.as_integer()?).ok();
        let (r, g, b) = (channel("r")?, channel("g")?, channel("b")?);
        Some((r, g, b))
    })
}

fn parse_insets(value: Option<&Value>, default: Insets) -> Insets {
    Insets {
        top: parse_f32(value, "top").unwrap_or(default.top),
        right: parse_f32(value, "right").unwrap_or(default.right),
        bottom: parse_f32(value, "bottom").unwrap_or(default.bottom),
        left: parse_f32(value, "left").unwrap_or(default.left),
    }
}

/// Parses a TOML string into a configuration, keeping defaults for anything missing.
///
/// # Examples
/// ```rust
/// use scramble2pdf::config::parse_config_string;
///
/// let config = parse_config_string(r#"
/// [limits]
/// max_count = 12
///
/// [diagram]
/// width = 150
/// "#);
/// assert_eq!(config.max_count, 12);
/// assert_eq!(config.default_diagram_width, 150);
/// assert_eq!(config.page_width, 612.0);
/// ```
pub fn parse_config_string(config_str: &str) -> ReportConfig {
    let config: Value = match toml::from_str(config_str) {
        Ok(v) => v,
        Err(e) => {
            log::warn!("Ignoring invalid report configuration: {}", e);
            return ReportConfig::default();
        }
    };

    let default = ReportConfig::default();
    let page = config.get("page");
    let art = config.get("art");
    let limits = config.get("limits");
    let diagram = config.get("diagram");
    let index = config.get("index");
    let font = config.get("font");

    let art_insets = Insets::symmetric(
        parse_f32(art, "vertical").unwrap_or(default.art_insets.top),
        parse_f32(art, "horizontal").unwrap_or(default.art_insets.left),
    );

    ReportConfig {
        page_width: parse_f32(page, "width")
            .filter(|w| *w > 0.0)
            .unwrap_or(default.page_width),
        page_height: parse_f32(page, "height")
            .filter(|h| *h > 0.0)
            .unwrap_or(default.page_height),
        margins: parse_insets(config.get("margin"), default.margins),
        art_insets,
        max_count: parse_u32(limits, "max_count")
            .map(|c| c as usize)
            .unwrap_or(default.max_count),
        default_diagram_width: parse_u32(diagram, "width").unwrap_or(default.default_diagram_width),
        diagram_height_fraction: parse_f32(diagram, "height_fraction")
            .filter(|f| *f > 0.0 && *f <= 1.0)
            .unwrap_or(default.diagram_height_fraction),
        diagram_background: parse_color(diagram, "background")
            .unwrap_or(default.diagram_background),
        parallel_diagrams: diagram
            .and_then(|d| d.get("parallel"))
            .and_then(|v| v.as_bool())
            .unwrap_or(default.parallel_diagrams),
        index_width_safety_factor: parse_f32(index, "safety_factor")
            .filter(|f| *f >= 1.0)
            .unwrap_or(default.index_width_safety_factor),
        body_font: parse_string(font, "body").unwrap_or(default.body_font),
        scramble_font: parse_string(font, "scramble").unwrap_or(default.scramble_font),
        text_size: parse_u8(font, "size").unwrap_or(default.text_size),
        scramble_size: parse_u8(font, "scramble_size").unwrap_or(default.scramble_size),
        header_size: parse_u8(font, "header_size").unwrap_or(default.header_size),
        cell_padding: parse_f32(font, "cell_padding")
            .filter(|p| *p >= 0.0)
            .unwrap_or(default.cell_padding),
    }
}

/// Loads the report configuration from the given source.
///
/// A missing or unreadable file yields the defaults, like an invalid TOML string does.
pub fn load_config_from_source(source: ConfigSource) -> ReportConfig {
    match source {
        ConfigSource::Default => ReportConfig::default(),
        ConfigSource::File(path) => match fs::read_to_string(Path::new(path)) {
            Ok(s) => parse_config_string(&s),
            Err(e) => {
                log::debug!("Report configuration '{}' not readable: {}", path, e);
                ReportConfig::default()
            }
        },
        ConfigSource::Embedded(config_str) => parse_config_string(config_str),
    }
}
