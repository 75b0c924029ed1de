//! The scramble2pdf library lays out puzzle scrambles into print-ready PDF scramble sheets.
//!
//! A scramble sheet is a single flowing table with three columns: the 1-based index of the
//! scramble, the scramble text itself, and a diagram of the scrambled puzzle. The table is
//! paginated by the document engine, and every page carries a header line naming the puzzle,
//! the optional sheet title and the page number.
//!
//! The library does not generate scrambles or draw puzzles on its own. Both are supplied by the
//! caller through the [`puzzle::Puzzle`] and [`scrambles::ScrambleSource`] traits:
//!
//! ```rust,no_run
//! use scramble2pdf::puzzle::{ColorScheme, DiagramCanvas, DiagramError, DiagramSize, Puzzle};
//! use scramble2pdf::scrambles::ScrambleSet;
//! use scramble2pdf::RenderRequest;
//!
//! struct Square;
//!
//! impl Puzzle for Square {
//!     fn short_name(&self) -> &str { "sq" }
//!     fn long_name(&self) -> &str { "Square" }
//!     fn preferred_size(&self, width: u32, height: u32) -> DiagramSize {
//!         let side = width.min(height);
//!         DiagramSize::new(side, side)
//!     }
//!     fn parse_color_scheme(&self, _scheme: Option<&str>) -> Result<ColorScheme, DiagramError> {
//!         Ok(ColorScheme::default())
//!     }
//!     fn draw_scramble(
//!         &self,
//!         _canvas: &mut DiagramCanvas,
//!         _scramble: &str,
//!         _scheme: &ColorScheme,
//!     ) -> Result<(), DiagramError> {
//!         Ok(())
//!     }
//! }
//!
//! fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let scrambles = ScrambleSet::new(vec!["R U R' U'".to_string(), "F2 B2".to_string()])?;
//!     let pdf = scramble2pdf::render(&Square, &scrambles, &RenderRequest::default())?;
//!     std::fs::write("sheet.pdf", pdf)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Rendering pipeline
//! ```text
//! +-------------+     +-----------------+     +------------------+     +-----------+
//! | ScrambleSet | --> | Diagram cells   | --> | Table assembler  | --> | Document  |
//! | + Puzzle    |     | (one surface    |     | rows, then one   |     | header on |
//! | + scheme    |     |  per scramble)  |     | width rebalance  |     | each page |
//! +-------------+     +-----------------+     +------------------+     +-----------+
//! ```
//!
//! Layout constants (page size, margins, limits, fonts) are loaded through [`config`] and can be
//! overridden with a TOML file.

pub mod canonical;
pub mod config;
pub mod decorator;
pub mod diagram;
pub mod fonts;
pub mod measure;
pub mod pdf;
pub mod puzzle;
pub mod scrambles;
pub mod table;

use std::error::Error;
use std::fmt;

pub use pdf::{render, Renderer, PDF_CONTENT_DISPOSITION, PDF_CONTENT_TYPE};

/// Optional knobs of a single render call.
///
/// Absent values are resolved against the [`config::ReportConfig`] when the document is
/// rendered, never when the request is built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderRequest {
    /// Printed in the page header after the puzzle name, and stored as document title.
    pub title: Option<String>,
    /// Requested diagram width in points. Must be positive when present.
    pub width: Option<u32>,
    /// Requested diagram height in points. Must be positive when present.
    pub height: Option<u32>,
    /// Color scheme identifier forwarded to the puzzle's scheme parser.
    pub scheme: Option<String>,
}

impl RenderRequest {
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = Some(scheme.into());
        self
    }

    /// Checks the request invariants: explicit sizes must be positive.
    pub fn validate(&self) -> Result<(), RenderError> {
        if self.width == Some(0) {
            return Err(RenderError::invalid_request("diagram width must be positive"));
        }
        if self.height == Some(0) {
            return Err(RenderError::invalid_request("diagram height must be positive"));
        }
        Ok(())
    }
}

/// Represents errors that can occur while rendering a scramble sheet.
///
/// Per-row diagram failures are not part of this type: they are recovered locally and shown as
/// an error cell in the table.
#[derive(Debug)]
pub enum RenderError {
    /// The caller's input was rejected before any layout work started
    InvalidRequest { message: String, suggestion: String },
    /// The requested diagram does not leave room for the other columns
    DiagramTooLarge {
        diagram_width: f32,
        usable_width: f32,
        suggestion: String,
    },
    /// The requested diagram, with its cell padding, is taller than the content area of a page
    DiagramTooTall {
        diagram_height: f32,
        usable_height: f32,
        suggestion: String,
    },
    /// Column balancing produced an unusable scramble column
    Layout { message: String, suggestion: String },
    /// No usable font could be loaded
    Font {
        font_name: String,
        message: String,
        suggestion: String,
    },
    /// The document engine failed to produce or finalize the output
    Document {
        message: String,
        suggestion: Option<String>,
    },
}

impl Error for RenderError {}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RenderError::InvalidRequest {
                message,
                suggestion,
            } => {
                write!(f, "❌ Invalid Request: {}", message)?;
                write!(f, "\n💡 Suggestion: {}", suggestion)
            }
            RenderError::DiagramTooLarge {
                diagram_width,
                usable_width,
                suggestion,
            } => {
                write!(
                    f,
                    "❌ Diagram too large for page: {:.1}pt wide, usable width is {:.1}pt",
                    diagram_width, usable_width
                )?;
                write!(f, "\n💡 Suggestion: {}", suggestion)
            }
            RenderError::DiagramTooTall {
                diagram_height,
                usable_height,
                suggestion,
            } => {
                write!(
                    f,
                    "❌ Diagram too tall for page: {:.1}pt high, usable height is {:.1}pt",
                    diagram_height, usable_height
                )?;
                write!(f, "\n💡 Suggestion: {}", suggestion)
            }
            RenderError::Layout {
                message,
                suggestion,
            } => {
                write!(f, "❌ Layout Error: {}", message)?;
                write!(f, "\n💡 Suggestion: {}", suggestion)
            }
            RenderError::Font {
                font_name,
                message,
                suggestion,
            } => {
                write!(f, "❌ Font Error: Failed to load font '{}'", font_name)?;
                write!(f, "\n   Reason: {}", message)?;
                write!(f, "\n💡 Suggestion: {}", suggestion)
            }
            RenderError::Document {
                message,
                suggestion,
            } => {
                write!(f, "❌ PDF Generation Error: {}", message)?;
                if let Some(hint) = suggestion {
                    write!(f, "\n💡 Suggestion: {}", hint)?;
                }
                Ok(())
            }
        }
    }
}

impl RenderError {
    /// Creates an invalid request error with a generic suggestion
    pub fn invalid_request(message: impl Into<String>) -> Self {
        RenderError::InvalidRequest {
            message: message.into(),
            suggestion: "Check the requested count, diagram size and color scheme".to_string(),
        }
    }

    /// Creates a document error with just a message
    pub fn document_error(message: impl Into<String>) -> Self {
        RenderError::Document {
            message: message.into(),
            suggestion: Some("Check available memory and try with fewer scrambles".to_string()),
        }
    }

    /// True when the failure was caused by the caller's input rather than by the renderer.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            RenderError::InvalidRequest { .. }
                | RenderError::DiagramTooLarge { .. }
                | RenderError::DiagramTooTall { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_validation() {
        assert!(RenderRequest::default().validate().is_ok());
        assert!(RenderRequest::default().with_size(200, 150).validate().is_ok());

        let zero_width = RenderRequest {
            width: Some(0),
            ..RenderRequest::default()
        };
        assert!(matches!(
            zero_width.validate(),
            Err(RenderError::InvalidRequest { .. })
        ));

        let zero_height = RenderRequest {
            height: Some(0),
            ..RenderRequest::default()
        };
        assert!(matches!(
            zero_height.validate(),
            Err(RenderError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn test_request_builders() {
        let request = RenderRequest::default()
            .with_title("Round 1")
            .with_size(120, 90)
            .with_scheme("default");
        assert_eq!(request.title.as_deref(), Some("Round 1"));
        assert_eq!(request.width, Some(120));
        assert_eq!(request.height, Some(90));
        assert_eq!(request.scheme.as_deref(), Some("default"));
    }

    #[test]
    fn test_error_display_variants() {
        let e = RenderError::invalid_request("bad count");
        let s = format!("{}", e);
        assert!(s.contains("Invalid Request: bad count"));
        assert!(s.contains("Suggestion:"));

        let e = RenderError::DiagramTooLarge {
            diagram_width: 500.0,
            usable_width: 462.0,
            suggestion: "shrink it".to_string(),
        };
        let s = format!("{}", e);
        assert!(s.contains("Diagram too large for page"));
        assert!(s.contains("500.0pt"));
        assert!(s.contains("462.0pt"));

        let e = RenderError::DiagramTooTall {
            diagram_height: 700.0,
            usable_height: 642.0,
            suggestion: "shorten it".to_string(),
        };
        let s = format!("{}", e);
        assert!(s.contains("Diagram too tall for page: 700.0pt high"));
        assert!(s.contains("642.0pt"));

        let e = RenderError::Font {
            font_name: "X".to_string(),
            message: "nope".to_string(),
            suggestion: "install foo".to_string(),
        };
        let s = format!("{}", e);
        assert!(s.contains("Font Error: Failed to load font 'X'"));
        assert!(s.contains("Reason: nope"));

        let e = RenderError::document_error("flush failed");
        let s = format!("{}", e);
        assert!(s.contains("PDF Generation Error: flush failed"));
    }

    #[test]
    fn test_caller_errors_are_distinguished() {
        assert!(RenderError::invalid_request("x").is_caller_error());
        assert!(RenderError::DiagramTooLarge {
            diagram_width: 1.0,
            usable_width: 1.0,
            suggestion: String::new(),
        }
        .is_caller_error());
        assert!(RenderError::DiagramTooTall {
            diagram_height: 700.0,
            usable_height: 642.0,
            suggestion: String::new(),
        }
        .is_caller_error());
        assert!(!RenderError::document_error("x").is_caller_error());
        assert!(!RenderError::Layout {
            message: String::new(),
            suggestion: String::new(),
        }
        .is_caller_error());
    }
}
