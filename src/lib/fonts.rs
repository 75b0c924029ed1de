//! Font discovery for scramble sheets.
//!
//! Fonts are always embedded into the document, and the very same bytes are used to build the
//! [`crate::measure::TextMeasurer`], so measured widths and drawn widths agree.
//!
//! The body font is mandatory: if the configured family cannot be found, any usable system font
//! is taken instead, and when the system has none the DejaVu Sans bundled with the crate is
//! used. The scramble font is optional: if it cannot be loaded the bundled DejaVu Sans Mono
//! stands in for a DejaVu family, and the body font for anything else. Every fallback is logged
//! and none of them fails the render.

use std::fs;
use std::panic;
use std::path::Path;
use std::sync::Arc;

use fontdb::Database;
use genpdfi_extended::error::Error;
use genpdfi_extended::fonts::{FontData, FontFamily};
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use rusttype::Font;

use crate::config::ReportConfig;
use crate::RenderError;

/// Index of the installed system fonts. Loading it scans the font directories, so it is done
/// once and shared read-only between render calls.
static SYSTEM_FONTS: Lazy<Database> = Lazy::new(|| {
    let mut db = Database::new();
    db.load_system_fonts();
    debug!("Indexed {} system font faces", db.len());
    db
});

// Bundled fonts, used when the system provides no usable face
static EMBEDDED_SANS: &[u8] = include_bytes!("../../fonts/DejaVuSans.ttf");
static EMBEDDED_MONO: &[u8] = include_bytes!("../../fonts/DejaVuSansMono.ttf");

/// Returns common aliases for a font name.
///
/// This allows users to specify "Courier" and have the system try
/// "Liberation Mono", "DejaVu Sans Mono", etc.
fn get_font_aliases(name: &str) -> Vec<&'static str> {
    match name.to_lowercase().as_str() {
        "arial" | "helvetica" => vec!["Liberation Sans", "DejaVu Sans", "FreeSans"],
        "times new roman" | "times" => vec!["Liberation Serif", "DejaVu Serif", "FreeSerif"],
        "courier new" | "courier" | "monospace" => {
            vec!["Liberation Mono", "DejaVu Sans Mono", "FreeMono"]
        }
        "dejavu sans mono" => vec!["Liberation Mono", "FreeMono"],
        "dejavu sans" => vec!["Liberation Sans", "FreeSans"],
        _ => vec![],
    }
}

/// A font whose bytes are shared between the document engine and the text measurer.
#[derive(Clone)]
pub struct LoadedFont {
    name: String,
    data: Arc<Vec<u8>>,
    font: Font<'static>,
}

impl std::fmt::Debug for LoadedFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedFont")
            .field("name", &self.name)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl LoadedFont {
    /// Validates the bytes with rusttype and wraps them.
    ///
    /// Returns `None` when the data is not a usable TrueType/OpenType font.
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Option<Self> {
        // `try_from_vec` returns an Option; `catch_unwind` guards against parser panics on
        // malformed files.
        let font = panic::catch_unwind(|| Font::try_from_vec(bytes.clone()))
            .ok()
            .flatten()?;
        Some(LoadedFont {
            name: name.into(),
            data: Arc::new(bytes),
            font,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rusttype_font(&self) -> &Font<'static> {
        &self.font
    }

    /// Builds the engine font family. The same face is used for all four variants.
    pub fn to_font_family(&self) -> Result<FontFamily<FontData>, Error> {
        let mk = || FontData::new_shared(self.data.clone(), None);
        Ok(FontFamily {
            regular: mk()?,
            bold: mk()?,
            italic: mk()?,
            bold_italic: mk()?,
        })
    }
}

/// The two fonts used on a scramble sheet.
#[derive(Debug, Clone)]
pub struct ReportFonts {
    /// Index labels, error cells and the page header.
    pub body: LoadedFont,
    /// Scramble text. Falls back to the body font.
    pub scramble: LoadedFont,
}

fn is_collection(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case("ttc"))
}

/// Searches the system font index for a regular face whose family or file name is `wanted`.
fn find_system_font(db: &Database, wanted: &str) -> Option<LoadedFont> {
    let wanted = wanted.to_lowercase();

    for face in db.faces() {
        let path = match &face.source {
            fontdb::Source::File(p) => p,
            _ => continue,
        };

        // .ttc collections share tables between faces and cannot be embedded as-is
        if is_collection(path) {
            continue;
        }

        let face_family = face.families.first().map(|(name, _)| name.to_lowercase());
        let matches_family = face_family.as_ref().map_or(false, |f| *f == wanted);
        let file_name = path
            .file_stem()
            .and_then(|n| n.to_str())
            .unwrap_or("")
            .to_lowercase();
        let matches_filename = file_name == wanted.replace(' ', "");

        if !matches_family && !matches_filename {
            continue;
        }
        // Prefer the upright regular face of the family
        if face.style != fontdb::Style::Normal
            || face.weight != fontdb::Weight::NORMAL
            || face.stretch != fontdb::Stretch::Normal
        {
            continue;
        }

        match fs::read(path) {
            Ok(bytes) => {
                let name = face
                    .families
                    .first()
                    .map(|(n, _)| n.clone())
                    .unwrap_or_else(|| file_name.clone());
                if let Some(font) = LoadedFont::from_bytes(name, bytes) {
                    return Some(font);
                }
                debug!("Font data in {:?} is invalid, skipping", path);
            }
            Err(e) => {
                warn!("Failed to read font file {:?}: {}", path, e);
            }
        }
    }
    None
}

/// Picks the first usable TTF/OTF font of the system, whatever its family.
fn any_system_font(db: &Database) -> Option<LoadedFont> {
    for face in db.faces() {
        let path = match &face.source {
            fontdb::Source::File(p) => p,
            _ => continue,
        };
        match path.extension().and_then(|s| s.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("ttf") || ext.eq_ignore_ascii_case("otf") => {}
            _ => continue,
        }
        if let Ok(bytes) = fs::read(path) {
            let name = face
                .families
                .first()
                .map(|(n, _)| n.clone())
                .unwrap_or_default();
            if let Some(font) = LoadedFont::from_bytes(name, bytes) {
                return Some(font);
            }
        }
    }
    None
}

/// Returns the bundled font matching `name` (case-insensitive), if any.
///
/// Names containing "mono", "courier" or "typewriter" map to DejaVu Sans Mono; "dejavu",
/// "sans", "arial" and "helvetica" map to DejaVu Sans.
pub fn embedded_font(name: &str) -> Option<LoadedFont> {
    let l = name.to_ascii_lowercase();
    let (family, bytes) = if l.contains("mono") || l.contains("courier") || l.contains("typewriter")
    {
        ("DejaVu Sans Mono", EMBEDDED_MONO)
    } else if l.contains("dejavu")
        || l.contains("sans")
        || l.contains("arial")
        || l.contains("helvetica")
    {
        ("DejaVu Sans", EMBEDDED_SANS)
    } else {
        return None;
    };
    LoadedFont::from_bytes(family, bytes.to_vec())
}

/// Loads a font by family name, alias, or path to a font file.
pub fn load_font(name: &str) -> Result<LoadedFont, RenderError> {
    let path = Path::new(name);
    if path.is_file() {
        let bytes = fs::read(path).map_err(|e| RenderError::Font {
            font_name: name.to_string(),
            message: e.to_string(),
            suggestion: "Check that the font file exists and is readable".to_string(),
        })?;
        return LoadedFont::from_bytes(name, bytes).ok_or_else(|| RenderError::Font {
            font_name: name.to_string(),
            message: "the file is not a valid TrueType/OpenType font".to_string(),
            suggestion: "Use a .ttf or .otf file; .ttc collections are not supported".to_string(),
        });
    }

    let db = &*SYSTEM_FONTS;
    let mut candidates = vec![name];
    candidates.extend(get_font_aliases(name));

    for candidate in candidates {
        if let Some(font) = find_system_font(db, candidate) {
            if candidate != name {
                debug!("Using '{}' as alias for '{}'", candidate, name);
            }
            return Ok(font);
        }
    }

    if let Some(font) = embedded_font(name) {
        debug!("Using the bundled '{}' for '{}'", font.name(), name);
        return Ok(font);
    }

    Err(RenderError::Font {
        font_name: name.to_string(),
        message: "no matching system font found".to_string(),
        suggestion: format!(
            "Install the '{}' font family or configure another one under [font]",
            name
        ),
    })
}

/// Loads the body and scramble fonts configured for a report.
pub fn load_report_fonts(config: &ReportConfig) -> Result<ReportFonts, RenderError> {
    let body = match load_font(&config.body_font) {
        Ok(font) => font,
        Err(e) => {
            warn!("{}", e);
            info!("Searching for any usable system font...");
            match any_system_font(&SYSTEM_FONTS) {
                Some(font) => font,
                None => {
                    warn!("No usable system font found, using the bundled DejaVu Sans");
                    LoadedFont::from_bytes("DejaVu Sans", EMBEDDED_SANS.to_vec()).ok_or_else(
                        || RenderError::Font {
                            font_name: config.body_font.clone(),
                            message: "the bundled font could not be parsed".to_string(),
                            suggestion: "Install a TrueType font such as DejaVu Sans".to_string(),
                        },
                    )?
                }
            }
        }
    };

    let scramble = if config.scramble_font.eq_ignore_ascii_case(&config.body_font) {
        body.clone()
    } else {
        match load_font(&config.scramble_font) {
            Ok(font) => font,
            Err(e) => {
                warn!(
                    "Could not load scramble font '{}', falling back to '{}': {}",
                    config.scramble_font,
                    body.name(),
                    e
                );
                body.clone()
            }
        }
    };

    info!(
        "Using '{}' for text and '{}' for scrambles",
        body.name(),
        scramble.name()
    );
    Ok(ReportFonts { body, scramble })
}
