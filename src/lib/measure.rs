//! Text measurement in PDF points.
//!
//! Widths are computed on the em square (`font_size` points per em), which is how the document
//! engine sizes embedded fonts, so a measured width is the width the text occupies on the page.

use rusttype::{Font, Scale};

use crate::fonts::LoadedFont;

#[derive(Clone)]
pub struct TextMeasurer {
    font: Font<'static>,
    units_per_em: f32,
    ascent: f32,
    descent: f32,
    line_gap: f32,
}

impl TextMeasurer {
    pub fn new(font: &LoadedFont) -> Self {
        let font = font.rusttype_font().clone();
        let v_metrics = font.v_metrics_unscaled();
        let units_per_em = f32::from(font.units_per_em().max(1));
        TextMeasurer {
            font,
            units_per_em,
            ascent: v_metrics.ascent,
            descent: v_metrics.descent,
            line_gap: v_metrics.line_gap,
        }
    }

    /// rusttype scales to the ascent-descent height, so the pixel height is derived from the
    /// em size.
    fn em_scale(&self, font_size: f32) -> Scale {
        Scale::uniform(font_size * (self.ascent - self.descent) / self.units_per_em)
    }

    /// Advance width of `text` including pair kerning.
    pub fn width(&self, text: &str, font_size: f32) -> f32 {
        let scale = self.em_scale(font_size);
        let mut width = 0.0;
        let mut previous = None;
        for glyph in self.font.glyphs_for(text.chars()) {
            let id = glyph.id();
            if let Some(prev) = previous {
                width += self.font.pair_kerning(scale, prev, id);
            }
            width += glyph.scaled(scale).h_metrics().advance_width;
            previous = Some(id);
        }
        width
    }

    /// Upper bound of the width `text` may take when drawn: the kerned width or the plain sum of
    /// advances, whichever is larger.
    pub fn extent(&self, text: &str, font_size: f32) -> f32 {
        let scale = self.em_scale(font_size);
        let advances: f32 = self
            .font
            .glyphs_for(text.chars())
            .map(|glyph| glyph.scaled(scale).h_metrics().advance_width)
            .sum();
        advances.max(self.width(text, font_size))
    }

    /// Distance from the top of a text line to its baseline.
    pub fn ascent(&self, font_size: f32) -> f32 {
        self.ascent / self.units_per_em * font_size
    }

    /// Height of one text line, glyph height plus line gap.
    pub fn line_height(&self, font_size: f32) -> f32 {
        (self.ascent - self.descent + self.line_gap) / self.units_per_em * font_size
    }
}
