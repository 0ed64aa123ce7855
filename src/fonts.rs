//! Font loading, shaping and text measurement using `ttf-parser` and
//! `rustybuzz`.
//!
//! Two font programs are used: a display weight for the holder's name and a
//! body weight for every other field. Both must cover the Arabic range.
//! Widths come from the shaped glyph advances so the measured width is the
//! width that actually gets drawn.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use rustybuzz::{Direction, UnicodeBuffer};
use serde::{Deserialize, Serialize};
use unicode_bidi::BidiInfo;

use crate::error::RenderError;

/// Which of the two embedded fonts a text slot uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FontRole {
    /// Holder's name.
    Display,
    /// All remaining fields.
    Body,
}

impl fmt::Display for FontRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FontRole::Display => f.write_str("display"),
            FontRole::Body => f.write_str("body"),
        }
    }
}

/// Raw font programs for one render.
#[derive(Clone)]
pub struct FontPrograms {
    pub display: Vec<u8>,
    pub body: Vec<u8>,
}

/// A parsed font face with the metrics the PDF font descriptor needs.
#[derive(Clone)]
pub struct FontData {
    pub role: FontRole,
    /// Raw font bytes (kept alive for the zero-copy parsers).
    pub bytes: Vec<u8>,
    pub postscript_name: String,
    pub units_per_em: f32,
    pub ascender: f32,
    pub descender: f32,
    pub cap_height: f32,
    /// xMin, yMin, xMax, yMax in font units.
    pub bbox: [i16; 4],
    pub is_monospaced: bool,
    pub is_italic: bool,
    /// `hmtx` advances indexed by glyph id, read once at parse time.
    advances: Vec<u16>,
}

impl FontData {
    /// Parse a TTF/OTF program. Empty or malformed bytes are a
    /// [`RenderError::FontLoad`].
    pub fn parse(role: FontRole, bytes: Vec<u8>) -> Result<Self, RenderError> {
        if bytes.is_empty() {
            return Err(RenderError::FontLoad {
                role,
                reason: "font data is empty".to_string(),
            });
        }
        let face = ttf_parser::Face::parse(&bytes, 0).map_err(|e| RenderError::FontLoad {
            role,
            reason: format!("failed to parse font: {e}"),
        })?;

        let postscript_name = face
            .names()
            .into_iter()
            .find(|n| n.name_id == ttf_parser::name::name_id::POST_SCRIPT_NAME)
            .and_then(|n| n.to_string())
            .map(|n| sanitize_font_name(&n))
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| match role {
                FontRole::Display => "CertDisplay".to_string(),
                FontRole::Body => "CertBody".to_string(),
            });

        let rect = face.global_bounding_box();
        let advances = (0..face.number_of_glyphs())
            .map(|gid| face.glyph_hor_advance(ttf_parser::GlyphId(gid)).unwrap_or(0))
            .collect();
        let ascender = face.ascender() as f32;

        let data = FontData {
            role,
            postscript_name,
            units_per_em: face.units_per_em() as f32,
            ascender,
            descender: face.descender() as f32,
            cap_height: face.capital_height().map(f32::from).unwrap_or(ascender * 0.7),
            bbox: [rect.x_min, rect.y_min, rect.x_max, rect.y_max],
            is_monospaced: face.is_monospaced(),
            is_italic: face.is_italic(),
            advances,
            bytes,
        };
        Ok(data)
    }

    /// Horizontal advance of a glyph in 1/1000 text-space units, as written
    /// to the PDF `/W` array.
    pub fn glyph_width_pdf(&self, gid: u16) -> f32 {
        let advance = self.advances.get(usize::from(gid)).copied().unwrap_or(0) as f32;
        advance * 1000.0 / self.units_per_em
    }

    /// Shape `text` with the font's own tables.
    ///
    /// The text is split into bidi level runs first; each run is shaped in
    /// its own direction and the runs are joined in visual order. Glyphs come
    /// back in visual (left-to-right drawing) order, so RTL runs are already
    /// reversed while digits and Latin words inside them keep their order.
    pub fn shape(&self, text: &str) -> ShapedText {
        let Some(face) = rustybuzz::Face::from_slice(&self.bytes, 0) else {
            return ShapedText::default();
        };

        let mut glyphs = Vec::new();
        let mut advance_sum: i64 = 0;
        let bidi = BidiInfo::new(text, None);
        for para in &bidi.paragraphs {
            let (levels, runs) = bidi.visual_runs(para, para.range.clone());
            for run in runs {
                let direction = if levels[run.start].is_rtl() {
                    Direction::RightToLeft
                } else {
                    Direction::LeftToRight
                };
                let Some(run_text) = text.get(run) else {
                    continue;
                };
                advance_sum += shape_run(&face, run_text, direction, &mut glyphs);
            }
        }

        ShapedText {
            glyphs,
            advance_units: advance_sum as f32,
            units_per_em: self.units_per_em,
        }
    }

    /// Width of `text` at `font_size` points.
    pub fn measure_text_width(&self, text: &str, font_size: f32) -> f32 {
        self.shape(text).width(font_size)
    }
}

/// One positioned glyph out of the shaper.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapedGlyph {
    pub gid: u16,
    /// Shaped advance in font units (includes kerning).
    pub x_advance: i32,
    /// The characters this glyph stands for (ToUnicode source).
    pub source: String,
}

/// A shaped run of text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShapedText {
    pub glyphs: Vec<ShapedGlyph>,
    pub advance_units: f32,
    pub units_per_em: f32,
}

impl ShapedText {
    /// Total advance at `font_size` points.
    pub fn width(&self, font_size: f32) -> f32 {
        if self.units_per_em <= 0.0 {
            return 0.0;
        }
        self.advance_units * font_size / self.units_per_em
    }
}

/// The display and body fonts of one render.
#[derive(Clone)]
pub struct FontSet {
    pub display: FontData,
    pub body: FontData,
}

impl FontSet {
    pub fn load(programs: FontPrograms) -> Result<Self, RenderError> {
        Ok(Self {
            display: FontData::parse(FontRole::Display, programs.display)?,
            body: FontData::parse(FontRole::Body, programs.body)?,
        })
    }

    pub fn get(&self, role: FontRole) -> &FontData {
        match role {
            FontRole::Display => &self.display,
            FontRole::Body => &self.body,
        }
    }
}

/// Glyphs used by the drawn text, with the text they map back to.
#[derive(Debug, Clone, Default)]
pub struct GlyphUsage {
    pub glyphs: BTreeMap<u16, String>,
}

impl GlyphUsage {
    pub fn record(&mut self, shaped: &ShapedText) {
        for g in &shaped.glyphs {
            if g.gid != 0 && !g.source.is_empty() {
                self.glyphs.entry(g.gid).or_insert_with(|| g.source.clone());
            }
        }
    }
}

/// Shape one single-direction run, appending its glyphs in visual order.
/// Returns the summed advance in font units.
fn shape_run(
    face: &rustybuzz::Face<'_>,
    text: &str,
    direction: Direction,
    glyphs: &mut Vec<ShapedGlyph>,
) -> i64 {
    let mut buffer = UnicodeBuffer::new();
    buffer.push_str(text);
    buffer.guess_segment_properties();
    buffer.set_direction(direction);
    let output = rustybuzz::shape(face, &[], buffer);

    let infos = output.glyph_infos();
    let positions = output.glyph_positions();

    // Cluster boundaries sorted in logical order, so each glyph can be
    // mapped back to the characters it represents regardless of direction.
    let mut starts: BTreeSet<usize> = infos.iter().map(|g| g.cluster as usize).collect();
    starts.insert(text.len());

    let mut advance_sum: i64 = 0;
    for (info, pos) in infos.iter().zip(positions.iter()) {
        let start = (info.cluster as usize).min(text.len());
        let end = starts
            .range(start + 1..)
            .next()
            .copied()
            .unwrap_or(text.len());
        advance_sum += i64::from(pos.x_advance);
        glyphs.push(ShapedGlyph {
            gid: info.glyph_id as u16,
            x_advance: pos.x_advance,
            source: text.get(start..end).unwrap_or("").to_string(),
        });
    }
    advance_sum
}

/// PDF names may not contain whitespace or delimiters.
pub fn sanitize_font_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_graphic() && !"()<>[]{}/%#".contains(*c))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth_font::synth_font;

    fn body() -> FontData {
        FontData::parse(FontRole::Body, synth_font()).unwrap()
    }

    #[test]
    fn empty_font_is_a_load_error() {
        let err = FontData::parse(FontRole::Display, Vec::new()).err().unwrap();
        assert!(matches!(err, RenderError::FontLoad { role: FontRole::Display, .. }));
    }

    #[test]
    fn garbage_font_is_a_load_error() {
        assert!(FontData::parse(FontRole::Body, b"definitely not a font".to_vec()).is_err());
    }

    #[test]
    fn synthetic_font_falls_back_to_role_name() {
        assert_eq!(body().postscript_name, "CertBody");
    }

    #[test]
    fn width_scales_with_size() {
        let f = body();
        let w11 = f.measure_text_width("CERT-001", 11.0);
        let w22 = f.measure_text_width("CERT-001", 22.0);
        assert!(w11 > 0.0);
        assert!((w22 - 2.0 * w11).abs() < 0.01);
    }

    #[test]
    fn longer_text_is_wider() {
        let f = body();
        assert!(f.measure_text_width("Chef", 11.0) < f.measure_text_width("Chef Chef", 11.0));
        assert_eq!(f.measure_text_width("", 11.0), 0.0);
    }

    #[test]
    fn arabic_is_shaped_right_to_left() {
        let f = body();
        let text = "أحمد";
        let shaped = f.shape(text);
        assert_eq!(shaped.glyphs.len(), text.chars().count());
        // Visual order: the last logical character is drawn first.
        assert_eq!(shaped.glyphs[0].source, "د");
        assert_eq!(shaped.glyphs.last().unwrap().source, "أ");
    }

    fn visual(shaped: &ShapedText) -> String {
        shaped.glyphs.iter().map(|g| g.source.as_str()).collect()
    }

    #[test]
    fn arabic_indic_digits_keep_their_order() {
        let f = body();
        assert_eq!(visual(&f.shape("١٤٤٥/٠١/٠١")), "١٤٤٥/٠١/٠١");
    }

    #[test]
    fn latin_digits_inside_arabic_keep_their_order() {
        let f = body();
        let shaped = f.shape("شركة 2024");
        assert_eq!(visual(&shaped), "2024 ةكرش");
        assert_eq!(shaped.glyphs.len(), "شركة 2024".chars().count());
    }

    #[test]
    fn mixed_runs_measure_the_same_as_their_parts() {
        let f = body();
        let whole = f.measure_text_width("شركة 2024", 11.0);
        let parts = f.measure_text_width("شركة ", 11.0) + f.measure_text_width("2024", 11.0);
        assert!((whole - parts).abs() < 0.001);
    }

    #[test]
    fn glyph_usage_skips_notdef() {
        let f = body();
        let mut usage = GlyphUsage::default();
        usage.record(&f.shape("AB\u{4E2D}"));
        assert_eq!(usage.glyphs.len(), 2);
        assert!(usage.glyphs.values().any(|s| s == "A"));
    }

    #[test]
    fn pdf_width_matches_hmtx() {
        let f = body();
        let shaped = f.shape("A");
        let gid = shaped.glyphs[0].gid;
        let expected = shaped.glyphs[0].x_advance as f32 * 1000.0 / f.units_per_em;
        assert!((f.glyph_width_pdf(gid) - expected).abs() < 0.001);
        assert_eq!(f.glyph_width_pdf(u16::MAX), 0.0);
    }

    #[test]
    fn sanitize_strips_delimiters() {
        assert_eq!(sanitize_font_name("Cairo Regular(1)"), "CairoRegular1");
    }
}
