use crate::error::DocMergeError;
use crate::types::Pt;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub const DEFAULT_FONT: &str = "Helvetica";

const FIRST_CHAR: u8 = 32;
const LAST_CHAR: u8 = 255;

/// cp1252 code points 0x80..=0x9F. `None` marks the unassigned slots.
const WINANSI_HIGH: [Option<char>; 32] = [
    Some('\u{20AC}'),
    None,
    Some('\u{201A}'),
    Some('\u{0192}'),
    Some('\u{201E}'),
    Some('\u{2026}'),
    Some('\u{2020}'),
    Some('\u{2021}'),
    Some('\u{02C6}'),
    Some('\u{2030}'),
    Some('\u{0160}'),
    Some('\u{2039}'),
    Some('\u{0152}'),
    None,
    Some('\u{017D}'),
    None,
    None,
    Some('\u{2018}'),
    Some('\u{2019}'),
    Some('\u{201C}'),
    Some('\u{201D}'),
    Some('\u{2022}'),
    Some('\u{2013}'),
    Some('\u{2014}'),
    Some('\u{02DC}'),
    Some('\u{2122}'),
    Some('\u{0161}'),
    Some('\u{203A}'),
    Some('\u{0153}'),
    None,
    Some('\u{017E}'),
    Some('\u{0178}'),
];

/// WinAnsi byte for a character, if the encoding has one.
pub fn winansi_byte(ch: char) -> Option<u8> {
    match ch {
        '\u{0000}'..='\u{007F}' | '\u{00A0}'..='\u{00FF}' => Some(ch as u8),
        _ => WINANSI_HIGH
            .iter()
            .position(|slot| *slot == Some(ch))
            .map(|idx| 0x80 + idx as u8),
    }
}

pub fn winansi_char(byte: u8) -> Option<char> {
    match byte {
        0x80..=0x9F => WINANSI_HIGH[(byte - 0x80) as usize],
        _ => Some(byte as char),
    }
}

// Advance widths for ASCII 32..=126 in 1/1000 em, from the base-14 AFM files.
#[rustfmt::skip]
const HELVETICA: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

#[rustfmt::skip]
const HELVETICA_BOLD: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611,
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556,
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611,
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

#[rustfmt::skip]
const TIMES_ROMAN: [u16; 95] = [
    250, 333, 408, 500, 500, 833, 778, 180, 333, 333, 500, 564, 250, 333, 250, 278,
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 278, 278, 564, 564, 564, 444,
    921, 722, 667, 667, 722, 611, 556, 722, 722, 333, 389, 722, 611, 889, 722, 722,
    556, 722, 667, 556, 611, 722, 722, 944, 722, 722, 611, 333, 278, 333, 469, 500,
    333, 444, 500, 444, 500, 444, 333, 500, 500, 278, 278, 500, 278, 778, 500, 500,
    500, 500, 333, 389, 278, 500, 500, 722, 500, 500, 444, 480, 200, 480, 541,
];

#[rustfmt::skip]
const TIMES_BOLD: [u16; 95] = [
    250, 333, 555, 500, 500, 1000, 833, 278, 333, 333, 500, 570, 250, 333, 250, 278,
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 333, 333, 570, 570, 570, 500,
    930, 722, 667, 722, 722, 667, 611, 778, 778, 389, 500, 778, 667, 944, 722, 778,
    611, 778, 722, 556, 667, 722, 722, 1000, 722, 722, 667, 333, 278, 333, 581, 500,
    333, 500, 556, 444, 556, 444, 333, 500, 556, 278, 333, 556, 278, 833, 556, 500,
    556, 556, 444, 389, 333, 556, 500, 722, 500, 500, 444, 394, 220, 394, 520,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Base14Family {
    Helvetica,
    Times,
    Courier,
}

fn base14_family(name: &str) -> Option<Base14Family> {
    if name.starts_with("Helvetica") {
        Some(Base14Family::Helvetica)
    } else if name.starts_with("Times") {
        Some(Base14Family::Times)
    } else if name.starts_with("Courier") {
        Some(Base14Family::Courier)
    } else {
        None
    }
}

pub fn is_base14(name: &str) -> bool {
    base14_family(name).is_some()
}

fn base14_variant_name(family: Base14Family, bold: bool, italic: bool) -> &'static str {
    match family {
        Base14Family::Helvetica => match (bold, italic) {
            (true, true) => "Helvetica-BoldOblique",
            (true, false) => "Helvetica-Bold",
            (false, true) => "Helvetica-Oblique",
            (false, false) => "Helvetica",
        },
        Base14Family::Times => match (bold, italic) {
            (true, true) => "Times-BoldItalic",
            (true, false) => "Times-Bold",
            (false, true) => "Times-Italic",
            (false, false) => "Times-Roman",
        },
        Base14Family::Courier => match (bold, italic) {
            (true, true) => "Courier-BoldOblique",
            (true, false) => "Courier-Bold",
            (false, true) => "Courier-Oblique",
            (false, false) => "Courier",
        },
    }
}

fn base14_char_width(name: &str, ch: char) -> u16 {
    let Some(family) = base14_family(name) else {
        return 600;
    };
    let bold = name.contains("Bold");
    let (table, default) = match family {
        Base14Family::Courier => return 600,
        Base14Family::Helvetica if bold => (&HELVETICA_BOLD, 556),
        Base14Family::Helvetica => (&HELVETICA, 556),
        Base14Family::Times if bold => (&TIMES_BOLD, 500),
        Base14Family::Times => (&TIMES_ROMAN, 500),
    };
    match ch {
        ' '..='~' => table[(ch as u8 - FIRST_CHAR) as usize],
        '\u{00A0}' => table[0],
        '\u{2022}' => 350,
        '\u{2013}' => default,
        '\u{2014}' => 1000,
        _ => default,
    }
}

#[derive(Debug, Clone)]
pub struct FontMetrics {
    /// Advance widths for WinAnsi codes 32..=255, in 1/1000 em.
    pub widths: Vec<u16>,
    pub ascent: i16,
    pub descent: i16,
    pub cap_height: i16,
    pub italic_angle: i16,
    pub bbox: (i16, i16, i16, i16),
    pub missing_width: u16,
    pub is_fixed_pitch: bool,
}

impl FontMetrics {
    fn from_face(face: &ttf_parser::Face<'_>) -> Self {
        let scale = 1000.0 / face.units_per_em().max(1) as f32;
        let widths: Vec<u16> = (FIRST_CHAR..=LAST_CHAR)
            .map(|code| {
                let advance = winansi_char(code)
                    .and_then(|ch| face.glyph_index(ch))
                    .and_then(|id| face.glyph_hor_advance(id))
                    .unwrap_or(0);
                let scaled = (advance as f32 * scale).round() as i32;
                scaled.clamp(0, u16::MAX as i32) as u16
            })
            .collect();
        let missing_width = widths.first().copied().unwrap_or(0);
        let ascent = scale_i16(face.ascender(), scale);
        let bbox = face.global_bounding_box();
        Self {
            widths,
            ascent,
            descent: scale_i16(face.descender(), scale),
            cap_height: face
                .capital_height()
                .map(|value| scale_i16(value, scale))
                .unwrap_or(ascent),
            italic_angle: face
                .italic_angle()
                .map(|value| value.round() as i16)
                .unwrap_or(0),
            bbox: (
                scale_i16(bbox.x_min, scale),
                scale_i16(bbox.y_min, scale),
                scale_i16(bbox.x_max, scale),
                scale_i16(bbox.y_max, scale),
            ),
            missing_width,
            is_fixed_pitch: face.is_monospaced(),
        }
    }

    fn char_width(&self, ch: char) -> u16 {
        let code = winansi_byte(ch).unwrap_or(b'?');
        if code < FIRST_CHAR {
            return self.missing_width;
        }
        self.widths
            .get((code - FIRST_CHAR) as usize)
            .copied()
            .unwrap_or(self.missing_width)
    }
}

#[derive(Debug, Clone)]
pub struct RegisteredFont {
    /// PostScript name, also used as the resource name on the canvas.
    pub name: String,
    pub family: String,
    pub bold: bool,
    pub italic: bool,
    pub data: Vec<u8>,
    pub metrics: FontMetrics,
}

/// Fonts available to the PDF emitter: the base-14 set plus any TrueType
/// files registered at build time.
#[derive(Debug, Clone, Default)]
pub struct FontRegistry {
    fonts: Vec<RegisteredFont>,
    families: HashMap<String, Vec<usize>>,
    by_name: HashMap<String, usize>,
}

impl FontRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_file(&mut self, path: impl AsRef<Path>) -> Result<String, DocMergeError> {
        let path = path.as_ref();
        let data = fs::read(path)?;
        let source = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("EmbeddedFont")
            .to_string();
        self.register_bytes(data, &source)
    }

    /// Register a TrueType program. Returns the name the font is drawn under.
    pub fn register_bytes(&mut self, data: Vec<u8>, source: &str) -> Result<String, DocMergeError> {
        let face = ttf_parser::Face::parse(&data, 0).map_err(|err| {
            DocMergeError::InvalidConfiguration(format!("invalid font data for {}: {}", source, err))
        })?;
        if face.tables().cff.is_some() {
            return Err(DocMergeError::InvalidConfiguration(format!(
                "{} is a CFF font; only TrueType outlines can be embedded",
                source
            )));
        }
        let (name, family) = font_names(&face, source);
        let metrics = FontMetrics::from_face(&face);
        let bold = face.is_bold();
        let italic = face.is_italic() || face.is_oblique();
        drop(face);

        if self.by_name.contains_key(&normalize_name(&name)) {
            return Ok(name);
        }
        let index = self.fonts.len();
        self.fonts.push(RegisteredFont {
            name: name.clone(),
            family: family.clone(),
            bold,
            italic,
            data,
            metrics,
        });
        self.by_name.insert(normalize_name(&name), index);
        for alias in [family, source.to_string()] {
            let entry = self.families.entry(normalize_name(&alias)).or_default();
            if !entry.contains(&index) {
                entry.push(index);
            }
        }
        Ok(name)
    }

    pub fn len(&self) -> usize {
        self.fonts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }

    pub fn embedded(&self, name: &str) -> Option<&RegisteredFont> {
        self.by_name
            .get(&normalize_name(name))
            .and_then(|index| self.fonts.get(*index))
    }

    /// Resolve a CSS family plus weight/style to a drawable font name.
    pub fn select(&self, family: Option<&str>, bold: bool, italic: bool) -> String {
        let requested = family.map(normalize_name).unwrap_or_default();
        if let Some(indices) = self.families.get(&requested) {
            let pick = |want_bold: bool, want_italic: bool| {
                indices
                    .iter()
                    .copied()
                    .find(|idx| self.fonts[*idx].bold == want_bold && self.fonts[*idx].italic == want_italic)
            };
            let chosen = pick(bold, italic)
                .or_else(|| pick(false, false))
                .or_else(|| indices.first().copied());
            if let Some(font) = chosen.and_then(|idx| self.fonts.get(idx)) {
                return font.name.clone();
            }
        }
        let bold = bold || requested.contains("black") || requested.ends_with(" bold");
        base14_variant_name(map_family(&requested), bold, italic).to_string()
    }

    /// Advance width of `text` set in `font_name` at `font_size`.
    pub fn measure(&self, font_name: &str, font_size: Pt, text: &str) -> Pt {
        let units: i32 = match self.embedded(font_name) {
            Some(font) => text.chars().map(|ch| font.metrics.char_width(ch) as i32).sum(),
            None => text
                .chars()
                .map(|ch| base14_char_width(font_name, ch) as i32)
                .sum(),
        };
        if units <= 0 {
            return Pt::ZERO;
        }
        font_size.mul_ratio(units, 1000)
    }

    pub fn fonts(&self) -> &[RegisteredFont] {
        &self.fonts
    }
}

fn map_family(requested: &str) -> Base14Family {
    if requested.contains("courier") || requested.contains("mono") {
        Base14Family::Courier
    } else if requested.contains("times")
        || requested.contains("georgia")
        || requested.contains("garamond")
        || (requested.contains("serif") && !requested.contains("sans"))
    {
        Base14Family::Times
    } else {
        Base14Family::Helvetica
    }
}

fn scale_i16(value: i16, scale: f32) -> i16 {
    let scaled = (value as f32 * scale).round() as i32;
    scaled.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// PostScript name (sanitized for use as a PDF name) and family name.
fn font_names(face: &ttf_parser::Face<'_>, source: &str) -> (String, String) {
    use ttf_parser::name::name_id;

    let mut family = None;
    let mut post = None;
    for entry in face.names() {
        let Some(name) = entry.to_string() else {
            continue;
        };
        match entry.name_id {
            name_id::TYPOGRAPHIC_FAMILY | name_id::FAMILY if family.is_none() => family = Some(name),
            name_id::POST_SCRIPT_NAME if post.is_none() => post = Some(name),
            _ => {}
        }
    }
    let family = family.unwrap_or_else(|| source.to_string());
    let post = post.unwrap_or_else(|| family.replace(' ', ""));
    let post: String = post
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || *ch == '-' || *ch == '_')
        .collect();
    let post = if post.is_empty() { "EmbeddedFont".to_string() } else { post };
    (post, family)
}

fn normalize_name(name: &str) -> String {
    name.trim()
        .trim_matches('"')
        .trim_matches('\'')
        .to_ascii_lowercase()
}
