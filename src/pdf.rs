use crate::canvas::{Command, Document, Page};
use crate::error::DocMergeError;
use crate::font::{self, FontRegistry, RegisteredFont};
use crate::types::{Color, Pt};
use lopdf::{Dictionary, Object, ObjectId, Stream, dictionary};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone)]
pub struct PdfOptions {
    pub title: Option<String>,
    pub producer: String,
    /// Flate-compress content streams and font programs.
    pub compress: bool,
}

impl Default for PdfOptions {
    fn default() -> Self {
        Self {
            title: None,
            producer: format!("docmerge {}", env!("CARGO_PKG_VERSION")),
            compress: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FontResource {
    resource: String,
    object_id: ObjectId,
}

pub fn document_to_pdf(
    document: &Document,
    fonts: &FontRegistry,
    options: &PdfOptions,
) -> Result<Vec<u8>, DocMergeError> {
    let mut pdf = lopdf::Document::with_version("1.5");
    let pages_id = pdf.new_object_id();

    let font_map = build_font_objects(&mut pdf, document, fonts);
    let image_map = build_image_objects(&mut pdf, document);

    let mut font_dict = Dictionary::new();
    for font in font_map.values() {
        font_dict.set(font.resource.as_bytes().to_vec(), font.object_id);
    }
    let mut xobject_dict = Dictionary::new();
    for (name, id) in &image_map {
        xobject_dict.set(name.as_bytes().to_vec(), *id);
    }
    let resources_id = pdf.add_object(dictionary! {
        "Font" => font_dict,
        "XObject" => xobject_dict,
        "ProcSet" => vec![
            Object::Name(b"PDF".to_vec()),
            Object::Name(b"Text".to_vec()),
            Object::Name(b"ImageC".to_vec()),
        ],
    });

    let page_width = document.page_size.width;
    let page_height = document.page_size.height;
    let mut kids: Vec<Object> = Vec::with_capacity(document.pages.len());
    let mut replaced = 0usize;
    for page in &document.pages {
        let (content, page_replaced) = render_page(page, page_height, &font_map);
        replaced += page_replaced;
        let content_id = pdf.add_object(Stream::new(Dictionary::new(), content.into_bytes()));
        let page_id = pdf.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(page_width.to_f32()),
                Object::Real(page_height.to_f32()),
            ],
            "Resources" => resources_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }
    if replaced > 0 {
        log::debug!("{} characters outside WinAnsi replaced with '?'", replaced);
    }

    let count = kids.len() as i64;
    pdf.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = pdf.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    pdf.trailer.set("Root", catalog_id);

    let mut info = dictionary! {
        "Producer" => Object::string_literal(options.producer.as_str()),
    };
    if let Some(title) = &options.title {
        info.set("Title", Object::string_literal(title.as_str()));
    }
    let info_id = pdf.add_object(info);
    pdf.trailer.set("Info", info_id);

    if options.compress {
        pdf.compress();
    }
    let mut out = Vec::new();
    pdf.save_to(&mut out)?;
    Ok(out)
}

fn collect_font_names(document: &Document) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    // Pages start in the canvas default font without an explicit command.
    names.insert(font::DEFAULT_FONT.to_string());
    for page in &document.pages {
        for command in &page.commands {
            if let Command::Font { name, .. } = command {
                names.insert(name.clone());
            }
        }
    }
    names
}

fn build_font_objects(
    pdf: &mut lopdf::Document,
    document: &Document,
    fonts: &FontRegistry,
) -> BTreeMap<String, FontResource> {
    let mut map = BTreeMap::new();
    for (idx, name) in collect_font_names(document).into_iter().enumerate() {
        let object_id = match fonts.embedded(&name) {
            Some(registered) => truetype_font_objects(pdf, registered),
            None => {
                let base = if font::is_base14(&name) {
                    name.as_str()
                } else {
                    log::warn!("font {} is not available, drawing with {}", name, font::DEFAULT_FONT);
                    font::DEFAULT_FONT
                };
                pdf.add_object(dictionary! {
                    "Type" => "Font",
                    "Subtype" => "Type1",
                    "BaseFont" => base,
                    "Encoding" => "WinAnsiEncoding",
                })
            }
        };
        map.insert(
            name,
            FontResource {
                resource: format!("F{}", idx + 1),
                object_id,
            },
        );
    }
    map
}

/// Simple (single-byte) TrueType font over WinAnsi codes 32..=255.
fn truetype_font_objects(pdf: &mut lopdf::Document, font: &RegisteredFont) -> ObjectId {
    let metrics = &font.metrics;
    let file_id = pdf.add_object(Stream::new(
        dictionary! { "Length1" => font.data.len() as i64 },
        font.data.clone(),
    ));
    let mut flags: i64 = 32;
    if metrics.is_fixed_pitch {
        flags |= 1;
    }
    if font.italic {
        flags |= 64;
    }
    let (x_min, y_min, x_max, y_max) = metrics.bbox;
    let descriptor_id = pdf.add_object(dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => font.name.as_str(),
        "Flags" => flags,
        "FontBBox" => vec![
            Object::Integer(x_min as i64),
            Object::Integer(y_min as i64),
            Object::Integer(x_max as i64),
            Object::Integer(y_max as i64),
        ],
        "ItalicAngle" => metrics.italic_angle as i64,
        "Ascent" => metrics.ascent as i64,
        "Descent" => metrics.descent as i64,
        "CapHeight" => metrics.cap_height as i64,
        "StemV" => if font.bold { 120i64 } else { 80i64 },
        "MissingWidth" => metrics.missing_width as i64,
        "FontFile2" => file_id,
    });
    let widths: Vec<Object> = metrics
        .widths
        .iter()
        .map(|width| Object::Integer(*width as i64))
        .collect();
    pdf.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "TrueType",
        "BaseFont" => font.name.as_str(),
        "FirstChar" => 32i64,
        "LastChar" => 255i64,
        "Widths" => widths,
        "FontDescriptor" => descriptor_id,
        "Encoding" => "WinAnsiEncoding",
    })
}

fn build_image_objects(pdf: &mut lopdf::Document, document: &Document) -> BTreeMap<String, ObjectId> {
    let mut map = BTreeMap::new();
    for (resource, image) in &document.images {
        let dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => image.width as i64,
            "Height" => image.height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8i64,
            "Filter" => "DCTDecode",
        };
        // Already JPEG; never deflate on top.
        let stream = Stream::new(dict, image.jpeg.clone()).with_compression(false);
        map.insert(resource.clone(), pdf.add_object(stream));
    }
    map
}

/// Content stream for one page. Returns the stream and how many characters
/// had no WinAnsi code.
fn render_page(page: &Page, page_height: Pt, font_map: &BTreeMap<String, FontResource>) -> (String, usize) {
    let mut out = String::new();
    let mut replaced = 0usize;
    let mut font_size = Pt::from_f32(12.0);
    let mut font_name = font::DEFAULT_FONT.to_string();

    for command in &page.commands {
        match command {
            Command::FillColor(color) => out.push_str(&color_op(*color, "rg")),
            Command::StrokeColor(color) => out.push_str(&color_op(*color, "RG")),
            Command::LineWidth(width) => out.push_str(&format!("{} w\n", fmt_pt(*width))),
            Command::Font { name, size } => {
                font_name = name.clone();
                font_size = *size;
            }
            Command::Text { x, y, text } => {
                let resource = font_map
                    .get(&font_name)
                    .or_else(|| font_map.get(font::DEFAULT_FONT))
                    .map(|font| font.resource.as_str())
                    .unwrap_or("F1");
                let (encoded, missing) = encode_winansi(text);
                replaced += missing;
                out.push_str(&format!(
                    "BT\n/{} {} Tf\n{} {} Td\n({}) Tj\nET\n",
                    resource,
                    fmt_pt(font_size),
                    fmt_pt(*x),
                    fmt_pt(page_height - *y - font_size),
                    encoded
                ));
            }
            Command::Rule { x1, x2, y } => {
                let py = fmt_pt(page_height - *y);
                out.push_str(&format!("{} {} m {} {} l S\n", fmt_pt(*x1), py, fmt_pt(*x2), py));
            }
            Command::Rect { x, y, width, height } => {
                out.push_str(&format!(
                    "{} {} {} {} re f\n",
                    fmt_pt(*x),
                    fmt_pt(page_height - *y - *height),
                    fmt_pt(*width),
                    fmt_pt(*height)
                ));
            }
            Command::Image {
                x,
                y,
                width,
                height,
                resource_id,
            } => {
                out.push_str(&format!(
                    "q {} 0 0 {} {} {} cm /{} Do Q\n",
                    fmt_pt(*width),
                    fmt_pt(*height),
                    fmt_pt(*x),
                    fmt_pt(page_height - *y - *height),
                    resource_id
                ));
            }
        }
    }
    (out, replaced)
}

/// Escaped WinAnsi string body for a `Tj` operand. Bytes outside printable
/// ASCII are written as octal escapes so the stream stays ASCII.
fn encode_winansi(input: &str) -> (String, usize) {
    let mut out = String::with_capacity(input.len());
    let mut replaced = 0usize;
    for ch in input.chars() {
        let byte = match font::winansi_byte(ch) {
            Some(byte) => byte,
            None => {
                replaced += 1;
                b'?'
            }
        };
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'(' => out.push_str("\\("),
            b')' => out.push_str("\\)"),
            b if !(0x20..0x7f).contains(&b) => out.push_str(&format!("\\{:03o}", b)),
            b => out.push(b as char),
        }
    }
    (out, replaced)
}

fn color_op(color: Color, op: &str) -> String {
    format!("{} {} {} {}\n", fmt_unit(color.r), fmt_unit(color.g), fmt_unit(color.b), op)
}

fn fmt_unit(value: f32) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    format_milli((value.clamp(0.0, 1.0) * 1000.0).round() as i64)
}

fn fmt_pt(value: Pt) -> String {
    format_milli(value.to_milli_i64())
}

fn format_milli(milli: i64) -> String {
    if milli == 0 {
        return "0".to_string();
    }
    let sign = if milli < 0 { "-" } else { "" };
    let abs = milli.unsigned_abs();
    let int = abs / 1000;
    let frac = abs % 1000;
    if frac == 0 {
        return format!("{}{}", sign, int);
    }
    let mut digits = format!("{:03}", frac);
    while digits.ends_with('0') {
        digits.pop();
    }
    format!("{}{}.{}", sign, int, digits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::CachedImage;
    use crate::canvas::Canvas;
    use crate::types::Size;

    fn page_content(pdf: &lopdf::Document, page: u32) -> String {
        let pages = pdf.get_pages();
        let id = pages.get(&page).copied().expect("page");
        String::from_utf8_lossy(&pdf.get_page_content(id).expect("content")).into_owned()
    }

    #[test]
    fn numbers_are_formatted_without_trailing_zeros() {
        assert_eq!(format_milli(0), "0");
        assert_eq!(format_milli(12_000), "12");
        assert_eq!(format_milli(12_500), "12.5");
        assert_eq!(format_milli(-1_250), "-1.25");
        assert_eq!(fmt_unit(0.94), "0.94");
    }

    #[test]
    fn winansi_strings_escape_delimiters_and_high_bytes() {
        assert_eq!(encode_winansi("a(b)\\"), ("a\\(b\\)\\\\".to_string(), 0));
        assert_eq!(encode_winansi("caf\u{e9} \u{2022}"), ("caf\\351 \\225".to_string(), 0));
        assert_eq!(encode_winansi("\u{4E2D}x"), ("?x".to_string(), 1));
    }

    #[test]
    fn writes_loadable_pdf_with_text_and_fonts() {
        let mut canvas = Canvas::new(Size::letter());
        canvas.text(Pt::from_f32(10.0), Pt::from_f32(10.0), "Hello");
        canvas.set_font("Times-Bold", Pt::from_f32(12.0));
        canvas.text(Pt::from_f32(10.0), Pt::from_f32(30.0), "World");
        canvas.next_page();
        canvas.text(Pt::from_f32(10.0), Pt::from_f32(10.0), "Second");
        let document = canvas.finish_all();

        let bytes = document_to_pdf(&document, &FontRegistry::new(), &PdfOptions::default()).expect("pdf");
        assert!(bytes.starts_with(b"%PDF-1.5"));
        let pdf = lopdf::Document::load_mem(&bytes).expect("load");
        assert_eq!(pdf.get_pages().len(), 2);

        let first = page_content(&pdf, 1);
        assert!(first.contains("(Hello) Tj"));
        assert!(first.contains("(World) Tj"));
        // 792 - 10 - 12
        assert!(first.contains("10 770 Td"));
        assert!(page_content(&pdf, 2).contains("(Second) Tj"));

        let base_fonts: BTreeSet<String> = pdf
            .objects
            .values()
            .filter_map(|obj| obj.as_dict().ok())
            .filter(|dict| dict.get(b"Type").and_then(Object::as_name).ok() == Some(b"Font".as_slice()))
            .filter_map(|dict| dict.get(b"BaseFont").and_then(Object::as_name).ok())
            .map(|name| String::from_utf8_lossy(name).into_owned())
            .collect();
        assert!(base_fonts.contains("Helvetica"));
        assert!(base_fonts.contains("Times-Bold"));
    }

    #[test]
    fn images_are_embedded_as_dct_streams() {
        let jpeg = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0xFF, 0xD9];
        let image = CachedImage {
            jpeg: jpeg.clone(),
            width: 4,
            height: 2,
        };
        let mut canvas = Canvas::new(Size::a4());
        let id = canvas.image_resource("logo.png", &image);
        canvas.image(Pt::from_f32(20.0), Pt::from_f32(20.0), Pt::from_f32(40.0), Pt::from_f32(20.0), id.clone());
        let document = canvas.finish_all();

        let bytes = document_to_pdf(&document, &FontRegistry::new(), &PdfOptions::default()).expect("pdf");
        let pdf = lopdf::Document::load_mem(&bytes).expect("load");
        let stream = pdf
            .objects
            .values()
            .filter_map(|obj| obj.as_stream().ok())
            .find(|s| s.dict.get(b"Subtype").and_then(Object::as_name).ok() == Some(b"Image".as_slice()))
            .expect("image xobject");
        assert_eq!(
            stream.dict.get(b"Filter").and_then(Object::as_name).ok(),
            Some(b"DCTDecode".as_slice())
        );
        assert_eq!(stream.content, jpeg);
        assert!(page_content(&pdf, 1).contains(&format!("/{} Do", id)));
    }

    #[test]
    fn empty_document_still_has_a_page() {
        let document = Canvas::new(Size::letter()).finish_all();
        let bytes = document_to_pdf(&document, &FontRegistry::new(), &PdfOptions::default()).expect("pdf");
        let pdf = lopdf::Document::load_mem(&bytes).expect("load");
        assert_eq!(pdf.get_pages().len(), 1);
    }
}
