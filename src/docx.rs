//! Word output. The parsed tree is first flattened into a sequence of
//! paragraphs (nested blocks are hoisted in document order), then packed
//! with docx-rs.

use crate::assets::ImageCache;
use crate::error::DocMergeError;
use crate::html::{ElementNode, ParsedNode, heading_level, is_block_tag};
use crate::page_model::PAGE_DELIMITER;
use crate::style::TextAlign;
use crate::types::{Margins, Pt, Size};
use docx_rs::{
    AbstractNumbering, AlignmentType, BreakType, Docx, Footer, IndentLevel, Level, LevelJc,
    LevelText, NumberFormat, Numbering, NumberingId, PageMargin, Paragraph, Pic, Run, RunFonts,
    SpecialIndentType, Start, Style, StyleType,
};
use std::io::Cursor;

const BULLET_NUMBERING: usize = 1;
const FIRST_ORDERED_NUMBERING: usize = 2;
const EMU_PER_PX: u32 = 9525;
const EMU_PER_PT: f32 = 12700.0;
const TWIPS_PER_PT: f32 = 20.0;
const QUOTE_INDENT_TWIPS: i32 = 567;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParagraphKind {
    Normal,
    Heading(u8),
    Bullet { level: usize },
    /// `list` distinguishes separate `<ol>` elements so each restarts at `start`.
    Numbered { level: usize, list: usize, start: usize },
    Quote,
    Rule,
    PageBreak,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStyle {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strike: bool,
    pub highlight: bool,
    pub font_size: Option<Pt>,
    pub font_family: Option<String>,
}

impl RunStyle {
    fn derive(&self, el: &ElementNode) -> RunStyle {
        let mut next = self.clone();
        match el.tag.as_str() {
            "b" | "strong" => next.bold = true,
            "i" | "em" | "cite" | "var" => next.italic = true,
            "u" | "ins" | "a" => next.underline = true,
            "s" | "strike" | "del" => next.strike = true,
            "mark" => next.highlight = true,
            "code" | "kbd" | "samp" | "pre" | "tt" => next.font_family = Some("Courier New".to_string()),
            _ => {}
        }
        if let Some(family) = &el.style.font_family {
            next.font_family = Some(family.clone());
        }
        if let Some(size) = el.style.font_size {
            let base = self.font_size.unwrap_or(Pt::from_f32(12.0));
            let resolved = size.to_pt(base, base);
            if resolved > Pt::ZERO {
                next.font_size = Some(resolved);
            }
        }
        next
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DocRun {
    Text { text: String, style: RunStyle },
    Image { jpeg: Vec<u8>, width: u32, height: u32 },
    Break,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocParagraph {
    pub kind: ParagraphKind,
    pub align: Option<TextAlign>,
    pub runs: Vec<DocRun>,
}

impl DocParagraph {
    fn new(kind: ParagraphKind, align: Option<TextAlign>) -> Self {
        Self {
            kind,
            align,
            runs: Vec::new(),
        }
    }

    /// Concatenated text of the text runs.
    pub fn text(&self) -> String {
        self.runs
            .iter()
            .filter_map(|run| match run {
                DocRun::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    fn has_content(&self) -> bool {
        self.runs.iter().any(|run| match run {
            DocRun::Text { text, .. } => !text.trim().is_empty(),
            DocRun::Image { .. } | DocRun::Break => true,
        })
    }
}

#[derive(Debug, Clone)]
struct BlockContext {
    kind: ParagraphKind,
    align: Option<TextAlign>,
    list_depth: usize,
}

struct Converter<'a> {
    images: &'a ImageCache,
    out: Vec<DocParagraph>,
    current: Option<DocParagraph>,
    next_list: usize,
}

/// Flatten parsed nodes into Word paragraphs.
pub fn convert(nodes: &[ParsedNode], images: &ImageCache) -> Vec<DocParagraph> {
    let mut converter = Converter {
        images,
        out: Vec::new(),
        current: None,
        next_list: 0,
    };
    let root = BlockContext {
        kind: ParagraphKind::Normal,
        align: None,
        list_depth: 0,
    };
    converter.children(nodes, &root, &RunStyle::default());
    converter.flush();
    converter.out
}

impl<'a> Converter<'a> {
    fn children(&mut self, nodes: &[ParsedNode], ctx: &BlockContext, style: &RunStyle) {
        for node in nodes {
            self.node(node, ctx, style);
        }
    }

    fn node(&mut self, node: &ParsedNode, ctx: &BlockContext, style: &RunStyle) {
        let el = match node {
            ParsedNode::Text { content } => {
                self.push_text(content, style, ctx);
                return;
            }
            ParsedNode::Element(el) => el,
        };
        if el.is_page_delimiter() {
            self.flush();
            self.out.push(DocParagraph::new(ParagraphKind::PageBreak, None));
            return;
        }
        if let Some(level) = heading_level(&el.tag) {
            let heading = BlockContext {
                kind: ParagraphKind::Heading(level),
                align: el.text_align().or(ctx.align),
                list_depth: ctx.list_depth,
            };
            self.block(el, &heading, style);
            return;
        }
        match el.tag.as_str() {
            "br" => self.open(ctx).runs.push(DocRun::Break),
            "img" => self.image(el, ctx),
            "hr" => {
                self.flush();
                self.out.push(DocParagraph::new(ParagraphKind::Rule, None));
            }
            "ul" | "ol" => self.list(el, ctx, style),
            "blockquote" => {
                let quote = BlockContext {
                    kind: ParagraphKind::Quote,
                    align: el.text_align().or(ctx.align),
                    list_depth: ctx.list_depth,
                };
                self.block(el, &quote, style);
            }
            "li" => {
                let item = BlockContext {
                    kind: ParagraphKind::Bullet { level: ctx.list_depth },
                    align: el.text_align().or(ctx.align),
                    list_depth: ctx.list_depth + 1,
                };
                self.block(el, &item, style);
            }
            tag if is_block_tag(tag) => {
                let inner = BlockContext {
                    align: el.text_align().or(ctx.align),
                    ..ctx.clone()
                };
                self.block(el, &inner, style);
            }
            _ => {
                let derived = style.derive(el);
                self.children(&el.children, ctx, &derived);
            }
        }
    }

    /// A block element closes the running paragraph before and after itself.
    fn block(&mut self, el: &ElementNode, ctx: &BlockContext, style: &RunStyle) {
        self.flush();
        let derived = style.derive(el);
        let before = self.out.len();
        self.children(&el.children, ctx, &derived);
        self.flush();
        // Empty paragraphs and headings are kept as blank lines.
        if self.out.len() == before && (el.tag == "p" || el.is_heading()) {
            self.out.push(DocParagraph::new(ctx.kind.clone(), ctx.align));
        }
    }

    fn list(&mut self, el: &ElementNode, ctx: &BlockContext, style: &RunStyle) {
        self.flush();
        let level = ctx.list_depth;
        let kind = if el.tag == "ol" {
            let start = el
                .attr("start")
                .and_then(|raw| raw.trim().parse::<usize>().ok())
                .unwrap_or(1);
            let list = self.next_list;
            self.next_list += 1;
            ParagraphKind::Numbered { level, list, start }
        } else {
            ParagraphKind::Bullet { level }
        };
        let derived = style.derive(el);
        let align = el.text_align().or(ctx.align);
        for child in &el.children {
            match child {
                ParsedNode::Element(item) if item.tag == "li" => {
                    let item_ctx = BlockContext {
                        kind: kind.clone(),
                        align: item.text_align().or(align),
                        list_depth: level + 1,
                    };
                    self.flush();
                    self.children(&item.children, &item_ctx, &derived.derive(item));
                    self.flush();
                }
                other => {
                    let nested = BlockContext {
                        kind: kind.clone(),
                        align,
                        list_depth: level + 1,
                    };
                    self.node(other, &nested, &derived);
                }
            }
        }
        self.flush();
    }

    fn image(&mut self, el: &ElementNode, ctx: &BlockContext) {
        let source = el.attr("src").map(str::trim).unwrap_or("");
        match self.images.get(source) {
            Some(image) if image.width > 0 && image.height > 0 => {
                let run = DocRun::Image {
                    jpeg: image.jpeg.clone(),
                    width: image.width,
                    height: image.height,
                };
                self.open(ctx).runs.push(run);
            }
            _ => log::debug!("docx: image not in cache, skipped"),
        }
    }

    fn open(&mut self, ctx: &BlockContext) -> &mut DocParagraph {
        self.current
            .get_or_insert_with(|| DocParagraph::new(ctx.kind.clone(), ctx.align))
    }

    fn push_text(&mut self, raw: &str, style: &RunStyle, ctx: &BlockContext) {
        let mut text = collapse_keep_edges(raw);
        if text.trim().is_empty() && self.current.is_none() {
            return;
        }
        let paragraph = self.open(ctx);
        let at_line_start = match paragraph.runs.last() {
            None | Some(DocRun::Break) => true,
            Some(DocRun::Text { text: prev, .. }) => prev.ends_with(' '),
            Some(DocRun::Image { .. }) => false,
        };
        if at_line_start {
            text = text.trim_start().to_string();
        }
        if text.is_empty() {
            return;
        }
        match paragraph.runs.last_mut() {
            Some(DocRun::Text { text: prev, style: prev_style }) if prev_style == style => prev.push_str(&text),
            _ => paragraph.runs.push(DocRun::Text {
                text,
                style: style.clone(),
            }),
        }
    }

    fn flush(&mut self) {
        let Some(mut paragraph) = self.current.take() else {
            return;
        };
        if let Some(DocRun::Text { text, .. }) = paragraph.runs.last_mut() {
            let trimmed = text.trim_end().len();
            text.truncate(trimmed);
        }
        if paragraph.has_content() {
            self.out.push(paragraph);
        }
    }
}

/// Collapse whitespace runs to one space, keeping a single space at either
/// edge so adjacent runs stay separated.
fn collapse_keep_edges(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_space = false;
    for ch in raw.chars() {
        if ch.is_whitespace() && ch != '\u{00A0}' {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(ch);
            in_space = false;
        }
    }
    out
}

#[derive(Debug, Clone)]
pub struct DocxOptions {
    pub page_size: Size,
    pub margins: Margins,
    pub font_size: Pt,
    pub font_family: Option<String>,
    /// Plain footer text repeated on every page.
    pub footer_text: Option<String>,
}

impl Default for DocxOptions {
    fn default() -> Self {
        Self {
            page_size: Size::a4(),
            margins: Margins::all_mm(25.4),
            font_size: Pt::from_f32(12.0),
            font_family: None,
            footer_text: None,
        }
    }
}

fn twips(value: Pt) -> i32 {
    (value.to_f32() * TWIPS_PER_PT).round() as i32
}

fn half_points(value: Pt) -> usize {
    (value.to_f32() * 2.0).round().max(1.0) as usize
}

fn run_fonts(family: &str) -> RunFonts {
    RunFonts::new()
        .ascii(family)
        .hi_ansi(family)
        .east_asia(family)
        .cs(family)
}

fn alignment(align: TextAlign) -> AlignmentType {
    match align {
        TextAlign::Left => AlignmentType::Left,
        TextAlign::Center => AlignmentType::Center,
        TextAlign::Right => AlignmentType::Right,
        TextAlign::Justify => AlignmentType::Both,
    }
}

fn heading_style(level: u8) -> Style {
    let size = match level {
        1 => 48,
        2 => 36,
        _ => 28,
    };
    Style::new(&format!("Heading{}", level), StyleType::Paragraph)
        .name(&format!("Heading {}", level))
        .size(size)
        .bold()
}

fn list_level(level: usize, format: &str, text: &str, start: usize) -> Level {
    Level::new(
        level,
        Start::new(start),
        NumberFormat::new(format),
        LevelText::new(text),
        LevelJc::new("left"),
    )
    .indent(
        Some(720 * (level as i32 + 1)),
        Some(SpecialIndentType::Hanging(360)),
        None,
        None,
    )
}

fn bullet_numbering() -> AbstractNumbering {
    (0..9).fold(AbstractNumbering::new(BULLET_NUMBERING), |abs, level| {
        let glyph = match level % 3 {
            0 => "\u{2022}",
            1 => "\u{25E6}",
            _ => "\u{25AA}",
        };
        abs.add_level(list_level(level, "bullet", glyph, 1))
    })
}

fn ordered_numbering(id: usize, start: usize) -> AbstractNumbering {
    (0..9).fold(AbstractNumbering::new(id), |abs, level| {
        let text = format!("%{}.", level + 1);
        let first = if level == 0 { start } else { 1 };
        abs.add_level(list_level(level, "decimal", &text, first))
    })
}

fn styled_run(text: &str, style: &RunStyle) -> Run {
    let mut run = Run::new().add_text(text);
    if style.bold {
        run = run.bold();
    }
    if style.italic {
        run = run.italic();
    }
    if style.underline {
        run = run.underline("single");
    }
    if style.strike {
        run = run.strike();
    }
    if style.highlight {
        run = run.highlight("yellow");
    }
    if let Some(size) = style.font_size {
        run = run.size(half_points(size));
    }
    if let Some(family) = &style.font_family {
        run = run.fonts(run_fonts(family));
    }
    run
}

/// docx-rs decodes picture bytes itself and panics on bad data, so they are
/// decoded here first.
fn image_run(jpeg: &[u8], width: u32, height: u32, max_width_emu: u32) -> Result<Run, DocMergeError> {
    image::load_from_memory_with_format(jpeg, image::ImageFormat::Jpeg)
        .map_err(|err| DocMergeError::Docx(format!("unreadable image: {}", err)))?;
    let mut w = width.saturating_mul(EMU_PER_PX);
    let mut h = height.saturating_mul(EMU_PER_PX);
    if w > max_width_emu && w > 0 {
        h = (h as f64 * max_width_emu as f64 / w as f64) as u32;
        w = max_width_emu;
    }
    Ok(Run::new().add_image(Pic::new(jpeg).size(w, h)))
}

/// Build a single-section DOCX from converted paragraphs.
pub fn pack(paragraphs: &[DocParagraph], options: &DocxOptions) -> Result<Vec<u8>, DocMergeError> {
    let content_width = options.page_size.width - options.margins.left - options.margins.right;
    if content_width <= Pt::ZERO {
        return Err(DocMergeError::InvalidConfiguration(
            "docx margins leave no content width".to_string(),
        ));
    }
    let max_image_emu = (content_width.to_f32() * EMU_PER_PT) as u32;

    let mut docx = Docx::new()
        .page_size(
            twips(options.page_size.width) as u32,
            twips(options.page_size.height) as u32,
        )
        .page_margin(
            PageMargin::new()
                .top(twips(options.margins.top))
                .bottom(twips(options.margins.bottom))
                .left(twips(options.margins.left))
                .right(twips(options.margins.right)),
        )
        .default_size(half_points(options.font_size));
    if let Some(family) = &options.font_family {
        docx = docx.default_fonts(run_fonts(family));
    }
    for level in 1..=6 {
        docx = docx.add_style(heading_style(level));
    }
    docx = docx
        .add_style(
            Style::new("Quote", StyleType::Paragraph)
                .name("Quote")
                .indent(Some(QUOTE_INDENT_TWIPS), None, None, None),
        )
        .add_abstract_numbering(bullet_numbering())
        .add_numbering(Numbering::new(BULLET_NUMBERING, BULLET_NUMBERING));

    let mut declared_lists = Vec::new();
    for paragraph in paragraphs {
        if let ParagraphKind::Numbered { list, start, .. } = paragraph.kind {
            if !declared_lists.contains(&list) {
                declared_lists.push(list);
                let id = FIRST_ORDERED_NUMBERING + list;
                docx = docx
                    .add_abstract_numbering(ordered_numbering(id, start))
                    .add_numbering(Numbering::new(id, id));
            }
        }
    }

    for paragraph in paragraphs {
        let mut p = Paragraph::new();
        match &paragraph.kind {
            ParagraphKind::Normal => {}
            ParagraphKind::Heading(level) => p = p.style(&format!("Heading{}", (*level).clamp(1, 6))),
            ParagraphKind::Bullet { level } => {
                p = p.numbering(NumberingId::new(BULLET_NUMBERING), IndentLevel::new((*level).min(8)));
            }
            ParagraphKind::Numbered { level, list, .. } => {
                p = p.numbering(
                    NumberingId::new(FIRST_ORDERED_NUMBERING + list),
                    IndentLevel::new((*level).min(8)),
                );
            }
            ParagraphKind::Quote => p = p.style("Quote"),
            ParagraphKind::Rule => {
                p = p
                    .align(AlignmentType::Center)
                    .add_run(Run::new().add_text("\u{2015}".repeat(24)).color("999999"));
            }
            ParagraphKind::PageBreak => p = p.add_run(Run::new().add_break(BreakType::Page)),
        }
        if let Some(align) = paragraph.align {
            p = p.align(alignment(align));
        }
        for run in &paragraph.runs {
            p = match run {
                DocRun::Text { text, style } => p.add_run(styled_run(text, style)),
                DocRun::Break => p.add_run(Run::new().add_break(BreakType::TextWrapping)),
                DocRun::Image { jpeg, width, height } => {
                    p.add_run(image_run(jpeg, *width, *height, max_image_emu)?)
                }
            };
        }
        docx = docx.add_paragraph(p);
    }

    if let Some(text) = &options.footer_text {
        let footer = Footer::new().add_paragraph(
            Paragraph::new()
                .add_run(Run::new().add_text(text.as_str()))
                .align(AlignmentType::Center),
        );
        docx = docx.footer(footer);
    }

    let mut buffer = Vec::new();
    docx.build()
        .pack(&mut Cursor::new(&mut buffer))
        .map_err(|err| DocMergeError::Docx(err.to_string()))?;
    Ok(buffer)
}

/// Standalone HTML document for an external HTML-to-Word converter: page
/// delimiters become CSS page breaks and the fragment gets a body with the
/// default font settings.
pub fn prepare_conversion_html(html: &str) -> String {
    let body = html.replace(PAGE_DELIMITER, r#"<div style="page-break-after: always;"></div>"#);
    format!(
        concat!(
            "<!DOCTYPE html>\n",
            "<html lang=\"en\">\n",
            "<head>\n",
            "<meta charset=\"UTF-8\" />\n",
            "<style>\n",
            "body {{ font-family: 'Arial', sans-serif; font-size: 12pt; line-height: 1.2; }}\n",
            "p {{ margin-bottom: 8pt; }}\n",
            "</style>\n",
            "</head>\n",
            "<body>\n{}\n</body>\n",
            "</html>\n"
        ),
        body
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::CachedImage;
    use crate::html::parse;
    use std::io::Read;

    fn paragraphs(html: &str) -> Vec<DocParagraph> {
        convert(&parse(html), &ImageCache::new())
    }

    fn texts(paragraphs: &[DocParagraph]) -> Vec<String> {
        paragraphs.iter().map(DocParagraph::text).collect()
    }

    #[test]
    fn headings_and_paragraphs_keep_their_kind() {
        let out = paragraphs("<h1>Title</h1><p>Hello <b>World</b></p><h3 align=\"center\">Sub</h3>");
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].kind, ParagraphKind::Heading(1));
        assert_eq!(out[1].kind, ParagraphKind::Normal);
        assert_eq!(out[1].text(), "Hello World");
        assert_eq!(out[2].kind, ParagraphKind::Heading(3));
        assert_eq!(out[2].align, Some(TextAlign::Center));
        match &out[1].runs[1] {
            DocRun::Text { text, style } => {
                assert_eq!(text, "World");
                assert!(style.bold);
            }
            other => panic!("unexpected run {:?}", other),
        }
    }

    #[test]
    fn lists_map_to_levels() {
        let out = paragraphs("<ul><li>a<ul><li>b</li></ul></li></ul><ol start=\"4\"><li>c</li></ol><ol><li>d</li></ol>");
        assert_eq!(texts(&out), vec!["a", "b", "c", "d"]);
        assert_eq!(out[0].kind, ParagraphKind::Bullet { level: 0 });
        assert_eq!(out[1].kind, ParagraphKind::Bullet { level: 1 });
        assert_eq!(out[2].kind, ParagraphKind::Numbered { level: 0, list: 0, start: 4 });
        assert_eq!(out[3].kind, ParagraphKind::Numbered { level: 0, list: 1, start: 1 });
    }

    #[test]
    fn nested_blocks_are_hoisted_and_text_continues() {
        let out = paragraphs("<blockquote>before<p>inner</p>after</blockquote>");
        assert_eq!(texts(&out), vec!["before", "inner", "after"]);
        assert!(out.iter().all(|p| p.kind == ParagraphKind::Quote));
    }

    #[test]
    fn every_leaf_text_appears() {
        let out = paragraphs("<custom-tag>one <x-y>two</x-y></custom-tag><span>three</span>");
        let joined = texts(&out).join(" ");
        for word in ["one", "two", "three"] {
            assert!(joined.contains(word), "{} missing from {:?}", word, joined);
        }
    }

    #[test]
    fn delimiter_and_rule_become_their_own_paragraphs() {
        let html = format!("<p>a</p>{}<p>b</p><hr>", PAGE_DELIMITER);
        let kinds: Vec<ParagraphKind> = paragraphs(&html).into_iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ParagraphKind::Normal,
                ParagraphKind::PageBreak,
                ParagraphKind::Normal,
                ParagraphKind::Rule
            ]
        );
    }

    #[test]
    fn inline_styles_accumulate() {
        let out = paragraphs(r#"<p><u><i>x</i></u> <s>y</s> <mark style="font-size: 18pt">z</mark></p>"#);
        let styles: Vec<RunStyle> = out[0]
            .runs
            .iter()
            .filter_map(|run| match run {
                DocRun::Text { style, .. } => Some(style.clone()),
                _ => None,
            })
            .collect();
        assert!(styles[0].underline && styles[0].italic);
        assert!(styles.iter().any(|s| s.strike));
        assert!(styles.iter().any(|s| s.highlight && s.font_size == Some(Pt::from_f32(18.0))));
        assert_eq!(out[0].text(), "x y z");
    }

    #[test]
    fn cached_images_become_image_runs() {
        let mut cache = ImageCache::new();
        cache.insert(
            "logo.png",
            CachedImage {
                jpeg: vec![1, 2, 3],
                width: 10,
                height: 5,
            },
        );
        let out = convert(&parse(r#"<p><img src="logo.png"><img src="gone.png"></p>"#), &cache);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].runs.len(), 1);
        assert!(matches!(out[0].runs[0], DocRun::Image { width: 10, height: 5, .. }));
    }

    #[test]
    fn packs_a_readable_docx() {
        let html = format!("<h1>Report</h1><p>Hello Ada</p>{}<ol><li>one</li></ol>", PAGE_DELIMITER);
        let out = paragraphs(&html);
        let options = DocxOptions {
            footer_text: Some("Confidential".to_string()),
            ..DocxOptions::default()
        };
        let bytes = pack(&out, &options).expect("docx");
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).expect("zip");
        let mut xml = String::new();
        archive
            .by_name("word/document.xml")
            .expect("document.xml")
            .read_to_string(&mut xml)
            .expect("read");
        assert!(xml.contains("Hello Ada"));
        assert!(xml.contains("Heading1"));
        assert!(xml.contains(r#"w:type="page""#));
        assert!(archive.by_name("word/numbering.xml").is_ok());
    }

    #[test]
    fn undecodable_image_is_an_error_not_a_panic() {
        let broken = vec![DocParagraph {
            kind: ParagraphKind::Normal,
            align: None,
            runs: vec![DocRun::Image {
                jpeg: vec![1, 2, 3],
                width: 10,
                height: 5,
            }],
        }];
        match pack(&broken, &DocxOptions::default()) {
            Err(DocMergeError::Docx(message)) => assert!(message.contains("unreadable image")),
            other => panic!("expected a docx error, got {:?}", other.map(|bytes| bytes.len())),
        }

        let mut jpeg = Cursor::new(Vec::new());
        image::RgbImage::new(4, 2)
            .write_to(&mut jpeg, image::ImageFormat::Jpeg)
            .expect("encode");
        let valid = vec![DocParagraph {
            kind: ParagraphKind::Normal,
            align: None,
            runs: vec![DocRun::Image {
                jpeg: jpeg.into_inner(),
                width: 4,
                height: 2,
            }],
        }];
        assert!(pack(&valid, &DocxOptions::default()).is_ok());
    }

    #[test]
    fn conversion_html_replaces_delimiters() {
        let html = format!("<p>a</p>{}<p>b</p>", PAGE_DELIMITER);
        let prepared = prepare_conversion_html(&html);
        assert!(prepared.starts_with("<!DOCTYPE html>"));
        assert!(prepared.contains(r#"<div style="page-break-after: always;"></div>"#));
        assert!(!prepared.contains("page-break-delimiter"));
        assert!(prepared.contains("<p>b</p>"));
    }
}
