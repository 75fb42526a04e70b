//! Block layout for the PDF path.
//!
//! The walk is depth-first over [`ParsedNode`]s. Inherited style travels down
//! as an immutable [`BlockStyle`] (children get derived copies) and the
//! [`Cursor`] is passed in by value and handed back by every block, so a
//! subtree can never move the cursor behind its parent's back.

use crate::assets::ImageCache;
use crate::canvas::{Canvas, Command, Document};
use crate::debug::DebugLogger;
use crate::error::DocMergeError;
use crate::font::FontRegistry;
use crate::html::{heading_level, is_block_tag, ElementNode, ParsedNode, PAGE_BREAK_CHAR};
use crate::inline::{self, InlineItem, Line, TextStyle};
use crate::metrics::RenderMetrics;
use crate::style::{Length, StyleCapabilities, TextAlign};
use crate::types::{Color, Margins, Pt, Size};
use serde_json::json;

const MAX_DEPTH: usize = 128;
const LIST_INDENT_MM: f32 = 6.0;
const QUOTE_INDENT_MM: f32 = 10.0;
const RULE_GAP_MM: f32 = 5.0;
const BLOCK_AFTER_MM: f32 = 2.0;
const PARAGRAPH_BEFORE_MM: f32 = 4.0;

/// Running footer drawn in the bottom margin of every page. `{page}` and
/// `{pages}` are replaced with the page number and page count.
#[derive(Debug, Clone, PartialEq)]
pub struct PageFooterSpec {
    pub text: String,
    pub font_size: Pt,
    pub align: TextAlign,
}

impl PageFooterSpec {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            font_size: Pt::from_f32(9.0),
            align: TextAlign::Center,
        }
    }

    pub fn render(&self, page: usize, pages: usize) -> String {
        self.text
            .replace("{page}", &page.to_string())
            .replace("{pages}", &pages.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct PdfLayoutOptions {
    pub page_size: Size,
    pub margins: Margins,
    pub font_family: Option<String>,
    pub font_size: Pt,
    pub line_height: f32,
    pub image_max_height: Pt,
    pub capabilities: StyleCapabilities,
    pub footer: Option<PageFooterSpec>,
}

impl Default for PdfLayoutOptions {
    fn default() -> Self {
        Self {
            page_size: Size::a4(),
            margins: Margins::all_mm(20.0),
            font_family: None,
            font_size: Pt::from_f32(12.0),
            line_height: 1.5,
            image_max_height: Pt::from_mm(120.0),
            capabilities: StyleCapabilities::all(),
            footer: None,
        }
    }
}

impl PdfLayoutOptions {
    pub fn content_width(&self) -> Pt {
        self.page_size.width - self.margins.left - self.margins.right
    }

    pub fn content_height(&self) -> Pt {
        self.page_size.height - self.margins.top - self.margins.bottom
    }

    /// Lowest y any content may reach.
    pub fn bottom_limit(&self) -> Pt {
        self.page_size.height - self.margins.bottom
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitterState {
    BeforePage,
    OnPage,
    PageFull,
    Done,
}

impl EmitterState {
    pub fn as_str(self) -> &'static str {
        match self {
            EmitterState::BeforePage => "BeforePage",
            EmitterState::OnPage => "OnPage",
            EmitterState::PageFull => "PageFull",
            EmitterState::Done => "Done",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakReason {
    Boundary,
    Overflow,
}

impl BreakReason {
    fn as_str(self) -> &'static str {
        match self {
            BreakReason::Boundary => "boundary",
            BreakReason::Overflow => "overflow",
        }
    }
}

/// Position of the next unit. `y` grows downwards from the page top.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cursor {
    pub x: Pt,
    pub y: Pt,
    pub page: usize,
}

/// Inherited style for a subtree.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockStyle {
    pub font_family: Option<String>,
    pub font_size: Pt,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strike: bool,
    pub highlight: bool,
    pub line_height: f32,
    /// Accumulated left indent relative to the content box.
    pub indent: Pt,
    pub align: TextAlign,
}

impl BlockStyle {
    pub fn root(opts: &PdfLayoutOptions) -> Self {
        Self {
            font_family: opts.font_family.clone(),
            font_size: opts.font_size,
            bold: false,
            italic: false,
            underline: false,
            strike: false,
            highlight: false,
            line_height: opts.line_height,
            indent: Pt::ZERO,
            align: TextAlign::Left,
        }
    }

    /// Style for `el`'s subtree. `basis` resolves percentage indents.
    pub fn derive(&self, el: &ElementNode, basis: Pt) -> BlockStyle {
        let mut next = self.clone();
        match el.tag.as_str() {
            "b" | "strong" => next.bold = true,
            "i" | "em" | "cite" | "var" => next.italic = true,
            "u" | "ins" | "a" => next.underline = true,
            "s" | "strike" | "del" => next.strike = true,
            "mark" => next.highlight = true,
            "code" | "kbd" | "samp" | "pre" | "tt" => next.font_family = Some("Courier".to_string()),
            _ => {}
        }
        if let Some(level) = heading_level(&el.tag) {
            next.bold = true;
            next.font_size = Pt::from_f32(match level {
                1 => 24.0,
                2 => 18.0,
                _ => 14.0,
            });
        }
        let style = &el.style;
        if let Some(family) = &style.font_family {
            next.font_family = Some(family.clone());
        }
        if let Some(size) = style.font_size {
            let resolved = size.to_pt(self.font_size, self.font_size);
            if resolved > Pt::ZERO {
                next.font_size = resolved;
            }
        }
        if let Some(line_height) = style.line_height {
            let multiplier = line_height.multiplier(next.font_size);
            if multiplier.is_finite() && multiplier > 0.0 {
                next.line_height = multiplier;
            }
        }
        if let Some(align) = el.text_align() {
            next.align = align;
        }
        if is_block_tag(&el.tag) {
            if let Some(margin) = style.margin_left {
                next.indent = (next.indent + margin.to_pt(next.font_size, basis)).max(Pt::ZERO);
            }
        }
        next
    }

    fn text_style(&self, fonts: &FontRegistry) -> TextStyle {
        TextStyle {
            font_name: fonts.select(self.font_family.as_deref(), self.bold, self.italic),
            font_size: self.font_size,
            underline: self.underline,
            strike: self.strike,
            highlight: self.highlight,
        }
    }
}

/// List marker drawn once, left of the first line of an item.
#[derive(Debug, Clone)]
struct Marker {
    text: String,
    style: TextStyle,
    width: Pt,
}

enum Segment<'n> {
    Items(Vec<InlineItem>),
    Image(&'n ElementNode),
    /// A page delimiter nested inside inline flow.
    Boundary,
}

struct Emitter<'a> {
    opts: &'a PdfLayoutOptions,
    fonts: &'a FontRegistry,
    images: &'a ImageCache,
    debug: Option<&'a DebugLogger>,
    canvas: Canvas,
    metrics: RenderMetrics,
    state: EmitterState,
}

/// Lay out filled template pages. Each template page after the first starts
/// a new physical page; content that reaches the bottom margin continues on
/// a fresh page.
pub fn layout_document(
    pages: &[String],
    opts: &PdfLayoutOptions,
    fonts: &FontRegistry,
    images: &ImageCache,
    debug: Option<&DebugLogger>,
) -> (Document, RenderMetrics) {
    let mut emitter = Emitter {
        opts,
        fonts,
        images,
        debug,
        canvas: Canvas::new(opts.page_size),
        metrics: RenderMetrics::default(),
        state: EmitterState::BeforePage,
    };
    let root = BlockStyle::root(opts);
    for (index, html) in pages.iter().enumerate() {
        let cursor = if index == 0 {
            emitter.start_first_page()
        } else {
            emitter.new_page(BreakReason::Boundary)
        };
        let nodes = crate::html::parse_with(html, opts.capabilities);
        emitter.blocks(&nodes, &root, cursor, 0);
    }
    if pages.is_empty() {
        emitter.start_first_page();
    }
    emitter.transition(EmitterState::Done);
    emitter.finish()
}

impl<'a> Emitter<'a> {
    fn transition(&mut self, next: EmitterState) {
        if self.state == next {
            return;
        }
        if let Some(debug) = self.debug {
            debug.event(
                "emitter.state",
                json!({
                    "from": self.state.as_str(),
                    "to": next.as_str(),
                    "page": self.canvas.page_index() + 1,
                }),
            );
        }
        self.state = next;
    }

    fn top_cursor(&self) -> Cursor {
        Cursor {
            x: self.opts.margins.left,
            y: self.opts.margins.top,
            page: self.canvas.page_index(),
        }
    }

    fn start_first_page(&mut self) -> Cursor {
        self.metrics.open_page();
        self.transition(EmitterState::OnPage);
        self.top_cursor()
    }

    fn new_page(&mut self, reason: BreakReason) -> Cursor {
        match reason {
            BreakReason::Boundary => {
                self.metrics.boundary_breaks += 1;
                self.transition(EmitterState::BeforePage);
            }
            BreakReason::Overflow => {
                self.metrics.overflow_breaks += 1;
                self.transition(EmitterState::PageFull);
            }
        }
        self.canvas.next_page();
        self.metrics.open_page();
        log::debug!(
            "page break ({}) -> page {}",
            reason.as_str(),
            self.canvas.page_index() + 1
        );
        if let Some(debug) = self.debug {
            debug.increment(&format!("pdf.break.{}", reason.as_str()), 1);
            debug.event(
                "pdf.page_break",
                json!({ "reason": reason.as_str(), "page": self.canvas.page_index() + 1 }),
            );
        }
        self.transition(EmitterState::OnPage);
        self.top_cursor()
    }

    fn at_page_top(&self, cursor: Cursor) -> bool {
        cursor.y <= self.opts.margins.top
    }

    /// Start a new page first when `height` would cross the bottom margin.
    fn ensure_room(&mut self, cursor: Cursor, height: Pt) -> Cursor {
        if cursor.y + height <= self.opts.bottom_limit() || self.at_page_top(cursor) {
            return cursor;
        }
        self.new_page(BreakReason::Overflow)
    }

    fn space(&self, mut cursor: Cursor, amount: Pt) -> Cursor {
        if amount > Pt::ZERO && !self.at_page_top(cursor) {
            cursor.y += amount;
        }
        cursor
    }

    fn resolve(&self, length: Length, style: &BlockStyle) -> Pt {
        length.to_pt(style.font_size, self.opts.content_width())
    }

    fn recover(&mut self, tag: &str, cursor: Cursor, result: Result<Cursor, DocMergeError>) -> Cursor {
        match result {
            Ok(next) => next,
            Err(err) => {
                self.metrics.node_failures += 1;
                log::warn!("skipping <{}>: {}", tag, err);
                if let Some(debug) = self.debug {
                    debug.increment("pdf.node_failures", 1);
                    debug.event("pdf.node_skipped", json!({ "tag": tag, "error": err.to_string() }));
                }
                cursor
            }
        }
    }

    /// Walk a sibling list. Runs of inline siblings form anonymous paragraphs.
    fn blocks(&mut self, nodes: &[ParsedNode], style: &BlockStyle, mut cursor: Cursor, depth: usize) -> Cursor {
        let mut run_start: Option<usize> = None;
        for (index, node) in nodes.iter().enumerate() {
            let block = match node {
                ParsedNode::Element(el) if is_block_tag(&el.tag) || el.is_page_delimiter() => el,
                _ => {
                    run_start.get_or_insert(index);
                    continue;
                }
            };
            if let Some(start) = run_start.take() {
                let result = self.paragraph(&nodes[start..index], style, cursor, None, depth);
                cursor = self.recover("#text", cursor, result);
            }
            let result = self.block(block, style, cursor, depth + 1);
            cursor = self.recover(&block.tag, cursor, result);
        }
        if let Some(start) = run_start {
            let result = self.paragraph(&nodes[start..], style, cursor, None, depth);
            cursor = self.recover("#text", cursor, result);
        }
        cursor
    }

    fn block(&mut self, el: &ElementNode, style: &BlockStyle, cursor: Cursor, depth: usize) -> Result<Cursor, DocMergeError> {
        if depth > MAX_DEPTH {
            return Err(DocMergeError::Layout(format!("nesting deeper than {} levels", MAX_DEPTH)));
        }
        if el.is_page_delimiter() {
            return Ok(self.new_page(BreakReason::Boundary));
        }
        let derived = style.derive(el, self.opts.content_width());
        if let Some(level) = heading_level(&el.tag) {
            let before = if level <= 2 { 8.0 } else { 4.0 };
            return self.text_block(el, &derived, cursor, Pt::from_mm(before), depth);
        }
        match el.tag.as_str() {
            "p" => self.text_block(el, &derived, cursor, Pt::from_mm(PARAGRAPH_BEFORE_MM), depth),
            "ul" | "ol" => {
                let mut cursor = self.margin_top(el, &derived, cursor, Pt::ZERO);
                cursor = self.list(el, &derived, cursor, depth)?;
                Ok(self.margin_bottom(el, &derived, cursor, Pt::from_mm(BLOCK_AFTER_MM)))
            }
            "li" => {
                let mut item = derived.clone();
                item.indent += Pt::from_mm(LIST_INDENT_MM);
                self.list_item(el, &item, cursor, "\u{2022} ".to_string(), depth)
            }
            "blockquote" => self.blockquote(el, &derived, cursor),
            "hr" => Ok(self.rule(&derived, cursor)),
            _ => {
                let mut cursor = self.margin_top(el, &derived, cursor, Pt::ZERO);
                cursor = self.blocks(&el.children, &derived, cursor, depth);
                Ok(self.margin_bottom(el, &derived, cursor, Pt::ZERO))
            }
        }
    }

    fn margin_top(&self, el: &ElementNode, style: &BlockStyle, cursor: Cursor, default: Pt) -> Cursor {
        let amount = el
            .style
            .margin_top
            .map(|len| self.resolve(len, style))
            .unwrap_or(default);
        self.space(cursor, amount)
    }

    fn margin_bottom(&self, el: &ElementNode, style: &BlockStyle, cursor: Cursor, default: Pt) -> Cursor {
        let amount = el
            .style
            .margin_bottom
            .map(|len| self.resolve(len, style))
            .unwrap_or(default);
        self.space(cursor, amount)
    }

    fn text_block(&mut self, el: &ElementNode, style: &BlockStyle, cursor: Cursor, before: Pt, depth: usize) -> Result<Cursor, DocMergeError> {
        let cursor = self.margin_top(el, style, cursor, before);
        let cursor = self.paragraph(&el.children, style, cursor, None, depth)?;
        Ok(self.margin_bottom(el, style, cursor, Pt::from_mm(BLOCK_AFTER_MM)))
    }

    fn list(&mut self, el: &ElementNode, style: &BlockStyle, mut cursor: Cursor, depth: usize) -> Result<Cursor, DocMergeError> {
        let ordered = el.tag == "ol";
        let start = el
            .attr("start")
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .unwrap_or(1);
        let mut item_style = style.clone();
        item_style.indent += Pt::from_mm(LIST_INDENT_MM);
        let mut position: i64 = 0;
        for child in &el.children {
            match child {
                ParsedNode::Element(item) if item.tag == "li" => {
                    position += 1;
                    let marker = if ordered {
                        format!("{}. ", start + position - 1)
                    } else {
                        "\u{2022} ".to_string()
                    };
                    let derived = item_style.derive(item, self.opts.content_width());
                    let result = self.list_item(item, &derived, cursor, marker, depth + 1);
                    cursor = self.recover("li", cursor, result);
                }
                ParsedNode::Element(nested) if nested.tag == "ul" || nested.tag == "ol" => {
                    let derived = style.derive(nested, self.opts.content_width());
                    let nested_style = BlockStyle {
                        indent: item_style.indent,
                        ..derived
                    };
                    let result = self.list(nested, &nested_style, cursor, depth + 1);
                    cursor = self.recover(&nested.tag, cursor, result);
                }
                other if other.is_blank_text() => {}
                other => {
                    cursor = self.blocks(std::slice::from_ref(other), &item_style, cursor, depth + 1);
                }
            }
        }
        Ok(cursor)
    }

    fn list_item(&mut self, el: &ElementNode, style: &BlockStyle, mut cursor: Cursor, marker_text: String, depth: usize) -> Result<Cursor, DocMergeError> {
        if depth > MAX_DEPTH {
            return Err(DocMergeError::Layout(format!("nesting deeper than {} levels", MAX_DEPTH)));
        }
        let mut marker_style = style.text_style(self.fonts);
        marker_style.underline = false;
        marker_style.strike = false;
        marker_style.highlight = false;
        let width = self
            .fonts
            .measure(&marker_style.font_name, marker_style.font_size, &marker_text);
        let mut marker = Some(Marker {
            text: marker_text,
            style: marker_style,
            width,
        });
        let mut body = style.clone();
        body.indent += width;

        let mut run_start: Option<usize> = None;
        let children = &el.children;
        for (index, child) in children.iter().enumerate() {
            let block = match child {
                ParsedNode::Element(b) if is_block_tag(&b.tag) => b,
                _ => {
                    run_start.get_or_insert(index);
                    continue;
                }
            };
            if let Some(start) = run_start.take() {
                cursor = self.paragraph(&children[start..index], &body, cursor, marker.take(), depth)?;
            }
            if block.tag == "ul" || block.tag == "ol" {
                if let Some(pending) = marker.take() {
                    cursor = self.paragraph(&[], &body, cursor, Some(pending), depth)?;
                }
                let derived = style.derive(block, self.opts.content_width());
                let result = self.list(block, &derived, cursor, depth + 1);
                cursor = self.recover(&block.tag, cursor, result);
            } else if marker.is_some() && (block.tag == "p" || block.is_heading()) {
                let derived = body.derive(block, self.opts.content_width());
                cursor = self.paragraph(&block.children, &derived, cursor, marker.take(), depth + 1)?;
            } else {
                if let Some(pending) = marker.take() {
                    cursor = self.paragraph(&[], &body, cursor, Some(pending), depth)?;
                }
                let result = self.block(block, &body, cursor, depth + 1);
                cursor = self.recover(&block.tag, cursor, result);
            }
        }
        if let Some(start) = run_start {
            cursor = self.paragraph(&children[start..], &body, cursor, marker.take(), depth)?;
        }
        if let Some(pending) = marker.take() {
            cursor = self.paragraph(&[], &body, cursor, Some(pending), depth)?;
        }
        Ok(cursor)
    }

    fn blockquote(&mut self, el: &ElementNode, style: &BlockStyle, cursor: Cursor) -> Result<Cursor, DocMergeError> {
        let mut quote = style.clone();
        quote.indent += Pt::from_mm(QUOTE_INDENT_MM);
        let text_style = quote.text_style(self.fonts);
        let text = el.text_content();
        let mut cursor = self.margin_top(el, &quote, cursor, Pt::from_mm(PARAGRAPH_BEFORE_MM));
        let (x0, width) = self.text_box(&quote);
        for (part_index, part) in text.split(PAGE_BREAK_CHAR).enumerate() {
            if part_index > 0 {
                cursor = self.new_page(BreakReason::Boundary);
            }
            let mut items = Vec::new();
            for (index, line) in part.split('\n').enumerate() {
                if index > 0 {
                    items.push(InlineItem::Break);
                }
                items.push(InlineItem::Text {
                    text: line.to_string(),
                    style: text_style.clone(),
                });
            }
            let lines = inline::break_lines(&items, width, quote.line_height, quote.font_size, self.fonts);
            cursor = self.draw_lines(lines, x0, width, quote.align, cursor, None);
        }
        Ok(self.margin_bottom(el, &quote, cursor, Pt::from_mm(BLOCK_AFTER_MM)))
    }

    fn rule(&mut self, style: &BlockStyle, cursor: Cursor) -> Cursor {
        let gap = Pt::from_mm(RULE_GAP_MM);
        let thickness = Pt::from_f32(0.75);
        let cursor = self.ensure_room(cursor, gap + thickness);
        let mut cursor = self.space(cursor, gap);
        let (x0, width) = self.text_box(style);
        self.canvas.set_stroke_color(Color::rgb(0.6, 0.6, 0.6));
        self.canvas.set_line_width(thickness);
        self.canvas.rule(x0, x0 + width, cursor.y);
        cursor.y += thickness + gap;
        cursor
    }

    /// Left edge and available width for text at `style`'s indent.
    fn text_box(&self, style: &BlockStyle) -> (Pt, Pt) {
        let content = self.opts.content_width();
        let minimum = Pt::from_f32(24.0).min(content);
        let indent = style.indent.min(content - minimum);
        (self.opts.margins.left + indent, content - indent)
    }

    fn paragraph(&mut self, nodes: &[ParsedNode], style: &BlockStyle, mut cursor: Cursor, mut marker: Option<Marker>, depth: usize) -> Result<Cursor, DocMergeError> {
        let mut segments = Vec::new();
        self.collect_segments(nodes, style, &mut segments, depth)?;
        let (x0, width) = self.text_box(style);
        for segment in segments {
            match segment {
                Segment::Items(items) => {
                    let only_spaces = items.iter().all(|item| match item {
                        InlineItem::Text { text, .. } => text.trim().is_empty(),
                        InlineItem::Break => false,
                    });
                    if only_spaces {
                        continue;
                    }
                    let lines = inline::break_lines(&items, width, style.line_height, style.font_size, self.fonts);
                    cursor = self.draw_lines(lines, x0, width, style.align, cursor, marker.take());
                }
                Segment::Image(el) => {
                    if let Some(pending) = marker.take() {
                        cursor = self.marker_line(style, x0, width, cursor, pending);
                    }
                    let result = self.image(el, style, cursor);
                    cursor = self.recover("img", cursor, result);
                }
                Segment::Boundary => {
                    if let Some(pending) = marker.take() {
                        cursor = self.marker_line(style, x0, width, cursor, pending);
                    }
                    cursor = self.new_page(BreakReason::Boundary);
                }
            }
        }
        if let Some(pending) = marker.take() {
            cursor = self.marker_line(style, x0, width, cursor, pending);
        }
        Ok(cursor)
    }

    fn marker_line(&mut self, style: &BlockStyle, x0: Pt, width: Pt, cursor: Cursor, marker: Marker) -> Cursor {
        let lines = inline::break_lines(&[InlineItem::Break], width, style.line_height, style.font_size, self.fonts);
        self.draw_lines(lines, x0, width, style.align, cursor, Some(marker))
    }

    fn collect_segments<'n>(&self, nodes: &'n [ParsedNode], style: &BlockStyle, out: &mut Vec<Segment<'n>>, depth: usize) -> Result<(), DocMergeError> {
        if depth > MAX_DEPTH {
            return Err(DocMergeError::Layout(format!("nesting deeper than {} levels", MAX_DEPTH)));
        }
        for node in nodes {
            match node {
                ParsedNode::Text { content } => push_item(
                    out,
                    InlineItem::Text {
                        text: content.clone(),
                        style: style.text_style(self.fonts),
                    },
                ),
                ParsedNode::Element(el) => match el.tag.as_str() {
                    "br" => push_item(out, InlineItem::Break),
                    "img" => out.push(Segment::Image(el)),
                    _ if el.is_page_delimiter() => out.push(Segment::Boundary),
                    tag if is_block_tag(tag) => {
                        // Block inside inline flow: keep its text on lines of its own.
                        push_item(out, InlineItem::Break);
                        let derived = style.derive(el, self.opts.content_width());
                        self.collect_segments(&el.children, &derived, out, depth + 1)?;
                        push_item(out, InlineItem::Break);
                    }
                    _ => {
                        let derived = style.derive(el, self.opts.content_width());
                        self.collect_segments(&el.children, &derived, out, depth + 1)?;
                    }
                },
            }
        }
        Ok(())
    }

    fn draw_lines(&mut self, lines: Vec<Line>, x0: Pt, width: Pt, align: TextAlign, mut cursor: Cursor, mut marker: Option<Marker>) -> Cursor {
        let limit = self.opts.content_height();
        for line in lines {
            let tallest = line.height.max(line.max_font_size);
            let line = if tallest > limit {
                log::debug!("line taller than the content area, scaled to fit");
                if let Some(m) = marker.as_mut() {
                    let ratio = limit.to_f32() / tallest.to_f32();
                    m.style.font_size = m.style.font_size * ratio;
                    m.width = m.width * ratio;
                }
                line.fit_height(limit)
            } else {
                line
            };
            cursor = self.ensure_room(cursor, line.height);
            let line_top = cursor.y;
            let text_top = line_top + (line.height - line.max_font_size) / 2;
            let slack = (width - line.width).max(Pt::ZERO);
            let gaps = line.words.len().saturating_sub(1) as i32;
            let (mut x, extra) = match align {
                TextAlign::Left => (x0, Pt::ZERO),
                TextAlign::Center => (x0 + slack / 2, Pt::ZERO),
                TextAlign::Right => (x0 + slack, Pt::ZERO),
                TextAlign::Justify if !line.ends_paragraph && gaps > 0 => (x0, slack / gaps),
                TextAlign::Justify => (x0, Pt::ZERO),
            };
            if let Some(m) = marker.take() {
                self.draw_run(x0 - m.width, text_top, &line, line_top, &m.text, &m.style, m.width);
            }

            // Same-style words joined by a natural space go out as one string.
            let mut runs: Vec<(Pt, String, TextStyle, Pt)> = Vec::new();
            for (word_index, word) in line.words.iter().enumerate() {
                if word_index > 0 {
                    x += word.space_before + extra;
                }
                for (piece_index, piece) in word.pieces.iter().enumerate() {
                    let joins = word_index > 0 && piece_index == 0 && extra == Pt::ZERO;
                    match runs.last_mut() {
                        Some(last) if joins && last.2 == piece.style => {
                            last.1.push(' ');
                            last.1.push_str(&piece.text);
                            last.3 = x + piece.width - last.0;
                        }
                        _ => runs.push((x, piece.text.clone(), piece.style.clone(), piece.width)),
                    }
                    x += piece.width;
                }
            }
            for (run_x, text, run_style, run_width) in runs {
                self.draw_run(run_x, text_top, &line, line_top, &text, &run_style, run_width);
            }
            self.metrics.record_line(line_top + line.height);
            if let Some(debug) = self.debug {
                debug.increment("pdf.lines", 1);
            }
            cursor.y += line.height;
        }
        cursor
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_run(&mut self, x: Pt, text_top: Pt, line: &Line, line_top: Pt, text: &str, style: &TextStyle, width: Pt) {
        let y = text_top + (line.max_font_size - style.font_size);
        if style.highlight {
            self.canvas.set_fill_color(Color::HIGHLIGHT);
            self.canvas.rect(x, line_top, width, line.height);
            self.canvas.set_fill_color(Color::BLACK);
        }
        self.canvas.set_font(&style.font_name, style.font_size);
        self.canvas.text(x, y, text);
        let baseline = y + style.font_size;
        if style.underline || style.strike {
            self.canvas.set_stroke_color(Color::BLACK);
            self.canvas.set_line_width(style.font_size * 0.06);
        }
        if style.underline {
            let uy = baseline + style.font_size * 0.12;
            self.canvas.rule(x, x + width, uy);
        }
        if style.strike {
            let sy = baseline - style.font_size * 0.3;
            self.canvas.rule(x, x + width, sy);
        }
    }

    fn image(&mut self, el: &ElementNode, style: &BlockStyle, cursor: Cursor) -> Result<Cursor, DocMergeError> {
        let source = el.attr("src").map(str::trim).unwrap_or("");
        let Some(entry) = self.images.get(source) else {
            self.metrics.images_skipped += 1;
            log::debug!("image not in cache, skipped: {}", source.chars().take(64).collect::<String>());
            if let Some(debug) = self.debug {
                debug.increment("pdf.images_skipped", 1);
            }
            return Ok(cursor);
        };
        if entry.width == 0 || entry.height == 0 {
            return Err(DocMergeError::Layout("image has no area".to_string()));
        }
        let (x0, available) = self.text_box(style);
        let natural_w = Pt::from_px(entry.width as f32);
        let natural_h = Pt::from_px(entry.height as f32);
        let requested = el
            .attr("width")
            .and_then(Length::parse)
            .or(el.style.width)
            .map(|len| len.to_pt(style.font_size, available))
            .filter(|w| *w > Pt::ZERO);
        let (mut w, mut h) = match requested {
            Some(req) => (req, natural_h * (req.to_f32() / natural_w.to_f32())),
            None => (natural_w, natural_h),
        };
        let max_h = self.opts.image_max_height.min(self.opts.content_height());
        let scale = (available.to_f32() / w.to_f32())
            .min(max_h.to_f32() / h.to_f32())
            .min(1.0);
        if scale < 1.0 {
            w = w * scale;
            h = h * scale;
        }
        let mut cursor = self.ensure_room(cursor, h);
        let x = match el.attr("data-align").and_then(TextAlign::parse) {
            Some(TextAlign::Left) => x0,
            Some(TextAlign::Right) => x0 + (available - w),
            _ => x0 + (available - w) / 2,
        };
        let resource = self.canvas.image_resource(source, entry);
        self.canvas.image(x, cursor.y, w, h, resource);
        self.metrics.record_image();
        cursor.y += h;
        Ok(self.space(cursor, Pt::from_mm(BLOCK_AFTER_MM)))
    }

    fn finish(self) -> (Document, RenderMetrics) {
        let Emitter {
            opts,
            fonts,
            debug,
            canvas,
            metrics,
            ..
        } = self;
        let mut document = canvas.finish_all();
        if let Some(footer) = &opts.footer {
            draw_footers(&mut document, footer, opts, fonts);
        }
        if let Some(debug) = debug {
            debug.increment("pdf.pages", document.pages.len() as u64);
            debug.emit_summary("pdf.layout");
        }
        (document, metrics)
    }
}

fn push_item(out: &mut Vec<Segment<'_>>, item: InlineItem) {
    match out.last_mut() {
        Some(Segment::Items(items)) => items.push(item),
        _ => out.push(Segment::Items(vec![item])),
    }
}

fn draw_footers(document: &mut Document, footer: &PageFooterSpec, opts: &PdfLayoutOptions, fonts: &FontRegistry) {
    let total = document.pages.len();
    let font_name = fonts.select(opts.font_family.as_deref(), false, false);
    let content_width = opts.content_width();
    let y = opts.page_size.height - opts.margins.bottom / 2 - footer.font_size / 2;
    for (index, page) in document.pages.iter_mut().enumerate() {
        let text = footer.render(index + 1, total);
        let width = fonts.measure(&font_name, footer.font_size, &text);
        let slack = (content_width - width).max(Pt::ZERO);
        let x = opts.margins.left
            + match footer.align {
                TextAlign::Center => slack / 2,
                TextAlign::Right => slack,
                TextAlign::Left | TextAlign::Justify => Pt::ZERO,
            };
        page.commands.push(Command::FillColor(Color::BLACK));
        page.commands.push(Command::Font {
            name: font_name.clone(),
            size: footer.font_size,
        });
        page.commands.push(Command::Text { x, y, text });
    }
}
