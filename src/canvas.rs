use crate::assets::CachedImage;
use crate::font::DEFAULT_FONT;
use crate::types::{Color, Pt, Size};
use std::collections::BTreeMap;

/// One drawing step in page space. The origin is the top-left corner and y
/// grows downwards; the PDF writer flips coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    FillColor(Color),
    StrokeColor(Color),
    LineWidth(Pt),
    Font { name: String, size: Pt },
    /// `y` is the top of the glyph box.
    Text { x: Pt, y: Pt, text: String },
    /// Horizontal stroke from `x1` to `x2` at `y`.
    Rule { x1: Pt, x2: Pt, y: Pt },
    /// Filled rectangle in the current fill color.
    Rect { x: Pt, y: Pt, width: Pt, height: Pt },
    Image {
        x: Pt,
        y: Pt,
        width: Pt,
        height: Pt,
        resource_id: String,
    },
}

#[derive(Debug, Clone, Default)]
pub struct Page {
    pub commands: Vec<Command>,
}

/// Laid-out document ready for serialization.
#[derive(Debug, Clone)]
pub struct Document {
    pub page_size: Size,
    pub pages: Vec<Page>,
    /// JPEG images keyed by XObject resource id.
    pub images: BTreeMap<String, CachedImage>,
}

impl Document {
    /// Drawn strings as `(page index, text)` in drawing order.
    pub fn texts(&self) -> Vec<(usize, &str)> {
        let mut out = Vec::new();
        for (index, page) in self.pages.iter().enumerate() {
            for command in &page.commands {
                if let Command::Text { text, .. } = command {
                    out.push((index, text.as_str()));
                }
            }
        }
        out
    }
}

// What the current page has already been told; repeats are dropped.
#[derive(Debug, Clone, PartialEq)]
struct Pen {
    fill: Color,
    stroke: Color,
    line_width: Pt,
    font: String,
    font_size: Pt,
}

impl Pen {
    fn fresh() -> Self {
        Self {
            fill: Color::BLACK,
            stroke: Color::BLACK,
            line_width: Pt::from_f32(1.0),
            font: DEFAULT_FONT.to_string(),
            font_size: Pt::from_f32(12.0),
        }
    }
}

/// Records commands page by page. Each new page starts from a fresh pen.
pub struct Canvas {
    page_size: Size,
    done: Vec<Page>,
    page: Page,
    pen: Pen,
    images: BTreeMap<String, CachedImage>,
    by_source: BTreeMap<String, String>,
}

impl Canvas {
    pub fn new(page_size: Size) -> Self {
        Self {
            page_size,
            done: Vec::new(),
            page: Page::default(),
            pen: Pen::fresh(),
            images: BTreeMap::new(),
            by_source: BTreeMap::new(),
        }
    }

    /// Zero-based index of the open page.
    pub fn page_index(&self) -> usize {
        self.done.len()
    }

    fn push(&mut self, command: Command) {
        self.page.commands.push(command);
    }

    pub fn set_fill_color(&mut self, color: Color) {
        if self.pen.fill != color {
            self.pen.fill = color;
            self.push(Command::FillColor(color));
        }
    }

    pub fn set_stroke_color(&mut self, color: Color) {
        if self.pen.stroke != color {
            self.pen.stroke = color;
            self.push(Command::StrokeColor(color));
        }
    }

    pub fn set_line_width(&mut self, width: Pt) {
        let width = width.max(Pt::ZERO);
        if self.pen.line_width != width {
            self.pen.line_width = width;
            self.push(Command::LineWidth(width));
        }
    }

    pub fn set_font(&mut self, name: &str, size: Pt) {
        if self.pen.font == name && self.pen.font_size == size {
            return;
        }
        self.pen.font = name.to_string();
        self.pen.font_size = size;
        self.push(Command::Font {
            name: name.to_string(),
            size,
        });
    }

    pub fn text(&mut self, x: Pt, y: Pt, text: impl Into<String>) {
        self.push(Command::Text {
            x,
            y,
            text: text.into(),
        });
    }

    pub fn rule(&mut self, x1: Pt, x2: Pt, y: Pt) {
        self.push(Command::Rule { x1, x2, y });
    }

    pub fn rect(&mut self, x: Pt, y: Pt, width: Pt, height: Pt) {
        self.push(Command::Rect { x, y, width, height });
    }

    /// Resource id for `source`, registering the image on first use.
    pub fn image_resource(&mut self, source: &str, image: &CachedImage) -> String {
        if let Some(id) = self.by_source.get(source) {
            return id.clone();
        }
        let id = format!("Im{}", self.by_source.len() + 1);
        self.by_source.insert(source.to_string(), id.clone());
        self.images.insert(id.clone(), image.clone());
        id
    }

    pub fn image(&mut self, x: Pt, y: Pt, width: Pt, height: Pt, resource_id: String) {
        self.push(Command::Image {
            x,
            y,
            width,
            height,
            resource_id,
        });
    }

    pub fn next_page(&mut self) {
        self.done.push(std::mem::take(&mut self.page));
        self.pen = Pen::fresh();
    }

    /// Close the open page even when nothing was drawn on it.
    pub fn finish_all(mut self) -> Document {
        self.next_page();
        Document {
            page_size: self.page_size,
            pages: self.done,
            images: self.images,
        }
    }
}
