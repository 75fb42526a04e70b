mod assets;
pub mod batch;
mod canvas;
mod debug;
pub mod dispatch;
mod docx;
mod error;
pub mod filename;
mod font;
mod html;
mod inline;
mod layout;
mod metrics;
mod page_model;
mod pdf;
mod row;
mod style;
mod types;
pub mod variables;

pub use assets::{CachedImage, ImageCache, ImageResolver, collect_image_sources};
pub use batch::{
    BatchProgress, BatchReport, BatchRequest, RowOutcome, generate_batch, generate_batch_with,
    write_archive,
};
pub use canvas::{Command, Document, Page};
pub use dispatch::{
    DispatchOptions, DispatchReport, DispatchStatus, MailTransport, OutgoingMail, dispatch,
};
pub use docx::{
    DocParagraph, DocRun, DocxOptions, ParagraphKind, RunStyle, convert as docx_paragraphs,
    prepare_conversion_html,
};
pub use error::DocMergeError;
pub use filename::OutputFormat;
pub use font::{FontRegistry, RegisteredFont};
pub use html::{ElementNode, ParsedNode, parse as parse_html, parse_with as parse_html_with};
pub use layout::{BlockStyle, Cursor, EmitterState, PageFooterSpec, PdfLayoutOptions};
pub use metrics::{PageMetrics, RenderMetrics};
pub use page_model::{MoveDirection, PAGE_DELIMITER, PageModel};
pub use pdf::PdfOptions;
pub use row::{CellValue, Row, column_headers, rows_from_json};
pub use style::{InlineStyle, StyleCapabilities, StyleCapability, TextAlign};
pub use types::{Color, Margins, Orientation, PageFormat, Pt, Size};
pub use variables::{TemplateValidation, extract_variables, substitute, validate_template};

use debug::DebugLogger;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

/// Configured renderer. Immutable after `build()`; share it freely.
pub struct DocMerge {
    font_registry: Arc<FontRegistry>,
    layout: PdfLayoutOptions,
    docx: DocxOptions,
    resolver: ImageResolver,
    pdf_options: PdfOptions,
    debug: Option<Arc<DebugLogger>>,
}

pub struct DocMergeBuilder {
    page_format: PageFormat,
    orientation: Orientation,
    page_size: Option<Size>,
    margins: Margins,
    docx_margins: Margins,
    font_size: Pt,
    line_height: f32,
    image_max_height: Pt,
    jpeg_quality: u8,
    max_image_px: (u32, u32),
    image_base_dir: Option<PathBuf>,
    capabilities: StyleCapabilities,
    font_files: Vec<PathBuf>,
    font_family: Option<String>,
    footer: Option<PageFooterSpec>,
    title: Option<String>,
    debug_path: Option<PathBuf>,
}

impl DocMerge {
    pub fn builder() -> DocMergeBuilder {
        DocMergeBuilder::new()
    }

    pub fn page_size(&self) -> Size {
        self.layout.page_size
    }

    pub fn fonts(&self) -> &FontRegistry {
        &self.font_registry
    }

    /// Substitute the row into every template page.
    pub fn fill_pages(&self, pages: &[String], row: &Row) -> Vec<String> {
        pages.iter().map(|page| substitute(page, row)).collect()
    }

    /// Rasterize every image the filled pages reference.
    pub fn resolve_images(&self, filled: &[String]) -> ImageCache {
        let mut sources = Vec::new();
        for page in filled {
            let nodes = html::parse_with(page, self.layout.capabilities);
            for source in collect_image_sources(&nodes) {
                if !sources.contains(&source) {
                    sources.push(source);
                }
            }
        }
        self.resolver.resolve(&sources)
    }

    /// Lay out one row without serializing it.
    pub fn layout(&self, pages: &[String], row: &Row) -> (Document, RenderMetrics) {
        let filled = self.fill_pages(pages, row);
        let images = self.resolve_images(&filled);
        let (document, metrics) = layout::layout_document(
            &filled,
            &self.layout,
            &self.font_registry,
            &images,
            self.debug.as_deref(),
        );
        self.record_metrics(&metrics);
        (document, metrics)
    }

    pub fn render_pdf(&self, pages: &[String], row: &Row) -> Result<Vec<u8>, DocMergeError> {
        self.render_pdf_with_metrics(pages, row).map(|(bytes, _)| bytes)
    }

    pub fn render_pdf_with_metrics(
        &self,
        pages: &[String],
        row: &Row,
    ) -> Result<(Vec<u8>, RenderMetrics), DocMergeError> {
        let (document, metrics) = self.layout(pages, row);
        let bytes = pdf::document_to_pdf(&document, &self.font_registry, &self.pdf_options)?;
        Ok((bytes, metrics))
    }

    /// Word output. Template pages are rejoined so each boundary becomes a
    /// page break paragraph.
    pub fn render_docx(&self, pages: &[String], row: &Row) -> Result<Vec<u8>, DocMergeError> {
        let filled = self.fill_pages(pages, row);
        let images = self.resolve_images(&filled);
        let joined = PageModel::from_pages(filled).join();
        let nodes = html::parse_with(&joined, self.layout.capabilities);
        let paragraphs = docx::convert(&nodes, &images);
        if let Some(debug) = &self.debug {
            debug.event(
                "docx.converted",
                json!({ "paragraphs": paragraphs.len(), "images": images.len() }),
            );
        }
        docx::pack(&paragraphs, &self.docx)
    }

    pub fn render(&self, pages: &[String], row: &Row, format: OutputFormat) -> Result<Vec<u8>, DocMergeError> {
        match format {
            OutputFormat::Pdf => self.render_pdf(pages, row),
            OutputFormat::Docx => self.render_docx(pages, row),
        }
    }

    fn record_metrics(&self, metrics: &RenderMetrics) {
        let Some(debug) = &self.debug else {
            return;
        };
        debug.increment("pages", metrics.page_count() as u64);
        debug.increment("lines", metrics.total_lines() as u64);
        debug.increment("images_drawn", metrics.images_drawn as u64);
        debug.increment("images_skipped", metrics.images_skipped as u64);
        debug.increment("node_failures", metrics.node_failures as u64);
        debug.emit_summary("render_pdf");
        debug.flush();
    }
}

impl DocMergeBuilder {
    pub fn new() -> Self {
        Self {
            page_format: PageFormat::A4,
            orientation: Orientation::Portrait,
            page_size: None,
            margins: Margins::all_mm(20.0),
            docx_margins: Margins::all_mm(25.4),
            font_size: Pt::from_f32(12.0),
            line_height: 1.5,
            image_max_height: Pt::from_mm(120.0),
            jpeg_quality: assets::DEFAULT_JPEG_QUALITY,
            max_image_px: (assets::DEFAULT_MAX_WIDTH_PX, assets::DEFAULT_MAX_HEIGHT_PX),
            image_base_dir: None,
            capabilities: StyleCapabilities::all(),
            font_files: Vec::new(),
            font_family: None,
            footer: None,
            title: None,
            debug_path: None,
        }
    }

    pub fn page_format(mut self, format: PageFormat) -> Self {
        self.page_format = format;
        self
    }

    pub fn orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    /// Explicit size; overrides `page_format` and `orientation`.
    pub fn page_size(mut self, size: Size) -> Self {
        self.page_size = Some(size);
        self
    }

    pub fn margins(mut self, margins: Margins) -> Self {
        self.margins = margins;
        self
    }

    /// Word output keeps its own margins (1 inch unless set).
    pub fn docx_margins(mut self, margins: Margins) -> Self {
        self.docx_margins = margins;
        self
    }

    pub fn font_size(mut self, size: Pt) -> Self {
        self.font_size = size;
        self
    }

    /// Line height as a multiple of the font size.
    pub fn line_height(mut self, multiplier: f32) -> Self {
        self.line_height = multiplier;
        self
    }

    pub fn image_max_height(mut self, height: Pt) -> Self {
        self.image_max_height = height;
        self
    }

    /// JPEG quality for re-encoded images, 1 to 100.
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    /// Larger images are downscaled to fit this box before embedding.
    pub fn max_image_pixels(mut self, width: u32, height: u32) -> Self {
        self.max_image_px = (width, height);
        self
    }

    /// Directory relative `src` paths resolve against.
    pub fn image_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.image_base_dir = Some(dir.into());
        self
    }

    pub fn capabilities(mut self, capabilities: StyleCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Register a TrueType font. Files that fail to load are skipped with a
    /// warning.
    pub fn font_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_files.push(path.into());
        self
    }

    pub fn font_files<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.font_files.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Default body font family. Without it the first registered font wins,
    /// then Helvetica.
    pub fn font_family(mut self, family: impl Into<String>) -> Self {
        self.font_family = Some(family.into());
        self
    }

    /// PDF footer; `{page}` and `{pages}` are filled per page.
    pub fn footer(mut self, footer: PageFooterSpec) -> Self {
        self.footer = Some(footer);
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Enable debug logging to a JSONL file for layout inspection.
    pub fn debug_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<DocMerge, DocMergeError> {
        let page_size = self
            .page_size
            .unwrap_or_else(|| self.page_format.size(self.orientation));
        let content_width = page_size.width - self.margins.left - self.margins.right;
        let content_height = page_size.height - self.margins.top - self.margins.bottom;
        if content_width <= Pt::ZERO || content_height <= Pt::ZERO {
            return Err(DocMergeError::InvalidConfiguration(
                "margins leave no content area".to_string(),
            ));
        }
        let docx_width = page_size.width - self.docx_margins.left - self.docx_margins.right;
        let docx_height = page_size.height - self.docx_margins.top - self.docx_margins.bottom;
        if docx_width <= Pt::ZERO || docx_height <= Pt::ZERO {
            return Err(DocMergeError::InvalidConfiguration(
                "docx margins leave no content area".to_string(),
            ));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(DocMergeError::InvalidConfiguration(format!(
                "jpeg quality must be within 1..=100, got {}",
                self.jpeg_quality
            )));
        }
        if !self.line_height.is_finite() || self.line_height <= 0.0 {
            return Err(DocMergeError::InvalidConfiguration(
                "line height multiplier must be > 0".to_string(),
            ));
        }
        if self.font_size <= Pt::ZERO {
            return Err(DocMergeError::InvalidConfiguration(
                "font size must be > 0".to_string(),
            ));
        }
        if self.max_image_px.0 == 0 || self.max_image_px.1 == 0 {
            return Err(DocMergeError::InvalidConfiguration(
                "max image pixels must be > 0".to_string(),
            ));
        }

        let mut registry = FontRegistry::new();
        for file in &self.font_files {
            if let Err(err) = registry.register_file(file) {
                log::warn!("font {} not loaded, falling back to {}: {}", file.display(), font::DEFAULT_FONT, err);
            }
        }
        let font_family = self
            .font_family
            .or_else(|| registry.fonts().first().map(|font| font.family.clone()));

        let mut resolver = ImageResolver::new()
            .max_size(self.max_image_px.0, self.max_image_px.1)
            .quality(self.jpeg_quality);
        if let Some(dir) = self.image_base_dir {
            resolver = resolver.base_dir(dir);
        }

        let docx_footer = self
            .footer
            .as_ref()
            .map(|footer| static_footer_text(&footer.text))
            .filter(|text| !text.is_empty());
        let layout = PdfLayoutOptions {
            page_size,
            margins: self.margins,
            font_family: font_family.clone(),
            font_size: self.font_size,
            line_height: self.line_height,
            image_max_height: self.image_max_height,
            capabilities: self.capabilities,
            footer: self.footer,
        };
        let docx = DocxOptions {
            page_size,
            margins: self.docx_margins,
            font_size: self.font_size,
            font_family,
            footer_text: docx_footer,
        };
        let pdf_options = PdfOptions {
            title: self.title,
            ..PdfOptions::default()
        };
        let debug = if let Some(path) = self.debug_path {
            Some(Arc::new(DebugLogger::new(path)?))
        } else {
            None
        };
        Ok(DocMerge {
            font_registry: Arc::new(registry),
            layout,
            docx,
            resolver,
            pdf_options,
            debug,
        })
    }
}

impl Default for DocMergeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// Word footers are static text; page tokens are dropped.
fn static_footer_text(text: &str) -> String {
    text.replace("{pages}", "")
        .replace("{page}", "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn engine_is_shareable() {
        assert_send_sync::<DocMerge>();
    }

    #[test]
    fn build_rejects_margins_that_consume_the_page() {
        let result = DocMerge::builder().margins(Margins::all_mm(150.0)).build();
        assert!(matches!(result, Err(DocMergeError::InvalidConfiguration(_))));
    }

    #[test]
    fn build_rejects_bad_quality_and_line_height() {
        assert!(matches!(
            DocMerge::builder().jpeg_quality(0).build(),
            Err(DocMergeError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            DocMerge::builder().line_height(0.0).build(),
            Err(DocMergeError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn missing_font_files_fall_back() {
        let engine = DocMerge::builder()
            .font_file("/nonexistent/font.ttf")
            .build()
            .expect("build");
        assert!(engine.fonts().is_empty());
    }

    #[test]
    fn orientation_swaps_page_size() {
        let engine = DocMerge::builder()
            .page_format(PageFormat::Letter)
            .orientation(Orientation::Landscape)
            .build()
            .expect("build");
        assert_eq!(engine.page_size(), Size::letter().landscape());
    }

    #[test]
    fn fill_pages_substitutes_each_page() {
        let engine = DocMerge::builder().build().expect("build");
        let row = Row::new().with("Name", "Ada");
        let filled = engine.fill_pages(&["<p>{Name}</p>".to_string(), "<p>{Other}</p>".to_string()], &row);
        assert_eq!(filled, vec!["<p>Ada</p>", "<p>{Other}</p>"]);
    }

    #[test]
    fn render_dispatches_on_format() {
        let engine = DocMerge::builder().build().expect("build");
        let pages = vec!["<p>Hello {Name}</p>".to_string()];
        let row = Row::new().with("Name", "Ada");
        let pdf = engine.render(&pages, &row, OutputFormat::Pdf).expect("pdf");
        assert!(pdf.starts_with(b"%PDF-"));
        let docx = engine.render(&pages, &row, OutputFormat::Docx).expect("docx");
        assert!(docx.starts_with(b"PK"));
    }

    #[test]
    fn debug_log_records_render_summary() {
        let dir = std::env::temp_dir().join(format!("docmerge-debug-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("dir");
        let path = dir.join("trace.jsonl");
        let engine = DocMerge::builder().debug_log(&path).build().expect("build");
        engine.layout(&["<p>One</p>".to_string()], &Row::new());
        let trace = std::fs::read_to_string(&path).expect("trace");
        assert!(trace.contains("\"debug.summary\""));
        assert!(trace.contains("\"render_pdf\""));
    }

    #[test]
    fn word_footer_drops_page_tokens() {
        assert_eq!(static_footer_text("Page {page} of {pages}"), "Page of");
        assert_eq!(static_footer_text("{page}"), "");
    }
}
