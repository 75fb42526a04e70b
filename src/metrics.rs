use crate::types::Pt;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PageMetrics {
    pub page_number: usize,
    pub lines: usize,
    pub images: usize,
    /// Lowest bottom edge of any drawn text line, in points from the page top.
    pub max_text_bottom: Option<f32>,
}

/// Counters collected while laying out one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RenderMetrics {
    pub pages: Vec<PageMetrics>,
    /// New pages started at template page boundaries.
    pub boundary_breaks: usize,
    /// New pages started because content reached the bottom margin.
    pub overflow_breaks: usize,
    pub images_drawn: usize,
    pub images_skipped: usize,
    pub node_failures: usize,
}

impl RenderMetrics {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn total_lines(&self) -> usize {
        self.pages.iter().map(|page| page.lines).sum()
    }

    pub(crate) fn open_page(&mut self) {
        let page_number = self.pages.len() + 1;
        self.pages.push(PageMetrics {
            page_number,
            ..PageMetrics::default()
        });
    }

    pub(crate) fn record_line(&mut self, bottom: Pt) {
        if let Some(page) = self.pages.last_mut() {
            page.lines += 1;
            let bottom = bottom.to_f32();
            page.max_text_bottom = Some(page.max_text_bottom.map_or(bottom, |b| b.max(bottom)));
        }
    }

    pub(crate) fn record_image(&mut self) {
        self.images_drawn += 1;
        if let Some(page) = self.pages.last_mut() {
            page.images += 1;
        }
    }
}
