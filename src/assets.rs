use crate::html::ParsedNode;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_MAX_WIDTH_PX: u32 = 800;
pub const DEFAULT_MAX_HEIGHT_PX: u32 = 600;
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// A rasterized image ready for either emitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedImage {
    pub jpeg: Vec<u8>,
    /// Pixel dimensions after downscaling.
    pub width: u32,
    pub height: u32,
}

impl CachedImage {
    pub fn data_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.jpeg)
    }

    pub fn data_uri(&self) -> String {
        format!("data:image/jpeg;base64,{}", self.data_base64())
    }
}

/// Source string to rasterized image, scoped to one generation call.
#[derive(Debug, Clone, Default)]
pub struct ImageCache {
    entries: HashMap<String, CachedImage>,
}

impl ImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, source: &str) -> Option<&CachedImage> {
        self.entries.get(source)
    }

    pub fn insert(&mut self, source: impl Into<String>, image: CachedImage) {
        self.entries.insert(source.into(), image);
    }

    pub fn contains(&self, source: &str) -> bool {
        self.entries.contains_key(source)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ImageResolver {
    max_width: u32,
    max_height: u32,
    quality: u8,
    base_dir: Option<PathBuf>,
}

impl Default for ImageResolver {
    fn default() -> Self {
        Self {
            max_width: DEFAULT_MAX_WIDTH_PX,
            max_height: DEFAULT_MAX_HEIGHT_PX,
            quality: DEFAULT_JPEG_QUALITY,
            base_dir: None,
        }
    }
}

impl ImageResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_size(mut self, width: u32, height: u32) -> Self {
        self.max_width = width.max(1);
        self.max_height = height.max(1);
        self
    }

    pub fn quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(1, 100);
        self
    }

    /// Directory relative paths are resolved against.
    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Resolve every source. Failures leave no entry and never error.
    pub fn resolve<I, S>(&self, sources: I) -> ImageCache
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut cache = ImageCache::new();
        for source in sources {
            let source = source.as_ref();
            if source.is_empty() || cache.contains(source) {
                continue;
            }
            match self.rasterize(source) {
                Some(image) => cache.insert(source, image),
                None => log::debug!("image source skipped: {}", abbreviate(source)),
            }
        }
        cache
    }

    fn rasterize(&self, source: &str) -> Option<CachedImage> {
        let bytes = self.load_bytes(source)?;
        let decoded = image::load_from_memory(&bytes).ok()?;
        let (width, height) = decoded.dimensions();
        if width == 0 || height == 0 {
            return None;
        }
        let fitted = if width > self.max_width || height > self.max_height {
            decoded.resize(self.max_width, self.max_height, FilterType::Triangle)
        } else {
            decoded
        };
        let (width, height) = fitted.dimensions();
        let mut canvas = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));
        image::imageops::overlay(&mut canvas, &fitted.to_rgba8(), 0, 0);
        let rgb = DynamicImage::ImageRgba8(canvas).to_rgb8();

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, self.quality)
            .encode_image(&rgb)
            .ok()?;
        Some(CachedImage {
            jpeg,
            width,
            height,
        })
    }

    fn load_bytes(&self, source: &str) -> Option<Vec<u8>> {
        if source.starts_with("data:") {
            return parse_data_uri_bytes(source);
        }
        let lower = source.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("//") {
            // Remote fetching belongs to the caller.
            return None;
        }
        let raw = source.strip_prefix("file://").unwrap_or(source);
        let path = Path::new(raw);
        let path = match (&self.base_dir, path.is_relative()) {
            (Some(base), true) => base.join(path),
            _ => path.to_path_buf(),
        };
        std::fs::read(path).ok()
    }
}

fn parse_data_uri_bytes(uri: &str) -> Option<Vec<u8>> {
    let (header, payload) = uri.strip_prefix("data:")?.split_once(',')?;
    if header.to_ascii_lowercase().contains(";base64") {
        let compact: String = payload.chars().filter(|ch| !ch.is_whitespace()).collect();
        return base64::engine::general_purpose::STANDARD
            .decode(compact.as_bytes())
            .ok();
    }
    Some(decode_percent_encoded_bytes(payload))
}

fn decode_percent_encoded_bytes(raw: &str) -> Vec<u8> {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut idx = 0;
    while idx < bytes.len() {
        if bytes[idx] == b'%' && idx + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[idx + 1..idx + 3]).ok();
            if let Some(value) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(value);
                idx += 3;
                continue;
            }
        }
        out.push(bytes[idx]);
        idx += 1;
    }
    out
}

fn abbreviate(source: &str) -> String {
    if source.chars().count() <= 64 {
        return source.to_string();
    }
    let head: String = source.chars().take(61).collect();
    format!("{}...", head)
}

/// `img[src]` values in document order.
pub fn collect_image_sources(nodes: &[ParsedNode]) -> Vec<String> {
    let mut out = Vec::new();
    for node in nodes {
        collect_into(node, &mut out);
    }
    out
}

fn collect_into(node: &ParsedNode, out: &mut Vec<String>) {
    let ParsedNode::Element(element) = node else {
        return;
    };
    if element.tag == "img" {
        if let Some(src) = element.attr("src").map(str::trim).filter(|s| !s.is_empty()) {
            if !out.iter().any(|seen| seen == src) {
                out.push(src.to_string());
            }
        }
    }
    for child in &element.children {
        collect_into(child, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageFormat;
    use std::io::Cursor;

    fn png_data_uri(width: u32, height: u32, pixel: [u8; 4]) -> String {
        let img = RgbaImage::from_pixel(width, height, Rgba(pixel));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .expect("png");
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(buf)
        )
    }

    #[test]
    fn resolves_data_uri_to_jpeg() {
        let src = png_data_uri(10, 4, [255, 0, 0, 255]);
        let cache = ImageResolver::new().resolve([src.as_str()]);
        let entry = cache.get(&src).expect("entry");
        assert_eq!((entry.width, entry.height), (10, 4));
        assert_eq!(&entry.jpeg[..2], &[0xFF, 0xD8]);
        assert!(entry.data_uri().starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn large_images_are_downscaled_keeping_aspect() {
        let src = png_data_uri(1600, 400, [0, 0, 255, 255]);
        let cache = ImageResolver::new().resolve([src.as_str()]);
        let entry = cache.get(&src).expect("entry");
        assert_eq!(entry.width, 800);
        assert_eq!(entry.height, 200);
    }

    #[test]
    fn transparent_pixels_flatten_to_white() {
        let src = png_data_uri(8, 8, [0, 0, 0, 0]);
        let cache = ImageResolver::new().resolve([src.as_str()]);
        let entry = cache.get(&src).expect("entry");
        let decoded = image::load_from_memory(&entry.jpeg).expect("jpeg").to_rgb8();
        assert!(decoded.pixels().all(|p| p.0.iter().all(|c| *c > 240)));
    }

    #[test]
    fn failures_leave_no_entry() {
        let cache = ImageResolver::new().resolve([
            "data:image/png;base64,not-base64!",
            "https://example.com/a.png",
            "/definitely/missing/file.png",
            "",
        ]);
        assert!(cache.is_empty());
    }

    #[test]
    fn percent_encoded_payloads_decode() {
        assert_eq!(decode_percent_encoded_bytes("a%20b%zz%4"), b"a b%zz%4".to_vec());
    }

    #[test]
    fn collects_sources_in_order_without_repeats() {
        let nodes = crate::html::parse(
            r#"<p><img src="b.png"></p><div><img src="a.png"><img src="b.png"><img></div>"#,
        );
        assert_eq!(collect_image_sources(&nodes), vec!["b.png", "a.png"]);
    }
}
