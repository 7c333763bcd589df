//! Page rendering for multimodal correction, behind a content-addressed LRU.
//!
//! Scanned documents carry too little text for text-only correction, so the
//! orchestrator sends rendered page images instead. Rendering is expensive
//! and correction runs per field group, so encoded pages are cached keyed by
//! the SHA-256 of the document bytes. Render failures degrade to an empty
//! image list — the orchestrator falls back to text-only correction.
//!
//! `PdfiumPageRenderer` is stateless (`Send + Sync`). Each operation creates
//! a fresh `Pdfium` instance because the upstream type is `!Send`. The OS
//! caches `dlopen` calls, so repeat loads are near-free.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Mutex;

use image::ImageOutputFormat;
use pdfium_render::prelude::*;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::config::RenderSettings;

/// Maximum dimension (width or height) for rendered page images.
/// Prevents OOM on extremely large pages or absurd DPI settings.
const MAX_DIMENSION_PX: u32 = 4096;

/// PDF points per inch (standard PDF unit).
const POINTS_PER_INCH: f32 = 72.0;

const JPEG_QUALITY: u8 = 85;

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// Which pages of a document to render for correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSelection {
    First,
    Last,
    Middle,
    /// Every page, up to the configured page cap.
    All,
}

/// Encoding of rendered page images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
        }
    }
}

/// One rendered, encoded page.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
    /// 0-based page index within the source document.
    pub page_number: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("PDF engine unavailable: {0}")]
    EngineUnavailable(String),
    #[error("PDF is password-protected")]
    Encrypted,
    #[error("Failed to render page {page}: {reason}")]
    PageRendering { page: usize, reason: String },
    #[error("Image encoding failed: {0}")]
    Encoding(String),
}

/// Renders one page of a PDF to an encoded image.
pub trait PdfPageRenderer: Send + Sync {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, RenderError>;

    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_number: usize,
        dpi: u32,
        format: ImageFormat,
    ) -> Result<Vec<u8>, RenderError>;
}

// ═══════════════════════════════════════════════════════════
// Page selection
// ═══════════════════════════════════════════════════════════

/// Resolve a selection strategy to concrete 0-based page indices,
/// never exceeding `max_pages`.
pub fn select_pages(selection: PageSelection, page_count: usize, max_pages: usize) -> Vec<usize> {
    if page_count == 0 || max_pages == 0 {
        return Vec::new();
    }
    match selection {
        PageSelection::First => vec![0],
        PageSelection::Last => vec![page_count - 1],
        PageSelection::Middle => vec![page_count / 2],
        PageSelection::All => (0..page_count.min(max_pages)).collect(),
    }
}

// ═══════════════════════════════════════════════════════════
// Cache
// ═══════════════════════════════════════════════════════════

/// Content-addressed LRU of rendered documents.
///
/// Keys are the SHA-256 of the document bytes, so re-submitting identical
/// content hits the cache regardless of filename. Failed renders are never
/// cached: a transient engine problem must not pin an empty result.
pub struct ImageRenderCache {
    renderer: Box<dyn PdfPageRenderer>,
    settings: RenderSettings,
    inner: Mutex<CacheInner>,
}

struct CacheInner {
    entries: HashMap<String, (Vec<EncodedImage>, u64)>,
    tick: u64,
}

impl ImageRenderCache {
    pub fn new(renderer: Box<dyn PdfPageRenderer>, settings: RenderSettings) -> Self {
        Self {
            renderer,
            settings,
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                tick: 0,
            }),
        }
    }

    /// Rendered pages for a document, from cache when possible.
    ///
    /// Returns an empty list when the document cannot be rendered; callers
    /// treat that as "no images available" and fall back to text.
    pub fn render_document(&self, pdf_bytes: &[u8]) -> Vec<EncodedImage> {
        let key = content_hash(pdf_bytes);

        if let Ok(mut inner) = self.inner.lock() {
            inner.tick += 1;
            let tick = inner.tick;
            if let Some((images, recency)) = inner.entries.get_mut(&key) {
                *recency = tick;
                debug!(key = %&key[..12], pages = images.len(), "Render cache hit");
                return images.clone();
            }
        }

        let images = match self.render_uncached(pdf_bytes) {
            Ok(images) => images,
            Err(e) => {
                warn!(error = %e, "Page rendering failed, continuing without images");
                return Vec::new();
            }
        };

        if !images.is_empty() {
            if let Ok(mut inner) = self.inner.lock() {
                inner.tick += 1;
                let tick = inner.tick;
                if inner.entries.len() >= self.settings.cache_capacity.max(1) {
                    evict_least_recent(&mut inner.entries);
                }
                inner.entries.insert(key, (images.clone(), tick));
            }
        }
        images
    }

    fn render_uncached(&self, pdf_bytes: &[u8]) -> Result<Vec<EncodedImage>, RenderError> {
        let page_count = self.renderer.page_count(pdf_bytes)?;
        let pages = select_pages(
            self.settings.page_selection,
            page_count,
            self.settings.max_pages,
        );

        let mut images = Vec::with_capacity(pages.len());
        for page_number in pages {
            let bytes = self.renderer.render_page(
                pdf_bytes,
                page_number,
                self.settings.dpi,
                self.settings.format,
            )?;
            images.push(EncodedImage {
                bytes,
                format: self.settings.format,
                page_number,
            });
        }
        debug!(pages = images.len(), "Rendered document pages");
        Ok(images)
    }

    #[cfg(test)]
    fn cached_documents(&self) -> usize {
        self.inner.lock().map(|i| i.entries.len()).unwrap_or(0)
    }
}

fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn evict_least_recent(entries: &mut HashMap<String, (Vec<EncodedImage>, u64)>) {
    if let Some(oldest) = entries
        .iter()
        .min_by_key(|(_, (_, recency))| *recency)
        .map(|(key, _)| key.clone())
    {
        entries.remove(&oldest);
    }
}

// ═══════════════════════════════════════════════════════════
// PDFium renderer
// ═══════════════════════════════════════════════════════════

/// Production renderer backed by Google PDFium.
///
/// PDFium handles the PDF complexities that break lighter parsers: CIDFont
/// encodings, embedded fonts, form fields, transparency, layers.
pub struct PdfiumPageRenderer;

impl PdfiumPageRenderer {
    /// Create a renderer, verifying the PDFium library is loadable.
    pub fn new() -> Result<Self, RenderError> {
        let _ = load_pdfium()?;
        Ok(Self)
    }
}

/// Load the PDFium dynamic library: `PDFIUM_DYNAMIC_LIB_PATH` env var first,
/// then alongside the executable, then system library paths.
fn load_pdfium() -> Result<Pdfium, RenderError> {
    if let Ok(path) = std::env::var("PDFIUM_DYNAMIC_LIB_PATH") {
        debug!(path = %path, "Loading PDFium from env var");
        let bindings = Pdfium::bind_to_library(&path).map_err(|e| {
            RenderError::EngineUnavailable(format!("Failed to load PDFium from {path}: {e}"))
        })?;
        return Ok(Pdfium::new(bindings));
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(exe_dir) = exe.parent() {
            let lib_path =
                Pdfium::pdfium_platform_library_name_at_path(exe_dir.to_string_lossy().as_ref());
            if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
                debug!(dir = %exe_dir.display(), "Loaded PDFium from executable directory");
                return Ok(Pdfium::new(bindings));
            }
        }
    }

    let bindings = Pdfium::bind_to_system_library().map_err(|e| {
        RenderError::EngineUnavailable(format!(
            "PDFium library not found. Set PDFIUM_DYNAMIC_LIB_PATH or install PDFium: {e}"
        ))
    })?;
    Ok(Pdfium::new(bindings))
}

fn map_load_error(e: PdfiumError) -> RenderError {
    let msg = format!("{e}").to_lowercase();
    if msg.contains("password") || msg.contains("encrypt") {
        RenderError::Encrypted
    } else {
        RenderError::PageRendering {
            page: 0,
            reason: format!("Failed to load PDF: {e}"),
        }
    }
}

/// Pixel dimensions for rendering, clamped to [1, MAX_DIMENSION_PX] with
/// aspect ratio preserved when capping.
fn compute_render_dimensions(width_points: f32, height_points: f32, dpi: u32) -> (u32, u32) {
    let scale = dpi as f32 / POINTS_PER_INCH;
    let raw_w = (width_points * scale).max(1.0);
    let raw_h = (height_points * scale).max(1.0);

    let max_dim = raw_w.max(raw_h);
    if max_dim > MAX_DIMENSION_PX as f32 {
        let ratio = MAX_DIMENSION_PX as f32 / max_dim;
        let w = ((raw_w * ratio) as u32).clamp(1, MAX_DIMENSION_PX);
        let h = ((raw_h * ratio) as u32).clamp(1, MAX_DIMENSION_PX);
        (w, h)
    } else {
        (raw_w as u32, raw_h as u32)
    }
}

impl PdfPageRenderer for PdfiumPageRenderer {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, RenderError> {
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(map_load_error)?;
        Ok(document.pages().len() as usize)
    }

    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_number: usize,
        dpi: u32,
        format: ImageFormat,
    ) -> Result<Vec<u8>, RenderError> {
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(map_load_error)?;

        let pages = document.pages();
        let page_index =
            u16::try_from(page_number).map_err(|_| RenderError::PageRendering {
                page: page_number,
                reason: format!("Page index {page_number} exceeds u16 maximum"),
            })?;
        let page = pages.get(page_index).map_err(|_| RenderError::PageRendering {
            page: page_number,
            reason: format!(
                "Page {page_number} out of range (document has {} pages)",
                pages.len()
            ),
        })?;

        let (target_w, target_h) =
            compute_render_dimensions(page.width().value, page.height().value, dpi);

        let config = PdfRenderConfig::new()
            .set_target_width(target_w as i32)
            .set_maximum_height(target_h as i32);

        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| RenderError::PageRendering {
                page: page_number,
                reason: format!("Rendering failed: {e}"),
            })?;

        let output_format = match format {
            ImageFormat::Png => ImageOutputFormat::Png,
            ImageFormat::Jpeg => ImageOutputFormat::Jpeg(JPEG_QUALITY),
        };

        let mut cursor = Cursor::new(Vec::new());
        bitmap
            .as_image()
            .write_to(&mut cursor, output_format)
            .map_err(|e| RenderError::Encoding(format!("{e}")))?;

        let bytes = cursor.into_inner();
        debug!(
            page = page_number,
            width = target_w,
            height = target_h,
            size = bytes.len(),
            "Rendered PDF page"
        );
        Ok(bytes)
    }
}

// ── Mock for testing ──────────────────────────────────────

/// Mock page renderer returning a minimal PNG for each valid page.
///
/// Used by orchestrator and processor tests that need a `PdfPageRenderer`
/// without the actual PDFium binary.
pub struct MockPageRenderer {
    page_count: usize,
    fail: bool,
}

impl MockPageRenderer {
    pub fn new(page_count: usize) -> Self {
        Self {
            page_count,
            fail: false,
        }
    }

    /// A renderer whose every operation fails.
    pub fn failing() -> Self {
        Self {
            page_count: 0,
            fail: true,
        }
    }
}

impl PdfPageRenderer for MockPageRenderer {
    fn page_count(&self, _pdf_bytes: &[u8]) -> Result<usize, RenderError> {
        if self.fail {
            return Err(RenderError::EngineUnavailable("mock failure".into()));
        }
        Ok(self.page_count)
    }

    fn render_page(
        &self,
        _pdf_bytes: &[u8],
        page_number: usize,
        _dpi: u32,
        _format: ImageFormat,
    ) -> Result<Vec<u8>, RenderError> {
        if self.fail || page_number >= self.page_count {
            return Err(RenderError::PageRendering {
                page: page_number,
                reason: format!("Page {page_number} out of range (mock has {} pages)", self.page_count),
            });
        }
        Ok(minimal_png())
    }
}

/// Minimal valid 1x1 white pixel PNG for mock testing.
pub fn minimal_png() -> Vec<u8> {
    vec![
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, // PNG signature
        0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52, // IHDR chunk
        0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, // 1x1
        0x08, 0x02, 0x00, 0x00, 0x00, 0x90, 0x77, 0x53, // 8-bit RGB
        0xDE, // IHDR CRC
        0x00, 0x00, 0x00, 0x0C, 0x49, 0x44, 0x41, 0x54, // IDAT chunk
        0x08, 0xD7, 0x63, 0xF8, 0xCF, 0xC0, 0x00, 0x00, // compressed
        0x00, 0x02, 0x00, 0x01, 0xE2, 0x21, 0xBC, 0x33, // IDAT CRC
        0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, // IEND chunk
        0xAE, 0x42, 0x60, 0x82, // IEND CRC
    ]
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(capacity: usize, max_pages: usize) -> RenderSettings {
        RenderSettings {
            page_selection: PageSelection::All,
            max_pages,
            format: ImageFormat::Png,
            dpi: 150,
            cache_capacity: capacity,
        }
    }

    #[test]
    fn page_selection_strategies() {
        assert_eq!(select_pages(PageSelection::First, 5, 4), vec![0]);
        assert_eq!(select_pages(PageSelection::Last, 5, 4), vec![4]);
        assert_eq!(select_pages(PageSelection::Middle, 5, 4), vec![2]);
        assert_eq!(select_pages(PageSelection::All, 3, 4), vec![0, 1, 2]);
    }

    #[test]
    fn all_selection_bounded_by_max_pages() {
        assert_eq!(select_pages(PageSelection::All, 10, 4), vec![0, 1, 2, 3]);
    }

    #[test]
    fn empty_document_selects_nothing() {
        assert!(select_pages(PageSelection::All, 0, 4).is_empty());
        assert!(select_pages(PageSelection::First, 0, 4).is_empty());
    }

    #[test]
    fn renders_and_caches_by_content() {
        let cache = ImageRenderCache::new(Box::new(MockPageRenderer::new(2)), settings(4, 4));
        let first = cache.render_document(b"doc-a");
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].page_number, 0);
        assert_eq!(first[0].format, ImageFormat::Png);

        let second = cache.render_document(b"doc-a");
        assert_eq!(second.len(), 2);
        assert_eq!(cache.cached_documents(), 1);

        cache.render_document(b"doc-b");
        assert_eq!(cache.cached_documents(), 2);
    }

    #[test]
    fn capacity_evicts_least_recent() {
        let cache = ImageRenderCache::new(Box::new(MockPageRenderer::new(1)), settings(2, 4));
        cache.render_document(b"doc-a");
        cache.render_document(b"doc-b");
        // Touch a so b becomes the eviction candidate.
        cache.render_document(b"doc-a");
        cache.render_document(b"doc-c");
        assert_eq!(cache.cached_documents(), 2);

        // a must still be cached: re-rendering it must not grow the map.
        cache.render_document(b"doc-a");
        assert_eq!(cache.cached_documents(), 2);
    }

    #[test]
    fn render_failure_degrades_to_empty_and_is_not_cached() {
        let cache = ImageRenderCache::new(Box::new(MockPageRenderer::failing()), settings(4, 4));
        assert!(cache.render_document(b"doc").is_empty());
        assert_eq!(cache.cached_documents(), 0);
    }

    #[test]
    fn zero_page_document_not_cached() {
        let cache = ImageRenderCache::new(Box::new(MockPageRenderer::new(0)), settings(4, 4));
        assert!(cache.render_document(b"doc").is_empty());
        assert_eq!(cache.cached_documents(), 0);
    }

    #[test]
    fn dimension_guard_caps_oversized() {
        let (w, h) = compute_render_dimensions(5000.0, 7000.0, 200);
        assert!(w <= MAX_DIMENSION_PX);
        assert!(h <= MAX_DIMENSION_PX);
        assert!(w >= 1 && h >= 1);
    }

    #[test]
    fn dimension_guard_preserves_aspect_ratio() {
        let (w, h) = compute_render_dimensions(5000.0, 10000.0, 200);
        let ratio = h as f32 / w as f32;
        assert!((ratio - 2.0).abs() < 0.15, "aspect ratio drifted: {ratio}");
    }

    #[test]
    fn letter_page_at_150dpi() {
        // US Letter = 612 x 792 points
        let (w, h) = compute_render_dimensions(612.0, 792.0, 150);
        assert!(w > 1250 && w < 1300, "got {w}");
        assert!(h > 1620 && h < 1680, "got {h}");
    }

    #[test]
    fn mime_types() {
        assert_eq!(ImageFormat::Png.mime_type(), "image/png");
        assert_eq!(ImageFormat::Jpeg.mime_type(), "image/jpeg");
    }

    #[test]
    fn minimal_png_has_valid_signature() {
        let png = minimal_png();
        assert_eq!(&png[..8], &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]);
    }
}
