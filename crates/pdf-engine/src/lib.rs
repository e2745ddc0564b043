//! Source document loading and PDF assembly
//!
//! Two narrow seams the editor core talks through:
//! - [`SourceLoader`]: open a document from bytes, report page geometry and
//!   render a page raster at a scale.
//! - [`PdfAssembler`](assemble::PdfAssembler): turn a sequence of page
//!   images (plus optional text overlays) into an output PDF.
//!
//! [`default_engine`] renders through PDFium when the `pdfium` feature is
//! enabled and the library can be bound, and through the built-in
//! [`LopdfEngine`] otherwise.

pub mod assemble;
mod content;

pub use assemble::{
    build_blank_document, build_document, AssemblyError, LopdfAssembler, PageImage, PdfAssembler,
    TextOverlay,
};
pub use content::ContentGap;

use image::{ImageBuffer, Rgba};
use lopdf::{Document, Object, ObjectId};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub type RgbaImage = ImageBuffer<Rgba<u8>, Vec<u8>>;

/// Letter size, used when a page carries no readable MediaBox
const FALLBACK_PAGE_SIZE: PageSize = PageSize {
    width_pt: 612.0,
    height_pt: 792.0,
    rotation: 0,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentHandle(u64);

impl DocumentHandle {
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Physical page geometry as stored in the source document
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    /// MediaBox width in points
    pub width_pt: f32,
    /// MediaBox height in points
    pub height_pt: f32,
    /// Clockwise display rotation in degrees (0, 90, 180 or 270)
    pub rotation: u16,
}

impl PageSize {
    /// Size of the page as displayed, i.e. after applying `rotation`
    pub fn displayed(&self) -> (f32, f32) {
        if self.rotation % 180 == 90 {
            (self.height_pt, self.width_pt)
        } else {
            (self.width_pt, self.height_pt)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    pub page_index: u32,
    /// Pixels per point
    pub scale: f32,
}

impl Default for RenderRequest {
    fn default() -> Self {
        Self { page_index: 0, scale: 1.0 }
    }
}

#[derive(Debug, Clone)]
pub enum OpenSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl From<PathBuf> for OpenSource {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl From<&Path> for OpenSource {
    fn from(value: &Path) -> Self {
        Self::Path(value.to_path_buf())
    }
}

impl From<Vec<u8>> for OpenSource {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("invalid handle {0}")]
    InvalidHandle(u64),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("encrypted PDFs are not supported in the default backend")]
    EncryptedUnsupported,
    #[error("document has no pages")]
    NoPages,
    #[error("backend error: {0}")]
    Backend(String),
}

/// Loader for the source document being annotated
pub trait SourceLoader {
    fn open(&mut self, source: OpenSource) -> Result<DocumentHandle, EngineError>;
    fn page_count(&self, handle: DocumentHandle) -> Result<u32, EngineError>;
    fn page_size(&self, handle: DocumentHandle, page_index: u32)
        -> Result<PageSize, EngineError>;
    /// Render a page, rotation applied, at `request.scale` pixels per point
    fn render_page(
        &self,
        handle: DocumentHandle,
        request: RenderRequest,
    ) -> Result<RgbaImage, EngineError>;
    /// Content of a page that [`render_page`](Self::render_page) leaves
    /// out; empty for backends that draw everything
    fn content_gaps(
        &self,
        handle: DocumentHandle,
        page_index: u32,
    ) -> Result<Vec<ContentGap>, EngineError> {
        self.page_size(handle, page_index).map(|_| Vec::new())
    }
    fn close(&mut self, handle: DocumentHandle) -> Result<(), EngineError>;
}

#[derive(Debug)]
struct DocumentRecord {
    document: Document,
    pages: Vec<content::PageEntry>,
}

impl DocumentRecord {
    fn page(&self, page_index: u32) -> Result<&content::PageEntry, EngineError> {
        self.pages.get(page_index as usize).ok_or(EngineError::PageOutOfRange {
            page: page_index,
            page_count: self.pages.len() as u32,
        })
    }
}

/// Pure-Rust loader backed by lopdf
///
/// Reads page geometry from the document structure and rasterizes the
/// vector subset of each page with tiny-skia. Text, shadings and a few
/// image encodings are left out and reported through
/// [`SourceLoader::content_gaps`]; full fidelity needs the `pdfium` backend.
#[derive(Debug, Default)]
pub struct LopdfEngine {
    next_handle: u64,
    docs: HashMap<DocumentHandle, DocumentRecord>,
}

impl LopdfEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn parse(bytes: &[u8]) -> Result<DocumentRecord, EngineError> {
        if bytes.windows("/Encrypt".len()).any(|window| window == b"/Encrypt") {
            return Err(EngineError::EncryptedUnsupported);
        }

        let document = Document::load_mem(bytes)?;
        let page_ids = document.get_pages();
        let mut pages = Vec::with_capacity(page_ids.len());

        for (_, object_id) in page_ids {
            let media_box = inherited(&document, object_id, b"MediaBox")
                .and_then(|obj| obj.as_array().ok())
                .and_then(|array| {
                    if array.len() != 4 {
                        return None;
                    }
                    let x0 = number(&array[0])?;
                    let y0 = number(&array[1])?;
                    let x1 = number(&array[2])?;
                    let y1 = number(&array[3])?;
                    Some([x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1)])
                });

            let rotation = inherited(&document, object_id, b"Rotate")
                .and_then(|obj| obj.as_i64().ok())
                .map(|degrees| degrees.rem_euclid(360) as u16)
                .filter(|degrees| degrees % 90 == 0)
                .unwrap_or(0);

            let media_box = media_box.unwrap_or_else(|| {
                log::warn!("page {object_id:?} has no usable MediaBox, assuming Letter");
                [0.0, 0.0, FALLBACK_PAGE_SIZE.width_pt, FALLBACK_PAGE_SIZE.height_pt]
            });
            let [x0, y0, x1, y1] = media_box;
            pages.push(content::PageEntry {
                id: object_id,
                media_box,
                size: PageSize { width_pt: x1 - x0, height_pt: y1 - y0, rotation },
            });
        }

        if pages.is_empty() {
            return Err(EngineError::NoPages);
        }

        Ok(DocumentRecord { document, pages })
    }

    fn record(&self, handle: DocumentHandle) -> Result<&DocumentRecord, EngineError> {
        self.docs.get(&handle).ok_or(EngineError::InvalidHandle(handle.raw()))
    }
}

/// Look up a page attribute, walking up the page tree for inheritable keys
pub(crate) fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    // Page trees deeper than this are malformed
    for _ in 0..32 {
        if let Ok(value) = current.get(key) {
            return match value {
                Object::Reference(id) => doc.get_object(*id).ok(),
                other => Some(other),
            };
        }
        let parent = current.get(b"Parent").ok()?.as_reference().ok()?;
        current = doc.get_dictionary(parent).ok()?;
    }
    None
}

pub(crate) fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value as f32),
        _ => None,
    }
}

impl SourceLoader for LopdfEngine {
    fn open(&mut self, source: OpenSource) -> Result<DocumentHandle, EngineError> {
        let bytes = match source {
            OpenSource::Path(path) => fs::read(path)?,
            OpenSource::Bytes(bytes) => bytes,
        };

        let record = Self::parse(&bytes)?;
        log::debug!("opened source document with {} pages", record.pages.len());

        self.next_handle += 1;
        let handle = DocumentHandle(self.next_handle);
        self.docs.insert(handle, record);

        Ok(handle)
    }

    fn page_count(&self, handle: DocumentHandle) -> Result<u32, EngineError> {
        Ok(self.record(handle)?.pages.len() as u32)
    }

    fn page_size(&self, handle: DocumentHandle, page_index: u32) -> Result<PageSize, EngineError> {
        Ok(self.record(handle)?.page(page_index)?.size)
    }

    fn render_page(
        &self,
        handle: DocumentHandle,
        request: RenderRequest,
    ) -> Result<RgbaImage, EngineError> {
        let record = self.record(handle)?;
        let page = record.page(request.page_index)?;
        let scale = if request.scale.is_finite() && request.scale > 0.0 {
            request.scale
        } else {
            1.0
        };

        let (image, gaps) = content::render_page(&record.document, page, scale)?;
        if !gaps.is_empty() {
            log::debug!("page {} rendered without {gaps:?}", request.page_index + 1);
        }
        Ok(image)
    }

    fn content_gaps(
        &self,
        handle: DocumentHandle,
        page_index: u32,
    ) -> Result<Vec<ContentGap>, EngineError> {
        let record = self.record(handle)?;
        let page = record.page(page_index)?;
        Ok(content::scan_page(&record.document, page).into_iter().collect())
    }

    fn close(&mut self, handle: DocumentHandle) -> Result<(), EngineError> {
        self.docs.remove(&handle).map(|_| ()).ok_or(EngineError::InvalidHandle(handle.raw()))
    }
}

#[cfg(feature = "pdfium")]
pub mod pdfium_backend {
    //! Full-fidelity page rendering through the PDFium library

    use super::*;
    use pdfium_render::prelude::*;

    pub struct PdfiumEngine {
        pdfium: Pdfium,
        geometry: LopdfEngine,
        sources: HashMap<DocumentHandle, Vec<u8>>,
    }

    impl PdfiumEngine {
        /// Bind PDFium from the executable directory, the working directory
        /// or the system library path, in that order
        pub fn from_system_library() -> Result<Self, EngineError> {
            let exe_dir = std::env::current_exe()
                .ok()
                .and_then(|path| path.parent().map(|dir| dir.to_path_buf()));

            let bindings = exe_dir
                .and_then(|dir| {
                    Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir))
                        .ok()
                })
                .map(Ok)
                .unwrap_or_else(|| {
                    Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                        .or_else(|_| Pdfium::bind_to_system_library())
                })
                .map_err(|err| {
                    EngineError::Backend(format!("failed to bind pdfium library: {err}"))
                })?;

            Ok(Self {
                pdfium: Pdfium::new(bindings),
                geometry: LopdfEngine::new(),
                sources: HashMap::new(),
            })
        }

        fn source(&self, handle: DocumentHandle) -> Result<&[u8], EngineError> {
            self.sources
                .get(&handle)
                .map(Vec::as_slice)
                .ok_or(EngineError::InvalidHandle(handle.raw()))
        }
    }

    impl SourceLoader for PdfiumEngine {
        fn open(&mut self, source: OpenSource) -> Result<DocumentHandle, EngineError> {
            let bytes = match source {
                OpenSource::Path(path) => fs::read(path)?,
                OpenSource::Bytes(bytes) => bytes,
            };
            let handle = self.geometry.open(OpenSource::Bytes(bytes.clone()))?;
            self.sources.insert(handle, bytes);
            Ok(handle)
        }

        fn page_count(&self, handle: DocumentHandle) -> Result<u32, EngineError> {
            self.geometry.page_count(handle)
        }

        fn page_size(
            &self,
            handle: DocumentHandle,
            page_index: u32,
        ) -> Result<PageSize, EngineError> {
            self.geometry.page_size(handle, page_index)
        }

        fn render_page(
            &self,
            handle: DocumentHandle,
            request: RenderRequest,
        ) -> Result<RgbaImage, EngineError> {
            let size = self.page_size(handle, request.page_index)?;
            let (width_pt, height_pt) = size.displayed();
            let scale = if request.scale <= 0.0 { 1.0 } else { request.scale };
            let width = (width_pt * scale).round().max(1.0) as u32;
            let height = (height_pt * scale).round().max(1.0) as u32;

            let document = self
                .pdfium
                .load_pdf_from_byte_slice(self.source(handle)?, None)
                .map_err(|err| EngineError::Backend(err.to_string()))?;
            let page = document
                .pages()
                .get(request.page_index as u16)
                .map_err(|err| EngineError::Backend(err.to_string()))?;

            let config = PdfRenderConfig::new()
                .set_target_width(width as i32)
                .set_target_height(height as i32);
            let bitmap = page
                .render_with_config(&config)
                .map_err(|err| EngineError::Backend(err.to_string()))?;

            RgbaImage::from_raw(width, height, bitmap.as_rgba_bytes().to_vec()).ok_or_else(|| {
                EngineError::Backend("pdfium returned a bitmap of unexpected size".to_owned())
            })
        }

        fn close(&mut self, handle: DocumentHandle) -> Result<(), EngineError> {
            self.sources.remove(&handle);
            self.geometry.close(handle)
        }
    }
}

/// Best available loader: PDFium when compiled in and bindable, else lopdf
pub fn default_engine() -> Box<dyn SourceLoader> {
    #[cfg(feature = "pdfium")]
    {
        match pdfium_backend::PdfiumEngine::from_system_library() {
            Ok(engine) => return Box::new(engine),
            Err(e) => log::warn!("{e}; falling back to the built-in renderer"),
        }
    }
    Box::new(LopdfEngine::new())
}
