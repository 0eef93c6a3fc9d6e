//! Document rendering collaborator backed by `lopdf`.
//!
//! Reads page geometry from the PDF structure and produces page-sized
//! rasters. Content streams are not interpreted; pages render as blank sheets
//! that the annotation overlay is composited onto.

use image::{ImageBuffer, Rgba};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use pdf_markup_core::{PageSize, PageSource, PageSourceError, RenderedPage};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub type RgbaImage = ImageBuffer<Rgba<u8>, Vec<u8>>;

/// US Letter, used when a page has no readable MediaBox
pub const DEFAULT_PAGE_SIZE: PageSize = PageSize { width: 612.0, height: 792.0 };

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentHandle(u64);

impl DocumentHandle {
    pub fn raw(self) -> u64 {
        self.0
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
pub enum PdfEngineError {
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
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<PdfEngineError> for PageSourceError {
    fn from(error: PdfEngineError) -> Self {
        match error {
            PdfEngineError::PageOutOfRange { page, page_count } => {
                PageSourceError::OutOfRange { page, page_count }
            }
            other => PageSourceError::Render(other.to_string()),
        }
    }
}

/// Page operations addressed by 1-based page number
pub trait PdfEngine {
    fn open(&mut self, source: OpenSource) -> Result<DocumentHandle, PdfEngineError>;
    fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError>;
    fn page_size(&self, handle: DocumentHandle, page: u32) -> Result<PageSize, PdfEngineError>;
    fn render_page(
        &self,
        handle: DocumentHandle,
        page: u32,
        scale: f32,
    ) -> Result<RgbaImage, PdfEngineError>;
}

#[derive(Debug, Clone)]
struct DocumentRecord {
    page_sizes: Vec<PageSize>,
}

#[derive(Debug, Default)]
pub struct LopdfEngine {
    next_handle: u64,
    docs: HashMap<DocumentHandle, DocumentRecord>,
}

impl LopdfEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn parse_sizes(bytes: &[u8]) -> Result<Vec<PageSize>, PdfEngineError> {
        if bytes.windows("/Encrypt".len()).any(|window| window == b"/Encrypt") {
            return Err(PdfEngineError::EncryptedUnsupported);
        }

        let doc = Document::load_mem(bytes)?;
        let pages = doc.get_pages();
        let mut sizes = Vec::with_capacity(pages.len());

        for (_, object_id) in pages {
            sizes.push(page_media_box(&doc, object_id).unwrap_or(DEFAULT_PAGE_SIZE));
        }

        if sizes.is_empty() {
            return Err(PdfEngineError::Backend("document has no pages".to_owned()));
        }

        Ok(sizes)
    }

    fn record(&self, handle: DocumentHandle) -> Result<&DocumentRecord, PdfEngineError> {
        self.docs.get(&handle).ok_or(PdfEngineError::InvalidHandle(handle.raw()))
    }

    /// Sizes of every page, in page order
    pub fn page_sizes(&self, handle: DocumentHandle) -> Result<&[PageSize], PdfEngineError> {
        Ok(&self.record(handle)?.page_sizes)
    }
}

/// Pages nest at most this deep before a `Parent` chain is treated as cyclic
const MAX_PAGE_TREE_DEPTH: usize = 32;

/// Width and height of a page's MediaBox
///
/// MediaBox is inheritable: when the page dictionary has none, the `Parent`
/// chain of `/Pages` nodes is searched.
pub fn page_media_box(doc: &Document, page_id: ObjectId) -> Option<PageSize> {
    let mut node = doc.get_dictionary(page_id).ok()?;

    for _ in 0..MAX_PAGE_TREE_DEPTH {
        if let Ok(media_box) = node.get(b"MediaBox") {
            return media_box_size(doc, media_box);
        }
        let parent = node.get(b"Parent").and_then(Object::as_reference).ok()?;
        node = doc.get_dictionary(parent).ok()?;
    }

    tracing::warn!(?page_id, "page tree too deep while resolving MediaBox");
    None
}

fn media_box_size(doc: &Document, media_box: &Object) -> Option<PageSize> {
    let (_, media_box) = doc.dereference(media_box).ok()?;
    let array = media_box.as_array().ok()?;
    if array.len() != 4 {
        return None;
    }
    let x0 = array[0].as_float().ok()?;
    let y0 = array[1].as_float().ok()?;
    let x1 = array[2].as_float().ok()?;
    let y1 = array[3].as_float().ok()?;
    Some(PageSize { width: (x1 - x0).abs(), height: (y1 - y0).abs() })
}

impl PdfEngine for LopdfEngine {
    fn open(&mut self, source: OpenSource) -> Result<DocumentHandle, PdfEngineError> {
        let bytes = match source {
            OpenSource::Path(path) => fs::read(path)?,
            OpenSource::Bytes(bytes) => bytes,
        };

        let page_sizes = Self::parse_sizes(&bytes)?;

        self.next_handle += 1;
        let handle = DocumentHandle(self.next_handle);
        tracing::debug!(handle = handle.raw(), pages = page_sizes.len(), "document opened");
        self.docs.insert(handle, DocumentRecord { page_sizes });

        Ok(handle)
    }

    fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError> {
        Ok(self.record(handle)?.page_sizes.len() as u32)
    }

    fn page_size(&self, handle: DocumentHandle, page: u32) -> Result<PageSize, PdfEngineError> {
        let record = self.record(handle)?;
        let page_count = record.page_sizes.len() as u32;
        page.checked_sub(1)
            .and_then(|index| record.page_sizes.get(index as usize))
            .copied()
            .ok_or(PdfEngineError::PageOutOfRange { page, page_count })
    }

    fn render_page(
        &self,
        handle: DocumentHandle,
        page: u32,
        scale: f32,
    ) -> Result<RgbaImage, PdfEngineError> {
        let page_size = self.page_size(handle, page)?;
        let scale = if scale <= 0.0 { 1.0 } else { scale };

        let width = (page_size.width * scale).round().max(1.0) as u32;
        let height = (page_size.height * scale).round().max(1.0) as u32;

        let mut image = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));

        if width >= 4 && height >= 4 {
            for x in 0..width {
                image.put_pixel(x, 0, Rgba([220, 220, 220, 255]));
                image.put_pixel(x, height - 1, Rgba([220, 220, 220, 255]));
            }
            for y in 0..height {
                image.put_pixel(0, y, Rgba([220, 220, 220, 255]));
                image.put_pixel(width - 1, y, Rgba([220, 220, 220, 255]));
            }
        }

        Ok(image)
    }
}

/// An open document exposed to the editor as a [`PageSource`]
#[derive(Debug)]
pub struct OpenDocument {
    engine: LopdfEngine,
    handle: DocumentHandle,
}

impl OpenDocument {
    pub fn open(source: impl Into<OpenSource>) -> Result<Self, PdfEngineError> {
        let mut engine = LopdfEngine::new();
        let handle = engine.open(source.into())?;
        Ok(Self { engine, handle })
    }

    pub fn page_sizes(&self) -> &[PageSize] {
        self.engine.page_sizes(self.handle).unwrap_or_default()
    }

    /// Raster of a 1-based page at `scale`
    pub fn render_image(&self, page: u32, scale: f32) -> Result<RgbaImage, PdfEngineError> {
        self.engine.render_page(self.handle, page, scale)
    }
}

impl PageSource for OpenDocument {
    fn page_count(&self) -> u32 {
        self.page_sizes().len() as u32
    }

    fn page_size(&self, page: u32) -> Result<PageSize, PageSourceError> {
        Ok(self.engine.page_size(self.handle, page)?)
    }

    fn render(&self, page: u32, scale: f32) -> Result<RenderedPage, PageSourceError> {
        let image = self.render_image(page, scale)?;
        Ok(RenderedPage { page, width: image.width(), height: image.height() })
    }
}

/// Serialize a document of blank pages with the given sizes in points
pub fn blank_document(page_sizes: &[PageSize]) -> Result<Vec<u8>, PdfEngineError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut kids = Vec::with_capacity(page_sizes.len());
    for size in page_sizes {
        let content_id = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![Object::Integer(0), Object::Integer(0), Object::Real(size.width), Object::Real(size.height)],
            "Contents" => content_id,
        });
        kids.push(Object::Reference(page_id));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Count" => page_sizes.len() as i64,
            "Kids" => kids,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)?;
    Ok(bytes)
}
