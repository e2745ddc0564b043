//! Output PDF assembly from page images
//!
//! Every page of the output is a single full-page image, optionally with
//! small text overlays (page numbers). Image pixels are stored as
//! Flate-compressed DeviceRGB with a DeviceGray soft mask when the source
//! carries transparency.

use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream, StringFormat};
use std::io::Write;

/// One output page: an encoded image and the physical size it covers
#[derive(Debug, Clone)]
pub struct PageImage {
    /// Encoded image bytes (PNG or JPEG)
    pub image: Vec<u8>,
    /// Page width in points
    pub width_pt: f32,
    /// Page height in points
    pub height_pt: f32,
    pub overlays: Vec<TextOverlay>,
}

/// Text drawn on top of a page image, in PDF user space (origin bottom-left)
#[derive(Debug, Clone, PartialEq)]
pub struct TextOverlay {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub size: f32,
    /// Gray level, 0.0 = black, 1.0 = white
    pub gray: f32,
}

#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    #[error("no pages to assemble")]
    Empty,
    #[error("page {page}: unsupported image data: {source}")]
    UnsupportedImage {
        page: usize,
        #[source]
        source: image::ImageError,
    },
    #[error("page {page}: invalid page size {width}x{height}")]
    InvalidPageSize { page: usize, width: f32, height: f32 },
    #[error("compression failed: {0}")]
    Compression(#[from] std::io::Error),
    #[error("PDF encoding failed: {0}")]
    Encode(String),
}

/// Builds an output PDF from rasterized pages
pub trait PdfAssembler {
    fn assemble(&self, pages: &[PageImage]) -> Result<Vec<u8>, AssemblyError>;
}

/// Assembler backed by lopdf
#[derive(Debug, Clone, Default)]
pub struct LopdfAssembler {
    compression: Option<u32>,
}

impl LopdfAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the zlib level (0-9) used for image streams
    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression = Some(level.min(9));
        self
    }

    fn deflate(&self, data: &[u8]) -> Result<Vec<u8>, AssemblyError> {
        let level = self.compression.map(Compression::new).unwrap_or_default();
        let mut encoder = ZlibEncoder::new(Vec::new(), level);
        encoder.write_all(data)?;
        Ok(encoder.finish()?)
    }

    fn embed_image(
        &self,
        doc: &mut Document,
        page: usize,
        encoded: &[u8],
    ) -> Result<ObjectId, AssemblyError> {
        let decoded = image::load_from_memory(encoded)
            .map_err(|source| AssemblyError::UnsupportedImage { page, source })?
            .to_rgba8();
        let (width, height) = decoded.dimensions();

        let pixel_count = (width * height) as usize;
        let mut rgb = Vec::with_capacity(pixel_count * 3);
        let mut alpha = Vec::with_capacity(pixel_count);
        for pixel in decoded.pixels() {
            rgb.extend_from_slice(&pixel.0[..3]);
            alpha.push(pixel.0[3]);
        }

        let mut image_dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "FlateDecode",
        };

        if alpha.iter().any(|&a| a != u8::MAX) {
            let mask = Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => width as i64,
                    "Height" => height as i64,
                    "ColorSpace" => "DeviceGray",
                    "BitsPerComponent" => 8,
                    "Filter" => "FlateDecode",
                },
                self.deflate(&alpha)?,
            );
            let mask_id = doc.add_object(mask);
            image_dict.set("SMask", mask_id);
        }

        Ok(doc.add_object(Stream::new(image_dict, self.deflate(&rgb)?)))
    }
}

impl PdfAssembler for LopdfAssembler {
    fn assemble(&self, pages: &[PageImage]) -> Result<Vec<u8>, AssemblyError> {
        if pages.is_empty() {
            return Err(AssemblyError::Empty);
        }

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });

        let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
        for (index, page) in pages.iter().enumerate() {
            let (width, height) = (page.width_pt, page.height_pt);
            if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
                return Err(AssemblyError::InvalidPageSize { page: index, width, height });
            }

            let image_id = self.embed_image(&mut doc, index, &page.image)?;

            let mut operations = vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        Object::Real(width),
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Real(height),
                        Object::Integer(0),
                        Object::Integer(0),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                Operation::new("Q", vec![]),
            ];
            for overlay in &page.overlays {
                operations.extend(overlay_operations(overlay));
            }

            let content = Content { operations }
                .encode()
                .map_err(|err| AssemblyError::Encode(err.to_string()))?;
            let content_id = doc.add_object(Stream::new(dictionary! {}, content));

            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Real(width),
                    Object::Real(height),
                ],
                "Contents" => content_id,
                "Resources" => dictionary! {
                    "XObject" => dictionary! { "Im0" => image_id },
                    "Font" => dictionary! { "F1" => font_id },
                },
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).map_err(|err| AssemblyError::Encode(err.to_string()))?;
        log::debug!("assembled {} pages into {} bytes", pages.len(), buffer.len());
        Ok(buffer)
    }
}

fn overlay_operations(overlay: &TextOverlay) -> Vec<Operation> {
    let gray = overlay.gray.clamp(0.0, 1.0);
    vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Real(overlay.size)]),
        Operation::new("rg", vec![Object::Real(gray), Object::Real(gray), Object::Real(gray)]),
        Operation::new("Td", vec![Object::Real(overlay.x), Object::Real(overlay.y)]),
        Operation::new(
            "Tj",
            vec![Object::String(overlay.text.as_bytes().to_vec(), StringFormat::Literal)],
        ),
        Operation::new("ET", vec![]),
    ]
}

/// Build a document of empty pages with the given sizes in points
pub fn build_blank_document(sizes: &[(f32, f32)]) -> Result<Vec<u8>, AssemblyError> {
    let pages: Vec<_> = sizes.iter().map(|&size| (size, &[] as &[u8])).collect();
    build_document(&pages)
}

/// Document whose pages carry the given raw content streams
///
/// Each entry is the MediaBox size in points and the uncompressed content
/// operators of that page.
pub fn build_document(pages: &[((f32, f32), &[u8])]) -> Result<Vec<u8>, AssemblyError> {
    if pages.is_empty() {
        return Err(AssemblyError::Empty);
    }

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());

    for &((width, height), content) in pages {
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.to_vec()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(width),
                Object::Real(height),
            ],
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).map_err(|err| AssemblyError::Encode(err.to_string()))?;
    Ok(buffer)
}
