//! Flattening annotated pages into an output PDF
//!
//! Pages are composited one at a time, in ascending order, and handed to a
//! [`PdfAssembler`] only once every page succeeded. A failure or a
//! cancellation anywhere leaves no output behind.

use pdf_annotator_cache::PageRaster;
use pdf_annotator_engine::{PageImage, PdfAssembler, TextOverlay};
use pdf_annotator_scheduler::CancellationToken;

use crate::error::{ExportError, RasterError};
use crate::render::Rasterizer;
use crate::scene::SceneGraph;

pub const PAGE_LABEL_SIZE: f32 = 10.0;
pub const PAGE_LABEL_GRAY: f32 = 0.4;
/// Baseline of the page label above the bottom edge, in points
pub const PAGE_LABEL_Y: f32 = 15.0;

/// Pages as the exporter sees them
pub trait ExportSource {
    fn page_count(&self) -> usize;

    /// Background raster of page `index` at `scale` pixels per point
    fn page_raster(&mut self, index: usize, scale: f32) -> Result<PageRaster, RasterError>;

    /// Annotations of page `index` as currently stored
    fn page_scene(&self, index: usize) -> SceneGraph;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportOptions {
    /// Pixels per point of the embedded page images
    pub scale: f32,
    /// Draw "n / total" at the bottom centre of every page
    pub page_labels: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            scale: 1.0,
            page_labels: false,
        }
    }
}

/// Composites pages and assembles them into one PDF
pub struct PdfExporter<'a> {
    rasterizer: &'a Rasterizer,
    assembler: &'a dyn PdfAssembler,
}

impl<'a> PdfExporter<'a> {
    pub fn new(rasterizer: &'a Rasterizer, assembler: &'a dyn PdfAssembler) -> Self {
        Self {
            rasterizer,
            assembler,
        }
    }

    /// Export every page of `source`
    ///
    /// `token` is checked before each page and once more before assembly.
    pub fn export(
        &self,
        source: &mut dyn ExportSource,
        options: ExportOptions,
        token: &CancellationToken,
    ) -> Result<Vec<u8>, ExportError> {
        let total = source.page_count();
        let scale = options.scale;
        let mut pages = Vec::with_capacity(total);

        for index in 0..total {
            let number = index + 1;
            if token.is_cancelled() {
                log::info!("export cancelled before page {number}");
                return Err(ExportError::Cancelled { page: number });
            }

            let raster = source
                .page_raster(index, scale)
                .map_err(|source| ExportError::Raster { page: number, source })?;
            let scene = source.page_scene(index);
            let png = self
                .rasterizer
                .render_png(&raster, scale, scene.iter())
                .map_err(|source| ExportError::Raster { page: number, source })?;

            let width_pt = raster.width as f32 / scale;
            let height_pt = raster.height as f32 / scale;
            let overlays = if options.page_labels {
                vec![page_label(number, total, width_pt)]
            } else {
                Vec::new()
            };
            log::debug!(
                "page {number}/{total}: {}x{} px, {} annotations",
                raster.width,
                raster.height,
                scene.len()
            );
            pages.push(PageImage {
                image: png,
                width_pt,
                height_pt,
                overlays,
            });
        }

        if token.is_cancelled() {
            log::info!("export cancelled before assembly");
            return Err(ExportError::Cancelled { page: total });
        }
        let bytes = self.assembler.assemble(&pages)?;
        log::info!("exported {total} pages ({} bytes)", bytes.len());
        Ok(bytes)
    }
}

/// "n / total", centred at the bottom of a page `page_width` points wide
pub fn page_label(number: usize, total: usize, page_width: f32) -> TextOverlay {
    let text = format!("{number} / {total}");
    let width = helvetica_width(&text, PAGE_LABEL_SIZE);
    TextOverlay {
        x: (page_width - width) / 2.0,
        y: PAGE_LABEL_Y,
        size: PAGE_LABEL_SIZE,
        gray: PAGE_LABEL_GRAY,
        text,
    }
}

/// Width of `text` set in Helvetica; covers the characters of page labels
fn helvetica_width(text: &str, size: f32) -> f32 {
    text.chars()
        .map(|ch| match ch {
            '0'..='9' => 0.556,
            ' ' | '/' => 0.278,
            _ => 0.5,
        })
        .sum::<f32>()
        * size
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Color, Rect};
    use crate::scene::{SceneObject, Shape, Style};
    use pdf_annotator_engine::{AssemblyError, LopdfAssembler};
    use std::cell::RefCell;

    struct Pages {
        scenes: Vec<SceneGraph>,
        rendered: Vec<usize>,
        fail_on: Option<usize>,
        cancel_after: Option<(usize, CancellationToken)>,
    }

    impl Pages {
        fn new(count: usize) -> Self {
            Self {
                scenes: vec![SceneGraph::new(); count],
                rendered: Vec::new(),
                fail_on: None,
                cancel_after: None,
            }
        }
    }

    impl ExportSource for Pages {
        fn page_count(&self) -> usize {
            self.scenes.len()
        }

        fn page_raster(&mut self, index: usize, scale: f32) -> Result<PageRaster, RasterError> {
            if self.fail_on == Some(index) {
                return Err(RasterError::InvalidSize { width: 0, height: 0 });
            }
            self.rendered.push(index);
            if let Some((after, token)) = &self.cancel_after {
                if *after == index {
                    token.cancel();
                }
            }
            let (w, h) = ((100.0 * scale) as u32, (50.0 * scale) as u32);
            Ok(PageRaster::new(w, h, vec![255u8; (w * h * 4) as usize]))
        }

        fn page_scene(&self, index: usize) -> SceneGraph {
            self.scenes[index].clone()
        }
    }

    /// Records what it was asked to assemble
    #[derive(Default)]
    struct Recorder {
        pages: RefCell<Vec<PageImage>>,
    }

    impl PdfAssembler for Recorder {
        fn assemble(&self, pages: &[PageImage]) -> Result<Vec<u8>, AssemblyError> {
            *self.pages.borrow_mut() = pages.to_vec();
            Ok(b"%PDF-stub".to_vec())
        }
    }

    #[test]
    fn test_pages_exported_in_order_with_sizes() {
        let rasterizer = Rasterizer::default();
        let recorder = Recorder::default();
        let mut pages = Pages::new(3);
        pages.scenes[2].add(SceneObject::new(
            Shape::Rect {
                rect: Rect::new(10.0, 10.0, 20.0, 20.0),
                corner_radius: 0.0,
            },
            Style::stroke(Color::BLACK, 2.0),
        ));

        let options = ExportOptions {
            scale: 2.0,
            page_labels: true,
        };
        let bytes = PdfExporter::new(&rasterizer, &recorder)
            .export(&mut pages, options, &CancellationToken::new())
            .unwrap();

        assert_eq!(bytes, b"%PDF-stub");
        assert_eq!(pages.rendered, vec![0, 1, 2]);
        let assembled = recorder.pages.borrow();
        assert_eq!(assembled.len(), 3);
        assert_eq!((assembled[0].width_pt, assembled[0].height_pt), (100.0, 50.0));
        assert_eq!(assembled[1].overlays[0].text, "2 / 3");
        assert_ne!(assembled[0].image, assembled[2].image);
    }

    #[test]
    fn test_raster_failure_aborts_without_output() {
        let rasterizer = Rasterizer::default();
        let recorder = Recorder::default();
        let mut pages = Pages::new(3);
        pages.fail_on = Some(1);

        let err = PdfExporter::new(&rasterizer, &recorder)
            .export(&mut pages, ExportOptions::default(), &CancellationToken::new())
            .unwrap_err();

        assert!(matches!(err, ExportError::Raster { page: 2, .. }));
        assert!(recorder.pages.borrow().is_empty());
    }

    #[test]
    fn test_cancellation_checked_between_pages() {
        let rasterizer = Rasterizer::default();
        let recorder = Recorder::default();
        let token = CancellationToken::new();
        let mut pages = Pages::new(4);
        pages.cancel_after = Some((1, token.clone()));

        let err = PdfExporter::new(&rasterizer, &recorder)
            .export(&mut pages, ExportOptions::default(), &token)
            .unwrap_err();

        assert!(matches!(err, ExportError::Cancelled { page: 3 }));
        assert_eq!(pages.rendered, vec![0, 1]);
        assert!(recorder.pages.borrow().is_empty());
    }

    #[test]
    fn test_export_produces_pdf_with_lopdf() {
        let rasterizer = Rasterizer::default();
        let assembler = LopdfAssembler::new();
        let mut pages = Pages::new(2);

        let bytes = PdfExporter::new(&rasterizer, &assembler)
            .export(&mut pages, ExportOptions::default(), &CancellationToken::new())
            .unwrap();

        assert!(bytes.starts_with(b"%PDF-"));
        let doc = lopdf::Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 2);
    }

    #[test]
    fn test_page_label_is_centred() {
        let label = page_label(1, 2, 612.0);
        assert_eq!(label.text, "1 / 2");
        assert_eq!(label.y, 15.0);
        assert_eq!(label.size, 10.0);
        assert!((label.x + helvetica_width("1 / 2", 10.0) / 2.0 - 306.0).abs() < 1e-3);
    }
}
