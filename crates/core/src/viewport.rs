//! Zoom, scroll and the coordinate transforms between screen, canvas and
//! page space
//!
//! Page space is the source page in points (origin top-left, y down, page
//! rotation already applied). The canvas is the page raster: page space
//! times the render scale. Screen space is the canvas minus the scroll
//! offset of the visible container.

use pdf_annotator_cache::PageStore;
use pdf_annotator_engine::PageSize;

use crate::config::EditorConfig;
use crate::geometry::Point;

/// Visible container size in pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewSize {
    pub width: f32,
    pub height: f32,
}

impl ViewSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Conversion between the three coordinate spaces for one page
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    /// Pixels per point
    pub scale: f32,
    pub scroll: Point,
    pub page: PageSize,
}

impl ViewTransform {
    pub fn new(page: PageSize, scale: f32) -> Self {
        Self {
            scale,
            scroll: Point::default(),
            page,
        }
    }

    /// Displayed page size in points
    pub fn page_size(&self) -> (f32, f32) {
        self.page.displayed()
    }

    /// Raster size in whole pixels
    pub fn canvas_size(&self) -> (u32, u32) {
        let (w, h) = self.page_size();
        (
            (w * self.scale).round().max(1.0) as u32,
            (h * self.scale).round().max(1.0) as u32,
        )
    }

    pub fn screen_to_canvas(&self, p: Point) -> Point {
        p.offset(self.scroll.x, self.scroll.y)
    }

    pub fn canvas_to_page(&self, p: Point) -> Point {
        Point::new(p.x / self.scale, p.y / self.scale)
    }

    pub fn page_to_canvas(&self, p: Point) -> Point {
        Point::new(p.x * self.scale, p.y * self.scale)
    }

    pub fn screen_to_page(&self, p: Point) -> Point {
        self.canvas_to_page(self.screen_to_canvas(p))
    }

    pub fn page_to_screen(&self, p: Point) -> Point {
        self.page_to_canvas(p).offset(-self.scroll.x, -self.scroll.y)
    }

    /// Page space to PDF user space (y up, unrotated MediaBox)
    pub fn page_to_pdf(&self, p: Point) -> Point {
        let (w, h) = (self.page.width_pt, self.page.height_pt);
        match self.page.rotation {
            90 => Point::new(p.y, p.x),
            180 => Point::new(w - p.x, p.y),
            270 => Point::new(w - p.y, h - p.x),
            _ => Point::new(p.x, h - p.y),
        }
    }
}

/// Zoom state of the editor
///
/// Zoom is kept as a percentage; the render scale is `percent / 100`.
#[derive(Debug, Clone)]
pub struct ViewportController {
    zoom_percent: f32,
    zoom_min: f32,
    zoom_max: f32,
    fit_margin: f32,
    fit_min_scale: f32,
    fit_max_scale: f32,
    scroll: Point,
    container: Option<ViewSize>,
    page: Option<PageSize>,
    needs_render: bool,
}

impl ViewportController {
    pub fn new(config: &EditorConfig) -> Self {
        Self {
            zoom_percent: config.clamp_zoom(config.default_zoom),
            zoom_min: config.zoom_min,
            zoom_max: config.zoom_max,
            fit_margin: config.fit_margin,
            fit_min_scale: config.fit_min_scale,
            fit_max_scale: config.fit_max_scale,
            scroll: Point::default(),
            container: None,
            page: None,
            needs_render: false,
        }
    }

    pub fn zoom_percent(&self) -> f32 {
        self.zoom_percent
    }

    /// Render scale in pixels per point
    pub fn scale(&self) -> f32 {
        self.zoom_percent / 100.0
    }

    /// Zoom as shown to the user, e.g. `"125%"`
    pub fn zoom_label(&self) -> String {
        format!("{}%", self.display_zoom())
    }

    /// Zoom percentage rounded for display
    pub fn display_zoom(&self) -> u32 {
        self.zoom_percent.round() as u32
    }

    /// Geometry of the page currently shown
    pub fn set_page(&mut self, page: PageSize) {
        self.page = Some(page);
        self.scroll = Point::default();
        self.needs_render = true;
    }

    pub fn clear_page(&mut self) {
        self.page = None;
        self.scroll = Point::default();
    }

    pub fn page(&self) -> Option<PageSize> {
        self.page
    }

    pub fn set_container(&mut self, size: ViewSize) {
        self.container = Some(size);
    }

    pub fn container(&self) -> Option<ViewSize> {
        self.container
    }

    pub fn scroll(&self) -> Point {
        self.scroll
    }

    /// Scroll offset in canvas pixels; negative offsets are clamped to zero
    pub fn scroll_to(&mut self, offset: Point) {
        self.scroll = Point::new(offset.x.max(0.0), offset.y.max(0.0));
    }

    /// Set the zoom percentage, clamped to the configured range
    ///
    /// When the zoom actually changes, the cached rasters of `page_index`
    /// are dropped and the page is marked for re-render. Returns the
    /// percentage applied.
    pub fn set_zoom(&mut self, percent: f32, store: &mut PageStore, page_index: u32) -> f32 {
        let applied = if percent.is_finite() {
            percent.clamp(self.zoom_min, self.zoom_max)
        } else {
            self.zoom_percent
        };
        if (applied - self.zoom_percent).abs() > f32::EPSILON {
            let dropped = store.invalidate_page(page_index);
            log::debug!(
                "zoom {:.0}% -> {applied:.0}% (dropped {dropped} rasters of page {})",
                self.zoom_percent,
                page_index + 1
            );
            self.zoom_percent = applied;
            self.needs_render = true;
        }
        applied
    }

    pub fn zoom_by(&mut self, delta: f32, store: &mut PageStore, page_index: u32) -> f32 {
        self.set_zoom(self.zoom_percent + delta, store, page_index)
    }

    /// Scale that fits the current page into the container
    ///
    /// The container is shrunk by the fit margin; the result is capped at
    /// the fit maximum and floored at the fit minimum. `None` until both a
    /// page and a container size are known.
    pub fn fit_scale(&self) -> Option<f32> {
        let container = self.container?;
        let (page_w, page_h) = self.page?.displayed();
        if page_w <= 0.0 || page_h <= 0.0 {
            return None;
        }
        let scale_x = (container.width - self.fit_margin) / page_w;
        let scale_y = (container.height - self.fit_margin) / page_h;
        Some(scale_x.min(scale_y).min(self.fit_max_scale).max(self.fit_min_scale))
    }

    /// Apply [`fit_scale`](Self::fit_scale) through [`set_zoom`](Self::set_zoom)
    pub fn fit_to_screen(&mut self, store: &mut PageStore, page_index: u32) -> Option<f32> {
        let scale = self.fit_scale()?;
        self.scroll = Point::default();
        Some(self.set_zoom(scale * 100.0, store, page_index))
    }

    /// Whether the page raster must be rebuilt; clears the flag
    pub fn take_needs_render(&mut self) -> bool {
        std::mem::take(&mut self.needs_render)
    }

    pub fn transform(&self) -> Option<ViewTransform> {
        let page = self.page?;
        Some(ViewTransform {
            scale: self.scale(),
            scroll: self.scroll,
            page,
        })
    }

    /// Centre of the visible part of the page, in page space
    ///
    /// Falls back to the page centre when the container size is unknown.
    pub fn visible_center(&self) -> Option<Point> {
        let transform = self.transform()?;
        let (page_w, page_h) = transform.page_size();
        let center = match self.container {
            Some(container) => {
                let p = transform.screen_to_page(Point::new(
                    container.width / 2.0,
                    container.height / 2.0,
                ));
                Point::new(p.x.clamp(0.0, page_w), p.y.clamp(0.0, page_h))
            }
            None => Point::new(page_w / 2.0, page_h / 2.0),
        };
        Some(center)
    }
}
