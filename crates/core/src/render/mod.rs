//! Scene rasterization
//!
//! Draws scene objects over a page raster with tiny-skia. Geometry stays in
//! page space; a single transform maps it to pixels, so zoom never touches
//! the scene. Text glyphs come from fontdue, rasterized at the final pixel
//! size.

mod fonts;

pub use fonts::{FontBook, ResolvedFace};

use image::Rgba;
use pdf_annotator_cache::PageRaster;
use pdf_annotator_engine::RgbaImage;
use tiny_skia::{
    BlendMode, FillRule, FilterQuality, IntSize, LineCap, LineJoin, Paint, Path, PathBuilder,
    Pixmap, PixmapPaint, Stroke, StrokeDash, Transform,
};

use crate::config::EditorConfig;
use crate::error::RasterError;
use crate::geometry::{Color, Point, Rect};
use crate::scene::{FontDescriptor, ImageData, PathSegment, SceneObject, Shape, StampBorder, Style};
use crate::shapes::{
    self, NoteLayout, StampLayout, LINE_HEIGHT, NOTE_COLLAPSED_RADIUS, NOTE_FONT_SIZE,
    NOTE_LINE_HEIGHT, STAMP_BORDER_WIDTH,
};

const NOTE_TEXT_COLOR: Color = Color::rgb(0x1f, 0x29, 0x37);
const NOTE_CORNER_RADIUS: f32 = 4.0;
const NOTE_HEADER_SHADE: i16 = -25;
const NOTE_BORDER_SHADE: i16 = -60;
const SYNTHETIC_ITALIC_SKEW: f32 = -0.2;

/// Draws scene objects into pixmaps
#[derive(Debug, Clone, Default)]
pub struct Rasterizer {
    fonts: FontBook,
}

impl Rasterizer {
    pub fn new(fonts: FontBook) -> Self {
        Self { fonts }
    }

    /// Rasterizer using the fonts found in the configured font directories
    pub fn from_config(config: &EditorConfig) -> Self {
        Self::new(FontBook::load(&config.font_dirs))
    }

    pub fn fonts(&self) -> &FontBook {
        &self.fonts
    }

    /// Composite `objects` in order over `background`
    ///
    /// `scale` is pixels per point and must match the scale the background
    /// was rendered at.
    pub fn render<'a>(
        &self,
        background: &PageRaster,
        scale: f32,
        objects: impl IntoIterator<Item = &'a SceneObject>,
    ) -> Result<Pixmap, RasterError> {
        let mut pixmap = background_pixmap(background)?;
        self.draw_all(&mut pixmap, scale, objects)?;
        Ok(pixmap)
    }

    /// Composite `objects` over an opaque white page
    pub fn render_blank<'a>(
        &self,
        width: u32,
        height: u32,
        scale: f32,
        objects: impl IntoIterator<Item = &'a SceneObject>,
    ) -> Result<Pixmap, RasterError> {
        let mut pixmap = Pixmap::new(width, height).ok_or(RasterError::InvalidSize { width, height })?;
        pixmap.fill(tiny_skia::Color::WHITE);
        self.draw_all(&mut pixmap, scale, objects)?;
        Ok(pixmap)
    }

    /// Composite `objects` onto a fully transparent canvas
    pub fn render_transparent<'a>(
        &self,
        width: u32,
        height: u32,
        scale: f32,
        objects: impl IntoIterator<Item = &'a SceneObject>,
    ) -> Result<Pixmap, RasterError> {
        let mut pixmap = Pixmap::new(width, height).ok_or(RasterError::InvalidSize { width, height })?;
        self.draw_all(&mut pixmap, scale, objects)?;
        Ok(pixmap)
    }

    /// [`render`](Self::render) encoded as PNG
    pub fn render_png<'a>(
        &self,
        background: &PageRaster,
        scale: f32,
        objects: impl IntoIterator<Item = &'a SceneObject>,
    ) -> Result<Vec<u8>, RasterError> {
        encode_png(&self.render(background, scale, objects)?)
    }

    fn draw_all<'a>(
        &self,
        pixmap: &mut Pixmap,
        scale: f32,
        objects: impl IntoIterator<Item = &'a SceneObject>,
    ) -> Result<(), RasterError> {
        let base = Transform::from_scale(scale, scale);
        for object in objects {
            self.draw_object(pixmap, object, base, 1.0)?;
        }
        Ok(())
    }

    fn draw_object(
        &self,
        pixmap: &mut Pixmap,
        object: &SceneObject,
        base: Transform,
        inherited_opacity: f32,
    ) -> Result<(), RasterError> {
        let ts = if object.rotation != 0.0 {
            let center = object.bounds().center();
            base.pre_concat(Transform::from_rotate_at(object.rotation, center.x, center.y))
        } else {
            base
        };
        let style = &object.style;
        let opacity = inherited_opacity * style.opacity;

        match &object.shape {
            Shape::Path { segments } => {
                if let Some(path) = segments_path(segments) {
                    fill_and_stroke(pixmap, &path, style, opacity, ts);
                }
            }
            Shape::Line { start, end } => {
                if let Some(path) = polygon_path(&[*start, *end], false) {
                    stroke(pixmap, &path, style, opacity, ts);
                }
            }
            Shape::Arrow {
                start,
                end,
                head_length,
            } => {
                if let Some(path) = polygon_path(&[*start, *end], false) {
                    stroke(pixmap, &path, style, opacity, ts);
                }
                let head = shapes::arrow_head(*start, *end, *head_length);
                if let Some(path) = polygon_path(&head, true) {
                    fill(pixmap, &path, style.stroke.with_opacity(opacity), ts);
                }
            }
            Shape::Polygon { points, closed } => {
                if let Some(path) = polygon_path(points, *closed) {
                    if *closed {
                        fill_and_stroke(pixmap, &path, style, opacity, ts);
                    } else {
                        stroke(pixmap, &path, style, opacity, ts);
                    }
                }
            }
            Shape::Ellipse { center, rx, ry } => {
                if let Some(path) = oval_path(*center, *rx, *ry) {
                    fill_and_stroke(pixmap, &path, style, opacity, ts);
                }
            }
            Shape::Rect {
                rect,
                corner_radius,
            } => {
                if let Some(path) = rounded_rect_path(*rect, *corner_radius) {
                    fill_and_stroke(pixmap, &path, style, opacity, ts);
                }
            }
            Shape::Text {
                origin,
                content,
                font,
            } => {
                let color = style.fill.unwrap_or(style.stroke).with_opacity(opacity);
                let painter = TextPainter::new(&self.fonts, font, ts);
                let line_height = font.size * LINE_HEIGHT;
                for (i, line) in content.split('\n').enumerate() {
                    let baseline = origin.y + i as f32 * line_height + painter.ascent();
                    painter.draw_line(pixmap, line, origin.x, baseline, color);
                }
            }
            Shape::Image { rect, image } => draw_image(pixmap, *rect, image, opacity, ts)?,
            Shape::Group { children } => {
                for child in children {
                    self.draw_object(pixmap, child, ts, opacity)?;
                }
            }
            Shape::Note {
                origin,
                text,
                color,
                collapsed,
            } => self.draw_note(pixmap, *origin, text, *color, *collapsed, opacity, ts),
            Shape::Stamp {
                center,
                text,
                color,
                border,
            } => self.draw_stamp(pixmap, *center, text, *color, *border, opacity, ts),
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_note(
        &self,
        pixmap: &mut Pixmap,
        origin: Point,
        text: &str,
        color: Color,
        collapsed: bool,
        opacity: f32,
        ts: Transform,
    ) {
        let layout = NoteLayout::new(origin, text);
        let body = color.with_opacity(opacity);
        let edge = Style::stroke(color.adjust_brightness(NOTE_BORDER_SHADE), 1.0);

        if collapsed {
            let c = layout.disc_center;
            if let Some(disc) = oval_path(c, NOTE_COLLAPSED_RADIUS, NOTE_COLLAPSED_RADIUS) {
                fill(pixmap, &disc, body, ts);
                stroke(pixmap, &disc, &edge, opacity, ts);
            }
            // three text lines as an icon
            let icon = Style::stroke(NOTE_TEXT_COLOR, 2.0);
            for dy in [-5.0, 0.0, 5.0] {
                let line = [Point::new(c.x - 7.0, c.y + dy), Point::new(c.x + 7.0, c.y + dy)];
                if let Some(path) = polygon_path(&line, false) {
                    stroke(pixmap, &path, &icon, opacity, ts);
                }
            }
            return;
        }

        if let Some(tail) = polygon_path(&layout.tail, true) {
            fill(pixmap, &tail, body, ts);
        }
        if let Some(card) = rounded_rect_path(layout.card, NOTE_CORNER_RADIUS) {
            fill(pixmap, &card, body, ts);
            stroke(pixmap, &card, &edge, opacity, ts);
        }
        let header_color = color.adjust_brightness(NOTE_HEADER_SHADE).with_opacity(opacity);
        if let Some(header) = rounded_rect_path(layout.header, NOTE_CORNER_RADIUS) {
            fill(pixmap, &header, header_color, ts);
        }
        // square off the header's bottom corners
        let lower = Rect::new(
            layout.header.x,
            layout.header.y + layout.header.height / 2.0,
            layout.header.width,
            layout.header.height / 2.0,
        );
        if let Some(path) = rounded_rect_path(lower, 0.0) {
            fill(pixmap, &path, header_color, ts);
        }

        let font = FontDescriptor {
            size: NOTE_FONT_SIZE,
            ..FontDescriptor::default()
        };
        let painter = TextPainter::new(&self.fonts, &font, ts);
        let line_height = NOTE_FONT_SIZE * NOTE_LINE_HEIGHT;
        let visible = ((layout.text_height / line_height).floor() as usize).max(1);
        let text_color = NOTE_TEXT_COLOR.with_opacity(opacity);
        for (i, line) in layout.lines.iter().take(visible).enumerate() {
            let baseline = layout.text_origin.y + i as f32 * line_height + painter.ascent();
            painter.draw_line(pixmap, line, layout.text_origin.x, baseline, text_color);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_stamp(
        &self,
        pixmap: &mut Pixmap,
        center: Point,
        text: &str,
        color: Color,
        border: StampBorder,
        opacity: f32,
        ts: Transform,
    ) {
        let layout = StampLayout::new(center, text, border);
        let frame = match border {
            StampBorder::Oval => oval_path(center, layout.rx, layout.ry),
            StampBorder::Rect | StampBorder::Rounded => {
                rounded_rect_path(layout.frame, layout.corner_radius())
            }
        };
        if let Some(path) = frame {
            stroke(pixmap, &path, &Style::stroke(color, STAMP_BORDER_WIDTH), opacity, ts);
        }

        let font = StampLayout::font();
        let painter = TextPainter::new(&self.fonts, &font, ts);
        let line_height = font.size * LINE_HEIGHT;
        let top = center.y - layout.text_height / 2.0;
        let color = color.with_opacity(opacity);
        for (i, line) in text.split('\n').enumerate() {
            let x = center.x - painter.line_width(line) / 2.0;
            let baseline = top + i as f32 * line_height + painter.ascent();
            painter.draw_line(pixmap, line, x, baseline, color);
        }
    }
}

/// Copy a straight-alpha page raster into a premultiplied pixmap
pub fn background_pixmap(raster: &PageRaster) -> Result<Pixmap, RasterError> {
    let (width, height) = (raster.width, raster.height);
    let size = IntSize::from_wh(width, height).ok_or(RasterError::InvalidSize { width, height })?;
    if raster.pixels.len() != width as usize * height as usize * 4 {
        return Err(RasterError::BackgroundMismatch { width, height });
    }
    let mut data = raster.pixels.to_vec();
    premultiply(&mut data);
    Pixmap::from_vec(data, size).ok_or(RasterError::InvalidSize { width, height })
}

pub fn encode_png(pixmap: &Pixmap) -> Result<Vec<u8>, RasterError> {
    pixmap
        .encode_png()
        .map_err(|e| RasterError::Encode(e.to_string()))
}

/// Straight-alpha copy of a pixmap
pub fn to_rgba_image(pixmap: &Pixmap) -> RgbaImage {
    RgbaImage::from_fn(pixmap.width(), pixmap.height(), |x, y| {
        pixmap
            .pixel(x, y)
            .map(|p| {
                let c = p.demultiply();
                Rgba([c.red(), c.green(), c.blue(), c.alpha()])
            })
            .unwrap_or(Rgba([0, 0, 0, 0]))
    })
}

fn premultiply(data: &mut [u8]) {
    for px in data.chunks_exact_mut(4) {
        let a = px[3];
        if a < 255 {
            for c in &mut px[..3] {
                *c = scale_channel(*c, a);
            }
        }
    }
}

fn scale_channel(c: u8, a: u8) -> u8 {
    ((c as u16 * a as u16 + 127) / 255) as u8
}

fn paint(color: Color) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(color.r, color.g, color.b, color.a);
    paint.anti_alias = true;
    paint
}

fn stroke_for(style: &Style) -> Stroke {
    Stroke {
        width: style.stroke_width,
        line_cap: LineCap::Round,
        line_join: LineJoin::Round,
        dash: style
            .dash
            .as_ref()
            .and_then(|dash| StrokeDash::new(dash.clone(), 0.0)),
        ..Stroke::default()
    }
}

fn fill(pixmap: &mut Pixmap, path: &Path, color: Color, ts: Transform) {
    if color.a > 0 {
        pixmap.fill_path(path, &paint(color), FillRule::Winding, ts, None);
    }
}

fn stroke(pixmap: &mut Pixmap, path: &Path, style: &Style, opacity: f32, ts: Transform) {
    if style.stroke_width > 0.0 {
        let color = style.stroke.with_opacity(opacity);
        pixmap.stroke_path(path, &paint(color), &stroke_for(style), ts, None);
    }
}

fn fill_and_stroke(pixmap: &mut Pixmap, path: &Path, style: &Style, opacity: f32, ts: Transform) {
    if let Some(color) = style.fill {
        fill(pixmap, path, color.with_opacity(opacity), ts);
    }
    stroke(pixmap, path, style, opacity, ts);
}

fn segments_path(segments: &[PathSegment]) -> Option<Path> {
    let mut pb = PathBuilder::new();
    for segment in segments {
        match *segment {
            PathSegment::MoveTo(p) => pb.move_to(p.x, p.y),
            PathSegment::LineTo(p) => pb.line_to(p.x, p.y),
            PathSegment::QuadTo { ctrl, to } => pb.quad_to(ctrl.x, ctrl.y, to.x, to.y),
            PathSegment::Close => pb.close(),
        }
    }
    pb.finish()
}

fn polygon_path(points: &[Point], closed: bool) -> Option<Path> {
    let (first, rest) = points.split_first()?;
    let mut pb = PathBuilder::new();
    pb.move_to(first.x, first.y);
    for p in rest {
        pb.line_to(p.x, p.y);
    }
    if closed {
        pb.close();
    }
    pb.finish()
}

fn oval_path(center: Point, rx: f32, ry: f32) -> Option<Path> {
    let bounds = tiny_skia::Rect::from_xywh(center.x - rx, center.y - ry, rx * 2.0, ry * 2.0)?;
    PathBuilder::from_oval(bounds)
}

fn rounded_rect_path(rect: Rect, radius: f32) -> Option<Path> {
    let r = radius.min(rect.width / 2.0).min(rect.height / 2.0).max(0.0);
    if r == 0.0 {
        let bounds = tiny_skia::Rect::from_xywh(rect.x, rect.y, rect.width, rect.height)?;
        return Some(PathBuilder::from_rect(bounds));
    }
    let (x, y, right, bottom) = (rect.x, rect.y, rect.right(), rect.bottom());
    let mut pb = PathBuilder::new();
    pb.move_to(x + r, y);
    pb.line_to(right - r, y);
    pb.quad_to(right, y, right, y + r);
    pb.line_to(right, bottom - r);
    pb.quad_to(right, bottom, right - r, bottom);
    pb.line_to(x + r, bottom);
    pb.quad_to(x, bottom, x, bottom - r);
    pb.line_to(x, y + r);
    pb.quad_to(x, y, x + r, y);
    pb.close();
    pb.finish()
}

fn draw_image(
    pixmap: &mut Pixmap,
    rect: Rect,
    image: &ImageData,
    opacity: f32,
    ts: Transform,
) -> Result<(), RasterError> {
    if rect.width <= 0.0 || rect.height <= 0.0 {
        return Ok(());
    }
    let decoded = image::load_from_memory(&image.encoded)
        .map_err(|e| RasterError::Decode(e.to_string()))?
        .to_rgba8();
    let (width, height) = decoded.dimensions();
    let size = IntSize::from_wh(width, height).ok_or(RasterError::InvalidSize { width, height })?;
    let mut data = decoded.into_raw();
    premultiply(&mut data);
    let source = Pixmap::from_vec(data, size).ok_or(RasterError::InvalidSize { width, height })?;

    let paint = PixmapPaint {
        opacity,
        blend_mode: BlendMode::SourceOver,
        quality: FilterQuality::Bilinear,
    };
    let transform = ts
        .pre_translate(rect.x, rect.y)
        .pre_scale(rect.width / width as f32, rect.height / height as f32);
    pixmap.draw_pixmap(0, 0, source.as_ref(), &paint, transform, None);
    Ok(())
}

/// Lays out and draws single lines of text for one font
///
/// Glyphs are rasterized at the device pixel size implied by the transform
/// and mapped back through it, so rotated text stays sharp. Without a font
/// every visible character becomes an outlined box.
struct TextPainter {
    face: Option<ResolvedFace>,
    font: FontDescriptor,
    ts: Transform,
    /// Device pixels per point
    px_per_pt: f32,
}

impl TextPainter {
    fn new(fonts: &FontBook, font: &FontDescriptor, ts: Transform) -> Self {
        let px_per_pt = (ts.sx * ts.sx + ts.ky * ts.ky).sqrt().max(f32::EPSILON);
        Self {
            face: fonts.resolve(&font.family, font.bold, font.italic),
            font: font.clone(),
            ts,
            px_per_pt,
        }
    }

    fn pixel_size(&self) -> f32 {
        (self.font.size * self.px_per_pt).max(1.0)
    }

    /// Baseline offset below the line top, in points
    fn ascent(&self) -> f32 {
        self.face
            .as_ref()
            .and_then(|face| face.font.horizontal_line_metrics(self.pixel_size()))
            .map(|m| m.ascent / self.px_per_pt)
            .unwrap_or(self.font.size * 0.8)
    }

    fn placeholder_advance(&self) -> f32 {
        self.font.size * if self.font.bold { 0.6 } else { 0.55 }
    }

    /// Advance width of `text` in points
    fn line_width(&self, text: &str) -> f32 {
        match &self.face {
            Some(face) => {
                let px = self.pixel_size();
                text.chars()
                    .map(|ch| face.font.metrics(ch, px).advance_width)
                    .sum::<f32>()
                    / self.px_per_pt
            }
            None => text.chars().count() as f32 * self.placeholder_advance(),
        }
    }

    fn draw_line(&self, pixmap: &mut Pixmap, text: &str, x: f32, baseline: f32, color: Color) {
        if color.a == 0 {
            return;
        }
        let width = match &self.face {
            Some(face) => self.draw_glyphs(pixmap, face, text, x, baseline, color),
            None => self.draw_boxes(pixmap, text, x, baseline, color),
        };
        if self.font.underline && width > 0.0 {
            let thickness = (self.font.size / 15.0).max(0.5);
            let bar = Rect::new(x, baseline + self.font.size * 0.1, width, thickness);
            if let Some(path) = rounded_rect_path(bar, 0.0) {
                fill(pixmap, &path, color, self.ts);
            }
        }
    }

    fn draw_glyphs(
        &self,
        pixmap: &mut Pixmap,
        face: &ResolvedFace,
        text: &str,
        x: f32,
        baseline: f32,
        color: Color,
    ) -> f32 {
        let px = self.pixel_size();
        let to_pt = 1.0 / self.px_per_pt;
        let mut line = self.ts.pre_translate(x, baseline);
        if face.synthetic_italic {
            line = line.pre_concat(Transform::from_row(1.0, 0.0, SYNTHETIC_ITALIC_SKEW, 1.0, 0.0, 0.0));
        }
        let paint = PixmapPaint {
            quality: FilterQuality::Bilinear,
            ..PixmapPaint::default()
        };

        let mut pen = 0.0f32;
        for ch in text.chars() {
            let (metrics, coverage) = face.font.rasterize(ch, px);
            if let Some(glyph) = glyph_pixmap(&coverage, metrics.width, metrics.height, color) {
                let left = pen + metrics.xmin as f32 * to_pt;
                let top = -((metrics.height as i32 + metrics.ymin) as f32) * to_pt;
                let placed = line.pre_translate(left, top).pre_scale(to_pt, to_pt);
                pixmap.draw_pixmap(0, 0, glyph.as_ref(), &paint, placed, None);
                if face.synthetic_bold {
                    let shifted = line.pre_translate(left + to_pt, top).pre_scale(to_pt, to_pt);
                    pixmap.draw_pixmap(0, 0, glyph.as_ref(), &paint, shifted, None);
                }
            }
            pen += metrics.advance_width * to_pt;
        }
        pen
    }

    fn draw_boxes(&self, pixmap: &mut Pixmap, text: &str, x: f32, baseline: f32, color: Color) -> f32 {
        let advance = self.placeholder_advance();
        let size = self.font.size;
        let outline = Style::stroke(color, (size / 16.0).max(0.5));
        for (i, ch) in text.chars().enumerate() {
            if ch.is_whitespace() {
                continue;
            }
            let cell = Rect::new(
                x + i as f32 * advance + advance * 0.1,
                baseline - size * 0.7,
                advance * 0.8,
                size * 0.7,
            );
            if let Some(path) = rounded_rect_path(cell, 0.0) {
                stroke(pixmap, &path, &outline, 1.0, self.ts);
            }
        }
        text.chars().count() as f32 * advance
    }
}

/// Premultiplied glyph bitmap tinted with `color`; `None` for empty glyphs
fn glyph_pixmap(coverage: &[u8], width: usize, height: usize, color: Color) -> Option<Pixmap> {
    let size = IntSize::from_wh(width as u32, height as u32)?;
    let mut data = Vec::with_capacity(coverage.len() * 4);
    for &c in coverage {
        let a = scale_channel(c, color.a);
        data.extend_from_slice(&[
            scale_channel(color.r, a),
            scale_channel(color.g, a),
            scale_channel(color.b, a),
            a,
        ]);
    }
    Pixmap::from_vec(data, size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::SceneGraph;
    use std::io::Cursor;

    const RED: Color = Color::rgb(255, 0, 0);

    fn white(width: u32, height: u32) -> PageRaster {
        PageRaster::new(width, height, vec![255u8; (width * height * 4) as usize])
    }

    fn rgb_at(pixmap: &Pixmap, x: u32, y: u32) -> (u8, u8, u8) {
        let c = pixmap.pixel(x, y).unwrap().demultiply();
        (c.red(), c.green(), c.blue())
    }

    fn rect_object(rect: Rect, style: Style) -> SceneObject {
        SceneObject::new(
            Shape::Rect {
                rect,
                corner_radius: 0.0,
            },
            style,
        )
    }

    fn red_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([255, 0, 0, 255]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_background_size_must_match() {
        let raster = PageRaster::new(10, 10, vec![255u8; 12]);
        let err = Rasterizer::default().render(&raster, 1.0, []).unwrap_err();
        assert!(matches!(err, RasterError::BackgroundMismatch { width: 10, height: 10 }));

        let err = Rasterizer::default().render(&white(0, 10), 1.0, []).unwrap_err();
        assert!(matches!(err, RasterError::InvalidSize { .. }));
    }

    #[test]
    fn test_stroked_rect_leaves_inside_untouched() {
        let object = rect_object(Rect::new(10.0, 10.0, 80.0, 80.0), Style::stroke(RED, 4.0));
        let pixmap = Rasterizer::default()
            .render(&white(100, 100), 1.0, [&object])
            .unwrap();

        assert_eq!(rgb_at(&pixmap, 10, 50), (255, 0, 0));
        assert_eq!(rgb_at(&pixmap, 50, 50), (255, 255, 255));
        assert_eq!(rgb_at(&pixmap, 2, 2), (255, 255, 255));
    }

    #[test]
    fn test_scale_maps_page_space_to_pixels() {
        let object = rect_object(
            Rect::new(10.0, 10.0, 20.0, 20.0),
            Style::stroke(RED, 0.0).with_fill(Some(RED)),
        );
        let pixmap = Rasterizer::default()
            .render(&white(100, 100), 2.0, [&object])
            .unwrap();

        assert_eq!(rgb_at(&pixmap, 50, 50), (255, 0, 0));
        assert_eq!(rgb_at(&pixmap, 15, 15), (255, 255, 255));
        assert_eq!(rgb_at(&pixmap, 65, 65), (255, 255, 255));
    }

    #[test]
    fn test_opacity_blends_with_page() {
        let object = rect_object(
            Rect::new(0.0, 0.0, 20.0, 20.0),
            Style::stroke(Color::BLACK, 0.0)
                .with_fill(Some(Color::BLACK))
                .with_opacity(0.5),
        );
        let pixmap = Rasterizer::default()
            .render(&white(20, 20), 1.0, [&object])
            .unwrap();

        let (r, _, _) = rgb_at(&pixmap, 10, 10);
        assert!((120..=135).contains(&r), "got {r}");
    }

    #[test]
    fn test_paint_order_is_insertion_order() {
        let mut scene = SceneGraph::new();
        let solid = |color| Style::stroke(color, 0.0).with_fill(Some(color));
        scene.add(rect_object(Rect::new(0.0, 0.0, 20.0, 20.0), solid(RED)));
        scene.add(rect_object(Rect::new(0.0, 0.0, 20.0, 20.0), solid(Color::rgb(0, 0, 255))));

        let pixmap = Rasterizer::default()
            .render(&white(20, 20), 1.0, scene.iter())
            .unwrap();
        assert_eq!(rgb_at(&pixmap, 10, 10), (0, 0, 255));
    }

    #[test]
    fn test_image_is_scaled_into_rect() {
        let image = ImageData::from_encoded(red_png(2, 2)).unwrap();
        let object = SceneObject::new(
            Shape::Image {
                rect: Rect::new(10.0, 10.0, 40.0, 40.0),
                image,
            },
            Style::default(),
        );
        let pixmap = Rasterizer::default()
            .render(&white(60, 60), 1.0, [&object])
            .unwrap();

        assert_eq!(rgb_at(&pixmap, 30, 30), (255, 0, 0));
        assert_eq!(rgb_at(&pixmap, 55, 55), (255, 255, 255));
    }

    #[test]
    fn test_corrupt_image_is_reported() {
        let object = SceneObject::new(
            Shape::Image {
                rect: Rect::new(0.0, 0.0, 10.0, 10.0),
                image: ImageData {
                    encoded: std::sync::Arc::from(vec![0u8, 1, 2, 3]),
                    pixel_width: 1,
                    pixel_height: 1,
                },
            },
            Style::default(),
        );
        let err = Rasterizer::default()
            .render(&white(10, 10), 1.0, [&object])
            .unwrap_err();
        assert!(matches!(err, RasterError::Decode(_)));
    }

    #[test]
    fn test_text_without_fonts_draws_placeholders() {
        let object = SceneObject::new(
            Shape::Text {
                origin: Point::new(0.0, 0.0),
                content: "Hi".to_string(),
                font: FontDescriptor::default(),
            },
            Style::stroke(Color::BLACK, 0.0).with_fill(Some(Color::BLACK)),
        );
        let pixmap = Rasterizer::new(FontBook::empty())
            .render(&white(60, 30), 1.0, [&object])
            .unwrap();

        let inked = pixmap.pixels().iter().filter(|p| p.red() < 128).count();
        assert!(inked > 0);
    }

    #[test]
    fn test_collapsed_note_draws_disc() {
        let color = Color::rgb(0xfe, 0xf0, 0x8a);
        let object = SceneObject::new(
            Shape::Note {
                origin: Point::new(0.0, 0.0),
                text: "hello".to_string(),
                color,
                collapsed: true,
            },
            Style::default(),
        );
        let pixmap = Rasterizer::default()
            .render(&white(60, 60), 1.0, [&object])
            .unwrap();

        assert_eq!(rgb_at(&pixmap, 18, 8), (0xfe, 0xf0, 0x8a));
        assert_eq!(rgb_at(&pixmap, 50, 50), (255, 255, 255));
    }

    #[test]
    fn test_rgba_image_is_straight_alpha() {
        let mut pixmap = Pixmap::new(1, 1).unwrap();
        pixmap.fill(tiny_skia::Color::from_rgba8(200, 100, 50, 128));
        let image = to_rgba_image(&pixmap);
        let px = image.get_pixel(0, 0).0;

        assert_eq!(px[3], 128);
        assert!((px[0] as i16 - 200).abs() <= 2);
    }

    #[test]
    fn test_render_png_has_signature() {
        let png = Rasterizer::default()
            .render_png(&white(4, 4), 1.0, [])
            .unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }
}
