//! Content stream rasterization for the lopdf backend
//!
//! Draws the vector subset of a page: filled and stroked paths in device
//! colours, clipping paths, constant alpha from graphics state parameter
//! dictionaries, image XObjects and form XObjects. Text, shadings, pattern
//! fills and inline images are skipped and reported as [`ContentGap`]s.

use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

use image::{ImageFormat, Rgba};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use tiny_skia::{
    FillRule, FilterQuality, IntSize, LineCap, LineJoin, Mask, Paint, Path, PathBuilder, Pixmap,
    PixmapPaint, Stroke, StrokeDash, Transform,
};

use crate::{inherited, number, EngineError, PageSize, RgbaImage};

/// Form XObjects nested deeper than this are not drawn
const MAX_FORM_DEPTH: usize = 8;

/// Kind of page content the built-in renderer leaves out
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ContentGap {
    Text,
    Shading,
    Pattern,
    /// Indexed, Lab and DeviceN colour, drawn in black
    ColorSpace,
    InlineImage,
    /// Image XObject with an encoding the renderer cannot decode
    Image,
    /// Content stream that failed to parse
    Unreadable,
}

impl fmt::Display for ContentGap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Text => "text",
            Self::Shading => "shadings",
            Self::Pattern => "pattern fills",
            Self::ColorSpace => "special colour spaces",
            Self::InlineImage => "inline images",
            Self::Image => "images",
            Self::Unreadable => "unreadable content",
        })
    }
}

/// One page of a parsed document
#[derive(Debug, Clone)]
pub(crate) struct PageEntry {
    pub id: ObjectId,
    /// Normalized MediaBox: lower-left then upper-right corner
    pub media_box: [f32; 4],
    pub size: PageSize,
}

impl PageEntry {
    /// PDF user space to raster pixels, rotation applied
    fn device_transform(&self, scale: f32) -> Transform {
        let [x0, y0, x1, y1] = self.media_box;
        let s = scale;
        match self.size.rotation {
            90 => Transform::from_row(0.0, s, s, 0.0, -s * y0, -s * x0),
            180 => Transform::from_row(-s, 0.0, 0.0, s, s * x1, -s * y0),
            270 => Transform::from_row(0.0, -s, -s, 0.0, s * y1, s * x1),
            _ => Transform::from_row(s, 0.0, 0.0, -s, -s * x0, s * y1),
        }
    }
}

/// Rasterize `page` at `scale` pixels per point on a white sheet
pub(crate) fn render_page(
    doc: &Document,
    page: &PageEntry,
    scale: f32,
) -> Result<(RgbaImage, BTreeSet<ContentGap>), EngineError> {
    let (width_pt, height_pt) = page.size.displayed();
    let width = (width_pt * scale).round().max(1.0) as u32;
    let height = (height_pt * scale).round().max(1.0) as u32;
    let mut canvas = Pixmap::new(width, height).ok_or_else(|| {
        EngineError::Backend(format!("page raster of {width}x{height} pixels is too large"))
    })?;
    canvas.fill(tiny_skia::Color::WHITE);

    let mut interpreter = Interpreter::new(doc, Some(canvas), page.device_transform(scale));
    interpreter.run_page(page);
    let Interpreter { canvas, gaps, .. } = interpreter;

    let image = match canvas {
        Some(canvas) => to_image(&canvas),
        None => RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255])),
    };
    Ok((image, gaps))
}

/// Content of `page` that [`render_page`] would leave out, without drawing
pub(crate) fn scan_page(doc: &Document, page: &PageEntry) -> BTreeSet<ContentGap> {
    let mut interpreter = Interpreter::new(doc, None, Transform::identity());
    interpreter.run_page(page);
    interpreter.gaps
}

fn to_image(pixmap: &Pixmap) -> RgbaImage {
    RgbaImage::from_fn(pixmap.width(), pixmap.height(), |x, y| {
        pixmap
            .pixel(x, y)
            .map(|p| {
                let c = p.demultiply();
                Rgba([c.red(), c.green(), c.blue(), c.alpha()])
            })
            .unwrap_or(Rgba([255, 255, 255, 255]))
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ColorModel {
    Gray,
    Rgb,
    Cmyk,
    /// Single tint component, 1 is full ink
    Tint,
    Pattern,
    Unsupported,
}

#[derive(Clone)]
struct GraphicsState {
    ctm: Transform,
    fill: [u8; 3],
    stroke: [u8; 3],
    fill_model: ColorModel,
    stroke_model: ColorModel,
    fill_alpha: f32,
    stroke_alpha: f32,
    line_width: f32,
    line_cap: LineCap,
    line_join: LineJoin,
    miter_limit: f32,
    dash: Option<StrokeDash>,
    clip: Option<Rc<Mask>>,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            ctm: Transform::identity(),
            fill: [0, 0, 0],
            stroke: [0, 0, 0],
            fill_model: ColorModel::Gray,
            stroke_model: ColorModel::Gray,
            fill_alpha: 1.0,
            stroke_alpha: 1.0,
            line_width: 1.0,
            line_cap: LineCap::Butt,
            line_join: LineJoin::Miter,
            miter_limit: 10.0,
            dash: None,
            clip: None,
        }
    }
}

struct Interpreter<'a> {
    doc: &'a Document,
    /// `None` when only scanning for gaps
    canvas: Option<Pixmap>,
    device: Transform,
    state: GraphicsState,
    saved: Vec<GraphicsState>,
    path: PathBuilder,
    current: (f32, f32),
    pending_clip: Option<FillRule>,
    depth: usize,
    gaps: BTreeSet<ContentGap>,
}

impl<'a> Interpreter<'a> {
    fn new(doc: &'a Document, canvas: Option<Pixmap>, device: Transform) -> Self {
        Self {
            doc,
            canvas,
            device,
            state: GraphicsState::default(),
            saved: Vec::new(),
            path: PathBuilder::new(),
            current: (0.0, 0.0),
            pending_clip: None,
            depth: 0,
            gaps: BTreeSet::new(),
        }
    }

    fn run_page(&mut self, page: &PageEntry) {
        let content = match self.doc.get_page_content(page.id) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("page {:?} content could not be read: {e}", page.id);
                self.gaps.insert(ContentGap::Unreadable);
                return;
            }
        };
        let resources = inherited(self.doc, page.id, b"Resources").and_then(|o| o.as_dict().ok());
        self.run_stream(&content, resources);
    }

    fn run_stream(&mut self, bytes: &[u8], resources: Option<&'a Dictionary>) {
        match Content::decode(bytes) {
            Ok(content) => self.run(&content.operations, resources),
            Err(e) => {
                log::warn!("content stream could not be parsed: {e}");
                self.gaps.insert(ContentGap::Unreadable);
            }
        }
    }

    fn run(&mut self, operations: &[Operation], resources: Option<&'a Dictionary>) {
        for op in operations {
            let nums: Vec<f32> = op.operands.iter().filter_map(number).collect();
            match op.operator.as_str() {
                "q" => self.saved.push(self.state.clone()),
                "Q" => {
                    if let Some(state) = self.saved.pop() {
                        self.state = state;
                    }
                }
                "cm" => {
                    if let [a, b, c, d, e, f] = nums[..] {
                        self.state.ctm = self.state.ctm.pre_concat(Transform::from_row(a, b, c, d, e, f));
                    }
                }
                "w" => {
                    if let [width] = nums[..] {
                        self.state.line_width = width.max(0.0);
                    }
                }
                "J" => {
                    if let [cap] = nums[..] {
                        self.state.line_cap = match cap as i32 {
                            1 => LineCap::Round,
                            2 => LineCap::Square,
                            _ => LineCap::Butt,
                        };
                    }
                }
                "j" => {
                    if let [join] = nums[..] {
                        self.state.line_join = match join as i32 {
                            1 => LineJoin::Round,
                            2 => LineJoin::Bevel,
                            _ => LineJoin::Miter,
                        };
                    }
                }
                "M" => {
                    if let [limit] = nums[..] {
                        self.state.miter_limit = limit.max(1.0);
                    }
                }
                "d" => self.state.dash = dash_pattern(&op.operands),
                "gs" => {
                    if let Some(name) = first_name(&op.operands) {
                        self.apply_ext_state(resources, name);
                    }
                }
                "g" => self.set_fill(ColorModel::Gray, &nums),
                "G" => self.set_stroke(ColorModel::Gray, &nums),
                "rg" => self.set_fill(ColorModel::Rgb, &nums),
                "RG" => self.set_stroke(ColorModel::Rgb, &nums),
                "k" => self.set_fill(ColorModel::Cmyk, &nums),
                "K" => self.set_stroke(ColorModel::Cmyk, &nums),
                "cs" | "CS" => {
                    let model = first_name(&op.operands)
                        .map_or(ColorModel::Unsupported, |name| self.color_model(resources, name));
                    if op.operator == "cs" {
                        self.state.fill_model = model;
                        self.state.fill = [0, 0, 0];
                    } else {
                        self.state.stroke_model = model;
                        self.state.stroke = [0, 0, 0];
                    }
                }
                "sc" | "scn" => {
                    let model = self.state.fill_model;
                    self.set_fill(model, &nums);
                }
                "SC" | "SCN" => {
                    let model = self.state.stroke_model;
                    self.set_stroke(model, &nums);
                }
                "m" => {
                    if let [x, y] = nums[..] {
                        self.path.move_to(x, y);
                        self.current = (x, y);
                    }
                }
                "l" => {
                    if let [x, y] = nums[..] {
                        self.path.line_to(x, y);
                        self.current = (x, y);
                    }
                }
                "c" => {
                    if let [x1, y1, x2, y2, x, y] = nums[..] {
                        self.path.cubic_to(x1, y1, x2, y2, x, y);
                        self.current = (x, y);
                    }
                }
                "v" => {
                    if let [x2, y2, x, y] = nums[..] {
                        let (x1, y1) = self.current;
                        self.path.cubic_to(x1, y1, x2, y2, x, y);
                        self.current = (x, y);
                    }
                }
                "y" => {
                    if let [x1, y1, x, y] = nums[..] {
                        self.path.cubic_to(x1, y1, x, y, x, y);
                        self.current = (x, y);
                    }
                }
                "h" => self.path.close(),
                "re" => {
                    if let [x, y, w, h] = nums[..] {
                        self.path.move_to(x, y);
                        self.path.line_to(x + w, y);
                        self.path.line_to(x + w, y + h);
                        self.path.line_to(x, y + h);
                        self.path.close();
                        self.current = (x, y);
                    }
                }
                "W" => self.pending_clip = Some(FillRule::Winding),
                "W*" => self.pending_clip = Some(FillRule::EvenOdd),
                "n" => self.paint(None, false),
                "f" | "F" => self.paint(Some(FillRule::Winding), false),
                "f*" => self.paint(Some(FillRule::EvenOdd), false),
                "S" => self.paint(None, true),
                "s" => {
                    self.path.close();
                    self.paint(None, true);
                }
                "B" => self.paint(Some(FillRule::Winding), true),
                "B*" => self.paint(Some(FillRule::EvenOdd), true),
                "b" => {
                    self.path.close();
                    self.paint(Some(FillRule::Winding), true);
                }
                "b*" => {
                    self.path.close();
                    self.paint(Some(FillRule::EvenOdd), true);
                }
                "BT" => {
                    self.gaps.insert(ContentGap::Text);
                }
                "sh" => {
                    self.gaps.insert(ContentGap::Shading);
                }
                "BI" | "ID" | "EI" => {
                    self.gaps.insert(ContentGap::InlineImage);
                }
                "Do" => {
                    if let Some(name) = first_name(&op.operands) {
                        self.draw_xobject(resources, name);
                    }
                }
                _ => {}
            }
        }
    }

    fn set_fill(&mut self, model: ColorModel, components: &[f32]) {
        self.state.fill_model = model;
        if let Some(rgb) = self.to_rgb(model, components) {
            self.state.fill = rgb;
        }
    }

    fn set_stroke(&mut self, model: ColorModel, components: &[f32]) {
        self.state.stroke_model = model;
        if let Some(rgb) = self.to_rgb(model, components) {
            self.state.stroke = rgb;
        }
    }

    fn to_rgb(&mut self, model: ColorModel, c: &[f32]) -> Option<[u8; 3]> {
        let channel = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        match (model, c) {
            (ColorModel::Gray, [g]) => Some([channel(*g); 3]),
            (ColorModel::Tint, [t]) => Some([channel(1.0 - t); 3]),
            (ColorModel::Rgb, [r, g, b]) => Some([channel(*r), channel(*g), channel(*b)]),
            (ColorModel::Cmyk, [c, m, y, k]) => Some([
                channel((1.0 - c) * (1.0 - k)),
                channel((1.0 - m) * (1.0 - k)),
                channel((1.0 - y) * (1.0 - k)),
            ]),
            (ColorModel::Unsupported, _) => {
                self.gaps.insert(ContentGap::ColorSpace);
                Some([0, 0, 0])
            }
            _ => None,
        }
    }

    fn color_model(&self, resources: Option<&'a Dictionary>, name: &[u8]) -> ColorModel {
        match name {
            b"DeviceGray" | b"CalGray" | b"G" => return ColorModel::Gray,
            b"DeviceRGB" | b"CalRGB" | b"RGB" => return ColorModel::Rgb,
            b"DeviceCMYK" | b"CMYK" => return ColorModel::Cmyk,
            b"Pattern" => return ColorModel::Pattern,
            _ => {}
        }
        let Some(space) = resources.and_then(|r| lookup(self.doc, r, b"ColorSpace", name)) else {
            return ColorModel::Unsupported;
        };
        match space {
            Object::Name(base) => self.color_model(None, base),
            Object::Array(array) => match array.first().and_then(|o| o.as_name().ok()) {
                Some(b"ICCBased") => match icc_components(self.doc, array) {
                    Some(1) => ColorModel::Gray,
                    Some(3) => ColorModel::Rgb,
                    Some(4) => ColorModel::Cmyk,
                    _ => ColorModel::Unsupported,
                },
                Some(b"CalGray") => ColorModel::Gray,
                Some(b"CalRGB") => ColorModel::Rgb,
                Some(b"Separation") => ColorModel::Tint,
                Some(b"Pattern") => ColorModel::Pattern,
                _ => ColorModel::Unsupported,
            },
            _ => ColorModel::Unsupported,
        }
    }

    fn apply_ext_state(&mut self, resources: Option<&'a Dictionary>, name: &[u8]) {
        let Some(params) = resources
            .and_then(|r| lookup(self.doc, r, b"ExtGState", name))
            .and_then(|o| o.as_dict().ok())
        else {
            return;
        };
        let value = |key: &[u8]| params.get(key).ok().and_then(number);
        if let Some(alpha) = value(b"ca") {
            self.state.fill_alpha = alpha.clamp(0.0, 1.0);
        }
        if let Some(alpha) = value(b"CA") {
            self.state.stroke_alpha = alpha.clamp(0.0, 1.0);
        }
        if let Some(width) = value(b"LW") {
            self.state.line_width = width.max(0.0);
        }
    }

    /// End the current path with the given painting, then apply a pending clip
    fn paint(&mut self, fill: Option<FillRule>, stroke: bool) {
        let builder = std::mem::replace(&mut self.path, PathBuilder::new());
        let clip = self.pending_clip.take();
        let Some(path) = builder.finish() else {
            return;
        };
        let transform = self.device.pre_concat(self.state.ctm);

        if fill.is_some() && self.state.fill_model == ColorModel::Pattern {
            self.gaps.insert(ContentGap::Pattern);
        }
        if stroke && self.state.stroke_model == ColorModel::Pattern {
            self.gaps.insert(ContentGap::Pattern);
        }

        if let Some(canvas) = self.canvas.as_mut() {
            let mask = self.state.clip.as_deref();
            if let Some(rule) = fill.filter(|_| self.state.fill_model != ColorModel::Pattern) {
                let paint = solid(self.state.fill, self.state.fill_alpha);
                canvas.fill_path(&path, &paint, rule, transform, mask);
            }
            if stroke && self.state.stroke_model != ColorModel::Pattern {
                let paint = solid(self.state.stroke, self.state.stroke_alpha);
                let line = Stroke {
                    width: self.state.line_width,
                    miter_limit: self.state.miter_limit,
                    line_cap: self.state.line_cap,
                    line_join: self.state.line_join,
                    dash: self.state.dash.clone(),
                };
                canvas.stroke_path(&path, &paint, &line, transform, mask);
            }
        }

        if let Some(rule) = clip {
            self.intersect_clip(&path, rule, transform);
        }
    }

    fn intersect_clip(&mut self, path: &Path, rule: FillRule, transform: Transform) {
        let Some(canvas) = self.canvas.as_ref() else {
            return;
        };
        let mask = match self.state.clip.as_deref() {
            Some(existing) => {
                let mut mask = existing.clone();
                mask.intersect_path(path, rule, true, transform);
                Some(mask)
            }
            None => Mask::new(canvas.width(), canvas.height()).map(|mut mask| {
                mask.fill_path(path, rule, true, transform);
                mask
            }),
        };
        if let Some(mask) = mask {
            self.state.clip = Some(Rc::new(mask));
        }
    }

    fn draw_xobject(&mut self, resources: Option<&'a Dictionary>, name: &[u8]) {
        let Some(stream) = resources
            .and_then(|r| lookup(self.doc, r, b"XObject", name))
            .and_then(|o| o.as_stream().ok())
        else {
            log::debug!("missing XObject {}", String::from_utf8_lossy(name));
            return;
        };
        match stream.dict.get(b"Subtype").and_then(Object::as_name) {
            Ok(b"Image") => self.draw_image(stream),
            Ok(b"Form") => self.draw_form(stream, resources),
            _ => {}
        }
    }

    fn draw_image(&mut self, stream: &Stream) {
        if self.canvas.is_none() {
            if image_encoding(self.doc, stream).is_none() {
                self.gaps.insert(ContentGap::Image);
            }
            return;
        }
        let Some(image) = decode_image(self.doc, stream) else {
            self.gaps.insert(ContentGap::Image);
            return;
        };
        let Some(canvas) = self.canvas.as_mut() else {
            return;
        };
        // image space is the unit square with row 0 at the top
        let (w, h) = (image.width() as f32, image.height() as f32);
        let transform = self
            .device
            .pre_concat(self.state.ctm)
            .pre_concat(Transform::from_row(1.0 / w, 0.0, 0.0, -1.0 / h, 0.0, 1.0));
        let paint = PixmapPaint {
            opacity: self.state.fill_alpha,
            quality: FilterQuality::Bilinear,
            ..PixmapPaint::default()
        };
        canvas.draw_pixmap(0, 0, image.as_ref(), &paint, transform, self.state.clip.as_deref());
    }

    fn draw_form(&mut self, stream: &'a Stream, parent: Option<&'a Dictionary>) {
        if self.depth >= MAX_FORM_DEPTH {
            log::warn!("form XObjects nested deeper than {MAX_FORM_DEPTH}, skipping");
            return;
        }
        let Some(bytes) = stream_bytes(stream) else {
            self.gaps.insert(ContentGap::Unreadable);
            return;
        };
        let resources = stream
            .dict
            .get(b"Resources")
            .ok()
            .and_then(|o| resolve(self.doc, o))
            .and_then(|o| o.as_dict().ok())
            .or(parent);
        let matrix: Vec<f32> = stream
            .dict
            .get(b"Matrix")
            .ok()
            .and_then(|o| o.as_array().ok())
            .map(|array| array.iter().filter_map(number).collect())
            .unwrap_or_default();

        let outer = self.state.clone();
        let outer_depth = self.saved.len();
        if let [a, b, c, d, e, f] = matrix[..] {
            self.state.ctm = self.state.ctm.pre_concat(Transform::from_row(a, b, c, d, e, f));
        }
        self.depth += 1;
        self.run_stream(&bytes, resources);
        self.depth -= 1;
        self.saved.truncate(outer_depth);
        self.state = outer;
    }
}

fn solid(rgb: [u8; 3], alpha: f32) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(rgb[0], rgb[1], rgb[2], (alpha * 255.0).round() as u8);
    paint.anti_alias = true;
    paint
}

fn dash_pattern(operands: &[Object]) -> Option<StrokeDash> {
    let mut array: Vec<f32> = operands.first()?.as_array().ok()?.iter().filter_map(number).collect();
    if array.is_empty() {
        return None;
    }
    if array.len() % 2 == 1 {
        array.extend_from_within(..);
    }
    let phase = operands.get(1).and_then(number).unwrap_or(0.0);
    StrokeDash::new(array, phase)
}

fn first_name(operands: &[Object]) -> Option<&[u8]> {
    operands.first().and_then(|o| o.as_name().ok())
}

fn resolve<'d>(doc: &'d Document, object: &'d Object) -> Option<&'d Object> {
    match object {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// Named entry of a resource category, e.g. `/XObject /Im0`
fn lookup<'d>(
    doc: &'d Document,
    resources: &'d Dictionary,
    category: &[u8],
    name: &[u8],
) -> Option<&'d Object> {
    let entries = resolve(doc, resources.get(category).ok()?)?.as_dict().ok()?;
    resolve(doc, entries.get(name).ok()?)
}

fn icc_components(doc: &Document, array: &[Object]) -> Option<i64> {
    let profile = resolve(doc, array.get(1)?)?.as_stream().ok()?;
    profile.dict.get(b"N").ok()?.as_i64().ok()
}

fn stream_bytes(stream: &Stream) -> Option<Vec<u8>> {
    if stream.dict.has(b"Filter") {
        stream.decompressed_content().ok()
    } else {
        Some(stream.content.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ImageEncoding {
    Jpeg,
    /// Uncompressed or Flate samples, 8 bits per component
    Samples(usize),
}

fn filters(stream: &Stream) -> Vec<&[u8]> {
    match stream.dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.as_slice()],
        Ok(Object::Array(array)) => array.iter().filter_map(|o| o.as_name().ok()).collect(),
        _ => Vec::new(),
    }
}

fn image_encoding(doc: &Document, stream: &Stream) -> Option<ImageEncoding> {
    let dict = &stream.dict;
    if matches!(dict.get(b"ImageMask"), Ok(Object::Boolean(true))) {
        return None;
    }
    match filters(stream).as_slice() {
        [b"DCTDecode"] => return Some(ImageEncoding::Jpeg),
        [] | [b"FlateDecode"] => {}
        _ => return None,
    }
    if dict.get(b"BitsPerComponent").ok()?.as_i64().ok()? != 8 {
        return None;
    }
    let components = match resolve(doc, dict.get(b"ColorSpace").ok()?)? {
        Object::Name(name) => match name.as_slice() {
            b"DeviceGray" | b"CalGray" => 1,
            b"DeviceRGB" | b"CalRGB" => 3,
            b"DeviceCMYK" => 4,
            _ => return None,
        },
        Object::Array(array) if array.first().and_then(|o| o.as_name().ok()) == Some(&b"ICCBased"[..]) => {
            match icc_components(doc, array)? {
                n @ (1 | 3 | 4) => n as usize,
                _ => return None,
            }
        }
        _ => return None,
    };
    Some(ImageEncoding::Samples(components))
}

/// Premultiplied pixmap of an image XObject, soft mask applied
fn decode_image(doc: &Document, stream: &Stream) -> Option<Pixmap> {
    let (width, height, mut rgba) = match image_encoding(doc, stream)? {
        ImageEncoding::Jpeg => {
            let decoded = image::load_from_memory_with_format(&stream.content, ImageFormat::Jpeg)
                .ok()?
                .to_rgba8();
            (decoded.width(), decoded.height(), decoded.into_raw())
        }
        ImageEncoding::Samples(components) => {
            let width = u32::try_from(stream.dict.get(b"Width").ok()?.as_i64().ok()?).ok()?;
            let height = u32::try_from(stream.dict.get(b"Height").ok()?.as_i64().ok()?).ok()?;
            let samples = stream_bytes(stream)?;
            let pixels = width as usize * height as usize;
            if samples.len() < pixels * components {
                return None;
            }
            let mut rgba = Vec::with_capacity(pixels * 4);
            for px in samples.chunks_exact(components).take(pixels) {
                let rgb = match *px {
                    [g] => [g, g, g],
                    [r, g, b] => [r, g, b],
                    [c, m, y, k] => {
                        let ink = |v: u8| ((255 - v as u32) * (255 - k as u32) / 255) as u8;
                        [ink(c), ink(m), ink(y)]
                    }
                    _ => return None,
                };
                rgba.extend_from_slice(&[rgb[0], rgb[1], rgb[2], 255]);
            }
            (width, height, rgba)
        }
    };

    if let Some(alpha) = soft_mask(doc, stream, width, height) {
        for (px, a) in rgba.chunks_exact_mut(4).zip(alpha) {
            px[3] = a;
        }
    }
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u32;
        if a < 255 {
            for c in &mut px[..3] {
                *c = (*c as u32 * a / 255) as u8;
            }
        }
    }
    Pixmap::from_vec(rgba, IntSize::from_wh(width, height)?)
}

/// 8-bit gray SMask samples matching the image size
fn soft_mask(doc: &Document, stream: &Stream, width: u32, height: u32) -> Option<Vec<u8>> {
    let mask = resolve(doc, stream.dict.get(b"SMask").ok()?)?.as_stream().ok()?;
    if image_encoding(doc, mask)? != ImageEncoding::Samples(1) {
        return None;
    }
    let mask_width = mask.dict.get(b"Width").ok()?.as_i64().ok()?;
    let mask_height = mask.dict.get(b"Height").ok()?.as_i64().ok()?;
    if (mask_width, mask_height) != (width as i64, height as i64) {
        return None;
    }
    let samples = stream_bytes(mask)?;
    (samples.len() >= width as usize * height as usize).then_some(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LopdfEngine, OpenSource, RenderRequest, SourceLoader};
    use lopdf::dictionary;

    fn render(content: &[u8], scale: f32) -> (RgbaImage, Vec<ContentGap>) {
        let bytes = crate::build_document(&[((200.0, 100.0), content)]).unwrap();
        let mut engine = LopdfEngine::new();
        let handle = engine.open(OpenSource::Bytes(bytes)).unwrap();
        let image = engine.render_page(handle, RenderRequest { page_index: 0, scale }).unwrap();
        (image, engine.content_gaps(handle, 0).unwrap())
    }

    #[test]
    fn filled_page_renders_black() {
        let (image, gaps) = render(b"0 g 0 0 200 100 re f", 1.0);

        assert_eq!(image.dimensions(), (200, 100));
        assert_eq!(image.get_pixel(100, 50).0, [0, 0, 0, 255]);
        assert_eq!(image.get_pixel(0, 0).0, [0, 0, 0, 255]);
        assert!(gaps.is_empty());
    }

    #[test]
    fn empty_page_stays_white_without_border() {
        let (image, _) = render(b"", 2.0);

        assert_eq!(image.get_pixel(0, 0).0, [255, 255, 255, 255]);
        assert_eq!(image.get_pixel(399, 199).0, [255, 255, 255, 255]);
    }

    #[test]
    fn y_axis_points_up_in_user_space() {
        // red square in the lower-left quarter
        let (image, _) = render(b"1 0 0 rg 0 0 100 50 re f", 1.0);

        assert_eq!(image.get_pixel(50, 75).0, [255, 0, 0, 255]);
        assert_eq!(image.get_pixel(50, 25).0, [255, 255, 255, 255]);
        assert_eq!(image.get_pixel(150, 75).0, [255, 255, 255, 255]);
    }

    #[test]
    fn cm_and_graphics_state_stack() {
        let (image, _) = render(b"q 1 0 0 1 100 0 cm 0 0 1 rg 0 0 50 50 re f Q 0 0 50 50 re f", 1.0);

        assert_eq!(image.get_pixel(125, 75).0, [0, 0, 255, 255]);
        // colour restored to black by Q
        assert_eq!(image.get_pixel(25, 75).0, [0, 0, 0, 255]);
    }

    #[test]
    fn clip_limits_later_fills() {
        let (image, _) = render(b"0 0 100 100 re W n 0 g 0 0 200 100 re f", 1.0);

        assert_eq!(image.get_pixel(50, 50).0, [0, 0, 0, 255]);
        assert_eq!(image.get_pixel(150, 50).0, [255, 255, 255, 255]);
    }

    #[test]
    fn cmyk_stroke() {
        let (image, _) = render(b"0 1 1 0 K 10 w 0 50 m 200 50 l S", 1.0);

        assert_eq!(image.get_pixel(100, 50).0, [255, 0, 0, 255]);
        assert_eq!(image.get_pixel(100, 10).0, [255, 255, 255, 255]);
    }

    #[test]
    fn text_and_shading_reported_as_gaps() {
        let (image, gaps) = render(b"BT /F1 12 Tf 10 10 Td (Hi) Tj ET /Sh0 sh", 1.0);

        assert_eq!(gaps, vec![ContentGap::Text, ContentGap::Shading]);
        assert_eq!(image.get_pixel(20, 85).0, [255, 255, 255, 255]);
    }

    #[test]
    fn image_xobject_fills_its_unit_square() {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        // 2x1 image: red then green
        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 2,
                "Height" => 1,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            },
            vec![255, 0, 0, 0, 255, 0],
        ));
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            b"q 200 0 0 100 0 0 cm /Im0 Do Q".to_vec(),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(200),
                Object::Integer(100),
            ],
            "Contents" => content_id,
            "Resources" => dictionary! { "XObject" => dictionary! { "Im0" => image_id } },
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();

        let mut engine = LopdfEngine::new();
        let handle = engine.open(OpenSource::Bytes(bytes)).unwrap();
        let image = engine.render_page(handle, RenderRequest::default()).unwrap();

        let [r, g, _, _] = image.get_pixel(20, 50).0;
        assert!(r > 200 && g < 50, "left half should be red, got {r},{g}");
        let [r, g, _, _] = image.get_pixel(180, 50).0;
        assert!(g > 200 && r < 50, "right half should be green, got {r},{g}");
        assert!(engine.content_gaps(handle, 0).unwrap().is_empty());
    }
}
