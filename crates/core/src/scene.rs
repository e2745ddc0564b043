//! Scene graph: the ordered annotation objects of one page
//!
//! Insertion order is paint order. Geometry is in page space (see
//! [`crate::geometry`]). Snapshots are plain serde data, so a snapshot can be
//! written to JSON and read back without losing anything.

use base64::Engine as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

use crate::geometry::{distance_to_segment, Color, Point, Rect};
use crate::shapes::{self, NoteLayout, StampLayout};

/// Unique identifier for a scene object
///
/// Generated using UUID v4; survives snapshot round-trips.
pub type ObjectId = uuid::Uuid;

/// Object category, derived from the shape payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Path,
    Line,
    Arrow,
    Polygon,
    Ellipse,
    Rect,
    Text,
    Image,
    Group,
    Note,
    Stamp,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObjectKind::Path => "path",
            ObjectKind::Line => "line",
            ObjectKind::Arrow => "arrow",
            ObjectKind::Polygon => "polygon",
            ObjectKind::Ellipse => "ellipse",
            ObjectKind::Rect => "rect",
            ObjectKind::Text => "text",
            ObjectKind::Image => "image",
            ObjectKind::Group => "group",
            ObjectKind::Note => "note",
            ObjectKind::Stamp => "stamp",
        };
        f.write_str(name)
    }
}

/// Visual style of an object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Style {
    pub stroke: Color,
    #[serde(default)]
    pub fill: Option<Color>,
    pub stroke_width: f32,
    /// 0.0 to 1.0
    pub opacity: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dash: Option<Vec<f32>>,
}

impl Style {
    pub fn stroke(color: Color, width: f32) -> Self {
        Self {
            stroke: color,
            fill: None,
            stroke_width: width,
            opacity: 1.0,
            dash: None,
        }
    }

    pub fn with_fill(mut self, fill: Option<Color>) -> Self {
        self.fill = fill;
        self
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity.clamp(0.0, 1.0);
        self
    }

    pub fn with_dash(mut self, dash: Vec<f32>) -> Self {
        self.dash = Some(dash);
        self
    }
}

impl Default for Style {
    fn default() -> Self {
        Self::stroke(Color::BLACK, 1.0)
    }
}

/// Font selection for text objects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FontDescriptor {
    pub family: String,
    /// Size in points
    pub size: f32,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
}

impl Default for FontDescriptor {
    fn default() -> Self {
        Self {
            family: "Arial".to_string(),
            size: 16.0,
            bold: false,
            italic: false,
            underline: false,
        }
    }
}

/// One segment of a path outline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathSegment {
    MoveTo(Point),
    LineTo(Point),
    QuadTo { ctrl: Point, to: Point },
    Close,
}

impl PathSegment {
    fn points(&self) -> impl Iterator<Item = Point> {
        let pts: [Option<Point>; 2] = match *self {
            PathSegment::MoveTo(p) | PathSegment::LineTo(p) => [Some(p), None],
            PathSegment::QuadTo { ctrl, to } => [Some(ctrl), Some(to)],
            PathSegment::Close => [None, None],
        };
        pts.into_iter().flatten()
    }

    fn translate(&mut self, dx: f32, dy: f32) {
        match self {
            PathSegment::MoveTo(p) | PathSegment::LineTo(p) => *p = p.offset(dx, dy),
            PathSegment::QuadTo { ctrl, to } => {
                *ctrl = ctrl.offset(dx, dy);
                *to = to.offset(dx, dy);
            }
            PathSegment::Close => {}
        }
    }
}

/// Encoded raster payload (PNG or JPEG bytes)
///
/// Bytes are shared between snapshots; serialized as base64.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageData {
    #[serde(serialize_with = "encode_base64", deserialize_with = "decode_base64")]
    pub encoded: Arc<[u8]>,
    pub pixel_width: u32,
    pub pixel_height: u32,
}

impl ImageData {
    /// Wrap encoded bytes, decoding once to validate and read the size
    pub fn from_encoded(bytes: Vec<u8>) -> Result<Self, image::ImageError> {
        let decoded = image::load_from_memory(&bytes)?;
        Ok(Self {
            pixel_width: decoded.width(),
            pixel_height: decoded.height(),
            encoded: Arc::from(bytes),
        })
    }
}

fn encode_base64<S: Serializer>(bytes: &Arc<[u8]>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
}

fn decode_base64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Arc<[u8]>, D::Error> {
    let text = String::deserialize(deserializer)?;
    base64::engine::general_purpose::STANDARD
        .decode(text.as_bytes())
        .map(Arc::from)
        .map_err(serde::de::Error::custom)
}

/// Border drawn around stamp text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StampBorder {
    #[default]
    Rect,
    Rounded,
    Oval,
}

/// Geometry and payload of a scene object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Shape {
    /// Freehand strokes and speech bubbles
    Path { segments: Vec<PathSegment> },
    Line { start: Point, end: Point },
    Arrow { start: Point, end: Point, head_length: f32 },
    /// Closed for triangle/star/hexagon, open for polylines
    Polygon { points: Vec<Point>, closed: bool },
    Ellipse { center: Point, rx: f32, ry: f32 },
    Rect { rect: Rect, corner_radius: f32 },
    /// Text colour is the style fill (stroke when there is no fill)
    Text { origin: Point, content: String, font: FontDescriptor },
    Image { rect: Rect, image: ImageData },
    Group { children: Vec<SceneObject> },
    /// Sticky note; `origin` is the top-left of the card or of the collapsed disc
    Note { origin: Point, text: String, color: Color, collapsed: bool },
    Stamp { center: Point, text: String, color: Color, border: StampBorder },
}

impl Shape {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Shape::Path { .. } => ObjectKind::Path,
            Shape::Line { .. } => ObjectKind::Line,
            Shape::Arrow { .. } => ObjectKind::Arrow,
            Shape::Polygon { .. } => ObjectKind::Polygon,
            Shape::Ellipse { .. } => ObjectKind::Ellipse,
            Shape::Rect { .. } => ObjectKind::Rect,
            Shape::Text { .. } => ObjectKind::Text,
            Shape::Image { .. } => ObjectKind::Image,
            Shape::Group { .. } => ObjectKind::Group,
            Shape::Note { .. } => ObjectKind::Note,
            Shape::Stamp { .. } => ObjectKind::Stamp,
        }
    }

    /// Unrotated bounds in page space
    pub fn bounds(&self) -> Rect {
        match self {
            Shape::Path { segments } => {
                let points: Vec<Point> = segments.iter().flat_map(|s| s.points()).collect();
                Rect::bounding(&points).unwrap_or_default()
            }
            Shape::Line { start, end } => Rect::from_corners(*start, *end),
            Shape::Arrow {
                start,
                end,
                head_length,
            } => {
                let head = shapes::arrow_head(*start, *end, *head_length);
                Rect::bounding(head.iter().chain([start, end])).unwrap_or_default()
            }
            Shape::Polygon { points, .. } => Rect::bounding(points).unwrap_or_default(),
            Shape::Ellipse { center, rx, ry } => {
                Rect::new(center.x - rx, center.y - ry, rx * 2.0, ry * 2.0)
            }
            Shape::Rect { rect, .. } | Shape::Image { rect, .. } => *rect,
            Shape::Text {
                origin,
                content,
                font,
            } => {
                let (width, height) = shapes::measure_text(content, font);
                Rect::new(origin.x, origin.y, width, height)
            }
            Shape::Group { children } => children
                .iter()
                .map(SceneObject::bounds)
                .reduce(|a, b| a.union(&b))
                .unwrap_or_default(),
            Shape::Note {
                origin,
                text,
                collapsed,
                ..
            } => NoteLayout::new(*origin, text).bounds(*collapsed),
            Shape::Stamp {
                center,
                text,
                border,
                ..
            } => StampLayout::new(*center, text, *border).bounds(),
        }
    }

    pub fn translate(&mut self, dx: f32, dy: f32) {
        match self {
            Shape::Path { segments } => segments.iter_mut().for_each(|s| s.translate(dx, dy)),
            Shape::Line { start, end } | Shape::Arrow { start, end, .. } => {
                *start = start.offset(dx, dy);
                *end = end.offset(dx, dy);
            }
            Shape::Polygon { points, .. } => {
                points.iter_mut().for_each(|p| *p = p.offset(dx, dy));
            }
            Shape::Ellipse { center, .. } | Shape::Stamp { center, .. } => {
                *center = center.offset(dx, dy);
            }
            Shape::Rect { rect, .. } | Shape::Image { rect, .. } => *rect = rect.translate(dx, dy),
            Shape::Text { origin, .. } | Shape::Note { origin, .. } => {
                *origin = origin.offset(dx, dy);
            }
            Shape::Group { children } => {
                children.iter_mut().for_each(|c| c.shape.translate(dx, dy));
            }
        }
    }

    /// Segments used for stroke-distance hit testing, `None` when the shape
    /// is hit by its area instead
    fn hit_segments(&self, filled: bool) -> Option<Vec<(Point, Point)>> {
        let chain = |points: &[Point]| -> Vec<(Point, Point)> {
            points.windows(2).map(|w| (w[0], w[1])).collect()
        };
        match self {
            Shape::Line { start, end } => Some(vec![(*start, *end)]),
            Shape::Arrow {
                start,
                end,
                head_length,
            } => {
                let head = shapes::arrow_head(*start, *end, *head_length);
                let mut segments = vec![(*start, *end)];
                segments.extend(chain(&[head[0], head[1], head[2], head[0]]));
                Some(segments)
            }
            Shape::Polygon {
                points,
                closed: false,
            } => Some(chain(points)),
            Shape::Path { segments } if !filled => {
                let mut out = Vec::new();
                let mut current: Option<Point> = None;
                let mut start: Option<Point> = None;
                for segment in segments {
                    match *segment {
                        PathSegment::MoveTo(p) => {
                            current = Some(p);
                            start = Some(p);
                        }
                        PathSegment::LineTo(p) => {
                            if let Some(c) = current {
                                out.push((c, p));
                            }
                            current = Some(p);
                        }
                        PathSegment::QuadTo { ctrl, to } => {
                            if let Some(c) = current {
                                out.push((c, ctrl));
                                out.push((ctrl, to));
                            }
                            current = Some(to);
                        }
                        PathSegment::Close => {
                            if let (Some(c), Some(s)) = (current, start) {
                                out.push((c, s));
                            }
                            current = start;
                        }
                    }
                }
                // a single-point path is still hittable
                if out.is_empty() {
                    if let Some(p) = current {
                        out.push((p, p));
                    }
                }
                Some(out)
            }
            _ => None,
        }
    }
}

/// One drawable annotation unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    pub id: ObjectId,
    pub shape: Shape,
    pub style: Style,
    /// Degrees, clockwise, about the centre of the unrotated bounds
    #[serde(default)]
    pub rotation: f32,
}

impl SceneObject {
    /// Create an object with a fresh id
    pub fn new(shape: Shape, style: Style) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            shape,
            style,
            rotation: 0.0,
        }
    }

    pub fn with_rotation(mut self, degrees: f32) -> Self {
        self.rotation = degrees;
        self
    }

    pub fn kind(&self) -> ObjectKind {
        self.shape.kind()
    }

    pub fn bounds(&self) -> Rect {
        self.shape.bounds()
    }

    /// Hit test in page space, rotation aware
    ///
    /// Strokes (lines, arrows, open polylines, unfilled paths) are hit within
    /// `tolerance` of the stroke; everything else by its bounds.
    pub fn contains_point(&self, point: Point, tolerance: f32) -> bool {
        let bounds = self.bounds();
        let local = point.rotated_about(bounds.center(), -self.rotation);

        match self.shape.hit_segments(self.style.fill.is_some()) {
            Some(segments) => {
                let reach = tolerance + self.style.stroke_width / 2.0;
                segments
                    .iter()
                    .any(|(a, b)| distance_to_segment(local, *a, *b) <= reach)
            }
            None => bounds.inflate(tolerance).contains(local),
        }
    }

    pub fn translate(&mut self, dx: f32, dy: f32) {
        self.shape.translate(dx, dy);
    }

    /// Text content for text, note and stamp objects
    pub fn text(&self) -> Option<&str> {
        match &self.shape {
            Shape::Text { content, .. } => Some(content),
            Shape::Note { text, .. } | Shape::Stamp { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn is_collapsed_note(&self) -> bool {
        matches!(self.shape, Shape::Note { collapsed: true, .. })
    }
}

/// Partial update merged into an existing object
///
/// Fields left `None` are untouched. Fields that do not apply to the
/// object's shape (e.g. `collapsed` on a rectangle) are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectPatch {
    pub stroke: Option<Color>,
    pub fill: Option<Option<Color>>,
    pub stroke_width: Option<f32>,
    pub opacity: Option<f32>,
    pub rotation: Option<f32>,
    /// Translation delta
    pub translate: Option<Point>,
    /// Replacement geometry; must keep the same kind
    pub shape: Option<Shape>,
    pub text: Option<String>,
    pub font: Option<FontDescriptor>,
    pub color: Option<Color>,
    pub collapsed: Option<bool>,
}

impl ObjectPatch {
    pub fn translate(dx: f32, dy: f32) -> Self {
        Self {
            translate: Some(Point::new(dx, dy)),
            ..Default::default()
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn collapsed(collapsed: bool) -> Self {
        Self {
            collapsed: Some(collapsed),
            ..Default::default()
        }
    }

    fn apply(&self, object: &mut SceneObject) {
        if let Some(stroke) = self.stroke {
            object.style.stroke = stroke;
        }
        if let Some(fill) = self.fill {
            object.style.fill = fill;
        }
        if let Some(width) = self.stroke_width {
            object.style.stroke_width = width.max(0.0);
        }
        if let Some(opacity) = self.opacity {
            object.style.opacity = opacity.clamp(0.0, 1.0);
        }
        if let Some(rotation) = self.rotation {
            object.rotation = rotation;
        }
        if let Some(shape) = &self.shape {
            if shape.kind() == object.kind() {
                object.shape = shape.clone();
            } else {
                log::warn!(
                    "ignoring shape patch changing {} into {}",
                    object.kind(),
                    shape.kind()
                );
            }
        }
        if let Some(delta) = self.translate {
            object.translate(delta.x, delta.y);
        }

        match &mut object.shape {
            Shape::Text { content, font, .. } => {
                if let Some(text) = &self.text {
                    *content = text.clone();
                }
                if let Some(new_font) = &self.font {
                    *font = new_font.clone();
                }
            }
            Shape::Note {
                text,
                color,
                collapsed,
                ..
            } => {
                if let Some(new_text) = &self.text {
                    *text = new_text.clone();
                }
                if let Some(new_color) = self.color {
                    *color = new_color;
                }
                if let Some(state) = self.collapsed {
                    *collapsed = state;
                }
            }
            Shape::Stamp { text, color, .. } => {
                if let Some(new_text) = &self.text {
                    *text = new_text.clone();
                }
                if let Some(new_color) = self.color {
                    *color = new_color;
                }
            }
            _ => {}
        }
    }
}

/// Serialized copy of a scene graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneSnapshot {
    pub objects: Vec<SceneObject>,
}

impl SceneSnapshot {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// Ordered set of annotation objects belonging to one page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneGraph {
    objects: Vec<SceneObject>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an object on top of the paint order
    ///
    /// An id that already exists in the graph is replaced by a fresh one;
    /// the id actually used is returned.
    pub fn add(&mut self, mut object: SceneObject) -> ObjectId {
        if self.contains(object.id) {
            object.id = uuid::Uuid::new_v4();
        }
        let id = object.id;
        self.objects.push(object);
        id
    }

    /// Remove an object; absent ids are a no-op
    pub fn remove(&mut self, id: ObjectId) -> Option<SceneObject> {
        let index = self.objects.iter().position(|o| o.id == id)?;
        Some(self.objects.remove(index))
    }

    /// Merge `patch` into an object. Returns `false` if the id is unknown.
    pub fn update(&mut self, id: ObjectId, patch: &ObjectPatch) -> bool {
        match self.get_mut(id) {
            Some(object) => {
                patch.apply(object);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: ObjectId) -> Option<&SceneObject> {
        self.objects.iter().find(|o| o.id == id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut SceneObject> {
        self.objects.iter_mut().find(|o| o.id == id)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.iter().any(|o| o.id == id)
    }

    /// Objects in paint order (bottom first)
    pub fn iter(&self) -> impl Iterator<Item = &SceneObject> {
        self.objects.iter()
    }

    pub fn objects(&self) -> &[SceneObject] {
        &self.objects
    }

    pub fn objects_of_kind(&self, kind: ObjectKind) -> impl Iterator<Item = &SceneObject> {
        self.objects.iter().filter(move |o| o.kind() == kind)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn clear(&mut self) {
        self.objects.clear();
    }

    /// Topmost object under `point`
    pub fn hit_test(&self, point: Point, tolerance: f32) -> Option<ObjectId> {
        self.objects
            .iter()
            .rev()
            .find(|o| o.contains_point(point, tolerance))
            .map(|o| o.id)
    }

    /// Move an object to the top of the paint order
    pub fn bring_to_front(&mut self, id: ObjectId) -> bool {
        match self.remove(id) {
            Some(object) => {
                self.objects.push(object);
                true
            }
            None => false,
        }
    }

    pub fn to_snapshot(&self) -> SceneSnapshot {
        SceneSnapshot {
            objects: self.objects.clone(),
        }
    }

    pub fn from_snapshot(snapshot: &SceneSnapshot) -> Self {
        let mut graph = Self::new();
        graph.restore(snapshot);
        graph
    }

    /// Replace every object with the snapshot's contents
    pub fn restore(&mut self, snapshot: &SceneSnapshot) {
        self.objects.clear();
        for object in &snapshot.objects {
            self.add(object.clone());
        }
    }
}
