//! Multi-click polyline

use crate::geometry::Point;
use crate::scene::{SceneObject, Shape, Style};

use super::{SceneChange, Tool, ToolContext, ToolKind, ToolOutcome};

const MARKER_RADIUS: f32 = 4.0;
const GUIDE_DASH: [f32; 2] = [5.0, 5.0];
const GUIDE_OPACITY: f32 = 0.5;

/// Each click adds a vertex; a double-click finishes the line
///
/// Until then the placed segments, a dashed guide to the pointer and a dot
/// on every vertex exist only as preview objects.
#[derive(Debug, Default)]
pub struct PolylineTool {
    points: Vec<Point>,
    pointer: Option<Point>,
    style: Style,
}

impl PolylineTool {
    /// Vertices placed so far
    pub fn points(&self) -> &[Point] {
        &self.points
    }
}

impl Tool for PolylineTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Polyline
    }

    fn on_pointer_down(&mut self, ctx: &mut ToolContext<'_>, at: Point) -> ToolOutcome {
        if self.points.is_empty() {
            if ctx.hit(at).is_some() {
                return ToolOutcome::Idle;
            }
            self.style = Style::stroke(ctx.settings.stroke_color, ctx.settings.stroke_width)
                .with_opacity(ctx.settings.opacity);
        }
        self.points.push(at);
        self.pointer = Some(at);
        ToolOutcome::Redraw
    }

    fn on_pointer_move(&mut self, _ctx: &mut ToolContext<'_>, at: Point) -> ToolOutcome {
        if self.points.is_empty() {
            return ToolOutcome::Idle;
        }
        self.pointer = Some(at);
        ToolOutcome::Redraw
    }

    fn on_double_click(&mut self, ctx: &mut ToolContext<'_>, _at: Point) -> ToolOutcome {
        // the clicks of a double-click each placed a vertex on the same spot
        let mut points = std::mem::take(&mut self.points);
        points.dedup();
        self.pointer = None;

        if points.len() < 2 {
            return ToolOutcome::Redraw;
        }
        let object = SceneObject::new(
            Shape::Polygon {
                points,
                closed: false,
            },
            self.style.clone(),
        );
        ToolOutcome::Changed(SceneChange::Added(ctx.scene.add(object)))
    }

    fn preview(&self) -> Vec<SceneObject> {
        let Some(last) = self.points.last() else {
            return Vec::new();
        };
        let mut objects = Vec::new();

        if self.points.len() > 1 {
            objects.push(SceneObject::new(
                Shape::Polygon {
                    points: self.points.clone(),
                    closed: false,
                },
                self.style.clone(),
            ));
        }
        if let Some(pointer) = self.pointer.filter(|p| p != last) {
            objects.push(SceneObject::new(
                Shape::Line {
                    start: *last,
                    end: pointer,
                },
                self.style
                    .clone()
                    .with_opacity(GUIDE_OPACITY)
                    .with_dash(GUIDE_DASH.to_vec()),
            ));
        }
        let marker = Style::stroke(self.style.stroke, 0.0).with_fill(Some(self.style.stroke));
        objects.extend(self.points.iter().map(|p| {
            SceneObject::new(
                Shape::Ellipse {
                    center: *p,
                    rx: MARKER_RADIUS,
                    ry: MARKER_RADIUS,
                },
                marker.clone(),
            )
        }));
        objects
    }

    fn cancel(&mut self) {
        self.points.clear();
        self.pointer = None;
    }
}
