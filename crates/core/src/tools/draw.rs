//! Drag-to-draw tools: lines, arrows and closed shapes
//!
//! All of them share one gesture: press away from existing objects, drag,
//! release. The provisional object is rebuilt from the anchor and the
//! current pointer on every move and committed once on release.

use crate::geometry::{Point, Rect};
use crate::scene::{SceneObject, Shape, Style};
use crate::shapes::{
    regular_polygon, speech_bubble, star_points, triangle_points, ARROW_HEAD_LENGTH,
    ROUNDED_RECT_RADIUS, STAR_INNER_RATIO, STAR_POINTS,
};

use super::{SceneChange, Tool, ToolContext, ToolKind, ToolOutcome};

/// Drags shorter than this in both axes commit nothing
const MIN_DRAG: f32 = 1.0;

#[derive(Debug, Clone, Copy)]
struct Gesture {
    anchor: Point,
    current: Point,
}

impl Gesture {
    fn is_degenerate(&self) -> bool {
        (self.current.x - self.anchor.x).abs() < MIN_DRAG
            && (self.current.y - self.anchor.y).abs() < MIN_DRAG
    }
}

/// Shared press/drag/release bookkeeping
///
/// `build` turns a gesture into the provisional object.
#[derive(Debug, Default)]
struct DragState {
    gesture: Option<Gesture>,
    style: Style,
}

impl DragState {
    fn begin(&mut self, ctx: &ToolContext<'_>, at: Point, style: Style) -> ToolOutcome {
        // pressing on an object never starts a shape on top of it
        if ctx.hit(at).is_some() {
            return ToolOutcome::Idle;
        }
        self.style = style;
        self.gesture = Some(Gesture {
            anchor: at,
            current: at,
        });
        ToolOutcome::Redraw
    }

    fn update(&mut self, at: Point) -> ToolOutcome {
        match self.gesture.as_mut() {
            Some(gesture) => {
                gesture.current = at;
                ToolOutcome::Redraw
            }
            None => ToolOutcome::Idle,
        }
    }

    fn finish(
        &mut self,
        ctx: &mut ToolContext<'_>,
        at: Point,
        build: impl Fn(&Gesture) -> Shape,
    ) -> ToolOutcome {
        self.update(at);
        let Some(gesture) = self.gesture.take() else {
            return ToolOutcome::Idle;
        };
        if gesture.is_degenerate() {
            return ToolOutcome::Redraw;
        }
        let object = SceneObject::new(build(&gesture), self.style.clone());
        ToolOutcome::Changed(SceneChange::Added(ctx.scene.add(object)))
    }

    fn preview(&self, build: impl Fn(&Gesture) -> Shape) -> Vec<SceneObject> {
        self.gesture
            .iter()
            .map(|g| SceneObject::new(build(g), self.style.clone()))
            .collect()
    }
}

fn stroke_style(ctx: &ToolContext<'_>) -> Style {
    Style::stroke(ctx.settings.stroke_color, ctx.settings.stroke_width)
        .with_opacity(ctx.settings.opacity)
}

fn shape_style(ctx: &ToolContext<'_>) -> Style {
    stroke_style(ctx).with_fill(ctx.settings.fill_color)
}

/// Straight line, optionally with an arrowhead at the release point
#[derive(Debug)]
pub struct LineTool {
    arrow: bool,
    drag: DragState,
}

impl LineTool {
    pub fn line() -> Self {
        Self {
            arrow: false,
            drag: DragState::default(),
        }
    }

    pub fn arrow() -> Self {
        Self {
            arrow: true,
            drag: DragState::default(),
        }
    }

    fn build(arrow: bool) -> impl Fn(&Gesture) -> Shape {
        move |g: &Gesture| {
            if arrow {
                Shape::Arrow {
                    start: g.anchor,
                    end: g.current,
                    head_length: ARROW_HEAD_LENGTH,
                }
            } else {
                Shape::Line {
                    start: g.anchor,
                    end: g.current,
                }
            }
        }
    }
}

impl Tool for LineTool {
    fn kind(&self) -> ToolKind {
        if self.arrow {
            ToolKind::Arrow
        } else {
            ToolKind::Line
        }
    }

    fn on_pointer_down(&mut self, ctx: &mut ToolContext<'_>, at: Point) -> ToolOutcome {
        let style = stroke_style(ctx);
        self.drag.begin(ctx, at, style)
    }

    fn on_pointer_move(&mut self, _ctx: &mut ToolContext<'_>, at: Point) -> ToolOutcome {
        self.drag.update(at)
    }

    fn on_pointer_up(&mut self, ctx: &mut ToolContext<'_>, at: Point) -> ToolOutcome {
        self.drag.finish(ctx, at, Self::build(self.arrow))
    }

    fn preview(&self) -> Vec<SceneObject> {
        self.drag.preview(Self::build(self.arrow))
    }

    fn cancel(&mut self) {
        self.drag.gesture = None;
    }
}

/// Closed shapes drawn by dragging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeVariant {
    Rect,
    RoundedRect,
    /// Centred on the press point
    Ellipse,
    Triangle,
    /// Centred on the press point
    Star,
    /// Centred on the press point
    Hexagon,
    SpeechBubble,
}

impl ShapeVariant {
    fn tool_kind(&self) -> ToolKind {
        match self {
            ShapeVariant::Rect => ToolKind::Rect,
            ShapeVariant::RoundedRect => ToolKind::RoundedRect,
            ShapeVariant::Ellipse => ToolKind::Circle,
            ShapeVariant::Triangle => ToolKind::Triangle,
            ShapeVariant::Star => ToolKind::Star,
            ShapeVariant::Hexagon => ToolKind::Hexagon,
            ShapeVariant::SpeechBubble => ToolKind::SpeechBubble,
        }
    }

    /// Geometry spanning the gesture
    ///
    /// Box shapes use the normalized rectangle between anchor and pointer,
    /// so reversed drags give the same result.
    pub fn build(&self, anchor: Point, current: Point) -> Shape {
        let rect = Rect::from_corners(anchor, current);
        let radius = rect.width.max(rect.height) / 2.0;
        match self {
            ShapeVariant::Rect => Shape::Rect {
                rect,
                corner_radius: 0.0,
            },
            ShapeVariant::RoundedRect => Shape::Rect {
                rect,
                corner_radius: ROUNDED_RECT_RADIUS,
            },
            ShapeVariant::Ellipse => Shape::Ellipse {
                center: anchor,
                rx: rect.width / 2.0,
                ry: rect.height / 2.0,
            },
            ShapeVariant::Triangle => Shape::Polygon {
                points: triangle_points(rect),
                closed: true,
            },
            ShapeVariant::Star => Shape::Polygon {
                points: star_points(anchor, STAR_POINTS, radius, radius * STAR_INNER_RATIO),
                closed: true,
            },
            ShapeVariant::Hexagon => Shape::Polygon {
                points: regular_polygon(anchor, 6, radius),
                closed: true,
            },
            ShapeVariant::SpeechBubble => Shape::Path {
                segments: speech_bubble(rect),
            },
        }
    }
}

#[derive(Debug)]
pub struct ShapeTool {
    variant: ShapeVariant,
    drag: DragState,
}

impl ShapeTool {
    pub fn new(variant: ShapeVariant) -> Self {
        Self {
            variant,
            drag: DragState::default(),
        }
    }

    fn builder(&self) -> impl Fn(&Gesture) -> Shape {
        let variant = self.variant;
        move |g: &Gesture| variant.build(g.anchor, g.current)
    }
}

impl Tool for ShapeTool {
    fn kind(&self) -> ToolKind {
        self.variant.tool_kind()
    }

    fn on_pointer_down(&mut self, ctx: &mut ToolContext<'_>, at: Point) -> ToolOutcome {
        let style = shape_style(ctx);
        self.drag.begin(ctx, at, style)
    }

    fn on_pointer_move(&mut self, _ctx: &mut ToolContext<'_>, at: Point) -> ToolOutcome {
        self.drag.update(at)
    }

    fn on_pointer_up(&mut self, ctx: &mut ToolContext<'_>, at: Point) -> ToolOutcome {
        let build = self.builder();
        self.drag.finish(ctx, at, build)
    }

    fn preview(&self) -> Vec<SceneObject> {
        self.drag.preview(self.builder())
    }

    fn cancel(&mut self) {
        self.drag.gesture = None;
    }
}
