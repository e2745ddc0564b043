//! Pen and highlighter strokes

use crate::geometry::Point;
use crate::scene::{SceneObject, Shape, Style};
use crate::shapes::smooth_stroke;

use super::{SceneChange, Tool, ToolContext, ToolKind, ToolOutcome};

/// Freehand stroke capture
///
/// Samples are collected while the pointer is down and smoothed into a
/// single path on release. The highlighter is the same tool with a fixed
/// translucent colour and a wide nib.
#[derive(Debug)]
pub struct FreehandTool {
    kind: ToolKind,
    trail: Vec<Point>,
    drawing: bool,
    /// Resolved when the stroke starts
    style: Style,
}

impl FreehandTool {
    pub fn pen() -> Self {
        Self {
            kind: ToolKind::Pen,
            trail: Vec::new(),
            drawing: false,
            style: Style::default(),
        }
    }

    pub fn highlighter() -> Self {
        Self {
            kind: ToolKind::Highlight,
            ..Self::pen()
        }
    }

    fn resolve_style(&self, ctx: &ToolContext<'_>) -> Style {
        match self.kind {
            ToolKind::Highlight => {
                Style::stroke(ctx.config.highlighter_color, ctx.config.highlighter_width)
            }
            _ => Style::stroke(ctx.settings.stroke_color, ctx.settings.stroke_width)
                .with_opacity(ctx.settings.opacity),
        }
    }

    fn stroke(&self) -> SceneObject {
        SceneObject::new(
            Shape::Path {
                segments: smooth_stroke(&self.trail),
            },
            self.style.clone(),
        )
    }
}

impl Tool for FreehandTool {
    fn kind(&self) -> ToolKind {
        self.kind
    }

    fn on_pointer_down(&mut self, ctx: &mut ToolContext<'_>, at: Point) -> ToolOutcome {
        self.style = self.resolve_style(ctx);
        self.trail.clear();
        self.trail.push(at);
        self.drawing = true;
        ToolOutcome::Redraw
    }

    fn on_pointer_move(&mut self, _ctx: &mut ToolContext<'_>, at: Point) -> ToolOutcome {
        if !self.drawing || self.trail.last() == Some(&at) {
            return ToolOutcome::Idle;
        }
        self.trail.push(at);
        ToolOutcome::Redraw
    }

    fn on_pointer_up(&mut self, ctx: &mut ToolContext<'_>, at: Point) -> ToolOutcome {
        if !self.drawing {
            return ToolOutcome::Idle;
        }
        self.on_pointer_move(ctx, at);
        self.drawing = false;

        // a click without movement leaves no stroke
        if self.trail.len() < 2 {
            self.trail.clear();
            return ToolOutcome::Redraw;
        }
        let object = self.stroke();
        self.trail.clear();
        ToolOutcome::Changed(SceneChange::Added(ctx.scene.add(object)))
    }

    fn preview(&self) -> Vec<SceneObject> {
        if !self.drawing || self.trail.len() < 2 {
            return Vec::new();
        }
        vec![self.stroke()]
    }

    fn cancel(&mut self) {
        self.trail.clear();
        self.drawing = false;
    }
}
