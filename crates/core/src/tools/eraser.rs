//! Object eraser

use crate::geometry::Point;

use super::{SceneChange, Tool, ToolContext, ToolKind, ToolOutcome};

/// Removes the topmost object under the pointer, one per click
pub struct EraserTool;

impl Tool for EraserTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Eraser
    }

    fn on_pointer_down(&mut self, ctx: &mut ToolContext<'_>, at: Point) -> ToolOutcome {
        let Some(id) = ctx.hit(at) else {
            return ToolOutcome::Idle;
        };
        ctx.scene.remove(id);
        if *ctx.selection == Some(id) {
            *ctx.selection = None;
        }
        ToolOutcome::Changed(SceneChange::Removed(id))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Harness;
    use super::*;
    use crate::geometry::{Color, Rect};
    use crate::scene::{SceneObject, Shape, Style};

    #[test]
    fn test_erases_topmost_only() {
        let mut harness = Harness::new();
        let rect = |x| {
            SceneObject::new(
                Shape::Rect {
                    rect: Rect::new(x, 0.0, 100.0, 100.0),
                    corner_radius: 0.0,
                },
                Style::stroke(Color::BLACK, 1.0),
            )
        };
        let below = harness.scene.add(rect(0.0));
        let above = harness.scene.add(rect(50.0));
        harness.selection = Some(above);

        let outcome = EraserTool.on_pointer_down(&mut harness.ctx(), Point::new(75.0, 50.0));

        assert_eq!(outcome, ToolOutcome::Changed(SceneChange::Removed(above)));
        assert_eq!(harness.selection, None);
        assert!(harness.scene.contains(below));
        assert_eq!(
            EraserTool.on_pointer_down(&mut harness.ctx(), Point::new(500.0, 500.0)),
            ToolOutcome::Idle
        );
    }
}
