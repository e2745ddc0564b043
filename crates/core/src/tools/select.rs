//! Selection: pick, move, and open objects for editing

use crate::geometry::Point;
use crate::scene::{ObjectId, ObjectPatch, Shape};
use crate::shapes::NOTE_COLLAPSED_RADIUS;

use super::note::expand_patch;
use super::text::EditTarget;
use super::{SceneChange, Tool, ToolContext, ToolKind, ToolOutcome};

#[derive(Debug, Clone, Copy)]
struct Drag {
    id: ObjectId,
    start: Point,
    last: Point,
}

/// Click to select, drag to move
///
/// The object follows the pointer live; the move is committed as one
/// change on release. Clicking a collapsed note expands it instead.
#[derive(Debug, Default)]
pub struct SelectTool {
    drag: Option<Drag>,
    /// Note expanded by a press and where that press landed
    ///
    /// The card opens at an offset, so the double-click that started with
    /// that press no longer hits it.
    expanded: Option<(ObjectId, Point)>,
}

impl SelectTool {
    fn recently_expanded(&self, at: Point) -> Option<ObjectId> {
        self.expanded
            .filter(|(_, pressed)| pressed.distance_to(&at) <= NOTE_COLLAPSED_RADIUS)
            .map(|(id, _)| id)
    }
}

impl Tool for SelectTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Select
    }

    fn on_deactivate(&mut self, ctx: &mut ToolContext<'_>) {
        // an unfinished move is put back
        if let Some(drag) = self.drag.take() {
            let dx = drag.start.x - drag.last.x;
            let dy = drag.start.y - drag.last.y;
            if dx != 0.0 || dy != 0.0 {
                ctx.scene.update(drag.id, &ObjectPatch::translate(dx, dy));
            }
        }
    }

    fn on_pointer_down(&mut self, ctx: &mut ToolContext<'_>, at: Point) -> ToolOutcome {
        if self.recently_expanded(at).is_none() {
            self.expanded = None;
        }
        let Some(id) = ctx.hit(at) else {
            self.drag = None;
            return match ctx.selection.take() {
                Some(_) => ToolOutcome::Redraw,
                None => ToolOutcome::Idle,
            };
        };
        *ctx.selection = Some(id);

        if let Some(patch) = ctx.scene.get(id).and_then(expand_patch) {
            ctx.scene.update(id, &patch);
            self.expanded = Some((id, at));
            log::debug!("expanded note {id}");
            return ToolOutcome::Changed(SceneChange::Modified(id));
        }

        self.drag = Some(Drag {
            id,
            start: at,
            last: at,
        });
        ToolOutcome::Redraw
    }

    fn on_pointer_move(&mut self, ctx: &mut ToolContext<'_>, at: Point) -> ToolOutcome {
        let Some(drag) = self.drag.as_mut() else {
            return ToolOutcome::Idle;
        };
        let (dx, dy) = (at.x - drag.last.x, at.y - drag.last.y);
        if dx == 0.0 && dy == 0.0 {
            return ToolOutcome::Idle;
        }
        drag.last = at;
        ctx.scene.update(drag.id, &ObjectPatch::translate(dx, dy));
        ToolOutcome::Redraw
    }

    fn on_pointer_up(&mut self, ctx: &mut ToolContext<'_>, at: Point) -> ToolOutcome {
        self.on_pointer_move(ctx, at);
        match self.drag.take() {
            Some(drag) if drag.last != drag.start => {
                ToolOutcome::Changed(SceneChange::Modified(drag.id))
            }
            _ => ToolOutcome::Idle,
        }
    }

    fn on_double_click(&mut self, ctx: &mut ToolContext<'_>, at: Point) -> ToolOutcome {
        let expanded = self.recently_expanded(at);
        self.expanded = None;
        let target = |id: ObjectId| match ctx.scene.get(id).map(|o| &o.shape) {
            Some(Shape::Text { .. }) => Some(EditTarget::Text { id }),
            Some(Shape::Note { .. }) => Some(EditTarget::Note { id }),
            _ => None,
        };
        match ctx.hit(at).and_then(target).or_else(|| expanded.and_then(target)) {
            Some(edit) => ToolOutcome::BeginEdit(edit),
            None => ToolOutcome::Idle,
        }
    }

    fn cancel(&mut self) {
        self.drag = None;
        self.expanded = None;
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Harness;
    use super::*;
    use crate::geometry::{Color, Rect};
    use crate::scene::{SceneObject, Style};

    fn add_rect(harness: &mut Harness) -> ObjectId {
        harness.scene.add(SceneObject::new(
            Shape::Rect {
                rect: Rect::new(10.0, 10.0, 50.0, 50.0),
                corner_radius: 0.0,
            },
            Style::stroke(Color::BLACK, 1.0),
        ))
    }

    #[test]
    fn test_click_selects_and_empty_click_clears() {
        let mut harness = Harness::new();
        let id = add_rect(&mut harness);
        let mut tool = SelectTool::default();

        tool.on_pointer_down(&mut harness.ctx(), Point::new(20.0, 20.0));
        tool.on_pointer_up(&mut harness.ctx(), Point::new(20.0, 20.0));
        assert_eq!(harness.selection, Some(id));

        tool.on_pointer_down(&mut harness.ctx(), Point::new(400.0, 400.0));
        assert_eq!(harness.selection, None);
    }

    #[test]
    fn test_drag_moves_and_commits_once() {
        let mut harness = Harness::new();
        let id = add_rect(&mut harness);
        let mut tool = SelectTool::default();

        let outcome = harness.drag(&mut tool, Point::new(20.0, 20.0), Point::new(50.0, 40.0));

        assert_eq!(outcome, ToolOutcome::Changed(SceneChange::Modified(id)));
        assert_eq!(harness.scene.get(id).unwrap().bounds(), Rect::new(40.0, 30.0, 50.0, 50.0));
    }

    #[test]
    fn test_click_without_move_is_not_a_change() {
        let mut harness = Harness::new();
        add_rect(&mut harness);
        let mut tool = SelectTool::default();

        tool.on_pointer_down(&mut harness.ctx(), Point::new(20.0, 20.0));
        let outcome = tool.on_pointer_up(&mut harness.ctx(), Point::new(20.0, 20.0));
        assert_eq!(outcome, ToolOutcome::Idle);
    }

    #[test]
    fn test_deactivate_mid_drag_restores_position() {
        let mut harness = Harness::new();
        let id = add_rect(&mut harness);
        let mut tool = SelectTool::default();

        tool.on_pointer_down(&mut harness.ctx(), Point::new(20.0, 20.0));
        tool.on_pointer_move(&mut harness.ctx(), Point::new(80.0, 80.0));
        tool.on_deactivate(&mut harness.ctx());

        assert_eq!(harness.scene.get(id).unwrap().bounds(), Rect::new(10.0, 10.0, 50.0, 50.0));
    }

    #[test]
    fn test_click_collapsed_note_expands() {
        let mut harness = Harness::new();
        let id = harness.scene.add(SceneObject::new(
            Shape::Note {
                origin: Point::new(100.0, 100.0),
                text: "later".to_string(),
                color: Color::rgb(0xfe, 0xf0, 0x8a),
                collapsed: true,
            },
            Style::default(),
        ));
        let mut tool = SelectTool::default();

        let outcome = tool.on_pointer_down(&mut harness.ctx(), Point::new(110.0, 110.0));

        assert_eq!(outcome, ToolOutcome::Changed(SceneChange::Modified(id)));
        assert!(!harness.scene.get(id).unwrap().is_collapsed_note());
    }

    #[test]
    fn test_double_click_on_collapsed_note_opens_it() {
        let mut harness = Harness::new();
        let id = harness.scene.add(SceneObject::new(
            Shape::Note {
                origin: Point::new(220.0, 225.0),
                text: "later".to_string(),
                color: Color::rgb(0xfe, 0xf0, 0x8a),
                collapsed: true,
            },
            Style::default(),
        ));
        let disc = Point::new(238.0, 243.0);
        let mut tool = SelectTool::default();

        tool.on_pointer_down(&mut harness.ctx(), disc);
        tool.on_pointer_up(&mut harness.ctx(), disc);
        assert!(!harness.scene.get(id).unwrap().bounds().contains(disc));
        tool.on_pointer_down(&mut harness.ctx(), disc);
        tool.on_pointer_up(&mut harness.ctx(), disc);

        assert_eq!(
            tool.on_double_click(&mut harness.ctx(), disc),
            ToolOutcome::BeginEdit(EditTarget::Note { id })
        );
        // the fallback is spent once used
        assert_eq!(tool.on_double_click(&mut harness.ctx(), disc), ToolOutcome::Idle);
    }

    #[test]
    fn test_press_elsewhere_forgets_expanded_note() {
        let mut harness = Harness::new();
        harness.scene.add(SceneObject::new(
            Shape::Note {
                origin: Point::new(220.0, 225.0),
                text: "later".to_string(),
                color: Color::rgb(0xfe, 0xf0, 0x8a),
                collapsed: true,
            },
            Style::default(),
        ));
        let mut tool = SelectTool::default();

        tool.on_pointer_down(&mut harness.ctx(), Point::new(238.0, 243.0));
        tool.on_pointer_up(&mut harness.ctx(), Point::new(238.0, 243.0));
        tool.on_pointer_down(&mut harness.ctx(), Point::new(20.0, 600.0));

        assert_eq!(
            tool.on_double_click(&mut harness.ctx(), Point::new(238.0, 243.0)),
            ToolOutcome::Idle
        );
    }

    #[test]
    fn test_double_click_text_begins_edit() {
        let mut harness = Harness::new();
        let id = harness.scene.add(SceneObject::new(
            Shape::Text {
                origin: Point::new(0.0, 0.0),
                content: "Hello".to_string(),
                font: Default::default(),
            },
            Style::default(),
        ));
        let rect = add_rect(&mut harness);
        let mut tool = SelectTool::default();

        assert_eq!(
            tool.on_double_click(&mut harness.ctx(), Point::new(5.0, 5.0)),
            ToolOutcome::BeginEdit(EditTarget::Text { id })
        );
        let inside_rect = harness.scene.get(rect).unwrap().bounds().center();
        assert_eq!(tool.on_double_click(&mut harness.ctx(), inside_rect), ToolOutcome::Idle);
    }
}
