//! Sticky notes
//!
//! A note is a coloured card anchored above the point the user clicked.
//! After it is confirmed the session schedules a collapse, which shrinks it
//! to a small disc; clicking the disc with the select tool expands it again.

use crate::config::ToolSettings;
use crate::error::ToolInputError;
use crate::geometry::{Color, Point};
use crate::scene::{ObjectPatch, SceneGraph, SceneObject, Shape, Style};
use crate::shapes::{NoteLayout, NOTE_EXPAND_OFFSET};

use super::text::{EditSession, EditTarget};
use super::{SceneChange, Tool, ToolContext, ToolKind, ToolOutcome};

/// Palette offered for notes, first entry is the default
pub const NOTE_COLORS: [Color; 6] = [
    Color::rgb(0xfe, 0xf0, 0x8a),
    Color::rgb(0xbb, 0xf7, 0xd0),
    Color::rgb(0xbf, 0xdb, 0xfe),
    Color::rgb(0xfe, 0xca, 0xca),
    Color::rgb(0xe9, 0xd5, 0xff),
    Color::rgb(0xfe, 0xd7, 0xaa),
];

fn note_style() -> Style {
    Style::stroke(Color::rgba(0, 0, 0, 0x26), 1.0)
}

/// Write a note entry into the scene
pub(crate) fn commit_note(
    session: &EditSession,
    scene: &mut SceneGraph,
    settings: &ToolSettings,
) -> Result<SceneChange, ToolInputError> {
    if session.is_blank() {
        return Err(ToolInputError::EmptyNote);
    }
    let text = session.text().trim().to_string();
    let color = session.note_color().unwrap_or(settings.note_color);

    match session.target() {
        EditTarget::NewNote { at } => {
            let object = SceneObject::new(
                Shape::Note {
                    origin: NoteLayout::origin_for_anchor(at, &text),
                    text,
                    color,
                    collapsed: false,
                },
                note_style(),
            );
            Ok(SceneChange::Added(scene.add(object)))
        }
        EditTarget::Note { id } => {
            let patch = ObjectPatch {
                text: Some(text),
                color: Some(color),
                collapsed: Some(false),
                ..Default::default()
            };
            if scene.update(id, &patch) {
                Ok(SceneChange::Modified(id))
            } else {
                Err(ToolInputError::TargetMissing)
            }
        }
        EditTarget::NewText { .. } | EditTarget::Text { .. } => Err(ToolInputError::NotEditing),
    }
}

/// Patch that expands a collapsed note back into a full card
///
/// The card is re-anchored relative to the disc so it opens next to where
/// it was collapsed. Returns `None` for anything but a collapsed note.
pub fn expand_patch(object: &SceneObject) -> Option<ObjectPatch> {
    match &object.shape {
        Shape::Note {
            origin,
            text,
            collapsed: true,
            ..
        } => {
            let anchor = Point::new(origin.x + NOTE_EXPAND_OFFSET.x, origin.y + NOTE_EXPAND_OFFSET.y);
            let target = NoteLayout::origin_for_anchor(anchor, text);
            Some(ObjectPatch {
                translate: Some(Point::new(target.x - origin.x, target.y - origin.y)),
                collapsed: Some(false),
                ..Default::default()
            })
        }
        _ => None,
    }
}

/// Click to place a note, or click a note to edit it
pub struct NoteTool;

impl Tool for NoteTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Note
    }

    fn on_pointer_down(&mut self, ctx: &mut ToolContext<'_>, at: Point) -> ToolOutcome {
        let existing = ctx
            .hit(at)
            .filter(|id| matches!(ctx.scene.get(*id).map(|o| &o.shape), Some(Shape::Note { .. })));

        match existing {
            Some(id) => {
                *ctx.selection = Some(id);
                ToolOutcome::BeginEdit(EditTarget::Note { id })
            }
            None => ToolOutcome::BeginEdit(EditTarget::NewNote { at }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Harness;
    use super::*;
    use crate::scene::ObjectKind;
    use crate::shapes::NOTE_ANCHOR_GAP;

    fn new_note(harness: &mut Harness, at: Point, text: &str) -> crate::scene::ObjectId {
        let mut session = EditSession::new(EditTarget::NewNote { at });
        session.set_text(text);
        session.commit(&mut harness.scene, &harness.settings).unwrap().id()
    }

    #[test]
    fn test_note_placed_above_anchor() {
        let mut harness = Harness::new();
        let anchor = Point::new(200.0, 300.0);
        let id = new_note(&mut harness, anchor, "check this");

        let object = harness.scene.get(id).unwrap();
        assert_eq!(object.kind(), ObjectKind::Note);
        let Shape::Note { origin, color, collapsed, .. } = &object.shape else {
            panic!("expected a note");
        };
        let layout = NoteLayout::new(*origin, "check this");
        assert!((layout.card.bottom() - (anchor.y - NOTE_ANCHOR_GAP)).abs() < 1e-3);
        assert_eq!(*color, NOTE_COLORS[0]);
        assert!(!collapsed);
    }

    #[test]
    fn test_empty_note_rejected() {
        let mut harness = Harness::new();
        let session = EditSession::new(EditTarget::NewNote { at: Point::default() });
        assert_eq!(
            session.commit(&mut harness.scene, &harness.settings),
            Err(ToolInputError::EmptyNote)
        );
        assert!(harness.scene.is_empty());
    }

    #[test]
    fn test_edit_existing_note_keeps_one_object() {
        let mut harness = Harness::new();
        let id = new_note(&mut harness, Point::new(100.0, 200.0), "first");

        let mut session = EditSession::open(EditTarget::Note { id }, &harness.scene).unwrap();
        assert_eq!(session.text(), "first");
        session.set_text("second");
        session.set_note_color(NOTE_COLORS[2]);
        session.commit(&mut harness.scene, &harness.settings).unwrap();

        assert_eq!(harness.scene.len(), 1);
        let object = harness.scene.get(id).unwrap();
        assert_eq!(object.text(), Some("second"));
        assert!(matches!(object.shape, Shape::Note { color, .. } if color == NOTE_COLORS[2]));
    }

    #[test]
    fn test_click_on_note_opens_edit() {
        let mut harness = Harness::new();
        let id = new_note(&mut harness, Point::new(100.0, 200.0), "hello");
        let inside = harness.scene.get(id).unwrap().bounds().center();

        let outcome = NoteTool.on_pointer_down(&mut harness.ctx(), inside);
        assert_eq!(outcome, ToolOutcome::BeginEdit(EditTarget::Note { id }));
    }

    #[test]
    fn test_expand_patch_only_for_collapsed() {
        let mut harness = Harness::new();
        let id = new_note(&mut harness, Point::new(100.0, 200.0), "hello");
        assert!(expand_patch(harness.scene.get(id).unwrap()).is_none());

        harness.scene.update(id, &ObjectPatch::collapsed(true));
        let collapsed_origin = harness.scene.get(id).unwrap().bounds().x;
        let patch = expand_patch(harness.scene.get(id).unwrap()).unwrap();
        harness.scene.update(id, &patch);

        let object = harness.scene.get(id).unwrap();
        assert!(!object.is_collapsed_note());
        // card centred on the re-anchor point
        let expected = collapsed_origin + NOTE_EXPAND_OFFSET.x;
        assert!((object.bounds().center().x - expected).abs() < 1e-3);
    }
}
