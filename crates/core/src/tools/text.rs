//! Text tool and the shared text entry session

use crate::config::ToolSettings;
use crate::error::ToolInputError;
use crate::geometry::{Color, Point};
use crate::scene::{ObjectId, ObjectPatch, SceneGraph, SceneObject, Shape, Style};

use super::note;
use super::{SceneChange, Tool, ToolContext, ToolKind, ToolOutcome};

/// Text shown in a fresh entry before the user types
pub const TEXT_PLACEHOLDER: &str = "Type here...";

/// What a text entry writes into when confirmed
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EditTarget {
    NewText { at: Point },
    Text { id: ObjectId },
    /// Note anchored at `at`
    NewNote { at: Point },
    Note { id: ObjectId },
}

impl EditTarget {
    pub fn is_note(&self) -> bool {
        matches!(self, EditTarget::NewNote { .. } | EditTarget::Note { .. })
    }

    pub fn existing_id(&self) -> Option<ObjectId> {
        match *self {
            EditTarget::Text { id } | EditTarget::Note { id } => Some(id),
            _ => None,
        }
    }
}

/// Open text or note entry
///
/// While one exists the editor is "typing": pointer input and tool
/// switches are suppressed until it is confirmed or cancelled.
#[derive(Debug, Clone, PartialEq)]
pub struct EditSession {
    target: EditTarget,
    buffer: String,
    note_color: Option<Color>,
}

impl EditSession {
    pub fn new(target: EditTarget) -> Self {
        Self {
            target,
            buffer: String::new(),
            note_color: None,
        }
    }

    /// Open an entry, prefilled from the target object when it exists
    pub fn open(target: EditTarget, scene: &SceneGraph) -> Result<Self, ToolInputError> {
        let mut session = Self::new(target);
        if let Some(id) = target.existing_id() {
            let object = scene.get(id).ok_or(ToolInputError::TargetMissing)?;
            match &object.shape {
                Shape::Text { content, .. } => session.buffer = content.clone(),
                Shape::Note { text, color, .. } => {
                    session.buffer = text.clone();
                    session.note_color = Some(*color);
                }
                _ => return Err(ToolInputError::TargetMissing),
            }
        }
        Ok(session)
    }

    pub fn target(&self) -> EditTarget {
        self.target
    }

    pub fn text(&self) -> &str {
        &self.buffer
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.buffer = text.into();
    }

    pub fn push_str(&mut self, text: &str) {
        self.buffer.push_str(text);
    }

    pub fn backspace(&mut self) {
        self.buffer.pop();
    }

    pub fn note_color(&self) -> Option<Color> {
        self.note_color
    }

    pub fn set_note_color(&mut self, color: Color) {
        self.note_color = Some(color);
    }

    /// Empty, whitespace-only, or still the placeholder
    pub fn is_blank(&self) -> bool {
        let trimmed = self.buffer.trim();
        trimmed.is_empty() || trimmed == TEXT_PLACEHOLDER
    }

    /// Write the entry into the scene
    ///
    /// Blank text is rejected and the scene is left untouched; the caller
    /// keeps the session open so the user can keep typing or cancel.
    pub fn commit(
        &self,
        scene: &mut SceneGraph,
        settings: &ToolSettings,
    ) -> Result<SceneChange, ToolInputError> {
        if !self.target.is_note() && self.is_blank() {
            return Err(ToolInputError::EmptyText);
        }

        match self.target {
            EditTarget::NewNote { .. } | EditTarget::Note { .. } => {
                note::commit_note(self, scene, settings)
            }
            EditTarget::NewText { at } => {
                let style = Style::stroke(settings.text_color, 0.0)
                    .with_fill(Some(settings.text_color))
                    .with_opacity(settings.opacity);
                let object = SceneObject::new(
                    Shape::Text {
                        origin: at,
                        content: self.buffer.clone(),
                        font: settings.font.clone(),
                    },
                    style,
                );
                Ok(SceneChange::Added(scene.add(object)))
            }
            EditTarget::Text { id } => {
                if scene.update(id, &ObjectPatch::text(self.buffer.clone())) {
                    Ok(SceneChange::Modified(id))
                } else {
                    Err(ToolInputError::TargetMissing)
                }
            }
        }
    }
}

/// Click to place a text entry, or click existing text to edit it
pub struct TextTool;

impl Tool for TextTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Text
    }

    fn on_pointer_down(&mut self, ctx: &mut ToolContext<'_>, at: Point) -> ToolOutcome {
        let existing = ctx
            .hit(at)
            .filter(|id| matches!(ctx.scene.get(*id).map(|o| &o.shape), Some(Shape::Text { .. })));

        match existing {
            Some(id) => {
                *ctx.selection = Some(id);
                ToolOutcome::BeginEdit(EditTarget::Text { id })
            }
            None => ToolOutcome::BeginEdit(EditTarget::NewText { at }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Harness;
    use super::*;
    use crate::scene::ObjectKind;

    #[test]
    fn test_click_opens_new_text_entry() {
        let mut harness = Harness::new();
        let at = Point::new(40.0, 50.0);
        let outcome = TextTool.on_pointer_down(&mut harness.ctx(), at);
        assert_eq!(outcome, ToolOutcome::BeginEdit(EditTarget::NewText { at }));
    }

    #[test]
    fn test_commit_adds_text_with_settings() {
        let mut harness = Harness::new();
        let mut session = EditSession::new(EditTarget::NewText {
            at: Point::new(10.0, 20.0),
        });
        session.set_text("Hello");

        let change = session.commit(&mut harness.scene, &harness.settings).unwrap();
        let object = harness.scene.get(change.id()).unwrap();

        assert_eq!(object.kind(), ObjectKind::Text);
        assert_eq!(object.text(), Some("Hello"));
        assert_eq!(object.style.fill, Some(harness.settings.text_color));
    }

    #[test]
    fn test_blank_or_placeholder_rejected() {
        let mut harness = Harness::new();
        let mut session = EditSession::new(EditTarget::NewText { at: Point::default() });

        session.set_text("   ");
        assert_eq!(
            session.commit(&mut harness.scene, &harness.settings),
            Err(ToolInputError::EmptyText)
        );
        session.set_text(TEXT_PLACEHOLDER);
        assert_eq!(
            session.commit(&mut harness.scene, &harness.settings),
            Err(ToolInputError::EmptyText)
        );
        assert!(harness.scene.is_empty());
    }

    #[test]
    fn test_click_on_existing_text_edits_in_place() {
        let mut harness = Harness::new();
        let mut session = EditSession::new(EditTarget::NewText {
            at: Point::new(10.0, 10.0),
        });
        session.set_text("draft");
        let id = session.commit(&mut harness.scene, &harness.settings).unwrap().id();

        let outcome = TextTool.on_pointer_down(&mut harness.ctx(), Point::new(15.0, 15.0));
        assert_eq!(outcome, ToolOutcome::BeginEdit(EditTarget::Text { id }));

        let mut edit = EditSession::open(EditTarget::Text { id }, &harness.scene).unwrap();
        assert_eq!(edit.text(), "draft");
        edit.push_str("s");
        edit.backspace();
        edit.push_str(" v2");

        assert_eq!(
            edit.commit(&mut harness.scene, &harness.settings),
            Ok(SceneChange::Modified(id))
        );
        assert_eq!(harness.scene.len(), 1);
        assert_eq!(harness.scene.get(id).unwrap().text(), Some("draft v2"));
    }

    #[test]
    fn test_open_missing_target() {
        let scene = SceneGraph::new();
        let result = EditSession::open(
            EditTarget::Text {
                id: uuid::Uuid::new_v4(),
            },
            &scene,
        );
        assert_eq!(result, Err(ToolInputError::TargetMissing));
    }
}
