//! Annotation scripts
//!
//! A script is a JSON array of operations replayed against an editor
//! session, e.g.
//!
//! ```json
//! [
//!   { "op": "tool", "tool": "rect" },
//!   { "op": "drag", "from": [10, 10], "to": [110, 60] },
//!   { "op": "page", "page": 2 },
//!   { "op": "stamp", "stamp": { "stamp": "preset", "preset": "approved" } }
//! ]
//! ```
//!
//! Points are in page space (points, origin top-left).

use anyhow::{bail, Context, Result};
use pdf_annotator_core::{
    Color, EditorSession, Point, SignatureSource, StampSpec, ToolKind, ToolSwitch,
};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ScriptOp {
    Tool { tool: String },
    Click { at: [f32; 2] },
    DoubleClick { at: [f32; 2] },
    Drag { from: [f32; 2], to: [f32; 2] },
    /// Freehand gesture through every point
    Stroke { points: Vec<[f32; 2]> },
    Text { text: String },
    NoteColor { color: Color },
    Confirm,
    Cancel,
    Page { page: usize },
    Zoom { percent: f32 },
    /// Image file, relative paths resolved against the script's directory
    Image { path: PathBuf },
    Signature { signature: SignatureSource },
    Stamp { stamp: StampSpec },
    Undo,
    Redo,
    Delete,
    ClearAll,
}

impl ScriptOp {
    fn name(&self) -> &'static str {
        match self {
            ScriptOp::Tool { .. } => "tool",
            ScriptOp::Click { .. } => "click",
            ScriptOp::DoubleClick { .. } => "double_click",
            ScriptOp::Drag { .. } => "drag",
            ScriptOp::Stroke { .. } => "stroke",
            ScriptOp::Text { .. } => "text",
            ScriptOp::NoteColor { .. } => "note_color",
            ScriptOp::Confirm => "confirm",
            ScriptOp::Cancel => "cancel",
            ScriptOp::Page { .. } => "page",
            ScriptOp::Zoom { .. } => "zoom",
            ScriptOp::Image { .. } => "image",
            ScriptOp::Signature { .. } => "signature",
            ScriptOp::Stamp { .. } => "stamp",
            ScriptOp::Undo => "undo",
            ScriptOp::Redo => "redo",
            ScriptOp::Delete => "delete",
            ScriptOp::ClearAll => "clear_all",
        }
    }
}

pub fn load_script(path: &Path) -> Result<Vec<ScriptOp>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read script {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("invalid annotation script {}", path.display()))
}

/// Replay `ops` in order, stopping at the first failure
///
/// An entry still open at the end is committed the way switching to the
/// select tool would.
pub fn apply_script(session: &mut EditorSession, ops: &[ScriptOp], base_dir: &Path) -> Result<()> {
    for (index, op) in ops.iter().enumerate() {
        apply_op(session, op, base_dir)
            .with_context(|| format!("script operation {} ({})", index + 1, op.name()))?;
    }
    if session.is_typing() {
        session.set_tool(ToolKind::Select);
    }
    Ok(())
}

fn point([x, y]: [f32; 2]) -> Point {
    Point::new(x, y)
}

fn apply_op(session: &mut EditorSession, op: &ScriptOp, base_dir: &Path) -> Result<()> {
    log::debug!("script: {op:?}");
    match op {
        ScriptOp::Tool { tool } => {
            let kind: ToolKind = tool.parse()?;
            if let ToolSwitch::Refused { active, .. } = session.set_tool(kind) {
                bail!("cannot switch tools while editing text in the {active} tool");
            }
            // panels are answered by later operations
            session.take_request();
        }
        ScriptOp::Click { at } => {
            session.pointer_down(point(*at));
            session.pointer_up(point(*at));
        }
        ScriptOp::DoubleClick { at } => {
            session.double_click(point(*at));
        }
        ScriptOp::Drag { from, to } => {
            session.pointer_down(point(*from));
            session.pointer_move(point(*to));
            session.pointer_up(point(*to));
        }
        ScriptOp::Stroke { points } => {
            let Some((first, rest)) = points.split_first() else {
                bail!("stroke needs at least one point");
            };
            session.pointer_down(point(*first));
            for p in rest {
                session.pointer_move(point(*p));
            }
            session.pointer_up(point(*points.last().unwrap_or(first)));
        }
        ScriptOp::Text { text } => session.set_edit_text(text.clone())?,
        ScriptOp::NoteColor { color } => session.set_note_color(*color)?,
        ScriptOp::Confirm => {
            session.confirm_text()?;
        }
        ScriptOp::Cancel => session.cancel_text(),
        ScriptOp::Page { page } => session.go_to_page(*page)?,
        ScriptOp::Zoom { percent } => {
            session.set_zoom(*percent);
        }
        ScriptOp::Image { path } => {
            let path = base_dir.join(path);
            let bytes = fs::read(&path)
                .with_context(|| format!("failed to read image {}", path.display()))?;
            session.insert_image(bytes)?;
        }
        ScriptOp::Signature { signature } => {
            session.insert_signature(signature)?;
        }
        ScriptOp::Stamp { stamp } => {
            session.insert_stamp(stamp)?;
        }
        ScriptOp::Undo => {
            session.undo();
        }
        ScriptOp::Redo => {
            session.redo();
        }
        ScriptOp::Delete => {
            session.delete_selected();
        }
        ScriptOp::ClearAll => {
            session.clear_all();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_operations() {
        let ops: Vec<ScriptOp> = serde_json::from_str(
            r##"[
                {"op": "tool", "tool": "note"},
                {"op": "click", "at": [40, 50]},
                {"op": "text", "text": "check"},
                {"op": "note_color", "color": "#bfdbfe"},
                {"op": "confirm"},
                {"op": "stamp", "stamp": {"stamp": "custom", "text": "paid", "color": "#16a34a"}},
                {"op": "signature", "signature": {"source": "typed", "text": "Ada", "family": "Pacifico", "color": "#000000", "size": 36}}
            ]"##,
        )
        .unwrap();

        assert_eq!(ops.len(), 7);
        assert!(matches!(&ops[0], ScriptOp::Tool { tool } if tool == "note"));
        assert!(matches!(ops[4], ScriptOp::Confirm));
        assert!(matches!(&ops[5], ScriptOp::Stamp { stamp: StampSpec::Custom { text, .. } } if text == "paid"));
    }

    #[test]
    fn rejects_unknown_operation() {
        let result: Result<Vec<ScriptOp>, _> = serde_json::from_str(r#"[{"op": "explode"}]"#);
        assert!(result.is_err());
    }
}
