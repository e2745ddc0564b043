//! Tools and the tool controller
//!
//! A tool is a state machine over pointer events. The controller owns
//! exactly one active tool; switching tears the old one down through
//! [`Tool::on_deactivate`] and drops it, so a previous tool can never react
//! to input again. Provisional geometry (a shape being dragged, polyline
//! guides) lives inside the tool and is exposed through [`Tool::preview`];
//! only the finished gesture is committed to the scene.

pub mod draw;
pub mod eraser;
pub mod freehand;
pub mod insert;
pub mod note;
pub mod polyline;
pub mod select;
pub mod text;

use std::fmt;
use std::str::FromStr;

use crate::config::{EditorConfig, ToolSettings};
use crate::geometry::Point;
use crate::scene::{ObjectId, SceneGraph, SceneObject};

pub use text::{EditSession, EditTarget};

/// Every tool the editor offers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    Select,
    Pen,
    Eraser,
    Highlight,
    Line,
    Arrow,
    Polyline,
    Rect,
    RoundedRect,
    Circle,
    Triangle,
    Star,
    Hexagon,
    SpeechBubble,
    Text,
    Note,
    Image,
    Signature,
    Stamp,
}

impl ToolKind {
    pub const ALL: [ToolKind; 19] = [
        ToolKind::Select,
        ToolKind::Pen,
        ToolKind::Eraser,
        ToolKind::Highlight,
        ToolKind::Line,
        ToolKind::Arrow,
        ToolKind::Polyline,
        ToolKind::Rect,
        ToolKind::RoundedRect,
        ToolKind::Circle,
        ToolKind::Triangle,
        ToolKind::Star,
        ToolKind::Hexagon,
        ToolKind::SpeechBubble,
        ToolKind::Text,
        ToolKind::Note,
        ToolKind::Image,
        ToolKind::Signature,
        ToolKind::Stamp,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::Select => "select",
            ToolKind::Pen => "pen",
            ToolKind::Eraser => "eraser",
            ToolKind::Highlight => "highlight",
            ToolKind::Line => "line",
            ToolKind::Arrow => "arrow",
            ToolKind::Polyline => "polyline",
            ToolKind::Rect => "rect",
            ToolKind::RoundedRect => "roundedRect",
            ToolKind::Circle => "circle",
            ToolKind::Triangle => "triangle",
            ToolKind::Star => "star",
            ToolKind::Hexagon => "hexagon",
            ToolKind::SpeechBubble => "speechBubble",
            ToolKind::Text => "text",
            ToolKind::Note => "note",
            ToolKind::Image => "image",
            ToolKind::Signature => "signature",
            ToolKind::Stamp => "stamp",
        }
    }

    /// Tools whose activation asks the host for input instead of
    /// handling pointer events
    pub fn is_one_shot(&self) -> bool {
        matches!(self, ToolKind::Image | ToolKind::Signature | ToolKind::Stamp)
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown tool: {0}")]
pub struct UnknownTool(pub String);

impl FromStr for ToolKind {
    type Err = UnknownTool;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownTool(s.to_string()))
    }
}

/// What a tool may touch while handling an event
pub struct ToolContext<'a> {
    pub scene: &'a mut SceneGraph,
    pub selection: &'a mut Option<ObjectId>,
    pub settings: &'a ToolSettings,
    pub config: &'a EditorConfig,
}

impl ToolContext<'_> {
    /// Topmost object under `at`, using the configured tolerance
    pub fn hit(&self, at: Point) -> Option<ObjectId> {
        self.scene.hit_test(at, self.config.hit_tolerance)
    }
}

/// Completed change to the scene; each one is one undo step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneChange {
    Added(ObjectId),
    Removed(ObjectId),
    Modified(ObjectId),
}

impl SceneChange {
    pub fn id(&self) -> ObjectId {
        match *self {
            SceneChange::Added(id) | SceneChange::Removed(id) | SceneChange::Modified(id) => id,
        }
    }
}

/// Result of feeding one event to a tool
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    /// Nothing visible changed
    Idle,
    /// Preview or selection changed, scene untouched
    Redraw,
    /// Gesture finished with a committed change
    Changed(SceneChange),
    /// Open the text/note entry interaction
    BeginEdit(EditTarget),
}

/// Input the host has to collect for a one-shot tool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolRequest {
    PickImage,
    SignaturePanel,
    StampPanel,
}

/// Uniform contract every tool implements
pub trait Tool {
    fn kind(&self) -> ToolKind;

    fn on_activate(&mut self, _ctx: &mut ToolContext<'_>) -> Option<ToolRequest> {
        None
    }

    /// Tear down; any unfinished gesture is discarded
    fn on_deactivate(&mut self, _ctx: &mut ToolContext<'_>) {
        self.cancel();
    }

    fn on_pointer_down(&mut self, ctx: &mut ToolContext<'_>, at: Point) -> ToolOutcome;

    fn on_pointer_move(&mut self, _ctx: &mut ToolContext<'_>, _at: Point) -> ToolOutcome {
        ToolOutcome::Idle
    }

    fn on_pointer_up(&mut self, _ctx: &mut ToolContext<'_>, _at: Point) -> ToolOutcome {
        ToolOutcome::Idle
    }

    fn on_double_click(&mut self, _ctx: &mut ToolContext<'_>, _at: Point) -> ToolOutcome {
        ToolOutcome::Idle
    }

    /// Transient objects to draw on top of the scene
    fn preview(&self) -> Vec<SceneObject> {
        Vec::new()
    }

    /// Drop in-progress gesture state
    fn cancel(&mut self) {}
}

/// Construct a fresh tool of `kind`
pub fn create_tool(kind: ToolKind) -> Box<dyn Tool> {
    use draw::{LineTool, ShapeTool, ShapeVariant};
    match kind {
        ToolKind::Select => Box::new(select::SelectTool::default()),
        ToolKind::Pen => Box::new(freehand::FreehandTool::pen()),
        ToolKind::Highlight => Box::new(freehand::FreehandTool::highlighter()),
        ToolKind::Eraser => Box::new(eraser::EraserTool),
        ToolKind::Line => Box::new(LineTool::line()),
        ToolKind::Arrow => Box::new(LineTool::arrow()),
        ToolKind::Polyline => Box::new(polyline::PolylineTool::default()),
        ToolKind::Rect => Box::new(ShapeTool::new(ShapeVariant::Rect)),
        ToolKind::RoundedRect => Box::new(ShapeTool::new(ShapeVariant::RoundedRect)),
        ToolKind::Circle => Box::new(ShapeTool::new(ShapeVariant::Ellipse)),
        ToolKind::Triangle => Box::new(ShapeTool::new(ShapeVariant::Triangle)),
        ToolKind::Star => Box::new(ShapeTool::new(ShapeVariant::Star)),
        ToolKind::Hexagon => Box::new(ShapeTool::new(ShapeVariant::Hexagon)),
        ToolKind::SpeechBubble => Box::new(ShapeTool::new(ShapeVariant::SpeechBubble)),
        ToolKind::Text => Box::new(text::TextTool),
        ToolKind::Note => Box::new(note::NoteTool),
        ToolKind::Image | ToolKind::Signature | ToolKind::Stamp => {
            Box::new(insert::InsertTool::new(kind))
        }
    }
}

/// Result of a tool switch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolSwitch {
    Switched {
        from: ToolKind,
        to: ToolKind,
        request: Option<ToolRequest>,
    },
    /// A text or note entry is open; finish it first
    Refused { active: ToolKind, requested: ToolKind },
}

/// Owns the single active tool and the open text entry, if any
pub struct ToolController {
    active: Box<dyn Tool>,
    editing: Option<EditSession>,
}

impl ToolController {
    /// Starts in select mode
    pub fn new() -> Self {
        Self {
            active: create_tool(ToolKind::Select),
            editing: None,
        }
    }

    pub fn active_kind(&self) -> ToolKind {
        self.active.kind()
    }

    /// Whether a text or note entry is open
    pub fn is_typing(&self) -> bool {
        self.editing.is_some()
    }

    pub fn editor(&self) -> Option<&EditSession> {
        self.editing.as_ref()
    }

    pub fn editor_mut(&mut self) -> Option<&mut EditSession> {
        self.editing.as_mut()
    }

    pub fn begin_edit(&mut self, session: EditSession) {
        log::debug!("edit session opened: {:?}", session.target());
        self.editing = Some(session);
    }

    pub fn end_edit(&mut self) -> Option<EditSession> {
        self.editing.take()
    }

    /// Switch the active tool
    ///
    /// Refused while a text entry is open. The previous tool is deactivated
    /// and dropped before the new one is activated.
    pub fn set_tool(&mut self, kind: ToolKind, ctx: &mut ToolContext<'_>) -> ToolSwitch {
        let from = self.active.kind();
        if self.editing.is_some() {
            log::debug!("tool switch {from} -> {kind} refused while typing");
            return ToolSwitch::Refused {
                active: from,
                requested: kind,
            };
        }

        self.active.on_deactivate(ctx);
        self.active = create_tool(kind);
        if kind != ToolKind::Select {
            *ctx.selection = None;
        }
        let request = self.active.on_activate(ctx);
        log::debug!("tool switched {from} -> {kind}");

        ToolSwitch::Switched {
            from,
            to: kind,
            request,
        }
    }

    /// Discard the active tool's unfinished gesture
    pub fn cancel_gesture(&mut self) {
        self.active.cancel();
    }

    pub fn pointer_down(&mut self, ctx: &mut ToolContext<'_>, at: Point) -> ToolOutcome {
        if self.editing.is_some() {
            return ToolOutcome::Idle;
        }
        self.active.on_pointer_down(ctx, at)
    }

    pub fn pointer_move(&mut self, ctx: &mut ToolContext<'_>, at: Point) -> ToolOutcome {
        if self.editing.is_some() {
            return ToolOutcome::Idle;
        }
        self.active.on_pointer_move(ctx, at)
    }

    pub fn pointer_up(&mut self, ctx: &mut ToolContext<'_>, at: Point) -> ToolOutcome {
        if self.editing.is_some() {
            return ToolOutcome::Idle;
        }
        self.active.on_pointer_up(ctx, at)
    }

    pub fn double_click(&mut self, ctx: &mut ToolContext<'_>, at: Point) -> ToolOutcome {
        if self.editing.is_some() {
            return ToolOutcome::Idle;
        }
        self.active.on_double_click(ctx, at)
    }

    pub fn preview(&self) -> Vec<SceneObject> {
        self.active.preview()
    }
}

impl Default for ToolController {
    fn default() -> Self {
        Self::new()
    }
}
