//! One-shot insert tools
//!
//! Image, signature and stamp placement needs input the canvas cannot
//! provide. Activating one of these tools asks the host for that input; the
//! object itself is built by [`crate::insert`] once the host answers.

use crate::geometry::Point;

use super::{Tool, ToolContext, ToolKind, ToolOutcome, ToolRequest};

#[derive(Debug)]
pub struct InsertTool {
    kind: ToolKind,
}

impl InsertTool {
    pub fn new(kind: ToolKind) -> Self {
        debug_assert!(kind.is_one_shot(), "{kind} is not an insert tool");
        Self { kind }
    }

    pub fn request(&self) -> Option<ToolRequest> {
        match self.kind {
            ToolKind::Image => Some(ToolRequest::PickImage),
            ToolKind::Signature => Some(ToolRequest::SignaturePanel),
            ToolKind::Stamp => Some(ToolRequest::StampPanel),
            _ => None,
        }
    }
}

impl Tool for InsertTool {
    fn kind(&self) -> ToolKind {
        self.kind
    }

    fn on_activate(&mut self, _ctx: &mut ToolContext<'_>) -> Option<ToolRequest> {
        self.request()
    }

    fn on_pointer_down(&mut self, _ctx: &mut ToolContext<'_>, _at: Point) -> ToolOutcome {
        ToolOutcome::Idle
    }
}
