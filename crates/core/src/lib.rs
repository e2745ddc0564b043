//! PDF Annotator Core Library
//!
//! Annotation model and editing session for the PDF annotator: scene graph,
//! per-page undo history, drawing tools, viewport, page navigation and
//! flattening export.

pub mod config;
pub mod error;
pub mod export;
pub mod geometry;
pub mod history;
pub mod insert;
pub mod navigator;
pub mod render;
pub mod scene;
pub mod services;
pub mod session;
pub mod shapes;
pub mod tools;
pub mod viewport;

pub use config::{ConfigError, EditorConfig, ToolSettings};
pub use error::{EditorError, EditorResult, ExportError, LoadError, RasterError, ToolInputError};
pub use export::{ExportOptions, ExportSource, PdfExporter};
pub use geometry::{Color, Point, Rect};
pub use history::HistoryManager;
pub use insert::{SignatureSource, SignatureStroke, StampPreset, StampSpec};
pub use navigator::PageNavigator;
pub use render::{FontBook, Rasterizer};
pub use scene::{
    FontDescriptor, ObjectId, ObjectKind, ObjectPatch, SceneGraph, SceneObject, SceneSnapshot,
    Shape, StampBorder, Style,
};
pub use services::{
    AccessGate, AllowAll, DirectorySink, DownloadSink, LogNotifier, MemorySink, Notifier, Severity,
};
pub use session::{EditorSession, Key, KeyAction, KeyInput, ToolbarState};
pub use tools::{
    EditSession, EditTarget, SceneChange, ToolController, ToolKind, ToolOutcome, ToolRequest,
    ToolSwitch,
};
pub use viewport::{ViewSize, ViewTransform, ViewportController};
