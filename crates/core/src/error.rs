//! Error types for the editor core
//!
//! Tool and load errors are recoverable: the session reports them through
//! the notifier and stays usable. Export errors abort the whole export.

use pdf_annotator_engine::{AssemblyError, EngineError};

use crate::config::ConfigError;

/// Source document could not be opened or rendered
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("document is empty")]
    Empty,

    #[error("unreadable document: {0}")]
    Engine(#[from] EngineError),

    #[error("document has no pages")]
    NoPages,
}

/// Invalid input to a tool's confirm action
///
/// Returned before anything is committed, so the scene and history are
/// untouched and the input interaction stays open for another attempt.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ToolInputError {
    #[error("text is empty")]
    EmptyText,

    #[error("note text is empty")]
    EmptyNote,

    #[error("signature has no strokes")]
    EmptySignature,

    #[error("signature text is empty")]
    EmptySignatureText,

    #[error("stamp text is empty")]
    EmptyStampText,

    #[error("image could not be decoded: {0}")]
    InvalidImage(String),

    #[error("no text or note is being edited")]
    NotEditing,

    #[error("edited object no longer exists")]
    TargetMissing,
}

/// Canvas to bitmap conversion failure
#[derive(Debug, thiserror::Error)]
pub enum RasterError {
    #[error("invalid raster size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },

    #[error("background buffer does not match {width}x{height}")]
    BackgroundMismatch { width: u32, height: u32 },

    #[error("PNG encoding failed: {0}")]
    Encode(String),

    #[error("embedded image could not be decoded: {0}")]
    Decode(String),

    #[error("page render failed: {0}")]
    Engine(#[from] EngineError),
}

/// Export failure; no partial output is ever produced
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("export cancelled before page {page}")]
    Cancelled { page: usize },

    #[error("page {page}: {source}")]
    Raster {
        page: usize,
        #[source]
        source: RasterError,
    },

    #[error("PDF assembly failed: {0}")]
    Assembly(#[from] AssemblyError),

    #[error("could not save {filename}: {source}")]
    Save {
        filename: String,
        #[source]
        source: std::io::Error,
    },
}

/// Umbrella error for session operations
#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    #[error("access to {feature} denied")]
    AccessDenied { feature: String },

    #[error("page {requested} is out of range (1-{total})")]
    PageOutOfRange { requested: usize, total: usize },

    #[error("no document is open")]
    NoDocument,

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Tool(#[from] ToolInputError),

    #[error(transparent)]
    Raster(#[from] RasterError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type EditorResult<T> = Result<T, EditorError>;
