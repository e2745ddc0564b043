//! Editor session
//!
//! [`EditorSession`] owns everything one open editor needs: the source
//! document, the page raster store, the live scene and its history, the
//! tool controller, viewport and page navigation, pending note collapses
//! and the export pipeline. There is no global state; several sessions can
//! live side by side.
//!
//! Every discrete user action that changes the scene records exactly one
//! history snapshot. Failures are reported to the [`Notifier`] and returned
//! to the caller; the session stays usable after any of them.

use std::collections::BTreeMap;
use std::time::Instant;

use pdf_annotator_cache::{PageKey, PageRaster, PageStore};
use pdf_annotator_engine::{
    default_engine, ContentGap, DocumentHandle, EngineError, LopdfAssembler, OpenSource, PageSize,
    PdfAssembler, RenderRequest, RgbaImage, SourceLoader,
};
use pdf_annotator_scheduler::{CancellationToken, DelayQueue};

use crate::config::{EditorConfig, ToolSettings};
use crate::error::{EditorError, EditorResult, ExportError, LoadError, RasterError, ToolInputError};
use crate::export::{ExportOptions, ExportSource, PdfExporter};
use crate::geometry::{Color, Point};
use crate::history::HistoryManager;
use crate::insert::{build_image, build_signature, build_stamp, SignatureSource, StampSpec};
use crate::navigator::PageNavigator;
use crate::render::{to_rgba_image, Rasterizer};
use crate::scene::{ObjectId, ObjectPatch, SceneGraph, SceneObject, Shape};
use crate::services::{normalize_pdf_filename, AccessGate, AllowAll, DownloadSink, LogNotifier, Notifier, Severity};
use crate::tools::{
    EditSession, EditTarget, SceneChange, ToolContext, ToolController, ToolKind, ToolOutcome,
    ToolRequest, ToolSwitch,
};
use crate::viewport::{ViewSize, ViewportController};

/// Feature names passed to the [`AccessGate`]
pub const FEATURE_EDITOR: &str = "editor";
pub const FEATURE_EXPORT: &str = "export";

struct OpenDocument {
    handle: DocumentHandle,
    page_sizes: Vec<PageSize>,
    navigator: PageNavigator,
    /// Source content the engine cannot draw, e.g. `"text (pages 1, 3)"`
    missing_content: Option<String>,
}

/// Key press as delivered by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyInput {
    pub key: Key,
    /// Ctrl on Windows/Linux, Cmd on macOS
    pub command: bool,
}

impl KeyInput {
    pub fn new(key: Key) -> Self {
        Self {
            key,
            command: false,
        }
    }

    pub fn command(key: Key) -> Self {
        Self { key, command: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Delete,
    Backspace,
    Escape,
}

/// What a key press did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Ignored,
    Undone,
    Redone,
    /// The host should start an export
    SaveRequested,
    ToolSelected(ToolKind),
    Deleted,
    /// Back to select, open panels closed
    Escaped,
}

/// Everything a toolbar needs to draw itself
#[derive(Debug, Clone, PartialEq)]
pub struct ToolbarState {
    pub active_tool: ToolKind,
    pub typing: bool,
    pub can_undo: bool,
    pub can_redo: bool,
    /// `"2 / 5"`, `None` without a document
    pub page_label: Option<String>,
    pub has_previous: bool,
    pub has_next: bool,
    pub zoom_label: String,
}

/// One editor instance
pub struct EditorSession {
    config: EditorConfig,
    engine: Box<dyn SourceLoader>,
    assembler: Box<dyn PdfAssembler>,
    notifier: Box<dyn Notifier>,
    gate: Box<dyn AccessGate>,
    rasterizer: Rasterizer,
    store: PageStore,
    document: Option<OpenDocument>,
    scene: SceneGraph,
    history: HistoryManager,
    selection: Option<ObjectId>,
    tools: ToolController,
    viewport: ViewportController,
    /// Pending note collapses keyed by (page index, note id)
    collapses: DelayQueue<(usize, ObjectId)>,
    export_token: CancellationToken,
    pending_request: Option<ToolRequest>,
}

impl EditorSession {
    /// Session with the default lopdf engine and assembler, logging
    /// notifier and no access restrictions
    pub fn new(config: EditorConfig) -> Self {
        let scene = SceneGraph::new();
        Self {
            engine: default_engine(),
            assembler: Box::new(LopdfAssembler::new()),
            notifier: Box::new(LogNotifier),
            gate: Box::new(AllowAll),
            rasterizer: Rasterizer::from_config(&config),
            store: PageStore::with_mb_limit(config.raster_budget_mb),
            document: None,
            history: HistoryManager::seeded(config.history_capacity, 0, &scene),
            scene,
            selection: None,
            tools: ToolController::new(),
            viewport: ViewportController::new(&config),
            collapses: DelayQueue::new(),
            export_token: CancellationToken::new(),
            pending_request: None,
            config,
        }
    }

    pub fn with_engine(mut self, engine: impl SourceLoader + 'static) -> Self {
        self.engine = Box::new(engine);
        self
    }

    pub fn with_assembler(mut self, assembler: impl PdfAssembler + 'static) -> Self {
        self.assembler = Box::new(assembler);
        self
    }

    pub fn with_notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Box::new(notifier);
        self
    }

    pub fn with_access_gate(mut self, gate: impl AccessGate + 'static) -> Self {
        self.gate = Box::new(gate);
        self
    }

    pub fn with_rasterizer(mut self, rasterizer: Rasterizer) -> Self {
        self.rasterizer = rasterizer;
        self
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    /// Current tool styling
    pub fn settings(&self) -> &ToolSettings {
        &self.config.tools
    }

    pub fn settings_mut(&mut self) -> &mut ToolSettings {
        &mut self.config.tools
    }

    pub fn scene(&self) -> &SceneGraph {
        &self.scene
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn selection(&self) -> Option<ObjectId> {
        self.selection
    }

    pub fn viewport(&self) -> &ViewportController {
        &self.viewport
    }

    pub fn page_store(&self) -> &PageStore {
        &self.store
    }

    pub fn active_tool(&self) -> ToolKind {
        self.tools.active_kind()
    }

    pub fn is_typing(&self) -> bool {
        self.tools.is_typing()
    }

    /// Open text or note entry
    pub fn editor(&self) -> Option<&EditSession> {
        self.tools.editor()
    }

    pub fn has_document(&self) -> bool {
        self.document.is_some()
    }

    pub fn page_count(&self) -> usize {
        self.document
            .as_ref()
            .map_or(0, |doc| doc.navigator.total_pages())
    }

    /// One-based number of the page shown
    pub fn current_page(&self) -> Option<usize> {
        self.document.as_ref().map(|doc| doc.navigator.current_page())
    }

    /// Stored annotations of another page, the live scene for the current one
    pub fn page_scene(&self, page: usize) -> EditorResult<SceneGraph> {
        let doc = self.document.as_ref().ok_or(EditorError::NoDocument)?;
        let index = doc.navigator.validate(page)?;
        Ok(doc.navigator.scene_for(index, &self.scene))
    }

    /// Source content left out of page rasters, and so of the export
    pub fn missing_content(&self) -> Option<&str> {
        self.document.as_ref()?.missing_content.as_deref()
    }

    /// Pending note collapses across all pages
    pub fn pending_collapses(&self) -> usize {
        self.collapses.len()
    }

    /// When [`tick`](Self::tick) next has work to do
    pub fn next_deadline(&self) -> Option<Instant> {
        self.collapses.next_deadline()
    }

    fn notify(&self, message: &str, severity: Severity) {
        self.notifier.notify(message, severity);
    }

    fn current_index(&self) -> usize {
        self.document
            .as_ref()
            .map_or(0, |doc| doc.navigator.current_index())
    }

    fn check_access(&self, feature: &str) -> EditorResult<()> {
        if self.gate.check(feature) {
            Ok(())
        } else {
            self.notify(&format!("Access to {feature} denied"), Severity::Error);
            Err(EditorError::AccessDenied {
                feature: feature.to_string(),
            })
        }
    }

    /// Open a source document, replacing the current one
    ///
    /// Returns the page count. The first page is shown with an empty scene
    /// and a fresh history.
    pub fn open_document(&mut self, source: impl Into<OpenSource>) -> EditorResult<usize> {
        self.check_access(FEATURE_EDITOR)?;
        match self.load(source.into()) {
            Ok(pages) => {
                self.notify(&format!("Loaded {pages} pages"), Severity::Success);
                if let Some(missing) = self.missing_content() {
                    let message = format!(
                        "Some page content cannot be drawn and will be missing from the view and export: {missing}"
                    );
                    self.notify(&message, Severity::Warning);
                }
                Ok(pages)
            }
            Err(e) => {
                self.notify(&format!("Could not open document: {e}"), Severity::Error);
                Err(e.into())
            }
        }
    }

    fn load(&mut self, source: OpenSource) -> Result<usize, LoadError> {
        if matches!(&source, OpenSource::Bytes(bytes) if bytes.is_empty()) {
            return Err(LoadError::Empty);
        }
        let handle = self.engine.open(source).map_err(|e| match e {
            EngineError::NoPages => LoadError::NoPages,
            other => LoadError::Engine(other),
        })?;
        let page_sizes = match self.page_sizes(handle) {
            Ok(sizes) if !sizes.is_empty() => sizes,
            Ok(_) => {
                let _ = self.engine.close(handle);
                return Err(LoadError::NoPages);
            }
            Err(e) => {
                let _ = self.engine.close(handle);
                return Err(e.into());
            }
        };

        let missing_content = self.describe_gaps(handle, page_sizes.len());

        self.reset();
        let pages = page_sizes.len();
        let navigator = PageNavigator::new(pages, self.config.history_capacity);
        self.history = navigator.initial_history(&self.scene);
        self.viewport.set_page(page_sizes[0]);
        self.document = Some(OpenDocument {
            handle,
            page_sizes,
            navigator,
            missing_content,
        });
        log::info!("opened document with {pages} pages");
        Ok(pages)
    }

    fn page_sizes(&self, handle: DocumentHandle) -> Result<Vec<PageSize>, EngineError> {
        let count = self.engine.page_count(handle)?;
        (0..count)
            .map(|index| self.engine.page_size(handle, index))
            .collect()
    }

    /// Summary of what the engine leaves out, grouped by kind
    fn describe_gaps(&self, handle: DocumentHandle, pages: usize) -> Option<String> {
        let mut by_gap: BTreeMap<ContentGap, Vec<usize>> = BTreeMap::new();
        for index in 0..pages {
            match self.engine.content_gaps(handle, index as u32) {
                Ok(gaps) => {
                    for gap in gaps {
                        by_gap.entry(gap).or_default().push(index + 1);
                    }
                }
                Err(e) => log::warn!("content of page {} could not be inspected: {e}", index + 1),
            }
        }
        if by_gap.is_empty() {
            return None;
        }
        let parts: Vec<String> = by_gap
            .iter()
            .map(|(gap, pages)| {
                let list: Vec<String> = pages.iter().map(usize::to_string).collect();
                let noun = if pages.len() == 1 { "page" } else { "pages" };
                format!("{gap} ({noun} {})", list.join(", "))
            })
            .collect();
        let summary = parts.join("; ");
        log::warn!("renderer leaves out {summary}");
        Some(summary)
    }

    /// Close the document and drop all annotations
    pub fn remove_document(&mut self) {
        self.export_token.cancel();
        self.reset();
        log::info!("document removed");
    }

    fn reset(&mut self) {
        if let Some(doc) = self.document.take() {
            if let Err(e) = self.engine.close(doc.handle) {
                log::warn!("closing document failed: {e}");
            }
        }
        self.scene.clear();
        self.history = HistoryManager::seeded(self.config.history_capacity, 0, &self.scene);
        self.selection = None;
        self.tools = ToolController::new();
        self.collapses.clear();
        self.store.clear();
        self.viewport.clear_page();
        self.pending_request = None;
    }

    /// Show one-based `page`
    ///
    /// An open text entry is finished first and any gesture in progress is
    /// dropped. Out-of-range pages are rejected without changing anything.
    pub fn go_to_page(&mut self, page: usize) -> EditorResult<()> {
        let doc = self.document.as_ref().ok_or(EditorError::NoDocument)?;
        if let Err(e) = doc.navigator.validate(page) {
            self.notify(&e.to_string(), Severity::Warning);
            return Err(e);
        }
        self.finish_edit();
        self.tools.cancel_gesture();
        self.selection = None;

        let doc = self.document.as_mut().ok_or(EditorError::NoDocument)?;
        doc.navigator.go_to(page, &mut self.scene, &mut self.history)?;
        let (handle, index) = (doc.handle, doc.navigator.current_index());
        self.viewport.set_page(doc.page_sizes[index]);

        // warm the store; a failure here resurfaces on the next render
        let scale = self.viewport.scale();
        if let Err(e) = page_raster(self.engine.as_ref(), handle, &mut self.store, index, scale) {
            self.notify(&format!("Page {page} could not be rendered: {e}"), Severity::Warning);
        }
        Ok(())
    }

    pub fn next_page(&mut self) -> EditorResult<()> {
        let page = self.current_page().ok_or(EditorError::NoDocument)?;
        self.go_to_page(page + 1)
    }

    pub fn previous_page(&mut self) -> EditorResult<()> {
        let page = self.current_page().ok_or(EditorError::NoDocument)?;
        self.go_to_page(page.saturating_sub(1))
    }

    /// Switch tools
    ///
    /// Switching to select while typing finishes the entry first (commit
    /// when valid, discard otherwise). Any other switch while typing is
    /// refused.
    pub fn set_tool(&mut self, kind: ToolKind) -> ToolSwitch {
        if kind == ToolKind::Select {
            self.finish_edit();
        }
        let mut ctx = ToolContext {
            scene: &mut self.scene,
            selection: &mut self.selection,
            settings: &self.config.tools,
            config: &self.config,
        };
        let switch = self.tools.set_tool(kind, &mut ctx);
        match switch {
            ToolSwitch::Switched { request, .. } => self.pending_request = request,
            ToolSwitch::Refused { .. } => {
                self.notify("Finish editing the text first", Severity::Warning);
            }
        }
        switch
    }

    /// Input the host must collect for the tool just activated
    pub fn take_request(&mut self) -> Option<ToolRequest> {
        self.pending_request.take()
    }

    /// Transient objects of the active tool
    pub fn preview(&self) -> Vec<SceneObject> {
        self.tools.preview()
    }

    /// Convert a point in the visible container to page space
    pub fn screen_to_page(&self, at: Point) -> Option<Point> {
        Some(self.viewport.transform()?.screen_to_page(at))
    }

    pub fn pointer_down(&mut self, at: Point) -> ToolOutcome {
        self.dispatch(at, |tools, ctx, at| tools.pointer_down(ctx, at))
    }

    pub fn pointer_move(&mut self, at: Point) -> ToolOutcome {
        self.dispatch(at, |tools, ctx, at| tools.pointer_move(ctx, at))
    }

    pub fn pointer_up(&mut self, at: Point) -> ToolOutcome {
        self.dispatch(at, |tools, ctx, at| tools.pointer_up(ctx, at))
    }

    pub fn double_click(&mut self, at: Point) -> ToolOutcome {
        self.dispatch(at, |tools, ctx, at| tools.double_click(ctx, at))
    }

    fn dispatch(
        &mut self,
        at: Point,
        event: impl FnOnce(&mut ToolController, &mut ToolContext<'_>, Point) -> ToolOutcome,
    ) -> ToolOutcome {
        if self.document.is_none() {
            return ToolOutcome::Idle;
        }
        let mut ctx = ToolContext {
            scene: &mut self.scene,
            selection: &mut self.selection,
            settings: &self.config.tools,
            config: &self.config,
        };
        let outcome = event(&mut self.tools, &mut ctx, at);
        match &outcome {
            ToolOutcome::Changed(change) => self.record(*change),
            ToolOutcome::BeginEdit(target) => self.begin_edit(*target),
            ToolOutcome::Idle | ToolOutcome::Redraw => {}
        }
        outcome
    }

    /// One undo step for a completed change, plus the note timers it affects
    fn record(&mut self, change: SceneChange) {
        self.history.snapshot(&self.scene);
        let key = (self.current_index(), change.id());
        match change {
            SceneChange::Removed(_) => {
                self.collapses.cancel(&key);
            }
            SceneChange::Added(id) | SceneChange::Modified(id) => {
                let expanded_note = matches!(
                    self.scene.get(id).map(|o| &o.shape),
                    Some(Shape::Note { collapsed: false, .. })
                );
                if expanded_note {
                    self.schedule_collapse(id);
                }
            }
        }
    }

    fn schedule_collapse(&mut self, id: ObjectId) {
        let due = Instant::now() + self.config.note_collapse_delay();
        self.collapses.schedule((self.current_index(), id), due);
    }

    /// Match the current page's collapse timers to a restored scene
    ///
    /// Expanded notes without a timer get one; timers of notes that are
    /// gone or already collapsed are dropped.
    fn sync_collapses(&mut self) {
        let page = self.current_index();
        let expanded: Vec<ObjectId> = self
            .scene
            .iter()
            .filter(|o| matches!(o.shape, Shape::Note { collapsed: false, .. }))
            .map(|o| o.id)
            .collect();
        self.collapses
            .retain(|(p, id)| *p != page || expanded.contains(id));
        for id in expanded {
            if !self.collapses.contains(&(page, id)) {
                self.schedule_collapse(id);
            }
        }
    }

    fn begin_edit(&mut self, target: EditTarget) {
        match EditSession::open(target, &self.scene) {
            Ok(session) => {
                if let Some(id) = target.existing_id() {
                    self.collapses.cancel(&(self.current_index(), id));
                    self.selection = Some(id);
                }
                self.tools.begin_edit(session);
            }
            Err(e) => self.notify(&e.to_string(), Severity::Warning),
        }
    }

    /// Replace the text of the open entry
    pub fn set_edit_text(&mut self, text: impl Into<String>) -> EditorResult<()> {
        let editor = self.tools.editor_mut().ok_or(ToolInputError::NotEditing)?;
        editor.set_text(text);
        Ok(())
    }

    /// Card colour of the open note entry
    pub fn set_note_color(&mut self, color: Color) -> EditorResult<()> {
        let editor = self.tools.editor_mut().ok_or(ToolInputError::NotEditing)?;
        if !editor.target().is_note() {
            return Err(ToolInputError::NotEditing.into());
        }
        editor.set_note_color(color);
        Ok(())
    }

    /// Commit the open entry
    ///
    /// Blank text is rejected: nothing is added, no snapshot is taken and
    /// the entry stays open. A confirmed note is scheduled to collapse.
    pub fn confirm_text(&mut self) -> EditorResult<SceneChange> {
        let session = self.tools.editor().cloned().ok_or(ToolInputError::NotEditing)?;
        match session.commit(&mut self.scene, &self.config.tools) {
            Ok(change) => {
                self.tools.end_edit();
                self.selection = Some(change.id());
                self.record(change);
                Ok(change)
            }
            Err(e) => {
                self.notify(&e.to_string(), Severity::Warning);
                Err(e.into())
            }
        }
    }

    /// Close the open entry without changing the scene
    pub fn cancel_text(&mut self) {
        let Some(session) = self.tools.end_edit() else {
            return;
        };
        // editing paused the collapse of an existing note
        if let Some(id) = session.target().existing_id() {
            if matches!(
                self.scene.get(id).map(|o| &o.shape),
                Some(Shape::Note { collapsed: false, .. })
            ) {
                self.schedule_collapse(id);
            }
        }
    }

    fn finish_edit(&mut self) {
        let Some(session) = self.tools.editor() else {
            return;
        };
        if session.is_blank() || self.confirm_text().is_err() {
            self.cancel_text();
        }
    }

    /// Add a picked image at the centre of the visible area
    pub fn insert_image(&mut self, bytes: Vec<u8>) -> EditorResult<ObjectId> {
        let center = self.insert_point()?;
        let object = build_image(bytes, center, self.config.image_max_dimension)
            .map_err(EditorError::from);
        self.insert(object, "Image added")
    }

    /// Add a signature at the centre of the visible area
    pub fn insert_signature(&mut self, source: &SignatureSource) -> EditorResult<ObjectId> {
        let center = self.insert_point()?;
        let object = build_signature(
            source,
            &self.rasterizer,
            center,
            self.config.signature_default_width,
            self.config.tools.opacity,
        );
        self.insert(object, "Signature added")
    }

    /// Add a stamp dated today at the centre of the visible area
    pub fn insert_stamp(&mut self, spec: &StampSpec) -> EditorResult<ObjectId> {
        self.insert_stamp_dated(spec, chrono::Local::now().date_naive())
    }

    /// [`insert_stamp`](Self::insert_stamp) with an explicit date
    pub fn insert_stamp_dated(
        &mut self,
        spec: &StampSpec,
        today: chrono::NaiveDate,
    ) -> EditorResult<ObjectId> {
        let center = self.insert_point()?;
        let object = build_stamp(spec, center, self.config.tools.opacity, today)
            .map_err(EditorError::from);
        self.insert(object, "Stamp added")
    }

    fn insert_point(&mut self) -> EditorResult<Point> {
        if self.document.is_none() {
            return Err(EditorError::NoDocument);
        }
        self.finish_edit();
        self.viewport.visible_center().ok_or(EditorError::NoDocument)
    }

    fn insert(&mut self, object: EditorResult<SceneObject>, done: &str) -> EditorResult<ObjectId> {
        let object = match object {
            Ok(object) => object,
            Err(e) => {
                self.notify(&e.to_string(), Severity::Error);
                return Err(e);
            }
        };
        let id = self.scene.add(object);
        self.selection = Some(id);
        self.record(SceneChange::Added(id));
        self.notify(done, Severity::Success);
        self.set_tool(ToolKind::Select);
        Ok(id)
    }

    /// Step back one action; `false` when there is nothing to undo
    pub fn undo(&mut self) -> bool {
        self.tools.cancel_gesture();
        match self.history.undo() {
            Some(snapshot) => {
                self.scene.restore(&snapshot);
                self.selection = None;
                self.sync_collapses();
                true
            }
            None => false,
        }
    }

    /// Step forward one action; `false` when there is nothing to redo
    pub fn redo(&mut self) -> bool {
        self.tools.cancel_gesture();
        match self.history.redo() {
            Some(snapshot) => {
                self.scene.restore(&snapshot);
                self.selection = None;
                self.sync_collapses();
                true
            }
            None => false,
        }
    }

    /// Remove the selected object
    pub fn delete_selected(&mut self) -> bool {
        let Some(id) = self.selection.take() else {
            return false;
        };
        if self.scene.remove(id).is_none() {
            return false;
        }
        self.record(SceneChange::Removed(id));
        true
    }

    /// Remove every annotation on the current page as one undo step
    pub fn clear_all(&mut self) -> bool {
        if self.scene.is_empty() {
            return false;
        }
        let page = self.current_index();
        for object in self.scene.iter() {
            self.collapses.cancel(&(page, object.id));
        }
        self.scene.clear();
        self.selection = None;
        self.history.snapshot(&self.scene);
        true
    }

    pub fn set_zoom(&mut self, percent: f32) -> f32 {
        let page = self.current_index() as u32;
        self.viewport.set_zoom(percent, &mut self.store, page)
    }

    pub fn zoom_by(&mut self, delta: f32) -> f32 {
        let page = self.current_index() as u32;
        self.viewport.zoom_by(delta, &mut self.store, page)
    }

    /// Fit the page into the container; `None` until both sizes are known
    pub fn fit_to_screen(&mut self) -> Option<f32> {
        let page = self.current_index() as u32;
        self.viewport.fit_to_screen(&mut self.store, page)
    }

    pub fn set_container(&mut self, size: ViewSize) {
        self.viewport.set_container(size);
    }

    pub fn scroll_to(&mut self, offset: Point) {
        self.viewport.scroll_to(offset);
    }

    /// Current page at the current zoom with annotations and tool preview
    pub fn render_view(&mut self) -> EditorResult<RgbaImage> {
        let doc = self.document.as_ref().ok_or(EditorError::NoDocument)?;
        let (handle, index) = (doc.handle, doc.navigator.current_index());
        let scale = self.viewport.scale();
        self.viewport.take_needs_render();

        let background = page_raster(self.engine.as_ref(), handle, &mut self.store, index, scale)?;
        let preview = self.tools.preview();
        let pixmap = self
            .rasterizer
            .render(&background, scale, self.scene.iter().chain(preview.iter()))
            .inspect_err(|e| self.notifier.notify(&e.to_string(), Severity::Error))?;
        Ok(to_rgba_image(&pixmap))
    }

    /// Token that aborts a running export at the next page boundary
    pub fn export_cancellation(&self) -> CancellationToken {
        self.export_token.clone()
    }

    /// Flatten every page into a new PDF
    ///
    /// Pages are rendered at the current zoom. An open text entry is
    /// finished first and the selection is cleared so no selection chrome
    /// ends up in the output. Nothing is returned unless every page
    /// succeeded.
    pub fn export(&mut self) -> EditorResult<Vec<u8>> {
        self.check_access(FEATURE_EXPORT)?;
        if self.document.is_none() {
            return Err(EditorError::NoDocument);
        }
        self.finish_edit();
        self.tools.cancel_gesture();
        self.selection = None;

        let options = ExportOptions {
            scale: self.viewport.scale(),
            page_labels: self.config.page_labels,
        };
        let doc = self.document.as_mut().ok_or(EditorError::NoDocument)?;
        doc.navigator.store_active(&self.scene);

        let mut source = SessionPages {
            engine: self.engine.as_ref(),
            handle: doc.handle,
            store: &mut self.store,
            navigator: &doc.navigator,
            live: &self.scene,
        };
        let result = PdfExporter::new(&self.rasterizer, self.assembler.as_ref()).export(
            &mut source,
            options,
            &self.export_token,
        );
        self.export_token.reset();

        if let (Ok(_), Some(missing)) = (&result, self.missing_content()) {
            self.notify(&format!("Exported without {missing}"), Severity::Warning);
        }
        result.map_err(|e| {
            let severity = match e {
                ExportError::Cancelled { .. } => Severity::Warning,
                _ => Severity::Error,
            };
            self.notify(&format!("Export failed: {e}"), severity);
            EditorError::from(e)
        })
    }

    /// [`export`](Self::export) and hand the bytes to `sink`
    ///
    /// Returns the file name used, with `.pdf` appended when missing.
    pub fn export_to(&mut self, sink: &mut dyn DownloadSink, filename: &str) -> EditorResult<String> {
        let bytes = self.export()?;
        let filename = normalize_pdf_filename(filename);
        if let Err(source) = sink.save(&bytes, &filename) {
            let e = ExportError::Save {
                filename: filename.clone(),
                source,
            };
            self.notify(&e.to_string(), Severity::Error);
            return Err(e.into());
        }
        self.notify(&format!("Saved {filename}"), Severity::Success);
        Ok(filename)
    }

    /// Apply note collapses that came due by `now`; returns how many
    ///
    /// Notes on pages that are not shown are collapsed in their stored
    /// snapshot. Collapsing is not an undo step.
    pub fn tick(&mut self, now: Instant) -> usize {
        let due = self.collapses.pop_due(now);
        let Some(doc) = self.document.as_mut() else {
            return 0;
        };
        let current = doc.navigator.current_index();
        let mut collapsed = 0;

        for (page, id) in due {
            let done = if page == current {
                let expanded = matches!(
                    self.scene.get(id).map(|o| &o.shape),
                    Some(Shape::Note { collapsed: false, .. })
                );
                expanded && self.scene.update(id, &ObjectPatch::collapsed(true))
            } else {
                doc.navigator
                    .stored_snapshot_mut(page)
                    .and_then(|snapshot| snapshot.objects.iter_mut().find(|o| o.id == id))
                    .map(|object| match &mut object.shape {
                        Shape::Note { collapsed, .. } if !*collapsed => {
                            *collapsed = true;
                            true
                        }
                        _ => false,
                    })
                    .unwrap_or(false)
            };
            if done {
                log::debug!("note {id} on page {} collapsed", page + 1);
                collapsed += 1;
            }
        }
        collapsed
    }

    /// Keyboard shortcuts; every key is ignored while typing
    pub fn handle_key(&mut self, input: KeyInput) -> KeyAction {
        if self.tools.is_typing() {
            return KeyAction::Ignored;
        }
        match (input.key, input.command) {
            (Key::Char(c), true) => match c.to_ascii_lowercase() {
                'z' if self.undo() => KeyAction::Undone,
                'y' if self.redo() => KeyAction::Redone,
                's' => KeyAction::SaveRequested,
                _ => KeyAction::Ignored,
            },
            (Key::Char(c), false) => {
                let kind = match c.to_ascii_lowercase() {
                    'v' => ToolKind::Select,
                    'p' => ToolKind::Pen,
                    _ => return KeyAction::Ignored,
                };
                match self.set_tool(kind) {
                    ToolSwitch::Switched { to, .. } => KeyAction::ToolSelected(to),
                    ToolSwitch::Refused { .. } => KeyAction::Ignored,
                }
            }
            (Key::Delete | Key::Backspace, _) => {
                if self.delete_selected() {
                    KeyAction::Deleted
                } else {
                    KeyAction::Ignored
                }
            }
            (Key::Escape, _) => {
                self.pending_request = None;
                self.set_tool(ToolKind::Select);
                KeyAction::Escaped
            }
        }
    }

    pub fn toolbar_state(&self) -> ToolbarState {
        let navigator = self.document.as_ref().map(|doc| &doc.navigator);
        ToolbarState {
            active_tool: self.tools.active_kind(),
            typing: self.tools.is_typing(),
            can_undo: self.history.can_undo(),
            can_redo: self.history.can_redo(),
            page_label: navigator.map(PageNavigator::page_label),
            has_previous: navigator.is_some_and(PageNavigator::has_previous),
            has_next: navigator.is_some_and(PageNavigator::has_next),
            zoom_label: self.viewport.zoom_label(),
        }
    }
}

/// Cached page raster, rendered through the engine on a miss
fn page_raster(
    engine: &dyn SourceLoader,
    handle: DocumentHandle,
    store: &mut PageStore,
    index: usize,
    scale: f32,
) -> Result<PageRaster, RasterError> {
    let key = PageKey::new(index as u32, scale);
    if let Some(raster) = store.get(&key) {
        return Ok(raster);
    }
    let image = engine.render_page(
        handle,
        RenderRequest {
            page_index: index as u32,
            scale,
        },
    )?;
    let raster = PageRaster::new(image.width(), image.height(), image.into_raw());
    store.insert(key, raster.clone());
    Ok(raster)
}

/// The open document as seen by the exporter
struct SessionPages<'a> {
    engine: &'a dyn SourceLoader,
    handle: DocumentHandle,
    store: &'a mut PageStore,
    navigator: &'a PageNavigator,
    live: &'a SceneGraph,
}

impl ExportSource for SessionPages<'_> {
    fn page_count(&self) -> usize {
        self.navigator.total_pages()
    }

    fn page_raster(&mut self, index: usize, scale: f32) -> Result<PageRaster, RasterError> {
        page_raster(self.engine, self.handle, self.store, index, scale)
    }

    fn page_scene(&self, index: usize) -> SceneGraph {
        self.navigator.scene_for(index, self.live)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::RecordingNotifier;
    use crate::services::MemorySink;
    use crate::scene::ObjectKind;
    use pdf_annotator_engine::{build_blank_document, build_document};
    use std::time::Duration;

    fn session_with_document(bytes: Vec<u8>) -> (EditorSession, RecordingNotifier) {
        let notifier = RecordingNotifier::default();
        let mut session = EditorSession::new(EditorConfig::default())
            .with_rasterizer(Rasterizer::default())
            .with_notifier(notifier.clone());
        session.open_document(bytes).unwrap();
        (session, notifier)
    }

    fn session_with_pages(pages: usize) -> (EditorSession, RecordingNotifier) {
        let sizes = vec![(200.0, 100.0); pages];
        session_with_document(build_blank_document(&sizes).unwrap())
    }

    fn confirmed_note(session: &mut EditorSession, at: Point, text: &str) -> ObjectId {
        session.set_tool(ToolKind::Note);
        session.pointer_down(at);
        session.set_edit_text(text).unwrap();
        session.confirm_text().unwrap().id()
    }

    fn draw_rect(session: &mut EditorSession, from: Point, to: Point) -> ToolOutcome {
        session.pointer_down(from);
        session.pointer_move(to);
        session.pointer_up(to)
    }

    #[test]
    fn test_open_rejects_empty_and_denied() {
        let mut session = EditorSession::new(EditorConfig::default());
        assert!(matches!(
            session.open_document(Vec::new()),
            Err(EditorError::Load(LoadError::Empty))
        ));
        assert!(matches!(
            session.open_document(b"garbage".to_vec()),
            Err(EditorError::Load(LoadError::Engine(_)))
        ));

        let mut gated = EditorSession::new(EditorConfig::default()).with_access_gate(|_: &str| false);
        let pdf = build_blank_document(&[(100.0, 100.0)]).unwrap();
        assert!(matches!(
            gated.open_document(pdf),
            Err(EditorError::AccessDenied { feature }) if feature == "editor"
        ));
        assert!(!gated.has_document());
    }

    #[test]
    fn test_drawing_records_one_snapshot() {
        let (mut session, _) = session_with_pages(1);
        session.set_tool(ToolKind::Rect);
        let outcome = draw_rect(&mut session, Point::new(10.0, 10.0), Point::new(60.0, 40.0));

        assert!(matches!(outcome, ToolOutcome::Changed(SceneChange::Added(_))));
        assert_eq!(session.scene().len(), 1);
        assert_eq!(session.history().len(), 2);
        assert!(session.undo());
        assert!(session.scene().is_empty());
        assert!(session.redo());
        assert_eq!(session.scene().len(), 1);
    }

    #[test]
    fn test_pointer_ignored_without_document() {
        let mut session = EditorSession::new(EditorConfig::default());
        session.set_tool(ToolKind::Rect);
        let outcome = draw_rect(&mut session, Point::new(0.0, 0.0), Point::new(50.0, 50.0));
        assert_eq!(outcome, ToolOutcome::Idle);
        assert!(session.scene().is_empty());
    }

    #[test]
    fn test_empty_text_confirm_keeps_entry_open() {
        let (mut session, notifier) = session_with_pages(1);
        session.set_tool(ToolKind::Text);
        session.pointer_down(Point::new(20.0, 20.0));
        assert!(session.is_typing());

        assert!(matches!(
            session.confirm_text(),
            Err(EditorError::Tool(ToolInputError::EmptyText))
        ));
        assert!(session.is_typing());
        assert!(session.scene().is_empty());
        assert_eq!(session.history().len(), 1);
        assert_eq!(notifier.count(Severity::Warning), 1);

        session.set_edit_text("Hello").unwrap();
        session.confirm_text().unwrap();
        assert!(!session.is_typing());
        assert_eq!(session.scene().objects_of_kind(ObjectKind::Text).count(), 1);
    }

    #[test]
    fn test_switch_to_select_finishes_entry() {
        let (mut session, _) = session_with_pages(1);
        session.set_tool(ToolKind::Text);
        session.pointer_down(Point::new(20.0, 20.0));
        session.set_edit_text("keep me").unwrap();

        assert!(matches!(
            session.set_tool(ToolKind::Pen),
            ToolSwitch::Refused { .. }
        ));
        assert!(matches!(
            session.set_tool(ToolKind::Select),
            ToolSwitch::Switched { to: ToolKind::Select, .. }
        ));
        assert!(!session.is_typing());
        assert_eq!(session.scene().len(), 1);
    }

    #[test]
    fn test_note_collapses_after_delay() {
        let (mut session, _) = session_with_pages(1);
        session.set_tool(ToolKind::Note);
        session.pointer_down(Point::new(100.0, 90.0));
        session.set_edit_text("remember").unwrap();
        let id = session.confirm_text().unwrap().id();
        assert_eq!(session.pending_collapses(), 1);

        assert_eq!(session.tick(Instant::now()), 0);
        let later = Instant::now() + Duration::from_secs(3);
        assert_eq!(session.tick(later), 1);
        assert!(session.scene().get(id).unwrap().is_collapsed_note());
        // collapsing is not an undo step
        assert_eq!(session.history().len(), 2);
    }

    #[test]
    fn test_double_click_opens_collapsed_note() {
        let letter = build_blank_document(&[(612.0, 792.0)]).unwrap();
        let (mut session, _) = session_with_document(letter);
        let id = confirmed_note(&mut session, Point::new(300.0, 300.0), "check figures");
        session.tick(Instant::now() + Duration::from_secs(3));
        assert!(session.scene().get(id).unwrap().is_collapsed_note());

        session.set_tool(ToolKind::Select);
        let steps = session.history().len();
        let disc = Point::new(238.0, 243.4);
        session.pointer_down(disc);
        session.pointer_up(disc);
        session.pointer_down(disc);
        session.pointer_up(disc);
        let outcome = session.double_click(disc);

        assert_eq!(outcome, ToolOutcome::BeginEdit(EditTarget::Note { id }));
        assert!(session.is_typing());
        assert_eq!(session.editor().unwrap().text(), "check figures");
        // only the expanding press is an undo step
        assert_eq!(session.history().len(), steps + 1);
        assert_eq!(session.pending_collapses(), 0);
    }

    #[test]
    fn test_undo_reschedules_collapse_of_restored_note() {
        let (mut session, _) = session_with_pages(1);
        let id = confirmed_note(&mut session, Point::new(100.0, 90.0), "remember");
        assert_eq!(session.tick(Instant::now() + Duration::from_secs(3)), 1);

        session.set_tool(ToolKind::Rect);
        draw_rect(&mut session, Point::new(10.0, 10.0), Point::new(50.0, 50.0));
        assert!(session.undo());

        // the restored snapshot predates the collapse
        assert!(!session.scene().get(id).unwrap().is_collapsed_note());
        assert_eq!(session.pending_collapses(), 1);
        assert_eq!(session.tick(Instant::now() + Duration::from_secs(3)), 1);
        assert!(session.scene().get(id).unwrap().is_collapsed_note());
    }

    #[test]
    fn test_undo_and_redo_of_note_track_its_timer() {
        let (mut session, _) = session_with_pages(1);
        let id = confirmed_note(&mut session, Point::new(100.0, 90.0), "again");

        assert!(session.undo());
        assert!(session.scene().get(id).is_none());
        assert_eq!(session.pending_collapses(), 0);

        assert!(session.redo());
        assert_eq!(session.pending_collapses(), 1);
        assert_eq!(session.tick(Instant::now() + Duration::from_secs(3)), 1);
        assert!(session.scene().get(id).unwrap().is_collapsed_note());
    }

    #[test]
    fn test_deleting_note_cancels_collapse() {
        let (mut session, _) = session_with_pages(1);
        session.set_tool(ToolKind::Note);
        session.pointer_down(Point::new(100.0, 90.0));
        session.set_edit_text("temp").unwrap();
        session.confirm_text().unwrap();

        assert!(session.delete_selected());
        assert_eq!(session.pending_collapses(), 0);
        assert_eq!(session.tick(Instant::now() + Duration::from_secs(3)), 0);
    }

    #[test]
    fn test_note_on_other_page_collapses_in_storage() {
        let (mut session, _) = session_with_pages(2);
        session.set_tool(ToolKind::Note);
        session.pointer_down(Point::new(100.0, 90.0));
        session.set_edit_text("page one").unwrap();
        let id = session.confirm_text().unwrap().id();

        session.go_to_page(2).unwrap();
        assert_eq!(session.tick(Instant::now() + Duration::from_secs(3)), 1);
        let stored = session.page_scene(1).unwrap();
        assert!(stored.get(id).unwrap().is_collapsed_note());
    }

    #[test]
    fn test_one_shot_tool_requests_and_returns_to_select() {
        let (mut session, _) = session_with_pages(1);
        session.set_tool(ToolKind::Stamp);
        assert_eq!(session.take_request(), Some(ToolRequest::StampPanel));
        assert_eq!(session.take_request(), None);

        let today = chrono::NaiveDate::from_ymd_opt(2026, 1, 2).unwrap();
        let id = session
            .insert_stamp_dated(&crate::insert::StampPreset::Draft.into(), today)
            .unwrap();

        assert_eq!(session.active_tool(), ToolKind::Select);
        assert_eq!(session.selection(), Some(id));
        // centred on the visible page
        let center = session.scene().get(id).unwrap().bounds().center();
        assert!((center.x - 100.0).abs() < 1e-3 && (center.y - 50.0).abs() < 1e-3);
    }

    #[test]
    fn test_invalid_image_notifies_and_keeps_scene() {
        let (mut session, notifier) = session_with_pages(1);
        assert!(matches!(
            session.insert_image(b"nope".to_vec()),
            Err(EditorError::Tool(ToolInputError::InvalidImage(_)))
        ));
        assert!(session.scene().is_empty());
        assert_eq!(session.history().len(), 1);
        assert_eq!(notifier.count(Severity::Error), 1);
    }

    #[test]
    fn test_keyboard_shortcuts() {
        let (mut session, _) = session_with_pages(1);
        assert_eq!(
            session.handle_key(KeyInput::new(Key::Char('p'))),
            KeyAction::ToolSelected(ToolKind::Pen)
        );
        session.set_tool(ToolKind::Rect);
        draw_rect(&mut session, Point::new(10.0, 10.0), Point::new(50.0, 50.0));

        assert_eq!(session.handle_key(KeyInput::command(Key::Char('z'))), KeyAction::Undone);
        assert_eq!(session.handle_key(KeyInput::command(Key::Char('z'))), KeyAction::Ignored);
        assert_eq!(session.handle_key(KeyInput::command(Key::Char('y'))), KeyAction::Redone);
        assert_eq!(session.handle_key(KeyInput::command(Key::Char('s'))), KeyAction::SaveRequested);

        session.set_tool(ToolKind::Select);
        session.pointer_down(Point::new(30.0, 10.0));
        session.pointer_up(Point::new(30.0, 10.0));
        assert_eq!(session.handle_key(KeyInput::new(Key::Delete)), KeyAction::Deleted);
        assert!(session.scene().is_empty());
        assert_eq!(session.handle_key(KeyInput::new(Key::Escape)), KeyAction::Escaped);
    }

    #[test]
    fn test_keys_ignored_while_typing() {
        let (mut session, _) = session_with_pages(1);
        session.set_tool(ToolKind::Text);
        session.pointer_down(Point::new(20.0, 20.0));

        assert_eq!(session.handle_key(KeyInput::new(Key::Char('p'))), KeyAction::Ignored);
        assert_eq!(session.handle_key(KeyInput::new(Key::Escape)), KeyAction::Ignored);
        assert_eq!(session.active_tool(), ToolKind::Text);
    }

    #[test]
    fn test_clear_all_is_one_step() {
        let (mut session, _) = session_with_pages(1);
        session.set_tool(ToolKind::Rect);
        draw_rect(&mut session, Point::new(10.0, 10.0), Point::new(50.0, 50.0));
        draw_rect(&mut session, Point::new(60.0, 10.0), Point::new(90.0, 50.0));

        assert!(session.clear_all());
        assert!(session.scene().is_empty());
        assert!(session.undo());
        assert_eq!(session.scene().len(), 2);
        assert!(!EditorSession::new(EditorConfig::default()).clear_all());
    }

    #[test]
    fn test_render_view_uses_zoom() {
        let (mut session, _) = session_with_pages(1);
        let image = session.render_view().unwrap();
        assert_eq!(image.dimensions(), (200, 100));

        assert_eq!(session.set_zoom(200.0), 200.0);
        let image = session.render_view().unwrap();
        assert_eq!(image.dimensions(), (400, 200));
    }

    #[test]
    fn test_page_content_survives_view_and_export() {
        let bytes = build_document(&[((200.0, 100.0), b"0 g 0 0 200 100 re f".as_slice())]).unwrap();
        let (mut session, notifier) = session_with_document(bytes);
        assert_eq!(session.missing_content(), None);

        let view = session.render_view().unwrap();
        assert_eq!(view.get_pixel(100, 50).0, [0, 0, 0, 255]);

        let exported = session.export().unwrap();
        let (mut reopened, _) = session_with_document(exported);
        let page = reopened.render_view().unwrap();
        assert_eq!(page.get_pixel(100, 50).0, [0, 0, 0, 255]);
        assert_eq!(notifier.count(Severity::Warning), 0);
    }

    #[test]
    fn test_undrawable_content_is_reported() {
        let bytes = build_document(&[
            ((200.0, 100.0), b"".as_slice()),
            ((200.0, 100.0), b"BT /F1 12 Tf 10 10 Td (Hi) Tj ET".as_slice()),
        ])
        .unwrap();
        let (mut session, notifier) = session_with_document(bytes);

        assert_eq!(session.missing_content(), Some("text (page 2)"));
        assert_eq!(notifier.count(Severity::Warning), 1);

        session.export().unwrap();
        assert_eq!(notifier.count(Severity::Warning), 2);
    }

    #[test]
    fn test_export_denied_and_saved() {
        let (session, _) = session_with_pages(2);
        let mut denied = session.with_access_gate(|feature: &str| feature != "export");
        assert!(matches!(
            denied.export(),
            Err(EditorError::AccessDenied { feature }) if feature == "export"
        ));

        let (mut session, _) = session_with_pages(2);
        let mut sink = MemorySink::default();
        let name = session.export_to(&mut sink, "Report").unwrap();
        assert_eq!(name, "Report.pdf");
        assert!(sink.saved[0].1.starts_with(b"%PDF-"));
    }

    #[test]
    fn test_cancelled_export_yields_nothing() {
        let (mut session, _) = session_with_pages(2);
        session.export_cancellation().cancel();
        assert!(matches!(
            session.export(),
            Err(EditorError::Export(ExportError::Cancelled { page: 1 }))
        ));
        // the token is re-armed for the next export
        assert!(session.export().is_ok());
    }

    #[test]
    fn test_remove_document_resets() {
        let (mut session, _) = session_with_pages(2);
        session.set_tool(ToolKind::Rect);
        draw_rect(&mut session, Point::new(10.0, 10.0), Point::new(50.0, 50.0));
        session.remove_document();

        assert!(!session.has_document());
        assert!(session.scene().is_empty());
        assert_eq!(session.active_tool(), ToolKind::Select);
        assert!(!session.toolbar_state().can_undo);
        assert_eq!(session.toolbar_state().page_label, None);
        assert!(matches!(session.go_to_page(1), Err(EditorError::NoDocument)));
    }
}
