//! Headless annotation editor
//!
//! [`Editor`] owns the annotation store, the active tool, the selection and
//! the single in-progress gesture. Hosts feed it pointer, keyboard and
//! completion events; every handler returns the effects the host must carry
//! out (redraw the overlay, render a page, open the text dialog, ...).
//!
//! Dispatch is synchronous. Page rendering and saving are the only
//! asynchronous boundaries: the editor asks for them through effects or the
//! persistence worker and learns about their outcome through
//! [`Editor::page_rendered`] and [`Editor::poll_persistence`].

use crate::annotation::{Annotation, AnnotationId, AnnotationPatch, TextProperties};
use crate::config::EditorConfig;
use crate::error::{EditorError, EditorResult, ValidationError};
use crate::geometry::{to_local, Point, Rect};
use crate::gesture::{DragGesture, DrawGesture, Gesture, ResizeGesture, ShapeKind};
use crate::hit_test::{find_topmost, hits_resize_handle};
use crate::navigation::{PageNavigator, PageSource, PageSourceError, RenderRequest, RenderedPage};
use crate::persistence::{
    ArtifactReference, PersistenceError, PersistenceGateway, PersistenceWorker, SaveCompletion,
    SaveRequest, SaveTicket,
};
use crate::projector::{Primitive, RenderProjector};
use crate::store::AnnotationStore;
use crate::tool::{Cursor, Tool, ToolState};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Identity of the loaded document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentInfo {
    /// Name sent with every save request
    pub identifier: String,
    pub page_count: u32,
}

impl DocumentInfo {
    pub fn new(identifier: impl Into<String>, page_count: u32) -> Self {
        Self { identifier: identifier.into(), page_count }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerButton {
    #[default]
    Primary,
    Secondary,
    Auxiliary,
}

/// Pointer event in viewport coordinates
///
/// `surface` is the overlay's bounding rectangle measured at the time of the
/// event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointerEvent {
    pub x: f32,
    pub y: f32,
    pub surface: Rect,
    #[serde(default)]
    pub button: PointerButton,
    #[serde(default = "default_click_count")]
    pub click_count: u32,
}

fn default_click_count() -> u32 {
    1
}

impl PointerEvent {
    pub fn new(x: f32, y: f32, surface: Rect) -> Self {
        Self { x, y, surface, button: PointerButton::Primary, click_count: 1 }
    }

    pub fn with_button(mut self, button: PointerButton) -> Self {
        self.button = button;
        self
    }

    pub fn with_click_count(mut self, click_count: u32) -> Self {
        self.click_count = click_count;
        self
    }

    /// Position relative to the overlay
    pub fn local(&self) -> Point {
        to_local(self.x, self.y, &self.surface)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Key {
    #[serde(alias = "Escape")]
    Escape,
    #[serde(alias = "Delete")]
    Delete,
    #[serde(untagged)]
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    /// The editor cannot continue
    Blocking,
    NonBlocking,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub severity: Severity,
    pub message: String,
}

/// What a text dialog result will be applied to
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TextTarget {
    /// New annotation at `origin` on `page`
    Create { page: u32, origin: Point },
    /// Content edit of an existing text annotation
    Edit(AnnotationId),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextDialogRequest {
    pub target: TextTarget,
    pub initial: TextProperties,
}

/// Work the host must perform after an event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EditorEffect {
    /// Re-project and repaint the overlay
    Redraw,
    RenderPage(RenderRequest),
    OpenTextDialog(TextDialogRequest),
    CursorChanged(Cursor),
    Notify(Notification),
}

/// Interactive annotation editor for one document
pub struct Editor {
    config: EditorConfig,
    document: DocumentInfo,
    store: AnnotationStore,
    tools: ToolState,
    selection: Option<AnnotationId>,
    gesture: Gesture,
    navigator: PageNavigator,
    projector: RenderProjector,
    pending_dialog: Option<TextDialogRequest>,
    persistence: Option<PersistenceWorker>,
    halted: Option<String>,
    effects: Vec<EditorEffect>,
}

impl Editor {
    pub fn new(config: EditorConfig, document: DocumentInfo) -> EditorResult<Self> {
        if document.identifier.trim().is_empty() {
            return Err(EditorError::Initialization("document identifier is empty".to_owned()));
        }
        if document.page_count == 0 {
            return Err(EditorError::Initialization("document has no pages".to_owned()));
        }
        config.validate().map_err(|err| EditorError::Initialization(err.to_string()))?;

        tracing::info!(
            document = %document.identifier,
            pages = document.page_count,
            "editor initialized"
        );

        Ok(Self {
            store: AnnotationStore::with_text_layout(config.text_layout),
            tools: ToolState::new(config.tools),
            selection: None,
            gesture: Gesture::Idle,
            navigator: PageNavigator::new(document.page_count, config.start_page),
            projector: RenderProjector::with_handle_size(config.resize_handle_size),
            pending_dialog: None,
            persistence: None,
            halted: None,
            effects: Vec::new(),
            config,
            document,
        })
    }

    /// Build an editor for the document behind `source`
    pub fn open<S>(config: EditorConfig, identifier: impl Into<String>, source: &S) -> EditorResult<Self>
    where
        S: PageSource + ?Sized,
    {
        Self::new(config, DocumentInfo::new(identifier, source.page_count()))
    }

    /// Save every committed change through `gateway`
    pub fn with_persistence(mut self, gateway: Arc<dyn PersistenceGateway>) -> Self {
        self.persistence = Some(PersistenceWorker::new(gateway));
        self
    }

    /// Effects for the initial paint: cursor and first page render
    pub fn start(&mut self) -> Vec<EditorEffect> {
        self.emit(EditorEffect::CursorChanged(self.tools.tool().cursor()));
        self.request_render(self.navigator.current());
        self.drain()
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn document(&self) -> &DocumentInfo {
        &self.document
    }

    pub fn store(&self) -> &AnnotationStore {
        &self.store
    }

    pub fn tool(&self) -> Tool {
        self.tools.tool()
    }

    pub fn tool_state(&self) -> &ToolState {
        &self.tools
    }

    /// Tool settings applied to future shapes
    pub fn tool_state_mut(&mut self) -> &mut ToolState {
        &mut self.tools
    }

    pub fn selection(&self) -> Option<&AnnotationId> {
        self.selection.as_ref()
    }

    pub fn gesture(&self) -> &Gesture {
        &self.gesture
    }

    pub fn current_page(&self) -> u32 {
        self.navigator.current()
    }

    pub fn page_count(&self) -> u32 {
        self.navigator.page_count()
    }

    pub fn pending_dialog(&self) -> Option<&TextDialogRequest> {
        self.pending_dialog.as_ref()
    }

    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    /// Locator of the newest successful save
    pub fn latest_artifact(&self) -> Option<&ArtifactReference> {
        self.persistence.as_ref().and_then(PersistenceWorker::latest_artifact)
    }

    // ============================================================================
    // Tools and selection
    // ============================================================================

    pub fn set_tool(&mut self, tool: Tool) -> Vec<EditorEffect> {
        self.switch_tool(tool);
        self.drain()
    }

    /// Select `id`, replacing any previous selection
    pub fn select(&mut self, id: &AnnotationId) -> EditorResult<Vec<EditorEffect>> {
        if !self.store.contains(id) {
            return Err(EditorError::NotFound(id.clone()));
        }
        self.set_selection(Some(id.clone()));
        Ok(self.drain())
    }

    pub fn clear_selection(&mut self) -> Vec<EditorEffect> {
        self.set_selection(None);
        self.drain()
    }

    // ============================================================================
    // Pointer and keyboard
    // ============================================================================

    pub fn handle_pointer_down(&mut self, event: &PointerEvent) -> Vec<EditorEffect> {
        if !self.gesture.is_idle() {
            tracing::debug!(gesture = self.gesture.name(), "pointer down ignored during gesture");
            return Vec::new();
        }
        if self.pending_dialog.is_some() || event.button == PointerButton::Auxiliary {
            return Vec::new();
        }

        let point = event.local();
        let page = self.navigator.current();
        let tool = self.tools.tool();
        let primary = event.button == PointerButton::Primary;

        if tool == Tool::Text && primary {
            let hit_text = find_topmost(point, self.store.by_page(page))
                .filter(|annotation| annotation.is_text())
                .map(|annotation| annotation.id.clone());
            match hit_text {
                Some(id) => self.request_text_edit(&id),
                None => self.request_text_create(page, point),
            }
            return self.drain();
        }

        if primary {
            if let Some(resize) = self.resize_target(point, page) {
                tracing::debug!(id = %resize.annotation_id, "resize started");
                self.gesture = Gesture::Resizing(resize);
                return self.drain();
            }
        }

        let hit = find_topmost(point, self.store.by_page(page)).map(|annotation| {
            (annotation.id.clone(), annotation.bounds(), annotation.is_text())
        });

        if let Some((id, bounds, is_text)) = hit {
            if is_text && event.click_count >= 2 {
                self.request_text_edit(&id);
                return self.drain();
            }
            self.set_selection(Some(id.clone()));
            self.switch_tool(Tool::Select);
            tracing::debug!(%id, "drag started");
            self.gesture = Gesture::Dragging(DragGesture::new(id, point, bounds));
            return self.drain();
        }

        match tool {
            tool if tool.is_drawing() && primary => {
                self.set_selection(None);
                let shape = if tool == Tool::Highlight { ShapeKind::Highlight } else { ShapeKind::Rectangle };
                tracing::debug!(?shape, page, "draw started");
                self.gesture = Gesture::Drawing(DrawGesture::new(shape, page, point));
                self.emit(EditorEffect::Redraw);
            }
            Tool::Select => self.set_selection(None),
            _ => {}
        }
        self.drain()
    }

    pub fn handle_pointer_move(&mut self, event: &PointerEvent) -> Vec<EditorEffect> {
        let point = event.local();
        let min_resize = self.config.min_resize_size;

        let moved = match &mut self.gesture {
            Gesture::Idle => false,
            Gesture::Drawing(draw) => {
                draw.update_position(point);
                true
            }
            Gesture::Dragging(drag) => {
                drag.update_position(point, &event.surface);
                true
            }
            Gesture::Resizing(resize) => {
                resize.update_position(point, min_resize);
                true
            }
        };

        if moved {
            self.emit(EditorEffect::Redraw);
        }
        self.drain()
    }

    pub fn handle_pointer_up(&mut self, event: &PointerEvent) -> Vec<EditorEffect> {
        let point = event.local();

        match std::mem::take(&mut self.gesture) {
            Gesture::Idle => {}
            Gesture::Drawing(mut draw) => {
                draw.update_position(point);
                self.finish_draw(draw);
            }
            Gesture::Dragging(mut drag) => {
                drag.update_position(point, &event.surface);
                if drag.has_moved() {
                    let patch = AnnotationPatch::position(drag.current.x, drag.current.y);
                    self.commit_update(&drag.annotation_id, &patch);
                } else {
                    self.emit(EditorEffect::Redraw);
                }
            }
            Gesture::Resizing(mut resize) => {
                resize.update_position(point, self.config.min_resize_size);
                if resize.has_resized() {
                    let patch = AnnotationPatch::size(resize.current.width, resize.current.height);
                    self.commit_update(&resize.annotation_id, &patch);
                } else {
                    self.emit(EditorEffect::Redraw);
                }
            }
        }
        self.drain()
    }

    /// `Escape` returns to the select tool and clears the selection without
    /// aborting an in-flight gesture; `Delete` removes the selection.
    pub fn handle_key(&mut self, key: &Key) -> Vec<EditorEffect> {
        match key {
            Key::Escape => {
                self.switch_tool(Tool::Select);
                self.set_selection(None);
            }
            Key::Delete => {
                if let Some(id) = self.selection.clone() {
                    if let Err(err) = self.delete(&id) {
                        tracing::warn!(%id, error = %err, "delete failed");
                    }
                }
            }
            Key::Other(_) => {}
        }
        self.drain()
    }

    // ============================================================================
    // Text dialog
    // ============================================================================

    /// Ask the host for a content edit of text annotation `id`
    pub fn open_text_editor(&mut self, id: &AnnotationId) -> EditorResult<Vec<EditorEffect>> {
        let annotation = self.store.get(id).ok_or_else(|| EditorError::NotFound(id.clone()))?;
        if !annotation.is_text() {
            return Err(ValidationError::FieldMismatch { field: "text", kind: annotation.kind.name() }.into());
        }
        self.request_text_edit(id);
        Ok(self.drain())
    }

    /// Resolve the open text dialog
    ///
    /// `None`, or content that is blank after trimming, cancels without
    /// creating or changing anything.
    pub fn confirm_text(&mut self, properties: Option<TextProperties>) -> EditorResult<Vec<EditorEffect>> {
        let request = self.pending_dialog.take().ok_or(EditorError::NoPendingDialog)?;

        let Some(properties) = properties.filter(|properties| !properties.text.trim().is_empty()) else {
            tracing::debug!("text dialog cancelled");
            return Ok(self.drain());
        };

        match request.target {
            TextTarget::Create { page, origin } => {
                let annotation =
                    Annotation::text(Some(page), origin, properties, self.store.text_layout());
                let id = self.store.add(annotation)?;
                tracing::info!(%id, page, "text annotation created");
            }
            TextTarget::Edit(id) => {
                self.store.update(&id, &AnnotationPatch::from_text_properties(properties))?;
                tracing::info!(%id, "text annotation edited");
            }
        }
        self.after_mutation();
        Ok(self.drain())
    }

    pub fn cancel_text(&mut self) -> EditorResult<Vec<EditorEffect>> {
        self.confirm_text(None)
    }

    // ============================================================================
    // Direct store access
    // ============================================================================

    /// Insert an existing annotation (for example one loaded from disk)
    pub fn add_annotation(&mut self, annotation: Annotation) -> EditorResult<AnnotationId> {
        let id = self.store.add(annotation).inspect_err(|err| {
            tracing::warn!(error = %err, "annotation rejected");
        })?;
        self.after_mutation();
        Ok(id)
    }

    pub fn update_annotation(&mut self, id: &AnnotationId, patch: &AnnotationPatch) -> EditorResult<()> {
        self.store.update(id, patch)?;
        self.after_mutation();
        Ok(())
    }

    /// Remove `id`, clearing the selection and any gesture that targets it
    pub fn remove_annotation(&mut self, id: &AnnotationId) -> EditorResult<Vec<EditorEffect>> {
        self.delete(id)?;
        Ok(self.drain())
    }

    pub fn delete_selected(&mut self) -> EditorResult<Vec<EditorEffect>> {
        match self.selection.clone() {
            Some(id) => self.remove_annotation(&id),
            None => Ok(Vec::new()),
        }
    }

    // ============================================================================
    // Pages
    // ============================================================================

    pub fn next_page(&mut self) -> EditorResult<Vec<EditorEffect>> {
        self.ensure_running()?;
        if let Some(page) = self.navigator.next() {
            self.page_changed(page);
        }
        Ok(self.drain())
    }

    pub fn previous_page(&mut self) -> EditorResult<Vec<EditorEffect>> {
        self.ensure_running()?;
        if let Some(page) = self.navigator.previous() {
            self.page_changed(page);
        }
        Ok(self.drain())
    }

    pub fn go_to_page(&mut self, page: u32) -> EditorResult<Vec<EditorEffect>> {
        self.ensure_running()?;
        if self.navigator.go_to(page)? {
            self.page_changed(page);
        }
        Ok(self.drain())
    }

    /// Report the outcome of the render currently in flight
    ///
    /// A failure halts the editor.
    pub fn page_rendered(&mut self, result: Result<RenderedPage, PageSourceError>) -> Vec<EditorEffect> {
        if self.is_halted() {
            return Vec::new();
        }

        match result {
            Ok(rendered) => {
                tracing::debug!(page = rendered.page, "page rendered");
                if let Some(next) = self.navigator.complete() {
                    self.emit(EditorEffect::RenderPage(next));
                }
                self.emit(EditorEffect::Redraw);
            }
            Err(err) => {
                let page = self.navigator.in_flight().map_or(self.navigator.current(), |request| request.page);
                self.halt(EditorError::Render { page, reason: err.to_string() });
            }
        }
        self.drain()
    }

    /// Report that the document could not be loaded
    pub fn fail_load(&mut self, reason: impl Into<String>) -> Vec<EditorEffect> {
        self.halt(EditorError::Load(reason.into()));
        self.drain()
    }

    /// Perform every pending render synchronously against `source`
    pub fn run_renders<S>(&mut self, source: &S) -> Vec<EditorEffect>
    where
        S: PageSource + ?Sized,
    {
        let mut effects = Vec::new();
        while let Some(request) = self.navigator.in_flight() {
            if self.is_halted() {
                break;
            }
            let result = source.render(request.page, request.scale);
            effects.extend(
                self.page_rendered(result)
                    .into_iter()
                    .filter(|effect| !matches!(effect, EditorEffect::RenderPage(_))),
            );
        }
        effects
    }

    // ============================================================================
    // Persistence
    // ============================================================================

    /// Submit the current annotation set; safe to repeat after a failure
    pub fn save(&mut self) -> EditorResult<SaveTicket> {
        self.ensure_running()?;
        let request = SaveRequest::new(self.document.identifier.clone(), self.store.snapshot());
        let worker = self.persistence.as_mut().ok_or(PersistenceError::Disconnected)?;
        Ok(worker.submit(request)?)
    }

    /// Collect finished saves without blocking
    pub fn poll_persistence(&mut self) -> Vec<EditorEffect> {
        let completions = match self.persistence.as_mut() {
            Some(worker) => worker.poll(),
            None => Vec::new(),
        };
        self.report_saves(completions);
        self.drain()
    }

    /// Block until outstanding saves finish or `timeout` elapses
    pub fn wait_for_persistence(&mut self, timeout: Duration) -> Vec<EditorEffect> {
        let completions = match self.persistence.as_mut() {
            Some(worker) => worker.wait(timeout),
            None => Vec::new(),
        };
        self.report_saves(completions);
        self.drain()
    }

    // ============================================================================
    // Projection
    // ============================================================================

    /// Primitives for the current page, reflecting an in-progress move or resize
    pub fn projection(&self) -> Vec<Primitive> {
        let live = match &self.gesture {
            Gesture::Dragging(drag) => Some((&drag.annotation_id, drag.current)),
            Gesture::Resizing(resize) => Some((&resize.annotation_id, resize.current)),
            Gesture::Idle | Gesture::Drawing(_) => None,
        };

        self.store
            .by_page(self.navigator.current())
            .map(|annotation| {
                let selected = self.selection.as_ref() == Some(&annotation.id);
                match live {
                    Some((id, bounds)) if *id == annotation.id => {
                        let mut moving = annotation.clone();
                        moving.x = bounds.x;
                        moving.y = bounds.y;
                        moving.width = bounds.width;
                        moving.height = bounds.height;
                        self.projector.project_annotation(&moving, selected)
                    }
                    _ => self.projector.project_annotation(annotation, selected),
                }
            })
            .collect()
    }

    /// Transient shape of the draw gesture, if one is active
    pub fn preview(&self) -> Option<Primitive> {
        match &self.gesture {
            Gesture::Drawing(draw) => Some(self.projector.project_preview(draw, self.tools.settings())),
            _ => None,
        }
    }

    // ============================================================================
    // Internals
    // ============================================================================

    fn emit(&mut self, effect: EditorEffect) {
        self.effects.push(effect);
    }

    fn drain(&mut self) -> Vec<EditorEffect> {
        std::mem::take(&mut self.effects)
    }

    fn ensure_running(&self) -> EditorResult<()> {
        match &self.halted {
            Some(reason) => Err(EditorError::Halted(reason.clone())),
            None => Ok(()),
        }
    }

    fn halt(&mut self, error: EditorError) {
        tracing::error!(error = %error, "editor halted");
        self.halted = Some(error.to_string());
        self.navigator.cancel();
        self.gesture = Gesture::Idle;
        self.emit(EditorEffect::Notify(Notification {
            severity: Severity::Blocking,
            message: error.to_string(),
        }));
    }

    fn switch_tool(&mut self, tool: Tool) {
        if let Some(cursor) = self.tools.set_tool(tool) {
            self.emit(EditorEffect::CursorChanged(cursor));
        }
    }

    fn set_selection(&mut self, selection: Option<AnnotationId>) {
        if self.selection != selection {
            self.selection = selection;
            self.emit(EditorEffect::Redraw);
        }
    }

    fn request_render(&mut self, page: u32) {
        if let Some(request) = self.navigator.request(page, self.config.render_scale) {
            self.emit(EditorEffect::RenderPage(request));
        }
    }

    fn page_changed(&mut self, page: u32) {
        tracing::debug!(page, "page changed");
        self.set_selection(None);
        self.request_render(page);
        self.emit(EditorEffect::Redraw);
    }

    fn request_text_create(&mut self, page: u32, origin: Point) {
        let initial =
            TextProperties { color: self.tools.settings().text_color, ..self.config.default_text_properties() };
        self.open_dialog(TextDialogRequest { target: TextTarget::Create { page, origin }, initial });
    }

    fn request_text_edit(&mut self, id: &AnnotationId) {
        if let Some(initial) = self.store.get(id).and_then(Annotation::text_properties) {
            self.open_dialog(TextDialogRequest { target: TextTarget::Edit(id.clone()), initial });
        }
    }

    fn open_dialog(&mut self, request: TextDialogRequest) {
        self.pending_dialog = Some(request.clone());
        self.emit(EditorEffect::OpenTextDialog(request));
    }

    /// Selected annotation on `page` whose corner handle is under `point`
    fn resize_target(&self, point: Point, page: u32) -> Option<ResizeGesture> {
        let annotation = self.selection.as_ref().and_then(|id| self.store.get(id))?;
        if !annotation.is_on_page(page) || !hits_resize_handle(point, annotation, self.config.resize_handle_size) {
            return None;
        }
        Some(ResizeGesture::new(annotation.id.clone(), point, annotation.bounds()))
    }

    fn finish_draw(&mut self, draw: DrawGesture) {
        if !draw.is_committable(self.config.min_draw_size) {
            tracing::debug!(width = draw.current.width, height = draw.current.height, "draw discarded");
            self.emit(EditorEffect::Redraw);
            return;
        }

        let settings = *self.tools.settings();
        let annotation = match draw.shape {
            ShapeKind::Highlight => {
                Annotation::highlight(Some(draw.page), draw.current, settings.color, settings.opacity)
            }
            ShapeKind::Rectangle => Annotation::rectangle(
                Some(draw.page),
                draw.current,
                settings.color,
                settings.rect_style,
                settings.border_width,
                settings.opacity,
            ),
        };

        match self.store.add(annotation) {
            Ok(id) => {
                tracing::info!(%id, page = draw.page, shape = ?draw.shape, "annotation created");
                self.after_mutation();
            }
            Err(err) => {
                tracing::warn!(error = %err, "drawn annotation rejected");
                self.notify(Severity::NonBlocking, err.to_string());
            }
        }
    }

    fn commit_update(&mut self, id: &AnnotationId, patch: &AnnotationPatch) {
        match self.store.update(id, patch) {
            Ok(_) => {
                tracing::info!(%id, "annotation updated");
                self.after_mutation();
            }
            Err(err) => {
                tracing::warn!(%id, error = %err, "update rejected");
                self.notify(Severity::NonBlocking, err.to_string());
                self.emit(EditorEffect::Redraw);
            }
        }
    }

    fn delete(&mut self, id: &AnnotationId) -> EditorResult<()> {
        self.store.remove(id)?;
        tracing::info!(%id, "annotation deleted");

        if self.selection.as_ref() == Some(id) {
            self.selection = None;
        }
        if self.gesture.target() == Some(id) {
            self.gesture = Gesture::Idle;
        }
        if matches!(&self.pending_dialog, Some(TextDialogRequest { target: TextTarget::Edit(edit), .. }) if edit == id) {
            self.pending_dialog = None;
        }
        self.after_mutation();
        Ok(())
    }

    /// Schedule a redraw and a save unless halted
    fn after_mutation(&mut self) {
        if self.is_halted() {
            tracing::debug!(revision = self.store.revision(), "halted; mutation not persisted");
            return;
        }
        self.emit(EditorEffect::Redraw);

        let request = SaveRequest::new(self.document.identifier.clone(), self.store.snapshot());
        if let Some(worker) = self.persistence.as_mut() {
            if let Err(err) = worker.submit(request) {
                tracing::warn!(error = %err, "failed to schedule save");
                self.notify(Severity::NonBlocking, format!("Failed to save annotations: {err}"));
            }
        }
    }

    fn report_saves(&mut self, completions: Vec<SaveCompletion>) {
        for completion in completions {
            match completion.result {
                Ok(artifact) => {
                    tracing::info!(ticket = completion.ticket.0, %artifact, "annotations saved");
                    self.notify(Severity::Info, format!("Annotations saved: {artifact}"));
                }
                Err(err) => {
                    tracing::warn!(ticket = completion.ticket.0, error = %err, "save failed");
                    self.notify(Severity::NonBlocking, format!("Failed to save annotations: {err}"));
                }
            }
        }
    }

    fn notify(&mut self, severity: Severity, message: String) {
        self.emit(EditorEffect::Notify(Notification { severity, message }));
    }
}

impl std::fmt::Debug for Editor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Editor")
            .field("document", &self.document)
            .field("page", &self.navigator.current())
            .field("tool", &self.tools.tool())
            .field("selection", &self.selection)
            .field("gesture", &self.gesture.name())
            .field("annotations", &self.store.len())
            .field("halted", &self.halted)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{Color, TextBackground};

    fn surface() -> Rect {
        Rect::new(0.0, 0.0, 600.0, 800.0)
    }

    fn editor() -> Editor {
        Editor::new(EditorConfig::default(), DocumentInfo::new("doc.pdf", 3)).unwrap()
    }

    fn press(editor: &mut Editor, x: f32, y: f32) -> Vec<EditorEffect> {
        editor.handle_pointer_down(&PointerEvent::new(x, y, surface()))
    }

    fn drag_to(editor: &mut Editor, x: f32, y: f32) -> Vec<EditorEffect> {
        editor.handle_pointer_move(&PointerEvent::new(x, y, surface()));
        editor.handle_pointer_up(&PointerEvent::new(x, y, surface()))
    }

    fn properties(text: &str) -> TextProperties {
        TextProperties {
            text: text.to_owned(),
            font_size: 16.0,
            color: Color::BLACK,
            background_color: TextBackground::Transparent,
            padding: 4.0,
        }
    }

    #[test]
    fn test_empty_identifier_fails_initialization() {
        let result = Editor::new(EditorConfig::default(), DocumentInfo::new("  ", 1));
        assert!(matches!(result, Err(EditorError::Initialization(_))));
    }

    #[test]
    fn test_start_requests_first_page() {
        let mut editor = editor();
        let effects = editor.start();
        assert!(effects.contains(&EditorEffect::CursorChanged(Cursor::Pointer)));
        assert!(effects.contains(&EditorEffect::RenderPage(RenderRequest { page: 1, scale: 1.5 })));
    }

    #[test]
    fn test_surface_offset_is_applied() {
        let mut editor = editor();
        editor.set_tool(Tool::Rectangle);
        let moved = Rect::new(100.0, 200.0, 600.0, 800.0);

        editor.handle_pointer_down(&PointerEvent::new(110.0, 210.0, moved));
        editor.handle_pointer_move(&PointerEvent::new(160.0, 260.0, moved));
        editor.handle_pointer_up(&PointerEvent::new(160.0, 260.0, moved));

        let annotation = editor.store().iter().next().unwrap();
        assert_eq!(annotation.bounds(), Rect::new(10.0, 10.0, 50.0, 50.0));
    }

    #[test]
    fn test_text_tool_opens_dialog_and_creates_on_confirm() {
        let mut editor = editor();
        editor.set_tool(Tool::Text);

        let effects = press(&mut editor, 40.0, 50.0);
        assert!(matches!(
            effects.as_slice(),
            [EditorEffect::OpenTextDialog(TextDialogRequest { target: TextTarget::Create { page: 1, .. }, .. })]
        ));

        editor.confirm_text(Some(properties("hello"))).unwrap();
        let annotation = editor.store().iter().next().unwrap();
        assert_eq!((annotation.x, annotation.y), (40.0, 50.0));
        assert!(annotation.is_text());
        assert_eq!(editor.tool(), Tool::Text);
    }

    #[test]
    fn test_text_dialog_uses_current_text_color() {
        let mut editor = editor();
        editor.tool_state_mut().set_text_color(Color::RED);
        editor.set_tool(Tool::Text);

        let effects = press(&mut editor, 40.0, 50.0);
        assert!(matches!(
            effects.as_slice(),
            [EditorEffect::OpenTextDialog(TextDialogRequest { initial, .. })] if initial.color == Color::RED
        ));
    }

    #[test]
    fn test_key_names_accept_dom_spelling() {
        assert_eq!(serde_json::from_str::<Key>("\"Escape\"").unwrap(), Key::Escape);
        assert_eq!(serde_json::from_str::<Key>("\"Delete\"").unwrap(), Key::Delete);
        assert_eq!(serde_json::from_str::<Key>("\"delete\"").unwrap(), Key::Delete);
        assert_eq!(serde_json::from_str::<Key>("\"Enter\"").unwrap(), Key::Other("Enter".to_owned()));
    }

    #[test]
    fn test_blank_text_is_a_cancel() {
        let mut editor = editor();
        editor.set_tool(Tool::Text);
        press(&mut editor, 40.0, 50.0);

        editor.confirm_text(Some(properties("   "))).unwrap();
        assert!(editor.store().is_empty());
        assert_eq!(editor.confirm_text(None), Err(EditorError::NoPendingDialog));
    }

    #[test]
    fn test_text_tool_hit_opens_edit() {
        let mut editor = editor();
        editor.set_tool(Tool::Text);
        press(&mut editor, 40.0, 50.0);
        editor.confirm_text(Some(properties("first"))).unwrap();
        let id = editor.store().iter().next().unwrap().id.clone();

        let effects = press(&mut editor, 45.0, 55.0);
        assert!(matches!(
            effects.as_slice(),
            [EditorEffect::OpenTextDialog(TextDialogRequest { target: TextTarget::Edit(target), initial })]
                if *target == id && initial.text == "first"
        ));

        editor.confirm_text(Some(properties("second line"))).unwrap();
        let annotation = editor.store().get(&id).unwrap();
        assert_eq!(annotation.text_properties().unwrap().text, "second line");
        assert_eq!(editor.store().len(), 1);
    }

    #[test]
    fn test_pointer_down_ignored_while_dialog_open() {
        let mut editor = editor();
        editor.set_tool(Tool::Text);
        press(&mut editor, 40.0, 50.0);

        assert!(press(&mut editor, 200.0, 200.0).is_empty());
    }

    #[test]
    fn test_escape_switches_to_select_and_clears_selection() {
        let mut editor = editor();
        editor.set_tool(Tool::Highlight);
        press(&mut editor, 10.0, 10.0);
        drag_to(&mut editor, 60.0, 60.0);
        let id = editor.store().iter().next().unwrap().id.clone();
        editor.select(&id).unwrap();

        let effects = editor.handle_key(&Key::Escape);
        assert_eq!(editor.tool(), Tool::Select);
        assert_eq!(editor.selection(), None);
        assert!(effects.contains(&EditorEffect::CursorChanged(Cursor::Pointer)));
    }

    #[test]
    fn test_escape_does_not_abort_gesture() {
        let mut editor = editor();
        editor.set_tool(Tool::Rectangle);
        press(&mut editor, 10.0, 10.0);

        editor.handle_key(&Key::Escape);
        assert!(matches!(editor.gesture(), Gesture::Drawing(_)));

        drag_to(&mut editor, 80.0, 80.0);
        assert_eq!(editor.store().len(), 1);
    }

    #[test]
    fn test_navigation_clears_selection_and_requests_render() {
        let mut editor = editor();
        editor.start();
        editor.page_rendered(Ok(RenderedPage { page: 1, width: 900, height: 1200 }));
        editor.set_tool(Tool::Highlight);
        press(&mut editor, 10.0, 10.0);
        drag_to(&mut editor, 60.0, 60.0);
        let id = editor.store().iter().next().unwrap().id.clone();
        editor.select(&id).unwrap();

        let effects = editor.next_page().unwrap();
        assert_eq!(editor.current_page(), 2);
        assert_eq!(editor.selection(), None);
        assert!(effects.contains(&EditorEffect::RenderPage(RenderRequest { page: 2, scale: 1.5 })));

        editor.page_rendered(Ok(RenderedPage { page: 2, width: 900, height: 1200 }));
        editor.next_page().unwrap();
        assert!(editor.next_page().unwrap().is_empty());
        assert_eq!(editor.current_page(), 3);
    }

    #[test]
    fn test_render_failure_halts() {
        let mut editor = editor();
        editor.start();

        let effects = editor.page_rendered(Err(PageSourceError::Render("corrupt stream".to_owned())));
        assert!(editor.is_halted());
        assert!(matches!(
            effects.as_slice(),
            [EditorEffect::Notify(Notification { severity: Severity::Blocking, .. })]
        ));
        assert!(matches!(editor.next_page(), Err(EditorError::Halted(_))));
        assert!(matches!(editor.go_to_page(2), Err(EditorError::Halted(_))));
        assert!(matches!(editor.save(), Err(EditorError::Halted(_))));
    }
}
