//! PDF Markup Core Library
//!
//! Headless annotation engine: annotation model and store, hit testing, tool
//! modes, pointer gestures, render projection, page navigation and the
//! persistence contract.

pub mod annotation;
pub mod config;
pub mod editor;
pub mod error;
pub mod geometry;
pub mod gesture;
pub mod navigation;
pub mod persistence;
pub mod projector;
pub mod store;
pub mod tool;

pub use annotation::{
    Annotation, AnnotationId, AnnotationKind, AnnotationPatch, Color, RectStyle, TextBackground,
    TextLayout, TextProperties,
};
pub use config::{ConfigError, EditorConfig, TextDefaults};
pub use editor::{
    DocumentInfo, Editor, EditorEffect, Key, Notification, PointerButton, PointerEvent, Severity,
    TextDialogRequest, TextTarget,
};
pub use error::{EditorError, EditorResult, ValidationError};
pub use geometry::{clamp_origin, to_local, Point, Rect};
pub use gesture::{DragGesture, DrawGesture, Gesture, ResizeGesture, ShapeKind};
pub use hit_test::{find_topmost, hits_resize_handle, resize_handle_rect};
pub use navigation::{
    PageNavigator, PageSize, PageSource, PageSourceError, RenderRequest, RenderedPage,
};
pub use persistence::{
    ArtifactReference, MemoryGateway, PersistenceError, PersistenceGateway, PersistenceResult,
    PersistenceWorker, SaveCompletion, SaveRequest, SaveResponse, SaveTicket,
};
pub use projector::{Fill, Primitive, RenderProjector, SelectionIndicator, Stroke, TextContent};
pub use store::AnnotationStore;
pub use tool::{Cursor, Tool, ToolSettings, ToolState};
