//! Pointer gestures
//!
//! Exactly one gesture is active at a time. Each variant carries the state it
//! needs to compute the shape under the pointer; nothing is written to the
//! store until the gesture ends.

use crate::annotation::AnnotationId;
use crate::geometry::{clamp_origin, Point, Rect};

/// Shape produced by a draw gesture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    Highlight,
    Rectangle,
}

/// Rubber-band creation of a new shape
#[derive(Debug, Clone, PartialEq)]
pub struct DrawGesture {
    /// Shape to create on commit
    pub shape: ShapeKind,

    /// Page the shape will belong to
    pub page: u32,

    /// Pointer-down position
    pub anchor: Point,

    /// Normalized rectangle between anchor and pointer
    pub current: Rect,
}

impl DrawGesture {
    pub fn new(shape: ShapeKind, page: u32, anchor: Point) -> Self {
        Self { shape, page, anchor, current: Rect::new(anchor.x, anchor.y, 0.0, 0.0) }
    }

    pub fn update_position(&mut self, pointer: Point) {
        self.current = Rect::from_corners(self.anchor, pointer);
    }

    /// Shapes smaller than `min_size` on either axis are discarded
    pub fn is_committable(&self, min_size: f32) -> bool {
        self.current.is_at_least(min_size, min_size)
    }
}

/// Moving an existing annotation
#[derive(Debug, Clone, PartialEq)]
pub struct DragGesture {
    pub annotation_id: AnnotationId,

    /// Pointer-down position
    pub drag_start: Point,

    /// Bounds when the drag began
    pub original: Rect,

    /// Bounds under the pointer, clamped to the overlay
    pub current: Rect,
}

impl DragGesture {
    pub fn new(annotation_id: AnnotationId, drag_start: Point, original: Rect) -> Self {
        Self { annotation_id, drag_start, original, current: original }
    }

    /// Translate by the pointer delta, keeping the box inside `overlay`'s extent
    pub fn update_position(&mut self, pointer: Point, overlay: &Rect) {
        let (dx, dy) = pointer.delta_from(&self.drag_start);
        self.current.x = clamp_origin(self.original.x + dx, self.original.width, overlay.width);
        self.current.y = clamp_origin(self.original.y + dy, self.original.height, overlay.height);
    }

    pub fn has_moved(&self) -> bool {
        self.current.origin() != self.original.origin()
    }
}

/// Resizing the selected annotation from its corner handle
#[derive(Debug, Clone, PartialEq)]
pub struct ResizeGesture {
    pub annotation_id: AnnotationId,
    pub drag_start: Point,
    pub original: Rect,
    pub current: Rect,
}

impl ResizeGesture {
    pub fn new(annotation_id: AnnotationId, drag_start: Point, original: Rect) -> Self {
        Self { annotation_id, drag_start, original, current: original }
    }

    /// Grow or shrink from the bottom-right corner, never below `min_size`
    pub fn update_position(&mut self, pointer: Point, min_size: f32) {
        let (dx, dy) = pointer.delta_from(&self.drag_start);
        self.current.width = (self.original.width + dx).max(min_size);
        self.current.height = (self.original.height + dy).max(min_size);
    }

    pub fn has_resized(&self) -> bool {
        self.current.width != self.original.width || self.current.height != self.original.height
    }
}

/// The single in-progress pointer gesture
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Gesture {
    #[default]
    Idle,
    Drawing(DrawGesture),
    Dragging(DragGesture),
    Resizing(ResizeGesture),
}

impl Gesture {
    pub fn is_idle(&self) -> bool {
        matches!(self, Gesture::Idle)
    }

    /// Annotation the gesture operates on, if any
    pub fn target(&self) -> Option<&AnnotationId> {
        match self {
            Gesture::Dragging(drag) => Some(&drag.annotation_id),
            Gesture::Resizing(resize) => Some(&resize.annotation_id),
            Gesture::Idle | Gesture::Drawing(_) => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Gesture::Idle => "idle",
            Gesture::Drawing(_) => "drawing",
            Gesture::Dragging(_) => "dragging",
            Gesture::Resizing(_) => "resizing",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draw_normalizes_reverse_drag() {
        let mut draw = DrawGesture::new(ShapeKind::Rectangle, 1, Point::new(50.0, 50.0));
        draw.update_position(Point::new(10.0, 10.0));

        assert_eq!(draw.current, Rect::new(10.0, 10.0, 40.0, 40.0));
        assert!(draw.is_committable(10.0));
    }

    #[test]
    fn test_small_draw_is_not_committable() {
        let mut draw = DrawGesture::new(ShapeKind::Highlight, 1, Point::new(0.0, 0.0));
        draw.update_position(Point::new(5.0, 5.0));
        assert!(!draw.is_committable(10.0));

        draw.update_position(Point::new(10.0, 9.0));
        assert!(!draw.is_committable(10.0));
    }

    #[test]
    fn test_drag_clamps_to_overlay() {
        let overlay = Rect::new(0.0, 0.0, 200.0, 100.0);
        let mut drag =
            DragGesture::new(AnnotationId::generate(), Point::new(5.0, 5.0), Rect::new(0.0, 0.0, 50.0, 50.0));

        drag.update_position(Point::new(-45.0, 5.0), &overlay);
        assert_eq!(drag.current.x, 0.0);
        assert!(!drag.has_moved());

        drag.update_position(Point::new(500.0, 500.0), &overlay);
        assert_eq!(drag.current.origin(), Point::new(150.0, 50.0));
        assert!(drag.has_moved());
    }

    #[test]
    fn test_resize_enforces_minimum() {
        let mut resize =
            ResizeGesture::new(AnnotationId::generate(), Point::new(40.0, 40.0), Rect::new(0.0, 0.0, 40.0, 40.0));

        resize.update_position(Point::new(0.0, 100.0), 20.0);
        assert_eq!(resize.current.width, 20.0);
        assert_eq!(resize.current.height, 100.0);
        assert_eq!(resize.current.origin(), Point::new(0.0, 0.0));
    }

    #[test]
    fn test_gesture_target() {
        let id = AnnotationId::generate();
        let drag = Gesture::Dragging(DragGesture::new(id.clone(), Point::new(0.0, 0.0), Rect::default()));
        assert_eq!(drag.target(), Some(&id));
        assert_eq!(Gesture::Idle.target(), None);
    }
}
