//! Overlay-local geometry and the viewport-to-overlay coordinate mapper
//!
//! All annotation geometry lives in overlay-local pixels: the origin is the
//! top-left corner of the annotation surface, X grows to the right and Y grows
//! downward. Nothing here caches the surface position; callers pass the
//! surface rectangle they measured for the current event.

use serde::{Deserialize, Serialize};

/// A point in overlay-local (or viewport) pixels
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    /// Create a new point
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Delta from `origin` to this point
    pub fn delta_from(&self, origin: &Point) -> (f32, f32) {
        (self.x - origin.x, self.y - origin.y)
    }
}

/// Axis-aligned rectangle, top-left origin
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    /// Create a new rectangle
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Rectangle spanned by two arbitrary corners.
    ///
    /// The result never has negative extent: when `b` lies left of or above
    /// `a`, the origin flips to `b` so the shape keeps tracking the pointer.
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            x: a.x.min(b.x),
            y: a.y.min(b.y),
            width: (b.x - a.x).abs(),
            height: (b.y - a.y).abs(),
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Inclusive containment test (`left <= x <= left + width`)
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x && point.x <= self.right() && point.y >= self.y && point.y <= self.bottom()
    }

    /// Whether both extents reach the given minimums
    pub fn is_at_least(&self, min_width: f32, min_height: f32) -> bool {
        self.width >= min_width && self.height >= min_height
    }

    /// Grow (or shrink, for negative `amount`) the rectangle on every side
    pub fn inflate(&self, amount: f32) -> Self {
        Self {
            x: self.x - amount,
            y: self.y - amount,
            width: (self.width + amount * 2.0).max(0.0),
            height: (self.height + amount * 2.0).max(0.0),
        }
    }

    /// Square of side `size` centred on `center`
    pub fn centered_square(center: Point, size: f32) -> Self {
        let half = size / 2.0;
        Self::new(center.x - half, center.y - half, size, size)
    }
}

/// Convert a pointer position in viewport space to overlay-local coordinates.
///
/// `reference` is the overlay's bounding rectangle in viewport coordinates as
/// measured for this event; scrolling or resizing moves it between events.
pub fn to_local(pointer_x: f32, pointer_y: f32, reference: &Rect) -> Point {
    Point::new(pointer_x - reference.x, pointer_y - reference.y)
}

/// Clamp a shape origin so a box of `extent` stays inside `0..=bound`.
///
/// A shape larger than the bound pins to 0.
pub fn clamp_origin(value: f32, extent: f32, bound: f32) -> f32 {
    value.min(bound - extent).max(0.0)
}
