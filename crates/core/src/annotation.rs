//! Annotation data model
//!
//! An annotation is the only persisted entity. Geometry is stored in
//! overlay-local pixels; text annotations derive their extent from their
//! content instead of user input.

use crate::error::{EditorError, ValidationError};
use crate::geometry::{Point, Rect};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Unique identifier for an annotation
///
/// Opaque: equality is the only operation that matters. New ids are UUID v4
/// strings; ids read back from disk may be any non-empty string or an
/// integer (millisecond timestamps), which are kept in their decimal form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnnotationId(Arc<str>);

impl AnnotationId {
    pub fn generate() -> Self {
        Self(Arc::from(uuid::Uuid::new_v4().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AnnotationId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::Malformed("annotation id is empty".to_owned()));
        }
        Ok(Self(Arc::from(trimmed)))
    }
}

impl From<u64> for AnnotationId {
    fn from(value: u64) -> Self {
        Self(Arc::from(value.to_string()))
    }
}

impl Serialize for AnnotationId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for AnnotationId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(AnnotationIdVisitor)
    }
}

struct AnnotationIdVisitor;

impl Visitor<'_> for AnnotationIdVisitor {
    type Value = AnnotationId;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a non-empty string or an integer annotation id")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
        value.parse().map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
        Ok(AnnotationId::from(value))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
        Ok(AnnotationId(Arc::from(value.to_string())))
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<Self::Value, E> {
        if value.is_finite() && value.fract() == 0.0 {
            Ok(AnnotationId(Arc::from(format!("{value:.0}"))))
        } else {
            Err(E::invalid_value(de::Unexpected::Float(value), &self))
        }
    }
}

/// Opaque RGB color, serialized as `#rrggbb`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    /// Create an opaque color
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Convert to normalized RGB values (0.0 to 1.0)
    pub fn to_normalized(&self) -> (f32, f32, f32) {
        (self.r as f32 / 255.0, self.g as f32 / 255.0, self.b as f32 / 255.0)
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl Color {
    pub const RED: Color = Color::rgb(255, 0, 0);
    pub const YELLOW: Color = Color::rgb(255, 255, 0);
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
}

impl FromStr for Color {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let hex = value.trim().strip_prefix('#').unwrap_or(value.trim());
        let malformed = || ValidationError::Malformed(format!("invalid color `{value}`"));

        if hex.len() != 6 || !hex.is_ascii() {
            return Err(malformed());
        }

        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16).map_err(|_| malformed())
        };

        Ok(Self { r: channel(0..2)?, g: channel(2..4)?, b: channel(4..6)? })
    }
}

impl TryFrom<String> for Color {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_hex()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// How a rectangle annotation is painted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RectStyle {
    #[default]
    Outline,
    Fill,
    Both,
}

impl RectStyle {
    pub fn has_fill(self) -> bool {
        matches!(self, RectStyle::Fill | RectStyle::Both)
    }

    pub fn has_stroke(self) -> bool {
        matches!(self, RectStyle::Outline | RectStyle::Both)
    }
}

impl FromStr for RectStyle {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "outline" => Ok(RectStyle::Outline),
            "fill" => Ok(RectStyle::Fill),
            "both" => Ok(RectStyle::Both),
            other => Err(ValidationError::Malformed(format!("unknown rectangle style `{other}`"))),
        }
    }
}

/// Background of a text annotation: a color or the `transparent` sentinel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TextBackground {
    Transparent,
    Solid(Color),
}

impl TryFrom<String> for TextBackground {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.trim().eq_ignore_ascii_case("transparent") {
            Ok(TextBackground::Transparent)
        } else {
            value.parse().map(TextBackground::Solid)
        }
    }
}

impl From<TextBackground> for String {
    fn from(background: TextBackground) -> Self {
        match background {
            TextBackground::Transparent => "transparent".to_owned(),
            TextBackground::Solid(color) => color.to_hex(),
        }
    }
}

/// Variant-specific fields, tagged by `type` on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AnnotationKind {
    #[serde(rename = "highlight")]
    Highlight { opacity: f32 },

    #[serde(rename = "rectangle", alias = "rect", rename_all = "camelCase")]
    Rectangle {
        #[serde(default)]
        rect_style: RectStyle,
        #[serde(default = "default_border_width")]
        border_width: f32,
        opacity: f32,
    },

    #[serde(rename = "text", rename_all = "camelCase")]
    Text { text: String, font_size: f32, background_color: TextBackground, padding: f32 },
}

fn default_border_width() -> f32 {
    2.0
}

impl AnnotationKind {
    /// Wire name of the variant
    pub fn name(&self) -> &'static str {
        match self {
            AnnotationKind::Highlight { .. } => "highlight",
            AnnotationKind::Rectangle { .. } => "rectangle",
            AnnotationKind::Text { .. } => "text",
        }
    }
}

/// Properties entered through the text dialog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextProperties {
    pub text: String,
    pub font_size: f32,
    pub color: Color,
    pub background_color: TextBackground,
    pub padding: f32,
}

/// Estimates the intrinsic box of text content.
///
/// Glyph advance and line height are fractions of the font size; lines wider
/// than `max_width` wrap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextLayout {
    pub max_width: f32,
    pub char_width: f32,
    pub line_height: f32,
}

impl Default for TextLayout {
    fn default() -> Self {
        Self { max_width: 300.0, char_width: 0.6, line_height: 1.2 }
    }
}

impl TextLayout {
    /// Returns `(width, height)` including padding on both sides
    pub fn measure(&self, text: &str, font_size: f32, padding: f32) -> (f32, f32) {
        let max_width = if self.max_width > 0.0 { self.max_width } else { f32::INFINITY };
        let advance = font_size * self.char_width;

        let mut widest: f32 = 0.0;
        let mut lines = 0usize;
        for line in text.lines() {
            let width = line.chars().count() as f32 * advance;
            lines += if width > max_width { (width / max_width).ceil() as usize } else { 1 };
            widest = widest.max(width.min(max_width));
        }
        let lines = lines.max(1);

        (
            widest + padding * 2.0,
            lines as f32 * font_size * self.line_height + padding * 2.0,
        )
    }
}

/// A single annotation record
///
/// `page` is absent for annotations that predate page scoping; those are
/// visible on every page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    pub id: AnnotationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub color: Color,
    #[serde(flatten)]
    pub kind: AnnotationKind,
}

impl Annotation {
    /// Create a highlight with a generated ID
    pub fn highlight(page: Option<u32>, bounds: Rect, color: Color, opacity: f32) -> Self {
        Self::with_kind(page, bounds, color, AnnotationKind::Highlight { opacity })
    }

    /// Create a rectangle with a generated ID
    pub fn rectangle(
        page: Option<u32>,
        bounds: Rect,
        color: Color,
        rect_style: RectStyle,
        border_width: f32,
        opacity: f32,
    ) -> Self {
        Self::with_kind(
            page,
            bounds,
            color,
            AnnotationKind::Rectangle { rect_style, border_width, opacity },
        )
    }

    /// Create a text annotation at `origin`, sized from its content
    pub fn text(
        page: Option<u32>,
        origin: Point,
        properties: TextProperties,
        layout: &TextLayout,
    ) -> Self {
        let (width, height) =
            layout.measure(&properties.text, properties.font_size, properties.padding);
        Self::with_kind(
            page,
            Rect::new(origin.x, origin.y, width, height),
            properties.color,
            AnnotationKind::Text {
                text: properties.text,
                font_size: properties.font_size,
                background_color: properties.background_color,
                padding: properties.padding,
            },
        )
    }

    fn with_kind(page: Option<u32>, bounds: Rect, color: Color, kind: AnnotationKind) -> Self {
        Self {
            id: AnnotationId::generate(),
            page,
            x: bounds.x,
            y: bounds.y,
            width: bounds.width,
            height: bounds.height,
            color,
            kind,
        }
    }

    /// Parse one annotation from untyped JSON and validate it
    pub fn from_json_value(value: serde_json::Value) -> Result<Self, EditorError> {
        let annotation: Annotation = serde_json::from_value(value)
            .map_err(|err| ValidationError::Malformed(err.to_string()))?;
        annotation.validate()?;
        Ok(annotation)
    }

    /// Parse a JSON array of annotations, validating each entry
    pub fn list_from_json(bytes: &[u8]) -> Result<Vec<Self>, EditorError> {
        let values: Vec<serde_json::Value> = serde_json::from_slice(bytes)
            .map_err(|err| ValidationError::Malformed(err.to_string()))?;
        values.into_iter().map(Self::from_json_value).collect()
    }

    /// Bounding box in overlay-local coordinates
    pub fn bounds(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }

    /// Whether the annotation belongs on `page`
    pub fn is_on_page(&self, page: u32) -> bool {
        self.page.map_or(true, |own| own == page)
    }

    /// Text extent is content-driven, so only shapes get a resize handle
    pub fn is_resizable(&self) -> bool {
        !self.is_text()
    }

    pub fn is_text(&self) -> bool {
        matches!(self.kind, AnnotationKind::Text { .. })
    }

    /// Opacity for variants that carry one
    pub fn opacity(&self) -> Option<f32> {
        match self.kind {
            AnnotationKind::Highlight { opacity } | AnnotationKind::Rectangle { opacity, .. } => {
                Some(opacity)
            }
            AnnotationKind::Text { .. } => None,
        }
    }

    /// Current text properties, for pre-filling the edit dialog
    pub fn text_properties(&self) -> Option<TextProperties> {
        match &self.kind {
            AnnotationKind::Text { text, font_size, background_color, padding } => {
                Some(TextProperties {
                    text: text.clone(),
                    font_size: *font_size,
                    color: self.color,
                    background_color: *background_color,
                    padding: *padding,
                })
            }
            _ => None,
        }
    }

    /// Check the record invariants
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.page == Some(0) {
            return Err(ValidationError::ZeroPage);
        }

        for (field, value) in [("x", self.x), ("y", self.y)] {
            finite(field, value)?;
        }
        for (field, value) in [("width", self.width), ("height", self.height)] {
            non_negative(field, value)?;
        }

        match &self.kind {
            AnnotationKind::Highlight { opacity } => unit_interval(*opacity),
            AnnotationKind::Rectangle { border_width, opacity, .. } => {
                non_negative("borderWidth", *border_width)?;
                unit_interval(*opacity)
            }
            AnnotationKind::Text { text, font_size, padding, .. } => {
                if text.trim().is_empty() {
                    return Err(ValidationError::EmptyText);
                }
                finite("fontSize", *font_size)?;
                if *font_size <= 0.0 {
                    return Err(ValidationError::FontSize(*font_size));
                }
                non_negative("padding", *padding)
            }
        }
    }
}

fn finite(field: &'static str, value: f32) -> Result<(), ValidationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ValidationError::NonFinite { field })
    }
}

fn non_negative(field: &'static str, value: f32) -> Result<(), ValidationError> {
    finite(field, value)?;
    if value < 0.0 {
        return Err(ValidationError::Negative { field, value });
    }
    Ok(())
}

fn unit_interval(opacity: f32) -> Result<(), ValidationError> {
    if opacity.is_finite() && (0.0..=1.0).contains(&opacity) {
        Ok(())
    } else {
        Err(ValidationError::OpacityOutOfRange(opacity))
    }
}

/// Partial update merged into an existing annotation
///
/// `page` and `id` are not patchable. Width and height of text annotations
/// are recomputed from content and cannot be set directly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnnotationPatch {
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub width: Option<f32>,
    pub height: Option<f32>,
    pub color: Option<Color>,
    pub opacity: Option<f32>,
    pub rect_style: Option<RectStyle>,
    pub border_width: Option<f32>,
    pub text: Option<String>,
    pub font_size: Option<f32>,
    pub background_color: Option<TextBackground>,
    pub padding: Option<f32>,
}

impl AnnotationPatch {
    pub fn position(x: f32, y: f32) -> Self {
        Self { x: Some(x), y: Some(y), ..Self::default() }
    }

    pub fn size(width: f32, height: f32) -> Self {
        Self { width: Some(width), height: Some(height), ..Self::default() }
    }

    /// Patch carrying every field of a text dialog result
    pub fn from_text_properties(properties: TextProperties) -> Self {
        Self {
            text: Some(properties.text),
            font_size: Some(properties.font_size),
            color: Some(properties.color),
            background_color: Some(properties.background_color),
            padding: Some(properties.padding),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Produce the merged record; `base` is left untouched on error
    pub fn apply(
        &self,
        base: &Annotation,
        layout: &TextLayout,
    ) -> Result<Annotation, ValidationError> {
        let mut merged = base.clone();
        let kind_name = base.kind.name();
        let mismatch = |field: &'static str| ValidationError::FieldMismatch { field, kind: kind_name };

        if let Some(x) = self.x {
            merged.x = x;
        }
        if let Some(y) = self.y {
            merged.y = y;
        }
        if let Some(color) = self.color {
            merged.color = color;
        }

        match &mut merged.kind {
            AnnotationKind::Highlight { opacity } => {
                reject_text_fields(self, &mismatch)?;
                if self.rect_style.is_some() {
                    return Err(mismatch("rectStyle"));
                }
                if self.border_width.is_some() {
                    return Err(mismatch("borderWidth"));
                }
                if let Some(value) = self.opacity {
                    *opacity = value;
                }
                self.apply_size(&mut merged.width, &mut merged.height);
            }
            AnnotationKind::Rectangle { rect_style, border_width, opacity } => {
                reject_text_fields(self, &mismatch)?;
                if let Some(value) = self.rect_style {
                    *rect_style = value;
                }
                if let Some(value) = self.border_width {
                    *border_width = value;
                }
                if let Some(value) = self.opacity {
                    *opacity = value;
                }
                self.apply_size(&mut merged.width, &mut merged.height);
            }
            AnnotationKind::Text { text, font_size, background_color, padding } => {
                if self.width.is_some() {
                    return Err(mismatch("width"));
                }
                if self.height.is_some() {
                    return Err(mismatch("height"));
                }
                if self.opacity.is_some() {
                    return Err(mismatch("opacity"));
                }
                if self.rect_style.is_some() {
                    return Err(mismatch("rectStyle"));
                }
                if self.border_width.is_some() {
                    return Err(mismatch("borderWidth"));
                }
                if let Some(value) = &self.text {
                    *text = value.clone();
                }
                if let Some(value) = self.font_size {
                    *font_size = value;
                }
                if let Some(value) = self.background_color {
                    *background_color = value;
                }
                if let Some(value) = self.padding {
                    *padding = value;
                }
                let (width, height) = layout.measure(text, *font_size, *padding);
                merged.width = width;
                merged.height = height;
            }
        }

        merged.validate()?;
        Ok(merged)
    }

    fn apply_size(&self, width: &mut f32, height: &mut f32) {
        if let Some(value) = self.width {
            *width = value;
        }
        if let Some(value) = self.height {
            *height = value;
        }
    }
}

fn reject_text_fields(
    patch: &AnnotationPatch,
    mismatch: &impl Fn(&'static str) -> ValidationError,
) -> Result<(), ValidationError> {
    if patch.text.is_some() {
        return Err(mismatch("text"));
    }
    if patch.font_size.is_some() {
        return Err(mismatch("fontSize"));
    }
    if patch.background_color.is_some() {
        return Err(mismatch("backgroundColor"));
    }
    if patch.padding.is_some() {
        return Err(mismatch("padding"));
    }
    Ok(())
}
