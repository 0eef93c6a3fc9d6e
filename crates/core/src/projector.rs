//! Projection of the annotation model into render primitives
//!
//! Output is derived state: projecting the same store, page and selection
//! always yields the same primitives, in insertion (paint) order.

use crate::annotation::{Annotation, AnnotationId, AnnotationKind, Color, TextBackground};
use crate::gesture::{DrawGesture, ShapeKind};
use crate::geometry::Rect;
use crate::hit_test::resize_handle_rect;
use crate::store::AnnotationStore;
use crate::tool::ToolSettings;
use serde::Serialize;

/// Selection outline color
pub const SELECTION_COLOR: Color = Color::rgb(0x00, 0x66, 0xff);

/// Solid fill
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Fill {
    pub color: Color,
    pub opacity: f32,
}

/// Solid stroke along the bounds
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Stroke {
    pub color: Color,
    pub width: f32,
}

/// Text drawn inside the bounds
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextContent {
    pub text: String,
    pub font_size: f32,
    pub color: Color,
    pub padding: f32,
}

/// Selection decoration attached to the selected primitive
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionIndicator {
    pub outline: Rect,
    pub stroke: Stroke,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resize_handle: Option<Rect>,
}

/// One drawable element
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Primitive {
    /// Source annotation; `None` for the transient draw preview
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<AnnotationId>,
    pub kind: &'static str,
    pub rect: Rect,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill: Option<Fill>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stroke: Option<Stroke>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<TextContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection: Option<SelectionIndicator>,
}

/// Maps annotations to primitives
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderProjector {
    /// Side of the square resize handle
    pub handle_size: f32,

    /// Gap between the annotation bounds and the selection outline
    pub outline_offset: f32,

    pub outline_width: f32,

    /// Fill opacity of the highlight preview
    pub preview_opacity: f32,
}

impl Default for RenderProjector {
    fn default() -> Self {
        Self { handle_size: 10.0, outline_offset: 2.0, outline_width: 2.0, preview_opacity: 0.5 }
    }
}

impl RenderProjector {
    pub fn with_handle_size(handle_size: f32) -> Self {
        Self { handle_size, ..Self::default() }
    }

    /// Primitives for every annotation visible on `page`
    pub fn project(
        &self,
        page: u32,
        store: &AnnotationStore,
        selection: Option<&AnnotationId>,
    ) -> Vec<Primitive> {
        store
            .by_page(page)
            .map(|annotation| {
                let selected = selection == Some(&annotation.id);
                self.project_annotation(annotation, selected)
            })
            .collect()
    }

    pub fn project_annotation(&self, annotation: &Annotation, selected: bool) -> Primitive {
        let (fill, stroke, content) = match &annotation.kind {
            AnnotationKind::Highlight { opacity } => {
                (Some(Fill { color: annotation.color, opacity: *opacity }), None, None)
            }
            AnnotationKind::Rectangle { rect_style, border_width, opacity } => {
                let fill = rect_style
                    .has_fill()
                    .then_some(Fill { color: annotation.color, opacity: *opacity });
                let stroke = rect_style
                    .has_stroke()
                    .then_some(Stroke { color: annotation.color, width: *border_width });
                (fill, stroke, None)
            }
            AnnotationKind::Text { text, font_size, background_color, padding } => {
                let fill = match background_color {
                    TextBackground::Transparent => None,
                    TextBackground::Solid(color) => Some(Fill { color: *color, opacity: 1.0 }),
                };
                let content = TextContent {
                    text: text.clone(),
                    font_size: *font_size,
                    color: annotation.color,
                    padding: *padding,
                };
                (fill, None, Some(content))
            }
        };

        Primitive {
            id: Some(annotation.id.clone()),
            kind: annotation.kind.name(),
            rect: annotation.bounds(),
            fill,
            stroke,
            content,
            selection: selected.then(|| self.selection_indicator(annotation)),
        }
    }

    fn selection_indicator(&self, annotation: &Annotation) -> SelectionIndicator {
        SelectionIndicator {
            outline: annotation.bounds().inflate(self.outline_offset),
            stroke: Stroke { color: SELECTION_COLOR, width: self.outline_width },
            resize_handle: resize_handle_rect(annotation, self.handle_size),
        }
    }

    /// Transient shape for an in-progress draw gesture
    pub fn project_preview(&self, draw: &DrawGesture, settings: &ToolSettings) -> Primitive {
        let (kind, fill, stroke) = match draw.shape {
            ShapeKind::Highlight => (
                "highlight",
                Some(Fill { color: settings.color, opacity: self.preview_opacity }),
                None,
            ),
            ShapeKind::Rectangle => (
                "rectangle",
                None,
                Some(Stroke { color: settings.color, width: settings.border_width }),
            ),
        };

        Primitive {
            id: None,
            kind,
            rect: draw.current,
            fill,
            stroke,
            content: None,
            selection: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{RectStyle, TextLayout, TextProperties};
    use crate::geometry::Point;

    fn store_with(annotations: Vec<Annotation>) -> AnnotationStore {
        let mut store = AnnotationStore::new();
        for annotation in annotations {
            store.add(annotation).unwrap();
        }
        store
    }

    fn rectangle(style: RectStyle) -> Annotation {
        Annotation::rectangle(Some(1), Rect::new(0.0, 0.0, 40.0, 40.0), Color::RED, style, 3.0, 0.4)
    }

    #[test]
    fn test_rectangle_styles() {
        let projector = RenderProjector::default();

        let outline = projector.project_annotation(&rectangle(RectStyle::Outline), false);
        assert_eq!(outline.fill, None);
        assert_eq!(outline.stroke, Some(Stroke { color: Color::RED, width: 3.0 }));

        let fill = projector.project_annotation(&rectangle(RectStyle::Fill), false);
        assert_eq!(fill.fill, Some(Fill { color: Color::RED, opacity: 0.4 }));
        assert_eq!(fill.stroke, None);

        let both = projector.project_annotation(&rectangle(RectStyle::Both), false);
        assert!(both.fill.is_some() && both.stroke.is_some());
    }

    #[test]
    fn test_highlight_is_fill_only() {
        let highlight =
            Annotation::highlight(Some(1), Rect::new(0.0, 0.0, 10.0, 10.0), Color::YELLOW, 0.3);
        let primitive = RenderProjector::default().project_annotation(&highlight, false);

        assert_eq!(primitive.fill, Some(Fill { color: Color::YELLOW, opacity: 0.3 }));
        assert_eq!(primitive.stroke, None);
        assert_eq!(primitive.content, None);
    }

    #[test]
    fn test_text_carries_content_and_background() {
        let text = Annotation::text(
            Some(1),
            Point::new(5.0, 5.0),
            TextProperties {
                text: "hello".to_owned(),
                font_size: 12.0,
                color: Color::BLACK,
                background_color: TextBackground::Transparent,
                padding: 2.0,
            },
            &TextLayout::default(),
        );
        let primitive = RenderProjector::default().project_annotation(&text, true);

        assert_eq!(primitive.fill, None);
        assert_eq!(primitive.content.as_ref().map(|content| content.text.as_str()), Some("hello"));
        let selection = primitive.selection.unwrap();
        assert_eq!(selection.resize_handle, None);
    }

    #[test]
    fn test_projection_is_page_scoped_and_idempotent() {
        let on_one = rectangle(RectStyle::Outline);
        let mut on_two = rectangle(RectStyle::Fill);
        on_two.id = AnnotationId::generate();
        on_two.page = Some(2);
        let store = store_with(vec![on_one.clone(), on_two]);
        let projector = RenderProjector::default();

        let first = projector.project(1, &store, Some(&on_one.id));
        let second = projector.project(1, &store, Some(&on_one.id));

        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].id, Some(on_one.id));
    }

    #[test]
    fn test_selection_indicator_outline_and_handle() {
        let annotation = rectangle(RectStyle::Outline);
        let store = store_with(vec![annotation.clone()]);
        let primitives = RenderProjector::default().project(1, &store, Some(&annotation.id));

        let selection = primitives[0].selection.unwrap();
        assert_eq!(selection.outline, Rect::new(-2.0, -2.0, 44.0, 44.0));
        assert_eq!(selection.resize_handle, Some(Rect::new(35.0, 35.0, 10.0, 10.0)));
    }

    #[test]
    fn test_unknown_selection_draws_no_indicator() {
        let store = store_with(vec![rectangle(RectStyle::Outline)]);
        let primitives =
            RenderProjector::default().project(1, &store, Some(&AnnotationId::generate()));
        assert!(primitives.iter().all(|primitive| primitive.selection.is_none()));
    }

    #[test]
    fn test_preview_styles() {
        let projector = RenderProjector::default();
        let settings = ToolSettings::default();
        let mut draw = DrawGesture::new(ShapeKind::Highlight, 1, Point::new(0.0, 0.0));
        draw.update_position(Point::new(30.0, 20.0));

        let preview = projector.project_preview(&draw, &settings);
        assert_eq!(preview.id, None);
        assert_eq!(preview.fill.map(|fill| fill.opacity), Some(0.5));
        assert_eq!(preview.rect, Rect::new(0.0, 0.0, 30.0, 20.0));
    }
}
