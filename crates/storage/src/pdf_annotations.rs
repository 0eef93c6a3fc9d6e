//! Writing annotations into a PDF as native annotation objects
//!
//! Overlay geometry is in pixels with a top-left origin at the render scale;
//! PDF user space is in points with a bottom-left origin.

use crate::StorageError;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use pdf_engine::{page_media_box, DEFAULT_PAGE_SIZE};
use pdf_markup_core::{Annotation, AnnotationKind, Color, Rect, TextBackground};

/// Outcome of [`annotate_document`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AnnotationWriteSummary {
    pub written: usize,
    /// Annotations without a page or with a page outside the document
    pub skipped: usize,
}

/// Rectangle in PDF user space `[x0, y0, x1, y1]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdfRect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl PdfRect {
    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    fn to_object(self) -> Object {
        Object::Array(vec![
            Object::Real(self.x0),
            Object::Real(self.y0),
            Object::Real(self.x1),
            Object::Real(self.y1),
        ])
    }
}

/// Convert overlay pixels at `scale` to PDF points on a page `page_height` tall
pub fn to_pdf_rect(bounds: Rect, scale: f32, page_height: f32) -> PdfRect {
    let scale = if scale > 0.0 { scale } else { 1.0 };
    PdfRect {
        x0: bounds.x / scale,
        y0: page_height - bounds.bottom() / scale,
        x1: bounds.right() / scale,
        y1: page_height - bounds.y / scale,
    }
}

/// Add every page-scoped annotation to `doc`
pub fn annotate_document(
    doc: &mut Document,
    annotations: &[Annotation],
    scale: f32,
) -> Result<AnnotationWriteSummary, StorageError> {
    let pages = doc.get_pages();
    let mut summary = AnnotationWriteSummary::default();

    for annotation in annotations {
        let Some(page_id) = annotation.page.and_then(|page| pages.get(&page).copied()) else {
            tracing::debug!(id = %annotation.id, page = ?annotation.page, "annotation skipped on export");
            summary.skipped += 1;
            continue;
        };

        let page_height = page_media_box(doc, page_id).unwrap_or(DEFAULT_PAGE_SIZE).height;
        let rect = to_pdf_rect(annotation.bounds(), scale, page_height);
        let annot = annotation_dictionary(doc, annotation, rect, scale);
        let annot_id = doc.add_object(annot);
        append_to_page(doc, page_id, annot_id)?;
        summary.written += 1;
    }

    Ok(summary)
}

fn append_to_page(doc: &mut Document, page_id: ObjectId, annot_id: ObjectId) -> Result<(), StorageError> {
    let existing = doc.get_dictionary(page_id)?.get(b"Annots").ok().cloned();

    match existing {
        Some(Object::Reference(array_id)) => {
            doc.get_object_mut(array_id)?.as_array_mut()?.push(Object::Reference(annot_id));
        }
        Some(Object::Array(mut items)) => {
            items.push(Object::Reference(annot_id));
            doc.get_dictionary_mut(page_id)?.set("Annots", items);
        }
        _ => {
            doc.get_dictionary_mut(page_id)?.set("Annots", vec![Object::Reference(annot_id)]);
        }
    }
    Ok(())
}

fn color_array(color: Color) -> Object {
    let (r, g, b) = color.to_normalized();
    Object::Array(vec![Object::Real(r), Object::Real(g), Object::Real(b)])
}

fn color_operands(color: Color) -> String {
    let (r, g, b) = color.to_normalized();
    format!("{r} {g} {b}")
}

/// Form XObject drawn in place of the annotation
fn appearance(doc: &mut Document, rect: PdfRect, content: String, resources: Dictionary) -> ObjectId {
    let stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => rect.to_object(),
            "Resources" => resources,
        },
        content.into_bytes(),
    );
    doc.add_object(stream)
}

fn opacity_resources(opacity: f32) -> Dictionary {
    dictionary! {
        "ExtGState" => dictionary! {
            "GS0" => dictionary! { "Type" => "ExtGState", "ca" => Object::Real(opacity) },
        },
    }
}

fn annotation_dictionary(doc: &mut Document, annotation: &Annotation, rect: PdfRect, scale: f32) -> Dictionary {
    let color = annotation.color;
    let mut annot = dictionary! {
        "Type" => "Annot",
        "Rect" => rect.to_object(),
        "NM" => Object::string_literal(annotation.id.to_string()),
        "F" => Object::Integer(4),
    };

    match &annotation.kind {
        AnnotationKind::Highlight { opacity } => {
            let content = format!(
                "q /GS0 gs {} rg {} {} {} {} re f Q",
                color_operands(color),
                rect.x0,
                rect.y0,
                rect.width(),
                rect.height()
            );
            let ap = appearance(doc, rect, content, opacity_resources(*opacity));
            annot.set("Subtype", "Highlight");
            annot.set(
                "QuadPoints",
                vec![
                    Object::Real(rect.x0),
                    Object::Real(rect.y1),
                    Object::Real(rect.x1),
                    Object::Real(rect.y1),
                    Object::Real(rect.x0),
                    Object::Real(rect.y0),
                    Object::Real(rect.x1),
                    Object::Real(rect.y0),
                ],
            );
            annot.set("C", color_array(color));
            annot.set("CA", Object::Real(*opacity));
            annot.set("AP", dictionary! { "N" => ap });
        }
        AnnotationKind::Rectangle { rect_style, border_width, opacity } => {
            let width = border_width / scale.max(f32::EPSILON);
            let mut content = String::from("q ");
            if rect_style.has_fill() {
                content.push_str(&format!(
                    "/GS0 gs {} rg {} {} {} {} re f ",
                    color_operands(color),
                    rect.x0,
                    rect.y0,
                    rect.width(),
                    rect.height()
                ));
            }
            if rect_style.has_stroke() && width > 0.0 {
                let inset = width / 2.0;
                content.push_str(&format!(
                    "{} RG {} w {} {} {} {} re S ",
                    color_operands(color),
                    width,
                    rect.x0 + inset,
                    rect.y0 + inset,
                    (rect.width() - width).max(0.0),
                    (rect.height() - width).max(0.0)
                ));
            }
            content.push('Q');

            let ap = appearance(doc, rect, content, opacity_resources(*opacity));
            annot.set("Subtype", "Square");
            annot.set("C", color_array(color));
            if rect_style.has_fill() {
                annot.set("IC", color_array(color));
            }
            let stroke_width = if rect_style.has_stroke() { width } else { 0.0 };
            annot.set("BS", dictionary! { "W" => Object::Real(stroke_width), "S" => "S" });
            annot.set("AP", dictionary! { "N" => ap });
        }
        AnnotationKind::Text { text, font_size, background_color, padding } => {
            let size = font_size / scale.max(f32::EPSILON);
            let inset = padding / scale.max(f32::EPSILON);
            let mut content = String::from("q ");
            if let TextBackground::Solid(background) = background_color {
                content.push_str(&format!(
                    "{} rg {} {} {} {} re f ",
                    color_operands(*background),
                    rect.x0,
                    rect.y0,
                    rect.width(),
                    rect.height()
                ));
            }
            content.push_str(&format!("BT /Helv {size} Tf {} rg {} TL ", color_operands(color), size * 1.2));
            content.push_str(&format!("{} {} Td ", rect.x0 + inset, rect.y1 - inset - size));
            for (index, line) in text.lines().enumerate() {
                if index > 0 {
                    content.push_str("T* ");
                }
                content.push_str(&format!("({}) Tj ", escape_literal(line)));
            }
            content.push_str("ET Q");

            let resources = dictionary! {
                "Font" => dictionary! {
                    "Helv" => dictionary! {
                        "Type" => "Font",
                        "Subtype" => "Type1",
                        "BaseFont" => "Helvetica",
                    },
                },
            };
            let ap = appearance(doc, rect, content, resources);
            annot.set("Subtype", "FreeText");
            annot.set("Contents", Object::String(text.as_bytes().to_vec(), StringFormat::Literal));
            annot.set(
                "DA",
                Object::string_literal(format!("/Helv {size} Tf {} rg", color_operands(color))),
            );
            if let TextBackground::Solid(background) = background_color {
                annot.set("C", color_array(*background));
            }
            annot.set("AP", dictionary! { "N" => ap });
        }
    }

    annot
}

/// Escape a string for use inside a PDF literal `( ... )`
fn escape_literal(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '(' | ')' | '\\' => {
                escaped.push('\\');
                escaped.push(ch);
            }
            ch if ch.is_ascii() && !ch.is_ascii_control() => escaped.push(ch),
            _ => escaped.push('?'),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdf_engine::blank_document;
    use pdf_markup_core::{PageSize, RectStyle, TextLayout, TextProperties};
    use pdf_markup_core::geometry::Point;

    fn two_page_document() -> Document {
        let bytes = blank_document(&[
            PageSize { width: 600.0, height: 800.0 },
            PageSize { width: 600.0, height: 800.0 },
        ])
        .expect("fixture should serialize");
        Document::load_mem(&bytes).expect("fixture should parse")
    }

    fn annots_of(doc: &Document, page: u32) -> Vec<Dictionary> {
        let page_id = doc.get_pages()[&page];
        let page = doc.get_dictionary(page_id).expect("page dictionary");
        let Ok(array) = page.get(b"Annots").and_then(Object::as_array) else {
            return Vec::new();
        };
        array
            .iter()
            .map(|item| {
                let id = item.as_reference().expect("annotation reference");
                doc.get_dictionary(id).expect("annotation dictionary").clone()
            })
            .collect()
    }

    #[test]
    fn converts_pixels_to_points_with_flipped_origin() {
        let rect = to_pdf_rect(Rect::new(15.0, 30.0, 150.0, 60.0), 1.5, 800.0);
        assert_eq!(rect, PdfRect { x0: 10.0, y0: 740.0, x1: 110.0, y1: 780.0 });
    }

    #[test]
    fn writes_one_object_per_page_scoped_annotation() {
        let mut doc = two_page_document();
        let annotations = vec![
            Annotation::highlight(Some(1), Rect::new(0.0, 0.0, 30.0, 30.0), Color::YELLOW, 0.3),
            Annotation::rectangle(Some(2), Rect::new(0.0, 0.0, 30.0, 30.0), Color::RED, RectStyle::Both, 2.0, 0.5),
            Annotation::highlight(None, Rect::new(0.0, 0.0, 30.0, 30.0), Color::YELLOW, 0.3),
            Annotation::highlight(Some(9), Rect::new(0.0, 0.0, 30.0, 30.0), Color::YELLOW, 0.3),
        ];

        let summary = annotate_document(&mut doc, &annotations, 1.5).expect("annotate should succeed");
        assert_eq!(summary, AnnotationWriteSummary { written: 2, skipped: 2 });

        let first = annots_of(&doc, 1);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].get(b"Subtype").and_then(Object::as_name).ok(), Some(&b"Highlight"[..]));

        let second = annots_of(&doc, 2);
        assert_eq!(second[0].get(b"Subtype").and_then(Object::as_name).ok(), Some(&b"Square"[..]));
        assert!(second[0].has(b"IC"));
    }

    #[test]
    fn highlight_uses_media_box_inherited_from_page_tree() {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! { "Type" => "Page", "Parent" => pages_id });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Count" => 1,
                "Kids" => vec![Object::Reference(page_id)],
                "MediaBox" => vec![Object::Integer(0), Object::Integer(0), Object::Integer(595), Object::Integer(842)],
            }),
        );
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);

        let highlight = Annotation::highlight(Some(1), Rect::new(10.0, 0.0, 100.0, 20.0), Color::YELLOW, 0.3);
        annotate_document(&mut doc, &[highlight], 1.0).expect("annotate should succeed");

        let written = annots_of(&doc, 1);
        let rect = written[0].get(b"Rect").and_then(Object::as_array).expect("annotation rect");
        let y0 = rect[1].as_float().expect("y0 should be numeric");
        let y1 = rect[3].as_float().expect("y1 should be numeric");
        assert_eq!((y0, y1), (822.0, 842.0));
    }

    #[test]
    fn text_becomes_free_text_with_contents() {
        let mut doc = two_page_document();
        let text = Annotation::text(
            Some(1),
            Point::new(20.0, 20.0),
            TextProperties {
                text: "Check (this)".to_owned(),
                font_size: 16.0,
                color: Color::BLACK,
                background_color: TextBackground::Transparent,
                padding: 4.0,
            },
            &TextLayout::default(),
        );

        annotate_document(&mut doc, &[text], 1.5).expect("annotate should succeed");

        let annots = annots_of(&doc, 1);
        assert_eq!(annots[0].get(b"Subtype").and_then(Object::as_name).ok(), Some(&b"FreeText"[..]));
        let contents = annots[0].get(b"Contents").and_then(Object::as_str).expect("contents");
        assert_eq!(contents, b"Check (this)");
    }

    #[test]
    fn escapes_literal_delimiters() {
        assert_eq!(escape_literal(r"a(b)\c"), r"a\(b\)\\c");
        assert_eq!(escape_literal("née"), "n?e");
    }
}
