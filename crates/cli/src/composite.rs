//! Painting projected primitives onto a page raster

use image::Rgba;
use pdf_engine::RgbaImage;
use pdf_markup_core::{Color, Primitive, Rect};

/// Paint fills, then strokes, of every primitive in order
pub fn composite(image: &mut RgbaImage, primitives: &[Primitive]) {
    for primitive in primitives {
        if let Some(fill) = primitive.fill {
            blend_rect(image, primitive.rect, fill.color, fill.opacity);
        }
        if let Some(stroke) = primitive.stroke {
            stroke_rect(image, primitive.rect, stroke.color, stroke.width);
        }
    }
}

fn blend_rect(image: &mut RgbaImage, rect: Rect, color: Color, opacity: f32) {
    let Some((x0, y0, x1, y1)) = pixel_bounds(image, rect) else {
        return;
    };
    let alpha = opacity.clamp(0.0, 1.0);

    for y in y0..y1 {
        for x in x0..x1 {
            let pixel = image.get_pixel_mut(x, y);
            *pixel = blend(*pixel, color, alpha);
        }
    }
}

fn stroke_rect(image: &mut RgbaImage, rect: Rect, color: Color, width: f32) {
    if width <= 0.0 {
        return;
    }
    let edges = [
        Rect::new(rect.x, rect.y, rect.width, width),
        Rect::new(rect.x, rect.bottom() - width, rect.width, width),
        Rect::new(rect.x, rect.y, width, rect.height),
        Rect::new(rect.right() - width, rect.y, width, rect.height),
    ];
    for edge in edges {
        blend_rect(image, edge, color, 1.0);
    }
}

/// Pixel range covered by `rect`, clipped to the image
fn pixel_bounds(image: &RgbaImage, rect: Rect) -> Option<(u32, u32, u32, u32)> {
    let clip = |value: f32, max: u32| value.round().clamp(0.0, max as f32) as u32;
    let x0 = clip(rect.x, image.width());
    let y0 = clip(rect.y, image.height());
    let x1 = clip(rect.right(), image.width());
    let y1 = clip(rect.bottom(), image.height());

    (x0 < x1 && y0 < y1).then_some((x0, y0, x1, y1))
}

fn blend(base: Rgba<u8>, color: Color, alpha: f32) -> Rgba<u8> {
    let mix = |under: u8, over: u8| (over as f32 * alpha + under as f32 * (1.0 - alpha)).round() as u8;
    Rgba([mix(base[0], color.r), mix(base[1], color.g), mix(base[2], color.b), base[3]])
}
