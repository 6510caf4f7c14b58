//! Region overlay rendering for annotated output images

use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_line_segment_mut;

use crate::vision::RecognitionRegion;

/// Outline color for recognized regions
const REGION_COLOR: Rgb<u8> = Rgb([0, 200, 0]);
/// Outline thickness in pixels
const THICKNESS: i32 = 2;

/// Draw each region's polygon outline on a copy of the image
pub fn draw_regions(image: &DynamicImage, regions: &[RecognitionRegion]) -> RgbImage {
    let mut output = image.to_rgb8();
    for region in regions {
        draw_polygon(&mut output, &region.polygon, REGION_COLOR, THICKNESS);
    }
    output
}

fn draw_polygon(img: &mut RgbImage, polygon: &[(f32, f32)], color: Rgb<u8>, thickness: i32) {
    if polygon.len() < 2 {
        return;
    }

    for (i, &p1) in polygon.iter().enumerate() {
        let p2 = polygon[(i + 1) % polygon.len()];
        for t in 0..thickness {
            let offset = (t - thickness / 2) as f32;
            draw_line_segment_mut(img, (p1.0 + offset, p1.1), (p2.0 + offset, p2.1), color);
            draw_line_segment_mut(img, (p1.0, p1.1 + offset), (p2.0, p2.1 + offset), color);
        }
    }
}
