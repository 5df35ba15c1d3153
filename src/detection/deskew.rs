use crate::detection::preprocessing::{add_border, box_blur, is_ink, otsu_binarize, PAPER};
use crate::models::LineBox;
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use tracing::debug;

/// Per-row ink counts of a binary buffer
pub fn row_profile(binary: &GrayImage) -> Vec<u32> {
    binary
        .rows()
        .map(|row| row.filter(|p| is_ink(p)).count() as u32)
        .collect()
}

/// Sum of squared differences between consecutive projection values.
/// Sharper peaks mean better aligned text lines.
pub fn projection_score(gray: &GrayImage, min_contrast: u8) -> u64 {
    let binary = otsu_binarize(&box_blur(gray), min_contrast);
    row_profile(&binary)
        .windows(2)
        .map(|w| {
            let d = w[1] as i64 - w[0] as i64;
            (d * d) as u64
        })
        .sum()
}

/// Candidate angles ordered 0, -step, +step, -2*step, ...
pub fn search_angles(max_angle: f32, step: f32) -> Vec<f32> {
    let mut angles = vec![0.0];
    if step <= 0.0 {
        return angles;
    }
    let n = (max_angle / step + 1e-3).floor() as i32;
    for i in 1..=n {
        angles.push(-(i as f32) * step);
        angles.push(i as f32 * step);
    }
    angles
}

/// Border wide enough that a rotation of up to `max_angle` degrees loses no content
pub fn rotation_padding(width: u32, height: u32, max_angle: f32) -> u32 {
    let sin = max_angle.abs().to_radians().sin();
    (width.max(height) as f32 * sin / 2.0).ceil() as u32 + 2
}

pub fn rotate(gray: &GrayImage, degrees: f32) -> GrayImage {
    if degrees == 0.0 {
        return gray.clone();
    }
    rotate_about_center(
        gray,
        degrees.to_radians(),
        Interpolation::Bilinear,
        Luma([PAPER]),
    )
}

/// Angle (degrees) that best aligns the text rows of `gray`.
///
/// Scores are compared strictly, and angles are visited from 0 outwards with
/// the negative side first, so equal scores resolve to the smallest absolute
/// angle and then to the negative one.
pub fn estimate_skew(gray: &GrayImage, max_angle: f32, step: f32, search_dim: u32, min_contrast: u8) -> f32 {
    let long_side = gray.width().max(gray.height());
    let search = if long_side > search_dim && search_dim > 0 {
        let scale = search_dim as f32 / long_side as f32;
        let w = ((gray.width() as f32 * scale).round() as u32).max(1);
        let h = ((gray.height() as f32 * scale).round() as u32).max(1);
        imageops::resize(gray, w, h, FilterType::Triangle)
    } else {
        gray.clone()
    };
    let search = add_border(&search, rotation_padding(search.width(), search.height(), max_angle));

    let mut best_angle = 0.0;
    let mut best_score = None;
    for angle in search_angles(max_angle, step) {
        let score = projection_score(&rotate(&search, angle), min_contrast);
        if best_score.is_none_or(|best| score > best) {
            best_score = Some(score);
            best_angle = angle;
        }
    }

    debug!(angle = best_angle, score = best_score.unwrap_or(0), "deskew angle selected");
    best_angle
}

/// Re-render at `angle` on a light padded canvas so no content is cropped
pub fn deskew(gray: &GrayImage, angle: f32, max_angle: f32) -> GrayImage {
    if angle == 0.0 {
        return gray.clone();
    }
    let padded = add_border(gray, rotation_padding(gray.width(), gray.height(), max_angle));
    rotate(&padded, angle)
}

/// Extent of rows and columns holding at least two ink pixels, plus `margin`.
/// `None` for a buffer without ink.
pub fn content_bounds(gray: &GrayImage, margin: u32, min_contrast: u8) -> Option<LineBox> {
    let binary = otsu_binarize(&box_blur(gray), min_contrast);
    let rows = row_profile(&binary);
    let mut cols = vec![0u32; binary.width() as usize];
    for (x, _, p) in binary.enumerate_pixels() {
        if is_ink(p) {
            cols[x as usize] += 1;
        }
    }

    let top = rows.iter().position(|&c| c >= 2)? as u32;
    let bottom = rows.iter().rposition(|&c| c >= 2)? as u32;
    let left = cols.iter().position(|&c| c >= 2)? as u32;
    let right = cols.iter().rposition(|&c| c >= 2)? as u32;

    let x = left.saturating_sub(margin);
    let y = top.saturating_sub(margin);
    let x1 = (right + 1 + margin).min(gray.width());
    let y1 = (bottom + 1 + margin).min(gray.height());
    Some(LineBox::new(x, y, x1 - x, y1 - y))
}

pub fn crop_to_content(gray: &GrayImage, margin: u32, min_contrast: u8) -> GrayImage {
    match content_bounds(gray, margin, min_contrast) {
        Some(b) => imageops::crop_imm(gray, b.x, b.y, b.width, b.height).to_image(),
        None => gray.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    fn strips(width: u32, height: u32, rows: &[i32]) -> GrayImage {
        let mut img = GrayImage::from_pixel(width, height, Luma([PAPER]));
        for &y in rows {
            let mut x = 40;
            while x + 30 < width as i32 - 40 {
                draw_filled_rect_mut(&mut img, Rect::at(x, y).of_size(30, 60), Luma([20]));
                x += 45;
            }
        }
        img
    }

    #[test]
    fn angles_start_at_zero_and_alternate() {
        assert_eq!(search_angles(1.0, 0.5), vec![0.0, -0.5, 0.5, -1.0, 1.0]);
    }

    #[test]
    fn upright_strip_stays_upright() {
        let img = strips(900, 600, &[200, 360]);
        let angle = estimate_skew(&img, 6.0, 0.5, 480, 24);
        assert!(angle.abs() <= 0.5, "angle was {angle}");
    }

    #[test]
    fn rotated_strip_is_corrected() {
        let img = strips(900, 600, &[270]);
        let tilted = rotate(&add_border(&img, 60), 4.0);
        let angle = estimate_skew(&tilted, 6.0, 0.5, 480, 24);
        assert!((angle + 4.0).abs() <= 0.5, "angle was {angle}");
    }

    #[test]
    fn blank_page_has_no_content() {
        let blank = GrayImage::from_pixel(200, 100, Luma([PAPER]));
        assert_eq!(content_bounds(&blank, 10, 24), None);
        assert_eq!(estimate_skew(&blank, 6.0, 0.5, 480, 24), 0.0);
        assert_eq!(crop_to_content(&blank, 10, 24), blank);
    }

    #[test]
    fn rotation_noise_scores_nothing() {
        let blank = add_border(&GrayImage::from_pixel(300, 200, Luma([PAPER])), 20);
        for angle in [-0.5, 0.5, -3.0] {
            assert_eq!(projection_score(&rotate(&blank, angle), 24), 0, "angle {angle}");
        }
    }

    #[test]
    fn crop_keeps_margin_around_ink() {
        let img = strips(900, 600, &[270]);
        let bounds = content_bounds(&img, 10, 24).unwrap();
        // the blur may pull one edge row into the ink
        assert!((258..=261).contains(&bounds.y), "y was {}", bounds.y);
        assert!((78..=84).contains(&bounds.height), "height was {}", bounds.height);
        assert!((28..=31).contains(&bounds.x), "x was {}", bounds.x);
    }
}
