use image::{DynamicImage, GrayImage, Luma};
use imageproc::contrast::otsu_level;
use imageproc::distance_transform::Norm;
use imageproc::filter::box_filter;
use imageproc::morphology;

/// Value written for ink in binary buffers
pub const INK: u8 = 0;
/// Value written for background in binary buffers
pub const PAPER: u8 = 255;

pub fn is_ink(p: &Luma<u8>) -> bool {
    p[0] < 128
}

/// Convert image to grayscale with `0.299R + 0.587G + 0.114B` luma weights
pub fn to_grayscale(img: &DynamicImage) -> GrayImage {
    let rgb = img.to_rgb8();
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        let luma = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
        Luma([luma.round().clamp(0.0, 255.0) as u8])
    })
}

/// 3x3 mean filter to suppress sensor noise before thresholding
pub fn box_blur(img: &GrayImage) -> GrayImage {
    box_filter(img, 1, 1)
}

pub fn histogram(img: &GrayImage) -> [u64; 256] {
    let mut hist = [0u64; 256];
    for p in img.pixels() {
        hist[p[0] as usize] += 1;
    }
    hist
}

/// Gray levels found at the given lower/upper population percentiles
pub fn percentile_levels(img: &GrayImage, low_pct: f32, high_pct: f32) -> (u8, u8) {
    let hist = histogram(img);
    let total: u64 = hist.iter().sum();
    let low_target = (total as f64 * low_pct as f64 / 100.0).ceil() as u64;
    let high_target = (total as f64 * high_pct as f64 / 100.0).ceil() as u64;

    let mut low = None;
    let mut high = 255u8;
    let mut cumulative = 0u64;
    for (level, count) in hist.iter().enumerate() {
        cumulative += count;
        if low.is_none() && cumulative >= low_target.max(1) {
            low = Some(level as u8);
        }
        if cumulative >= high_target.max(1) {
            high = level as u8;
            break;
        }
    }
    (low.unwrap_or(0), high)
}

/// Linearly rescale so the `[low_pct, high_pct]` population range spans 0..=255.
/// Returns an unchanged copy if that range is degenerate.
pub fn contrast_stretch(img: &GrayImage, low_pct: f32, high_pct: f32) -> GrayImage {
    let (low, high) = percentile_levels(img, low_pct, high_pct);
    if high <= low {
        return img.clone();
    }
    let (low, span) = (low as f32, (high - low) as f32);
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let v = (img.get_pixel(x, y)[0] as f32 - low) * 255.0 / span;
        Luma([v.round().clamp(0.0, 255.0) as u8])
    })
}

/// Otsu level of the image, or `None` when its darkest and lightest levels
/// are less than `min_contrast` apart. Interpolation noise on a blank page
/// must not be split into ink and paper.
pub fn otsu_threshold(img: &GrayImage, min_contrast: u8) -> Option<u8> {
    let (mut lo, mut hi) = (u8::MAX, u8::MIN);
    for p in img.pixels() {
        lo = lo.min(p[0]);
        hi = hi.max(p[0]);
    }
    if hi <= lo || hi - lo < min_contrast.max(1) {
        return None;
    }
    Some(otsu_level(img))
}

/// Pixels at or below `level` become ink, everything else paper
pub fn binarize(img: &GrayImage, level: u8) -> GrayImage {
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        if img.get_pixel(x, y)[0] <= level {
            Luma([INK])
        } else {
            Luma([PAPER])
        }
    })
}

/// Global Otsu binarization. A flat image has no ink.
pub fn otsu_binarize(img: &GrayImage, min_contrast: u8) -> GrayImage {
    match otsu_threshold(img, min_contrast) {
        Some(level) => binarize(img, level),
        None => GrayImage::from_pixel(img.width(), img.height(), Luma([PAPER])),
    }
}

/// Summed-area table with a zero first row and column, `(w + 1) * (h + 1)` entries
pub fn integral_image(img: &GrayImage) -> Vec<u64> {
    let (w, h) = (img.width() as usize, img.height() as usize);
    let stride = w + 1;
    let mut table = vec![0u64; stride * (h + 1)];
    for y in 0..h {
        let mut row_sum = 0u64;
        for x in 0..w {
            row_sum += img.get_pixel(x as u32, y as u32)[0] as u64;
            table[(y + 1) * stride + x + 1] = table[y * stride + x + 1] + row_sum;
        }
    }
    table
}

/// Binarize each pixel against the mean of a `window`-sized neighbourhood minus `offset`
pub fn adaptive_threshold(img: &GrayImage, window: u32, offset: i32) -> GrayImage {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return img.clone();
    }
    let table = integral_image(img);
    let stride = w as usize + 1;
    let radius = (window.max(3) / 2) as i64;

    GrayImage::from_fn(w, h, |x, y| {
        let x0 = (x as i64 - radius).max(0) as usize;
        let y0 = (y as i64 - radius).max(0) as usize;
        let x1 = (x as i64 + radius + 1).min(w as i64) as usize;
        let y1 = (y as i64 + radius + 1).min(h as i64) as usize;
        let sum = table[y1 * stride + x1] + table[y0 * stride + x0]
            - table[y0 * stride + x1]
            - table[y1 * stride + x0];
        let area = ((x1 - x0) * (y1 - y0)) as i64;
        let mean = sum as i64 / area;
        if (img.get_pixel(x, y)[0] as i64) < mean - offset as i64 {
            Luma([INK])
        } else {
            Luma([PAPER])
        }
    })
}

/// Morphological closing of the ink with a 3x3 square
pub fn close_strokes(binary: &GrayImage) -> GrayImage {
    // imageproc treats non-zero pixels as foreground
    let mut ink = binary.clone();
    image::imageops::invert(&mut ink);
    let mut closed = morphology::close(&ink, Norm::LInf, 1);
    image::imageops::invert(&mut closed);
    closed
}

/// Surround the buffer with a background-coloured border
pub fn add_border(gray: &GrayImage, border: u32) -> GrayImage {
    let mut canvas = GrayImage::from_pixel(
        gray.width() + 2 * border,
        gray.height() + 2 * border,
        Luma([PAPER]),
    );
    image::imageops::overlay(&mut canvas, gray, border.into(), border.into());
    canvas
}

pub fn ink_pixels(img: &GrayImage) -> usize {
    img.pixels().filter(|p| is_ink(p)).count()
}
