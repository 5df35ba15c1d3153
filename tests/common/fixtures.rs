use assettag::{RawRecognition, RecognitionParams, Recognizer};
use async_trait::async_trait;
use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use imageproc::rect::Rect;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Labels are drawn as one solid cell per digit; the cell width encodes the digit
pub const CELL_HEIGHT: u32 = 80;
pub const CELL_BASE_WIDTH: u32 = 16;
pub const CELL_WIDTH_STEP: u32 = 8;
pub const CELL_GAP: u32 = 20;

pub const PAGE_WIDTH: u32 = 1400;
pub const PAGE_HEIGHT: u32 = 1000;

pub const VALID_SEQUENCE: &str = "0424102470200259";
pub const OTHER_SEQUENCE: &str = "0424102370200871";
/// Year digits 19 fail the validity check
pub const BAD_YEAR_SEQUENCE: &str = "0424101970200259";

fn cell_width(digit: u32) -> u32 {
    CELL_BASE_WIDTH + CELL_WIDTH_STEP * digit
}

/// White page with one row of digit cells per entry of `lines`
pub fn render_label(lines: &[&str]) -> GrayImage {
    let mut page = GrayImage::from_pixel(PAGE_WIDTH, PAGE_HEIGHT, Luma([255]));
    for (i, line) in lines.iter().enumerate() {
        let top = 120 + i as i32 * 150;
        let mut x = 200i32;
        for digit in line.chars().filter_map(|c| c.to_digit(10)) {
            let width = cell_width(digit);
            draw_filled_rect_mut(&mut page, Rect::at(x, top).of_size(width, CELL_HEIGHT), Luma([20]));
            x += (width + CELL_GAP) as i32;
        }
    }
    page
}

pub fn render_rotated(lines: &[&str], degrees: f32) -> GrayImage {
    rotate_about_center(
        &render_label(lines),
        degrees.to_radians(),
        Interpolation::Bilinear,
        Luma([255]),
    )
}

pub fn png_bytes(img: &GrayImage) -> Vec<u8> {
    let mut buf = Vec::new();
    DynamicImage::ImageLuma8(img.clone())
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .expect("Failed to encode test image");
    buf
}

/// Decode a row of digit cells back into digits
pub fn read_cells(image: &GrayImage) -> String {
    let (w, h) = image.dimensions();
    let is_ink = |x: u32, y: u32| image.get_pixel(x, y)[0] < 128;
    let ink_column = |x: u32| (0..h).any(|y| is_ink(x, y));

    let mut digits = String::new();
    let mut x = 0;
    while x < w {
        if !ink_column(x) {
            x += 1;
            continue;
        }
        let start = x;
        while x < w && ink_column(x) {
            x += 1;
        }

        let mut top = u32::MAX;
        let mut bottom = 0;
        for cx in start..x {
            for y in 0..h {
                if is_ink(cx, y) {
                    top = top.min(y);
                    bottom = bottom.max(y);
                }
            }
        }
        let cell_height = bottom - top + 1;
        if cell_height * 4 < h {
            continue;
        }

        let width = (x - start) as f32 * CELL_HEIGHT as f32 / cell_height as f32;
        let digit = ((width - CELL_BASE_WIDTH as f32) / CELL_WIDTH_STEP as f32).round().clamp(0.0, 9.0);
        digits.push(char::from_digit(digit as u32, 10).expect("digit in range"));
    }
    digits
}

/// Recognizer that reads the synthetic digit cells
#[derive(Default)]
pub struct CellReader {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Recognizer for CellReader {
    async fn recognize(&self, image: &GrayImage, _params: &RecognitionParams) -> anyhow::Result<RawRecognition> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(RawRecognition {
            text: read_cells(image),
            confidence: 80.0,
        })
    }
}

/// Recognizer returning fixed text that records how many calls overlap
pub struct Scripted {
    pub text: String,
    pub fail: bool,
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl Scripted {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            fail: false,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new("")
        }
    }
}

#[async_trait]
impl Recognizer for Scripted {
    async fn recognize(&self, _image: &GrayImage, _params: &RecognitionParams) -> anyhow::Result<RawRecognition> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail {
            anyhow::bail!("engine unavailable");
        }
        Ok(RawRecognition {
            text: self.text.clone(),
            confidence: 60.0,
        })
    }
}
