use crate::config::DetectorConfig;
use crate::detection::preprocessing::{is_ink, otsu_binarize};
use crate::models::LineBox;
use image::{imageops, GrayImage};

/// Contiguous run of rows, `bottom` exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Band {
    pub top: u32,
    pub bottom: u32,
}

impl Band {
    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }
}

/// A line ROI together with the column hypothesis that produced it.
/// Hypothesis 0 is always the full-width pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineRoi {
    pub hypothesis: usize,
    pub bbox: LineBox,
}

/// Horizontal strip of the page scanned as one segmentation hypothesis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpan {
    pub x: u32,
    pub width: u32,
}

/// Ink count per row inside `span`
pub fn row_ink_counts(binary: &GrayImage, span: ColumnSpan) -> Vec<u32> {
    (0..binary.height())
        .map(|y| {
            (span.x..span.x + span.width)
                .filter(|&x| is_ink(binary.get_pixel(x, y)))
                .count() as u32
        })
        .collect()
}

/// Ink count per column over the whole buffer
pub fn column_ink_counts(binary: &GrayImage) -> Vec<u32> {
    let mut counts = vec![0u32; binary.width() as usize];
    for (x, _, p) in binary.enumerate_pixels() {
        if is_ink(p) {
            counts[x as usize] += 1;
        }
    }
    counts
}

/// Runs of rows whose count exceeds `threshold`, at least `min_height` tall
pub fn find_bands(profile: &[u32], threshold: u32, min_height: u32) -> Vec<Band> {
    let mut bands = Vec::new();
    let mut start = None;
    for (y, &count) in profile.iter().enumerate() {
        match (count > threshold, start) {
            (true, None) => start = Some(y as u32),
            (false, Some(top)) => {
                bands.push(Band { top, bottom: y as u32 });
                start = None;
            }
            _ => {}
        }
    }
    if let Some(top) = start {
        bands.push(Band {
            top,
            bottom: profile.len() as u32,
        });
    }
    bands.retain(|b| b.height() >= min_height);
    bands
}

/// Look for internal valleys in a band tall enough to hold several touching lines
pub fn split_tall_band(profile: &[u32], band: Band, base_threshold: u32, config: &DetectorConfig) -> Vec<Band> {
    let limit = config.nominal_line_height as f32 * config.split_factor;
    if (band.height() as f32) <= limit {
        return vec![band];
    }

    let inner = &profile[band.top as usize..band.bottom as usize];
    let peak = inner.iter().copied().max().unwrap_or(0);
    let valley = ((peak as f32 * config.split_valley_ratio) as u32).max(base_threshold);
    let sub_bands: Vec<Band> = find_bands(inner, valley, config.min_line_height)
        .into_iter()
        .map(|b| Band {
            top: b.top + band.top,
            bottom: b.bottom + band.top,
        })
        .collect();

    if sub_bands.len() >= 2 { sub_bands } else { vec![band] }
}

/// Join bands separated by fewer than `max_gap` rows
pub fn merge_close_bands(mut bands: Vec<Band>, max_gap: u32) -> Vec<Band> {
    bands.sort_by_key(|b| b.top);
    let mut merged: Vec<Band> = Vec::with_capacity(bands.len());
    for band in bands {
        match merged.last_mut() {
            Some(last) if band.top.saturating_sub(last.bottom) < max_gap => {
                last.bottom = last.bottom.max(band.bottom);
            }
            _ => merged.push(band),
        }
    }
    merged
}

/// Horizontal-projection line detection inside one column span
pub fn detect_line_bands(
    binary: &GrayImage,
    span: ColumnSpan,
    config: &DetectorConfig,
    max_lines: Option<usize>,
) -> Vec<Band> {
    let profile = row_ink_counts(binary, span);
    let threshold = (span.width as f32 * config.row_ink_ratio) as u32;

    let split: Vec<Band> = find_bands(&profile, threshold, config.min_line_height)
        .into_iter()
        .flat_map(|band| split_tall_band(&profile, band, threshold, config))
        .collect();

    let mut bands = merge_close_bands(split, config.merge_gap);
    if let Some(cap) = max_lines {
        bands.truncate(cap);
    }
    bands
}

/// Pick the densest ink columns as independent segmentation hypotheses.
/// Density is smoothed over a short window so single noisy columns do not win.
pub fn select_columns(binary: &GrayImage, config: &DetectorConfig) -> Vec<ColumnSpan> {
    let width = binary.width();
    if width == 0 {
        return Vec::new();
    }
    let raw = column_ink_counts(binary);
    let radius = (width / 100).max(1) as usize;
    let density: Vec<u32> = (0..raw.len())
        .map(|x| {
            let lo = x.saturating_sub(radius);
            let hi = (x + radius + 1).min(raw.len());
            raw[lo..hi].iter().sum()
        })
        .collect();

    let crop_w = ((width as f32 * config.column_width_ratio) as u32).clamp(1, width);
    let separation = (width as f32 * config.column_separation_ratio) as i64;
    let mut centres: Vec<u32> = Vec::new();
    let mut spans = Vec::new();

    while spans.len() < config.column_hypotheses {
        let best = density
            .iter()
            .enumerate()
            .filter(|(x, _)| centres.iter().all(|&c| (*x as i64 - c as i64).abs() >= separation))
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(&a.0)));
        let Some((x, &d)) = best else { break };
        if d == 0 {
            break;
        }
        let x = x as u32;
        let left = x.saturating_sub(crop_w / 2).min(width - crop_w);
        centres.push(x);
        spans.push(ColumnSpan { x: left, width: crop_w });
    }
    spans
}

/// Crop a line ROI horizontally to its ink extent plus padding
pub fn trim_line(gray: &GrayImage, roi: LineBox, config: &DetectorConfig) -> LineBox {
    let crop = imageops::crop_imm(gray, roi.x, roi.y, roi.width, roi.height).to_image();
    let binary = otsu_binarize(&crop, config.min_contrast);
    let min_ink = (roi.height as f32 * config.trim_ink_ratio).max(1.0);
    let counts = column_ink_counts(&binary);

    let first = counts.iter().position(|&c| c as f32 >= min_ink);
    let last = counts.iter().rposition(|&c| c as f32 >= min_ink);
    let (Some(first), Some(last)) = (first, last) else {
        return roi;
    };

    let left = (first as u32).saturating_sub(config.trim_padding);
    let right = (last as u32 + 1 + config.trim_padding).min(roi.width);
    LineBox::new(roi.x + left, roi.y, right - left, roi.height)
}

/// Segment the page into trimmed line ROIs over the full-width pass and each dense column
pub fn segment_lines(gray: &GrayImage, config: &DetectorConfig, max_lines: Option<usize>) -> Vec<LineRoi> {
    let binary = otsu_binarize(gray, config.min_contrast);
    let full = ColumnSpan {
        x: 0,
        width: gray.width(),
    };

    let mut spans = vec![full];
    spans.extend(select_columns(&binary, config));

    let mut rois = Vec::new();
    for (hypothesis, span) in spans.into_iter().enumerate() {
        for band in detect_line_bands(&binary, span, config, max_lines) {
            let raw = LineBox::new(span.x, band.top, span.width, band.height());
            rois.push(LineRoi {
                hypothesis,
                bbox: trim_line(gray, raw, config),
            });
        }
    }
    rois
}
