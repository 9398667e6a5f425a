use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Luma};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use std::io::Cursor;
use thiserror::Error;
use tracing::debug;

/// Sauvola window radius in pixels (window side is `2 * radius + 1`).
pub const SAUVOLA_RADIUS: u32 = 15;
/// Sauvola sensitivity: larger values pull the threshold further below the local mean.
pub const SAUVOLA_K: f64 = 0.34;
/// Dynamic range of the standard deviation for 8-bit input.
const SAUVOLA_R: f64 = 128.0;

/// Skew angles at or below this magnitude (degrees) are left uncorrected.
pub const SKEW_THRESHOLD_DEGREES: f64 = 0.05;

const INK: u8 = 0;
const BACKGROUND: u8 = 255;

// Tesseract works best at 300 DPI / ~2000 px; a check never needs more than this.
const MAX_DIMENSION: u32 = 2800;

const SKEW_MIN_DIMENSION: u32 = 32;
const SKEW_MIN_INK_FRACTION: f64 = 0.005;
const SKEW_COLUMN_STEP: usize = 2;

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("Cannot normalize a {width}x{height} image")]
    EmptyImage { width: u32, height: u32 },
    #[error("Failed to load image: {0}")]
    Load(#[from] image::ImageError),
    #[error("Failed to encode processed image: {0}")]
    Encode(String),
}

/// Decode raw container bytes (JPEG / PNG / WEBP / …) into a raster image.
pub fn decode_image(data: &[u8]) -> Result<DynamicImage, PreprocessError> {
    Ok(image::load_from_memory(data)?)
}

/// Binarize and deskew an image for line-level OCR.
///
/// The result holds only two values: 0 for ink, 255 for background.
pub fn normalize(image: &DynamicImage) -> Result<GrayImage, PreprocessError> {
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
        return Err(PreprocessError::EmptyImage { width, height });
    }

    let gray = if width > MAX_DIMENSION || height > MAX_DIMENSION {
        image
            .resize(MAX_DIMENSION, MAX_DIMENSION, FilterType::Lanczos3)
            .to_luma8()
    } else {
        image.to_luma8()
    };

    let binary = binarize(&gray);
    Ok(deskew(&binary))
}

/// Sauvola adaptive threshold.
///
/// `T = m * (1 + k * (s / R - 1))` where `m` and `s` are the mean and standard
/// deviation of the window around each pixel. Window sums come from
/// summed-area tables, so the cost does not depend on the radius.
pub fn binarize(gray: &GrayImage) -> GrayImage {
    let (w, h) = gray.dimensions();
    let stride = w as usize + 1;

    let mut sum = vec![0u64; stride * (h as usize + 1)];
    let mut sum_sq = vec![0u64; stride * (h as usize + 1)];
    for y in 0..h as usize {
        let mut row = 0u64;
        let mut row_sq = 0u64;
        for x in 0..w as usize {
            let v = u64::from(gray.get_pixel(x as u32, y as u32)[0]);
            row += v;
            row_sq += v * v;
            let i = (y + 1) * stride + x + 1;
            sum[i] = sum[i - stride] + row;
            sum_sq[i] = sum_sq[i - stride] + row_sq;
        }
    }

    let window = |table: &[u64], x0: usize, y0: usize, x1: usize, y1: usize| -> u64 {
        table[y1 * stride + x1] + table[y0 * stride + x0]
            - table[y0 * stride + x1]
            - table[y1 * stride + x0]
    };

    let r = SAUVOLA_RADIUS;
    GrayImage::from_fn(w, h, |x, y| {
        let x0 = x.saturating_sub(r) as usize;
        let y0 = y.saturating_sub(r) as usize;
        let x1 = (x + r + 1).min(w) as usize;
        let y1 = (y + r + 1).min(h) as usize;
        let n = ((x1 - x0) * (y1 - y0)) as f64;

        let mean = window(&sum, x0, y0, x1, y1) as f64 / n;
        let variance = window(&sum_sq, x0, y0, x1, y1) as f64 / n - mean * mean;
        let std_dev = variance.max(0.0).sqrt();
        let threshold = mean * (1.0 + SAUVOLA_K * (std_dev / SAUVOLA_R - 1.0));

        if f64::from(gray.get_pixel(x, y)[0]) <= threshold {
            Luma([INK])
        } else {
            Luma([BACKGROUND])
        }
    })
}

/// Estimate the dominant text-line angle of a binarized image, in degrees.
///
/// Positive angles mean lines descend to the right. Uses a projection-profile
/// search: the angle whose sheared row profile has the sharpest row-to-row
/// transitions wins. Images too small or too empty to judge report 0.
pub fn estimate_skew(binary: &GrayImage) -> f64 {
    let (w, h) = binary.dimensions();
    if w < SKEW_MIN_DIMENSION || h < SKEW_MIN_DIMENSION {
        return 0.0;
    }
    let ink = binary.pixels().filter(|p| p[0] == INK).count();
    if (ink as f64) < f64::from(w) * f64::from(h) * SKEW_MIN_INK_FRACTION {
        return 0.0;
    }

    // ±10° at 0.2°, then ±0.2° around the winner at 0.02°.
    let coarse = best_angle(binary, (-50..=50).map(|i| f64::from(i) * 0.2));
    best_angle(binary, (-10..=10).map(|i| coarse + f64::from(i) * 0.02))
}

/// Rotate by the negative of the estimated skew when it exceeds
/// [`SKEW_THRESHOLD_DEGREES`]; otherwise return an identical copy.
pub fn deskew(binary: &GrayImage) -> GrayImage {
    let angle = estimate_skew(binary);
    if angle.abs() <= SKEW_THRESHOLD_DEGREES {
        debug!(angle, "skew within threshold, leaving image unrotated");
        return binary.clone();
    }
    debug!(angle, "correcting skew");
    rotate_about_center(
        binary,
        (-angle).to_radians() as f32,
        Interpolation::Nearest,
        Luma([BACKGROUND]),
    )
}

/// Rotate 180° about the center. Lossless.
pub fn flip(image: &GrayImage) -> GrayImage {
    image::imageops::rotate180(image)
}

pub fn encode_as_png(image: &GrayImage) -> Result<Vec<u8>, PreprocessError> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| PreprocessError::Encode(e.to_string()))?;
    Ok(buf)
}

fn best_angle(binary: &GrayImage, candidates: impl Iterator<Item = f64>) -> f64 {
    let mut best_angle = 0.0f64;
    let mut best_score = f64::NEG_INFINITY;
    for angle in candidates {
        let score = profile_sharpness(binary, angle);
        // Ties go to the flatter angle so a straight page stays at exactly 0.
        if score > best_score || (score == best_score && angle.abs() < best_angle.abs()) {
            best_angle = angle;
            best_score = score;
        }
    }
    best_angle
}

/// Sum of squared differences between adjacent rows of the ink profile, with
/// each column read at a vertical offset of `x * tan(angle)`.
fn profile_sharpness(binary: &GrayImage, angle_deg: f64) -> f64 {
    let (w, h) = binary.dimensions();
    let tan = angle_deg.to_radians().tan();
    let height = i64::from(h);
    let mut rows = vec![0u32; h as usize];

    for x in (0..w).step_by(SKEW_COLUMN_STEP) {
        let offset = (f64::from(x) * tan).round() as i64;
        for (y, count) in rows.iter_mut().enumerate() {
            let sy = y as i64 + offset;
            if sy < 0 || sy >= height {
                continue;
            }
            if binary.get_pixel(x, sy as u32)[0] == INK {
                *count += 1;
            }
        }
    }

    rows.windows(2)
        .map(|pair| {
            let d = f64::from(pair[1]) - f64::from(pair[0]);
            d * d
        })
        .sum()
}
