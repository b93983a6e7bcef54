//! Discrete-outcome frame quality gate run on the aligned face crop before embedding. Unlike a
//! continuous quality score, every rejection carries a specific, loggable reason.

use crate::config::Config;
use crate::types::FaceDetection;
use image::{DynamicImage, GrayImage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityReason {
    TooSmall,
    TooBlur,
    OverExposed,
    UnderExposed,
    LowContrast,
    HistogramClipped,
    LowCenterContrast,
    /// Crop is empty, degenerate, or the detection box doesn't intersect the frame.
    Invalid,
}

impl std::fmt::Display for QualityReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QualityReason::TooSmall => "too_small",
            QualityReason::TooBlur => "too_blur",
            QualityReason::OverExposed => "over_exposed",
            QualityReason::UnderExposed => "under_exposed",
            QualityReason::LowContrast => "low_contrast",
            QualityReason::HistogramClipped => "histogram_clipped",
            QualityReason::LowCenterContrast => "low_center_contrast",
            QualityReason::Invalid => "invalid",
        };
        f.write_str(s)
    }
}

pub type QualResult = Result<(), QualityReason>;

pub struct QualityGate {
    min_box_width: u32,
    min_box_height: u32,
    blur_variance_thr: f64,
    min_mean: f64,
    max_mean: f64,
    min_std: f64,
    clip_ratio_max: f64,
    center_patch_min_std: f64,
}

impl QualityGate {
    pub fn new(config: &Config) -> Self {
        Self {
            min_box_width: config.quality.min_box_width,
            min_box_height: config.quality.min_box_height,
            blur_variance_thr: config.quality.blur_variance_thr,
            min_mean: config.quality.min_mean,
            max_mean: config.quality.max_mean,
            min_std: config.quality.min_std,
            clip_ratio_max: config.quality.clip_ratio_max,
            center_patch_min_std: config.quality.center_patch_min_std,
        }
    }

    /// Evaluates the gate against the full frame and the detection box within it (the box is
    /// re-cropped here rather than trusting a caller-provided crop, mirroring the source gate's
    /// "always crop from the original frame" contract).
    pub fn check(&self, frame: &DynamicImage, detection: &FaceDetection) -> QualResult {
        if frame.width() < 64 || frame.height() < 64 {
            return Err(QualityReason::Invalid);
        }
        if detection.width() < self.min_box_width as f32
            || detection.height() < self.min_box_height as f32
        {
            return Err(QualityReason::TooSmall);
        }

        let fx1 = detection.x1.max(0.0) as u32;
        let fy1 = detection.y1.max(0.0) as u32;
        let fx2 = (detection.x2.min(frame.width() as f32)) as u32;
        let fy2 = (detection.y2.min(frame.height() as f32)) as u32;
        if fx2 <= fx1 || fy2 <= fy1 {
            return Err(QualityReason::Invalid);
        }

        let face = frame.crop_imm(fx1, fy1, fx2 - fx1, fy2 - fy1);
        let gray = face.to_luma8();

        let lap_var = laplacian_variance(&gray);
        if lap_var < self.blur_variance_thr {
            return Err(QualityReason::TooBlur);
        }

        let (mean, std_dev) = mean_std(&gray);
        if mean < self.min_mean {
            return Err(QualityReason::UnderExposed);
        }
        if mean > self.max_mean {
            return Err(QualityReason::OverExposed);
        }
        if std_dev < self.min_std {
            return Err(QualityReason::LowContrast);
        }

        let (clip0, clip255) = histogram_clip_ratios(&gray);
        if clip0 > self.clip_ratio_max || clip255 > self.clip_ratio_max {
            return Err(QualityReason::HistogramClipped);
        }

        let (_, center_std) = center_patch_stats(&gray, 64);
        if center_std < self.center_patch_min_std - 2.0 {
            return Err(QualityReason::LowCenterContrast);
        }

        Ok(())
    }
}

fn mean_std(gray: &GrayImage) -> (f64, f64) {
    let count = (gray.width() as u64 * gray.height() as u64).max(1);
    let mut sum = 0u64;
    let mut sum_sq = 0u64;
    for p in gray.pixels() {
        let v = p[0] as u64;
        sum += v;
        sum_sq += v * v;
    }
    let mean = sum as f64 / count as f64;
    let variance = (sum_sq as f64 / count as f64) - mean * mean;
    (mean, variance.max(0.0).sqrt())
}

/// 3x3 discrete Laplacian kernel, variance of the response as a sharpness proxy.
fn laplacian_variance(gray: &GrayImage) -> f64 {
    let (w, h) = (gray.width() as i64, gray.height() as i64);
    if w < 3 || h < 3 {
        return 0.0;
    }

    let at = |x: i64, y: i64| -> f64 {
        let x = x.clamp(0, w - 1) as u32;
        let y = y.clamp(0, h - 1) as u32;
        gray.get_pixel(x, y)[0] as f64
    };

    let mut responses = Vec::with_capacity((w * h) as usize);
    for y in 0..h {
        for x in 0..w {
            let lap = -4.0 * at(x, y) + at(x - 1, y) + at(x + 1, y) + at(x, y - 1) + at(x, y + 1);
            responses.push(lap);
        }
    }

    let mean = responses.iter().sum::<f64>() / responses.len() as f64;
    responses.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / responses.len() as f64
}

fn histogram_clip_ratios(gray: &GrayImage) -> (f64, f64) {
    let mut hist = [0u64; 256];
    for p in gray.pixels() {
        hist[p[0] as usize] += 1;
    }
    let total = (gray.width() as u64 * gray.height() as u64).max(1) as f64;
    (hist[0] as f64 / total, hist[255] as f64 / total)
}

fn center_patch_stats(gray: &GrayImage, patch: u32) -> (f64, f64) {
    let (w, h) = (gray.width(), gray.height());
    if w < patch || h < patch {
        return mean_std(gray);
    }
    let cx = ((w / 2).saturating_sub(patch / 2)).min(w - patch);
    let cy = ((h / 2).saturating_sub(patch / 2)).min(h - patch);
    let crop = image::imageops::crop_imm(gray, cx, cy, patch, patch).to_image();
    mean_std(&crop)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Point2f;
    use image::{Rgb, RgbImage};

    fn det(w: f32, h: f32) -> FaceDetection {
        FaceDetection {
            x1: 0.0,
            y1: 0.0,
            x2: w,
            y2: h,
            landmarks: [Point2f::default(); 5],
            score: 0.9,
        }
    }

    #[test]
    fn flat_gray_crop_fails_blur_before_contrast() {
        let config = Config::default();
        let gate = QualityGate::new(&config);
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(200, 200, Rgb([128, 128, 128])));
        let reason = gate.check(&img, &det(150.0, 150.0)).unwrap_err();
        assert_eq!(reason, QualityReason::TooBlur);
    }

    #[test]
    fn undersized_box_is_too_small() {
        let config = Config::default();
        let gate = QualityGate::new(&config);
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(200, 200, Rgb([128, 128, 128])));
        let reason = gate.check(&img, &det(50.0, 50.0)).unwrap_err();
        assert_eq!(reason, QualityReason::TooSmall);
    }

    #[test]
    fn all_black_frame_is_under_exposed_or_blur() {
        let config = Config::default();
        let gate = QualityGate::new(&config);
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(200, 200, Rgb([0, 0, 0])));
        let reason = gate.check(&img, &det(150.0, 150.0)).unwrap_err();
        assert!(matches!(
            reason,
            QualityReason::TooBlur | QualityReason::UnderExposed
        ));
    }
}
