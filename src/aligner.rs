//! Geometric face alignment: fits a similarity transform (rotation + uniform scale +
//! translation) from 5 detected landmarks to a canonical template and warps the source image
//! into a fixed-size crop. Mirrors the partial-affine RANSAC approach of `cv::estimateAffinePartial2D`.

use crate::config::Config;
use crate::types::{AlignedFace, FaceDetection};
use image::{Rgb, RgbImage};
use rand::seq::SliceRandom;

/// 112x112 ArcFace-style reference landmark template (left eye, right eye, nose, left mouth,
/// right mouth corners).
pub const TEMPLATE_112: [(f32, f32); 5] = [
    (38.2946, 51.6963),
    (73.5318, 50.5014),
    (56.0252, 71.7366),
    (41.5493, 92.3655),
    (70.7299, 92.2041),
];

/// A 2x3 similarity transform: `[a, -b, tx; b, a, ty]` (uniform scale `s`, rotation `theta`,
/// with `a = s*cos(theta)`, `b = s*sin(theta)`).
#[derive(Debug, Clone, Copy)]
struct Similarity {
    a: f64,
    b: f64,
    tx: f64,
    ty: f64,
}

impl Similarity {
    fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        let (x, y) = (x as f64, y as f64);
        (
            (self.a * x - self.b * y + self.tx) as f32,
            (self.b * x + self.a * y + self.ty) as f32,
        )
    }

    /// Least-squares fit of a similarity transform from `src` to `dst` over the given indices.
    /// Closed form via normal equations on the 4 unknowns (a, b, tx, ty).
    fn fit(src: &[(f32, f32)], dst: &[(f32, f32)], indices: &[usize]) -> Option<Self> {
        if indices.len() < 2 {
            return None;
        }

        // Solve [sum x^2+y^2, 0, sum x, sum y; ...] system derived from minimizing
        // sum((a*x - b*y + tx - x')^2 + (b*x + a*y + ty - y')^2).
        let n = indices.len() as f64;
        let mut sx = 0.0;
        let mut sy = 0.0;
        let mut sxp = 0.0;
        let mut syp = 0.0;
        let mut sxx_yy = 0.0;
        let mut sxyp_yxp = 0.0;

        for &i in indices {
            let (x, y) = (src[i].0 as f64, src[i].1 as f64);
            let (xp, yp) = (dst[i].0 as f64, dst[i].1 as f64);
            sx += x;
            sy += y;
            sxp += xp;
            syp += yp;
            sxx_yy += x * xp + y * yp;
            sxyp_yxp += x * yp - y * xp;
        }

        let sxx_plus_syy: f64 = indices
            .iter()
            .map(|&i| {
                let (x, y) = (src[i].0 as f64, src[i].1 as f64);
                x * x + y * y
            })
            .sum();

        // [ sxx_plus_syy, 0, sx, sy ] [a]   [ sxx_yy ]
        // [ 0, sxx_plus_syy, -sy, sx] [b] = [ sxyp_yxp ]
        // [ sx, -sy, n, 0           ] [tx]  [ sxp ]
        // [ sy, sx, 0, n            ] [ty]  [ syp ]
        let m = nalgebra::Matrix4::new(
            sxx_plus_syy, 0.0, sx, sy, //
            0.0, sxx_plus_syy, -sy, sx, //
            sx, -sy, n, 0.0, //
            sy, sx, 0.0, n,
        );
        let rhs = nalgebra::Vector4::new(sxx_yy, sxyp_yxp, sxp, syp);

        let solved = m.lu().solve(&rhs)?;
        Some(Similarity {
            a: solved[0],
            b: solved[1],
            tx: solved[2],
            ty: solved[3],
        })
    }
}

pub struct LandmarkAligner {
    output_size: u32,
    ransac_threshold: f32,
    ransac_iterations: u32,
    ransac_confidence: f64,
    template: [(f32, f32); 5],
}

impl LandmarkAligner {
    pub fn new(config: &Config) -> Self {
        Self {
            output_size: config.aligner.output_size,
            ransac_threshold: config.aligner.ransac_reproj_threshold,
            ransac_iterations: config.aligner.ransac_iterations,
            ransac_confidence: config.aligner.ransac_confidence,
            template: TEMPLATE_112,
        }
    }

    /// Aligns `image` using `detection`'s landmarks, producing a geometrically normalized crop
    /// of side `output_size`, or `None` if a usable transform could not be fit.
    pub fn align(&self, image: &image::DynamicImage, detection: &FaceDetection) -> AlignedFace {
        let landmarks = detection.normalized_landmarks();
        let src: Vec<(f32, f32)> = landmarks.iter().map(|p| (p.x, p.y)).collect();
        let dst: Vec<(f32, f32)> = self.template.to_vec();

        let transform = self.estimate_ransac(&src, &dst)?;
        self.warp(image, &transform)
    }

    /// RANSAC search over minimal 2-point subsets, refined by a least-squares fit over inliers
    /// of the best subset. Falls back to a full 5-point fit if RANSAC fails to find a consensus.
    fn estimate_ransac(&self, src: &[(f32, f32)], dst: &[(f32, f32)]) -> Option<Similarity> {
        let n = src.len();
        if n < 2 {
            return None;
        }

        let mut rng = rand::thread_rng();
        let all_indices: Vec<usize> = (0..n).collect();

        let mut best_inliers: Vec<usize> = Vec::new();
        let mut best_count = 0usize;

        let mut iterations_run = 0u32;
        let max_iters = self.ransac_iterations.max(1);

        while iterations_run < max_iters {
            iterations_run += 1;

            let sample: Vec<usize> = all_indices
                .choose_multiple(&mut rng, 2)
                .copied()
                .collect();
            let Some(candidate) = Similarity::fit(src, dst, &sample) else {
                continue;
            };

            let inliers: Vec<usize> = all_indices
                .iter()
                .copied()
                .filter(|&i| {
                    let (px, py) = candidate.apply(src[i].0, src[i].1);
                    let err = ((px - dst[i].0).powi(2) + (py - dst[i].1).powi(2)).sqrt();
                    err <= self.ransac_threshold
                })
                .collect();

            if inliers.len() > best_count {
                best_count = inliers.len();
                best_inliers = inliers;

                // Early-exit once the observed inlier ratio implies we've met the configured
                // confidence for a 2-point minimal model, mirroring cv::RANSAC's adaptive stop.
                let ratio = best_count as f64 / n as f64;
                if ratio >= 0.999 {
                    break;
                }
                let w = ratio.max(1e-6);
                let needed = ((1.0 - self.ransac_confidence).ln() / (1.0 - w.powi(2)).ln()).ceil();
                if needed.is_finite() && (iterations_run as f64) >= needed {
                    break;
                }
            }
        }

        if best_inliers.len() < 2 {
            // Degenerate input (near-collinear / identical points): fall back to a full fit.
            best_inliers = all_indices.clone();
        }

        Similarity::fit(src, dst, &best_inliers)
    }

    fn warp(&self, image: &image::DynamicImage, transform: &Similarity) -> AlignedFace {
        let rgb = image.to_rgb8();
        let (src_w, src_h) = (rgb.width() as i64, rgb.height() as i64);

        // warp_affine maps destination -> source, so invert the fitted src->dst transform.
        let det = transform.a * transform.a + transform.b * transform.b;
        if det.abs() < 1e-12 {
            return None;
        }
        let inv_a = transform.a / det;
        let inv_b = -transform.b / det;
        let inv_tx = -(inv_a * transform.tx - inv_b * transform.ty);
        let inv_ty = -(inv_b * transform.tx + inv_a * transform.ty);

        let mut warped = RgbImage::from_pixel(112, 112, Rgb([127, 127, 127]));
        for dy in 0..112u32 {
            for dx in 0..112u32 {
                let (sx, sy) = (
                    inv_a * dx as f64 - inv_b * dy as f64 + inv_tx,
                    inv_b * dx as f64 + inv_a * dy as f64 + inv_ty,
                );
                if let Some(pixel) = bilinear_sample(&rgb, sx, sy, src_w, src_h) {
                    warped.put_pixel(dx, dy, pixel);
                }
            }
        }

        if self.output_size == 112 {
            Some(warped)
        } else {
            Some(image::imageops::resize(
                &warped,
                self.output_size,
                self.output_size,
                image::imageops::FilterType::Triangle,
            ))
        }
    }
}

fn bilinear_sample(img: &RgbImage, x: f64, y: f64, w: i64, h: i64) -> Option<Rgb<u8>> {
    if x < -1.0 || y < -1.0 || x > w as f64 || y > h as f64 {
        return Some(Rgb([127, 127, 127]));
    }

    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;

    let sample = |xi: i64, yi: i64| -> Rgb<u8> {
        if xi < 0 || yi < 0 || xi >= w || yi >= h {
            Rgb([127, 127, 127])
        } else {
            *img.get_pixel(xi as u32, yi as u32)
        }
    };

    let (x0i, y0i) = (x0 as i64, y0 as i64);
    let p00 = sample(x0i, y0i);
    let p10 = sample(x0i + 1, y0i);
    let p01 = sample(x0i, y0i + 1);
    let p11 = sample(x0i + 1, y0i + 1);

    let mut out = [0u8; 3];
    for c in 0..3 {
        let top = p00[c] as f64 * (1.0 - fx) + p10[c] as f64 * fx;
        let bottom = p01[c] as f64 * (1.0 - fx) + p11[c] as f64 * fx;
        out[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }

    Some(Rgb(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Point2f;

    fn detection_with_landmarks(pts: [(f32, f32); 5]) -> FaceDetection {
        FaceDetection {
            x1: 0.0,
            y1: 0.0,
            x2: 112.0,
            y2: 112.0,
            landmarks: [
                Point2f::new(pts[0].0, pts[0].1),
                Point2f::new(pts[1].0, pts[1].1),
                Point2f::new(pts[2].0, pts[2].1),
                Point2f::new(pts[3].0, pts[3].1),
                Point2f::new(pts[4].0, pts[4].1),
            ],
            score: 0.99,
        }
    }

    #[test]
    fn identity_landmarks_align_without_panic() {
        let config = Config::default();
        let aligner = LandmarkAligner::new(&config);
        let img = image::DynamicImage::ImageRgb8(RgbImage::from_pixel(200, 200, Rgb([10, 20, 30])));
        let det = detection_with_landmarks(TEMPLATE_112);
        let result = aligner.align(&img, &det);
        assert!(result.is_some());
        let out = result.unwrap();
        assert_eq!(out.width(), config.aligner.output_size);
        assert_eq!(out.height(), config.aligner.output_size);
    }

    #[test]
    fn degenerate_identical_landmarks_do_not_panic() {
        let config = Config::default();
        let aligner = LandmarkAligner::new(&config);
        let img = image::DynamicImage::ImageRgb8(RgbImage::from_pixel(50, 50, Rgb([0, 0, 0])));
        let det = detection_with_landmarks([(10.0, 10.0); 5]);
        let _ = aligner.align(&img, &det);
    }
}
