//! Embedding extraction with flip test-time augmentation: every crop is run through the model
//! twice (as-is and horizontally mirrored), the two outputs are averaged and re-normalized.

use crate::config::Config;
use crate::error::{FaceAuthError, Result};
use crate::types::{Embedding, COSINE_SENTINEL};
use image::{imageops, DynamicImage, RgbImage};
use ndarray::{Array4, CowArray};
use ort::{Environment, GraphOptimizationLevel, Session, SessionBuilder, Value};
use std::sync::{Arc, Mutex};

pub struct Embedder {
    session: Mutex<Session>,
    _environment: Arc<Environment>,
    input_size: u32,
    use_rgb: bool,
    external_norm: bool,
}

impl Embedder {
    pub fn new(config: &Config) -> Result<Self> {
        let model_path = &config.models.embedder_path;
        if !model_path.exists() {
            return Err(FaceAuthError::Model(format!(
                "embedder model not found at: {:?}",
                model_path
            )));
        }

        let environment = Arc::new(
            Environment::builder()
                .with_name("face_embedder")
                .build()
                .map_err(|e| FaceAuthError::Model(format!("failed to create environment: {e}")))?,
        );

        let session = SessionBuilder::new(&environment)?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_model_from_file(model_path)?;

        Ok(Self {
            session: Mutex::new(session),
            _environment: environment,
            input_size: config.embedder.input_size,
            use_rgb: config.embedder.use_rgb,
            external_norm: config.embedder.external_norm,
        })
    }

    /// Extracts a unit-norm embedding from an already-aligned face crop via flip-TTA: the crop
    /// and its horizontal mirror are both embedded, the results averaged, then renormalized.
    pub fn extract(&self, aligned: &RgbImage) -> Result<Embedding> {
        let resized = if aligned.width() == self.input_size && aligned.height() == self.input_size
        {
            aligned.clone()
        } else {
            imageops::resize(
                aligned,
                self.input_size,
                self.input_size,
                imageops::FilterType::Triangle,
            )
        };

        let flipped = imageops::flip_horizontal(&resized);

        let emb1 = self.forward(&resized)?;
        let emb2 = self.forward(&flipped)?;

        if emb1.len() != emb2.len() {
            return Err(FaceAuthError::Model(format!(
                "embedding dim mismatch between original and flipped pass: {} vs {}",
                emb1.len(),
                emb2.len()
            )));
        }

        let mut averaged: Vec<f32> = emb1
            .iter()
            .zip(emb2.iter())
            .map(|(a, b)| 0.5 * (a + b))
            .collect();

        l2_normalize(&mut averaged);
        Ok(averaged)
    }

    fn forward(&self, img: &RgbImage) -> Result<Embedding> {
        let input = self.preprocess(img);
        let cow = CowArray::from(input.into_dyn());

        let session = self
            .session
            .lock()
            .map_err(|_| FaceAuthError::Model("embedder session lock poisoned".into()))?;
        let tensor = Value::from_array(session.allocator(), &cow)?;
        let outputs = session.run(vec![tensor])?;
        let embedding = outputs[0].try_extract::<f32>()?.view().to_owned().into_raw_vec();
        Ok(embedding)
    }

    fn preprocess(&self, img: &RgbImage) -> Array4<f32> {
        let size = self.input_size as usize;
        let mut array = Array4::<f32>::zeros((1, 3, size, size));

        let (scale, mean): (f32, f32) = if self.external_norm {
            (1.0 / 128.0, 127.5)
        } else {
            (1.0, 0.0)
        };

        for y in 0..size {
            for x in 0..size {
                let pixel = img.get_pixel(x as u32, y as u32);
                let (r, g, b) = (pixel[0] as f32, pixel[1] as f32, pixel[2] as f32);
                let (c0, c1, c2) = if self.use_rgb { (r, g, b) } else { (b, g, r) };
                array[[0, 0, y, x]] = (c0 - mean) * scale;
                array[[0, 1, y, x]] = (c1 - mean) * scale;
                array[[0, 2, y, x]] = (c2 - mean) * scale;
            }
        }

        array
    }
}

fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-12 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine similarity with a −1.0 sentinel on dimension mismatch or empty input, matching the
/// convention of treating those as "maximally dissimilar" rather than "similarity zero".
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return COSINE_SENTINEL;
    }

    let mut dot = 0.0f64;
    let mut na = 0.0f64;
    let mut nb = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += (*x as f64) * (*y as f64);
        na += (*x as f64) * (*x as f64);
        nb += (*y as f64) * (*y as f64);
    }

    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }

    (dot / (na.sqrt() * nb.sqrt())) as f32
}

/// Fast trivial-frame check folded into the embedder path per the source system's
/// `isTrivialFrame`: a crop with near-zero variance or brightness can't yield a useful embedding
/// and is rejected before inference rather than surfaced as a low-confidence match later.
pub fn is_trivial_frame(img: &DynamicImage, mean_min: f64, std_min: f64) -> bool {
    let rgb = img.to_rgb8();
    if rgb.width() == 0 || rgb.height() == 0 {
        return true;
    }

    let count = (rgb.width() as u64 * rgb.height() as u64) as f64;
    let mut sum = [0.0f64; 3];
    let mut sum_sq = [0.0f64; 3];
    for p in rgb.pixels() {
        for c in 0..3 {
            let v = p[c] as f64;
            sum[c] += v;
            sum_sq[c] += v * v;
        }
    }

    let mean = (sum[0] + sum[1] + sum[2]) / (3.0 * count);
    let variance = (0..3)
        .map(|c| sum_sq[c] / count - (sum[c] / count).powi(2))
        .sum::<f64>()
        / 3.0;
    let std_dev = variance.max(0.0).sqrt();

    mean < mean_min || std_dev < std_min
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_sentinel_on_mismatched_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), COSINE_SENTINEL);
    }

    #[test]
    fn cosine_sentinel_on_empty() {
        assert_eq!(cosine_similarity(&[], &[]), COSINE_SENTINEL);
    }

    #[test]
    fn cosine_of_identical_unit_vectors_is_one() {
        let v = vec![0.6, 0.8];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn l2_normalize_produces_unit_vector() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn trivial_frame_detected_on_flat_black_image() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 32, image::Rgb([0, 0, 0])));
        assert!(is_trivial_frame(&img, 10.0, 5.0));
    }
}
