//! Drives the Registering state's sample-collection flow: detect, align, quality-gate, embed,
//! duplicate-check, accumulate, and finally average+persist once enough samples are in.

use crate::aligner::LandmarkAligner;
use crate::detector::FaceDetector;
use crate::embedder::Embedder;
use crate::error::{FaceAuthError, Result};
use crate::gallery::Gallery;
use crate::quality::{QualityGate, QualityReason};
use crate::types::{Embedding, EnrollmentScratch};
use image::DynamicImage;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone)]
pub enum EnrollmentOutcome {
    /// A sample was accepted; progress advanced.
    SampleAccepted { collected: usize, required: usize },
    /// The new sample looked like an already-enrolled person.
    DuplicateDetected { existing_id: u64, existing_name: String, similarity: f32 },
    /// No face / bad quality this frame; not a hard failure, just nothing to accumulate.
    NoUsableFace(Option<QualityReason>),
}

pub struct EnrollmentPipeline {
    samples_required: usize,
    timeout_ms: u64,
    duplicate_threshold: f32,
    scratch: EnrollmentScratch,
}

impl EnrollmentPipeline {
    pub fn new(config: &crate::config::Config) -> Self {
        Self {
            samples_required: config.enrollment.samples_required,
            timeout_ms: config.enrollment.timeout_ms,
            duplicate_threshold: config.gallery.duplicate_threshold,
            scratch: EnrollmentScratch::default(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.scratch.is_active()
    }

    pub fn name(&self) -> &str {
        &self.scratch.name
    }

    pub fn begin(&mut self, name: String) {
        self.scratch.clear();
        self.scratch.name = name;
        self.scratch.started_at_ms = now_ms();
    }

    pub fn cancel(&mut self) {
        self.scratch.clear();
    }

    pub fn is_timed_out(&self) -> bool {
        self.scratch.is_active() && now_ms().saturating_sub(self.scratch.started_at_ms) >= self.timeout_ms
    }

    /// Runs one frame through the enrollment pipeline. `detector`/`aligner`/`quality`/`embedder`
    /// are shared with the rest of the service; `gallery` is consulted for duplicates only on
    /// the first accepted sample of the scratch buffer, not every sample.
    #[allow(clippy::too_many_arguments)]
    pub fn feed_frame(
        &mut self,
        frame: &DynamicImage,
        detector: &FaceDetector,
        aligner: &LandmarkAligner,
        quality: &QualityGate,
        embedder: &Embedder,
        gallery: &Gallery,
    ) -> Result<EnrollmentOutcome> {
        if !self.scratch.is_active() {
            return Err(FaceAuthError::Other(anyhow::anyhow!(
                "feed_frame called with no enrollment in progress"
            )));
        }

        let Some(detection) = detector.detect_best(frame)? else {
            return Ok(EnrollmentOutcome::NoUsableFace(None));
        };

        if let Err(reason) = quality.check(frame, &detection) {
            return Ok(EnrollmentOutcome::NoUsableFace(Some(reason)));
        }

        let Some(aligned) = aligner.align(frame, &detection) else {
            return Ok(EnrollmentOutcome::NoUsableFace(None));
        };

        let embedding = embedder.extract(&aligned)?;

        if self.scratch.embeddings.is_empty() {
            if let Some((existing_id, existing_name, similarity)) = gallery.find_duplicate(&embedding) {
                return Ok(EnrollmentOutcome::DuplicateDetected {
                    existing_id,
                    existing_name,
                    similarity,
                });
            }
        }

        self.scratch.embeddings.push(embedding);
        self.scratch.crops.push(aligned);

        Ok(EnrollmentOutcome::SampleAccepted {
            collected: self.scratch.embeddings.len(),
            required: self.samples_required,
        })
    }

    /// True once `feed_frame` has accumulated enough samples for `finalize` to persist.
    pub fn is_ready_to_finalize(&self) -> bool {
        self.scratch.embeddings.len() >= self.samples_required
    }

    /// Finalizes enrollment against a mutable gallery handle (split from `feed_frame` so the
    /// service controls exactly when the gallery is mutated/persisted). Returns `None` if not
    /// enough samples have been collected yet.
    pub fn finalize(&mut self, gallery: &mut Gallery) -> Result<Option<(u64, String)>> {
        if !self.is_ready_to_finalize() {
            return Ok(None);
        }
        let averaged = average_and_normalize(&self.scratch.embeddings);
        let name = self.scratch.name.clone();
        let id = gallery.insert(name.clone(), averaged)?;
        self.scratch.clear();
        Ok(Some((id, name)))
    }
}

fn average_and_normalize(embeddings: &[Embedding]) -> Embedding {
    let dim = embeddings.first().map(|e| e.len()).unwrap_or(0);
    let mut sum = vec![0f32; dim];
    for emb in embeddings {
        for (s, v) in sum.iter_mut().zip(emb.iter()) {
            *s += v;
        }
    }
    let n = embeddings.len().max(1) as f32;
    for s in sum.iter_mut() {
        *s /= n;
    }
    let norm: f32 = sum.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-12 {
        for s in sum.iter_mut() {
            *s /= norm;
        }
    }
    sum
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_and_normalize_produces_unit_vector() {
        let embeddings = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let avg = average_and_normalize(&embeddings);
        let norm: f32 = avg.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn begin_and_cancel_toggle_active_state() {
        let config = crate::config::Config::default();
        let mut pipeline = EnrollmentPipeline::new(&config);
        assert!(!pipeline.is_active());
        pipeline.begin("alice".into());
        assert!(pipeline.is_active());
        pipeline.cancel();
        assert!(!pipeline.is_active());
    }
}
