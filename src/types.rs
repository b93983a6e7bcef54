//! Core value types shared across the recognition pipeline.

use serde::{Deserialize, Serialize};

/// A unit-length (once produced by [`crate::embedder::Embedder`]) feature vector.
pub type Embedding = Vec<f32>;

/// Sub-pixel landmark point in the coordinate space of the frame it was detected in.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point2f {
    pub x: f32,
    pub y: f32,
}

impl Point2f {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Landmark order is fixed: left eye, right eye, nose, left mouth corner, right mouth corner.
pub type Landmarks5 = [Point2f; 5];

pub const LEFT_EYE: usize = 0;
pub const RIGHT_EYE: usize = 1;
pub const NOSE: usize = 2;
pub const LEFT_MOUTH: usize = 3;
pub const RIGHT_MOUTH: usize = 4;

/// A single face found by [`crate::detector::FaceDetector`] in original frame coordinates.
#[derive(Debug, Clone)]
pub struct FaceDetection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub landmarks: Landmarks5,
    pub score: f32,
}

impl FaceDetection {
    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) * 0.5, (self.y1 + self.y2) * 0.5)
    }

    /// Enforces the landmark-ordering guarantee documented on the detector: left_eye.x <
    /// right_eye.x and left_mouth.x < right_mouth.x. The detector's raw output may violate
    /// this for rotated/mirrored faces; callers that need the guarantee (the aligner) swap.
    pub fn normalized_landmarks(&self) -> Landmarks5 {
        let mut lm = self.landmarks;
        if lm[LEFT_EYE].x > lm[RIGHT_EYE].x {
            lm.swap(LEFT_EYE, RIGHT_EYE);
        }
        if lm[LEFT_MOUTH].x > lm[RIGHT_MOUTH].x {
            lm.swap(LEFT_MOUTH, RIGHT_MOUTH);
        }
        lm
    }
}

/// A 112x112 geometrically-normalized crop, or the absence of one ("none" per spec §4.2).
pub type AlignedFace = Option<image::RgbImage>;

/// An entry in the persistent [`crate::gallery::Gallery`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GalleryEntry {
    pub id: u64,
    pub name: String,
    pub embedding: Embedding,
    /// Unknown fields round-tripped verbatim per spec §6 ("unknown fields preserved if possible").
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Sentinel similarity used when a comparison cannot be made (dimension mismatch, zero norm).
/// Matches the original `Embedder::cosine`'s choice of `-1.f`.
pub const COSINE_SENTINEL: f32 = -1.0;

/// Sentinel used by [`MatchTop2`] when a rank slot has no candidate (gallery too small).
pub const MATCH_INVALID: f32 = -2.0;

#[derive(Debug, Clone, Copy)]
pub struct MatchTop2 {
    pub best_idx: Option<usize>,
    pub best_sim: f32,
    pub second_idx: Option<usize>,
    pub second_sim: f32,
}

impl MatchTop2 {
    pub fn invalid() -> Self {
        Self {
            best_idx: None,
            best_sim: MATCH_INVALID,
            second_idx: None,
            second_sim: MATCH_INVALID,
        }
    }

    pub fn is_best_valid(&self) -> bool {
        self.best_idx.is_some()
    }

    pub fn has_second(&self) -> bool {
        self.second_idx.is_some()
    }

    pub fn gap(&self) -> f32 {
        if self.has_second() {
            self.best_sim - self.second_sim
        } else {
            f32::INFINITY
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Reject,
    Tentative,
    Accept,
    StrongAccept,
}

/// Door lifecycle phases driven by [`crate::hw::unlock_supervisor::UnlockSupervisor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DoorLifecycle {
    Locked,
    WaitOpenConfirm,
    WaitCloseConfirm,
}

/// Bounded buffer of accepted embeddings collected during enrollment (spec §3, "Enrollment
/// scratch"), plus the candidate image crops kept for diagnostics/duplicate review.
#[derive(Debug, Default)]
pub struct EnrollmentScratch {
    pub name: String,
    pub tentative_id: Option<u64>,
    pub embeddings: Vec<Embedding>,
    pub crops: Vec<image::RgbImage>,
    pub started_at_ms: u64,
}

impl EnrollmentScratch {
    pub fn clear(&mut self) {
        self.name.clear();
        self.tentative_id = None;
        self.embeddings.clear();
        self.crops.clear();
        self.started_at_ms = 0;
    }

    pub fn is_active(&self) -> bool {
        !self.name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn landmark_swap_enforces_ordering() {
        let det = FaceDetection {
            x1: 0.0,
            y1: 0.0,
            x2: 100.0,
            y2: 100.0,
            landmarks: [
                Point2f::new(70.0, 50.0), // left eye slot, but further right
                Point2f::new(30.0, 50.0), // right eye slot, but further left
                Point2f::new(50.0, 70.0),
                Point2f::new(60.0, 90.0),
                Point2f::new(40.0, 90.0),
            ],
            score: 0.9,
        };
        let lm = det.normalized_landmarks();
        assert!(lm[LEFT_EYE].x < lm[RIGHT_EYE].x);
        assert!(lm[LEFT_MOUTH].x < lm[RIGHT_MOUTH].x);
    }

    #[test]
    fn match_top2_invalid_has_no_indices() {
        let m = MatchTop2::invalid();
        assert!(!m.is_best_valid());
        assert!(!m.has_second());
    }
}
