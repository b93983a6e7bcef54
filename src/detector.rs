use crate::config::Config;
use crate::error::{FaceAuthError, Result};
use crate::types::{FaceDetection, Point2f};
use image::{imageops::FilterType, DynamicImage};
use ndarray::{Array4, CowArray};
use ort::{Environment, GraphOptimizationLevel, Session, SessionBuilder, Value};
use std::sync::Arc;

/// Wraps a pretrained face-detection model. Input size is fixed by configuration; frames of
/// other resolutions are resized lazily on every call (spec §4.1: "reconfigured lazily on first
/// frame and on size change" — here trivially true since every frame is resized to the
/// configured input before inference).
pub struct FaceDetector {
    session: Session,
    _environment: Arc<Environment>,
    input_width: u32,
    input_height: u32,
    score_thr: f32,
    nms_thr: f32,
    top_k: usize,
}

impl FaceDetector {
    pub fn new(config: &Config) -> Result<Self> {
        let model_path = &config.models.detector_path;
        if !model_path.exists() {
            return Err(FaceAuthError::Model(format!(
                "detector model not found at: {:?}",
                model_path
            )));
        }

        let environment = Arc::new(
            Environment::builder()
                .with_name("face_detector")
                .build()
                .map_err(|e| FaceAuthError::Model(format!("failed to create environment: {e}")))?,
        );

        let session = SessionBuilder::new(&environment)?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_model_from_file(model_path)?;

        Ok(Self {
            session,
            _environment: environment,
            input_width: config.detector.input_width,
            input_height: config.detector.input_height,
            score_thr: config.detector.score_thr,
            nms_thr: config.detector.nms_thr,
            top_k: config.detector.top_k,
        })
    }

    /// All detections passing `score_thr` and NMS, in original frame coordinates, truncated to
    /// `top_k`. Empty input frame yields an empty result, not an error.
    pub fn detect_all(&self, image: &DynamicImage) -> Result<Vec<FaceDetection>> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(Vec::new());
        }

        let orig_width = image.width() as f32;
        let orig_height = image.height() as f32;

        let resized;
        let to_infer = if image.width() == self.input_width && image.height() == self.input_height
        {
            image
        } else {
            resized = image.resize_exact(self.input_width, self.input_height, FilterType::Triangle);
            &resized
        };

        let input = self.image_to_array(to_infer)?;
        let cow = CowArray::from(input.into_dyn());
        let tensor = Value::from_array(self.session.allocator(), &cow)?;
        let outputs = self.session.run(vec![tensor])?;

        let mut faces = self.parse_detections(&outputs)?;

        let scale_x = orig_width / self.input_width as f32;
        let scale_y = orig_height / self.input_height as f32;
        for face in &mut faces {
            face.x1 *= scale_x;
            face.x2 *= scale_x;
            face.y1 *= scale_y;
            face.y2 *= scale_y;
            for lm in &mut face.landmarks {
                lm.x *= scale_x;
                lm.y *= scale_y;
            }
        }

        Ok(faces)
    }

    /// Single best detection per spec §4.1's ranking:
    /// `area * (1 - 0.35 * distance_to_center_normalized)`, ties broken by earlier index.
    pub fn detect_best(&self, image: &DynamicImage) -> Result<Option<FaceDetection>> {
        let faces = self.detect_all(image)?;
        if faces.is_empty() {
            return Ok(None);
        }

        let (cx, cy) = (image.width() as f32 / 2.0, image.height() as f32 / 2.0);
        let diag = ((image.width() as f32).powi(2) + (image.height() as f32).powi(2)).sqrt() / 2.0;

        let mut best_idx = 0usize;
        let mut best_score = f32::NEG_INFINITY;
        for (idx, face) in faces.iter().enumerate() {
            let (fx, fy) = face.center();
            let dist = ((fx - cx).powi(2) + (fy - cy).powi(2)).sqrt();
            let dist_norm = if diag > 0.0 { (dist / diag).min(1.0) } else { 0.0 };
            let rank = face.area() * (1.0 - 0.35 * dist_norm);
            if rank > best_score {
                best_score = rank;
                best_idx = idx;
            }
        }

        Ok(Some(faces.into_iter().nth(best_idx).unwrap()))
    }

    fn image_to_array(&self, img: &DynamicImage) -> Result<Array4<f32>> {
        let gray = match img {
            DynamicImage::ImageLuma8(gray) => gray.as_raw(),
            _ => {
                let converted = img.to_luma8();
                return self.image_to_array(&DynamicImage::ImageLuma8(converted));
            }
        };

        let width = img.width() as usize;
        let height = img.height() as usize;
        let mut array = Array4::<f32>::zeros((1, 3, height, width));
        let norm_factor = 1.0 / 255.0;

        for y in 0..height {
            let row_offset = y * width;
            for x in 0..width {
                let pixel_value = gray[row_offset + x] as f32 * norm_factor;
                array[[0, 0, y, x]] = pixel_value;
                array[[0, 1, y, x]] = pixel_value;
                array[[0, 2, y, x]] = pixel_value;
            }
        }

        Ok(array)
    }

    /// Parses the detector's output tensor. Supports a plain box+score layout (4+1 values per
    /// prediction) and a box+score+5-landmark layout (4+1+10 values, YuNet-style), in both the
    /// standard `[1, N, K]` and transposed `[1, K, N]` arrangements.
    fn parse_detections(&self, outputs: &[Value]) -> Result<Vec<FaceDetection>> {
        let mut faces = Vec::new();
        let Some(output) = outputs.first() else {
            return Ok(faces);
        };

        let output = output.try_extract::<f32>()?.view().to_owned();
        let data = match output.as_slice() {
            Some(s) => s,
            None => return Ok(faces),
        };
        let shape = output.shape();

        let (num_predictions, prediction_len, transposed) = if shape.len() >= 3 {
            if shape[2] > shape[1] && shape[1] <= 16 {
                (shape[2], shape[1], true)
            } else {
                (shape[1], shape[2], false)
            }
        } else if shape.len() == 2 {
            (shape[0], shape[1], false)
        } else {
            tracing::warn!("unexpected detector output shape: {:?}", shape);
            return Ok(faces);
        };

        let has_landmarks = prediction_len >= 15;
        let stride = num_predictions;

        let at = |field: usize, i: usize| -> f32 {
            if transposed {
                data[field * stride + i]
            } else {
                data[i * prediction_len + field]
            }
        };

        for i in 0..num_predictions {
            let x_raw = at(0, i);
            let y_raw = at(1, i);
            let w_raw = at(2, i);
            let h_raw = at(3, i);
            let score = if prediction_len > 4 { at(4, i) } else { 0.0 };

            if score < 0.001 {
                continue;
            }

            let scale = if x_raw > 1.0 || y_raw > 1.0 || w_raw > 1.0 || h_raw > 1.0 {
                1.0
            } else {
                self.input_width as f32
            };

            let x_center = x_raw * scale;
            let y_center = y_raw * scale;
            let w = w_raw * scale;
            let h = h_raw * scale;

            let x1 = (x_center - w / 2.0).max(0.0);
            let y1 = (y_center - h / 2.0).max(0.0);
            let x2 = (x_center + w / 2.0).min(self.input_width as f32);
            let y2 = (y_center + h / 2.0).min(self.input_height as f32);

            if !(x2 > x1 && y2 > y1 && (x2 - x1) > 10.0 && (y2 - y1) > 10.0) {
                continue;
            }

            let landmarks = if has_landmarks {
                let lscale = scale;
                let mut pts = [Point2f::default(); 5];
                for (k, p) in pts.iter_mut().enumerate() {
                    p.x = at(5 + 2 * k, i) * lscale;
                    p.y = at(5 + 2 * k + 1, i) * lscale;
                }
                pts
            } else {
                // No landmark head in the model output: approximate a frontal template inside
                // the box so downstream alignment still has a usable, if coarse, estimate.
                approximate_landmarks(x1, y1, x2, y2)
            };

            faces.push(FaceDetection {
                x1,
                y1,
                x2,
                y2,
                landmarks,
                score,
            });
        }

        let mut faces = self.apply_nms(faces, self.nms_thr);
        faces.retain(|f| f.score >= self.score_thr);
        faces.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        faces.truncate(self.top_k.max(1));

        Ok(faces)
    }

    fn apply_nms(&self, mut boxes: Vec<FaceDetection>, iou_threshold: f32) -> Vec<FaceDetection> {
        if boxes.is_empty() {
            return boxes;
        }
        boxes.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());

        let mut keep = Vec::new();
        let mut indices: Vec<usize> = (0..boxes.len()).collect();

        while !indices.is_empty() {
            let i = indices[0];
            keep.push(boxes[i].clone());
            indices = indices[1..]
                .iter()
                .filter(|&&j| calculate_iou(&boxes[i], &boxes[j]) < iou_threshold)
                .copied()
                .collect();
        }

        keep
    }
}

fn calculate_iou(a: &FaceDetection, b: &FaceDetection) -> f32 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.area() + b.area() - intersection;
    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

fn approximate_landmarks(x1: f32, y1: f32, x2: f32, y2: f32) -> [Point2f; 5] {
    let w = x2 - x1;
    let h = y2 - y1;
    [
        Point2f::new(x1 + 0.30 * w, y1 + 0.38 * h), // left eye
        Point2f::new(x1 + 0.70 * w, y1 + 0.38 * h), // right eye
        Point2f::new(x1 + 0.50 * w, y1 + 0.55 * h), // nose
        Point2f::new(x1 + 0.35 * w, y1 + 0.78 * h), // left mouth
        Point2f::new(x1 + 0.65 * w, y1 + 0.78 * h), // right mouth
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let a = FaceDetection {
            x1: 0.0,
            y1: 0.0,
            x2: 10.0,
            y2: 10.0,
            landmarks: approximate_landmarks(0.0, 0.0, 10.0, 10.0),
            score: 0.9,
        };
        let b = a.clone();
        assert!((calculate_iou(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn approximate_landmarks_keep_eye_ordering() {
        let lm = approximate_landmarks(0.0, 0.0, 100.0, 100.0);
        assert!(lm[0].x < lm[1].x);
        assert!(lm[3].x < lm[4].x);
    }
}
