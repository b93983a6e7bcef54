use crate::error::{FaceAuthError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    pub camera: CameraConfig,
    pub models: ModelConfig,
    pub detector: DetectorConfig,
    #[serde(default)]
    pub aligner: AlignerConfig,
    #[serde(default)]
    pub quality: QualityConfig,
    pub embedder: EmbedderConfig,
    #[serde(default)]
    pub gallery: GalleryConfig,
    #[serde(default)]
    pub matcher: MatchConfig,
    #[serde(default)]
    pub auth_manager: AuthManagerConfig,
    #[serde(default)]
    pub fsm: FsmParamsConfig,
    #[serde(default)]
    pub door: DoorConfig,
    #[serde(default)]
    pub enrollment: EnrollmentConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CameraConfig {
    pub device_index: u32,
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_warmup_frames")]
    pub warmup_frames: u32,
    #[serde(default = "default_warmup_delay")]
    pub warmup_delay_ms: u64,
    #[serde(default = "default_max_read_failures")]
    pub max_read_failures: u32,
    #[serde(default = "default_reopen_backoff_ms")]
    pub reopen_backoff_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            width: 640,
            height: 480,
            warmup_frames: default_warmup_frames(),
            warmup_delay_ms: default_warmup_delay(),
            max_read_failures: default_max_read_failures(),
            reopen_backoff_ms: default_reopen_backoff_ms(),
        }
    }
}

fn default_warmup_frames() -> u32 {
    3
}
fn default_warmup_delay() -> u64 {
    50
}
fn default_max_read_failures() -> u32 {
    10
}
fn default_reopen_backoff_ms() -> u64 {
    300
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ModelConfig {
    pub detector_path: PathBuf,
    pub embedder_path: PathBuf,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            detector_path: PathBuf::from("models/detector.onnx"),
            embedder_path: PathBuf::from("models/embedder.onnx"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DetectorConfig {
    #[serde(default = "default_det_input")]
    pub input_width: u32,
    #[serde(default = "default_det_input")]
    pub input_height: u32,
    #[serde(default = "default_score_thr")]
    pub score_thr: f32,
    #[serde(default = "default_nms_thr")]
    pub nms_thr: f32,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            input_width: default_det_input(),
            input_height: default_det_input(),
            score_thr: default_score_thr(),
            nms_thr: default_nms_thr(),
            top_k: default_top_k(),
        }
    }
}

fn default_det_input() -> u32 {
    320
}
fn default_score_thr() -> f32 {
    0.6
}
fn default_nms_thr() -> f32 {
    0.3
}
fn default_top_k() -> usize {
    500
}

/// RANSAC partial-affine fit parameters for [`crate::aligner::LandmarkAligner`].
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AlignerConfig {
    #[serde(default = "default_output_size")]
    pub output_size: u32,
    #[serde(default = "default_ransac_thresh")]
    pub ransac_reproj_threshold: f32,
    #[serde(default = "default_ransac_iters")]
    pub ransac_iterations: u32,
    #[serde(default = "default_ransac_confidence")]
    pub ransac_confidence: f64,
}

impl Default for AlignerConfig {
    fn default() -> Self {
        Self {
            output_size: default_output_size(),
            ransac_reproj_threshold: default_ransac_thresh(),
            ransac_iterations: default_ransac_iters(),
            ransac_confidence: default_ransac_confidence(),
        }
    }
}

fn default_output_size() -> u32 {
    112
}
fn default_ransac_thresh() -> f32 {
    3.0
}
fn default_ransac_iters() -> u32 {
    2000
}
fn default_ransac_confidence() -> f64 {
    0.99
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct QualityConfig {
    #[serde(default = "default_min_box")]
    pub min_box_width: u32,
    #[serde(default = "default_min_box")]
    pub min_box_height: u32,
    #[serde(default = "default_blur_thr")]
    pub blur_variance_thr: f64,
    #[serde(default = "default_min_mean")]
    pub min_mean: f64,
    #[serde(default = "default_max_mean")]
    pub max_mean: f64,
    #[serde(default = "default_min_std")]
    pub min_std: f64,
    #[serde(default = "default_clip_ratio")]
    pub clip_ratio_max: f64,
    #[serde(default = "default_center_min_std")]
    pub center_patch_min_std: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_box_width: default_min_box(),
            min_box_height: default_min_box(),
            blur_variance_thr: default_blur_thr(),
            min_mean: default_min_mean(),
            max_mean: default_max_mean(),
            min_std: default_min_std(),
            clip_ratio_max: default_clip_ratio(),
            center_patch_min_std: default_center_min_std(),
        }
    }
}

fn default_min_box() -> u32 {
    96
}
fn default_blur_thr() -> f64 {
    25.0
}
fn default_min_mean() -> f64 {
    30.0
}
fn default_max_mean() -> f64 {
    230.0
}
fn default_min_std() -> f64 {
    12.0
}
fn default_clip_ratio() -> f64 {
    0.30
}
fn default_center_min_std() -> f64 {
    10.0
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EmbedderConfig {
    #[serde(default = "default_output_size")]
    pub input_size: u32,
    #[serde(default = "default_use_rgb")]
    pub use_rgb: bool,
    #[serde(default)]
    pub external_norm: bool,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            input_size: default_output_size(),
            use_rgb: default_use_rgb(),
            external_norm: false,
        }
    }
}

fn default_use_rgb() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GalleryConfig {
    #[serde(default = "default_gallery_path")]
    pub path: PathBuf,
    #[serde(default = "default_duplicate_threshold")]
    pub duplicate_threshold: f32,
}

impl Default for GalleryConfig {
    fn default() -> Self {
        Self {
            path: default_gallery_path(),
            duplicate_threshold: default_duplicate_threshold(),
        }
    }
}

fn default_gallery_path() -> PathBuf {
    PathBuf::from("gallery.json")
}
fn default_duplicate_threshold() -> f32 {
    0.85
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MatchConfig {
    #[serde(default = "default_accept_sim")]
    pub accept_sim: f32,
    #[serde(default = "default_strong_accept_sim")]
    pub strong_accept_sim: f32,
    #[serde(default = "default_min_top2_gap")]
    pub min_top2_gap: f32,
    #[serde(default = "default_min_best_only")]
    pub min_best_only: f32,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            accept_sim: default_accept_sim(),
            strong_accept_sim: default_strong_accept_sim(),
            min_top2_gap: default_min_top2_gap(),
            min_best_only: default_min_best_only(),
        }
    }
}

impl MatchConfig {
    /// The legacy single-threshold preset observed in an older path of the source system
    /// (see SPEC_FULL.md §9 Open Questions). Not used by default.
    pub fn legacy_preset() -> Self {
        Self {
            accept_sim: 0.83,
            strong_accept_sim: 0.90,
            min_top2_gap: default_min_top2_gap(),
            min_best_only: default_min_best_only(),
        }
    }
}

fn default_accept_sim() -> f32 {
    0.97
}
fn default_strong_accept_sim() -> f32 {
    0.98
}
fn default_min_top2_gap() -> f32 {
    0.04
}
fn default_min_best_only() -> f32 {
    0.40
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuthManagerConfig {
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    #[serde(default = "default_required_success")]
    pub required_success_count: u32,
}

impl Default for AuthManagerConfig {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            required_success_count: default_required_success(),
        }
    }
}

fn default_window_ms() -> u64 {
    30_000
}
fn default_required_success() -> u32 {
    5
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FsmParamsConfig {
    #[serde(default = "default_detect_enter")]
    pub detect_enter: f32,
    #[serde(default = "default_detect_exit")]
    pub detect_exit: f32,
    #[serde(default = "default_detect_min_dwell_ms")]
    pub detect_min_dwell_ms: u64,
    #[serde(default = "default_recog_enter")]
    pub recog_enter: f32,
    #[serde(default = "default_recog_exit")]
    pub recog_exit: f32,
    #[serde(default = "default_recog_timeout_ms")]
    pub recog_timeout_ms: u64,
    #[serde(default = "default_success_hold_ms")]
    pub success_hold_ms: u64,
    #[serde(default = "default_fail_cooldown_ms")]
    pub fail_cooldown_ms: u64,
    #[serde(default = "default_auth_thresh")]
    pub auth_thresh: u32,
    #[serde(default = "default_lockout_fails")]
    pub lockout_fails: u32,
    #[serde(default = "default_lockout_ms")]
    pub lockout_ms: u64,
}

impl Default for FsmParamsConfig {
    fn default() -> Self {
        Self {
            detect_enter: default_detect_enter(),
            detect_exit: default_detect_exit(),
            detect_min_dwell_ms: default_detect_min_dwell_ms(),
            recog_enter: default_recog_enter(),
            recog_exit: default_recog_exit(),
            recog_timeout_ms: default_recog_timeout_ms(),
            success_hold_ms: default_success_hold_ms(),
            fail_cooldown_ms: default_fail_cooldown_ms(),
            auth_thresh: default_auth_thresh(),
            lockout_fails: default_lockout_fails(),
            lockout_ms: default_lockout_ms(),
        }
    }
}

fn default_detect_enter() -> f32 {
    0.65
}
fn default_detect_exit() -> f32 {
    0.35
}
fn default_detect_min_dwell_ms() -> u64 {
    200
}
fn default_recog_enter() -> f32 {
    0.80
}
fn default_recog_exit() -> f32 {
    0.50
}
fn default_recog_timeout_ms() -> u64 {
    5000
}
fn default_success_hold_ms() -> u64 {
    800
}
fn default_fail_cooldown_ms() -> u64 {
    1000
}
fn default_auth_thresh() -> u32 {
    5
}
fn default_lockout_fails() -> u32 {
    5
}
fn default_lockout_ms() -> u64 {
    30_000
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DoorConfig {
    #[serde(default = "default_relay_pin")]
    pub relay_pin: u8,
    #[serde(default = "default_reed_pin")]
    pub reed_pin: u8,
    #[serde(default = "default_trig_pin")]
    pub ultrasonic_trig_pin: u8,
    #[serde(default = "default_echo_pin")]
    pub ultrasonic_echo_pin: u8,
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,
    #[serde(default = "default_hits")]
    pub hits: u32,
    #[serde(default = "default_open_timeout_ms")]
    pub open_timeout_ms: u64,
    #[serde(default = "default_max_unlock_ms")]
    pub max_unlock_ms: u64,
}

impl Default for DoorConfig {
    fn default() -> Self {
        Self {
            relay_pin: default_relay_pin(),
            reed_pin: default_reed_pin(),
            ultrasonic_trig_pin: default_trig_pin(),
            ultrasonic_echo_pin: default_echo_pin(),
            poll_ms: default_poll_ms(),
            hits: default_hits(),
            open_timeout_ms: default_open_timeout_ms(),
            max_unlock_ms: default_max_unlock_ms(),
        }
    }
}

fn default_relay_pin() -> u8 {
    2
}
fn default_reed_pin() -> u8 {
    13
}
fn default_trig_pin() -> u8 {
    4
}
fn default_echo_pin() -> u8 {
    5
}
fn default_poll_ms() -> u64 {
    50
}
fn default_hits() -> u32 {
    6
}
fn default_open_timeout_ms() -> u64 {
    5000
}
fn default_max_unlock_ms() -> u64 {
    10_000
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EnrollmentConfig {
    #[serde(default = "default_samples_required")]
    pub samples_required: usize,
    #[serde(default = "default_enrollment_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self {
            samples_required: default_samples_required(),
            timeout_ms: default_enrollment_timeout_ms(),
        }
    }
}

fn default_samples_required() -> usize {
    20
}
fn default_enrollment_timeout_ms() -> u64 {
    30_000
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PersistenceConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("doorlock.db")
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from_path(&PathBuf::from("/etc/doorlock/doorlock.toml"))
    }

    pub fn load_from_path(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Err(FaceAuthError::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }

        tracing::info!("loading config from {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| FaceAuthError::Config(format!("parse error: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.camera.width == 0 || self.camera.width > 4096 {
            return Err(FaceAuthError::Config(format!(
                "camera width must be between 1 and 4096, got {}",
                self.camera.width
            )));
        }
        if self.camera.height == 0 || self.camera.height > 4096 {
            return Err(FaceAuthError::Config(format!(
                "camera height must be between 1 and 4096, got {}",
                self.camera.height
            )));
        }
        if self.detector.score_thr < 0.0 || self.detector.score_thr > 1.0 {
            return Err(FaceAuthError::Config(format!(
                "detector score_thr must be in [0,1], got {}",
                self.detector.score_thr
            )));
        }
        if self.detector.input_width == 0 || self.detector.input_width > 4096 {
            return Err(FaceAuthError::Config(format!(
                "detector input width must be between 1 and 4096, got {}",
                self.detector.input_width
            )));
        }
        if self.embedder.input_size == 0 || self.embedder.input_size > 1024 {
            return Err(FaceAuthError::Config(format!(
                "embedder input size must be between 1 and 1024, got {}",
                self.embedder.input_size
            )));
        }
        if self.gallery.duplicate_threshold < -1.0 || self.gallery.duplicate_threshold > 1.0 {
            return Err(FaceAuthError::Config(format!(
                "gallery duplicate_threshold must be in [-1,1], got {}",
                self.gallery.duplicate_threshold
            )));
        }
        if self.matcher.accept_sim > self.matcher.strong_accept_sim {
            return Err(FaceAuthError::Config(
                "matcher accept_sim must not exceed strong_accept_sim".into(),
            ));
        }
        if self.auth_manager.required_success_count == 0 {
            return Err(FaceAuthError::Config(
                "auth_manager required_success_count must be >= 1".into(),
            ));
        }
        if self.enrollment.samples_required == 0 {
            return Err(FaceAuthError::Config(
                "enrollment samples_required must be >= 1".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_inconsistent_match_thresholds() {
        let mut cfg = Config::default();
        cfg.matcher.accept_sim = 0.99;
        cfg.matcher.strong_accept_sim = 0.9;
        assert!(cfg.validate().is_err());
    }
}
