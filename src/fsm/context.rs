//! Per-tick input snapshot and tunable thresholds for [`super::recognition_fsm::RecognitionFsm`].

use crate::config::Config;

/// Read-only-by-convention snapshot the recognition service fills in before each tick.
#[derive(Debug, Clone, Default)]
pub struct FsmContext {
    pub detect_score: f64,
    pub recog_confidence: f64,
    pub is_duplicate: bool,
    pub register_requested: bool,
    pub liveness_ok: bool,
    pub door_opened: bool,
    pub fail_count: u32,
    pub face_present: bool,
    pub timeout: bool,
    /// Consecutive authenticated-match streak from the [`crate::auth_manager::AuthManager`].
    pub auth_streak: u32,
    /// Whether [`crate::auth_manager::AuthManager::should_allow_entry`] currently passes.
    pub allow_entry: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct FsmParams {
    pub detect_enter: f64,
    pub detect_exit: f64,
    pub detect_min_dwell_ms: u64,
    pub recog_enter: f64,
    pub recog_exit: f64,
    pub recog_timeout_ms: u64,
    pub success_hold_ms: u64,
    pub fail_cooldown_ms: u64,
    pub auth_thresh: u32,
    pub lockout_fails: u32,
    pub lockout_ms: u64,
}

impl FsmParams {
    pub fn from_config(config: &Config) -> Self {
        Self {
            detect_enter: config.fsm.detect_enter as f64,
            detect_exit: config.fsm.detect_exit as f64,
            detect_min_dwell_ms: config.fsm.detect_min_dwell_ms,
            recog_enter: config.fsm.recog_enter as f64,
            recog_exit: config.fsm.recog_exit as f64,
            recog_timeout_ms: config.fsm.recog_timeout_ms,
            success_hold_ms: config.fsm.success_hold_ms,
            fail_cooldown_ms: config.fsm.fail_cooldown_ms,
            auth_thresh: config.fsm.auth_thresh,
            lockout_fails: config.fsm.lockout_fails,
            lockout_ms: config.fsm.lockout_ms,
        }
    }
}
