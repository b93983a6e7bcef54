//! Composition root for the per-frame recognition pipeline. Owns every stateful piece (camera
//! feed, algorithmic stages, gallery, FSM, hardware) and exposes a single `tick` entry point plus
//! a synchronous command interface for an external transport.

use crate::aligner::LandmarkAligner;
use crate::auth_manager::AuthManager;
use crate::config::Config;
use crate::detector::FaceDetector;
use crate::embedder::Embedder;
use crate::enrollment::{EnrollmentOutcome, EnrollmentPipeline};
use crate::error::Result;
use crate::events::{EventBus, RecognitionEvent};
use crate::fsm::{FsmContext, FsmParams, RecognitionFsm, RecognitionState};
use crate::frame_source::FrameSource;
use crate::gallery::Gallery;
use crate::hw::{DoorController, ReedSensor, UnlockParams, UnlockSupervisor};
use crate::matcher::{best_match_top2, decide, DecisionParams};
use crate::persistence::{LogLevel, PersistenceLog};
use crate::quality::QualityGate;
use crate::types::Decision;
use std::sync::{Arc, Mutex};

/// Commands an external wireless transport can issue against the running service (spec §4.13).
/// Only the subset the core owns is modeled; everything else is rejected with `Unsupported`.
#[derive(Debug, Clone)]
pub enum Command {
    Auth,
    Users,
    Open,
    Lock,
    RetRecog,
    Register { name: String },
    CancelRegister,
    Unsupported,
}

#[derive(Debug, Clone)]
pub enum Response {
    Auth { state: String, streak: u32, allow_entry: bool },
    Users { items: Vec<(u64, String)> },
    Ack,
    RetRecog(Option<RecognitionSnapshot>),
    Unsupported,
    Error(String),
}

#[derive(Debug, Clone)]
pub struct RecognitionSnapshot {
    pub name: Option<String>,
    pub similarity: f32,
    pub decision: Decision,
}

pub struct RecognitionService {
    config: Config,
    frame_source: FrameSource,
    last_seq: u64,

    detector: FaceDetector,
    aligner: LandmarkAligner,
    quality: QualityGate,
    embedder: Embedder,
    gallery: Gallery,
    decision_params: DecisionParams,

    auth_manager: AuthManager,
    fsm: RecognitionFsm,
    enrollment: EnrollmentPipeline,
    register_requested: bool,
    fail_count: u32,

    events: EventBus,
    persistence: Option<PersistenceLog>,
    last_result: Option<RecognitionSnapshot>,
    pending_duplicate: Option<(u64, String, f32)>,

    door: Arc<Mutex<DoorController>>,
    reed: Arc<ReedSensor>,
    unlock_supervisor: UnlockSupervisor,
}

impl RecognitionService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        frame_source: FrameSource,
        door: Arc<Mutex<DoorController>>,
        reed: Arc<ReedSensor>,
        events: EventBus,
        persistence: Option<PersistenceLog>,
    ) -> Result<Self> {
        let detector = FaceDetector::new(&config)?;
        let aligner = LandmarkAligner::new(&config);
        let quality = QualityGate::new(&config);
        let embedder = Embedder::new(&config)?;
        let gallery = Gallery::load(&config)?;
        let decision_params = DecisionParams::from_config(&config);
        let auth_manager = AuthManager::new(&config);
        let fsm = RecognitionFsm::new(FsmParams::from_config(&config));
        let enrollment = EnrollmentPipeline::new(&config);
        let unlock_params = UnlockParams::from_config(&config);
        let unlock_supervisor = UnlockSupervisor::new(Arc::clone(&door), Arc::clone(&reed), unlock_params);

        Ok(Self {
            config,
            frame_source,
            last_seq: 0,
            detector,
            aligner,
            quality,
            embedder,
            gallery,
            decision_params,
            auth_manager,
            fsm,
            enrollment,
            register_requested: false,
            fail_count: 0,
            events,
            persistence,
            last_result: None,
            pending_duplicate: None,
            door,
            reed,
            unlock_supervisor,
        })
    }

    pub fn start(&mut self) {
        self.fsm.start();
    }

    pub fn current_state(&self) -> RecognitionState {
        self.fsm.current()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs one pipeline tick. No-op (returns `false`) if the latest frame hasn't changed since
    /// the last tick, so a ~30Hz poller can call this unconditionally without doing redundant
    /// inference on a stale frame.
    pub fn tick(&mut self) -> bool {
        let Some((seq, frame)) = self.frame_source.latest() else {
            return false;
        };
        if seq == self.last_seq {
            return false;
        }
        self.last_seq = seq;

        let current = self.fsm.current();

        // The enrollment watchdog is independent of FsmContext::timeout (spec §4.9 reserves that
        // for the Recognizing/LockedOut dwell checks below): it just drops register_requested,
        // which the registering->idle guard already reacts to.
        if current == RecognitionState::Registering && self.enrollment.is_timed_out() {
            self.enrollment.cancel();
            self.register_requested = false;
        }

        let mut ctx = FsmContext {
            register_requested: self.register_requested,
            door_opened: self.unlock_supervisor.is_running(),
            fail_count: self.fail_count,
            timeout: self.fsm.is_state_timed_out(),
            auth_streak: self.auth_manager.streak_len(),
            allow_entry: false,
            ..FsmContext::default()
        };

        let detection = self.detector.detect_best(&frame).ok().flatten();
        ctx.face_present = detection.is_some();
        ctx.detect_score = detection.as_ref().map(|d| d.score as f64).unwrap_or(0.0);

        if current == RecognitionState::Registering {
            self.run_enrollment_step(&frame, detection.as_ref());
        } else if matches!(current, RecognitionState::Recognizing | RecognitionState::Detecting) {
            if let Some(det) = detection.as_ref() {
                self.run_recognition_step(&frame, det, &mut ctx);
            }
        }

        let prev_state = current;
        if let Some(new_state) = self.fsm.tick(&mut ctx) {
            self.on_state_entered(prev_state, new_state);
        }

        true
    }

    fn run_recognition_step(
        &mut self,
        frame: &image::DynamicImage,
        detection: &crate::types::FaceDetection,
        ctx: &mut FsmContext,
    ) {
        let Some(aligned) = self.aligner.align(frame, detection) else {
            return;
        };

        ctx.liveness_ok = self.quality.check(frame, detection).is_ok();
        if !ctx.liveness_ok {
            return;
        }

        let Ok(embedding) = self.embedder.extract(&aligned) else {
            return;
        };

        // A register request racing against a face that's already enrolled (re-registering an
        // existing user, or colliding with someone else's in-flight enrollment name) routes to
        // DuplicateFace instead of continuing on to authentication.
        if self.register_requested {
            if let Some(dup) = self.gallery.find_duplicate(&embedding) {
                self.pending_duplicate = Some(dup);
                ctx.is_duplicate = true;
            }
        }

        let top2 = best_match_top2(&embedding, self.gallery.entries());
        ctx.recog_confidence = top2.best_sim as f64;
        let decision = decide(&top2, &self.decision_params);

        let label = top2
            .best_idx
            .and_then(|i| self.gallery.entries().get(i))
            .map(|e| e.name.clone());

        self.last_result = Some(RecognitionSnapshot {
            name: label.clone(),
            similarity: top2.best_sim,
            decision,
        });
        self.events.publish(RecognitionEvent::RecognitionResult {
            name: label.clone(),
            similarity: top2.best_sim,
            decision,
        });

        match decision {
            Decision::Accept | Decision::StrongAccept => {
                self.auth_manager.on_success();
            }
            Decision::Reject | Decision::Tentative => {
                self.auth_manager.on_failure();
            }
        }

        let allowed_label = label.unwrap_or_default();
        ctx.allow_entry = self.auth_manager.should_allow_entry(&allowed_label);
    }

    fn run_enrollment_step(&mut self, frame: &image::DynamicImage, _detection: Option<&crate::types::FaceDetection>) {
        if !self.enrollment.is_active() {
            return;
        }

        match self.enrollment.feed_frame(
            frame,
            &self.detector,
            &self.aligner,
            &self.quality,
            &self.embedder,
            &self.gallery,
        ) {
            Ok(EnrollmentOutcome::SampleAccepted { collected, required }) => {
                self.events.publish(RecognitionEvent::EnrollmentProgress {
                    name: self.enrollment.name().to_string(),
                    samples_collected: collected,
                    samples_required: required,
                });
                if self.enrollment.is_ready_to_finalize() {
                    self.finalize_enrollment();
                }
            }
            Ok(EnrollmentOutcome::DuplicateDetected { existing_id, existing_name, similarity }) => {
                self.events.publish(RecognitionEvent::DuplicateFace {
                    existing_id,
                    existing_name,
                    similarity,
                });
                self.enrollment.cancel();
                self.register_requested = false;
            }
            Ok(EnrollmentOutcome::NoUsableFace(_)) => {}
            Err(e) => {
                tracing::warn!("enrollment frame failed: {e}");
            }
        }
    }

    fn finalize_enrollment(&mut self) {
        match self.enrollment.finalize(&mut self.gallery) {
            Ok(Some((id, name))) => {
                self.events.publish(RecognitionEvent::EnrollmentCompleted { id, name });
                self.register_requested = false;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("enrollment finalize failed, discarding scratch: {e}");
                self.enrollment.cancel();
                self.register_requested = false;
                self.events.publish(RecognitionEvent::ForceAbort {
                    reason: format!("persistence failure: {e}"),
                });
            }
        }
    }

    /// Begins a new enrollment. Only one may be in flight; callers must check `is_active` first.
    pub fn begin_enrollment(&mut self, name: String) {
        self.enrollment.begin(name);
        self.register_requested = true;
    }

    fn on_state_entered(&mut self, prev: RecognitionState, new: RecognitionState) {
        self.events.publish(RecognitionEvent::StateChanged(new));
        if let Some(log) = &self.persistence {
            log.log_system(LogLevel::Info, "fsm", &format!("{prev:?} -> {new:?}"), None);
        }

        match new {
            RecognitionState::DoorOpen => {
                self.unlock_supervisor.start();
                self.events.publish(RecognitionEvent::DoorOpened);
                if let Some(result) = &self.last_result {
                    let name = result.name.clone().unwrap_or_else(|| "unknown".to_string());
                    self.events.publish(RecognitionEvent::AuthSuccess { name: name.clone() });
                    if let Some(log) = &self.persistence {
                        log.log_auth(&name, "door opened", None);
                    }
                }
            }
            RecognitionState::AuthFail => {
                self.fail_count += 1;
                let reason = "recognition failed".to_string();
                self.events.publish(RecognitionEvent::AuthFail { reason: reason.clone() });
                if let Some(log) = &self.persistence {
                    log.log_system(LogLevel::Warn, "auth", &reason, None);
                }
            }
            RecognitionState::LockedOut => {
                self.fail_count = 0;
            }
            RecognitionState::DuplicateFace => {
                if let Some((existing_id, existing_name, similarity)) = self.pending_duplicate.take() {
                    self.events.publish(RecognitionEvent::DuplicateFace {
                        existing_id,
                        existing_name,
                        similarity,
                    });
                }
                self.enrollment.cancel();
                self.register_requested = false;
            }
            RecognitionState::Idle => {
                self.enrollment.cancel();
                self.register_requested = false;
            }
            _ => {}
        }
    }

    pub fn handle_command(&mut self, command: Command) -> Response {
        match command {
            Command::Auth => Response::Auth {
                state: format!("{:?}", self.fsm.current()),
                streak: self.auth_manager.streak_len(),
                allow_entry: self.auth_manager.is_auth_valid(),
            },
            Command::Users => Response::Users {
                items: self.gallery.entries().iter().map(|e| (e.id, e.name.clone())).collect(),
            },
            Command::Open => {
                if self.unlock_supervisor.is_running() {
                    Response::Error("unlock cycle already in flight".into())
                } else {
                    self.unlock_supervisor.start();
                    Response::Ack
                }
            }
            Command::Lock => {
                self.unlock_supervisor.stop();
                Response::Ack
            }
            Command::RetRecog => Response::RetRecog(self.last_result.clone()),
            Command::Register { name } => {
                if self.enrollment.is_active() {
                    Response::Error("enrollment already in progress".into())
                } else {
                    self.begin_enrollment(name);
                    Response::Ack
                }
            }
            Command::CancelRegister => {
                self.enrollment.cancel();
                self.register_requested = false;
                Response::Ack
            }
            Command::Unsupported => Response::Unsupported,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::{DoorController, NullGpio, ReedSensor};

    // RecognitionService::new() requires real ONNX model assets on disk, so these tests only
    // exercise the pieces that don't need a live service; end-to-end behavior is covered
    // off-device with real assets.

    #[test]
    fn command_response_shapes() {
        let resp = Response::Users { items: vec![(1, "alice".into())] };
        match resp {
            Response::Users { items } => assert_eq!(items.len(), 1),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn door_and_reed_fixtures_construct() {
        let door = Arc::new(Mutex::new(DoorController::new(Box::new(NullGpio::new("relay")))));
        let reed = Arc::new(ReedSensor::new(Box::new(NullGpio::new("reed"))));
        assert!(reed.is_closed());
        let _ = door.lock().unwrap().lock();
    }
}
