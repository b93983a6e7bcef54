//! The recognition state sum type and the per-state hysteresis gates a couple of its variants
//! carry (Detecting and Recognizing confirm their driving score over a short window before the
//! transition table is allowed to act on it).

use super::context::FsmParams;
use super::hysteresis::HysteresisGate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecognitionState {
    Idle,
    Detecting,
    Recognizing,
    Registering,
    DuplicateFace,
    AuthSuccess,
    AuthFail,
    DoorOpen,
    LockedOut,
}

impl RecognitionState {
    pub fn all() -> [RecognitionState; 9] {
        [
            RecognitionState::Idle,
            RecognitionState::Detecting,
            RecognitionState::Recognizing,
            RecognitionState::Registering,
            RecognitionState::DuplicateFace,
            RecognitionState::AuthSuccess,
            RecognitionState::AuthFail,
            RecognitionState::DoorOpen,
            RecognitionState::LockedOut,
        ]
    }
}

/// Mutable per-state scratch data, keyed implicitly by which field is touched for the current
/// state (only Detecting/Recognizing carry a gate; the rest are stateless).
pub struct StateGates {
    pub detecting: HysteresisGate,
    pub recognizing: HysteresisGate,
}

impl StateGates {
    pub fn new(params: &FsmParams) -> Self {
        Self {
            detecting: HysteresisGate::new(params.detect_enter, params.detect_exit, 3, 5),
            recognizing: HysteresisGate::new(params.recog_enter, params.recog_exit, 2, 4),
        }
    }

    pub fn on_enter(&mut self, state: RecognitionState) {
        match state {
            RecognitionState::Detecting => self.detecting.reset(false),
            RecognitionState::Recognizing => self.recognizing.reset(false),
            _ => {}
        }
    }

    pub fn on_update(&mut self, state: RecognitionState, ctx: &super::context::FsmContext) {
        match state {
            RecognitionState::Detecting => {
                self.detecting.feed(ctx.detect_score);
            }
            RecognitionState::Recognizing => {
                self.recognizing.feed(ctx.recog_confidence);
            }
            _ => {}
        }
    }
}
