//! The transition table itself, expressed as data rather than scattered control flow: each
//! transition is a `(from, to, guard, min_dwell_ms)` tuple, evaluated in table order on every
//! tick. Kept in its own module so the table can be read top-to-bottom like a spec.

use super::context::{FsmContext, FsmParams};
use super::state::RecognitionState;

pub struct Transition {
    pub name: &'static str,
    pub from: RecognitionState,
    pub to: RecognitionState,
    pub guard: Box<dyn Fn(&FsmContext) -> bool + Send + Sync>,
    pub min_dwell_ms: u64,
}

pub fn build_transitions(p: FsmParams) -> Vec<Transition> {
    use RecognitionState::*;

    vec![
        Transition {
            name: "idle->detecting",
            from: Idle,
            to: Detecting,
            guard: Box::new(move |c| c.face_present && c.detect_score >= p.detect_enter),
            min_dwell_ms: 100,
        },
        Transition {
            name: "detecting->idle",
            from: Detecting,
            to: Idle,
            guard: Box::new(move |c| !c.face_present || c.detect_score <= p.detect_exit),
            min_dwell_ms: p.detect_min_dwell_ms,
        },
        Transition {
            name: "detecting->recognizing",
            from: Detecting,
            to: Recognizing,
            guard: Box::new(move |c| c.face_present && c.detect_score >= p.detect_enter * 0.95),
            min_dwell_ms: p.detect_min_dwell_ms,
        },
        Transition {
            name: "recognizing->auth_success",
            from: Recognizing,
            to: AuthSuccess,
            guard: Box::new(move |c| c.liveness_ok && c.recog_confidence >= p.recog_enter),
            min_dwell_ms: 150,
        },
        Transition {
            name: "recognizing->auth_fail",
            from: Recognizing,
            to: AuthFail,
            guard: Box::new(move |c| {
                c.timeout || !c.liveness_ok || (c.recog_confidence <= p.recog_exit && !c.face_present)
            }),
            min_dwell_ms: 200,
        },
        Transition {
            name: "recognizing->duplicate_face",
            from: Recognizing,
            to: DuplicateFace,
            guard: Box::new(|c| c.is_duplicate),
            min_dwell_ms: 100,
        },
        Transition {
            name: "auth_success->door_open",
            from: AuthSuccess,
            to: DoorOpen,
            guard: Box::new(move |c| {
                c.detect_score >= 0.8
                    && c.liveness_ok
                    && c.recog_confidence >= p.recog_enter
                    && c.auth_streak >= p.auth_thresh
                    && c.allow_entry
            }),
            min_dwell_ms: 150,
        },
        Transition {
            name: "door_open->idle",
            from: DoorOpen,
            to: Idle,
            guard: Box::new(|c| !c.door_opened),
            min_dwell_ms: 200,
        },
        Transition {
            name: "auth_fail->locked_out",
            from: AuthFail,
            to: LockedOut,
            guard: Box::new(move |c| c.fail_count >= p.lockout_fails),
            min_dwell_ms: 50,
        },
        Transition {
            name: "auth_fail->idle",
            from: AuthFail,
            to: Idle,
            guard: Box::new(|_| true),
            min_dwell_ms: p.fail_cooldown_ms,
        },
        Transition {
            name: "locked_out->idle",
            from: LockedOut,
            to: Idle,
            guard: Box::new(|c| c.timeout),
            min_dwell_ms: 0,
        },
        Transition {
            name: "idle->registering",
            from: Idle,
            to: Registering,
            guard: Box::new(|c| c.register_requested),
            min_dwell_ms: 0,
        },
        Transition {
            name: "registering->idle",
            from: Registering,
            to: Idle,
            guard: Box::new(|c| !c.register_requested),
            min_dwell_ms: 0,
        },
    ]
}
