//! Polled (not event-driven) recognition state machine: call [`RecognitionFsm::tick`] at a fixed
//! rate (the service drives this at ~30Hz) with a freshly filled [`FsmContext`]. Replaces a
//! signal/slot timer callback with an explicit method call so the machine has no hidden event
//! loop dependency and its transitions emit plain [`crate::events::RecognitionEvent`]s instead.

use super::context::{FsmContext, FsmParams};
use super::state::{RecognitionState, StateGates};
use super::transitions::{build_transitions, Transition};
use std::time::Instant;

pub struct RecognitionFsm {
    current: RecognitionState,
    enter_time: Instant,
    gates: StateGates,
    transitions: Vec<Transition>,
    last_changed: Option<RecognitionState>,
    params: FsmParams,
}

impl RecognitionFsm {
    pub fn new(params: FsmParams) -> Self {
        Self {
            current: RecognitionState::Idle,
            enter_time: Instant::now(),
            gates: StateGates::new(&params),
            transitions: build_transitions(params),
            last_changed: None,
            params,
        }
    }

    pub fn current(&self) -> RecognitionState {
        self.current
    }

    /// Milliseconds spent in the current state as of now.
    pub fn time_in_state_ms(&self) -> u64 {
        self.enter_time.elapsed().as_millis() as u64
    }

    /// Per spec §4.9: `(Recognizing ∧ dwell ≥ recogTimeoutMs) ∨ (LockedOut ∧ dwell ≥ lockoutMs)`.
    /// The caller feeds the result back into `FsmContext::timeout` before the next `tick`.
    pub fn is_state_timed_out(&self) -> bool {
        let dwell_ms = self.time_in_state_ms();
        match self.current {
            RecognitionState::Recognizing => dwell_ms >= self.params.recog_timeout_ms,
            RecognitionState::LockedOut => dwell_ms >= self.params.lockout_ms,
            _ => false,
        }
    }

    pub fn start(&mut self) {
        self.current = RecognitionState::Idle;
        self.enter_time = Instant::now();
        self.gates.on_enter(self.current);
        self.last_changed = Some(self.current);
    }

    /// Advances the machine one step: feeds the context into the current state's hysteresis
    /// gate (if any), then evaluates transitions out of the current state in table order,
    /// skipping any whose minimum dwell time hasn't elapsed. At most one transition fires per
    /// tick. Returns the newly entered state if a transition fired this tick, `None` otherwise.
    pub fn tick(&mut self, ctx: &mut FsmContext) -> Option<RecognitionState> {
        self.gates.on_update(self.current, ctx);

        let dwell_ms = self.enter_time.elapsed().as_millis() as u64;

        for t in &self.transitions {
            if t.from != self.current {
                continue;
            }
            if dwell_ms < t.min_dwell_ms {
                continue;
            }
            if !(t.guard)(ctx) {
                continue;
            }

            let leaves_recognizing_not_to_success =
                t.from == RecognitionState::Recognizing && t.to != RecognitionState::AuthSuccess;
            let enters_reset_state = matches!(
                t.to,
                RecognitionState::Detecting | RecognitionState::Recognizing | RecognitionState::AuthFail
            );

            self.current = t.to;
            self.enter_time = Instant::now();

            if enters_reset_state || leaves_recognizing_not_to_success {
                ctx.auth_streak = 0;
                ctx.allow_entry = false;
                ctx.timeout = false;
            }

            self.gates.on_enter(self.current);
            self.last_changed = Some(self.current);
            return Some(self.current);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn ctx() -> FsmContext {
        FsmContext::default()
    }

    #[test]
    fn idle_to_detecting_requires_sustained_face_presence() {
        let params = FsmParams::from_config(&Config::default());
        let mut fsm = RecognitionFsm::new(params);
        fsm.start();
        assert_eq!(fsm.current(), RecognitionState::Idle);

        let mut c = ctx();
        c.face_present = true;
        c.detect_score = 0.9;

        assert!(fsm.tick(&mut c).is_none()); // min dwell not elapsed yet (100ms)
    }

    #[test]
    fn register_requested_moves_idle_to_registering_immediately() {
        let params = FsmParams::from_config(&Config::default());
        let mut fsm = RecognitionFsm::new(params);
        fsm.start();

        let mut c = ctx();
        c.register_requested = true;
        let next = fsm.tick(&mut c);
        assert_eq!(next, Some(RecognitionState::Registering));
    }

    #[test]
    fn is_state_timed_out_is_false_outside_recognizing_and_locked_out() {
        let params = FsmParams::from_config(&Config::default());
        let mut fsm = RecognitionFsm::new(params);
        fsm.start();
        assert_eq!(fsm.current(), RecognitionState::Idle);
        assert!(!fsm.is_state_timed_out());
    }

    #[test]
    fn auth_fail_to_locked_out_needs_fail_count_threshold() {
        let params = FsmParams::from_config(&Config::default());
        let mut fsm = RecognitionFsm::new(params);
        fsm.start();
        // Force into AuthFail via direct field manipulation isn't possible; exercise the guard
        // logic through the transition table directly instead.
        let transitions = super::build_transitions(params);
        let t = transitions
            .iter()
            .find(|t| t.name == "auth_fail->locked_out")
            .unwrap();
        let mut c = ctx();
        c.fail_count = params.lockout_fails - 1;
        assert!(!(t.guard)(&c));
        c.fail_count = params.lockout_fails;
        assert!((t.guard)(&c));
    }
}
