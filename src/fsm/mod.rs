pub mod context;
pub mod hysteresis;
pub mod recognition_fsm;
pub mod state;
pub mod transitions;

pub use context::{FsmContext, FsmParams};
pub use recognition_fsm::RecognitionFsm;
pub use state::RecognitionState;
