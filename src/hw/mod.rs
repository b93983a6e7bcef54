pub mod door;
pub mod gpio;
pub mod reed;
pub mod ultrasonic;
pub mod unlock_supervisor;

pub use door::DoorController;
pub use gpio::{NullGpio, ReedDriver, RelayDriver};
pub use reed::ReedSensor;
pub use ultrasonic::UltrasonicSensor;
pub use unlock_supervisor::{UnlockParams, UnlockSupervisor};
