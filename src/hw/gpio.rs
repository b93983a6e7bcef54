//! GPIO abstraction. Production builds (the `hardware` feature) drive real pins via `rppal`;
//! everything else runs against [`NullGpio`], which logs and always reports "closed" so the
//! rest of the stack can be exercised off-device.

use crate::error::Result;

pub trait RelayDriver: Send + Sync {
    /// `true` = energize the relay (unlocked), `false` = de-energize (locked).
    fn set_unlocked(&mut self, on: bool) -> Result<()>;
}

pub trait ReedDriver: Send + Sync {
    /// `true` when the magnet is detected (door closed).
    fn is_closed(&self) -> bool;
}

pub struct NullGpio {
    name: &'static str,
    closed: std::sync::atomic::AtomicBool,
}

impl NullGpio {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            closed: std::sync::atomic::AtomicBool::new(true),
        }
    }
}

impl RelayDriver for NullGpio {
    fn set_unlocked(&mut self, on: bool) -> Result<()> {
        tracing::debug!(relay = self.name, unlocked = on, "null gpio relay write");
        self.closed
            .store(!on, std::sync::atomic::Ordering::Release);
        Ok(())
    }
}

impl ReedDriver for NullGpio {
    fn is_closed(&self) -> bool {
        self.closed.load(std::sync::atomic::Ordering::Acquire)
    }
}

#[cfg(feature = "hardware")]
pub mod rppal_gpio {
    use super::{ReedDriver, RelayDriver};
    use crate::error::{FaceAuthError, Result};
    use rppal::gpio::{Gpio, InputPin, Level, OutputPin, PullUpDown};

    pub struct RppalRelay {
        pin: OutputPin,
    }

    impl RppalRelay {
        pub fn new(pin_number: u8) -> Result<Self> {
            let gpio = Gpio::new()
                .map_err(|e| FaceAuthError::Hardware(format!("gpio init failed: {e}")))?;
            let pin = gpio
                .get(pin_number)
                .map_err(|e| FaceAuthError::Hardware(format!("relay pin {pin_number}: {e}")))?
                .into_output();
            Ok(Self { pin })
        }
    }

    impl RelayDriver for RppalRelay {
        fn set_unlocked(&mut self, on: bool) -> Result<()> {
            if on {
                self.pin.set_high();
            } else {
                self.pin.set_low();
            }
            Ok(())
        }
    }

    pub struct RppalReed {
        pin: InputPin,
    }

    impl RppalReed {
        pub fn new(pin_number: u8) -> Result<Self> {
            let gpio = Gpio::new()
                .map_err(|e| FaceAuthError::Hardware(format!("gpio init failed: {e}")))?;
            let mut pin = gpio
                .get(pin_number)
                .map_err(|e| FaceAuthError::Hardware(format!("reed pin {pin_number}: {e}")))?
                .into_input();
            pin.set_pullupdown(PullUpDown::PullUp);
            Ok(Self { pin })
        }
    }

    impl ReedDriver for RppalReed {
        fn is_closed(&self) -> bool {
            self.pin.read() == Level::Low
        }
    }
}
