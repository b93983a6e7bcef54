//! Thin wrapper over a [`ReedDriver`] exposing the door-closed sensor's domain operation.

use super::gpio::ReedDriver;

pub struct ReedSensor {
    driver: Box<dyn ReedDriver>,
}

impl ReedSensor {
    pub fn new(driver: Box<dyn ReedDriver>) -> Self {
        Self { driver }
    }

    pub fn is_closed(&self) -> bool {
        self.driver.is_closed()
    }
}
