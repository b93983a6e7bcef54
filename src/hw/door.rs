//! Thin wrapper over a [`RelayDriver`] exposing the door lock's domain operations.

use super::gpio::RelayDriver;
use crate::error::Result;

pub struct DoorController {
    relay: Box<dyn RelayDriver>,
}

impl DoorController {
    pub fn new(relay: Box<dyn RelayDriver>) -> Self {
        Self { relay }
    }

    pub fn set_unlocked(&mut self, on: bool) -> Result<()> {
        self.relay.set_unlocked(on)
    }

    pub fn lock(&mut self) -> Result<()> {
        self.set_unlocked(false)
    }

    pub fn unlock(&mut self) -> Result<()> {
        self.set_unlocked(true)
    }
}
