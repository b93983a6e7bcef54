//! Two-phase unlock sequencing: energize the relay, wait for the door to actually be opened
//! (debounced reed transitions), then wait for it to be closed again before re-locking. Runs on
//! a dedicated thread so the recognition tick loop never blocks on door hardware.

use super::door::DoorController;
use super::reed::ReedSensor;
use crate::config::Config;
use crate::types::DoorLifecycle;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct UnlockParams {
    pub poll_ms: u64,
    pub hits: u32,
    pub open_timeout_ms: u64,
    pub max_unlock_ms: u64,
}

impl UnlockParams {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_ms: config.door.poll_ms,
            hits: config.door.hits,
            open_timeout_ms: config.door.open_timeout_ms,
            max_unlock_ms: config.door.max_unlock_ms,
        }
    }
}

fn lifecycle_to_code(l: DoorLifecycle) -> u8 {
    match l {
        DoorLifecycle::Locked => 0,
        DoorLifecycle::WaitOpenConfirm => 1,
        DoorLifecycle::WaitCloseConfirm => 2,
    }
}

fn code_to_lifecycle(c: u8) -> DoorLifecycle {
    match c {
        1 => DoorLifecycle::WaitOpenConfirm,
        2 => DoorLifecycle::WaitCloseConfirm,
        _ => DoorLifecycle::Locked,
    }
}

pub struct UnlockSupervisor {
    door: Arc<Mutex<DoorController>>,
    reed: Arc<ReedSensor>,
    params: UnlockParams,
    running: Arc<AtomicBool>,
    lifecycle: Arc<AtomicU8>,
    handle: Option<JoinHandle<()>>,
}

impl UnlockSupervisor {
    pub fn new(door: Arc<Mutex<DoorController>>, reed: Arc<ReedSensor>, params: UnlockParams) -> Self {
        Self {
            door,
            reed,
            params,
            running: Arc::new(AtomicBool::new(false)),
            lifecycle: Arc::new(AtomicU8::new(lifecycle_to_code(DoorLifecycle::Locked))),
            handle: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn lifecycle(&self) -> DoorLifecycle {
        code_to_lifecycle(self.lifecycle.load(Ordering::Acquire))
    }

    /// Starts the unlock sequence if not already running. No-op otherwise.
    pub fn start(&mut self) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }

        let door = Arc::clone(&self.door);
        let reed = Arc::clone(&self.reed);
        let params = self.params;
        let running = Arc::clone(&self.running);
        let lifecycle = Arc::clone(&self.lifecycle);

        let handle = std::thread::spawn(move || {
            if let Ok(mut d) = door.lock() {
                let _ = d.set_unlocked(true);
            }
            lifecycle.store(lifecycle_to_code(DoorLifecycle::WaitOpenConfirm), Ordering::Release);

            let proceed = wait_open_phase(&reed, &params, &running);
            if !proceed {
                if let Ok(mut d) = door.lock() {
                    let _ = d.set_unlocked(false);
                }
                lifecycle.store(lifecycle_to_code(DoorLifecycle::Locked), Ordering::Release);
                running.store(false, Ordering::Release);
                return;
            }

            lifecycle.store(lifecycle_to_code(DoorLifecycle::WaitCloseConfirm), Ordering::Release);
            wait_close_phase(&reed, &params, &running);

            if let Ok(mut d) = door.lock() {
                let _ = d.set_unlocked(false);
            }
            lifecycle.store(lifecycle_to_code(DoorLifecycle::Locked), Ordering::Release);
            running.store(false, Ordering::Release);
        });

        self.handle = Some(handle);
    }

    /// Forces an immediate stop and re-lock, abandoning whichever phase is in progress.
    pub fn stop(&mut self) {
        if self.running.swap(false, Ordering::AcqRel) {
            if let Ok(mut d) = self.door.lock() {
                let _ = d.set_unlocked(false);
            }
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        self.lifecycle
            .store(lifecycle_to_code(DoorLifecycle::Locked), Ordering::Release);
    }
}

/// Waits for a door-open transition (the reed sensor reporting "open" for `hits` consecutive
/// polls after having previously reported "closed", guarding against a floating sensor that
/// never reported closed in the first place). Returns `false` on timeout or external stop.
fn wait_open_phase(reed: &ReedSensor, params: &UnlockParams, running: &AtomicBool) -> bool {
    let mut open_hits = 0u32;
    let mut saw_closed = false;
    let t0 = Instant::now();

    while running.load(Ordering::Acquire) {
        let is_closed = reed.is_closed();

        if is_closed {
            saw_closed = true;
            open_hits = 0;
        } else if saw_closed {
            open_hits += 1;
            if open_hits >= params.hits {
                return true;
            }
        } else {
            open_hits = 0;
        }

        let elapsed = t0.elapsed();
        if elapsed >= Duration::from_millis(params.open_timeout_ms) {
            tracing::debug!("door open timeout expired, locking");
            return false;
        }
        if elapsed >= Duration::from_millis(params.max_unlock_ms) {
            tracing::debug!("door max unlock time expired, locking");
            return false;
        }

        std::thread::sleep(Duration::from_millis(params.poll_ms));
    }

    false
}

/// Waits for a door-close confirmation (`hits` consecutive closed polls), up to `max_unlock_ms`.
fn wait_close_phase(reed: &ReedSensor, params: &UnlockParams, running: &AtomicBool) {
    let mut close_hits = 0u32;
    let t1 = Instant::now();

    while running.load(Ordering::Acquire) {
        if reed.is_closed() {
            close_hits += 1;
            if close_hits >= params.hits {
                return;
            }
        } else {
            close_hits = 0;
        }

        if t1.elapsed() >= Duration::from_millis(params.max_unlock_ms) {
            return;
        }

        std::thread::sleep(Duration::from_millis(params.poll_ms));
    }
}
