//! Single-writer/many-reader mailbox for the latest camera frame (spec §2 FrameSource, §5
//! "frame mailbox"). A consumer may observe a stale frame but never a torn one: the published
//! slot is swapped atomically and carries a monotonically increasing sequence number so a reader
//! can tell whether it already processed the current frame.

use image::DynamicImage;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Clone)]
struct Slot {
    seq: u64,
    frame: Option<Arc<DynamicImage>>,
}

/// Shared handle; clone freely across the capture thread (writer) and any number of readers.
#[derive(Clone)]
pub struct FrameSource {
    slot: Arc<Mutex<Slot>>,
    seq_hint: Arc<AtomicU64>,
}

impl FrameSource {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot { seq: 0, frame: None })),
            seq_hint: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Publishes a new frame, bumping the sequence number. Called only by the capture thread.
    pub fn publish(&self, frame: DynamicImage) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.seq += 1;
        slot.frame = Some(Arc::new(frame));
        self.seq_hint.store(slot.seq, Ordering::Release);
    }

    /// Returns the latest published frame and its sequence number, or `None` before the first
    /// frame has been published.
    pub fn latest(&self) -> Option<(u64, Arc<DynamicImage>)> {
        let slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.frame.clone().map(|f| (slot.seq, f))
    }

    /// Cheap sequence-number peek without cloning the frame, so a poller can skip re-processing
    /// an already-seen frame without taking the lock on the hot path.
    pub fn current_seq(&self) -> u64 {
        self.seq_hint.load(Ordering::Acquire)
    }
}

impl Default for FrameSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns the camera device on a dedicated thread and republishes frames into a [`FrameSource`].
/// On `max_read_failures` consecutive read errors it closes and reopens the device after
/// `reopen_backoff_ms`, per spec §5; it terminates only when told to stop.
pub struct CaptureThread {
    running: Arc<std::sync::atomic::AtomicBool>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl CaptureThread {
    pub fn spawn(config: crate::config::Config, source: FrameSource) -> Self {
        let running = Arc::new(std::sync::atomic::AtomicBool::new(true));
        let running_thread = Arc::clone(&running);

        let handle = std::thread::spawn(move || {
            let max_failures = config.camera.max_read_failures;
            let backoff = std::time::Duration::from_millis(config.camera.reopen_backoff_ms);

            while running_thread.load(Ordering::Acquire) {
                let mut camera = match crate::camera::Camera::new(&config) {
                    Ok(c) => c,
                    Err(e) => {
                        tracing::warn!("camera open failed: {e}; retrying after backoff");
                        std::thread::sleep(backoff);
                        continue;
                    }
                };

                let mut consecutive_failures = 0u32;
                while running_thread.load(Ordering::Acquire) {
                    match camera.capture_frame() {
                        Ok(frame) => {
                            consecutive_failures = 0;
                            source.publish(frame);
                        }
                        Err(e) => {
                            consecutive_failures += 1;
                            tracing::warn!("camera read failed ({consecutive_failures}/{max_failures}): {e}");
                            if consecutive_failures >= max_failures {
                                tracing::warn!("too many consecutive camera read failures, reopening device");
                                break;
                            }
                        }
                    }
                }

                if running_thread.load(Ordering::Acquire) {
                    std::thread::sleep(backoff);
                }
            }
        });

        Self { running, handle: Some(handle) }
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CaptureThread {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn frame(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([1, 2, 3])))
    }

    #[test]
    fn sequence_number_increases_monotonically() {
        let source = FrameSource::new();
        assert!(source.latest().is_none());

        source.publish(frame(4, 4));
        let (seq1, _) = source.latest().unwrap();
        source.publish(frame(4, 4));
        let (seq2, _) = source.latest().unwrap();

        assert!(seq2 > seq1);
    }

    #[test]
    fn readers_never_see_a_torn_frame() {
        let source = FrameSource::new();
        source.publish(frame(8, 6));
        let (_, f) = source.latest().unwrap();
        assert_eq!(f.width(), 8);
        assert_eq!(f.height(), 6);
    }
}
