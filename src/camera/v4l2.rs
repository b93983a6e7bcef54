//! V4L2 camera capture. Handles both grayscale IR sensors (`GREY`, read directly into a luma
//! buffer) and color sensors (`MJPG`, decoded through the `image` crate's JPEG codec).

use crate::config::Config;
use crate::error::{FaceAuthError, Result};
use image::{DynamicImage, ImageBuffer, Luma};
use std::fs;
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

pub struct Camera {
    device: Device,
    config: Config,
}

pub struct CameraSession<'a> {
    stream: v4l::io::mmap::Stream<'a>,
    format: v4l::Format,
}

impl Camera {
    pub fn new(config: &Config) -> Result<Self> {
        let device_index = if config.camera.device_index == 999 {
            Self::detect_ir_camera()?
        } else {
            config.camera.device_index
        };
        Self::new_with_device(device_index, config.clone())
    }

    /// Scans `/dev/video*`, returning `(index, card_name, likely_ir)` for every device exposing
    /// a grayscale capture format or a name that suggests an IR sensor.
    pub fn detect_ir_camera() -> Result<u32> {
        let mut candidates: Vec<(u32, String, u32)> = Vec::new();

        for entry in fs::read_dir("/dev")? {
            let entry = entry?;
            let filename = entry.file_name();
            let Some(filename) = filename.to_str() else { continue };
            let Some(index_str) = filename.strip_prefix("video") else { continue };
            let Ok(index) = index_str.parse::<u32>() else { continue };

            let Ok(device) = Device::new(index as usize) else { continue };
            let Ok(caps) = device.query_caps() else { continue };

            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }

            let formats = device.enum_formats().unwrap_or_default();
            let has_grayscale = formats.iter().any(|fmt| {
                let bytes = fmt.fourcc.repr;
                bytes == *b"GREY" || bytes == *b"Y8  " || bytes == *b"Y16 "
            });

            if has_grayscale {
                candidates.push((index, caps.card.clone(), 100));
            } else if caps.card.contains("BRIO") || caps.card.contains("IR") {
                candidates.push((index, caps.card.clone(), 50));
            }
        }

        candidates.sort_by(|a, b| b.2.cmp(&a.2));

        if let Some((index, name, _)) = candidates.first() {
            tracing::info!(device = index, name, "auto-detected IR camera");
            Ok(*index)
        } else {
            tracing::warn!("no IR camera detected, falling back to device 0");
            Ok(0)
        }
    }

    pub fn new_with_device(index: u32, config: Config) -> Result<Self> {
        let device = Device::new(index as usize)
            .map_err(|e| FaceAuthError::Camera(format!("failed to open camera {index}: {e}")))?;

        let caps = device
            .query_caps()
            .map_err(|e| FaceAuthError::Camera(format!("failed to query capabilities: {e}")))?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            tracing::warn!(device = index, "device may not support standard video capture");
        }

        let mut fmt = device
            .format()
            .map_err(|e| FaceAuthError::Camera(format!("failed to get format: {e}")))?;

        fmt.width = config.camera.width;
        fmt.height = config.camera.height;
        if fmt.fourcc.str().unwrap_or_default() != "GREY" {
            fmt.fourcc = FourCC::new(b"MJPG");
        }

        if let Err(e) = device.set_format(&fmt) {
            tracing::warn!("could not set exact format: {e}; using device defaults");
        }

        let final_fmt = device
            .format()
            .map_err(|e| FaceAuthError::Camera(format!("failed to get final format: {e}")))?;
        if final_fmt.width != config.camera.width || final_fmt.height != config.camera.height {
            tracing::warn!(
                got = format!("{}x{}", final_fmt.width, final_fmt.height),
                wanted = format!("{}x{}", config.camera.width, config.camera.height),
                "camera resolution differs from requested"
            );
        }

        Ok(Self { device, config })
    }

    pub fn capture_frame(&mut self) -> Result<DynamicImage> {
        self.capture_frame_with_warmup(self.config.camera.warmup_frames)
    }

    pub fn capture_frame_with_warmup(&mut self, warmup_frames: u32) -> Result<DynamicImage> {
        let fmt = self
            .device
            .format()
            .map_err(|e| FaceAuthError::Camera(format!("failed to get format: {e}")))?;

        let mut stream = v4l::io::mmap::Stream::with_buffers(&mut self.device, Type::VideoCapture, 4)
            .map_err(|e| FaceAuthError::Camera(format!("failed to create stream: {e}")))?;

        for _ in 0..warmup_frames {
            stream
                .next()
                .map_err(|e| FaceAuthError::Camera(format!("failed to capture warmup frame: {e}")))?;
            std::thread::sleep(std::time::Duration::from_millis(self.config.camera.warmup_delay_ms));
        }

        let (buf, _meta) = stream
            .next()
            .map_err(|e| FaceAuthError::Camera(format!("failed to capture: {e}")))?;

        decode_frame(buf, &fmt)
    }

    /// Starts a streaming session for repeated captures without re-warming up on every frame
    /// (used by the capture thread and enrollment CLI, both of which pull many frames in a row).
    pub fn start_session(&mut self) -> Result<CameraSession<'_>> {
        let fmt = self
            .device
            .format()
            .map_err(|e| FaceAuthError::Camera(format!("failed to get format: {e}")))?;

        let mut stream = v4l::io::mmap::Stream::with_buffers(&mut self.device, Type::VideoCapture, 8)
            .map_err(|e| FaceAuthError::Camera(format!("failed to create stream: {e}")))?;

        for _ in 0..self.config.camera.warmup_frames {
            stream
                .next()
                .map_err(|e| FaceAuthError::Camera(format!("failed to capture warmup frame: {e}")))?;
            std::thread::sleep(std::time::Duration::from_millis(self.config.camera.warmup_delay_ms));
        }

        Ok(CameraSession { stream, format: fmt })
    }
}

impl<'a> CameraSession<'a> {
    pub fn capture_frame(&mut self) -> Result<DynamicImage> {
        let (buf, _meta) = self
            .stream
            .next()
            .map_err(|e| FaceAuthError::Camera(format!("failed to capture: {e}")))?;
        decode_frame(buf, &self.format)
    }
}

fn decode_frame(data: &[u8], fmt: &v4l::Format) -> Result<DynamicImage> {
    match fmt.fourcc.str().unwrap_or_default() {
        "GREY" => grey_to_image(data, fmt.width, fmt.height),
        "MJPG" => image::load_from_memory(data)
            .map_err(|e| FaceAuthError::Camera(format!("failed to decode MJPEG frame: {e}"))),
        other => Err(FaceAuthError::Camera(format!("unsupported camera format: {other}"))),
    }
}

fn grey_to_image(data: &[u8], width: u32, height: u32) -> Result<DynamicImage> {
    let img_buffer = ImageBuffer::<Luma<u8>, _>::from_raw(width, height, data.to_vec())
        .ok_or_else(|| FaceAuthError::Camera("failed to create grayscale image buffer".into()))?;
    Ok(DynamicImage::ImageLuma8(img_buffer))
}
