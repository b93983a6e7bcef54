pub mod aligner;
pub mod auth_manager;
pub mod camera;
pub mod cli;
pub mod config;
pub mod detector;
pub mod embedder;
pub mod enrollment;
pub mod error;
pub mod events;
pub mod frame_source;
pub mod fsm;
pub mod gallery;
pub mod hw;
pub mod matcher;
pub mod paths;
pub mod persistence;
pub mod quality;
pub mod service;
pub mod types;
pub mod wireless;

pub use config::Config;
pub use error::{FaceAuthError, Result};
pub use paths::Paths;
pub use service::{Command, RecognitionService, Response};
