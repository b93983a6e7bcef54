use thiserror::Error;

#[derive(Error, Debug)]
pub enum FaceAuthError {
    #[error("Camera error: {0}")]
    Camera(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("No face detected")]
    NoFaceDetected,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Gallery error: {0}")]
    Gallery(String),

    #[error("Hardware error: {0}")]
    Hardware(String),

    #[error("Alignment error: {0}")]
    Alignment(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("ORT error: {0}")]
    Ort(#[from] ort::OrtError),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, FaceAuthError>;
