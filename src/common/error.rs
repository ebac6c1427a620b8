use thiserror::Error;

#[derive(Error, Debug)]
pub enum FaceAuthError {
    #[error("Camera unavailable: {0}")]
    CameraUnavailable(String),

    #[error("Models unavailable: {0}")]
    ModelsUnavailable(String),

    #[error("No face detected")]
    NoFaceDetected,

    #[error("No enrolled face found")]
    NotEnrolled,

    #[error("Identity mismatch (distance {distance:.3})")]
    IdentityMismatch { distance: f32 },

    #[error("Descriptor dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Corrupt store record '{key}': {reason}")]
    StoreCorrupt { key: String, reason: String },

    #[error("Another capture is already in progress")]
    Busy,

    #[error("Too many failed attempts, retry in {remaining_secs}s")]
    LockedOut { remaining_secs: u64 },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl FaceAuthError {
    /// Whether the user can simply try again without resetting the session.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            FaceAuthError::NoFaceDetected
                | FaceAuthError::IdentityMismatch { .. }
                | FaceAuthError::NotEnrolled
                | FaceAuthError::Busy
        )
    }

    /// Camera and model failures leave the session unusable until a reset.
    pub fn requires_reset(&self) -> bool {
        matches!(
            self,
            FaceAuthError::CameraUnavailable(_) | FaceAuthError::ModelsUnavailable(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FaceAuthError>;
