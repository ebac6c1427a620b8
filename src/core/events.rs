use std::sync::Arc;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use crate::common::FaceAuthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthStatus {
    Idle,
    Loading,
    Ready,
    Detected,
    Detecting,
    Verified,
    Error,
}

impl AuthStatus {
    /// States from which the passive probe may run.
    pub fn is_scanning(self) -> bool {
        matches!(self, AuthStatus::Ready | AuthStatus::Detected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthOutcome {
    Verified,
    Enrolled,
    IdentityMismatch,
    NoFaceDetected,
    NotEnrolled,
    CameraUnavailable,
    ModelsUnavailable,
    DimensionMismatch,
    ExtractionFailed,
    StoreFailed,
    Busy,
    LockedOut,
}

/// What the presentation layer receives once per completed attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthResult {
    pub success: bool,
    pub outcome: AuthOutcome,
    pub message: String,
    pub distance: Option<f32>,
}

impl AuthResult {
    pub fn verified(distance: f32) -> Self {
        Self {
            success: true,
            outcome: AuthOutcome::Verified,
            message: "Identity verified".into(),
            distance: Some(distance),
        }
    }

    pub fn enrolled() -> Self {
        Self {
            success: true,
            outcome: AuthOutcome::Enrolled,
            message: "Face registered successfully".into(),
            distance: None,
        }
    }

    pub fn failure(err: &FaceAuthError) -> Self {
        let (outcome, message) = match err {
            FaceAuthError::IdentityMismatch { .. } => {
                (AuthOutcome::IdentityMismatch, "Identity mismatch".to_string())
            }
            FaceAuthError::NoFaceDetected => (
                AuthOutcome::NoFaceDetected,
                "No face detected. Look at the camera.".to_string(),
            ),
            FaceAuthError::NotEnrolled => (
                AuthOutcome::NotEnrolled,
                "No registered face found. Please register first.".to_string(),
            ),
            FaceAuthError::CameraUnavailable(reason) => {
                (AuthOutcome::CameraUnavailable, format!("Camera unavailable: {}", reason))
            }
            FaceAuthError::ModelsUnavailable(reason) => {
                (AuthOutcome::ModelsUnavailable, format!("Failed to load models: {}", reason))
            }
            FaceAuthError::DimensionMismatch { .. } => (AuthOutcome::DimensionMismatch, err.to_string()),
            FaceAuthError::Busy => (AuthOutcome::Busy, err.to_string()),
            FaceAuthError::LockedOut { .. } => (AuthOutcome::LockedOut, err.to_string()),
            FaceAuthError::StoreCorrupt { .. } | FaceAuthError::Storage(_) => {
                (AuthOutcome::StoreFailed, err.to_string())
            }
            _ => (AuthOutcome::ExtractionFailed, format!("Detection error: {}", err)),
        };

        let distance = match err {
            FaceAuthError::IdentityMismatch { distance } => Some(*distance),
            _ => None,
        };

        Self { success: false, outcome, message, distance }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SessionEvent {
    StatusChanged(AuthStatus),
    Result(AuthResult),
}

/// Sink for everything the session pushes outward.
pub trait SessionEvents: Send + Sync {
    fn on_status_change(&self, status: AuthStatus);
    fn on_result(&self, result: &AuthResult);
}

impl<T: SessionEvents + ?Sized> SessionEvents for Arc<T> {
    fn on_status_change(&self, status: AuthStatus) {
        (**self).on_status_change(status)
    }

    fn on_result(&self, result: &AuthResult) {
        (**self).on_result(result)
    }
}

/// Forwards events to another task over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelEvents {
    tx: UnboundedSender<SessionEvent>,
}

impl ChannelEvents {
    pub fn new(tx: UnboundedSender<SessionEvent>) -> Self {
        Self { tx }
    }
}

impl SessionEvents for ChannelEvents {
    fn on_status_change(&self, status: AuthStatus) {
        // Receiver gone means the presentation layer shut down first
        let _ = self.tx.send(SessionEvent::StatusChanged(status));
    }

    fn on_result(&self, result: &AuthResult) {
        let _ = self.tx.send(SessionEvent::Result(result.clone()));
    }
}
