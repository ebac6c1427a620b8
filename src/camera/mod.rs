pub mod still;

use async_trait::async_trait;
use image::DynamicImage;
use crate::common::Result;

pub use still::StillCamera;

/// Supplies a live frame source. Acquisition failures (permission denied,
/// no device) are reported as `FaceAuthError::CameraUnavailable`.
#[async_trait]
pub trait CameraProvider: Send + Sync {
    type Stream: CameraStream;

    async fn acquire(&self) -> Result<Self::Stream>;

    /// Stops the stream. Must not fail; called from teardown.
    fn release(&self, stream: Self::Stream);
}

#[async_trait]
pub trait CameraStream: Send {
    async fn capture_frame(&mut self) -> Result<DynamicImage>;
}
