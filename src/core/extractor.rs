use async_trait::async_trait;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use crate::common::Result;
use crate::core::distance::Descriptor;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
}

impl FaceBox {
    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }
}

/// Face detection and descriptor extraction, treated as a black box.
///
/// Implementations report a missing or failed model load as
/// [`FaceAuthError::ModelsUnavailable`](crate::common::FaceAuthError::ModelsUnavailable).
#[async_trait]
pub trait FeatureExtractor: Send + Sync {
    async fn load_models(&self) -> Result<()>;

    /// Fast path used by the passive probe; no descriptor.
    async fn detect(&self, frame: &DynamicImage) -> Result<Option<FaceBox>>;

    async fn detect_with_descriptor(
        &self,
        frame: &DynamicImage,
    ) -> Result<Option<(FaceBox, Descriptor)>>;
}
