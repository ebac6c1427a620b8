use std::path::{Path, PathBuf};
use async_trait::async_trait;
use image::DynamicImage;
use crate::camera::{CameraProvider, CameraStream};
use crate::common::{FaceAuthError, Result};

/// Serves a recorded frame from an image file as if it were a live stream.
#[derive(Debug, Clone)]
pub struct StillCamera {
    path: PathBuf,
}

pub struct StillStream {
    frame: DynamicImage,
}

impl StillCamera {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CameraProvider for StillCamera {
    type Stream = StillStream;

    async fn acquire(&self) -> Result<StillStream> {
        if !self.path.exists() {
            return Err(FaceAuthError::CameraUnavailable(format!(
                "no frame at {}", self.path.display()
            )));
        }

        let frame = image::open(&self.path).map_err(|e| {
            FaceAuthError::CameraUnavailable(format!("Failed to open {}: {}", self.path.display(), e))
        })?;
        tracing::debug!("Opened still frame {:?} ({}x{})", self.path, frame.width(), frame.height());

        Ok(StillStream { frame })
    }

    fn release(&self, _stream: StillStream) {
        tracing::debug!("Released still frame {:?}", self.path);
    }
}

#[async_trait]
impl CameraStream for StillStream {
    async fn capture_frame(&mut self) -> Result<DynamicImage> {
        Ok(self.frame.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma};
    use tempfile::TempDir;

    #[tokio::test]
    async fn serves_the_same_frame_repeatedly() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("frame.png");
        ImageBuffer::from_pixel(32, 24, Luma([200u8])).save(&path).unwrap();

        let camera = StillCamera::new(&path);
        let mut stream = camera.acquire().await.unwrap();
        let first = stream.capture_frame().await.unwrap();
        let second = stream.capture_frame().await.unwrap();
        assert_eq!(first.width(), 32);
        assert_eq!(first.to_luma8(), second.to_luma8());
        camera.release(stream);
    }

    #[tokio::test]
    async fn missing_file_is_camera_unavailable() {
        let camera = StillCamera::new("/nonexistent/frame.png");
        let err = camera.acquire().await.err().unwrap();
        assert!(matches!(err, FaceAuthError::CameraUnavailable(_)));
    }
}
