use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use async_trait::async_trait;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use crate::common::{FaceAuthError, Result};
use crate::core::distance::Descriptor;
use crate::core::extractor::{FaceBox, FeatureExtractor};

/// Detections recorded for a frame, stored as JSON next to it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SidecarSummary {
    #[serde(default)]
    pub faces: Vec<SidecarFace>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SidecarFace {
    pub bounding_box: FaceBox,
    pub descriptor: Descriptor,
}

/// Replays recorded detections instead of running a model. "Loading the
/// models" means reading and validating the sidecar file.
#[derive(Debug)]
pub struct SidecarExtractor {
    path: PathBuf,
    summary: OnceLock<SidecarSummary>,
}

impl SidecarExtractor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            summary: OnceLock::new(),
        }
    }

    /// `frame.png` pairs with `frame.png.json`.
    pub fn for_frame(frame: &Path) -> Self {
        let mut name = frame.as_os_str().to_owned();
        name.push(".json");
        Self::new(PathBuf::from(name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn summary(&self) -> Result<&SidecarSummary> {
        self.summary
            .get()
            .ok_or_else(|| FaceAuthError::ModelsUnavailable("models not loaded".into()))
    }

    // At most one face per frame: the most confident detection wins
    fn best_face(&self) -> Result<Option<&SidecarFace>> {
        Ok(self.summary()?.faces.iter().max_by(|a, b| {
            a.bounding_box
                .confidence
                .total_cmp(&b.bounding_box.confidence)
        }))
    }
}

#[async_trait]
impl FeatureExtractor for SidecarExtractor {
    async fn load_models(&self) -> Result<()> {
        if self.summary.get().is_some() {
            return Ok(());
        }

        let data = std::fs::read(&self.path).map_err(|e| {
            FaceAuthError::ModelsUnavailable(format!("Failed to read {}: {}", self.path.display(), e))
        })?;
        let summary: SidecarSummary = serde_json::from_slice(&data).map_err(|e| {
            FaceAuthError::ModelsUnavailable(format!("Invalid sidecar {}: {}", self.path.display(), e))
        })?;

        if let Some(first) = summary.faces.first() {
            let dim = first.descriptor.len();
            if let Some(bad) = summary.faces.iter().find(|f| f.descriptor.len() != dim) {
                return Err(FaceAuthError::DimensionMismatch {
                    expected: dim,
                    found: bad.descriptor.len(),
                });
            }
        }

        tracing::debug!("Loaded {} recorded face(s) from {:?}", summary.faces.len(), self.path);
        // A concurrent loader may have won; both parsed the same file
        let _ = self.summary.set(summary);
        Ok(())
    }

    async fn detect(&self, _frame: &DynamicImage) -> Result<Option<FaceBox>> {
        Ok(self.best_face()?.map(|face| face.bounding_box.clone()))
    }

    async fn detect_with_descriptor(
        &self,
        _frame: &DynamicImage,
    ) -> Result<Option<(FaceBox, Descriptor)>> {
        Ok(self
            .best_face()?
            .map(|face| (face.bounding_box.clone(), face.descriptor.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn face(confidence: f32, descriptor: Vec<f32>) -> SidecarFace {
        SidecarFace {
            bounding_box: FaceBox { x1: 10.0, y1: 10.0, x2: 60.0, y2: 70.0, confidence },
            descriptor,
        }
    }

    fn blank() -> DynamicImage {
        DynamicImage::new_luma8(8, 8)
    }

    #[test]
    fn sidecar_path_appends_json() {
        let extractor = SidecarExtractor::for_frame(Path::new("/captures/frame.png"));
        assert_eq!(extractor.path(), Path::new("/captures/frame.png.json"));
    }

    #[tokio::test]
    async fn picks_most_confident_face() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("frame.png.json");
        let summary = SidecarSummary {
            faces: vec![face(0.6, vec![1.0, 1.0]), face(0.9, vec![0.0, 0.5])],
        };
        std::fs::write(&path, serde_json::to_vec_pretty(&summary).unwrap()).unwrap();

        let extractor = SidecarExtractor::new(&path);
        extractor.load_models().await.unwrap();
        let (found, descriptor) = extractor.detect_with_descriptor(&blank()).await.unwrap().unwrap();
        assert_eq!(found.confidence, 0.9);
        assert_eq!(descriptor, vec![0.0, 0.5]);
    }

    #[tokio::test]
    async fn empty_summary_means_no_face() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("frame.png.json");
        std::fs::write(&path, "{\"faces\": []}").unwrap();

        let extractor = SidecarExtractor::new(&path);
        extractor.load_models().await.unwrap();
        assert_eq!(extractor.detect(&blank()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn detection_before_loading_fails() {
        let extractor = SidecarExtractor::new("/nonexistent.json");
        let err = extractor.detect(&blank()).await.unwrap_err();
        assert!(matches!(err, FaceAuthError::ModelsUnavailable(_)));
        assert!(matches!(
            extractor.load_models().await,
            Err(FaceAuthError::ModelsUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn mixed_dimensions_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("frame.png.json");
        let summary = SidecarSummary {
            faces: vec![face(0.6, vec![1.0, 1.0]), face(0.9, vec![0.0])],
        };
        std::fs::write(&path, serde_json::to_vec(&summary).unwrap()).unwrap();

        let err = SidecarExtractor::new(&path).load_models().await.unwrap_err();
        assert!(matches!(err, FaceAuthError::DimensionMismatch { expected: 2, found: 1 }));
    }
}
