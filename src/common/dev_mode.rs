use std::path::PathBuf;
use std::fs;
use directories::ProjectDirs;
use crate::common::config::StorageConfig;
use crate::common::error::Result;
use crate::common::paths::system_store_dir;

#[derive(Debug, Clone)]
pub struct DevMode {
    enabled: bool,
    base_dir: PathBuf,
}

impl DevMode {
    pub fn new(enabled: bool) -> Result<Self> {
        Self::with_base_dir(enabled, PathBuf::from("./dev_data"))
    }

    pub fn with_base_dir(enabled: bool, base_dir: PathBuf) -> Result<Self> {
        if enabled {
            fs::create_dir_all(base_dir.join("store"))?;
            fs::create_dir_all(base_dir.join("captures"))?;

            tracing::info!("Development mode enabled - data will be saved to: {}",
                           base_dir.display());
        }

        Ok(Self { enabled, base_dir })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Resolves where the descriptor store lives: an explicit `data_dir`
    /// wins, then the dev tree, then the platform data directory.
    pub fn store_dir(&self, storage: &StorageConfig) -> PathBuf {
        if let Some(dir) = &storage.data_dir {
            return dir.clone();
        }

        if self.enabled {
            return self.base_dir.join("store");
        }

        // No home directory (system service): fall back to the packaged location
        ProjectDirs::from("com", "facegate", "FaceGate")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(system_store_dir)
    }

    /// Where dumped thumbnails go; the working directory outside dev mode.
    pub fn get_capture_path(&self, prefix: &str) -> PathBuf {
        if self.enabled {
            let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
            self.base_dir.join("captures").join(format!("{}_{}.jpg", prefix, timestamp))
        } else {
            PathBuf::from(format!("{}.jpg", prefix))
        }
    }
}
