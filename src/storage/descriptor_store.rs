use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use crate::common::{FaceAuthError, Result};
use crate::core::distance::Descriptor;
use crate::storage::backend::KeyValueBackend;

const STORAGE_VERSION: u32 = 1;

pub const ATTEMPT_HISTORY_CAPACITY: usize = 5;

pub const KEY_DESCRIPTOR: &str = "enrolled_descriptor";
pub const KEY_THUMBNAIL: &str = "enrolled_thumbnail";
pub const KEY_ATTEMPTS: &str = "attempt_history";

#[derive(Debug, Clone, PartialEq)]
pub struct EnrolledProfile {
    pub descriptor: Descriptor,
    /// JPEG bytes, for display only.
    pub thumbnail: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub distance: f32,
    pub confidence: f32,
    #[serde(default)]
    pub thumbnail: Option<Vec<u8>>,
}

impl Attempt {
    pub fn new(success: bool, distance: f32, confidence: f32, thumbnail: Option<Vec<u8>>) -> Self {
        Self {
            id: format!("{:016x}", rand::random::<u64>()),
            timestamp: Utc::now(),
            success,
            distance,
            confidence: confidence.clamp(0.0, 100.0),
            thumbnail,
        }
    }

    /// Enrollment does not compare, so it is recorded as a perfect match.
    pub fn enrollment(thumbnail: Option<Vec<u8>>) -> Self {
        Self::new(true, 0.0, 100.0, thumbnail)
    }
}

#[derive(Serialize, Deserialize)]
struct StoredDescriptor {
    version: u32,
    descriptor: Descriptor,
}

#[derive(Serialize, Deserialize)]
struct StoredAttempts {
    version: u32,
    attempts: Vec<Attempt>,
}

/// Holds the single enrolled profile and the bounded attempt log on top of a
/// key/value backend.
pub struct DescriptorStore<B: KeyValueBackend> {
    backend: B,
    // Serializes read-modify-write of the attempt log and profile overwrites
    write_lock: Mutex<()>,
}

impl<B: KeyValueBackend> DescriptorStore<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            write_lock: Mutex::new(()),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| FaceAuthError::Storage("store write lock poisoned".into()))
    }

    /// Replaces any existing profile. A `None` thumbnail clears the old one.
    pub fn save_enrollment(&self, descriptor: &[f32], thumbnail: Option<&[u8]>) -> Result<()> {
        if descriptor.is_empty() {
            return Err(FaceAuthError::Storage("Refusing to enroll an empty descriptor".into()));
        }

        let _guard = self.lock()?;
        let record = StoredDescriptor {
            version: STORAGE_VERSION,
            descriptor: descriptor.to_vec(),
        };
        let encoded = bincode::serialize(&record)
            .map_err(|e| FaceAuthError::Storage(format!("Failed to serialize: {}", e)))?;

        self.backend.put(KEY_DESCRIPTOR, &encoded)?;

        // The thumbnail is display-only; never leave the previous face's behind
        let stored = match thumbnail {
            Some(bytes) => self.backend.put(KEY_THUMBNAIL, bytes),
            None => self.backend.remove(KEY_THUMBNAIL),
        };
        if let Err(e) = stored {
            tracing::warn!("Failed to store enrollment thumbnail: {}", e);
            self.backend.remove(KEY_THUMBNAIL)?;
        }

        tracing::info!("Enrolled descriptor saved ({} dimensions)", descriptor.len());
        Ok(())
    }

    /// `Ok(None)` when nothing is enrolled; `StoreCorrupt` when the record
    /// cannot be decoded.
    pub fn load_enrollment(&self) -> Result<Option<EnrolledProfile>> {
        let data = match self.backend.get(KEY_DESCRIPTOR)? {
            Some(data) => data,
            None => return Ok(None),
        };

        let record: StoredDescriptor = bincode::deserialize(&data)
            .map_err(|e| corrupt(KEY_DESCRIPTOR, format!("Failed to deserialize: {}", e)))?;

        if record.version > STORAGE_VERSION {
            return Err(corrupt(KEY_DESCRIPTOR, format!("unsupported version {}", record.version)));
        }
        if record.descriptor.is_empty() {
            return Err(corrupt(KEY_DESCRIPTOR, "empty descriptor".into()));
        }
        if record.descriptor.iter().any(|v| !v.is_finite()) {
            return Err(corrupt(KEY_DESCRIPTOR, "non-finite descriptor value".into()));
        }

        let thumbnail = self.backend.get(KEY_THUMBNAIL)?;
        Ok(Some(EnrolledProfile {
            descriptor: record.descriptor,
            thumbnail,
        }))
    }

    /// Removes the profile and its thumbnail; the attempt log is untouched.
    pub fn clear_enrollment(&self) -> Result<()> {
        let _guard = self.lock()?;
        self.backend.remove(KEY_DESCRIPTOR)?;
        self.backend.remove(KEY_THUMBNAIL)?;
        tracing::info!("Enrollment cleared");
        Ok(())
    }

    /// Inserts at the head and drops the oldest entries beyond capacity.
    pub fn append_attempt(&self, attempt: Attempt) -> Result<()> {
        let _guard = self.lock()?;

        let mut attempts = match self.read_attempts() {
            Ok(attempts) => attempts,
            Err(e @ FaceAuthError::StoreCorrupt { .. }) => {
                tracing::warn!("{}; starting a fresh attempt history", e);
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        attempts.insert(0, attempt);
        attempts.truncate(ATTEMPT_HISTORY_CAPACITY);
        self.write_attempts(attempts)
    }

    /// Most recent first, possibly empty.
    pub fn load_attempts(&self) -> Result<Vec<Attempt>> {
        self.read_attempts()
    }

    /// Full reset: profile, thumbnail and attempt history.
    pub fn clear_all(&self) -> Result<()> {
        let _guard = self.lock()?;
        self.backend.remove(KEY_DESCRIPTOR)?;
        self.backend.remove(KEY_THUMBNAIL)?;
        self.backend.remove(KEY_ATTEMPTS)?;
        tracing::info!("Store cleared");
        Ok(())
    }

    fn read_attempts(&self) -> Result<Vec<Attempt>> {
        let data = match self.backend.get(KEY_ATTEMPTS)? {
            Some(data) => data,
            None => return Ok(Vec::new()),
        };

        let record: StoredAttempts = bincode::deserialize(&data)
            .map_err(|e| corrupt(KEY_ATTEMPTS, format!("Failed to deserialize: {}", e)))?;

        if record.version > STORAGE_VERSION {
            return Err(corrupt(KEY_ATTEMPTS, format!("unsupported version {}", record.version)));
        }
        if record.attempts.len() > ATTEMPT_HISTORY_CAPACITY {
            return Err(corrupt(
                KEY_ATTEMPTS,
                format!("{} entries exceeds capacity", record.attempts.len()),
            ));
        }

        Ok(record.attempts)
    }

    fn write_attempts(&self, attempts: Vec<Attempt>) -> Result<()> {
        let record = StoredAttempts {
            version: STORAGE_VERSION,
            attempts,
        };
        let encoded = bincode::serialize(&record)
            .map_err(|e| FaceAuthError::Storage(format!("Failed to serialize: {}", e)))?;
        self.backend.put(KEY_ATTEMPTS, &encoded)
    }
}

fn corrupt(key: &str, reason: String) -> FaceAuthError {
    FaceAuthError::StoreCorrupt {
        key: key.to_string(),
        reason,
    }
}
