// Core modules
pub mod core;
pub mod camera;
pub mod storage;
pub mod common;

// Re-export commonly used types
pub use common::{Config, DevMode, FaceAuthError, Result};
pub use core::{
    AuthOutcome, AuthResult, AuthSession, AuthStatus, ChannelEvents, Decision, Descriptor,
    FaceBox, FeatureExtractor, SessionEvent, SessionEvents, SessionSettings, SessionState,
    SessionTiming, SidecarExtractor,
};
pub use camera::{CameraProvider, CameraStream, StillCamera};
pub use storage::{Attempt, DescriptorStore, DirBackend, EnrolledProfile, KeyValueBackend, MemoryBackend};
