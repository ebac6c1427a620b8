pub mod auth;
pub mod distance;
pub mod events;
pub mod extractor;
pub mod sidecar;
pub mod thumbnail;
pub mod timing;

pub use auth::{AuthSession, SessionState};
pub use distance::{confidence_score, decide, euclidean_distance, Decision, Descriptor};
pub use events::{AuthOutcome, AuthResult, AuthStatus, ChannelEvents, SessionEvent, SessionEvents};
pub use extractor::{FaceBox, FeatureExtractor};
pub use timing::{SessionSettings, SessionTiming};
pub use sidecar::{SidecarExtractor, SidecarFace, SidecarSummary};
