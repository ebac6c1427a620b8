pub mod backend;
pub mod descriptor_store;

pub use backend::{DirBackend, KeyValueBackend, MemoryBackend};
pub use descriptor_store::{
    Attempt, DescriptorStore, EnrolledProfile, ATTEMPT_HISTORY_CAPACITY,
};
