//! Face gallery management and matching for facegate.
//!
//! Face detection and embedding extraction sit behind the
//! [`EmbeddingProvider`] trait; this crate owns everything after that:
//! the enrolled gallery, its on-disk cache, and nearest-neighbour matching.

pub mod annotate;
pub mod cache;
#[cfg(any(test, feature = "test-util"))]
pub mod fixtures;
pub mod gallery;
pub mod input;
pub mod matcher;
pub mod naming;
pub mod provider;
pub mod store;
pub mod types;

pub use gallery::Gallery;
pub use matcher::{EuclideanMatcher, Match, Matcher};
pub use provider::{EmbeddingProvider, ProviderError};
pub use store::{GalleryStore, StoreConfig, StoreError};
pub use types::{
    AddedImage, BoundingBox, DetectedFace, Embedding, EnrollmentReport, GalleryEntry,
    ImageUpload, MatchResult, RejectedImage, UNKNOWN_NAME,
};
