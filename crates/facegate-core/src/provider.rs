//! Embedding provider seam.
//!
//! Face detection and embedding extraction are external. Implementations wrap
//! whatever pre-trained model service is deployed and must be deterministic
//! for a fixed image and model version.

use crate::types::DetectedFace;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("provider timed out after {0} ms")]
    Timeout(u64),
    #[error("provider rejected image: {0}")]
    Rejected(String),
    #[error("malformed provider response: {0}")]
    BadResponse(String),
}

/// Detects faces in an encoded image and embeds each one.
pub trait EmbeddingProvider: Send {
    /// Faces in `image`, in detection order. An image without faces yields
    /// an empty list, not an error.
    fn detect_and_encode(&mut self, image: &[u8]) -> Result<Vec<DetectedFace>, ProviderError>;

    /// Short identifier for logs.
    fn name(&self) -> &str;
}

impl<P: EmbeddingProvider + ?Sized> EmbeddingProvider for Box<P> {
    fn detect_and_encode(&mut self, image: &[u8]) -> Result<Vec<DetectedFace>, ProviderError> {
        (**self).detect_and_encode(image)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
