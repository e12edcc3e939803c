//! Scripted embedding provider and image helpers for tests.

use crate::provider::{EmbeddingProvider, ProviderError};
use crate::types::{BoundingBox, DetectedFace, Embedding};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";

/// Bytes that sniff as PNG and carry `tag` as the payload.
pub fn png(tag: &str) -> Vec<u8> {
    let mut bytes = PNG_MAGIC.to_vec();
    bytes.extend_from_slice(tag.as_bytes());
    bytes
}

/// A face at a fixed location with the given embedding.
pub fn face(values: &[f32]) -> DetectedFace {
    DetectedFace {
        location: BoundingBox::new(10, 110, 110, 10),
        embedding: Embedding::new(values.to_vec()),
    }
}

#[derive(Clone)]
enum Script {
    Faces(Vec<DetectedFace>),
    Fail(String),
    Reject(String),
}

/// Provider that answers from a table keyed by the image bytes.
///
/// Unscripted images have no faces. Clones share the script and call counter,
/// so a test can keep a handle after moving the provider into an engine.
#[derive(Clone, Default)]
pub struct ScriptedProvider {
    script: Arc<Mutex<HashMap<Vec<u8>, Script>>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script `image` to yield `faces`.
    pub fn with_faces(self, image: &[u8], faces: Vec<DetectedFace>) -> Self {
        self.set(image, Script::Faces(faces));
        self
    }

    /// Script `image` to fail with an unavailable-provider error.
    pub fn with_failure(self, image: &[u8], reason: &str) -> Self {
        self.set(image, Script::Fail(reason.to_string()));
        self
    }

    /// Script `image` to be refused as unprocessable.
    pub fn with_rejection(self, image: &[u8], reason: &str) -> Self {
        self.set(image, Script::Reject(reason.to_string()));
        self
    }

    fn set(&self, image: &[u8], script: Script) {
        if let Ok(mut table) = self.script.lock() {
            table.insert(image.to_vec(), script);
        }
    }

    /// Number of `detect_and_encode` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl EmbeddingProvider for ScriptedProvider {
    fn detect_and_encode(&mut self, image: &[u8]) -> Result<Vec<DetectedFace>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let script = self
            .script
            .lock()
            .map_err(|_| ProviderError::Unavailable("script poisoned".into()))?
            .get(image)
            .cloned();
        match script {
            Some(Script::Faces(faces)) => Ok(faces),
            Some(Script::Fail(reason)) => Err(ProviderError::Unavailable(reason)),
            Some(Script::Reject(reason)) => Err(ProviderError::Rejected(reason)),
            None => Ok(Vec::new()),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
