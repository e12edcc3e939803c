use serde::{Deserialize, Serialize};

/// Name reported for a probe face that matched nobody in the gallery.
pub const UNKNOWN_NAME: &str = "Unknown";

/// Pixel bounding box of a detected face, in `(top, right, bottom, left)` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    pub left: i32,
}

impl BoundingBox {
    pub fn new(top: i32, right: i32, bottom: i32, left: i32) -> Self {
        Self {
            top,
            right,
            bottom,
            left,
        }
    }
}

/// Face embedding vector produced by the embedding provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Euclidean distance between two embeddings.
    ///
    /// Vectors of different length are compared over their common prefix;
    /// the provider guarantees a fixed dimension so this never happens for
    /// well-formed galleries.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// One face found by the provider: where it is and what it looks like.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedFace {
    pub location: BoundingBox,
    pub embedding: Embedding,
}

/// An enrolled face: the identity it belongs to and its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GalleryEntry {
    pub person_id: String,
    pub embedding: Embedding,
}

/// Recognition outcome for a single probe face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub location: BoundingBox,
    pub person_id: Option<String>,
    pub confidence: f32,
}

impl MatchResult {
    /// Display name: the matched person, or `"Unknown"`.
    pub fn name(&self) -> &str {
        self.person_id.as_deref().unwrap_or(UNKNOWN_NAME)
    }

    pub fn is_match(&self) -> bool {
        self.person_id.is_some()
    }
}

/// An image file handed in for enrollment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUpload {
    /// Client-side file name; only its extension is used.
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }
}

/// An image accepted into the gallery during enrollment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddedImage {
    pub filename: String,
    pub path: String,
}

/// An image rejected during enrollment, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedImage {
    pub file: String,
    pub error: String,
}

/// Per-image outcome of an enrollment batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentReport {
    pub person_id: String,
    pub added: Vec<AddedImage>,
    pub errors: Vec<RejectedImage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_euclidean_distance_identical() {
        let a = Embedding::new(vec![0.1, 0.2, 0.3]);
        assert!(a.euclidean_distance(&a).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_distance_known_value() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![3.0, 4.0]);
        assert!((a.euclidean_distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_distance_symmetric() {
        let a = Embedding::new(vec![1.0, -2.0, 0.5]);
        let b = Embedding::new(vec![0.25, 0.0, -1.0]);
        assert_eq!(a.euclidean_distance(&b), b.euclidean_distance(&a));
    }

    #[test]
    fn test_match_result_unknown_name() {
        let result = MatchResult {
            location: BoundingBox::new(0, 10, 10, 0),
            person_id: None,
            confidence: 0.0,
        };
        assert_eq!(result.name(), UNKNOWN_NAME);
        assert!(!result.is_match());
    }
}
