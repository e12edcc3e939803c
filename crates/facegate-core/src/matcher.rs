//! Nearest-neighbour matching of probe embeddings against the gallery.

use crate::gallery::Gallery;
use crate::types::{DetectedFace, Embedding, MatchResult};

/// Best-candidate decision for one probe embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    /// Matched person, `None` when the nearest entry is outside tolerance.
    pub person_id: Option<String>,
    /// Distance to the nearest gallery entry, `None` for an empty gallery.
    pub distance: Option<f32>,
    /// `(1 - distance) * 100` for a match, `0.0` otherwise. Not clamped.
    pub confidence: f32,
}

impl Match {
    fn unknown(distance: Option<f32>) -> Self {
        Self {
            person_id: None,
            distance,
            confidence: 0.0,
        }
    }
}

/// Strategy for comparing a probe embedding against a gallery of enrolled faces.
pub trait Matcher {
    fn compare(&self, probe: &Embedding, gallery: &Gallery, tolerance: f32) -> Match;

    /// Match every detected face independently against the same gallery.
    fn match_faces(
        &self,
        faces: &[DetectedFace],
        gallery: &Gallery,
        tolerance: f32,
    ) -> Vec<MatchResult> {
        faces
            .iter()
            .map(|face| {
                let m = self.compare(&face.embedding, gallery, tolerance);
                MatchResult {
                    location: face.location,
                    person_id: m.person_id,
                    confidence: m.confidence,
                }
            })
            .collect()
    }
}

/// Euclidean nearest-neighbour matcher.
///
/// The single nearest entry decides; on equal distances the earliest entry
/// in gallery order wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct EuclideanMatcher;

/// Convert an embedding distance into a percentage confidence.
pub fn distance_to_confidence(distance: f32) -> f32 {
    (1.0 - distance) * 100.0
}

impl Matcher for EuclideanMatcher {
    fn compare(&self, probe: &Embedding, gallery: &Gallery, tolerance: f32) -> Match {
        let mut best: Option<(usize, f32)> = None;

        for (i, entry) in gallery.entries().iter().enumerate() {
            let dist = probe.euclidean_distance(&entry.embedding);
            // Strict `<` keeps the first entry on ties.
            if best.map_or(true, |(_, d)| dist < d) {
                best = Some((i, dist));
            }
        }

        match best {
            Some((idx, dist)) if dist <= tolerance => Match {
                person_id: Some(gallery.entries()[idx].person_id.clone()),
                distance: Some(dist),
                confidence: distance_to_confidence(dist),
            },
            Some((_, dist)) => Match::unknown(Some(dist)),
            None => Match::unknown(None),
        }
    }
}
