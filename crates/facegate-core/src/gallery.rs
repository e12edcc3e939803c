use crate::types::GalleryEntry;
use std::collections::BTreeMap;

/// Ordered set of enrolled faces with a per-person entry count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gallery {
    entries: Vec<GalleryEntry>,
    counts: BTreeMap<String, usize>,
}

impl Gallery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<GalleryEntry>) -> Self {
        let mut gallery = Self::new();
        for entry in entries {
            gallery.push(entry);
        }
        gallery
    }

    pub fn push(&mut self, entry: GalleryEntry) {
        *self.counts.entry(entry.person_id.clone()).or_default() += 1;
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<GalleryEntry> {
        self.entries
    }

    /// Total number of embeddings.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of distinct people.
    pub fn people_count(&self) -> usize {
        self.counts.len()
    }

    /// `person_id → entry count`, sorted by person id.
    pub fn people(&self) -> &BTreeMap<String, usize> {
        &self.counts
    }

    pub fn count_for(&self, person_id: &str) -> usize {
        self.counts.get(person_id).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Embedding;

    fn entry(person: &str) -> GalleryEntry {
        GalleryEntry {
            person_id: person.into(),
            embedding: Embedding::new(vec![0.0, 1.0]),
        }
    }

    #[test]
    fn test_counts_follow_entries() {
        let gallery = Gallery::from_entries(vec![entry("bob"), entry("alice"), entry("bob")]);
        assert_eq!(gallery.len(), 3);
        assert_eq!(gallery.people_count(), 2);
        assert_eq!(gallery.count_for("bob"), 2);
        assert_eq!(gallery.count_for("carol"), 0);
    }

    #[test]
    fn test_people_sorted_by_id() {
        let gallery = Gallery::from_entries(vec![entry("zed"), entry("alice"), entry("mia")]);
        let names: Vec<_> = gallery.people().keys().cloned().collect();
        assert_eq!(names, vec!["alice", "mia", "zed"]);
    }

    #[test]
    fn test_empty_gallery() {
        let gallery = Gallery::new();
        assert!(gallery.is_empty());
        assert_eq!(gallery.people_count(), 0);
    }
}
