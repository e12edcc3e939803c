//! Gallery store: known-face source images, their embeddings, and the cache.
//!
//! The directory of source images is the source of truth. The in-memory
//! gallery and the cache file are derived from it and are rebuilt whole after
//! every mutation, so they always agree with a fresh scan. A mutation whose
//! rebuild fails is rolled back: files, cache and gallery stay as they were.

use crate::cache;
use crate::gallery::Gallery;
use crate::input::{self, InputError};
use crate::naming::{self, NameError};
use crate::provider::{EmbeddingProvider, ProviderError};
use crate::types::{AddedImage, EnrollmentReport, GalleryEntry, ImageUpload, RejectedImage};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Default upload size limit (16 MiB).
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 16 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid name: {0}")]
    Name(#[from] NameError),
    #[error("no images provided")]
    NoImages,
    #[error("no enrolled images for {0}")]
    UnknownPerson(String),
    #[error("embedding provider: {0}")]
    Provider(#[from] ProviderError),
}

impl StoreError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Why a single enrollment image was turned away.
#[derive(Error, Debug)]
pub enum ImageRejection {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("No face detected in image")]
    NoFaceDetected,
    #[error("Multiple faces detected ({0}). Please use images with only one face")]
    MultipleFacesDetected(usize),
    #[error("embedding provider: {0}")]
    Provider(#[from] ProviderError),
    #[error("saving image: {0}")]
    Io(#[from] io::Error),
}

/// Where the store keeps its files.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub known_faces_dir: PathBuf,
    pub cache_path: PathBuf,
    pub max_image_bytes: usize,
}

impl StoreConfig {
    pub fn new(known_faces_dir: impl Into<PathBuf>, cache_path: impl Into<PathBuf>) -> Self {
        Self {
            known_faces_dir: known_faces_dir.into(),
            cache_path: cache_path.into(),
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }
}

/// Owner of the enrolled gallery.
pub struct GalleryStore {
    config: StoreConfig,
    gallery: Arc<Gallery>,
    loaded: bool,
}

/// A gallery source image found on disk.
struct SourceImage {
    path: PathBuf,
    stem: String,
}

impl GalleryStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            gallery: Arc::new(Gallery::new()),
            loaded: false,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Current gallery. Reloads replace the snapshot, never modify it.
    pub fn snapshot(&self) -> Arc<Gallery> {
        Arc::clone(&self.gallery)
    }

    /// `person_id → image count`, sorted by person id.
    pub fn list_people(&self) -> BTreeMap<String, usize> {
        self.gallery.people().clone()
    }

    /// Load the gallery from cache, or rebuild it from the source images.
    ///
    /// An unreadable cache is treated as absent. A provider failure aborts
    /// the rebuild and leaves the current gallery untouched.
    pub fn load(
        &mut self,
        provider: &mut dyn EmbeddingProvider,
        force_reload: bool,
    ) -> Result<Arc<Gallery>, StoreError> {
        if !force_reload {
            match cache::read(&self.config.cache_path) {
                Ok(Some(entries)) => {
                    let gallery = Gallery::from_entries(entries);
                    tracing::info!(
                        path = %self.config.cache_path.display(),
                        encodings = gallery.len(),
                        people = gallery.people_count(),
                        "gallery loaded from cache"
                    );
                    return Ok(self.publish(gallery));
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        path = %self.config.cache_path.display(),
                        error = %e,
                        "gallery cache unusable; rebuilding from source images"
                    );
                }
            }
        }

        let gallery = self.scan(provider)?;
        Ok(self.commit(gallery))
    }

    /// Persist a freshly scanned gallery to the cache and publish it.
    ///
    /// The cache never outlives the gallery it was built from: an empty
    /// gallery or a failed write removes it.
    fn commit(&mut self, gallery: Gallery) -> Arc<Gallery> {
        let path = &self.config.cache_path;
        let written = !gallery.is_empty()
            && match cache::write(path, gallery.entries()) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to write gallery cache");
                    false
                }
            };
        if !written {
            if let Err(e) = cache::invalidate(path) {
                tracing::warn!(path = %path.display(), error = %e, "failed to delete gallery cache");
            }
        }
        self.publish(gallery)
    }

    fn publish(&mut self, gallery: Gallery) -> Arc<Gallery> {
        self.gallery = Arc::new(gallery);
        self.loaded = true;
        self.snapshot()
    }

    /// Embed every source image, tolerating images with zero or several faces.
    ///
    /// Images the provider refuses are skipped; any other provider failure
    /// aborts the scan.
    fn scan(&self, provider: &mut dyn EmbeddingProvider) -> Result<Gallery, StoreError> {
        let dir = &self.config.known_faces_dir;
        if !dir.exists() {
            std::fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;
            tracing::info!(dir = %dir.display(), "created empty known-faces directory");
            return Ok(Gallery::new());
        }

        let mut gallery = Gallery::new();
        for image in self.source_images()? {
            let bytes = match std::fs::read(&image.path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(path = %image.path.display(), error = %e, "skipping unreadable image");
                    continue;
                }
            };

            let faces = match provider.detect_and_encode(&bytes) {
                Ok(faces) => faces,
                Err(ProviderError::Rejected(reason)) => {
                    tracing::warn!(path = %image.path.display(), reason = %reason, "provider refused image; skipping");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let Some(first) = faces.first() else {
                tracing::warn!(path = %image.path.display(), "no face found; skipping");
                continue;
            };
            if faces.len() > 1 {
                tracing::warn!(
                    path = %image.path.display(),
                    faces = faces.len(),
                    "multiple faces found; using the first"
                );
            }

            let person_id = naming::person_id_from_stem(&image.stem).to_string();
            tracing::debug!(path = %image.path.display(), person = %person_id, "added face");
            gallery.push(GalleryEntry {
                person_id,
                embedding: first.embedding.clone(),
            });
        }

        tracing::info!(
            dir = %dir.display(),
            encodings = gallery.len(),
            people = gallery.people_count(),
            "gallery rebuilt from source images"
        );
        for (person, count) in gallery.people() {
            tracing::debug!(person = %person, images = count, "faces per person");
        }
        Ok(gallery)
    }

    /// Accepted image files in the known-faces directory, in file-name order.
    fn source_images(&self) -> Result<Vec<SourceImage>, StoreError> {
        let dir = &self.config.known_faces_dir;
        let read_dir = match std::fs::read_dir(dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(dir, e)),
        };

        let mut images = Vec::new();
        for dirent in read_dir {
            let path = dirent.map_err(|e| StoreError::io(dir, e))?.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if input::allowed_extension(name).is_none() {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            images.push(SourceImage {
                stem: stem.to_string(),
                path: path.clone(),
            });
        }
        images.sort_by(|a, b| a.path.file_name().cmp(&b.path.file_name()));
        Ok(images)
    }

    /// Enroll new images for `name`.
    ///
    /// Every image must contain exactly one face. Rejected images are
    /// reported and never written. If anything was accepted the gallery and
    /// cache are rebuilt before returning; when that rebuild fails the new
    /// files are deleted again and the error is returned.
    pub fn add_entries(
        &mut self,
        provider: &mut dyn EmbeddingProvider,
        name: &str,
        uploads: &[ImageUpload],
    ) -> Result<EnrollmentReport, StoreError> {
        let person_id = naming::normalize_person_id(name)?;
        if uploads.is_empty() {
            return Err(StoreError::NoImages);
        }

        let mut report = EnrollmentReport {
            person_id: person_id.clone(),
            ..Default::default()
        };

        let mut accepted = Vec::new();
        for upload in uploads {
            match self.check_upload(provider, upload) {
                Ok(ext) => accepted.push((upload, ext)),
                Err(rejection) => {
                    tracing::info!(file = %upload.filename, reason = %rejection, "enrollment image rejected");
                    report.errors.push(RejectedImage {
                        file: upload.filename.clone(),
                        error: rejection.to_string(),
                    });
                }
            }
        }
        if accepted.is_empty() {
            return Ok(report);
        }

        let existing_max = self
            .source_images()?
            .iter()
            .filter_map(|img| naming::enrollment_index(&img.stem, &person_id))
            .max();
        let stems =
            naming::enrollment_stems(&person_id, existing_max, uploads.len(), accepted.len())?;

        let dir = self.config.known_faces_dir.clone();
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;

        let mut written = Vec::new();
        for ((upload, ext), stem) in accepted.into_iter().zip(stems) {
            let filename = format!("{stem}.{ext}");
            let path = dir.join(&filename);
            match write_new(&path, &upload.bytes) {
                Ok(()) => {
                    report.added.push(AddedImage {
                        filename,
                        path: path.display().to_string(),
                    });
                    written.push(path);
                }
                Err(e) => report.errors.push(RejectedImage {
                    file: upload.filename.clone(),
                    error: ImageRejection::Io(e).to_string(),
                }),
            }
        }
        if written.is_empty() {
            return Ok(report);
        }

        let gallery = match self.scan(provider) {
            Ok(gallery) => gallery,
            Err(e) => {
                tracing::warn!(person = %person_id, error = %e, "rebuild failed; discarding new images");
                for path in &written {
                    if let Err(e) = std::fs::remove_file(path) {
                        tracing::error!(path = %path.display(), error = %e, "failed to discard image");
                    }
                }
                return Err(e);
            }
        };

        tracing::info!(
            person = %person_id,
            added = report.added.len(),
            rejected = report.errors.len(),
            "enrolled images"
        );
        self.commit(gallery);
        Ok(report)
    }

    /// Validate one upload and confirm it holds exactly one face.
    fn check_upload(
        &self,
        provider: &mut dyn EmbeddingProvider,
        upload: &ImageUpload,
    ) -> Result<String, ImageRejection> {
        let ext = input::allowed_extension(&upload.filename).ok_or(InputError::UnsupportedType)?;
        input::validate_image(&upload.bytes, self.config.max_image_bytes)?;
        match provider.detect_and_encode(&upload.bytes)?.len() {
            0 => Err(ImageRejection::NoFaceDetected),
            1 => Ok(ext),
            n => Err(ImageRejection::MultipleFacesDetected(n)),
        }
    }

    /// Delete every source image of `name` and rebuild the gallery.
    ///
    /// Returns the number of images removed. Either every image goes and the
    /// gallery is rebuilt, or nothing changes.
    pub fn remove_entries(
        &mut self,
        provider: &mut dyn EmbeddingProvider,
        name: &str,
    ) -> Result<usize, StoreError> {
        let person_id = naming::normalize_person_id(name)?;
        let doomed: Vec<_> = self
            .source_images()?
            .into_iter()
            .filter(|img| naming::person_id_from_stem(&img.stem) == person_id)
            .collect();
        if doomed.is_empty() {
            return Err(StoreError::UnknownPerson(person_id));
        }

        // Move the images aside first so a failed rebuild can put them back.
        let mut staged: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(doomed.len());
        for img in &doomed {
            let aside = staged_path(&img.path);
            if let Err(e) = std::fs::rename(&img.path, &aside) {
                tracing::warn!(path = %img.path.display(), error = %e, "failed to remove image");
                restore(&staged);
                return Err(StoreError::io(&img.path, e));
            }
            staged.push((img.path.clone(), aside));
        }

        let gallery = match self.scan(provider) {
            Ok(gallery) => gallery,
            Err(e) => {
                tracing::warn!(person = %person_id, error = %e, "rebuild failed; restoring images");
                restore(&staged);
                return Err(e);
            }
        };

        for (_, aside) in &staged {
            if let Err(e) = std::fs::remove_file(aside) {
                tracing::warn!(path = %aside.display(), error = %e, "failed to delete removed image");
            }
        }
        tracing::info!(person = %person_id, removed = staged.len(), "removed images");
        self.commit(gallery);
        Ok(staged.len())
    }
}

/// Name an image is parked under while its removal is pending. The extension
/// is not an accepted image type, so scans ignore it.
fn staged_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".removing");
    path.with_file_name(name)
}

fn restore(staged: &[(PathBuf, PathBuf)]) {
    for (original, aside) in staged {
        if let Err(e) = std::fs::rename(aside, original) {
            tracing::error!(path = %original.display(), error = %e, "failed to restore image");
        }
    }
}

/// Create `path` exclusively and fill it, removing the file on failure.
fn write_new(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    if let Err(e) = file.write_all(bytes).and_then(|_| file.sync_all()) {
        drop(file);
        let _ = std::fs::remove_file(path);
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{face, png, ScriptedProvider};

    struct Fixture {
        _dir: tempfile::TempDir,
        config: StoreConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let config = StoreConfig::new(dir.path().join("known_faces"), dir.path().join("faces.bin"));
            Self { _dir: dir, config }
        }

        fn seed(&self, filename: &str, bytes: &[u8]) {
            std::fs::create_dir_all(&self.config.known_faces_dir).unwrap();
            std::fs::write(self.config.known_faces_dir.join(filename), bytes).unwrap();
        }

        fn files(&self) -> Vec<String> {
            let mut names: Vec<_> = std::fs::read_dir(&self.config.known_faces_dir)
                .unwrap()
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect();
            names.sort();
            names
        }

        fn store(&self) -> GalleryStore {
            GalleryStore::new(self.config.clone())
        }
    }

    fn upload(name: &str, tag: &str) -> ImageUpload {
        ImageUpload::new(name, png(tag))
    }

    #[test]
    fn test_missing_directory_is_created_and_empty() {
        let fx = Fixture::new();
        let mut provider = ScriptedProvider::new();
        let mut store = fx.store();

        let gallery = store.load(&mut provider, false).unwrap();
        assert!(gallery.is_empty());
        assert!(store.is_loaded());
        assert!(fx.config.known_faces_dir.is_dir());
        assert!(!fx.config.cache_path.exists());
    }

    #[test]
    fn test_scan_groups_by_person_and_writes_cache() {
        let fx = Fixture::new();
        fx.seed("alice_1.jpg", &png("a1"));
        fx.seed("alice_2.png", &png("a2"));
        fx.seed("bob.bmp", &png("b"));
        fx.seed("notes.txt", b"ignore me");
        let mut provider = ScriptedProvider::new()
            .with_faces(&png("a1"), vec![face(&[0.1, 0.0])])
            .with_faces(&png("a2"), vec![face(&[0.2, 0.0])])
            .with_faces(&png("b"), vec![face(&[0.9, 0.9])]);
        let mut store = fx.store();

        let gallery = store.load(&mut provider, false).unwrap();
        assert_eq!(gallery.len(), 3);
        assert_eq!(gallery.count_for("alice"), 2);
        assert_eq!(gallery.count_for("bob"), 1);
        assert!(fx.config.cache_path.exists());
    }

    #[test]
    fn test_scan_skips_faceless_and_takes_first_of_many() {
        let fx = Fixture::new();
        fx.seed("empty.jpg", &png("none"));
        fx.seed("group.jpg", &png("group"));
        let mut provider = ScriptedProvider::new()
            .with_faces(&png("group"), vec![face(&[1.0, 0.0]), face(&[0.0, 1.0])]);
        let mut store = fx.store();

        let gallery = store.load(&mut provider, false).unwrap();
        assert_eq!(gallery.len(), 1);
        assert_eq!(gallery.entries()[0].person_id, "group");
        assert_eq!(gallery.entries()[0].embedding.values, vec![1.0, 0.0]);
    }

    #[test]
    fn test_load_twice_uses_cache_and_is_identical() {
        let fx = Fixture::new();
        fx.seed("alice.jpg", &png("a"));
        let mut provider = ScriptedProvider::new().with_faces(&png("a"), vec![face(&[0.5, 0.25])]);

        let first = fx.store().load(&mut provider, false).unwrap();
        let calls = provider.calls();
        let second = fx.store().load(&mut provider, false).unwrap();

        assert_eq!(*first, *second);
        assert_eq!(provider.calls(), calls, "second load must come from cache");
    }

    #[test]
    fn test_corrupt_cache_triggers_rebuild() {
        let fx = Fixture::new();
        fx.seed("alice.jpg", &png("a"));
        std::fs::write(&fx.config.cache_path, b"garbage").unwrap();
        let mut provider = ScriptedProvider::new().with_faces(&png("a"), vec![face(&[0.5, 0.25])]);

        let gallery = fx.store().load(&mut provider, false).unwrap();
        assert_eq!(gallery.count_for("alice"), 1);
        assert_eq!(provider.calls(), 1);
        assert!(cache::read(&fx.config.cache_path).unwrap().is_some());
    }

    #[test]
    fn test_provider_failure_keeps_previous_gallery() {
        let fx = Fixture::new();
        fx.seed("alice.jpg", &png("a"));
        let mut provider = ScriptedProvider::new().with_faces(&png("a"), vec![face(&[0.5])]);
        let mut store = fx.store();
        store.load(&mut provider, false).unwrap();

        let mut broken = ScriptedProvider::new().with_failure(&png("a"), "down");
        assert!(matches!(store.load(&mut broken, true), Err(StoreError::Provider(_))));
        assert_eq!(store.snapshot().count_for("alice"), 1);
    }

    #[test]
    fn test_single_image_for_new_person_is_unsuffixed() {
        let fx = Fixture::new();
        let mut provider = ScriptedProvider::new().with_faces(&png("a"), vec![face(&[0.1])]);
        let mut store = fx.store();
        store.load(&mut provider, false).unwrap();

        let report = store
            .add_entries(&mut provider, "Alice", &[upload("me.JPG", "a")])
            .unwrap();

        assert_eq!(report.person_id, "alice");
        assert_eq!(report.added.len(), 1);
        assert_eq!(report.added[0].filename, "alice.jpg");
        assert_eq!(fx.files(), vec!["alice.jpg"]);
        assert_eq!(store.snapshot().count_for("alice"), 1);
    }

    #[test]
    fn test_two_images_for_new_person_are_numbered() {
        let fx = Fixture::new();
        let mut provider = ScriptedProvider::new()
            .with_faces(&png("b1"), vec![face(&[0.1])])
            .with_faces(&png("b2"), vec![face(&[0.2])]);
        let mut store = fx.store();

        let report = store
            .add_entries(&mut provider, "bob", &[upload("x.png", "b1"), upload("y.png", "b2")])
            .unwrap();

        let names: Vec<_> = report.added.iter().map(|a| a.filename.as_str()).collect();
        assert_eq!(names, vec!["bob_1.png", "bob_2.png"]);
        assert_eq!(store.snapshot().count_for("bob"), 2);
        assert!(fx.config.cache_path.exists());
    }

    #[test]
    fn test_numbering_continues_from_existing_max() {
        let fx = Fixture::new();
        fx.seed("carol.jpg", &png("c0"));
        fx.seed("carol_4.jpg", &png("c4"));
        fx.seed("caroline.jpg", &png("other"));
        let mut provider = ScriptedProvider::new()
            .with_faces(&png("c0"), vec![face(&[0.1])])
            .with_faces(&png("c4"), vec![face(&[0.2])])
            .with_faces(&png("other"), vec![face(&[0.9])])
            .with_faces(&png("new"), vec![face(&[0.3])]);
        let mut store = fx.store();
        store.load(&mut provider, false).unwrap();

        let report = store
            .add_entries(&mut provider, "carol", &[upload("new.jpg", "new")])
            .unwrap();

        assert_eq!(report.added[0].filename, "carol_5.jpg");
        assert_eq!(store.snapshot().count_for("carol"), 3);
        assert_eq!(store.snapshot().count_for("caroline"), 1);
    }

    #[test]
    fn test_ambiguous_images_rejected_without_mutation() {
        let fx = Fixture::new();
        fx.seed("alice.jpg", &png("a"));
        let mut provider = ScriptedProvider::new()
            .with_faces(&png("a"), vec![face(&[0.1])])
            .with_faces(&png("two"), vec![face(&[0.1]), face(&[0.2])]);
        let mut store = fx.store();
        store.load(&mut provider, false).unwrap();
        let cache_before = std::fs::read(&fx.config.cache_path).unwrap();
        let gallery_before = store.snapshot();

        let report = store
            .add_entries(
                &mut provider,
                "dave",
                &[upload("none.jpg", "zero"), upload("pair.jpg", "two")],
            )
            .unwrap();

        assert!(report.added.is_empty());
        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.errors[0].error, "No face detected in image");
        assert!(report.errors[1].error.starts_with("Multiple faces detected"));
        assert_eq!(fx.files(), vec!["alice.jpg"]);
        assert_eq!(std::fs::read(&fx.config.cache_path).unwrap(), cache_before);
        assert!(Arc::ptr_eq(&gallery_before, &store.snapshot()));
    }

    #[test]
    fn test_partial_batch_keeps_good_images() {
        let fx = Fixture::new();
        let mut provider = ScriptedProvider::new()
            .with_faces(&png("ok"), vec![face(&[0.1])])
            .with_failure(&png("boom"), "provider crashed");
        let mut store = fx.store();

        let report = store
            .add_entries(
                &mut provider,
                "erin",
                &[
                    upload("a.gif", "ok"),
                    upload("b.png", "boom"),
                    ImageUpload::new("c.png", b"not an image".to_vec()),
                    upload("d.png", "ok"),
                ],
            )
            .unwrap();

        assert_eq!(report.added.len(), 1);
        assert_eq!(report.added[0].filename, "erin_1.png");
        assert_eq!(report.errors.len(), 3);
        assert_eq!(report.errors[0].file, "a.gif");
    }

    #[test]
    fn test_add_rejects_bad_name_and_empty_batch() {
        let fx = Fixture::new();
        let mut provider = ScriptedProvider::new();
        let mut store = fx.store();

        assert!(matches!(
            store.add_entries(&mut provider, "  ", &[upload("a.png", "a")]),
            Err(StoreError::Name(NameError::Empty))
        ));
        assert!(matches!(
            store.add_entries(&mut provider, "frank", &[]),
            Err(StoreError::NoImages)
        ));
    }

    #[test]
    fn test_remove_entries_deletes_person_and_rebuilds() {
        let fx = Fixture::new();
        fx.seed("gina_1.jpg", &png("g1"));
        fx.seed("gina_2.jpg", &png("g2"));
        fx.seed("hank.jpg", &png("h"));
        let mut provider = ScriptedProvider::new()
            .with_faces(&png("g1"), vec![face(&[0.1])])
            .with_faces(&png("g2"), vec![face(&[0.2])])
            .with_faces(&png("h"), vec![face(&[0.3])]);
        let mut store = fx.store();
        store.load(&mut provider, false).unwrap();

        assert_eq!(store.remove_entries(&mut provider, "Gina").unwrap(), 2);
        assert_eq!(fx.files(), vec!["hank.jpg"]);
        assert_eq!(store.list_people().into_iter().collect::<Vec<_>>(), vec![("hank".to_string(), 1)]);

        let cached = cache::read(&fx.config.cache_path).unwrap().unwrap();
        assert_eq!(cached.len(), 1);
        assert!(matches!(
            store.remove_entries(&mut provider, "gina"),
            Err(StoreError::UnknownPerson(_))
        ));
    }

    /// Files, cache bytes and published snapshot, for before/after comparisons.
    fn state(fx: &Fixture, store: &GalleryStore) -> (Vec<String>, Option<Vec<u8>>, Arc<Gallery>) {
        (fx.files(), std::fs::read(&fx.config.cache_path).ok(), store.snapshot())
    }

    fn assert_unchanged(
        before: &(Vec<String>, Option<Vec<u8>>, Arc<Gallery>),
        fx: &Fixture,
        store: &GalleryStore,
    ) {
        let after = state(fx, store);
        assert_eq!(before.0, after.0, "source images changed");
        assert_eq!(before.1, after.1, "cache changed");
        assert!(Arc::ptr_eq(&before.2, &after.2), "snapshot replaced");
    }

    #[test]
    fn test_failed_rebuild_discards_enrollment() {
        let fx = Fixture::new();
        fx.seed("zed.jpg", &png("z"));
        let mut provider = ScriptedProvider::new()
            .with_faces(&png("a"), vec![face(&[0.1])])
            .with_faces(&png("z"), vec![face(&[0.9])]);
        let mut store = fx.store();
        store.load(&mut provider, false).unwrap();
        let before = state(&fx, &store);

        // The upload itself is fine, but zed.jpg can no longer be embedded.
        let mut flaky = ScriptedProvider::new()
            .with_faces(&png("a"), vec![face(&[0.1])])
            .with_failure(&png("z"), "model server down");
        let result = store.add_entries(&mut flaky, "alice", &[upload("a.png", "a")]);

        assert!(matches!(result, Err(StoreError::Provider(_))));
        assert_unchanged(&before, &fx, &store);
        assert_eq!(store.snapshot().count_for("alice"), 0);

        // A later attempt numbers from scratch.
        let report = store
            .add_entries(&mut provider, "alice", &[upload("a.png", "a")])
            .unwrap();
        assert_eq!(report.added[0].filename, "alice.png");
    }

    #[test]
    fn test_failed_rebuild_restores_removed_images() {
        let fx = Fixture::new();
        fx.seed("gina_1.jpg", &png("g1"));
        fx.seed("gina_2.jpg", &png("g2"));
        fx.seed("hank.jpg", &png("h"));
        let mut provider = ScriptedProvider::new()
            .with_faces(&png("g1"), vec![face(&[0.1])])
            .with_faces(&png("g2"), vec![face(&[0.2])])
            .with_faces(&png("h"), vec![face(&[0.3])]);
        let mut store = fx.store();
        store.load(&mut provider, false).unwrap();
        let before = state(&fx, &store);

        let mut flaky = ScriptedProvider::new().with_failure(&png("h"), "model server down");
        let result = store.remove_entries(&mut flaky, "gina");

        assert!(matches!(result, Err(StoreError::Provider(_))));
        assert_unchanged(&before, &fx, &store);
        assert_eq!(store.snapshot().count_for("gina"), 2);
    }

    #[test]
    fn test_remove_that_cannot_move_every_image_changes_nothing() {
        let fx = Fixture::new();
        fx.seed("gina_1.jpg", &png("g1"));
        fx.seed("gina_2.jpg", &png("g2"));
        // Occupies the name gina_2.jpg would be parked under.
        std::fs::create_dir(fx.config.known_faces_dir.join("gina_2.jpg.removing")).unwrap();
        let mut provider = ScriptedProvider::new()
            .with_faces(&png("g1"), vec![face(&[0.1])])
            .with_faces(&png("g2"), vec![face(&[0.2])]);
        let mut store = fx.store();
        store.load(&mut provider, false).unwrap();
        let before = state(&fx, &store);
        let calls = provider.calls();

        let result = store.remove_entries(&mut provider, "gina");

        assert!(matches!(result, Err(StoreError::Io { .. })));
        assert_unchanged(&before, &fx, &store);
        assert_eq!(provider.calls(), calls, "no rebuild after a failed move");
    }

    #[test]
    fn test_scan_skips_images_the_provider_refuses() {
        let fx = Fixture::new();
        fx.seed("alice.jpg", &png("a"));
        fx.seed("broken.jpg", &png("broken"));
        let mut provider = ScriptedProvider::new()
            .with_faces(&png("a"), vec![face(&[0.1])])
            .with_rejection(&png("broken"), "cannot decode");

        let gallery = fx.store().load(&mut provider, false).unwrap();
        assert_eq!(gallery.len(), 1);
        assert_eq!(gallery.count_for("alice"), 1);
    }

    #[test]
    fn test_enroll_past_largest_index_is_refused() {
        let fx = Fixture::new();
        fx.seed(&format!("bob_{}.jpg", u32::MAX), &png("b"));
        let mut provider = ScriptedProvider::new()
            .with_faces(&png("b"), vec![face(&[0.1])])
            .with_faces(&png("n"), vec![face(&[0.2])]);
        let mut store = fx.store();
        store.load(&mut provider, false).unwrap();
        let before = state(&fx, &store);

        let result = store.add_entries(&mut provider, "bob", &[upload("n.png", "n")]);

        assert!(matches!(result, Err(StoreError::Name(NameError::IndexExhausted(_)))));
        assert_unchanged(&before, &fx, &store);
    }

    #[test]
    fn test_removing_last_person_empties_gallery_and_cache() {
        let fx = Fixture::new();
        fx.seed("ivy.jpg", &png("i"));
        let mut provider = ScriptedProvider::new().with_faces(&png("i"), vec![face(&[0.1])]);
        let mut store = fx.store();
        store.load(&mut provider, false).unwrap();

        store.remove_entries(&mut provider, "ivy").unwrap();
        assert!(store.snapshot().is_empty());
        assert!(!fx.config.cache_path.exists());
    }
}
