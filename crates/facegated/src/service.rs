//! Recognizer service: the single entry point transports call into.

use crate::attendance::{
    AttendanceDecision, AttendanceError, AttendanceLog, AttendanceRecord, AttendanceStats,
};
use crate::engine::{EngineError, EngineHandle};
use facegate_core::input::{self, InputError};
use facegate_core::naming::NameError;
use facegate_core::{
    EnrollmentReport, EuclideanMatcher, ImageUpload, MatchResult, Matcher, ProviderError,
    StoreError,
};
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("invalid input: {0}")]
    Input(#[from] InputError),
    #[error("invalid name: {0}")]
    InvalidName(#[from] NameError),
    #[error("no known faces loaded; enroll at least one person first")]
    GalleryEmpty,
    #[error("no valid images added ({} rejected)", .0.errors.len())]
    NoImagesAdded(EnrollmentReport),
    #[error("no enrolled images for {0}")]
    UnknownPerson(String),
    #[error("processing error: {0}")]
    Provider(#[from] ProviderError),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("attendance log: {0}")]
    Attendance(#[from] AttendanceError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<EngineError> for ServiceError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::GalleryEmpty => Self::GalleryEmpty,
            EngineError::Provider(p) => Self::Provider(p),
            EngineError::Store(StoreError::Provider(p)) => Self::Provider(p),
            EngineError::Store(StoreError::Name(n)) => Self::InvalidName(n),
            EngineError::Store(StoreError::NoImages) => Self::Input(InputError::Empty),
            EngineError::Store(StoreError::UnknownPerson(p)) => Self::UnknownPerson(p),
            other => Self::Internal(other.to_string()),
        }
    }
}

/// Tunables for the recognizer service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub tolerance: f32,
    pub request_timeout: Duration,
    pub max_upload_bytes: usize,
}

/// One recognized face, in transport shape.
#[derive(Debug, Clone, Serialize)]
pub struct RecognizedFace {
    pub name: String,
    pub confidence: f32,
    pub location: facegate_core::BoundingBox,
}

impl From<&MatchResult> for RecognizedFace {
    fn from(m: &MatchResult) -> Self {
        Self {
            name: m.name().to_string(),
            // Two decimals on the wire.
            confidence: (m.confidence * 100.0).round() / 100.0,
            location: m.location,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersonSummary {
    pub name: String,
    pub image_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub known_people_count: usize,
    pub total_encodings_count: usize,
}

/// Recognition, enrollment, and attendance over a shared gallery.
///
/// Cheap to clone; clones share the engine thread and the attendance log.
#[derive(Clone)]
pub struct RecognizerService {
    engine: EngineHandle,
    attendance: AttendanceLog,
    matcher: EuclideanMatcher,
    config: ServiceConfig,
}

impl RecognizerService {
    pub fn new(engine: EngineHandle, attendance: AttendanceLog, config: ServiceConfig) -> Self {
        Self {
            engine,
            attendance,
            matcher: EuclideanMatcher,
            config,
        }
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, ServiceError>
    where
        F: Future<Output = Result<T, EngineError>>,
    {
        match tokio::time::timeout(self.config.request_timeout, fut).await {
            Ok(result) => result.map_err(ServiceError::from),
            Err(_) => {
                tracing::warn!(timeout = ?self.config.request_timeout, "request timed out");
                Err(ServiceError::Timeout(self.config.request_timeout))
            }
        }
    }

    /// Load (or with `force`, rebuild) the gallery. Returns the encoding count.
    pub async fn load(&self, force: bool) -> Result<usize, ServiceError> {
        let gallery = self.bounded(self.engine.load(force)).await?;
        Ok(gallery.len())
    }

    /// Match every face in `image` against the gallery, in detection order.
    pub async fn recognize(&self, image: Vec<u8>) -> Result<Vec<MatchResult>, ServiceError> {
        input::validate_image(&image, self.config.max_upload_bytes)?;

        let extraction = self.bounded(self.engine.extract(image)).await?;
        let results =
            self.matcher
                .match_faces(&extraction.faces, &extraction.gallery, self.config.tolerance);

        tracing::info!(
            faces = results.len(),
            matched = results.iter().filter(|r| r.is_match()).count(),
            "recognize complete"
        );
        Ok(results)
    }

    /// Enroll images for `name`. Succeeds if at least one image was accepted.
    pub async fn enroll(
        &self,
        name: &str,
        uploads: Vec<ImageUpload>,
    ) -> Result<EnrollmentReport, ServiceError> {
        if uploads.is_empty() {
            return Err(InputError::Empty.into());
        }
        let report = self
            .bounded(self.engine.enroll(name.to_string(), uploads))
            .await?;
        if report.added.is_empty() {
            return Err(ServiceError::NoImagesAdded(report));
        }
        Ok(report)
    }

    /// Remove every image of `name`. Returns how many were deleted.
    pub async fn remove_person(&self, name: &str) -> Result<usize, ServiceError> {
        self.bounded(self.engine.remove(name.to_string())).await
    }

    /// Enrolled people with their image counts, sorted by name.
    pub async fn list_people(&self) -> Result<Vec<PersonSummary>, ServiceError> {
        let gallery = self.bounded(self.engine.snapshot()).await?;
        Ok(gallery
            .people()
            .iter()
            .map(|(name, count)| PersonSummary {
                name: name.clone(),
                image_count: *count,
            })
            .collect())
    }

    pub async fn health(&self) -> Result<Health, ServiceError> {
        let gallery = self.bounded(self.engine.snapshot()).await?;
        Ok(Health {
            status: "ok",
            known_people_count: gallery.people_count(),
            total_encodings_count: gallery.len(),
        })
    }

    /// Recognize `image` and decide whether to open the door.
    ///
    /// The first detected face decides. Decisions on a face are logged to the
    /// attendance database; a logging failure does not change the decision.
    pub async fn record_attendance(
        &self,
        image: Vec<u8>,
    ) -> Result<AttendanceDecision, ServiceError> {
        let results = self.recognize(image).await?;
        let Some(first) = results.first() else {
            return Ok(AttendanceDecision::no_face());
        };

        let record = AttendanceRecord::new(first);
        let decision = AttendanceDecision::from_record(&record);
        if let Err(e) = self.attendance.insert(record.clone()).await {
            tracing::error!(error = %e, id = %record.id, "failed to save attendance record");
        } else {
            tracing::info!(id = %record.id, name = %record.name, status = %record.status, "attendance recorded");
        }
        Ok(decision)
    }

    pub async fn recent_attendance(&self, limit: u32) -> Result<Vec<AttendanceRecord>, ServiceError> {
        Ok(self.attendance.recent(limit).await?)
    }

    pub async fn attendance_by_name(
        &self,
        name: &str,
        limit: u32,
    ) -> Result<Vec<AttendanceRecord>, ServiceError> {
        Ok(self.attendance.by_name(name, limit).await?)
    }

    pub async fn attendance_stats(&self) -> Result<AttendanceStats, ServiceError> {
        Ok(self.attendance.stats().await?)
    }
}
