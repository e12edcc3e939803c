use crate::service::{RecognizedFace, RecognizerService, ServiceError};
use facegate_core::{ImageUpload, MatchResult};
use serde::Serialize;
use zbus::{interface, DBusError};

pub const BUS_NAME: &str = "org.facegate.Facegate1";
pub const OBJECT_PATH: &str = "/org/facegate/Facegate1";

/// Errors returned over D-Bus, one name per failure class.
#[derive(Debug, DBusError)]
#[zbus(prefix = "org.facegate.Facegate1.Error")]
pub enum FacegateError {
    /// Failure in the D-Bus layer itself.
    #[zbus(error)]
    ZBus(zbus::Error),
    /// Malformed image, empty upload, or bad name.
    InvalidInput(String),
    /// Nobody enrolled yet; retry after enrolling.
    GalleryEmpty(String),
    /// Every enrollment image was rejected. Payload is the JSON report.
    NoImagesAdded(String),
    /// No enrolled images under that name.
    UnknownPerson(String),
    /// The embedding provider failed.
    Processing(String),
    /// The request outlived the configured request timeout.
    Timeout(String),
    /// Attendance database or other unexpected failure.
    Internal(String),
}

impl From<ServiceError> for FacegateError {
    fn from(e: ServiceError) -> Self {
        let msg = e.to_string();
        match e {
            ServiceError::Input(_) | ServiceError::InvalidName(_) => Self::InvalidInput(msg),
            ServiceError::GalleryEmpty => Self::GalleryEmpty(msg),
            ServiceError::NoImagesAdded(report) => {
                Self::NoImagesAdded(serde_json::to_string(&report).unwrap_or(msg))
            }
            ServiceError::UnknownPerson(_) => Self::UnknownPerson(msg),
            ServiceError::Provider(_) => Self::Processing(msg),
            ServiceError::Timeout(_) => Self::Timeout(msg),
            ServiceError::Attendance(_) | ServiceError::Internal(_) => Self::Internal(msg),
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String, FacegateError> {
    serde_json::to_string(value).map_err(|e| FacegateError::Internal(e.to_string()))
}

#[derive(Serialize)]
struct RecognizeReply {
    success: bool,
    faces_detected: usize,
    faces: Vec<RecognizedFace>,
}

fn recognize_reply(results: &[MatchResult]) -> RecognizeReply {
    RecognizeReply {
        success: true,
        faces_detected: results.len(),
        faces: results.iter().map(RecognizedFace::from).collect(),
    }
}

/// D-Bus interface for the facegate daemon.
///
/// Bus name: org.facegate.Facegate1
/// Object path: /org/facegate/Facegate1
pub struct FacegateService {
    service: RecognizerService,
}

impl FacegateService {
    pub fn new(service: RecognizerService) -> Self {
        Self { service }
    }
}

#[interface(name = "org.facegate.Facegate1")]
impl FacegateService {
    /// Recognize every face in an encoded image.
    async fn recognize(&self, image: Vec<u8>) -> Result<String, FacegateError> {
        tracing::info!(bytes = image.len(), "recognize requested");
        let results = self.service.recognize(image).await?;
        to_json(&recognize_reply(&results))
    }

    /// Enroll `(filename, bytes)` images under `name`.
    async fn enroll(
        &self,
        name: &str,
        images: Vec<(String, Vec<u8>)>,
    ) -> Result<String, FacegateError> {
        tracing::info!(name, images = images.len(), "enroll requested");
        let uploads = images
            .into_iter()
            .map(|(filename, bytes)| ImageUpload::new(filename, bytes))
            .collect();
        let report = self.service.enroll(name, uploads).await?;
        to_json(&report)
    }

    async fn list_people(&self) -> Result<String, FacegateError> {
        to_json(&self.service.list_people().await?)
    }

    /// Remove every image of `name`; returns how many were deleted.
    async fn remove_person(&self, name: &str) -> Result<u32, FacegateError> {
        tracing::info!(name, "remove_person requested");
        let removed = self.service.remove_person(name).await?;
        Ok(removed as u32)
    }

    /// Rebuild the gallery from source images; returns the encoding count.
    async fn reload(&self) -> Result<u32, FacegateError> {
        tracing::info!("reload requested");
        Ok(self.service.load(true).await? as u32)
    }

    async fn health(&self) -> Result<String, FacegateError> {
        let health = self.service.health().await?;
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "status": health.status,
            "known_people_count": health.known_people_count,
            "total_encodings_count": health.total_encodings_count,
        })
        .to_string())
    }

    /// Attendance check for a door controller.
    async fn record_attendance(&self, image: Vec<u8>) -> Result<String, FacegateError> {
        let decision = self.service.record_attendance(image).await?;
        to_json(&decision)
    }

    /// Latest attendance records; an empty `name` means everyone.
    async fn recent_attendance(&self, name: &str, limit: u32) -> Result<String, FacegateError> {
        let records = if name.is_empty() {
            self.service.recent_attendance(limit).await?
        } else {
            self.service.attendance_by_name(name, limit).await?
        };
        to_json(&records)
    }

    async fn attendance_stats(&self) -> Result<String, FacegateError> {
        to_json(&self.service.attendance_stats().await?)
    }
}
