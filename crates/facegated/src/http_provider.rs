//! Embedding provider backed by an HTTP model service.
//!
//! `POST <base>/encode` with a multipart `image` field; the service answers
//! `{"faces": [{"location": {top, right, bottom, left}, "embedding": [f32...]}]}`.

use facegate_core::{BoundingBox, DetectedFace, Embedding, EmbeddingProvider, ProviderError};
use reqwest::blocking::{multipart, Client};
use serde::Deserialize;
use std::time::Duration;

#[derive(Deserialize)]
struct EncodeResponse {
    faces: Vec<WireFace>,
}

#[derive(Deserialize)]
struct WireFace {
    location: BoundingBox,
    embedding: Vec<f32>,
}

pub struct HttpProvider {
    endpoint: String,
    timeout: Duration,
    // Built on first use: the blocking client must not be created inside the
    // async runtime, and the provider only runs on the engine thread.
    client: Option<Client>,
}

impl HttpProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            endpoint: format!("{}/encode", base_url.trim_end_matches('/')),
            timeout,
            client: None,
        }
    }

    fn client(&mut self) -> Result<&Client, ProviderError> {
        if self.client.is_none() {
            let client = Client::builder()
                .timeout(self.timeout)
                .build()
                .map_err(|e| ProviderError::Unavailable(format!("building HTTP client: {e}")))?;
            self.client = Some(client);
        }
        self.client
            .as_ref()
            .ok_or_else(|| ProviderError::Unavailable("HTTP client missing".into()))
    }

    fn map_send_error(&self, e: reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            ProviderError::Timeout(self.timeout.as_millis() as u64)
        } else {
            ProviderError::Unavailable(e.to_string())
        }
    }
}

/// Check the decoded faces share one non-zero embedding dimension.
fn into_faces(response: EncodeResponse) -> Result<Vec<DetectedFace>, ProviderError> {
    let dim = response.faces.first().map(|f| f.embedding.len());
    if dim == Some(0) {
        return Err(ProviderError::BadResponse("empty embedding".into()));
    }
    response
        .faces
        .into_iter()
        .map(|f| {
            if Some(f.embedding.len()) != dim {
                return Err(ProviderError::BadResponse(format!(
                    "embedding dimension {} differs from {}",
                    f.embedding.len(),
                    dim.unwrap_or(0)
                )));
            }
            Ok(DetectedFace {
                location: f.location,
                embedding: Embedding::new(f.embedding),
            })
        })
        .collect()
}

impl EmbeddingProvider for HttpProvider {
    fn detect_and_encode(&mut self, image: &[u8]) -> Result<Vec<DetectedFace>, ProviderError> {
        let endpoint = self.endpoint.clone();
        let form = multipart::Form::new().part(
            "image",
            multipart::Part::bytes(image.to_vec()).file_name("image"),
        );

        let request = self.client()?.post(&endpoint).multipart(form);
        let response = request.send().map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(if status.is_client_error() {
                ProviderError::Rejected(format!("{status}: {body}"))
            } else {
                ProviderError::Unavailable(format!("{status}: {body}"))
            });
        }

        let decoded: EncodeResponse = response
            .json()
            .map_err(|e| ProviderError::BadResponse(e.to_string()))?;
        into_faces(decoded)
    }

    fn name(&self) -> &str {
        &self.endpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<Vec<DetectedFace>, ProviderError> {
        into_faces(serde_json::from_str(json).unwrap())
    }

    #[test]
    fn test_endpoint_joins_cleanly() {
        let p = HttpProvider::new("http://localhost:5002/", Duration::from_secs(1));
        assert_eq!(p.name(), "http://localhost:5002/encode");
    }

    #[test]
    fn test_decodes_faces_in_order() {
        let faces = parse(
            r#"{"faces": [
                {"location": {"top": 1, "right": 9, "bottom": 9, "left": 1}, "embedding": [0.5, 0.25]},
                {"location": {"top": 20, "right": 40, "bottom": 40, "left": 20}, "embedding": [0.0, 1.0]}
            ]}"#,
        )
        .unwrap();
        assert_eq!(faces.len(), 2);
        assert_eq!(faces[0].location, BoundingBox::new(1, 9, 9, 1));
        assert_eq!(faces[1].embedding.values, vec![0.0, 1.0]);
    }

    #[test]
    fn test_no_faces_is_empty() {
        assert!(parse(r#"{"faces": []}"#).unwrap().is_empty());
    }

    #[test]
    fn test_mismatched_dimensions_rejected() {
        let result = parse(
            r#"{"faces": [
                {"location": {"top": 0, "right": 1, "bottom": 1, "left": 0}, "embedding": [0.5, 0.25]},
                {"location": {"top": 0, "right": 1, "bottom": 1, "left": 0}, "embedding": [0.5]}
            ]}"#,
        );
        assert!(matches!(result, Err(ProviderError::BadResponse(_))));
    }

    #[test]
    fn test_unreachable_service_is_unavailable() {
        // Port 9 (discard) on localhost is not expected to run an HTTP server.
        let mut p = HttpProvider::new("http://127.0.0.1:9", Duration::from_secs(2));
        let result = p.detect_and_encode(b"\x89PNG\r\n\x1a\n");
        assert!(matches!(
            result,
            Err(ProviderError::Unavailable(_)) | Err(ProviderError::Timeout(_))
        ));
    }
}
