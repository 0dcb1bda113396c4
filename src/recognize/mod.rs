//! LaTeX recognition contract
//!
//! Converting a cropped equation image to a LaTeX string is an external
//! collaborator concern. The core calls [`LatexRecognizer::recognize`] and
//! takes whatever comes back: the string may be empty or malformed, and
//! validating it is a separate collaborator entirely. No timeout is imposed
//! here; callers bound the call externally.

use async_trait::async_trait;
use base64::Engine;
use thiserror::Error;

/// Errors from the recognition collaborator
#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("recognition API error: {0}")]
    Api(String),

    #[error("recognition backend unavailable: {0}")]
    Unavailable(String),
}

/// Recognition collaborator: cropped PNG in, LaTeX string out
#[async_trait]
pub trait LatexRecognizer: Send + Sync {
    async fn recognize(&self, crop_png: &[u8]) -> Result<String, RecognitionError>;
}

/// HTTP-backed recognizer
///
/// Posts `{"image": "<base64 png>"}` to the configured endpoint and reads the
/// `latex` field of the JSON response. Shaped for a self-hosted pix2tex-style
/// recognition service.
pub struct HttpRecognizer {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpRecognizer {
    pub fn new(endpoint: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.to_string(),
        }
    }
}

#[async_trait]
impl LatexRecognizer for HttpRecognizer {
    async fn recognize(&self, crop_png: &[u8]) -> Result<String, RecognitionError> {
        let image_base64 = base64::engine::general_purpose::STANDARD.encode(crop_png);
        let request = serde_json::json!({ "image": image_base64 });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| RecognitionError::Unavailable(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RecognitionError::Api(format!(
                "recognizer returned {status}: {body}"
            )));
        }

        let result: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RecognitionError::Api(format!("bad response body: {e}")))?;

        Ok(result["latex"].as_str().unwrap_or("").to_string())
    }
}
