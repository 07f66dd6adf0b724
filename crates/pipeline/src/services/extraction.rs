//! Text extraction from image and audio input.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use solver_core::Modality;
use tracing::debug;

use crate::error::{PipelineError, Result};

/// Result of extracting problem text from a non-text payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Extraction {
    pub text: String,
    pub confidence: f32,
}

/// Whether the extracted transcript must be confirmed by the user before
/// solving.
///
/// Image transcripts always go through review; audio transcripts only when
/// extraction confidence falls below the threshold. Direct text never does.
pub fn needs_confirmation(modality: Modality, confidence: f32, threshold: f32) -> bool {
    match modality {
        Modality::Image => true,
        Modality::Audio => confidence < threshold,
        Modality::Text => false,
    }
}

#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, modality: Modality, payload_base64: &str) -> Result<Extraction>;
}

/// Extraction backed by an external OCR/ASR service.
#[derive(Clone)]
pub struct HttpExtractor {
    client: Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct ExtractRequest<'a> {
    modality: &'a str,
    data: &'a str,
}

impl HttpExtractor {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Extractor for HttpExtractor {
    async fn extract(&self, modality: Modality, payload_base64: &str) -> Result<Extraction> {
        debug!(modality = modality.as_str(), "extracting problem text");

        let response = self
            .client
            .post(format!("{}/extract", self.base_url))
            .json(&ExtractRequest {
                modality: modality.as_str(),
                data: payload_base64,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(PipelineError::Api {
                message: format!("Extraction service error: {error_text}"),
                status_code: Some(status.as_u16()),
            });
        }

        let mut extraction: Extraction = response.json().await.map_err(|e| PipelineError::Api {
            message: format!("Malformed extraction response: {e}"),
            status_code: None,
        })?;
        extraction.confidence = extraction.confidence.clamp(0.0, 1.0);

        Ok(extraction)
    }
}
