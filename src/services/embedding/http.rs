use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::Encoder;
use crate::error::EncodingError;
use crate::models::EncoderConfig;

/// Request body for the /embed endpoint.
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    inputs: [&'a str; 1],
}

/// Response from the /embed endpoint: one vector per input.
#[derive(Debug, Deserialize)]
struct EmbedResponse(Vec<Vec<f32>>);

/// Requests image embeddings from an HTTP embedding server.
///
/// The server reads the file itself; only the path travels over the wire.
#[derive(Debug, Clone)]
pub struct HttpEncoder {
    client: Client,
    base_url: String,
}

impl HttpEncoder {
    pub fn new(config: &EncoderConfig) -> Result<Self, EncodingError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EncodingError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Encoder for HttpEncoder {
    async fn encode(&self, path: &Path) -> Result<Vec<f32>, EncodingError> {
        let url = format!("{}/embed", self.base_url);
        let path = path.to_string_lossy();
        let request = EmbedRequest { inputs: [&*path] };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EncodingError::Timeout
                } else if e.is_connect() {
                    EncodingError::ConnectionError(e.to_string())
                } else {
                    EncodingError::RequestError(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EncodingError::ServerError(format!(
                "status {}: {}",
                status, body
            )));
        }

        let EmbedResponse(vectors) = response
            .json()
            .await
            .map_err(|e| EncodingError::InvalidResponse(e.to_string()))?;

        vectors
            .into_iter()
            .next()
            .ok_or_else(|| EncodingError::InvalidResponse("empty embedding response".to_string()))
    }

    fn name(&self) -> &str {
        "http"
    }
}
