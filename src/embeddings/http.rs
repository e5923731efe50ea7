use super::{EmbeddingProvider, ImageFeatures, ImageInput, ModelOptions};
use crate::error::{CirevalError, Result};
use base64::Engine as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Request structure for the index-mode endpoint
#[derive(Serialize)]
struct IndexRequest<'a> {
    model: &'a ModelOptions,
    images: Vec<EncodedImage<'a>>,
}

#[derive(Serialize)]
struct EncodedImage<'a> {
    id: &'a str,
    /// Base64 (standard alphabet) file contents
    data: String,
}

#[derive(Deserialize)]
struct IndexResponse {
    features: Vec<FeaturePair>,
}

#[derive(Deserialize)]
struct FeaturePair {
    raw: Vec<f32>,
    normed: Vec<f32>,
}

/// Request structure for the fusion endpoint
#[derive(Serialize)]
struct FuseRequest<'a> {
    model: &'a ModelOptions,
    reference_features: &'a [Vec<f32>],
    texts: &'a [String],
}

#[derive(Deserialize)]
struct FuseResponse {
    features: Vec<Vec<f32>>,
}

/// Model server status (`GET /v1/status`)
#[derive(Debug, Clone, Deserialize)]
pub struct ServerStatus {
    pub model: String,
    #[serde(default)]
    pub devices: Vec<DeviceStatus>,
}

/// One accelerator as reported by the model server
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceStatus {
    pub name: String,
    #[serde(default)]
    pub memory_allocated: u64,
    #[serde(default)]
    pub memory_reserved: u64,
}

/// Client for a model server hosting the fusion model
///
/// Every request carries the [`ModelOptions`] so the server loads the right checkpoint
/// and preprocessing. Failures are returned immediately: evaluation runs over static
/// data, so a failed request is not retried.
pub struct HttpEmbedder {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    batch_size: usize,
    dimensions: usize,
    options: ModelOptions,
}

impl HttpEmbedder {
    /// Create a new model server client
    ///
    /// # Arguments
    ///
    /// * `endpoint` - Base URL (e.g. "http://127.0.0.1:8000")
    /// * `api_key` - Optional bearer token
    /// * `batch_size` - Maximum number of items per request
    /// * `dimensions` - Expected width of normalized and fused embeddings
    /// * `timeout` - Per-request timeout
    /// * `options` - Model and preprocessing selection
    pub fn new(
        endpoint: &str,
        api_key: Option<String>,
        batch_size: usize,
        dimensions: usize,
        timeout: Duration,
        options: ModelOptions,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CirevalError::Embedding(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            batch_size: batch_size.max(1),
            dimensions,
            options,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn read_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());

            return Err(CirevalError::Embedding(format!(
                "Model server error {}: {}",
                status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| CirevalError::Embedding(format!("Failed to parse response: {}", e)))
    }

    /// Query the model server's loaded model and device memory
    pub async fn status(&self) -> Result<ServerStatus> {
        let response = self
            .authorize(self.client.get(self.url("v1/status")))
            .send()
            .await
            .map_err(|e| CirevalError::Embedding(format!("Network error: {}", e)))?;
        Self::read_json(response).await
    }

    async fn embed_images_internal(&self, images: &[ImageInput]) -> Result<Vec<ImageFeatures>> {
        let engine = base64::engine::general_purpose::STANDARD;
        let request = IndexRequest {
            model: &self.options,
            images: images
                .iter()
                .map(|image| EncodedImage {
                    id: &image.name,
                    data: engine.encode(&image.bytes),
                })
                .collect(),
        };

        let response = self
            .authorize(self.client.post(self.url("v1/index")))
            .json(&request)
            .send()
            .await
            .map_err(|e| CirevalError::Embedding(format!("Network error: {}", e)))?;

        let result: IndexResponse = Self::read_json(response).await?;
        expect_count("index", images.len(), result.features.len())?;
        for (image, pair) in images.iter().zip(&result.features) {
            self.expect_width("index", &image.name, pair.normed.len())?;
        }

        Ok(result
            .features
            .into_iter()
            .map(|pair| ImageFeatures {
                raw: pair.raw,
                normed: pair.normed,
            })
            .collect())
    }

    async fn fuse_internal(&self, reference_features: &[Vec<f32>], texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = FuseRequest {
            model: &self.options,
            reference_features,
            texts,
        };

        let response = self
            .authorize(self.client.post(self.url("v1/fuse")))
            .json(&request)
            .send()
            .await
            .map_err(|e| CirevalError::Embedding(format!("Network error: {}", e)))?;

        let result: FuseResponse = Self::read_json(response).await?;
        expect_count("fuse", texts.len(), result.features.len())?;
        for (text, features) in texts.iter().zip(&result.features) {
            self.expect_width("fuse", text, features.len())?;
        }
        Ok(result.features)
    }

    fn expect_width(&self, endpoint: &str, input: &str, got: usize) -> Result<()> {
        if got != self.dimensions {
            return Err(CirevalError::Embedding(format!(
                "{} returned a {}-d embedding for {:?}, expected {}",
                endpoint, got, input, self.dimensions
            )));
        }
        Ok(())
    }
}

fn expect_count(endpoint: &str, expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(CirevalError::Embedding(format!(
            "{} returned {} embeddings for {} inputs",
            endpoint, got, expected
        )));
    }
    Ok(())
}

impl EmbeddingProvider for HttpEmbedder {
    async fn embed_images(&self, images: &[ImageInput]) -> Result<Vec<ImageFeatures>> {
        let mut all = Vec::with_capacity(images.len());
        for chunk in images.chunks(self.batch_size) {
            all.extend(self.embed_images_internal(chunk).await?);
        }
        Ok(all)
    }

    async fn fuse(&self, reference_features: &[Vec<f32>], texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if reference_features.len() != texts.len() {
            return Err(CirevalError::InvalidInput(format!(
                "fuse needs one text per reference ({} references, {} texts)",
                reference_features.len(),
                texts.len()
            )));
        }
        let mut all = Vec::with_capacity(texts.len());
        for (refs, txts) in reference_features
            .chunks(self.batch_size)
            .zip(texts.chunks(self.batch_size))
        {
            all.extend(self.fuse_internal(refs, txts).await?);
        }
        Ok(all)
    }
}
