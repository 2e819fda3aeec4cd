//! Ollama client for answer generation.
//!
//! Sends the stuffed retrieval-QA prompt to `POST {host}:{port}/api/generate`
//! with `stream=false` and reports every supplied passage as cited, in
//! retrieval order.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use medinteract_core::generation::{Generation, GenerationProvider, GenerationRequest};

use crate::config::GenerationConfig;

/// Errors produced by [`OllamaGenerator`].
#[derive(Debug, Error)]
pub enum OllamaError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status} from {url}: {snippet}")]
    HttpStatus {
        status: StatusCode,
        url: String,
        snippet: String,
    },

    #[error("failed to decode response: {0}")]
    Decode(String),
}

/// Generation backend backed by an Ollama server.
pub struct OllamaGenerator {
    client: reqwest::Client,
    cfg: GenerationConfig,
    url_generate: String,
}

impl OllamaGenerator {
    pub fn new(cfg: GenerationConfig) -> Result<Self, OllamaError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        let url_generate = format!("{}/api/generate", cfg.base_url());

        Ok(Self {
            client,
            cfg,
            url_generate,
        })
    }

    /// Non-streaming completion of a raw prompt.
    #[instrument(skip_all, fields(model = %self.cfg.model))]
    pub async fn complete(&self, prompt: &str) -> Result<String, OllamaError> {
        let body = GenerateRequest::from_cfg(&self.cfg, prompt);

        debug!("POST {}", self.url_generate);
        let resp = self
            .client
            .post(&self.url_generate)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(OllamaError::HttpStatus {
                status,
                url: self.url_generate.clone(),
                snippet: text.chars().take(240).collect(),
            });
        }

        let out: GenerateResponse = resp.json().await.map_err(|e| {
            OllamaError::Decode(format!("serde error: {e}; ensure `stream=false` is used"))
        })?;

        Ok(out.response)
    }
}

#[async_trait]
impl GenerationProvider for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.cfg.model
    }

    async fn generate(&self, request: &GenerationRequest) -> anyhow::Result<Generation> {
        let text = self.complete(&request.stuffed_prompt()).await?;
        Ok(Generation {
            text,
            cited: request.passages.clone(),
        })
    }
}

/// Request body for `/api/generate` (non-streaming).
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    keep_alive: &'a str,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

impl<'a> GenerateRequest<'a> {
    fn from_cfg(cfg: &'a GenerationConfig, prompt: &'a str) -> Self {
        Self {
            model: &cfg.model,
            prompt,
            stream: false,
            keep_alive: &cfg.keep_alive,
            options: GenerateOptions {
                temperature: cfg.temperature,
                num_predict: cfg.num_predict,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}
