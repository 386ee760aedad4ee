//! Ollama API streaming client
//!
//! Talks to a local Ollama server over `POST /api/generate` with
//! `stream: true`. The response is NDJSON: one `{"response": "...", "done": bool}`
//! object per line, with lines free to straddle HTTP chunk boundaries.

use crate::errors::{PipelineError, Result};
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Default Ollama API endpoint
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default model
pub const DEFAULT_MODEL: &str = "qwen2.5:7b-instruct";

/// Connect timeout; whole-request limits come from the stage timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Sampling options sent with every request
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerateOptions {
    pub temperature: f32,

    /// Ollama's name for the token limit
    #[serde(rename = "num_predict")]
    pub max_tokens: u32,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: 2048,
        }
    }
}

/// Ollama streaming client
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    options: GenerateOptions,
}

impl OllamaClient {
    /// Create new Ollama client with default settings
    pub fn new() -> Result<Self> {
        Self::with_config(DEFAULT_OLLAMA_URL, DEFAULT_MODEL)
    }

    /// Create Ollama client with custom configuration
    pub fn with_config(base_url: &str, model: &str) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(PipelineError::HttpError)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            options: GenerateOptions::default(),
        })
    }

    /// Replace the sampling options
    pub fn with_options(mut self, options: GenerateOptions) -> Self {
        self.options = options;
        self
    }

    /// Raw byte stream of an NDJSON generate response
    pub async fn generate_stream(
        &self,
        prompt: String,
    ) -> Result<impl futures_util::Stream<Item = Result<Vec<u8>>>> {
        let url = format!("{}/api/generate", self.base_url);

        let request = OllamaGenerateRequest {
            model: self.model.clone(),
            prompt,
            stream: true,
            options: Some(self.options),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| PipelineError::OllamaApiError(format!("Failed to send request: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(PipelineError::OllamaApiError(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        let stream = response.bytes_stream().map(|result| {
            result
                .map(|bytes| bytes.to_vec())
                .map_err(|e| PipelineError::StreamingError(e.to_string()))
        });

        Ok(stream)
    }

    /// Run a prompt to completion and return the concatenated response text
    pub async fn generate(&self, prompt: String) -> Result<String> {
        let stream = self.generate_stream(prompt).await?;
        futures_util::pin_mut!(stream);

        let mut collector = NdjsonCollector::default();
        while let Some(chunk) = stream.next().await {
            if collector.push(&chunk?)? {
                break;
            }
        }
        collector.finish()
    }

    /// Check if Ollama is available
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/version", self.base_url);

        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    /// List available models
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| PipelineError::OllamaApiError(format!("Failed to list models: {}", e)))?;

        if !response.status().is_success() {
            return Err(PipelineError::OllamaApiError(
                "Failed to retrieve model list".to_string(),
            ));
        }

        let models_response: ModelsResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::OllamaApiError(format!("Failed to parse models: {}", e)))?;

        Ok(models_response
            .models
            .into_iter()
            .map(|m| m.name)
            .collect())
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn options(&self) -> GenerateOptions {
        self.options
    }
}

/// Reassembles NDJSON lines split across chunks and concatenates `response`
#[derive(Debug, Default)]
pub(crate) struct NdjsonCollector {
    pending: Vec<u8>,
    text: String,
    done: bool,
}

impl NdjsonCollector {
    /// Feed one chunk; returns true once a `done: true` line was seen
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Result<bool> {
        self.pending.extend_from_slice(chunk);

        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.consume_line(&line[..line.len() - 1])?;
            if self.done {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Flush a trailing unterminated line and return the text
    pub(crate) fn finish(mut self) -> Result<String> {
        if !self.done && !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.consume_line(&rest)?;
        }
        Ok(self.text)
    }

    fn consume_line(&mut self, line: &[u8]) -> Result<()> {
        let line = String::from_utf8_lossy(line);
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }

        let chunk: GenerateChunk = serde_json::from_str(line).map_err(|e| {
            PipelineError::StreamingError(format!("Malformed stream line: {}", e))
        })?;

        if let Some(err) = chunk.error {
            return Err(PipelineError::OllamaApiError(err));
        }

        self.text.push_str(&chunk.response);
        if chunk.done {
            debug!(chars = self.text.len(), "Generation finished");
            self.done = true;
        }
        Ok(())
    }
}

/// Ollama generate request
#[derive(Debug, Clone, Serialize)]
struct OllamaGenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerateOptions>,
}

/// One NDJSON line of a generate response
#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Ollama models list response
#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
struct ModelInfo {
    name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = OllamaClient::new().unwrap();
        assert_eq!(client.model(), DEFAULT_MODEL);
        assert_eq!(client.base_url(), DEFAULT_OLLAMA_URL);
        assert_eq!(client.options(), GenerateOptions::default());
    }

    #[test]
    fn test_client_with_config_trims_slash() {
        let client = OllamaClient::with_config("http://localhost:11434/", "llama3:8b").unwrap();
        assert_eq!(client.model(), "llama3:8b");
        assert_eq!(client.base_url(), "http://localhost:11434");
    }

    #[test]
    fn test_options_serialize_as_num_predict() {
        let value = serde_json::to_value(GenerateOptions {
            temperature: 0.0,
            max_tokens: 512,
        })
        .unwrap();
        assert_eq!(value["num_predict"], 512);
        assert!(value.get("max_tokens").is_none());
    }

    #[test]
    fn test_collector_joins_split_lines() {
        let mut collector = NdjsonCollector::default();
        assert!(!collector.push(b"{\"response\":\"Hel").unwrap());
        assert!(!collector.push(b"lo\",\"done\":false}\n{\"resp").unwrap());
        assert!(collector
            .push(b"onse\":\" world\",\"done\":true}\n")
            .unwrap());
        assert_eq!(collector.finish().unwrap(), "Hello world");
    }

    #[test]
    fn test_collector_flushes_unterminated_tail() {
        let mut collector = NdjsonCollector::default();
        collector.push(b"{\"response\":\"a\"}\n{\"response\":\"b\"}").unwrap();
        assert_eq!(collector.finish().unwrap(), "ab");
    }

    #[test]
    fn test_collector_surfaces_server_error() {
        let mut collector = NdjsonCollector::default();
        let result = collector.push(b"{\"error\":\"model not found\"}\n");
        assert!(matches!(result, Err(PipelineError::OllamaApiError(_))));
    }

    #[test]
    fn test_collector_rejects_garbage() {
        let mut collector = NdjsonCollector::default();
        assert!(collector.push(b"not json\n").is_err());
    }
}
