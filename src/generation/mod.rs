//! Answer generation through a chat-completion or local completion provider.
//!
//! The service only ever sends one prompt and expects one text answer back, returned as the
//! provider produced it. Provider requests are single-shot: errors bubble up to the caller
//! without retries.

use crate::config::{Config, GenerationProvider};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced while generating an answer.
#[derive(Debug, Error)]
pub enum GenerationClientError {
    /// Provider could not be reached or is not configured.
    #[error("Generation provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate answer: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Request payload passed to the generation provider.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Model identifier understood by the provider.
    pub model: String,
    /// Fully assembled prompt.
    pub prompt: String,
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
}

/// Interface implemented by answer generators.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Model used when the caller does not override it.
    fn model(&self) -> &str;

    /// Generate a completion for `request`.
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationClientError>;
}

/// Build the generation client selected by configuration.
pub fn build_generation_client(
    config: &Config,
) -> Result<Arc<dyn GenerationClient>, GenerationClientError> {
    let http = Client::builder()
        .user_agent("docchat/generation")
        .timeout(config.http_timeout())
        .build()
        .map_err(|error| GenerationClientError::ProviderUnavailable(error.to_string()))?;

    let client: Arc<dyn GenerationClient> = match config.generation_provider {
        GenerationProvider::OpenAI => {
            let api_key = config.openai_api_key.clone().ok_or_else(|| {
                GenerationClientError::ProviderUnavailable("OPENAI_API_KEY is not set".into())
            })?;
            Arc::new(OpenAiChatClient::new(
                http,
                &config.openai_base_url,
                api_key,
                &config.generation_model,
            ))
        }
        GenerationProvider::Ollama => Arc::new(OllamaGenerationClient::new(
            http,
            &config.ollama_url,
            &config.generation_model,
        )),
    };
    tracing::info!(
        provider = ?config.generation_provider,
        model = client.model(),
        "Generation client initialized"
    );
    Ok(client)
}

/// Rough token count for `prompt` under `model`'s tokenizer, falling back to `cl100k_base`.
pub fn estimate_prompt_tokens(model: &str, prompt: &str) -> Option<usize> {
    let bpe = tiktoken_rs::get_bpe_from_model(model)
        .or_else(|_| tiktoken_rs::cl100k_base())
        .ok()?;
    Some(bpe.encode_with_special_tokens(prompt).len())
}

/// OpenAI `chat/completions` adapter.
pub struct OpenAiChatClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiChatClient {
    /// Client posting to `{base_url}/chat/completions`.
    pub fn new(http: Client, base_url: &str, api_key: String, model: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn check_context_window(&self, request: &GenerationRequest) {
        let Some(prompt_tokens) = estimate_prompt_tokens(&request.model, &request.prompt) else {
            return;
        };
        let context_size = tiktoken_rs::model::get_context_size(&request.model);
        let requested = prompt_tokens + request.max_tokens as usize;
        if requested > context_size {
            tracing::warn!(
                model = %request.model,
                prompt_tokens,
                max_tokens = request.max_tokens,
                context_size,
                "Prompt plus completion budget exceeds the model context window"
            );
        } else {
            tracing::debug!(model = %request.model, prompt_tokens, "Prompt token estimate");
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl GenerationClient for OpenAiChatClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationClientError> {
        self.check_context_window(&request);

        let payload = json!({
            "model": request.model,
            "messages": [{ "role": "user", "content": request.prompt }],
            "max_tokens": request.max_tokens,
        });

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                GenerationClientError::ProviderUnavailable(format!(
                    "failed to reach {}: {error}",
                    self.base_url
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationClientError::GenerationFailed(format!(
                "OpenAI returned {status}: {body}"
            )));
        }

        let body: ChatCompletionResponse = response.json().await.map_err(|error| {
            GenerationClientError::InvalidResponse(format!(
                "failed to decode chat completion: {error}"
            ))
        })?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                GenerationClientError::InvalidResponse("chat completion had no content".into())
            })
    }
}

/// Ollama `/api/generate` adapter.
pub struct OllamaGenerationClient {
    http: Client,
    base_url: String,
    model: String,
}

impl OllamaGenerationClient {
    /// Client posting to `{base_url}/api/generate`.
    pub fn new(http: Client, base_url: &str, model: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    done: bool,
}

#[async_trait]
impl GenerationClient for OllamaGenerationClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationClientError> {
        let payload = json!({
            "model": request.model,
            "prompt": request.prompt,
            "stream": false,
            "options": {
                "num_predict": request.max_tokens,
            }
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                GenerationClientError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(GenerationClientError::ProviderUnavailable(format!(
                "Ollama endpoint {} returned 404",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationClientError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaResponse = response.json().await.map_err(|error| {
            GenerationClientError::InvalidResponse(format!(
                "failed to decode Ollama response: {error}"
            ))
        })?;

        if !body.done {
            return Err(GenerationClientError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        Ok(body.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn request(model: &str) -> GenerationRequest {
        GenerationRequest {
            model: model.into(),
            prompt: "Context:\nfact\n\nQuestion:\nwhat?\n".into(),
            max_tokens: 64,
        }
    }

    #[tokio::test]
    async fn openai_client_returns_first_choice_verbatim() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/chat/completions")
                    .json_body_partial(r#"{"model":"gpt-3.5-turbo","max_tokens":64}"#);
                then.status(200).json_body(json!({
                    "choices": [
                        { "index": 0, "message": { "role": "assistant", "content": "  The answer.\n" } }
                    ]
                }));
            })
            .await;
        let client = OpenAiChatClient::new(Client::new(), &server.base_url(), "sk-test".into(), "gpt-3.5-turbo");

        let answer = client.generate(request("gpt-3.5-turbo")).await.expect("answer");

        mock.assert_async().await;
        assert_eq!(answer, "  The answer.\n");
    }

    #[tokio::test]
    async fn openai_client_surfaces_error_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(429).body("rate limited");
            })
            .await;
        let client = OpenAiChatClient::new(Client::new(), &server.base_url(), "sk-test".into(), "gpt-3.5-turbo");

        let error = client
            .generate(request("gpt-3.5-turbo"))
            .await
            .expect_err("error status");
        assert!(
            matches!(error, GenerationClientError::GenerationFailed(message) if message.contains("429"))
        );
    }

    #[tokio::test]
    async fn openai_client_rejects_empty_choices() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200).json_body(json!({ "choices": [] }));
            })
            .await;
        let client = OpenAiChatClient::new(Client::new(), &server.base_url(), "sk-test".into(), "gpt-3.5-turbo");

        let error = client
            .generate(request("gpt-3.5-turbo"))
            .await
            .expect_err("no content");
        assert!(matches!(error, GenerationClientError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn ollama_client_handles_successful_response() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/generate")
                    .json_body_partial(r#"{"stream":false,"options":{"num_predict":64}}"#);
                then.status(200).json_body(json!({
                    "response": "Local answer",
                    "done": true
                }));
            })
            .await;
        let client = OllamaGenerationClient::new(Client::new(), &server.base_url(), "llama3");

        let answer = client.generate(request("llama3")).await.expect("answer");

        mock.assert_async().await;
        assert_eq!(answer, "Local answer");
    }

    #[tokio::test]
    async fn ollama_client_reports_missing_endpoint() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(404);
            })
            .await;
        let client = OllamaGenerationClient::new(Client::new(), &server.base_url(), "llama3");

        let error = client.generate(request("llama3")).await.expect_err("404");
        assert!(matches!(error, GenerationClientError::ProviderUnavailable(_)));
    }

    #[test]
    fn prompt_token_estimate_falls_back_for_unknown_models() {
        let known = estimate_prompt_tokens("gpt-3.5-turbo", "hello world").expect("known");
        let unknown = estimate_prompt_tokens("llama3", "hello world").expect("fallback");
        assert!(known > 0);
        assert_eq!(known, unknown);
    }
}
