//! HTTP client for OpenAI-compatible chat-completion APIs

use super::{CompletionProvider, models::*, params::*};
use crate::config::ApiConfig;
use crate::error::{ChatError, CompletionError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Client for `POST {base_url}/chat/completions`
pub struct ChatCompletionClient {
    config: ApiConfig,
    http_client: Client,
    endpoint: String,
}

impl ChatCompletionClient {
    /// Create a new client
    pub fn new(config: ApiConfig) -> Result<Self> {
        // Enforce TLS verification in release builds
        #[cfg(not(debug_assertions))]
        if config.tls_enabled && !config.tls_verify {
            return Err(ChatError::Config(
                "TLS verification cannot be disabled in release mode".to_string()
            ));
        }

        let mut client_builder = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .pool_max_idle_per_host(10);

        if config.tls_enabled {
            client_builder = client_builder.https_only(true);
        }

        #[cfg(debug_assertions)]
        if config.tls_enabled && !config.tls_verify {
            warn!("TLS certificate verification disabled (debug build only)");
            client_builder = client_builder.danger_accept_invalid_certs(true);
        }

        let http_client = client_builder
            .build()
            .map_err(|e| ChatError::Completion(CompletionError::Network(e)))?;

        info!("Initialized chat-completion client for {}", config.base_url);

        Ok(Self::with_http_client(config, http_client))
    }

    /// Create client with custom HTTP client
    pub fn with_http_client(config: ApiConfig, http_client: Client) -> Self {
        let endpoint = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));
        Self {
            config,
            http_client,
            endpoint,
        }
    }

    /// Full URL requests are posted to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn try_request(
        &self,
        request: &ChatCompletionRequest<'_>,
    ) -> std::result::Result<ChatCompletion, CompletionError> {
        debug!(model = %request.params.model, messages = request.messages.len(), "Making chat-completion request");

        let response = self.http_client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.config.api_key.expose_secret()))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await?;

        let status = response.status();

        match status {
            s if s.is_success() => {
                let body = response.text().await?;
                let completion: ChatCompletion = serde_json::from_str(&body)?;

                if completion.choices.is_empty() {
                    return Err(CompletionError::InvalidResponse(
                        "Response contained no choices".to_string()
                    ));
                }

                debug!(id = %completion.id, tokens = completion.usage.total_tokens, "Received completion");
                Ok(completion)
            }
            StatusCode::UNAUTHORIZED => {
                error!("Authentication failed");
                Err(CompletionError::AuthenticationFailed)
            }
            StatusCode::TOO_MANY_REQUESTS => {
                warn!("Rate limit exceeded");
                Err(CompletionError::RateLimitExceeded)
            }
            StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY | StatusCode::GATEWAY_TIMEOUT => {
                let error_text = response.text().await.unwrap_or_default();
                warn!("Service unavailable ({}): {}", status, error_text);
                Err(CompletionError::ServiceUnavailable(format!("Status {}: {}", status, error_text)))
            }
            _ => {
                let error_text = response.text().await.unwrap_or_default();
                error!("API request failed with status {}: {}", status, error_text);
                Err(CompletionError::Api {
                    status: status.as_u16(),
                    message: error_text,
                })
            }
        }
    }
}

#[async_trait]
impl CompletionProvider for ChatCompletionClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &CallParameters,
    ) -> std::result::Result<ChatCompletion, CompletionError> {
        let request = ChatCompletionRequest { messages, params };
        self.try_request(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use secrecy::Secret;
    use serde_json::json;

    fn test_config(base_url: String) -> ApiConfig {
        ApiConfig {
            base_url,
            api_key: Secret::new("sk-test".to_string()),
            timeout_secs: 5,
            connect_timeout_secs: 5,
            tls_enabled: false,
            tls_verify: true,
        }
    }

    fn completion_body() -> String {
        json!({
            "id": "chatcmpl-abc",
            "object": "chat.completion",
            "created": 1700000000,
            "model": "gpt-3.5-turbo-0613",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Paris"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 1, "total_tokens": 13}
        })
        .to_string()
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let client = ChatCompletionClient::new(test_config("http://localhost:9/v1/".to_string())).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:9/v1/chat/completions");
    }

    #[tokio::test]
    async fn test_successful_completion() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(Matcher::PartialJson(json!({
                "model": "gpt-4",
                "messages": [{"role": "user", "content": "Capital of France?"}],
                "seed": 3
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(completion_body())
            .create_async()
            .await;

        let client = ChatCompletionClient::new(test_config(server.url())).unwrap();
        let params = CallParameters::default().merge(&CallOverrides::new().model("gpt-4").seed(3));

        let cc = client
            .complete(&[ChatMessage::user("Capital of France?")], &params)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(cc.id, "chatcmpl-abc");
        assert_eq!(cc.first_content(), Some("Paris"));
        assert_eq!(cc.usage.prompt_tokens, 12);
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let mut server = mockito::Server::new_async().await;
        let client = ChatCompletionClient::new(test_config(server.url())).unwrap();
        let params = CallParameters::default();
        let messages = [ChatMessage::user("hi")];

        let m = server.mock("POST", "/chat/completions").with_status(429).create_async().await;
        let err = client.complete(&messages, &params).await.unwrap_err();
        assert!(matches!(err, CompletionError::RateLimitExceeded));
        m.remove_async().await;

        let m = server.mock("POST", "/chat/completions").with_status(401).create_async().await;
        let err = client.complete(&messages, &params).await.unwrap_err();
        assert!(matches!(err, CompletionError::AuthenticationFailed));
        m.remove_async().await;

        let m = server
            .mock("POST", "/chat/completions")
            .with_status(400)
            .with_body("bad seed")
            .create_async()
            .await;
        let err = client.complete(&messages, &params).await.unwrap_err();
        assert!(matches!(err, CompletionError::Api { status: 400, ref message } if message == "bad seed"));
        m.remove_async().await;
    }

    #[tokio::test]
    async fn test_malformed_body_is_serialization_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body("{not json")
            .create_async()
            .await;

        let client = ChatCompletionClient::new(test_config(server.url())).unwrap();
        let err = client
            .complete(&[ChatMessage::user("hi")], &CallParameters::default())
            .await
            .unwrap_err();

        assert!(matches!(err, CompletionError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_empty_choices_rejected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(json!({"id": "x", "created": 1, "model": "m", "choices": []}).to_string())
            .create_async()
            .await;

        let client = ChatCompletionClient::new(test_config(server.url())).unwrap();
        let err = client
            .complete(&[ChatMessage::user("hi")], &CallParameters::default())
            .await
            .unwrap_err();

        assert!(matches!(err, CompletionError::InvalidResponse(_)));
    }
}
