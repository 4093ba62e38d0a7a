// OpenRouter chat-completion client

use crate::error::{map_reqwest_error, truncate_body};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use smartsearch_core::error::{AppError, Result};
use serde_json::Value;
use smartsearch_core::port::{ChatCompletionRequest, ChatCompletions, TextCompleter};
use std::time::Duration;
use tracing::{debug, error, info};

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "qwen/qwen3-235b-a22b";
pub const DEFAULT_SITE_URL: &str = "http://localhost:5173";
pub const DEFAULT_SITE_NAME: &str = "Smart Search";
pub const COMPLETION_TIMEOUT: Duration = Duration::from_secs(60);

const ERROR_BODY_CHARS: usize = 300;

#[derive(Debug, Clone)]
pub struct OpenRouterConfig {
    /// Bearer credential; absence fails each completion, not startup
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    /// Sent as HTTP-Referer
    pub site_url: String,
    /// Sent as X-Title
    pub site_name: String,
    pub timeout: Duration,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            site_url: DEFAULT_SITE_URL.to_string(),
            site_name: DEFAULT_SITE_NAME.to_string(),
            timeout: COMPLETION_TIMEOUT,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Completion client for the OpenRouter chat API
#[derive(Clone)]
pub struct OpenRouterClient {
    client: reqwest::Client,
    config: OpenRouterConfig,
}

impl OpenRouterClient {
    pub fn new(config: OpenRouterConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn api_key(&self) -> Result<&str> {
        self.config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AppError::Config("OPENROUTER_API_KEY is not set".to_string()))
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    /// POST a chat body and parse the successful answer as JSON
    async fn post_chat<T: Serialize + Sync>(&self, body: &T) -> Result<Value> {
        let api_key = self.api_key()?;
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .header("HTTP-Referer", &self.config.site_url)
            .header("X-Title", &self.config.site_name)
            .json(body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), body = %truncate_body(&text, ERROR_BODY_CHARS), "OpenRouter request failed");
            return Err(AppError::Upstream {
                status: status.as_u16(),
                message: truncate_body(&text, ERROR_BODY_CHARS),
            });
        }

        let text = response.text().await.map_err(map_reqwest_error)?;
        serde_json::from_str(&text).map_err(|e| {
            error!(body = %truncate_body(&text, ERROR_BODY_CHARS), "OpenRouter answered with a non-JSON body");
            AppError::Decode(format!("Malformed completion body: {}", e))
        })
    }
}

#[async_trait]
impl TextCompleter for OpenRouterClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        debug!(model = %self.config.model, prompt_length = prompt.len(), "Calling OpenRouter");
        let raw = self.post_chat(&body).await?;
        let parsed: ChatResponse = serde_json::from_value(raw)
            .map_err(|e| AppError::Decode(format!("Malformed completion body: {}", e)))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                AppError::EmptyCompletion(format!("model {} returned no content", self.config.model))
            })?;

        info!(model = %self.config.model, response_length = content.len(), "OpenRouter response received");
        Ok(content)
    }
}

#[async_trait]
impl ChatCompletions for OpenRouterClient {
    async fn chat(&self, request: &ChatCompletionRequest) -> Result<Value> {
        debug!(model = %request.model, messages = request.messages.len(), "Proxying chat request to OpenRouter");
        let answer = self.post_chat(request).await?;
        info!(model = %request.model, "OpenRouter chat answer relayed");
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;
    use smartsearch_core::application::{classify, FailureClass};

    /// Serve one fixed route on an ephemeral port, returning the base URL
    async fn stub(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client(base_url: String, api_key: Option<&str>) -> OpenRouterClient {
        OpenRouterClient::new(OpenRouterConfig {
            api_key: api_key.map(str::to_string),
            base_url,
            timeout: Duration::from_secs(5),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_complete_returns_first_choice() {
        let router = Router::new().route(
            "/chat/completions",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                let title = headers
                    .get("x-title")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string();
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string();
                let content = format!("{}|{}|{}", title, auth, body["model"].as_str().unwrap_or(""));
                Json(json!({"choices": [{"message": {"content": content}}]}))
            }),
        );
        let base = stub(router).await;

        let answer = client(base, Some("sk-test")).complete("hola").await.unwrap();
        assert_eq!(answer, "Smart Search|Bearer sk-test|qwen/qwen3-235b-a22b");
    }

    #[tokio::test]
    async fn test_missing_key_is_config_error() {
        let result = client("http://127.0.0.1:9".to_string(), None)
            .complete("hola")
            .await;
        assert!(matches!(result, Err(AppError::Config(_))));

        let blank = client("http://127.0.0.1:9".to_string(), Some("  "))
            .complete("hola")
            .await;
        assert!(matches!(blank, Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn test_error_status_is_upstream() {
        let router = Router::new().route(
            "/chat/completions",
            post(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down") }),
        );
        let base = stub(router).await;

        match client(base, Some("k")).complete("hola").await {
            Err(AppError::Upstream { status, message }) => {
                assert_eq!(status, 429);
                assert_eq!(message, "slow down");
            }
            other => panic!("expected upstream error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_blank_content_is_empty_completion() {
        let router = Router::new().route(
            "/chat/completions",
            post(|| async { Json(json!({"choices": [{"message": {"content": "   "}}]})) }),
        );
        let base = stub(router).await;

        let result = client(base, Some("k")).complete("hola").await;
        assert!(matches!(result, Err(AppError::EmptyCompletion(_))));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        // Bind then drop to get a port nothing listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = client(format!("http://{}", addr), Some("k")).complete("hola").await;
        assert!(matches!(result, Err(AppError::Network(_))));
    }

    #[tokio::test]
    async fn test_non_json_success_body_is_permanent_decode_error() {
        let router = Router::new().route(
            "/chat/completions",
            post(|| async { (StatusCode::OK, "<html>not json</html>") }),
        );
        let base = stub(router).await;

        let err = client(base, Some("k")).complete("hola").await.unwrap_err();
        assert!(matches!(err, AppError::Decode(_)), "got {:?}", err);
        assert_eq!(classify(&err), FailureClass::Permanent);
    }

    #[tokio::test]
    async fn test_chat_forwards_options_and_relays_answer() {
        let router = Router::new().route(
            "/chat/completions",
            post(|Json(body): Json<Value>| async move {
                Json(json!({"id": "gen-1", "echo": body}))
            }),
        );
        let base = stub(router).await;

        let mut options = serde_json::Map::new();
        options.insert("temperature".to_string(), json!(0.3));
        let request = ChatCompletionRequest {
            model: "openai/gpt-4o-mini".to_string(),
            messages: vec![json!({"role": "user", "content": "hola"})],
            options,
        };

        let answer = client(base, Some("k")).chat(&request).await.unwrap();
        assert_eq!(answer["id"], "gen-1");
        assert_eq!(answer["echo"]["model"], "openai/gpt-4o-mini");
        assert_eq!(answer["echo"]["temperature"], json!(0.3));
        assert_eq!(answer["echo"]["messages"][0]["content"], "hola");
    }

    #[tokio::test]
    async fn test_chat_keeps_upstream_status() {
        let router = Router::new().route(
            "/chat/completions",
            post(|| async { (StatusCode::PAYMENT_REQUIRED, "{\"error\":\"no credits\"}") }),
        );
        let base = stub(router).await;

        let request = ChatCompletionRequest {
            model: "m".to_string(),
            messages: vec![json!({"role": "user", "content": "x"})],
            options: serde_json::Map::new(),
        };
        match client(base, Some("k")).chat(&request).await {
            Err(AppError::Upstream { status, message }) => {
                assert_eq!(status, 402);
                assert!(message.contains("no credits"));
            }
            other => panic!("expected upstream error, got {:?}", other),
        }
    }
}
