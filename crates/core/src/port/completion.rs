// Text Completion Port (AI collaborator)

use crate::error::{AppError, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

/// Sampling parameters a chat request may carry through to the model provider
pub const CHAT_OPTIONAL_PARAMS: &[&str] = &[
    "temperature",
    "top_p",
    "max_tokens",
    "stop",
    "frequency_penalty",
    "presence_penalty",
    "seed",
];

/// Chat completion request forwarded on behalf of a client
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<Value>,
    /// Only keys listed in CHAT_OPTIONAL_PARAMS
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl ChatCompletionRequest {
    /// Keep `model`, `messages` and the known sampling parameters of a client body
    ///
    /// # Errors
    /// - AppError::Validation if `model` or `messages` is missing or empty
    pub fn from_body(body: &Map<String, Value>) -> Result<Self> {
        let model = body
            .get("model")
            .and_then(Value::as_str)
            .filter(|m| !m.trim().is_empty());
        let messages = body
            .get("messages")
            .and_then(Value::as_array)
            .filter(|m| !m.is_empty());

        let (Some(model), Some(messages)) = (model, messages) else {
            return Err(AppError::Validation(
                "Faltan los campos 'model' o 'messages' en el request body".to_string(),
            ));
        };

        let options = CHAT_OPTIONAL_PARAMS
            .iter()
            .filter_map(|key| body.get(*key).map(|v| (key.to_string(), v.clone())))
            .collect();

        Ok(Self {
            model: model.to_string(),
            messages: messages.clone(),
            options,
        })
    }
}

/// Raw chat completions against the model provider (front door proxy)
#[async_trait]
pub trait ChatCompletions: Send + Sync {
    /// Forward a chat request, returning the provider's JSON answer untouched
    ///
    /// # Errors
    /// Same taxonomy as `TextCompleter::complete`, plus AppError::Decode when
    /// a successful answer is not JSON.
    async fn chat(&self, request: &ChatCompletionRequest) -> Result<Value>;
}

/// Free-form text completion
#[async_trait]
pub trait TextCompleter: Send + Sync {
    /// Complete a prompt
    ///
    /// # Errors
    /// - AppError::Config if the credential is missing
    /// - AppError::Network on transport failures
    /// - AppError::Upstream on non-success status codes
    /// - AppError::EmptyCompletion if the answer has no content
    async fn complete(&self, prompt: &str) -> Result<String>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Scripted reply
    #[derive(Debug, Clone)]
    pub enum CompletionReply {
        Text(String),
        MissingKey,
        Status(u16),
        Network(String),
        Panic(String),
    }

    /// Completer answering from a script, repeating the last reply once exhausted
    #[derive(Clone)]
    pub struct ScriptedCompleter {
        replies: Arc<Mutex<VecDeque<CompletionReply>>>,
        prompts: Arc<Mutex<Vec<String>>>,
        chats: Arc<Mutex<Vec<ChatCompletionRequest>>>,
    }

    impl ScriptedCompleter {
        pub fn new(replies: Vec<CompletionReply>) -> Self {
            Self {
                replies: Arc::new(Mutex::new(replies.into())),
                prompts: Arc::new(Mutex::new(Vec::new())),
                chats: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub fn always(text: impl Into<String>) -> Self {
            Self::new(vec![CompletionReply::Text(text.into())])
        }

        pub fn call_count(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }

        pub fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }

        /// Chat requests received through `ChatCompletions`
        pub fn chats(&self) -> Vec<ChatCompletionRequest> {
            self.chats.lock().unwrap().clone()
        }

        fn next_reply(&self) -> Option<CompletionReply> {
            let mut replies = self.replies.lock().unwrap();
            if replies.len() > 1 {
                replies.pop_front()
            } else {
                replies.front().cloned()
            }
        }
    }

    fn scripted_failure(reply: Option<CompletionReply>) -> AppError {
        match reply {
            Some(CompletionReply::MissingKey) => {
                AppError::Config("OPENROUTER_API_KEY is not set".to_string())
            }
            Some(CompletionReply::Status(status)) => AppError::Upstream {
                status,
                message: "scripted failure".to_string(),
            },
            Some(CompletionReply::Network(msg)) => AppError::Network(msg),
            Some(CompletionReply::Panic(msg)) => panic!("{}", msg),
            Some(CompletionReply::Text(_)) | None => {
                AppError::EmptyCompletion("no scripted reply".to_string())
            }
        }
    }

    #[async_trait]
    impl TextCompleter for ScriptedCompleter {
        async fn complete(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            match self.next_reply() {
                Some(CompletionReply::Text(text)) => Ok(text),
                other => Err(scripted_failure(other)),
            }
        }
    }

    #[async_trait]
    impl ChatCompletions for ScriptedCompleter {
        async fn chat(&self, request: &ChatCompletionRequest) -> Result<Value> {
            self.chats.lock().unwrap().push(request.clone());
            match self.next_reply() {
                Some(CompletionReply::Text(text)) => Ok(json!({
                    "model": request.model,
                    "choices": [{"message": {"role": "assistant", "content": text}}],
                })),
                other => Err(scripted_failure(other)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_chat_request_keeps_known_params_only() {
        let request = ChatCompletionRequest::from_body(&body(json!({
            "model": "qwen/qwen3-235b-a22b",
            "messages": [{"role": "user", "content": "hola"}],
            "temperature": 0.2,
            "seed": 7,
            "stream": true,
            "api_key": "leak"
        })))
        .unwrap();

        assert_eq!(request.model, "qwen/qwen3-235b-a22b");
        assert_eq!(request.messages.len(), 1);
        let mut keys: Vec<&str> = request.options.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["seed", "temperature"]);

        let wire = serde_json::to_value(&request).unwrap();
        assert_eq!(wire["temperature"], json!(0.2));
        assert!(wire.get("stream").is_none());
    }

    #[test]
    fn test_chat_request_requires_model_and_messages() {
        for invalid in [
            json!({"messages": [{"role": "user", "content": "x"}]}),
            json!({"model": "m"}),
            json!({"model": " ", "messages": [{"role": "user", "content": "x"}]}),
            json!({"model": "m", "messages": []}),
        ] {
            let err = ChatCompletionRequest::from_body(&body(invalid)).unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
        }
    }
}
