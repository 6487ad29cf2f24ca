//! HttpCompletionProvider -- [`CompletionProvider`] over an
//! OpenAI-compatible `/chat/completions` endpoint.
//!
//! The conversation context is sent as chat messages (optionally preceded
//! by a configured system prompt) and the first choice's content becomes
//! the assistant reply. The API key is wrapped in [`SecretString`] and is
//! only exposed when building the request headers.

use chatline_core::completion::{CompletionProvider, ConversationContext};
use chatline_types::config::CompletionConfig;
use chatline_types::error::CompletionError;
use chatline_types::message::MessageRole;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// OpenAI-compatible completion provider.
///
/// Does not derive Debug; the API key must never reach logs.
pub struct HttpCompletionProvider {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<SecretString>,
    system_prompt: Option<String>,
}

impl HttpCompletionProvider {
    /// Build a provider from configuration.
    ///
    /// Returns `CompletionError::Disabled` when no endpoint is configured.
    pub fn new(config: &CompletionConfig) -> Result<Self, CompletionError> {
        let endpoint = config
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or(CompletionError::Disabled)?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| CompletionError::Provider(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: format!("{}/chat/completions", endpoint.trim_end_matches('/')),
            model: config.model.clone(),
            api_key: config.api_key.clone().map(SecretString::from),
            system_prompt: config.system_prompt.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn build_request(&self, context: &ConversationContext) -> ChatRequest {
        let mut messages = Vec::with_capacity(context.messages.len() + 1);
        if let Some(system) = &self.system_prompt {
            messages.push(ChatMessage {
                role: MessageRole::System.to_string(),
                content: system.clone(),
            });
        }
        for message in &context.messages {
            messages.push(ChatMessage {
                role: message.role.to_string(),
                content: message.content.clone(),
            });
        }
        ChatRequest {
            model: self.model.clone(),
            messages,
        }
    }
}

fn error_for_status(status: reqwest::StatusCode, body: String) -> CompletionError {
    match status.as_u16() {
        401 | 403 => CompletionError::AuthenticationFailed,
        429 => CompletionError::RateLimited,
        _ => CompletionError::Provider(format!("HTTP {status}: {body}")),
    }
}

fn first_choice(response: ChatResponse) -> Result<String, CompletionError> {
    response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content)
        .ok_or_else(|| CompletionError::Deserialization("response has no choices".to_string()))
}

impl CompletionProvider for HttpCompletionProvider {
    fn name(&self) -> &str {
        "http"
    }

    async fn generate(&self, context: &ConversationContext) -> Result<String, CompletionError> {
        let body = self.build_request(context);
        debug!(
            conversation_id = %context.conversation_id,
            messages = body.messages.len(),
            model = %self.model,
            "sending completion request"
        );

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }
        let response = request
            .send()
            .await
            .map_err(|e| CompletionError::Provider(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(error_for_status(status, error_body));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::Deserialization(format!("failed to parse response: {e}")))?;
        first_choice(parsed)
    }
}

#[cfg(test)]
mod tests {
    use chatline_types::ids::{ConversationId, UserId};
    use chatline_types::message::Message;
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;

    fn config() -> CompletionConfig {
        CompletionConfig {
            endpoint: Some("https://llm.example.test/v1/".to_string()),
            api_key: Some("test-key-not-real".to_string()),
            system_prompt: Some("Be brief".to_string()),
            ..Default::default()
        }
    }

    fn message(role: MessageRole, content: &str, sequence: u64) -> Message {
        Message {
            id: Uuid::now_v7(),
            conversation_id: ConversationId::parse("c1").unwrap(),
            sender_id: UserId::parse("alice").unwrap(),
            role,
            content: content.to_string(),
            sequence,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_disabled_without_endpoint() {
        let result = HttpCompletionProvider::new(&CompletionConfig::default());
        assert!(matches!(result, Err(CompletionError::Disabled)));
    }

    #[test]
    fn test_url_joins_endpoint() {
        let provider = HttpCompletionProvider::new(&config()).unwrap();
        assert_eq!(provider.url(), "https://llm.example.test/v1/chat/completions");
        assert_eq!(provider.name(), "http");
    }

    #[test]
    fn test_build_request_maps_roles() {
        let provider = HttpCompletionProvider::new(&config()).unwrap();
        let context = ConversationContext {
            conversation_id: ConversationId::parse("c1").unwrap(),
            messages: vec![
                message(MessageRole::User, "hi", 1),
                message(MessageRole::Assistant, "hello", 2),
                message(MessageRole::User, "how are you?", 3),
            ],
        };

        let request = provider.build_request(&context);
        assert_eq!(request.model, "gpt-4o-mini");
        let roles: Vec<&str> = request.messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(request.messages[0].content, "Be brief");
        assert_eq!(request.messages[3].content, "how are you?");
    }

    #[test]
    fn test_error_for_status() {
        assert_eq!(
            error_for_status(reqwest::StatusCode::UNAUTHORIZED, String::new()),
            CompletionError::AuthenticationFailed
        );
        assert_eq!(
            error_for_status(reqwest::StatusCode::TOO_MANY_REQUESTS, String::new()),
            CompletionError::RateLimited
        );
        assert!(matches!(
            error_for_status(reqwest::StatusCode::BAD_GATEWAY, "upstream".to_string()),
            CompletionError::Provider(msg) if msg.contains("upstream")
        ));
    }

    #[test]
    fn test_first_choice() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"Sure."}}]}"#,
        )
        .unwrap();
        assert_eq!(first_choice(response).unwrap(), "Sure.");

        let empty: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(
            first_choice(empty),
            Err(CompletionError::Deserialization(_))
        ));
    }
}
