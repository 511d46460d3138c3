//! Chat completion clients

use crate::error::{ProviderError, Result};
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use skillweave_types::{ChatMessage, LlmProvider, Role};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Ollama ignores the key but the client insists on sending one
const OLLAMA_PLACEHOLDER_KEY: &str = "ollama";

/// Text completion service: `generate(messages) -> text`
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Run one completion round-trip and return the assistant text
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Model identifier, for logging
    fn model(&self) -> &str;
}

/// Client for any OpenAI-compatible chat completion endpoint
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiClient {
    /// Create a client from provider settings
    pub fn new(provider: &LlmProvider) -> Self {
        let config = match provider {
            LlmProvider::OpenAI {
                api_key, base_url, ..
            } => {
                let mut config = OpenAIConfig::new();
                if let Some(key) = api_key.as_deref().filter(|k| !k.is_empty()) {
                    config = config.with_api_key(key);
                }
                if let Some(url) = base_url.as_deref().filter(|u| !u.is_empty()) {
                    config = config.with_api_base(url);
                }
                config
            }
            LlmProvider::Ollama { base_url, .. } => OpenAIConfig::new()
                .with_api_base(base_url)
                .with_api_key(OLLAMA_PLACEHOLDER_KEY),
        };

        info!("LLM client initialized with model {}", provider.model());
        Self {
            client: Client::with_config(config),
            model: provider.model().to_string(),
        }
    }

    fn to_request_message(message: &ChatMessage) -> Result<ChatCompletionRequestMessage> {
        let content = message.content.clone();
        let converted = match message.role {
            Role::System => ChatCompletionRequestSystemMessageArgs::default()
                .content(content)
                .build()?
                .into(),
            Role::User => ChatCompletionRequestUserMessageArgs::default()
                .content(content)
                .build()?
                .into(),
            Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                .content(content)
                .build()?
                .into(),
        };
        Ok(converted)
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        let chat_messages = messages
            .iter()
            .map(Self::to_request_message)
            .collect::<Result<Vec<_>>>()?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(chat_messages)
            .build()?;

        debug!("Sending {} message(s) to {}", messages.len(), self.model);
        let response = self.client.chat().create(request).await?;

        match response.choices.into_iter().next() {
            Some(choice) => Ok(choice.message.content.unwrap_or_default()),
            None => {
                warn!("Model {} returned no choices", self.model);
                Err(ProviderError::EmptyResponse(self.model.clone()))
            }
        }
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Build the configured completion client
pub fn build_llm(provider: &LlmProvider) -> Arc<dyn LlmClient> {
    Arc::new(OpenAiClient::new(provider))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_keeps_model_name() {
        let client = OpenAiClient::new(&LlmProvider::ollama("llama3", "http://localhost:11434/v1"));
        assert_eq!(client.model(), "llama3");
    }

    #[test]
    fn test_message_conversion() {
        for message in [
            ChatMessage::system("sys"),
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello"),
        ] {
            assert!(OpenAiClient::to_request_message(&message).is_ok());
        }
    }
}
