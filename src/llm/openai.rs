//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；Mistral、OpenAI、自建代理均走此实现。

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, Message, Role};

pub const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";

/// OpenAI 兼容客户端：持有 Client、model 名与采样温度
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new().with_api_base(url).with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            temperature: 0.1,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn to_openai_messages(
        &self,
        messages: &[Message],
    ) -> Result<Vec<ChatCompletionRequestMessage>, OpenAIError> {
        messages
            .iter()
            .map(|m| {
                Ok(match m.role {
                    Role::System => ChatCompletionRequestMessage::System(
                        ChatCompletionRequestSystemMessageArgs::default()
                            .content(m.content.clone())
                            .build()?,
                    ),
                    Role::User => ChatCompletionRequestMessage::User(
                        ChatCompletionRequestUserMessageArgs::default()
                            .content(m.content.clone())
                            .build()?,
                    ),
                    Role::Assistant => ChatCompletionRequestMessage::Assistant(
                        ChatCompletionRequestAssistantMessageArgs::default()
                            .content(m.content.clone())
                            .build()?,
                    ),
                })
            })
            .collect()
    }
}

/// 把 SDK 错误归类为 LlmError；SDK 只给出字符串化的 HTTP 细节，这里按关键字识别
pub(crate) fn classify_error(message: &str) -> LlmError {
    let lower = message.to_lowercase();
    if lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests")
    {
        return LlmError::RateLimited {
            retry_after_ms: parse_retry_after(&lower),
        };
    }
    if lower.contains("timed out") || lower.contains("timeout") {
        return LlmError::Timeout;
    }
    for status in [500u16, 502, 503, 504, 408, 401, 403, 404, 400, 422] {
        if lower.contains(&status.to_string()) {
            return LlmError::Api {
                status,
                message: message.to_string(),
            };
        }
    }
    if lower.contains("connection") || lower.contains("dns") || lower.contains("error sending request")
    {
        return LlmError::Transport(message.to_string());
    }
    if lower.contains("server error") || lower.contains("service unavailable") {
        return LlmError::Api {
            status: 500,
            message: message.to_string(),
        };
    }
    LlmError::InvalidRequest(message.to_string())
}

/// 从错误文本中提取 "retry-after: N"（秒），返回毫秒
fn parse_retry_after(lower: &str) -> Option<u64> {
    let pos = lower.find("retry-after")?;
    lower[pos..]
        .split_whitespace()
        .skip(1)
        .find_map(|word| {
            word.trim_end_matches(|c: char| !c.is_ascii_digit())
                .parse::<u64>()
                .ok()
        })
        .map(|secs| secs * 1000)
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        if messages.is_empty() {
            return Err(LlmError::InvalidRequest("empty message list".to_string()));
        }
        let openai_messages = self
            .to_openai_messages(messages)
            .map_err(|e| LlmError::InvalidRequest(e.to_string()))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(self.temperature)
            .messages(openai_messages)
            .build()
            .map_err(|e| LlmError::InvalidRequest(e.to_string()))?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            let err = classify_error(&e.to_string());
            tracing::debug!(model = %self.model, error = %err, "LLM request failed");
            err
        })?;

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        Ok(content)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_rate_limit_with_retry_after() {
        let err = classify_error("HTTP 429 Too Many Requests, retry-after: 2");
        assert_eq!(
            err,
            LlmError::RateLimited {
                retry_after_ms: Some(2_000)
            }
        );
    }

    #[test]
    fn test_classify_server_and_auth_errors() {
        assert!(classify_error("503 Service Unavailable").is_retryable());
        assert!(!classify_error("401 Unauthorized: invalid api key").is_retryable());
        assert_eq!(classify_error("operation timed out"), LlmError::Timeout);
        assert!(matches!(
            classify_error("error sending request: connection refused"),
            LlmError::Transport(_)
        ));
    }
}
