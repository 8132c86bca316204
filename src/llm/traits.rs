//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Mistral / Mock / Scripted）实现 LlmClient：输入完整消息列表，返回一段补全文本。
//! 失败统一为 LlmError，由恢复引擎依据 is_retryable 决定重试或终止。

use async_trait::async_trait;

use crate::llm::Message;

/// 模型调用错误
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LlmError {
    #[error("model call timed out")]
    Timeout,

    #[error("rate limited by provider")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl LlmError {
    /// 超时、限流、网络错误、5xx / 408 可重试；其余（鉴权、参数错误）直接失败
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Timeout | LlmError::RateLimited { .. } | LlmError::Transport(_) => true,
            LlmError::Api { status, .. } => *status >= 500 || *status == 408,
            LlmError::InvalidRequest(_) => false,
        }
    }
}

/// LLM 客户端 trait：无状态、可在多个 Agent 间共享
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// 模型名（写入 trace 与 /agent/info）
    fn model_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(LlmError::Timeout.is_retryable());
        assert!(LlmError::RateLimited { retry_after_ms: None }.is_retryable());
        assert!(LlmError::Transport("connection reset".into()).is_retryable());
        assert!(LlmError::Api { status: 503, message: "unavailable".into() }.is_retryable());
        assert!(!LlmError::Api { status: 401, message: "bad key".into() }.is_retryable());
        assert!(!LlmError::InvalidRequest("empty messages".into()).is_retryable());
    }
}
