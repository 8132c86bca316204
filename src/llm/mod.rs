//! LLM 层：消息类型、客户端抽象与实现（OpenAI 兼容 / Mistral / Mock / Scripted）、重试策略

pub mod message;
pub mod mistral;
pub mod mock;
pub mod openai;
pub mod retry;
pub mod traits;

pub use message::{Message, Role};
pub use mistral::{create_mistral_client, MISTRAL_BASE_URL, MISTRAL_DEFAULT_MODEL};
pub use mock::{MockLlmClient, ScriptedLlmClient};
pub use openai::{OpenAiClient, OPENAI_DEFAULT_MODEL};
pub use retry::RetryPolicy;
pub use traits::{LlmClient, LlmError};
