//! Mistral API 客户端（OpenAI 兼容格式）
//!
//! - Base URL: https://api.mistral.ai/v1
//! - 默认模型: mistral-medium-latest

use crate::llm::OpenAiClient;

pub const MISTRAL_BASE_URL: &str = "https://api.mistral.ai/v1";
pub const MISTRAL_DEFAULT_MODEL: &str = "mistral-medium-latest";

/// 创建 Mistral 客户端
///
/// - 使用环境变量 `MISTRAL_API_KEY`
/// - 模型优先级：`model` 参数 > `MISTRAL_MODEL` 环境变量 > 默认模型
pub fn create_mistral_client(model: Option<&str>, base_url: Option<&str>) -> OpenAiClient {
    let api_key = std::env::var("MISTRAL_API_KEY").unwrap_or_else(|_| "sk-placeholder".to_string());

    let model = model
        .map(String::from)
        .or_else(|| std::env::var("MISTRAL_MODEL").ok())
        .unwrap_or_else(|| MISTRAL_DEFAULT_MODEL.to_string());

    OpenAiClient::new(
        Some(base_url.unwrap_or(MISTRAL_BASE_URL)),
        &model,
        Some(api_key.as_str()),
    )
}
