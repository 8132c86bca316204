//! Mock / Scripted LLM 客户端（用于测试与离线运行，无需 API）
//!
//! - MockLlmClient：取 Prompt 中最后一个 `Question:` 行，直接回一个 Final Answer，便于本地跑通流程
//! - ScriptedLlmClient：按顺序返回预置回复（或错误），并记录每次收到的消息，供集成测试断言

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, Message, Role};

/// Mock 客户端：回显用户问题
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, Role::User))
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");

        let question = last_user
            .lines()
            .rev()
            .find_map(|l| l.trim().strip_prefix("Question:"))
            .map(str::trim)
            .unwrap_or(last_user);

        Ok(format!(
            "Thought: no model is configured, answering directly.\nFinal Answer: Echo from Mock: {}",
            question
        ))
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

/// 脚本化客户端：依次弹出预置结果；脚本耗尽后返回不可重试错误
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    prompts: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedLlmClient {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_results(replies.into_iter().map(|r| Ok(r.into())))
    }

    pub fn from_results<I>(results: I) -> Self
    where
        I: IntoIterator<Item = Result<String, LlmError>>,
    {
        Self {
            script: Mutex::new(results.into_iter().collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// 已发生的调用次数
    pub fn calls(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or(0)
    }

    /// 每次调用收到的完整消息列表
    pub fn prompts(&self) -> Vec<Vec<Message>> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    /// 剩余未消费的脚本条数
    pub fn remaining(&self) -> usize {
        self.script.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(messages.to_vec());
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        next.unwrap_or_else(|| Err(LlmError::InvalidRequest("script exhausted".to_string())))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}
