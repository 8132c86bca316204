//! Agent 构建与装配期错误
//!
//! 运行期（ReAct 循环内）的错误不走这里：协议违规、非法输入、未知工具、工具失败都被转成
//! Observation 回灌给模型；模型调用失败由 RecoveryEngine 决定重试或终止，最终体现在 AgentResult.status。

use thiserror::Error;

/// 构建 Orchestrator / Operator / 工具注册表时可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Duplicate tool name: {0}")]
    DuplicateTool(String),

    #[error("Prompt error: {0}")]
    PromptError(String),

    #[error("Tool setup failed: {0}")]
    ToolSetup(String),
}
