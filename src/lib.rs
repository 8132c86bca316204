//! Switchboard - Rust 多智能体委派系统
//!
//! 模块划分：
//! - **agents**: Orchestrator / Operator 智能体、Prompt 存储与装配工厂
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误、恢复引擎、请求级会话上下文
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mistral / Mock）
//! - **observability**: 日志初始化与 Trace Sink（Log / Memory / HTTP）
//! - **react**: Action Parser、Input Normalizer、Transcript、ReAct 主循环
//! - **tools**: 工具注册表、执行器与领域工具（math / weather / datetime）

pub mod agents;
pub mod config;
pub mod core;
pub mod llm;
pub mod observability;
pub mod react;
pub mod tools;

pub use agents::{build_orchestrator, Orchestrator, OperatorAgent, OperatorKind};
pub use core::SessionContext;
pub use react::{AgentResult, RunStatus};
