//! 工具注册表
//!
//! 领域工具实现 Tool trait（name / description / parameters / execute）；Operator Agent 以
//! ToolHandler::Agent 形式注册为 Orchestrator 的委派工具。注册表保持注册顺序（决定 Prompt 中的工具顺序），
//! 名称区分大小写、精确匹配、不允许重复。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::agents::OperatorAgent;
use crate::core::AgentError;
use crate::react::{ParamKind, ParamSpec, ToolArgs};

/// 工具 trait：名称、描述（供 LLM 理解）、参数声明、异步执行
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（Action: 之后的名字）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数声明；默认无参数
    fn parameters(&self) -> Vec<ParamSpec> {
        Vec::new()
    }

    /// 执行工具；Err 为面向模型的失败原因
    async fn execute(&self, args: &ToolArgs) -> Result<String, String>;
}

/// 注册表中的一项：领域工具或下级 Agent
#[derive(Clone)]
pub enum ToolHandler {
    Domain(Arc<dyn Tool>),
    Agent(Arc<OperatorAgent>),
}

/// 委派工具的唯一参数
pub const DELEGATION_PARAM: &str = "query";

impl ToolHandler {
    pub fn name(&self) -> &str {
        match self {
            ToolHandler::Domain(tool) => tool.name(),
            ToolHandler::Agent(agent) => agent.tool_name(),
        }
    }

    pub fn description(&self) -> &str {
        match self {
            ToolHandler::Domain(tool) => tool.description(),
            ToolHandler::Agent(agent) => agent.description(),
        }
    }

    pub fn params(&self) -> Vec<ParamSpec> {
        match self {
            ToolHandler::Domain(tool) => tool.parameters(),
            ToolHandler::Agent(_) => vec![ParamSpec::required(
                DELEGATION_PARAM,
                ParamKind::Text,
                "a single, self-contained task for this operator",
            )],
        }
    }

    pub fn is_agent(&self) -> bool {
        matches!(self, ToolHandler::Agent(_))
    }

    pub fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            params: self.params(),
        }
    }
}

/// 工具描述（Prompt 渲染与 /agent/info）
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub params: Vec<ParamSpec>,
}

#[derive(Default, Clone)]
pub struct ToolRegistry {
    handlers: Vec<ToolHandler>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) -> Result<(), AgentError> {
        self.register_handler(ToolHandler::Domain(Arc::new(tool)))
    }

    pub fn register_agent(&mut self, agent: Arc<OperatorAgent>) -> Result<(), AgentError> {
        self.register_handler(ToolHandler::Agent(agent))
    }

    pub fn register_handler(&mut self, handler: ToolHandler) -> Result<(), AgentError> {
        let name = handler.name().to_string();
        if self.index.contains_key(&name) {
            return Err(AgentError::DuplicateTool(name));
        }
        self.index.insert(name, self.handlers.len());
        self.handlers.push(handler);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ToolHandler> {
        self.index.get(name).map(|&i| &self.handlers[i])
    }

    /// 按注册顺序
    pub fn tool_names(&self) -> Vec<String> {
        self.handlers.iter().map(|h| h.name().to_string()).collect()
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.handlers.iter().map(ToolHandler::spec).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    #[async_trait]
    impl Tool for Named {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "test tool"
        }
        async fn execute(&self, _args: &ToolArgs) -> Result<String, String> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn test_registry_preserves_order_and_rejects_duplicates() {
        let mut registry = ToolRegistry::new();
        registry.register(Named("zeta")).unwrap();
        registry.register(Named("alpha")).unwrap();
        assert_eq!(registry.tool_names(), vec!["zeta", "alpha"]);

        let err = registry.register(Named("alpha")).unwrap_err();
        assert!(matches!(err, AgentError::DuplicateTool(ref n) if n == "alpha"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        let mut registry = ToolRegistry::new();
        registry.register(Named("calculate")).unwrap();
        assert!(registry.get("calculate").is_some());
        assert!(registry.get("Calculate").is_none());
    }
}
