//! Orchestrator：面向用户的入口 Agent
//!
//! 注册表里只有 Operator（委派工具），没有领域工具。对比类任务由 Prompt 约束为
//! 逐个目标分轮委派，最终比较由 Orchestrator 自己完成。

use std::sync::Arc;

use serde::Serialize;

use crate::agents::OperatorAgent;
use crate::core::SessionContext;
use crate::react::{AgentResult, LoopDriver};

/// 描述截断长度
const DESCRIPTION_PREVIEW: usize = 100;

#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
}

/// /agent/info 返回的静态信息
#[derive(Debug, Clone, Serialize)]
pub struct AgentInfo {
    pub tools_count: usize,
    pub tools: Vec<ToolInfo>,
    pub max_iterations: usize,
    pub max_execution_secs: u64,
    pub operators: Vec<String>,
}

pub struct Orchestrator {
    driver: LoopDriver,
    operators: Vec<Arc<OperatorAgent>>,
}

impl Orchestrator {
    pub fn new(driver: LoopDriver, operators: Vec<Arc<OperatorAgent>>) -> Self {
        Self { driver, operators }
    }

    pub fn driver(&self) -> &LoopDriver {
        &self.driver
    }

    pub fn operators(&self) -> &[Arc<OperatorAgent>] {
        &self.operators
    }

    /// 处理一个用户任务；永不返回 Err
    pub async fn handle(&self, task: &str, session: &SessionContext) -> AgentResult {
        tracing::info!(
            correlation_id = %session.correlation_id,
            session_id = ?session.session_id,
            "Orchestrator received task"
        );
        let result = self.driver.run(task, session).await;
        tracing::info!(
            correlation_id = %session.correlation_id,
            status = result.status.as_str(),
            iterations = result.iterations,
            "Orchestrator finished"
        );
        result
    }

    pub fn info(&self) -> AgentInfo {
        let tools: Vec<ToolInfo> = self
            .driver
            .executor()
            .specs()
            .into_iter()
            .map(|spec| ToolInfo {
                description: truncate(&spec.description, DESCRIPTION_PREVIEW),
                name: spec.name,
            })
            .collect();
        AgentInfo {
            tools_count: tools.len(),
            tools,
            max_iterations: self.driver.config().max_iterations,
            max_execution_secs: self.driver.config().max_execution.as_secs(),
            operators: self
                .operators
                .iter()
                .map(|op| op.kind().name().to_string())
                .collect(),
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        format!("{}...", s.chars().take(max).collect::<String>())
    } else {
        s.to_string()
    }
}
