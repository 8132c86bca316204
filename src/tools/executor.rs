//! 工具执行器
//!
//! 解析名称 -> 规整输入 -> 在超时内调用领域工具（或运行下级 Agent），任何失败都转为 Observation 文本，
//! 从不向 ReAct 循环返回错误；每次调用输出结构化审计日志（JSON）并记录 Action / Delegation span。

use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::json;
use tokio::time::timeout;

use crate::core::{Interruption, LoopFault, RecoveryEngine, SessionContext};
use crate::observability::{Span, SpanKind};
use crate::react::{normalize_input, RunStatus};
use crate::tools::{ToolHandler, ToolRegistry, ToolSpec, DELEGATION_PARAM};

/// 单次执行的结果分类（写入审计日志）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Ok,
    UnknownTool,
    InvalidInput,
    ToolError,
    Timeout,
    Interrupted,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Ok => "ok",
            Outcome::UnknownTool => "unknown_tool",
            Outcome::InvalidInput => "invalid_input",
            Outcome::ToolError => "error",
            Outcome::Timeout => "timeout",
            Outcome::Interrupted => "interrupted",
        }
    }
}

/// 本轮 Observation
#[derive(Debug, Clone)]
pub struct Observation {
    pub text: String,
    pub outcome: Outcome,
    /// 本次执行产生的 span（含下级 Agent 的全部 span）
    pub span_ids: Vec<String>,
    /// 执行期间观察到的外部中断
    pub interrupted: Option<Interruption>,
}

impl Observation {
    fn plain(text: String, outcome: Outcome) -> Self {
        Self {
            text,
            outcome,
            span_ids: Vec::new(),
            interrupted: None,
        }
    }
}

/// 工具执行器：持有注册表、领域工具超时与恢复引擎
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
    recovery: RecoveryEngine,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout: Duration) -> Self {
        Self {
            registry,
            timeout,
            recovery: RecoveryEngine::default(),
        }
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.registry.specs()
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// 执行一个 Action；永不失败，所有错误都成为 Observation 文本
    pub async fn execute(
        &self,
        tool_name: &str,
        raw_input: &str,
        session: &SessionContext,
        parent: Option<&Span>,
    ) -> Observation {
        let start = Instant::now();
        let observation = self.dispatch(tool_name, raw_input, session, parent).await;

        let audit = json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": observation.outcome == Outcome::Ok,
            "outcome": observation.outcome.as_str(),
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": preview(raw_input, 200),
            "correlation_id": session.correlation_id,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        observation
    }

    async fn dispatch(
        &self,
        tool_name: &str,
        raw_input: &str,
        session: &SessionContext,
        parent: Option<&Span>,
    ) -> Observation {
        let Some(handler) = self.registry.get(tool_name) else {
            let valid = self.registry.tool_names();
            let text = self.recovery.observation(&LoopFault::UnknownTool {
                name: tool_name,
                valid: &valid,
            });
            return Observation::plain(text, Outcome::UnknownTool);
        };

        let args = match normalize_input(raw_input, &handler.params()) {
            Ok(args) => args,
            Err(e) => {
                tracing::debug!(tool = tool_name, error = %e, "Action Input rejected");
                let text = self.recovery.observation(&LoopFault::InvalidInput(&e));
                return Observation::plain(text, Outcome::InvalidInput);
            }
        };

        let kind = if handler.is_agent() {
            SpanKind::Delegation
        } else {
            SpanKind::Action
        };
        let span = session.start_span(
            parent,
            kind,
            tool_name,
            json!({ "raw_input": raw_input, "args": args.to_json() }),
        );
        let mut span_ids = vec![span.id.clone()];

        let (text, outcome, interrupted) = match handler {
            ToolHandler::Domain(tool) => {
                tokio::select! {
                    reason = session.interrupted() => {
                        (format!("Error: {tool_name} was interrupted: {reason}"), Outcome::Interrupted, Some(reason))
                    }
                    result = timeout(self.timeout, tool.execute(&args)) => match result {
                        Ok(Ok(content)) => (content, Outcome::Ok, None),
                        Ok(Err(reason)) => (
                            self.recovery.observation(&LoopFault::ToolFailed { tool: tool_name, reason: &reason }),
                            Outcome::ToolError,
                            None,
                        ),
                        Err(_) => (
                            self.recovery.observation(&LoopFault::ToolFailed {
                                tool: tool_name,
                                reason: &format!("timed out after {:?}", self.timeout),
                            }),
                            Outcome::Timeout,
                            None,
                        ),
                    },
                }
            }
            ToolHandler::Agent(agent) => {
                let query = args.text(DELEGATION_PARAM).unwrap_or_default();
                let result = agent.delegate(query, session, Some(&span)).await;
                span_ids.extend(result.trace_ids.iter().cloned());
                match result.status {
                    RunStatus::Failed => {
                        let reason = result
                            .failure
                            .as_ref()
                            .map(|f| f.reason.clone())
                            .unwrap_or_else(|| "unknown failure".to_string());
                        let interrupted = session.interruption();
                        let outcome = if interrupted.is_some() {
                            Outcome::Interrupted
                        } else {
                            Outcome::ToolError
                        };
                        (
                            format!("Error: {} operator failed: {}", agent.kind().name(), reason),
                            outcome,
                            interrupted,
                        )
                    }
                    RunStatus::Completed | RunStatus::MaxIterationsExceeded => {
                        (result.answer, Outcome::Ok, None)
                    }
                }
            }
        };

        if outcome == Outcome::Ok {
            session.tracer().end(&span, json!({ "observation": text }));
        } else {
            session.tracer().error(&span, &text);
        }

        Observation {
            text,
            outcome,
            span_ids,
            interrupted,
        }
    }
}

fn preview(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        format!("{}...", s.chars().take(max).collect::<String>())
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::{MemoryTraceSink, SpanPhase, Tracer};
    use crate::react::{ParamKind, ParamSpec, ToolArgs};
    use crate::tools::Tool;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echo text"
        }
        fn parameters(&self) -> Vec<ParamSpec> {
            vec![ParamSpec::required("text", ParamKind::Text, "text")]
        }
        async fn execute(&self, args: &ToolArgs) -> Result<String, String> {
            match args.text("text") {
                Some(t) if t == "fail" => Err("asked to fail".into()),
                Some(t) => Ok(t),
                None => Err("no text".into()),
            }
        }
    }

    struct Slow;

    #[async_trait]
    impl Tool for Slow {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "never finishes in time"
        }
        async fn execute(&self, _args: &ToolArgs) -> Result<String, String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("late".into())
        }
    }

    fn executor() -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(Echo).unwrap();
        registry.register(Slow).unwrap();
        ToolExecutor::new(registry, Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_execute_ok_records_action_span() {
        let sink = Arc::new(MemoryTraceSink::new());
        let session = SessionContext::new(Tracer::new(sink.clone()));
        let obs = executor().execute("echo", "hello", &session, None).await;
        assert_eq!(obs.text, "hello");
        assert_eq!(obs.outcome, Outcome::Ok);
        assert_eq!(obs.span_ids.len(), 1);

        let actions = sink.events_of(SpanKind::Action);
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[1].phase, SpanPhase::End);
    }

    #[tokio::test]
    async fn test_unknown_tool_lists_valid_names() {
        let session = SessionContext::new(Tracer::noop());
        let obs = executor().execute("Echo", "hello", &session, None).await;
        assert_eq!(obs.outcome, Outcome::UnknownTool);
        assert!(obs.text.contains("'Echo' is not a valid tool"));
        assert!(obs.text.contains("[echo, slow]"));
    }

    #[tokio::test]
    async fn test_tool_error_and_timeout_become_observations() {
        let session = SessionContext::new(Tracer::noop());
        let exec = executor();

        let obs = exec.execute("echo", "fail", &session, None).await;
        assert_eq!(obs.outcome, Outcome::ToolError);
        assert_eq!(obs.text, "Error: echo failed: asked to fail");

        let obs = exec.execute("slow", "", &session, None).await;
        assert_eq!(obs.outcome, Outcome::Timeout);
        assert!(obs.text.contains("timed out"));
    }

    #[tokio::test]
    async fn test_invalid_input_is_corrective() {
        let session = SessionContext::new(Tracer::noop());
        let obs = executor().execute("echo", "{}", &session, None).await;
        assert_eq!(obs.outcome, Outcome::InvalidInput);
        assert!(obs.text.contains("missing required parameter 'text'"));
    }
}
