//! ReAct 主循环（Loop Driver）
//!
//! 状态机：AwaitingModel -> Parsing -> (Executing | Done | Aborted)，Executing 之后回到 AwaitingModel。
//! - 每轮只执行一个 Action；Malformed / 未知工具 / 非法输入都作为 Observation 回灌，不中止
//! - 模型调用失败按 RetryPolicy 有界重试；每次调用（含重试）都计入迭代预算，预算内重试不完即 Failed
//! - 迭代或时间预算耗尽 => MaxIterationsExceeded，以最后一条 Observation 作为兜底答案
//! - 调用方取消或会话截止时间到达 => Failed
//!
//! run 永不返回 Err：任何结局都是一个 AgentResult。

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tokio::time::Instant;

use crate::core::{Interruption, LoopFault, RecoveryAction, RecoveryEngine, SessionContext};
use crate::llm::{LlmClient, LlmError, Message, RetryPolicy};
use crate::observability::{Span, SpanKind};
use crate::react::{parse_directive, Directive, ParseWarning, ReactPrompt, Step, Transcript};
use crate::tools::ToolExecutor;

/// 迭代耗尽且没有任何 Observation 时的兜底答案
const STOPPED_ANSWER: &str = "Agent stopped due to iteration limit or time limit.";

/// 单个 Agent 的循环预算
#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub max_iterations: usize,
    pub max_execution: Duration,
    /// 单次模型调用超时
    pub model_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            max_execution: Duration::from_secs(300),
            model_timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    Completed,
    MaxIterationsExceeded,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::MaxIterationsExceeded => "max_iterations_exceeded",
            RunStatus::Failed => "failed",
        }
    }
}

/// 失败详情
#[derive(Debug, Clone, Serialize)]
pub struct RunFailure {
    pub reason: String,
    pub iterations: usize,
    pub last_observation: Option<String>,
}

/// 一次运行的最终结果
#[derive(Debug, Clone, Serialize)]
pub struct AgentResult {
    pub agent: String,
    /// Failed 时为空
    pub answer: String,
    pub status: RunStatus,
    pub transcript: Transcript,
    /// 实际发出的模型调用次数（含重试）
    pub iterations: usize,
    /// 本次运行（含下级 Agent）产生的全部 span id
    pub trace_ids: Vec<String>,
    pub failure: Option<RunFailure>,
}

enum LoopState {
    AwaitingModel,
    Parsing(String),
    Executing {
        thought: String,
        name: String,
        raw_input: String,
        warning: Option<ParseWarning>,
    },
    Done(String),
    Aborted(RunStatus, String),
}

enum ModelFailure {
    Interrupted(Interruption),
    OutOfTime,
    Fatal(String),
}

/// Loop Driver：一个 Agent = 名称 + LLM + Prompt + 工具执行器 + 预算
pub struct LoopDriver {
    name: String,
    llm: Arc<dyn LlmClient>,
    prompt: ReactPrompt,
    executor: ToolExecutor,
    recovery: RecoveryEngine,
    config: LoopConfig,
}

impl LoopDriver {
    pub fn new(
        name: impl Into<String>,
        llm: Arc<dyn LlmClient>,
        prompt: ReactPrompt,
        executor: ToolExecutor,
        config: LoopConfig,
    ) -> Self {
        Self {
            name: name.into(),
            llm,
            prompt,
            executor,
            recovery: RecoveryEngine::new(config.retry.clone()),
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    pub fn executor(&self) -> &ToolExecutor {
        &self.executor
    }

    /// 顶层运行
    pub async fn run(&self, task: &str, session: &SessionContext) -> AgentResult {
        self.run_within(task, session, None).await
    }

    /// 在父 span 之下运行（委派时使用）
    pub async fn run_within(
        &self,
        task: &str,
        session: &SessionContext,
        parent: Option<&Span>,
    ) -> AgentResult {
        let run_span = session.start_span(parent, SpanKind::Run, &self.name, json!({ "task": task }));
        let mut trace_ids = vec![run_span.id.clone()];
        let budget_deadline = Instant::now() + self.config.max_execution;
        let tools = self.executor.specs();
        let mut transcript = Transcript::new();
        let mut iterations = 0usize;
        let mut turn_clock = Instant::now();
        let mut turn_started = Utc::now();

        tracing::info!(agent = %self.name, correlation_id = %session.correlation_id, "Run started");

        let mut state = LoopState::AwaitingModel;
        let (status, answer, reason) = loop {
            state = match state {
                LoopState::AwaitingModel => {
                    if let Some(reason) = session.interruption() {
                        LoopState::Aborted(RunStatus::Failed, reason.to_string())
                    } else if iterations >= self.config.max_iterations {
                        LoopState::Aborted(
                            RunStatus::MaxIterationsExceeded,
                            format!("iteration budget of {} exhausted", self.config.max_iterations),
                        )
                    } else if Instant::now() >= budget_deadline {
                        LoopState::Aborted(
                            RunStatus::MaxIterationsExceeded,
                            "time budget exhausted".to_string(),
                        )
                    } else {
                        turn_clock = Instant::now();
                        turn_started = Utc::now();
                        let messages = self.prompt.render(&tools, task, &transcript);
                        match self
                            .call_model(
                                &messages,
                                session,
                                &run_span,
                                budget_deadline,
                                &mut iterations,
                                &mut trace_ids,
                            )
                            .await
                        {
                            Ok(text) => LoopState::Parsing(text),
                            Err(ModelFailure::Interrupted(reason)) => {
                                LoopState::Aborted(RunStatus::Failed, reason.to_string())
                            }
                            Err(ModelFailure::OutOfTime) => LoopState::Aborted(
                                RunStatus::MaxIterationsExceeded,
                                "time budget exhausted".to_string(),
                            ),
                            Err(ModelFailure::Fatal(msg)) => LoopState::Aborted(RunStatus::Failed, msg),
                        }
                    }
                }
                LoopState::Parsing(text) => {
                    let turn = parse_directive(&text);
                    if let Some(warning) = &turn.warning {
                        tracing::warn!(agent = %self.name, step = iterations, warning = %warning.to_log(), "Protocol violation");
                    }
                    match turn.directive {
                        Directive::FinalAnswer { text: answer } => {
                            transcript.push(Step {
                                index: transcript.next_index(),
                                thought: turn.thought,
                                directive: Directive::FinalAnswer {
                                    text: answer.clone(),
                                },
                                observation: None,
                                warning: None,
                                started_at: turn_started,
                                duration_ms: turn_clock.elapsed().as_millis() as u64,
                            });
                            LoopState::Done(answer)
                        }
                        Directive::Malformed { raw_text } => {
                            tracing::debug!(agent = %self.name, step = iterations, "Malformed model output");
                            let observation =
                                self.recovery.observation(&LoopFault::Malformed { raw: &raw_text });
                            transcript.push(Step {
                                index: transcript.next_index(),
                                thought: turn.thought,
                                directive: Directive::Malformed { raw_text },
                                observation: Some(observation),
                                warning: None,
                                started_at: turn_started,
                                duration_ms: turn_clock.elapsed().as_millis() as u64,
                            });
                            LoopState::AwaitingModel
                        }
                        Directive::Action { name, raw_input } => LoopState::Executing {
                            thought: turn.thought,
                            name,
                            raw_input,
                            warning: turn.warning,
                        },
                    }
                }
                LoopState::Executing {
                    thought,
                    name,
                    raw_input,
                    warning,
                } => {
                    tracing::info!(agent = %self.name, step = iterations, tool = %name, "Executing action");
                    let observation = self
                        .executor
                        .execute(&name, &raw_input, session, Some(&run_span))
                        .await;
                    trace_ids.extend(observation.span_ids);
                    transcript.push(Step {
                        index: transcript.next_index(),
                        thought,
                        directive: Directive::Action { name, raw_input },
                        observation: Some(observation.text),
                        warning,
                        started_at: turn_started,
                        duration_ms: turn_clock.elapsed().as_millis() as u64,
                    });
                    match observation.interrupted {
                        Some(reason) => LoopState::Aborted(RunStatus::Failed, reason.to_string()),
                        None => LoopState::AwaitingModel,
                    }
                }
                LoopState::Done(answer) => break (RunStatus::Completed, answer, None),
                LoopState::Aborted(RunStatus::MaxIterationsExceeded, reason) => {
                    let answer = transcript
                        .last_observation()
                        .unwrap_or(STOPPED_ANSWER)
                        .to_string();
                    break (RunStatus::MaxIterationsExceeded, answer, Some(reason));
                }
                LoopState::Aborted(status, reason) => break (status, String::new(), Some(reason)),
            };
        };

        let failure = reason.map(|reason| RunFailure {
            reason,
            iterations,
            last_observation: transcript.last_observation().map(String::from),
        });

        match status {
            RunStatus::Completed => {
                tracing::info!(agent = %self.name, iterations, "Run completed");
                session.tracer().end(
                    &run_span,
                    json!({ "status": status.as_str(), "answer": answer, "iterations": iterations }),
                );
            }
            _ => {
                let reason = failure.as_ref().map(|f| f.reason.as_str()).unwrap_or("");
                tracing::warn!(agent = %self.name, iterations, status = status.as_str(), reason, "Run ended without final answer");
                session
                    .tracer()
                    .error(&run_span, &format!("{}: {}", status.as_str(), reason));
            }
        }

        AgentResult {
            agent: self.name.clone(),
            answer,
            status,
            transcript,
            iterations,
            trace_ids,
            failure,
        }
    }

    /// 一轮模型调用：超时 + 有界重试；全程可被取消 / 截止时间 / 时间预算打断。
    /// 每次尝试都计入 `calls`，重试不得超出 max_iterations
    async fn call_model(
        &self,
        messages: &[Message],
        session: &SessionContext,
        run_span: &Span,
        budget_deadline: Instant,
        calls: &mut usize,
        trace_ids: &mut Vec<String>,
    ) -> Result<String, ModelFailure> {
        let mut attempt = 0u32;
        loop {
            *calls += 1;
            let span = session.start_span(
                Some(run_span),
                SpanKind::ModelCall,
                self.llm.model_name(),
                json!({ "attempt": attempt, "messages": messages }),
            );
            trace_ids.push(span.id.clone());

            let result = tokio::select! {
                reason = session.interrupted() => {
                    session.tracer().error(&span, &reason.to_string());
                    return Err(ModelFailure::Interrupted(reason));
                }
                _ = tokio::time::sleep_until(budget_deadline) => {
                    session.tracer().error(&span, "time budget exhausted");
                    return Err(ModelFailure::OutOfTime);
                }
                r = tokio::time::timeout(self.config.model_timeout, self.llm.complete(messages)) => {
                    r.unwrap_or(Err(LlmError::Timeout))
                }
            };

            let err = match result {
                Ok(text) => {
                    session.tracer().end(&span, json!({ "completion": text }));
                    return Ok(text);
                }
                Err(err) => err,
            };
            session.tracer().error(&span, &err.to_string());

            match self.recovery.handle(&LoopFault::ModelCall {
                error: &err,
                attempt,
            }) {
                RecoveryAction::Retry(_) if *calls >= self.config.max_iterations => {
                    tracing::error!(agent = %self.name, calls = *calls, error = %err, "Model call failed with no iteration budget left");
                    return Err(ModelFailure::Fatal(
                        "model call failed; iteration budget exhausted".to_string(),
                    ));
                }
                RecoveryAction::Retry(delay) => {
                    tracing::warn!(
                        agent = %self.name,
                        attempt = attempt + 1,
                        max_retries = self.config.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Retrying model call"
                    );
                    tokio::select! {
                        reason = session.interrupted() => return Err(ModelFailure::Interrupted(reason)),
                        _ = tokio::time::sleep_until(budget_deadline) => return Err(ModelFailure::OutOfTime),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                RecoveryAction::Abort(msg) | RecoveryAction::Observe(msg) => {
                    tracing::error!(agent = %self.name, error = %err, "Model call failed");
                    return Err(ModelFailure::Fatal(msg));
                }
            }
        }
    }
}
