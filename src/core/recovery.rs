//! 错误恢复引擎
//!
//! 根据 LoopFault 返回 RecoveryAction，供 ReAct 循环决定是回灌纠正性 Observation、退避重试还是终止。
//! 协议违规 / 非法输入 / 未知工具 / 工具失败一律就地恢复（Observe）；只有模型调用失败会走 Retry / Abort。

use std::time::Duration;

use crate::llm::{LlmError, RetryPolicy};
use crate::react::InputError;

/// 模型输出既不是合法 Action 也不是 Final Answer 时回灌的格式提示
pub const FORMAT_REMINDER: &str = "Invalid Format: your response must contain EITHER\n\
Action: <one tool name>\n\
Action Input: <the input to the tool>\n\
OR\n\
Final Answer: <the final answer to the original question>\n\
Use exactly one of the two forms per response.";

/// 循环中出现的可恢复 / 不可恢复故障
#[derive(Debug)]
pub enum LoopFault<'a> {
    /// 无法识别任何标记
    Malformed { raw: &'a str },
    /// 工具名不在注册表中
    UnknownTool { name: &'a str, valid: &'a [String] },
    /// Action Input 无法规整为参数表
    InvalidInput(&'a InputError),
    /// 领域工具自身失败（如地点不存在、超时）
    ToolFailed { tool: &'a str, reason: &'a str },
    /// 模型调用失败；attempt 从 0 开始计数
    ModelCall { error: &'a LlmError, attempt: u32 },
}

/// 恢复引擎给出的建议动作
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryAction {
    /// 作为 Observation 写入 Transcript，继续下一轮
    Observe(String),
    /// 等待给定时长后重试模型调用
    Retry(Duration),
    /// 终止本次运行（状态 Failed）
    Abort(String),
}

/// 语义化错误恢复：将故障映射为可执行动作
#[derive(Debug, Clone, Default)]
pub struct RecoveryEngine {
    retry: RetryPolicy,
}

impl RecoveryEngine {
    pub fn new(retry: RetryPolicy) -> Self {
        Self { retry }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// 协议类故障的纠正性 Observation 文本
    pub fn observation(&self, fault: &LoopFault<'_>) -> String {
        match self.handle(fault) {
            RecoveryAction::Observe(text) | RecoveryAction::Abort(text) => text,
            RecoveryAction::Retry(_) => "Error: transient failure, try again.".to_string(),
        }
    }

    pub fn handle(&self, fault: &LoopFault<'_>) -> RecoveryAction {
        match fault {
            LoopFault::Malformed { .. } => RecoveryAction::Observe(FORMAT_REMINDER.to_string()),
            LoopFault::UnknownTool { name, valid } => RecoveryAction::Observe(format!(
                "'{name}' is not a valid tool. Valid tools are: [{}]. \
                 Use one of these names exactly as written, or give a Final Answer.",
                valid.join(", ")
            )),
            LoopFault::InvalidInput(err) => RecoveryAction::Observe(err.observation()),
            LoopFault::ToolFailed { tool, reason } => {
                RecoveryAction::Observe(format!("Error: {tool} failed: {reason}"))
            }
            LoopFault::ModelCall { error, attempt } => {
                if !error.is_retryable() {
                    RecoveryAction::Abort(format!("model call failed (not retryable): {error}"))
                } else if *attempt >= self.retry.max_retries {
                    RecoveryAction::Abort(format!(
                        "model call failed after {} attempts: {error}",
                        attempt + 1
                    ))
                } else {
                    RecoveryAction::Retry(self.retry.delay_for(*attempt, error))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> RecoveryEngine {
        RecoveryEngine::new(RetryPolicy {
            max_retries: 2,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            multiplier: 2.0,
        })
    }

    #[test]
    fn test_recovery_malformed() {
        let action = engine().handle(&LoopFault::Malformed { raw: "hello" });
        match action {
            RecoveryAction::Observe(msg) => assert!(msg.contains("Final Answer:")),
            _ => panic!("Expected Observe"),
        }
    }

    #[test]
    fn test_recovery_unknown_tool_lists_valid_names() {
        let valid = vec!["calculate".to_string(), "math_help".to_string()];
        let action = engine().handle(&LoopFault::UnknownTool {
            name: "fake_tool",
            valid: &valid,
        });
        match action {
            RecoveryAction::Observe(msg) => {
                assert!(msg.contains("fake_tool"));
                assert!(msg.contains("calculate, math_help"));
            }
            _ => panic!("Expected Observe"),
        }
    }

    #[test]
    fn test_recovery_tool_failed() {
        let action = engine().handle(&LoopFault::ToolFailed {
            tool: "get_current_weather",
            reason: "location not found",
        });
        assert_eq!(
            action,
            RecoveryAction::Observe("Error: get_current_weather failed: location not found".to_string())
        );
    }

    #[test]
    fn test_recovery_model_call_retries_then_aborts() {
        let engine = engine();
        let err = LlmError::Timeout;
        assert_eq!(
            engine.handle(&LoopFault::ModelCall { error: &err, attempt: 0 }),
            RecoveryAction::Retry(Duration::from_millis(100))
        );
        assert_eq!(
            engine.handle(&LoopFault::ModelCall { error: &err, attempt: 1 }),
            RecoveryAction::Retry(Duration::from_millis(200))
        );
        assert!(matches!(
            engine.handle(&LoopFault::ModelCall { error: &err, attempt: 2 }),
            RecoveryAction::Abort(_)
        ));
    }

    #[test]
    fn test_recovery_non_retryable_aborts_immediately() {
        let err = LlmError::Api {
            status: 401,
            message: "unauthorized".to_string(),
        };
        let action = engine().handle(&LoopFault::ModelCall { error: &err, attempt: 0 });
        assert!(matches!(action, RecoveryAction::Abort(msg) if msg.contains("not retryable")));
    }
}
