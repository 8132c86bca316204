//! 请求级会话上下文：关联 ID、取消令牌、截止时间与 Tracer
//!
//! 每次 handle() 新建一个 SessionContext，由 Orchestrator 借给下游 Operator；
//! 嵌套运行共享同一 correlation_id 与取消令牌，因此一次取消会终止整条委派链。

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::observability::{Span, SpanKind, Tracer};

/// 运行被外部中断的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interruption {
    Cancelled,
    DeadlineExceeded,
}

impl fmt::Display for Interruption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interruption::Cancelled => write!(f, "cancelled"),
            Interruption::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

/// 单次请求的上下文（调用方持有，下游只借用）
#[derive(Debug)]
pub struct SessionContext {
    pub correlation_id: String,
    pub session_id: Option<String>,
    pub metadata: HashMap<String, Value>,
    tracer: Tracer,
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl SessionContext {
    pub fn new(tracer: Tracer) -> Self {
        Self {
            correlation_id: uuid::Uuid::new_v4().to_string(),
            session_id: None,
            metadata: HashMap::new(),
            tracer,
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// 使用外部令牌（如 Ctrl+C 处理器持有的 token）
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn tracer(&self) -> &Tracer {
        &self.tracer
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// 同步检查：已取消或已过截止时间
    pub fn interruption(&self) -> Option<Interruption> {
        if self.cancel.is_cancelled() {
            return Some(Interruption::Cancelled);
        }
        match self.deadline {
            Some(d) if Instant::now() >= d => Some(Interruption::DeadlineExceeded),
            _ => None,
        }
    }

    /// 等待直到被取消或到达截止时间；两者都没有时永不返回
    pub async fn interrupted(&self) -> Interruption {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.cancel.cancelled() => Interruption::Cancelled,
                    _ = tokio::time::sleep_until(deadline) => Interruption::DeadlineExceeded,
                }
            }
            None => {
                self.cancel.cancelled().await;
                Interruption::Cancelled
            }
        }
    }

    /// 开启一个 span，并写入 Start 事件
    pub fn start_span(
        &self,
        parent: Option<&Span>,
        kind: SpanKind,
        name: &str,
        input: Value,
    ) -> Span {
        self.tracer
            .start(&self.correlation_id, parent, kind, name, input)
    }
}
