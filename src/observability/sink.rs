//! Trace Sink：事件落地后端
//!
//! record 必须是非阻塞的 append；失败只返回 TraceError，由 Tracer 记录 warn 后吞掉，
//! 任何 Sink 故障都不会影响 ReAct 循环的控制流。

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// span 类型：一次运行 / 一次模型调用 / 一次工具调用 / 一次委派
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    Run,
    ModelCall,
    Action,
    Delegation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanPhase {
    Start,
    End,
    Error,
}

/// 单条 trace 事件
#[derive(Debug, Clone, Serialize)]
pub struct TraceEvent {
    pub span_id: String,
    pub parent_span_id: Option<String>,
    /// 同一请求内所有事件共享
    pub correlation_id: String,
    pub kind: SpanKind,
    pub name: String,
    pub phase: SpanPhase,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: Option<u64>,
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TraceError {
    #[error("trace queue is full")]
    QueueFull,

    #[error("trace sink is closed")]
    Closed,

    #[error("trace backend error: {0}")]
    Backend(String),

    #[error("trace serialization error: {0}")]
    Serialization(String),
}

/// Trace 后端 trait：所有请求共享同一实例，必须支持并发 record
#[async_trait]
pub trait TraceSink: Send + Sync {
    fn name(&self) -> &str;

    /// 追加一条事件，不得阻塞调用方
    fn record(&self, event: TraceEvent) -> Result<(), TraceError>;

    /// 将缓冲中的事件推送到后端
    async fn flush(&self) -> Result<(), TraceError> {
        Ok(())
    }
}

/// 以 debug 日志输出事件（默认后端）
#[derive(Debug, Default)]
pub struct LogTraceSink;

#[async_trait]
impl TraceSink for LogTraceSink {
    fn name(&self) -> &str {
        "log"
    }

    fn record(&self, event: TraceEvent) -> Result<(), TraceError> {
        tracing::debug!(
            target: "switchboard::trace",
            correlation_id = %event.correlation_id,
            span_id = %event.span_id,
            parent = ?event.parent_span_id,
            kind = ?event.kind,
            phase = ?event.phase,
            name = %event.name,
            duration_ms = ?event.duration_ms,
            payload = %event.payload,
            "trace event"
        );
        Ok(())
    }
}

/// 内存后端：只追加，供测试与本地检查
#[derive(Debug, Default)]
pub struct MemoryTraceSink {
    events: Mutex<Vec<TraceEvent>>,
}

impl MemoryTraceSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn events_of(&self, kind: SpanKind) -> Vec<TraceEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.kind == kind)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TraceSink for MemoryTraceSink {
    fn name(&self) -> &str {
        "memory"
    }

    fn record(&self, event: TraceEvent) -> Result<(), TraceError> {
        self.events
            .lock()
            .map_err(|e| TraceError::Backend(e.to_string()))?
            .push(event);
        Ok(())
    }
}

/// 丢弃所有事件
#[derive(Debug, Default)]
pub struct NoopTraceSink;

#[async_trait]
impl TraceSink for NoopTraceSink {
    fn name(&self) -> &str {
        "none"
    }

    fn record(&self, _event: TraceEvent) -> Result<(), TraceError> {
        Ok(())
    }
}
