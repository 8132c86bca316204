//! Tracer：在 TraceSink 之上的薄封装
//!
//! 负责生成 span id、计算耗时，并把 Sink 错误降级为 warn 日志。Clone 代价仅为一次 Arc 计数。

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::{json, Value};

use super::sink::{NoopTraceSink, SpanKind, SpanPhase, TraceEvent, TraceSink};

/// 进行中的 span
#[derive(Debug, Clone)]
pub struct Span {
    pub id: String,
    pub parent_id: Option<String>,
    pub correlation_id: String,
    pub kind: SpanKind,
    pub name: String,
    started: Instant,
}

impl Span {
    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

#[derive(Clone)]
pub struct Tracer {
    sink: Arc<dyn TraceSink>,
}

impl fmt::Debug for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer")
            .field("sink", &self.sink.name())
            .finish()
    }
}

impl Tracer {
    pub fn new(sink: Arc<dyn TraceSink>) -> Self {
        Self { sink }
    }

    pub fn noop() -> Self {
        Self::new(Arc::new(NoopTraceSink))
    }

    pub fn sink_name(&self) -> &str {
        self.sink.name()
    }

    pub fn start(
        &self,
        correlation_id: &str,
        parent: Option<&Span>,
        kind: SpanKind,
        name: &str,
        input: Value,
    ) -> Span {
        let span = Span {
            id: uuid::Uuid::new_v4().to_string(),
            parent_id: parent.map(|p| p.id.clone()),
            correlation_id: correlation_id.to_string(),
            kind,
            name: name.to_string(),
            started: Instant::now(),
        };
        self.emit(&span, SpanPhase::Start, None, json!({ "input": input }));
        span
    }

    pub fn end(&self, span: &Span, output: Value) {
        self.emit(
            span,
            SpanPhase::End,
            Some(span.elapsed_ms()),
            json!({ "output": output }),
        );
    }

    pub fn error(&self, span: &Span, error: &str) {
        self.emit(
            span,
            SpanPhase::Error,
            Some(span.elapsed_ms()),
            json!({ "error": error }),
        );
    }

    /// 推送缓冲事件；失败只记录 warn
    pub async fn flush(&self) {
        if let Err(e) = self.sink.flush().await {
            tracing::warn!(sink = self.sink.name(), error = %e, "Trace flush failed");
        }
    }

    fn emit(&self, span: &Span, phase: SpanPhase, duration_ms: Option<u64>, payload: Value) {
        let event = TraceEvent {
            span_id: span.id.clone(),
            parent_span_id: span.parent_id.clone(),
            correlation_id: span.correlation_id.clone(),
            kind: span.kind,
            name: span.name.clone(),
            phase,
            timestamp: Utc::now(),
            duration_ms,
            payload,
        };
        if let Err(e) = self.sink.record(event) {
            tracing::warn!(
                sink = self.sink.name(),
                span = %span.name,
                error = %e,
                "Trace event dropped"
            );
        }
    }
}
