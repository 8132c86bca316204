//! 可观测性：日志初始化与 Trace Sink

pub mod http;
pub mod sink;
pub mod tracer;

pub use http::{HttpTraceConfig, HttpTraceSink};
pub use sink::{
    LogTraceSink, MemoryTraceSink, NoopTraceSink, SpanKind, SpanPhase, TraceError, TraceEvent,
    TraceSink,
};
pub use tracer::{Span, Tracer};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 安装全局 subscriber；RUST_LOG 优先，否则使用配置中的级别
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init();
}
