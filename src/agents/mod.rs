//! Agent 装配：LLM / Tracer 选择、Operator 与 Orchestrator 构建
//!
//! 配置只在这里读取一次；构建出的 Orchestrator 可被多个请求并发共享。

pub mod operator;
pub mod orchestrator;
pub mod prompts;

pub use operator::{OperatorAgent, OperatorKind};
pub use orchestrator::{AgentInfo, Orchestrator, ToolInfo};
pub use prompts::PromptStore;

use std::sync::Arc;
use std::time::Duration;

use crate::config::{AppConfig, BudgetSection};
use crate::core::AgentError;
use crate::llm::{
    create_mistral_client, LlmClient, MockLlmClient, OpenAiClient, OPENAI_DEFAULT_MODEL,
};
use crate::observability::{
    HttpTraceConfig, HttpTraceSink, LogTraceSink, MemoryTraceSink, NoopTraceSink, TraceSink,
    Tracer,
};
use crate::react::{LoopConfig, LoopDriver, ReactPrompt};
use crate::tools::{ToolExecutor, ToolRegistry};

/// 根据配置与环境变量选择 LLM 后端（Mistral / OpenAI 兼容 / Mock）
///
/// provider 显式配置时优先；否则有 MISTRAL_API_KEY 走 Mistral，有 OPENAI_API_KEY 走 OpenAI，都没有时用 Mock。
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg
        .llm
        .provider
        .clone()
        .map(|p| p.to_lowercase())
        .unwrap_or_else(|| {
            if std::env::var("MISTRAL_API_KEY").is_ok() {
                "mistral".to_string()
            } else if std::env::var("OPENAI_API_KEY").is_ok() {
                "openai".to_string()
            } else {
                "mock".to_string()
            }
        });

    match provider.as_str() {
        "mistral" => {
            let client = create_mistral_client(cfg.llm.model.as_deref(), cfg.llm.base_url.as_deref())
                .with_temperature(cfg.llm.temperature);
            tracing::info!("Using Mistral LLM ({})", client.model_name());
            Arc::new(client)
        }
        "openai" => {
            let model = cfg.llm.model.as_deref().unwrap_or(OPENAI_DEFAULT_MODEL);
            tracing::info!("Using OpenAI LLM ({})", model);
            Arc::new(
                OpenAiClient::new(
                    cfg.llm.base_url.as_deref(),
                    model,
                    std::env::var("OPENAI_API_KEY").ok().as_deref(),
                )
                .with_temperature(cfg.llm.temperature),
            )
        }
        other => {
            if other != "mock" {
                tracing::warn!(provider = other, "Unknown LLM provider, using Mock LLM");
            } else {
                tracing::warn!("No API key set, using Mock LLM");
            }
            Arc::new(MockLlmClient)
        }
    }
}

/// 根据 [tracing] 段创建 Tracer；http 后端需要在 tokio runtime 内调用
pub fn create_tracer_from_config(cfg: &AppConfig) -> Result<Tracer, AgentError> {
    let section = &cfg.tracing;
    let sink: Arc<dyn TraceSink> = match section.backend.to_lowercase().as_str() {
        "log" => Arc::new(LogTraceSink),
        "memory" => Arc::new(MemoryTraceSink::new()),
        "none" | "noop" => Arc::new(NoopTraceSink),
        "http" => {
            let endpoint = section.endpoint.clone().ok_or_else(|| {
                AgentError::ConfigError("tracing.endpoint is required for the http backend".into())
            })?;
            let key = |var: &str| {
                std::env::var(var).map_err(|_| {
                    AgentError::ConfigError(format!("environment variable {var} is not set"))
                })
            };
            let config = HttpTraceConfig {
                endpoint,
                public_key: key(&section.public_key_env)?,
                secret_key: key(&section.secret_key_env)?,
                flush_at: section.flush_at.max(1),
                flush_interval: Duration::from_millis(section.flush_interval_ms),
                queue_capacity: section.queue_capacity.max(1),
                request_timeout: Duration::from_secs(10),
            };
            Arc::new(
                HttpTraceSink::spawn(config)
                    .map_err(|e| AgentError::ConfigError(format!("http trace sink: {e}")))?,
            )
        }
        other => {
            return Err(AgentError::ConfigError(format!(
                "unknown tracing backend '{other}' (expected log, http, memory or none)"
            )))
        }
    };
    tracing::info!(backend = sink.name(), "Trace sink ready");
    Ok(Tracer::new(sink))
}

fn loop_config(cfg: &AppConfig, budget: &BudgetSection) -> LoopConfig {
    LoopConfig {
        max_iterations: budget.max_iterations,
        max_execution: Duration::from_secs(budget.max_execution_secs),
        model_timeout: Duration::from_secs(cfg.llm.timeouts.request),
        retry: cfg.llm.retry.policy(),
    }
}

fn tool_timeout(cfg: &AppConfig) -> Duration {
    Duration::from_secs(cfg.tools.tool_timeout_secs)
}

/// 构建单个 Operator
pub fn build_operator(
    kind: OperatorKind,
    cfg: &AppConfig,
    llm: Arc<dyn LlmClient>,
    prompts: &PromptStore,
) -> Result<OperatorAgent, AgentError> {
    let registry = kind.build_registry(&cfg.tools)?;
    let prompt = ReactPrompt::new(prompts.get(kind.prompt_name())?);
    let driver = LoopDriver::new(
        kind.tool_name(),
        llm,
        prompt,
        ToolExecutor::new(registry, tool_timeout(cfg)),
        loop_config(cfg, &cfg.agents.operator),
    );
    Ok(OperatorAgent::new(kind, driver))
}

/// 构建 Orchestrator：三个 Operator 作为委派工具注册
pub fn build_orchestrator(cfg: &AppConfig, llm: Arc<dyn LlmClient>) -> Result<Orchestrator, AgentError> {
    let prompts = PromptStore::new(&cfg.app.prompts_dir);

    let mut registry = ToolRegistry::new();
    let mut operators = Vec::with_capacity(OperatorKind::ALL.len());
    for kind in OperatorKind::ALL {
        let operator = Arc::new(build_operator(kind, cfg, llm.clone(), &prompts)?);
        registry.register_agent(operator.clone())?;
        operators.push(operator);
    }

    let driver = LoopDriver::new(
        "orchestrator",
        llm,
        ReactPrompt::new(prompts.get("orchestrator_system")?),
        ToolExecutor::new(registry, tool_timeout(cfg)),
        loop_config(cfg, &cfg.agents.orchestrator),
    );
    tracing::info!(operators = operators.len(), "Orchestrator built");
    Ok(Orchestrator::new(driver, operators))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_orchestrator_with_defaults() {
        let cfg = AppConfig::default();
        let orchestrator = build_orchestrator(&cfg, Arc::new(MockLlmClient)).unwrap();
        let info = orchestrator.info();
        assert_eq!(info.tools_count, 3);
        assert_eq!(info.max_iterations, 10);
        assert_eq!(info.max_execution_secs, 300);
        assert_eq!(info.operators, vec!["math", "weather", "datetime"]);
        assert!(info.tools.iter().all(|t| t.description.chars().count() <= 103));

        let math = &orchestrator.operators()[0];
        assert_eq!(math.driver().config().max_iterations, 5);
        assert_eq!(math.driver().config().max_execution, Duration::from_secs(120));
    }

    #[test]
    fn test_tracer_backends() {
        let mut cfg = AppConfig::default();
        cfg.tracing.backend = "memory".into();
        assert_eq!(create_tracer_from_config(&cfg).unwrap().sink_name(), "memory");

        cfg.tracing.backend = "none".into();
        assert_eq!(create_tracer_from_config(&cfg).unwrap().sink_name(), "none");

        cfg.tracing.backend = "kafka".into();
        assert!(matches!(
            create_tracer_from_config(&cfg),
            Err(AgentError::ConfigError(_))
        ));

        cfg.tracing.backend = "http".into();
        cfg.tracing.endpoint = None;
        assert!(create_tracer_from_config(&cfg).is_err());
    }

    #[test]
    fn test_explicit_mock_provider() {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = Some("mock".into());
        assert_eq!(create_llm_from_config(&cfg).model_name(), "mock");
    }
}
