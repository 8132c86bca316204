//! Switchboard HTTP 入口
//!
//! 启动: cargo run --bin switchboard-web --features web
//! - GET  /health      健康检查
//! - GET  /agent/info  Orchestrator 工具与预算
//! - POST /invoke      执行一个任务

#![cfg(feature = "web")]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use switchboard::agents::{
    build_orchestrator, create_llm_from_config, create_tracer_from_config, AgentInfo,
};
use switchboard::config::load_config;
use switchboard::observability::Tracer;
use switchboard::react::Directive;
use switchboard::{Orchestrator, SessionContext};

struct AppState {
    orchestrator: Arc<Orchestrator>,
    tracer: Tracer,
    request_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct InvokeRequest {
    input: String,
    session_id: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct IntermediateStep {
    action: String,
    action_input: String,
    observation: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct InvokeResponse {
    output: String,
    session_id: String,
    request_id: String,
    status: String,
    iterations: usize,
    intermediate_steps: Vec<IntermediateStep>,
    trace_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ErrorResponse {
    error: String,
    error_type: String,
    request_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct HealthResponse {
    status: String,
    agent_status: String,
    tools_loaded: usize,
    tracing_backend: String,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let tools_loaded = state.orchestrator.info().tools_count;
    Json(HealthResponse {
        status: "healthy".to_string(),
        agent_status: if tools_loaded > 0 { "ready" } else { "no_tools" }.to_string(),
        tools_loaded,
        tracing_backend: state.tracer.sink_name().to_string(),
    })
}

async fn agent_info(State(state): State<Arc<AppState>>) -> Json<AgentInfo> {
    Json(state.orchestrator.info())
}

async fn invoke(
    State(state): State<Arc<AppState>>,
    Json(req): Json<InvokeRequest>,
) -> Result<Json<InvokeResponse>, (StatusCode, Json<ErrorResponse>)> {
    let request_id = uuid::Uuid::new_v4().to_string();
    if req.input.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "input must not be empty".to_string(),
                error_type: "validation_error".to_string(),
                request_id,
            }),
        ));
    }

    let session_id = req
        .session_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let mut session = SessionContext::new(state.tracer.clone())
        .with_session_id(session_id.clone())
        .with_metadata(req.metadata)
        .with_deadline(tokio::time::Instant::now() + state.request_timeout);
    session.correlation_id = request_id.clone();

    tracing::info!(request_id = %request_id, session_id = %session_id, "Invoke request");
    let result = state.orchestrator.handle(&req.input, &session).await;

    let intermediate_steps = result
        .transcript
        .steps()
        .iter()
        .filter_map(|step| match &step.directive {
            Directive::Action { name, raw_input } => Some(IntermediateStep {
                action: name.clone(),
                action_input: raw_input.clone(),
                observation: step.observation.clone().unwrap_or_default(),
            }),
            _ => None,
        })
        .collect();

    Ok(Json(InvokeResponse {
        output: result.answer,
        session_id,
        request_id,
        status: result.status.as_str().to_string(),
        iterations: result.iterations,
        intermediate_steps,
        trace_ids: result.trace_ids,
        error: result.failure.map(|f| f.reason),
    }))
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/agent/info", get(agent_info))
        .route("/invoke", post(invoke))
        .with_state(state)
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("Shutdown signal received");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = load_config(std::env::var("SWITCHBOARD_CONFIG").ok().map(Into::into))?;
    switchboard::observability::init(&cfg.app.log_level);

    let tracer = create_tracer_from_config(&cfg)?;
    let orchestrator = Arc::new(build_orchestrator(&cfg, create_llm_from_config(&cfg))?);
    let state = Arc::new(AppState {
        orchestrator,
        tracer: tracer.clone(),
        request_timeout: Duration::from_secs(cfg.server.request_timeout_secs),
    });

    let listener = tokio::net::TcpListener::bind(&cfg.server.bind).await?;
    tracing::info!("Switchboard Web: http://{}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracer.flush().await;
    tracing::info!("Trace sink flushed, bye");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard::config::AppConfig;
    use switchboard::llm::ScriptedLlmClient;
    use switchboard::observability::MemoryTraceSink;

    async fn serve(replies: Vec<&str>) -> String {
        let cfg = AppConfig::default();
        let llm = Arc::new(ScriptedLlmClient::new(replies));
        let orchestrator = build_orchestrator(&cfg, llm).unwrap();
        let state = Arc::new(AppState {
            orchestrator: Arc::new(orchestrator),
            tracer: Tracer::new(Arc::new(MemoryTraceSink::new())),
            request_timeout: Duration::from_secs(5),
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_health_and_info() {
        let base = serve(vec![]).await;
        let health: HealthResponse = reqwest::get(format!("{base}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health.status, "healthy");
        assert_eq!(health.tools_loaded, 3);
        assert_eq!(health.tracing_backend, "memory");

        let info: Value = reqwest::get(format!("{base}/agent/info"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(info["max_iterations"], 10);
        assert_eq!(info["tools"][0]["name"], "math_operator");
    }

    #[tokio::test]
    async fn test_invoke_empty_input_is_400() {
        let base = serve(vec![]).await;
        let resp = reqwest::Client::new()
            .post(format!("{base}/invoke"))
            .json(&serde_json::json!({ "input": "   " }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: ErrorResponse = resp.json().await.unwrap();
        assert_eq!(body.error_type, "validation_error");
    }

    #[tokio::test]
    async fn test_invoke_returns_answer_and_steps() {
        let base = serve(vec![
            "Thought: delegate\nAction: math_operator\nAction Input: {\"query\": \"2+3*4\"}",
            "Thought: use the tool\nAction: calculate\nAction Input: 2+3*4",
            "Thought: done\nFinal Answer: 14",
            "Thought: relay\nFinal Answer: The result is 14.",
        ])
        .await;
        let resp: InvokeResponse = reqwest::Client::new()
            .post(format!("{base}/invoke"))
            .json(&serde_json::json!({ "input": "What is 2+3*4?", "session_id": "s-1" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(resp.output, "The result is 14.");
        assert_eq!(resp.status, "completed");
        assert_eq!(resp.session_id, "s-1");
        assert_eq!(resp.intermediate_steps.len(), 1);
        assert_eq!(resp.intermediate_steps[0].action, "math_operator");
        assert_eq!(resp.intermediate_steps[0].observation, "14");
        assert!(resp.error.is_none());
    }
}
