//! 委派链路集成测试：Orchestrator -> Operator -> 领域工具，使用脚本化 LLM 与内存 Trace Sink

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use switchboard::config::AppConfig;
    use switchboard::llm::{LlmClient, LlmError, Message, ScriptedLlmClient};
    use switchboard::observability::{
        MemoryTraceSink, SpanKind, SpanPhase, TraceError, TraceEvent, TraceSink, Tracer,
    };
    use switchboard::react::{Directive, ParseWarning};
    use switchboard::{build_orchestrator, Orchestrator, RunStatus, SessionContext};

    fn test_config() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.llm.retry.initial_delay_ms = 1;
        cfg.llm.retry.max_delay_ms = 5;
        cfg
    }

    fn orchestrator(cfg: &AppConfig, llm: Arc<dyn LlmClient>) -> Orchestrator {
        build_orchestrator(cfg, llm).unwrap()
    }

    fn memory_session() -> (Arc<MemoryTraceSink>, SessionContext) {
        let sink = Arc::new(MemoryTraceSink::new());
        let session = SessionContext::new(Tracer::new(sink.clone()));
        (sink, session)
    }

    fn delegation_ends(sink: &MemoryTraceSink) -> Vec<TraceEvent> {
        sink.events_of(SpanKind::Delegation)
            .into_iter()
            .filter(|e| e.phase != SpanPhase::Start)
            .collect()
    }

    #[tokio::test]
    async fn test_calculation_delegated_to_math_operator() {
        let llm = Arc::new(ScriptedLlmClient::new([
            "Thought: this is math\nAction: math_operator\nAction Input: {\"query\": \"What is 2+3*4?\"}",
            "Thought: evaluate it\nAction: calculate\nAction Input: {\"expression\": \"2+3*4\"}",
            "Thought: I now know the final answer\nFinal Answer: 2+3*4 = 14",
            "Thought: the operator answered\nFinal Answer: The result is 14.",
        ]));
        let orch = orchestrator(&test_config(), llm.clone());
        let (sink, session) = memory_session();

        let result = orch.handle("What is 2+3*4?", &session).await;

        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.answer, "The result is 14.");
        assert_eq!(result.iterations, 2);
        assert_eq!(llm.calls(), 4);
        assert_eq!(
            result.transcript.steps()[0].observation.as_deref(),
            Some("2+3*4 = 14")
        );

        // 下级 Operator 的 Prompt 中能看到工具结果
        let prompts = llm.prompts();
        let operator_second_prompt = &prompts[2][1].content;
        assert!(operator_second_prompt
            .contains("Observation: The calculation result is 14, as 2+3*4 = 14."));

        let events = sink.events();
        assert!(events.iter().all(|e| e.correlation_id == session.correlation_id));
        assert_eq!(delegation_ends(&sink).len(), 1);
        let action = sink
            .events_of(SpanKind::Action)
            .into_iter()
            .find(|e| e.phase == SpanPhase::End)
            .unwrap();
        assert_eq!(action.name, "calculate");
        assert!(result.trace_ids.len() >= 6);
    }

    #[tokio::test]
    async fn test_unknown_tool_gets_corrective_observation() {
        let llm = Arc::new(ScriptedLlmClient::new([
            "Thought: try physics\nAction: physics_operator\nAction Input: gravity",
            "Thought: I cannot do that\nFinal Answer: I can only help with math, weather and dates.",
        ]));
        let orch = orchestrator(&test_config(), llm.clone());
        let (_sink, session) = memory_session();

        let result = orch.handle("How strong is gravity?", &session).await;

        assert_eq!(result.status, RunStatus::Completed);
        let observation = result.transcript.steps()[0].observation.clone().unwrap();
        assert!(observation.contains("'physics_operator' is not a valid tool"));
        assert!(observation.contains("math_operator, weather_operator, datetime_operator"));
        assert!(llm.prompts()[1][1].content.contains("is not a valid tool"));
    }

    #[tokio::test]
    async fn test_multiple_actions_only_first_runs() {
        let llm = Arc::new(ScriptedLlmClient::new([
            "Thought: two at once\nAction: math_operator\nAction Input: 1+1\nAction: datetime_operator\nAction Input: is 2024 a leap year",
            "Thought: calc\nAction: calculate\nAction Input: 1+1",
            "Final Answer: 2",
            "Thought: done\nFinal Answer: 1+1 is 2.",
        ]));
        let orch = orchestrator(&test_config(), llm.clone());
        let (sink, session) = memory_session();

        let result = orch.handle("1+1 and is 2024 a leap year?", &session).await;

        assert_eq!(result.status, RunStatus::Completed);
        let first = &result.transcript.steps()[0];
        assert!(matches!(&first.directive, Directive::Action { name, .. } if name == "math_operator"));
        assert_eq!(first.warning, Some(ParseWarning::MultipleActions { ignored: 1 }));
        let delegations = delegation_ends(&sink);
        assert_eq!(delegations.len(), 1);
        assert_eq!(delegations[0].name, "math_operator");
        assert_eq!(llm.remaining(), 0);
    }

    #[tokio::test]
    async fn test_iteration_budget_respected() {
        let mut cfg = test_config();
        cfg.agents.orchestrator.max_iterations = 3;
        let llm = Arc::new(ScriptedLlmClient::new(vec!["I am still thinking about it"; 10]));
        let orch = orchestrator(&cfg, llm.clone());
        let (_sink, session) = memory_session();

        let result = orch.handle("Think forever", &session).await;

        assert_eq!(result.status, RunStatus::MaxIterationsExceeded);
        assert_eq!(result.iterations, 3);
        assert_eq!(llm.calls(), 3);
        assert!(!result.answer.is_empty());
        assert!(result.failure.is_some());
    }

    #[tokio::test]
    async fn test_model_failures_exhaust_retries() {
        let errors = (0..4).map(|_| {
            Err(LlmError::Api {
                status: 503,
                message: "service unavailable".into(),
            })
        });
        let llm = Arc::new(ScriptedLlmClient::from_results(errors));
        let orch = orchestrator(&test_config(), llm.clone());
        let (sink, session) = memory_session();

        let result = orch.handle("What is 2+2?", &session).await;

        assert_eq!(result.status, RunStatus::Failed);
        assert!(result.answer.is_empty());
        assert_eq!(result.iterations, 4);
        assert_eq!(llm.calls(), 4);
        let model_errors = sink
            .events_of(SpanKind::ModelCall)
            .into_iter()
            .filter(|e| e.phase == SpanPhase::Error)
            .count();
        assert_eq!(model_errors, 4);
    }

    #[tokio::test]
    async fn test_retries_count_against_iteration_budget() {
        let mut cfg = test_config();
        cfg.agents.orchestrator.max_iterations = 1;
        let llm = Arc::new(ScriptedLlmClient::from_results([
            Err(LlmError::Timeout),
            Err(LlmError::Timeout),
            Err(LlmError::Timeout),
            Ok("Final Answer: x".to_string()),
        ]));
        let orch = orchestrator(&cfg, llm.clone());
        let (_sink, session) = memory_session();

        let result = orch.handle("What is 2+2?", &session).await;

        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(llm.calls(), 1);
        assert_eq!(
            result.failure.unwrap().reason,
            "model call failed; iteration budget exhausted"
        );
    }

    #[tokio::test]
    async fn test_auth_error_is_not_retried() {
        let llm = Arc::new(ScriptedLlmClient::from_results([Err(LlmError::Api {
            status: 401,
            message: "invalid api key".into(),
        })]));
        let orch = orchestrator(&test_config(), llm.clone());
        let (_sink, session) = memory_session();

        let result = orch.handle("What is 2+2?", &session).await;

        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(llm.calls(), 1);
        assert!(result.failure.unwrap().reason.contains("not retryable"));
    }

    #[tokio::test]
    async fn test_operator_failure_becomes_observation() {
        let llm = Arc::new(ScriptedLlmClient::from_results([
            Ok("Action: math_operator\nAction Input: 5/0".to_string()),
            Err(LlmError::Api {
                status: 401,
                message: "unauthorized".into(),
            }),
            Ok("Final Answer: The math specialist is unavailable.".to_string()),
        ]));
        let orch = orchestrator(&test_config(), llm.clone());
        let (_sink, session) = memory_session();

        let result = orch.handle("5/0?", &session).await;

        assert_eq!(result.status, RunStatus::Completed);
        let observation = result.transcript.steps()[0].observation.clone().unwrap();
        assert!(observation.starts_with("Error: math operator failed:"));
    }

    #[tokio::test]
    async fn test_weather_comparison_uses_two_delegations() {
        let server = MockServer::start().await;
        for (city, lat, temp) in [("Berlin", 52.52, 21.5), ("Paris", 48.85, 18.0)] {
            Mock::given(method("GET"))
                .and(path("/v1/search"))
                .and(query_param("name", city))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "results": [{"latitude": lat, "longitude": 2.0, "name": city}]
                })))
                .expect(1)
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/v1/forecast"))
                .and(query_param("latitude", lat.to_string()))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "current": {"temperature_2m": temp, "weather_code": 0}
                })))
                .mount(&server)
                .await;
        }

        let mut cfg = test_config();
        cfg.tools.weather.geocoding_url = format!("{}/v1/search", server.uri());
        cfg.tools.weather.forecast_url = format!("{}/v1/forecast", server.uri());

        let llm = Arc::new(ScriptedLlmClient::new([
            "Thought: one city at a time\nAction: weather_operator\nAction Input: Current weather in Berlin",
            "Action: get_current_weather\nAction Input: {\"location\": \"Berlin\"}",
            "Final Answer: Berlin is 21.5°C and clear.",
            "Thought: now Paris\nAction: weather_operator\nAction Input: Current weather in Paris",
            "Action: get_current_weather\nAction Input: location=Paris",
            "Final Answer: Paris is 18°C and clear.",
            "Thought: compare\nFinal Answer: Berlin (21.5°C) is warmer than Paris (18°C).",
        ]));
        let orch = orchestrator(&cfg, llm.clone());
        let (sink, session) = memory_session();

        let result = orch.handle("Is it warmer in Berlin or Paris?", &session).await;

        assert_eq!(result.status, RunStatus::Completed);
        assert!(result.answer.contains("Berlin") && result.answer.contains("Paris"));
        let delegations = delegation_ends(&sink);
        assert_eq!(delegations.len(), 2);
        assert!(delegations.iter().all(|e| e.name == "weather_operator"));

        let actions: Vec<_> = result
            .transcript
            .steps()
            .iter()
            .filter_map(|s| match &s.directive {
                Directive::Action { raw_input, .. } => Some(raw_input.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(
            actions,
            vec!["Current weather in Berlin", "Current weather in Paris"]
        );
        let prompts = llm.prompts();
        let final_prompt = &prompts[6][1].content;
        assert!(final_prompt.contains("Berlin is 21.5°C") && final_prompt.contains("Paris is 18°C"));
    }

    struct FailingSink;

    #[async_trait]
    impl TraceSink for FailingSink {
        fn name(&self) -> &str {
            "failing"
        }

        fn record(&self, _event: TraceEvent) -> Result<(), TraceError> {
            Err(TraceError::Backend("backend down".into()))
        }

        async fn flush(&self) -> Result<(), TraceError> {
            Err(TraceError::Closed)
        }
    }

    #[tokio::test]
    async fn test_failing_sink_does_not_change_control_flow() {
        let llm = Arc::new(ScriptedLlmClient::new([
            "Action: datetime_operator\nAction Input: Is 2024 a leap year?",
            "Action: check_leap_year\nAction Input: 2024",
            "Final Answer: Year 2024 is a leap year",
            "Final Answer: Yes, 2024 is a leap year.",
        ]));
        let orch = orchestrator(&test_config(), llm);
        let tracer = Tracer::new(Arc::new(FailingSink));
        let session = SessionContext::new(tracer.clone());

        let result = orch.handle("Is 2024 a leap year?", &session).await;
        tracer.flush().await;

        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.answer, "Yes, 2024 is a leap year.");
        assert_eq!(
            result.transcript.steps()[0].observation.as_deref(),
            Some("Year 2024 is a leap year")
        );
    }

    /// 永远不返回的模型
    struct HangingLlm;

    #[async_trait]
    impl LlmClient for HangingLlm {
        async fn complete(&self, _messages: &[Message]) -> Result<String, LlmError> {
            std::future::pending().await
        }

        fn model_name(&self) -> &str {
            "hanging"
        }
    }

    #[tokio::test]
    async fn test_cancellation_ends_run_as_failed() {
        let orch = orchestrator(&test_config(), Arc::new(HangingLlm));
        let (_sink, session) = memory_session();
        let token = session.cancel_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });

        let result = orch.handle("What is 2+2?", &session).await;

        assert_eq!(result.status, RunStatus::Failed);
        assert!(result.answer.is_empty());
        assert_eq!(result.failure.unwrap().reason, "cancelled");
    }

    #[tokio::test]
    async fn test_deadline_ends_run_as_failed() {
        let orch = orchestrator(&test_config(), Arc::new(HangingLlm));
        let sink = Arc::new(MemoryTraceSink::new());
        let session = SessionContext::new(Tracer::new(sink))
            .with_deadline(tokio::time::Instant::now() + Duration::from_millis(50));

        let result = orch.handle("What is 2+2?", &session).await;

        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(result.failure.unwrap().reason, "deadline exceeded");
    }
}
