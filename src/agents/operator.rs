//! Operator Agent：绑定单一领域工具集的 Loop Driver
//!
//! 对 Orchestrator 只暴露一个能力：以 `query` 为输入处理本领域的自然语言请求。
//! 委派是严格嵌套的：下级循环跑完（或耗尽预算）后上级循环才继续。

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::Serialize;

use crate::config::ToolsSection;
use crate::core::{AgentError, SessionContext};
use crate::observability::Span;
use crate::react::{AgentResult, LoopDriver};
use crate::tools::{
    CalculateTool, Co2LevelTool, CurrentWeatherTool, DateTimeTool, DigidatesClient, ForecastTool,
    GermanHolidaysTool, MathHelpTool, OpenMeteoClient, ToolRegistry, WeatherHelpTool,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatorKind {
    Math,
    Weather,
    DateTime,
}

impl OperatorKind {
    pub const ALL: [OperatorKind; 3] = [OperatorKind::Math, OperatorKind::Weather, OperatorKind::DateTime];

    pub fn name(&self) -> &'static str {
        match self {
            OperatorKind::Math => "math",
            OperatorKind::Weather => "weather",
            OperatorKind::DateTime => "datetime",
        }
    }

    /// Orchestrator 注册表中的委派工具名
    pub fn tool_name(&self) -> &'static str {
        match self {
            OperatorKind::Math => "math_operator",
            OperatorKind::Weather => "weather_operator",
            OperatorKind::DateTime => "datetime_operator",
        }
    }

    pub fn prompt_name(&self) -> &'static str {
        match self {
            OperatorKind::Math => "math_operator_system",
            OperatorKind::Weather => "weather_operator_system",
            OperatorKind::DateTime => "datetime_operator_system",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            OperatorKind::Math => {
                "Delegate ONE mathematical task (arithmetic, expressions, rounding, sums) to the math specialist. \
                 Input: a natural-language description of the calculation."
            }
            OperatorKind::Weather => {
                "Delegate a weather task for ONE location (current conditions or multi-day forecast) to the weather specialist. \
                 Input: a natural-language request naming the location."
            }
            OperatorKind::DateTime => {
                "Delegate ONE date/time task (unix timestamps, week numbers, leap years, weekdays, date progress, \
                 countdowns, ages, yearly CO2 levels, German public holidays) to the datetime specialist. \
                 Input: a natural-language request."
            }
        }
    }

    /// 本领域的工具注册表
    pub fn build_registry(&self, tools: &ToolsSection) -> Result<ToolRegistry, AgentError> {
        let mut registry = ToolRegistry::new();
        match self {
            OperatorKind::Math => {
                registry.register(CalculateTool)?;
                registry.register(MathHelpTool)?;
            }
            OperatorKind::Weather => {
                let client = Arc::new(OpenMeteoClient::new(&tools.weather)?);
                registry.register(CurrentWeatherTool::new(client.clone()))?;
                registry.register(ForecastTool::new(client))?;
                registry.register(WeatherHelpTool)?;
            }
            OperatorKind::DateTime => {
                for tool in DateTimeTool::all() {
                    registry.register(tool)?;
                }
                let client = Arc::new(DigidatesClient::new(&tools.datetime)?);
                registry.register(Co2LevelTool::new(client.clone()))?;
                registry.register(GermanHolidaysTool::new(client))?;
            }
        }
        Ok(registry)
    }
}

pub struct OperatorAgent {
    kind: OperatorKind,
    driver: LoopDriver,
}

impl OperatorAgent {
    pub fn new(kind: OperatorKind, driver: LoopDriver) -> Self {
        Self { kind, driver }
    }

    pub fn kind(&self) -> OperatorKind {
        self.kind
    }

    pub fn tool_name(&self) -> &str {
        self.kind.tool_name()
    }

    pub fn description(&self) -> &str {
        self.kind.description()
    }

    pub fn driver(&self) -> &LoopDriver {
        &self.driver
    }

    /// 直接处理一个请求（顶层调用）
    pub async fn handle(&self, query: &str, session: &SessionContext) -> AgentResult {
        self.driver.run(query, session).await
    }

    /// 作为委派工具被上级循环调用；装箱以打断 LoopDriver -> ToolExecutor -> OperatorAgent 的 async 递归
    pub fn delegate<'a>(
        &'a self,
        query: String,
        session: &'a SessionContext,
        parent: Option<&'a Span>,
    ) -> BoxFuture<'a, AgentResult> {
        Box::pin(async move {
            tracing::info!(operator = self.kind.name(), query = %query, "Operator received task");
            let result = self.driver.run_within(&query, session, parent).await;
            tracing::info!(
                operator = self.kind.name(),
                status = result.status.as_str(),
                iterations = result.iterations,
                "Operator finished"
            );
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn test_registries_per_kind() {
        let cfg = AppConfig::default();
        let math = OperatorKind::Math.build_registry(&cfg.tools).unwrap();
        assert_eq!(math.tool_names(), vec!["calculate", "math_help"]);

        let weather = OperatorKind::Weather.build_registry(&cfg.tools).unwrap();
        assert_eq!(
            weather.tool_names(),
            vec!["get_current_weather", "get_weather_forecast", "weather_help"]
        );

        let datetime = OperatorKind::DateTime.build_registry(&cfg.tools).unwrap();
        assert_eq!(datetime.len(), 11);
        assert!(datetime.get("countdown_to_date").is_some());
        assert!(datetime.get("get_co2_level").is_some());
        assert!(datetime.get("get_german_holidays").is_some());
    }

    #[test]
    fn test_kind_names() {
        let names: Vec<_> = OperatorKind::ALL.iter().map(|k| k.tool_name()).collect();
        assert_eq!(names, vec!["math_operator", "weather_operator", "datetime_operator"]);
        assert_eq!(OperatorKind::Weather.prompt_name(), "weather_operator_system");
    }
}
