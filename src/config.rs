//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SWITCHBOARD__*` 覆盖（双下划线表示嵌套，
//! 如 `SWITCHBOARD__AGENTS__OPERATOR__MAX_ITERATIONS=3`）。配置只在构建 Agent 时读取一次。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::llm::RetryPolicy;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub agents: AgentsSection,
    pub tools: ToolsSection,
    pub tracing: TracingSection,
    pub server: ServerSection,
}

/// [app] 段：应用名、日志级别、Prompt 目录
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    pub log_level: String,
    pub prompts_dir: PathBuf,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "switchboard".to_string(),
            log_level: "info".to_string(),
            prompts_dir: PathBuf::from("config/prompts"),
        }
    }
}

/// [llm] 段：后端选择、模型、超时与重试
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：mistral / openai / mock；为空时按 API Key 自动选择
    pub provider: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub temperature: f32,
    pub timeouts: LlmTimeoutsSection,
    pub retry: LlmRetrySection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: None,
            model: None,
            base_url: None,
            temperature: 0.1,
            timeouts: LlmTimeoutsSection::default(),
            retry: LlmRetrySection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 单次模型调用超时（秒）
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

/// [llm.retry] 段：模型调用失败时的有界重试（指数退避）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmRetrySection {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for LlmRetrySection {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 8_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl LlmRetrySection {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            multiplier: self.backoff_multiplier,
        }
    }
}

/// [agents] 段：Orchestrator 与 Operator 的迭代 / 时间预算
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentsSection {
    pub orchestrator: BudgetSection,
    pub operator: BudgetSection,
}

impl Default for AgentsSection {
    fn default() -> Self {
        Self {
            orchestrator: BudgetSection {
                max_iterations: 10,
                max_execution_secs: 300,
            },
            operator: BudgetSection {
                max_iterations: 5,
                max_execution_secs: 120,
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BudgetSection {
    pub max_iterations: usize,
    pub max_execution_secs: u64,
}

/// [tools] 段：工具超时与天气 API 端点
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次领域工具调用超时（秒）
    pub tool_timeout_secs: u64,
    pub weather: WeatherSection,
    pub datetime: DateTimeSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 20,
            weather: WeatherSection::default(),
            datetime: DateTimeSection::default(),
        }
    }
}

/// [tools.weather] 段：Open-Meteo 地理编码与预报接口
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WeatherSection {
    pub geocoding_url: String,
    pub forecast_url: String,
    pub timeout_secs: u64,
}

impl Default for WeatherSection {
    fn default() -> Self {
        Self {
            geocoding_url: "https://geocoding-api.open-meteo.com/v1/search".to_string(),
            forecast_url: "https://api.open-meteo.com/v1/forecast".to_string(),
            timeout_secs: 15,
        }
    }
}

/// [tools.datetime] 段：digidates 接口（CO2 浓度、德国法定节假日）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DateTimeSection {
    pub api_url: String,
    pub timeout_secs: u64,
}

impl Default for DateTimeSection {
    fn default() -> Self {
        Self {
            api_url: "https://digidates.de/api/v1".to_string(),
            timeout_secs: 10,
        }
    }
}

/// [tracing] 段：Trace Sink 后端（log / http / memory / none）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TracingSection {
    pub backend: String,
    /// HTTP 后端的批量上报地址
    pub endpoint: Option<String>,
    pub public_key_env: String,
    pub secret_key_env: String,
    /// 累计多少条事件触发一次上报
    pub flush_at: usize,
    pub flush_interval_ms: u64,
    pub queue_capacity: usize,
}

impl Default for TracingSection {
    fn default() -> Self {
        Self {
            backend: "log".to_string(),
            endpoint: None,
            public_key_env: "TRACE_PUBLIC_KEY".to_string(),
            secret_key_env: "TRACE_SECRET_KEY".to_string(),
            flush_at: 10,
            flush_interval_ms: 1_000,
            queue_capacity: 1_024,
        }
    }
}

/// [server] 段：HTTP 入口监听地址与请求级超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: String,
    pub request_timeout_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            request_timeout_secs: 300,
        }
    }
}

/// 从 config 目录加载配置，环境变量 SWITCHBOARD__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 SWITCHBOARD__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SWITCHBOARD")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_budgets() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.agents.orchestrator.max_iterations, 10);
        assert_eq!(cfg.agents.operator.max_iterations, 5);
        assert_eq!(cfg.agents.operator.max_execution_secs, 120);
        assert_eq!(cfg.tracing.flush_at, 10);
        assert_eq!(cfg.llm.retry.max_retries, 3);
    }

    #[test]
    fn test_retry_policy_from_section() {
        let section = LlmRetrySection {
            max_retries: 2,
            initial_delay_ms: 100,
            max_delay_ms: 1_000,
            backoff_multiplier: 3.0,
        };
        let policy = section.policy();
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.initial_delay, Duration::from_millis(100));
        assert_eq!(policy.max_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_load_explicit_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[agents.operator]\nmax_iterations = 3\nmax_execution_secs = 30\n\n[tracing]\nbackend = \"none\""
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.agents.operator.max_iterations, 3);
        assert_eq!(cfg.agents.operator.max_execution_secs, 30);
        assert_eq!(cfg.tracing.backend, "none");
        // 未写的段保持默认
        assert_eq!(cfg.tools.weather.timeout_secs, 15);
        assert_eq!(cfg.tools.datetime.api_url, "https://digidates.de/api/v1");
    }
}
