//! digidates 工具：大气 CO2 浓度与德国法定节假日
//!
//! 接口返回 JSON，个别端点直接返回纯文本数字；两种都接受。
//! 网络失败或参数不合法以 Err(原因) 返回，由执行器转为 Observation。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use reqwest::Client;
use serde_json::Value;

use crate::config::DateTimeSection;
use crate::core::AgentError;
use crate::react::{ParamKind, ParamSpec, ToolArgs};
use crate::tools::Tool;

/// Mauna Loa 记录起始年份
const CO2_FIRST_YEAR: i32 = 1959;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DigidatesError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Network error - {0}")]
    Network(String),
}

#[derive(Debug, Clone)]
pub struct DigidatesClient {
    http: Client,
    base_url: String,
}

impl DigidatesClient {
    pub fn new(cfg: &DateTimeSection) -> Result<Self, AgentError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .user_agent(concat!("switchboard/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AgentError::ToolSetup(format!("digidates http client: {e}")))?;
        Ok(Self {
            http,
            base_url: cfg.api_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get(&self, endpoint: &str, query: &[(&str, String)]) -> Result<Value, DigidatesError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let body = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                tracing::error!(endpoint, error = %e, "digidates request failed");
                DigidatesError::Network(e.to_string())
            })?
            .text()
            .await
            .map_err(|e| DigidatesError::Network(e.to_string()))?;
        Ok(serde_json::from_str(&body).unwrap_or_else(|_| Value::String(body.trim().to_string())))
    }

    /// 某年的年均 CO2 浓度（ppm）
    pub async fn co2_level(&self, year: i32) -> Result<String, DigidatesError> {
        let data = self.get(&format!("/co2/{year}"), &[]).await?;
        let level = match &data {
            Value::Object(map) => map.get("co2").map(scalar).unwrap_or_else(|| scalar(&data)),
            other => scalar(other),
        };
        Ok(level)
    }

    /// 法定节假日 (日期, 名称) 列表；`region` 形如 `de-bb`
    pub async fn german_holidays(
        &self,
        year: Option<i32>,
        region: Option<&str>,
    ) -> Result<Vec<String>, DigidatesError> {
        let mut query = Vec::new();
        if let Some(year) = year {
            query.push(("year", year.to_string()));
        }
        if let Some(region) = region {
            query.push(("region", region.to_string()));
        }
        let data = self.get("/germanpublicholidays", &query).await?;
        let holidays = match data {
            Value::Object(map) => {
                let mut entries: Vec<(String, String)> =
                    map.iter().map(|(date, name)| (date.clone(), scalar(name))).collect();
                entries.sort();
                entries
                    .into_iter()
                    .map(|(date, name)| format!("{date}: {name}"))
                    .collect()
            }
            Value::Array(items) => items.iter().map(scalar).collect(),
            other => vec![scalar(&other)],
        };
        Ok(holidays)
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn whole_year(value: f64) -> Option<i32> {
    (value.fract() == 0.0 && (1.0..=9999.0).contains(&value)).then_some(value as i32)
}

pub struct Co2LevelTool {
    client: Arc<DigidatesClient>,
}

impl Co2LevelTool {
    pub fn new(client: Arc<DigidatesClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for Co2LevelTool {
    fn name(&self) -> &str {
        "get_co2_level"
    }

    fn description(&self) -> &str {
        "Atmospheric CO2 level (PPM) for a year between 1959 and the present."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::required("year", ParamKind::Number, "four-digit year, 1959 or later")]
    }

    async fn execute(&self, args: &ToolArgs) -> Result<String, String> {
        let current = Utc::now().year();
        let year = args
            .number("year")
            .and_then(whole_year)
            .filter(|y| (CO2_FIRST_YEAR..=current).contains(y))
            .ok_or_else(|| {
                DigidatesError::InvalidInput(format!(
                    "year must be a whole number between {CO2_FIRST_YEAR} and {current}"
                ))
                .to_string()
            })?;
        tracing::info!(year, "Getting CO2 level");

        let level = self
            .client
            .co2_level(year)
            .await
            .map_err(|e| format!("Unable to get CO2 level for year {year}: {e}"))?;
        Ok(format!("CO2 level for year {year}: {level} PPM"))
    }
}

pub struct GermanHolidaysTool {
    client: Arc<DigidatesClient>,
}

impl GermanHolidaysTool {
    pub fn new(client: Arc<DigidatesClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for GermanHolidaysTool {
    fn name(&self) -> &str {
        "get_german_holidays"
    }

    fn description(&self) -> &str {
        "German public holidays for a year (default: current year), federal or for one region code such as de-bb."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::optional("year", ParamKind::Number, "four-digit year; omit for the current year"),
            ParamSpec::optional("region", ParamKind::Text, "region code like de-by; omit for federal holidays"),
        ]
    }

    async fn execute(&self, args: &ToolArgs) -> Result<String, String> {
        let year = match args.number("year") {
            Some(y) => Some(whole_year(y).ok_or_else(|| {
                DigidatesError::InvalidInput("year must be a whole number between 1 and 9999".into())
                    .to_string()
            })?),
            None => None,
        };
        let region = args
            .text("region")
            .map(|r| r.trim().to_lowercase())
            .filter(|r| !r.is_empty());
        tracing::info!(?year, region = ?region, "Getting German holidays");

        let holidays = self
            .client
            .german_holidays(year, region.as_deref())
            .await
            .map_err(|e| format!("Unable to get German holidays: {e}"))?;

        let year_label = year.map_or("current year".to_string(), |y| y.to_string());
        let region_label = region.map(|r| format!(" in region {r}")).unwrap_or_default();
        let mut out = format!("German public holidays for {year_label}{region_label}:");
        for (i, holiday) in holidays.iter().enumerate() {
            out.push_str(&format!("\n{}. {}", i + 1, holiday));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::react::ArgValue;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> Arc<DigidatesClient> {
        let cfg = DateTimeSection {
            api_url: format!("{}/api/v1/", server.uri()),
            timeout_secs: 5,
        };
        Arc::new(DigidatesClient::new(&cfg).unwrap())
    }

    fn year(y: f64) -> ToolArgs {
        ToolArgs::new().with("year", ArgValue::Number(y))
    }

    #[tokio::test]
    async fn test_co2_level_from_json_and_plain_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/co2/2020"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "co2": "414.24" })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/co2/1990"))
            .respond_with(ResponseTemplate::new(200).set_body_string("354.45"))
            .mount(&server)
            .await;

        let tool = Co2LevelTool::new(client_for(&server));
        let out = tool.execute(&year(2020.0)).await.unwrap();
        assert_eq!(out, "CO2 level for year 2020: 414.24 PPM");
        let out = tool.execute(&year(1990.0)).await.unwrap();
        assert_eq!(out, "CO2 level for year 1990: 354.45 PPM");
    }

    #[tokio::test]
    async fn test_co2_year_out_of_range_skips_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "co2": "1" })))
            .expect(0)
            .mount(&server)
            .await;

        let tool = Co2LevelTool::new(client_for(&server));
        let err = tool.execute(&year(1900.0)).await.unwrap_err();
        assert!(err.contains("between 1959 and"));
        assert!(tool.execute(&ToolArgs::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_german_holidays_for_region() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/germanpublicholidays"))
            .and(query_param("year", "2022"))
            .and(query_param("region", "de-bb"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "2022-12-25": "1. Weihnachtstag",
                "2022-01-01": "Neujahr",
                "2022-10-31": "Reformationstag",
            })))
            .mount(&server)
            .await;

        let tool = GermanHolidaysTool::new(client_for(&server));
        let args = year(2022.0).with("region", ArgValue::Text(" DE-BB ".into()));
        let out = tool.execute(&args).await.unwrap();
        assert_eq!(
            out,
            "German public holidays for 2022 in region de-bb:\n\
             1. 2022-01-01: Neujahr\n\
             2. 2022-10-31: Reformationstag\n\
             3. 2022-12-25: 1. Weihnachtstag"
        );
    }

    #[tokio::test]
    async fn test_german_holidays_defaults_and_http_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/germanpublicholidays"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(["Neujahr", "Karfreitag"])))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let tool = GermanHolidaysTool::new(client_for(&server));
        let out = tool.execute(&ToolArgs::new()).await.unwrap();
        assert_eq!(out, "German public holidays for current year:\n1. Neujahr\n2. Karfreitag");

        let err = tool.execute(&ToolArgs::new()).await.unwrap_err();
        assert!(err.starts_with("Unable to get German holidays: Network error"));
    }
}
