//! Weather 工具：Open-Meteo 地理编码 + 预报接口
//!
//! 地点先经地理编码得到经纬度（`lat,lon` 形式直接跳过地理编码），再请求预报接口。
//! 找不到地点、网络失败、解码失败都以 Err(原因) 返回，由执行器转为 Observation。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;

use crate::config::WeatherSection;
use crate::core::AgentError;
use crate::react::{ParamKind, ParamSpec, ToolArgs};
use crate::tools::Tool;

const CURRENT_FIELDS: &str = "temperature_2m,relative_humidity_2m,precipitation,weather_code,wind_speed_10m,wind_direction_10m";
const DAILY_SUMMARY_FIELDS: &str = "temperature_2m_max,temperature_2m_min,weather_code,precipitation_sum";
const DAILY_FORECAST_FIELDS: &str = "temperature_2m_max,temperature_2m_min,weather_code,precipitation_sum,wind_speed_10m_max,wind_direction_10m_dominant";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WeatherError {
    #[error("Please provide a valid location name or coordinates.")]
    EmptyLocation,

    #[error("Could not find coordinates for location '{0}'. Please check the spelling or try a different location.")]
    NotFound(String),

    #[error("Invalid coordinate format. Use 'latitude,longitude' (e.g., '52.52,13.41')")]
    InvalidCoordinates,

    #[error("Number of days must be between 1 and 16.")]
    InvalidDays,

    #[error("Network error - {0}")]
    Network(String),

    #[error("Unexpected response from weather service: {0}")]
    Decode(String),
}

/// 已解析的地点
#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Deserialize)]
struct GeocodingResponse {
    #[serde(default)]
    results: Vec<GeoResult>,
}

#[derive(Debug, Deserialize)]
struct GeoResult {
    latitude: f64,
    longitude: f64,
    name: String,
    country: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ForecastResponse {
    pub current: Option<CurrentBlock>,
    #[serde(default)]
    pub current_units: HashMap<String, String>,
    pub daily: Option<DailyBlock>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CurrentBlock {
    pub time: Option<String>,
    pub temperature_2m: Option<f64>,
    pub relative_humidity_2m: Option<f64>,
    pub precipitation: Option<f64>,
    pub weather_code: Option<i64>,
    pub wind_speed_10m: Option<f64>,
    pub wind_direction_10m: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DailyBlock {
    pub time: Vec<String>,
    pub temperature_2m_max: Vec<Option<f64>>,
    pub temperature_2m_min: Vec<Option<f64>>,
    pub weather_code: Vec<Option<i64>>,
    pub precipitation_sum: Vec<Option<f64>>,
    pub wind_speed_10m_max: Vec<Option<f64>>,
}

/// WMO 天气代码 => 文本
pub fn describe_weather_code(code: i64) -> String {
    let text = match code {
        0 => "Clear sky",
        1 => "Mainly clear",
        2 => "Partly cloudy",
        3 => "Overcast",
        45 => "Fog",
        48 => "Depositing rime fog",
        51 => "Light drizzle",
        53 => "Moderate drizzle",
        55 => "Dense drizzle",
        56 => "Light freezing drizzle",
        57 => "Dense freezing drizzle",
        61 => "Slight rain",
        63 => "Moderate rain",
        65 => "Heavy rain",
        66 => "Light freezing rain",
        67 => "Heavy freezing rain",
        71 => "Slight snow fall",
        73 => "Moderate snow fall",
        75 => "Heavy snow fall",
        77 => "Snow grains",
        80 => "Slight rain showers",
        81 => "Moderate rain showers",
        82 => "Violent rain showers",
        85 => "Slight snow showers",
        86 => "Heavy snow showers",
        95 => "Thunderstorm",
        96 => "Thunderstorm with slight hail",
        99 => "Thunderstorm with heavy hail",
        other => return format!("Unknown weather condition (code: {other})"),
    };
    text.to_string()
}

/// 解析 `lat,lon`；第一段不是数字时返回 None（按地名处理）
fn parse_coordinates(location: &str) -> Option<Result<Place, WeatherError>> {
    let (lat, lon) = location.split_once(',')?;
    let latitude: f64 = lat.trim().parse().ok()?;
    let place = lon
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|lon| (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(lon))
        .map(|longitude| Place {
            name: format!("Coordinates ({latitude}, {longitude})"),
            latitude,
            longitude,
        })
        .ok_or(WeatherError::InvalidCoordinates);
    Some(place)
}

/// Open-Meteo HTTP 客户端（无需 API Key）
#[derive(Debug, Clone)]
pub struct OpenMeteoClient {
    http: Client,
    geocoding_url: String,
    forecast_url: String,
}

impl OpenMeteoClient {
    pub fn new(cfg: &WeatherSection) -> Result<Self, AgentError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .user_agent(concat!("switchboard/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AgentError::ToolSetup(format!("weather http client: {e}")))?;
        Ok(Self {
            http,
            geocoding_url: cfg.geocoding_url.clone(),
            forecast_url: cfg.forecast_url.clone(),
        })
    }

    /// 地名或坐标 => Place
    pub async fn resolve(&self, location: &str) -> Result<Place, WeatherError> {
        let location = location.trim();
        if location.is_empty() {
            return Err(WeatherError::EmptyLocation);
        }
        if let Some(place) = parse_coordinates(location) {
            return place;
        }

        let response = self
            .http
            .get(&self.geocoding_url)
            .query(&[
                ("name", location),
                ("count", "1"),
                ("language", "en"),
                ("format", "json"),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                tracing::error!(location, error = %e, "Geocoding request failed");
                WeatherError::Network(e.to_string())
            })?;
        let body: GeocodingResponse = response
            .json()
            .await
            .map_err(|e| WeatherError::Decode(e.to_string()))?;

        let hit = body
            .results
            .into_iter()
            .next()
            .ok_or_else(|| WeatherError::NotFound(location.to_string()))?;
        let name = match hit.country {
            Some(country) if !country.is_empty() => format!("{}, {}", hit.name, country),
            _ => hit.name,
        };
        Ok(Place {
            name,
            latitude: hit.latitude,
            longitude: hit.longitude,
        })
    }

    /// 请求预报；`daily` 为 Some 时附带按日字段
    pub async fn forecast(
        &self,
        place: &Place,
        current: bool,
        daily: Option<(&str, u32)>,
    ) -> Result<ForecastResponse, WeatherError> {
        let mut query: Vec<(&str, String)> = vec![
            ("latitude", place.latitude.to_string()),
            ("longitude", place.longitude.to_string()),
            ("timezone", "auto".to_string()),
        ];
        if current {
            query.push(("current", CURRENT_FIELDS.to_string()));
        }
        if let Some((fields, days)) = daily {
            query.push(("daily", fields.to_string()));
            query.push(("forecast_days", days.to_string()));
        }

        let response = self
            .http
            .get(&self.forecast_url)
            .query(&query)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                tracing::error!(place = %place.name, error = %e, "Forecast request failed");
                WeatherError::Network(e.to_string())
            })?;
        response
            .json()
            .await
            .map_err(|e| WeatherError::Decode(e.to_string()))
    }
}

fn format_current(place: &Place, data: &ForecastResponse) -> String {
    let mut lines = vec![format!("Weather information for {}:", place.name)];
    if let Some(current) = &data.current {
        lines.push(format!(
            "\nCurrent weather (as of {}):",
            current.time.as_deref().unwrap_or("now")
        ));
        if let Some(t) = current.temperature_2m {
            lines.push(format!("• Temperature: {t}°C"));
        }
        if let Some(h) = current.relative_humidity_2m {
            lines.push(format!("• Humidity: {h}%"));
        }
        if let Some(w) = current.wind_speed_10m {
            lines.push(format!("• Wind Speed: {w} km/h"));
        }
        if let Some(d) = current.wind_direction_10m {
            lines.push(format!("• Wind Direction: {d}°"));
        }
        if let Some(p) = current.precipitation {
            lines.push(format!("• Precipitation: {p} mm"));
        }
        if let Some(code) = current.weather_code {
            lines.push(format!("• Conditions: {}", describe_weather_code(code)));
        }
    }
    if let Some(daily) = &data.daily {
        lines.push("\nDaily forecast:".to_string());
        for (i, date) in daily.time.iter().take(5).enumerate() {
            if let (Some(Some(lo)), Some(Some(hi))) =
                (daily.temperature_2m_min.get(i), daily.temperature_2m_max.get(i))
            {
                lines.push(format!("• {date}: {lo}°C to {hi}°C"));
            }
        }
    }
    if !data.current_units.is_empty() {
        lines.push(format!(
            "\nUnits: Temperature in {}, Wind in {}",
            data.current_units
                .get("temperature_2m")
                .map_or("°C", String::as_str),
            data.current_units
                .get("wind_speed_10m")
                .map_or("km/h", String::as_str),
        ));
    }
    lines.join("\n")
}

fn format_forecast(place: &Place, days: u32, data: &ForecastResponse) -> String {
    let mut lines = vec![format!("Weather forecast for {} ({days} days):", place.name)];
    let Some(daily) = &data.daily else {
        lines.push("No daily forecast data available.".to_string());
        return lines.join("\n");
    };
    for (i, date) in daily.time.iter().enumerate() {
        let (Some(Some(lo)), Some(Some(hi))) =
            (daily.temperature_2m_min.get(i), daily.temperature_2m_max.get(i))
        else {
            continue;
        };
        let heading = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map(|d| d.format("%A, %B %d").to_string())
            .unwrap_or_else(|_| date.clone());
        lines.push(format!("\n{heading}:"));
        lines.push(format!("  • Temperature: {lo}°C to {hi}°C"));
        if let Some(Some(code)) = daily.weather_code.get(i) {
            lines.push(format!("  • Conditions: {}", describe_weather_code(*code)));
        }
        if let Some(Some(p)) = daily.precipitation_sum.get(i) {
            lines.push(format!("  • Precipitation: {p} mm"));
        }
        if let Some(Some(w)) = daily.wind_speed_10m_max.get(i) {
            lines.push(format!("  • Max Wind Speed: {w} km/h"));
        }
    }
    lines.join("\n")
}

fn location_param() -> ParamSpec {
    ParamSpec::required(
        "location",
        ParamKind::Text,
        "city name (e.g. 'Paris, France') or 'latitude,longitude'",
    )
}

/// 当前天气
pub struct CurrentWeatherTool {
    client: Arc<OpenMeteoClient>,
}

impl CurrentWeatherTool {
    pub fn new(client: Arc<OpenMeteoClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for CurrentWeatherTool {
    fn name(&self) -> &str {
        "get_current_weather"
    }

    fn description(&self) -> &str {
        "Get current weather conditions for one location, optionally with a short daily forecast."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            location_param(),
            ParamSpec::optional(
                "include_forecast",
                ParamKind::Flag,
                "also include a short daily forecast",
            ),
        ]
    }

    async fn execute(&self, args: &ToolArgs) -> Result<String, String> {
        let location = args.text("location").unwrap_or_default();
        let include_forecast = args.flag("include_forecast").unwrap_or(false);
        tracing::info!(location = %location, include_forecast, "Getting current weather");

        let place = self.client.resolve(&location).await.map_err(|e| e.to_string())?;
        let daily = include_forecast.then_some((DAILY_SUMMARY_FIELDS, 7));
        let data = self
            .client
            .forecast(&place, true, daily)
            .await
            .map_err(|e| e.to_string())?;
        tracing::info!(place = %place.name, "Retrieved current weather");
        Ok(format_current(&place, &data))
    }
}

/// 多日预报（1-16 天）
pub struct ForecastTool {
    client: Arc<OpenMeteoClient>,
}

impl ForecastTool {
    pub fn new(client: Arc<OpenMeteoClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for ForecastTool {
    fn name(&self) -> &str {
        "get_weather_forecast"
    }

    fn description(&self) -> &str {
        "Get a multi-day weather forecast (1-16 days, default 7) for one location."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            location_param(),
            ParamSpec::optional("days", ParamKind::Number, "number of days, 1-16"),
        ]
    }

    async fn execute(&self, args: &ToolArgs) -> Result<String, String> {
        let days = args.number("days").unwrap_or(7.0);
        if days.fract() != 0.0 || !(1.0..=16.0).contains(&days) {
            return Err(WeatherError::InvalidDays.to_string());
        }
        let days = days as u32;
        let location = args.text("location").unwrap_or_default();
        tracing::info!(location = %location, days, "Getting weather forecast");

        let place = self.client.resolve(&location).await.map_err(|e| e.to_string())?;
        let data = self
            .client
            .forecast(&place, false, Some((DAILY_FORECAST_FIELDS, days)))
            .await
            .map_err(|e| e.to_string())?;
        Ok(format_forecast(&place, days, &data))
    }
}

pub struct WeatherHelpTool;

const WEATHER_HELP: &str = "Weather Tools Help

AVAILABLE TOOLS:
• get_current_weather(location, include_forecast=false) - Current weather conditions
• get_weather_forecast(location, days=7) - Multi-day weather forecast
• weather_help() - This help information

LOCATION FORMATS:
• City names: \"London\", \"New York\", \"Tokyo\"
• City with country: \"Paris, France\", \"Sydney, Australia\"
• Coordinates: \"52.52,13.41\" (latitude,longitude)

CURRENT WEATHER INCLUDES:
• Temperature (°C), humidity (%), wind speed and direction, precipitation (mm), conditions
• Optional daily forecast

FORECAST INCLUDES:
• Daily temperature highs and lows, conditions, precipitation, maximum wind speeds
• Up to 16 days

DATA SOURCE:
• Open-Meteo API, no API key required";

#[async_trait]
impl Tool for WeatherHelpTool {
    fn name(&self) -> &str {
        "weather_help"
    }

    fn description(&self) -> &str {
        "Show the available weather tools and accepted location formats. Takes no input."
    }

    async fn execute(&self, _args: &ToolArgs) -> Result<String, String> {
        Ok(WEATHER_HELP.to_string())
    }
}
