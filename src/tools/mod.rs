//! 工具层：注册表、执行器与领域工具

pub mod datetime;
pub mod digidates;
pub mod executor;
pub mod math;
pub mod registry;
pub mod weather;

pub use datetime::{DateTimeOp, DateTimeTool};
pub use digidates::{Co2LevelTool, DigidatesClient, GermanHolidaysTool};
pub use executor::{Observation, Outcome, ToolExecutor};
pub use math::{CalculateTool, MathHelpTool};
pub use registry::{Tool, ToolHandler, ToolRegistry, ToolSpec, DELEGATION_PARAM};
pub use weather::{CurrentWeatherTool, ForecastTool, OpenMeteoClient, WeatherHelpTool};
