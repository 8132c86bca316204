//! DateTime 工具：本地日历计算（chrono）
//!
//! 日期统一为 `YYYY-MM-DD`；无时区的时间按 UTC 处理。所有工具共用 DateTimeTool，
//! 由 DateTimeOp 决定名称、参数与计算逻辑；"今天" 可固定，便于测试。

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveDateTime, Utc};

use crate::react::{ParamKind, ParamSpec, ToolArgs};
use crate::tools::Tool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateTimeOp {
    UnixTime,
    WeekNumber,
    LeapYear,
    ValidateDate,
    Weekday,
    Progress,
    Countdown,
    Age,
    Help,
}

impl DateTimeOp {
    pub const ALL: [DateTimeOp; 9] = [
        DateTimeOp::UnixTime,
        DateTimeOp::WeekNumber,
        DateTimeOp::LeapYear,
        DateTimeOp::ValidateDate,
        DateTimeOp::Weekday,
        DateTimeOp::Progress,
        DateTimeOp::Countdown,
        DateTimeOp::Age,
        DateTimeOp::Help,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DateTimeOp::UnixTime => "get_unix_time",
            DateTimeOp::WeekNumber => "get_week_number",
            DateTimeOp::LeapYear => "check_leap_year",
            DateTimeOp::ValidateDate => "validate_date",
            DateTimeOp::Weekday => "get_weekday",
            DateTimeOp::Progress => "calculate_progress",
            DateTimeOp::Countdown => "countdown_to_date",
            DateTimeOp::Age => "calculate_age",
            DateTimeOp::Help => "datetime_help",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            DateTimeOp::UnixTime => {
                "Unix timestamp for a date/time (YYYY-MM-DD or YYYY-MM-DD HH:MM:SS), or for now when no input is given."
            }
            DateTimeOp::WeekNumber => "ISO week number of a date (YYYY-MM-DD).",
            DateTimeOp::LeapYear => "Check whether a year is a leap year.",
            DateTimeOp::ValidateDate => "Check whether a YYYY-MM-DD date exists in the calendar.",
            DateTimeOp::Weekday => "Day of the week a date falls on.",
            DateTimeOp::Progress => {
                "How far today lies between a start and an end date, as a percentage."
            }
            DateTimeOp::Countdown => "Days (and years/months/days) remaining until a future date.",
            DateTimeOp::Age => "Age in years (and years/months/days) for a birth date.",
            DateTimeOp::Help => "Show the available date and time tools. Takes no input.",
        }
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        let date = |name: &str| ParamSpec::required(name, ParamKind::Text, "date as YYYY-MM-DD");
        match self {
            DateTimeOp::UnixTime => vec![ParamSpec::optional(
                "timestamp",
                ParamKind::Text,
                "YYYY-MM-DD or YYYY-MM-DD HH:MM:SS; omit for now",
            )],
            DateTimeOp::WeekNumber | DateTimeOp::ValidateDate | DateTimeOp::Weekday => {
                vec![date("date")]
            }
            DateTimeOp::LeapYear => {
                vec![ParamSpec::required("year", ParamKind::Number, "four-digit year")]
            }
            DateTimeOp::Progress => vec![date("start_date"), date("end_date")],
            DateTimeOp::Countdown => vec![date("target_date")],
            DateTimeOp::Age => vec![date("birth_date")],
            DateTimeOp::Help => Vec::new(),
        }
    }
}

/// 日期时间工具；`now` 为 None 时使用当前 UTC 时间
pub struct DateTimeTool {
    op: DateTimeOp,
    now: Option<NaiveDateTime>,
}

impl DateTimeTool {
    pub fn new(op: DateTimeOp) -> Self {
        Self { op, now: None }
    }

    /// 固定 "现在"
    pub fn at(op: DateTimeOp, now: NaiveDateTime) -> Self {
        Self { op, now: Some(now) }
    }

    /// 全部日期工具（注册顺序即 Prompt 中的顺序）
    pub fn all() -> Vec<DateTimeTool> {
        DateTimeOp::ALL.into_iter().map(DateTimeTool::new).collect()
    }
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| format!("Invalid date '{s}'. Expected format: YYYY-MM-DD"))
}

fn parse_timestamp(s: &str) -> Result<NaiveDateTime, String> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.naive_utc());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt);
        }
    }
    parse_date(s)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| {
            format!("Invalid timestamp '{s}'. Expected YYYY-MM-DD or YYYY-MM-DD HH:MM:SS")
        })
}

fn required_date(args: &ToolArgs, name: &str) -> Result<(String, NaiveDate), String> {
    let raw = args
        .text(name)
        .ok_or_else(|| format!("missing required parameter '{name}'"))?;
    let date = parse_date(&raw)?;
    Ok((raw.trim().to_string(), date))
}

/// from <= to 时的 (年, 月, 日) 差
fn ymd_between(from: NaiveDate, to: NaiveDate) -> (u32, u32, i64) {
    let mut months =
        (to.year() - from.year()) * 12 + to.month() as i32 - from.month() as i32;
    if to.day() < from.day() {
        months -= 1;
    }
    let months = months.max(0) as u32;
    let anchor = from.checked_add_months(Months::new(months)).unwrap_or(from);
    let days = (to - anchor).num_days();
    (months / 12, months % 12, days)
}

fn trim_decimal(value: f64, places: usize) -> String {
    let s = format!("{value:.places$}");
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s
    }
}

/// 计算入口（不读系统时钟）
pub fn compute(op: DateTimeOp, args: &ToolArgs, now: NaiveDateTime) -> Result<String, String> {
    let today = now.date();
    match op {
        DateTimeOp::UnixTime => match args.text("timestamp").filter(|s| !s.trim().is_empty()) {
            None => Ok(format!(
                "Current Unix timestamp: {} (Current date: {})",
                now.and_utc().timestamp(),
                today.format("%Y-%m-%d")
            )),
            Some(raw) => {
                let dt = parse_timestamp(&raw)?;
                Ok(format!(
                    "Unix timestamp for '{}': {} (Date: {})",
                    raw.trim(),
                    dt.and_utc().timestamp(),
                    dt.date().format("%Y-%m-%d")
                ))
            }
        },
        DateTimeOp::WeekNumber => {
            let (raw, date) = required_date(args, "date")?;
            Ok(format!("Week number for {raw}: {}", date.iso_week().week()))
        }
        DateTimeOp::LeapYear => {
            let year = args
                .number("year")
                .filter(|y| y.fract() == 0.0 && (1.0..=9999.0).contains(y))
                .ok_or_else(|| "year must be a whole number between 1 and 9999".to_string())?
                as i32;
            let leap = NaiveDate::from_ymd_opt(year, 2, 29).is_some();
            Ok(format!(
                "Year {year} is {}",
                if leap { "a leap year" } else { "not a leap year" }
            ))
        }
        DateTimeOp::ValidateDate => {
            let raw = args.text("date").unwrap_or_default();
            let valid = parse_date(&raw).is_ok();
            Ok(format!(
                "Date {} is {}",
                raw.trim(),
                if valid { "valid" } else { "invalid" }
            ))
        }
        DateTimeOp::Weekday => {
            let (raw, date) = required_date(args, "date")?;
            Ok(format!(
                "Date {raw} falls on a {} (weekday number: {})",
                date.format("%A"),
                date.weekday().num_days_from_sunday()
            ))
        }
        DateTimeOp::Progress => {
            let (start_raw, start) = required_date(args, "start_date")?;
            let (end_raw, end) = required_date(args, "end_date")?;
            if end <= start {
                return Err(format!("end_date {end_raw} must be after start_date {start_raw}"));
            }
            let start_ts = start.and_hms_opt(0, 0, 0).unwrap_or_default();
            let end_ts = end.and_hms_opt(0, 0, 0).unwrap_or_default();
            let total = (end_ts - start_ts).num_seconds() as f64;
            let elapsed = (now - start_ts).num_seconds() as f64;
            let fraction = (elapsed / total).clamp(0.0, 1.0);
            Ok(format!(
                "Progress from {start_raw} to {end_raw}: {}% ({} as decimal)",
                trim_decimal(fraction * 100.0, 2),
                trim_decimal(fraction, 4)
            ))
        }
        DateTimeOp::Countdown => {
            let (raw, target) = required_date(args, "target_date")?;
            if target < today {
                return Err(format!("Target date {raw} is in the past"));
            }
            let (years, months, days) = ymd_between(today, target);
            Ok(format!(
                "Countdown to {raw}:\n• Total days: {}\n• Extended: {years} years, {months} months, {days} days",
                (target - today).num_days()
            ))
        }
        DateTimeOp::Age => {
            let (raw, birth) = required_date(args, "birth_date")?;
            if birth > today {
                return Err(format!("Birth date {raw} is in the future"));
            }
            let (years, months, days) = ymd_between(birth, today);
            Ok(format!(
                "Age for birth date {raw}:\n• Age: {years} years\n• Detailed: {years} years, {months} months, {days} days"
            ))
        }
        DateTimeOp::Help => Ok(DATETIME_HELP.to_string()),
    }
}

const DATETIME_HELP: &str = "DateTime Tools Help

AVAILABLE TOOLS:
• get_unix_time(timestamp) - Unix timestamp for a date/time, or now
• get_week_number(date) - ISO week number
• check_leap_year(year) - Leap year check
• validate_date(date) - Check whether a date exists
• get_weekday(date) - Day of the week (0 = Sunday)
• calculate_progress(start_date, end_date) - Progress between two dates
• countdown_to_date(target_date) - Time remaining until a date
• calculate_age(birth_date) - Age from a birth date
• get_co2_level(year) - Atmospheric CO2 level for a year (1959-present)
• get_german_holidays(year, region) - German public holidays, optionally for one region (e.g. de-bb)
• datetime_help() - This help information

DATE FORMAT: YYYY-MM-DD (e.g. 2024-03-15)";

#[async_trait]
impl Tool for DateTimeTool {
    fn name(&self) -> &str {
        self.op.name()
    }

    fn description(&self) -> &str {
        self.op.description()
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        self.op.parameters()
    }

    async fn execute(&self, args: &ToolArgs) -> Result<String, String> {
        let now = self.now.unwrap_or_else(|| Utc::now().naive_utc());
        tracing::info!(tool = self.op.name(), args = %args.to_json(), "Running datetime tool");
        compute(self.op, args, now)
    }
}
