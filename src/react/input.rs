//! Input Normalizer：把 `Action Input:` 之后的原始文本规整为类型化参数表
//!
//! 依次尝试：
//! 1. 去掉代码块围栏 / 反引号
//! 2. 空输入、`{}`、`null`、`None` => 无参数
//! 3. 严格 JSON 对象；单个未知键且工具只有一个参数时映射到该参数
//! 4. 修复单引号 / Python 字面量后的 JSON
//! 5. `key=value` / `key: value` 形式（只认已声明的参数名）
//! 6. 单个（可带引号的）值 => 工具唯一的（必填）参数
//!
//! 值按声明类型转换（数字文本 => Number，"true"/"false" => Flag）。全部失败时返回 InputError，
//! 由执行器转成纠正性 Observation 交回模型，而不是中止循环。

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

/// 参数值：封闭的三种类型
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ArgValue {
    Text(String),
    Number(f64),
    Flag(bool),
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Text(s) => write!(f, "{s}"),
            ArgValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            ArgValue::Number(n) => write!(f, "{n}"),
            ArgValue::Flag(b) => write!(f, "{b}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    Text,
    Number,
    Flag,
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParamKind::Text => "text",
            ParamKind::Number => "number",
            ParamKind::Flag => "true/false",
        };
        write!(f, "{s}")
    }
}

/// 工具参数声明
#[derive(Debug, Clone, Serialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub required: bool,
    pub description: String,
}

impl ParamSpec {
    pub fn required(name: &str, kind: ParamKind, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            required: true,
            description: description.to_string(),
        }
    }

    pub fn optional(name: &str, kind: ParamKind, description: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind, description)
        }
    }
}

/// 规整后的参数表（按名排序，便于日志稳定）
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ToolArgs(BTreeMap<String, ArgValue>);

impl ToolArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ArgValue) {
        self.0.insert(name.into(), value);
    }

    pub fn with(mut self, name: impl Into<String>, value: ArgValue) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.0.get(name)
    }

    /// 任意类型都可按文本读取
    pub fn text(&self, name: &str) -> Option<String> {
        self.0.get(name).map(|v| v.to_string())
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        match self.0.get(name)? {
            ArgValue::Number(n) => Some(*n),
            ArgValue::Text(s) => s.trim().parse().ok(),
            ArgValue::Flag(_) => None,
        }
    }

    pub fn flag(&self, name: &str) -> Option<bool> {
        match self.0.get(name)? {
            ArgValue::Flag(b) => Some(*b),
            ArgValue::Text(s) => parse_flag(s),
            ArgValue::Number(n) => Some(*n != 0.0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(&self.0).unwrap_or(Value::Null)
    }
}

/// 输入无法规整
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InputError {
    #[error("input could not be parsed")]
    Unparseable { raw: String, expected: String },

    #[error("missing required parameter '{name}'")]
    MissingRequired {
        name: String,
        raw: String,
        expected: String,
    },

    #[error("parameter '{name}' expects a {kind} value, got {got:?}")]
    WrongKind {
        name: String,
        kind: ParamKind,
        got: String,
        raw: String,
        expected: String,
    },
}

impl InputError {
    pub fn raw(&self) -> &str {
        match self {
            InputError::Unparseable { raw, .. }
            | InputError::MissingRequired { raw, .. }
            | InputError::WrongKind { raw, .. } => raw,
        }
    }

    pub fn expected(&self) -> &str {
        match self {
            InputError::Unparseable { expected, .. }
            | InputError::MissingRequired { expected, .. }
            | InputError::WrongKind { expected, .. } => expected,
        }
    }

    /// 回灌给模型的纠正性 Observation
    pub fn observation(&self) -> String {
        format!(
            "Error: your Action Input could not be parsed ({}). Received: {}. Expected format is: {}",
            self,
            if self.raw().trim().is_empty() { "<empty>" } else { self.raw() },
            self.expected()
        )
    }
}

/// 生成参数格式说明，如 `{"location": "<text>", "days": <number, optional>}`
pub fn expected_format(params: &[ParamSpec]) -> String {
    if params.is_empty() {
        return "{} (this tool takes no input)".to_string();
    }
    let fields: Vec<String> = params
        .iter()
        .map(|p| {
            let placeholder = match (p.kind, p.required) {
                (ParamKind::Text, true) => "\"<text>\"".to_string(),
                (ParamKind::Text, false) => "\"<text, optional>\"".to_string(),
                (kind, true) => format!("<{kind}>"),
                (kind, false) => format!("<{kind}, optional>"),
            };
            format!("\"{}\": {}", p.name, placeholder)
        })
        .collect();
    format!("{{{}}}", fields.join(", "))
}

/// 规整入口
pub fn normalize_input(raw: &str, params: &[ParamSpec]) -> Result<ToolArgs, InputError> {
    if params.is_empty() {
        return Ok(ToolArgs::new());
    }
    let ctx = Ctx { raw, params };
    let cleaned = strip_fences(raw);

    if is_empty_marker(cleaned) {
        return ctx.finish(ToolArgs::new());
    }

    if let Some(value) = parse_json_lenient(cleaned) {
        return match value {
            Value::Object(obj) => ctx.from_object(obj),
            Value::Array(_) | Value::Null => ctx.lone(cleaned),
            scalar => match ctx.sole_target() {
                Some(spec) => {
                    let mut args = ToolArgs::new();
                    if let Some(v) = ctx.coerce(spec, &scalar)? {
                        args.insert(spec.name.clone(), v);
                    }
                    ctx.finish(args)
                }
                None => Err(ctx.unparseable()),
            },
        };
    }

    // 以 { 开头却无法修复的 JSON 不再走启发式，直接让模型重写
    if cleaned.starts_with('{') {
        return Err(ctx.unparseable());
    }

    if let Some(args) = ctx.from_pairs(cleaned)? {
        return ctx.finish(args);
    }

    ctx.lone(cleaned)
}

struct Ctx<'a> {
    raw: &'a str,
    params: &'a [ParamSpec],
}

impl<'a> Ctx<'a> {
    fn unparseable(&self) -> InputError {
        InputError::Unparseable {
            raw: self.raw.to_string(),
            expected: expected_format(self.params),
        }
    }

    fn spec(&self, name: &str) -> Option<&'a ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// 单值输入的目标参数：唯一参数，或唯一必填参数
    fn sole_target(&self) -> Option<&'a ParamSpec> {
        if self.params.len() == 1 {
            return self.params.first();
        }
        let mut required = self.params.iter().filter(|p| p.required);
        match (required.next(), required.next()) {
            (Some(only), None) => Some(only),
            _ => None,
        }
    }

    fn coerce(&self, spec: &ParamSpec, value: &Value) -> Result<Option<ArgValue>, InputError> {
        let wrong = |got: String| InputError::WrongKind {
            name: spec.name.clone(),
            kind: spec.kind,
            got,
            raw: self.raw.to_string(),
            expected: expected_format(self.params),
        };
        let out = match (spec.kind, value) {
            (_, Value::Null) => return Ok(None),
            (ParamKind::Text, Value::String(s)) => ArgValue::Text(s.trim().to_string()),
            (ParamKind::Text, Value::Number(n)) => ArgValue::Text(n.to_string()),
            (ParamKind::Text, Value::Bool(b)) => ArgValue::Text(b.to_string()),
            (ParamKind::Text, other) => ArgValue::Text(other.to_string()),
            (ParamKind::Number, Value::Number(n)) => {
                ArgValue::Number(n.as_f64().ok_or_else(|| wrong(n.to_string()))?)
            }
            (ParamKind::Number, Value::String(s)) => ArgValue::Number(
                s.trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|n| n.is_finite())
                    .ok_or_else(|| wrong(s.clone()))?,
            ),
            (ParamKind::Flag, Value::Bool(b)) => ArgValue::Flag(*b),
            (ParamKind::Flag, Value::String(s)) => {
                ArgValue::Flag(parse_flag(s).ok_or_else(|| wrong(s.clone()))?)
            }
            (ParamKind::Flag, Value::Number(n)) => ArgValue::Flag(n.as_f64() != Some(0.0)),
            (_, other) => return Err(wrong(other.to_string())),
        };
        Ok(Some(out))
    }

    fn from_object(&self, obj: Map<String, Value>) -> Result<ToolArgs, InputError> {
        let mut args = ToolArgs::new();
        let single_unknown = obj.len() == 1 && obj.keys().all(|k| self.spec(k).is_none());

        for (key, value) in &obj {
            let spec = match self.spec(key) {
                Some(spec) => spec,
                None if single_unknown => match self.sole_target() {
                    Some(spec) => spec,
                    None => continue,
                },
                None => {
                    tracing::debug!(key = %key, "Ignoring unknown input key");
                    continue;
                }
            };
            if let Some(v) = self.coerce(spec, value)? {
                args.insert(spec.name.clone(), v);
            }
        }
        self.finish(args)
    }

    /// `key=value` / `key: value`，只识别已声明的参数名，且必须从开头就是该形式
    fn from_pairs(&self, text: &str) -> Result<Option<ToolArgs>, InputError> {
        let names: Vec<String> = self.params.iter().map(|p| regex::escape(&p.name)).collect();
        let pattern = format!(
            r#"(?:^|[,;\n])\s*["']?({})["']?\s*[:=]\s*"#,
            names.join("|")
        );
        let Ok(re) = Regex::new(&pattern) else {
            return Ok(None);
        };

        let matches: Vec<(usize, usize, String)> = re
            .captures_iter(text)
            .filter_map(|c| {
                let whole = c.get(0)?;
                Some((whole.start(), whole.end(), c.get(1)?.as_str().to_string()))
            })
            .collect();
        match matches.first() {
            Some((start, _, _)) if *start == 0 => {}
            _ => return Ok(None),
        }

        let mut args = ToolArgs::new();
        for (i, (_, value_start, name)) in matches.iter().enumerate() {
            let value_end = matches.get(i + 1).map_or(text.len(), |m| m.0);
            let value = unquote(text[*value_start..value_end].trim().trim_end_matches([',', ';']));
            if let Some(spec) = self.spec(name) {
                if let Some(v) = self.coerce(spec, &Value::String(value.to_string()))? {
                    args.insert(spec.name.clone(), v);
                }
            }
        }
        Ok(Some(args))
    }

    fn lone(&self, text: &str) -> Result<ToolArgs, InputError> {
        let spec = self.sole_target().ok_or_else(|| self.unparseable())?;
        let mut args = ToolArgs::new();
        if let Some(v) = self.coerce(spec, &Value::String(unquote(text).to_string()))? {
            args.insert(spec.name.clone(), v);
        }
        self.finish(args)
    }

    fn finish(&self, args: ToolArgs) -> Result<ToolArgs, InputError> {
        if let Some(missing) = self
            .params
            .iter()
            .find(|p| p.required && !matches!(args.get(&p.name), Some(v) if !v.to_string().is_empty()))
        {
            return Err(InputError::MissingRequired {
                name: missing.name.clone(),
                raw: self.raw.to_string(),
                expected: expected_format(self.params),
            });
        }
        Ok(args)
    }
}

fn strip_fences(raw: &str) -> &str {
    let mut s = raw.trim();
    if let Some(rest) = s.strip_prefix("```") {
        // 去掉语言标识行
        s = match rest.find('\n') {
            Some(nl) => &rest[nl + 1..],
            None => rest,
        };
        s = s.trim_end().trim_end_matches("```").trim();
    }
    s.trim_matches('`').trim()
}

fn is_empty_marker(s: &str) -> bool {
    matches!(s, "" | "{}" | "null" | "None" | "none")
}

/// 严格 JSON；失败时把单引号与 Python 字面量替换后再试一次
fn parse_json_lenient(s: &str) -> Option<Value> {
    if let Ok(v) = serde_json::from_str::<Value>(s) {
        return Some(v);
    }
    if !s.starts_with('{') {
        return None;
    }
    let repaired = s
        .replace('\'', "\"")
        .replace(": True", ": true")
        .replace(": False", ": false")
        .replace(": None", ": null");
    serde_json::from_str::<Value>(&repaired)
        .ok()
        .filter(Value::is_object)
}

fn unquote(s: &str) -> &str {
    let s = s.trim();
    for q in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(q) && s.ends_with(q) {
            return s[1..s.len() - 1].trim();
        }
    }
    s
}

fn parse_flag(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Some(true),
        "false" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}
