//! Action Parser：把模型输出解析为唯一一条 Directive
//!
//! 识别行首标记 `Thought:` / `Action:` / `Action Input:` / `Observation:` / `Final Answer:`。
//! 纯函数，无副作用。规则：
//! - 出现 `Final Answer:` 时，其后的全部文本即答案，忽略同一输出中的任何 Action
//! - 只取第一个 `Action:` 块；多于一个时附带 MultipleActions 警告，其余丢弃
//! - `Action:` 之后必须紧跟 `Action Input:`，否则视为 Malformed
//! - 无任何标记 / 空答案 / 空工具名 => Malformed

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

/// 单轮模型输出的意图
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Directive {
    /// 调用一个工具；raw_input 在执行时由 Input Normalizer 规整
    Action { name: String, raw_input: String },
    FinalAnswer { text: String },
    Malformed { raw_text: String },
}

/// 协议违规但已就地处理时的警告，写入对应 Step
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParseWarning {
    /// 同一输出中出现多个 Action，只执行第一个
    MultipleActions { ignored: usize },
}

impl ParseWarning {
    pub fn to_log(&self) -> String {
        match self {
            ParseWarning::MultipleActions { ignored } => format!(
                "multiple actions in one response; only the first was executed ({} ignored)",
                ignored
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTurn {
    pub thought: String,
    pub directive: Directive,
    pub warning: Option<ParseWarning>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Thought,
    Action,
    ActionInput,
    Observation,
    FinalAnswer,
}

#[derive(Debug, Clone, Copy)]
struct Hit {
    marker: Marker,
    /// 标记所在行的起始位置
    start: usize,
    /// 冒号之后的位置
    body: usize,
}

fn marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*\**[ \t]*(Final Answer|Action Input|Action|Observation|Thought)[ \t]*\**[ \t]*:")
            .expect("marker regex is valid")
    })
}

fn scan(text: &str) -> Vec<Hit> {
    marker_re()
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let marker = match caps.get(1)?.as_str() {
                "Final Answer" => Marker::FinalAnswer,
                "Action Input" => Marker::ActionInput,
                "Action" => Marker::Action,
                "Observation" => Marker::Observation,
                _ => Marker::Thought,
            };
            Some(Hit {
                marker,
                start: whole.start(),
                body: whole.end(),
            })
        })
        .collect()
}

/// 解析一段模型输出
pub fn parse_directive(text: &str) -> ParsedTurn {
    let hits = scan(text);
    let thought = extract_thought(text, &hits);

    let malformed = |thought: String| ParsedTurn {
        thought,
        directive: Directive::Malformed {
            raw_text: text.to_string(),
        },
        warning: None,
    };

    if let Some(fa) = hits.iter().find(|h| h.marker == Marker::FinalAnswer) {
        let answer = text[fa.body..].trim();
        if answer.is_empty() {
            return malformed(thought);
        }
        return ParsedTurn {
            thought,
            directive: Directive::FinalAnswer {
                text: answer.to_string(),
            },
            warning: None,
        };
    }

    let action_count = hits.iter().filter(|h| h.marker == Marker::Action).count();
    let Some(action_idx) = hits.iter().position(|h| h.marker == Marker::Action) else {
        return malformed(thought);
    };

    let action = hits[action_idx];
    let name_end = hits.get(action_idx + 1).map_or(text.len(), |h| h.start);
    let name = clean_name(&text[action.body..name_end]);

    let input_hit = match hits.get(action_idx + 1) {
        Some(h) if h.marker == Marker::ActionInput => *h,
        _ => return malformed(thought),
    };
    if name.is_empty() {
        return malformed(thought);
    }

    // Action Input 一直延续到下一个非 Action Input 的标记
    let input_end = hits[action_idx + 2..]
        .iter()
        .find(|h| h.marker != Marker::ActionInput)
        .map_or(text.len(), |h| h.start);
    let raw_input = text[input_hit.body..input_end].trim().to_string();

    ParsedTurn {
        thought,
        directive: Directive::Action { name, raw_input },
        warning: (action_count > 1).then(|| ParseWarning::MultipleActions {
            ignored: action_count - 1,
        }),
    }
}

/// Thought：第一个标记之前的文本；若输出以 `Thought:` 开头则取其内容
fn extract_thought(text: &str, hits: &[Hit]) -> String {
    match hits.first() {
        None => String::new(),
        Some(first) if first.marker == Marker::Thought => {
            let end = hits.get(1).map_or(text.len(), |h| h.start);
            text[first.body..end].trim().to_string()
        }
        Some(first) => text[..first.start].trim().to_string(),
    }
}

fn clean_name(segment: &str) -> String {
    segment
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("")
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == '*' || c.is_whitespace())
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_action() {
        let turn = parse_directive(
            "I need to compute this.\nAction: calculate\nAction Input: {\"expression\": \"2+3*4\"}",
        );
        assert_eq!(turn.thought, "I need to compute this.");
        assert_eq!(
            turn.directive,
            Directive::Action {
                name: "calculate".into(),
                raw_input: "{\"expression\": \"2+3*4\"}".into(),
            }
        );
        assert!(turn.warning.is_none());
    }

    #[test]
    fn test_parse_final_answer_wins_over_action() {
        let turn = parse_directive(
            "Action: calculate\nAction Input: 1+1\nThought: I now know\nFinal Answer: 2",
        );
        assert_eq!(turn.directive, Directive::FinalAnswer { text: "2".into() });
    }

    #[test]
    fn test_parse_multiple_actions_keeps_first() {
        let text = "Thought: both cities\nAction: weather_operator\nAction Input: weather in Paris\n\
                    Action: weather_operator\nAction Input: weather in Berlin";
        let turn = parse_directive(text);
        assert_eq!(turn.thought, "both cities");
        assert_eq!(
            turn.directive,
            Directive::Action {
                name: "weather_operator".into(),
                raw_input: "weather in Paris".into(),
            }
        );
        assert_eq!(turn.warning, Some(ParseWarning::MultipleActions { ignored: 1 }));
    }

    #[test]
    fn test_parse_input_stops_at_observation() {
        let turn = parse_directive(
            "Action: `math_operator`\nAction Input: what is 7*6\nObservation: 42 (hallucinated)",
        );
        assert_eq!(
            turn.directive,
            Directive::Action {
                name: "math_operator".into(),
                raw_input: "what is 7*6".into(),
            }
        );
    }

    #[test]
    fn test_parse_multiline_final_answer() {
        let turn = parse_directive("Thought: done\nFinal Answer: Paris is warmer.\nBerlin: 12°C");
        assert_eq!(
            turn.directive,
            Directive::FinalAnswer {
                text: "Paris is warmer.\nBerlin: 12°C".into()
            }
        );
    }

    #[test]
    fn test_parse_malformed_cases() {
        for text in [
            "I think the answer is 4.",
            "Action: calculate",
            "Final Answer:   ",
            "Action: \nAction Input: 2+2",
            "",
        ] {
            assert!(
                matches!(parse_directive(text).directive, Directive::Malformed { .. }),
                "expected Malformed for {text:?}"
            );
        }
    }

    #[test]
    fn test_parse_is_idempotent() {
        let corpus = [
            "Thought: add\nAction: calculate\nAction Input: {\"expression\": \"2+3*4\"}",
            "Action: calculate\nAction Input: 1+1\nAction: calculate\nAction Input: 2+2",
            "Action: calculate\nAction Input: 1+1\nFinal Answer: 2",
            "no markers at all",
            "",
            "Thought: 查询天气\nAction: get_current_weather\nAction Input: {\"location\": \"München\"}",
            "Final Answer: Ça fait 14 €",
        ];
        for text in corpus {
            let first = parse_directive(text);
            let second = parse_directive(text);
            assert_eq!(first, second, "parse differs for {text:?}");
            assert_eq!(parse_directive(text), first);
        }
    }

    #[test]
    fn test_marker_must_be_line_anchored() {
        let turn = parse_directive("The word Action: appears mid-line here.");
        assert!(matches!(turn.directive, Directive::Malformed { .. }));
    }
}
