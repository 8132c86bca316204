//! Transcript：一次运行内按顺序追加的 Step 列表
//!
//! 只追加、不修改；渲染为 ReAct scratchpad（Thought / Action / Action Input / Observation）供下一轮 Prompt 使用。

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::react::{Directive, ParseWarning};

/// 单轮记录：模型的 Directive 与随后的 Observation
#[derive(Debug, Clone, Serialize)]
pub struct Step {
    /// 从 1 开始
    pub index: usize,
    pub thought: String,
    pub directive: Directive,
    /// FinalAnswer 无 Observation
    pub observation: Option<String>,
    pub warning: Option<ParseWarning>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl Step {
    pub fn is_final(&self) -> bool {
        matches!(self.directive, Directive::FinalAnswer { .. })
    }

    /// 渲染为 scratchpad 片段
    fn render(&self) -> String {
        let mut out = String::new();
        // Malformed 的原文已包含 thought
        let is_malformed = matches!(self.directive, Directive::Malformed { .. });
        if !self.thought.is_empty() && !is_malformed {
            out.push_str(&format!(" {}\n", self.thought));
        } else {
            out.push('\n');
        }
        match &self.directive {
            Directive::Action { name, raw_input } => {
                out.push_str(&format!("Action: {name}\nAction Input: {raw_input}\n"));
            }
            Directive::FinalAnswer { text } => {
                out.push_str(&format!("Final Answer: {text}\n"));
            }
            Directive::Malformed { raw_text } => {
                let preview: String = raw_text.chars().take(500).collect();
                out.push_str(&format!("{preview}\n"));
            }
        }
        if let Some(obs) = &self.observation {
            out.push_str(&format!("Observation: {obs}\nThought:"));
        }
        out
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Transcript {
    steps: Vec<Step>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: Step) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn next_index(&self) -> usize {
        self.steps.len() + 1
    }

    /// 最近一条 Observation（迭代耗尽时用作兜底答案）
    pub fn last_observation(&self) -> Option<&str> {
        self.steps
            .iter()
            .rev()
            .find_map(|s| s.observation.as_deref())
    }

    /// 拼接为 `Thought:` 之后的 scratchpad
    pub fn scratchpad(&self) -> String {
        self.steps.iter().map(Step::render).collect()
    }
}
