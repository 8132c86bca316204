//! ReAct Prompt 模板：系统提示词 + 工具说明 + 单动作规则 + 问题与 scratchpad

use crate::llm::Message;
use crate::react::Transcript;
use crate::tools::ToolSpec;

const REACT_TEMPLATE: &str = r#"TOOLS:
------

You have access to the following tools:

{tools}

To use a tool, you MUST use this EXACT format:

Question: the input question you must answer
Thought: you should always think about what to do
Action: the action to take, should be one of [{tool_names}]
Action Input: the input to the action
Observation: the result of the action
... (this Thought/Action/Action Input/Observation can repeat N times)
Thought: I now know the final answer
Final Answer: the final answer to the original input question

CRITICAL SINGLE-ACTION RULES:
- YOU CAN ONLY PERFORM ONE ACTION PER RESPONSE
- NEVER combine multiple Action/Action Input pairs in a single response
- After generating Action and Action Input, STOP and wait for the Observation
- Each response must contain EITHER one Action OR one Final Answer, NEVER both
- If you need multiple operations, use them one at a time across multiple responses

Begin!"#;

/// 某个 Agent 的 Prompt 渲染器
#[derive(Debug, Clone)]
pub struct ReactPrompt {
    system: String,
}

impl ReactPrompt {
    pub fn new(system: impl Into<String>) -> Self {
        Self {
            system: system.into(),
        }
    }

    pub fn system(&self) -> &str {
        &self.system
    }

    /// 工具说明段：`name(params): description`
    fn render_tools(tools: &[ToolSpec]) -> String {
        tools
            .iter()
            .map(|t| {
                let params: Vec<String> = t
                    .params
                    .iter()
                    .map(|p| {
                        if p.required {
                            format!("{}: {}", p.name, p.kind)
                        } else {
                            format!("{}?: {}", p.name, p.kind)
                        }
                    })
                    .collect();
                format!("{}({}): {}", t.name, params.join(", "), t.description)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// 渲染完整消息列表：system（角色提示 + 工具与协议）、user（问题 + scratchpad）
    pub fn render(&self, tools: &[ToolSpec], task: &str, transcript: &Transcript) -> Vec<Message> {
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        let protocol = REACT_TEMPLATE
            .replace("{tools}", &Self::render_tools(tools))
            .replace("{tool_names}", &names.join(", "));

        vec![
            Message::system(format!("{}\n\n{}", self.system.trim_end(), protocol)),
            Message::user(format!("Question: {}\nThought:{}", task, transcript.scratchpad())),
        ]
    }
}
