//! ReAct 层：Action Parser、Input Normalizer、Transcript、Prompt 模板与主循环

pub mod input;
pub mod loop_;
pub mod parser;
pub mod prompt;
pub mod transcript;

pub use input::{
    expected_format, normalize_input, ArgValue, InputError, ParamKind, ParamSpec, ToolArgs,
};
pub use loop_::{AgentResult, LoopConfig, LoopDriver, RunFailure, RunStatus};
pub use parser::{parse_directive, Directive, ParseWarning, ParsedTurn};
pub use prompt::ReactPrompt;
pub use transcript::{Step, Transcript};
