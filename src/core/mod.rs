//! 核心层：错误类型、恢复引擎、请求级会话上下文

pub mod error;
pub mod recovery;
pub mod session;

pub use error::AgentError;
pub use recovery::{LoopFault, RecoveryAction, RecoveryEngine};
pub use session::{Interruption, SessionContext};
