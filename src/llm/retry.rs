//! 模型调用的有界重试策略（指数退避，封顶 max_delay）

use std::time::Duration;

use crate::llm::LlmError;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// 首次调用之外的最大重试次数
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// 不重试（测试与一次性调用）
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// 第 attempt 次失败（从 0 计）之后应等待的时长；限流时优先使用服务端给出的 retry-after
    pub fn delay_for(&self, attempt: u32, err: &LlmError) -> Duration {
        if let LlmError::RateLimited {
            retry_after_ms: Some(ms),
        } = err
        {
            return Duration::from_millis(*ms).min(self.max_delay);
        }
        let base = self.initial_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_is_capped() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(3_000),
            multiplier: 2.0,
        };
        let err = LlmError::Timeout;
        assert_eq!(policy.delay_for(0, &err), Duration::from_millis(500));
        assert_eq!(policy.delay_for(1, &err), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(2, &err), Duration::from_millis(2_000));
        assert_eq!(policy.delay_for(3, &err), Duration::from_millis(3_000));
    }

    #[test]
    fn test_retry_after_is_honoured() {
        let policy = RetryPolicy::default();
        let err = LlmError::RateLimited {
            retry_after_ms: Some(1_500),
        };
        assert_eq!(policy.delay_for(0, &err), Duration::from_millis(1_500));
    }
}
