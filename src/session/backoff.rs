//! 指数退避

use std::time::Duration;

use crate::model::config::Config;

/// 重连延迟：`min(base × 2^attempt, max)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base_ms: u64,
    max_ms: u64,
}

impl Backoff {
    pub fn new(base_ms: u64, max_ms: u64) -> Self {
        Self { base_ms, max_ms }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.backoff_base_ms, config.backoff_max_ms)
    }

    /// 第 `attempt` 次重试的等待时间
    ///
    /// 任意 attempt 都不会溢出，超出范围时饱和到上限
    pub fn delay(&self, attempt: u32) -> Duration {
        let ms = 2u64
            .checked_pow(attempt)
            .map_or(u64::MAX, |factor| self.base_ms.saturating_mul(factor))
            .min(self.max_ms);
        Duration::from_millis(ms)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(1_000, 30_000)
    }
}
