//! 会话状态

use chrono::{DateTime, Utc};

/// 会话生命周期状态
///
/// `Idle → Connecting → Open → Closed → Backoff → Connecting …`，`Stopped` 为终态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// 尚未启动
    Idle,
    /// 拨号 / 握手中
    Connecting,
    /// 已连接
    Open,
    /// 连接已关闭
    Closed,
    /// 等待重连
    Backoff,
    /// 已停止（仅显式停止）
    Stopped,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Backoff => "backoff",
            Self::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 会话状态快照，通过 watch 通道对外发布
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub state: SessionState,
    /// 当前重试次数，成功连接后归零
    pub retry_attempt: u32,
    /// 成功建立连接的总次数
    pub connections: u64,
    /// 最近一次成功连接的时间
    pub connected_at: Option<DateTime<Utc>>,
    /// 最近一次收到的累计积分
    pub points_total: Option<f64>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            state: SessionState::Idle,
            retry_attempt: 0,
            connections: 0,
            connected_at: None,
            points_total: None,
        }
    }
}
