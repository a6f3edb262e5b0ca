//! 会话事件
//!
//! 生命周期中的关键节点都会广播一份事件，供上层或测试观察

use std::time::Duration;

use super::error::ErrorKind;

/// 连接关闭原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// 远端关闭
    Remote,
    /// 本地 I/O 或解析错误
    Error,
    /// 显式停止
    Stopped,
}

/// 会话事件，`account` 为账号编号（从 1 开始）
#[allow(dead_code)]
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Connected {
        account: usize,
    },
    StatusUpdate {
        account: usize,
        message: String,
        points_total: f64,
    },
    Disconnected {
        account: usize,
        reason: CloseReason,
    },
    Reconnecting {
        account: usize,
        attempt: u32,
        delay: Duration,
    },
    /// 被吞掉的错误，只上报不传播
    Error {
        account: usize,
        kind: ErrorKind,
        detail: String,
    },
    Stopped {
        account: usize,
    },
}
