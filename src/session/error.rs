//! 会话错误类型

use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

use crate::dialer::DialError;

/// 会话内的错误
///
/// 所有错误都只在所属会话内部处理（转为关闭 + 退避重连），不会传播到会话池
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("拨号失败: {0}")]
    Dial(#[from] DialError),

    #[error("WebSocket 握手失败: {0}")]
    Handshake(#[source] tungstenite::Error),

    #[error("连接超时 ({0:?})")]
    Timeout(Duration),

    #[error("帧解析失败: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("连接异常: {0}")]
    Transport(#[source] tungstenite::Error),

    #[error("连接地址无效: {0}")]
    InvalidEndpoint(String),
}

/// 错误分类，用于事件上报
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Dial,
    Handshake,
    Decode,
    Transport,
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Dial(_) | Self::InvalidEndpoint(_) => ErrorKind::Dial,
            Self::Handshake(_) | Self::Timeout(_) => ErrorKind::Handshake,
            Self::Decode(_) => ErrorKind::Decode,
            Self::Transport(_) => ErrorKind::Transport,
        }
    }
}
