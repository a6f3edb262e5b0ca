//! 拨号错误类型

use std::io;
use thiserror::Error;

/// 建立传输连接时的错误
///
/// 拨号器本身不做重试，重试由调用方（会话生命周期）负责
#[derive(Debug, Error)]
pub enum DialError {
    #[error("代理地址无效: {0}")]
    InvalidProxy(String),

    #[error("不支持的代理协议: {0}")]
    UnsupportedScheme(String),

    #[error("连接 {addr} 失败: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("SOCKS5 握手失败: {0}")]
    Socks(String),

    #[error("HTTP CONNECT 隧道建立失败: {0}")]
    HttpConnect(String),

    #[error("代理通信错误: {0}")]
    Io(#[from] io::Error),
}

pub type DialResult<T> = Result<T, DialError>;
