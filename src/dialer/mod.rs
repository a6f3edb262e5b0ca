//! 传输层拨号模块
//!
//! 直连远端主机，或通过 HTTP CONNECT / SOCKS5 代理建立隧道。
//! 代理协议由 URI scheme 决定：`socks*` 走 SOCKS5，`http` 走 HTTP CONNECT。

pub mod error;
mod http_connect;
mod socks;

pub use error::{DialError, DialResult};

use tokio::net::TcpStream;
use url::Url;

/// 代理类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyKind {
    Http,
    Socks5,
}

/// 解析后的代理地址
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyEndpoint {
    pub kind: ProxyKind,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ProxyEndpoint {
    /// 从 URI 解析代理地址
    ///
    /// 支持 `http://`, `socks://`, `socks5://`, `socks5h://`，可带 `user:pass@`
    pub fn parse(uri: &str) -> DialResult<Self> {
        let url = Url::parse(uri.trim())
            .map_err(|e| DialError::InvalidProxy(format!("{}: {}", uri, e)))?;

        let kind = match url.scheme() {
            "http" => ProxyKind::Http,
            "socks" | "socks5" | "socks5h" => ProxyKind::Socks5,
            other => return Err(DialError::UnsupportedScheme(other.to_string())),
        };

        let host = url
            .host_str()
            .map(|h| h.trim_start_matches('[').trim_end_matches(']'))
            .filter(|h| !h.is_empty())
            .ok_or_else(|| DialError::InvalidProxy(format!("{}: 缺少主机名", uri)))?
            .to_string();

        let port = url.port().unwrap_or(match kind {
            ProxyKind::Http => 80,
            ProxyKind::Socks5 => 1080,
        });

        let username = Some(url.username())
            .filter(|u| !u.is_empty())
            .map(percent_decode);
        let password = url.password().map(percent_decode);

        Ok(Self {
            kind,
            host,
            port,
            username,
            password,
        })
    }

    /// 认证信息（用户名和密码同时存在时）
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => Some((u.as_str(), p.as_str())),
            (Some(u), None) => Some((u.as_str(), "")),
            _ => None,
        }
    }
}

fn percent_decode(s: &str) -> String {
    urlencoding::decode(s)
        .map(|c| c.into_owned())
        .unwrap_or_else(|_| s.to_string())
}

/// `host:port`，IPv6 地址加方括号
pub(crate) fn authority(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// 代理拨号器
#[derive(Debug, Clone, Copy, Default)]
pub struct ProxyDialer;

impl ProxyDialer {
    pub fn new() -> Self {
        Self
    }

    /// 建立到 `host:port` 的 TCP 连接
    ///
    /// `proxy` 为空时直连；否则先连接代理，再完成对应协议的隧道握手。
    /// 返回的流可直接用于 TLS / WebSocket 握手。
    pub async fn dial(&self, proxy: Option<&str>, host: &str, port: u16) -> DialResult<TcpStream> {
        let endpoint = proxy.map(ProxyEndpoint::parse).transpose()?;

        match endpoint {
            None => connect_tcp(host, port).await,
            Some(endpoint) => {
                let mut stream = connect_tcp(&endpoint.host, endpoint.port).await?;
                match endpoint.kind {
                    ProxyKind::Socks5 => {
                        socks::handshake(&mut stream, &endpoint, host, port).await?
                    }
                    ProxyKind::Http => {
                        http_connect::handshake(&mut stream, &endpoint, host, port).await?
                    }
                }
                tracing::debug!(
                    proxy = %authority(&endpoint.host, endpoint.port),
                    target = %authority(host, port),
                    "代理隧道已建立"
                );
                Ok(stream)
            }
        }
    }
}

async fn connect_tcp(host: &str, port: u16) -> DialResult<TcpStream> {
    let stream = TcpStream::connect((host, port))
        .await
        .map_err(|source| DialError::Connect {
            addr: authority(host, port),
            source,
        })?;
    stream.set_nodelay(true)?;
    Ok(stream)
}
