//! HTTP CONNECT 隧道握手

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::error::{DialError, DialResult};
use super::{authority, ProxyEndpoint};

/// 代理响应头的最大长度
const MAX_RESPONSE_HEAD: usize = 8 * 1024;

/// 发送 CONNECT 请求并等待代理返回 2xx
///
/// 逐字节读取响应头，避免把隧道内的后续数据读进缓冲区
pub(super) async fn handshake<S>(
    stream: &mut S,
    proxy: &ProxyEndpoint,
    host: &str,
    port: u16,
) -> DialResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream
        .write_all(build_request(proxy, host, port).as_bytes())
        .await?;

    let head = read_response_head(stream).await?;
    let status_line = head.lines().next().unwrap_or_default();
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| DialError::HttpConnect(format!("无效的响应: {}", status_line)))?;

    if !(200..300).contains(&status) {
        return Err(DialError::HttpConnect(format!("代理返回 {}", status_line)));
    }
    Ok(())
}

fn build_request(proxy: &ProxyEndpoint, host: &str, port: u16) -> String {
    let target = authority(host, port);
    let mut request = format!("CONNECT {target} HTTP/1.1\r\nHost: {target}\r\n");
    if let Some((username, password)) = proxy.credentials() {
        let token = STANDARD.encode(format!("{}:{}", username, password));
        request.push_str(&format!("Proxy-Authorization: Basic {}\r\n", token));
    }
    request.push_str("Proxy-Connection: Keep-Alive\r\n\r\n");
    request
}

async fn read_response_head<S>(stream: &mut S) -> DialResult<String>
where
    S: AsyncRead + Unpin,
{
    let mut head = Vec::with_capacity(128);
    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_RESPONSE_HEAD {
            return Err(DialError::HttpConnect("响应头过长".to_string()));
        }
        let byte = stream.read_u8().await?;
        head.push(byte);
    }
    Ok(String::from_utf8_lossy(&head).into_owned())
}
