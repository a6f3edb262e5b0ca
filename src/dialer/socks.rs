//! SOCKS5 客户端握手 (RFC 1928 / RFC 1929)

use std::net::IpAddr;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::error::{DialError, DialResult};
use super::ProxyEndpoint;

const SOCKS5_VERSION: u8 = 0x05;
const AUTH_METHOD_NONE: u8 = 0x00;
const AUTH_METHOD_PASSWORD: u8 = 0x02;
const AUTH_NO_ACCEPTABLE: u8 = 0xFF;
const PASSWORD_AUTH_VERSION: u8 = 0x01;
const CMD_CONNECT: u8 = 0x01;
const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

/// 在已连接到代理的流上完成 SOCKS5 CONNECT
pub(super) async fn handshake<S>(
    stream: &mut S,
    proxy: &ProxyEndpoint,
    host: &str,
    port: u16,
) -> DialResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    negotiate_auth(stream, proxy.credentials()).await?;
    send_connect(stream, host, port).await?;
    read_reply(stream).await
}

async fn negotiate_auth<S>(stream: &mut S, credentials: Option<(&str, &str)>) -> DialResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let greeting: &[u8] = if credentials.is_some() {
        &[SOCKS5_VERSION, 2, AUTH_METHOD_NONE, AUTH_METHOD_PASSWORD]
    } else {
        &[SOCKS5_VERSION, 1, AUTH_METHOD_NONE]
    };
    stream.write_all(greeting).await?;

    let mut reply = [0u8; 2];
    stream.read_exact(&mut reply).await?;
    if reply[0] != SOCKS5_VERSION {
        return Err(DialError::Socks(format!("无效的协议版本: {}", reply[0])));
    }

    match (reply[1], credentials) {
        (AUTH_METHOD_NONE, _) => Ok(()),
        (AUTH_METHOD_PASSWORD, Some((username, password))) => {
            authenticate(stream, username, password).await
        }
        (AUTH_NO_ACCEPTABLE, _) => Err(DialError::Socks("代理拒绝了所有认证方式".to_string())),
        (method, _) => Err(DialError::Socks(format!("不支持的认证方式: {:#04x}", method))),
    }
}

async fn authenticate<S>(stream: &mut S, username: &str, password: &str) -> DialResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (user, pass) = (username.as_bytes(), password.as_bytes());
    if user.len() > 255 || pass.len() > 255 {
        return Err(DialError::Socks("用户名或密码过长".to_string()));
    }

    let mut request = Vec::with_capacity(3 + user.len() + pass.len());
    request.push(PASSWORD_AUTH_VERSION);
    request.push(user.len() as u8);
    request.extend_from_slice(user);
    request.push(pass.len() as u8);
    request.extend_from_slice(pass);
    stream.write_all(&request).await?;

    let mut reply = [0u8; 2];
    stream.read_exact(&mut reply).await?;
    if reply[1] != 0x00 {
        return Err(DialError::Socks("用户名或密码错误".to_string()));
    }
    Ok(())
}

async fn send_connect<S>(stream: &mut S, host: &str, port: u16) -> DialResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut request = vec![SOCKS5_VERSION, CMD_CONNECT, 0x00];
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => {
            request.push(ATYP_IPV4);
            request.extend_from_slice(&ip.octets());
        }
        Ok(IpAddr::V6(ip)) => {
            request.push(ATYP_IPV6);
            request.extend_from_slice(&ip.octets());
        }
        Err(_) => {
            // 域名交给代理解析
            let name = host.as_bytes();
            if name.is_empty() || name.len() > 255 {
                return Err(DialError::Socks(format!("无效的目标主机: {}", host)));
            }
            request.push(ATYP_DOMAIN);
            request.push(name.len() as u8);
            request.extend_from_slice(name);
        }
    }
    request.extend_from_slice(&port.to_be_bytes());
    stream.write_all(&request).await?;
    Ok(())
}

async fn read_reply<S>(stream: &mut S) -> DialResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut head = [0u8; 4];
    stream.read_exact(&mut head).await?;
    if head[0] != SOCKS5_VERSION {
        return Err(DialError::Socks(format!("无效的协议版本: {}", head[0])));
    }
    if head[1] != 0x00 {
        return Err(DialError::Socks(reply_message(head[1]).to_string()));
    }

    // 读掉绑定地址和端口
    let remaining = match head[3] {
        ATYP_IPV4 => 4 + 2,
        ATYP_IPV6 => 16 + 2,
        ATYP_DOMAIN => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await?;
            len[0] as usize + 2
        }
        other => return Err(DialError::Socks(format!("未知的地址类型: {}", other))),
    };
    let mut bound = vec![0u8; remaining];
    stream.read_exact(&mut bound).await?;
    Ok(())
}

fn reply_message(code: u8) -> &'static str {
    match code {
        0x01 => "代理服务器内部错误",
        0x02 => "规则不允许该连接",
        0x03 => "网络不可达",
        0x04 => "主机不可达",
        0x05 => "连接被拒绝",
        0x06 => "TTL 过期",
        0x07 => "不支持的命令",
        0x08 => "不支持的地址类型",
        _ => "未知错误",
    }
}
