//! WebSocket 连接地址与握手请求

use http::header::{HeaderValue, HOST, ORIGIN};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use url::Url;

use crate::model::config::Config;
use crate::session::error::SessionError;

/// 拨号目标
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
}

/// 拼接连接地址：`<endpoint>/websocket?accessToken=..&version=..`
pub fn connect_url(config: &Config, credential: &str) -> String {
    format!(
        "{}/websocket?accessToken={}&version={}",
        config.ws_endpoint.trim_end_matches('/'),
        urlencoding::encode(credential),
        urlencoding::encode(&config.client_version)
    )
}

/// 从 `wsEndpoint` 解析出需要拨号的主机和端口
pub fn target(config: &Config) -> Result<Target, SessionError> {
    let url = Url::parse(&config.ws_endpoint)
        .map_err(|e| SessionError::InvalidEndpoint(format!("{}: {}", config.ws_endpoint, e)))?;

    let host = url
        .host_str()
        .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_string())
        .ok_or_else(|| SessionError::InvalidEndpoint(format!("{}: 缺少主机名", config.ws_endpoint)))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| SessionError::InvalidEndpoint(format!("{}: 缺少端口", config.ws_endpoint)))?;

    Ok(Target { host, port })
}

/// 构建握手请求，附带 Host 与 Origin 头
pub fn build_request(config: &Config, credential: &str) -> Result<Request, SessionError> {
    let url = connect_url(config, credential);
    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|e| SessionError::InvalidEndpoint(format!("{}: {}", config.ws_endpoint, e)))?;

    let headers = request.headers_mut();
    headers.insert(HOST, header_value(&config.ws_host)?);
    headers.insert(ORIGIN, header_value(&config.ws_origin)?);

    Ok(request)
}

fn header_value(value: &str) -> Result<HeaderValue, SessionError> {
    HeaderValue::from_str(value)
        .map_err(|e| SessionError::InvalidEndpoint(format!("无效的请求头 {:?}: {}", value, e)))
}
