//! HTTP Client 构建模块
//!
//! 提供统一的 HTTP Client 构建功能，支持按账号配置代理

use reqwest::{Client, Proxy};
use std::time::Duration;

/// 构建 HTTP Client
///
/// # Arguments
/// * `proxy` - 可选的代理地址，支持 http/https/socks5，认证信息直接写在 URI 中
/// * `timeout_secs` - 超时时间（秒）
/// * `user_agent` - User-Agent
///
/// # Returns
/// 配置好的 reqwest::Client
pub fn build_client(
    proxy: Option<&str>,
    timeout_secs: u64,
    user_agent: &str,
) -> anyhow::Result<Client> {
    let mut builder = Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(user_agent);

    if let Some(url) = proxy {
        builder = builder.proxy(Proxy::all(url)?);
        tracing::debug!("HTTP Client 使用代理: {}", url);
    }

    Ok(builder.build()?)
}
