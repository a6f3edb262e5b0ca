//! Teneo REST API Provider
//!
//! 负责连接前的一次性调用：推荐奖励领取、代理出口 IP 检测。
//! 两者都按账号走各自的代理。

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, ORIGIN, REFERER};
use reqwest::Client;
use serde::Deserialize;

use crate::http_client::build_client;
use crate::model::config::Config;

use super::model::referral::{ClaimRequest, ReferralListResponse};

/// REST 请求超时（秒）
const API_TIMEOUT_SECS: u64 = 30;

/// IP 检测超时（秒）
const IP_CHECK_TIMEOUT_SECS: u64 = 10;

/// 单个账号的 REST 客户端
pub struct TeneoProvider {
    client: Client,
    base_url: String,
    headers: HeaderMap,
}

impl TeneoProvider {
    /// 创建 Provider，`proxy` 为该账号的代理地址
    pub fn new(config: &Config, token: &str, proxy: Option<&str>) -> anyhow::Result<Self> {
        let client = build_client(proxy, API_TIMEOUT_SECS, &config.user_agent)?;
        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            headers: Self::build_headers(token, config)?,
        })
    }

    /// 构建请求头
    fn build_headers(token: &str, config: &Config) -> anyhow::Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(ORIGIN, HeaderValue::from_str(&config.dashboard_origin)?);
        headers.insert(
            REFERER,
            HeaderValue::from_str(&format!(
                "{}/",
                config.dashboard_origin.trim_end_matches('/')
            ))?,
        );
        if let Some(api_key) = &config.api_key {
            headers.insert("x-api-key", HeaderValue::from_str(api_key)?);
        }

        Ok(headers)
    }

    /// 获取推荐列表（第一页）
    pub async fn referrals(&self) -> anyhow::Result<ReferralListResponse> {
        let url = format!("{}/api/users/referrals?page=1&limit=25", self.base_url);
        let response = self
            .client
            .get(&url)
            .headers(self.headers.clone())
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("获取推荐列表失败: {}", response.status());
        }
        Ok(response.json().await?)
    }

    /// 领取单条推荐奖励
    pub async fn claim(&self, referral_id: &serde_json::Value) -> anyhow::Result<()> {
        let url = format!("{}/api/users/referrals/claim", self.base_url);
        let response = self
            .client
            .post(&url)
            .headers(self.headers.clone())
            .json(&ClaimRequest {
                referral_id,
                all: false,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("领取推荐奖励失败: {}", response.status());
        }
        Ok(())
    }

    /// 领取所有可领取的推荐奖励，返回成功数量
    ///
    /// 单条领取失败不影响其余记录
    pub async fn claim_all(&self) -> anyhow::Result<usize> {
        let list = self.referrals().await?;
        let mut claimed = 0;
        for referral in list.claimable() {
            match self.claim(&referral.id).await {
                Ok(()) => claimed += 1,
                Err(e) => tracing::debug!(id = %referral.id, "推荐奖励领取失败: {}", e),
            }
        }
        Ok(claimed)
    }
}

#[derive(Debug, Deserialize)]
struct IpResponse {
    ip: String,
}

/// 通过代理请求 IP 检测接口，返回出口 IP
pub async fn probe_ip(config: &Config, proxy: &str) -> anyhow::Result<String> {
    let client = build_client(Some(proxy), IP_CHECK_TIMEOUT_SECS, &config.user_agent)?;
    let response = client.get(&config.ip_check_url).send().await?;

    if !response.status().is_success() {
        anyhow::bail!("IP 检测失败: {}", response.status());
    }
    let body: IpResponse = response.json().await?;
    Ok(body.ip)
}
