//! 账号信息

use std::fmt;

use futures::future::join_all;

use crate::model::config::Config;
use crate::teneo::provider::probe_ip;

/// 账号信息
///
/// 启动时由 token 列表和代理列表按位置配对生成，之后只读；
/// `observed_ip` 仅在会话启动前由 IP 检测写入一次。
#[derive(Clone, PartialEq, Eq)]
pub struct Account {
    /// 在 token 列表中的位置（从 0 开始）
    pub index: usize,
    /// 访问令牌
    pub credential: String,
    /// 代理地址（可选）
    pub proxy: Option<String>,
    /// 通过代理观测到的出口 IP
    pub observed_ip: Option<String>,
}

impl Account {
    /// 创建新账号
    pub fn new(index: usize, credential: impl Into<String>, proxy: Option<String>) -> Self {
        Self {
            index,
            credential: credential.into(),
            proxy,
            observed_ip: None,
        }
    }

    /// 设置出口 IP
    pub fn with_observed_ip(mut self, ip: impl Into<String>) -> Self {
        self.observed_ip = Some(ip.into());
        self
    }

    /// 面向用户的账号编号（从 1 开始）
    pub fn number(&self) -> usize {
        self.index + 1
    }

    /// 日志标签：出口 IP，其次代理地址，直连为 `Local`
    pub fn label(&self) -> &str {
        self.observed_ip
            .as_deref()
            .or(self.proxy.as_deref())
            .unwrap_or("Local")
    }

    /// 账号级 tracing span，所有日志都带上账号编号和 IP
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!("account", id = self.number(), ip = %self.label())
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 不输出完整 token
        let masked = match self.credential.char_indices().nth(6) {
            Some((end, _)) => format!("{}***", &self.credential[..end]),
            None => "***".to_string(),
        };
        f.debug_struct("Account")
            .field("index", &self.index)
            .field("credential", &masked)
            .field("proxy", &self.proxy)
            .field("observed_ip", &self.observed_ip)
            .finish()
    }
}

/// 按位置配对 token 与代理；代理不足时多出的账号直连
pub fn pair_accounts(tokens: Vec<String>, proxies: &[String]) -> Vec<Account> {
    tokens
        .into_iter()
        .enumerate()
        .map(|(i, token)| Account::new(i, token, proxies.get(i).cloned()))
        .collect()
}

/// 并发检测所有带代理账号的出口 IP
///
/// 检测失败不影响账号启动，只记录警告
pub async fn probe_observed_ips(accounts: Vec<Account>, config: &Config) -> Vec<Account> {
    join_all(accounts.into_iter().map(|account| async move {
        let Some(proxy) = account.proxy.clone() else {
            return account;
        };
        match probe_ip(config, &proxy).await {
            Ok(ip) => {
                tracing::info!(account = account.number(), %ip, "代理出口 IP");
                account.with_observed_ip(ip)
            }
            Err(e) => {
                tracing::warn!(account = account.number(), proxy = %proxy, "代理 IP 检测失败: {}", e);
                account
            }
        }
    }))
    .await
}
