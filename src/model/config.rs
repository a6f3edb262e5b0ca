use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// WebSocket 服务地址（不含路径）
    #[serde(default = "default_ws_endpoint")]
    pub ws_endpoint: String,

    /// 握手时发送的 Host 头
    #[serde(default = "default_ws_host")]
    pub ws_host: String,

    /// 握手时发送的 Origin 头（浏览器扩展来源）
    #[serde(default = "default_ws_origin")]
    pub ws_origin: String,

    /// 协议版本，拼接在连接地址的 version 参数中
    #[serde(default = "default_client_version")]
    pub client_version: String,

    /// REST API 基础地址（推荐奖励接口）
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// 仪表盘来源，用于 REST 请求的 Origin / Referer
    #[serde(default = "default_dashboard_origin")]
    pub dashboard_origin: String,

    /// REST 请求使用的 x-api-key（可选）
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// 心跳间隔（毫秒）
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,

    /// 重连退避基数（毫秒）
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// 重连退避上限（毫秒）
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// 拨号 + 握手超时（秒）
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// 退出时等待所有会话停止的上限（秒）
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,

    /// 出口 IP 检测地址
    #[serde(default = "default_ip_check_url")]
    pub ip_check_url: String,

    /// 连接前是否领取推荐奖励
    #[serde(default = "default_claim_referrals")]
    pub claim_referrals: bool,

    /// token 列表文件
    #[serde(default = "default_tokens_file")]
    pub tokens_file: String,

    /// 代理列表文件
    #[serde(default = "default_proxies_file")]
    pub proxies_file: String,
}

impl Config {
    /// 从环境变量覆盖配置
    pub fn override_from_env(&mut self) {
        if let Ok(endpoint) = env::var("WS_ENDPOINT") {
            self.ws_endpoint = endpoint;
        }
        if let Ok(host) = env::var("WS_HOST") {
            self.ws_host = host;
        }
        if let Ok(origin) = env::var("WS_ORIGIN") {
            self.ws_origin = origin;
        }
        if let Ok(version) = env::var("CLIENT_VERSION") {
            self.client_version = version;
        }
        if let Ok(url) = env::var("API_BASE_URL") {
            self.api_base_url = url;
        }
        if let Ok(api_key) = env::var("X_API_KEY") {
            self.api_key = Some(api_key);
        }
        if let Ok(user_agent) = env::var("USER_AGENT") {
            self.user_agent = user_agent;
        }
        if let Some(ms) = env_u64("PING_INTERVAL_MS") {
            self.ping_interval_ms = ms;
        }
        if let Some(ms) = env_u64("BACKOFF_BASE_MS") {
            self.backoff_base_ms = ms;
        }
        if let Some(ms) = env_u64("BACKOFF_MAX_MS") {
            self.backoff_max_ms = ms;
        }
        if let Some(secs) = env_u64("SHUTDOWN_TIMEOUT_SECS") {
            self.shutdown_timeout_secs = secs;
        }
        if let Ok(url) = env::var("IP_CHECK_URL") {
            self.ip_check_url = url;
        }
        if let Ok(path) = env::var("TOKENS_FILE") {
            self.tokens_file = path;
        }
        if let Ok(path) = env::var("PROXIES_FILE") {
            self.proxies_file = path;
        }
    }

    /// 校验数值配置，零间隔会让心跳定时器 panic 或让重连退化为忙等
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.ping_interval_ms == 0 {
            anyhow::bail!("pingIntervalMs 必须大于 0");
        }
        if self.backoff_base_ms == 0 {
            anyhow::bail!("backoffBaseMs 必须大于 0");
        }
        if self.backoff_max_ms < self.backoff_base_ms {
            anyhow::bail!(
                "backoffMaxMs ({}) 不能小于 backoffBaseMs ({})",
                self.backoff_max_ms,
                self.backoff_base_ms
            );
        }
        if self.connect_timeout_secs == 0 {
            anyhow::bail!("connectTimeoutSecs 必须大于 0");
        }
        Ok(())
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

fn env_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

fn default_ws_endpoint() -> String {
    "wss://secure.ws.teneo.pro".to_string()
}

fn default_ws_host() -> String {
    "secure.ws.teneo.pro".to_string()
}

fn default_ws_origin() -> String {
    "chrome-extension://emcclcoaglgcpoognfiggmhnhgabppkm".to_string()
}

fn default_client_version() -> String {
    "v0.2".to_string()
}

fn default_api_base_url() -> String {
    "https://api.teneo.pro".to_string()
}

fn default_dashboard_origin() -> String {
    "https://dashboard.teneo.pro".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/115.0.0.0 Safari/537.36".to_string()
}

fn default_ping_interval_ms() -> u64 {
    10_000
}

fn default_backoff_base_ms() -> u64 {
    1_000
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_shutdown_timeout_secs() -> u64 {
    5
}

fn default_ip_check_url() -> String {
    "https://api.ipify.org?format=json".to_string()
}

fn default_claim_referrals() -> bool {
    true
}

fn default_tokens_file() -> String {
    "tokens.txt".to_string()
}

fn default_proxies_file() -> String {
    "proxies.txt".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ws_endpoint: default_ws_endpoint(),
            ws_host: default_ws_host(),
            ws_origin: default_ws_origin(),
            client_version: default_client_version(),
            api_base_url: default_api_base_url(),
            dashboard_origin: default_dashboard_origin(),
            api_key: None,
            user_agent: default_user_agent(),
            ping_interval_ms: default_ping_interval_ms(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            connect_timeout_secs: default_connect_timeout_secs(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            ip_check_url: default_ip_check_url(),
            claim_referrals: default_claim_referrals(),
            tokens_file: default_tokens_file(),
            proxies_file: default_proxies_file(),
        }
    }
}

impl Config {
    /// 获取默认配置文件路径
    pub fn default_config_path() -> &'static str {
        "config.json"
    }

    /// 从文件加载配置
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            // 配置文件不存在，返回默认配置
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }
}
