use clap::Parser;

use super::config::Config;

/// Teneo 多账号 WebSocket 保活客户端
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    pub config: Option<String>,

    /// token 列表文件路径
    #[arg(long)]
    pub tokens: Option<String>,

    /// 代理列表文件路径
    #[arg(long)]
    pub proxies: Option<String>,

    /// 是否使用代理（不指定时交互询问）
    #[arg(long)]
    pub use_proxy: Option<bool>,
}

impl Args {
    /// 命令行参数优先于配置文件和环境变量
    pub fn apply(&self, config: &mut Config) {
        if let Some(tokens) = &self.tokens {
            config.tokens_file = tokens.clone();
        }
        if let Some(proxies) = &self.proxies {
            config.proxies_file = proxies.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_args() {
        let args = Args::parse_from([
            "teneo-rs",
            "--tokens",
            "my-tokens.txt",
            "--use-proxy",
            "true",
        ]);
        assert_eq!(args.tokens.as_deref(), Some("my-tokens.txt"));
        assert_eq!(args.use_proxy, Some(true));
        assert!(args.proxies.is_none());
    }

    #[test]
    fn test_apply_overrides_paths() {
        let args = Args::parse_from(["teneo-rs", "--proxies", "p.txt"]);
        let mut config = Config::default();
        args.apply(&mut config);
        assert_eq!(config.proxies_file, "p.txt");
        assert_eq!(config.tokens_file, "tokens.txt");
        assert!(args.use_proxy.is_none());
    }
}
