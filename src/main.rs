mod dialer;
mod http_client;
mod loader;
mod model;
mod pool;
mod session;
mod teneo;

use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tracing_subscriber::EnvFilter;

use model::arg::Args;
use model::config::Config;
use pool::{pair_accounts, probe_observed_ips, SessionPool};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    // 加载配置：配置文件 < 环境变量 < 命令行参数
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| Config::default_config_path().to_string());
    let mut config = Config::load(&config_path).map_err(|e| {
        tracing::error!("加载配置失败: {}", e);
        e
    })?;
    config.override_from_env();
    args.apply(&mut config);
    config.validate()?;

    let tokens = loader::load_tokens(&config.tokens_file)?;
    if tokens.is_empty() {
        tracing::warn!("未找到任何 token，请检查 {}", config.tokens_file);
        return Ok(());
    }
    tracing::info!("已加载 {} 个 token", tokens.len());

    let use_proxy = match args.use_proxy {
        Some(flag) => flag,
        None => ask_use_proxy().await?,
    };

    let proxies = if use_proxy {
        let proxies = loader::load_proxies(&config.proxies_file)?;
        if proxies.is_empty() {
            tracing::warn!("{} 中没有可用代理，所有账号直连", config.proxies_file);
        } else {
            tracing::info!("已加载 {} 个代理", proxies.len());
        }
        proxies
    } else {
        Vec::new()
    };

    let config = Arc::new(config);
    let accounts = probe_observed_ips(pair_accounts(tokens, &proxies), &config).await;
    let mut pool = SessionPool::start(accounts, config);
    tracing::info!("已启动 {} 个会话，按 Ctrl+C 退出", pool.len());

    wait_for_shutdown_signal().await;

    let report = pool.shutdown().await;
    for (index, snapshot) in pool.snapshots() {
        tracing::info!(
            account = index + 1,
            connections = snapshot.connections,
            points = snapshot.points_total.unwrap_or_default(),
            "会话统计"
        );
    }
    tracing::info!(
        "已退出，正常停止 {} 个会话，强制中止 {} 个",
        report.stopped,
        report.aborted
    );
    Ok(())
}

/// 交互询问是否使用代理
async fn ask_use_proxy() -> anyhow::Result<bool> {
    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(b"Do you want to use a proxy? (y/n): ")
        .await?;
    stdout.flush().await?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    Ok(parse_answer(&line))
}

/// 只有 y / yes 视为肯定，其余一律按否处理
fn parse_answer(input: &str) -> bool {
    matches!(input.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

async fn wait_for_shutdown_signal() {
    tokio::select! {
        _ = signal::ctrl_c() => {
            tracing::info!("收到 Ctrl+C，正在关闭所有会话...");
        }
        _ = terminate() => {
            tracing::info!("收到 SIGTERM，正在关闭所有会话...");
        }
    }
}

#[cfg(unix)]
async fn terminate() {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            tracing::warn!("注册 SIGTERM 处理器失败: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_answer() {
        assert!(parse_answer("y\n"));
        assert!(parse_answer("  Yes \r\n"));
        assert!(!parse_answer("n"));
        assert!(!parse_answer(""));
        assert!(!parse_answer("maybe"));
    }
}
