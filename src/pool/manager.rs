//! 会话池
//!
//! 每个账号一个会话，所有会话并发启动、互不影响；
//! 退出时统一发出停止信号，并在限定时间内等待全部会话停止。

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::model::config::Config;
use crate::session::{SessionEvent, SessionHandle, SessionSnapshot};
use crate::teneo::provider::TeneoProvider;

use super::account::Account;

/// 事件广播容量
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// 关闭结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShutdownReport {
    /// 正常停止的会话数
    pub stopped: usize,
    /// 超时后被强制中止的会话数
    pub aborted: usize,
}

/// 会话池
pub struct SessionPool {
    sessions: BTreeMap<usize, SessionHandle>,
    events: broadcast::Sender<SessionEvent>,
    shutdown: CancellationToken,
    shutdown_timeout: Duration,
}

impl SessionPool {
    /// 为每个账号启动一个会话
    ///
    /// 所有会话并发运行；推荐奖励领取作为独立任务发出，不阻塞连接
    pub fn start(accounts: Vec<Account>, config: Arc<Config>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let shutdown = CancellationToken::new();
        let mut sessions = BTreeMap::new();

        for account in accounts {
            let account = Arc::new(account);
            tracing::info!(
                "正在为账号 {} 建立 WebSocket 连接 - 代理: {}",
                account.number(),
                account.proxy.as_deref().unwrap_or("None")
            );

            if config.claim_referrals {
                spawn_referral_claim(account.clone(), config.clone());
            }

            let handle = SessionHandle::spawn(
                account.clone(),
                config.clone(),
                events.clone(),
                shutdown.child_token(),
            );
            sessions.insert(account.index, handle);
        }

        Self {
            sessions,
            events,
            shutdown,
            shutdown_timeout: config.shutdown_timeout(),
        }
    }

    /// 订阅所有会话的事件
    #[allow(dead_code)]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// 指定账号的状态快照
    pub fn snapshot(&self, index: usize) -> Option<SessionSnapshot> {
        self.sessions.get(&index).map(SessionHandle::snapshot)
    }

    /// 所有会话的状态快照，按账号顺序
    pub fn snapshots(&self) -> Vec<(usize, SessionSnapshot)> {
        self.sessions
            .iter()
            .map(|(index, handle)| (*index, handle.snapshot()))
            .collect()
    }

    /// 订阅指定账号的状态变化
    #[allow(dead_code)]
    pub fn watch(&self, index: usize) -> Option<watch::Receiver<SessionSnapshot>> {
        self.sessions.get(&index).map(SessionHandle::watch)
    }

    /// 单独停止一个会话，其他会话不受影响
    #[allow(dead_code)]
    pub fn stop_session(&self, index: usize) -> bool {
        match self.sessions.get(&index) {
            Some(handle) => {
                handle.stop();
                true
            }
            None => false,
        }
    }

    /// 停止所有会话
    ///
    /// 等待全部会话进入 Stopped，超时后中止剩余任务。可重复调用。
    pub async fn shutdown(&mut self) -> ShutdownReport {
        self.shutdown.cancel();

        let mut tasks: Vec<_> = self
            .sessions
            .values_mut()
            .filter_map(|handle| handle.take_task())
            .collect();
        if tasks.is_empty() {
            return ShutdownReport::default();
        }

        let total = tasks.len();
        let finished =
            tokio::time::timeout(self.shutdown_timeout, join_all(tasks.iter_mut())).await;

        let report = match finished {
            Ok(_) => ShutdownReport {
                stopped: total,
                aborted: 0,
            },
            Err(_) => {
                let mut aborted = 0;
                for task in &tasks {
                    if !task.is_finished() {
                        task.abort();
                        aborted += 1;
                    }
                }
                tracing::warn!(
                    "{} 个会话未在 {:?} 内停止，已强制中止",
                    aborted,
                    self.shutdown_timeout
                );
                ShutdownReport {
                    stopped: total - aborted,
                    aborted,
                }
            }
        };

        tracing::info!(stopped = report.stopped, aborted = report.aborted, "所有会话已关闭");
        report
    }
}

impl Drop for SessionPool {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// 后台领取推荐奖励，失败直接丢弃
fn spawn_referral_claim(account: Arc<Account>, config: Arc<Config>) {
    let span = account.span();
    tokio::spawn(
        async move {
            let result = match TeneoProvider::new(&config, &account.credential, account.proxy.as_deref()) {
                Ok(provider) => provider.claim_all().await,
                Err(e) => Err(e),
            };
            match result {
                Ok(0) => tracing::debug!("没有可领取的推荐奖励"),
                Ok(claimed) => tracing::info!("已领取 {} 条推荐奖励", claimed),
                Err(e) => tracing::debug!("推荐奖励领取失败（已忽略）: {}", e),
            }
        }
        .instrument(span),
    );
}
