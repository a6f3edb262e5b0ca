//! 单个会话的连接生命周期
//!
//! 每个会话一个 tokio 任务：拨号、握手、处理入站帧、转发心跳、退避重连都在
//! 同一个任务里顺序执行，同一会话的状态切换不会并发发生。
//! 停止信号通过 `CancellationToken` 传入，任意等待点都能立即响应。

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::dialer::ProxyDialer;
use crate::model::config::Config;
use crate::pool::Account;
use crate::teneo::endpoint;
use crate::teneo::model::frames::StatusFrame;

use super::backoff::Backoff;
use super::error::SessionError;
use super::event::{CloseReason, SessionEvent};
use super::keepalive::KeepAliveScheduler;
use super::state::{SessionSnapshot, SessionState};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// 出站通道容量
const OUTBOUND_CAPACITY: usize = 16;

/// 停止时发送关闭帧的等待上限
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// 连接生命周期管理器
pub struct ConnectionLifecycleManager {
    account: Arc<Account>,
    config: Arc<Config>,
    dialer: ProxyDialer,
    backoff: Backoff,
    retry_attempt: u32,
    keepalive: KeepAliveScheduler,
    state_tx: watch::Sender<SessionSnapshot>,
    events: broadcast::Sender<SessionEvent>,
    cancel: CancellationToken,
}

impl ConnectionLifecycleManager {
    pub fn new(
        account: Arc<Account>,
        config: Arc<Config>,
        events: broadcast::Sender<SessionEvent>,
        cancel: CancellationToken,
    ) -> (Self, watch::Receiver<SessionSnapshot>) {
        let (state_tx, state_rx) = watch::channel(SessionSnapshot::default());
        let manager = Self {
            backoff: Backoff::from_config(&config),
            keepalive: KeepAliveScheduler::new(config.ping_interval()),
            dialer: ProxyDialer::new(),
            retry_attempt: 0,
            account,
            config,
            state_tx,
            events,
            cancel,
        };
        (manager, state_rx)
    }

    /// 运行状态机，直到收到停止信号
    pub async fn run(mut self) {
        loop {
            self.transition(SessionState::Connecting);

            let connected = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                result = self.connect() => result,
            };

            match connected {
                Ok(ws) => {
                    self.on_open();
                    let reason = self.drive(ws).await;
                    self.keepalive.stop();
                    self.on_closed(reason);
                    if reason == CloseReason::Stopped {
                        break;
                    }
                }
                Err(e) => {
                    self.report_error(&e);
                    self.transition(SessionState::Closed);
                }
            }

            if !self.wait_backoff().await {
                break;
            }
        }

        self.keepalive.stop();
        self.transition(SessionState::Stopped);
        tracing::info!("会话已停止");
        self.emit(SessionEvent::Stopped {
            account: self.account.number(),
        });
    }

    /// 拨号并完成 WebSocket 握手
    async fn connect(&self) -> Result<WsStream, SessionError> {
        // rustls 0.23 需要进程级 CryptoProvider，已安装时忽略
        let _ = rustls::crypto::ring::default_provider().install_default();

        let timeout = self.config.connect_timeout();
        tokio::time::timeout(timeout, async {
            let target = endpoint::target(&self.config)?;
            let request = endpoint::build_request(&self.config, &self.account.credential)?;
            let stream = self
                .dialer
                .dial(self.account.proxy.as_deref(), &target.host, target.port)
                .await?;
            let (ws, _response) =
                tokio_tungstenite::client_async_tls_with_config(request, stream, None, None)
                    .await
                    .map_err(SessionError::Handshake)?;
            Ok::<_, SessionError>(ws)
        })
        .await
        .map_err(|_| SessionError::Timeout(timeout))?
    }

    /// 连接建立后的收发循环，返回关闭原因
    async fn drive(&mut self, ws: WsStream) -> CloseReason {
        let (mut sink, mut stream) = ws.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        self.keepalive.start(outbound_tx);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    // 尽力发送关闭帧，不等待对端确认
                    let _ = tokio::time::timeout(CLOSE_TIMEOUT, sink.send(Message::Close(None))).await;
                    return CloseReason::Stopped;
                }
                Some(frame) = outbound_rx.recv() => {
                    if let Err(e) = sink.send(frame).await {
                        self.report_error(&SessionError::Transport(e));
                        return CloseReason::Error;
                    }
                }
                inbound = stream.next() => match inbound {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = self.on_status(StatusFrame::decode(&text)) {
                            self.report_error(&e);
                            return CloseReason::Error;
                        }
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        if let Err(e) = self.on_status(StatusFrame::decode_bytes(&bytes)) {
                            self.report_error(&e);
                            return CloseReason::Error;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return CloseReason::Remote,
                    // Ping / Pong 由协议层处理
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        self.report_error(&SessionError::Transport(e));
                        return CloseReason::Error;
                    }
                },
            }
        }
    }

    fn on_open(&mut self) {
        self.retry_attempt = 0;
        self.state_tx.send_modify(|s| {
            s.state = SessionState::Open;
            s.retry_attempt = 0;
            s.connections += 1;
            s.connected_at = Some(Utc::now());
        });
        tracing::info!("WebSocket 已连接");
        self.emit(SessionEvent::Connected {
            account: self.account.number(),
        });
    }

    fn on_status(
        &self,
        decoded: Result<StatusFrame, serde_json::Error>,
    ) -> Result<(), SessionError> {
        let frame = decoded?;
        tracing::info!("Message: {} | Points: {}", frame.message, frame.points_total);
        self.state_tx
            .send_modify(|s| s.points_total = Some(frame.points_total));
        self.emit(SessionEvent::StatusUpdate {
            account: self.account.number(),
            message: frame.message,
            points_total: frame.points_total,
        });
        Ok(())
    }

    fn on_closed(&self, reason: CloseReason) {
        self.transition(SessionState::Closed);
        if reason != CloseReason::Stopped {
            tracing::warn!(?reason, "WebSocket 连接已断开");
        }
        self.emit(SessionEvent::Disconnected {
            account: self.account.number(),
            reason,
        });
    }

    /// 退避等待；返回 false 表示等待期间收到停止信号
    async fn wait_backoff(&mut self) -> bool {
        let attempt = self.retry_attempt;
        let delay = self.backoff.delay(attempt);
        self.retry_attempt = self.retry_attempt.saturating_add(1);

        let retry_attempt = self.retry_attempt;
        self.state_tx.send_modify(|s| {
            s.state = SessionState::Backoff;
            s.retry_attempt = retry_attempt;
        });
        tracing::info!("{} 秒后重连...", delay.as_secs_f64());
        self.emit(SessionEvent::Reconnecting {
            account: self.account.number(),
            attempt,
            delay,
        });

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    fn transition(&self, state: SessionState) {
        self.state_tx.send_modify(|s| s.state = state);
        tracing::trace!(%state, "状态切换");
    }

    /// 错误只记录和广播，不向外传播
    fn report_error(&self, error: &SessionError) {
        tracing::warn!(kind = ?error.kind(), "{}", error);
        self.emit(SessionEvent::Error {
            account: self.account.number(),
            kind: error.kind(),
            detail: error.to_string(),
        });
    }

    fn emit(&self, event: SessionEvent) {
        // 没有订阅者时忽略
        let _ = self.events.send(event);
    }
}

/// 运行中会话的句柄
pub struct SessionHandle {
    account: Arc<Account>,
    state: watch::Receiver<SessionSnapshot>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    /// 创建生命周期管理器并在独立任务中启动
    pub fn spawn(
        account: Arc<Account>,
        config: Arc<Config>,
        events: broadcast::Sender<SessionEvent>,
        cancel: CancellationToken,
    ) -> Self {
        let (manager, state) =
            ConnectionLifecycleManager::new(account.clone(), config, events, cancel.clone());
        let span = account.span();
        let task = tokio::spawn(manager.run().instrument(span));

        Self {
            account,
            state,
            cancel,
            task: Some(task),
        }
    }

    /// 当前状态快照
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    /// 订阅状态变化
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.clone()
    }

    /// 请求停止，可重复调用
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    #[allow(dead_code)]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }

    pub(crate) fn take_task(&mut self) -> Option<JoinHandle<()>> {
        self.task.take()
    }

    /// 停止并等待任务退出
    #[allow(dead_code)]
    pub async fn shutdown(&mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(account = self.account.number(), "会话任务异常退出: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::error::ErrorKind;
    use crate::session::testing::{
        expect_event, test_config, wait_for, TestServer, WAIT_TIMEOUT,
    };

    fn spawn_session(
        server_config: Config,
        proxy: Option<String>,
    ) -> (SessionHandle, broadcast::Receiver<SessionEvent>) {
        let (events, rx) = broadcast::channel(256);
        let account = Arc::new(Account::new(0, "token-0", proxy));
        let handle = SessionHandle::spawn(
            account,
            Arc::new(server_config),
            events,
            CancellationToken::new(),
        );
        (handle, rx)
    }

    #[tokio::test]
    async fn test_connect_and_status_update() {
        let mut server = TestServer::start().await;
        let (mut handle, mut events) = spawn_session(test_config(server.addr), None);

        let mut conn = server.accept().await;
        assert_eq!(conn.query, "accessToken=token-0&version=v0.2");
        expect_event(&mut events, |e| matches!(e, SessionEvent::Connected { account: 1 })).await;

        conn.send_text(r#"{"message":"Pulse from server","pointsTotal":99}"#)
            .await;
        let update = expect_event(&mut events, |e| {
            matches!(e, SessionEvent::StatusUpdate { .. })
        })
        .await;
        assert_eq!(
            update,
            SessionEvent::StatusUpdate {
                account: 1,
                message: "Pulse from server".to_string(),
                points_total: 99.0,
            }
        );

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.state, SessionState::Open);
        assert_eq!(snapshot.retry_attempt, 0);
        assert_eq!(snapshot.points_total, Some(99.0));

        handle.shutdown().await;
        assert_eq!(handle.snapshot().state, SessionState::Stopped);
    }

    #[tokio::test]
    async fn test_keepalive_sent_while_open() {
        let mut server = TestServer::start().await;
        let (mut handle, _events) = spawn_session(test_config(server.addr), None);

        let mut conn = server.accept().await;
        let text = conn.next_text().await;
        assert_eq!(text, r#"{"type":"PING"}"#);
        let text = conn.next_text().await;
        assert_eq!(text, r#"{"type":"PING"}"#);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_reconnect_after_remote_close_resets_retry() {
        let mut server = TestServer::start().await;
        let (mut handle, mut events) = spawn_session(test_config(server.addr), None);

        let mut first = server.accept().await;
        first.close().await;

        expect_event(&mut events, |e| {
            matches!(
                e,
                SessionEvent::Disconnected {
                    reason: CloseReason::Remote,
                    ..
                }
            )
        })
        .await;
        let reconnecting = expect_event(&mut events, |e| {
            matches!(e, SessionEvent::Reconnecting { .. })
        })
        .await;
        assert_eq!(
            reconnecting,
            SessionEvent::Reconnecting {
                account: 1,
                attempt: 0,
                delay: Duration::from_millis(20),
            }
        );

        let _second = server.accept().await;
        let mut state = handle.watch();
        wait_for(&mut state, |s| s.state == SessionState::Open && s.connections == 2).await;
        assert_eq!(handle.snapshot().retry_attempt, 0);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_decode_failure_is_not_fatal() {
        let mut server = TestServer::start().await;
        let (mut handle, mut events) = spawn_session(test_config(server.addr), None);

        let mut first = server.accept().await;
        first.send_text("definitely not json").await;

        let error = expect_event(&mut events, |e| matches!(e, SessionEvent::Error { .. })).await;
        assert!(matches!(
            error,
            SessionEvent::Error {
                kind: ErrorKind::Decode,
                ..
            }
        ));

        // 解析失败后重新建立连接
        let _second = server.accept().await;
        expect_event(&mut events, |e| matches!(e, SessionEvent::Connected { .. })).await;

        handle.shutdown().await;
        assert_eq!(handle.snapshot().state, SessionState::Stopped);
    }

    #[tokio::test]
    async fn test_tls_handshake_failure_routes_to_backoff() {
        let server = TestServer::start().await;
        let mut config = test_config(server.addr);
        // 明文服务端上发起 TLS 握手
        config.ws_endpoint = format!("wss://{}", server.addr);
        config.connect_timeout_secs = 2;
        let (mut handle, mut events) = spawn_session(config, None);

        let error = expect_event(&mut events, |e| matches!(e, SessionEvent::Error { .. })).await;
        assert!(matches!(
            error,
            SessionEvent::Error {
                kind: ErrorKind::Handshake,
                ..
            }
        ));
        expect_event(&mut events, |e| matches!(e, SessionEvent::Reconnecting { .. })).await;

        let mut state = handle.watch();
        wait_for(&mut state, |s| s.state == SessionState::Backoff || s.retry_attempt >= 1).await;
        assert!(!handle.is_finished());
        assert_eq!(handle.snapshot().connections, 0);

        handle.shutdown().await;
        assert_eq!(handle.snapshot().state, SessionState::Stopped);
    }

    #[tokio::test]
    async fn test_dial_failure_retries_with_growing_attempt() {
        let addr = TestServer::unused_addr().await;
        let (mut handle, mut events) = spawn_session(test_config(addr), None);

        let error = expect_event(&mut events, |e| matches!(e, SessionEvent::Error { .. })).await;
        assert!(matches!(
            error,
            SessionEvent::Error {
                kind: ErrorKind::Dial,
                ..
            }
        ));

        let mut state = handle.watch();
        wait_for(&mut state, |s| s.retry_attempt >= 3).await;
        assert_eq!(handle.snapshot().connections, 0);

        handle.shutdown().await;
        assert_eq!(handle.snapshot().state, SessionState::Stopped);
    }

    #[tokio::test]
    async fn test_malformed_proxy_routes_to_backoff() {
        let server = TestServer::start().await;
        let (mut handle, mut events) =
            spawn_session(test_config(server.addr), Some("socks4://127.0.0.1:1".to_string()));

        expect_event(&mut events, |e| {
            matches!(
                e,
                SessionEvent::Error {
                    kind: ErrorKind::Dial,
                    ..
                }
            )
        })
        .await;
        expect_event(&mut events, |e| matches!(e, SessionEvent::Reconnecting { .. })).await;

        handle.shutdown().await;
        assert_eq!(handle.snapshot().connections, 0);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let mut server = TestServer::start().await;
        let (mut handle, mut events) = spawn_session(test_config(server.addr), None);
        let mut conn = server.accept().await;
        expect_event(&mut events, |e| matches!(e, SessionEvent::Connected { .. })).await;

        handle.stop();
        handle.stop();
        handle.shutdown().await;
        handle.shutdown().await;
        handle.stop();

        assert!(handle.is_finished());
        assert_eq!(handle.snapshot().state, SessionState::Stopped);
        expect_event(&mut events, |e| {
            matches!(
                e,
                SessionEvent::Disconnected {
                    reason: CloseReason::Stopped,
                    ..
                }
            )
        })
        .await;
        expect_event(&mut events, |e| matches!(e, SessionEvent::Stopped { .. })).await;
        // 只有一次 Stopped 事件
        assert!(events.try_recv().is_err());

        // 服务端收到关闭帧
        assert!(conn.wait_closed().await);
    }

    #[tokio::test]
    async fn test_stop_during_backoff() {
        let addr = TestServer::unused_addr().await;
        let mut config = test_config(addr);
        config.backoff_base_ms = 60_000;
        config.backoff_max_ms = 60_000;
        let (mut handle, _events) = spawn_session(config, None);

        let mut state = handle.watch();
        wait_for(&mut state, |s| s.state == SessionState::Backoff).await;

        tokio::time::timeout(WAIT_TIMEOUT, handle.shutdown())
            .await
            .expect("backoff 期间停止应立即返回");
        assert_eq!(handle.snapshot().state, SessionState::Stopped);
    }
}
