//! 测试辅助：本地 WebSocket 服务端

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, watch};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::model::config::Config;

use super::event::SessionEvent;
use super::state::SessionSnapshot;

pub(crate) const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// 指向本地服务端的测试配置：短心跳、短退避、不领取推荐奖励
pub(crate) fn test_config(addr: SocketAddr) -> Config {
    let mut config = Config::default();
    config.ws_endpoint = format!("ws://{}", addr);
    config.ping_interval_ms = 50;
    config.backoff_base_ms = 20;
    config.backoff_max_ms = 100;
    config.connect_timeout_secs = 5;
    config.shutdown_timeout_secs = 2;
    config.claim_referrals = false;
    config
}

/// 服务端接受的一条连接
pub(crate) struct ServerConn {
    pub query: String,
    ws: WebSocketStream<TcpStream>,
}

impl ServerConn {
    /// 连接参数中的 accessToken
    pub fn token(&self) -> String {
        self.query
            .split('&')
            .find_map(|pair| pair.strip_prefix("accessToken="))
            .unwrap_or_default()
            .to_string()
    }

    pub async fn send_text(&mut self, text: &str) {
        self.ws.send(Message::Text(text.to_string())).await.unwrap();
    }

    /// 下一条文本帧
    pub async fn next_text(&mut self) -> String {
        loop {
            let message = tokio::time::timeout(WAIT_TIMEOUT, self.ws.next())
                .await
                .expect("等待文本帧超时")
                .expect("连接已结束")
                .unwrap();
            match message {
                Message::Text(text) => return text,
                Message::Close(_) => panic!("连接已关闭"),
                _ => continue,
            }
        }
    }

    pub async fn close(&mut self) {
        let _ = self.ws.close(None).await;
    }

    /// 等待客户端关闭连接，期间的其他帧忽略
    pub async fn wait_closed(&mut self) -> bool {
        let closed = async {
            loop {
                match self.ws.next().await {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return true,
                    Some(Ok(_)) => continue,
                }
            }
        };
        tokio::time::timeout(WAIT_TIMEOUT, closed).await.unwrap_or(false)
    }
}

/// 本地 WebSocket 服务端，每个握手成功的连接都交给测试
pub(crate) struct TestServer {
    pub addr: SocketAddr,
    conns: mpsc::UnboundedReceiver<ServerConn>,
}

impl TestServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, conns) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let tx = tx.clone();
                tokio::spawn(async move {
                    let mut query = String::new();
                    let callback =
                        |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                            query = req.uri().query().unwrap_or_default().to_string();
                            Ok(resp)
                        };
                    let accepted = tokio_tungstenite::accept_hdr_async(stream, callback).await;
                    if let Ok(ws) = accepted {
                        let _ = tx.send(ServerConn { query, ws });
                    }
                });
            }
        });

        Self { addr, conns }
    }

    /// 一个当前没有监听的本地地址
    pub async fn unused_addr() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    }

    pub async fn accept(&mut self) -> ServerConn {
        tokio::time::timeout(WAIT_TIMEOUT, self.conns.recv())
            .await
            .expect("等待客户端连接超时")
            .expect("服务端已退出")
    }
}

/// 等待第一个满足条件的事件，之前的事件丢弃
pub(crate) async fn expect_event<F>(
    events: &mut broadcast::Receiver<SessionEvent>,
    mut predicate: F,
) -> SessionEvent
where
    F: FnMut(&SessionEvent) -> bool,
{
    let found = async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("事件通道已关闭"),
            }
        }
    };
    tokio::time::timeout(WAIT_TIMEOUT, found)
        .await
        .expect("等待事件超时")
}

/// 等待状态快照满足条件
pub(crate) async fn wait_for<F>(state: &mut watch::Receiver<SessionSnapshot>, predicate: F)
where
    F: FnMut(&SessionSnapshot) -> bool,
{
    tokio::time::timeout(WAIT_TIMEOUT, state.wait_for(predicate))
        .await
        .expect("等待状态超时")
        .expect("状态通道已关闭");
}
