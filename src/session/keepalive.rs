//! 心跳调度
//!
//! 连接建立后按固定周期发送 `{"type":"PING"}`，断开时由会话同步停止。

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tracing::Instrument;

use crate::teneo::model::frames::OutboundFrame;

/// 最小心跳周期，`interval` 不接受零周期
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// 心跳调度器
///
/// 心跳只写入会话的出站通道，由会话任务负责真正发送。
/// 出站通道关闭即视为连接已断开，定时器随之退出。
pub struct KeepAliveScheduler {
    period: Duration,
    task: Option<JoinHandle<()>>,
}

impl KeepAliveScheduler {
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(MIN_PERIOD),
            task: None,
        }
    }

    /// 启动定时器，第一次心跳在一个周期之后；已在运行时先停止旧的
    ///
    /// 定时任务继承调用方的 span
    pub fn start(&mut self, outbound: mpsc::Sender<Message>) {
        self.stop();

        let period = self.period;
        let span = tracing::Span::current();
        let task = tokio::spawn(
            async move {
                let mut ticker = interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    ticker.tick().await;
                    if outbound.is_closed() {
                        break;
                    }
                    let frame = match OutboundFrame::Ping.to_message() {
                        Ok(frame) => frame,
                        Err(e) => {
                            tracing::warn!("心跳帧序列化失败: {}", e);
                            break;
                        }
                    };
                    if outbound.send(frame).await.is_err() {
                        break;
                    }
                    tracing::debug!("已发送心跳");
                }
            }
            .instrument(span),
        );
        self.task = Some(task);
    }

    /// 停止定时器，未启动或重复调用均安全
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for KeepAliveScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
