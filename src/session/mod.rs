//! 会话模块
//!
//! 每个账号一个会话，负责连接、心跳、断线退避重连：
//! - `lifecycle`: 连接生命周期状态机
//! - `keepalive`: 心跳调度
//! - `backoff`: 指数退避
//! - `state` / `event`: 对外可观察的状态快照与事件

pub mod backoff;
pub mod error;
pub mod event;
pub mod keepalive;
pub mod lifecycle;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{ErrorKind, SessionError};
pub use event::{CloseReason, SessionEvent};
pub use lifecycle::{ConnectionLifecycleManager, SessionHandle};
pub use state::{SessionSnapshot, SessionState};
