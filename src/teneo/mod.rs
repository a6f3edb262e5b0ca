//! Teneo 远端服务
//!
//! - `endpoint`: WebSocket 连接地址与握手请求
//! - `model`: 帧与 REST 数据结构
//! - `provider`: REST 调用（推荐奖励、出口 IP 检测）

pub mod endpoint;
pub mod model;
pub mod provider;
