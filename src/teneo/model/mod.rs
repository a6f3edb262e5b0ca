//! Teneo 数据模型
//!
//! - `frames`: WebSocket 出站 / 入站帧
//! - `referral`: 推荐奖励接口

pub mod frames;
pub mod referral;
