//! 账号池模块
//!
//! 账号配对、出口 IP 检测，以及按账号并发运行的会话池

pub mod account;
pub mod manager;

pub use account::{pair_accounts, probe_observed_ips, Account};
pub use manager::{SessionPool, ShutdownReport};
