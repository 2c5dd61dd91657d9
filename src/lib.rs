// src/lib.rs
//! crab-pulse 库：config / monitor / broadcast / server / page

pub mod config;     // 配置加载
pub mod monitor;    // 请求日志 / 速率 / 观看者 / 主机指标 / 快照
pub mod broadcast;  // 周期推送 & 连接时推送
pub mod server;     // 网络层 & 路由
pub mod page;       // 仪表盘页面
