//! CLI 命令处理模块

pub mod config;
pub mod output; // 通用输出格式
pub mod run;
pub mod scenario;
