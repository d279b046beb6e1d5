//! # Tracker Testing Utils
//!
//! 工作区内各 crate 共用的测试替身与辅助工具：
//!
//! - **Mocks**: 记录调用的通知器、按脚本返回的评分服务、记录命令的提交端、可注入故障的存储
//! - **Builders**: 报告测试数据构造器
//! - **Helpers**: 可手动推进的时钟、时间构造函数、异步条件等待
//!
//! ```toml
//! [dev-dependencies]
//! tracker-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
