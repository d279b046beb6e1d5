//! # 数据模型
//!
//! ## Command - 命令
//! 描述一次待执行动作的不可变值（例如"审批报告X"、"提醒补交"）。
//! 没有持久化身份：由生产者创建，进入队列后归队列独占，出队后归执行它的 Worker 独占。
//!
//! ## Report - 日报
//! 以 `(user_id, date)` 为键的聚合，必含早报部分，最多含一个晚报部分。
//!
//! ## 审批状态流转
//! ```text
//! 未审批 ──管理员审批──▶ approved
//!   │
//!   └───自动审批扫描───▶ approved_by_system
//! ```
//! 两个标志都是单向的：一旦为 true 就不会再回到 false。

mod command;
mod report;

pub use command::*;
pub use report::*;
