//! # tracker-core
//!
//! 日报跟踪系统的共享内核：错误类型、配置模型、命令与报告数据模型，
//! 以及队列、调度器、处理器共同依赖的协作者接口。

pub mod config;
pub mod errors;
pub mod models;
pub mod traits;

pub use config::*;
pub use errors::*;
pub use models::{
    compute_overdue, Command, CommandEnvelope, CommandKind, Report, ReportHalf, ReportId,
    ReportPeriod, ReportScore, UserId,
};
pub use traits::{
    Clock, CommandSink, Notifier, ReportAnalyzer, SystemClock, UnitOfWork, UnitOfWorkFactory,
    WorkCalendar,
};
