//! # tracker-dispatcher
//!
//! 报告生命周期中由时间驱动的两个生产者：
//! - [`DeadlineScheduler`]：按本地时刻发送提交提醒、截止提醒与缺交通知；
//! - [`AutoApprovalSweeper`]：定期把超过宽限时间仍未审批的报告交给系统审批。
//!
//! 二者都通过 [`BackgroundTask`] 显式启动与停止。

mod background;

pub mod auto_approval;
pub mod deadline_scheduler;

pub use auto_approval::{AutoApprovalSweeper, SweepOutcome};
pub use background::BackgroundTask;
pub use deadline_scheduler::{
    entries_from_config, next_occurrence, ArmedEntry, DeadlineEvent, DeadlineEventKind,
    DeadlineScheduler, ScheduleEntry,
};
