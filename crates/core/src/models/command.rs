use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ReportId, ReportPeriod, UserId};

/// 命令类型标签，用于在处理器注册表中查找处理器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    SubmitReport,
    AnalyzeReport,
    ApproveReport,
    RejectReport,
    NotifyAutoApproved,
    ReportMissed,
}

impl CommandKind {
    pub const ALL: [CommandKind; 6] = [
        CommandKind::SubmitReport,
        CommandKind::AnalyzeReport,
        CommandKind::ApproveReport,
        CommandKind::RejectReport,
        CommandKind::NotifyAutoApproved,
        CommandKind::ReportMissed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::SubmitReport => "submit_report",
            CommandKind::AnalyzeReport => "analyze_report",
            CommandKind::ApproveReport => "approve_report",
            CommandKind::RejectReport => "reject_report",
            CommandKind::NotifyAutoApproved => "notify_auto_approved",
            CommandKind::ReportMissed => "report_missed",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 命令：封闭的标签联合，变体集合在编译期可枚举
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Command {
    /// 员工提交（或重新提交）早报/晚报
    SubmitReport {
        user_id: UserId,
        date: NaiveDate,
        period: ReportPeriod,
        text: String,
    },
    /// 调用外部评分服务为报告打分
    AnalyzeReport {
        report_id: ReportId,
        period: ReportPeriod,
    },
    ApproveReport {
        report_id: ReportId,
        period: ReportPeriod,
        admin_id: UserId,
    },
    RejectReport {
        report_id: ReportId,
        period: ReportPeriod,
        admin_id: UserId,
        reason: String,
    },
    /// 自动审批之后的跟进通知
    NotifyAutoApproved {
        report_id: ReportId,
        user_id: UserId,
        period: ReportPeriod,
    },
    /// 截止时间已过，汇总未提交的员工
    ReportMissed { date: NaiveDate, period: ReportPeriod },
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::SubmitReport { .. } => CommandKind::SubmitReport,
            Command::AnalyzeReport { .. } => CommandKind::AnalyzeReport,
            Command::ApproveReport { .. } => CommandKind::ApproveReport,
            Command::RejectReport { .. } => CommandKind::RejectReport,
            Command::NotifyAutoApproved { .. } => CommandKind::NotifyAutoApproved,
            Command::ReportMissed { .. } => CommandKind::ReportMissed,
        }
    }

    pub fn report_id(&self) -> Option<ReportId> {
        match self {
            Command::AnalyzeReport { report_id, .. }
            | Command::ApproveReport { report_id, .. }
            | Command::RejectReport { report_id, .. }
            | Command::NotifyAutoApproved { report_id, .. } => Some(*report_id),
            Command::SubmitReport { .. } | Command::ReportMissed { .. } => None,
        }
    }
}

/// 队列中的命令信封。`id` 只用于日志关联，不会被持久化。
#[derive(Debug, Clone)]
pub struct CommandEnvelope {
    pub id: Uuid,
    pub enqueued_at: DateTime<Utc>,
    pub command: Command,
}

impl CommandEnvelope {
    pub fn new(command: Command) -> Self {
        Self {
            id: Uuid::new_v4(),
            enqueued_at: Utc::now(),
            command,
        }
    }

    pub fn kind(&self) -> CommandKind {
        self.command.kind()
    }
}
