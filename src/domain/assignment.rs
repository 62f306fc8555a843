// ==========================================
// 外勤人员排班系统 - 排班结果领域模型
// ==========================================
// 职责: 已发布排班（事实）+ 排班建议（本次输出）
// ==========================================

use crate::domain::types::{EmployeeId, EventCategory, EventId, ReasonCode};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ==========================================
// ExistingAssignment - 已发布排班
// ==========================================
// 红线: 只读事实,求解器不得重新分配
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingAssignment {
    pub id: String,
    pub employee_id: EmployeeId,
    pub event_id: EventId,
    pub date: NaiveDate,
    pub duration_minutes: u32,
    pub category: EventCategory,
    pub block: Option<u8>,
}

// ==========================================
// ProposedAssignment - 排班建议
// ==========================================
// 不变量: employee_id/date 同时为 Some,或 reason 为 Some
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedAssignment {
    pub event_id: EventId,
    pub employee_id: Option<EmployeeId>,
    pub date: Option<NaiveDate>,
    pub reason: Option<ReasonCode>,
    pub detail: Option<String>,
}

impl ProposedAssignment {
    pub fn assigned(event_id: EventId, employee_id: EmployeeId, date: NaiveDate) -> Self {
        Self {
            event_id,
            employee_id: Some(employee_id),
            date: Some(date),
            reason: None,
            detail: None,
        }
    }

    pub fn unassigned(event_id: EventId, reason: ReasonCode) -> Self {
        Self {
            event_id,
            employee_id: None,
            date: None,
            reason: Some(reason),
            detail: None,
        }
    }

    pub fn is_assigned(&self) -> bool {
        self.employee_id.is_some() && self.date.is_some()
    }

    /// 降级为未安排（复核使用）
    ///
    /// 保留条目本身,只清空员工/日期并记录原因
    pub fn demote(&mut self, reason: ReasonCode, detail: impl Into<String>) {
        self.employee_id = None;
        self.date = None;
        self.reason = Some(reason);
        self.detail = Some(detail.into());
    }
}
