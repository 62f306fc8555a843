// ==========================================
// 外勤人员排班系统 - 活动领域模型
// ==========================================
// 职责: 待排活动定义
// 红线: 跨组件一律以 EventId 键控; ref_num 只用于展示
// ==========================================

use crate::domain::calendar::DateRange;
use crate::domain::types::{EmployeeId, EventCategory, EventCondition, EventId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ==========================================
// PriorPlacement - 上一次未发布的排班建议
// ==========================================
// 用途: 扰动锚点,目标函数对偏离它的解施加惩罚
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorPlacement {
    pub employee_id: EmployeeId,
    pub date: NaiveDate,
}

// ==========================================
// Event - 待排活动
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    // ===== 标识 =====
    pub id: EventId,
    pub ref_num: String,
    pub name: String,

    // ===== 类别与窗口 =====
    pub category: EventCategory,
    pub window: DateRange,        // 可执行日期窗口（闭区间）
    pub duration_minutes: u32,
    pub block: Option<u8>,        // 时段编号; NULL → 无时段
    pub paired_with: Option<EventId>, // Supervisor → 对应的 Core 活动

    // ===== 状态 =====
    pub condition: EventCondition,
    pub prior: Option<PriorPlacement>,
}

impl Event {
    pub fn new(
        id: impl Into<String>,
        category: EventCategory,
        window: DateRange,
        duration_minutes: u32,
    ) -> Self {
        let id: String = id.into();
        Self {
            ref_num: id.clone(),
            name: id.clone(),
            id: EventId::new(id),
            category,
            window,
            duration_minutes,
            block: None,
            paired_with: None,
            condition: EventCondition::Active,
            prior: None,
        }
    }

    pub fn with_pair(mut self, core: impl Into<String>) -> Self {
        self.paired_with = Some(EventId::new(core));
        self
    }

    pub fn with_block(mut self, block: u8) -> Self {
        self.block = Some(block);
        self
    }

    pub fn with_prior(mut self, employee: impl Into<String>, date: NaiveDate) -> Self {
        self.prior = Some(PriorPlacement {
            employee_id: EmployeeId::new(employee),
            date,
        });
        self
    }

    pub fn with_condition(mut self, condition: EventCondition) -> Self {
        self.condition = condition;
        self
    }

    pub fn is_supervisor(&self) -> bool {
        self.category == EventCategory::Supervisor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_pair_and_block() {
        let day = NaiveDate::from_ymd_opt(2026, 10, 20).unwrap();
        let ev = Event::new("SUP-1", EventCategory::Supervisor, DateRange::single(day), 60)
            .with_pair("CORE-1")
            .with_block(2);
        assert!(ev.is_supervisor());
        assert_eq!(ev.paired_with, Some(EventId::new("CORE-1")));
        assert_eq!(ev.block, Some(2));
        assert_eq!(ev.condition, EventCondition::Active);
    }
}
