// ==========================================
// 外勤人员排班系统 - 员工负荷领域模型
// ==========================================
// 职责: 员工日负荷 / 周工时台账 + 容量规则
// 用途: 模型构建（扣减已发布排班）、贪心基线、求解后复核
// ==========================================

use crate::domain::calendar::WeekKey;
use crate::domain::types::{EmployeeId, EventCategory};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

// ==========================================
// CapacityRules - 容量规则
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityRules {
    pub daily_max_events: u32,                        // 员工每日活动数上限
    pub category_caps: BTreeMap<EventCategory, u32>,  // 员工每日同类活动上限
    pub full_day_categories: BTreeSet<EventCategory>, // 全天类（当日独占）
}

impl Default for CapacityRules {
    fn default() -> Self {
        let mut category_caps = BTreeMap::new();
        category_caps.insert(EventCategory::Core, 1);
        category_caps.insert(EventCategory::Specialty, 1);
        category_caps.insert(EventCategory::Supervisor, 3);
        category_caps.insert(EventCategory::Support, 2);

        let mut full_day_categories = BTreeSet::new();
        full_day_categories.insert(EventCategory::Specialty);

        Self {
            daily_max_events: 3,
            category_caps,
            full_day_categories,
        }
    }
}

impl CapacityRules {
    /// 类别上限; 未配置的类别以每日上限兜底
    pub fn category_cap(&self, category: EventCategory) -> u32 {
        self.category_caps
            .get(&category)
            .copied()
            .unwrap_or(self.daily_max_events)
    }

    pub fn is_full_day(&self, category: EventCategory) -> bool {
        self.full_day_categories.contains(&category)
    }
}

// ==========================================
// LoadViolation - 容量冲突类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadViolation {
    DailyLimit,
    CategoryLimit,
    FullDayConflict,
    BlockConflict,
    WeeklyHours,
}

impl fmt::Display for LoadViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            LoadViolation::DailyLimit => "当日活动数超限",
            LoadViolation::CategoryLimit => "当日同类活动数超限",
            LoadViolation::FullDayConflict => "全天类活动冲突",
            LoadViolation::BlockConflict => "时段冲突",
            LoadViolation::WeeklyHours => "周工时超限",
        };
        f.write_str(text)
    }
}

// ==========================================
// DayLoad - 员工单日负荷
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayLoad {
    pub count: u32,
    pub by_category: BTreeMap<EventCategory, u32>,
    pub full_day: u32,
    pub blocks: BTreeSet<u8>,
    pub minutes: u32,
}

// ==========================================
// Trait: DayCapacity
// ==========================================
// 用途: 日容量检查接口（不含周工时,周工时由台账统计）
pub trait DayCapacity {
    /// 检查能否再承接一个活动
    fn admits(
        &self,
        rules: &CapacityRules,
        category: EventCategory,
        block: Option<u8>,
    ) -> Result<(), LoadViolation>;

    /// 剩余可承接活动数
    fn remaining_events(&self, rules: &CapacityRules) -> u32;
}

impl DayLoad {
    pub fn category_count(&self, category: EventCategory) -> u32 {
        self.by_category.get(&category).copied().unwrap_or(0)
    }

    fn add(&mut self, rules: &CapacityRules, category: EventCategory, block: Option<u8>, minutes: u32) {
        self.count += 1;
        *self.by_category.entry(category).or_insert(0) += 1;
        if rules.is_full_day(category) {
            self.full_day += 1;
        }
        if let Some(b) = block {
            self.blocks.insert(b);
        }
        self.minutes += minutes;
    }
}

impl DayCapacity for DayLoad {
    /// # 参数
    /// - `rules`: 容量规则
    /// - `category`: 新活动类别
    /// - `block`: 新活动时段
    ///
    /// # 返回
    /// - `Ok(())`: 可承接
    /// - `Err(LoadViolation)`: 第一个被违反的规则
    fn admits(
        &self,
        rules: &CapacityRules,
        category: EventCategory,
        block: Option<u8>,
    ) -> Result<(), LoadViolation> {
        let cap = rules.daily_max_events;
        let count_after = self.count + 1;

        if count_after > cap {
            return Err(LoadViolation::DailyLimit);
        }
        if self.category_count(category) + 1 > rules.category_cap(category) {
            return Err(LoadViolation::CategoryLimit);
        }

        // Σ_all + (C−1)·Σ_full ≤ C: 有全天类活动时当日只能有它一个
        let full_after = self.full_day + u32::from(rules.is_full_day(category));
        if count_after + cap.saturating_sub(1) * full_after > cap {
            return Err(LoadViolation::FullDayConflict);
        }

        if let Some(b) = block {
            if self.blocks.contains(&b) {
                return Err(LoadViolation::BlockConflict);
            }
        }
        Ok(())
    }

    fn remaining_events(&self, rules: &CapacityRules) -> u32 {
        rules.daily_max_events.saturating_sub(self.count)
    }
}

// ==========================================
// LoadLedger - 负荷台账
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct LoadLedger {
    days: HashMap<(EmployeeId, NaiveDate), DayLoad>,
    weeks: HashMap<(EmployeeId, WeekKey), u32>,
}

impl LoadLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记入一条排班（不做检查）
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        &mut self,
        rules: &CapacityRules,
        employee: &EmployeeId,
        date: NaiveDate,
        category: EventCategory,
        block: Option<u8>,
        minutes: u32,
    ) {
        self.days
            .entry((employee.clone(), date))
            .or_default()
            .add(rules, category, block, minutes);
        *self
            .weeks
            .entry((employee.clone(), WeekKey::of(date)))
            .or_insert(0) += minutes;
    }

    pub fn day(&self, employee: &EmployeeId, date: NaiveDate) -> Option<&DayLoad> {
        self.days.get(&(employee.clone(), date))
    }

    pub fn week_minutes(&self, employee: &EmployeeId, week: WeekKey) -> u32 {
        self.weeks
            .get(&(employee.clone(), week))
            .copied()
            .unwrap_or(0)
    }

    /// 完整检查: 日容量 + 周工时
    ///
    /// # 参数
    /// - `weekly_cap_minutes`: 该员工的周工时上限
    #[allow(clippy::too_many_arguments)]
    pub fn check(
        &self,
        rules: &CapacityRules,
        employee: &EmployeeId,
        date: NaiveDate,
        category: EventCategory,
        block: Option<u8>,
        minutes: u32,
        weekly_cap_minutes: u32,
    ) -> Result<(), LoadViolation> {
        if let Some(load) = self.day(employee, date) {
            load.admits(rules, category, block)?;
        } else {
            DayLoad::default().admits(rules, category, block)?;
        }

        let used = self.week_minutes(employee, WeekKey::of(date));
        if used + minutes > weekly_cap_minutes {
            return Err(LoadViolation::WeeklyHours);
        }
        Ok(())
    }

    /// 检查通过则记入
    #[allow(clippy::too_many_arguments)]
    pub fn try_record(
        &mut self,
        rules: &CapacityRules,
        employee: &EmployeeId,
        date: NaiveDate,
        category: EventCategory,
        block: Option<u8>,
        minutes: u32,
        weekly_cap_minutes: u32,
    ) -> Result<(), LoadViolation> {
        self.check(rules, employee, date, category, block, minutes, weekly_cap_minutes)?;
        self.record(rules, employee, date, category, block, minutes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 20).unwrap()
    }

    #[test]
    fn test_full_day_excludes_others() {
        let rules = CapacityRules::default();
        let e = EmployeeId::new("E1");
        let mut ledger = LoadLedger::new();
        ledger
            .try_record(&rules, &e, day(), EventCategory::Support, None, 60, 2400)
            .unwrap();
        assert_eq!(
            ledger.check(&rules, &e, day(), EventCategory::Specialty, None, 60, 2400),
            Err(LoadViolation::FullDayConflict)
        );

        let e2 = EmployeeId::new("E2");
        ledger
            .try_record(&rules, &e2, day(), EventCategory::Specialty, None, 480, 2400)
            .unwrap();
        assert_eq!(
            ledger.check(&rules, &e2, day(), EventCategory::Support, None, 60, 2400),
            Err(LoadViolation::FullDayConflict)
        );
    }

    #[test]
    fn test_category_and_daily_limits() {
        let rules = CapacityRules::default();
        let e = EmployeeId::new("E1");
        let mut ledger = LoadLedger::new();
        ledger
            .try_record(&rules, &e, day(), EventCategory::Core, None, 60, 2400)
            .unwrap();
        assert_eq!(
            ledger.check(&rules, &e, day(), EventCategory::Core, None, 60, 2400),
            Err(LoadViolation::CategoryLimit)
        );
        ledger
            .try_record(&rules, &e, day(), EventCategory::Support, None, 60, 2400)
            .unwrap();
        ledger
            .try_record(&rules, &e, day(), EventCategory::Support, None, 60, 2400)
            .unwrap();
        assert_eq!(
            ledger.check(&rules, &e, day(), EventCategory::Supervisor, None, 60, 2400),
            Err(LoadViolation::DailyLimit)
        );
        assert_eq!(ledger.day(&e, day()).unwrap().remaining_events(&rules), 0);
    }

    #[test]
    fn test_block_and_weekly() {
        let rules = CapacityRules::default();
        let e = EmployeeId::new("E1");
        let mut ledger = LoadLedger::new();
        ledger
            .try_record(&rules, &e, day(), EventCategory::Support, Some(1), 300, 400)
            .unwrap();
        assert_eq!(
            ledger.check(&rules, &e, day(), EventCategory::Supervisor, Some(1), 30, 400),
            Err(LoadViolation::BlockConflict)
        );
        let next = day().succ_opt().unwrap();
        assert_eq!(
            ledger.check(&rules, &e, next, EventCategory::Core, None, 120, 400),
            Err(LoadViolation::WeeklyHours)
        );
        assert!(ledger
            .check(&rules, &e, next, EventCategory::Core, None, 100, 400)
            .is_ok());
    }
}
