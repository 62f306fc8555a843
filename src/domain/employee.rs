// ==========================================
// 外勤人员排班系统 - 员工领域模型
// ==========================================
// 职责: 员工主数据 + 可用性判定
// 红线: 可用性优先级 请假 > 按日覆写 > 周模板
// ==========================================

use crate::domain::calendar::DateRange;
use crate::domain::types::{EmployeeId, EmployeeRole};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ==========================================
// TrainingFlags - 认证标记
// ==========================================
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrainingFlags {
    pub specialty_certified: bool,  // 专项产品认证
    pub supervisor_certified: bool, // 督导认证（组长可承接督导活动）
}

// ==========================================
// Employee - 员工
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Employee {
    // ===== 主键 =====
    pub id: EmployeeId,
    pub name: String,

    // ===== 能力 =====
    pub role: EmployeeRole,
    pub training: TrainingFlags,

    // ===== 可用性 =====
    pub weekly_availability: [bool; 7],                   // 周一..周日
    pub availability_overrides: BTreeMap<NaiveDate, bool>, // 按日覆写
    pub time_off: Vec<DateRange>,                          // 请假区间（闭区间）

    // ===== 工时 =====
    pub max_weekly_minutes: Option<u32>, // NULL → 使用配置默认值

    pub active: bool,
}

impl Employee {
    /// 创建默认员工（全周可用,无认证）
    pub fn new(id: impl Into<String>, name: impl Into<String>, role: EmployeeRole) -> Self {
        Self {
            id: EmployeeId::new(id),
            name: name.into(),
            role,
            training: TrainingFlags::default(),
            weekly_availability: [true; 7],
            availability_overrides: BTreeMap::new(),
            time_off: Vec::new(),
            max_weekly_minutes: None,
            active: true,
        }
    }

    /// 判断员工在某日是否可用
    ///
    /// # 参数
    /// - `date`: 目标日期
    ///
    /// # 返回
    /// - `false`: 停用 / 请假 / 覆写为不可用 / 周模板不可用
    /// - `true`: 其余情况
    pub fn is_available(&self, date: NaiveDate) -> bool {
        if !self.active {
            return false;
        }
        if self.time_off.iter().any(|r| r.contains(date)) {
            return false;
        }
        if let Some(available) = self.availability_overrides.get(&date) {
            return *available;
        }
        self.weekly_availability[date.weekday().num_days_from_monday() as usize]
    }

    /// 周工时上限（分钟）
    pub fn weekly_cap_minutes(&self, default_minutes: u32) -> u32 {
        self.max_weekly_minutes.unwrap_or(default_minutes)
    }

    /// 能力分组键: 角色 + 认证决定可承接的类别
    pub fn capability_key(&self) -> (EmployeeRole, TrainingFlags) {
        (self.role, self.training)
    }
}
