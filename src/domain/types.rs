// ==========================================
// 外勤人员排班系统 - 领域类型定义
// ==========================================
// 职责: 闭合枚举 + 标识符类型
// 红线: 类别/状态/角色不得以裸字符串在引擎层流转
//       数据加载边界处完成解析,未知取值立即失败
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 标识符 (Identifiers)
// ==========================================
// 说明: 活动只有一个规范标识 EventId（内部 ID）。
//       ref_num 仅用于展示,不参与任何跨组件键控。

/// 活动内部标识
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// 员工标识
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmployeeId(String);

impl EmployeeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmployeeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EmployeeId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// ==========================================
// 活动类别 (Event Category)
// ==========================================
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventCategory {
    Core,       // 主力门店活动
    Supervisor, // 督导活动（跟随 Core）
    Specialty,  // 专项产品活动（需认证）
    Support,    // 辅助活动
}

impl EventCategory {
    pub const ALL: [EventCategory; 4] = [
        EventCategory::Core,
        EventCategory::Supervisor,
        EventCategory::Specialty,
        EventCategory::Support,
    ];

    /// 从字符串解析类别（大小写/首尾空白不敏感）
    ///
    /// 未知类别返回 None,由调用方转为数据完整性错误
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "CORE" => Some(EventCategory::Core),
            "SUPERVISOR" => Some(EventCategory::Supervisor),
            "SPECIALTY" => Some(EventCategory::Specialty),
            "SUPPORT" => Some(EventCategory::Support),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            EventCategory::Core => "CORE",
            EventCategory::Supervisor => "SUPERVISOR",
            EventCategory::Specialty => "SPECIALTY",
            EventCategory::Support => "SUPPORT",
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_str())
    }
}

// ==========================================
// 活动状态 (Event Condition)
// ==========================================
// 默认策略: NULL/空字符串 → Active（显式规则,不依赖真假值隐式转换）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventCondition {
    Active,
    Cancelled,
    Expired,
}

impl EventCondition {
    /// 从数据库字段解析
    ///
    /// # 返回
    /// - Ok(Active): NULL / 空 / "ACTIVE" / "UNSTAFFED" / "SCHEDULED"
    /// - Ok(Cancelled) / Ok(Expired)
    /// - Err: 其它无法识别的取值
    pub fn from_db(raw: Option<&str>) -> Result<Self, String> {
        let value = match raw.map(str::trim) {
            None | Some("") => return Ok(EventCondition::Active),
            Some(v) => v.to_uppercase(),
        };

        match value.as_str() {
            "ACTIVE" | "UNSTAFFED" | "SCHEDULED" => Ok(EventCondition::Active),
            "CANCELED" | "CANCELLED" => Ok(EventCondition::Cancelled),
            "EXPIRED" => Ok(EventCondition::Expired),
            other => Err(format!("未知活动状态: {}", other)),
        }
    }

    /// 是否可参与排班
    pub fn is_schedulable(&self) -> bool {
        matches!(self, EventCondition::Active)
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            EventCondition::Active => "ACTIVE",
            EventCondition::Cancelled => "CANCELLED",
            EventCondition::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for EventCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_str())
    }
}

// ==========================================
// 员工角色 (Employee Role)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmployeeRole {
    EventSpecialist,     // 活动专员
    LeadEventSpecialist, // 组长
    ClubSupervisor,      // 门店督导
    Juicer,              // 专项操作员
}

impl EmployeeRole {
    pub fn parse(s: &str) -> Option<Self> {
        let normalized: String = s
            .trim()
            .chars()
            .map(|c| if c == ' ' || c == '-' { '_' } else { c })
            .collect::<String>()
            .to_uppercase();

        match normalized.as_str() {
            "EVENT_SPECIALIST" => Some(EmployeeRole::EventSpecialist),
            "LEAD_EVENT_SPECIALIST" | "LEAD" => Some(EmployeeRole::LeadEventSpecialist),
            "CLUB_SUPERVISOR" => Some(EmployeeRole::ClubSupervisor),
            "JUICER" | "JUICER_BARISTA" => Some(EmployeeRole::Juicer),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            EmployeeRole::EventSpecialist => "EVENT_SPECIALIST",
            EmployeeRole::LeadEventSpecialist => "LEAD_EVENT_SPECIALIST",
            EmployeeRole::ClubSupervisor => "CLUB_SUPERVISOR",
            EmployeeRole::Juicer => "JUICER",
        }
    }
}

impl fmt::Display for EmployeeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_str())
    }
}

// ==========================================
// 求解状态 (Solve Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SolveStatus {
    Optimal,    // 搜索空间穷尽,已证明最优
    Feasible,   // 时间预算耗尽,返回当前最优可行解
    Infeasible, // 搜索空间穷尽,无可行解
    Unknown,    // 时间预算耗尽,未找到可行解
}

impl SolveStatus {
    pub fn has_solution(&self) -> bool {
        matches!(self, SolveStatus::Optimal | SolveStatus::Feasible)
    }
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveStatus::Optimal => write!(f, "OPTIMAL"),
            SolveStatus::Feasible => write!(f, "FEASIBLE"),
            SolveStatus::Infeasible => write!(f, "INFEASIBLE"),
            SolveStatus::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// ==========================================
// 未排原因码 (Reason Code)
// ==========================================
// 红线: 对外只暴露闭合原因码集合,不暴露底层错误文本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    NoEligibleEmployee,
    NoValidDay,
    NoAvailableSlot,
    PairedCoreUnschedulable,
    PairedCoreMissing,
    PairedCoreUnassigned,
    SolverUnassigned,
    ReviewDailyLimit,
    ReviewCategoryLimit,
    ReviewFullDayConflict,
    ReviewBlockConflict,
    ReviewWeeklyHours,
    ReviewPairMismatch,
    ReviewDoubleBooked,
    GreedyNoCapacity,
}

impl ReasonCode {
    pub const ALL: [ReasonCode; 15] = [
        ReasonCode::NoEligibleEmployee,
        ReasonCode::NoValidDay,
        ReasonCode::NoAvailableSlot,
        ReasonCode::PairedCoreUnschedulable,
        ReasonCode::PairedCoreMissing,
        ReasonCode::PairedCoreUnassigned,
        ReasonCode::SolverUnassigned,
        ReasonCode::ReviewDailyLimit,
        ReasonCode::ReviewCategoryLimit,
        ReasonCode::ReviewFullDayConflict,
        ReasonCode::ReviewBlockConflict,
        ReasonCode::ReviewWeeklyHours,
        ReasonCode::ReviewPairMismatch,
        ReasonCode::ReviewDoubleBooked,
        ReasonCode::GreedyNoCapacity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::NoEligibleEmployee => "NO_ELIGIBLE_EMPLOYEE",
            ReasonCode::NoValidDay => "NO_VALID_DAY",
            ReasonCode::NoAvailableSlot => "NO_AVAILABLE_SLOT",
            ReasonCode::PairedCoreUnschedulable => "PAIRED_CORE_UNSCHEDULABLE",
            ReasonCode::PairedCoreMissing => "PAIRED_CORE_MISSING",
            ReasonCode::PairedCoreUnassigned => "PAIRED_CORE_UNASSIGNED",
            ReasonCode::SolverUnassigned => "SOLVER_UNASSIGNED",
            ReasonCode::ReviewDailyLimit => "REVIEW_DAILY_LIMIT",
            ReasonCode::ReviewCategoryLimit => "REVIEW_CATEGORY_LIMIT",
            ReasonCode::ReviewFullDayConflict => "REVIEW_FULL_DAY_CONFLICT",
            ReasonCode::ReviewBlockConflict => "REVIEW_BLOCK_CONFLICT",
            ReasonCode::ReviewWeeklyHours => "REVIEW_WEEKLY_HOURS",
            ReasonCode::ReviewPairMismatch => "REVIEW_PAIR_MISMATCH",
            ReasonCode::ReviewDoubleBooked => "REVIEW_DOUBLE_BOOKED",
            ReasonCode::GreedyNoCapacity => "GREEDY_NO_CAPACITY",
        }
    }

    /// 面向诊断工具的说明文本
    /// 面向审核人员的说明（按当前语言）
    pub fn description(&self) -> String {
        crate::i18n::t(&format!("reason.{}", self.as_str().to_ascii_lowercase()))
    }

    pub fn parse(s: &str) -> Option<Self> {
        ReasonCode::ALL.into_iter().find(|code| code.as_str() == s.trim())
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
