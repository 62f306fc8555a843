// ==========================================
// 外勤人员排班系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、容量规则
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod assignment;
pub mod calendar;
pub mod capacity;
pub mod employee;
pub mod event;
pub mod snapshot;
pub mod types;

// 重导出核心类型
pub use assignment::{ExistingAssignment, ProposedAssignment};
pub use calendar::{
    DateRange, Horizon, LockedDay, LockedDayKind, RotationDefault, ScheduleException, WeekKey,
};
pub use capacity::{CapacityRules, DayCapacity, DayLoad, LoadLedger, LoadViolation};
pub use employee::{Employee, TrainingFlags};
pub use event::{Event, PriorPlacement};
pub use snapshot::{AffinityScores, PairedCoreState, ScheduleSnapshot, SnapshotBuilder, SnapshotError};
pub use types::{
    EmployeeId, EmployeeRole, EventCategory, EventCondition, EventId, ReasonCode, SolveStatus,
};
