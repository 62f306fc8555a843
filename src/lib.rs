// ==========================================
// 外勤人员排班系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 排班建议生成（人工审核后发布）
// ==========================================

// 初始化国际化（词条位于 locales/）
rust_i18n::i18n!("locales", fallback = "zh-CN");

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 排班规则与求解
pub mod engine;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// 性能统计（耗时 + SQL 语句数）
pub mod perf;

// 国际化
pub mod i18n;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    EmployeeId, EmployeeRole, EventCategory, EventCondition, EventId, ReasonCode, SolveStatus,
};

// 领域实体
pub use domain::{
    Employee, Event, ExistingAssignment, Horizon, ProposedAssignment, ScheduleSnapshot,
    SnapshotBuilder,
};

// 配置
pub use config::{ConfigManager, SchedulerConfig};

// 引擎
pub use engine::{
    Algorithm, ComparisonRunner, RunOptions, ScheduleOrchestrator, ScheduleOutcome,
    SchedulingError, SqliteScheduleStore,
};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "外勤人员排班系统";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
