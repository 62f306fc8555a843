// ==========================================
// 外勤人员排班系统 - 配置层
// ==========================================
// 职责: 排班配置管理,默认值 + 数据库覆写
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod constraint_modifier;
pub mod scheduler_config;

// 重导出核心配置类型
pub use config_manager::{config_keys, ConfigManager};
pub use constraint_modifier::{parse_modifier, ConstraintModifiers, ObjectiveTerm};
pub use scheduler_config::{ObjectiveWeights, SchedulerConfig};
