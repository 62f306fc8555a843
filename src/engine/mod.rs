// ==========================================
// 外勤人员排班系统 - 引擎层
// ==========================================
// 职责: 资格判定、约束建模、求解、复核、运行编排
// 红线: Engine 不拼 SQL; 排不上的活动必须输出原因码
// ==========================================

pub mod comparison;
pub mod cp;
pub mod eligibility;
pub mod error;
pub mod greedy;
pub mod loader;
pub mod model_builder;
pub mod objective;
pub mod orchestrator;
pub mod review;
pub mod solver;

// 重导出核心引擎
pub use comparison::{ComparisonReport, ComparisonRunner, EventDifference};
pub use eligibility::{Eligibility, EligibilityResolver};
pub use error::{SchedulingError, SchedulingResult};
pub use greedy::GreedyScheduler;
pub use loader::{InMemorySource, ScheduleSource, SqliteScheduleStore};
pub use model_builder::{IndicatorCache, IndicatorKey, ModelBuilder, ScheduleModel};
pub use objective::{ObjectiveBuilder, ObjectiveReport};
pub use orchestrator::{
    Algorithm, EventTrace, RunOptions, RunSummary, ScheduleOrchestrator, ScheduleOutcome,
};
pub use review::{PostSolveReviewer, ReviewReport};
pub use solver::{SolveOutcome, SolverOrchestrator};
