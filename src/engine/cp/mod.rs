// ==========================================
// 外勤人员排班系统 - 约束求解模块
// ==========================================
// 职责: 与排班领域无关的 0/1 线性模型 + 求解器
// 组成:
// - CpModel: 布尔变量、线性约束、线性目标、搜索分组
// - CpSolver: 求解器接口; PortfolioSolver 为默认实现
// ==========================================

mod model;
mod solver;

pub use model::{CpModel, LinearConstraint, VarId};
pub use solver::{CpSolution, CpSolver, PortfolioSolver, SolverConfig};
