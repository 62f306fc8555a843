// ==========================================
// 外勤人员排班系统 - 求解编排
// ==========================================
// 职责: 按配置运行求解器,把解还原为排班建议
// 红线: 无可行解（INFEASIBLE / UNKNOWN）→ 整次运行失败,不输出部分结果
// ==========================================

use crate::config::SchedulerConfig;
use crate::domain::assignment::ProposedAssignment;
use crate::domain::snapshot::{PairedCoreState, ScheduleSnapshot};
use crate::domain::types::{ReasonCode, SolveStatus};
use crate::engine::cp::{CpSolution, CpSolver, PortfolioSolver, SolverConfig};
use crate::engine::error::{SchedulingError, SchedulingResult};
use crate::engine::model_builder::ScheduleModel;
use tracing::{info, instrument, warn};

/// 求解结果
#[derive(Debug, Clone)]
pub struct SolveOutcome {
    pub status: SolveStatus,
    pub objective: Option<i64>,
    pub proposals: Vec<ProposedAssignment>, // 与 snapshot.events 一一对应
    pub nodes: u64,
    pub elapsed_ms: u64,
}

// ==========================================
// SolverOrchestrator
// ==========================================
pub struct SolverOrchestrator<S: CpSolver = PortfolioSolver> {
    solver: S,
}

impl SolverOrchestrator<PortfolioSolver> {
    pub fn new() -> Self {
        Self {
            solver: PortfolioSolver::new(),
        }
    }
}

impl Default for SolverOrchestrator<PortfolioSolver> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: CpSolver> SolverOrchestrator<S> {
    pub fn with_solver(solver: S) -> Self {
        Self { solver }
    }

    /// 求解并还原
    ///
    /// # 参数
    /// - `sm`: 已设置目标函数的模型（本方法登记搜索分组）
    ///
    /// # 返回
    /// - `Ok(SolveOutcome)`: OPTIMAL / FEASIBLE
    /// - `Err(NoSolution)`: INFEASIBLE / UNKNOWN
    #[instrument(skip_all, fields(
        variables = sm.variable_count(),
        constraints = sm.constraint_count(),
        workers = config.effective_workers(),
    ))]
    pub fn solve(
        &self,
        sm: &mut ScheduleModel,
        snapshot: &ScheduleSnapshot,
        config: &SchedulerConfig,
    ) -> SchedulingResult<SolveOutcome> {
        sm.install_search_groups();
        let solver_config = SolverConfig {
            time_limit_ms: config.time_limit_ms,
            num_workers: config.effective_workers(),
            random_seed: config.random_seed,
        };

        let solution = self.solver.solve(&sm.model, &solver_config);
        info!(
            status = %solution.status,
            objective = ?solution.objective,
            nodes = solution.nodes,
            elapsed_ms = solution.elapsed_ms,
            "求解完成"
        );

        if !solution.has_solution() {
            warn!(status = %solution.status, "求解器未返回可行解");
            return Err(SchedulingError::NoSolution {
                status: solution.status,
            });
        }

        let proposals = extract(sm, snapshot, &solution);
        Ok(SolveOutcome {
            status: solution.status,
            objective: solution.objective,
            proposals,
            nodes: solution.nodes,
            elapsed_ms: solution.elapsed_ms,
        })
    }
}

/// 从解中读取 placed / day / emp
fn extract(sm: &ScheduleModel, snapshot: &ScheduleSnapshot, solution: &CpSolution) -> Vec<ProposedAssignment> {
    let mut out: Vec<ProposedAssignment> = Vec::with_capacity(snapshot.events.len());
    for (e, event) in snapshot.events.iter().enumerate() {
        let Some(vars) = sm.event_vars(e) else {
            let reason = sm.reason(e).unwrap_or(ReasonCode::NoAvailableSlot);
            out.push(ProposedAssignment::unassigned(event.id.clone(), reason));
            continue;
        };

        let day = vars.days.iter().find(|(_, v)| solution.value(**v)).map(|(d, _)| *d);
        let emp = vars
            .employees
            .iter()
            .find(|(_, v)| solution.value(**v))
            .map(|(k, _)| *k);

        match (solution.value(vars.placed), day, emp) {
            (true, Some(d), Some(k)) => out.push(ProposedAssignment::assigned(
                event.id.clone(),
                snapshot.employees[k].id.clone(),
                d,
            )),
            _ => out.push(ProposedAssignment::unassigned(event.id.clone(), ReasonCode::SolverUnassigned)),
        }
    }

    // 督导未安排且其 Core 也未安排 → 归因于 Core
    for (e, event) in snapshot.events.iter().enumerate() {
        if out[e].reason != Some(ReasonCode::SolverUnassigned) || !event.is_supervisor() {
            continue;
        }
        if let Some(core) = &event.paired_with {
            if let PairedCoreState::Pending(c) = snapshot.paired_core(core) {
                if !out[c].is_assigned() {
                    out[e].reason = Some(ReasonCode::PairedCoreUnassigned);
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::calendar::{DateRange, Horizon};
    use crate::domain::employee::Employee;
    use crate::domain::event::Event;
    use crate::domain::snapshot::SnapshotBuilder;
    use crate::domain::types::{EmployeeRole, EventCategory};
    use crate::engine::cp::CpModel;
    use crate::engine::eligibility::EligibilityResolver;
    use crate::engine::model_builder::ModelBuilder;
    use crate::engine::objective::ObjectiveBuilder;
    use chrono::NaiveDate;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, day).unwrap()
    }

    /// 总是超时且无解的求解器
    struct NeverSolves;

    impl CpSolver for NeverSolves {
        fn solve(&self, model: &CpModel, _config: &SolverConfig) -> CpSolution {
            CpSolution {
                status: SolveStatus::Unknown,
                objective: None,
                values: vec![false; model.num_vars()],
                nodes: 0,
                elapsed_ms: 0,
            }
        }
    }

    fn prepared(config: &SchedulerConfig) -> (ScheduleSnapshot, ScheduleModel) {
        let snap = SnapshotBuilder::new(Horizon::new(d(19), d(25)).unwrap())
            .employee(Employee::new("E1", "a", EmployeeRole::EventSpecialist))
            .event(Event::new("A", EventCategory::Core, DateRange::new(d(20), d(21)).unwrap(), 60))
            .event(Event::new("B", EventCategory::Core, DateRange::new(d(20), d(20)).unwrap(), 60))
            .event(Event::new("C", EventCategory::Core, DateRange::new(d(1), d(2)).unwrap(), 60))
            .build()
            .unwrap();
        let elig = EligibilityResolver::new(&snap, d(19)).resolve_all();
        let mut sm = ModelBuilder::new(&snap, config).build(elig);
        ObjectiveBuilder::new(&snap, config).build(&mut sm);
        (snap, sm)
    }

    #[test]
    fn test_every_event_gets_assignment_or_reason() {
        let config = SchedulerConfig::default();
        let (snap, mut sm) = prepared(&config);
        let out = SolverOrchestrator::new().solve(&mut sm, &snap, &config).unwrap();

        assert_eq!(out.status, SolveStatus::Optimal);
        assert_eq!(out.proposals.len(), 3);
        for p in &out.proposals {
            assert!(p.is_assigned() ^ p.reason.is_some());
        }
        // Core 单日上限 1: A 只能让出 20 日
        assert_eq!(out.proposals[0].date, Some(d(21)));
        assert_eq!(out.proposals[1].date, Some(d(20)));
        assert_eq!(out.proposals[2].reason, Some(ReasonCode::NoValidDay));
    }

    #[test]
    fn test_unknown_status_is_run_error() {
        let config = SchedulerConfig::default();
        let (snap, mut sm) = prepared(&config);
        let err = SolverOrchestrator::with_solver(NeverSolves)
            .solve(&mut sm, &snap, &config)
            .unwrap_err();
        assert!(matches!(err, SchedulingError::NoSolution { status: SolveStatus::Unknown }));
    }

    #[test]
    fn test_full_day_and_block_rows_keep_one_of_each_pair() {
        let mut emp = Employee::new("E1", "a", EmployeeRole::EventSpecialist);
        emp.training.specialty_certified = true;
        let day = |n: u32| DateRange::new(d(n), d(n)).unwrap();
        let snap = SnapshotBuilder::new(Horizon::new(d(19), d(25)).unwrap())
            .employee(emp)
            // 20 日: 全天专项与 Core 互斥
            .event(Event::new("SP", EventCategory::Specialty, day(20), 240))
            .event(Event::new("CR", EventCategory::Core, day(20), 60))
            // 21 日: 同一时段只能承接一个
            .event(Event::new("X1", EventCategory::Support, day(21), 60).with_block(2))
            .event(Event::new("X2", EventCategory::Support, day(21), 60).with_block(2))
            .build()
            .unwrap();
        let config = SchedulerConfig::default();
        let elig = EligibilityResolver::new(&snap, d(19)).resolve_all();
        let mut sm = ModelBuilder::new(&snap, &config).build(elig);
        ObjectiveBuilder::new(&snap, &config).build(&mut sm);
        let out = SolverOrchestrator::new().solve(&mut sm, &snap, &config).unwrap();

        let placed = |ids: [&str; 2]| {
            out.proposals
                .iter()
                .filter(|p| ids.contains(&p.event_id.as_str()) && p.is_assigned())
                .count()
        };
        assert_eq!(placed(["SP", "CR"]), 1);
        assert_eq!(placed(["X1", "X2"]), 1);
        assert_eq!(
            out.proposals
                .iter()
                .filter(|p| p.reason == Some(ReasonCode::SolverUnassigned))
                .count(),
            2
        );
    }
}
