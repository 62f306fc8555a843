// ==========================================
// 外勤人员排班系统 - 排班编排器
// ==========================================
// 用途: 协调一次完整排班运行
// 流程: 加载 → 资格判定 → 建模 → 目标 → 求解 → 复核 → 汇总
// 并发: 同一编排器同时只允许一个运行（运行锁,忙则立即返回错误）
// ==========================================

use crate::config::SchedulerConfig;
use crate::domain::assignment::ProposedAssignment;
use crate::domain::calendar::Horizon;
use crate::domain::snapshot::ScheduleSnapshot;
use crate::domain::types::{EmployeeId, EventCategory, EventId, ReasonCode, SolveStatus};
use crate::engine::eligibility::{Eligibility, EligibilityResolver};
use crate::engine::error::{SchedulingError, SchedulingResult};
use crate::engine::greedy::GreedyScheduler;
use crate::engine::loader::ScheduleSource;
use crate::engine::model_builder::ModelBuilder;
use crate::engine::objective::ObjectiveBuilder;
use crate::engine::review::PostSolveReviewer;
use crate::engine::solver::SolverOrchestrator;
use crate::repository::proposal_repo::{ProposalRepository, ScheduleRunRecord};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Mutex, MutexGuard, TryLockError};
use std::time::Instant;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// 单次运行允许的最长周期（天）
pub const MAX_HORIZON_DAYS: i64 = 84;

// ==========================================
// 运行参数与结果
// ==========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Algorithm {
    #[default]
    Cp,
    Greedy,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Cp => "CP",
            Algorithm::Greedy => "GREEDY",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub today: Option<NaiveDate>, // None → 按配置时区取当日
    pub algorithm: Algorithm,
    pub external: Vec<ProposedAssignment>, // 另一运行的建议,复核时计入占用
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub algorithm: Algorithm,
    pub scheduled: usize,
    pub failed: usize,
    pub excluded: usize,
    pub demoted: usize,
    pub status: SolveStatus,
    pub elapsed_ms: u64,
    pub objective: Option<i64>,
    pub variable_count: usize,
    pub constraint_count: usize,
}

/// 单个活动的决策说明
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventTrace {
    pub event_id: EventId,
    pub category: EventCategory,
    pub eligible_employees: usize,
    pub valid_days: usize,
    pub employee_id: Option<EmployeeId>,
    pub date: Option<NaiveDate>,
    pub reason: Option<ReasonCode>,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleOutcome {
    pub run_id: String,
    pub horizon: Horizon,
    pub today: NaiveDate,
    pub proposals: Vec<ProposedAssignment>,
    pub summary: RunSummary,
    pub traces: Vec<EventTrace>,
}

// ==========================================
// ScheduleOrchestrator - 排班编排器
// ==========================================
pub struct ScheduleOrchestrator {
    config: SchedulerConfig,
    solver: SolverOrchestrator,
    run_lock: Mutex<()>,
}

impl ScheduleOrchestrator {
    /// 创建编排器
    ///
    /// # 参数
    /// - config: 已合并 config_kv 覆写的排班配置
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            solver: SolverOrchestrator::new(),
            run_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// 获取运行锁（不等待）
    pub fn try_begin_run(&self) -> SchedulingResult<MutexGuard<'_, ()>> {
        match self.run_lock.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::WouldBlock) => Err(SchedulingError::RunInProgress),
            Err(TryLockError::Poisoned(poisoned)) => {
                warn!("上一次运行异常退出,运行锁已恢复");
                Ok(poisoned.into_inner())
            }
        }
    }

    /// 执行一次完整排班（不落库）
    pub fn run(
        &self,
        source: &dyn ScheduleSource,
        horizon: &Horizon,
        options: &RunOptions,
    ) -> SchedulingResult<ScheduleOutcome> {
        let _guard = self.try_begin_run()?;
        self.load_and_execute(source, horizon, options)
    }

    /// 执行一次完整排班并写入待审核表
    pub fn run_and_persist(
        &self,
        source: &dyn ScheduleSource,
        horizon: &Horizon,
        options: &RunOptions,
        repo: &ProposalRepository,
    ) -> SchedulingResult<ScheduleOutcome> {
        let _guard = self.try_begin_run()?;
        let outcome = self.load_and_execute(source, horizon, options)?;
        self.persist(&outcome, repo)?;
        Ok(outcome)
    }

    fn load_and_execute(
        &self,
        source: &dyn ScheduleSource,
        horizon: &Horizon,
        options: &RunOptions,
    ) -> SchedulingResult<ScheduleOutcome> {
        let today = options.today.unwrap_or_else(|| self.config.today());
        validate_horizon(horizon, today)?;
        let snapshot = source.load_snapshot(horizon)?;
        self.execute(&snapshot, today, options.algorithm, &options.external)
    }

    /// 在给定快照上执行（调用方持有运行锁）
    ///
    /// # 参数
    /// - `external`: 另一运行在同一快照上的建议; 与之冲突的本次建议在复核中降级
    #[instrument(skip(self, snapshot), fields(
        start = %snapshot.horizon.start(),
        end = %snapshot.horizon.end(),
        events = snapshot.events.len(),
    ))]
    pub(crate) fn execute(
        &self,
        snapshot: &ScheduleSnapshot,
        today: NaiveDate,
        algorithm: Algorithm,
        external: &[ProposedAssignment],
    ) -> SchedulingResult<ScheduleOutcome> {
        let started = Instant::now();
        info!(
            employees = snapshot.employees.len(),
            existing = snapshot.existing.len(),
            %today,
            %algorithm,
            "开始排班运行"
        );

        // ==========================================
        // 步骤1: 资格判定
        // ==========================================
        let eligibility = EligibilityResolver::new(snapshot, today).resolve_all();

        // ==========================================
        // 步骤2-4: 建模 + 目标 + 求解 / 贪心
        // ==========================================
        let (mut proposals, final_eligibility, status, objective, variable_count, constraint_count) =
            match algorithm {
                Algorithm::Cp => {
                    let mut sm = ModelBuilder::new(snapshot, &self.config).build(eligibility.clone());
                    ObjectiveBuilder::new(snapshot, &self.config).build(&mut sm);
                    let solved = self.solver.solve(&mut sm, snapshot, &self.config)?;
                    (
                        solved.proposals,
                        sm.eligibility.clone(),
                        solved.status,
                        solved.objective,
                        sm.variable_count(),
                        sm.constraint_count(),
                    )
                }
                Algorithm::Greedy => {
                    let proposals = GreedyScheduler::new(snapshot, &self.config).schedule(&eligibility);
                    (proposals, eligibility.clone(), SolveStatus::Feasible, None, 0, 0)
                }
            };

        // ==========================================
        // 步骤5: 复核
        // ==========================================
        let review = PostSolveReviewer::new(snapshot, &self.config).review(&mut proposals, external);

        // ==========================================
        // 步骤6: 汇总 + 说明
        // ==========================================
        let traces = build_traces(snapshot, &eligibility, &final_eligibility, &proposals);
        let scheduled = proposals.iter().filter(|p| p.is_assigned()).count();
        let summary = RunSummary {
            algorithm,
            scheduled,
            failed: proposals.len() - scheduled,
            excluded: snapshot.excluded_events.len(),
            demoted: review.demoted.len(),
            status,
            elapsed_ms: started.elapsed().as_millis() as u64,
            objective,
            variable_count,
            constraint_count,
        };

        info!(
            scheduled = summary.scheduled,
            failed = summary.failed,
            excluded = summary.excluded,
            demoted = summary.demoted,
            status = %summary.status,
            elapsed_ms = summary.elapsed_ms,
            "排班运行完成"
        );

        Ok(ScheduleOutcome {
            run_id: Uuid::new_v4().to_string(),
            horizon: snapshot.horizon,
            today,
            proposals,
            summary,
            traces,
        })
    }

    /// 写入运行记录与建议
    pub fn persist(&self, outcome: &ScheduleOutcome, repo: &ProposalRepository) -> SchedulingResult<usize> {
        let config_snapshot_json = match serde_json::to_string(&self.config) {
            Ok(json) => Some(json),
            Err(e) => {
                warn!(error = %e, "配置快照序列化失败");
                None
            }
        };
        let record = ScheduleRunRecord {
            run_id: outcome.run_id.clone(),
            algorithm: outcome.summary.algorithm.as_str().to_string(),
            horizon_start: outcome.horizon.start(),
            horizon_end: outcome.horizon.end(),
            status: outcome.summary.status.to_string(),
            scheduled: outcome.summary.scheduled as i64,
            failed: outcome.summary.failed as i64,
            excluded: outcome.summary.excluded as i64,
            objective: outcome.summary.objective,
            elapsed_ms: outcome.summary.elapsed_ms as i64,
            config_snapshot_json,
            created_at: Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        };
        let written = repo.save_run(&record, &outcome.proposals)?;
        info!(run_id = %record.run_id, written, "排班建议已写入待审核表");
        Ok(written)
    }
}

/// 周期校验: 长度上限,且不能整体早于当日
pub(crate) fn validate_horizon(horizon: &Horizon, today: NaiveDate) -> SchedulingResult<()> {
    let days = horizon.range.num_days();
    if days > MAX_HORIZON_DAYS {
        return Err(SchedulingError::InvalidHorizon(format!(
            "周期 {} 天超过上限 {} 天",
            days, MAX_HORIZON_DAYS
        )));
    }
    if horizon.end() < today {
        return Err(SchedulingError::InvalidHorizon(format!(
            "周期 {} ~ {} 已早于当日 {}",
            horizon.start(),
            horizon.end(),
            today
        )));
    }
    Ok(())
}

fn build_traces(
    snapshot: &ScheduleSnapshot,
    initial: &[Eligibility],
    final_eligibility: &[Eligibility],
    proposals: &[ProposedAssignment],
) -> Vec<EventTrace> {
    snapshot
        .events
        .iter()
        .enumerate()
        .map(|(e, event)| {
            let (eligible_employees, valid_days) = match &initial[e] {
                Eligibility::Schedulable { employees, days } => (employees.len(), days.len()),
                Eligibility::Unschedulable(_) => (0, 0),
            };
            let p = &proposals[e];
            let detail = p.detail.clone().or_else(|| {
                final_eligibility[e]
                    .reason()
                    .filter(|r| p.reason == Some(*r))
                    .map(|r| r.description())
            });
            EventTrace {
                event_id: event.id.clone(),
                category: event.category,
                eligible_employees,
                valid_days,
                employee_id: p.employee_id.clone(),
                date: p.date,
                reason: p.reason,
                detail,
            }
        })
        .collect()
}
