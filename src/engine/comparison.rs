// ==========================================
// 外勤人员排班系统 - 算法对比运行
// ==========================================
// 职责: 同一份输入分别用约束求解与贪心基线排班,输出差异
// 隔离: 每个算法使用独立的快照副本和独立的内存 SQLite 会话,
//       待审核写入只落在该会话中,会话结束即丢弃; 不触碰主库
// ==========================================

use crate::db;
use crate::domain::assignment::ProposedAssignment;
use crate::domain::calendar::Horizon;
use crate::domain::types::{EmployeeId, EventId};
use crate::engine::error::{SchedulingError, SchedulingResult};
use crate::engine::loader::ScheduleSource;
use crate::engine::orchestrator::{validate_horizon, Algorithm, RunSummary, ScheduleOrchestrator};
use crate::repository::error::RepositoryError;
use crate::repository::proposal_repo::ProposalRepository;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{info, instrument};

/// 单个活动在两种算法下的差异
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDifference {
    pub event_id: EventId,
    pub cp: Option<(EmployeeId, NaiveDate)>,
    pub greedy: Option<(EmployeeId, NaiveDate)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub cp: RunSummary,
    pub greedy: RunSummary,
    pub cp_proposals: Vec<ProposedAssignment>,
    pub greedy_proposals: Vec<ProposedAssignment>,
    pub differences: Vec<EventDifference>,
}

fn placement(p: &ProposedAssignment) -> Option<(EmployeeId, NaiveDate)> {
    match (&p.employee_id, p.date) {
        (Some(emp), Some(date)) => Some((emp.clone(), date)),
        _ => None,
    }
}

// ==========================================
// ComparisonRunner
// ==========================================
pub struct ComparisonRunner<'a> {
    orchestrator: &'a ScheduleOrchestrator,
}

impl<'a> ComparisonRunner<'a> {
    pub fn new(orchestrator: &'a ScheduleOrchestrator) -> Self {
        Self { orchestrator }
    }

    /// 执行对比
    ///
    /// # 参数
    /// - `today`: None → 按配置时区取当日
    #[instrument(skip(self, source), fields(start = %horizon.start(), end = %horizon.end()))]
    pub fn compare(
        &self,
        source: &dyn ScheduleSource,
        horizon: &Horizon,
        today: Option<NaiveDate>,
    ) -> SchedulingResult<ComparisonReport> {
        let _guard = self.orchestrator.try_begin_run()?;
        let today = today.unwrap_or_else(|| self.orchestrator.config().today());
        validate_horizon(horizon, today)?;
        let snapshot = source.load_snapshot(horizon)?;

        let mut runs = Vec::with_capacity(2);
        for algorithm in [Algorithm::Cp, Algorithm::Greedy] {
            let copy = snapshot.clone();
            // 两种算法各自独立评估,互不计入对方占用
            let outcome = self.orchestrator.execute(&copy, today, algorithm, &[])?;

            // 独立会话: 写入验证后随会话一起丢弃
            let conn = db::open_in_memory_connection().map_err(RepositoryError::from)?;
            db::init_schema(&conn).map_err(RepositoryError::from)?;
            let session = ProposalRepository::from_connection(Arc::new(Mutex::new(conn)));
            let written = self.orchestrator.persist(&outcome, &session)?;
            if written != outcome.proposals.len() {
                return Err(SchedulingError::Config(format!(
                    "对比会话写入条数不一致: {} / {}",
                    written,
                    outcome.proposals.len()
                )));
            }
            runs.push(outcome);
        }

        let greedy = runs.pop();
        let cp = runs.pop();
        let (Some(cp), Some(greedy)) = (cp, greedy) else {
            return Err(SchedulingError::Config("对比运行结果缺失".to_string()));
        };

        let differences: Vec<EventDifference> = cp
            .proposals
            .iter()
            .zip(&greedy.proposals)
            .filter_map(|(a, b)| {
                let (pa, pb) = (placement(a), placement(b));
                (pa != pb).then(|| EventDifference {
                    event_id: a.event_id.clone(),
                    cp: pa,
                    greedy: pb,
                })
            })
            .collect();

        info!(
            cp_scheduled = cp.summary.scheduled,
            greedy_scheduled = greedy.summary.scheduled,
            differences = differences.len(),
            "对比运行完成"
        );

        Ok(ComparisonReport {
            cp: cp.summary,
            greedy: greedy.summary,
            cp_proposals: cp.proposals,
            greedy_proposals: greedy.proposals,
            differences,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use crate::domain::calendar::DateRange;
    use crate::domain::employee::Employee;
    use crate::domain::event::Event;
    use crate::domain::snapshot::SnapshotBuilder;
    use crate::domain::types::{EmployeeRole, EventCategory};
    use crate::engine::loader::InMemorySource;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, day).unwrap()
    }

    #[test]
    fn test_compare_reports_both_algorithms() {
        let horizon = Horizon::new(d(19), d(25)).unwrap();
        let source = InMemorySource::new(
            SnapshotBuilder::new(horizon)
                .employee(Employee::new("E1", "a", EmployeeRole::EventSpecialist))
                .employee(Employee::new("E2", "b", EmployeeRole::EventSpecialist))
                .event(Event::new("A", EventCategory::Core, DateRange::new(d(20), d(21)).unwrap(), 60))
                .event(Event::new("B", EventCategory::Support, DateRange::new(d(20), d(21)).unwrap(), 60)),
        );
        let orch = ScheduleOrchestrator::new(SchedulerConfig::default());
        let report = ComparisonRunner::new(&orch).compare(&source, &horizon, Some(d(19))).unwrap();

        assert_eq!(report.cp.algorithm, Algorithm::Cp);
        assert_eq!(report.greedy.algorithm, Algorithm::Greedy);
        assert_eq!(report.cp.scheduled, 2);
        assert_eq!(report.greedy.scheduled, 2);
        assert_eq!(report.cp_proposals.len(), report.greedy_proposals.len());
    }

    #[test]
    fn test_compare_respects_run_lock() {
        let horizon = Horizon::new(d(19), d(25)).unwrap();
        let source = InMemorySource::new(SnapshotBuilder::new(horizon));
        let orch = ScheduleOrchestrator::new(SchedulerConfig::default());
        let _held = orch.try_begin_run().unwrap();
        let err = ComparisonRunner::new(&orch).compare(&source, &horizon, Some(d(19))).unwrap_err();
        assert!(matches!(err, SchedulingError::RunInProgress));
    }
}
