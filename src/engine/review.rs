// ==========================================
// 外勤人员排班系统 - 结果复核
// ==========================================
// 职责: 求解后按硬规则逐条复核排班建议
// 输入: 快照 + 建议列表 +（可选）外部建议（对比运行产生）
// 输出: 违规建议降级为未安排（REVIEW_* 原因码）,条目不删除
// ==========================================
// 复核顺序:
// 1. 台账预置: 已发布排班 + 外部建议
// 2. 非督导建议,按 (日期, 活动ID) 依次检查并记入
// 3. 督导建议: 先核对配对 Core 的最终日期,再检查容量
// ==========================================

use crate::config::SchedulerConfig;
use crate::domain::assignment::ProposedAssignment;
use crate::domain::capacity::{LoadLedger, LoadViolation};
use crate::domain::snapshot::{PairedCoreState, ScheduleSnapshot};
use crate::domain::types::{EventId, ReasonCode};
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

/// 容量违规 → 复核原因码
pub fn review_code(violation: LoadViolation) -> ReasonCode {
    match violation {
        LoadViolation::DailyLimit => ReasonCode::ReviewDailyLimit,
        LoadViolation::CategoryLimit => ReasonCode::ReviewCategoryLimit,
        LoadViolation::FullDayConflict => ReasonCode::ReviewFullDayConflict,
        LoadViolation::BlockConflict => ReasonCode::ReviewBlockConflict,
        LoadViolation::WeeklyHours => ReasonCode::ReviewWeeklyHours,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewReport {
    pub checked: usize,
    pub demoted: Vec<(EventId, ReasonCode)>,
}

// ==========================================
// PostSolveReviewer
// ==========================================
pub struct PostSolveReviewer<'a> {
    snapshot: &'a ScheduleSnapshot,
    config: &'a SchedulerConfig,
}

impl<'a> PostSolveReviewer<'a> {
    pub fn new(snapshot: &'a ScheduleSnapshot, config: &'a SchedulerConfig) -> Self {
        Self { snapshot, config }
    }

    /// 复核并就地降级
    ///
    /// # 参数
    /// - `proposals`: 本次建议（就地修改）
    /// - `external`: 同一快照上另一运行的已安排建议,计入占用
    pub fn review(
        &self,
        proposals: &mut [ProposedAssignment],
        external: &[ProposedAssignment],
    ) -> ReviewReport {
        let snapshot = self.snapshot;
        let rules = &self.config.capacity;
        let mut report = ReviewReport::default();

        // ===== 台账预置 =====
        let mut ledger = LoadLedger::new();
        for a in &snapshot.existing {
            ledger.record(rules, &a.employee_id, a.date, a.category, a.block, a.duration_minutes);
        }
        let mut booked: HashSet<EventId> = HashSet::new();
        for p in external.iter().filter(|p| p.is_assigned()) {
            let (Some(emp), Some(date), Some(ev)) = (&p.employee_id, p.date, snapshot.event(&p.event_id))
            else {
                continue;
            };
            ledger.record(rules, emp, date, ev.category, ev.block, ev.duration_minutes);
            booked.insert(p.event_id.clone());
        }

        // ===== 复核顺序 =====
        let index: HashMap<EventId, usize> = proposals
            .iter()
            .enumerate()
            .map(|(i, p)| (p.event_id.clone(), i))
            .collect();
        let mut order: Vec<usize> = (0..proposals.len()).filter(|&i| proposals[i].is_assigned()).collect();
        order.sort_by(|&a, &b| {
            let key = |i: usize| {
                let p = &proposals[i];
                let sup = snapshot.event(&p.event_id).is_some_and(|e| e.is_supervisor());
                (sup, p.date, p.event_id.clone())
            };
            key(a).cmp(&key(b))
        });

        let mut seen: HashSet<EventId> = HashSet::new();
        for i in order {
            report.checked += 1;
            let (event_id, emp, date) = match (&proposals[i].employee_id, proposals[i].date) {
                (Some(emp), Some(date)) => (proposals[i].event_id.clone(), emp.clone(), date),
                _ => continue,
            };

            // 重复安排: 已发布 / 外部已占 / 列表内重复
            if snapshot.posted_date(&event_id).is_some() || booked.contains(&event_id) || !seen.insert(event_id.clone()) {
                demote(proposals, i, ReasonCode::ReviewDoubleBooked, "活动已被安排".to_string(), &mut report);
                continue;
            }

            let Some(event) = snapshot.event(&event_id) else {
                warn!(event_id = %event_id, "复核: 快照中没有该活动,跳过");
                continue;
            };

            // 配对一致性
            if event.is_supervisor() {
                if let Some(core) = &event.paired_with {
                    let core_date = match snapshot.paired_core(core) {
                        PairedCoreState::Pending(_) => index
                            .get(core)
                            .and_then(|&c| proposals[c].date.filter(|_| proposals[c].is_assigned())),
                        PairedCoreState::Posted(d) => Some(d),
                        PairedCoreState::Missing => None,
                    };
                    if core_date != Some(date) {
                        let detail = match core_date {
                            Some(d) => format!("Core {} 安排在 {},督导在 {}", core, d, date),
                            None => format!("Core {} 未安排", core),
                        };
                        demote(proposals, i, ReasonCode::ReviewPairMismatch, detail, &mut report);
                        continue;
                    }
                }
            }

            // 容量
            let cap = snapshot
                .employee(&emp)
                .map(|e| e.weekly_cap_minutes(self.config.default_weekly_minutes))
                .unwrap_or(self.config.default_weekly_minutes);
            if let Err(v) =
                ledger.try_record(rules, &emp, date, event.category, event.block, event.duration_minutes, cap)
            {
                let detail = format!("{}: {} @ {}", v, emp, date);
                demote(proposals, i, review_code(v), detail, &mut report);
            }
        }

        if !report.demoted.is_empty() {
            info!(checked = report.checked, demoted = report.demoted.len(), "复核降级");
        }
        report
    }
}

fn demote(
    proposals: &mut [ProposedAssignment],
    i: usize,
    reason: ReasonCode,
    detail: String,
    report: &mut ReviewReport,
) {
    proposals[i].demote(reason, detail);
    report.demoted.push((proposals[i].event_id.clone(), reason));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::assignment::ExistingAssignment;
    use crate::domain::calendar::{DateRange, Horizon};
    use crate::domain::employee::Employee;
    use crate::domain::event::Event;
    use crate::domain::snapshot::SnapshotBuilder;
    use crate::domain::types::{EmployeeId, EmployeeRole, EventCategory};
    use chrono::NaiveDate;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, day).unwrap()
    }

    fn window() -> DateRange {
        DateRange::new(d(19), d(25)).unwrap()
    }

    fn snapshot() -> ScheduleSnapshot {
        SnapshotBuilder::new(Horizon::new(d(19), d(25)).unwrap())
            .employee(Employee::new("E1", "a", EmployeeRole::LeadEventSpecialist))
            .employee(Employee::new("SUP", "s", EmployeeRole::ClubSupervisor))
            .event(Event::new("C1", EventCategory::Core, window(), 60))
            .event(Event::new("C2", EventCategory::Core, window(), 60))
            .event(Event::new("S1", EventCategory::Supervisor, window(), 30).with_pair("C2"))
            .event(Event::new("X", EventCategory::Support, window(), 60))
            .existing(ExistingAssignment {
                id: "P1".into(),
                employee_id: EmployeeId::new("E1"),
                event_id: EventId::new("POSTED"),
                date: d(22),
                duration_minutes: 60,
                category: EventCategory::Support,
                block: None,
            })
            .build()
            .unwrap()
    }

    fn assign(ev: &str, emp: &str, day: u32) -> ProposedAssignment {
        ProposedAssignment::assigned(EventId::new(ev), EmployeeId::new(emp), d(day))
    }

    #[test]
    fn test_category_violation_demotes_and_keeps_entries() {
        let snap = snapshot();
        let config = SchedulerConfig::default();
        let mut proposals = vec![
            assign("C1", "E1", 20),
            assign("C2", "E1", 20),
            assign("S1", "SUP", 20),
            assign("X", "E1", 21),
        ];
        let report = PostSolveReviewer::new(&snap, &config).review(&mut proposals, &[]);

        assert_eq!(proposals.len(), 4);
        assert!(proposals[0].is_assigned());
        assert_eq!(proposals[1].reason, Some(ReasonCode::ReviewCategoryLimit));
        assert!(proposals[1].detail.is_some());
        // Core 被降级 → 督导随之降级
        assert_eq!(proposals[2].reason, Some(ReasonCode::ReviewPairMismatch));
        assert!(proposals[3].is_assigned());
        assert_eq!(report.demoted.len(), 2);
    }

    #[test]
    fn test_supervisor_on_other_day_is_mismatch() {
        let snap = snapshot();
        let config = SchedulerConfig::default();
        let mut proposals = vec![assign("C2", "E1", 20), assign("S1", "SUP", 21)];
        PostSolveReviewer::new(&snap, &config).review(&mut proposals, &[]);
        assert!(proposals[0].is_assigned());
        assert_eq!(proposals[1].reason, Some(ReasonCode::ReviewPairMismatch));
    }

    #[test]
    fn test_external_proposals_count_as_booked() {
        let snap = snapshot();
        let config = SchedulerConfig::default();
        let external = vec![assign("C1", "E1", 23)];
        let mut proposals = vec![assign("C1", "E1", 24), assign("X", "E1", 22)];
        PostSolveReviewer::new(&snap, &config).review(&mut proposals, &external);
        assert_eq!(proposals[0].reason, Some(ReasonCode::ReviewDoubleBooked));
        // 22 日已有一条 Support 发布排班,Support 上限 2,仍可承接
        assert!(proposals[1].is_assigned());
    }

    #[test]
    fn test_weekly_hours_violation() {
        let snap = snapshot();
        let mut config = SchedulerConfig::default();
        config.default_weekly_minutes = 100;
        let mut proposals = vec![assign("X", "E1", 21)];
        PostSolveReviewer::new(&snap, &config).review(&mut proposals, &[]);
        assert_eq!(proposals[0].reason, Some(ReasonCode::ReviewWeeklyHours));
    }
}
