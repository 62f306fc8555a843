// ==========================================
// 外勤人员排班系统 - 贪心基线排班
// ==========================================
// 职责: 最早窗口优先的逐个填充,作为对比运行的基线算法
// 输入: 快照 + 资格判定结果（与约束模型共用）
// 输出: 与 snapshot.events 一一对应的排班建议
// 红线: 与约束模型相同的硬规则（可用性 / 单日容量 / 周工时 / 配对）
// ==========================================

use crate::config::SchedulerConfig;
use crate::domain::assignment::ProposedAssignment;
use crate::domain::calendar::WeekKey;
use crate::domain::capacity::LoadLedger;
use crate::domain::snapshot::{PairedCoreState, ScheduleSnapshot};
use crate::domain::types::ReasonCode;
use crate::engine::eligibility::Eligibility;
use chrono::NaiveDate;
use tracing::{debug, instrument};

// ==========================================
// GreedyScheduler
// ==========================================
pub struct GreedyScheduler<'a> {
    snapshot: &'a ScheduleSnapshot,
    config: &'a SchedulerConfig,
}

impl<'a> GreedyScheduler<'a> {
    pub fn new(snapshot: &'a ScheduleSnapshot, config: &'a SchedulerConfig) -> Self {
        Self { snapshot, config }
    }

    /// 执行贪心排班
    ///
    /// 规则:
    /// 1) 非督导活动按 (首个可选日, 窗口结束, 活动ID) 排序,督导活动最后处理
    /// 2) 日期升序尝试; 同一日内优先本周已用工时少的员工
    /// 3) 督导活动只能落在其 Core 的最终日期
    ///
    /// # 参数
    /// - `eligibility`: 与 snapshot.events 一一对应
    #[instrument(skip_all, fields(events = eligibility.len()))]
    pub fn schedule(&self, eligibility: &[Eligibility]) -> Vec<ProposedAssignment> {
        let snapshot = self.snapshot;
        let rules = &self.config.capacity;

        let mut ledger = LoadLedger::new();
        for a in &snapshot.existing {
            ledger.record(rules, &a.employee_id, a.date, a.category, a.block, a.duration_minutes);
        }

        let mut out: Vec<ProposedAssignment> = snapshot
            .events
            .iter()
            .zip(eligibility)
            .map(|(ev, elig)| {
                ProposedAssignment::unassigned(
                    ev.id.clone(),
                    elig.reason().unwrap_or(ReasonCode::GreedyNoCapacity),
                )
            })
            .collect();

        let mut order: Vec<usize> = (0..snapshot.events.len())
            .filter(|&i| eligibility[i].is_schedulable())
            .collect();
        order.sort_by_key(|&i| {
            let ev = &snapshot.events[i];
            let first_day = match &eligibility[i] {
                Eligibility::Schedulable { days, .. } => days.first().copied(),
                Eligibility::Unschedulable(_) => None,
            };
            (ev.is_supervisor(), first_day, ev.window.end, ev.id.clone())
        });

        let mut placed = 0usize;
        for e in order {
            let Eligibility::Schedulable { employees, days } = &eligibility[e] else {
                continue;
            };
            let event = &snapshot.events[e];

            // 督导: 限定到 Core 的最终日期
            let mut candidate_days: Vec<NaiveDate> = days.clone();
            if let (Some(core), true) = (&event.paired_with, event.is_supervisor()) {
                if let PairedCoreState::Pending(c) = snapshot.paired_core(core) {
                    match out[c].date.filter(|_| out[c].is_assigned()) {
                        Some(core_day) => candidate_days.retain(|d| *d == core_day),
                        None => {
                            out[e] = ProposedAssignment::unassigned(
                                event.id.clone(),
                                ReasonCode::PairedCoreUnassigned,
                            );
                            continue;
                        }
                    }
                }
            }

            let mut chosen = None;
            'days: for &d in &candidate_days {
                let week = WeekKey::of(d);
                let mut staff: Vec<usize> = employees
                    .iter()
                    .copied()
                    .filter(|&k| snapshot.employees[k].is_available(d))
                    .collect();
                staff.sort_by_key(|&k| (ledger.week_minutes(&snapshot.employees[k].id, week), k));

                for k in staff {
                    let emp = &snapshot.employees[k];
                    let cap = emp.weekly_cap_minutes(self.config.default_weekly_minutes);
                    if ledger
                        .try_record(rules, &emp.id, d, event.category, event.block, event.duration_minutes, cap)
                        .is_ok()
                    {
                        chosen = Some((k, d));
                        break 'days;
                    }
                }
            }

            if let Some((k, d)) = chosen {
                out[e] = ProposedAssignment::assigned(event.id.clone(), snapshot.employees[k].id.clone(), d);
                placed += 1;
            }
        }

        debug!(placed, total = out.len(), "贪心排班完成");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::calendar::{DateRange, Horizon};
    use crate::domain::employee::Employee;
    use crate::domain::event::Event;
    use crate::domain::snapshot::SnapshotBuilder;
    use crate::domain::types::{EmployeeRole, EventCategory};
    use crate::engine::eligibility::EligibilityResolver;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, day).unwrap()
    }

    #[test]
    fn test_greedy_spreads_and_reports_capacity() {
        let snap = SnapshotBuilder::new(Horizon::new(d(19), d(25)).unwrap())
            .employee(Employee::new("E1", "a", EmployeeRole::EventSpecialist))
            .employee(Employee::new("E2", "b", EmployeeRole::EventSpecialist))
            .event(Event::new("A", EventCategory::Core, DateRange::single(d(20)), 60))
            .event(Event::new("B", EventCategory::Core, DateRange::single(d(20)), 60))
            .event(Event::new("C", EventCategory::Core, DateRange::single(d(20)), 60))
            .build()
            .unwrap();
        let config = SchedulerConfig::default();
        let elig = EligibilityResolver::new(&snap, d(19)).resolve_all();
        let out = GreedyScheduler::new(&snap, &config).schedule(&elig);

        assert_eq!(out[0].employee_id.as_ref().map(|e| e.as_str()), Some("E1"));
        assert_eq!(out[1].employee_id.as_ref().map(|e| e.as_str()), Some("E2"));
        assert_eq!(out[2].reason, Some(ReasonCode::GreedyNoCapacity));
    }

    #[test]
    fn test_supervisor_follows_core_day() {
        let snap = SnapshotBuilder::new(Horizon::new(d(19), d(25)).unwrap())
            .employee(Employee::new("E1", "a", EmployeeRole::EventSpecialist))
            .employee(Employee::new("S", "s", EmployeeRole::ClubSupervisor))
            .event(Event::new("CORE", EventCategory::Core, DateRange::new(d(22), d(23)).unwrap(), 60))
            .event(
                Event::new("SUP", EventCategory::Supervisor, DateRange::new(d(19), d(25)).unwrap(), 30)
                    .with_pair("CORE"),
            )
            .build()
            .unwrap();
        let config = SchedulerConfig::default();
        let elig = EligibilityResolver::new(&snap, d(19)).resolve_all();
        let out = GreedyScheduler::new(&snap, &config).schedule(&elig);
        assert_eq!(out[0].date, Some(d(22)));
        assert_eq!(out[1].date, Some(d(22)));
        assert_eq!(out[1].employee_id.as_ref().map(|e| e.as_str()), Some("S"));
    }
}
