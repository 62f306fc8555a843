// ==========================================
// 外勤人员排班系统 - 资格判定引擎
// ==========================================
// 职责: 判定每个活动的可选员工集合与可选日期集合
// 输入: 排班快照 + 当日日期
// 输出: Eligibility（可排 / 不可排 + 原因码）
// ==========================================
// 说明:
// - 员工按能力键（角色 + 认证）分组,每个类别的合格集合只计算一次
// - 可选日期按活动缓存; 督导活动直接复用所配对 Core 活动的缓存结果
// ==========================================

use crate::domain::employee::{Employee, TrainingFlags};
use crate::domain::snapshot::{PairedCoreState, ScheduleSnapshot};
use crate::domain::types::{EmployeeRole, EventCategory, ReasonCode};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

// ==========================================
// Eligibility - 单个活动的判定结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    /// 员工/日期均为快照下标/日期,升序
    Schedulable {
        employees: Vec<usize>,
        days: Vec<NaiveDate>,
    },
    Unschedulable(ReasonCode),
}

impl Eligibility {
    pub fn is_schedulable(&self) -> bool {
        matches!(self, Eligibility::Schedulable { .. })
    }

    pub fn reason(&self) -> Option<ReasonCode> {
        match self {
            Eligibility::Unschedulable(r) => Some(*r),
            Eligibility::Schedulable { .. } => None,
        }
    }
}

/// 类别准入规则
///
/// - Core: 任意在职员工
/// - Supervisor: 门店督导,或持督导认证的组长
/// - Specialty: 持专项认证
/// - Support: 活动专员 / 组长 / 专项操作员
pub fn role_qualifies(role: EmployeeRole, training: TrainingFlags, category: EventCategory) -> bool {
    match category {
        EventCategory::Core => true,
        EventCategory::Supervisor => {
            role == EmployeeRole::ClubSupervisor
                || (role == EmployeeRole::LeadEventSpecialist && training.supervisor_certified)
        }
        EventCategory::Specialty => training.specialty_certified,
        EventCategory::Support => matches!(
            role,
            EmployeeRole::EventSpecialist | EmployeeRole::LeadEventSpecialist | EmployeeRole::Juicer
        ),
    }
}

// ==========================================
// EligibilityResolver - 资格判定器
// ==========================================
pub struct EligibilityResolver<'a> {
    snapshot: &'a ScheduleSnapshot,
    today: NaiveDate,
    by_category: HashMap<EventCategory, Vec<usize>>,
    capability_groups: usize,
    own_days: HashMap<usize, Vec<NaiveDate>>,
    results: Vec<Option<Eligibility>>,
    cache_hits: usize,
}

impl<'a> EligibilityResolver<'a> {
    pub fn new(snapshot: &'a ScheduleSnapshot, today: NaiveDate) -> Self {
        // 能力键分组（停用员工不参与）
        let mut groups: BTreeMap<(EmployeeRole, TrainingFlags), Vec<usize>> = BTreeMap::new();
        for (i, emp) in snapshot.employees.iter().enumerate() {
            if emp.active {
                groups.entry(emp.capability_key()).or_default().push(i);
            }
        }

        let by_category = EventCategory::ALL
            .iter()
            .map(|&cat| {
                let mut members: Vec<usize> = groups
                    .iter()
                    .filter(|((role, training), _)| role_qualifies(*role, *training, cat))
                    .flat_map(|(_, idx)| idx.iter().copied())
                    .collect();
                members.sort_unstable();
                (cat, members)
            })
            .collect();

        Self {
            snapshot,
            today,
            by_category,
            capability_groups: groups.len(),
            own_days: HashMap::new(),
            results: vec![None; snapshot.events.len()],
            cache_hits: 0,
        }
    }

    pub fn capability_groups(&self) -> usize {
        self.capability_groups
    }

    /// 可选日期缓存命中次数
    pub fn cache_hits(&self) -> usize {
        self.cache_hits
    }

    pub fn eligible_for(&self, category: EventCategory) -> &[usize] {
        self.by_category
            .get(&category)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// 员工 k 在日期 d 是否可出勤（周模板 + 按日覆写 + 请假）
    pub fn is_available(&self, employee: usize, date: NaiveDate) -> bool {
        self.snapshot
            .employees
            .get(employee)
            .map(|e: &Employee| e.is_available(date))
            .unwrap_or(false)
    }

    /// 活动自身的可选日期: 窗口 ∩ 周期 ∩ [today, ∞) − 锁定日
    fn own_valid_days(&mut self, event_idx: usize) -> Vec<NaiveDate> {
        if let Some(days) = self.own_days.get(&event_idx) {
            self.cache_hits += 1;
            return days.clone();
        }
        let event = &self.snapshot.events[event_idx];
        let days: Vec<NaiveDate> = match event.window.intersect(&self.snapshot.horizon.range) {
            Some(range) => range
                .days()
                .filter(|d| *d >= self.today && !self.snapshot.is_locked(*d))
                .collect(),
            None => Vec::new(),
        };
        self.own_days.insert(event_idx, days.clone());
        days
    }

    /// 判定单个活动（结果缓存）
    pub fn resolve(&mut self, event_idx: usize) -> Eligibility {
        if let Some(done) = &self.results[event_idx] {
            return done.clone();
        }
        let result = self.compute(event_idx);
        self.results[event_idx] = Some(result.clone());
        result
    }

    fn compute(&mut self, event_idx: usize) -> Eligibility {
        let snapshot = self.snapshot;
        let event = &snapshot.events[event_idx];

        let days = match (&event.paired_with, event.is_supervisor()) {
            (Some(core_id), true) => match snapshot.paired_core(core_id) {
                PairedCoreState::Pending(core_idx) if core_idx != event_idx => {
                    if !self.resolve(core_idx).is_schedulable() {
                        return Eligibility::Unschedulable(ReasonCode::PairedCoreUnschedulable);
                    }
                    self.own_valid_days(core_idx)
                }
                PairedCoreState::Pending(_) => {
                    return Eligibility::Unschedulable(ReasonCode::PairedCoreMissing)
                }
                PairedCoreState::Posted(date) => {
                    if snapshot.horizon.contains(date) && date >= self.today && !snapshot.is_locked(date) {
                        vec![date]
                    } else {
                        Vec::new()
                    }
                }
                PairedCoreState::Missing => {
                    return Eligibility::Unschedulable(ReasonCode::PairedCoreMissing)
                }
            },
            _ => self.own_valid_days(event_idx),
        };

        if days.is_empty() {
            return Eligibility::Unschedulable(ReasonCode::NoValidDay);
        }

        let employees = self.eligible_for(event.category).to_vec();
        if employees.is_empty() {
            return Eligibility::Unschedulable(ReasonCode::NoEligibleEmployee);
        }

        Eligibility::Schedulable { employees, days }
    }

    /// 判定全部活动,结果与 snapshot.events 一一对应
    pub fn resolve_all(&mut self) -> Vec<Eligibility> {
        let out: Vec<Eligibility> = (0..self.snapshot.events.len())
            .map(|i| self.resolve(i))
            .collect();
        debug!(
            events = out.len(),
            schedulable = out.iter().filter(|e| e.is_schedulable()).count(),
            capability_groups = self.capability_groups,
            cache_hits = self.cache_hits,
            "资格判定完成"
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::calendar::{DateRange, Horizon, LockedDay, LockedDayKind};
    use crate::domain::event::Event;
    use crate::domain::snapshot::SnapshotBuilder;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, day).unwrap()
    }

    fn window(a: u32, b: u32) -> DateRange {
        DateRange::new(d(a), d(b)).unwrap()
    }

    fn staff() -> Vec<Employee> {
        let mut lead = Employee::new("LEAD", "组长", EmployeeRole::LeadEventSpecialist);
        lead.training.supervisor_certified = true;
        let mut juicer = Employee::new("JUICE", "操作员", EmployeeRole::Juicer);
        juicer.training.specialty_certified = true;
        let mut gone = Employee::new("GONE", "离职", EmployeeRole::ClubSupervisor);
        gone.active = false;
        vec![
            Employee::new("ES", "专员", EmployeeRole::EventSpecialist),
            lead,
            juicer,
            gone,
        ]
    }

    fn snapshot(builder: SnapshotBuilder) -> ScheduleSnapshot {
        builder.employees(staff()).build().unwrap()
    }

    #[test]
    fn test_category_rules() {
        let snap = snapshot(SnapshotBuilder::new(Horizon::new(d(19), d(25)).unwrap()));
        let r = EligibilityResolver::new(&snap, d(19));
        assert_eq!(r.eligible_for(EventCategory::Core), &[0, 1, 2]);
        assert_eq!(r.eligible_for(EventCategory::Supervisor), &[1]);
        assert_eq!(r.eligible_for(EventCategory::Specialty), &[2]);
        assert_eq!(r.eligible_for(EventCategory::Support), &[0, 1, 2]);
        assert_eq!(r.capability_groups(), 3);
    }

    #[test]
    fn test_valid_days_exclude_past_and_locked() {
        let snap = snapshot(
            SnapshotBuilder::new(Horizon::new(d(19), d(25)).unwrap())
                .event(Event::new("A", EventCategory::Core, window(15, 22), 60))
                .locked_day(LockedDay {
                    date: d(21),
                    kind: LockedDayKind::Holiday,
                    reason: None,
                }),
        );
        let mut r = EligibilityResolver::new(&snap, d(20));
        match r.resolve(0) {
            Eligibility::Schedulable { days, .. } => assert_eq!(days, vec![d(20), d(22)]),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_window_fully_past_is_no_valid_day() {
        let snap = snapshot(
            SnapshotBuilder::new(Horizon::new(d(19), d(25)).unwrap())
                .event(Event::new("A", EventCategory::Core, window(19, 20), 60)),
        );
        let mut r = EligibilityResolver::new(&snap, d(23));
        assert_eq!(r.resolve(0), Eligibility::Unschedulable(ReasonCode::NoValidDay));
    }

    #[test]
    fn test_supervisor_reuses_core_days() {
        let snap = snapshot(
            SnapshotBuilder::new(Horizon::new(d(19), d(25)).unwrap())
                .event(Event::new("CORE", EventCategory::Core, window(21, 22), 60))
                .event(Event::new("SUP", EventCategory::Supervisor, window(19, 25), 30).with_pair("CORE")),
        );
        let mut r = EligibilityResolver::new(&snap, d(19));
        let all = r.resolve_all();
        match &all[1] {
            Eligibility::Schedulable { days, employees } => {
                assert_eq!(days, &vec![d(21), d(22)]);
                assert_eq!(employees, &vec![1]);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(r.cache_hits() >= 1);
    }

    #[test]
    fn test_supervisor_reasons() {
        let snap = snapshot(
            SnapshotBuilder::new(Horizon::new(d(19), d(25)).unwrap())
                .event(Event::new("CORE", EventCategory::Core, window(10, 12), 60))
                .event(Event::new("S1", EventCategory::Supervisor, window(19, 25), 30).with_pair("CORE"))
                .event(Event::new("S2", EventCategory::Supervisor, window(19, 25), 30).with_pair("NOPE")),
        );
        let mut r = EligibilityResolver::new(&snap, d(19));
        let all = r.resolve_all();
        assert_eq!(all[0], Eligibility::Unschedulable(ReasonCode::NoValidDay));
        assert_eq!(all[1], Eligibility::Unschedulable(ReasonCode::PairedCoreUnschedulable));
        assert_eq!(all[2], Eligibility::Unschedulable(ReasonCode::PairedCoreMissing));
    }

    #[test]
    fn test_no_eligible_employee() {
        let snap = SnapshotBuilder::new(Horizon::new(d(19), d(25)).unwrap())
            .employee(Employee::new("ES", "专员", EmployeeRole::EventSpecialist))
            .event(Event::new("SP", EventCategory::Specialty, window(19, 25), 480))
            .build()
            .unwrap();
        let mut r = EligibilityResolver::new(&snap, d(19));
        assert_eq!(r.resolve(0), Eligibility::Unschedulable(ReasonCode::NoEligibleEmployee));
    }
}
