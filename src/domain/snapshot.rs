// ==========================================
// 外勤人员排班系统 - 排班输入快照
// ==========================================
// 职责: 一次排班运行所需的全部只读输入
// 红线: 快照构建后不可变; 各组件只读,不回写
// 说明: 关联关系在构建时一次性建立索引,后续按索引访问
// ==========================================

use crate::domain::assignment::ExistingAssignment;
use crate::domain::calendar::{Horizon, LockedDay, RotationDefault, ScheduleException};
use crate::domain::employee::Employee;
use crate::domain::event::Event;
use crate::domain::types::{EmployeeId, EventCategory, EventCondition, EventId};
use chrono::{Datelike, NaiveDate, Weekday};
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;

// ==========================================
// SnapshotError - 快照完整性错误
// ==========================================
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("数据完整性错误: {entity} {id}: {message}")]
pub struct SnapshotError {
    pub entity: String,
    pub id: String,
    pub message: String,
}

impl SnapshotError {
    pub fn new(entity: &str, id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            entity: entity.to_string(),
            id: id.into(),
            message: message.into(),
        }
    }
}

// ==========================================
// AffinityScores - 员工-活动亲和度
// ==========================================
// 键: (EventId, EmployeeId); 缺失的数据源 → 空表,目标项省略
#[derive(Debug, Clone, Default)]
pub struct AffinityScores {
    scores: HashMap<(EventId, EmployeeId), f64>,
}

impl AffinityScores {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, event: EventId, employee: EmployeeId, score: f64) {
        self.scores.insert((event, employee), score);
    }

    pub fn get(&self, event: &EventId, employee: &EmployeeId) -> Option<f64> {
        self.scores.get(&(event.clone(), employee.clone())).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EventId, &EmployeeId, f64)> {
        self.scores.iter().map(|((ev, emp), s)| (ev, emp, *s))
    }
}

// ==========================================
// PairedCoreState - 配对 Core 活动的状态
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairedCoreState {
    Pending(usize),     // 本次待排,值为 events 下标
    Posted(NaiveDate),  // 已发布,日期固定
    Missing,            // 不存在 / 已取消 / 已过期
}

// ==========================================
// ScheduleSnapshot - 排班输入快照
// ==========================================
#[derive(Debug, Clone)]
pub struct ScheduleSnapshot {
    pub horizon: Horizon,
    pub employees: Vec<Employee>,
    pub events: Vec<Event>,                              // 待排活动（Active 且未发布）
    pub excluded_events: Vec<(EventId, EventCondition)>, // 已取消/已过期
    pub existing: Vec<ExistingAssignment>,               // 覆盖周期所在完整 ISO 周
    pub rotations: Vec<RotationDefault>,
    pub exceptions: Vec<ScheduleException>,
    pub locked_days: BTreeMap<NaiveDate, LockedDay>,
    pub affinity: AffinityScores,

    // ===== 索引 =====
    event_index: HashMap<EventId, usize>,
    employee_index: HashMap<EmployeeId, usize>,
    posted_dates: HashMap<EventId, NaiveDate>,
    rotation_map: HashMap<(Weekday, EventCategory), EmployeeId>,
    exception_map: HashMap<(NaiveDate, EventCategory), EmployeeId>,
}

impl ScheduleSnapshot {
    pub fn event_idx(&self, id: &EventId) -> Option<usize> {
        self.event_index.get(id).copied()
    }

    pub fn employee_idx(&self, id: &EmployeeId) -> Option<usize> {
        self.employee_index.get(id).copied()
    }

    pub fn event(&self, id: &EventId) -> Option<&Event> {
        self.event_idx(id).map(|i| &self.events[i])
    }

    pub fn employee(&self, id: &EmployeeId) -> Option<&Employee> {
        self.employee_idx(id).map(|i| &self.employees[i])
    }

    pub fn is_locked(&self, date: NaiveDate) -> bool {
        self.locked_days.contains_key(&date)
    }

    /// 已发布活动的日期
    pub fn posted_date(&self, id: &EventId) -> Option<NaiveDate> {
        self.posted_dates.get(id).copied()
    }

    /// 督导活动所配对 Core 活动的状态
    pub fn paired_core(&self, core: &EventId) -> PairedCoreState {
        if let Some(idx) = self.event_idx(core) {
            return PairedCoreState::Pending(idx);
        }
        match self.posted_date(core) {
            Some(date) => PairedCoreState::Posted(date),
            None => PairedCoreState::Missing,
        }
    }

    /// 某日某类别的轮值人选
    ///
    /// 按日期例外优先,其次周内默认
    pub fn rotation_for(&self, date: NaiveDate, category: EventCategory) -> Option<&EmployeeId> {
        self.exception_map
            .get(&(date, category))
            .or_else(|| self.rotation_map.get(&(date.weekday(), category)))
    }
}

// ==========================================
// SnapshotBuilder - 快照构建器
// ==========================================
// 用途: DataLoader 与测试/对比运行共用
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    horizon: Horizon,
    employees: Vec<Employee>,
    events: Vec<Event>,
    existing: Vec<ExistingAssignment>,
    rotations: Vec<RotationDefault>,
    exceptions: Vec<ScheduleException>,
    locked_days: Vec<LockedDay>,
    affinity: AffinityScores,
}

impl SnapshotBuilder {
    pub fn new(horizon: Horizon) -> Self {
        Self {
            horizon,
            employees: Vec::new(),
            events: Vec::new(),
            existing: Vec::new(),
            rotations: Vec::new(),
            exceptions: Vec::new(),
            locked_days: Vec::new(),
            affinity: AffinityScores::new(),
        }
    }

    /// 替换排班周期（同一份输入按不同周期构建）
    pub fn with_horizon(mut self, horizon: Horizon) -> Self {
        self.horizon = horizon;
        self
    }

    pub fn employee(mut self, employee: Employee) -> Self {
        self.employees.push(employee);
        self
    }

    pub fn employees(mut self, employees: impl IntoIterator<Item = Employee>) -> Self {
        self.employees.extend(employees);
        self
    }

    pub fn event(mut self, event: Event) -> Self {
        self.events.push(event);
        self
    }

    pub fn events(mut self, events: impl IntoIterator<Item = Event>) -> Self {
        self.events.extend(events);
        self
    }

    pub fn existing(mut self, assignment: ExistingAssignment) -> Self {
        self.existing.push(assignment);
        self
    }

    pub fn existing_all(mut self, items: impl IntoIterator<Item = ExistingAssignment>) -> Self {
        self.existing.extend(items);
        self
    }

    pub fn rotation(mut self, rotation: RotationDefault) -> Self {
        self.rotations.push(rotation);
        self
    }

    pub fn exception(mut self, exception: ScheduleException) -> Self {
        self.exceptions.push(exception);
        self
    }

    pub fn locked_day(mut self, day: LockedDay) -> Self {
        self.locked_days.push(day);
        self
    }

    pub fn affinity(mut self, affinity: AffinityScores) -> Self {
        self.affinity = affinity;
        self
    }

    /// 构建快照
    ///
    /// # 处理规则
    /// 1. 员工/活动 ID 重复 → 数据完整性错误
    /// 2. 已取消/已过期活动移入 excluded_events
    /// 3. 已有发布排班的活动不再参与排班,记录其发布日期
    /// 4. 发布排班只保留覆盖周期所在完整 ISO 周内的记录
    pub fn build(self) -> Result<ScheduleSnapshot, SnapshotError> {
        let mut employee_index = HashMap::with_capacity(self.employees.len());
        for (i, emp) in self.employees.iter().enumerate() {
            if employee_index.insert(emp.id.clone(), i).is_some() {
                return Err(SnapshotError::new("employee", emp.id.as_str(), "员工 ID 重复"));
            }
        }

        let mut posted_dates = HashMap::new();
        for a in &self.existing {
            posted_dates.entry(a.event_id.clone()).or_insert(a.date);
        }

        let mut seen = HashSet::with_capacity(self.events.len());
        let mut events = Vec::with_capacity(self.events.len());
        let mut excluded_events = Vec::new();
        for ev in self.events {
            if !seen.insert(ev.id.clone()) {
                return Err(SnapshotError::new("event", ev.id.as_str(), "活动 ID 重复"));
            }
            if !ev.condition.is_schedulable() {
                excluded_events.push((ev.id.clone(), ev.condition));
                continue;
            }
            if posted_dates.contains_key(&ev.id) {
                continue;
            }
            events.push(ev);
        }

        let event_index: HashMap<EventId, usize> = events
            .iter()
            .enumerate()
            .map(|(i, ev)| (ev.id.clone(), i))
            .collect();

        let weeks = self.horizon.covering_weeks();
        let existing: Vec<ExistingAssignment> = self
            .existing
            .into_iter()
            .filter(|a| weeks.contains(a.date))
            .collect();

        let rotation_map = self
            .rotations
            .iter()
            .map(|r| ((r.weekday, r.category), r.employee_id.clone()))
            .collect();
        let exception_map = self
            .exceptions
            .iter()
            .map(|x| ((x.date, x.category), x.employee_id.clone()))
            .collect();

        let locked_days = self
            .locked_days
            .into_iter()
            .map(|d| (d.date, d))
            .collect();

        Ok(ScheduleSnapshot {
            horizon: self.horizon,
            employees: self.employees,
            events,
            excluded_events,
            existing,
            rotations: self.rotations,
            exceptions: self.exceptions,
            locked_days,
            affinity: self.affinity,
            event_index,
            employee_index,
            posted_dates,
            rotation_map,
            exception_map,
        })
    }
}
