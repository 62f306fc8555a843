// ==========================================
// 外勤人员排班系统 - 数据加载器
// ==========================================
// 职责: 一次性读取排班输入,解析为领域类型,构建快照
// 红线: 每张表一条 SELECT,语句数与行数无关
// 红线: 类别/角色/状态字符串在此解析,未知取值立即失败
// ==========================================

use crate::domain::assignment::ExistingAssignment;
use crate::domain::calendar::{
    weekday_from_index, DateRange, Horizon, LockedDay, LockedDayKind, RotationDefault,
    ScheduleException,
};
use crate::domain::employee::{Employee, TrainingFlags};
use crate::domain::event::{Event, PriorPlacement};
use crate::domain::snapshot::{AffinityScores, ScheduleSnapshot, SnapshotBuilder};
use crate::domain::types::{
    EmployeeId, EmployeeRole, EventCategory, EventCondition, EventId,
};
use crate::engine::error::{SchedulingError, SchedulingResult};
use crate::perf::PerfGuard;
use crate::repository::schedule_store::{
    AffinityRow, EmployeeRow, EventRow, ExistingAssignmentRow, ScheduleStore,
};
use chrono::NaiveDate;
use rusqlite::Connection;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tracing::{info, instrument, warn};

// ==========================================
// Trait: ScheduleSource
// ==========================================
// 用途: 编排器只依赖此接口; SQLite 与内存实现可互换
pub trait ScheduleSource {
    /// 加载指定排班周期的输入快照
    fn load_snapshot(&self, horizon: &Horizon) -> SchedulingResult<ScheduleSnapshot>;
}

// ==========================================
// 解析工具
// ==========================================

fn parse_date(entity: &str, id: &str, field: &str, raw: &str) -> SchedulingResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|e| {
        SchedulingError::data_integrity(entity, id, format!("{} 日期格式错误 '{}': {}", field, raw, e))
    })
}

fn parse_range(entity: &str, id: &str, start: &str, end: &str) -> SchedulingResult<DateRange> {
    let s = parse_date(entity, id, "start", start)?;
    let e = parse_date(entity, id, "end", end)?;
    DateRange::new(s, e).ok_or_else(|| {
        SchedulingError::data_integrity(entity, id, format!("日期区间结束早于开始: {} ~ {}", start, end))
    })
}

fn parse_category(entity: &str, id: &str, raw: &str) -> SchedulingResult<EventCategory> {
    EventCategory::parse(raw)
        .ok_or_else(|| SchedulingError::data_integrity(entity, id, format!("未知活动类别: {}", raw)))
}

fn parse_block(entity: &str, id: &str, raw: Option<i64>) -> SchedulingResult<Option<u8>> {
    raw.map(|b| {
        u8::try_from(b)
            .map_err(|_| SchedulingError::data_integrity(entity, id, format!("时段编号越界: {}", b)))
    })
    .transpose()
}

fn parse_minutes(entity: &str, id: &str, raw: i64) -> SchedulingResult<u32> {
    u32::try_from(raw)
        .map_err(|_| SchedulingError::data_integrity(entity, id, format!("时长非法: {}", raw)))
}

fn parse_availability(id: &str, raw: &str) -> SchedulingResult<[bool; 7]> {
    let chars: Vec<char> = raw.trim().chars().collect();
    if chars.len() != 7 {
        return Err(SchedulingError::data_integrity(
            "employee",
            id,
            format!("weekly_availability 必须为 7 位: {}", raw),
        ));
    }
    let mut week = [false; 7];
    for (i, c) in chars.iter().enumerate() {
        week[i] = match c {
            '1' => true,
            '0' => false,
            _ => {
                return Err(SchedulingError::data_integrity(
                    "employee",
                    id,
                    format!("weekly_availability 含非法字符: {}", raw),
                ))
            }
        };
    }
    Ok(week)
}

fn employee_from_row(row: EmployeeRow) -> SchedulingResult<Employee> {
    let role = EmployeeRole::parse(&row.role).ok_or_else(|| {
        SchedulingError::data_integrity("employee", &row.id, format!("未知员工角色: {}", row.role))
    })?;
    let weekly_availability = parse_availability(&row.id, &row.weekly_availability)?;
    let max_weekly_minutes = row
        .max_weekly_minutes
        .map(|m| parse_minutes("employee", &row.id, m))
        .transpose()?;

    Ok(Employee {
        id: EmployeeId::new(row.id),
        name: row.name,
        role,
        training: TrainingFlags {
            specialty_certified: row.specialty_certified,
            supervisor_certified: row.supervisor_certified,
        },
        weekly_availability,
        availability_overrides: BTreeMap::new(),
        time_off: Vec::new(),
        max_weekly_minutes,
        active: row.active,
    })
}

fn event_from_row(row: EventRow) -> SchedulingResult<Event> {
    let id = row.id.as_str();
    let category = parse_category("event", id, &row.category)?;
    let condition = EventCondition::from_db(row.condition.as_deref())
        .map_err(|msg| SchedulingError::data_integrity("event", id, msg))?;
    let window = parse_range("event", id, &row.window_start, &row.window_end)?;
    let duration_minutes = parse_minutes("event", id, row.duration_minutes)?;
    if duration_minutes == 0 {
        return Err(SchedulingError::data_integrity("event", id, "时长必须大于 0"));
    }
    let block = parse_block("event", id, row.block)?;

    let prior = match (row.prior_employee_id, row.prior_date) {
        (Some(emp), Some(date)) => Some(PriorPlacement {
            employee_id: EmployeeId::new(emp),
            date: parse_date("event", id, "prior_date", &date)?,
        }),
        (None, None) => None,
        _ => {
            warn!(event_id = %id, "上次建议只有员工或日期之一,忽略");
            None
        }
    };

    // 参考号缺失 → 活动ID; 名称缺失 → 参考号
    let ref_num = row.ref_num.unwrap_or_else(|| row.id.clone());
    let name = row.name.unwrap_or_else(|| ref_num.clone());

    Ok(Event {
        id: EventId::new(row.id.clone()),
        ref_num,
        name,
        category,
        window,
        duration_minutes,
        block,
        paired_with: row.paired_with.map(EventId::new),
        condition,
        prior,
    })
}

fn existing_from_row(row: ExistingAssignmentRow) -> SchedulingResult<ExistingAssignment> {
    let id = row.id.as_str();
    Ok(ExistingAssignment {
        date: parse_date("existing_assignment", id, "date", &row.date)?,
        duration_minutes: parse_minutes("existing_assignment", id, row.duration_minutes)?,
        category: parse_category("existing_assignment", id, &row.category)?,
        block: parse_block("existing_assignment", id, row.block)?,
        employee_id: EmployeeId::new(row.employee_id),
        event_id: EventId::new(row.event_id),
        id: row.id,
    })
}

fn affinity_from_rows(rows: Vec<AffinityRow>) -> AffinityScores {
    let mut scores = AffinityScores::new();
    for row in rows {
        if !row.score.is_finite() {
            warn!(event_id = %row.event_id, employee_id = %row.employee_id, "亲和度非有限数,忽略");
            continue;
        }
        scores.insert(EventId::new(row.event_id), EmployeeId::new(row.employee_id), row.score);
    }
    scores
}

// ==========================================
// SqliteScheduleStore - SQLite 数据加载器
// ==========================================
pub struct SqliteScheduleStore {
    store: ScheduleStore,
}

impl SqliteScheduleStore {
    pub fn new(store: ScheduleStore) -> Self {
        Self { store }
    }

    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self::new(ScheduleStore::from_connection(conn))
    }
}

impl ScheduleSource for SqliteScheduleStore {
    /// 加载快照
    ///
    /// # 读取范围
    /// - 活动/请假/覆写/例外/锁定日: 排班周期
    /// - 已发布排班: 排班周期所在完整 ISO 周（周工时统计需要）
    /// - 员工/轮值/亲和度: 全量
    #[instrument(skip(self), fields(start = %horizon.start(), end = %horizon.end()))]
    fn load_snapshot(&self, horizon: &Horizon) -> SchedulingResult<ScheduleSnapshot> {
        let _perf = PerfGuard::new("load_snapshot");
        let range = horizon.range;
        let weeks = horizon.covering_weeks();

        // ===== 一次性读取 =====
        let employee_rows = self.store.load_employees()?;
        let time_off_rows = self.store.load_time_off(&range)?;
        let override_rows = self.store.load_availability_overrides(&range)?;
        let event_rows = self.store.load_events(&range)?;
        let existing_rows = self.store.load_existing_assignments(&weeks)?;
        let rotation_rows = self.store.load_rotations()?;
        let exception_rows = self.store.load_schedule_exceptions(&range)?;
        let locked_rows = self.store.load_locked_days(&range)?;
        let affinity_rows = self.store.load_affinity_scores()?;

        // ===== 员工 + 内存关联 =====
        let mut employees = employee_rows
            .into_iter()
            .map(employee_from_row)
            .collect::<SchedulingResult<Vec<_>>>()?;
        let employee_by_id: HashMap<String, usize> = employees
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id.as_str().to_string(), i))
            .collect();

        let mut orphan_rows = 0usize;
        for row in time_off_rows {
            let span = parse_range("employee_time_off", &row.employee_id, &row.start_date, &row.end_date)?;
            match employee_by_id.get(&row.employee_id) {
                Some(&i) => employees[i].time_off.push(span),
                None => orphan_rows += 1,
            }
        }
        for row in override_rows {
            let date = parse_date("employee_availability_override", &row.employee_id, "date", &row.date)?;
            match employee_by_id.get(&row.employee_id) {
                Some(&i) => {
                    employees[i].availability_overrides.insert(date, row.available);
                }
                None => orphan_rows += 1,
            }
        }
        if orphan_rows > 0 {
            warn!(orphan_rows, "存在指向未知员工的可用性记录,已忽略");
        }

        let events = event_rows
            .into_iter()
            .map(event_from_row)
            .collect::<SchedulingResult<Vec<_>>>()?;
        let existing = existing_rows
            .into_iter()
            .map(existing_from_row)
            .collect::<SchedulingResult<Vec<_>>>()?;

        let mut builder = SnapshotBuilder::new(*horizon)
            .employees(employees)
            .events(events)
            .existing_all(existing)
            .affinity(affinity_from_rows(affinity_rows));

        for row in rotation_rows {
            let weekday = weekday_from_index(row.weekday).ok_or_else(|| {
                SchedulingError::data_integrity(
                    "rotation_default",
                    &row.employee_id,
                    format!("星期编号越界: {}", row.weekday),
                )
            })?;
            builder = builder.rotation(RotationDefault {
                weekday,
                category: parse_category("rotation_default", &row.employee_id, &row.category)?,
                employee_id: EmployeeId::new(row.employee_id),
            });
        }
        for row in exception_rows {
            builder = builder.exception(ScheduleException {
                date: parse_date("schedule_exception", &row.employee_id, "date", &row.date)?,
                category: parse_category("schedule_exception", &row.employee_id, &row.category)?,
                employee_id: EmployeeId::new(row.employee_id),
            });
        }
        for row in locked_rows {
            builder = builder.locked_day(LockedDay {
                date: parse_date("locked_day", &row.date, "date", &row.date)?,
                kind: LockedDayKind::from_db(row.kind.as_deref()),
                reason: row.reason,
            });
        }

        let snapshot = builder.build()?;
        info!(
            employees = snapshot.employees.len(),
            events = snapshot.events.len(),
            excluded = snapshot.excluded_events.len(),
            existing = snapshot.existing.len(),
            locked_days = snapshot.locked_days.len(),
            affinity = snapshot.affinity.len(),
            "排班输入加载完成"
        );
        Ok(snapshot)
    }
}

// ==========================================
// InMemorySource - 内存数据源
// ==========================================
// 用途: 测试与对比运行; 按请求的周期重新构建快照
#[derive(Debug, Clone)]
pub struct InMemorySource {
    builder: SnapshotBuilder,
}

impl InMemorySource {
    pub fn new(builder: SnapshotBuilder) -> Self {
        Self { builder }
    }
}

impl ScheduleSource for InMemorySource {
    fn load_snapshot(&self, horizon: &Horizon) -> SchedulingResult<ScheduleSnapshot> {
        Ok(self.builder.clone().with_horizon(*horizon).build()?)
    }
}
