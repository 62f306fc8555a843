// ==========================================
// 外勤人员排班系统 - 排班输入数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 约束: 每张表一条 SELECT（语句数与行数无关）
// 说明: 返回原始行结构,枚举/日期解析在加载边界完成
// ==========================================

use crate::domain::assignment::ExistingAssignment;
use crate::domain::calendar::{DateRange, LockedDay, RotationDefault, ScheduleException};
use crate::domain::employee::Employee;
use crate::domain::event::Event;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDate;
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex, MutexGuard};

// ==========================================
// 行结构 (Row)
// ==========================================

#[derive(Debug, Clone)]
pub struct EmployeeRow {
    pub id: String,
    pub name: String,
    pub role: String,
    pub specialty_certified: bool,
    pub supervisor_certified: bool,
    pub weekly_availability: String, // 7 位 0/1, 周一起
    pub max_weekly_minutes: Option<i64>,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct TimeOffRow {
    pub employee_id: String,
    pub start_date: String,
    pub end_date: String,
}

#[derive(Debug, Clone)]
pub struct AvailabilityOverrideRow {
    pub employee_id: String,
    pub date: String,
    pub available: bool,
}

#[derive(Debug, Clone)]
pub struct EventRow {
    pub id: String,
    pub ref_num: Option<String>,
    pub name: Option<String>,
    pub category: String,
    pub window_start: String,
    pub window_end: String,
    pub duration_minutes: i64,
    pub block: Option<i64>,
    pub paired_with: Option<String>,
    pub condition: Option<String>,
    pub prior_employee_id: Option<String>,
    pub prior_date: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ExistingAssignmentRow {
    pub id: String,
    pub employee_id: String,
    pub event_id: String,
    pub date: String,
    pub duration_minutes: i64,
    pub category: String,
    pub block: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct RotationRow {
    pub weekday: i64,
    pub category: String,
    pub employee_id: String,
}

#[derive(Debug, Clone)]
pub struct ScheduleExceptionRow {
    pub date: String,
    pub category: String,
    pub employee_id: String,
}

#[derive(Debug, Clone)]
pub struct LockedDayRow {
    pub date: String,
    pub kind: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AffinityRow {
    pub event_id: String,
    pub employee_id: String,
    pub score: f64,
}

fn date_str(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

// ==========================================
// ScheduleStore - 排班输入仓储
// ==========================================

/// 排班输入仓储
/// 职责: 批量读取排班输入表; 提供写入方法用于数据准备
pub struct ScheduleStore {
    conn: Arc<Mutex<Connection>>,
}

impl ScheduleStore {
    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ===== 批量读取 =====

    pub fn load_employees(&self) -> RepositoryResult<Vec<EmployeeRow>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, name, role, specialty_certified, supervisor_certified,
                   weekly_availability, max_weekly_minutes, active
            FROM employee
            ORDER BY id
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(EmployeeRow {
                id: row.get(0)?,
                name: row.get(1)?,
                role: row.get(2)?,
                specialty_certified: row.get::<_, i64>(3)? != 0,
                supervisor_certified: row.get::<_, i64>(4)? != 0,
                weekly_availability: row.get(5)?,
                max_weekly_minutes: row.get(6)?,
                active: row.get::<_, i64>(7)? != 0,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// 与区间相交的请假记录
    pub fn load_time_off(&self, range: &DateRange) -> RepositoryResult<Vec<TimeOffRow>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT employee_id, start_date, end_date
            FROM employee_time_off
            WHERE start_date <= ?2 AND end_date >= ?1
            ORDER BY employee_id, start_date
            "#,
        )?;
        let rows = stmt.query_map(params![date_str(range.start), date_str(range.end)], |row| {
            Ok(TimeOffRow {
                employee_id: row.get(0)?,
                start_date: row.get(1)?,
                end_date: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn load_availability_overrides(
        &self,
        range: &DateRange,
    ) -> RepositoryResult<Vec<AvailabilityOverrideRow>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT employee_id, date, available
            FROM employee_availability_override
            WHERE date BETWEEN ?1 AND ?2
            "#,
        )?;
        let rows = stmt.query_map(params![date_str(range.start), date_str(range.end)], |row| {
            Ok(AvailabilityOverrideRow {
                employee_id: row.get(0)?,
                date: row.get(1)?,
                available: row.get::<_, i64>(2)? != 0,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// 窗口与区间相交的活动（含已取消/已过期,由加载层过滤计数）
    pub fn load_events(&self, range: &DateRange) -> RepositoryResult<Vec<EventRow>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, ref_num, name, category, window_start, window_end,
                   duration_minutes, block, paired_with, condition,
                   prior_employee_id, prior_date
            FROM event
            WHERE window_start <= ?2 AND window_end >= ?1
            ORDER BY window_start, id
            "#,
        )?;
        let rows = stmt.query_map(params![date_str(range.start), date_str(range.end)], |row| {
            Ok(EventRow {
                id: row.get(0)?,
                ref_num: row.get(1)?,
                name: row.get(2)?,
                category: row.get(3)?,
                window_start: row.get(4)?,
                window_end: row.get(5)?,
                duration_minutes: row.get(6)?,
                block: row.get(7)?,
                paired_with: row.get(8)?,
                condition: row.get(9)?,
                prior_employee_id: row.get(10)?,
                prior_date: row.get(11)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn load_existing_assignments(
        &self,
        range: &DateRange,
    ) -> RepositoryResult<Vec<ExistingAssignmentRow>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, employee_id, event_id, date, duration_minutes, category, block
            FROM existing_assignment
            WHERE date BETWEEN ?1 AND ?2
            ORDER BY date, id
            "#,
        )?;
        let rows = stmt.query_map(params![date_str(range.start), date_str(range.end)], |row| {
            Ok(ExistingAssignmentRow {
                id: row.get(0)?,
                employee_id: row.get(1)?,
                event_id: row.get(2)?,
                date: row.get(3)?,
                duration_minutes: row.get(4)?,
                category: row.get(5)?,
                block: row.get(6)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn load_rotations(&self) -> RepositoryResult<Vec<RotationRow>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT weekday, category, employee_id FROM rotation_default ORDER BY weekday, category",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(RotationRow {
                weekday: row.get(0)?,
                category: row.get(1)?,
                employee_id: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn load_schedule_exceptions(
        &self,
        range: &DateRange,
    ) -> RepositoryResult<Vec<ScheduleExceptionRow>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT date, category, employee_id
            FROM schedule_exception
            WHERE date BETWEEN ?1 AND ?2
            "#,
        )?;
        let rows = stmt.query_map(params![date_str(range.start), date_str(range.end)], |row| {
            Ok(ScheduleExceptionRow {
                date: row.get(0)?,
                category: row.get(1)?,
                employee_id: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn load_locked_days(&self, range: &DateRange) -> RepositoryResult<Vec<LockedDayRow>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT date, kind, reason FROM locked_day WHERE date BETWEEN ?1 AND ?2 ORDER BY date",
        )?;
        let rows = stmt.query_map(params![date_str(range.start), date_str(range.end)], |row| {
            Ok(LockedDayRow {
                date: row.get(0)?,
                kind: row.get(1)?,
                reason: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn load_affinity_scores(&self) -> RepositoryResult<Vec<AffinityRow>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT event_id, employee_id, score FROM affinity_score")?;
        let rows = stmt.query_map([], |row| {
            Ok(AffinityRow {
                event_id: row.get(0)?,
                employee_id: row.get(1)?,
                score: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // ===== 写入（数据准备） =====

    /// 写入员工及其请假/覆写记录
    pub fn insert_employee(&self, employee: &Employee) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let availability: String = employee
            .weekly_availability
            .iter()
            .map(|a| if *a { '1' } else { '0' })
            .collect();
        tx.execute(
            r#"
            INSERT INTO employee (id, name, role, specialty_certified, supervisor_certified,
                                  weekly_availability, max_weekly_minutes, active)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                employee.id.as_str(),
                employee.name,
                employee.role.to_db_str(),
                employee.training.specialty_certified as i64,
                employee.training.supervisor_certified as i64,
                availability,
                employee.max_weekly_minutes.map(i64::from),
                employee.active as i64,
            ],
        )?;

        for range in &employee.time_off {
            tx.execute(
                "INSERT INTO employee_time_off (employee_id, start_date, end_date) VALUES (?1, ?2, ?3)",
                params![employee.id.as_str(), date_str(range.start), date_str(range.end)],
            )?;
        }
        for (date, available) in &employee.availability_overrides {
            tx.execute(
                "INSERT INTO employee_availability_override (employee_id, date, available) VALUES (?1, ?2, ?3)",
                params![employee.id.as_str(), date_str(*date), *available as i64],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    pub fn insert_event(&self, event: &Event) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO event (id, ref_num, name, category, window_start, window_end,
                               duration_minutes, block, paired_with, condition,
                               prior_employee_id, prior_date)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                event.id.as_str(),
                event.ref_num,
                event.name,
                event.category.to_db_str(),
                date_str(event.window.start),
                date_str(event.window.end),
                event.duration_minutes as i64,
                event.block.map(i64::from),
                event.paired_with.as_ref().map(|p| p.as_str().to_string()),
                event.condition.to_db_str(),
                event.prior.as_ref().map(|p| p.employee_id.as_str().to_string()),
                event.prior.as_ref().map(|p| date_str(p.date)),
            ],
        )?;
        Ok(())
    }

    pub fn insert_existing_assignment(&self, a: &ExistingAssignment) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO existing_assignment (id, employee_id, event_id, date,
                                             duration_minutes, category, block)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                a.id,
                a.employee_id.as_str(),
                a.event_id.as_str(),
                date_str(a.date),
                a.duration_minutes as i64,
                a.category.to_db_str(),
                a.block.map(i64::from),
            ],
        )?;
        Ok(())
    }

    pub fn insert_rotation(&self, r: &RotationDefault) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO rotation_default (weekday, category, employee_id) VALUES (?1, ?2, ?3)",
            params![
                r.weekday.num_days_from_monday() as i64,
                r.category.to_db_str(),
                r.employee_id.as_str()
            ],
        )?;
        Ok(())
    }

    pub fn insert_schedule_exception(&self, x: &ScheduleException) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO schedule_exception (date, category, employee_id) VALUES (?1, ?2, ?3)",
            params![date_str(x.date), x.category.to_db_str(), x.employee_id.as_str()],
        )?;
        Ok(())
    }

    pub fn insert_locked_day(&self, day: &LockedDay) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO locked_day (date, kind, reason) VALUES (?1, ?2, ?3)",
            params![date_str(day.date), day.kind.to_db_str(), day.reason],
        )?;
        Ok(())
    }

    pub fn insert_affinity(&self, event_id: &str, employee_id: &str, score: f64) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO affinity_score (event_id, employee_id, score) VALUES (?1, ?2, ?3)",
            params![event_id, employee_id, score],
        )?;
        Ok(())
    }

    /// 直接更新活动状态字段（None 写入 NULL）
    pub fn set_event_condition(&self, event_id: &str, condition: Option<&str>) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "UPDATE event SET condition = ?2 WHERE id = ?1",
            params![event_id, condition],
        )?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "event".to_string(),
                id: event_id.to_string(),
            });
        }
        Ok(())
    }
}
