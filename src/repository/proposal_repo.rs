// ==========================================
// 外勤人员排班系统 - 排班建议仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 职责: schedule_run / proposed_assignment 表读写
// 说明: 建议写入待审核表,不直接生效
// ==========================================

use crate::domain::assignment::ProposedAssignment;
use crate::domain::types::{EmployeeId, EventId, ReasonCode};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

// ==========================================
// ScheduleRunRecord - 排班运行记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRunRecord {
    pub run_id: String,
    pub algorithm: String, // CP / GREEDY
    pub horizon_start: NaiveDate,
    pub horizon_end: NaiveDate,
    pub status: String,
    pub scheduled: i64,
    pub failed: i64,
    pub excluded: i64,
    pub objective: Option<i64>,
    pub elapsed_ms: i64,
    pub config_snapshot_json: Option<String>,
    pub created_at: String,
}

/// 排班建议仓储
pub struct ProposalRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ProposalRepository {
    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 保存一次运行及其全部建议（单事务）
    ///
    /// # 返回
    /// - Ok(usize): 写入的建议条数
    pub fn save_run(
        &self,
        run: &ScheduleRunRecord,
        proposals: &[ProposedAssignment],
    ) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        tx.execute(
            r#"
            INSERT INTO schedule_run (run_id, algorithm, horizon_start, horizon_end, status,
                                      scheduled, failed, excluded, objective, elapsed_ms,
                                      config_snapshot_json, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                run.run_id,
                run.algorithm,
                run.horizon_start.format("%Y-%m-%d").to_string(),
                run.horizon_end.format("%Y-%m-%d").to_string(),
                run.status,
                run.scheduled,
                run.failed,
                run.excluded,
                run.objective,
                run.elapsed_ms,
                run.config_snapshot_json,
                run.created_at,
            ],
        )?;

        let mut count = 0;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO proposed_assignment (run_id, event_id, employee_id, date, reason_code, detail)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )?;
            for p in proposals {
                count += stmt.execute(params![
                    run.run_id,
                    p.event_id.as_str(),
                    p.employee_id.as_ref().map(|e| e.as_str().to_string()),
                    p.date.map(|d| d.format("%Y-%m-%d").to_string()),
                    p.reason.map(|r| r.as_str()),
                    p.detail,
                ])?;
            }
        }

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(count)
    }

    pub fn find_run(&self, run_id: &str) -> RepositoryResult<Option<ScheduleRunRecord>> {
        let conn = self.get_conn()?;
        let run = conn
            .query_row(
                r#"
                SELECT run_id, algorithm, horizon_start, horizon_end, status, scheduled,
                       failed, excluded, objective, elapsed_ms, config_snapshot_json, created_at
                FROM schedule_run
                WHERE run_id = ?1
                "#,
                params![run_id],
                |row| {
                    Ok((
                        ScheduleRunRecord {
                            run_id: row.get(0)?,
                            algorithm: row.get(1)?,
                            horizon_start: NaiveDate::MIN,
                            horizon_end: NaiveDate::MIN,
                            status: row.get(4)?,
                            scheduled: row.get(5)?,
                            failed: row.get(6)?,
                            excluded: row.get(7)?,
                            objective: row.get(8)?,
                            elapsed_ms: row.get(9)?,
                            config_snapshot_json: row.get(10)?,
                            created_at: row.get(11)?,
                        },
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        match run {
            None => Ok(None),
            Some((mut record, start, end)) => {
                record.horizon_start = parse_date("horizon_start", &start)?;
                record.horizon_end = parse_date("horizon_end", &end)?;
                Ok(Some(record))
            }
        }
    }

    /// 查询某次运行的全部建议（按活动 ID 排序）
    pub fn list_proposals(&self, run_id: &str) -> RepositoryResult<Vec<ProposedAssignment>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT event_id, employee_id, date, reason_code, detail
            FROM proposed_assignment
            WHERE run_id = ?1
            ORDER BY event_id
            "#,
        )?;
        let raw = stmt
            .query_map(params![run_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(event_id, employee_id, date, reason, detail)| {
                let date = date.map(|d| parse_date("date", &d)).transpose()?;
                let reason = match reason {
                    None => None,
                    Some(code) => Some(ReasonCode::parse(&code).ok_or_else(|| {
                        RepositoryError::FieldValueError {
                            field: "reason_code".to_string(),
                            message: format!("未知原因码: {}", code),
                        }
                    })?),
                };
                Ok(ProposedAssignment {
                    event_id: EventId::new(event_id),
                    employee_id: employee_id.map(EmployeeId::new),
                    date,
                    reason,
                    detail,
                })
            })
            .collect()
    }

    pub fn count_runs(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM schedule_run", [], |row| row.get(0))?)
    }

    pub fn count_proposals(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM proposed_assignment", [], |row| row.get(0))?)
    }
}

fn parse_date(field: &str, raw: &str) -> RepositoryResult<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| RepositoryError::FieldValueError {
        field: field.to_string(),
        message: format!("{}: {}", raw, e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> ProposalRepository {
        let conn = crate::db::open_in_memory_connection().unwrap();
        crate::db::init_schema(&conn).unwrap();
        ProposalRepository::from_connection(Arc::new(Mutex::new(conn)))
    }

    fn record(run_id: &str) -> ScheduleRunRecord {
        ScheduleRunRecord {
            run_id: run_id.to_string(),
            algorithm: "CP".to_string(),
            horizon_start: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
            horizon_end: NaiveDate::from_ymd_opt(2026, 10, 25).unwrap(),
            status: "OPTIMAL".to_string(),
            scheduled: 1,
            failed: 1,
            excluded: 0,
            objective: Some(-10_000),
            elapsed_ms: 12,
            config_snapshot_json: None,
            created_at: "2026-10-18T00:00:00".to_string(),
        }
    }

    #[test]
    fn test_save_and_list() {
        let r = repo();
        let day = NaiveDate::from_ymd_opt(2026, 10, 20).unwrap();
        let proposals = vec![
            ProposedAssignment::assigned(EventId::new("B"), EmployeeId::new("E1"), day),
            ProposedAssignment::unassigned(EventId::new("A"), ReasonCode::NoValidDay),
        ];
        assert_eq!(r.save_run(&record("run-1"), &proposals).unwrap(), 2);

        let listed = r.list_proposals("run-1").unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].event_id.as_str(), "A");
        assert_eq!(listed[0].reason, Some(ReasonCode::NoValidDay));
        assert_eq!(listed[1].date, Some(day));

        let run = r.find_run("run-1").unwrap().unwrap();
        assert_eq!(run.horizon_end, NaiveDate::from_ymd_opt(2026, 10, 25).unwrap());
        assert!(r.find_run("nope").unwrap().is_none());
        assert_eq!(r.count_runs().unwrap(), 1);
    }

    #[test]
    fn test_duplicate_run_rolls_back() {
        let r = repo();
        r.save_run(&record("run-1"), &[]).unwrap();
        assert!(r.save_run(&record("run-1"), &[]).is_err());
        assert_eq!(r.count_runs().unwrap(), 1);
        assert_eq!(r.count_proposals().unwrap(), 0);
    }
}
