// ==========================================
// 外勤人员排班系统 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 提供排班核心所需表结构（输入表 + 输出表）
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::path::PathBuf;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
///
/// 说明：版本号仅用于提示/告警（不做自动迁移）。
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 默认数据库路径
///
/// 优先 FIELD_SCHEDULER_DB_PATH; 否则使用用户数据目录下的 field-scheduler/field_scheduler.db
pub fn default_db_path() -> String {
    if let Ok(path) = std::env::var("FIELD_SCHEDULER_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./field_scheduler.db");
    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("field-scheduler");
        // 目录创建失败时回退到当前目录
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("field_scheduler.db");
        }
    }
    path.to_string_lossy().to_string()
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 打开内存数据库（对比运行的临时会话使用）
pub fn open_in_memory_connection() -> rusqlite::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 建表（幂等）
///
/// 输入表: employee / employee_time_off / employee_availability_override /
///         event / existing_assignment / rotation_default / schedule_exception /
///         locked_day / affinity_score / config_kv
/// 输出表: schedule_run / proposed_assignment
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);

CREATE TABLE IF NOT EXISTS employee (
    id                   TEXT PRIMARY KEY,
    name                 TEXT NOT NULL,
    role                 TEXT NOT NULL,
    specialty_certified  INTEGER NOT NULL DEFAULT 0,
    supervisor_certified INTEGER NOT NULL DEFAULT 0,
    weekly_availability  TEXT NOT NULL DEFAULT '1111111',
    max_weekly_minutes   INTEGER,
    active               INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS employee_time_off (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    employee_id TEXT NOT NULL,
    start_date  TEXT NOT NULL,
    end_date    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS employee_availability_override (
    employee_id TEXT NOT NULL,
    date        TEXT NOT NULL,
    available   INTEGER NOT NULL,
    PRIMARY KEY (employee_id, date)
);

CREATE TABLE IF NOT EXISTS event (
    id                TEXT PRIMARY KEY,
    ref_num           TEXT,
    name              TEXT,
    category          TEXT NOT NULL,
    window_start      TEXT NOT NULL,
    window_end        TEXT NOT NULL,
    duration_minutes  INTEGER NOT NULL,
    block             INTEGER,
    paired_with       TEXT,
    condition         TEXT,
    prior_employee_id TEXT,
    prior_date        TEXT
);

CREATE TABLE IF NOT EXISTS existing_assignment (
    id               TEXT PRIMARY KEY,
    employee_id      TEXT NOT NULL,
    event_id         TEXT NOT NULL,
    date             TEXT NOT NULL,
    duration_minutes INTEGER NOT NULL,
    category         TEXT NOT NULL,
    block            INTEGER
);
CREATE INDEX IF NOT EXISTS idx_existing_assignment_date ON existing_assignment(date);

CREATE TABLE IF NOT EXISTS rotation_default (
    weekday     INTEGER NOT NULL,
    category    TEXT NOT NULL,
    employee_id TEXT NOT NULL,
    PRIMARY KEY (weekday, category)
);

CREATE TABLE IF NOT EXISTS schedule_exception (
    date        TEXT NOT NULL,
    category    TEXT NOT NULL,
    employee_id TEXT NOT NULL,
    PRIMARY KEY (date, category)
);

CREATE TABLE IF NOT EXISTS locked_day (
    date   TEXT PRIMARY KEY,
    kind   TEXT,
    reason TEXT
);

CREATE TABLE IF NOT EXISTS affinity_score (
    event_id    TEXT NOT NULL,
    employee_id TEXT NOT NULL,
    score       REAL NOT NULL,
    PRIMARY KEY (event_id, employee_id)
);

CREATE TABLE IF NOT EXISTS config_kv (
    scope_id TEXT NOT NULL,
    key      TEXT NOT NULL,
    value    TEXT NOT NULL,
    PRIMARY KEY (scope_id, key)
);

CREATE TABLE IF NOT EXISTS schedule_run (
    run_id               TEXT PRIMARY KEY,
    algorithm            TEXT NOT NULL,
    horizon_start        TEXT NOT NULL,
    horizon_end          TEXT NOT NULL,
    status               TEXT NOT NULL,
    scheduled            INTEGER NOT NULL,
    failed               INTEGER NOT NULL,
    excluded             INTEGER NOT NULL,
    objective            INTEGER,
    elapsed_ms           INTEGER NOT NULL,
    config_snapshot_json TEXT,
    created_at           TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS proposed_assignment (
    run_id      TEXT NOT NULL REFERENCES schedule_run(run_id) ON DELETE CASCADE,
    event_id    TEXT NOT NULL,
    employee_id TEXT,
    date        TEXT,
    reason_code TEXT,
    detail      TEXT,
    PRIMARY KEY (run_id, event_id)
);
"#;
