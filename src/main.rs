// ==========================================
// 外勤人员排班系统 - 命令行入口
// ==========================================
// 用法: field-scheduler [db_path] [start] [end] [--compare]
// - 默认周期: 下周一起两周
// - --compare: 约束求解与贪心基线对比,不写入主库
// ==========================================

use anyhow::{anyhow, Context, Result};
use chrono::{Datelike, Duration, NaiveDate};
use field_scheduler::config::ConfigManager;
use field_scheduler::db::{default_db_path, init_schema, open_sqlite_connection, read_schema_version};
use field_scheduler::engine::{
    ComparisonRunner, RunOptions, ScheduleOrchestrator, SqliteScheduleStore,
};
use field_scheduler::repository::ProposalRepository;
use field_scheduler::perf::install_sqlite_tracing;
use field_scheduler::{logging, Horizon};
use std::sync::{Arc, Mutex};
use tracing::info;

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").with_context(|| format!("日期格式应为 YYYY-MM-DD: {}", raw))
}

fn main() -> Result<()> {
    logging::init();
    if let Ok(locale) = std::env::var("FIELD_SCHEDULER_LOCALE") {
        field_scheduler::i18n::set_locale(&locale);
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let compare = args.iter().any(|a| a == "--compare");
    let positional: Vec<&String> = args.iter().filter(|a| !a.starts_with("--")).collect();

    let db_path = positional
        .first()
        .map(|s| s.to_string())
        .unwrap_or_else(default_db_path);

    info!("==================================================");
    info!("{} v{}", field_scheduler::APP_NAME, field_scheduler::VERSION);
    info!("使用数据库: {}", db_path);
    info!("==================================================");

    let mut conn = open_sqlite_connection(&db_path).with_context(|| format!("无法打开数据库: {}", db_path))?;
    install_sqlite_tracing(&mut conn);
    init_schema(&conn).context("建表失败")?;
    info!(schema_version = ?read_schema_version(&conn)?, "数据库已就绪");
    let conn = Arc::new(Mutex::new(conn));

    let config = ConfigManager::from_connection(conn.clone())
        .and_then(|m| m.load_scheduler_config())
        .map_err(|e| anyhow!("加载配置失败: {}", e))?;

    let today = config.today();
    let start = match positional.get(1) {
        Some(raw) => parse_date(raw)?,
        None => today + Duration::days(7 - i64::from(today.weekday().num_days_from_monday())),
    };
    let end = match positional.get(2) {
        Some(raw) => parse_date(raw)?,
        None => start + Duration::days(13),
    };
    let horizon = Horizon::new(start, end).ok_or_else(|| anyhow!("结束日期早于开始日期: {} ~ {}", start, end))?;

    let orchestrator = ScheduleOrchestrator::new(config);
    let source = SqliteScheduleStore::from_connection(conn.clone());

    if compare {
        let report = ComparisonRunner::new(&orchestrator).compare(&source, &horizon, None)?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let repo = ProposalRepository::from_connection(conn);
    let outcome = orchestrator.run_and_persist(&source, &horizon, &RunOptions::default(), &repo)?;
    println!("{}", serde_json::to_string_pretty(&outcome.summary)?);
    info!(run_id = %outcome.run_id, "运行结束");
    Ok(())
}
