// ==========================================
// 排班全流程 E2E 测试
// ==========================================
// 测试目标: SQLite 输入 → 加载 → 资格判定 → 建模求解 → 复核 → 写入待审核表
// 场景:
// 1. 两名员工同时合格 → 负荷较轻者承接; 一人周工时已满 → 另一人承接
// 2. 无合格员工 → NO_ELIGIBLE_EMPLOYEE,且不建变量
// 3. 配对 Core 不可排 → 督导活动同样不排
// ==========================================


use field_scheduler::config::config_keys;
use field_scheduler::logging;
use field_scheduler::repository::ProposalRepository;
use field_scheduler::{
    Algorithm, ConfigManager, EventCategory, ReasonCode, RunOptions, ScheduleOrchestrator,
    SqliteScheduleStore,
};
use test_helpers::{
    core_event, create_test_db, d, insert_test_config, open_test_connection, posted, seed,
    specialist, supervisor, week_horizon,
};

fn cp_options(today: u32) -> RunOptions {
    RunOptions {
        today: Some(d(today)),
        algorithm: Algorithm::Cp,
        ..Default::default()
    }
}

// ==========================================
// 场景 1: 公平性
// ==========================================

#[test]
fn test_lighter_loaded_employee_takes_the_event() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let conn = open_test_connection(&db_path).expect("Failed to open db");

    // E1 本周已有 4 小时,E2 空闲
    seed(
        &conn,
        &[specialist("E1"), specialist("E2")],
        &[core_event("EV", 20, 22, 60)],
        &[posted("P1", "E1", 19, 240, EventCategory::Support)],
    )
    .expect("Failed to seed");

    let config = ConfigManager::from_connection(conn.clone())
        .and_then(|m| m.load_scheduler_config())
        .expect("Failed to load config");
    assert!(config.weights.fairness_weight > 0);

    let orch = ScheduleOrchestrator::new(config);
    let source = SqliteScheduleStore::from_connection(conn.clone());
    let repo = ProposalRepository::from_connection(conn.clone());
    let outcome = orch
        .run_and_persist(&source, &week_horizon(), &cp_options(19), &repo)
        .expect("run failed");

    assert_eq!(outcome.proposals.len(), 1);
    let p = &outcome.proposals[0];
    assert_eq!(p.employee_id.as_ref().map(|e| e.as_str()), Some("E2"));
    // 紧迫度: 取最早可选日
    assert_eq!(p.date, Some(d(20)));

    // 待审核表
    assert_eq!(repo.count_runs().unwrap(), 1);
    assert_eq!(repo.count_proposals().unwrap(), 1);
    let saved = repo.list_proposals(&outcome.run_id).unwrap();
    assert_eq!(saved, outcome.proposals);
    let run = repo.find_run(&outcome.run_id).unwrap().expect("run record missing");
    assert_eq!(run.algorithm, "CP");
    assert_eq!(run.scheduled, 1);
    assert!(run.config_snapshot_json.is_some());
}

#[test]
fn test_employee_at_weekly_cap_is_skipped_regardless_of_fairness() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let conn = open_test_connection(&db_path).expect("Failed to open db");

    // E1 周上限 4 小时且已排满; E2 负荷更重但仍有余量
    let mut e1 = specialist("E1");
    e1.max_weekly_minutes = Some(240);
    seed(
        &conn,
        &[e1, specialist("E2")],
        &[core_event("EV", 20, 22, 60)],
        &[
            posted("P1", "E1", 19, 240, EventCategory::Support),
            posted("P2", "E2", 19, 360, EventCategory::Support),
        ],
    )
    .expect("Failed to seed");
    insert_test_config(&conn, &[(config_keys::WEIGHT_FAIRNESS, "1000")]).expect("Failed to insert config");

    let config = ConfigManager::from_connection(conn.clone())
        .and_then(|m| m.load_scheduler_config())
        .expect("Failed to load config");
    assert_eq!(config.weights.fairness_weight, 1000);

    let orch = ScheduleOrchestrator::new(config);
    let source = SqliteScheduleStore::from_connection(conn.clone());
    let repo = ProposalRepository::from_connection(conn.clone());
    let outcome = orch
        .run_and_persist(&source, &week_horizon(), &cp_options(19), &repo)
        .expect("run failed");

    let p = &outcome.proposals[0];
    assert!(p.is_assigned());
    assert_eq!(p.employee_id.as_ref().map(|e| e.as_str()), Some("E2"));
    assert_eq!(outcome.summary.demoted, 0);
}

// ==========================================
// 场景 2: 无合格员工
// ==========================================

#[test]
fn test_event_without_eligible_employee_gets_reason_and_no_variables() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let conn = open_test_connection(&db_path).expect("Failed to open db");

    // 专项活动需要认证,两名员工都没有
    let specialty = field_scheduler::Event::new(
        "SPX",
        EventCategory::Specialty,
        test_helpers::window(20, 23),
        240,
    );
    seed(&conn, &[specialist("E1"), specialist("E2")], &[specialty], &[]).expect("Failed to seed");

    let orch = ScheduleOrchestrator::new(Default::default());
    let source = SqliteScheduleStore::from_connection(conn.clone());
    let repo = ProposalRepository::from_connection(conn.clone());
    let outcome = orch
        .run_and_persist(&source, &week_horizon(), &cp_options(19), &repo)
        .expect("run failed");

    let p = &outcome.proposals[0];
    assert!(!p.is_assigned());
    assert_eq!(p.reason, Some(ReasonCode::NoEligibleEmployee));
    assert_eq!(outcome.traces[0].eligible_employees, 0);
    assert_eq!(outcome.summary.variable_count, 0);
    assert_eq!(outcome.summary.failed, 1);

    let saved = repo.list_proposals(&outcome.run_id).unwrap();
    assert_eq!(saved[0].reason, Some(ReasonCode::NoEligibleEmployee));
}

// ==========================================
// 场景 3: 配对 Core 不可排
// ==========================================

#[test]
fn test_supervisor_follows_unschedulable_core() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let conn = open_test_connection(&db_path).expect("Failed to open db");

    // Core 窗口在今天之前结束; 督导窗口仍有可选日,且有督导可用
    let core = core_event("CORE", 19, 21, 120);
    let sup = field_scheduler::Event::new(
        "SUP",
        EventCategory::Supervisor,
        test_helpers::window(19, 25),
        30,
    )
    .with_pair("CORE");
    seed(&conn, &[specialist("E1"), supervisor("S1")], &[core, sup], &[]).expect("Failed to seed");

    let orch = ScheduleOrchestrator::new(Default::default());
    let source = SqliteScheduleStore::from_connection(conn.clone());
    let repo = ProposalRepository::from_connection(conn.clone());
    let outcome = orch
        .run_and_persist(&source, &week_horizon(), &cp_options(22), &repo)
        .expect("run failed");

    let by_id = |id: &str| {
        outcome
            .proposals
            .iter()
            .find(|p| p.event_id.as_str() == id)
            .cloned()
            .expect("proposal missing")
    };
    let core = by_id("CORE");
    let sup = by_id("SUP");
    assert_eq!(core.reason, Some(ReasonCode::NoValidDay));
    assert!(!sup.is_assigned());
    assert_eq!(sup.reason, Some(ReasonCode::PairedCoreUnschedulable));
    assert_eq!(outcome.summary.scheduled, 0);
    assert_eq!(repo.count_proposals().unwrap(), 2);
}

#[test]
fn test_greedy_run_is_persisted_with_its_algorithm() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let conn = open_test_connection(&db_path).expect("Failed to open db");
    seed(
        &conn,
        &[specialist("E1")],
        &[core_event("A", 20, 20, 60), core_event("B", 20, 21, 60)],
        &[],
    )
    .expect("Failed to seed");

    let orch = ScheduleOrchestrator::new(Default::default());
    let source = SqliteScheduleStore::from_connection(conn.clone());
    let repo = ProposalRepository::from_connection(conn.clone());
    let options = RunOptions {
        today: Some(d(19)),
        algorithm: Algorithm::Greedy,
        ..Default::default()
    };
    let outcome = orch
        .run_and_persist(&source, &week_horizon(), &options, &repo)
        .expect("run failed");

    assert_eq!(outcome.summary.scheduled, 2);
    let run = repo.find_run(&outcome.run_id).unwrap().expect("run record missing");
    assert_eq!(run.algorithm, "GREEDY");
    assert_eq!(run.status, "FEASIBLE");
}
