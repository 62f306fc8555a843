// ==========================================
// 排班结果性质测试
// ==========================================
// 测试目标:
// - 周工时: 已发布 + 新建议 ≤ 周上限
// - 每个可排活动: 恰好一个 (员工, 日期),或一个原因码
// - 督导活动与其 Core 同日
// - 同一快照重复求解,目标值一致
// - 公平性: 可承接活动更多的员工不因此分担更多负荷
// - 指示变量在不同约束/目标项间共享
// ==========================================


use field_scheduler::domain::calendar::WeekKey;
use field_scheduler::engine::{
    EligibilityResolver, IndicatorKey, InMemorySource, ModelBuilder, ObjectiveBuilder,
};
use field_scheduler::{
    Algorithm, Employee, EmployeeId, EmployeeRole, EventCategory, RunOptions, ScheduleOrchestrator, SchedulerConfig,
    SnapshotBuilder,
};
use std::collections::HashMap;
use test_helpers::{core_event, d, posted, specialist, supervisor, week_horizon, window};

fn options(algorithm: Algorithm) -> RunOptions {
    RunOptions {
        today: Some(d(19)),
        algorithm,
        ..Default::default()
    }
}

fn fast_config() -> SchedulerConfig {
    let mut config = SchedulerConfig::default();
    config.time_limit_ms = 5_000;
    config
}

/// 三名员工,周上限 10 小时,部分已有排班; 活动总量超出容量
fn crowded_builder() -> SnapshotBuilder {
    let mut e1 = specialist("E1");
    e1.max_weekly_minutes = Some(600);
    let mut e2 = specialist("E2");
    e2.max_weekly_minutes = Some(600);
    let mut e3 = specialist("E3");
    e3.max_weekly_minutes = Some(600);

    let mut builder = SnapshotBuilder::new(week_horizon())
        .employees([e1, e2, e3])
        .existing(posted("P1", "E1", 19, 300, EventCategory::Support))
        .existing(posted("P2", "E3", 23, 120, EventCategory::Support));
    for n in 0..8 {
        let start = 20 + (n % 3);
        builder = builder.event(core_event(&format!("C{n}"), start, start + 1, 240));
    }
    builder
}

#[test]
fn test_weekly_hours_never_exceed_cap() {
    let source = InMemorySource::new(crowded_builder());
    let orch = ScheduleOrchestrator::new(fast_config());
    let outcome = orch
        .run(&source, &week_horizon(), &options(Algorithm::Cp))
        .expect("run failed");

    let durations: HashMap<String, u32> = (0..8).map(|n| (format!("C{n}"), 240)).collect();
    let mut load: HashMap<(EmployeeId, WeekKey), u32> = HashMap::new();
    load.insert((EmployeeId::new("E1"), WeekKey::of(d(19))), 300);
    load.insert((EmployeeId::new("E3"), WeekKey::of(d(23))), 120);
    for p in outcome.proposals.iter().filter(|p| p.is_assigned()) {
        let (Some(emp), Some(date)) = (&p.employee_id, p.date) else {
            unreachable!()
        };
        *load.entry((emp.clone(), WeekKey::of(date))).or_insert(0) += durations[p.event_id.as_str()];
    }
    for ((emp, _), minutes) in &load {
        assert!(*minutes <= 600, "{} scheduled {} minutes", emp, minutes);
    }
    // 周上限: E1 最多 1 个, E2 / E3 最多 2 个
    assert!(outcome.summary.scheduled <= 5);
    assert!(outcome.summary.scheduled >= 1);
}

#[test]
fn test_each_event_is_assigned_once_or_has_reason() {
    let source = InMemorySource::new(crowded_builder());
    let orch = ScheduleOrchestrator::new(fast_config());

    for algorithm in [Algorithm::Cp, Algorithm::Greedy] {
        let outcome = orch.run(&source, &week_horizon(), &options(algorithm)).expect("run failed");
        assert_eq!(outcome.proposals.len(), 8);
        for p in &outcome.proposals {
            let assigned = p.employee_id.is_some() && p.date.is_some();
            assert!(assigned ^ p.reason.is_some(), "{:?}", p);
        }
        let mut ids: Vec<&str> = outcome.proposals.iter().map(|p| p.event_id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 8);
    }
}

#[test]
fn test_supervisor_lands_on_core_day() {
    let builder = SnapshotBuilder::new(week_horizon())
        .employees([specialist("E1"), specialist("E2"), supervisor("S1")])
        .event(core_event("CA", 21, 23, 120))
        .event(core_event("CB", 22, 24, 120))
        .event(
            field_scheduler::Event::new("SA", EventCategory::Supervisor, window(19, 25), 30)
                .with_pair("CA"),
        )
        .event(
            field_scheduler::Event::new("SB", EventCategory::Supervisor, window(19, 25), 30)
                .with_pair("CB"),
        );
    let source = InMemorySource::new(builder);
    let orch = ScheduleOrchestrator::new(fast_config());

    for algorithm in [Algorithm::Cp, Algorithm::Greedy] {
        let outcome = orch.run(&source, &week_horizon(), &options(algorithm)).expect("run failed");
        let date_of = |id: &str| {
            outcome
                .proposals
                .iter()
                .find(|p| p.event_id.as_str() == id)
                .and_then(|p| p.date)
        };
        for (core, sup) in [("CA", "SA"), ("CB", "SB")] {
            if let Some(sup_day) = date_of(sup) {
                assert_eq!(date_of(core), Some(sup_day), "{algorithm}: {sup} vs {core}");
            }
        }
        assert_eq!(outcome.summary.scheduled, 4, "{algorithm}");
    }
}

#[test]
fn test_fairness_prefers_idle_employee_over_broadly_eligible_one() {
    // A 可承接 Core + Support,且有 30 个 Support 活动可选; B 只能承接 Core
    let mut builder = SnapshotBuilder::new(week_horizon())
        .employee(Employee::new("A", "组长A", EmployeeRole::LeadEventSpecialist))
        .employee(supervisor("B"))
        .event(core_event("C", 20, 20, 60));
    for n in 0..30 {
        builder = builder.event(field_scheduler::Event::new(
            format!("S{n}"),
            EventCategory::Support,
            window(21, 21),
            120,
        ));
    }
    let source = InMemorySource::new(builder);
    let orch = ScheduleOrchestrator::new(fast_config());
    let outcome = orch.run(&source, &week_horizon(), &options(Algorithm::Cp)).expect("run failed");

    let core = outcome
        .proposals
        .iter()
        .find(|p| p.event_id.as_str() == "C")
        .expect("proposal missing");
    assert_eq!(core.employee_id.as_ref().map(|e| e.as_str()), Some("B"));
    // Support 单日上限 2
    let support_placed = outcome
        .proposals
        .iter()
        .filter(|p| p.event_id.as_str().starts_with('S') && p.is_assigned())
        .count();
    assert_eq!(support_placed, 2);
}

#[test]
fn test_resolving_same_snapshot_gives_same_objective() {
    let builder = SnapshotBuilder::new(week_horizon())
        .employees([specialist("E1"), specialist("E2")])
        .event(core_event("A", 20, 22, 120))
        .event(core_event("B", 20, 21, 60))
        .event(core_event("C", 21, 23, 180));
    let source = InMemorySource::new(builder);
    let orch = ScheduleOrchestrator::new(fast_config());

    let first = orch.run(&source, &week_horizon(), &options(Algorithm::Cp)).expect("run failed");
    let second = orch.run(&source, &week_horizon(), &options(Algorithm::Cp)).expect("run failed");
    assert!(first.summary.objective.is_some());
    assert_eq!(first.summary.objective, second.summary.objective);
    assert_eq!(first.summary.scheduled, second.summary.scheduled);
    assert_ne!(first.run_id, second.run_id);
}

#[test]
fn test_indicator_is_shared_between_constraint_and_objective() {
    let snapshot = SnapshotBuilder::new(week_horizon())
        .employee(specialist("E1"))
        .event(core_event("A", 20, 21, 60).with_prior("E1", d(21)))
        .build()
        .expect("snapshot");
    let config = SchedulerConfig::default();
    let eligibility = EligibilityResolver::new(&snapshot, d(19)).resolve_all();
    let mut sm = ModelBuilder::new(&snapshot, &config).build(eligibility);

    // 建模阶段已创建的指示变量
    let from_model = sm.indicator(0, 0, d(21)).expect("indicator missing");
    let indicator_count = sm.indicators.len();
    let hits_before = sm.indicators.hits();

    // 目标项（保持上次建议）复用同一个变量,不新增
    ObjectiveBuilder::new(&snapshot, &config).build(&mut sm);
    assert_eq!(sm.indicators.len(), indicator_count);

    let key = IndicatorKey {
        event: 0,
        employee: 0,
        day: d(21),
    };
    assert_eq!(sm.indicators.get(&key), Some(from_model));

    // 再次申请: 返回同一变量编号,不新增约束
    let vars = sm.event_vars(0).expect("event vars").clone();
    let constraints_before = sm.model.num_constraints();
    let again = sm
        .indicators
        .get_or_create(&mut sm.model, key, vars.days[&d(21)], vars.employees[&0]);
    assert_eq!(again, from_model);
    assert_eq!(sm.indicators.hits(), hits_before + 1);
    assert_eq!(sm.model.num_constraints(), constraints_before);
}
