// ==========================================
// 外勤人员排班系统 - 目标函数构建器
// ==========================================
// 职责: 在已构建的约束模型上设置软约束（最小化）
// 红线: 只改目标系数,不增删变量与约束; 重复构建结果一致
// ==========================================
// 目标项（系数均经 ConstraintModifiers 缩放）:
// - Coverage   -placement · placed[e]
// - Urgency    urgency · (d − 最早可选日) · day[e,d]
// - Fairness   fairness · j · y[k,j]
// - Disruption -bump · ind[e, 上次员工, 上次日期]
// - Affinity   -round(score · affinity) · emp[e,k]
// - Rotation   -rotation · ind[e,k,d]（k 为当日该类别轮值人选）
// ==========================================

use crate::config::{ObjectiveTerm, SchedulerConfig};
use crate::domain::snapshot::ScheduleSnapshot;
use crate::engine::model_builder::ScheduleModel;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// 目标构建报告
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectiveReport {
    /// 每个目标项写入的系数个数
    pub terms: BTreeMap<ObjectiveTerm, usize>,
    /// 找不到对应 emp 变量的亲和度键数
    pub unmatched_affinity_keys: usize,
}

// ==========================================
// ObjectiveBuilder
// ==========================================
pub struct ObjectiveBuilder<'a> {
    snapshot: &'a ScheduleSnapshot,
    config: &'a SchedulerConfig,
}

impl<'a> ObjectiveBuilder<'a> {
    pub fn new(snapshot: &'a ScheduleSnapshot, config: &'a SchedulerConfig) -> Self {
        Self { snapshot, config }
    }

    /// 重建目标函数
    pub fn build(&self, sm: &mut ScheduleModel) -> ObjectiveReport {
        sm.model.clear_objective();
        let mut report = ObjectiveReport::default();

        self.add_coverage(sm, &mut report);
        self.add_urgency(sm, &mut report);
        self.add_fairness(sm, &mut report);
        self.add_disruption(sm, &mut report);
        self.add_affinity(sm, &mut report);
        self.add_rotation(sm, &mut report);

        if report.unmatched_affinity_keys > 0 {
            warn!(
                unmatched_affinity_keys = report.unmatched_affinity_keys,
                "部分亲和度键没有对应的员工变量"
            );
        }
        debug!(terms = ?report.terms, "目标函数构建完成");
        report
    }

    fn add_coverage(&self, sm: &mut ScheduleModel, report: &mut ObjectiveReport) {
        let coef = self.config.coefficient(ObjectiveTerm::Coverage);
        if coef == 0 {
            return;
        }
        let mut n = 0;
        for vars in sm.events.iter().flatten() {
            sm.model.add_objective(vars.placed, -coef);
            n += 1;
        }
        report.terms.insert(ObjectiveTerm::Coverage, n);
    }

    fn add_urgency(&self, sm: &mut ScheduleModel, report: &mut ObjectiveReport) {
        let coef = self.config.coefficient(ObjectiveTerm::Urgency);
        if coef == 0 {
            return;
        }
        let mut n = 0;
        for vars in sm.events.iter().flatten() {
            let Some(earliest) = vars.days.keys().next().copied() else {
                continue;
            };
            for (d, v) in &vars.days {
                let offset = (*d - earliest).num_days();
                if offset > 0 {
                    sm.model.add_objective(*v, coef * offset);
                    n += 1;
                }
            }
        }
        report.terms.insert(ObjectiveTerm::Urgency, n);
    }

    fn add_fairness(&self, sm: &mut ScheduleModel, report: &mut ObjectiveReport) {
        let coef = self.config.coefficient(ObjectiveTerm::Fairness);
        if coef == 0 {
            return;
        }
        let mut n = 0;
        for f in &sm.fairness {
            for (j, y) in &f.blocks {
                sm.model.add_objective(*y, coef * i64::from(*j));
                n += 1;
            }
        }
        report.terms.insert(ObjectiveTerm::Fairness, n);
    }

    /// 上次建议的 (员工, 日期) 仍可行时奖励保持
    fn add_disruption(&self, sm: &mut ScheduleModel, report: &mut ObjectiveReport) {
        let coef = self.config.coefficient(ObjectiveTerm::Disruption);
        if coef == 0 {
            return;
        }
        let mut n = 0;
        for (e, event) in self.snapshot.events.iter().enumerate() {
            let Some(prior) = &event.prior else { continue };
            let Some(k) = self.snapshot.employee_idx(&prior.employee_id) else {
                continue;
            };
            if let Some(v) = sm.indicator(e, k, prior.date) {
                sm.model.add_objective(v, -coef);
                n += 1;
            }
        }
        report.terms.insert(ObjectiveTerm::Disruption, n);
    }

    fn add_affinity(&self, sm: &mut ScheduleModel, report: &mut ObjectiveReport) {
        let weight = self.config.coefficient(ObjectiveTerm::Affinity);
        if weight == 0 || self.snapshot.affinity.is_empty() {
            return;
        }
        let mut n = 0;
        let mut unmatched = 0;
        for (event_id, employee_id, score) in self.snapshot.affinity.iter() {
            let var = self
                .snapshot
                .event_idx(event_id)
                .zip(self.snapshot.employee_idx(employee_id))
                .and_then(|(e, k)| sm.event_vars(e).and_then(|v| v.employees.get(&k).copied()));
            match var {
                Some(v) => {
                    let coef = (score * weight as f64).round() as i64;
                    if coef != 0 {
                        sm.model.add_objective(v, -coef);
                        n += 1;
                    }
                }
                None => unmatched += 1,
            }
        }
        report.terms.insert(ObjectiveTerm::Affinity, n);
        report.unmatched_affinity_keys = unmatched;
    }

    fn add_rotation(&self, sm: &mut ScheduleModel, report: &mut ObjectiveReport) {
        let coef = self.config.coefficient(ObjectiveTerm::Rotation);
        if coef == 0 {
            return;
        }
        let mut hits = Vec::new();
        for (e, vars) in sm.events.iter().enumerate() {
            let Some(vars) = vars else { continue };
            let category = self.snapshot.events[e].category;
            for (k, d, ind) in &vars.triples {
                if self.snapshot.rotation_for(*d, category) == Some(&self.snapshot.employees[*k].id) {
                    hits.push(*ind);
                }
            }
        }
        for v in &hits {
            sm.model.add_objective(*v, -coef);
        }
        report.terms.insert(ObjectiveTerm::Rotation, hits.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::calendar::{DateRange, Horizon, RotationDefault};
    use crate::domain::employee::Employee;
    use crate::domain::event::Event;
    use crate::domain::snapshot::{AffinityScores, SnapshotBuilder};
    use crate::domain::types::{EmployeeId, EmployeeRole, EventCategory, EventId};
    use crate::engine::eligibility::EligibilityResolver;
    use crate::engine::model_builder::ModelBuilder;
    use chrono::{NaiveDate, Weekday};

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, day).unwrap()
    }

    fn snapshot() -> ScheduleSnapshot {
        let mut affinity = AffinityScores::new();
        affinity.insert(EventId::new("A"), EmployeeId::new("E2"), 0.8);
        affinity.insert(EventId::new("A"), EmployeeId::new("NOBODY"), 0.5);
        SnapshotBuilder::new(Horizon::new(d(19), d(25)).unwrap())
            .employee(Employee::new("E1", "a", EmployeeRole::EventSpecialist))
            .employee(Employee::new("E2", "b", EmployeeRole::EventSpecialist))
            .event(
                Event::new("A", EventCategory::Core, DateRange::new(d(20), d(22)).unwrap(), 60)
                    .with_prior("E1", d(21)),
            )
            .rotation(RotationDefault {
                weekday: Weekday::Thu,
                category: EventCategory::Core,
                employee_id: EmployeeId::new("E2"),
            })
            .affinity(affinity)
            .build()
            .unwrap()
    }

    fn model(snap: &ScheduleSnapshot, config: &SchedulerConfig) -> ScheduleModel {
        let elig = EligibilityResolver::new(snap, d(19)).resolve_all();
        ModelBuilder::new(snap, config).build(elig)
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let snap = snapshot();
        let config = SchedulerConfig::default();
        let mut sm = model(&snap, &config);
        let builder = ObjectiveBuilder::new(&snap, &config);

        let first_report = builder.build(&mut sm);
        let first = sm.model.objective_coefs().to_vec();
        let second_report = builder.build(&mut sm);

        assert_eq!(first, sm.model.objective_coefs());
        assert_eq!(first_report, second_report);
    }

    #[test]
    fn test_terms_hit_expected_variables() {
        let snap = snapshot();
        let config = SchedulerConfig::default();
        let mut sm = model(&snap, &config);
        let report = ObjectiveBuilder::new(&snap, &config).build(&mut sm);
        let vars = sm.event_vars(0).unwrap().clone();

        // 亲和度按 EventId 键控; 未知员工计入 unmatched
        assert_eq!(report.unmatched_affinity_keys, 1);
        assert_eq!(sm.model.objective_coef(vars.employees[&1]), -80);
        assert_eq!(sm.model.objective_coef(vars.employees[&0]), 0);

        // 上次建议 (E1, 21 日)
        let bump = sm.indicator(0, 0, d(21)).unwrap();
        assert_eq!(sm.model.objective_coef(bump), -config.weights.bump_reward);

        // 22 日是周四,E2 为轮值人选
        let rot = sm.indicator(0, 1, d(22)).unwrap();
        assert_eq!(sm.model.objective_coef(rot), -config.weights.rotation_reward);

        // 紧迫度: 最早日无惩罚
        assert_eq!(sm.model.objective_coef(vars.days[&d(20)]), 0);
        assert_eq!(sm.model.objective_coef(vars.days[&d(22)]), 2 * config.weights.urgency_per_day);
    }

    #[test]
    fn test_disabled_term_is_omitted() {
        let snap = snapshot();
        let mut config = SchedulerConfig::default();
        config.modifiers.set_keyword(ObjectiveTerm::Affinity, "disable");
        let mut sm = model(&snap, &config);
        let report = ObjectiveBuilder::new(&snap, &config).build(&mut sm);
        assert!(!report.terms.contains_key(&ObjectiveTerm::Affinity));
        assert_eq!(report.unmatched_affinity_keys, 0);
    }
}
