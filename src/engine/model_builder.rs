// ==========================================
// 外勤人员排班系统 - 约束模型构建器
// ==========================================
// 职责: 把资格判定结果转为 0/1 模型（硬约束部分）
// 输入: 快照 + 配置 + Eligibility 列表
// 输出: ScheduleModel（CpModel + 变量映射）
// ==========================================
// 变量:
// - placed[e]      活动 e 是否安排
// - day[e,d]       活动 e 安排在日期 d
// - emp[e,k]       活动 e 由员工 k 承接
// - ind[e,k,d]     三元指示变量,由 IndicatorCache 统一创建
// - y[k,j]         员工 k 的第 j 段负荷（公平性目标使用）
// ==========================================
// 约束:
// 1. Σ day = Σ emp = Σ ind = placed; ind ↔ day ∧ emp
// 2. 员工单日: 总数 / 类别上限 / 全天互斥 / 时段唯一（扣除已发布）
// 3. 员工单周: Σ dur·ind ≤ 周上限 − 已发布分钟
// 4. 督导配对: day[sup,d] ≤ day[core,d]
// ==========================================

use crate::config::{ObjectiveTerm, SchedulerConfig};
use crate::domain::calendar::WeekKey;
use crate::domain::capacity::{CapacityRules, DayCapacity, DayLoad, LoadLedger};
use crate::domain::snapshot::{PairedCoreState, ScheduleSnapshot};
use crate::domain::types::{EventCategory, ReasonCode};
use crate::engine::cp::{CpModel, VarId};
use crate::engine::eligibility::Eligibility;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, instrument};

// ==========================================
// IndicatorCache - 三元指示变量缓存
// ==========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndicatorKey {
    pub event: usize,
    pub employee: usize,
    pub day: NaiveDate,
}

/// 每个 (活动, 员工, 日期) 三元组只对应一个变量;
/// 定义约束在首次创建时加入,重复请求直接返回同一变量
#[derive(Debug, Clone, Default)]
pub struct IndicatorCache {
    vars: HashMap<IndicatorKey, VarId>,
    hits: usize,
}

impl IndicatorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取或创建指示变量
    ///
    /// # 参数
    /// - `day_var`: day[e,d]
    /// - `emp_var`: emp[e,k]
    pub fn get_or_create(
        &mut self,
        model: &mut CpModel,
        key: IndicatorKey,
        day_var: VarId,
        emp_var: VarId,
    ) -> VarId {
        if let Some(&v) = self.vars.get(&key) {
            self.hits += 1;
            return v;
        }
        let v = model.new_bool(format!("ind[{},{},{}]", key.event, key.employee, key.day));
        model.add_implication(v, day_var);
        model.add_implication(v, emp_var);
        model.add_le(&[(day_var, 1), (emp_var, 1), (v, -1)], 1);
        self.vars.insert(key, v);
        v
    }

    /// 只读查询（不创建）
    pub fn get(&self, key: &IndicatorKey) -> Option<VarId> {
        self.vars.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn hits(&self) -> usize {
        self.hits
    }
}

// ==========================================
// 变量映射
// ==========================================

#[derive(Debug, Clone)]
pub struct EventVars {
    pub placed: VarId,
    pub days: BTreeMap<NaiveDate, VarId>,
    pub employees: BTreeMap<usize, VarId>,
    pub triples: Vec<(usize, NaiveDate, VarId)>, // (员工下标, 日期, ind)
}

/// 员工负荷分段变量
#[derive(Debug, Clone)]
pub struct FairnessVars {
    pub employee: usize,
    pub block_minutes: u32,
    pub blocks: Vec<(u32, VarId)>, // (段序号 j, y[k,j]),j 升序
}

// ==========================================
// ScheduleModel - 构建结果
// ==========================================
#[derive(Debug, Clone)]
pub struct ScheduleModel {
    pub model: CpModel,
    pub eligibility: Vec<Eligibility>, // 含建模阶段追加的不可排原因
    pub events: Vec<Option<EventVars>>,
    pub indicators: IndicatorCache,
    pub fairness: Vec<FairnessVars>,
    order: Vec<usize>, // 建模顺序: 非督导在前
}

impl ScheduleModel {
    pub fn event_vars(&self, event_idx: usize) -> Option<&EventVars> {
        self.events.get(event_idx).and_then(|v| v.as_ref())
    }

    pub fn indicator(&self, event: usize, employee: usize, day: NaiveDate) -> Option<VarId> {
        self.indicators.get(&IndicatorKey { event, employee, day })
    }

    pub fn reason(&self, event_idx: usize) -> Option<ReasonCode> {
        self.eligibility.get(event_idx).and_then(|e| e.reason())
    }

    pub fn variable_count(&self) -> usize {
        self.model.num_vars()
    }

    pub fn constraint_count(&self) -> usize {
        self.model.num_constraints()
    }

    /// 按目标系数登记搜索分组（目标构建之后调用）
    ///
    /// 每个活动一组: placed → ind（按综合代价升序）→ emp → day;
    /// 代价相同时按员工下标轮转,使不同活动的首选员工错开
    pub fn install_search_groups(&mut self) {
        self.model.clear_search_groups();
        let n_emp = self
            .events
            .iter()
            .flatten()
            .flat_map(|v| v.employees.keys())
            .max()
            .map(|m| m + 1)
            .unwrap_or(1);

        for &e in &self.order {
            let Some(vars) = &self.events[e] else { continue };
            let model = &self.model;
            let mut triples: Vec<(i64, usize, VarId)> = vars
                .triples
                .iter()
                .map(|(k, d, ind)| {
                    let cost = model.objective_coef(*ind)
                        + vars.employees.get(k).map_or(0, |v| model.objective_coef(*v))
                        + vars.days.get(d).map_or(0, |v| model.objective_coef(*v));
                    (cost, (k + n_emp - e % n_emp) % n_emp, *ind)
                })
                .collect();
            triples.sort();

            let mut group = Vec::with_capacity(1 + triples.len() + vars.employees.len() + vars.days.len());
            group.push(vars.placed);
            group.extend(triples.iter().map(|(_, _, v)| *v));
            group.extend(vars.employees.values().copied());
            group.extend(vars.days.values().copied());

            let placed = vars.placed;
            let inds: Vec<VarId> = triples.iter().map(|(_, _, v)| *v).collect();
            self.model.set_hint(placed, true);
            for v in inds {
                self.model.set_hint(v, true);
            }
            self.model.add_search_group(group);
        }
    }
}

// ==========================================
// ModelBuilder - 约束模型构建器
// ==========================================
pub struct ModelBuilder<'a> {
    snapshot: &'a ScheduleSnapshot,
    config: &'a SchedulerConfig,
}

/// (员工, 日期) 上的候选指示变量
struct SlotCandidate {
    var: VarId,
    category: EventCategory,
    block: Option<u8>,
}

impl<'a> ModelBuilder<'a> {
    pub fn new(snapshot: &'a ScheduleSnapshot, config: &'a SchedulerConfig) -> Self {
        Self { snapshot, config }
    }

    /// 构建约束模型
    ///
    /// # 参数
    /// - `eligibility`: 与 snapshot.events 一一对应的判定结果
    #[instrument(skip_all, fields(events = eligibility.len()))]
    pub fn build(&self, mut eligibility: Vec<Eligibility>) -> ScheduleModel {
        let snapshot = self.snapshot;
        let rules = &self.config.capacity;
        let mut model = CpModel::new();
        let mut indicators = IndicatorCache::new();
        let mut events: Vec<Option<EventVars>> = vec![None; snapshot.events.len()];

        // 已发布排班台账
        let mut ledger = LoadLedger::new();
        let mut existing_minutes: HashMap<usize, u32> = HashMap::new();
        for a in &snapshot.existing {
            ledger.record(rules, &a.employee_id, a.date, a.category, a.block, a.duration_minutes);
            if let Some(k) = snapshot.employee_idx(&a.employee_id) {
                *existing_minutes.entry(k).or_insert(0) += a.duration_minutes;
            }
        }

        // 督导活动排在其 Core 之后建模
        let mut order: Vec<usize> = (0..snapshot.events.len()).collect();
        order.sort_by_key(|&i| snapshot.events[i].is_supervisor());

        let mut slots: HashMap<(usize, NaiveDate), Vec<SlotCandidate>> = HashMap::new();
        let mut weeks: HashMap<(usize, WeekKey), Vec<(VarId, i64)>> = HashMap::new();

        for &e in &order {
            let (employees, days) = match &eligibility[e] {
                Eligibility::Schedulable { employees, days } => (employees.clone(), days.clone()),
                Eligibility::Unschedulable(_) => continue,
            };
            let event = &snapshot.events[e];

            // 配对 Core 待排: 只保留 Core 有日期变量的日期
            let core_vars = match (&event.paired_with, event.is_supervisor()) {
                (Some(core), true) => match snapshot.paired_core(core) {
                    PairedCoreState::Pending(c) => match &events[c] {
                        Some(v) => Some(v.days.clone()),
                        None => {
                            eligibility[e] = Eligibility::Unschedulable(ReasonCode::PairedCoreUnschedulable);
                            continue;
                        }
                    },
                    _ => None,
                },
                _ => None,
            };

            let mut triples: Vec<(usize, NaiveDate)> = Vec::new();
            for &d in &days {
                if let Some(core_days) = &core_vars {
                    if !core_days.contains_key(&d) {
                        continue;
                    }
                }
                for &k in &employees {
                    let emp = &snapshot.employees[k];
                    if !emp.is_available(d) {
                        continue;
                    }
                    let cap = emp.weekly_cap_minutes(self.config.default_weekly_minutes);
                    if ledger
                        .check(rules, &emp.id, d, event.category, event.block, event.duration_minutes, cap)
                        .is_ok()
                    {
                        triples.push((k, d));
                    }
                }
            }

            if triples.is_empty() {
                eligibility[e] = Eligibility::Unschedulable(ReasonCode::NoAvailableSlot);
                continue;
            }

            let placed = model.new_bool(format!("placed[{}]", event.id));
            let mut day_vars: BTreeMap<NaiveDate, VarId> = BTreeMap::new();
            let mut emp_vars: BTreeMap<usize, VarId> = BTreeMap::new();
            for &(k, d) in &triples {
                day_vars
                    .entry(d)
                    .or_insert_with(|| model.new_bool(format!("day[{},{}]", event.id, d)));
                emp_vars
                    .entry(k)
                    .or_insert_with(|| model.new_bool(format!("emp[{},{}]", event.id, k)));
            }

            let mut ind_vars = Vec::with_capacity(triples.len());
            for &(k, d) in &triples {
                let key = IndicatorKey { event: e, employee: k, day: d };
                let v = indicators.get_or_create(&mut model, key, day_vars[&d], emp_vars[&k]);
                ind_vars.push((k, d, v));

                slots.entry((k, d)).or_default().push(SlotCandidate {
                    var: v,
                    category: event.category,
                    block: event.block,
                });
                weeks
                    .entry((k, WeekKey::of(d)))
                    .or_default()
                    .push((v, i64::from(event.duration_minutes)));
            }

            // 约束1: 恰好一个日期 / 一个员工 / 一个三元组
            for vars in [
                day_vars.values().copied().collect::<Vec<_>>(),
                emp_vars.values().copied().collect::<Vec<_>>(),
                ind_vars.iter().map(|(_, _, v)| *v).collect::<Vec<_>>(),
            ] {
                let mut terms: Vec<(VarId, i64)> = vars.into_iter().map(|v| (v, 1)).collect();
                terms.push((placed, -1));
                model.add_eq(&terms, 0);
            }

            // 约束4: 督导日期必须是 Core 的日期
            if let (Some(core), true) = (&event.paired_with, event.is_supervisor()) {
                if let PairedCoreState::Pending(c) = snapshot.paired_core(core) {
                    if let Some(core_vars) = &events[c] {
                        for (d, v) in &day_vars {
                            if let Some(core_day) = core_vars.days.get(d) {
                                model.add_implication(*v, *core_day);
                            }
                        }
                    }
                }
            }

            events[e] = Some(EventVars {
                placed,
                days: day_vars,
                employees: emp_vars,
                triples: ind_vars,
            });
        }

        // 约束2: 员工单日容量
        let daily_max = i64::from(rules.daily_max_events);
        for ((k, d), cands) in &slots {
            let existing = ledger
                .day(&snapshot.employees[*k].id, *d)
                .cloned()
                .unwrap_or_default();
            add_day_rows(&mut model, rules, daily_max, &existing, cands);
        }

        // 约束3: 员工单周工时
        let mut reachable: HashMap<usize, i64> = HashMap::new();
        for ((k, week), items) in &weeks {
            let emp = &snapshot.employees[*k];
            let cap = i64::from(emp.weekly_cap_minutes(self.config.default_weekly_minutes));
            let remaining = (cap - i64::from(ledger.week_minutes(&emp.id, *week))).max(0);
            let total: i64 = items.iter().map(|(_, m)| *m).sum();
            if total > remaining {
                model.add_le(items, remaining);
            }
            *reachable.entry(*k).or_insert(0) += total.min(remaining);
        }

        // 公平性分段变量
        let fairness = if self.config.coefficient(ObjectiveTerm::Fairness) > 0 {
            self.build_fairness(&mut model, &events, &existing_minutes, &reachable)
        } else {
            Vec::new()
        };

        debug!(
            variables = model.num_vars(),
            constraints = model.num_constraints(),
            indicators = indicators.len(),
            "约束模型构建完成"
        );

        ScheduleModel {
            model,
            eligibility,
            events,
            indicators,
            fairness,
            order,
        }
    }

    /// 公平性分段
    ///
    /// 全体员工共用一个段长 = max(配置段长, max_k ⌈(已发布 + 可达新增) / 最多段数⌉),
    /// 同一段序号 j 对每个员工代表同样的负荷; 可达新增受周工时余量限制。
    /// 已发布负荷占满的段为常量,不建变量; 新段序号 j 从 base+1 起
    fn build_fairness(
        &self,
        model: &mut CpModel,
        events: &[Option<EventVars>],
        existing_minutes: &HashMap<usize, u32>,
        reachable: &HashMap<usize, i64>,
    ) -> Vec<FairnessVars> {
        let weights = &self.config.weights;
        let mut per_employee: BTreeMap<usize, Vec<(VarId, i64)>> = BTreeMap::new();
        for (e, vars) in events.iter().enumerate() {
            let Some(vars) = vars else { continue };
            let dur = i64::from(self.snapshot.events[e].duration_minutes);
            for (k, v) in &vars.employees {
                per_employee.entry(*k).or_default().push((*v, dur));
            }
        }

        // (员工, 已发布, 可达新增)
        let loads: Vec<(usize, i64, i64)> = per_employee
            .iter()
            .map(|(k, terms)| {
                let existing = i64::from(existing_minutes.get(k).copied().unwrap_or(0));
                let possible: i64 = terms.iter().map(|(_, m)| *m).sum();
                let reach = reachable.get(k).copied().unwrap_or(possible).min(possible);
                (*k, existing, reach)
            })
            .collect();

        let max_blocks = i64::from(weights.fairness_max_blocks.max(1));
        let block = loads
            .iter()
            .map(|(_, existing, reach)| (existing + reach + max_blocks - 1) / max_blocks)
            .fold(i64::from(weights.fairness_block_minutes.max(1)), i64::max);

        let mut out = Vec::with_capacity(loads.len());
        for ((k, existing, reach), (_, terms)) in loads.into_iter().zip(per_employee) {
            let base = existing / block;
            let residual = existing - base * block;
            let count = (residual + reach + block - 1) / block;

            let mut blocks = Vec::with_capacity(count as usize);
            let mut row = terms;
            for j in (base + 1)..=(base + count) {
                let y = model.new_bool(format!("load[{},{}]", k, j));
                row.push((y, -block));
                if let Some((_, prev)) = blocks.last() {
                    model.add_implication(y, *prev);
                }
                blocks.push((j as u32, y));
            }
            model.add_le(&row, -residual);

            out.push(FairnessVars {
                employee: k,
                block_minutes: block as u32,
                blocks,
            });
        }
        out
    }
}

/// 单个 (员工, 日期) 的容量约束行
fn add_day_rows(
    model: &mut CpModel,
    rules: &CapacityRules,
    daily_max: i64,
    existing: &DayLoad,
    cands: &[SlotCandidate],
) {
    let n = cands.len() as i64;

    // 总数
    let remaining = i64::from(existing.remaining_events(rules));
    if n > remaining {
        let terms: Vec<(VarId, i64)> = cands.iter().map(|c| (c.var, 1)).collect();
        model.add_le(&terms, remaining);
    }

    // 类别上限
    let mut by_category: BTreeMap<EventCategory, Vec<(VarId, i64)>> = BTreeMap::new();
    for c in cands {
        by_category.entry(c.category).or_default().push((c.var, 1));
    }
    for (cat, terms) in &by_category {
        let left = i64::from(rules.category_cap(*cat)) - i64::from(existing.category_count(*cat));
        if terms.len() as i64 > left {
            model.add_le(terms, left.max(0));
        }
    }

    // 全天互斥: Σ_all + (C−1)·Σ_full ≤ C − 已发布部分
    if cands.iter().any(|c| rules.is_full_day(c.category)) {
        let extra = (daily_max - 1).max(0);
        let terms: Vec<(VarId, i64)> = cands
            .iter()
            .map(|c| (c.var, if rules.is_full_day(c.category) { 1 + extra } else { 1 }))
            .collect();
        let rhs = daily_max - i64::from(existing.count) - extra * i64::from(existing.full_day);
        let max_activity: i64 = terms.iter().map(|(_, c)| *c).sum();
        if max_activity > rhs {
            model.add_le(&terms, rhs.max(0));
        }
    }

    // 时段唯一
    let mut by_block: BTreeMap<u8, Vec<(VarId, i64)>> = BTreeMap::new();
    for c in cands {
        if let Some(b) = c.block {
            by_block.entry(b).or_default().push((c.var, 1));
        }
    }
    for (b, terms) in &by_block {
        let left = if existing.blocks.contains(b) { 0 } else { 1 };
        if terms.len() as i64 > left {
            model.add_le(terms, left);
        }
    }
}
