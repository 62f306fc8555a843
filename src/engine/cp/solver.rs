// ==========================================
// 外勤人员排班系统 - 并行分支定界求解器
// ==========================================
// 职责: 求解 0/1 约束模型（最小化线性目标）
// 算法: 线性约束最小活动量传播 + 深度优先分支定界
// 并行: 组合求解（worker 0 完整搜索,其余 worker 随机重启）
// 取消: 仅时间预算
// ==========================================

use super::model::{CpModel, VarId};
use crate::domain::types::SolveStatus;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// 每搜索多少个节点检查一次时间/停止标记
const CHECK_INTERVAL: u64 = 256;

/// 随机重启初始节点预算
const RESTART_BASE_BUDGET: u64 = 2_000;

// ==========================================
// SolverConfig - 求解参数
// ==========================================
#[derive(Debug, Clone)]
pub struct SolverConfig {
    pub time_limit_ms: u64,
    pub num_workers: usize, // 调用方负责限制范围
    pub random_seed: u64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            time_limit_ms: 30_000,
            num_workers: 1,
            random_seed: 42,
        }
    }
}

// ==========================================
// CpSolution - 求解结果
// ==========================================
#[derive(Debug, Clone)]
pub struct CpSolution {
    pub status: SolveStatus,
    pub objective: Option<i64>,
    pub values: Vec<bool>,
    pub nodes: u64,
    pub elapsed_ms: u64,
}

impl CpSolution {
    pub fn value(&self, var: VarId) -> bool {
        self.values.get(var.index()).copied().unwrap_or(false)
    }

    pub fn has_solution(&self) -> bool {
        self.status.has_solution()
    }
}

/// 求解器接口
pub trait CpSolver {
    fn solve(&self, model: &CpModel, config: &SolverConfig) -> CpSolution;
}

// ==========================================
// Compiled - 求解用紧凑结构
// ==========================================
struct Compiled {
    n: usize,
    // 约束行 (CSR)
    row_start: Vec<usize>,
    row_var: Vec<u32>,
    row_coef: Vec<i64>,
    rhs: Vec<i64>,
    max_abs: Vec<i64>,
    // 变量出现位置 (CSR)
    occ_start: Vec<usize>,
    occ_row: Vec<u32>,
    occ_coef: Vec<i64>,
    // 目标与搜索
    cost: Vec<i64>,
    fixed: Vec<Option<bool>>,
    preferred: Vec<bool>,
    groups: Vec<Vec<u32>>,
    tail: Vec<u32>,
}

impl Compiled {
    fn new(model: &CpModel) -> Self {
        let n = model.num_vars();

        let mut row_start = Vec::with_capacity(model.num_constraints() + 1);
        let mut row_var = Vec::new();
        let mut row_coef = Vec::new();
        let mut rhs = Vec::with_capacity(model.num_constraints());
        let mut max_abs = Vec::with_capacity(model.num_constraints());
        let mut occ_count = vec![0usize; n];

        row_start.push(0);
        for c in model.constraints() {
            let mut m = 0;
            for (v, coef) in &c.terms {
                row_var.push(v.0);
                row_coef.push(*coef);
                occ_count[v.index()] += 1;
                m = m.max(coef.abs());
            }
            row_start.push(row_var.len());
            rhs.push(c.rhs);
            max_abs.push(m);
        }

        let mut occ_start = vec![0usize; n + 1];
        for i in 0..n {
            occ_start[i + 1] = occ_start[i] + occ_count[i];
        }
        let mut fill = occ_start.clone();
        let mut occ_row = vec![0u32; row_var.len()];
        let mut occ_coef = vec![0i64; row_var.len()];
        for r in 0..rhs.len() {
            for k in row_start[r]..row_start[r + 1] {
                let v = row_var[k] as usize;
                occ_row[fill[v]] = r as u32;
                occ_coef[fill[v]] = row_coef[k];
                fill[v] += 1;
            }
        }

        let cost = model.objective_coefs().to_vec();
        let fixed: Vec<Option<bool>> = (0..n).map(|i| model.fixed_value(VarId(i as u32))).collect();
        let preferred: Vec<bool> = (0..n)
            .map(|i| model.hint(VarId(i as u32)).unwrap_or(cost[i] < 0))
            .collect();

        // 分组内去重; 未出现在任何分组的变量按 |cost| 降序排在最后
        let mut seen = vec![false; n];
        let mut groups = Vec::with_capacity(model.search_groups().len());
        for g in model.search_groups() {
            let mut group = Vec::with_capacity(g.len());
            for v in g {
                if !seen[v.index()] {
                    seen[v.index()] = true;
                    group.push(v.0);
                }
            }
            if !group.is_empty() {
                groups.push(group);
            }
        }
        let mut tail: Vec<u32> = (0..n as u32).filter(|v| !seen[*v as usize]).collect();
        tail.sort_by_key(|v| (std::cmp::Reverse(cost[*v as usize].abs()), *v));

        Self {
            n,
            row_start,
            row_var,
            row_coef,
            rhs,
            max_abs,
            occ_start,
            occ_row,
            occ_coef,
            cost,
            fixed,
            preferred,
            groups,
            tail,
        }
    }

    fn base_order(&self) -> Vec<u32> {
        let mut order = Vec::with_capacity(self.n);
        for g in &self.groups {
            order.extend_from_slice(g);
        }
        order.extend_from_slice(&self.tail);
        order
    }

    /// 随机化搜索顺序: 组内首变量（放置变量）保持在前,其余成员可能打乱
    fn randomized_order(&self, rng: &mut StdRng) -> Vec<u32> {
        let mut groups: Vec<Vec<u32>> = self.groups.clone();
        if rng.random_bool(0.3) {
            groups.shuffle(rng);
        }
        let mut order = Vec::with_capacity(self.n);
        for mut g in groups {
            if g.len() > 2 && rng.random_bool(0.5) {
                g[1..].shuffle(rng);
            }
            order.extend(g);
        }
        order.extend_from_slice(&self.tail);
        order
    }
}

// ==========================================
// Shared - worker 间共享状态
// ==========================================
struct Shared {
    best: AtomicI64,
    incumbent: Mutex<Option<(i64, Vec<bool>)>>,
    stop: AtomicBool,
    exhausted: AtomicBool,
    nodes: AtomicU64,
    deadline: Instant,
}

impl Shared {
    fn best(&self) -> i64 {
        self.best.load(Ordering::Acquire)
    }

    fn offer(&self, objective: i64, values: Vec<bool>) {
        let mut guard = match self.incumbent.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let better = guard.as_ref().map_or(true, |(best, _)| objective < *best);
        if better {
            *guard = Some((objective, values));
            self.best.fetch_min(objective, Ordering::AcqRel);
            debug!(objective, "发现更优解");
        }
    }

    fn should_stop(&self) -> bool {
        if self.stop.load(Ordering::Relaxed) {
            return true;
        }
        if Instant::now() >= self.deadline {
            self.stop.store(true, Ordering::Relaxed);
            return true;
        }
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DfsOutcome {
    Exhausted,
    Interrupted,
    BudgetSpent,
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    var: u32,
    pos: usize,
    trail_len: usize,
    first: bool,
    tried_second: bool,
}

// ==========================================
// Search - 单 worker 搜索状态
// ==========================================
struct Search<'a> {
    c: &'a Compiled,
    val: Vec<i8>, // -1 未赋值
    trail: Vec<u32>,
    min_act: Vec<i64>,
    obj_fixed: i64, // 已赋值变量的目标值
    neg_free: i64,  // 未赋值变量的负系数之和
    queue: Vec<u32>,
    queued: Vec<bool>,
}

impl<'a> Search<'a> {
    fn new(c: &'a Compiled) -> Self {
        let rows = c.rhs.len();
        let mut min_act = vec![0i64; rows];
        for (r, act) in min_act.iter_mut().enumerate() {
            *act = c.row_coef[c.row_start[r]..c.row_start[r + 1]]
                .iter()
                .map(|coef| (*coef).min(0))
                .sum();
        }
        Self {
            c,
            val: vec![-1; c.n],
            trail: Vec::with_capacity(c.n),
            min_act,
            obj_fixed: 0,
            neg_free: c.cost.iter().map(|x| (*x).min(0)).sum(),
            queue: Vec::new(),
            queued: vec![false; rows],
        }
    }

    /// 根节点: 应用固定值并做完整传播
    fn init_root(&mut self) -> bool {
        let c = self.c;
        for v in 0..c.n {
            if let Some(value) = c.fixed[v] {
                match self.val[v] {
                    -1 => self.assign(v as u32, value),
                    cur if (cur == 1) != value => return false,
                    _ => {}
                }
            }
        }
        for r in 0..c.rhs.len() {
            if !self.queued[r] {
                self.queued[r] = true;
                self.queue.push(r as u32);
            }
        }
        self.propagate()
    }

    #[inline]
    fn delta(coef: i64, value: bool) -> i64 {
        match (coef > 0, value) {
            (true, true) => coef,
            (false, false) => -coef,
            _ => 0,
        }
    }

    fn assign(&mut self, var: u32, value: bool) {
        let c = self.c;
        let v = var as usize;
        self.val[v] = value as i8;
        self.trail.push(var);
        if value {
            self.obj_fixed += c.cost[v];
        }
        self.neg_free -= c.cost[v].min(0);

        for k in c.occ_start[v]..c.occ_start[v + 1] {
            let d = Self::delta(c.occ_coef[k], value);
            if d != 0 {
                let r = c.occ_row[k] as usize;
                self.min_act[r] += d;
                if !self.queued[r] {
                    self.queued[r] = true;
                    self.queue.push(r as u32);
                }
            }
        }
    }

    fn unassign_last(&mut self) {
        let c = self.c;
        let Some(var) = self.trail.pop() else {
            return;
        };
        let v = var as usize;
        let value = self.val[v] == 1;
        if value {
            self.obj_fixed -= c.cost[v];
        }
        self.neg_free += c.cost[v].min(0);
        for k in c.occ_start[v]..c.occ_start[v + 1] {
            let d = Self::delta(c.occ_coef[k], value);
            if d != 0 {
                self.min_act[c.occ_row[k] as usize] -= d;
            }
        }
        self.val[v] = -1;
    }

    fn undo_to(&mut self, len: usize) {
        while self.trail.len() > len {
            self.unassign_last();
        }
    }

    fn clear_queue(&mut self) {
        for r in self.queue.drain(..) {
            self.queued[r as usize] = false;
        }
    }

    /// 约束传播
    ///
    /// # 返回
    /// - false: 出现冲突（某行最小活动量超过右端）
    fn propagate(&mut self) -> bool {
        let c = self.c;
        while let Some(r) = self.queue.pop() {
            let r = r as usize;
            self.queued[r] = false;
            let slack = c.rhs[r] - self.min_act[r];
            if slack < 0 {
                self.clear_queue();
                return false;
            }
            if slack >= c.max_abs[r] {
                continue;
            }
            for k in c.row_start[r]..c.row_start[r + 1] {
                let v = c.row_var[k];
                if self.val[v as usize] >= 0 {
                    continue;
                }
                let coef = c.row_coef[k];
                if coef.abs() > slack {
                    // 正系数只能取 0,负系数只能取 1（两者均不改变本行最小活动量）
                    self.assign(v, coef < 0);
                }
            }
        }
        true
    }

    fn lower_bound(&self) -> i64 {
        self.obj_fixed + self.neg_free
    }

    fn values(&self) -> Vec<bool> {
        self.val.iter().map(|v| *v == 1).collect()
    }

    fn backtrack(&mut self, stack: &mut Vec<Frame>, shared: &Shared) -> bool {
        while let Some(mut f) = stack.pop() {
            self.undo_to(f.trail_len);
            if f.tried_second {
                continue;
            }
            f.tried_second = true;
            stack.push(f);
            self.assign(f.var, !f.first);
            if self.propagate() && self.lower_bound() < shared.best() {
                return true;
            }
        }
        false
    }

    /// 深度优先分支定界
    ///
    /// # 参数
    /// - `order`: 变量分支顺序（必须覆盖全部变量）
    /// - `budget`: 节点预算; None 为不限
    fn dfs(&mut self, order: &[u32], shared: &Shared, budget: Option<u64>) -> (DfsOutcome, u64) {
        let root_len = self.trail.len();
        let mut stack: Vec<Frame> = Vec::new();
        let mut nodes: u64 = 0;

        let outcome = loop {
            if self.lower_bound() >= shared.best() {
                if !self.backtrack(&mut stack, shared) {
                    break DfsOutcome::Exhausted;
                }
                continue;
            }

            let start = stack.last().map_or(0, |f| f.pos + 1);
            let next = (start..order.len()).find(|&p| self.val[order[p] as usize] < 0);

            match next {
                None => {
                    shared.offer(self.obj_fixed, self.values());
                    if !self.backtrack(&mut stack, shared) {
                        break DfsOutcome::Exhausted;
                    }
                }
                Some(pos) => {
                    nodes += 1;
                    if nodes % CHECK_INTERVAL == 0 {
                        if shared.should_stop() {
                            break DfsOutcome::Interrupted;
                        }
                        if budget.is_some_and(|b| nodes >= b) {
                            break DfsOutcome::BudgetSpent;
                        }
                    }

                    let var = order[pos];
                    let first = self.c.preferred[var as usize];
                    stack.push(Frame {
                        var,
                        pos,
                        trail_len: self.trail.len(),
                        first,
                        tried_second: false,
                    });
                    self.assign(var, first);
                    if !self.propagate() && !self.backtrack(&mut stack, shared) {
                        break DfsOutcome::Exhausted;
                    }
                }
            }
        };

        self.undo_to(root_len);
        self.clear_queue();
        (outcome, nodes)
    }
}

// ==========================================
// PortfolioSolver - 组合并行求解器
// ==========================================
#[derive(Debug, Default, Clone, Copy)]
pub struct PortfolioSolver;

impl PortfolioSolver {
    pub fn new() -> Self {
        Self
    }

    fn run_worker(compiled: &Compiled, shared: &Shared, worker: usize, seed: u64) {
        let mut search = Search::new(compiled);
        if !search.init_root() {
            // 根节点冲突: 无可行解
            shared.exhausted.store(true, Ordering::Release);
            shared.stop.store(true, Ordering::Release);
            return;
        }

        if worker == 0 {
            let order = compiled.base_order();
            let (outcome, nodes) = search.dfs(&order, shared, None);
            shared.nodes.fetch_add(nodes, Ordering::Relaxed);
            if outcome == DfsOutcome::Exhausted {
                shared.exhausted.store(true, Ordering::Release);
                shared.stop.store(true, Ordering::Release);
            }
            return;
        }

        let mut rng = StdRng::seed_from_u64(seed ^ (worker as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
        let mut restart: u32 = 0;
        while !shared.should_stop() {
            let order = compiled.randomized_order(&mut rng);
            let budget = RESTART_BASE_BUDGET << restart.min(20);
            let (outcome, nodes) = search.dfs(&order, shared, Some(budget));
            shared.nodes.fetch_add(nodes, Ordering::Relaxed);
            match outcome {
                DfsOutcome::Exhausted => {
                    shared.exhausted.store(true, Ordering::Release);
                    shared.stop.store(true, Ordering::Release);
                    break;
                }
                DfsOutcome::Interrupted => break,
                DfsOutcome::BudgetSpent => restart += 1,
            }
        }
        debug!(worker, restarts = restart, "随机重启 worker 结束");
    }
}

impl CpSolver for PortfolioSolver {
    fn solve(&self, model: &CpModel, config: &SolverConfig) -> CpSolution {
        let start = Instant::now();
        let workers = config.num_workers.max(1);
        let compiled = Compiled::new(model);
        let shared = Shared {
            best: AtomicI64::new(i64::MAX),
            incumbent: Mutex::new(None),
            stop: AtomicBool::new(false),
            exhausted: AtomicBool::new(false),
            nodes: AtomicU64::new(0),
            deadline: start + Duration::from_millis(config.time_limit_ms),
        };

        debug!(
            vars = compiled.n,
            rows = compiled.rhs.len(),
            workers,
            time_limit_ms = config.time_limit_ms,
            "开始求解"
        );

        if workers == 1 {
            Self::run_worker(&compiled, &shared, 0, config.random_seed);
        } else {
            match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
                Ok(pool) => pool.scope(|s| {
                    for w in 0..workers {
                        let compiled = &compiled;
                        let shared = &shared;
                        let seed = config.random_seed;
                        s.spawn(move |_| Self::run_worker(compiled, shared, w, seed));
                    }
                }),
                Err(e) => {
                    warn!(error = %e, "求解线程池创建失败,退化为单线程搜索");
                    Self::run_worker(&compiled, &shared, 0, config.random_seed);
                }
            }
        }

        let exhausted = shared.exhausted.load(Ordering::Acquire);
        let incumbent = match shared.incumbent.into_inner() {
            Ok(v) => v,
            Err(poisoned) => poisoned.into_inner(),
        };
        let nodes = shared.nodes.load(Ordering::Relaxed);
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let (status, objective, values) = match (exhausted, incumbent) {
            (true, Some((obj, values))) => (SolveStatus::Optimal, Some(obj), values),
            (false, Some((obj, values))) => (SolveStatus::Feasible, Some(obj), values),
            (true, None) => (SolveStatus::Infeasible, None, Vec::new()),
            (false, None) => (SolveStatus::Unknown, None, Vec::new()),
        };

        info!(
            status = %status,
            objective = ?objective,
            nodes,
            elapsed_ms,
            "求解结束"
        );

        CpSolution {
            status,
            objective,
            values,
            nodes,
            elapsed_ms,
        }
    }
}
