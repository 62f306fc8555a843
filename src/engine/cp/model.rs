// ==========================================
// 外勤人员排班系统 - 0/1 约束模型
// ==========================================
// 职责: 布尔变量 + 线性约束 + 线性目标（最小化）
// 说明: 所有约束规范化为 Σ coef·x ≤ rhs 形式存储
// ==========================================

use std::collections::BTreeMap;
use std::fmt;

/// 布尔变量句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub(crate) u32);

impl VarId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}

/// 线性约束 Σ coef·x ≤ rhs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearConstraint {
    pub terms: Vec<(VarId, i64)>,
    pub rhs: i64,
}

impl LinearConstraint {
    fn normalized(terms: &[(VarId, i64)], rhs: i64) -> Self {
        // 合并同一变量的系数,去掉零系数
        let mut merged: BTreeMap<VarId, i64> = BTreeMap::new();
        for (v, c) in terms {
            *merged.entry(*v).or_insert(0) += c;
        }
        Self {
            terms: merged.into_iter().filter(|(_, c)| *c != 0).collect(),
            rhs,
        }
    }

    pub fn activity(&self, values: &[bool]) -> i64 {
        self.terms
            .iter()
            .map(|(v, c)| if values[v.index()] { *c } else { 0 })
            .sum()
    }
}

// ==========================================
// CpModel - 约束模型
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct CpModel {
    names: Vec<String>,
    fixed: Vec<Option<bool>>,
    hints: Vec<Option<bool>>,
    constraints: Vec<LinearConstraint>,
    objective: Vec<i64>,
    search_groups: Vec<Vec<VarId>>,
}

impl CpModel {
    pub fn new() -> Self {
        Self::default()
    }

    // ===== 变量 =====

    pub fn new_bool(&mut self, name: impl Into<String>) -> VarId {
        let id = VarId(self.names.len() as u32);
        self.names.push(name.into());
        self.fixed.push(None);
        self.hints.push(None);
        self.objective.push(0);
        id
    }

    pub fn num_vars(&self) -> usize {
        self.names.len()
    }

    pub fn name(&self, var: VarId) -> &str {
        &self.names[var.index()]
    }

    /// 固定变量取值（常量）
    pub fn fix(&mut self, var: VarId, value: bool) {
        self.fixed[var.index()] = Some(value);
    }

    pub fn fixed_value(&self, var: VarId) -> Option<bool> {
        self.fixed[var.index()]
    }

    /// 搜索时优先尝试的取值
    pub fn set_hint(&mut self, var: VarId, value: bool) {
        self.hints[var.index()] = Some(value);
    }

    pub fn hint(&self, var: VarId) -> Option<bool> {
        self.hints[var.index()]
    }

    // ===== 约束 =====

    /// Σ coef·x ≤ rhs
    pub fn add_le(&mut self, terms: &[(VarId, i64)], rhs: i64) {
        self.constraints.push(LinearConstraint::normalized(terms, rhs));
    }

    /// Σ coef·x ≥ rhs
    pub fn add_ge(&mut self, terms: &[(VarId, i64)], rhs: i64) {
        let negated: Vec<(VarId, i64)> = terms.iter().map(|(v, c)| (*v, -c)).collect();
        self.add_le(&negated, -rhs);
    }

    /// Σ coef·x = rhs
    pub fn add_eq(&mut self, terms: &[(VarId, i64)], rhs: i64) {
        self.add_le(terms, rhs);
        self.add_ge(terms, rhs);
    }

    /// a → b （a ≤ b）
    pub fn add_implication(&mut self, a: VarId, b: VarId) {
        self.add_le(&[(a, 1), (b, -1)], 0);
    }

    pub fn constraints(&self) -> &[LinearConstraint] {
        &self.constraints
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    // ===== 目标函数（最小化） =====

    /// 清空目标函数（重建目标前调用,保证重复构建结果一致）
    pub fn clear_objective(&mut self) {
        self.objective.iter_mut().for_each(|c| *c = 0);
    }

    /// 累加目标系数
    pub fn add_objective(&mut self, var: VarId, coef: i64) {
        self.objective[var.index()] += coef;
    }

    pub fn objective_coef(&self, var: VarId) -> i64 {
        self.objective[var.index()]
    }

    pub fn objective_coefs(&self) -> &[i64] {
        &self.objective
    }

    // ===== 搜索提示 =====

    /// 登记一组决策变量（按组顺序分支）
    pub fn add_search_group(&mut self, vars: Vec<VarId>) {
        if !vars.is_empty() {
            self.search_groups.push(vars);
        }
    }

    pub fn clear_search_groups(&mut self) {
        self.search_groups.clear();
    }

    pub fn search_groups(&self) -> &[Vec<VarId>] {
        &self.search_groups
    }

    // ===== 校验 =====

    pub fn evaluate(&self, values: &[bool]) -> i64 {
        self.objective
            .iter()
            .zip(values)
            .map(|(c, v)| if *v { *c } else { 0 })
            .sum()
    }

    /// 检查解是否满足全部约束及固定值
    pub fn is_satisfied(&self, values: &[bool]) -> bool {
        if values.len() != self.num_vars() {
            return false;
        }
        let fixed_ok = self
            .fixed
            .iter()
            .zip(values)
            .all(|(f, v)| f.map_or(true, |fv| fv == *v));
        fixed_ok && self.constraints.iter().all(|c| c.activity(values) <= c.rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization_merges_terms() {
        let mut m = CpModel::new();
        let a = m.new_bool("a");
        let b = m.new_bool("b");
        m.add_le(&[(a, 1), (b, 2), (a, -1)], 1);
        assert_eq!(m.constraints()[0].terms, vec![(b, 2)]);
    }

    #[test]
    fn test_eq_and_satisfaction() {
        let mut m = CpModel::new();
        let a = m.new_bool("a");
        let b = m.new_bool("b");
        m.add_eq(&[(a, 1), (b, 1)], 1);
        m.add_objective(a, 3);
        m.add_objective(b, -2);
        assert_eq!(m.num_constraints(), 2);
        assert!(m.is_satisfied(&[true, false]));
        assert!(!m.is_satisfied(&[true, true]));
        assert!(!m.is_satisfied(&[false, false]));
        assert_eq!(m.evaluate(&[false, true]), -2);

        m.fix(a, false);
        assert!(!m.is_satisfied(&[true, false]));

        m.clear_objective();
        assert_eq!(m.evaluate(&[true, true]), 0);
    }
}
