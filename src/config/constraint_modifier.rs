// ==========================================
// 外勤人员排班系统 - 目标项调节系数
// ==========================================
// 职责: 解析目标函数各项的调节关键字
// 存储: config_kv 表, 键 constraint_modifier/<term>
// ==========================================

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

// ==========================================
// ObjectiveTerm - 目标函数项
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveTerm {
    Coverage,   // 覆盖率（安排数量）
    Urgency,    // 尽早安排
    Fairness,   // 负荷均衡
    Disruption, // 偏离上次建议
    Affinity,   // 员工-活动亲和度
    Rotation,   // 轮值默认
}

impl ObjectiveTerm {
    pub const ALL: [ObjectiveTerm; 6] = [
        ObjectiveTerm::Coverage,
        ObjectiveTerm::Urgency,
        ObjectiveTerm::Fairness,
        ObjectiveTerm::Disruption,
        ObjectiveTerm::Affinity,
        ObjectiveTerm::Rotation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectiveTerm::Coverage => "coverage",
            ObjectiveTerm::Urgency => "urgency",
            ObjectiveTerm::Fairness => "fairness",
            ObjectiveTerm::Disruption => "disruption",
            ObjectiveTerm::Affinity => "affinity",
            ObjectiveTerm::Rotation => "rotation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let key = s.trim().to_lowercase();
        ObjectiveTerm::ALL.into_iter().find(|t| t.as_str() == key)
    }
}

impl fmt::Display for ObjectiveTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 解析调节关键字
///
/// # 参数
/// - `raw`: 关键字或数值字面量
///
/// # 返回
/// - increase=1.5, strong_increase=2.0, decrease=0.5, disable=0.0,
///   reset/neutral=1.0, 非负数值原样返回
/// - 无法识别 → 1.0 并记录警告
pub fn parse_modifier(raw: &str) -> f64 {
    let key = raw.trim().to_lowercase();
    match key.as_str() {
        "increase" => 1.5,
        "strong_increase" => 2.0,
        "decrease" => 0.5,
        "disable" => 0.0,
        "reset" | "neutral" => 1.0,
        other => match other.parse::<f64>() {
            Ok(v) if v.is_finite() && v >= 0.0 => v,
            _ => {
                warn!(raw_value = %raw, "未知的目标调节关键字,按 1.0 处理");
                1.0
            }
        },
    }
}

// ==========================================
// ConstraintModifiers - 调节系数表
// ==========================================
// 未配置的项系数为 1.0
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstraintModifiers {
    factors: BTreeMap<ObjectiveTerm, f64>,
}

impl ConstraintModifiers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, term: ObjectiveTerm, factor: f64) {
        self.factors.insert(term, factor);
    }

    /// 按关键字设置
    pub fn set_keyword(&mut self, term: ObjectiveTerm, keyword: &str) {
        self.set(term, parse_modifier(keyword));
    }

    pub fn factor(&self, term: ObjectiveTerm) -> f64 {
        self.factors.get(&term).copied().unwrap_or(1.0)
    }

    /// 调节后的整数系数
    pub fn scale(&self, term: ObjectiveTerm, base: i64) -> i64 {
        (base as f64 * self.factor(term)).round() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords() {
        assert_eq!(parse_modifier("increase"), 1.5);
        assert_eq!(parse_modifier(" Strong_Increase "), 2.0);
        assert_eq!(parse_modifier("decrease"), 0.5);
        assert_eq!(parse_modifier("disable"), 0.0);
        assert_eq!(parse_modifier("reset"), 1.0);
        assert_eq!(parse_modifier("neutral"), 1.0);
        assert_eq!(parse_modifier("1.25"), 1.25);
    }

    #[test]
    fn test_unknown_keyword_is_neutral() {
        assert_eq!(parse_modifier("much_more"), 1.0);
        assert_eq!(parse_modifier("-3"), 1.0);
        assert_eq!(parse_modifier(""), 1.0);
    }

    #[test]
    fn test_scale() {
        let mut m = ConstraintModifiers::new();
        m.set_keyword(ObjectiveTerm::Fairness, "increase");
        m.set_keyword(ObjectiveTerm::Affinity, "disable");
        assert_eq!(m.scale(ObjectiveTerm::Fairness, 20), 30);
        assert_eq!(m.scale(ObjectiveTerm::Affinity, 100), 0);
        assert_eq!(m.scale(ObjectiveTerm::Coverage, 10000), 10000);
        assert_eq!(ObjectiveTerm::parse("DISRUPTION"), Some(ObjectiveTerm::Disruption));
    }
}
