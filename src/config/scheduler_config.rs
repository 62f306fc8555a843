// ==========================================
// 外勤人员排班系统 - 排班配置
// ==========================================
// 职责: 排班运行参数（默认值 + config_kv 覆写）
// 规则: 配置值格式错误 → 保留默认值并记录警告
// ==========================================

use crate::config::config_manager::config_keys;
use crate::config::constraint_modifier::{ConstraintModifiers, ObjectiveTerm};
use crate::domain::capacity::CapacityRules;
use crate::domain::types::EventCategory;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;
use tracing::warn;

// ==========================================
// ObjectiveWeights - 目标函数基础权重
// ==========================================
// 说明: 全部为整数系数; 覆盖奖励需远大于其它项之和
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveWeights {
    pub placement_reward: i64,      // 每安排一个活动的奖励
    pub urgency_per_day: i64,       // 距最早可用日每推迟一天的惩罚
    pub fairness_weight: i64,       // 负荷分段惩罚基数（第 j 段权重 = j × 基数）
    pub fairness_block_minutes: u32, // 负荷分段长度（分钟）
    pub fairness_max_blocks: u32,   // 每名员工最多分段数
    pub bump_reward: i64,           // 保持上次建议（员工+日期）的奖励
    pub affinity_weight: i64,       // 亲和度系数
    pub rotation_reward: i64,       // 命中轮值默认人选的奖励
}

impl Default for ObjectiveWeights {
    fn default() -> Self {
        Self {
            placement_reward: 10_000,
            urgency_per_day: 5,
            fairness_weight: 20,
            fairness_block_minutes: 120,
            fairness_max_blocks: 24,
            bump_reward: 600,
            affinity_weight: 100,
            rotation_reward: 50,
        }
    }
}

// ==========================================
// SchedulerConfig - 排班运行配置
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    // ===== 求解器 =====
    pub time_limit_ms: u64,
    pub num_workers: usize,
    pub random_seed: u64,

    // ===== 容量 =====
    pub capacity: CapacityRules,
    pub default_weekly_minutes: u32,

    // ===== 时区 =====
    pub utc_offset_minutes: i32, // 业务所在时区相对 UTC 的固定偏移

    // ===== 目标函数 =====
    pub weights: ObjectiveWeights,
    pub modifiers: ConstraintModifiers,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            time_limit_ms: 30_000,
            num_workers: 2,
            random_seed: 42,
            capacity: CapacityRules::default(),
            default_weekly_minutes: 2_400,
            utc_offset_minutes: 0,
            weights: ObjectiveWeights::default(),
            modifiers: ConstraintModifiers::default(),
        }
    }
}

impl SchedulerConfig {
    /// 业务时区下的今天
    pub fn today(&self) -> NaiveDate {
        self.today_at(Utc::now())
    }

    /// 指定 UTC 时刻在业务时区下的日期
    pub fn today_at(&self, now: DateTime<Utc>) -> NaiveDate {
        match FixedOffset::east_opt(self.utc_offset_minutes * 60) {
            Some(offset) => now.with_timezone(&offset).date_naive(),
            None => {
                warn!(
                    utc_offset_minutes = self.utc_offset_minutes,
                    "时区偏移超出范围,按 UTC 计算"
                );
                now.date_naive()
            }
        }
    }

    /// 求解线程数（限制在 1..=4）
    pub fn effective_workers(&self) -> usize {
        self.num_workers.clamp(1, 4)
    }

    /// 调节后的目标函数系数
    pub fn coefficient(&self, term: ObjectiveTerm) -> i64 {
        let base = match term {
            ObjectiveTerm::Coverage => self.weights.placement_reward,
            ObjectiveTerm::Urgency => self.weights.urgency_per_day,
            ObjectiveTerm::Fairness => self.weights.fairness_weight,
            ObjectiveTerm::Disruption => self.weights.bump_reward,
            ObjectiveTerm::Affinity => self.weights.affinity_weight,
            ObjectiveTerm::Rotation => self.weights.rotation_reward,
        };
        self.modifiers.scale(term, base)
    }

    /// 应用 config_kv 覆写
    ///
    /// # 参数
    /// - `kv`: global scope 下的全部键值
    pub fn apply_overrides(&mut self, kv: &HashMap<String, String>) {
        override_value(kv, config_keys::SOLVER_TIME_LIMIT_MS, &mut self.time_limit_ms);
        override_value(kv, config_keys::SOLVER_NUM_WORKERS, &mut self.num_workers);
        override_value(kv, config_keys::SOLVER_RANDOM_SEED, &mut self.random_seed);
        override_value(kv, config_keys::DAILY_MAX_EVENTS, &mut self.capacity.daily_max_events);
        override_value(kv, config_keys::DEFAULT_WEEKLY_MINUTES, &mut self.default_weekly_minutes);
        override_value(kv, config_keys::UTC_OFFSET_MINUTES, &mut self.utc_offset_minutes);

        let w = &mut self.weights;
        override_value(kv, config_keys::WEIGHT_PLACEMENT, &mut w.placement_reward);
        override_value(kv, config_keys::WEIGHT_URGENCY, &mut w.urgency_per_day);
        override_value(kv, config_keys::WEIGHT_FAIRNESS, &mut w.fairness_weight);
        override_value(kv, config_keys::FAIRNESS_BLOCK_MINUTES, &mut w.fairness_block_minutes);
        override_value(kv, config_keys::FAIRNESS_MAX_BLOCKS, &mut w.fairness_max_blocks);
        override_value(kv, config_keys::WEIGHT_BUMP, &mut w.bump_reward);
        override_value(kv, config_keys::WEIGHT_AFFINITY, &mut w.affinity_weight);
        override_value(kv, config_keys::WEIGHT_ROTATION, &mut w.rotation_reward);

        if w.fairness_block_minutes == 0 {
            warn!(
                config_key = config_keys::FAIRNESS_BLOCK_MINUTES,
                "负荷分段长度不能为 0,使用默认值"
            );
            w.fairness_block_minutes = ObjectiveWeights::default().fairness_block_minutes;
        }

        for category in EventCategory::ALL {
            let key = format!("{}{}", config_keys::CATEGORY_CAP_PREFIX, category.to_db_str());
            if let Some(raw) = kv.get(&key) {
                match raw.trim().parse::<u32>() {
                    Ok(v) => {
                        self.capacity.category_caps.insert(category, v);
                    }
                    Err(_) => warn!(config_key = %key, raw_value = %raw, "类别上限配置格式错误,使用默认值"),
                }
            }
        }

        if let Some(raw) = kv.get(config_keys::FULL_DAY_CATEGORIES) {
            let mut parsed = BTreeSet::new();
            let mut ok = true;
            for part in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                match EventCategory::parse(part) {
                    Some(c) => {
                        parsed.insert(c);
                    }
                    None => ok = false,
                }
            }
            if ok {
                self.capacity.full_day_categories = parsed;
            } else {
                warn!(
                    config_key = config_keys::FULL_DAY_CATEGORIES,
                    raw_value = %raw,
                    "全天类别配置包含未知类别,使用默认值"
                );
            }
        }

        for term in ObjectiveTerm::ALL {
            let key = format!("{}{}", config_keys::CONSTRAINT_MODIFIER_PREFIX, term.as_str());
            if let Some(raw) = kv.get(&key) {
                self.modifiers.set_keyword(term, raw);
            }
        }
    }
}

/// 解析单个配置值; 格式错误保留原值
fn override_value<T: FromStr>(kv: &HashMap<String, String>, key: &str, target: &mut T) {
    if let Some(raw) = kv.get(key) {
        match raw.trim().parse::<T>() {
            Ok(v) => *target = v,
            Err(_) => warn!(config_key = key, raw_value = %raw, "配置格式错误,使用默认值"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn kv(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let cfg = SchedulerConfig::default();
        assert_eq!(cfg.capacity.daily_max_events, 3);
        assert_eq!(cfg.capacity.category_cap(EventCategory::Supervisor), 3);
        assert!(cfg.capacity.is_full_day(EventCategory::Specialty));
        assert_eq!(cfg.effective_workers(), 2);
    }

    #[test]
    fn test_overrides_and_malformed_values() {
        let mut cfg = SchedulerConfig::default();
        cfg.apply_overrides(&kv(&[
            ("solver_time_limit_ms", "5000"),
            ("solver_num_workers", "lots"),
            ("category_cap/SUPPORT", "1"),
            ("full_day_categories", "SPECIALTY, CORE"),
            ("constraint_modifier/fairness", "strong_increase"),
        ]));
        assert_eq!(cfg.time_limit_ms, 5000);
        assert_eq!(cfg.num_workers, 2);
        assert_eq!(cfg.capacity.category_cap(EventCategory::Support), 1);
        assert!(cfg.capacity.is_full_day(EventCategory::Core));
        assert_eq!(cfg.coefficient(ObjectiveTerm::Fairness), 40);
    }

    #[test]
    fn test_full_day_with_unknown_category_keeps_default() {
        let mut cfg = SchedulerConfig::default();
        cfg.apply_overrides(&kv(&[("full_day_categories", "SPECIALTY,BOGUS")]));
        assert!(cfg.capacity.is_full_day(EventCategory::Specialty));
        assert!(!cfg.capacity.is_full_day(EventCategory::Core));
    }

    #[test]
    fn test_today_uses_fixed_offset() {
        // UTC 2026-10-19 23:30 → UTC+8 已是 10-20, UTC-5 仍是 10-19
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 23, 30, 0).unwrap();
        let mut cfg = SchedulerConfig::default();
        cfg.utc_offset_minutes = 480;
        assert_eq!(cfg.today_at(now), NaiveDate::from_ymd_opt(2026, 10, 20).unwrap());
        cfg.utc_offset_minutes = -300;
        assert_eq!(cfg.today_at(now), NaiveDate::from_ymd_opt(2026, 10, 19).unwrap());
    }

    #[test]
    fn test_workers_clamped() {
        let mut cfg = SchedulerConfig::default();
        cfg.num_workers = 16;
        assert_eq!(cfg.effective_workers(), 4);
        cfg.num_workers = 0;
        assert_eq!(cfg.effective_workers(), 1);
    }
}
