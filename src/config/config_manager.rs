// ==========================================
// 外勤人员排班系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::scheduler_config::SchedulerConfig;
use crate::db::open_sqlite_connection;
use rusqlite::{params, Connection};
use serde_json::json;
use std::collections::HashMap;
use std::error::Error;
use std::sync::{Arc, Mutex};
use tracing::debug;

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 写入 global scope 配置（存在则覆盖）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2",
            params![key, value],
        )?;
        Ok(())
    }

    /// 读取 global scope 全部配置（单条查询）
    pub fn get_all_global(&self) -> Result<HashMap<String, String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut config_map = HashMap::new();
        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }
        Ok(config_map)
    }

    /// 获取所有配置的快照（JSON格式）
    ///
    /// # 用途
    /// - 排班运行记录中保存原始配置,便于复现
    pub fn get_config_snapshot(&self) -> Result<String, Box<dyn Error>> {
        let config_map = self.get_all_global()?;
        Ok(serde_json::to_string(&json!(config_map))?)
    }

    /// 加载排班配置: 默认值 + config_kv 覆写
    pub fn load_scheduler_config(&self) -> Result<SchedulerConfig, Box<dyn Error>> {
        let kv = self.get_all_global()?;
        let mut config = SchedulerConfig::default();
        config.apply_overrides(&kv);
        debug!(override_count = kv.len(), "排班配置加载完成");
        Ok(config)
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 求解器
    pub const SOLVER_TIME_LIMIT_MS: &str = "solver_time_limit_ms";
    pub const SOLVER_NUM_WORKERS: &str = "solver_num_workers";
    pub const SOLVER_RANDOM_SEED: &str = "solver_random_seed";

    // 容量
    pub const DAILY_MAX_EVENTS: &str = "daily_max_events";
    pub const CATEGORY_CAP_PREFIX: &str = "category_cap/"; // category_cap/<CATEGORY>
    pub const FULL_DAY_CATEGORIES: &str = "full_day_categories"; // 逗号分隔
    pub const DEFAULT_WEEKLY_MINUTES: &str = "default_weekly_minutes";

    // 时区
    pub const UTC_OFFSET_MINUTES: &str = "utc_offset_minutes";

    // 目标函数权重
    pub const WEIGHT_PLACEMENT: &str = "weight_placement";
    pub const WEIGHT_URGENCY: &str = "weight_urgency";
    pub const WEIGHT_FAIRNESS: &str = "weight_fairness";
    pub const FAIRNESS_BLOCK_MINUTES: &str = "fairness_block_minutes";
    pub const FAIRNESS_MAX_BLOCKS: &str = "fairness_max_blocks";
    pub const WEIGHT_BUMP: &str = "weight_bump";
    pub const WEIGHT_AFFINITY: &str = "weight_affinity";
    pub const WEIGHT_ROTATION: &str = "weight_rotation";

    // 目标项调节: constraint_modifier/<term>
    pub const CONSTRAINT_MODIFIER_PREFIX: &str = "constraint_modifier/";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::constraint_modifier::ObjectiveTerm;

    fn manager() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_schema(&conn).unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[test]
    fn test_load_with_overrides() {
        let mgr = manager();
        mgr.set_global_config_value(config_keys::DAILY_MAX_EVENTS, "2").unwrap();
        mgr.set_global_config_value("constraint_modifier/urgency", "disable").unwrap();
        let cfg = mgr.load_scheduler_config().unwrap();
        assert_eq!(cfg.capacity.daily_max_events, 2);
        assert_eq!(cfg.coefficient(ObjectiveTerm::Urgency), 0);
    }

    #[test]
    fn test_set_overwrites_and_snapshot() {
        let mgr = manager();
        mgr.set_global_config_value("utc_offset_minutes", "60").unwrap();
        mgr.set_global_config_value("utc_offset_minutes", "-300").unwrap();
        assert_eq!(
            mgr.get_global_config_value("utc_offset_minutes").unwrap(),
            Some("-300".to_string())
        );
        assert_eq!(mgr.get_global_config_value("missing").unwrap(), None);
        let snapshot = mgr.get_config_snapshot().unwrap();
        assert!(snapshot.contains("utc_offset_minutes"));
    }
}
