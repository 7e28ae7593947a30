// ==========================================
// 科研评估槽位系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::institution_config_reader::InstitutionConfigReader;
use crate::db::open_sqlite_connection;
use async_trait::async_trait;
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::{BTreeSet, HashMap};
use std::error::Error;
use std::sync::{Arc, Mutex};

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
    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
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

    /// 读取 global scope 的配置值
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        self.get_config_value(key)
    }

    /// 写入 global scope 的配置值（存在则覆盖）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        tracing::info!("配置已更新: {} = {}", key, value);
        Ok(())
    }

    /// 从 config_kv 表读取配置值，带默认值
    fn get_config_or_default(&self, key: &str, default: &str) -> Result<String, Box<dyn Error>> {
        Ok(self.get_config_value(key)?.unwrap_or_else(|| default.to_string()))
    }

    /// 读取小数配置，格式错误时回退默认值
    fn get_decimal_or_default(&self, key: &str, default: Decimal) -> Result<Decimal, Box<dyn Error>> {
        let value = self.get_config_value(key)?;
        Ok(value
            .and_then(|v| v.trim().parse::<Decimal>().ok())
            .unwrap_or(default))
    }

    /// 获取所有配置的快照（JSON格式）
    ///
    /// # 用途
    /// - 随优化运行记录配置口径
    pub fn get_config_snapshot(&self) -> Result<String, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let mut config_map: HashMap<String, String> = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        Ok(serde_json::to_string(&json!(config_map))?)
    }

    /// 从配置快照恢复配置
    ///
    /// # 返回
    /// - Ok(usize): 恢复的配置项数量
    ///
    /// # 注意
    /// - 此方法会覆盖现有的 global 配置
    pub fn restore_config_from_snapshot(&self, snapshot_json: &str) -> Result<usize, Box<dyn Error>> {
        let config_map: HashMap<String, String> = serde_json::from_str(snapshot_json)?;

        let mut conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        let tx = conn.transaction()?;

        let mut count = 0;
        for (key, value) in config_map.iter() {
            count += tx.execute(
                "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
                 ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2",
                params![key, value],
            )?;
        }

        tx.commit()?;
        Ok(count)
    }
}

// ==========================================
// InstitutionConfigReader Trait 实现
// ==========================================
#[async_trait]
impl InstitutionConfigReader for ConfigManager {
    // ===== 槽位额度 =====

    async fn get_total_slot_budget(&self) -> Result<Decimal, Box<dyn Error>> {
        self.get_decimal_or_default(config_keys::TOTAL_SLOT_BUDGET, Decimal::from(4))
    }

    async fn get_monograph_slot_budget(&self) -> Result<Decimal, Box<dyn Error>> {
        self.get_decimal_or_default(config_keys::MONOGRAPH_SLOT_BUDGET, Decimal::from(2))
    }

    async fn get_institution_slot_cap(&self) -> Result<Option<Decimal>, Box<dyn Error>> {
        let value = self.get_config_value(config_keys::INSTITUTION_SLOT_CAP)?;
        Ok(value.and_then(|v| v.trim().parse::<Decimal>().ok()))
    }

    // ===== 低分专著 =====

    async fn get_low_point_threshold(&self) -> Result<Decimal, Box<dyn Error>> {
        self.get_decimal_or_default(config_keys::LOW_POINT_THRESHOLD, Decimal::from(200))
    }

    async fn get_low_point_quota_fraction(&self) -> Result<Decimal, Box<dyn Error>> {
        self.get_decimal_or_default(config_keys::LOW_POINT_QUOTA_FRACTION, Decimal::new(2, 1))
    }

    // ===== 适用性 =====

    async fn get_hidden_correction_statuses(&self) -> Result<BTreeSet<String>, Box<dyn Error>> {
        let value = self.get_config_or_default(config_keys::HIDDEN_CORRECTION_STATUSES, "[]")?;
        match serde_json::from_str::<Vec<String>>(&value) {
            Ok(list) => Ok(list.into_iter().map(|s| s.trim().to_string()).collect()),
            Err(e) => {
                tracing::warn!("隐藏状态配置格式错误，按空集合处理: {}", e);
                Ok(BTreeSet::new())
            }
        }
    }

    async fn get_require_employment(&self) -> Result<bool, Box<dyn Error>> {
        let value = self.get_config_or_default(config_keys::REQUIRE_EMPLOYMENT, "false")?;
        Ok(matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
    }

    // ===== 运行参数 =====

    async fn get_optimizer_time_limit_secs(&self) -> Result<u64, Box<dyn Error>> {
        let value = self.get_config_or_default(config_keys::OPTIMIZER_TIME_LIMIT_SECS, "30")?;
        Ok(value.trim().parse::<u64>().unwrap_or(30))
    }

    async fn get_refresh_concurrency(&self) -> Result<usize, Box<dyn Error>> {
        let value = self.get_config_or_default(config_keys::REFRESH_CONCURRENCY, "4")?;
        Ok(value.trim().parse::<usize>().unwrap_or(4).max(1))
    }

    async fn get_refresh_max_retries(&self) -> Result<i32, Box<dyn Error>> {
        let value = self.get_config_or_default(config_keys::REFRESH_MAX_RETRIES, "3")?;
        Ok(value.trim().parse::<i32>().unwrap_or(3))
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 槽位额度
    pub const TOTAL_SLOT_BUDGET: &str = "total_slot_budget";
    pub const MONOGRAPH_SLOT_BUDGET: &str = "monograph_slot_budget";
    pub const INSTITUTION_SLOT_CAP: &str = "institution_slot_cap";

    // 低分专著
    pub const LOW_POINT_THRESHOLD: &str = "low_point_threshold";
    pub const LOW_POINT_QUOTA_FRACTION: &str = "low_point_quota_fraction";

    // 适用性
    pub const HIDDEN_CORRECTION_STATUSES: &str = "hidden_correction_statuses"; // JSON 数组
    pub const REQUIRE_EMPLOYMENT: &str = "require_employment";

    // 运行参数
    pub const OPTIMIZER_TIME_LIMIT_SECS: &str = "optimizer_time_limit_secs";
    pub const REFRESH_CONCURRENCY: &str = "refresh_concurrency";
    pub const REFRESH_MAX_RETRIES: &str = "refresh_max_retries";
}
