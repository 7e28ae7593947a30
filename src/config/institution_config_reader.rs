// ==========================================
// 科研评估槽位系统 - 机构配置读取 Trait
// ==========================================
// 职责: 定义引擎所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::config::institution_config::InstitutionConfig;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use std::error::Error;

// ==========================================
// InstitutionConfigReader Trait
// ==========================================
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait InstitutionConfigReader: Send + Sync {
    // ===== 槽位额度 =====

    /// 每位作者槽位上限
    ///
    /// # 默认值
    /// - 4
    async fn get_total_slot_budget(&self) -> Result<Decimal, Box<dyn Error>>;

    /// 每位作者专著槽位上限
    ///
    /// # 默认值
    /// - 2
    async fn get_monograph_slot_budget(&self) -> Result<Decimal, Box<dyn Error>>;

    /// 机构槽位总上限（未配置表示不限）
    async fn get_institution_slot_cap(&self) -> Result<Option<Decimal>, Box<dyn Error>>;

    // ===== 低分专著 =====

    /// 低分专著阈值（部委点数严格小于该值）
    ///
    /// # 默认值
    /// - 200
    async fn get_low_point_threshold(&self) -> Result<Decimal, Box<dyn Error>>;

    /// 低分专著占比上限
    ///
    /// # 默认值
    /// - 0.2
    async fn get_low_point_quota_fraction(&self) -> Result<Decimal, Box<dyn Error>>;

    // ===== 适用性 =====

    /// 隐藏的更正状态集合
    ///
    /// # 配置格式
    /// JSON 数组: ["HIDDEN", "WITHDRAWN"]
    async fn get_hidden_correction_statuses(&self) -> Result<BTreeSet<String>, Box<dyn Error>>;

    /// 是否要求作者在职
    ///
    /// # 默认值
    /// - false
    async fn get_require_employment(&self) -> Result<bool, Box<dyn Error>>;

    // ===== 运行参数 =====

    /// 优化器时限（秒）
    async fn get_optimizer_time_limit_secs(&self) -> Result<u64, Box<dyn Error>>;

    /// 缓存重建并发数
    async fn get_refresh_concurrency(&self) -> Result<usize, Box<dyn Error>>;

    /// 重建任务最大重试次数
    async fn get_refresh_max_retries(&self) -> Result<i32, Box<dyn Error>>;

    /// 读取全部配置并组装快照
    async fn load_institution_config(&self) -> Result<InstitutionConfig, Box<dyn Error>> {
        // 逐项绑定，避免错误值跨 await 存活
        let total_slot_budget = self.get_total_slot_budget().await?;
        let monograph_slot_budget = self.get_monograph_slot_budget().await?;
        let low_point_threshold = self.get_low_point_threshold().await?;
        let low_point_quota_fraction = self.get_low_point_quota_fraction().await?;
        let hidden_correction_statuses = self.get_hidden_correction_statuses().await?;
        let require_employment = self.get_require_employment().await?;
        let institution_slot_cap = self.get_institution_slot_cap().await?;
        let optimizer_time_limit_secs = self.get_optimizer_time_limit_secs().await?;
        let refresh_concurrency = self.get_refresh_concurrency().await?;
        let refresh_max_retries = self.get_refresh_max_retries().await?;

        Ok(InstitutionConfig {
            total_slot_budget,
            monograph_slot_budget,
            low_point_threshold,
            low_point_quota_fraction,
            hidden_correction_statuses,
            require_employment,
            institution_slot_cap,
            optimizer_time_limit_secs,
            refresh_concurrency,
            refresh_max_retries,
        })
    }
}
