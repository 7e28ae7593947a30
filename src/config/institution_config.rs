// ==========================================
// 科研评估槽位系统 - 机构评估配置
// ==========================================
// 职责: 一次评估运行使用的不可变配置快照
// 来源: ConfigManager::load_institution_config
// ==========================================

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ==========================================
// InstitutionConfig - 机构配置
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstitutionConfig {
    pub total_slot_budget: Decimal,          // 每位作者槽位上限: 4.0
    pub monograph_slot_budget: Decimal,      // 每位作者专著槽位上限: 2.0
    pub low_point_threshold: Decimal,        // 低分专著阈值（部委点数）: 200
    pub low_point_quota_fraction: Decimal,   // 低分专著占比上限: 0.2
    pub hidden_correction_statuses: BTreeSet<String>, // 隐藏状态集合
    pub require_employment: bool,            // 是否要求在职
    pub institution_slot_cap: Option<Decimal>, // 机构槽位总上限（可选）
    pub optimizer_time_limit_secs: u64,      // 优化器时限: 30s
    pub refresh_concurrency: usize,          // 缓存重建并发数: 4
    pub refresh_max_retries: i32,            // 重建任务最大重试次数: 3
}

impl Default for InstitutionConfig {
    fn default() -> Self {
        Self {
            total_slot_budget: Decimal::from(4),
            monograph_slot_budget: Decimal::from(2),
            low_point_threshold: Decimal::from(200),
            low_point_quota_fraction: Decimal::new(2, 1),
            hidden_correction_statuses: BTreeSet::new(),
            require_employment: false,
            institution_slot_cap: None,
            optimizer_time_limit_secs: 30,
            refresh_concurrency: 4,
            refresh_max_retries: 3,
        }
    }
}

impl InstitutionConfig {
    /// 更正状态是否处于隐藏集合
    pub fn is_hidden_status(&self, status: &str) -> bool {
        self.hidden_correction_statuses.contains(status)
    }

    /// 原始点数是否属于低分专著
    pub fn is_low_point(&self, raw_points: Decimal) -> bool {
        raw_points < self.low_point_threshold
    }
}
