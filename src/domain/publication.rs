// ==========================================
// 科研评估槽位系统 - 出版物与作者贡献
// ==========================================
// 职责: 外部数据录入的出版物与作者贡献实体
// 红线: 不含数据访问逻辑
// ==========================================

use crate::domain::types::{ContributionRole, PublicationCategory};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ==========================================
// Publication - 出版物
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publication {
    pub publication_id: String,
    pub year: i32,
    pub category: PublicationCategory,
    pub raw_points: Decimal,          // 部委点数
    pub correction_status: String,    // 更正/可见性状态
    pub multi_center: bool,           // 多中心出版物（独立排名通道）
    pub total_authors: Option<u32>,   // 申报的作者总数（含外单位）
}

impl Publication {
    pub fn new(
        publication_id: &str,
        year: i32,
        category: PublicationCategory,
        raw_points: Decimal,
    ) -> Self {
        Self {
            publication_id: publication_id.to_string(),
            year,
            category,
            raw_points,
            correction_status: String::new(),
            multi_center: false,
            total_authors: None,
        }
    }
}

// ==========================================
// AuthorContribution - 作者贡献
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorContribution {
    pub publication_id: String,
    pub author_id: String,
    pub role: ContributionRole,
    pub discipline_id: Option<String>, // 申报学科
    pub share_percent: Decimal,        // 贡献份额（%）
    pub affiliated: bool,              // 署名本单位
    pub employed: bool,                // 本单位在职
    pub pinned: bool,                  // 计入评估
}

impl AuthorContribution {
    /// 是否参与槽位计算
    ///
    /// # 规则
    /// - 署名本单位
    /// - 已标记计入评估
    /// - 已申报学科
    /// - require_employment=true 时还须本单位在职
    pub fn qualifies(&self, require_employment: bool) -> bool {
        self.affiliated
            && self.pinned
            && self.discipline_id.is_some()
            && (!require_employment || self.employed)
    }
}
