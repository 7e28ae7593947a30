// ==========================================
// 科研评估槽位系统 - 点数档位登记表
// ==========================================
// 职责: 按类别/年度给出档位阈值、点数上限、HST 加成倍数
// 红线: 纯参考数据，无 I/O
// ==========================================
// 期刊论文:
//   2017-2018: Tier1 ≥ 30, Tier2 ≥ 20, Tier3 > 0
//   2019+    : Tier1 ≥ 100, Tier2 ≥ 40, Tier3 > 0
// 专著（作者）: Tier1 200-300, Tier2 80-<200, Tier3 >0-<80
// 专著（主编）: Tier1 100-150, Tier2 20-<100, Tier3 >0-<20
// 专著章节    : Tier1 50-75,   Tier2 20-<50,  Tier3 >0-<20
// ==========================================

use crate::domain::types::{PublicationCategory, Tier};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 评估周期首年
pub const FIRST_EVALUATION_YEAR: i32 = 2017;
/// 评估周期末年
pub const LAST_EVALUATION_YEAR: i32 = 2025;

/// 文章档位规则切换年度
const ARTICLE_RULES_2019: i32 = 2019;

/// 档位下限（含）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointBracket {
    pub tier: Tier,
    pub min_points: Decimal,
}

/// HST 加成：仅在原始点数恰好等于普通档位值时生效
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HstBoost {
    pub plain_points: Decimal,
    pub multiplier: Decimal,
}

// ==========================================
// RateTable - 单类别费率表
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateTable {
    pub category: PublicationCategory,
    /// 按 min_points 降序排列
    pub brackets: Vec<PointBracket>,
    /// 点数上限（含），超出则无法归档
    pub max_points: Option<Decimal>,
    pub hst_boosts: Vec<HstBoost>,
    /// Tier3 学科份额下限
    pub tier3_min_share: Decimal,
}

impl RateTable {
    fn new(
        category: PublicationCategory,
        tier1: i64,
        tier2: i64,
        max_points: Option<i64>,
        hst_boosts: &[(i64, Decimal)],
    ) -> Self {
        Self {
            category,
            brackets: vec![
                PointBracket {
                    tier: Tier::Tier1,
                    min_points: Decimal::from(tier1),
                },
                PointBracket {
                    tier: Tier::Tier2,
                    min_points: Decimal::from(tier2),
                },
                PointBracket {
                    tier: Tier::Tier3,
                    min_points: Decimal::ZERO,
                },
            ],
            max_points: max_points.map(Decimal::from),
            hst_boosts: hst_boosts
                .iter()
                .map(|(plain, multiplier)| HstBoost {
                    plain_points: Decimal::from(*plain),
                    multiplier: *multiplier,
                })
                .collect(),
            tier3_min_share: Decimal::new(1, 1),
        }
    }

    /// 按原始点数选择档位
    ///
    /// # 返回
    /// - None: 点数 ≤ 0 或超出上限
    pub fn select_tier(&self, raw_points: Decimal) -> Option<Tier> {
        if raw_points <= Decimal::ZERO {
            return None;
        }
        if let Some(max) = self.max_points {
            if raw_points > max {
                return None;
            }
        }
        self.brackets
            .iter()
            .find(|b| raw_points >= b.min_points)
            .map(|b| b.tier)
    }

    /// HST 加成倍数（非普通档位值时为 1）
    pub fn hst_multiplier(&self, raw_points: Decimal) -> Decimal {
        self.hst_boosts
            .iter()
            .find(|b| b.plain_points == raw_points)
            .map(|b| b.multiplier)
            .unwrap_or(Decimal::ONE)
    }
}

// ==========================================
// PointsRegistry - 登记表
// ==========================================
#[derive(Debug, Clone)]
pub struct PointsRegistry {
    article_2017: RateTable,
    article_2019: RateTable,
    book_authorship: RateTable,
    book_editorship: RateTable,
    chapter: RateTable,
}

impl PointsRegistry {
    pub fn new() -> Self {
        let one_and_half = Decimal::new(15, 1);
        let one_and_quarter = Decimal::new(125, 2);

        Self {
            article_2017: RateTable::new(PublicationCategory::Article, 30, 20, None, &[]),
            article_2019: RateTable::new(PublicationCategory::Article, 100, 40, None, &[]),
            book_authorship: RateTable::new(
                PublicationCategory::BookAuthorship,
                200,
                80,
                Some(300),
                &[(200, one_and_half), (80, one_and_quarter)],
            ),
            book_editorship: RateTable::new(
                PublicationCategory::BookEditorship,
                100,
                20,
                Some(150),
                &[(100, one_and_half)],
            ),
            chapter: RateTable::new(
                PublicationCategory::Chapter,
                50,
                20,
                Some(75),
                &[(50, one_and_half)],
            ),
        }
    }

    /// 年度是否在评估周期内
    pub fn is_evaluation_year(year: i32) -> bool {
        (FIRST_EVALUATION_YEAR..=LAST_EVALUATION_YEAR).contains(&year)
    }

    /// 查询类别/年度对应的费率表
    ///
    /// # 返回
    /// - None: 类别不参与槽位计算（专利、学位论文）
    pub fn rate_table(&self, category: PublicationCategory, year: i32) -> Option<&RateTable> {
        match category {
            PublicationCategory::Article if year >= ARTICLE_RULES_2019 => Some(&self.article_2019),
            PublicationCategory::Article => Some(&self.article_2017),
            PublicationCategory::BookAuthorship => Some(&self.book_authorship),
            PublicationCategory::BookEditorship => Some(&self.book_editorship),
            PublicationCategory::Chapter => Some(&self.chapter),
            PublicationCategory::Patent | PublicationCategory::Thesis => None,
        }
    }
}

impl Default for PointsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
