// ==========================================
// 科研评估槽位系统 - 适用性分派
// ==========================================
// 职责: 判定出版物是否参与槽位计算，并选择档位计算器
// 红线: 纯函数，无 I/O、无副作用
// ==========================================
// 不适用条件（按判定顺序）:
// 1. 专利（永不计入）/ 学位论文（不支持的类别）
// 2. 多中心出版物（独立排名通道）
// 3. 更正状态处于机构隐藏集合
// 4. 年度不在评估周期
// 5. 点数为 0 / 超出类别上限
// 6. 专著同时有作者与主编 / 无相关角色贡献者
// ==========================================

use crate::domain::publication::Publication;
use crate::domain::types::{PublicationCategory, Tier};
use crate::engine::error::EvaluationError;
use crate::engine::points_registry::PointsRegistry;
use crate::engine::slot_calculator::SlotCalculator;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// ==========================================
// NotApplicableReason - 不适用原因
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotApplicableReason {
    Patent,
    UnsupportedCategory(PublicationCategory),
    MultiCenter,
    HiddenCorrectionStatus(String),
    YearOutOfRange(i32),
    NoPoints,
    PointsOutOfRange(Decimal),
    MixedAuthorsAndEditors,
    NoContributors,
}

impl NotApplicableReason {
    /// 是否静默跳过（不记录为告警）
    pub fn is_silent(&self) -> bool {
        matches!(self, NotApplicableReason::UnsupportedCategory(_))
    }
}

impl fmt::Display for NotApplicableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotApplicableReason::Patent => write!(f, "PATENT: 专利不计入槽位"),
            NotApplicableReason::UnsupportedCategory(c) => {
                write!(f, "UNSUPPORTED_CATEGORY: {}", c)
            }
            NotApplicableReason::MultiCenter => write!(f, "MULTI_CENTER: 多中心出版物单独排名"),
            NotApplicableReason::HiddenCorrectionStatus(s) => {
                write!(f, "HIDDEN_CORRECTION_STATUS: {}", s)
            }
            NotApplicableReason::YearOutOfRange(y) => write!(f, "YEAR_OUT_OF_RANGE: {}", y),
            NotApplicableReason::NoPoints => write!(f, "NO_POINTS: 点数为 0"),
            NotApplicableReason::PointsOutOfRange(p) => {
                write!(f, "POINTS_OUT_OF_RANGE: {} 无法归入任何档位", p)
            }
            NotApplicableReason::MixedAuthorsAndEditors => {
                write!(f, "MIXED_AUTHORS_AND_EDITORS: 专著同时有作者与主编")
            }
            NotApplicableReason::NoContributors => write!(f, "NO_CONTRIBUTORS: 无相关角色贡献者"),
        }
    }
}

// ==========================================
// DispatchContext - 分派上下文
// ==========================================
#[derive(Debug, Clone, Copy)]
pub struct DispatchContext<'a> {
    pub hidden_correction_statuses: &'a BTreeSet<String>,
    /// 出版物的合格学科中同时存在 HST 与非 HST 学科
    pub multiple_disciplines: bool,
    /// 作者角色贡献者数
    pub author_count: usize,
    /// 主编角色贡献者数
    pub editor_count: usize,
}

// ==========================================
// SlotAdaptation - 分派结果（封闭联合）
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub enum SlotAdaptation {
    Tier1(SlotCalculator),
    Tier2(SlotCalculator),
    Tier3(SlotCalculator),
    NotApplicable(NotApplicableReason),
}

impl SlotAdaptation {
    pub fn calculator(&self) -> Option<&SlotCalculator> {
        match self {
            SlotAdaptation::Tier1(c) | SlotAdaptation::Tier2(c) | SlotAdaptation::Tier3(c) => {
                Some(c)
            }
            SlotAdaptation::NotApplicable(_) => None,
        }
    }

    pub fn is_applicable(&self) -> bool {
        !matches!(self, SlotAdaptation::NotApplicable(_))
    }

    /// 转为 Result，不适用时返回 EvaluationError::NotApplicable
    pub fn into_result(self) -> Result<SlotCalculator, EvaluationError> {
        match self {
            SlotAdaptation::Tier1(c) | SlotAdaptation::Tier2(c) | SlotAdaptation::Tier3(c) => Ok(c),
            SlotAdaptation::NotApplicable(reason) => Err(EvaluationError::NotApplicable(reason)),
        }
    }
}

/// 分派：选择档位计算器或给出不适用原因
///
/// # 参数
/// - registry: 点数登记表
/// - publication: 出版物
/// - ctx: 分派上下文（机构隐藏集合、多学科模式、角色计数）
pub fn adapt(
    registry: &PointsRegistry,
    publication: &Publication,
    ctx: &DispatchContext<'_>,
) -> SlotAdaptation {
    let not_applicable = SlotAdaptation::NotApplicable;

    match publication.category {
        PublicationCategory::Patent => return not_applicable(NotApplicableReason::Patent),
        PublicationCategory::Thesis => {
            return not_applicable(NotApplicableReason::UnsupportedCategory(
                publication.category,
            ))
        }
        _ => {}
    }

    if publication.multi_center {
        return not_applicable(NotApplicableReason::MultiCenter);
    }

    if ctx
        .hidden_correction_statuses
        .contains(&publication.correction_status)
    {
        return not_applicable(NotApplicableReason::HiddenCorrectionStatus(
            publication.correction_status.clone(),
        ));
    }

    if !PointsRegistry::is_evaluation_year(publication.year) {
        return not_applicable(NotApplicableReason::YearOutOfRange(publication.year));
    }

    let table = match registry.rate_table(publication.category, publication.year) {
        Some(t) => t,
        None => {
            return not_applicable(NotApplicableReason::UnsupportedCategory(
                publication.category,
            ))
        }
    };

    if publication.raw_points <= Decimal::ZERO {
        return not_applicable(NotApplicableReason::NoPoints);
    }

    let tier = match table.select_tier(publication.raw_points) {
        Some(t) => t,
        None => return not_applicable(NotApplicableReason::PointsOutOfRange(publication.raw_points)),
    };

    let relevant_count = match publication.category {
        PublicationCategory::BookAuthorship | PublicationCategory::BookEditorship
            if ctx.author_count > 0 && ctx.editor_count > 0 =>
        {
            return not_applicable(NotApplicableReason::MixedAuthorsAndEditors)
        }
        PublicationCategory::BookEditorship => ctx.editor_count,
        _ => ctx.author_count,
    };
    if relevant_count == 0 {
        return not_applicable(NotApplicableReason::NoContributors);
    }

    let calculator = SlotCalculator::new(table.clone(), tier, ctx.multiple_disciplines);
    match tier {
        Tier::Tier1 => SlotAdaptation::Tier1(calculator),
        Tier::Tier2 => SlotAdaptation::Tier2(calculator),
        Tier::Tier3 => SlotAdaptation::Tier3(calculator),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn create_test_publication(category: PublicationCategory, points: &str) -> Publication {
        Publication::new("P1", 2020, category, Decimal::from_str(points).unwrap())
    }

    fn ctx(hidden: &BTreeSet<String>) -> DispatchContext<'_> {
        DispatchContext {
            hidden_correction_statuses: hidden,
            multiple_disciplines: false,
            author_count: 2,
            editor_count: 0,
        }
    }

    #[test]
    fn test_patent_always_not_applicable() {
        let registry = PointsRegistry::new();
        let hidden = BTreeSet::new();
        for points in ["0", "5", "100", "300"] {
            for year in [2017, 2020, 2025] {
                let mut p = create_test_publication(PublicationCategory::Patent, points);
                p.year = year;
                assert_eq!(
                    adapt(&registry, &p, &ctx(&hidden)),
                    SlotAdaptation::NotApplicable(NotApplicableReason::Patent)
                );
            }
        }
    }

    #[test]
    fn test_hidden_status_round_trip() {
        let registry = PointsRegistry::new();
        let hidden: BTreeSet<String> = ["HIDDEN".to_string()].into_iter().collect();
        let mut p = create_test_publication(PublicationCategory::Article, "100");

        p.correction_status = "HIDDEN".to_string();
        assert!(matches!(
            adapt(&registry, &p, &ctx(&hidden)),
            SlotAdaptation::NotApplicable(NotApplicableReason::HiddenCorrectionStatus(_))
        ));

        p.correction_status = "VISIBLE".to_string();
        assert!(matches!(
            adapt(&registry, &p, &ctx(&hidden)),
            SlotAdaptation::Tier1(_)
        ));
    }

    #[test]
    fn test_table_of_outcomes() {
        let registry = PointsRegistry::new();
        let hidden = BTreeSet::new();

        let cases: Vec<(PublicationCategory, &str, &str)> = vec![
            (PublicationCategory::Article, "100", "TIER1"),
            (PublicationCategory::Article, "70", "TIER2"),
            (PublicationCategory::Article, "20", "TIER3"),
            (PublicationCategory::Article, "0", "NO_POINTS"),
            (PublicationCategory::BookAuthorship, "350", "POINTS_OUT_OF_RANGE"),
            (PublicationCategory::Thesis, "100", "UNSUPPORTED_CATEGORY"),
            (PublicationCategory::Chapter, "20", "TIER2"),
        ];

        for (category, points, expected) in cases {
            let p = create_test_publication(category, points);
            let label = match adapt(&registry, &p, &ctx(&hidden)) {
                SlotAdaptation::Tier1(_) => "TIER1".to_string(),
                SlotAdaptation::Tier2(_) => "TIER2".to_string(),
                SlotAdaptation::Tier3(_) => "TIER3".to_string(),
                SlotAdaptation::NotApplicable(r) => {
                    r.to_string().split(':').next().unwrap().to_string()
                }
            };
            assert_eq!(label, expected, "{:?} {}", category, points);
        }
    }

    #[test]
    fn test_multi_center_and_year_range() {
        let registry = PointsRegistry::new();
        let hidden = BTreeSet::new();

        let mut p = create_test_publication(PublicationCategory::Article, "100");
        p.multi_center = true;
        assert_eq!(
            adapt(&registry, &p, &ctx(&hidden)),
            SlotAdaptation::NotApplicable(NotApplicableReason::MultiCenter)
        );

        let mut p = create_test_publication(PublicationCategory::Article, "100");
        p.year = 2016;
        assert_eq!(
            adapt(&registry, &p, &ctx(&hidden)),
            SlotAdaptation::NotApplicable(NotApplicableReason::YearOutOfRange(2016))
        );
    }

    #[test]
    fn test_book_roles() {
        let registry = PointsRegistry::new();
        let hidden = BTreeSet::new();
        let p = create_test_publication(PublicationCategory::BookEditorship, "100");

        let mixed = DispatchContext {
            author_count: 1,
            editor_count: 1,
            ..ctx(&hidden)
        };
        assert_eq!(
            adapt(&registry, &p, &mixed),
            SlotAdaptation::NotApplicable(NotApplicableReason::MixedAuthorsAndEditors)
        );

        let authors_only = DispatchContext {
            author_count: 2,
            editor_count: 0,
            ..ctx(&hidden)
        };
        assert_eq!(
            adapt(&registry, &p, &authors_only),
            SlotAdaptation::NotApplicable(NotApplicableReason::NoContributors)
        );

        let editors_only = DispatchContext {
            author_count: 0,
            editor_count: 2,
            ..ctx(&hidden)
        };
        assert!(adapt(&registry, &p, &editors_only).is_applicable());
    }

    #[test]
    fn test_multiple_disciplines_wires_hst_flag() {
        let registry = PointsRegistry::new();
        let hidden = BTreeSet::new();
        let p = create_test_publication(PublicationCategory::BookAuthorship, "200");
        let with_mode = DispatchContext {
            multiple_disciplines: true,
            ..ctx(&hidden)
        };
        let calc = adapt(&registry, &p, &with_mode).into_result().unwrap();
        assert!(calc.hst_multiplier_enabled);
        assert_eq!(calc.tier, Tier::Tier1);

        let calc = adapt(&registry, &p, &ctx(&hidden)).into_result().unwrap();
        assert!(!calc.hst_multiplier_enabled);
    }
}
