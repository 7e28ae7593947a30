// ==========================================
// 科研评估槽位系统 - 槽位/点数计算器
// ==========================================
// 职责: 对 (出版物, 作者份额, 学科) 计算 (槽位, 加权点数)
// 组合方式: {费率表, 档位, HST 加成开关} + 单一计算函数
// ==========================================
// 学科份额 u（k = 学科内合格作者数, m = 作者总数）:
//   Tier1: u = 1
//   Tier2: u = √(k/m)
//   Tier3: u = max(k/m, 0.1)
// 学科点数 PKd = P × 加成 × u，学科槽位 = u
// 作者点数 PKdAut = PKd / k，作者槽位 = u / k
// 全部结果保留 4 位小数
// ==========================================

use crate::domain::discipline::Discipline;
use crate::domain::publication::Publication;
use crate::domain::score::SlotScore;
use crate::domain::types::Tier;
use crate::engine::points_registry::RateTable;
use rust_decimal::{Decimal, MathematicalOps, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// 结果小数位
pub const SCORE_DECIMAL_PLACES: u32 = 4;

/// 统一舍入（四舍五入，保留 4 位）
pub fn round_score(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(SCORE_DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

// ==========================================
// AuthorShare - 作者份额上下文
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorShare {
    /// k: 该学科内合格作者数
    pub authors_in_discipline: u32,
    /// m: 作者总数（含不合格/外单位作者）
    pub total_authors: u32,
}

impl AuthorShare {
    /// 构造份额上下文（k 至少为 1，m 至少为 k）
    pub fn new(authors_in_discipline: u32, total_authors: u32) -> Self {
        let k = authors_in_discipline.max(1);
        Self {
            authors_in_discipline: k,
            total_authors: total_authors.max(k),
        }
    }

    /// k / m
    pub fn ratio(&self) -> Decimal {
        Decimal::from(self.authors_in_discipline) / Decimal::from(self.total_authors)
    }
}

// ==========================================
// SlotCalculator - 计算器
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotCalculator {
    pub rate_table: RateTable,
    pub tier: Tier,
    /// 多学科模式：HST 学科在普通档位值上获得加成
    pub hst_multiplier_enabled: bool,
}

impl SlotCalculator {
    pub fn new(rate_table: RateTable, tier: Tier, hst_multiplier_enabled: bool) -> Self {
        Self {
            rate_table,
            tier,
            hst_multiplier_enabled,
        }
    }

    /// 学科份额 u（未舍入）
    pub fn discipline_share(&self, share: &AuthorShare) -> Decimal {
        let ratio = share.ratio();
        match self.tier {
            Tier::Tier1 => Decimal::ONE,
            Tier::Tier2 => ratio.sqrt().unwrap_or(ratio),
            Tier::Tier3 => ratio.max(self.rate_table.tier3_min_share),
        }
    }

    /// 加成倍数
    ///
    /// # 规则
    /// - 仅当开启多学科模式且学科为 HST 时生效
    /// - 仅对普通档位值生效（已加成的点数不再加成）
    pub fn multiplier(&self, publication: &Publication, discipline: &Discipline) -> Decimal {
        if self.hst_multiplier_enabled && discipline.is_hst() {
            self.rate_table.hst_multiplier(publication.raw_points)
        } else {
            Decimal::ONE
        }
    }

    /// 学科级结果 (学科槽位, PKd)
    pub fn compute_discipline(
        &self,
        publication: &Publication,
        share: &AuthorShare,
        discipline: &Discipline,
    ) -> SlotScore {
        let u = self.discipline_share(share);
        let points = publication.raw_points * self.multiplier(publication, discipline) * u;
        SlotScore {
            slot: round_score(u),
            points: round_score(points),
        }
    }

    /// 作者级结果 (槽位, PKdAut)
    ///
    /// 确定性：相同输入总是得到相同结果
    pub fn compute(
        &self,
        publication: &Publication,
        share: &AuthorShare,
        discipline: &Discipline,
    ) -> SlotScore {
        let u = self.discipline_share(share);
        let k = Decimal::from(share.authors_in_discipline);
        let points = publication.raw_points * self.multiplier(publication, discipline) * u;
        SlotScore {
            slot: round_score(u / k),
            points: round_score(points / k),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::PublicationCategory;
    use crate::engine::points_registry::PointsRegistry;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn create_test_discipline(code: &str) -> Discipline {
        Discipline {
            discipline_id: format!("D-{}", code),
            code: code.to_string(),
            name: "测试学科".to_string(),
        }
    }

    fn create_test_calculator(category: PublicationCategory, year: i32, points: &str) -> SlotCalculator {
        let registry = PointsRegistry::new();
        let table = registry.rate_table(category, year).cloned().unwrap();
        let tier = table.select_tier(d(points)).unwrap();
        SlotCalculator::new(table, tier, false)
    }

    /// 两位作者分属不同学科（k=1, m=2）
    fn compute_two_authors(year: i32, points: &str) -> SlotScore {
        let calc = create_test_calculator(PublicationCategory::Article, year, points);
        let p = Publication::new("P1", year, PublicationCategory::Article, d(points));
        calc.compute(&p, &AuthorShare::new(1, 2), &create_test_discipline("2.7"))
    }

    // ==========================================
    // 文章档位计算
    // ==========================================

    #[test]
    fn test_article_2019_values() {
        let cases = [
            ("200", "200", "1"),
            ("70", "49.4975", "0.7071"),
            ("40", "28.2843", "0.7071"),
            ("20", "10", "0.5"),
            ("5", "2.5", "0.5"),
        ];
        for (points, expected_points, expected_slot) in cases {
            let r = compute_two_authors(2019, points);
            assert_eq!(r.points, d(expected_points), "points for {}", points);
            assert_eq!(r.slot, d(expected_slot), "slot for {}", points);
        }
    }

    #[test]
    fn test_article_2017_values() {
        let cases = [
            ("30", "30", "1"),
            ("20", "14.1421", "0.7071"),
            ("25", "17.6777", "0.7071"),
            ("15", "7.5", "0.5"),
        ];
        for (points, expected_points, expected_slot) in cases {
            let r = compute_two_authors(2017, points);
            assert_eq!(r.points, d(expected_points), "points for {}", points);
            assert_eq!(r.slot, d(expected_slot), "slot for {}", points);
        }
    }

    #[test]
    fn test_split_between_authors_of_same_discipline() {
        // Tier3, k=2, m=4: u = 0.5, 每位作者 0.25 槽位
        let calc = create_test_calculator(PublicationCategory::Article, 2020, "20");
        let p = Publication::new("P1", 2020, PublicationCategory::Article, d("20"));
        let r = calc.compute(&p, &AuthorShare::new(2, 4), &create_test_discipline("2.7"));
        assert_eq!(r.slot, d("0.25"));
        assert_eq!(r.points, d("5"));
    }

    #[test]
    fn test_tier3_min_share_floor() {
        // k/m = 1/20 = 0.05 < 0.1
        let calc = create_test_calculator(PublicationCategory::Article, 2020, "20");
        let p = Publication::new("P1", 2020, PublicationCategory::Article, d("20"));
        let r = calc.compute(&p, &AuthorShare::new(1, 20), &create_test_discipline("2.7"));
        assert_eq!(r.slot, d("0.1"));
        assert_eq!(r.points, d("2"));
    }

    // ==========================================
    // HST 加成
    // ==========================================

    #[test]
    fn test_hst_multiplier_200_vs_205() {
        let registry = PointsRegistry::new();
        let table = registry
            .rate_table(PublicationCategory::BookAuthorship, 2020)
            .cloned()
            .unwrap();
        let calc = SlotCalculator::new(table, Tier::Tier1, true);
        let hst = create_test_discipline("5.3");

        let p200 = Publication::new("P1", 2020, PublicationCategory::BookAuthorship, d("200"));
        assert_eq!(calc.multiplier(&p200, &hst), d("1.5"));

        let p205 = Publication::new("P2", 2020, PublicationCategory::BookAuthorship, d("205"));
        assert_eq!(calc.multiplier(&p205, &hst), Decimal::ONE);

        // 非 HST 学科不加成
        assert_eq!(calc.multiplier(&p200, &create_test_discipline("2.7")), Decimal::ONE);
    }

    #[test]
    fn test_chapter_mixed_hst_and_non_hst() {
        let registry = PointsRegistry::new();
        let table = registry
            .rate_table(PublicationCategory::Chapter, 2020)
            .cloned()
            .unwrap();
        let calc = SlotCalculator::new(table, Tier::Tier1, true);
        let p = Publication::new("P1", 2020, PublicationCategory::Chapter, d("50"));
        let share = AuthorShare::new(1, 2);

        let hst = calc.compute(&p, &share, &create_test_discipline("1.2"));
        let other = calc.compute(&p, &share, &create_test_discipline("6.5"));
        assert_eq!(hst.points, d("75"));
        assert_eq!(other.points, d("50"));
        assert_eq!(hst.slot, Decimal::ONE);
    }

    #[test]
    fn test_compute_is_deterministic() {
        let calc = create_test_calculator(PublicationCategory::Article, 2019, "70");
        let p = Publication::new("P1", 2019, PublicationCategory::Article, d("70"));
        let share = AuthorShare::new(2, 7);
        let discipline = create_test_discipline("2.7");
        let first = calc.compute(&p, &share, &discipline);
        for _ in 0..10 {
            assert_eq!(calc.compute(&p, &share, &discipline), first);
        }
    }
}
