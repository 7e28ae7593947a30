// ==========================================
// 科研评估槽位系统 - 学科与作者学科申报
// ==========================================
// 职责: 学科参考数据、作者按年度的学科申报及其不变量
// ==========================================

use crate::domain::types::ScientificDomain;
use crate::domain::validation::{ValidationError, Violation};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ==========================================
// Discipline - 学科
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discipline {
    pub discipline_id: String,
    pub code: String, // 如 "05.3"
    pub name: String,
}

impl Discipline {
    pub fn domain(&self) -> Option<ScientificDomain> {
        ScientificDomain::from_discipline_code(&self.code)
    }

    /// 是否属于 HST 学科
    pub fn is_hst(&self) -> bool {
        self.domain().map(|d| d.is_hst()).unwrap_or(false)
    }
}

// ==========================================
// AuthorDisciplineAssignment - 作者学科申报
// ==========================================
// 不变量: primary ≠ secondary; (author_id, year) 唯一; 份额合计 ≤ 100
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorDisciplineAssignment {
    pub author_id: String,
    pub year: i32,
    pub primary_discipline_id: String,
    pub secondary_discipline_id: Option<String>,
    pub primary_percent: Decimal,
    pub secondary_percent: Option<Decimal>,
}

impl AuthorDisciplineAssignment {
    /// 单学科申报（100%）
    pub fn single(author_id: &str, year: i32, discipline_id: &str) -> Self {
        Self {
            author_id: author_id.to_string(),
            year,
            primary_discipline_id: discipline_id.to_string(),
            secondary_discipline_id: None,
            primary_percent: Decimal::ONE_HUNDRED,
            secondary_percent: None,
        }
    }

    /// 双学科申报
    pub fn dual(
        author_id: &str,
        year: i32,
        primary: &str,
        secondary: &str,
        primary_percent: Decimal,
    ) -> Self {
        Self {
            author_id: author_id.to_string(),
            year,
            primary_discipline_id: primary.to_string(),
            secondary_discipline_id: Some(secondary.to_string()),
            primary_percent,
            secondary_percent: Some(Decimal::ONE_HUNDRED - primary_percent),
        }
    }

    pub fn is_dual(&self) -> bool {
        self.secondary_discipline_id.is_some()
    }

    /// 学科是否属于本次申报
    pub fn contains(&self, discipline_id: &str) -> bool {
        self.primary_discipline_id == discipline_id
            || self.secondary_discipline_id.as_deref() == Some(discipline_id)
    }

    /// 校验申报不变量
    ///
    /// # 返回
    /// - Ok(()): 校验通过
    /// - Err(ValidationError): 所有违规项
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut violations = Vec::new();

        if self.secondary_discipline_id.as_deref() == Some(self.primary_discipline_id.as_str()) {
            violations.push(Violation::new(
                "SAME_PRIMARY_SECONDARY",
                format!(
                    "主学科与第二学科相同: author={}, year={}, discipline={}",
                    self.author_id, self.year, self.primary_discipline_id
                ),
            ));
        }

        let secondary = self.secondary_percent.unwrap_or(Decimal::ZERO);
        if self.primary_percent < Decimal::ZERO || secondary < Decimal::ZERO {
            violations.push(Violation::new(
                "NEGATIVE_SPLIT",
                format!("学科份额不能为负: author={}, year={}", self.author_id, self.year),
            ));
        }
        if self.primary_percent + secondary > Decimal::ONE_HUNDRED {
            violations.push(Violation::new(
                "SPLIT_OVER_100",
                format!(
                    "学科份额合计超过100%: author={}, year={}, total={}",
                    self.author_id,
                    self.year,
                    self.primary_percent + secondary
                ),
            ));
        }
        if self.secondary_discipline_id.is_none() && self.secondary_percent.is_some() {
            violations.push(Violation::new(
                "SPLIT_WITHOUT_SECONDARY",
                format!("未申报第二学科却设置了份额: author={}", self.author_id),
            ));
        }

        ValidationError::from_violations(violations)
    }
}
