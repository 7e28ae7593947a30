// ==========================================
// 科研评估槽位系统 - 数据录入校验
// ==========================================
// 职责: 结构化校验失败（写入同一事务内检查，失败即拒绝写入）
// ==========================================

use crate::domain::discipline::AuthorDisciplineAssignment;
use crate::domain::publication::{AuthorContribution, Publication};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 单条违规
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub code: String,
    pub message: String,
}

impl Violation {
    pub fn new(code: &str, message: String) -> Self {
        Self {
            code: code.to_string(),
            message,
        }
    }
}

/// 校验失败（可包含多条违规）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub violations: Vec<Violation>,
}

impl ValidationError {
    pub fn single(code: &str, message: String) -> Self {
        Self {
            violations: vec![Violation::new(code, message)],
        }
    }

    /// 空违规列表视为通过
    pub fn from_violations(violations: Vec<Violation>) -> Result<(), ValidationError> {
        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { violations })
        }
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.violations.iter().any(|v| v.code == code)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .violations
            .iter()
            .map(|v| format!("[{}] {}", v.code, v.message))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

impl std::error::Error for ValidationError {}

/// 校验作者贡献
///
/// # 参数
/// - contribution: 待写入的贡献
/// - publication: 所属出版物
/// - assignment: 作者在出版年度的学科申报
/// - other_share_total: 同一出版物其他贡献的份额合计
///
/// # 规则
/// - 份额 ∈ [0, 100]，且同一出版物份额合计 ≤ 100
/// - 申报学科必须是作者该年度的主学科或第二学科
pub fn validate_contribution(
    contribution: &AuthorContribution,
    publication: &Publication,
    assignment: Option<&AuthorDisciplineAssignment>,
    other_share_total: Decimal,
) -> Result<(), ValidationError> {
    let mut violations = Vec::new();

    if contribution.share_percent < Decimal::ZERO
        || contribution.share_percent > Decimal::ONE_HUNDRED
    {
        violations.push(Violation::new(
            "SHARE_OUT_OF_RANGE",
            format!(
                "贡献份额超出 [0, 100]: publication={}, author={}, share={}",
                contribution.publication_id, contribution.author_id, contribution.share_percent
            ),
        ));
    } else if other_share_total + contribution.share_percent > Decimal::ONE_HUNDRED {
        violations.push(Violation::new(
            "SHARE_TOTAL_OVER_100",
            format!(
                "出版物贡献份额合计超过100%: publication={}, total={}",
                contribution.publication_id,
                other_share_total + contribution.share_percent
            ),
        ));
    }

    if let Some(discipline_id) = contribution.discipline_id.as_deref() {
        match assignment {
            None => violations.push(Violation::new(
                "DISCIPLINE_NOT_DECLARED",
                format!(
                    "作者 {} 在 {} 年无学科申报，不能声明学科 {}",
                    contribution.author_id, publication.year, discipline_id
                ),
            )),
            Some(a) if !a.contains(discipline_id) => violations.push(Violation::new(
                "DISCIPLINE_NOT_DECLARED",
                format!(
                    "学科 {} 不是作者 {} 在 {} 年申报的学科",
                    discipline_id, contribution.author_id, publication.year
                ),
            )),
            Some(_) => {}
        }
    }

    ValidationError::from_violations(violations)
}
