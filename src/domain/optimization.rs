// ==========================================
// 科研评估槽位系统 - 最优申报组合记录
// ==========================================
// 职责: 一次组合优化运行的不可变记录
// 红线: 创建后不再修改
// ==========================================

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 运行结束方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OptimizationStatus {
    Optimal,   // 已证明最优
    TimedOut,  // 超时，返回当前最好解
    Cancelled, // 被取消，返回当前最好解
}

impl OptimizationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptimizationStatus::Optimal => "OPTIMAL",
            OptimizationStatus::TimedOut => "TIMED_OUT",
            OptimizationStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for OptimizationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OptimizationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPTIMAL" => Ok(OptimizationStatus::Optimal),
            "TIMED_OUT" => Ok(OptimizationStatus::TimedOut),
            "CANCELLED" => Ok(OptimizationStatus::Cancelled),
            other => Err(format!("未知优化状态: {}", other)),
        }
    }
}

/// 被选中的候选
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedCandidate {
    pub publication_id: String,
    pub author_id: String,
    pub discipline_id: String,
    pub slot: Decimal,
    pub points: Decimal,
    pub is_monograph: bool,
    pub is_low_point_monograph: bool,
}

/// 作者槽位使用情况（供取消计入建议工具使用）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorSlotUsage {
    pub author_id: String,
    pub slot_limit: Decimal,
    pub slot_used: Decimal,
    pub monograph_slot_used: Decimal,
    pub points: Decimal,
}

impl AuthorSlotUsage {
    pub fn slot_free(&self) -> Decimal {
        (self.slot_limit - self.slot_used).max(Decimal::ZERO)
    }
}

// ==========================================
// OptimizationRun - 优化运行记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationRun {
    pub run_id: String,
    pub year_from: i32,
    pub year_to: i32,
    pub status: OptimizationStatus,
    pub is_optimal: bool,
    pub total_points: Decimal,
    pub best_bound: Decimal, // 目标值上界（已证明最优时等于 total_points）
    pub candidate_count: usize,
    pub selected: Vec<SelectedCandidate>,
    pub author_usage: Vec<AuthorSlotUsage>,
    pub low_monograph_count: usize,
    pub elapsed_ms: i64,
    pub created_at: String,
}

impl OptimizationRun {
    /// 目标值与上界之差
    pub fn gap(&self) -> Decimal {
        (self.best_bound - self.total_points).max(Decimal::ZERO)
    }

    pub fn selected_count(&self) -> usize {
        self.selected.len()
    }
}
