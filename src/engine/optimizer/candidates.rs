// ==========================================
// 科研评估槽位系统 - 优化候选与约束构造
// ==========================================
// 职责: 缓存行 → 整数化候选 → 与求解器无关的选择问题
// 整数化: 槽位与点数均按 1/10000 单位换算为 i64
// ==========================================

use crate::config::InstitutionConfig;
use crate::domain::score::ScoreCacheEntry;
use crate::engine::error::{EvaluationError, EvaluationResult};
use crate::engine::slot_calculator::round_score;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};

/// 整数化单位（1 槽位 = 10000 单位）
pub const SCALE: i64 = 10_000;

/// Decimal → 整数单位（先按 4 位小数舍入）
pub fn to_units(value: Decimal) -> EvaluationResult<i64> {
    (round_score(value) * Decimal::from(SCALE))
        .trunc()
        .to_i64()
        .ok_or_else(|| EvaluationError::Solver(format!("数值超出整数化范围: {}", value)))
}

/// 整数单位 → Decimal
pub fn from_units(units: i64) -> Decimal {
    Decimal::new(units, 4).normalize()
}

// ==========================================
// Candidate - 候选
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub entry: ScoreCacheEntry,
    pub slot_units: i64,
    pub point_units: i64,
    pub is_monograph: bool,
    pub is_low_point_monograph: bool,
}

/// 由缓存行生成候选（点数为 0 的行不参与）
pub fn build_candidates(
    entries: Vec<ScoreCacheEntry>,
    config: &InstitutionConfig,
) -> EvaluationResult<Vec<Candidate>> {
    let mut candidates = Vec::with_capacity(entries.len());
    for entry in entries {
        if entry.points <= Decimal::ZERO || entry.slot < Decimal::ZERO {
            continue;
        }
        let is_monograph = entry.is_monograph();
        candidates.push(Candidate {
            slot_units: to_units(entry.slot)?,
            point_units: to_units(entry.points)?,
            is_monograph,
            is_low_point_monograph: is_monograph && config.is_low_point(entry.raw_points),
            entry,
        });
    }
    // 固定顺序：求解结果与输入行顺序无关
    candidates.sort_by(|a, b| {
        a.entry
            .author_id
            .cmp(&b.entry.author_id)
            .then_with(|| a.entry.publication_id.cmp(&b.entry.publication_id))
            .then_with(|| a.entry.discipline_id.cmp(&b.entry.discipline_id))
    });
    Ok(candidates)
}

// ==========================================
// SelectionProblem - 与求解器无关的 0/1 选择问题
// ==========================================

/// 单个决策变量
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProblemItem {
    pub slot: i64,
    pub points: i64,
    /// 作者下标
    pub author: usize,
    /// 互斥组下标：同一 (出版物, 作者) 至多选一个
    pub group: usize,
    pub is_monograph: bool,
    pub is_low: bool,
}

/// 低点数专著配额：low × denominator ≤ numerator × total
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LowQuota {
    pub numerator: i128,
    pub denominator: i128,
}

impl LowQuota {
    /// 由比例（如 0.2）构造有理数形式
    pub fn from_fraction(fraction: Decimal) -> Self {
        let normalized = fraction.normalize();
        Self {
            numerator: normalized.mantissa(),
            denominator: 10i128.pow(normalized.scale()),
        }
    }

    pub fn holds(&self, low_count: usize, total_count: usize) -> bool {
        (low_count as i128) * self.denominator <= self.numerator * (total_count as i128)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectionProblem {
    pub items: Vec<ProblemItem>,
    pub author_slot_limits: Vec<i64>,
    pub author_monograph_limits: Vec<i64>,
    pub low_quota: LowQuota,
    pub institution_slot_cap: Option<i64>,
    pub group_count: usize,
}

impl SelectionProblem {
    pub fn author_count(&self) -> usize {
        self.author_slot_limits.len()
    }

    /// 目标值
    pub fn value(&self, chosen: &[bool]) -> i64 {
        self.items
            .iter()
            .zip(chosen)
            .filter(|(_, c)| **c)
            .map(|(item, _)| item.points)
            .sum()
    }

    /// 检查全部约束，返回违反项描述
    pub fn violations(&self, chosen: &[bool]) -> Vec<String> {
        let mut violations = Vec::new();
        if chosen.len() != self.items.len() {
            violations.push(format!(
                "选择向量长度 {} 与候选数 {} 不一致",
                chosen.len(),
                self.items.len()
            ));
            return violations;
        }

        let mut slot_used = vec![0i64; self.author_count()];
        let mut mono_used = vec![0i64; self.author_count()];
        let mut group_used = vec![false; self.group_count];
        let mut total = 0usize;
        let mut low = 0usize;
        let mut all_slots = 0i64;

        for (item, _) in self.items.iter().zip(chosen).filter(|(_, c)| **c) {
            slot_used[item.author] += item.slot;
            if item.is_monograph {
                mono_used[item.author] += item.slot;
            }
            if group_used[item.group] {
                violations.push(format!("互斥组 {} 选中多个候选", item.group));
            }
            group_used[item.group] = true;
            total += 1;
            if item.is_low {
                low += 1;
            }
            all_slots += item.slot;
        }

        for author in 0..self.author_count() {
            if slot_used[author] > self.author_slot_limits[author] {
                violations.push(format!(
                    "作者 {} 槽位 {} 超出上限 {}",
                    author, slot_used[author], self.author_slot_limits[author]
                ));
            }
            if mono_used[author] > self.author_monograph_limits[author] {
                violations.push(format!(
                    "作者 {} 专著槽位 {} 超出上限 {}",
                    author, mono_used[author], self.author_monograph_limits[author]
                ));
            }
        }
        if !self.low_quota.holds(low, total) {
            violations.push(format!("低点数专著 {} 超出配额（共选中 {}）", low, total));
        }
        if let Some(cap) = self.institution_slot_cap {
            if all_slots > cap {
                violations.push(format!("机构槽位 {} 超出上限 {}", all_slots, cap));
            }
        }
        violations
    }

    pub fn is_feasible(&self, chosen: &[bool]) -> bool {
        self.violations(chosen).is_empty()
    }

    /// 只保留指定作者的子问题（去掉机构级耦合约束）
    ///
    /// # 返回
    /// - (子问题, 子问题下标 → 原问题下标)
    pub fn author_subproblem(&self, author: usize) -> (SelectionProblem, Vec<usize>) {
        let mapping: Vec<usize> = (0..self.items.len())
            .filter(|&i| self.items[i].author == author)
            .collect();
        let mut groups: BTreeMap<usize, usize> = BTreeMap::new();
        let items = mapping
            .iter()
            .map(|&i| {
                let item = self.items[i];
                let next = groups.len();
                let group = *groups.entry(item.group).or_insert(next);
                ProblemItem {
                    author: 0,
                    group,
                    ..item
                }
            })
            .collect();

        let sub = SelectionProblem {
            items,
            author_slot_limits: vec![self.author_slot_limits[author]],
            author_monograph_limits: vec![self.author_monograph_limits[author]],
            // 1 × low ≤ 1 × total 恒成立
            low_quota: LowQuota {
                numerator: 1,
                denominator: 1,
            },
            institution_slot_cap: None,
            group_count: groups.len(),
        };
        (sub, mapping)
    }
}

/// 由候选构造选择问题
///
/// # 参数
/// - author_slot_limits: 作者槽位上限覆盖（如兼职人员）
pub fn build_problem(
    candidates: &[Candidate],
    config: &InstitutionConfig,
    author_slot_limits: &HashMap<String, Decimal>,
) -> EvaluationResult<(SelectionProblem, Vec<String>)> {
    let mut author_index: BTreeMap<String, usize> = BTreeMap::new();
    for c in candidates {
        let next = author_index.len();
        author_index.entry(c.entry.author_id.clone()).or_insert(next);
    }
    let mut authors = vec![String::new(); author_index.len()];
    for (author, index) in &author_index {
        authors[*index] = author.clone();
    }

    let default_total = to_units(config.total_slot_budget)?;
    let monograph = to_units(config.monograph_slot_budget)?;
    let mut slot_limits = Vec::with_capacity(authors.len());
    for author in &authors {
        let limit = match author_slot_limits.get(author) {
            Some(v) => to_units(*v)?,
            None => default_total,
        };
        slot_limits.push(limit);
    }
    let monograph_limits = slot_limits.iter().map(|l| monograph.min(*l)).collect();

    let mut group_index: HashMap<(String, String), usize> = HashMap::new();
    let mut items = Vec::with_capacity(candidates.len());
    for c in candidates {
        let next = group_index.len();
        let group = *group_index
            .entry((c.entry.publication_id.clone(), c.entry.author_id.clone()))
            .or_insert(next);
        let author = author_index
            .get(&c.entry.author_id)
            .copied()
            .ok_or_else(|| EvaluationError::Solver(format!("未知作者 {}", c.entry.author_id)))?;
        items.push(ProblemItem {
            slot: c.slot_units,
            points: c.point_units,
            author,
            group,
            is_monograph: c.is_monograph,
            is_low: c.is_low_point_monograph,
        });
    }

    let institution_slot_cap = match config.institution_slot_cap {
        Some(cap) => Some(to_units(cap)?),
        None => None,
    };

    let problem = SelectionProblem {
        items,
        author_slot_limits: slot_limits,
        author_monograph_limits: monograph_limits,
        low_quota: LowQuota::from_fraction(config.low_point_quota_fraction),
        institution_slot_cap,
        group_count: group_index.len(),
    };
    Ok((problem, authors))
}
