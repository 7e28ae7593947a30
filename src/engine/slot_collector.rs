// ==========================================
// 科研评估槽位系统 - 槽位汇总器（贪心）
// ==========================================
// 职责: 单个作者在给定槽位配额内按点数密度贪心选取
// 规则:
// - 按 点数/槽位 降序，密度相同按出版物 ID 升序
// - 累加至配额恰好用满 / 下一条会超出（按策略处理）/ 条目耗尽
// - 已选槽位合计永不超过配额
// 红线: 只读缓存，不写入
// ==========================================

use crate::domain::score::ScoreCacheEntry;
use crate::engine::error::EvaluationResult;
use crate::repository::ScoreCacheReader;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;

/// 遇到会超出配额的条目时的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OverflowPolicy {
    /// 立即停止
    Stop,
    /// 跳过该条目，继续尝试更小的条目
    #[default]
    SkipAndContinue,
}

/// 汇总选项
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectorOptions {
    pub overflow_policy: OverflowPolicy,
    /// 单条最低点数（不含）以下的条目不参与
    pub min_points: Option<Decimal>,
    /// 只统计指定学科
    pub discipline_id: Option<String>,
}

/// 汇总结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionResult {
    pub total_points: Decimal,
    pub selected_publication_ids: Vec<String>,
    pub total_slot_consumed: Decimal,
    pub selected: Vec<ScoreCacheEntry>,
}

impl CollectionResult {
    /// 条目是否可计入：点数为正且出版物尚未选中
    fn admits(&self, entry: &ScoreCacheEntry) -> bool {
        entry.points > Decimal::ZERO
            && !self
                .selected_publication_ids
                .iter()
                .any(|id| id == &entry.publication_id)
    }

    fn take(&mut self, entry: ScoreCacheEntry) {
        self.total_slot_consumed += entry.slot;
        self.total_points += entry.points;
        self.selected_publication_ids
            .push(entry.publication_id.clone());
        self.selected.push(entry);
    }
}

fn compare_by_density(a: &ScoreCacheEntry, b: &ScoreCacheEntry) -> Ordering {
    // 槽位为 0 的条目排最前（不占配额）
    let da = a.density();
    let db = b.density();
    match (da, db) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => y.cmp(&x),
    }
    .then_with(|| a.publication_id.cmp(&b.publication_id))
    .then_with(|| a.discipline_id.cmp(&b.discipline_id))
}

/// 贪心选取
///
/// # 参数
/// - entries: 候选缓存行（调用方已按作者/年度过滤）
/// - quota: 槽位配额，≤ 0 时结果为空
/// - policy: 超出配额时的处理方式
pub fn select_greedy(
    mut entries: Vec<ScoreCacheEntry>,
    quota: Decimal,
    policy: OverflowPolicy,
) -> CollectionResult {
    let mut result = CollectionResult::default();
    if quota <= Decimal::ZERO {
        return result;
    }

    entries.sort_by(compare_by_density);

    for entry in entries {
        if result.total_slot_consumed == quota {
            break;
        }
        // 重复出版物与非正点数条目不参与配额判断
        if !result.admits(&entry) {
            continue;
        }
        if result.total_slot_consumed + entry.slot > quota {
            match policy {
                OverflowPolicy::Stop => break,
                OverflowPolicy::SkipAndContinue => continue,
            }
        }
        result.take(entry);
    }

    result
}

/// 不限配额选取全部可计入条目
pub fn select_all(mut entries: Vec<ScoreCacheEntry>) -> CollectionResult {
    entries.sort_by(compare_by_density);

    let mut result = CollectionResult::default();
    for entry in entries {
        if result.admits(&entry) {
            result.take(entry);
        }
    }
    result
}

// ==========================================
// SlotCollector - 基于缓存的汇总器
// ==========================================
pub struct SlotCollector {
    reader: Arc<dyn ScoreCacheReader>,
}

impl SlotCollector {
    pub fn new(reader: Arc<dyn ScoreCacheReader>) -> Self {
        Self { reader }
    }

    fn load_entries(
        &self,
        author_id: &str,
        year_from: i32,
        year_to: i32,
        options: &CollectorOptions,
    ) -> EvaluationResult<Vec<ScoreCacheEntry>> {
        let entries = self
            .reader
            .find_by_author(author_id, year_from, year_to)?
            .into_iter()
            .filter(|e| options.min_points.map_or(true, |min| e.points >= min))
            .filter(|e| {
                options
                    .discipline_id
                    .as_ref()
                    .map_or(true, |d| &e.discipline_id == d)
            })
            .collect();
        Ok(entries)
    }

    /// 在配额内汇总作者的槽位
    ///
    /// # 返回
    /// - (总点数, 选中出版物, 已用槽位)；配额为 0 或无合格条目时为 (0, [], 0)
    pub fn collect(
        &self,
        author_id: &str,
        quota: Decimal,
        year_from: i32,
        year_to: i32,
        options: &CollectorOptions,
    ) -> EvaluationResult<CollectionResult> {
        if quota <= Decimal::ZERO {
            return Ok(CollectionResult::default());
        }
        let entries = self.load_entries(author_id, year_from, year_to, options)?;
        let result = select_greedy(entries, quota, options.overflow_policy);

        tracing::debug!(
            "槽位汇总: author={}, quota={}, points={}, slot={}, selected={}",
            author_id,
            quota,
            result.total_points,
            result.total_slot_consumed,
            result.selected_publication_ids.len()
        );
        Ok(result)
    }

    /// 不限配额：汇总作者全部条目
    pub fn collect_all(
        &self,
        author_id: &str,
        year_from: i32,
        year_to: i32,
        options: &CollectorOptions,
    ) -> EvaluationResult<CollectionResult> {
        let entries = self.load_entries(author_id, year_from, year_to, options)?;
        Ok(select_all(entries))
    }
}
