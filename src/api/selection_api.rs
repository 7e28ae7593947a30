// ==========================================
// 科研评估槽位系统 - 槽位查询与选择 API
// ==========================================
// 职责: 缓存查询、槽位汇总、组合优化与运行记录
// 红线: 只读缓存；优化运行记录只插入
// ==========================================

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::api::error::{ApiError, ApiResult};
use crate::domain::optimization::OptimizationRun;
use crate::domain::score::{DisciplineScoreEntry, ScoreCacheEntry};
use crate::engine::optimizer::{OptimizerOptions, SlotOptimizer};
use crate::engine::slot_collector::{CollectionResult, CollectorOptions, SlotCollector};
use crate::repository::{OptimizationRunRepository, ScoreCacheReader};

/// 单次查询运行记录的最大条数
const MAX_RUN_LIST: usize = 200;

// ==========================================
// SelectionApi
// ==========================================
pub struct SelectionApi {
    reader: Arc<dyn ScoreCacheReader>,
    collector: SlotCollector,
    optimizer: Arc<SlotOptimizer>,
    run_repo: Arc<OptimizationRunRepository>,
}

impl SelectionApi {
    pub fn new(
        reader: Arc<dyn ScoreCacheReader>,
        optimizer: Arc<SlotOptimizer>,
        run_repo: Arc<OptimizationRunRepository>,
    ) -> Self {
        Self {
            collector: SlotCollector::new(reader.clone()),
            reader,
            optimizer,
            run_repo,
        }
    }

    fn check_years(year_from: i32, year_to: i32) -> ApiResult<()> {
        if year_from > year_to {
            return Err(ApiError::InvalidInput(format!(
                "年度区间无效: {} > {}",
                year_from, year_to
            )));
        }
        Ok(())
    }

    // ==========================================
    // 缓存查询
    // ==========================================

    pub fn get_publication_scores(&self, publication_id: &str) -> ApiResult<Vec<ScoreCacheEntry>> {
        Ok(self.reader.find_by_publication(publication_id)?)
    }

    pub fn get_publication_discipline_scores(
        &self,
        publication_id: &str,
    ) -> ApiResult<Vec<DisciplineScoreEntry>> {
        Ok(self.reader.find_discipline_scores(publication_id)?)
    }

    pub fn get_author_scores(
        &self,
        author_id: &str,
        year_from: i32,
        year_to: i32,
    ) -> ApiResult<Vec<ScoreCacheEntry>> {
        Self::check_years(year_from, year_to)?;
        Ok(self.reader.find_by_author(author_id, year_from, year_to)?)
    }

    pub fn get_discipline_scores(
        &self,
        discipline_id: &str,
        year_from: i32,
        year_to: i32,
    ) -> ApiResult<Vec<ScoreCacheEntry>> {
        Self::check_years(year_from, year_to)?;
        Ok(self
            .reader
            .find_by_discipline(discipline_id, year_from, year_to)?)
    }

    // ==========================================
    // 槽位汇总
    // ==========================================

    /// 作者在配额内能填满多少槽位
    pub fn collect_slots(
        &self,
        author_id: &str,
        quota: Decimal,
        year_from: i32,
        year_to: i32,
        options: &CollectorOptions,
    ) -> ApiResult<CollectionResult> {
        Self::check_years(year_from, year_to)?;
        if quota < Decimal::ZERO {
            return Err(ApiError::InvalidInput(format!("槽位配额不能为负: {}", quota)));
        }
        Ok(self
            .collector
            .collect(author_id, quota, year_from, year_to, options)?)
    }

    /// 不限配额汇总
    pub fn collect_all_slots(
        &self,
        author_id: &str,
        year_from: i32,
        year_to: i32,
        options: &CollectorOptions,
    ) -> ApiResult<CollectionResult> {
        Self::check_years(year_from, year_to)?;
        Ok(self
            .collector
            .collect_all(author_id, year_from, year_to, options)?)
    }

    // ==========================================
    // 组合优化
    // ==========================================

    /// 运行组合优化并记录结果
    ///
    /// # 返回
    /// - Err(ApiError::Infeasible): 配置互相矛盾
    pub async fn run_optimization(
        &self,
        year_from: i32,
        year_to: i32,
        options: OptimizerOptions,
    ) -> ApiResult<OptimizationRun> {
        Self::check_years(year_from, year_to)?;
        let run = self
            .optimizer
            .clone()
            .optimize_async(year_from, year_to, options)
            .await?;
        Ok(run)
    }

    pub fn get_run(&self, run_id: &str) -> ApiResult<OptimizationRun> {
        self.run_repo
            .find_by_id(run_id)?
            .ok_or_else(|| ApiError::NotFound(format!("优化运行(id={})不存在", run_id)))
    }

    pub fn list_runs(&self, limit: usize) -> ApiResult<Vec<OptimizationRun>> {
        Ok(self.run_repo.list_recent(limit.min(MAX_RUN_LIST))?)
    }
}
