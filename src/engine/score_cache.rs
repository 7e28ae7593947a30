// ==========================================
// 科研评估槽位系统 - 一致性缓存服务
// ==========================================
// 职责: 槽位/点数缓存的唯一写入方
// - rebuild: 删除出版物全部缓存行后按 分派 + 计算 重新生成
// - invalidate_on: 解析受影响出版物并入队重建
// 并发:
// - 同一出版物的重建串行（按出版物加锁）
// - 不同出版物可并行（行集合不相交）
// - 严格全量重建独占（写闸门）
// 失败语义:
// - 不支持的类别静默跳过（视为无槽位）
// - 数据不一致的行记录告警并跳过，批次继续
// - 严格模式下任何不一致中止整个批次，缓存保持原状
// ==========================================

use crate::config::InstitutionConfig;
use crate::domain::discipline::Discipline;
use crate::domain::publication::{AuthorContribution, Publication};
use crate::domain::score::{DisciplineScoreEntry, ScoreCacheEntry};
use crate::domain::types::{ContributionRole, PublicationCategory};
use crate::engine::error::{EvaluationError, EvaluationResult};
use crate::engine::events::{CacheEventPublisher, CacheInvalidationEvent};
use crate::engine::points_registry::PointsRegistry;
use crate::engine::refresh_queue::{RefreshTask, ScoreRefreshQueue};
use crate::engine::slot_calculator::AuthorShare;
use crate::engine::slot_dispatcher::{adapt, DispatchContext, NotApplicableReason, SlotAdaptation};
use crate::repository::{
    DisciplineRepository, PublicationRepository, RepositoryError, ScoreCacheReader,
    ScoreCacheRepository,
};
use rusqlite::Connection;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::error::Error;
use std::sync::{Arc, Mutex, RwLock};
use tracing::instrument;

// ==========================================
// 重建结果
// ==========================================

/// 单个出版物的重建结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RebuildOutcome {
    pub publication_id: String,
    /// 写入的作者级缓存行数
    pub entries_written: usize,
    /// 写入的学科级缓存行数
    pub discipline_entries_written: usize,
    /// 因数据不一致跳过的行（author_id, 原因）
    pub skipped: Vec<(String, String)>,
    /// 出版物不参与评分的原因
    pub not_applicable: Option<NotApplicableReason>,
}

/// 批量重建报告
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchRebuildReport {
    pub publications_rebuilt: usize,
    pub entries_written: usize,
    pub skipped_rows: usize,
    pub not_applicable: usize,
    /// 整体失败的出版物（publication_id, 错误）
    pub failures: Vec<(String, String)>,
}

impl BatchRebuildReport {
    fn absorb(&mut self, outcome: &RebuildOutcome) {
        self.publications_rebuilt += 1;
        self.entries_written += outcome.entries_written;
        self.skipped_rows += outcome.skipped.len();
        if outcome.not_applicable.is_some() {
            self.not_applicable += 1;
        }
    }
}

/// 单个出版物的计算结果（尚未写入）
#[derive(Debug, Default)]
struct ComputedRows {
    entries: Vec<ScoreCacheEntry>,
    discipline_entries: Vec<DisciplineScoreEntry>,
    skipped: Vec<(String, String)>,
    not_applicable: Option<NotApplicableReason>,
}

/// 已解析学科的合格贡献
struct ResolvedContribution<'a> {
    contribution: &'a AuthorContribution,
    discipline: Discipline,
}

// ==========================================
// ScoreCacheService - 一致性缓存
// ==========================================
pub struct ScoreCacheService {
    publication_repo: Arc<PublicationRepository>,
    discipline_repo: Arc<DisciplineRepository>,
    cache_repo: Arc<ScoreCacheRepository>,
    queue: Arc<ScoreRefreshQueue>,
    registry: PointsRegistry,
    config: InstitutionConfig,
    publication_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    /// 单出版物重建持读锁，严格全量重建持写锁
    rebuild_gate: RwLock<()>,
}

impl ScoreCacheService {
    /// 基于共享连接创建缓存服务
    ///
    /// # 参数
    /// - conn: 数据库连接（需已执行 ensure_schema）
    /// - config: 机构配置快照
    pub fn new(conn: Arc<Mutex<Connection>>, config: InstitutionConfig) -> EvaluationResult<Self> {
        let queue = ScoreRefreshQueue::new(conn.clone())?;
        Ok(Self {
            publication_repo: Arc::new(PublicationRepository::from_connection(conn.clone())),
            discipline_repo: Arc::new(DisciplineRepository::from_connection(conn.clone())),
            cache_repo: Arc::new(ScoreCacheRepository::from_connection(conn)),
            queue: Arc::new(queue),
            registry: PointsRegistry::new(),
            config,
            publication_locks: Mutex::new(HashMap::new()),
            rebuild_gate: RwLock::new(()),
        })
    }

    pub fn config(&self) -> &InstitutionConfig {
        &self.config
    }

    pub fn queue(&self) -> Arc<ScoreRefreshQueue> {
        self.queue.clone()
    }

    /// 只读视图（汇总器、优化器、报表使用）
    pub fn reader(&self) -> Arc<dyn ScoreCacheReader> {
        self.cache_repo.clone()
    }

    fn publication_lock(&self, publication_id: &str) -> EvaluationResult<Arc<Mutex<()>>> {
        let mut locks = self
            .publication_locks
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        Ok(locks
            .entry(publication_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone())
    }

    /// 归还出版物锁：无其他持有者时从锁表移除
    ///
    /// 锁的克隆只发生在锁表互斥区内，计数检查与移除同样在互斥区内完成
    fn release_publication_lock(&self, publication_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = match self.publication_locks.lock() {
            Ok(locks) => locks,
            Err(e) => {
                tracing::warn!("出版物锁表不可用: {}", e);
                return;
            }
        };
        // 锁表与当前调用各持有一份
        if Arc::strong_count(&lock) == 2 {
            locks.remove(publication_id);
        }
    }

    #[cfg(test)]
    fn tracked_lock_count(&self) -> usize {
        self.publication_locks.lock().map(|l| l.len()).unwrap_or(0)
    }

    // ==========================================
    // 重建
    // ==========================================

    /// 重建单个出版物的缓存行
    ///
    /// 幂等：输入不变时重复执行得到相同的缓存行
    ///
    /// # 返回
    /// - Ok(RebuildOutcome): 已写入（不适用时为清空）
    /// - Err: 读取或写入失败，缓存保持原状
    #[instrument(skip(self), fields(publication_id = %publication_id))]
    pub fn rebuild(&self, publication_id: &str) -> EvaluationResult<RebuildOutcome> {
        let _gate = self
            .rebuild_gate
            .read()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        let lock = self.publication_lock(publication_id)?;
        let result = self.rebuild_exclusive(publication_id, &lock);
        self.release_publication_lock(publication_id, lock);
        result
    }

    /// 持有出版物锁执行重建
    fn rebuild_exclusive(
        &self,
        publication_id: &str,
        lock: &Mutex<()>,
    ) -> EvaluationResult<RebuildOutcome> {
        let _guard = lock
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;

        let computed = self.compute_rows(publication_id, false)?;
        self.cache_repo.replace_for_publication(
            publication_id,
            &computed.entries,
            &computed.discipline_entries,
        )?;

        match &computed.not_applicable {
            Some(reason) if reason.is_silent() => {
                tracing::debug!("出版物不参与评分: {}", reason)
            }
            Some(reason) => tracing::info!("出版物不参与评分: {}", reason),
            None => tracing::debug!(
                "缓存已重建: entries={}, disciplines={}, skipped={}",
                computed.entries.len(),
                computed.discipline_entries.len(),
                computed.skipped.len()
            ),
        }

        Ok(RebuildOutcome {
            publication_id: publication_id.to_string(),
            entries_written: computed.entries.len(),
            discipline_entries_written: computed.discipline_entries.len(),
            skipped: computed.skipped,
            not_applicable: computed.not_applicable,
        })
    }

    /// 批量重建（容错：单个出版物失败不影响其他出版物）
    pub fn rebuild_many(&self, publication_ids: &[String]) -> BatchRebuildReport {
        let mut report = BatchRebuildReport::default();
        for publication_id in publication_ids {
            match self.rebuild(publication_id) {
                Ok(outcome) => report.absorb(&outcome),
                Err(e) => {
                    tracing::warn!("出版物 {} 重建失败，继续下一个: {}", publication_id, e);
                    report.failures.push((publication_id.clone(), e.to_string()));
                }
            }
        }
        report
    }

    /// 全量重建
    ///
    /// # 参数
    /// - strict: true 时全有或全无（任何不一致中止，缓存保持原状）
    #[instrument(skip(self))]
    pub fn rebuild_all(&self, strict: bool) -> EvaluationResult<BatchRebuildReport> {
        let ids = self.publication_repo.list_ids()?;
        tracing::info!("开始全量重建: publications={}, strict={}", ids.len(), strict);

        if !strict {
            let report = self.rebuild_many(&ids);
            tracing::info!(
                "全量重建完成: rebuilt={}, entries={}, skipped={}, failures={}",
                report.publications_rebuilt,
                report.entries_written,
                report.skipped_rows,
                report.failures.len()
            );
            return Ok(report);
        }

        let _gate = self
            .rebuild_gate
            .write()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;

        let mut report = BatchRebuildReport::default();
        let mut rows = BTreeMap::new();
        for publication_id in &ids {
            let computed = self.compute_rows(publication_id, true)?;
            report.absorb(&RebuildOutcome {
                publication_id: publication_id.clone(),
                entries_written: computed.entries.len(),
                discipline_entries_written: computed.discipline_entries.len(),
                skipped: Vec::new(),
                not_applicable: computed.not_applicable,
            });
            rows.insert(
                publication_id.clone(),
                (computed.entries, computed.discipline_entries),
            );
        }

        self.cache_repo.replace_all(&rows)?;
        tracing::info!(
            "严格全量重建完成: rebuilt={}, entries={}",
            report.publications_rebuilt,
            report.entries_written
        );
        Ok(report)
    }

    /// 计算单个出版物的缓存行（不写入）
    ///
    /// # 参数
    /// - strict: true 时遇到不一致直接返回错误
    fn compute_rows(&self, publication_id: &str, strict: bool) -> EvaluationResult<ComputedRows> {
        let (publication, contributions) =
            match self.publication_repo.find_with_contributions(publication_id)? {
                Some(found) => found,
                None => return Ok(ComputedRows::default()),
            };

        let relevant_role = relevant_role(publication.category);
        let mut computed = ComputedRows::default();

        let resolved = self.resolve_contributions(&publication, &contributions, strict, &mut computed)?;

        let has_hst = resolved.iter().any(|r| r.discipline.is_hst());
        let has_other = resolved.iter().any(|r| !r.discipline.is_hst());
        let ctx = DispatchContext {
            hidden_correction_statuses: &self.config.hidden_correction_statuses,
            multiple_disciplines: has_hst && has_other,
            author_count: resolved
                .iter()
                .filter(|r| r.contribution.role == ContributionRole::Author)
                .count(),
            editor_count: resolved
                .iter()
                .filter(|r| r.contribution.role == ContributionRole::Editor)
                .count(),
        };

        let calculator = match adapt(&self.registry, &publication, &ctx) {
            SlotAdaptation::NotApplicable(reason) => {
                computed.not_applicable = Some(reason);
                return Ok(computed);
            }
            adaptation => adaptation.into_result()?,
        };

        // m: 相关角色的全部贡献者（含不合格者），不小于申报的作者总数
        let role_total = contributions
            .iter()
            .filter(|c| c.role == relevant_role)
            .count() as u32;
        let total_authors = role_total.max(publication.total_authors.unwrap_or(0));

        let mut by_discipline: BTreeMap<String, Vec<&ResolvedContribution<'_>>> = BTreeMap::new();
        for r in resolved.iter().filter(|r| r.contribution.role == relevant_role) {
            by_discipline
                .entry(r.discipline.discipline_id.clone())
                .or_default()
                .push(r);
        }

        for (discipline_id, members) in &by_discipline {
            let discipline = &members[0].discipline;
            let share = AuthorShare::new(members.len() as u32, total_authors);

            let discipline_score = calculator.compute_discipline(&publication, &share, discipline);
            computed.discipline_entries.push(DisciplineScoreEntry {
                publication_id: publication.publication_id.clone(),
                discipline_id: discipline_id.clone(),
                tier: calculator.tier,
                author_count: share.authors_in_discipline,
                slot: discipline_score.slot,
                points: discipline_score.points,
            });

            let author_score = calculator.compute(&publication, &share, discipline);
            for member in members {
                computed.entries.push(ScoreCacheEntry {
                    publication_id: publication.publication_id.clone(),
                    author_id: member.contribution.author_id.clone(),
                    discipline_id: discipline_id.clone(),
                    year: publication.year,
                    category: publication.category,
                    tier: calculator.tier,
                    raw_points: publication.raw_points,
                    slot: author_score.slot,
                    points: author_score.points,
                });
            }
        }

        Ok(computed)
    }

    /// 解析合格贡献的学科
    ///
    /// # 规则
    /// - 学科必须存在（否则为悬空引用）
    /// - 学科必须属于作者在出版年度的申报（否则为年度不匹配）
    fn resolve_contributions<'a>(
        &self,
        publication: &Publication,
        contributions: &'a [AuthorContribution],
        strict: bool,
        computed: &mut ComputedRows,
    ) -> EvaluationResult<Vec<ResolvedContribution<'a>>> {
        let qualifying: Vec<&AuthorContribution> = contributions
            .iter()
            .filter(|c| c.qualifies(self.config.require_employment))
            .collect();

        let discipline_ids: BTreeSet<String> = qualifying
            .iter()
            .filter_map(|c| c.discipline_id.clone())
            .collect();
        let disciplines = self.discipline_repo.find_disciplines(&discipline_ids)?;

        let mut resolved = Vec::with_capacity(qualifying.len());
        for contribution in qualifying {
            let discipline_id = match &contribution.discipline_id {
                Some(id) => id,
                None => continue,
            };

            let problem = match self
                .discipline_repo
                .find_assignment(&contribution.author_id, publication.year)?
            {
                None => Some(format!(
                    "作者在 {} 年度无学科申报，学科 {} 无法解析",
                    publication.year, discipline_id
                )),
                Some(a) if !a.contains(discipline_id) => Some(format!(
                    "学科 {} 不属于作者 {} 年度申报",
                    discipline_id, publication.year
                )),
                Some(_) if !disciplines.contains_key(discipline_id) => {
                    Some(format!("学科 {} 不存在（悬空引用）", discipline_id))
                }
                Some(_) => None,
            };

            if let Some(message) = problem {
                let err = EvaluationError::InconsistentState {
                    publication_id: publication.publication_id.clone(),
                    author_id: contribution.author_id.clone(),
                    message: message.clone(),
                };
                if strict {
                    return Err(err);
                }
                tracing::warn!("跳过缓存行: {}", err);
                computed
                    .skipped
                    .push((contribution.author_id.clone(), message));
                continue;
            }

            if let Some(discipline) = disciplines.get(discipline_id) {
                resolved.push(ResolvedContribution {
                    contribution,
                    discipline: discipline.clone(),
                });
            }
        }

        Ok(resolved)
    }

    // ==========================================
    // 失效
    // ==========================================

    /// 解析事件影响的出版物
    ///
    /// # 规则
    /// - 点数未变化 / 更正状态未进出隐藏集合: 无需重建
    /// - 学科申报变更: 级联该作者该年度的全部出版物
    pub fn affected_publications(
        &self,
        event: &CacheInvalidationEvent,
    ) -> EvaluationResult<Vec<String>> {
        let ids = match event {
            CacheInvalidationEvent::PointsChanged {
                publication_id,
                old_points,
                new_points,
            } => {
                if old_points == new_points {
                    Vec::new()
                } else {
                    vec![publication_id.clone()]
                }
            }
            CacheInvalidationEvent::CorrectionStatusChanged {
                publication_id,
                old_status,
                new_status,
            } => {
                if self.config.is_hidden_status(old_status) == self.config.is_hidden_status(new_status) {
                    Vec::new()
                } else {
                    vec![publication_id.clone()]
                }
            }
            CacheInvalidationEvent::PublicationChanged { publication_id }
            | CacheInvalidationEvent::ContributionChanged { publication_id, .. } => {
                vec![publication_id.clone()]
            }
            CacheInvalidationEvent::AssignmentChanged { author_id, year } => self
                .publication_repo
                .find_publication_ids_by_author_year(author_id, *year)?,
        };
        Ok(ids)
    }

    /// 处理失效事件：受影响出版物入队重建
    ///
    /// 缓存在下一次重建（队列消费）后才反映变更
    ///
    /// # 返回
    /// - 入队（或合并到已有任务）的任务 ID
    #[instrument(skip(self, event), fields(event_type = %event.as_str()))]
    pub fn invalidate_on(&self, event: CacheInvalidationEvent) -> EvaluationResult<Vec<String>> {
        let affected = self.affected_publications(&event)?;
        if affected.is_empty() {
            tracing::debug!("事件无需重建: {}", event.source());
            return Ok(Vec::new());
        }

        let mut task_ids = Vec::with_capacity(affected.len());
        for publication_id in &affected {
            let task = RefreshTask::new(
                publication_id,
                event.as_str(),
                Some(event.source()),
                self.config.refresh_max_retries,
            );
            task_ids.push(self.queue.enqueue(task)?);
        }

        tracing::info!("事件触发重建: publications={}", affected.len());
        Ok(task_ids)
    }
}

impl CacheEventPublisher for ScoreCacheService {
    fn publish(
        &self,
        event: CacheInvalidationEvent,
    ) -> Result<Vec<String>, Box<dyn Error + Send + Sync>> {
        self.invalidate_on(event)
            .map_err(|e| Box::new(e) as Box<dyn Error + Send + Sync>)
    }
}

/// 参与计算的贡献角色
fn relevant_role(category: PublicationCategory) -> ContributionRole {
    match category {
        PublicationCategory::BookEditorship => ContributionRole::Editor,
        _ => ContributionRole::Author,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relevant_role() {
        assert_eq!(
            relevant_role(PublicationCategory::BookEditorship),
            ContributionRole::Editor
        );
        assert_eq!(relevant_role(PublicationCategory::Chapter), ContributionRole::Author);
        assert_eq!(relevant_role(PublicationCategory::Article), ContributionRole::Author);
    }

    #[test]
    fn test_publication_locks_released_after_rebuild() {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::ensure_schema(&conn).unwrap();
        let service =
            ScoreCacheService::new(Arc::new(Mutex::new(conn)), InstitutionConfig::default()).unwrap();

        for i in 0..50 {
            service.rebuild(&format!("P{}", i)).unwrap();
        }
        assert_eq!(service.tracked_lock_count(), 0);

        // 另有持有者时保留锁
        let held = service.publication_lock("P1").unwrap();
        service.rebuild("P1").unwrap();
        assert_eq!(service.tracked_lock_count(), 1);
        service.release_publication_lock("P1", held);
        assert_eq!(service.tracked_lock_count(), 0);
    }

    #[test]
    fn test_batch_report_absorb() {
        let mut report = BatchRebuildReport::default();
        report.absorb(&RebuildOutcome {
            publication_id: "P1".to_string(),
            entries_written: 3,
            discipline_entries_written: 2,
            skipped: vec![("A1".to_string(), "悬空".to_string())],
            not_applicable: None,
        });
        report.absorb(&RebuildOutcome {
            publication_id: "P2".to_string(),
            not_applicable: Some(NotApplicableReason::Patent),
            ..Default::default()
        });
        assert_eq!(report.publications_rebuilt, 2);
        assert_eq!(report.entries_written, 3);
        assert_eq!(report.skipped_rows, 1);
        assert_eq!(report.not_applicable, 1);
    }
}
