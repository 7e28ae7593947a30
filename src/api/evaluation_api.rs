// ==========================================
// 科研评估槽位系统 - 数据录入 API
// ==========================================
// 职责: 出版物、作者贡献、学科申报的录入
// 流程: 输入校验 → 仓储写入（同事务校验不变量）→ 发布缓存失效事件
// 说明: 事件发布失败只记录告警，不回滚已写入的数据
// ==========================================

use std::sync::Arc;

use crate::api::error::{ApiError, ApiResult};
use crate::domain::discipline::{AuthorDisciplineAssignment, Discipline};
use crate::domain::publication::{AuthorContribution, Publication};
use crate::engine::events::{CacheEventPublisher, CacheInvalidationEvent, OptionalEventPublisher};
use crate::repository::{DisciplineRepository, PublicationRepository};

// ==========================================
// EvaluationApi - 数据录入 API
// ==========================================
pub struct EvaluationApi {
    publication_repo: Arc<PublicationRepository>,
    discipline_repo: Arc<DisciplineRepository>,
    // 事件发布器（依赖倒置：API 不直接依赖缓存服务）
    event_publisher: OptionalEventPublisher,
}

impl EvaluationApi {
    pub fn new(
        publication_repo: Arc<PublicationRepository>,
        discipline_repo: Arc<DisciplineRepository>,
        event_publisher: Option<Arc<dyn CacheEventPublisher>>,
    ) -> Self {
        let event_publisher = match event_publisher {
            Some(p) => OptionalEventPublisher::with_publisher(p),
            None => OptionalEventPublisher::none(),
        };

        Self {
            publication_repo,
            discipline_repo,
            event_publisher,
        }
    }

    /// 发布事件，返回入队的任务 ID
    fn publish(&self, events: Vec<CacheInvalidationEvent>) -> Vec<String> {
        let mut task_ids = Vec::new();
        for event in events {
            let event_type = event.as_str().to_string();
            match self.event_publisher.publish(event) {
                Ok(ids) => task_ids.extend(ids),
                Err(e) => {
                    tracing::warn!("缓存失效事件发布失败: event_type={}, error={}", event_type, e);
                }
            }
        }
        task_ids
    }

    fn require_id(value: &str, field: &str) -> ApiResult<()> {
        if value.trim().is_empty() {
            return Err(ApiError::InvalidInput(format!("{}不能为空", field)));
        }
        Ok(())
    }

    // ==========================================
    // 学科
    // ==========================================

    /// 写入学科参考数据
    pub fn save_discipline(&self, discipline: &Discipline) -> ApiResult<()> {
        Self::require_id(&discipline.discipline_id, "学科ID")?;
        if discipline.domain().is_none() {
            return Err(ApiError::InvalidInput(format!(
                "学科代码无法识别领域: {}",
                discipline.code
            )));
        }
        self.discipline_repo.upsert_discipline(discipline)?;
        Ok(())
    }

    // ==========================================
    // 出版物
    // ==========================================

    /// 写入出版物
    ///
    /// # 规则
    /// - 点数变化 → PointsChanged
    /// - 更正状态变化 → CorrectionStatusChanged（是否重建由缓存按隐藏集合判断）
    /// - 新增或其他属性变化 → PublicationChanged
    ///
    /// # 返回
    /// - Ok(Vec<String>): 入队的重建任务 ID
    pub fn save_publication(&self, publication: &Publication) -> ApiResult<Vec<String>> {
        Self::require_id(&publication.publication_id, "出版物ID")?;
        if publication.raw_points < rust_decimal::Decimal::ZERO {
            return Err(ApiError::InvalidInput(format!(
                "部委点数不能为负: {}",
                publication.raw_points
            )));
        }

        let previous = self.publication_repo.upsert_publication(publication)?;
        let id = publication.publication_id.clone();

        let events = match previous {
            None => vec![CacheInvalidationEvent::PublicationChanged { publication_id: id }],
            Some(old) => {
                let mut events = Vec::new();
                if old.raw_points != publication.raw_points {
                    events.push(CacheInvalidationEvent::PointsChanged {
                        publication_id: id.clone(),
                        old_points: old.raw_points,
                        new_points: publication.raw_points,
                    });
                }
                if old.correction_status != publication.correction_status {
                    events.push(CacheInvalidationEvent::CorrectionStatusChanged {
                        publication_id: id.clone(),
                        old_status: old.correction_status.clone(),
                        new_status: publication.correction_status.clone(),
                    });
                }
                if old.year != publication.year
                    || old.category != publication.category
                    || old.multi_center != publication.multi_center
                    || old.total_authors != publication.total_authors
                {
                    events.push(CacheInvalidationEvent::PublicationChanged { publication_id: id });
                }
                events
            }
        };

        Ok(self.publish(events))
    }

    /// 删除出版物（贡献级联删除，缓存行由重建清空）
    pub fn delete_publication(&self, publication_id: &str) -> ApiResult<Vec<String>> {
        Self::require_id(publication_id, "出版物ID")?;
        if !self.publication_repo.delete_publication(publication_id)? {
            return Err(ApiError::NotFound(format!("出版物(id={})不存在", publication_id)));
        }
        Ok(self.publish(vec![CacheInvalidationEvent::PublicationChanged {
            publication_id: publication_id.to_string(),
        }]))
    }

    pub fn get_publication(
        &self,
        publication_id: &str,
    ) -> ApiResult<(Publication, Vec<AuthorContribution>)> {
        self.publication_repo
            .find_with_contributions(publication_id)?
            .ok_or_else(|| ApiError::NotFound(format!("出版物(id={})不存在", publication_id)))
    }

    // ==========================================
    // 作者贡献
    // ==========================================

    /// 写入作者贡献
    ///
    /// # 返回
    /// - Err(ApiError::ValidationFailed): 申报学科不属于作者该年度申报 / 份额越界
    pub fn save_contribution(&self, contribution: &AuthorContribution) -> ApiResult<Vec<String>> {
        Self::require_id(&contribution.publication_id, "出版物ID")?;
        Self::require_id(&contribution.author_id, "作者ID")?;

        self.publication_repo.upsert_contribution(contribution)?;
        Ok(self.publish(vec![CacheInvalidationEvent::ContributionChanged {
            publication_id: contribution.publication_id.clone(),
            author_id: contribution.author_id.clone(),
        }]))
    }

    /// 删除作者贡献
    pub fn delete_contribution(&self, publication_id: &str, author_id: &str) -> ApiResult<Vec<String>> {
        match self
            .publication_repo
            .delete_contribution(publication_id, author_id)?
        {
            Some(_) => Ok(self.publish(vec![CacheInvalidationEvent::ContributionChanged {
                publication_id: publication_id.to_string(),
                author_id: author_id.to_string(),
            }])),
            None => Err(ApiError::NotFound(format!(
                "贡献(publication={}, author={})不存在",
                publication_id, author_id
            ))),
        }
    }

    // ==========================================
    // 学科申报
    // ==========================================

    /// 写入作者年度学科申报
    ///
    /// 依赖贡献的学科在同一事务内联动修改，随后级联失效该作者该年度全部出版物
    pub fn save_assignment(&self, assignment: &AuthorDisciplineAssignment) -> ApiResult<Vec<String>> {
        Self::require_id(&assignment.author_id, "作者ID")?;

        let change = self.discipline_repo.upsert_assignment(assignment)?;
        tracing::debug!(
            "学科申报联动出版物: {:?}",
            change.remapped_publications
        );
        Ok(self.publish(vec![CacheInvalidationEvent::AssignmentChanged {
            author_id: assignment.author_id.clone(),
            year: assignment.year,
        }]))
    }

    /// 删除作者年度学科申报（依赖贡献的学科置空）
    pub fn delete_assignment(&self, author_id: &str, year: i32) -> ApiResult<Vec<String>> {
        Self::require_id(author_id, "作者ID")?;

        let change = self.discipline_repo.delete_assignment(author_id, year)?;
        if change.previous.is_none() {
            return Err(ApiError::NotFound(format!(
                "学科申报(author={}, year={})不存在",
                author_id, year
            )));
        }
        Ok(self.publish(vec![CacheInvalidationEvent::AssignmentChanged {
            author_id: author_id.to_string(),
            year,
        }]))
    }

    pub fn get_assignment(
        &self,
        author_id: &str,
        year: i32,
    ) -> ApiResult<Option<AuthorDisciplineAssignment>> {
        Ok(self.discipline_repo.find_assignment(author_id, year)?)
    }
}
