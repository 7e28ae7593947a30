// ==========================================
// 科研评估槽位系统 - 缓存失效事件
// ==========================================
// 职责: 定义上游数据变更事件与发布 trait
// 说明: API 层发布事件，一致性缓存订阅并入队重建
// ==========================================

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Arc;

// ==========================================
// 失效事件类型
// ==========================================

/// 缓存失效事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CacheInvalidationEvent {
    /// 部委点数变更
    PointsChanged {
        publication_id: String,
        old_points: Decimal,
        new_points: Decimal,
    },
    /// 更正状态变更（仅进/出隐藏集合时需要重建）
    CorrectionStatusChanged {
        publication_id: String,
        old_status: String,
        new_status: String,
    },
    /// 出版物其他属性变更（类别/年度/多中心等）
    PublicationChanged { publication_id: String },
    /// 贡献学科新增/修改/删除
    ContributionChanged {
        publication_id: String,
        author_id: String,
    },
    /// 作者年度学科申报变更，级联该作者该年度全部出版物
    AssignmentChanged { author_id: String, year: i32 },
}

impl CacheInvalidationEvent {
    /// 转换为字符串标识
    pub fn as_str(&self) -> &str {
        match self {
            CacheInvalidationEvent::PointsChanged { .. } => "PointsChanged",
            CacheInvalidationEvent::CorrectionStatusChanged { .. } => "CorrectionStatusChanged",
            CacheInvalidationEvent::PublicationChanged { .. } => "PublicationChanged",
            CacheInvalidationEvent::ContributionChanged { .. } => "ContributionChanged",
            CacheInvalidationEvent::AssignmentChanged { .. } => "AssignmentChanged",
        }
    }

    /// 事件来源描述（写入队列 trigger_source）
    pub fn source(&self) -> String {
        match self {
            CacheInvalidationEvent::PointsChanged {
                publication_id,
                old_points,
                new_points,
            } => format!("{}: {} -> {}", publication_id, old_points, new_points),
            CacheInvalidationEvent::CorrectionStatusChanged {
                publication_id,
                old_status,
                new_status,
            } => format!("{}: '{}' -> '{}'", publication_id, old_status, new_status),
            CacheInvalidationEvent::PublicationChanged { publication_id } => publication_id.clone(),
            CacheInvalidationEvent::ContributionChanged {
                publication_id,
                author_id,
            } => format!("{}/{}", publication_id, author_id),
            CacheInvalidationEvent::AssignmentChanged { author_id, year } => {
                format!("{}@{}", author_id, year)
            }
        }
    }
}

// ==========================================
// 事件发布 Trait
// ==========================================

/// 缓存失效事件发布者
///
/// # 实现说明
/// - `ScoreCacheService` 实现此 trait：解析受影响出版物并入队
pub trait CacheEventPublisher: Send + Sync {
    /// 发布失效事件
    ///
    /// # 返回
    /// - `Ok(task_ids)`: 入队的重建任务 ID（无需重建时为空）
    fn publish(&self, event: CacheInvalidationEvent)
        -> Result<Vec<String>, Box<dyn Error + Send + Sync>>;
}

/// 空操作事件发布者
///
/// 用于不需要事件发布的场景（如单元测试）
#[derive(Debug, Clone, Default)]
pub struct NoOpEventPublisher;

impl CacheEventPublisher for NoOpEventPublisher {
    fn publish(
        &self,
        event: CacheInvalidationEvent,
    ) -> Result<Vec<String>, Box<dyn Error + Send + Sync>> {
        tracing::debug!(
            "NoOpEventPublisher: 跳过事件发布 - event_type={}, source={}",
            event.as_str(),
            event.source()
        );
        Ok(Vec::new())
    }
}

/// 可选的事件发布者包装
pub struct OptionalEventPublisher {
    inner: Option<Arc<dyn CacheEventPublisher>>,
}

impl OptionalEventPublisher {
    pub fn none() -> Self {
        Self { inner: None }
    }

    pub fn with_publisher(publisher: Arc<dyn CacheEventPublisher>) -> Self {
        Self {
            inner: Some(publisher),
        }
    }

    /// 发布事件；未配置发布者时静默跳过
    pub fn publish(
        &self,
        event: CacheInvalidationEvent,
    ) -> Result<Vec<String>, Box<dyn Error + Send + Sync>> {
        match &self.inner {
            Some(p) => p.publish(event),
            None => Ok(Vec::new()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }
}
