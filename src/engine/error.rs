// ==========================================
// 科研评估槽位系统 - 引擎层错误类型
// ==========================================
// 传播规则:
// - 计算器/分派器不吞错
// - 一致性缓存是唯一的“跳过单行 / 中止批次”边界
// - 优化器不可行必须显式报告，不返回看似合法的空解
// ==========================================

use crate::domain::validation::ValidationError;
use crate::engine::slot_dispatcher::NotApplicableReason;
use crate::repository::error::RepositoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EvaluationError {
    /// 预期内：出版物按类别/状态不参与评分
    #[error("不适用: {0}")]
    NotApplicable(NotApplicableReason),

    /// 数据录入问题
    #[error("数据校验失败: {0}")]
    Validation(#[from] ValidationError),

    /// 不应出现的数据状态（悬空学科引用、年度不匹配等）
    #[error("数据状态不一致: publication={publication_id}, author={author_id}: {message}")]
    InconsistentState {
        publication_id: String,
        author_id: String,
        message: String,
    },

    /// 配置互相矛盾，优化无解
    #[error("优化不可行: {0}")]
    OptimizerInfeasible(String),

    /// 求解器拒绝输入或返回了违反约束的解
    #[error("求解器错误: {0}")]
    Solver(String),

    #[error("后台任务执行失败: {0}")]
    TaskJoin(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub type EvaluationResult<T> = Result<T, EvaluationError>;
