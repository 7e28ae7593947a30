// ==========================================
// 科研评估槽位系统 - API 层错误类型
// ==========================================
// 职责: 将仓储层/引擎层错误转换为调用方可理解的错误
// ==========================================

use crate::domain::validation::Violation;
use crate::engine::error::EvaluationError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API 层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    /// 数据录入校验失败（带全部违规项）
    #[error("数据校验失败: {reason}")]
    ValidationFailed {
        reason: String,
        violations: Vec<Violation>,
    },

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    /// 优化配置互相矛盾
    #[error("优化无可行解: {0}")]
    Infeasible(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("外键约束违反: {}", msg))
            }
            RepositoryError::Validation(v) => ApiError::ValidationFailed {
                reason: v.to_string(),
                violations: v.violations,
            },
            RepositoryError::SerializationError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

// ==========================================
// 从 EvaluationError 转换
// ==========================================
impl From<EvaluationError> for ApiError {
    fn from(err: EvaluationError) -> Self {
        match err {
            EvaluationError::Repository(e) => e.into(),
            EvaluationError::Validation(v) => ApiError::ValidationFailed {
                reason: v.to_string(),
                violations: v.violations,
            },
            EvaluationError::OptimizerInfeasible(msg) => ApiError::Infeasible(msg),
            EvaluationError::NotApplicable(reason) => {
                ApiError::BusinessRuleViolation(reason.to_string())
            }
            other @ (EvaluationError::InconsistentState { .. }
            | EvaluationError::Solver(_)
            | EvaluationError::TaskJoin(_)) => ApiError::InternalError(other.to_string()),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;
