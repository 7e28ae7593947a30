// ==========================================
// 科研评估槽位系统 - 数据仓储层
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod db_utils;
pub mod discipline_repo;
pub mod error;
pub mod optimization_run_repo;
pub mod publication_repo;
pub mod score_cache_repo;

// 重导出核心仓储
pub use discipline_repo::{AssignmentChange, DisciplineRepository};
pub use error::{RepositoryError, RepositoryResult};
pub use optimization_run_repo::OptimizationRunRepository;
pub use publication_repo::PublicationRepository;
pub use score_cache_repo::{ScoreCacheReader, ScoreCacheRepository};
