// ==========================================
// 科研评估槽位系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、数据录入不变量
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod discipline;
pub mod optimization;
pub mod publication;
pub mod score;
pub mod types;
pub mod validation;

// 重导出核心类型
pub use discipline::{AuthorDisciplineAssignment, Discipline};
pub use optimization::{AuthorSlotUsage, OptimizationRun, OptimizationStatus, SelectedCandidate};
pub use publication::{AuthorContribution, Publication};
pub use score::{DisciplineScoreEntry, ScoreCacheEntry, SlotScore};
pub use types::{ContributionRole, PublicationCategory, ScientificDomain, Tier};
pub use validation::{ValidationError, Violation};
