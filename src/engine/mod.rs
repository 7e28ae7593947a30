// ==========================================
// 科研评估槽位系统 - 引擎层
// ==========================================
// 职责: 评分规则、一致性缓存、汇总与组合优化
// 红线:
// - 登记表 / 计算器 / 分派器为纯函数，不拼 SQL
// - 槽位缓存只由 ScoreCacheService 写入
// ==========================================

pub mod error;
pub mod events;
pub mod optimizer;
pub mod points_registry;
pub mod refresh_queue;
pub mod refresh_worker;
pub mod score_cache;
pub mod slot_calculator;
pub mod slot_collector;
pub mod slot_dispatcher;

// 重导出核心引擎
pub use error::{EvaluationError, EvaluationResult};
pub use events::{
    CacheEventPublisher, CacheInvalidationEvent, NoOpEventPublisher, OptionalEventPublisher,
};
pub use optimizer::solver::{BranchAndBoundSolver, BruteForceSolver, SlotSolver};
pub use optimizer::{OptimizerOptions, SlotOptimizer};
pub use points_registry::PointsRegistry;
pub use refresh_queue::{QueueStats, RefreshStatus, RefreshTask, ScoreRefreshQueue};
pub use refresh_worker::{DrainReport, RefreshWorker};
pub use score_cache::{BatchRebuildReport, RebuildOutcome, ScoreCacheService};
pub use slot_calculator::{AuthorShare, SlotCalculator};
pub use slot_collector::{CollectionResult, CollectorOptions, OverflowPolicy, SlotCollector};
pub use slot_dispatcher::{adapt, DispatchContext, NotApplicableReason, SlotAdaptation};
