// ==========================================
// 科研评估槽位系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 离线批处理（槽位计算、缓存一致性、最优申报组合）
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 业务规则
pub mod engine;

// 配置层 - 机构配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA/建表）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// 应用层 - 组件装配
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{ContributionRole, PublicationCategory, ScientificDomain, Tier};

// 领域实体
pub use domain::{
    AuthorContribution, AuthorDisciplineAssignment, Discipline, OptimizationRun, Publication,
    ScoreCacheEntry,
};

// 引擎
pub use engine::{
    PointsRegistry, ScoreCacheService, SlotCalculator, SlotCollector, SlotOptimizer,
};

// API
pub use api::{EvaluationApi, SelectionApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "科研评估槽位系统";
