// ==========================================
// 科研评估槽位系统 - 应用状态
// ==========================================
// 职责: 组装共享连接、仓储、引擎与 API 实例
// ==========================================

use std::sync::{Arc, Mutex};

use crate::api::{EvaluationApi, SelectionApi};
use crate::config::{ConfigManager, InstitutionConfig, InstitutionConfigReader};
use crate::db::{ensure_schema, open_sqlite_connection};
use crate::engine::{CacheEventPublisher, RefreshWorker, ScoreCacheService, SlotOptimizer};
use crate::repository::{DisciplineRepository, OptimizationRunRepository, PublicationRepository};

/// 数据库路径环境变量
pub const DB_PATH_ENV: &str = "SLOT_EVALUATION_DB_PATH";

/// 应用状态
///
/// 所有组件共享同一个数据库连接
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 加载时的机构配置快照
    pub institution_config: InstitutionConfig,

    /// 配置管理器
    pub config_manager: Arc<ConfigManager>,

    /// 一致性缓存（唯一写入方）
    pub cache_service: Arc<ScoreCacheService>,

    /// 重建队列工作器
    pub refresh_worker: Arc<RefreshWorker>,

    /// 组合优化器
    pub optimizer: Arc<SlotOptimizer>,

    /// 数据录入 API
    pub evaluation_api: Arc<EvaluationApi>,

    /// 查询与选择 API
    pub selection_api: Arc<SelectionApi>,
}

impl AppState {
    /// 创建新的 AppState 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径（不存在时自动建表）
    pub async fn new(db_path: String) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let conn = open_sqlite_connection(&db_path).map_err(|e| format!("无法打开数据库: {}", e))?;
        ensure_schema(&conn).map_err(|e| format!("数据库初始化失败: {}", e))?;
        let conn = Arc::new(Mutex::new(conn));

        // ==========================================
        // 配置
        // ==========================================
        let config_manager = Arc::new(
            ConfigManager::from_connection(conn.clone())
                .map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );
        let institution_config = config_manager
            .load_institution_config()
            .await
            .map_err(|e| format!("机构配置加载失败: {}", e))?;
        tracing::info!(
            "机构配置: total_slot_budget={}, monograph_slot_budget={}, low_point_threshold={}, quota_fraction={}, hidden_statuses={}",
            institution_config.total_slot_budget,
            institution_config.monograph_slot_budget,
            institution_config.low_point_threshold,
            institution_config.low_point_quota_fraction,
            institution_config.hidden_correction_statuses.len()
        );

        // ==========================================
        // 仓储与引擎
        // ==========================================
        let publication_repo = Arc::new(PublicationRepository::from_connection(conn.clone()));
        let discipline_repo = Arc::new(DisciplineRepository::from_connection(conn.clone()));
        let run_repo = Arc::new(OptimizationRunRepository::from_connection(conn.clone()));

        let cache_service = Arc::new(
            ScoreCacheService::new(conn.clone(), institution_config.clone())
                .map_err(|e| format!("无法创建ScoreCacheService: {}", e))?,
        );
        let recovered = cache_service
            .queue()
            .recover_stale_running()
            .map_err(|e| format!("重建队列恢复失败: {}", e))?;
        if recovered > 0 {
            tracing::info!("已恢复中断的重建任务: {}", recovered);
        }

        let refresh_worker = Arc::new(RefreshWorker::new(cache_service.clone()));
        let optimizer = Arc::new(SlotOptimizer::new(
            cache_service.reader(),
            run_repo.clone(),
            institution_config.clone(),
        ));

        // ==========================================
        // API
        // ==========================================
        let publisher: Arc<dyn CacheEventPublisher> = cache_service.clone();
        let evaluation_api = Arc::new(EvaluationApi::new(
            publication_repo,
            discipline_repo,
            Some(publisher),
        ));
        let selection_api = Arc::new(SelectionApi::new(
            cache_service.reader(),
            optimizer.clone(),
            run_repo,
        ));

        tracing::info!("AppState初始化完成");

        Ok(Self {
            db_path,
            institution_config,
            config_manager,
            cache_service,
            refresh_worker,
            optimizer,
            evaluation_api,
            selection_api,
        })
    }

    pub fn get_db_path(&self) -> &str {
        &self.db_path
    }
}

/// 获取默认数据库路径
///
/// # 返回
/// - 环境变量 SLOT_EVALUATION_DB_PATH（若设置）
/// - 否则: 用户数据目录/slot-evaluation/slot_evaluation.db
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var(DB_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./slot_evaluation.db");
    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("slot-evaluation");
        // 目录创建失败时回退到当前目录
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("slot_evaluation.db");
        }
    }

    path.to_string_lossy().to_string()
}
