// ==========================================
// 科研评估槽位系统 - 优化运行记录仓储
// ==========================================
// 职责: optimization_run 表
// 红线: 只插入、不更新
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::optimization::OptimizationRun;
use crate::repository::db_utils::{decimal_to_sql, get_decimal, get_parsed};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const RUN_COLUMNS: &str = "run_id, year_from, year_to, status, is_optimal, total_points, best_bound, \
     candidate_count, low_monograph_count, selection_json, author_usage_json, elapsed_ms, created_at";

fn map_run(row: &Row<'_>) -> rusqlite::Result<OptimizationRun> {
    let selection_json: String = row.get(9)?;
    let usage_json: String = row.get(10)?;
    let candidate_count: i64 = row.get(7)?;
    let low_count: i64 = row.get(8)?;

    let to_sql_err = |idx: usize, e: serde_json::Error| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    };

    Ok(OptimizationRun {
        run_id: row.get(0)?,
        year_from: row.get(1)?,
        year_to: row.get(2)?,
        status: get_parsed(row, 3)?,
        is_optimal: row.get::<_, i32>(4)? != 0,
        total_points: get_decimal(row, 5)?,
        best_bound: get_decimal(row, 6)?,
        candidate_count: candidate_count.max(0) as usize,
        low_monograph_count: low_count.max(0) as usize,
        selected: serde_json::from_str(&selection_json).map_err(|e| to_sql_err(9, e))?,
        author_usage: serde_json::from_str(&usage_json).map_err(|e| to_sql_err(10, e))?,
        elapsed_ms: row.get(11)?,
        created_at: row.get(12)?,
    })
}

// ==========================================
// OptimizationRunRepository - 优化运行仓储
// ==========================================
pub struct OptimizationRunRepository {
    conn: Arc<Mutex<Connection>>,
}

impl OptimizationRunRepository {
    /// 创建新的仓储实例
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 插入运行记录
    ///
    /// # 返回
    /// - Err(UniqueConstraintViolation): run_id 已存在（记录不可覆盖）
    pub fn insert(&self, run: &OptimizationRun) -> RepositoryResult<()> {
        let selection_json = serde_json::to_string(&run.selected)?;
        let usage_json = serde_json::to_string(&run.author_usage)?;

        let conn = self.get_conn()?;
        conn.execute(
            &format!(
                "INSERT INTO optimization_run ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                RUN_COLUMNS
            ),
            params![
                run.run_id,
                run.year_from,
                run.year_to,
                run.status.as_str(),
                run.is_optimal as i32,
                decimal_to_sql(run.total_points),
                decimal_to_sql(run.best_bound),
                run.candidate_count as i64,
                run.low_monograph_count as i64,
                selection_json,
                usage_json,
                run.elapsed_ms,
                run.created_at,
            ],
        )?;
        Ok(())
    }

    /// 按 ID 查询运行记录
    pub fn find_by_id(&self, run_id: &str) -> RepositoryResult<Option<OptimizationRun>> {
        let conn = self.get_conn()?;
        let run = conn
            .query_row(
                &format!("SELECT {} FROM optimization_run WHERE run_id = ?1", RUN_COLUMNS),
                params![run_id],
                map_run,
            )
            .optional()?;
        Ok(run)
    }

    /// 最近的运行记录（按创建时间倒序）
    pub fn list_recent(&self, limit: usize) -> RepositoryResult<Vec<OptimizationRun>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM optimization_run ORDER BY created_at DESC, run_id LIMIT ?1",
            RUN_COLUMNS
        ))?;
        let runs = stmt
            .query_map(params![limit as i64], map_run)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(runs)
    }
}
