// ==========================================
// 科研评估槽位系统 - 缓存重建任务队列
// ==========================================
// 职责: 按出版物排队的后台重建任务
// 约束:
// - 同一出版物的 PENDING 任务合并为一个
// - 同一出版物同时最多一个 RUNNING 任务（出队时跳过）
// ==========================================

use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// 刷新任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshStatus {
    /// 等待中
    Pending,
    /// 执行中
    Running,
    /// 已完成
    Completed,
    /// 失败
    Failed,
    /// 已取消
    Cancelled,
}

impl RefreshStatus {
    pub fn as_str(&self) -> &str {
        match self {
            RefreshStatus::Pending => "PENDING",
            RefreshStatus::Running => "RUNNING",
            RefreshStatus::Completed => "COMPLETED",
            RefreshStatus::Failed => "FAILED",
            RefreshStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "PENDING" => RefreshStatus::Pending,
            "RUNNING" => RefreshStatus::Running,
            "COMPLETED" => RefreshStatus::Completed,
            "FAILED" => RefreshStatus::Failed,
            "CANCELLED" => RefreshStatus::Cancelled,
            _ => RefreshStatus::Failed,
        }
    }
}

/// 重建任务
#[derive(Debug, Clone)]
pub struct RefreshTask {
    /// 任务 ID
    pub task_id: String,
    /// 待重建出版物
    pub publication_id: String,
    /// 触发类型
    pub trigger: String,
    /// 触发源
    pub trigger_source: Option<String>,
    /// 任务状态
    pub status: RefreshStatus,
    /// 重试次数
    pub retry_count: i32,
    /// 最大重试次数
    pub max_retries: i32,
    /// 创建时间
    pub created_at: String,
    /// 开始执行时间
    pub started_at: Option<String>,
    /// 完成时间
    pub completed_at: Option<String>,
    /// 错误信息
    pub error_message: Option<String>,
}

impl RefreshTask {
    /// 创建新的重建任务
    pub fn new(
        publication_id: &str,
        trigger: &str,
        trigger_source: Option<String>,
        max_retries: i32,
    ) -> Self {
        Self {
            task_id: Uuid::new_v4().to_string(),
            publication_id: publication_id.to_string(),
            trigger: trigger.to_string(),
            trigger_source,
            status: RefreshStatus::Pending,
            retry_count: 0,
            max_retries,
            created_at: Utc::now().to_rfc3339(),
            started_at: None,
            completed_at: None,
            error_message: None,
        }
    }

    /// 是否可以重试
    pub fn can_retry(&self) -> bool {
        self.status == RefreshStatus::Failed && self.retry_count < self.max_retries
    }
}

const TASK_COLUMNS: &str = "task_id, publication_id, trigger_type, trigger_source, status, \
     retry_count, max_retries, created_at, started_at, completed_at, error_message";

fn map_task(row: &Row<'_>) -> rusqlite::Result<RefreshTask> {
    let status: String = row.get(4)?;
    Ok(RefreshTask {
        task_id: row.get(0)?,
        publication_id: row.get(1)?,
        trigger: row.get(2)?,
        trigger_source: row.get(3)?,
        status: RefreshStatus::parse(&status),
        retry_count: row.get(5)?,
        max_retries: row.get(6)?,
        created_at: row.get(7)?,
        started_at: row.get(8)?,
        completed_at: row.get(9)?,
        error_message: row.get(10)?,
    })
}

/// 队列统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub pending_count: u32,
    pub running_count: u32,
    pub completed_count: u32,
    pub failed_count: u32,
}

// ==========================================
// ScoreRefreshQueue - 重建队列
// ==========================================
pub struct ScoreRefreshQueue {
    conn: Arc<Mutex<Connection>>,
}

impl ScoreRefreshQueue {
    /// 创建重建队列（确保队列表存在）
    pub fn new(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        let queue = Self { conn };
        queue.ensure_queue_table()?;
        Ok(queue)
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 确保队列表存在
    fn ensure_queue_table(&self) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS score_refresh_queue (
                task_id TEXT PRIMARY KEY,
                publication_id TEXT NOT NULL,
                trigger_type TEXT NOT NULL,
                trigger_source TEXT,
                status TEXT NOT NULL DEFAULT 'PENDING',
                retry_count INTEGER NOT NULL DEFAULT 0,
                max_retries INTEGER NOT NULL DEFAULT 3,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                started_at TEXT,
                completed_at TEXT,
                error_message TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_score_refresh_status
              ON score_refresh_queue(status, created_at);

            CREATE INDEX IF NOT EXISTS idx_score_refresh_publication
              ON score_refresh_queue(publication_id, status);
            "#,
        )?;
        Ok(())
    }

    /// 提交重建任务
    ///
    /// # 返回
    /// - 新任务 ID；若该出版物已有 PENDING 任务则返回已有任务 ID
    pub fn enqueue(&self, task: RefreshTask) -> RepositoryResult<String> {
        let conn = self.get_conn()?;

        let existing: Option<String> = conn
            .query_row(
                "SELECT task_id FROM score_refresh_queue WHERE publication_id = ?1 AND status = 'PENDING' LIMIT 1",
                params![task.publication_id],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(task_id) = existing {
            tracing::debug!(
                "出版物 {} 已有待执行的重建任务，合并: task_id={}",
                task.publication_id,
                task_id
            );
            return Ok(task_id);
        }

        conn.execute(
            &format!(
                "INSERT INTO score_refresh_queue ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                TASK_COLUMNS
            ),
            params![
                task.task_id,
                task.publication_id,
                task.trigger,
                task.trigger_source,
                task.status.as_str(),
                task.retry_count,
                task.max_retries,
                task.created_at,
                task.started_at,
                task.completed_at,
                task.error_message,
            ],
        )?;

        tracing::info!(
            "重建任务已加入队列: task_id={}, publication_id={}",
            task.task_id,
            task.publication_id
        );

        Ok(task.task_id)
    }

    /// 取出至多 limit 个可执行任务并标记为 RUNNING
    ///
    /// 规则: 跳过已有 RUNNING 任务的出版物；同一批次内出版物不重复
    pub fn dequeue_batch(&self, limit: usize) -> RepositoryResult<Vec<RefreshTask>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let tasks = {
            let mut stmt = tx.prepare(&format!(
                r#"
                SELECT {} FROM score_refresh_queue q
                WHERE q.status = 'PENDING'
                  AND NOT EXISTS (
                    SELECT 1 FROM score_refresh_queue r
                    WHERE r.publication_id = q.publication_id AND r.status = 'RUNNING'
                  )
                ORDER BY q.created_at ASC, q.rowid ASC
                "#,
                TASK_COLUMNS
            ))?;
            let rows = stmt.query_map([], map_task)?;

            let mut picked: Vec<RefreshTask> = Vec::new();
            for row in rows {
                let task = row?;
                if picked.iter().any(|t| t.publication_id == task.publication_id) {
                    continue;
                }
                picked.push(task);
                if picked.len() >= limit {
                    break;
                }
            }
            picked
        };

        let started_at = Utc::now().to_rfc3339();
        let mut running = Vec::with_capacity(tasks.len());
        for mut task in tasks {
            tx.execute(
                "UPDATE score_refresh_queue SET status = 'RUNNING', started_at = ?1 WHERE task_id = ?2",
                params![started_at, task.task_id],
            )?;
            task.status = RefreshStatus::Running;
            task.started_at = Some(started_at.clone());
            running.push(task);
        }

        tx.commit()?;
        Ok(running)
    }

    /// 获取下一个可执行任务
    pub fn dequeue(&self) -> RepositoryResult<Option<RefreshTask>> {
        Ok(self.dequeue_batch(1)?.into_iter().next())
    }

    /// 标记任务完成
    pub fn mark_completed(&self, task_id: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "UPDATE score_refresh_queue SET status = 'COMPLETED', completed_at = ?1 WHERE task_id = ?2",
            params![Utc::now().to_rfc3339(), task_id],
        )?;
        Ok(())
    }

    /// 标记任务失败
    ///
    /// # 返回
    /// - RefreshStatus::Pending: 将重试
    /// - RefreshStatus::Failed: 达到最大重试次数
    pub fn mark_failed(&self, task: &mut RefreshTask, error: &str) -> RepositoryResult<RefreshStatus> {
        task.status = RefreshStatus::Failed;
        task.error_message = Some(error.to_string());
        task.retry_count += 1;

        let conn = self.get_conn()?;
        if task.can_retry() {
            conn.execute(
                "UPDATE score_refresh_queue SET status = 'PENDING', error_message = ?1, retry_count = ?2 WHERE task_id = ?3",
                params![task.error_message, task.retry_count, task.task_id],
            )?;
            tracing::info!(
                "重建任务将重试: task_id={}, retry_count={}",
                task.task_id,
                task.retry_count
            );
            task.status = RefreshStatus::Pending;
        } else {
            conn.execute(
                "UPDATE score_refresh_queue SET status = 'FAILED', error_message = ?1, retry_count = ?2, completed_at = ?3 WHERE task_id = ?4",
                params![
                    task.error_message,
                    task.retry_count,
                    Utc::now().to_rfc3339(),
                    task.task_id
                ],
            )?;
            tracing::error!(
                "重建任务执行失败，达到最大重试次数: task_id={}, retry_count={}",
                task.task_id,
                task.retry_count
            );
        }

        Ok(task.status)
    }

    /// 获取任务状态
    pub fn get_task(&self, task_id: &str) -> RepositoryResult<Option<RefreshTask>> {
        let conn = self.get_conn()?;
        let task = conn
            .query_row(
                &format!("SELECT {} FROM score_refresh_queue WHERE task_id = ?1", TASK_COLUMNS),
                params![task_id],
                map_task,
            )
            .optional()?;
        Ok(task)
    }

    /// 取消任务（仅 PENDING 可取消）
    pub fn cancel_task(&self, task_id: &str) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let rows_affected = conn.execute(
            "UPDATE score_refresh_queue SET status = 'CANCELLED' WHERE task_id = ?1 AND status = 'PENDING'",
            params![task_id],
        )?;
        Ok(rows_affected > 0)
    }

    /// 将遗留的 RUNNING 任务恢复为 PENDING（进程异常退出后启动时调用）
    pub fn recover_stale_running(&self) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let n = conn.execute(
            "UPDATE score_refresh_queue SET status = 'PENDING', started_at = NULL WHERE status = 'RUNNING'",
            [],
        )?;
        if n > 0 {
            tracing::warn!("恢复了 {} 个中断的重建任务", n);
        }
        Ok(n)
    }

    /// 获取队列统计信息
    pub fn get_queue_stats(&self) -> RepositoryResult<QueueStats> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM score_refresh_queue GROUP BY status")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;

        let mut stats = QueueStats::default();
        for row in rows {
            let (status, count) = row?;
            let count = count as u32;
            match RefreshStatus::parse(&status) {
                RefreshStatus::Pending => stats.pending_count = count,
                RefreshStatus::Running => stats.running_count = count,
                RefreshStatus::Completed => stats.completed_count = count,
                RefreshStatus::Failed => stats.failed_count += count,
                RefreshStatus::Cancelled => {}
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_test_queue() -> ScoreRefreshQueue {
        let conn = Connection::open_in_memory().unwrap();
        ScoreRefreshQueue::new(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[test]
    fn test_enqueue_coalesces_pending_per_publication() {
        let queue = setup_test_queue();
        let a = queue
            .enqueue(RefreshTask::new("P1", "PointsChanged", None, 3))
            .unwrap();
        let b = queue
            .enqueue(RefreshTask::new("P1", "ContributionChanged", None, 3))
            .unwrap();
        assert_eq!(a, b);

        let c = queue
            .enqueue(RefreshTask::new("P2", "PointsChanged", None, 3))
            .unwrap();
        assert_ne!(a, c);
        assert_eq!(queue.get_queue_stats().unwrap().pending_count, 2);
    }

    #[test]
    fn test_dequeue_skips_publication_with_running_task() {
        let queue = setup_test_queue();
        queue
            .enqueue(RefreshTask::new("P1", "PointsChanged", None, 3))
            .unwrap();

        let running = queue.dequeue().unwrap().unwrap();
        assert_eq!(running.publication_id, "P1");

        // 运行中再次入队：不能合并到 RUNNING 任务
        let second = queue
            .enqueue(RefreshTask::new("P1", "AssignmentChanged", None, 3))
            .unwrap();
        assert_ne!(second, running.task_id);

        // P1 仍在运行，不能出队
        assert!(queue.dequeue().unwrap().is_none());

        queue.mark_completed(&running.task_id).unwrap();
        let next = queue.dequeue().unwrap().unwrap();
        assert_eq!(next.task_id, second);
    }

    #[test]
    fn test_mark_failed_retries_then_fails() {
        let queue = setup_test_queue();
        queue
            .enqueue(RefreshTask::new("P1", "PointsChanged", None, 2))
            .unwrap();

        let mut task = queue.dequeue().unwrap().unwrap();
        assert_eq!(
            queue.mark_failed(&mut task, "boom").unwrap(),
            RefreshStatus::Pending
        );

        let mut task = queue.dequeue().unwrap().unwrap();
        assert_eq!(task.retry_count, 1);
        assert_eq!(
            queue.mark_failed(&mut task, "boom").unwrap(),
            RefreshStatus::Failed
        );

        assert!(queue.dequeue().unwrap().is_none());
        let stored = queue.get_task(&task.task_id).unwrap().unwrap();
        assert_eq!(stored.status, RefreshStatus::Failed);
        assert_eq!(stored.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn test_dequeue_batch_distinct_publications() {
        let queue = setup_test_queue();
        for p in ["P1", "P2", "P3"] {
            queue.enqueue(RefreshTask::new(p, "PublicationChanged", None, 3)).unwrap();
        }
        let batch = queue.dequeue_batch(2).unwrap();
        assert_eq!(batch.len(), 2);
        assert_ne!(batch[0].publication_id, batch[1].publication_id);
        assert_eq!(queue.get_queue_stats().unwrap().running_count, 2);

        assert_eq!(queue.recover_stale_running().unwrap(), 2);
        assert_eq!(queue.get_queue_stats().unwrap().pending_count, 3);
    }
}
