// ==========================================
// 科研评估槽位系统 - 缓存重建工作器
// ==========================================
// 职责: 消费重建队列
// 并发: 不同出版物并行（信号量限流），同一出版物由队列保证不并发
// ==========================================

use crate::engine::error::{EvaluationError, EvaluationResult};
use crate::engine::refresh_queue::{RefreshStatus, RefreshTask, ScoreRefreshQueue};
use crate::engine::score_cache::{RebuildOutcome, ScoreCacheService};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinError;

/// 队列消费报告
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub completed: usize,
    /// 失败后重新排队的任务数
    pub retried: usize,
    /// 达到最大重试次数的任务数
    pub failed: usize,
    pub entries_written: usize,
    pub skipped_rows: usize,
}

impl DrainReport {
    fn record(
        &mut self,
        queue: &ScoreRefreshQueue,
        mut task: RefreshTask,
        result: EvaluationResult<RebuildOutcome>,
    ) -> EvaluationResult<()> {
        match result {
            Ok(outcome) => {
                queue.mark_completed(&task.task_id)?;
                self.completed += 1;
                self.entries_written += outcome.entries_written;
                self.skipped_rows += outcome.skipped.len();
            }
            Err(e) => match queue.mark_failed(&mut task, &e.to_string())? {
                RefreshStatus::Pending => self.retried += 1,
                _ => self.failed += 1,
            },
        }
        Ok(())
    }
}

/// 将阻塞任务的汇合错误折算为该任务的重建失败
fn settle(
    task: RefreshTask,
    joined: Result<EvaluationResult<RebuildOutcome>, JoinError>,
) -> (RefreshTask, EvaluationResult<RebuildOutcome>) {
    match joined {
        Ok(result) => (task, result),
        Err(e) => {
            tracing::error!(publication_id = %task.publication_id, "重建任务异常终止: {}", e);
            (task, Err(EvaluationError::TaskJoin(e.to_string())))
        }
    }
}

// ==========================================
// RefreshWorker
// ==========================================
pub struct RefreshWorker {
    service: Arc<ScoreCacheService>,
    queue: Arc<ScoreRefreshQueue>,
    concurrency: usize,
}

impl RefreshWorker {
    pub fn new(service: Arc<ScoreCacheService>) -> Self {
        let concurrency = service.config().refresh_concurrency.max(1);
        let queue = service.queue();
        Self {
            service,
            queue,
            concurrency,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// 消费队列直到没有可执行任务
    pub async fn drain(&self) -> EvaluationResult<DrainReport> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut report = DrainReport::default();

        loop {
            let tasks = self.queue.dequeue_batch(self.concurrency * 4)?;
            if tasks.is_empty() {
                break;
            }
            tracing::debug!("本轮取出重建任务: {}", tasks.len());

            let futures = tasks.into_iter().map(|task| {
                let semaphore = semaphore.clone();
                let service = self.service.clone();
                async move {
                    let _permit = match semaphore.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(e) => return (task, Err(EvaluationError::TaskJoin(e.to_string()))),
                    };
                    let publication_id = task.publication_id.clone();
                    let joined =
                        tokio::task::spawn_blocking(move || service.rebuild(&publication_id)).await;
                    settle(task, joined)
                }
            });

            // 单个任务失败只记入该任务，不中断本轮其他任务
            for (task, result) in join_all(futures).await {
                report.record(&self.queue, task, result)?;
            }
        }

        tracing::info!(
            "重建队列已清空: completed={}, retried={}, failed={}",
            report.completed,
            report.retried,
            report.failed
        );
        Ok(report)
    }

    /// 同步消费队列（批处理入口与测试使用）
    pub fn drain_blocking(&self) -> EvaluationResult<DrainReport> {
        let mut report = DrainReport::default();
        while let Some(task) = self.queue.dequeue()? {
            let result = self.service.rebuild(&task.publication_id);
            report.record(&self.queue, task, result)?;
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_join_failure_marks_only_that_task() {
        let conn = Connection::open_in_memory().unwrap();
        let queue = ScoreRefreshQueue::new(Arc::new(Mutex::new(conn))).unwrap();
        queue
            .enqueue(RefreshTask::new("P1", "PointsChanged", None, 0))
            .unwrap();
        queue
            .enqueue(RefreshTask::new("P2", "PointsChanged", None, 0))
            .unwrap();
        let mut tasks = queue.dequeue_batch(10).unwrap();
        tasks.sort_by(|a, b| a.publication_id.cmp(&b.publication_id));
        let second = tasks.pop().unwrap();
        let first = tasks.pop().unwrap();

        let panicked = tokio::task::spawn_blocking(|| -> EvaluationResult<RebuildOutcome> {
            panic!("rebuild aborted")
        })
        .await;
        let (first, first_result) = settle(first, panicked);
        assert!(matches!(first_result, Err(EvaluationError::TaskJoin(_))));
        let (second, second_result) = settle(second, Ok(Ok(RebuildOutcome::default())));

        let mut report = DrainReport::default();
        let first_id = first.task_id.clone();
        let second_id = second.task_id.clone();
        report.record(&queue, first, first_result).unwrap();
        report.record(&queue, second, second_result).unwrap();

        assert_eq!(report.completed, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(
            queue.get_task(&first_id).unwrap().unwrap().status,
            RefreshStatus::Failed
        );
        assert_eq!(
            queue.get_task(&second_id).unwrap().unwrap().status,
            RefreshStatus::Completed
        );
        assert_eq!(queue.get_queue_stats().unwrap().running_count, 0);
    }
}
