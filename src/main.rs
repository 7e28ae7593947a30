// ==========================================
// 科研评估槽位系统 - 批处理入口
// ==========================================
// 用法:
//   slot-evaluation [--db <path>] [--json-log] <command> [args]
//
// 命令:
//   init                               建表并输出当前机构配置
//   rebuild-all [--strict]             全量重建槽位缓存
//   drain                              消费重建队列
//   queue-stats                        重建队列统计
//   collect <author> <quota> <from> <to>
//   optimize <from> <to> [--time-limit <secs>]
//   runs [limit]                       最近的优化运行记录
// ==========================================

use anyhow::{anyhow, bail, Context};
use rust_decimal::Decimal;
use slot_evaluation::app::{get_default_db_path, AppState};
use slot_evaluation::engine::{CollectorOptions, OptimizerOptions};
use slot_evaluation::logging;
use std::str::FromStr;
use std::time::Duration;

const USAGE: &str = "用法: slot-evaluation [--db <path>] [--json-log] \
<init|rebuild-all [--strict]|drain|queue-stats|collect <author> <quota> <from> <to>|optimize <from> <to> [--time-limit <secs>]|runs [limit]>";

fn parse_year(value: Option<&String>, name: &str) -> anyhow::Result<i32> {
    let raw = value.ok_or_else(|| anyhow!("缺少参数 {}\n{}", name, USAGE))?;
    raw.parse::<i32>()
        .with_context(|| format!("参数 {} 不是有效年度: {}", name, raw))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut db_path: Option<String> = None;
    let mut json_log = false;
    let mut rest: Vec<String> = Vec::new();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--db" => db_path = Some(args.next().ok_or_else(|| anyhow!("--db 缺少路径"))?),
            "--json-log" => json_log = true,
            _ => rest.push(arg),
        }
    }

    if json_log {
        logging::init_json();
    } else {
        logging::init();
    }

    let command = match rest.first() {
        Some(c) => c.clone(),
        None => bail!("{}", USAGE),
    };

    tracing::info!("==================================================");
    tracing::info!("{} v{}", slot_evaluation::APP_NAME, slot_evaluation::VERSION);
    tracing::info!("==================================================");

    let db_path = db_path.unwrap_or_else(get_default_db_path);
    let state = AppState::new(db_path).await.map_err(|e| anyhow!(e))?;

    match command.as_str() {
        "init" => {
            print_json(&state.institution_config)?;
        }
        "rebuild-all" => {
            let strict = rest.iter().any(|a| a == "--strict");
            let service = state.cache_service.clone();
            let report = tokio::task::spawn_blocking(move || service.rebuild_all(strict)).await??;
            println!(
                "rebuilt={} entries={} skipped_rows={} not_applicable={} failures={}",
                report.publications_rebuilt,
                report.entries_written,
                report.skipped_rows,
                report.not_applicable,
                report.failures.len()
            );
            for (publication_id, error) in &report.failures {
                println!("  {}: {}", publication_id, error);
            }
        }
        "drain" => {
            let report = state.refresh_worker.drain().await?;
            println!(
                "completed={} retried={} failed={} entries={} skipped_rows={}",
                report.completed,
                report.retried,
                report.failed,
                report.entries_written,
                report.skipped_rows
            );
        }
        "queue-stats" => {
            let stats = state.cache_service.queue().get_queue_stats()?;
            println!(
                "pending={} running={} completed={} failed={}",
                stats.pending_count, stats.running_count, stats.completed_count, stats.failed_count
            );
        }
        "collect" => {
            let author = rest.get(1).ok_or_else(|| anyhow!("缺少参数 author\n{}", USAGE))?;
            let quota_raw = rest.get(2).ok_or_else(|| anyhow!("缺少参数 quota\n{}", USAGE))?;
            let quota = Decimal::from_str(quota_raw)
                .with_context(|| format!("槽位配额无效: {}", quota_raw))?;
            let from = parse_year(rest.get(3), "from")?;
            let to = parse_year(rest.get(4), "to")?;
            let result = state.selection_api.collect_slots(
                author,
                quota,
                from,
                to,
                &CollectorOptions::default(),
            )?;
            print_json(&result)?;
        }
        "optimize" => {
            let from = parse_year(rest.get(1), "from")?;
            let to = parse_year(rest.get(2), "to")?;
            let mut options = OptimizerOptions::from_config(&state.institution_config);
            if let Some(pos) = rest.iter().position(|a| a == "--time-limit") {
                let secs = rest
                    .get(pos + 1)
                    .ok_or_else(|| anyhow!("--time-limit 缺少秒数"))?
                    .parse::<u64>()
                    .context("--time-limit 不是有效秒数")?;
                options = options.with_time_limit(Duration::from_secs(secs));
            }

            // Ctrl-C 取消求解，返回当前最好解
            let cancel = options.cancel_handle();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.store(true, std::sync::atomic::Ordering::Relaxed);
                }
            });

            let run = state.selection_api.run_optimization(from, to, options).await?;
            if !run.is_optimal {
                tracing::warn!("结果可能不是最优: status={}, gap={}", run.status, run.gap());
            }
            print_json(&run)?;
        }
        "runs" => {
            let limit = match rest.get(1) {
                Some(raw) => raw.parse::<usize>().context("limit 不是有效数字")?,
                None => 10,
            };
            for run in state.selection_api.list_runs(limit)? {
                println!(
                    "{} {}-{} status={} points={} bound={} selected={} created_at={}",
                    run.run_id,
                    run.year_from,
                    run.year_to,
                    run.status,
                    run.total_points,
                    run.best_bound,
                    run.selected_count(),
                    run.created_at
                );
            }
        }
        other => bail!("未知命令: {}\n{}", other, USAGE),
    }

    Ok(())
}
