// ==========================================
// 科研评估槽位系统 - 组合优化器
// ==========================================
// 职责: 在全部约束下选出总点数最大的 (出版物, 作者, 学科) 组合
// 约束:
// - 作者: Σ槽位 ≤ 总槽位预算（可按作者覆盖）
// - 作者: Σ专著槽位 ≤ 专著槽位预算
// - 机构: 低点数专著数 ≤ 比例 × 选中总数（有理数形式，选中 0 项时成立）
// - 机构: Σ槽位 ≤ 机构上限（可选）
// - 同一 (出版物, 作者) 至多选一个学科
// 流程:
// 1. 读取缓存快照（一致性读）
// 2. 阶段一：按作者分解求解（去掉机构级约束）
// 3. 阶段一并集满足机构约束 → 已最优；否则修复为初始解，阶段二全局求解
// 4. 求解结果逐条校验约束，写入运行记录（只插入）
// ==========================================

pub mod candidates;
pub mod solver;

use crate::config::InstitutionConfig;
use crate::domain::optimization::{
    AuthorSlotUsage, OptimizationRun, OptimizationStatus, SelectedCandidate,
};
use crate::domain::score::ScoreCacheEntry;
use crate::engine::error::{EvaluationError, EvaluationResult};
use crate::repository::{OptimizationRunRepository, ScoreCacheReader};
use candidates::{build_candidates, build_problem, from_units, Candidate, SelectionProblem};
use chrono::Utc;
use rust_decimal::Decimal;
use solver::{BranchAndBoundSolver, Selection, SlotSolver, SolveControl, Termination};
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument;
use uuid::Uuid;

// ==========================================
// OptimizerOptions - 单次运行选项
// ==========================================
#[derive(Debug, Clone)]
pub struct OptimizerOptions {
    pub time_limit: Duration,
    /// 置为 true 时尽快结束并返回当前最好解
    pub cancel: Arc<AtomicBool>,
    /// 作者槽位上限覆盖（author_id → 槽位）
    pub author_slot_limits: HashMap<String, Decimal>,
    /// 是否写入运行记录
    pub persist: bool,
}

impl OptimizerOptions {
    pub fn from_config(config: &InstitutionConfig) -> Self {
        Self {
            time_limit: Duration::from_secs(config.optimizer_time_limit_secs),
            cancel: Arc::new(AtomicBool::new(false)),
            author_slot_limits: HashMap::new(),
            persist: true,
        }
    }

    pub fn with_time_limit(mut self, time_limit: Duration) -> Self {
        self.time_limit = time_limit;
        self
    }

    pub fn with_author_limit(mut self, author_id: &str, slot_limit: Decimal) -> Self {
        self.author_slot_limits
            .insert(author_id.to_string(), slot_limit);
        self
    }

    pub fn without_persistence(mut self) -> Self {
        self.persist = false;
        self
    }

    /// 取消句柄（可跨线程置位）
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }
}

// ==========================================
// SlotOptimizer
// ==========================================
pub struct SlotOptimizer {
    reader: Arc<dyn ScoreCacheReader>,
    run_repo: Arc<OptimizationRunRepository>,
    config: InstitutionConfig,
    solver: Arc<dyn SlotSolver>,
}

impl SlotOptimizer {
    pub fn new(
        reader: Arc<dyn ScoreCacheReader>,
        run_repo: Arc<OptimizationRunRepository>,
        config: InstitutionConfig,
    ) -> Self {
        Self {
            reader,
            run_repo,
            config,
            solver: Arc::new(BranchAndBoundSolver),
        }
    }

    /// 替换求解器（如小规模对照用的穷举求解器）
    pub fn with_solver(mut self, solver: Arc<dyn SlotSolver>) -> Self {
        self.solver = solver;
        self
    }

    /// 配置一致性检查
    ///
    /// # 返回
    /// - Err(EvaluationError::OptimizerInfeasible): 配置互相矛盾，本次运行无解
    pub fn validate_config(&self, options: &OptimizerOptions) -> EvaluationResult<()> {
        let c = &self.config;
        let mut problems = Vec::new();
        if c.total_slot_budget < Decimal::ZERO {
            problems.push(format!("总槽位预算为负: {}", c.total_slot_budget));
        }
        if c.monograph_slot_budget < Decimal::ZERO {
            problems.push(format!("专著槽位预算为负: {}", c.monograph_slot_budget));
        }
        if c.low_point_quota_fraction < Decimal::ZERO || c.low_point_quota_fraction > Decimal::ONE {
            problems.push(format!(
                "低点数专著比例不在 [0, 1]: {}",
                c.low_point_quota_fraction
            ));
        }
        if let Some(cap) = c.institution_slot_cap {
            if cap < Decimal::ZERO {
                problems.push(format!("机构槽位上限为负: {}", cap));
            }
        }
        for (author, limit) in &options.author_slot_limits {
            if *limit < Decimal::ZERO {
                problems.push(format!("作者 {} 槽位上限为负: {}", author, limit));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(EvaluationError::OptimizerInfeasible(problems.join("; ")))
        }
    }

    /// 对缓存快照运行优化
    ///
    /// # 参数
    /// - year_from / year_to: 评估年度区间（含）
    #[instrument(skip(self, options), fields(year_from = %year_from, year_to = %year_to, solver = %self.solver.name()))]
    pub fn optimize(
        &self,
        year_from: i32,
        year_to: i32,
        options: &OptimizerOptions,
    ) -> EvaluationResult<OptimizationRun> {
        if year_from > year_to {
            return Err(EvaluationError::Solver(format!(
                "年度区间无效: {} > {}",
                year_from, year_to
            )));
        }
        self.validate_config(options)?;

        let snapshot = self.reader.snapshot(year_from, year_to)?;
        let run = self.solve_entries(snapshot, year_from, year_to, options)?;

        if options.persist {
            self.run_repo.insert(&run)?;
        }
        Ok(run)
    }

    /// 异步入口：在阻塞线程池中运行
    pub async fn optimize_async(
        self: Arc<Self>,
        year_from: i32,
        year_to: i32,
        options: OptimizerOptions,
    ) -> EvaluationResult<OptimizationRun> {
        tokio::task::spawn_blocking(move || self.optimize(year_from, year_to, &options))
            .await
            .map_err(|e| EvaluationError::TaskJoin(e.to_string()))?
    }

    /// 对给定缓存行求解（不读缓存、不写记录）
    pub fn solve_entries(
        &self,
        entries: Vec<ScoreCacheEntry>,
        year_from: i32,
        year_to: i32,
        options: &OptimizerOptions,
    ) -> EvaluationResult<OptimizationRun> {
        self.validate_config(options)?;
        let started = Instant::now();
        let deadline = started.checked_add(options.time_limit);

        let candidates = build_candidates(entries, &self.config)?;
        let (problem, authors) =
            build_problem(&candidates, &self.config, &options.author_slot_limits)?;

        let selection = if problem.items.is_empty() {
            Selection {
                chosen: Vec::new(),
                value: 0,
                best_bound: 0,
                termination: Termination::Completed,
                nodes: 0,
            }
        } else {
            self.solve_two_phase(&problem, deadline, &options.cancel)?
        };

        let violations = problem.violations(&selection.chosen);
        if !violations.is_empty() {
            return Err(EvaluationError::Solver(format!(
                "求解器 {} 返回的解违反约束: {}",
                self.solver.name(),
                violations.join("; ")
            )));
        }

        let run = self.build_run(
            &candidates,
            &problem,
            &authors,
            &selection,
            options,
            year_from,
            year_to,
            started.elapsed(),
        );

        tracing::info!(
            "优化完成: status={}, points={}, bound={}, selected={}/{}, elapsed_ms={}",
            run.status,
            run.total_points,
            run.best_bound,
            run.selected_count(),
            run.candidate_count,
            run.elapsed_ms
        );
        Ok(run)
    }

    fn solve_two_phase(
        &self,
        problem: &SelectionProblem,
        deadline: Option<Instant>,
        cancel: &Arc<AtomicBool>,
    ) -> EvaluationResult<Selection> {
        let control = SolveControl {
            deadline,
            cancel: cancel.clone(),
            warm_start: None,
        };

        // 阶段一：按作者分解
        let mut union = vec![false; problem.items.len()];
        let mut phase1_bound = 0i64;
        let mut phase1_complete = true;
        let mut nodes = 0u64;
        for author in 0..problem.author_count() {
            let (sub, mapping) = problem.author_subproblem(author);
            let s = self.solver.solve(&sub, &control)?;
            nodes += s.nodes;
            phase1_bound += s.best_bound;
            if s.termination != Termination::Completed {
                phase1_complete = false;
            }
            for (sub_index, chosen) in s.chosen.iter().enumerate() {
                if *chosen {
                    union[mapping[sub_index]] = true;
                }
            }
        }

        let phase1_value = problem.value(&union);
        if problem.is_feasible(&union) {
            tracing::info!(
                "阶段一解满足机构约束: value={}, complete={}",
                phase1_value,
                phase1_complete
            );
            let termination = if phase1_complete {
                Termination::Completed
            } else {
                interrupted_reason(&control)
            };
            return Ok(Selection {
                chosen: union,
                value: phase1_value,
                best_bound: if phase1_complete { phase1_value } else { phase1_bound },
                termination,
                nodes,
            });
        }

        // 阶段二：修复后全局求解
        let warm = repair(problem, union);
        tracing::info!(
            "阶段一解违反机构约束，进入全局求解: warm_start={}",
            problem.value(&warm)
        );
        let control = SolveControl {
            warm_start: Some(warm),
            ..control
        };
        let mut s = self.solver.solve(problem, &control)?;
        s.nodes += nodes;
        // 阶段一各作者上界之和同样是全局上界
        if s.termination != Termination::Completed {
            s.best_bound = s.best_bound.min(phase1_bound).max(s.value);
            tracing::warn!(
                "全局求解未完成 ({:?}): value={}, bound={}",
                s.termination,
                s.value,
                s.best_bound
            );
        }
        Ok(s)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_run(
        &self,
        candidates: &[Candidate],
        problem: &SelectionProblem,
        authors: &[String],
        selection: &Selection,
        options: &OptimizerOptions,
        year_from: i32,
        year_to: i32,
        elapsed: Duration,
    ) -> OptimizationRun {
        let mut usage: Vec<AuthorSlotUsage> = authors
            .iter()
            .enumerate()
            .map(|(index, author)| AuthorSlotUsage {
                author_id: author.clone(),
                slot_limit: options
                    .author_slot_limits
                    .get(author)
                    .copied()
                    .unwrap_or_else(|| from_units(problem.author_slot_limits[index])),
                slot_used: Decimal::ZERO,
                monograph_slot_used: Decimal::ZERO,
                points: Decimal::ZERO,
            })
            .collect();

        let mut selected = Vec::new();
        for (index, candidate) in candidates.iter().enumerate() {
            if !selection.chosen.get(index).copied().unwrap_or(false) {
                continue;
            }
            let author = problem.items[index].author;
            usage[author].slot_used += candidate.entry.slot;
            usage[author].points += candidate.entry.points;
            if candidate.is_monograph {
                usage[author].monograph_slot_used += candidate.entry.slot;
            }
            selected.push(SelectedCandidate {
                publication_id: candidate.entry.publication_id.clone(),
                author_id: candidate.entry.author_id.clone(),
                discipline_id: candidate.entry.discipline_id.clone(),
                slot: candidate.entry.slot,
                points: candidate.entry.points,
                is_monograph: candidate.is_monograph,
                is_low_point_monograph: candidate.is_low_point_monograph,
            });
        }

        let status = match selection.termination {
            Termination::Completed => OptimizationStatus::Optimal,
            Termination::TimedOut => OptimizationStatus::TimedOut,
            Termination::Cancelled => OptimizationStatus::Cancelled,
        };

        OptimizationRun {
            run_id: Uuid::new_v4().to_string(),
            year_from,
            year_to,
            status,
            is_optimal: selection.proven_optimal(),
            total_points: from_units(selection.value),
            best_bound: from_units(selection.best_bound),
            candidate_count: candidates.len(),
            low_monograph_count: selected.iter().filter(|s| s.is_low_point_monograph).count(),
            selected,
            author_usage: usage,
            elapsed_ms: elapsed.as_millis() as i64,
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

fn interrupted_reason(control: &SolveControl) -> Termination {
    if control.cancel.load(std::sync::atomic::Ordering::Relaxed) {
        Termination::Cancelled
    } else {
        Termination::TimedOut
    }
}

/// 将违反机构约束的选择修复为可行解
///
/// # 规则
/// - 超出机构槽位上限: 依次去掉密度最低的候选
/// - 超出低点数专著配额: 依次去掉点数最低的低点数专著
fn repair(problem: &SelectionProblem, mut chosen: Vec<bool>) -> Vec<bool> {
    if let Some(cap) = problem.institution_slot_cap {
        let mut used: i64 = problem
            .items
            .iter()
            .zip(&chosen)
            .filter(|(_, c)| **c)
            .map(|(i, _)| i.slot)
            .sum();
        let mut by_density: Vec<usize> = (0..chosen.len()).filter(|&i| chosen[i]).collect();
        by_density.sort_by(|&a, &b| {
            let ia = &problem.items[a];
            let ib = &problem.items[b];
            ((ia.points as i128) * (ib.slot as i128))
                .cmp(&((ib.points as i128) * (ia.slot as i128)))
                .then_with(|| a.cmp(&b))
        });
        for index in by_density {
            if used <= cap {
                break;
            }
            chosen[index] = false;
            used -= problem.items[index].slot;
        }
    }

    let mut lows: Vec<usize> = (0..chosen.len())
        .filter(|&i| chosen[i] && problem.items[i].is_low)
        .collect();
    lows.sort_by(|&a, &b| {
        problem.items[a]
            .points
            .cmp(&problem.items[b].points)
            .then_with(|| a.cmp(&b))
    });
    let mut total = chosen.iter().filter(|c| **c).count();
    let mut low = lows.len();
    for index in lows {
        if problem.low_quota.holds(low, total) {
            break;
        }
        chosen[index] = false;
        low -= 1;
        total -= 1;
    }
    chosen
}
