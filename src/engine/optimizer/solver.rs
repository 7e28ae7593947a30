// ==========================================
// 科研评估槽位系统 - 0/1 选择求解器
// ==========================================
// 职责: solve(选择问题, 控制) -> 选择结果
// 实现:
// - BranchAndBoundSolver: 深度优先分支定界，可限时/可取消
// - BruteForceSolver: 小规模穷举（≤ 20 个候选），用于对照
// 上界: 剩余候选按密度做分数贪心填充
//   (作者总槽位 ⊃ 作者专著槽位，机构上限包含全部作者，约束集合层次嵌套，
//    分数贪心即为线性松弛最优值)
// ==========================================

use crate::engine::error::{EvaluationError, EvaluationResult};
use crate::engine::optimizer::candidates::SelectionProblem;
use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// 检查时间/取消标志的节点间隔
const CONTROL_CHECK_INTERVAL: u64 = 1024;

/// 穷举求解器的最大候选数
pub const BRUTE_FORCE_MAX_ITEMS: usize = 20;

/// 求解结束方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// 搜索完成，已证明最优
    Completed,
    TimedOut,
    Cancelled,
}

/// 求解控制
#[derive(Debug, Clone)]
pub struct SolveControl {
    pub deadline: Option<Instant>,
    pub cancel: Arc<AtomicBool>,
    /// 初始可行解（不可行时忽略）
    pub warm_start: Option<Vec<bool>>,
}

impl SolveControl {
    pub fn unbounded() -> Self {
        Self {
            deadline: None,
            cancel: Arc::new(AtomicBool::new(false)),
            warm_start: None,
        }
    }

    fn interrupted(&self) -> Option<Termination> {
        if self.cancel.load(Ordering::Relaxed) {
            return Some(Termination::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(Termination::TimedOut),
            _ => None,
        }
    }
}

/// 求解结果
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// 按问题候选下标
    pub chosen: Vec<bool>,
    pub value: i64,
    /// 目标值上界（已证明最优时等于 value）
    pub best_bound: i64,
    pub termination: Termination,
    pub nodes: u64,
}

impl Selection {
    pub fn proven_optimal(&self) -> bool {
        self.termination == Termination::Completed
    }
}

/// 求解器接口
pub trait SlotSolver: Send + Sync {
    fn name(&self) -> &str;

    /// 求解选择问题
    ///
    /// # 返回
    /// - Ok(Selection): 满足全部约束的选择（中断时为当前最好解）
    /// - Err(EvaluationError::Solver): 输入超出求解器能力
    fn solve(&self, problem: &SelectionProblem, control: &SolveControl) -> EvaluationResult<Selection>;
}

// ==========================================
// BranchAndBoundSolver
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct BranchAndBoundSolver;

/// 搜索状态（随分支增量维护）
struct SearchState {
    chosen: Vec<bool>,
    slot_used: Vec<i64>,
    mono_used: Vec<i64>,
    group_taken: Vec<bool>,
    all_slots: i64,
    total: usize,
    low: usize,
    value: i64,
}

impl SearchState {
    fn new(problem: &SelectionProblem) -> Self {
        Self {
            chosen: vec![false; problem.items.len()],
            slot_used: vec![0; problem.author_count()],
            mono_used: vec![0; problem.author_count()],
            group_taken: vec![false; problem.group_count],
            all_slots: 0,
            total: 0,
            low: 0,
            value: 0,
        }
    }

    fn can_include(&self, problem: &SelectionProblem, index: usize) -> bool {
        let item = &problem.items[index];
        if self.group_taken[item.group] {
            return false;
        }
        if self.slot_used[item.author] + item.slot > problem.author_slot_limits[item.author] {
            return false;
        }
        if item.is_monograph
            && self.mono_used[item.author] + item.slot > problem.author_monograph_limits[item.author]
        {
            return false;
        }
        match problem.institution_slot_cap {
            Some(cap) => self.all_slots + item.slot <= cap,
            None => true,
        }
    }

    fn apply(&mut self, problem: &SelectionProblem, index: usize, include: bool) {
        let item = &problem.items[index];
        let sign = if include { 1 } else { -1 };
        self.chosen[index] = include;
        self.slot_used[item.author] += sign * item.slot;
        if item.is_monograph {
            self.mono_used[item.author] += sign * item.slot;
        }
        self.group_taken[item.group] = include;
        self.all_slots += sign * item.slot;
        self.value += sign * item.points;
        if include {
            self.total += 1;
            if item.is_low {
                self.low += 1;
            }
        } else {
            self.total -= 1;
            if item.is_low {
                self.low -= 1;
            }
        }
    }
}

/// 按密度降序比较（槽位为 0 的候选最前）
fn density_order(problem: &SelectionProblem, a: usize, b: usize) -> CmpOrdering {
    let ia = &problem.items[a];
    let ib = &problem.items[b];
    // pa/sa > pb/sb  <=>  pa*sb > pb*sa
    let lhs = (ia.points as i128) * (ib.slot.max(0) as i128);
    let rhs = (ib.points as i128) * (ia.slot.max(0) as i128);
    match (ia.slot <= 0, ib.slot <= 0) {
        (true, false) => CmpOrdering::Less,
        (false, true) => CmpOrdering::Greater,
        (true, true) => ib.points.cmp(&ia.points),
        (false, false) => rhs.cmp(&lhs),
    }
    .then_with(|| a.cmp(&b))
}

/// 分数贪心上界（从 order[pos..] 开始）
fn fractional_bound(
    problem: &SelectionProblem,
    order: &[usize],
    pos: usize,
    state: &SearchState,
    scratch_total: &mut [i64],
    scratch_mono: &mut [i64],
) -> i64 {
    for author in 0..problem.author_count() {
        scratch_total[author] = (problem.author_slot_limits[author] - state.slot_used[author]).max(0);
        scratch_mono[author] =
            (problem.author_monograph_limits[author] - state.mono_used[author]).max(0);
    }
    let mut institution_left = problem
        .institution_slot_cap
        .map(|cap| (cap - state.all_slots).max(0));

    let mut bound = state.value;
    for &index in &order[pos..] {
        let item = &problem.items[index];
        if state.group_taken[item.group] || item.points <= 0 {
            continue;
        }
        let mut capacity = scratch_total[item.author];
        if item.is_monograph {
            capacity = capacity.min(scratch_mono[item.author]);
        }
        if let Some(left) = institution_left {
            capacity = capacity.min(left);
        }
        if item.slot <= 0 {
            bound += item.points;
            continue;
        }
        if capacity <= 0 {
            continue;
        }

        let taken = capacity.min(item.slot);
        if taken == item.slot {
            bound += item.points;
        } else {
            // 向上取整，保证上界有效
            let partial = ((item.points as i128) * (taken as i128) + (item.slot as i128) - 1)
                / (item.slot as i128);
            bound += partial as i64;
        }
        scratch_total[item.author] -= taken;
        if item.is_monograph {
            scratch_mono[item.author] -= taken;
        }
        if let Some(left) = institution_left.as_mut() {
            *left -= taken;
        }
    }
    bound
}

struct Frame {
    pos: usize,
    included: bool,
    expanded: bool,
}

impl SlotSolver for BranchAndBoundSolver {
    fn name(&self) -> &str {
        "branch_and_bound"
    }

    fn solve(&self, problem: &SelectionProblem, control: &SolveControl) -> EvaluationResult<Selection> {
        let n = problem.items.len();
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| density_order(problem, a, b));

        // suffix_non_low[pos]: order[pos..] 中非低点数候选数
        let mut suffix_non_low = vec![0usize; n + 1];
        for pos in (0..n).rev() {
            suffix_non_low[pos] =
                suffix_non_low[pos + 1] + usize::from(!problem.items[order[pos]].is_low);
        }

        let mut best_chosen = vec![false; n];
        let mut best_value = 0i64;
        if let Some(warm) = &control.warm_start {
            if problem.is_feasible(warm) {
                best_chosen = warm.clone();
                best_value = problem.value(warm);
            }
        }

        let mut state = SearchState::new(problem);
        let mut scratch_total = vec![0i64; problem.author_count()];
        let mut scratch_mono = vec![0i64; problem.author_count()];
        let root_bound =
            fractional_bound(problem, &order, 0, &state, &mut scratch_total, &mut scratch_mono);

        let mut nodes = 0u64;
        let mut termination = Termination::Completed;
        let mut stack = vec![Frame {
            pos: 0,
            included: false,
            expanded: false,
        }];

        while let Some(top) = stack.len().checked_sub(1) {
            let pos = stack[top].pos;

            if stack[top].expanded {
                // 回溯：撤销包含分支，尝试排除分支
                if stack[top].included {
                    state.apply(problem, order[pos], false);
                    stack[top].included = false;
                    stack.push(Frame {
                        pos: pos + 1,
                        included: false,
                        expanded: false,
                    });
                } else {
                    stack.pop();
                }
                continue;
            }

            nodes += 1;
            if nodes % CONTROL_CHECK_INTERVAL == 0 {
                if let Some(reason) = control.interrupted() {
                    termination = reason;
                    break;
                }
            }

            if problem.low_quota.holds(state.low, state.total) && state.value > best_value {
                best_value = state.value;
                best_chosen.copy_from_slice(&state.chosen);
            }

            let quota_reachable = problem
                .low_quota
                .holds(state.low, state.total + suffix_non_low[pos]);
            if pos == n || !quota_reachable {
                stack.pop();
                continue;
            }
            let bound = fractional_bound(
                problem,
                &order,
                pos,
                &state,
                &mut scratch_total,
                &mut scratch_mono,
            );
            if bound <= best_value {
                stack.pop();
                continue;
            }

            let index = order[pos];
            stack[top].expanded = true;
            if problem.items[index].points > 0 && state.can_include(problem, index) {
                state.apply(problem, index, true);
                stack[top].included = true;
            }
            stack.push(Frame {
                pos: pos + 1,
                included: false,
                expanded: false,
            });
        }

        let best_bound = if termination == Termination::Completed {
            best_value
        } else {
            root_bound.max(best_value)
        };

        Ok(Selection {
            chosen: best_chosen,
            value: best_value,
            best_bound,
            termination,
            nodes,
        })
    }
}

// ==========================================
// BruteForceSolver
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct BruteForceSolver;

impl SlotSolver for BruteForceSolver {
    fn name(&self) -> &str {
        "brute_force"
    }

    fn solve(&self, problem: &SelectionProblem, control: &SolveControl) -> EvaluationResult<Selection> {
        let n = problem.items.len();
        if n > BRUTE_FORCE_MAX_ITEMS {
            return Err(EvaluationError::Solver(format!(
                "穷举求解器最多支持 {} 个候选，实际 {}",
                BRUTE_FORCE_MAX_ITEMS, n
            )));
        }

        let mut best_chosen = vec![false; n];
        let mut best_value = 0i64;
        let mut chosen = vec![false; n];
        let mut nodes = 0u64;

        for mask in 0u64..(1u64 << n) {
            nodes += 1;
            if nodes % CONTROL_CHECK_INTERVAL == 0 {
                if let Some(reason) = control.interrupted() {
                    return Ok(Selection {
                        chosen: best_chosen,
                        value: best_value,
                        best_bound: problem.items.iter().map(|i| i.points.max(0)).sum(),
                        termination: reason,
                        nodes,
                    });
                }
            }
            for (i, c) in chosen.iter_mut().enumerate() {
                *c = mask & (1 << i) != 0;
            }
            let value = problem.value(&chosen);
            if value > best_value && problem.is_feasible(&chosen) {
                best_value = value;
                best_chosen.copy_from_slice(&chosen);
            }
        }

        Ok(Selection {
            chosen: best_chosen,
            value: best_value,
            best_bound: best_value,
            termination: Termination::Completed,
            nodes,
        })
    }
}
