// ==========================================
// 组合优化器集成测试
// ==========================================
// 覆盖: 单候选、作者预算、专著预算、低点数专著配额、
//       与穷举求解器对照、单调性、显式不可行、空候选、运行记录
// ==========================================

mod test_helpers;

use rust_decimal::Decimal;
use slot_evaluation::api::ApiError;
use slot_evaluation::config::InstitutionConfig;
use slot_evaluation::domain::{
    OptimizationRun, OptimizationStatus, PublicationCategory, ScoreCacheEntry, Tier,
};
use slot_evaluation::engine::{BruteForceSolver, OptimizerOptions, SlotOptimizer};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use test_helpers::*;

// ==========================================
// 辅助函数
// ==========================================

/// 逐条检查运行结果满足全部约束
fn assert_constraints(run: &OptimizationRun, config: &InstitutionConfig) {
    let mut slot_by_author: HashMap<&str, Decimal> = HashMap::new();
    let mut monograph_by_author: HashMap<&str, Decimal> = HashMap::new();
    let mut pairs = HashSet::new();
    let mut total_slot = Decimal::ZERO;

    for s in &run.selected {
        *slot_by_author.entry(&s.author_id).or_default() += s.slot;
        if s.is_monograph {
            *monograph_by_author.entry(&s.author_id).or_default() += s.slot;
        }
        assert!(
            pairs.insert((s.publication_id.clone(), s.author_id.clone())),
            "出版物 {} 对作者 {} 被选中多次",
            s.publication_id,
            s.author_id
        );
        total_slot += s.slot;
    }

    for usage in &run.author_usage {
        let used = slot_by_author
            .get(usage.author_id.as_str())
            .copied()
            .unwrap_or_default();
        assert_eq!(used, usage.slot_used);
        assert!(used <= usage.slot_limit, "作者 {} 超出槽位上限", usage.author_id);
    }
    for used in monograph_by_author.values() {
        assert!(*used <= config.monograph_slot_budget, "超出专著槽位上限");
    }

    let low = run.selected.iter().filter(|s| s.is_low_point_monograph).count();
    assert_eq!(low, run.low_monograph_count);
    assert!(
        Decimal::from(low) <= config.low_point_quota_fraction * Decimal::from(run.selected.len()),
        "低点数专著 {} 超出配额（选中 {}）",
        low,
        run.selected.len()
    );

    if let Some(cap) = config.institution_slot_cap {
        assert!(total_slot <= cap, "超出机构槽位上限");
    }

    assert!(run.total_points <= run.best_bound);
    if run.is_optimal {
        assert_eq!(run.status, OptimizationStatus::Optimal);
        assert_eq!(run.total_points, run.best_bound);
    }
}

fn entry(
    publication_id: &str,
    author_id: &str,
    discipline_id: &str,
    category: PublicationCategory,
    raw_points: Decimal,
    slot: Decimal,
    points: Decimal,
) -> ScoreCacheEntry {
    ScoreCacheEntry {
        publication_id: publication_id.to_string(),
        author_id: author_id.to_string(),
        discipline_id: discipline_id.to_string(),
        year: 2020,
        category,
        tier: Tier::Tier2,
        raw_points,
        slot,
        points,
    }
}

/// 线性同余随机数（测试可复现）
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        self.0 >> 33
    }

    fn below(&mut self, n: u64) -> u64 {
        self.next() % n
    }
}

fn random_entries(rng: &mut Lcg, count: usize) -> Vec<ScoreCacheEntry> {
    let mut keys = HashSet::new();
    let mut entries = Vec::new();
    while entries.len() < count {
        let publication_id = format!("P{}", rng.below(8));
        let author_id = format!("A{}", rng.below(3));
        let discipline_id = if rng.below(4) == 0 { SOCIAL } else { ENGINEERING };
        if !keys.insert((publication_id.clone(), author_id.clone(), discipline_id)) {
            continue;
        }

        let monograph = rng.below(3) == 0;
        let points = Decimal::from(1 + rng.below(100));
        let slot = Decimal::new(25 * (1 + rng.below(4) as i64), 2);
        let (category, raw_points) = if monograph {
            (
                PublicationCategory::BookAuthorship,
                Decimal::from(50 + rng.below(251)),
            )
        } else {
            (PublicationCategory::Article, points)
        };
        entries.push(entry(
            &publication_id,
            &author_id,
            discipline_id,
            category,
            raw_points,
            slot,
            points,
        ));
    }
    entries
}

fn optimizer_for(env: &TestEnv, config: InstitutionConfig) -> SlotOptimizer {
    SlotOptimizer::new(env.cache.reader(), env.run_repo.clone(), config)
}

// ==========================================
// 经由缓存的端到端场景
// ==========================================

#[tokio::test]
async fn test_single_candidate_is_selected_and_recorded() {
    let env = TestEnv::new();
    env.seed_disciplines();
    env.single_author_article("P1", "A1", 2019, "10", 1);
    env.drain();

    let run = env
        .selection_api
        .run_optimization(2019, 2019, OptimizerOptions::from_config(&env.config))
        .await
        .expect("优化失败");

    assert_eq!(run.status, OptimizationStatus::Optimal);
    assert!(run.is_optimal);
    assert_eq!(run.total_points, d("10"));
    assert_eq!(run.candidate_count, 1);
    assert_eq!(run.selected.len(), 1);
    assert_eq!(run.selected[0].slot, d("1"));
    assert_constraints(&run, &env.config);

    let stored = env.selection_api.get_run(&run.run_id).expect("读取运行记录失败");
    assert_eq!(stored.total_points, run.total_points);
    assert_eq!(stored.selected, run.selected);
    assert_eq!(stored.status, run.status);

    let recent = env.selection_api.list_runs(10).expect("读取运行记录失败");
    assert!(recent.iter().any(|r| r.run_id == run.run_id));
}

#[tokio::test]
async fn test_author_slot_budget() {
    let env = TestEnv::new();
    env.seed_disciplines();
    for (i, points) in ["10", "15", "20", "25", "30", "35"].iter().enumerate() {
        env.single_author_article(&format!("P{}", i), "A1", 2019, points, 1);
    }
    env.drain();

    let run = env
        .selection_api
        .run_optimization(2019, 2019, OptimizerOptions::from_config(&env.config))
        .await
        .expect("优化失败");
    assert!(run.is_optimal);
    assert_eq!(run.total_points, d("110"));
    assert_eq!(run.selected.len(), 4);
    assert_constraints(&run, &env.config);

    // 按作者覆盖槽位上限
    let options = OptimizerOptions::from_config(&env.config).with_author_limit("A1", d("2"));
    let limited = env
        .selection_api
        .run_optimization(2019, 2019, options)
        .await
        .expect("优化失败");
    assert_eq!(limited.total_points, d("65"));
    assert_eq!(limited.author_usage[0].slot_limit, d("2"));
}

#[tokio::test]
async fn test_monograph_budget() {
    let env = TestEnv::new();
    env.seed_disciplines();
    env.assign("A1", 2020, ENGINEERING);
    for (id, points) in [("M1", "250"), ("M2", "220"), ("M3", "210")] {
        env.publish(&monograph(id, 2020, points));
        env.contribute(id, "A1", ENGINEERING);
    }
    env.single_author_article("P1", "A1", 2020, "35", 1);
    env.single_author_article("P2", "A1", 2020, "30", 1);
    env.drain();

    let run = env
        .selection_api
        .run_optimization(2020, 2020, OptimizerOptions::from_config(&env.config))
        .await
        .expect("优化失败");
    assert!(run.is_optimal);
    assert_eq!(run.total_points, d("535"));
    assert_eq!(run.author_usage[0].monograph_slot_used, d("2"));
    assert_constraints(&run, &env.config);
}

#[tokio::test]
async fn test_low_point_monograph_quota() {
    let env = TestEnv::new();
    env.seed_disciplines();
    env.assign("A1", 2020, ENGINEERING);
    env.publish(&monograph("L1", 2020, "150"));
    env.contribute("L1", "A1", ENGINEERING);
    env.single_author_article("P1", "A1", 2020, "35", 1);
    env.drain();

    // 1 个低点数专著需要至少 5 个选中项
    let run = env
        .selection_api
        .run_optimization(2020, 2020, OptimizerOptions::from_config(&env.config))
        .await
        .expect("优化失败");
    assert!(run.is_optimal);
    assert_eq!(run.total_points, d("35"));
    assert_eq!(run.low_monograph_count, 0);

    for author in ["A2", "A3", "A4"] {
        env.single_author_article(&format!("P-{}", author), author, 2020, "35", 1);
    }
    env.drain();

    let run = env
        .selection_api
        .run_optimization(2020, 2020, OptimizerOptions::from_config(&env.config))
        .await
        .expect("优化失败");
    assert!(run.is_optimal);
    assert_eq!(run.total_points, d("290"));
    assert_eq!(run.low_monograph_count, 1);
    assert_eq!(run.selected.len(), 5);
    assert_constraints(&run, &env.config);
}

#[tokio::test]
async fn test_empty_candidates_give_optimal_empty_run() {
    let env = TestEnv::new();

    let run = env
        .selection_api
        .run_optimization(2018, 2018, OptimizerOptions::from_config(&env.config))
        .await
        .expect("优化失败");
    assert!(run.is_optimal);
    assert_eq!(run.total_points, Decimal::ZERO);
    assert!(run.selected.is_empty());
    assert_eq!(run.candidate_count, 0);
}

#[tokio::test]
async fn test_infeasible_config_is_explicit() {
    let mut config = InstitutionConfig::default();
    config.low_point_quota_fraction = d("-0.1");
    let env = TestEnv::with_config(config);
    env.seed_disciplines();
    env.single_author_article("P1", "A1", 2019, "10", 1);
    env.drain();

    let result = env
        .selection_api
        .run_optimization(2019, 2019, OptimizerOptions::from_config(&env.config))
        .await;
    assert!(matches!(result, Err(ApiError::Infeasible(_))));

    // 失败的运行不留下记录
    assert!(env.selection_api.list_runs(10).expect("读取运行记录失败").is_empty());
}

#[tokio::test]
async fn test_negative_author_limit_is_infeasible() {
    let env = TestEnv::new();
    let options = OptimizerOptions::from_config(&env.config).with_author_limit("A1", d("-1"));
    let result = env.selection_api.run_optimization(2019, 2019, options).await;
    assert!(matches!(result, Err(ApiError::Infeasible(_))));
}

// ==========================================
// 求解器对照（合成缓存行）
// ==========================================

#[test]
fn test_matches_brute_force_on_random_instances() {
    let env = TestEnv::new();
    let mut rng = Lcg(20_240_601);

    for round in 0..40 {
        let mut config = InstitutionConfig {
            total_slot_budget: d("2"),
            monograph_slot_budget: d("1"),
            ..InstitutionConfig::default()
        };
        if round % 2 == 1 {
            config.low_point_quota_fraction = d("0.5");
        }
        if round % 3 == 0 {
            config.institution_slot_cap = Some(d("3"));
        }

        let entries = random_entries(&mut rng, 6 + (round % 9));
        let options = OptimizerOptions::from_config(&config).without_persistence();

        let exact = optimizer_for(&env, config.clone())
            .with_solver(Arc::new(BruteForceSolver))
            .solve_entries(entries.clone(), 2020, 2020, &options)
            .expect("穷举求解失败");
        let run = optimizer_for(&env, config.clone())
            .solve_entries(entries, 2020, 2020, &options)
            .expect("分支定界求解失败");

        assert!(run.is_optimal, "round {}", round);
        assert_eq!(run.total_points, exact.total_points, "round {}", round);
        assert_constraints(&run, &config);
        assert_constraints(&exact, &config);
    }
}

#[test]
fn test_larger_budget_never_lowers_objective() {
    let env = TestEnv::new();
    let mut rng = Lcg(7);
    let entries = random_entries(&mut rng, 16);

    let mut previous = Decimal::ZERO;
    for budget in ["0", "0.5", "1", "2", "3", "4"] {
        let config = InstitutionConfig {
            total_slot_budget: d(budget),
            ..InstitutionConfig::default()
        };
        let options = OptimizerOptions::from_config(&config).without_persistence();
        let run = optimizer_for(&env, config.clone())
            .solve_entries(entries.clone(), 2020, 2020, &options)
            .expect("求解失败");
        assert!(run.is_optimal);
        assert!(
            run.total_points >= previous,
            "budget {}: {} < {}",
            budget,
            run.total_points,
            previous
        );
        assert_constraints(&run, &config);
        previous = run.total_points;
    }
}

#[test]
fn test_added_candidate_never_lowers_objective() {
    let env = TestEnv::new();
    let mut rng = Lcg(31);

    for round in 0..24 {
        let config = InstitutionConfig {
            total_slot_budget: d("2"),
            monograph_slot_budget: d("1"),
            ..InstitutionConfig::default()
        };
        let options = OptimizerOptions::from_config(&config).without_persistence();
        let mut entries = random_entries(&mut rng, 6 + (round % 7));

        let before = optimizer_for(&env, config.clone())
            .solve_entries(entries.clone(), 2020, 2020, &options)
            .expect("求解失败");

        // 偶数轮追加低点数专著，奇数轮追加文章
        let author_id = format!("A{}", rng.below(4));
        let points = Decimal::from(1 + rng.below(80));
        let slot = Decimal::new(25 * (1 + rng.below(4) as i64), 2);
        let added = if round % 2 == 0 {
            entry(
                "PX",
                &author_id,
                ENGINEERING,
                PublicationCategory::BookAuthorship,
                d("120"),
                slot,
                points,
            )
        } else {
            entry(
                "PX",
                &author_id,
                ENGINEERING,
                PublicationCategory::Article,
                points,
                slot,
                points,
            )
        };
        entries.push(added);

        let after = optimizer_for(&env, config.clone())
            .solve_entries(entries, 2020, 2020, &options)
            .expect("求解失败");

        assert!(before.is_optimal && after.is_optimal, "round {}", round);
        assert!(
            after.total_points >= before.total_points,
            "round {}: {} < {}",
            round,
            after.total_points,
            before.total_points
        );
        assert_eq!(after.candidate_count, before.candidate_count + 1);
        assert_constraints(&after, &config);
    }
}

// ==========================================
// 章节（不属于专著）
// ==========================================

fn chapter(publication_id: &str, author_id: &str) -> ScoreCacheEntry {
    entry(
        publication_id,
        author_id,
        ENGINEERING,
        PublicationCategory::Chapter,
        d("50"),
        d("0.5"),
        d("25"),
    )
}

#[test]
fn test_chapters_are_not_low_point_monographs() {
    let env = TestEnv::new();
    let config = InstitutionConfig::default();
    let options = OptimizerOptions::from_config(&config).without_persistence();

    let run = optimizer_for(&env, config.clone())
        .solve_entries(vec![chapter("C1", "A1"), chapter("C2", "A1")], 2020, 2020, &options)
        .expect("求解失败");

    assert!(run.is_optimal);
    assert_eq!(run.total_points, d("50"));
    assert_eq!(run.selected.len(), 2);
    assert_eq!(run.low_monograph_count, 0);
    assert!(run.selected.iter().all(|s| !s.is_monograph));
    assert_eq!(run.author_usage[0].monograph_slot_used, Decimal::ZERO);
    assert_constraints(&run, &config);
}

#[test]
fn test_chapters_do_not_use_monograph_budget() {
    let env = TestEnv::new();
    let config = InstitutionConfig {
        monograph_slot_budget: Decimal::ZERO,
        ..InstitutionConfig::default()
    };
    let options = OptimizerOptions::from_config(&config).without_persistence();

    let entries = vec![
        chapter("C1", "A1"),
        chapter("C2", "A1"),
        entry(
            "P1",
            "A1",
            ENGINEERING,
            PublicationCategory::Article,
            d("40"),
            d("1"),
            d("40"),
        ),
        entry(
            "M1",
            "A1",
            ENGINEERING,
            PublicationCategory::BookAuthorship,
            d("250"),
            d("1"),
            d("250"),
        ),
    ];
    let run = optimizer_for(&env, config.clone())
        .solve_entries(entries, 2020, 2020, &options)
        .expect("求解失败");

    // 专著额度为 0：M1 不可选，章节与文章照常入选
    assert!(run.is_optimal);
    assert_eq!(run.total_points, d("90"));
    let mut ids: Vec<&str> = run.selected.iter().map(|s| s.publication_id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["C1", "C2", "P1"]);
    assert_eq!(run.low_monograph_count, 0);
    assert_constraints(&run, &config);
}

#[test]
fn test_cancelled_run_is_feasible() {
    let env = TestEnv::new();
    let mut rng = Lcg(99);
    let entries = random_entries(&mut rng, 20);
    let config = InstitutionConfig::default();

    let options = OptimizerOptions::from_config(&config).without_persistence();
    options.cancel_handle().store(true, Ordering::Relaxed);
    let run = optimizer_for(&env, config.clone())
        .solve_entries(entries, 2020, 2020, &options)
        .expect("求解失败");

    assert_constraints(&run, &config);
    if !run.is_optimal {
        assert_eq!(run.status, OptimizationStatus::Cancelled);
    }
}

#[test]
fn test_brute_force_rejects_large_instances() {
    let env = TestEnv::new();
    let entries: Vec<ScoreCacheEntry> = (0..21)
        .map(|i| {
            entry(
                &format!("P{}", i),
                "A1",
                ENGINEERING,
                PublicationCategory::Article,
                d("10"),
                d("0.1"),
                d("10"),
            )
        })
        .collect();
    let config = InstitutionConfig::default();
    let options = OptimizerOptions::from_config(&config).without_persistence();

    let result = optimizer_for(&env, config)
        .with_solver(Arc::new(BruteForceSolver))
        .solve_entries(entries, 2020, 2020, &options);
    assert!(result.is_err());
}
