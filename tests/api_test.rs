// ==========================================
// 数据录入 API 集成测试
// ==========================================
// 覆盖: 输入校验、录入不变量、学科申报联动、事件发布
// ==========================================

mod test_helpers;

use slot_evaluation::api::{ApiError, EvaluationApi};
use slot_evaluation::domain::{AuthorDisciplineAssignment, Violation};
use test_helpers::*;

fn violation_codes(err: ApiError) -> Vec<String> {
    match err {
        ApiError::ValidationFailed { violations, .. } => {
            violations.into_iter().map(|v: Violation| v.code).collect()
        }
        other => panic!("expected ValidationFailed, got {:?}", other),
    }
}

fn contribution_discipline(env: &TestEnv, publication_id: &str, author_id: &str) -> Option<String> {
    let (_, contributions) = env
        .evaluation_api
        .get_publication(publication_id)
        .expect("读取出版物失败");
    contributions
        .into_iter()
        .find(|c| c.author_id == author_id)
        .and_then(|c| c.discipline_id)
}

// ==========================================
// 输入校验
// ==========================================

#[test]
fn test_reject_invalid_input() {
    let env = TestEnv::new();

    let bad_code = env
        .evaluation_api
        .save_discipline(&discipline("D-X", "99.1", "未知"));
    assert!(matches!(bad_code, Err(ApiError::InvalidInput(_))));

    let negative = env
        .evaluation_api
        .save_publication(&article("P1", 2020, "-5"));
    assert!(matches!(negative, Err(ApiError::InvalidInput(_))));

    let empty_id = env.evaluation_api.save_publication(&article(" ", 2020, "5"));
    assert!(matches!(empty_id, Err(ApiError::InvalidInput(_))));
}

#[test]
fn test_not_found_errors() {
    let env = TestEnv::new();
    env.seed_disciplines();
    env.assign("A1", 2020, ENGINEERING);

    assert!(matches!(
        env.evaluation_api.get_publication("missing"),
        Err(ApiError::NotFound(_))
    ));
    assert!(matches!(
        env.evaluation_api.delete_publication("missing"),
        Err(ApiError::NotFound(_))
    ));
    assert!(matches!(
        env.evaluation_api.delete_assignment("A9", 2020),
        Err(ApiError::NotFound(_))
    ));
    assert!(matches!(
        env.evaluation_api
            .save_contribution(&author("missing", "A1", ENGINEERING)),
        Err(ApiError::NotFound(_))
    ));
}

#[test]
fn test_contribution_discipline_must_be_declared() {
    let env = TestEnv::new();
    env.seed_disciplines();
    env.publish(&article("P1", 2020, "40"));

    // 作者该年度没有申报
    let err = env
        .evaluation_api
        .save_contribution(&author("P1", "A1", ENGINEERING))
        .expect_err("未申报学科应被拒绝");
    assert_eq!(violation_codes(err), vec!["DISCIPLINE_NOT_DECLARED"]);

    // 申报了其他学科
    env.assign("A1", 2020, SOCIAL);
    let err = env
        .evaluation_api
        .save_contribution(&author("P1", "A1", ENGINEERING))
        .expect_err("非申报学科应被拒绝");
    assert_eq!(violation_codes(err), vec!["DISCIPLINE_NOT_DECLARED"]);

    // 其他年度的申报不算
    env.assign("A1", 2021, ENGINEERING);
    assert!(env
        .evaluation_api
        .save_contribution(&author("P1", "A1", ENGINEERING))
        .is_err());

    env.evaluation_api
        .save_contribution(&author("P1", "A1", SOCIAL))
        .expect("申报学科应被接受");
}

#[test]
fn test_contribution_share_limits() {
    let env = TestEnv::new();
    env.seed_disciplines();
    env.publish(&article("P1", 2020, "40"));
    for a in ["A1", "A2"] {
        env.assign(a, 2020, ENGINEERING);
    }

    let mut over = author("P1", "A1", ENGINEERING);
    over.share_percent = d("120");
    let err = env.evaluation_api.save_contribution(&over).expect_err("份额越界");
    assert_eq!(violation_codes(err), vec!["SHARE_OUT_OF_RANGE"]);

    let mut first = author("P1", "A1", ENGINEERING);
    first.share_percent = d("60");
    env.evaluation_api.save_contribution(&first).expect("写入贡献失败");

    let mut second = author("P1", "A2", ENGINEERING);
    second.share_percent = d("50");
    let err = env.evaluation_api.save_contribution(&second).expect_err("份额合计越界");
    assert_eq!(violation_codes(err), vec!["SHARE_TOTAL_OVER_100"]);

    // 覆盖自身份额时不与旧值重复计算
    first.share_percent = d("100");
    env.evaluation_api.save_contribution(&first).expect("覆盖贡献失败");
}

#[test]
fn test_assignment_invariants() {
    let env = TestEnv::new();
    env.seed_disciplines();

    let same = AuthorDisciplineAssignment::dual("A1", 2020, ENGINEERING, ENGINEERING, d("50"));
    let err = env.evaluation_api.save_assignment(&same).expect_err("主/第二学科相同");
    assert!(violation_codes(err).contains(&"SAME_PRIMARY_SECONDARY".to_string()));

    let mut over = AuthorDisciplineAssignment::dual("A1", 2020, ENGINEERING, SOCIAL, d("70"));
    over.secondary_percent = Some(d("40"));
    let err = env.evaluation_api.save_assignment(&over).expect_err("份额合计越界");
    assert_eq!(violation_codes(err), vec!["SPLIT_OVER_100"]);

    let unknown = AuthorDisciplineAssignment::single("A1", 2020, "D-missing");
    let err = env.evaluation_api.save_assignment(&unknown).expect_err("学科不存在");
    assert_eq!(violation_codes(err), vec!["UNKNOWN_DISCIPLINE"]);

    assert!(env
        .evaluation_api
        .get_assignment("A1", 2020)
        .expect("读取申报失败")
        .is_none());
}

// ==========================================
// 学科申报联动
// ==========================================

#[test]
fn test_swap_primary_and_secondary() {
    let env = TestEnv::new();
    env.seed_disciplines();
    env.evaluation_api
        .save_assignment(&AuthorDisciplineAssignment::dual(
            "A1",
            2020,
            ENGINEERING,
            SOCIAL,
            d("60"),
        ))
        .expect("写入申报失败");
    env.publish(&article("P1", 2020, "40"));
    env.publish(&article("P2", 2020, "30"));
    env.contribute("P1", "A1", ENGINEERING);
    env.contribute("P2", "A1", SOCIAL);

    env.evaluation_api
        .save_assignment(&AuthorDisciplineAssignment::dual(
            "A1",
            2020,
            SOCIAL,
            ENGINEERING,
            d("60"),
        ))
        .expect("写入申报失败");

    assert_eq!(contribution_discipline(&env, "P1", "A1").as_deref(), Some(SOCIAL));
    assert_eq!(
        contribution_discipline(&env, "P2", "A1").as_deref(),
        Some(ENGINEERING)
    );
}

#[test]
fn test_dropping_secondary_clears_dependent_contributions() {
    let env = TestEnv::new();
    env.seed_disciplines();
    env.evaluation_api
        .save_assignment(&AuthorDisciplineAssignment::dual(
            "A1",
            2020,
            ENGINEERING,
            SOCIAL,
            d("50"),
        ))
        .expect("写入申报失败");
    env.publish(&article("P1", 2020, "40"));
    env.publish(&article("P2", 2020, "30"));
    env.contribute("P1", "A1", ENGINEERING);
    env.contribute("P2", "A1", SOCIAL);

    // 第二学科替换
    env.evaluation_api
        .save_assignment(&AuthorDisciplineAssignment::dual(
            "A1",
            2020,
            ENGINEERING,
            HUMANITIES,
            d("50"),
        ))
        .expect("写入申报失败");
    assert_eq!(
        contribution_discipline(&env, "P2", "A1").as_deref(),
        Some(HUMANITIES)
    );

    // 第二学科取消
    env.assign("A1", 2020, ENGINEERING);
    assert_eq!(
        contribution_discipline(&env, "P1", "A1").as_deref(),
        Some(ENGINEERING)
    );
    assert_eq!(contribution_discipline(&env, "P2", "A1"), None);
}

// ==========================================
// 事件发布
// ==========================================

#[test]
fn test_without_publisher_no_tasks() {
    let env = TestEnv::new();
    let api = EvaluationApi::new(
        env.publication_repo.clone(),
        env.discipline_repo.clone(),
        None,
    );
    api.save_discipline(&discipline(ENGINEERING, "2.7", "工程与技术科学"))
        .expect("写入学科失败");

    let task_ids = api
        .save_publication(&article("P1", 2020, "40"))
        .expect("写入出版物失败");
    assert!(task_ids.is_empty());

    let stats = env.cache.queue().get_queue_stats().expect("读取队列统计失败");
    assert_eq!(stats.pending_count, 0);
}

#[test]
fn test_contribution_change_enqueues_publication() {
    let env = TestEnv::new();
    env.seed_disciplines();
    env.single_author_article("P1", "A1", 2020, "40", 1);
    env.drain();

    let task_ids = env
        .evaluation_api
        .delete_contribution("P1", "A1")
        .expect("删除贡献失败");
    assert_eq!(task_ids.len(), 1);

    let task = env
        .cache
        .queue()
        .get_task(&task_ids[0])
        .expect("读取任务失败")
        .expect("任务应存在");
    assert_eq!(task.publication_id, "P1");
    assert_eq!(task.trigger, "ContributionChanged");

    env.drain();
    assert!(env
        .selection_api
        .get_publication_scores("P1")
        .expect("读取缓存失败")
        .is_empty());
    assert!(env
        .selection_api
        .get_publication_discipline_scores("P1")
        .expect("读取缓存失败")
        .is_empty());
}
