// ==========================================
// 集成测试辅助函数
// ==========================================
// 职责: 临时数据库、组件装配、测试数据构造
// ==========================================

#![allow(dead_code)]

use rusqlite::Connection;
use rust_decimal::Decimal;
use slot_evaluation::api::{EvaluationApi, SelectionApi};
use slot_evaluation::config::InstitutionConfig;
use slot_evaluation::db::{ensure_schema, open_sqlite_connection};
use slot_evaluation::domain::{
    AuthorContribution, AuthorDisciplineAssignment, ContributionRole, Discipline, Publication,
    PublicationCategory,
};
use slot_evaluation::engine::{CacheEventPublisher, RefreshWorker, ScoreCacheService, SlotOptimizer};
use slot_evaluation::repository::{
    DisciplineRepository, OptimizationRunRepository, PublicationRepository,
};
use std::error::Error;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

/// 非 HST 学科（工程与技术科学）
pub const ENGINEERING: &str = "D-2.7";
/// HST 学科（社会科学）
pub const SOCIAL: &str = "D-5.3";
/// HST 学科（人文科学）
pub const HUMANITIES: &str = "D-1.2";

/// 创建测试数据库（已建表）
///
/// # 返回
/// - (临时文件, 数据库路径)；临时文件离开作用域后删除
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file.path().to_str().ok_or("临时路径无效")?.to_string();

    let conn = open_sqlite_connection(&db_path)?;
    ensure_schema(&conn)?;

    Ok((temp_file, db_path))
}

/// 打开测试数据库的共享连接
pub fn open_test_connection(db_path: &str) -> Result<Arc<Mutex<Connection>>, Box<dyn Error>> {
    let conn = open_sqlite_connection(db_path)?;
    Ok(Arc::new(Mutex::new(conn)))
}

pub fn d(s: &str) -> Decimal {
    Decimal::from_str(s).expect("无效的小数")
}

// ==========================================
// 组件装配
// ==========================================

/// 集成测试环境（共享同一个连接）
pub struct TestEnv {
    pub _temp_file: NamedTempFile,
    pub db_path: String,
    pub conn: Arc<Mutex<Connection>>,
    pub config: InstitutionConfig,
    pub publication_repo: Arc<PublicationRepository>,
    pub discipline_repo: Arc<DisciplineRepository>,
    pub run_repo: Arc<OptimizationRunRepository>,
    pub cache: Arc<ScoreCacheService>,
    pub worker: RefreshWorker,
    pub optimizer: Arc<SlotOptimizer>,
    pub evaluation_api: EvaluationApi,
    pub selection_api: SelectionApi,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_config(InstitutionConfig::default())
    }

    pub fn with_config(config: InstitutionConfig) -> Self {
        let (temp_file, db_path) = create_test_db().expect("创建测试数据库失败");
        let conn = open_test_connection(&db_path).expect("打开测试数据库失败");

        let publication_repo = Arc::new(PublicationRepository::from_connection(conn.clone()));
        let discipline_repo = Arc::new(DisciplineRepository::from_connection(conn.clone()));
        let run_repo = Arc::new(OptimizationRunRepository::from_connection(conn.clone()));
        let cache = Arc::new(
            ScoreCacheService::new(conn.clone(), config.clone()).expect("创建缓存服务失败"),
        );
        let worker = RefreshWorker::new(cache.clone());
        let optimizer = Arc::new(SlotOptimizer::new(
            cache.reader(),
            run_repo.clone(),
            config.clone(),
        ));

        let publisher: Arc<dyn CacheEventPublisher> = cache.clone();
        let evaluation_api = EvaluationApi::new(
            publication_repo.clone(),
            discipline_repo.clone(),
            Some(publisher),
        );
        let selection_api = SelectionApi::new(cache.reader(), optimizer.clone(), run_repo.clone());

        Self {
            _temp_file: temp_file,
            db_path,
            conn,
            config,
            publication_repo,
            discipline_repo,
            run_repo,
            cache,
            worker,
            optimizer,
            evaluation_api,
            selection_api,
        }
    }

    /// 写入三个常用学科
    pub fn seed_disciplines(&self) {
        for (id, code, name) in [
            (ENGINEERING, "2.7", "工程与技术科学"),
            (SOCIAL, "5.3", "社会科学"),
            (HUMANITIES, "1.2", "人文科学"),
        ] {
            self.evaluation_api
                .save_discipline(&discipline(id, code, name))
                .expect("写入学科失败");
        }
    }

    /// 单学科申报
    pub fn assign(&self, author_id: &str, year: i32, discipline_id: &str) {
        self.evaluation_api
            .save_assignment(&AuthorDisciplineAssignment::single(author_id, year, discipline_id))
            .expect("写入学科申报失败");
    }

    /// 写入出版物
    pub fn publish(&self, publication: &Publication) {
        self.evaluation_api
            .save_publication(publication)
            .expect("写入出版物失败");
    }

    /// 写入作者贡献
    pub fn contribute(&self, publication_id: &str, author_id: &str, discipline_id: &str) {
        self.evaluation_api
            .save_contribution(&author(publication_id, author_id, discipline_id))
            .expect("写入作者贡献失败");
    }

    /// 单作者文章：出版物 + 申报 + 贡献
    pub fn single_author_article(
        &self,
        publication_id: &str,
        author_id: &str,
        year: i32,
        points: &str,
        total_authors: u32,
    ) {
        let mut p = article(publication_id, year, points);
        p.total_authors = Some(total_authors);
        self.publish(&p);
        if self
            .discipline_repo
            .find_assignment(author_id, year)
            .expect("读取学科申报失败")
            .is_none()
        {
            self.assign(author_id, year, ENGINEERING);
        }
        self.contribute(publication_id, author_id, ENGINEERING);
    }

    /// 消费重建队列
    pub fn drain(&self) {
        self.worker.drain_blocking().expect("消费重建队列失败");
    }
}

// ==========================================
// 测试数据构造
// ==========================================

pub fn discipline(id: &str, code: &str, name: &str) -> Discipline {
    Discipline {
        discipline_id: id.to_string(),
        code: code.to_string(),
        name: name.to_string(),
    }
}

pub fn article(publication_id: &str, year: i32, points: &str) -> Publication {
    Publication::new(publication_id, year, PublicationCategory::Article, d(points))
}

pub fn monograph(publication_id: &str, year: i32, points: &str) -> Publication {
    Publication::new(
        publication_id,
        year,
        PublicationCategory::BookAuthorship,
        d(points),
    )
}

pub fn author(publication_id: &str, author_id: &str, discipline_id: &str) -> AuthorContribution {
    AuthorContribution {
        publication_id: publication_id.to_string(),
        author_id: author_id.to_string(),
        role: ContributionRole::Author,
        discipline_id: Some(discipline_id.to_string()),
        share_percent: Decimal::ZERO,
        affiliated: true,
        employed: true,
        pinned: true,
    }
}
