// ==========================================
// 科研评估槽位系统 - 出版物与作者贡献仓储
// ==========================================
// 职责: publication / author_contribution 表的读写
// 约束: 贡献写入前在同一事务内校验录入不变量
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::publication::{AuthorContribution, Publication};
use crate::domain::validation::validate_contribution;
use crate::repository::db_utils::{decimal_to_sql, get_decimal, get_parsed};
use crate::repository::discipline_repo::query_assignment;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex};

const PUBLICATION_COLUMNS: &str =
    "publication_id, year, category, raw_points, correction_status, multi_center, total_authors";

const CONTRIBUTION_COLUMNS: &str =
    "publication_id, author_id, role, discipline_id, share_percent, affiliated, employed, pinned";

fn map_publication(row: &Row<'_>) -> rusqlite::Result<Publication> {
    let total_authors: Option<i64> = row.get(6)?;
    Ok(Publication {
        publication_id: row.get(0)?,
        year: row.get(1)?,
        category: get_parsed(row, 2)?,
        raw_points: get_decimal(row, 3)?,
        correction_status: row.get(4)?,
        multi_center: row.get::<_, i32>(5)? != 0,
        total_authors: total_authors.map(|n| n.max(0) as u32),
    })
}

fn map_contribution(row: &Row<'_>) -> rusqlite::Result<AuthorContribution> {
    Ok(AuthorContribution {
        publication_id: row.get(0)?,
        author_id: row.get(1)?,
        role: get_parsed(row, 2)?,
        discipline_id: row.get(3)?,
        share_percent: get_decimal(row, 4)?,
        affiliated: row.get::<_, i32>(5)? != 0,
        employed: row.get::<_, i32>(6)? != 0,
        pinned: row.get::<_, i32>(7)? != 0,
    })
}

pub(crate) fn query_publication(
    conn: &Connection,
    publication_id: &str,
) -> rusqlite::Result<Option<Publication>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM publication WHERE publication_id = ?1",
            PUBLICATION_COLUMNS
        ),
        params![publication_id],
        map_publication,
    )
    .optional()
}

fn query_contribution(
    conn: &Connection,
    publication_id: &str,
    author_id: &str,
) -> rusqlite::Result<Option<AuthorContribution>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM author_contribution WHERE publication_id = ?1 AND author_id = ?2",
            CONTRIBUTION_COLUMNS
        ),
        params![publication_id, author_id],
        map_contribution,
    )
    .optional()
}

// ==========================================
// PublicationRepository - 出版物仓储
// ==========================================
pub struct PublicationRepository {
    conn: Arc<Mutex<Connection>>,
}

impl PublicationRepository {
    /// 创建新的出版物仓储实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
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

    // ===== 出版物 =====

    /// 写入出版物（存在则覆盖）
    ///
    /// # 返回
    /// - Ok(Some(Publication)): 覆盖前的旧值（用于判断点数/状态变更）
    /// - Ok(None): 新增
    pub fn upsert_publication(&self, publication: &Publication) -> RepositoryResult<Option<Publication>> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let previous = query_publication(&tx, &publication.publication_id)?;

        tx.execute(
            r#"
            INSERT INTO publication (
                publication_id, year, category, raw_points, correction_status,
                multi_center, total_authors
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(publication_id) DO UPDATE SET
                year = excluded.year,
                category = excluded.category,
                raw_points = excluded.raw_points,
                correction_status = excluded.correction_status,
                multi_center = excluded.multi_center,
                total_authors = excluded.total_authors
            "#,
            params![
                publication.publication_id,
                publication.year,
                publication.category.as_str(),
                decimal_to_sql(publication.raw_points),
                publication.correction_status,
                publication.multi_center as i32,
                publication.total_authors.map(|n| n as i64),
            ],
        )?;

        tx.commit()?;
        Ok(previous)
    }

    /// 按 ID 查询出版物
    pub fn find_by_id(&self, publication_id: &str) -> RepositoryResult<Option<Publication>> {
        let conn = self.get_conn()?;
        Ok(query_publication(&conn, publication_id)?)
    }

    /// 查询出版物及其全部贡献（同一读事务）
    pub fn find_with_contributions(
        &self,
        publication_id: &str,
    ) -> RepositoryResult<Option<(Publication, Vec<AuthorContribution>)>> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let publication = match query_publication(&tx, publication_id)? {
            Some(p) => p,
            None => return Ok(None),
        };

        let contributions = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {} FROM author_contribution WHERE publication_id = ?1 ORDER BY author_id",
                CONTRIBUTION_COLUMNS
            ))?;
            let rows = stmt.query_map(params![publication_id], map_contribution)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        tx.commit()?;
        Ok(Some((publication, contributions)))
    }

    /// 列出全部出版物 ID（按 ID 排序）
    pub fn list_ids(&self) -> RepositoryResult<Vec<String>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT publication_id FROM publication ORDER BY publication_id")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    /// 删除出版物（贡献与缓存行级联删除）
    pub fn delete_publication(&self, publication_id: &str) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "DELETE FROM publication WHERE publication_id = ?1",
            params![publication_id],
        )?;
        Ok(affected > 0)
    }

    // ===== 作者贡献 =====

    /// 写入作者贡献（存在则覆盖）
    ///
    /// # 规则
    /// - 出版物必须存在
    /// - 申报学科必须是作者在出版年度的主学科或第二学科
    /// - 同一出版物份额合计 ≤ 100
    ///
    /// # 返回
    /// - Ok(Some(AuthorContribution)): 覆盖前的旧值
    /// - Err(RepositoryError::Validation): 校验失败，未写入
    pub fn upsert_contribution(
        &self,
        contribution: &AuthorContribution,
    ) -> RepositoryResult<Option<AuthorContribution>> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let publication = query_publication(&tx, &contribution.publication_id)?.ok_or_else(|| {
            RepositoryError::NotFound {
                entity: "Publication".to_string(),
                id: contribution.publication_id.clone(),
            }
        })?;

        let assignment = query_assignment(&tx, &contribution.author_id, publication.year)?;

        let other_shares: Vec<String> = {
            let mut stmt = tx.prepare(
                "SELECT share_percent FROM author_contribution WHERE publication_id = ?1 AND author_id <> ?2",
            )?;
            let rows = stmt.query_map(
                params![contribution.publication_id, contribution.author_id],
                |row| row.get::<_, String>(0),
            )?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        let other_share_total = other_shares
            .iter()
            .filter_map(|s| s.trim().parse::<Decimal>().ok())
            .fold(Decimal::ZERO, |acc, v| acc + v);

        validate_contribution(contribution, &publication, assignment.as_ref(), other_share_total)?;

        let previous = query_contribution(&tx, &contribution.publication_id, &contribution.author_id)?;

        tx.execute(
            r#"
            INSERT INTO author_contribution (
                publication_id, author_id, role, discipline_id, share_percent,
                affiliated, employed, pinned
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(publication_id, author_id) DO UPDATE SET
                role = excluded.role,
                discipline_id = excluded.discipline_id,
                share_percent = excluded.share_percent,
                affiliated = excluded.affiliated,
                employed = excluded.employed,
                pinned = excluded.pinned
            "#,
            params![
                contribution.publication_id,
                contribution.author_id,
                contribution.role.as_str(),
                contribution.discipline_id,
                decimal_to_sql(contribution.share_percent),
                contribution.affiliated as i32,
                contribution.employed as i32,
                contribution.pinned as i32,
            ],
        )?;

        tx.commit()?;
        Ok(previous)
    }

    /// 删除作者贡献
    ///
    /// # 返回
    /// - Ok(Some(AuthorContribution)): 被删除的贡献
    /// - Ok(None): 贡献不存在
    pub fn delete_contribution(
        &self,
        publication_id: &str,
        author_id: &str,
    ) -> RepositoryResult<Option<AuthorContribution>> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let previous = query_contribution(&tx, publication_id, author_id)?;
        if previous.is_some() {
            tx.execute(
                "DELETE FROM author_contribution WHERE publication_id = ?1 AND author_id = ?2",
                params![publication_id, author_id],
            )?;
        }

        tx.commit()?;
        Ok(previous)
    }

    /// 查询出版物的全部贡献
    pub fn find_contributions(&self, publication_id: &str) -> RepositoryResult<Vec<AuthorContribution>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM author_contribution WHERE publication_id = ?1 ORDER BY author_id",
            CONTRIBUTION_COLUMNS
        ))?;
        let contributions = stmt
            .query_map(params![publication_id], map_contribution)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(contributions)
    }

    /// 查询作者在指定年度参与的全部出版物 ID
    pub fn find_publication_ids_by_author_year(
        &self,
        author_id: &str,
        year: i32,
    ) -> RepositoryResult<Vec<String>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT DISTINCT c.publication_id
            FROM author_contribution c
            JOIN publication p ON p.publication_id = c.publication_id
            WHERE c.author_id = ?1 AND p.year = ?2
            ORDER BY c.publication_id
            "#,
        )?;
        let ids = stmt
            .query_map(params![author_id, year], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }
}
