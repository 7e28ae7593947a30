// ==========================================
// 科研评估槽位系统 - 槽位缓存仓储
// ==========================================
// 职责: score_cache / discipline_score_cache 表
// 红线: 写入方法仅对 crate 内的一致性缓存开放；
//       其他组件通过 ScoreCacheReader 只读访问
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::score::{DisciplineScoreEntry, ScoreCacheEntry};
use crate::repository::db_utils::{decimal_to_sql, get_decimal, get_parsed};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, Row, TransactionBehavior};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

const ENTRY_COLUMNS: &str =
    "publication_id, author_id, discipline_id, year, category, tier, raw_points, slot, points";

fn map_entry(row: &Row<'_>) -> rusqlite::Result<ScoreCacheEntry> {
    Ok(ScoreCacheEntry {
        publication_id: row.get(0)?,
        author_id: row.get(1)?,
        discipline_id: row.get(2)?,
        year: row.get(3)?,
        category: get_parsed(row, 4)?,
        tier: get_parsed(row, 5)?,
        raw_points: get_decimal(row, 6)?,
        slot: get_decimal(row, 7)?,
        points: get_decimal(row, 8)?,
    })
}

fn map_discipline_entry(row: &Row<'_>) -> rusqlite::Result<DisciplineScoreEntry> {
    let author_count: i64 = row.get(3)?;
    Ok(DisciplineScoreEntry {
        publication_id: row.get(0)?,
        discipline_id: row.get(1)?,
        tier: get_parsed(row, 2)?,
        author_count: author_count.max(0) as u32,
        slot: get_decimal(row, 4)?,
        points: get_decimal(row, 5)?,
    })
}

// ==========================================
// ScoreCacheReader - 只读接口
// ==========================================
pub trait ScoreCacheReader: Send + Sync {
    /// 出版物的全部作者级缓存行
    fn find_by_publication(&self, publication_id: &str) -> RepositoryResult<Vec<ScoreCacheEntry>>;

    /// 作者在年度区间内的缓存行
    fn find_by_author(
        &self,
        author_id: &str,
        year_from: i32,
        year_to: i32,
    ) -> RepositoryResult<Vec<ScoreCacheEntry>>;

    /// 学科在年度区间内的缓存行
    fn find_by_discipline(
        &self,
        discipline_id: &str,
        year_from: i32,
        year_to: i32,
    ) -> RepositoryResult<Vec<ScoreCacheEntry>>;

    /// 出版物的学科级缓存行
    fn find_discipline_scores(
        &self,
        publication_id: &str,
    ) -> RepositoryResult<Vec<DisciplineScoreEntry>>;

    /// 年度区间内全部缓存行的一致性快照（单个读事务）
    fn snapshot(&self, year_from: i32, year_to: i32) -> RepositoryResult<Vec<ScoreCacheEntry>>;
}

// ==========================================
// ScoreCacheRepository - 槽位缓存仓储
// ==========================================
pub struct ScoreCacheRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ScoreCacheRepository {
    /// 创建新的缓存仓储实例
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

    fn query_entries(
        conn: &Connection,
        where_clause: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> rusqlite::Result<Vec<ScoreCacheEntry>> {
        let sql = format!(
            "SELECT {} FROM score_cache WHERE {} ORDER BY publication_id, author_id, discipline_id",
            ENTRY_COLUMNS, where_clause
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params, map_entry)?;
        rows.collect()
    }

    fn write_rows(
        conn: &Connection,
        entries: &[ScoreCacheEntry],
        discipline_entries: &[DisciplineScoreEntry],
    ) -> rusqlite::Result<()> {
        for e in entries {
            conn.execute(
                &format!(
                    "INSERT INTO score_cache ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    ENTRY_COLUMNS
                ),
                params![
                    e.publication_id,
                    e.author_id,
                    e.discipline_id,
                    e.year,
                    e.category.as_str(),
                    e.tier.as_str(),
                    decimal_to_sql(e.raw_points),
                    decimal_to_sql(e.slot),
                    decimal_to_sql(e.points),
                ],
            )?;
        }
        for d in discipline_entries {
            conn.execute(
                r#"
                INSERT INTO discipline_score_cache (
                    publication_id, discipline_id, tier, author_count, slot, points
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    d.publication_id,
                    d.discipline_id,
                    d.tier.as_str(),
                    d.author_count as i64,
                    decimal_to_sql(d.slot),
                    decimal_to_sql(d.points),
                ],
            )?;
        }
        Ok(())
    }

    // ===== 写入（仅一致性缓存） =====

    /// 替换单个出版物的全部缓存行（删除 + 写入，单事务）
    pub(crate) fn replace_for_publication(
        &self,
        publication_id: &str,
        entries: &[ScoreCacheEntry],
        discipline_entries: &[DisciplineScoreEntry],
    ) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            "DELETE FROM score_cache WHERE publication_id = ?1",
            params![publication_id],
        )?;
        tx.execute(
            "DELETE FROM discipline_score_cache WHERE publication_id = ?1",
            params![publication_id],
        )?;
        Self::write_rows(&tx, entries, discipline_entries)?;

        tx.commit()?;
        Ok(())
    }

    /// 全量替换（全有或全无）
    pub(crate) fn replace_all(
        &self,
        rows: &BTreeMap<String, (Vec<ScoreCacheEntry>, Vec<DisciplineScoreEntry>)>,
    ) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute("DELETE FROM score_cache", [])?;
        tx.execute("DELETE FROM discipline_score_cache", [])?;
        for (entries, discipline_entries) in rows.values() {
            Self::write_rows(&tx, entries, discipline_entries)?;
        }

        tx.commit()?;
        Ok(())
    }

    /// 缓存行总数
    pub fn count(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM score_cache", [], |row| row.get(0))?)
    }
}

impl ScoreCacheReader for ScoreCacheRepository {
    fn find_by_publication(&self, publication_id: &str) -> RepositoryResult<Vec<ScoreCacheEntry>> {
        let conn = self.get_conn()?;
        Ok(Self::query_entries(
            &conn,
            "publication_id = ?1",
            params![publication_id],
        )?)
    }

    fn find_by_author(
        &self,
        author_id: &str,
        year_from: i32,
        year_to: i32,
    ) -> RepositoryResult<Vec<ScoreCacheEntry>> {
        let conn = self.get_conn()?;
        Ok(Self::query_entries(
            &conn,
            "author_id = ?1 AND year BETWEEN ?2 AND ?3",
            params![author_id, year_from, year_to],
        )?)
    }

    fn find_by_discipline(
        &self,
        discipline_id: &str,
        year_from: i32,
        year_to: i32,
    ) -> RepositoryResult<Vec<ScoreCacheEntry>> {
        let conn = self.get_conn()?;
        Ok(Self::query_entries(
            &conn,
            "discipline_id = ?1 AND year BETWEEN ?2 AND ?3",
            params![discipline_id, year_from, year_to],
        )?)
    }

    fn find_discipline_scores(
        &self,
        publication_id: &str,
    ) -> RepositoryResult<Vec<DisciplineScoreEntry>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT publication_id, discipline_id, tier, author_count, slot, points
            FROM discipline_score_cache
            WHERE publication_id = ?1
            ORDER BY discipline_id
            "#,
        )?;
        let rows = stmt
            .query_map(params![publication_id], map_discipline_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn snapshot(&self, year_from: i32, year_to: i32) -> RepositoryResult<Vec<ScoreCacheEntry>> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
        let entries = Self::query_entries(
            &tx,
            "year BETWEEN ?1 AND ?2",
            params![year_from, year_to],
        )?;
        tx.commit()?;
        Ok(entries)
    }
}
