// ==========================================
// 科研评估槽位系统 - 学科与学科申报仓储
// ==========================================
// 职责: discipline / author_discipline_assignment 表的读写
// 约束: 申报变更与依赖贡献的学科联动在同一事务内完成
// ==========================================
// 联动规则（申报变更）:
// - 指向旧主学科的贡献 -> 新主学科
// - 指向旧第二学科的贡献 -> 新第二学科；新申报为单学科时置空
// 联动规则（申报删除）:
// - 该作者该年度全部贡献的学科置空
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::discipline::{AuthorDisciplineAssignment, Discipline};
use crate::domain::validation::ValidationError;
use crate::repository::db_utils::{decimal_to_sql, get_decimal, get_optional_decimal};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

fn map_assignment(row: &Row<'_>) -> rusqlite::Result<AuthorDisciplineAssignment> {
    Ok(AuthorDisciplineAssignment {
        author_id: row.get(0)?,
        year: row.get(1)?,
        primary_discipline_id: row.get(2)?,
        secondary_discipline_id: row.get(3)?,
        primary_percent: get_decimal(row, 4)?,
        secondary_percent: get_optional_decimal(row, 5)?,
    })
}

/// 读取作者某年度的学科申报（供其他仓储在事务内复用）
pub(crate) fn query_assignment(
    conn: &Connection,
    author_id: &str,
    year: i32,
) -> rusqlite::Result<Option<AuthorDisciplineAssignment>> {
    conn.query_row(
        r#"
        SELECT author_id, year, primary_discipline_id, secondary_discipline_id,
               primary_percent, secondary_percent
        FROM author_discipline_assignment
        WHERE author_id = ?1 AND year = ?2
        "#,
        params![author_id, year],
        map_assignment,
    )
    .optional()
}

/// 作者某年度的贡献（出版物ID, 当前学科）
fn query_author_year_contributions(
    conn: &Connection,
    author_id: &str,
    year: i32,
) -> rusqlite::Result<Vec<(String, Option<String>)>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT c.publication_id, c.discipline_id
        FROM author_contribution c
        JOIN publication p ON p.publication_id = c.publication_id
        WHERE c.author_id = ?1 AND p.year = ?2
        ORDER BY c.publication_id
        "#,
    )?;
    let rows = stmt.query_map(params![author_id, year], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
    })?;
    rows.collect()
}

/// 申报变更后贡献学科的新值
///
/// # 规则
/// - 删除申报: 指向旧申报学科的贡献置空
/// - 旧申报为双学科: 旧主学科 → 新主学科，旧第二学科 → 新第二学科（新申报无第二学科时置空）
/// - 旧申报为单学科: 新申报仍包含该学科则保持，否则置空
///
/// # 返回
/// - None: 不需要改动
/// - Some(new_value): 改为 new_value（None 表示置空）
fn remap_discipline(
    current: Option<&str>,
    old: &AuthorDisciplineAssignment,
    new: Option<&AuthorDisciplineAssignment>,
) -> Option<Option<String>> {
    let current = current?;

    let new = match new {
        Some(n) => n,
        None => return old.contains(current).then_some(None),
    };

    if old.secondary_discipline_id.is_none() {
        if current != old.primary_discipline_id || new.contains(current) {
            return None;
        }
        return Some(None);
    }

    if current == old.primary_discipline_id {
        if new.primary_discipline_id != current {
            return Some(Some(new.primary_discipline_id.clone()));
        }
        return None;
    }

    if old.secondary_discipline_id.as_deref() == Some(current) {
        return match new.secondary_discipline_id.as_deref() {
            Some(s) if s == current => None,
            Some(s) => Some(Some(s.to_string())),
            None => Some(None),
        };
    }

    None
}

// ==========================================
// DisciplineRepository - 学科仓储
// ==========================================
pub struct DisciplineRepository {
    conn: Arc<Mutex<Connection>>,
}

/// 申报写入结果
#[derive(Debug, Clone, Default)]
pub struct AssignmentChange {
    /// 变更前的申报
    pub previous: Option<AuthorDisciplineAssignment>,
    /// 学科被联动修改的贡献所在出版物
    pub remapped_publications: Vec<String>,
}

impl DisciplineRepository {
    /// 创建新的学科仓储实例
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

    // ===== 学科 =====

    /// 写入学科（存在则覆盖）
    pub fn upsert_discipline(&self, discipline: &Discipline) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO discipline (discipline_id, code, name) VALUES (?1, ?2, ?3)
            ON CONFLICT(discipline_id) DO UPDATE SET code = excluded.code, name = excluded.name
            "#,
            params![discipline.discipline_id, discipline.code, discipline.name],
        )?;
        Ok(())
    }

    /// 按 ID 查询学科
    pub fn find_discipline(&self, discipline_id: &str) -> RepositoryResult<Option<Discipline>> {
        let conn = self.get_conn()?;
        let discipline = conn
            .query_row(
                "SELECT discipline_id, code, name FROM discipline WHERE discipline_id = ?1",
                params![discipline_id],
                |row| {
                    Ok(Discipline {
                        discipline_id: row.get(0)?,
                        code: row.get(1)?,
                        name: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(discipline)
    }

    /// 批量查询学科（不存在的 ID 不出现在结果中）
    pub fn find_disciplines(
        &self,
        discipline_ids: &BTreeSet<String>,
    ) -> RepositoryResult<HashMap<String, Discipline>> {
        let mut result = HashMap::new();
        for id in discipline_ids {
            if let Some(d) = self.find_discipline(id)? {
                result.insert(id.clone(), d);
            }
        }
        Ok(result)
    }

    // ===== 学科申报 =====

    /// 查询作者某年度的学科申报
    pub fn find_assignment(
        &self,
        author_id: &str,
        year: i32,
    ) -> RepositoryResult<Option<AuthorDisciplineAssignment>> {
        let conn = self.get_conn()?;
        Ok(query_assignment(&conn, author_id, year)?)
    }

    /// 写入学科申报，并在同一事务内联动依赖贡献的学科
    ///
    /// # 规则
    /// - 主学科 ≠ 第二学科；份额合计 ≤ 100
    /// - 申报的学科必须存在
    /// - (author_id, year) 唯一：已有申报则整体替换
    ///
    /// # 返回
    /// - Ok(AssignmentChange): 旧申报 + 被联动修改的出版物
    /// - Err(RepositoryError::Validation): 校验失败，未写入
    pub fn upsert_assignment(
        &self,
        assignment: &AuthorDisciplineAssignment,
    ) -> RepositoryResult<AssignmentChange> {
        assignment.validate()?;

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let mut referenced = vec![assignment.primary_discipline_id.as_str()];
        if let Some(s) = assignment.secondary_discipline_id.as_deref() {
            referenced.push(s);
        }
        for discipline_id in referenced {
            let exists: bool = tx
                .query_row(
                    "SELECT 1 FROM discipline WHERE discipline_id = ?1",
                    params![discipline_id],
                    |_| Ok(true),
                )
                .optional()?
                .unwrap_or(false);
            if !exists {
                return Err(ValidationError::single(
                    "UNKNOWN_DISCIPLINE",
                    format!("学科不存在: {}", discipline_id),
                )
                .into());
            }
        }

        let previous = query_assignment(&tx, &assignment.author_id, assignment.year)?;

        tx.execute(
            r#"
            INSERT INTO author_discipline_assignment (
                author_id, year, primary_discipline_id, secondary_discipline_id,
                primary_percent, secondary_percent
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(author_id, year) DO UPDATE SET
                primary_discipline_id = excluded.primary_discipline_id,
                secondary_discipline_id = excluded.secondary_discipline_id,
                primary_percent = excluded.primary_percent,
                secondary_percent = excluded.secondary_percent
            "#,
            params![
                assignment.author_id,
                assignment.year,
                assignment.primary_discipline_id,
                assignment.secondary_discipline_id,
                decimal_to_sql(assignment.primary_percent),
                assignment.secondary_percent.map(decimal_to_sql),
            ],
        )?;

        let remapped = match previous.as_ref() {
            Some(old) => Self::remap_contributions(&tx, old, Some(assignment))?,
            None => Vec::new(),
        };

        tx.commit()?;

        tracing::info!(
            author_id = %assignment.author_id,
            year = assignment.year,
            remapped = remapped.len(),
            "学科申报已写入"
        );

        Ok(AssignmentChange {
            previous,
            remapped_publications: remapped,
        })
    }

    /// 删除学科申报，并在同一事务内置空依赖贡献的学科
    pub fn delete_assignment(&self, author_id: &str, year: i32) -> RepositoryResult<AssignmentChange> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let previous = query_assignment(&tx, author_id, year)?;
        let remapped = match previous.as_ref() {
            Some(old) => {
                tx.execute(
                    "DELETE FROM author_discipline_assignment WHERE author_id = ?1 AND year = ?2",
                    params![author_id, year],
                )?;
                Self::remap_contributions(&tx, old, None)?
            }
            None => Vec::new(),
        };

        tx.commit()?;

        Ok(AssignmentChange {
            previous,
            remapped_publications: remapped,
        })
    }

    /// 按联动规则改写作者该年度贡献的学科
    fn remap_contributions(
        conn: &Connection,
        old: &AuthorDisciplineAssignment,
        new: Option<&AuthorDisciplineAssignment>,
    ) -> rusqlite::Result<Vec<String>> {
        let contributions = query_author_year_contributions(conn, &old.author_id, old.year)?;

        // 先计算全部新值再写入，避免主/第二学科互换时相互覆盖
        let updates: Vec<(String, Option<String>)> = contributions
            .into_iter()
            .filter_map(|(publication_id, current)| {
                remap_discipline(current.as_deref(), old, new).map(|value| (publication_id, value))
            })
            .collect();

        for (publication_id, value) in &updates {
            conn.execute(
                "UPDATE author_contribution SET discipline_id = ?1 WHERE publication_id = ?2 AND author_id = ?3",
                params![value, publication_id, old.author_id],
            )?;
        }

        Ok(updates.into_iter().map(|(p, _)| p).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_remap_single_change_clears() {
        let old = AuthorDisciplineAssignment::single("A1", 2020, "D1");
        let new = AuthorDisciplineAssignment::single("A1", 2020, "D2");
        assert_eq!(remap_discipline(Some("D1"), &old, Some(&new)), Some(None));
        assert_eq!(remap_discipline(None, &old, Some(&new)), None);
        assert_eq!(remap_discipline(Some("D9"), &old, Some(&new)), None);
    }

    #[test]
    fn test_remap_single_kept_when_still_declared() {
        let old = AuthorDisciplineAssignment::single("A1", 2020, "D1");
        let widened = AuthorDisciplineAssignment::dual("A1", 2020, "D2", "D1", Decimal::from(50));
        assert_eq!(remap_discipline(Some("D1"), &old, Some(&widened)), None);
        assert_eq!(remap_discipline(Some("D1"), &old, Some(&old)), None);
    }

    #[test]
    fn test_remap_dual_primary_change() {
        let old = AuthorDisciplineAssignment::dual("A1", 2020, "D1", "D2", Decimal::from(50));
        let new = AuthorDisciplineAssignment::dual("A1", 2020, "D3", "D2", Decimal::from(50));
        assert_eq!(
            remap_discipline(Some("D1"), &old, Some(&new)),
            Some(Some("D3".to_string()))
        );
        assert_eq!(remap_discipline(Some("D2"), &old, Some(&new)), None);
    }

    #[test]
    fn test_remap_secondary_removed_nulls() {
        let old = AuthorDisciplineAssignment::dual("A1", 2020, "D1", "D2", Decimal::from(50));
        let new = AuthorDisciplineAssignment::single("A1", 2020, "D1");
        assert_eq!(remap_discipline(Some("D2"), &old, Some(&new)), Some(None));
        assert_eq!(remap_discipline(Some("D1"), &old, Some(&new)), None);
    }

    #[test]
    fn test_remap_swap() {
        let old = AuthorDisciplineAssignment::dual("A1", 2020, "D1", "D2", Decimal::from(50));
        let new = AuthorDisciplineAssignment::dual("A1", 2020, "D2", "D1", Decimal::from(50));
        assert_eq!(
            remap_discipline(Some("D1"), &old, Some(&new)),
            Some(Some("D2".to_string()))
        );
        assert_eq!(
            remap_discipline(Some("D2"), &old, Some(&new)),
            Some(Some("D1".to_string()))
        );
    }

    #[test]
    fn test_remap_delete_nulls_declared_only() {
        let old = AuthorDisciplineAssignment::dual("A1", 2020, "D1", "D2", Decimal::from(50));
        assert_eq!(remap_discipline(Some("D2"), &old, None), Some(None));
        assert_eq!(remap_discipline(Some("D9"), &old, None), None);
    }
}
