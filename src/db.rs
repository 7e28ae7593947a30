// ==========================================
// 科研评估槽位系统 - SQLite 连接初始化与建表
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 幂等建表（CREATE TABLE IF NOT EXISTS）
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 创建全部业务表（幂等）并记录 schema_version
///
/// 说明：
/// - author_contribution.discipline_id 不加外键，重建时由缓存发现悬空引用并跳过
/// - score_cache / discipline_score_cache 只由一致性缓存写入
pub fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config_scope (
            scope_id TEXT PRIMARY KEY,
            scope_type TEXT NOT NULL,
            scope_key TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(scope_type, scope_key)
        );

        INSERT OR IGNORE INTO config_scope (scope_id, scope_type, scope_key)
        VALUES ('global', 'GLOBAL', 'global');

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL REFERENCES config_scope(scope_id) ON DELETE CASCADE,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        CREATE TABLE IF NOT EXISTS discipline (
            discipline_id TEXT PRIMARY KEY,
            code TEXT NOT NULL,
            name TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS publication (
            publication_id TEXT PRIMARY KEY,
            year INTEGER NOT NULL,
            category TEXT NOT NULL,
            raw_points TEXT NOT NULL,
            correction_status TEXT NOT NULL DEFAULT '',
            multi_center INTEGER NOT NULL DEFAULT 0,
            total_authors INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_publication_year ON publication(year);

        CREATE TABLE IF NOT EXISTS author_contribution (
            publication_id TEXT NOT NULL REFERENCES publication(publication_id) ON DELETE CASCADE,
            author_id TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'AUTHOR',
            discipline_id TEXT,
            share_percent TEXT NOT NULL DEFAULT '0',
            affiliated INTEGER NOT NULL DEFAULT 1,
            employed INTEGER NOT NULL DEFAULT 1,
            pinned INTEGER NOT NULL DEFAULT 1,
            PRIMARY KEY (publication_id, author_id)
        );

        CREATE INDEX IF NOT EXISTS idx_contribution_author ON author_contribution(author_id);

        CREATE TABLE IF NOT EXISTS author_discipline_assignment (
            author_id TEXT NOT NULL,
            year INTEGER NOT NULL,
            primary_discipline_id TEXT NOT NULL REFERENCES discipline(discipline_id),
            secondary_discipline_id TEXT REFERENCES discipline(discipline_id),
            primary_percent TEXT NOT NULL,
            secondary_percent TEXT,
            PRIMARY KEY (author_id, year)
        );

        CREATE TABLE IF NOT EXISTS score_cache (
            publication_id TEXT NOT NULL REFERENCES publication(publication_id) ON DELETE CASCADE,
            author_id TEXT NOT NULL,
            discipline_id TEXT NOT NULL,
            year INTEGER NOT NULL,
            category TEXT NOT NULL,
            tier TEXT NOT NULL,
            raw_points TEXT NOT NULL,
            slot TEXT NOT NULL,
            points TEXT NOT NULL,
            PRIMARY KEY (publication_id, author_id, discipline_id)
        );

        CREATE INDEX IF NOT EXISTS idx_score_cache_author ON score_cache(author_id, year);
        CREATE INDEX IF NOT EXISTS idx_score_cache_discipline ON score_cache(discipline_id, year);

        CREATE TABLE IF NOT EXISTS discipline_score_cache (
            publication_id TEXT NOT NULL REFERENCES publication(publication_id) ON DELETE CASCADE,
            discipline_id TEXT NOT NULL,
            tier TEXT NOT NULL,
            author_count INTEGER NOT NULL,
            slot TEXT NOT NULL,
            points TEXT NOT NULL,
            PRIMARY KEY (publication_id, discipline_id)
        );

        CREATE TABLE IF NOT EXISTS optimization_run (
            run_id TEXT PRIMARY KEY,
            year_from INTEGER NOT NULL,
            year_to INTEGER NOT NULL,
            status TEXT NOT NULL,
            is_optimal INTEGER NOT NULL,
            total_points TEXT NOT NULL,
            best_bound TEXT NOT NULL,
            candidate_count INTEGER NOT NULL,
            low_monograph_count INTEGER NOT NULL,
            selection_json TEXT NOT NULL,
            author_usage_json TEXT NOT NULL,
            elapsed_ms INTEGER NOT NULL,
            created_at TEXT NOT NULL
        );
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;

    Ok(())
}
