// ==========================================
// 科研评估槽位系统 - 行映射工具
// ==========================================
// 职责: 小数/枚举列的读取转换
// 说明: 小数统一以 TEXT 存储，避免 REAL 精度漂移
// ==========================================

use rusqlite::types::Type;
use rusqlite::Row;
use rust_decimal::Decimal;
use std::str::FromStr;

/// 读取 TEXT 列并解析为 Decimal
pub fn get_decimal(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let raw: String = row.get(idx)?;
    Decimal::from_str(raw.trim())
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// 读取可空 TEXT 列并解析为 Option<Decimal>
pub fn get_optional_decimal(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        Some(s) => Decimal::from_str(s.trim())
            .map(Some)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
        None => Ok(None),
    }
}

/// 读取 TEXT 列并按 FromStr 解析为枚举
pub fn get_parsed<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
        )
    })
}

/// Decimal 写入格式（规范化，去掉多余的尾随 0）
pub fn decimal_to_sql(value: Decimal) -> String {
    value.normalize().to_string()
}
