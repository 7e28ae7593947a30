// ==========================================
// 科研评估槽位系统 - 槽位/点数缓存实体
// ==========================================
// 职责: 每个 (出版物, 作者, 学科) 一行缓存的槽位与加权点数
// 红线: 仅由一致性缓存写入，其他组件只读
// ==========================================

use crate::domain::types::{PublicationCategory, Tier};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 计算结果：槽位 + 加权点数 (PKdAut)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotScore {
    pub slot: Decimal,
    pub points: Decimal,
}

impl SlotScore {
    pub fn zero() -> Self {
        Self {
            slot: Decimal::ZERO,
            points: Decimal::ZERO,
        }
    }
}

// ==========================================
// ScoreCacheEntry - 作者级缓存行
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreCacheEntry {
    pub publication_id: String,
    pub author_id: String,
    pub discipline_id: String,
    pub year: i32,
    pub category: PublicationCategory,
    pub tier: Tier,
    pub raw_points: Decimal,
    pub slot: Decimal,   // ∈ [0, 1]
    pub points: Decimal, // PKdAut
}

impl ScoreCacheEntry {
    pub fn is_monograph(&self) -> bool {
        self.category.is_monograph()
    }

    /// 点数密度（点数/槽位），槽位为 0 时返回 None
    pub fn density(&self) -> Option<Decimal> {
        if self.slot.is_zero() {
            None
        } else {
            Some(self.points / self.slot)
        }
    }
}

// ==========================================
// DisciplineScoreEntry - 学科级缓存行
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisciplineScoreEntry {
    pub publication_id: String,
    pub discipline_id: String,
    pub tier: Tier,
    pub author_count: u32, // 该学科合格作者数 k
    pub slot: Decimal,
    pub points: Decimal, // PKd
}
