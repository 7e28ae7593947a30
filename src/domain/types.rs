// ==========================================
// 科研评估槽位系统 - 领域类型定义
// ==========================================
// 职责: 出版物类别、档位、贡献角色、学科领域
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 出版物类别 (Publication Category)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PublicationCategory {
    Article,        // 期刊论文
    BookAuthorship, // 专著（作者）
    BookEditorship, // 专著（主编）
    Chapter,        // 专著章节
    Patent,         // 专利（不参与槽位计算）
    Thesis,         // 学位论文（不支持）
}

impl PublicationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublicationCategory::Article => "ARTICLE",
            PublicationCategory::BookAuthorship => "BOOK_AUTHORSHIP",
            PublicationCategory::BookEditorship => "BOOK_EDITORSHIP",
            PublicationCategory::Chapter => "CHAPTER",
            PublicationCategory::Patent => "PATENT",
            PublicationCategory::Thesis => "THESIS",
        }
    }

    /// 是否为专著类（计入专著子额度与低分专著配额）
    ///
    /// 章节不属于专著：只占用作者总槽位
    pub fn is_monograph(&self) -> bool {
        matches!(
            self,
            PublicationCategory::BookAuthorship | PublicationCategory::BookEditorship
        )
    }
}

impl fmt::Display for PublicationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PublicationCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ARTICLE" => Ok(PublicationCategory::Article),
            "BOOK_AUTHORSHIP" => Ok(PublicationCategory::BookAuthorship),
            "BOOK_EDITORSHIP" => Ok(PublicationCategory::BookEditorship),
            "CHAPTER" => Ok(PublicationCategory::Chapter),
            "PATENT" => Ok(PublicationCategory::Patent),
            "THESIS" => Ok(PublicationCategory::Thesis),
            other => Err(format!("未知出版物类别: {}", other)),
        }
    }
}

// ==========================================
// 点数档位 (Tier)
// ==========================================
// Tier1 = 顶级, Tier2 = 中级, Tier3 = 未列入/最低
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    Tier1,
    Tier2,
    Tier3,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Tier1 => "TIER1",
            Tier::Tier2 => "TIER2",
            Tier::Tier3 => "TIER3",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TIER1" => Ok(Tier::Tier1),
            "TIER2" => Ok(Tier::Tier2),
            "TIER3" => Ok(Tier::Tier3),
            other => Err(format!("未知档位: {}", other)),
        }
    }
}

// ==========================================
// 贡献角色 (Contribution Role)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContributionRole {
    Author,
    Editor,
}

impl ContributionRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContributionRole::Author => "AUTHOR",
            ContributionRole::Editor => "EDITOR",
        }
    }
}

impl fmt::Display for ContributionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ContributionRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AUTHOR" => Ok(ContributionRole::Author),
            "EDITOR" => Ok(ContributionRole::Editor),
            other => Err(format!("未知贡献角色: {}", other)),
        }
    }
}

// ==========================================
// 学科领域 (Scientific Domain)
// ==========================================
// 学科代码前两位即领域编号，例如 "05.3" -> 社会科学
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScientificDomain {
    Humanities,  // 01 人文科学
    Engineering, // 02 工程与技术科学
    Medical,     // 03 医学与健康科学
    Agricultural, // 04 农业科学
    Social,      // 05 社会科学
    Natural,     // 06 自然科学
    Theology,    // 07 神学
    Arts,        // 08 艺术
}

impl ScientificDomain {
    /// 从学科代码解析领域
    ///
    /// # 参数
    /// - code: 学科代码（如 "1.2"、"05.3"）
    ///
    /// # 返回
    /// - None: 代码无法识别
    pub fn from_discipline_code(code: &str) -> Option<Self> {
        let prefix = code.trim().split('.').next()?;
        let number: u32 = prefix.parse().ok()?;
        match number {
            1 => Some(ScientificDomain::Humanities),
            2 => Some(ScientificDomain::Engineering),
            3 => Some(ScientificDomain::Medical),
            4 => Some(ScientificDomain::Agricultural),
            5 => Some(ScientificDomain::Social),
            6 => Some(ScientificDomain::Natural),
            7 => Some(ScientificDomain::Theology),
            8 => Some(ScientificDomain::Arts),
            _ => None,
        }
    }

    /// 是否属于 HST（人文/社会/神学）
    pub fn is_hst(&self) -> bool {
        matches!(
            self,
            ScientificDomain::Humanities | ScientificDomain::Social | ScientificDomain::Theology
        )
    }
}
