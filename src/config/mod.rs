// ==========================================
// 科研评估槽位系统 - 配置层
// ==========================================
// 职责: 机构评估配置的读取与快照
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod institution_config;
pub mod institution_config_reader;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager};
pub use institution_config::InstitutionConfig;
pub use institution_config_reader::InstitutionConfigReader;
