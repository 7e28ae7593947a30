// ==========================================
// 科研评估槽位系统 - 应用层
// ==========================================
// 职责: 组件装配，供批处理入口使用
// ==========================================

pub mod state;

// 重导出
pub use state::{get_default_db_path, AppState};
