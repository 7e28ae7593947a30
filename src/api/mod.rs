// ==========================================
// 科研评估槽位系统 - API 层
// ==========================================
// 职责: 供批处理入口与外部工具调用的业务接口
// ==========================================

pub mod error;
pub mod evaluation_api;
pub mod selection_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use evaluation_api::EvaluationApi;
pub use selection_api::SelectionApi;
