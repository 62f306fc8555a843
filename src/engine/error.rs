// ==========================================
// 外勤人员排班系统 - 排班引擎错误类型
// ==========================================
// 工具: thiserror 派生宏
// 说明: 单个活动排不上不是错误（输出原因码）;
//       只有整次运行无法进行时才返回错误
// ==========================================

use crate::domain::snapshot::SnapshotError;
use crate::domain::types::SolveStatus;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 排班引擎错误类型
#[derive(Error, Debug)]
pub enum SchedulingError {
    // ===== 输入数据 =====
    #[error("数据完整性错误: {entity} id={id}: {message}")]
    DataIntegrity {
        entity: String,
        id: String,
        message: String,
    },

    #[error("数据访问失败: {0}")]
    Repository(#[from] RepositoryError),

    // ===== 运行控制 =====
    #[error("已有排班运行正在进行")]
    RunInProgress,

    #[error("求解器未返回可行解: status={status}")]
    NoSolution { status: SolveStatus },

    #[error("无效的排班周期: {0}")]
    InvalidHorizon(String),

    #[error("配置错误: {0}")]
    Config(String),
}

impl SchedulingError {
    pub fn data_integrity(entity: &str, id: impl Into<String>, message: impl Into<String>) -> Self {
        SchedulingError::DataIntegrity {
            entity: entity.to_string(),
            id: id.into(),
            message: message.into(),
        }
    }
}

impl From<SnapshotError> for SchedulingError {
    fn from(err: SnapshotError) -> Self {
        SchedulingError::DataIntegrity {
            entity: err.entity,
            id: err.id,
            message: err.message,
        }
    }
}

/// Result 类型别名
pub type SchedulingResult<T> = Result<T, SchedulingError>;
