use std::fmt;

use crate::models::EssayStatus;
use crate::store::StoreError;

/// 批改流水线错误类型
///
/// `InvalidState` / `AlreadyProcessing` / `EmptyRevisionNote` 会同步返回给
/// `start` / `regenerate` / `finalize` 的调用方；其余错误只通过 Essay 的
/// status 字段异步暴露。
#[derive(Debug)]
pub enum CorrectionError {
    /// 指定的 Essay 不存在
    NotFound { essay_id: String },
    /// 当前状态不允许请求的状态转换（拒绝，无副作用）
    InvalidState {
        essay_id: String,
        status: EssayStatus,
        action: &'static str,
    },
    /// 并发的 start/regenerate 竞争失败（已有一个批改任务在飞行中）
    AlreadyProcessing { essay_id: String },
    /// regenerate 的修改要求不能为空
    EmptyRevisionNote { essay_id: String },
    /// 外部批改服务调用失败（网络/超时/响应格式错误），Essay 转为 failed
    CorrectionFailed(CorrectionFailure),
    /// 批改成功后的持久化写入失败，Essay 转为 failed，已生成的文档被丢弃
    PersistenceFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for CorrectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorrectionError::NotFound { essay_id } => {
                write!(f, "Essay 不存在: {}", essay_id)
            }
            CorrectionError::InvalidState {
                essay_id,
                status,
                action,
            } => {
                write!(
                    f,
                    "状态 {} 不允许执行 {} (Essay: {})",
                    status, action, essay_id
                )
            }
            CorrectionError::AlreadyProcessing { essay_id } => {
                write!(f, "Essay 已有批改任务在处理中: {}", essay_id)
            }
            CorrectionError::EmptyRevisionNote { essay_id } => {
                write!(f, "修改要求不能为空 (Essay: {})", essay_id)
            }
            CorrectionError::CorrectionFailed(failure) => {
                write!(f, "批改失败: {}", failure)
            }
            CorrectionError::PersistenceFailed { source } => {
                write!(f, "持久化失败: {}", source)
            }
        }
    }
}

impl std::error::Error for CorrectionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CorrectionError::CorrectionFailed(failure) => failure.source(),
            CorrectionError::PersistenceFailed { source } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 外部批改服务的具体失败原因
#[derive(Debug)]
pub enum CorrectionFailure {
    /// API 请求失败（网络错误、非 2xx 响应等）
    RequestFailed {
        model: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 请求超过了配置的时间上限
    Timeout { seconds: u64 },
    /// 服务返回了空内容
    EmptyResponse { model: String },
    /// 响应里找不到结构化文档标记（<!DOCTYPE / <html）
    MalformedResponse,
}

impl fmt::Display for CorrectionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorrectionFailure::RequestFailed { model, source } => {
                write!(f, "API 调用失败 (模型: {}): {}", model, source)
            }
            CorrectionFailure::Timeout { seconds } => {
                write!(f, "API 调用超时 ({} 秒)", seconds)
            }
            CorrectionFailure::EmptyResponse { model } => {
                write!(f, "服务返回内容为空 (模型: {})", model)
            }
            CorrectionFailure::MalformedResponse => {
                write!(f, "响应中找不到 HTML 文档标记")
            }
        }
    }
}

impl std::error::Error for CorrectionFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CorrectionFailure::RequestFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

impl From<StoreError> for CorrectionError {
    fn from(err: StoreError) -> Self {
        CorrectionError::PersistenceFailed {
            source: Box::new(err),
        }
    }
}

// ========== 便捷构造函数 ==========

impl CorrectionError {
    /// 创建 API 请求失败错误
    pub fn request_failed(
        model: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        CorrectionError::CorrectionFailed(CorrectionFailure::RequestFailed {
            model: model.into(),
            source: Box::new(source),
        })
    }

    /// 创建持久化失败错误
    pub fn persistence_failed(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        CorrectionError::PersistenceFailed {
            source: Box::new(source),
        }
    }

    /// 是否属于调用方可同步感知的拒绝类错误（无副作用）
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            CorrectionError::NotFound { .. }
                | CorrectionError::InvalidState { .. }
                | CorrectionError::AlreadyProcessing { .. }
                | CorrectionError::EmptyRevisionNote { .. }
        )
    }
}

// ========== Result 类型别名 ==========

/// 批改流水线结果类型
pub type CorrectionResult<T> = Result<T, CorrectionError>;
