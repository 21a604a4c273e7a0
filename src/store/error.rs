use thiserror::Error;

/// 存储层错误类型
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("数据库锁获取失败: {0}")]
    Lock(String),

    #[error("记录未找到: essay_id={essay_id}")]
    NotFound { essay_id: String },

    #[error("版本已存在: essay_id={essay_id}, version_number={version_number}")]
    DuplicateVersion {
        essay_id: String,
        version_number: i64,
    },

    /// 回调到达时 Essay 已不处于预期的飞行中状态（重复/过期回调保护）
    #[error("过期的状态转换: essay_id={essay_id}, 预期状态={expected}")]
    Stale {
        essay_id: String,
        expected: &'static str,
    },

    #[error("数据库操作失败: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// 存储层结果类型别名
pub type StoreResult<T> = Result<T, StoreError>;
