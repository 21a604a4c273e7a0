//! 批改请求的输入模型
//!
//! 用带标签的变体显式区分"批改原文"与"在已定稿的批改本上继续修改"
//! 两种模式，而不是用布尔标志在多层之间传递。

/// 批改的文本来源
#[derive(Debug, Clone)]
pub enum CorrectionSource {
    /// 对学生原文做首次（或重新）批改
    FreshSubmission {
        /// 学生投稿原文
        text: String,
        /// 批改前注意事项（多条 Note 以换行拼接）
        notes: Option<String>,
    },
    /// 对已定稿的批改本做增量修改
    ///
    /// prompt 必须明确"在上一版批改本的基础上修改"，
    /// 而不是"重新批改原文"，否则会丢失已有的批改成果。
    RevisionOfFinalized {
        /// 上一版本生成的批改报告全文
        prior_document: String,
    },
}

/// 发往外部批改服务的一次完整请求
#[derive(Debug, Clone)]
pub struct CorrectionRequest {
    pub student_name: String,
    /// 学年段（초등/중등/고등）
    pub grade: String,
    pub source: CorrectionSource,
    /// 修改要求（regenerate 时必填）
    pub revision_note: Option<String>,
    /// 批改教师姓名（用于报告末尾签名，可选）
    pub teacher_name: Option<String>,
}

impl CorrectionRequest {
    /// 是否属于"在定稿批改本上修改"模式
    pub fn is_revision_of_finalized(&self) -> bool {
        matches!(self.source, CorrectionSource::RevisionOfFinalized { .. })
    }
}
