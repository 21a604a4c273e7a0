//! 批改任务上下文
//!
//! 封装"我正在批改哪篇论述文的第几版"这一信息

use std::fmt::Display;

use crate::models::CorrectionRequest;
use crate::services::ExtractedScores;

/// 批改任务上下文
///
/// 任务入队时生成，贯穿工作协程和完成回调
#[derive(Debug, Clone)]
pub struct CorrectionCtx {
    /// Essay ID
    pub essay_id: String,

    /// 本次批改要写入的版本号
    pub version_number: i64,

    /// 创建者（讲师）ID，完成/失败通知发给此用户
    pub user_id: String,

    /// 学生姓名（仅用于日志显示和报告文件名）
    pub student_name: String,

    /// 学年段
    pub grade: String,
}

impl Display for CorrectionCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[Essay#{} v{} 학생#{}]",
            self.essay_id, self.version_number, self.student_name
        )
    }
}

/// 一个已入队的批改任务
#[derive(Debug)]
pub struct CorrectionJob {
    pub ctx: CorrectionCtx,
    pub request: CorrectionRequest,
}

/// 批改任务成功后的全部产物，交给完成回调一次性落库
#[derive(Debug)]
pub struct CorrectionOutcome {
    /// 规范化后的批改报告全文
    pub html_content: String,
    /// 报告落盘路径
    pub html_path: String,
    /// 产生此版本的修改要求（仅 regenerate 任务有）
    pub revision_note: Option<String>,
    /// 从报告中提取的分数（可能为空）
    pub scores: ExtractedScores,
}
