//! Essay 领域模型
//!
//! 一个 Essay 对应一名学生一次投稿的批改作业，
//! 每次批改尝试产生一个不可变的 Version。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Essay 生命周期状态
///
/// 状态机：`draft → processing → reviewing → completed`，
/// processing 失败进入 `failed`，`failed` 只能通过显式 start 重新进入 processing。
/// `processing` 本身充当互斥锁：同一 Essay 任何时刻最多一个在飞行中的批改任务。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EssayStatus {
    /// 已创建，尚未开始批改
    Draft,
    /// 批改任务在飞行中（互斥锁已被持有）
    Processing,
    /// 批改成功，等待教师审阅
    Reviewing,
    /// 教师已确认定稿
    Completed,
    /// 批改失败，可通过 start 重试
    Failed,
}

impl EssayStatus {
    /// 获取状态的存储字符串
    pub fn as_str(self) -> &'static str {
        match self {
            EssayStatus::Draft => "draft",
            EssayStatus::Processing => "processing",
            EssayStatus::Reviewing => "reviewing",
            EssayStatus::Completed => "completed",
            EssayStatus::Failed => "failed",
        }
    }

    /// 从存储字符串解析状态
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(EssayStatus::Draft),
            "processing" => Some(EssayStatus::Processing),
            "reviewing" => Some(EssayStatus::Reviewing),
            "completed" => Some(EssayStatus::Completed),
            "failed" => Some(EssayStatus::Failed),
            _ => None,
        }
    }

    /// 是否处于终结（非飞行中）状态
    pub fn is_settled(self) -> bool {
        self != EssayStatus::Processing
    }
}

impl std::fmt::Display for EssayStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 批改作业
#[derive(Debug, Clone)]
pub struct Essay {
    pub essay_id: String,
    /// 学生引用
    pub student_id: String,
    /// 创建者（讲师）引用
    pub user_id: String,
    /// 学生姓名（构建 prompt 用）
    pub student_name: String,
    /// 批改教师姓名（报告签名用，可选）
    pub teacher_name: Option<String>,
    pub title: Option<String>,
    /// 学生投稿的原文
    pub original_text: String,
    /// 学年段（초등/중등/고등）
    pub grade: String,
    pub status: EssayStatus,
    /// 当前版本号，单调递增，从 1 开始
    pub current_version: i64,
    pub is_finalized: bool,
    pub finalized_at: Option<DateTime<Utc>>,
    /// 原始附件路径（图片、文档等，可选）
    pub attachment_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// 创建 Essay 所需的输入
#[derive(Debug, Clone)]
pub struct NewEssay {
    pub student_id: String,
    pub user_id: String,
    pub student_name: String,
    pub teacher_name: Option<String>,
    pub title: Option<String>,
    pub original_text: String,
    pub grade: String,
    /// 批改前的注意事项，作为首条 Note 保存
    pub notes: Option<String>,
    pub attachment_path: Option<String>,
}

/// 一次批改尝试的不可变产物
///
/// `(essay_id, version_number)` 全局唯一；创建后不再修改，只追加。
#[derive(Debug, Clone)]
pub struct Version {
    pub version_id: String,
    pub essay_id: String,
    pub version_number: i64,
    /// 生成的批改报告（HTML 文档）
    pub html_content: String,
    /// 报告落盘后的文件路径（外部渲染/PDF 转换按此读取）
    pub html_path: String,
    /// 产生此版本的修改要求（仅 regenerate 时存在）
    pub revision_note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Essay 的最新评分摘要
///
/// 每个 Essay 只有一行，regenerate 时 `version_id` 指针被替换而不是新增。
#[derive(Debug, Clone)]
pub struct EssayResult {
    pub result_id: String,
    pub essay_id: String,
    pub version_id: String,
    pub html_path: String,
    pub total_score: Option<f64>,
    pub final_grade: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 从批改报告中提取出的单项指标分数
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorScore {
    /// 指标类别（사고유형 / 통합지표）
    pub category: String,
    pub indicator_name: String,
    /// 0.0 ~ 10.0
    pub score: f64,
}

/// 附加在 Essay 上的批改前指导（不可变）
#[derive(Debug, Clone)]
pub struct EssayNote {
    pub note_id: String,
    pub essay_id: String,
    pub note_type: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// 对外暴露的状态查询响应
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub status: EssayStatus,
    pub current_version: i64,
    pub is_finalized: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            EssayStatus::Draft,
            EssayStatus::Processing,
            EssayStatus::Reviewing,
            EssayStatus::Completed,
            EssayStatus::Failed,
        ] {
            assert_eq!(EssayStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(EssayStatus::parse("unknown"), None);
    }

    #[test]
    fn test_status_serde_lowercase() {
        let json = serde_json::to_string(&EssayStatus::Processing).unwrap();
        assert_eq!(json, r#""processing""#);
    }

    #[test]
    fn test_status_report_json_shape() {
        let report = StatusReport {
            status: EssayStatus::Reviewing,
            current_version: 2,
            is_finalized: false,
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["status"], "reviewing");
        assert_eq!(value["current_version"], 2);
        assert_eq!(value["is_finalized"], false);
    }
}
