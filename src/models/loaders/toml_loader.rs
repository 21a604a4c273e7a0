use crate::models::essay::NewEssay;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::fs;

/// 投稿 TOML 文件格式
///
/// 批量模式下每个文件描述一名学生的一次投稿。
#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionFile {
    pub student_name: String,
    /// 학년段：초등 / 중등 / 고등
    pub grade: String,
    pub title: Option<String>,
    /// 论述文原文
    pub text: String,
    /// 批改前注意事项（可选）
    pub notes: Option<String>,
    /// 批改教师姓名（报告签名用，可选）
    pub teacher_name: Option<String>,
    /// 学生 ID（缺省时按姓名生成占位 ID）
    pub student_id: Option<String>,
    /// 创建者 ID（缺省时使用 "batch"）
    pub user_id: Option<String>,
}

impl SubmissionFile {
    /// 转换为创建 Essay 的输入
    pub fn into_new_essay(self) -> NewEssay {
        let student_id = self
            .student_id
            .unwrap_or_else(|| format!("student-{}", self.student_name));
        NewEssay {
            student_id,
            user_id: self.user_id.unwrap_or_else(|| "batch".to_string()),
            student_name: self.student_name,
            teacher_name: self.teacher_name,
            title: self.title,
            original_text: self.text,
            grade: self.grade,
            notes: self.notes,
            attachment_path: None,
        }
    }
}

/// 从 TOML 文件加载单个投稿
pub async fn load_submission(toml_file_path: &Path) -> Result<SubmissionFile> {
    let content = fs::read_to_string(toml_file_path)
        .await
        .with_context(|| format!("无法读取TOML文件: {}", toml_file_path.display()))?;

    let submission: SubmissionFile = toml::from_str(&content)
        .with_context(|| format!("无法解析TOML文件: {}", toml_file_path.display()))?;

    Ok(submission)
}

/// 从文件夹中加载所有投稿 TOML 文件
pub async fn load_all_submissions(folder_path: &str) -> Result<Vec<SubmissionFile>> {
    let folder = PathBuf::from(folder_path);

    if !folder.exists() {
        anyhow::bail!("文件夹不存在: {}", folder_path);
    }

    let mut submissions = Vec::new();
    let mut entries = fs::read_dir(&folder)
        .await
        .with_context(|| format!("无法读取文件夹: {}", folder_path))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            tracing::info!(
                "正在加载: {}",
                path.file_name().unwrap_or_default().to_string_lossy()
            );

            match load_submission(&path).await {
                Ok(submission) => {
                    tracing::info!(
                        "成功加载投稿: {} ({})",
                        submission.student_name,
                        submission.grade
                    );
                    submissions.push(submission);
                }
                Err(e) => {
                    tracing::warn!("加载文件失败 {}: {}", path.display(), e);
                }
            }
        }
    }

    Ok(submissions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_submission_toml() {
        let content = r#"
student_name = "김민준"
grade = "중등"
title = "환경 보호에 대한 고찰"
text = "환경 보호는 더 이상 미룰 수 없는 과제이다."
notes = "수동태 사용에 주의"
teacher_name = "이선생"
"#;
        let submission: SubmissionFile = toml::from_str(content).unwrap();
        assert_eq!(submission.student_name, "김민준");
        assert_eq!(submission.grade, "중등");
        assert_eq!(submission.notes.as_deref(), Some("수동태 사용에 주의"));

        let new_essay = submission.into_new_essay();
        assert_eq!(new_essay.student_id, "student-김민준");
        assert_eq!(new_essay.user_id, "batch");
    }

    #[test]
    fn test_parse_minimal_submission() {
        let content = r#"
student_name = "박서연"
grade = "고등"
text = "본문"
"#;
        let submission: SubmissionFile = toml::from_str(content).unwrap();
        assert!(submission.title.is_none());
        assert!(submission.notes.is_none());
    }
}
