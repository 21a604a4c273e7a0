//! 报告落盘服务 - 业务能力层
//!
//! 把生成的批改报告（HTML 文档）写入输出目录。
//! 文件名按 `{학생}_{학년}_v{버전}_{시각}.html` 规则生成，
//! 同一 Essay 的多个版本互不覆盖。

use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::info;

use crate::error::{CorrectionError, CorrectionResult};

/// 报告落盘服务
#[derive(Debug, Clone)]
pub struct ReportWriter {
    report_dir: PathBuf,
}

impl ReportWriter {
    pub fn new(report_dir: impl Into<PathBuf>) -> Self {
        Self {
            report_dir: report_dir.into(),
        }
    }

    /// 输出目录
    pub fn report_dir(&self) -> &Path {
        &self.report_dir
    }

    /// 写出一个版本的报告，返回落盘路径
    ///
    /// 目录不存在时自动创建。写入失败按持久化失败处理。
    pub async fn save(
        &self,
        student_name: &str,
        grade: &str,
        version_number: i64,
        html_content: &str,
    ) -> CorrectionResult<String> {
        tokio::fs::create_dir_all(&self.report_dir)
            .await
            .map_err(CorrectionError::persistence_failed)?;

        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let filename = format!(
            "{}_{}_v{}_{}.html",
            student_name, grade, version_number, timestamp
        );
        let path = self.report_dir.join(&filename);

        tokio::fs::write(&path, html_content)
            .await
            .map_err(CorrectionError::persistence_failed)?;

        let path_str = path.to_string_lossy().to_string();
        info!("📄 报告已保存: {}", path_str);

        Ok(path_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_creates_file_with_version_in_name() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(dir.path());

        let path = writer
            .save("김민준", "중등", 2, "<!DOCTYPE html><html></html>")
            .await
            .unwrap();

        assert!(path.contains("김민준_중등_v2_"));
        assert!(path.ends_with(".html"));

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content, "<!DOCTYPE html><html></html>");
    }

    #[tokio::test]
    async fn test_save_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("output").join("html");
        let writer = ReportWriter::new(&nested);

        writer.save("박서연", "고등", 1, "<html></html>").await.unwrap();

        assert!(nested.exists());
    }
}
