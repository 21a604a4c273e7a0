//! 批改服务适配器 - 业务能力层
//!
//! 只负责"调用外部批改服务并规范化响应"能力，不关心流程：
//! - 不接触 Version/Result 存储（持久化是调度器的事）
//! - 不做重试（重试策略属于调用方）
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型（兼容 OpenAI API 的服务）

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{CorrectionError, CorrectionFailure, CorrectionResult};
use crate::models::{CorrectionRequest, CorrectionSource};

/// 批改能力接口
///
/// 生产实现是 [`CorrectionService`]；测试用 mock 实现替换。
#[async_trait]
pub trait CorrectionEngine: Send + Sync {
    /// 执行一次批改，返回规范化后的 HTML 报告全文
    async fn correct(&self, request: &CorrectionRequest) -> CorrectionResult<String>;
}

/// 批改服务适配器
pub struct CorrectionService {
    client: Client<OpenAIConfig>,
    model_name: String,
    /// 固定的批改规则文档（system prompt），构造时从磁盘加载
    system_prompt: String,
    timeout: Duration,
}

impl CorrectionService {
    /// 创建批改服务
    ///
    /// 规则文档缺失时直接报错，不允许在没有规则的情况下批改。
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let system_prompt = std::fs::read_to_string(&config.ruleset_path).map_err(|e| {
            anyhow::anyhow!("无法加载批改规则文档 {}: {}", config.ruleset_path, e)
        })?;

        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Ok(Self {
            client: Client::with_config(openai_config),
            model_name: config.llm_model_name.clone(),
            system_prompt,
            timeout: Duration::from_secs(config.request_timeout_secs),
        })
    }

    /// 构建本次批改的用户消息
    ///
    /// 两种模式的措辞刻意不同：
    /// - 原文批改：把论述文原文交给服务，按规则生成批改本
    /// - 定稿修改：把上一版批改本交给服务，要求"在此基础上修改"，
    ///   避免重新批改原文而丢失已有成果
    fn build_user_prompt(&self, request: &CorrectionRequest) -> String {
        let mut prompt = match &request.source {
            CorrectionSource::RevisionOfFinalized { prior_document } => {
                format!(
                    "학생 정보:\n- 이름: {}\n- 학년: {}\n\n이전 첨삭본:\n{}\n\n수정 요청 사항:\n{}\n\n\
                     위 첨삭본을 기반으로 수정 요청 사항을 반영하여 개선된 첨삭본을 생성해주세요.\n\
                     MOMOAI v3.3.0 규칙을 준수하고, 반드시 HTML 완전 템플릿 형식으로 출력해주세요.\n",
                    request.student_name,
                    request.grade,
                    prior_document,
                    request.revision_note.as_deref().unwrap_or_default(),
                )
            }
            CorrectionSource::FreshSubmission { text, notes } => {
                let mut prompt = format!(
                    "학생 정보:\n- 이름: {}\n- 학년: {}\n\n논술문:\n{}\n",
                    request.student_name, request.grade, text,
                );

                if let Some(notes) = notes {
                    prompt.push_str(&format!("\n주의사항:\n{}\n", notes));
                }

                if let Some(revision_note) = &request.revision_note {
                    prompt.push_str(&format!("\n수정 요청 사항:\n{}\n", revision_note));
                }

                prompt.push_str(
                    "\n위 논술문을 MOMOAI v3.3.0 규칙에 따라 첨삭해주세요.\n\
                     반드시 HTML 완전 템플릿 형식으로 출력하고, 모든 규칙을 준수해주세요.\n",
                );
                prompt
            }
        };

        // 批改教师签名块（报告末尾）
        if let Some(teacher_name) = &request.teacher_name {
            prompt.push_str(&format!(
                "\n중요: HTML 문서의 맨 마지막 </body> 태그 직전에 다음 형식의 첨삭자 사인을 추가해주세요:\n\
                 <div style=\"text-align: right; margin-top: 50px; padding: 20px; color: #666; font-style: italic;\">\n    첨삭: {}\n</div>\n",
                teacher_name
            ));
        }

        prompt
    }

    /// 调用 API 并取出原始回复文本
    async fn call_service(&self, user_prompt: &str) -> CorrectionResult<String> {
        debug!("调用批改服务，模型: {}", self.model_name);
        debug!("用户消息长度: {} 字符", user_prompt.len());

        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(self.system_prompt.as_str())
            .build()
            .map_err(|e| CorrectionError::request_failed(&self.model_name, e))?;

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(user_prompt)
            .build()
            .map_err(|e| CorrectionError::request_failed(&self.model_name, e))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(vec![
                ChatCompletionRequestMessage::System(system_msg),
                ChatCompletionRequestMessage::User(user_msg),
            ])
            .max_tokens(16000u32)
            .build()
            .map_err(|e| CorrectionError::request_failed(&self.model_name, e))?;

        // 生成耗时可达数分钟，超时上限由配置控制
        let response = tokio::time::timeout(self.timeout, self.client.chat().create(request))
            .await
            .map_err(|_| {
                warn!("批改服务调用超时 ({} 秒)", self.timeout.as_secs());
                CorrectionError::CorrectionFailed(CorrectionFailure::Timeout {
                    seconds: self.timeout.as_secs(),
                })
            })?
            .map_err(|e| {
                warn!("批改服务调用失败: {}", e);
                CorrectionError::request_failed(&self.model_name, e)
            })?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                CorrectionError::CorrectionFailed(CorrectionFailure::EmptyResponse {
                    model: self.model_name.clone(),
                })
            })?;

        debug!("批改服务调用成功，响应长度: {} 字符", content.len());

        Ok(content)
    }
}

#[async_trait]
impl CorrectionEngine for CorrectionService {
    async fn correct(&self, request: &CorrectionRequest) -> CorrectionResult<String> {
        let user_prompt = self.build_user_prompt(request);
        let raw = self.call_service(&user_prompt).await?;
        normalize_reply(&raw)
    }
}

/// 规范化服务回复
///
/// 回复可能包在 Markdown 代码块里，或带有开头的说明文字。
/// 先剥掉代码块围栏，再定位文档起始标记（<!DOCTYPE 或 <html）并
/// 丢弃之前的一切；找不到标记视为响应格式错误。
pub fn normalize_reply(raw: &str) -> CorrectionResult<String> {
    let mut content = raw;

    // 剥掉 Markdown 代码块围栏
    if let Some(start) = content.find("```html") {
        let body = &content[start + "```html".len()..];
        content = match body.find("```") {
            Some(end) => &body[..end],
            None => body,
        };
    } else if let Some(start) = content.find("```") {
        let body = &content[start + "```".len()..];
        content = match body.find("```") {
            Some(end) => &body[..end],
            None => body,
        };
    }

    // 定位文档起始标记，丢弃前面的说明文字
    let doc_start = content
        .find("<!DOCTYPE")
        .or_else(|| content.find("<html"));

    match doc_start {
        Some(idx) => Ok(content[idx..].trim().to_string()),
        None => Err(CorrectionError::CorrectionFailed(
            CorrectionFailure::MalformedResponse,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service_for_prompt_tests() -> CorrectionService {
        CorrectionService {
            client: Client::with_config(OpenAIConfig::new()),
            model_name: "test-model".to_string(),
            system_prompt: "MOMOAI 규칙".to_string(),
            timeout: Duration::from_secs(1),
        }
    }

    fn fresh_request() -> CorrectionRequest {
        CorrectionRequest {
            student_name: "김민준".to_string(),
            grade: "중등".to_string(),
            source: CorrectionSource::FreshSubmission {
                text: "논술문 본문".to_string(),
                notes: Some("수동태 주의".to_string()),
            },
            revision_note: None,
            teacher_name: Some("이선생".to_string()),
        }
    }

    #[test]
    fn test_fresh_prompt_contains_submission_and_notes() {
        let service = service_for_prompt_tests();
        let prompt = service.build_user_prompt(&fresh_request());

        assert!(prompt.contains("논술문:\n논술문 본문"));
        assert!(prompt.contains("주의사항:\n수동태 주의"));
        assert!(prompt.contains("첨삭: 이선생"));
        // 原文模式不应出现"이전 첨삭본"
        assert!(!prompt.contains("이전 첨삭본"));
    }

    #[test]
    fn test_revision_prompt_uses_prior_document() {
        let service = service_for_prompt_tests();
        let request = CorrectionRequest {
            student_name: "김민준".to_string(),
            grade: "중등".to_string(),
            source: CorrectionSource::RevisionOfFinalized {
                prior_document: "<html>이전 버전</html>".to_string(),
            },
            revision_note: Some("서론을 더 짧게".to_string()),
            teacher_name: None,
        };
        let prompt = service.build_user_prompt(&request);

        assert!(prompt.contains("이전 첨삭본:\n<html>이전 버전</html>"));
        assert!(prompt.contains("수정 요청 사항:\n서론을 더 짧게"));
        assert!(prompt.contains("첨삭본을 기반으로"));
        // 定稿修改模式不能把原文再交出去
        assert!(!prompt.contains("논술문:"));
    }

    #[test]
    fn test_normalize_plain_document() {
        let html = "<!DOCTYPE html><html><body>첨삭본</body></html>";
        assert_eq!(normalize_reply(html).unwrap(), html);
    }

    #[test]
    fn test_normalize_strips_html_fence() {
        let raw = "다음은 첨삭 결과입니다.\n```html\n<!DOCTYPE html><html></html>\n```\n감사합니다.";
        assert_eq!(
            normalize_reply(raw).unwrap(),
            "<!DOCTYPE html><html></html>"
        );
    }

    #[test]
    fn test_normalize_strips_bare_fence() {
        let raw = "```\n<html><body>본문</body></html>\n```";
        assert_eq!(
            normalize_reply(raw).unwrap(),
            "<html><body>본문</body></html>"
        );
    }

    #[test]
    fn test_normalize_discards_leading_commentary() {
        let raw = "설명 텍스트가 먼저 나옵니다.\n<html lang=\"ko\"><body></body></html>";
        assert!(normalize_reply(raw).unwrap().starts_with("<html"));
    }

    #[test]
    fn test_normalize_malformed_reply() {
        let err = normalize_reply("죄송합니다. 문서를 생성할 수 없습니다.").unwrap_err();
        assert!(matches!(
            err,
            CorrectionError::CorrectionFailed(CorrectionFailure::MalformedResponse)
        ));
    }
}
