//! 通知服务 - 业务能力层
//!
//! 流程节点（提交成功、批改完成、批改失败、定稿）向讲师发出的通知。
//! 当前实现只写结构化日志；接入站内信/邮件时替换 [`Notifier`] 实现即可。

use tracing::info;

/// 通知能力接口
pub trait Notifier: Send + Sync {
    /// 向指定用户发送一条通知
    fn notify(&self, user_id: &str, kind: &str, title: &str, message: &str, link: Option<&str>);
}

/// 日志通知器：把通知事件记录为结构化日志
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

impl Notifier for LogNotifier {
    fn notify(&self, user_id: &str, kind: &str, title: &str, message: &str, link: Option<&str>) {
        info!(
            user_id = user_id,
            kind = kind,
            link = link.unwrap_or("-"),
            "🔔 {}: {}",
            title,
            message
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_notifier_is_object_safe() {
        let notifier: Box<dyn Notifier> = Box::new(LogNotifier::new());
        notifier.notify("user-1", "essay_completed", "첨삭 완료", "첨삭이 완료되었습니다", None);
    }
}
