//! 批改流程协调器 - 流程编排层
//!
//! Essay 状态机的唯一入口：
//! - 同步侧：create / start / regenerate / finalize / status，
//!   状态校验失败立即拒绝，无任何副作用
//! - 异步侧：任务完成/失败回调，负责把批改产物落库或把 Essay 置为 failed
//!
//! `processing` 状态本身就是互斥锁：start/regenerate 通过存储层的
//! 条件更新抢占它，抢不到的一方同步收到拒绝，绝不排队。

use std::sync::{Arc, Weak};

use tracing::{error, info, warn};

use crate::error::{CorrectionError, CorrectionResult};
use crate::models::{
    CorrectionRequest, CorrectionSource, Essay, EssayStatus, NewEssay, StatusReport,
};
use crate::orchestrator::TaskDispatcher;
use crate::services::Notifier;
use crate::store::{ClaimOutcome, CorrectionClaim, EssayStore, FinalizeOutcome, StoreError};
use crate::workflow::{CorrectionCtx, CorrectionJob, CorrectionOutcome};

/// 批改流程协调器
pub struct Coordinator {
    store: Arc<EssayStore>,
    dispatcher: TaskDispatcher,
    notifier: Arc<dyn Notifier>,
    /// 自引用，入队时交给工作协程用于完成回调
    self_ref: Weak<Coordinator>,
}

impl Coordinator {
    pub fn new(
        store: Arc<EssayStore>,
        dispatcher: TaskDispatcher,
        notifier: Arc<dyn Notifier>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            store,
            dispatcher,
            notifier,
            self_ref: self_ref.clone(),
        })
    }

    pub fn store(&self) -> &Arc<EssayStore> {
        &self.store
    }

    // ========== 同步操作 ==========

    /// 创建 Essay（draft 状态，不触发批改）
    pub fn create_essay(&self, new: &NewEssay) -> CorrectionResult<Essay> {
        let essay = self.store.create_essay(new)?;

        info!(
            "📝 논술문 제출: Essay#{} 학생 {} ({})",
            essay.essay_id, essay.student_name, essay.grade
        );
        self.notifier.notify(
            &essay.user_id,
            "essay_submitted",
            "논술문 제출 완료",
            &format!("{} 학생의 논술문이 접수되었습니다", essay.student_name),
            None,
        );

        Ok(essay)
    }

    /// 开始批改：draft/failed → processing，任务入队后立即返回
    pub fn start(&self, essay_id: &str) -> CorrectionResult<CorrectionCtx> {
        let claim = match self.store.claim_start(essay_id)? {
            ClaimOutcome::Claimed(claim) => claim,
            ClaimOutcome::Rejected(status) => return Err(reject(essay_id, status, "start")),
            ClaimOutcome::Missing => {
                return Err(CorrectionError::NotFound {
                    essay_id: essay_id.to_string(),
                })
            }
        };

        let job = build_job(claim, None);
        let ctx = job.ctx.clone();
        info!("🚀 첨삭 시작: {}", ctx);
        self.enqueue(job);

        Ok(ctx)
    }

    /// 重新生成：reviewing/completed → processing，版本号 +1
    ///
    /// 定稿后的 regenerate 把上一版批改本交给服务"在此基础上修改"，
    /// 未定稿则按原文重新批改。
    pub fn regenerate(&self, essay_id: &str, revision_note: &str) -> CorrectionResult<CorrectionCtx> {
        let revision_note = revision_note.trim();
        if revision_note.is_empty() {
            return Err(CorrectionError::EmptyRevisionNote {
                essay_id: essay_id.to_string(),
            });
        }

        let claim = match self.store.claim_regenerate(essay_id)? {
            ClaimOutcome::Claimed(claim) => claim,
            ClaimOutcome::Rejected(status) => return Err(reject(essay_id, status, "regenerate")),
            ClaimOutcome::Missing => {
                return Err(CorrectionError::NotFound {
                    essay_id: essay_id.to_string(),
                })
            }
        };

        let job = build_job(claim, Some(revision_note.to_string()));
        let ctx = job.ctx.clone();
        info!("🔄 재첨삭 시작: {} (요청: {})", ctx, revision_note);
        self.enqueue(job);

        Ok(ctx)
    }

    fn enqueue(&self, job: CorrectionJob) {
        match self.self_ref.upgrade() {
            Some(coordinator) => self.dispatcher.enqueue(job, coordinator),
            // 进程关闭中，放弃任务并释放互斥锁
            None => match self.store.mark_failed(&job.ctx.essay_id) {
                Ok(_) => warn!("协调器已销毁，任务被放弃: {}", job.ctx),
                Err(e) => error!("放弃任务时无法释放互斥锁: {} - {}", job.ctx, e),
            },
        }
    }

    /// 定稿：reviewing/completed → completed，设置定稿标记
    pub fn finalize(&self, essay_id: &str) -> CorrectionResult<Essay> {
        let essay = match self.store.finalize(essay_id)? {
            FinalizeOutcome::Done(essay) => essay,
            FinalizeOutcome::Rejected(status) => return Err(reject(essay_id, status, "finalize")),
            FinalizeOutcome::Missing => {
                return Err(CorrectionError::NotFound {
                    essay_id: essay_id.to_string(),
                })
            }
        };

        info!("✅ 첨삭 확정: Essay#{} v{}", essay.essay_id, essay.current_version);
        self.notifier.notify(
            &essay.user_id,
            "essay_finalized",
            "첨삭 확정",
            &format!("{} 학생의 첨삭이 확정되었습니다", essay.student_name),
            None,
        );

        Ok(essay)
    }

    /// 查询 Essay 当前状态摘要
    pub fn status(&self, essay_id: &str) -> CorrectionResult<StatusReport> {
        self.store
            .status_report(essay_id)?
            .ok_or_else(|| CorrectionError::NotFound {
                essay_id: essay_id.to_string(),
            })
    }

    // ========== 异步回调（由调度器的工作协程调用） ==========

    /// 批改任务成功：把版本、评分摘要、指标分数一次性落库
    ///
    /// 落库本身失败时 Essay 转为 failed，已生成的文档被丢弃（可重试）。
    pub fn on_task_succeeded(&self, ctx: &CorrectionCtx, outcome: CorrectionOutcome) {
        let result = self.store.apply_correction_success(
            &ctx.essay_id,
            ctx.version_number,
            &outcome.html_content,
            &outcome.html_path,
            outcome.revision_note.as_deref(),
            outcome.scores.total_score,
            outcome.scores.final_grade.as_deref(),
            &outcome.scores.indicators,
        );

        match result {
            Ok(version) => {
                info!(
                    "🎉 첨삭 완료: {} (총점: {:?}, 보고서: {})",
                    ctx, outcome.scores.total_score, version.html_path
                );
                self.notifier.notify(
                    &ctx.user_id,
                    "essay_completed",
                    "첨삭 완료",
                    &format!("{} 학생의 첨삭이 완료되었습니다", ctx.student_name),
                    Some(&version.html_path),
                );
            }
            Err(StoreError::Stale { .. }) => {
                // 重复或过期的回调，Essay 已被其他路径处理过
                warn!("过期的成功回调被忽略: {}", ctx);
                discard_report(ctx, &outcome.html_path);
            }
            Err(e) => {
                error!("첨삭 결과 저장 실패: {} - {}", ctx, e);
                discard_report(ctx, &outcome.html_path);
                self.settle_as_failed(ctx);
            }
        }
    }

    /// 批改任务失败：Essay 转为 failed，可通过 start 重试
    pub fn on_task_failed(&self, ctx: &CorrectionCtx, err: &CorrectionError) {
        error!("💥 첨삭 실패: {} - {}", ctx, err);
        self.settle_as_failed(ctx);
    }

    fn settle_as_failed(&self, ctx: &CorrectionCtx) {
        match self.store.mark_failed(&ctx.essay_id) {
            Ok(true) => {
                self.notifier.notify(
                    &ctx.user_id,
                    "essay_failed",
                    "첨삭 실패",
                    &format!(
                        "{} 학생의 첨삭에 실패했습니다. 다시 시도해주세요",
                        ctx.student_name
                    ),
                    None,
                );
            }
            Ok(false) => warn!("过期的失败回调被忽略: {}", ctx),
            Err(e) => error!("无法将 Essay 置为 failed: {} - {}", ctx, e),
        }
    }
}

/// 丢弃没有任何 Version 行引用的报告文件（落库失败/过期回调时）
fn discard_report(ctx: &CorrectionCtx, html_path: &str) {
    match std::fs::remove_file(html_path) {
        Ok(()) => info!("🗑️ 已清理孤立的报告文件: {}", html_path),
        Err(e) => warn!("无法清理孤立的报告文件 {}: {} - {}", html_path, ctx, e),
    }
}

/// 状态拒绝的错误映射：processing 视为并发竞争，其余按非法转换处理
fn reject(essay_id: &str, status: EssayStatus, action: &'static str) -> CorrectionError {
    if status == EssayStatus::Processing {
        CorrectionError::AlreadyProcessing {
            essay_id: essay_id.to_string(),
        }
    } else {
        CorrectionError::InvalidState {
            essay_id: essay_id.to_string(),
            status,
            action,
        }
    }
}

/// 用抢占到的数据组装批改任务
fn build_job(claim: CorrectionClaim, revision_note: Option<String>) -> CorrectionJob {
    let CorrectionClaim {
        essay,
        version_number,
        was_finalized,
        prior_html,
        notes,
    } = claim;

    let source = match prior_html {
        Some(prior_document) if was_finalized => CorrectionSource::RevisionOfFinalized {
            prior_document,
        },
        _ => CorrectionSource::FreshSubmission {
            text: essay.original_text.clone(),
            notes,
        },
    };

    CorrectionJob {
        ctx: CorrectionCtx {
            essay_id: essay.essay_id.clone(),
            version_number,
            user_id: essay.user_id.clone(),
            student_name: essay.student_name.clone(),
            grade: essay.grade.clone(),
        },
        request: CorrectionRequest {
            student_name: essay.student_name,
            grade: essay.grade,
            source,
            revision_note,
            teacher_name: essay.teacher_name,
        },
    }
}
