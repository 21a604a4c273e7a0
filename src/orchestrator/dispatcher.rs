//! 批改任务调度器 - 编排层
//!
//! ## 职责
//!
//! 1. **并发控制**：使用 Semaphore 限制同时进行的批改任务数
//! 2. **任务执行**：调用批改服务 → 报告落盘 → 分数提取
//! 3. **结果回送**：成功/失败都通过协调器的回调落账
//!
//! ## 设计特点
//!
//! - **fire-and-forget**：入队立即返回，调用方不等待批改完成
//! - **有界工作池**：入队数可以超过并发上限，超出的任务在
//!   Semaphore 上排队；每篇 Essay 的互斥由 `processing` 状态保证，
//!   与工作协程的身份无关
//! - **不碰存储**：所有持久化写入都在协调器回调里发生

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::error::CorrectionResult;
use crate::services::{CorrectionEngine, ReportWriter, ScoreExtractor};
use crate::workflow::{Coordinator, CorrectionJob, CorrectionOutcome};

/// 批改任务调度器
pub struct TaskDispatcher {
    semaphore: Arc<Semaphore>,
    engine: Arc<dyn CorrectionEngine>,
    report_writer: Arc<ReportWriter>,
    extractor: ScoreExtractor,
}

impl TaskDispatcher {
    pub fn new(
        max_concurrent: usize,
        engine: Arc<dyn CorrectionEngine>,
        report_writer: Arc<ReportWriter>,
    ) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            engine,
            report_writer,
            extractor: ScoreExtractor::new(),
        }
    }

    /// 把批改任务放入工作池，立即返回
    ///
    /// 调用前 Essay 必须已被置为 processing（互斥锁已持有）。
    pub fn enqueue(&self, job: CorrectionJob, coordinator: Arc<Coordinator>) {
        let semaphore = Arc::clone(&self.semaphore);
        let engine = Arc::clone(&self.engine);
        let report_writer = Arc::clone(&self.report_writer);
        let extractor = self.extractor;

        tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                // Semaphore 只在进程关闭时关闭，此时放弃任务即可
                Err(_) => return,
            };

            debug!("⚙️ 工作协程开始执行: {}", job.ctx);
            match run_correction(engine.as_ref(), &report_writer, extractor, &job).await {
                Ok(outcome) => coordinator.on_task_succeeded(&job.ctx, outcome),
                Err(e) => coordinator.on_task_failed(&job.ctx, &e),
            }
        });
    }
}

/// 执行单个批改任务：服务调用 → 落盘 → 提分
async fn run_correction(
    engine: &dyn CorrectionEngine,
    report_writer: &ReportWriter,
    extractor: ScoreExtractor,
    job: &CorrectionJob,
) -> CorrectionResult<CorrectionOutcome> {
    let html_content = engine.correct(&job.request).await?;

    let html_path = report_writer
        .save(
            &job.ctx.student_name,
            &job.ctx.grade,
            job.ctx.version_number,
            &html_content,
        )
        .await?;

    // 提分失败不算批改失败，空结果照常落库
    let scores = extractor.extract(&html_content);

    info!(
        "📋 批改产物就绪: {} (指标 {} 个)",
        job.ctx,
        scores.indicators.len()
    );

    Ok(CorrectionOutcome {
        html_content,
        html_path,
        revision_note: job.request.revision_note.clone(),
        scores,
    })
}
