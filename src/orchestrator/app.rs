//! 批量投稿处理应用 - 编排层
//!
//! ## 职责
//!
//! 1. **应用初始化**：装配存储、批改服务、调度器、协调器
//! 2. **批量加载**：扫描投稿目录下的 TOML 文件
//! 3. **批量提交**：为每份投稿创建 Essay 并启动批改
//! 4. **进度跟踪**：轮询状态直到所有 Essay 结算
//! 5. **全局统计**：汇总成功/失败数量

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::models::{load_all_submissions, EssayStatus};
use crate::services::{CorrectionService, LogNotifier, ReportWriter};
use crate::store::EssayStore;
use crate::utils::logging;
use crate::workflow::Coordinator;
use crate::orchestrator::TaskDispatcher;

/// 状态轮询间隔
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// 应用主结构
pub struct App {
    config: Config,
    coordinator: Arc<Coordinator>,
}

impl App {
    /// 初始化应用：打开数据库、加载批改规则、装配流水线
    pub fn initialize(config: Config) -> Result<Self> {
        logging::log_startup(config.max_concurrent_corrections, &config.llm_model_name);

        let store = Arc::new(EssayStore::new(&config.db_path)?);
        let engine = Arc::new(CorrectionService::new(&config)?);
        let report_writer = Arc::new(ReportWriter::new(&config.report_dir));
        let dispatcher = TaskDispatcher::new(
            config.max_concurrent_corrections,
            engine,
            report_writer,
        );
        let coordinator = Coordinator::new(store, dispatcher, Arc::new(LogNotifier::new()));

        Ok(Self {
            config,
            coordinator,
        })
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<()> {
        info!("\n📁 正在扫描投稿目录: {}", self.config.submissions_dir);
        let submissions = load_all_submissions(&self.config.submissions_dir).await?;

        if submissions.is_empty() {
            warn!("⚠️ 没有找到待批改的TOML文件，程序结束");
            return Ok(());
        }

        let total = submissions.len();
        logging::log_submissions_loaded(total, self.config.max_concurrent_corrections);

        // 逐份提交并启动批改
        let mut essay_ids = Vec::with_capacity(total);
        for submission in submissions {
            let new_essay = submission.into_new_essay();
            match self.coordinator.create_essay(&new_essay) {
                Ok(essay) => {
                    if let Err(e) = self.coordinator.start(&essay.essay_id) {
                        error!("❌ 无法启动批改 (Essay#{}): {}", essay.essay_id, e);
                    }
                    essay_ids.push(essay.essay_id);
                }
                Err(e) => error!("❌ 投稿入库失败: {}", e),
            }
        }

        // 等待所有 Essay 结算（reviewing 或 failed）
        let (success, failed) = self.wait_for_settlement(&essay_ids).await?;

        logging::print_final_stats(success, failed, essay_ids.len());

        Ok(())
    }

    /// 轮询直到所有 Essay 离开 processing 状态
    async fn wait_for_settlement(&self, essay_ids: &[String]) -> Result<(usize, usize)> {
        loop {
            let mut success = 0;
            let mut failed = 0;
            let mut in_flight = 0;

            for essay_id in essay_ids {
                match self.coordinator.status(essay_id)?.status {
                    EssayStatus::Reviewing | EssayStatus::Completed => success += 1,
                    EssayStatus::Failed => failed += 1,
                    EssayStatus::Processing => in_flight += 1,
                    // start 失败的 Essay 停在 draft，按失败统计
                    EssayStatus::Draft => failed += 1,
                }
            }

            if in_flight == 0 {
                return Ok((success, failed));
            }

            info!(
                "⏳ 批改进行中: {} 个，已完成: {} 个，已失败: {} 个",
                in_flight, success, failed
            );
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }
}
