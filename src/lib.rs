//! # Essay Correction
//!
//! 학원 관리 앱（学院管理应用）的论述文批改流水线
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 存储层（Store）
//! - `store/` - 持有数据库连接，暴露 Essay/Version/Result 的读写能力
//! - `EssayStore` - 唯一的 connection owner，状态抢占通过条件更新实现
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单次批改
//! - `CorrectionService` - 调用外部批改服务并规范化响应
//! - `ScoreExtractor` - 从批改报告中提取总分和指标分数
//! - `ReportWriter` - 报告落盘能力
//! - `Notifier` - 流程节点通知能力
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义一篇论述文的完整状态机
//! - `CorrectionCtx` - 上下文封装（essay_id + version_number）
//! - `Coordinator` - 状态转换的唯一入口 + 任务完成回调
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/dispatcher` - 有界工作池，并发执行批改任务
//! - `orchestrator/app` - 批量投稿处理，装配整条流水线

pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod store;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{CorrectionError, CorrectionFailure, CorrectionResult};
pub use models::{CorrectionRequest, CorrectionSource, Essay, EssayStatus, NewEssay, StatusReport};
pub use orchestrator::{App, TaskDispatcher};
pub use services::{CorrectionEngine, CorrectionService, ScoreExtractor};
pub use store::EssayStore;
pub use workflow::{Coordinator, CorrectionCtx};
