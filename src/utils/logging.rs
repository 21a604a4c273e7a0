/// 日志工具模块
///
/// 提供日志初始化、启动/统计横幅和文本截断辅助函数
use tracing::info;
use tracing_subscriber::EnvFilter;

/// 初始化全局日志订阅器
///
/// 优先读取 RUST_LOG 环境变量，未设置时按 verbose 开关选择级别。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// 记录程序启动信息
pub fn log_startup(max_concurrent: usize, model_name: &str) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 论述文批改流水线");
    info!("📊 最大并发批改数: {}", max_concurrent);
    info!("🤖 批改模型: {}", model_name);
    info!("{}", "=".repeat(60));
}

/// 记录投稿加载信息
pub fn log_submissions_loaded(total: usize, max_concurrent: usize) {
    info!("✓ 找到 {} 份待批改的投稿", total);
    info!("📋 最多同时批改 {} 份\n", max_concurrent);
}

/// 打印最终统计信息
pub fn print_final_stats(success: usize, failed: usize, total: usize) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部批改完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", success, total);
    info!("❌ 失败: {}", failed);
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
