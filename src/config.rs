/// 程序配置文件
#[derive(Clone, Debug)]
pub struct Config {
    /// 同时处理的批改任务数量（工作池大小）
    pub max_concurrent_corrections: usize,
    /// 单次批改 API 调用的超时时间（秒）
    pub request_timeout_secs: u64,
    /// SQLite 数据库文件路径
    pub db_path: String,
    /// 批改规则文档（system prompt）路径
    pub ruleset_path: String,
    /// 生成的批改报告（HTML）输出目录
    pub report_dir: String,
    /// 待处理投稿 TOML 文件存放目录
    pub submissions_dir: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_corrections: 4,
            request_timeout_secs: 300,
            db_path: "academy.db".to_string(),
            ruleset_path: "docs/MOMOAI_v3.3.0.md".to_string(),
            report_dir: "output_html".to_string(),
            submissions_dir: "submissions".to_string(),
            verbose_logging: false,
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.anthropic.com/v1".to_string(),
            llm_model_name: "claude-sonnet-4-5".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            max_concurrent_corrections: std::env::var("MAX_CONCURRENT_CORRECTIONS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_concurrent_corrections),
            request_timeout_secs: std::env::var("REQUEST_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.request_timeout_secs),
            db_path: std::env::var("DB_PATH").unwrap_or(default.db_path),
            ruleset_path: std::env::var("RULESET_PATH").unwrap_or(default.ruleset_path),
            report_dir: std::env::var("REPORT_DIR").unwrap_or(default.report_dir),
            submissions_dir: std::env::var("SUBMISSIONS_DIR").unwrap_or(default.submissions_dir),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.verbose_logging),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
        }
    }
}
