//! 应用入口 - 编排层
//!
//! ## 职责
//!
//! 1. **应用初始化**：日志文件、连接浏览器、创建宿主环境和消息总线、读取用户设置
//! 2. **加载题目**：从 TOML 文件读取题目列表
//! 3. **分发与聚合**：把题目发给所有启用的 AI，等待批次结束
//! 4. **输出结果**：打印投票记录和最终答案，写入日志文件
//!
//! ## 设计特点
//!
//! - **资源所有者**：唯一持有 Browser 的模块
//! - **向下委托**：分发、聚合交给 `Session`

use anyhow::Result;
use chromiumoxide::Browser;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::browser::{self, ChromiumHost};
use crate::config::{Config, SettingsStore, TomlSettingsStore};
use crate::infrastructure::LocalBus;
use crate::models::load_quiz_file;
use crate::orchestrator::session::Session;
use crate::utils::logging::{
    append_log, format_result, init_log_file, log_startup, print_final_stats,
};

/// 应用主结构
pub struct App {
    config: Config,
    _browser: Arc<Browser>,
    session: Session,
    listener: JoinHandle<()>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        // 初始化日志文件
        init_log_file(&config.output_log_file)?;

        // 连接浏览器
        let (browser, host_page) = browser::connect_to_browser_and_page(
            config.browser_debug_port,
            Some(&config.host_page_url),
            None,
        )
        .await?;
        let browser = Arc::new(browser);

        let bus = Arc::new(LocalBus::new(config.bus_request_timeout()));
        let host = Arc::new(ChromiumHost::new(browser.clone(), host_page, bus.clone()));
        let listener = host.spawn_event_listener().await?;

        let store: Arc<dyn SettingsStore> =
            Arc::new(TomlSettingsStore::new(&config.settings_file));
        let session = Session::from_config(&config, store, host, bus)?;

        log_startup(&session.roster().await);

        Ok(Self {
            config,
            _browser: browser,
            session,
            listener,
        })
    }

    /// 运行应用主逻辑
    pub async fn run(self) -> Result<()> {
        let quiz = load_quiz_file(Path::new(&self.config.quiz_file)).await?;
        if quiz.questions.is_empty() {
            warn!("⚠️ 题目文件中没有题目，程序结束");
            self.close().await;
            return Ok(());
        }
        if let Some(title) = &quiz.title {
            info!("📝 {}", title);
        }

        self.session.start().await;
        let report = self.session.send_all(&quiz.questions).await?;

        let results = self.session.final_answers().await;
        let unanswered = quiz
            .questions
            .iter()
            .filter(|q| !results.iter().any(|r| r.question_number == q.number))
            .count();

        let mut log = vec![format!(
            "{} 成功 {}/{}",
            report.id,
            report.success_count(),
            report.outcomes.len()
        )];
        for (provider, outcome) in &report.outcomes {
            log.push(format!("  [{}] {}", provider, outcome));
        }
        log.extend(results.iter().map(format_result));
        append_log(&self.config.output_log_file, &log.join("\n"))?;

        print_final_stats(&results, unanswered, &self.config.output_log_file);

        self.close().await;
        Ok(())
    }

    async fn close(self) {
        self.session.shutdown().await;
        self.listener.abort();
    }
}
