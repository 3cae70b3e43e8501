use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::models::{AnswerTemplate, ChatStrategy, ProviderConfig, ProviderRoster, RunMode};

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// 浏览器调试端口
    pub browser_debug_port: u16,
    /// 答题页面 URL
    pub host_page_url: String,
    /// 用户设置文件（AI 开关、权重、运行模式、回答模板）
    pub settings_file: String,
    /// 题目文件
    pub quiz_file: String,
    /// 输出日志文件
    pub output_log_file: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 单个批次的最长等待时间（秒）
    pub batch_timeout_secs: u64,
    /// 握手轮询间隔（毫秒）
    pub handshake_interval_ms: u64,
    /// 握手最大轮询次数
    pub handshake_max_polls: u32,
    /// 等待新窗口导航完成的最长时间（秒）
    pub navigation_timeout_secs: u64,
    /// 焦点闪切间隔（毫秒）
    pub flicker_interval_ms: u64,
    /// 每次闪切在 AI 窗口上停留的时间（毫秒）
    pub flicker_dwell_ms: u64,
    /// 发送问题的最大尝试次数
    pub send_attempts: u32,
    /// 发送失败后的重试间隔（毫秒）
    pub send_retry_delay_ms: u64,
    /// 消息总线请求超时（毫秒）
    pub bus_request_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            browser_debug_port: 9222,
            host_page_url: "about:blank".to_string(),
            settings_file: "quiz_settings.toml".to_string(),
            quiz_file: "quiz.toml".to_string(),
            output_log_file: "output.txt".to_string(),
            verbose_logging: false,
            batch_timeout_secs: 180,
            handshake_interval_ms: 1000,
            handshake_max_polls: 30,
            navigation_timeout_secs: 30,
            flicker_interval_ms: 2000,
            flicker_dwell_ms: 100,
            send_attempts: 3,
            send_retry_delay_ms: 2000,
            bus_request_timeout_ms: 5000,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            browser_debug_port: env_parse("BROWSER_DEBUG_PORT", default.browser_debug_port),
            host_page_url: std::env::var("HOST_PAGE_URL").unwrap_or(default.host_page_url),
            settings_file: std::env::var("SETTINGS_FILE").unwrap_or(default.settings_file),
            quiz_file: std::env::var("QUIZ_FILE").unwrap_or(default.quiz_file),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
            verbose_logging: env_parse("VERBOSE_LOGGING", default.verbose_logging),
            batch_timeout_secs: env_parse("BATCH_TIMEOUT_SECS", default.batch_timeout_secs),
            handshake_interval_ms: env_parse("HANDSHAKE_INTERVAL_MS", default.handshake_interval_ms),
            handshake_max_polls: env_parse("HANDSHAKE_MAX_POLLS", default.handshake_max_polls),
            navigation_timeout_secs: env_parse("NAVIGATION_TIMEOUT_SECS", default.navigation_timeout_secs),
            flicker_interval_ms: env_parse("FLICKER_INTERVAL_MS", default.flicker_interval_ms),
            flicker_dwell_ms: env_parse("FLICKER_DWELL_MS", default.flicker_dwell_ms),
            send_attempts: env_parse("SEND_ATTEMPTS", default.send_attempts),
            send_retry_delay_ms: env_parse("SEND_RETRY_DELAY_MS", default.send_retry_delay_ms),
            bus_request_timeout_ms: env_parse("BUS_REQUEST_TIMEOUT_MS", default.bus_request_timeout_ms),
        }
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout_secs)
    }

    pub fn handshake_interval(&self) -> Duration {
        Duration::from_millis(self.handshake_interval_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn flicker_interval(&self) -> Duration {
        Duration::from_millis(self.flicker_interval_ms)
    }

    pub fn flicker_dwell(&self) -> Duration {
        Duration::from_millis(self.flicker_dwell_ms)
    }

    pub fn send_retry_delay(&self) -> Duration {
        Duration::from_millis(self.send_retry_delay_ms)
    }

    pub fn bus_request_timeout(&self) -> Duration {
        Duration::from_millis(self.bus_request_timeout_ms)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// 用户设置（会话开始时读取，用户修改时写回）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSettings {
    #[serde(default)]
    pub run_mode: RunMode,
    #[serde(default)]
    pub chat_strategy: ChatStrategy,
    #[serde(default)]
    pub answer_template: AnswerTemplate,
    /// 自定义提示词，为空时使用回答模板自带的提示词
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_prompt: Option<String>,
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderConfig>,
}

fn default_providers() -> Vec<ProviderConfig> {
    ProviderRoster::default().into_configs()
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            run_mode: RunMode::default(),
            chat_strategy: ChatStrategy::default(),
            answer_template: AnswerTemplate::default(),
            custom_prompt: None,
            providers: default_providers(),
        }
    }
}

impl SessionSettings {
    /// 当前生效的提示词
    pub fn prompt(&self) -> &str {
        match self.custom_prompt.as_deref() {
            Some(prompt) if !prompt.trim().is_empty() => prompt,
            _ => self.answer_template.prompt(),
        }
    }

    /// 构建 AI 配置集合（同时修复权重约束）
    pub fn roster(&self) -> ProviderRoster {
        ProviderRoster::from_configs(self.providers.clone())
    }

    pub fn set_roster(&mut self, roster: &ProviderRoster) {
        self.providers = roster.configs().to_vec();
    }
}

/// 用户设置的持久化
pub trait SettingsStore: Send + Sync {
    fn load(&self) -> Result<SessionSettings, ConfigError>;
    fn save(&self, settings: &SessionSettings) -> Result<(), ConfigError>;
}

/// 基于 TOML 文件的设置存储
#[derive(Debug, Clone)]
pub struct TomlSettingsStore {
    path: PathBuf,
}

impl TomlSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn display_path(&self) -> String {
        self.path.display().to_string()
    }
}

impl SettingsStore for TomlSettingsStore {
    fn load(&self) -> Result<SessionSettings, ConfigError> {
        if !self.path.exists() {
            debug!("设置文件 {} 不存在，使用默认设置", self.path.display());
            return Ok(SessionSettings::default());
        }

        let content = std::fs::read_to_string(&self.path).map_err(|source| {
            ConfigError::ReadFailed {
                path: self.display_path(),
                source,
            }
        })?;

        let mut settings: SessionSettings =
            toml::from_str(&content).map_err(|e| ConfigError::TomlParseFailed {
                path: self.display_path(),
                reason: e.to_string(),
            })?;

        let repaired = settings.roster();
        if repaired.configs() != settings.providers.as_slice() {
            warn!("⚠️ 设置文件中的 AI 配置不满足约束，已自动修复");
            settings.set_roster(&repaired);
        }

        Ok(settings)
    }

    fn save(&self, settings: &SessionSettings) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(settings).map_err(|e| ConfigError::TomlParseFailed {
                path: self.display_path(),
                reason: e.to_string(),
            })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::WriteFailed {
                path: self.display_path(),
                source,
            })?;
        }

        std::fs::write(&self.path, content).map_err(|source| ConfigError::WriteFailed {
            path: self.display_path(),
            source,
        })?;
        debug!("设置已保存到 {}", self.path.display());
        Ok(())
    }
}
