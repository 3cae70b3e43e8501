use thiserror::Error;

use crate::models::ProviderId;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 自动化目标（窗口 + 上下文）错误
    #[error("目标错误: {0}")]
    Target(#[from] TargetError),
    /// 提交问题错误
    #[error("提交错误: {0}")]
    Submission(#[from] SubmissionError),
    /// 消息总线错误
    #[error("消息总线错误: {0}")]
    Bus(#[from] BusError),
    /// 浏览器相关错误
    #[error("浏览器错误: {0}")]
    Browser(#[from] BrowserError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 页面脚本返回了无法解析的结果
    #[error("脚本结果解析失败: {0}")]
    Script(#[from] serde_json::Error),
    /// 其他错误
    #[error("错误: {0}")]
    Other(String),
}

/// 自动化目标错误
#[derive(Debug, Error)]
pub enum TargetError {
    /// 窗口创建失败或握手超出轮询上限
    #[error("[{provider}] 目标不可用: {reason}")]
    TargetUnavailable { provider: ProviderId, reason: String },
    /// 目标窗口在操作过程中被关闭
    #[error("[{provider}] 目标窗口已关闭")]
    Closed { provider: ProviderId },
    /// 目标不存在
    #[error("[{provider}] 未找到目标")]
    NotFound { provider: ProviderId },
}

/// 提交问题错误
#[derive(Debug, Error)]
pub enum SubmissionError {
    /// 适配器已有进行中的问题
    #[error("[{provider}] 正在回答上一个问题")]
    AdapterBusy { provider: ProviderId },
    /// 找不到输入框
    #[error("[{provider}] 找不到输入框")]
    InputNotFound { provider: ProviderId },
    /// 页面尚未就绪
    #[error("[{provider}] 页面未就绪")]
    NotReady { provider: ProviderId },
    /// 适配器拒绝了请求
    #[error("[{provider}] 请求被拒绝: {reason}")]
    Rejected { provider: ProviderId, reason: String },
}

/// 消息总线错误
#[derive(Debug, Error)]
pub enum BusError {
    /// 上下文没有注册接收者
    #[error("上下文 {context} 没有接收者")]
    NoReceiver { context: String },
    /// 请求超时
    #[error("请求上下文 {context} 超时 ({millis}ms)")]
    Timeout { context: String, millis: u64 },
}

/// 浏览器相关错误
#[derive(Debug, Error)]
pub enum BrowserError {
    /// 连接浏览器失败
    #[error("无法连接到浏览器 (端口: {port}): {reason}")]
    ConnectionFailed { port: u16, reason: String },
    /// 创建窗口失败
    #[error("创建窗口失败: {0}")]
    WindowCreationFailed(String),
    /// 导航失败
    #[error("导航到 {url} 失败: {reason}")]
    NavigationFailed { url: String, reason: String },
    /// CDP 调用失败
    #[error("CDP 调用失败: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 未知的 AI 标识
    #[error("未知的 AI: {0}")]
    UnknownProvider(String),
    /// 不能把未启用的 AI 设为权重 AI
    #[error("{0} 未启用，不能设为权重 AI")]
    FavoriteDisabled(ProviderId),
    /// 读取配置文件失败
    #[error("读取配置文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 写入配置文件失败
    #[error("写入配置文件失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {reason}")]
    TomlParseFailed { path: String, reason: String },
}

impl From<chromiumoxide::error::CdpError> for AppError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        AppError::Browser(BrowserError::Cdp(err))
    }
}

impl AppError {
    /// 创建目标不可用错误
    pub fn target_unavailable(provider: ProviderId, reason: impl Into<String>) -> Self {
        AppError::Target(TargetError::TargetUnavailable {
            provider,
            reason: reason.into(),
        })
    }

    /// 是否属于目标不可用（需要重建窗口）
    pub fn is_target_unavailable(&self) -> bool {
        matches!(
            self,
            AppError::Target(TargetError::TargetUnavailable { .. }) | AppError::Bus(_)
        )
    }
}

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
