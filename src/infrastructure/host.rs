//! 宿主环境 - 基础设施层
//!
//! 浏览器窗口的创建、关闭、聚焦与查询。注册表只通过这个接口操作窗口，
//! 真实实现见 `browser::ChromiumHost`。

use async_trait::async_trait;

use crate::error::AppResult;
use crate::models::{ContextHandle, ProviderId, Rect, WindowHandle};

/// 新窗口的参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSpec {
    pub provider: ProviderId,
    pub url: String,
    pub bounds: Rect,
    /// 创建后是否立即聚焦
    pub focused: bool,
}

/// 已存在的窗口
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    pub window: WindowHandle,
    pub context: ContextHandle,
    pub url: String,
}

/// 宿主环境能力
///
/// 创建窗口时，宿主负责把对应 AI 的适配器挂到该上下文上（注册到消息总线），
/// 并在导航完成后发布 `NavigationComplete` 生命周期事件。
#[async_trait]
pub trait HostEnvironment: Send + Sync {
    /// 创建一个新窗口并导航到指定地址
    async fn create_window(&self, spec: &WindowSpec) -> AppResult<(WindowHandle, ContextHandle)>;

    /// 关闭窗口（窗口已不存在时视为成功）
    async fn close_window(&self, window: &WindowHandle) -> AppResult<()>;

    /// 把窗口切到前台
    async fn focus_window(&self, window: &WindowHandle) -> AppResult<()>;

    /// 把答题页面切到前台
    async fn focus_host_page(&self) -> AppResult<()>;

    /// 上下文当前的 URL，上下文已不存在时返回 None
    async fn context_url(&self, context: &ContextHandle) -> AppResult<Option<String>>;

    /// 窗口是否仍然存在
    async fn window_exists(&self, window: &WindowHandle) -> AppResult<bool>;

    /// 列出所有 AI 窗口（不含答题页面）
    async fn list_windows(&self) -> AppResult<Vec<WindowInfo>>;

    /// 主显示器的可用区域
    async fn work_area(&self) -> AppResult<Rect>;
}
