//! 基于 Chromium DevTools 协议的宿主环境
//!
//! 每个 AI 一个独立窗口，窗口句柄和上下文句柄都使用 CDP 的 target id。
//! 创建窗口时把对应 AI 的适配器注册到消息总线，并把浏览器事件翻译成生命周期通知。

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::browser::{
    Bounds, GetWindowForTargetParams, SetWindowBoundsParams, WindowState,
};
use chromiumoxide::cdp::browser_protocol::page::EventFrameNavigated;
use chromiumoxide::cdp::browser_protocol::target::{CreateTargetParams, EventTargetDestroyed};
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult, BrowserError};
use crate::infrastructure::{
    HostEnvironment, JsExecutor, LocalBus, MessageBus, WindowInfo, WindowSpec,
};
use crate::models::{BusEvent, ContextHandle, LifecycleEvent, Rect, WindowHandle};
use crate::services::dom_scripts::WORK_AREA_SCRIPT;
use crate::services::DomStrategy;
use crate::workflow::{ProviderAdapter, ProviderContext};

type PageMap = Arc<RwLock<HashMap<WindowHandle, Page>>>;

pub struct ChromiumHost {
    browser: Arc<Browser>,
    host_page: Page,
    bus: Arc<LocalBus>,
    pages: PageMap,
}

fn handle_of(page: &Page) -> String {
    page.target_id().inner().clone()
}

impl ChromiumHost {
    pub fn new(browser: Arc<Browser>, host_page: Page, bus: Arc<LocalBus>) -> Self {
        Self {
            browser,
            host_page,
            bus,
            pages: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// 监听浏览器事件并发布生命周期通知
    ///
    /// - target 销毁：答题页面 → `HostPageClosed`，AI 窗口 → `ContextClosed` + `WindowClosed`
    /// - 答题页面主框架重新导航 → `HostPageReloaded`
    pub async fn spawn_event_listener(&self) -> AppResult<JoinHandle<()>> {
        let mut destroyed = self
            .browser
            .event_listener::<EventTargetDestroyed>()
            .await?;
        let mut navigated = self
            .host_page
            .event_listener::<EventFrameNavigated>()
            .await?;

        let bus = self.bus.clone();
        let pages = self.pages.clone();
        let host_id = handle_of(&self.host_page);

        Ok(tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = destroyed.next() => {
                        let Some(event) = event else { break };
                        let id = event.target_id.inner().clone();
                        if id == host_id {
                            warn!("⚠️ 答题页面已关闭");
                            bus.publish(BusEvent::Lifecycle(LifecycleEvent::HostPageClosed));
                            continue;
                        }

                        let window = WindowHandle(id.clone());
                        if pages.write().await.remove(&window).is_none() {
                            continue;
                        }
                        let context = ContextHandle(id);
                        bus.unregister(&context).await;
                        debug!("窗口 {} 已销毁", window);
                        bus.publish(BusEvent::Lifecycle(LifecycleEvent::ContextClosed { context }));
                        bus.publish(BusEvent::Lifecycle(LifecycleEvent::WindowClosed { window }));
                    }
                    event = navigated.next() => {
                        let Some(event) = event else { break };
                        if event.frame.parent_id.is_none() {
                            info!("答题页面已重新加载: {}", event.frame.url);
                            bus.publish(BusEvent::Lifecycle(LifecycleEvent::HostPageReloaded));
                        }
                    }
                }
            }
            debug!("浏览器事件监听结束");
        }))
    }

    async fn set_bounds(&self, page: &Page, bounds: Rect) -> AppResult<()> {
        let window = page
            .execute(GetWindowForTargetParams {
                target_id: Some(page.target_id().clone()),
            })
            .await?;

        let bounds = Bounds {
            left: Some(bounds.left as i64),
            top: Some(bounds.top as i64),
            width: Some(bounds.width as i64),
            height: Some(bounds.height as i64),
            window_state: Some(WindowState::Normal),
        };
        page.execute(SetWindowBoundsParams::new(window.result.window_id, bounds))
            .await?;
        Ok(())
    }

    /// 按句柄找页面，也包括本次运行之前打开的窗口
    async fn find_page(&self, window: &WindowHandle) -> AppResult<Option<Page>> {
        if let Some(page) = self.pages.read().await.get(window) {
            return Ok(Some(page.clone()));
        }
        let pages = self.browser.pages().await?;
        Ok(pages.into_iter().find(|p| handle_of(p) == window.0))
    }
}

#[async_trait]
impl HostEnvironment for ChromiumHost {
    async fn create_window(&self, spec: &WindowSpec) -> AppResult<(WindowHandle, ContextHandle)> {
        let mut params = CreateTargetParams::new("about:blank");
        params.new_window = Some(true);
        let page = self
            .browser
            .new_page(params)
            .await
            .map_err(|e| BrowserError::WindowCreationFailed(e.to_string()))?;

        let id = handle_of(&page);
        let window = WindowHandle(id.clone());
        let context = ContextHandle(id);

        if let Err(e) = self.set_bounds(&page, spec.bounds).await {
            debug!("[{}] 设置窗口位置失败: {}", spec.provider, e);
        }
        if spec.focused {
            if let Err(e) = page.bring_to_front().await {
                debug!("[{}] 聚焦新窗口失败: {}", spec.provider, e);
            }
        }

        // 把适配器挂到新上下文上
        let runner = Arc::new(JsExecutor::new(page.clone()));
        let strategy = Arc::new(DomStrategy::for_provider(spec.provider, runner));
        let endpoint = ProviderContext::new(
            Arc::new(ProviderAdapter::new(strategy)),
            self.bus.publisher(),
        );
        self.bus.register(context.clone(), Arc::new(endpoint)).await;
        self.pages.write().await.insert(window.clone(), page.clone());
        self.bus.publish(BusEvent::Lifecycle(LifecycleEvent::ContextCreated {
            context: context.clone(),
        }));

        if let Err(e) = page.goto(spec.url.as_str()).await {
            let _ = self.close_window(&window).await;
            return Err(BrowserError::NavigationFailed {
                url: spec.url.clone(),
                reason: e.to_string(),
            }
            .into());
        }

        let url = page.url().await?.unwrap_or_else(|| spec.url.clone());
        self.bus.publish(BusEvent::Lifecycle(LifecycleEvent::NavigationComplete {
            context: context.clone(),
            url,
        }));

        Ok((window, context))
    }

    async fn close_window(&self, window: &WindowHandle) -> AppResult<()> {
        let page = self.find_page(window).await?;
        self.pages.write().await.remove(window);
        self.bus.unregister(&ContextHandle(window.0.clone())).await;

        if let Some(page) = page {
            page.close().await?;
        }
        Ok(())
    }

    async fn focus_window(&self, window: &WindowHandle) -> AppResult<()> {
        let page = self
            .find_page(window)
            .await?
            .ok_or_else(|| AppError::Other(format!("窗口 {} 不存在", window)))?;
        page.bring_to_front().await?;
        Ok(())
    }

    async fn focus_host_page(&self) -> AppResult<()> {
        self.host_page.bring_to_front().await?;
        Ok(())
    }

    async fn context_url(&self, context: &ContextHandle) -> AppResult<Option<String>> {
        let page = self.pages.read().await.get(&WindowHandle(context.0.clone())).cloned();
        match page {
            Some(page) => Ok(page.url().await?),
            None => Ok(None),
        }
    }

    async fn window_exists(&self, window: &WindowHandle) -> AppResult<bool> {
        Ok(self.pages.read().await.contains_key(window))
    }

    async fn list_windows(&self) -> AppResult<Vec<WindowInfo>> {
        let host_id = handle_of(&self.host_page);
        let mut windows = Vec::new();
        for page in self.browser.pages().await? {
            let id = handle_of(&page);
            if id == host_id {
                continue;
            }
            let url = page.url().await?.unwrap_or_default();
            windows.push(WindowInfo {
                window: WindowHandle(id.clone()),
                context: ContextHandle(id),
                url,
            });
        }
        Ok(windows)
    }

    async fn work_area(&self) -> AppResult<Rect> {
        JsExecutor::new(self.host_page.clone())
            .eval_as(WORK_AREA_SCRIPT)
            .await
    }
}
