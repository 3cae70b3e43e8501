//! 自动化目标注册表 - 编排层
//!
//! ## 职责
//!
//! 每个 AI 最多一个存活的目标（窗口 + 上下文），按 AI 标识保存。
//! 所有修改都经过 `ensure_target` 和失效方法，其他模块只读取。
//!
//! ## 创建流程
//!
//! 1. 关闭其他指向同一 AI 域名的窗口
//! 2. 按本批次的 AI 数量计算不重叠的窗口位置
//! 3. 创建窗口（创建和握手期间窗口在前台）
//! 4. 等待导航完成，然后轮询 `CHECK_READY` 直到就绪或达到上限

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, TargetError};
use crate::infrastructure::{HostEnvironment, MessageBus, WindowSpec};
use crate::models::{
    AutomationTarget, BusEvent, BusRequest, BusResponse, ContextHandle, LifecycleEvent,
    ProviderId, Rect, TargetState,
};
use crate::orchestrator::layout;

/// 取不到可用区域时使用的屏幕大小
const FALLBACK_WORK_AREA: Rect = Rect {
    left: 0,
    top: 0,
    width: 1920,
    height: 1080,
};

/// 注册表参数
#[derive(Debug, Clone, Copy)]
pub struct RegistryOptions {
    pub handshake_interval: Duration,
    pub handshake_max_polls: u32,
    pub navigation_timeout: Duration,
}

impl RegistryOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            handshake_interval: config.handshake_interval(),
            handshake_max_polls: config.handshake_max_polls,
            navigation_timeout: config.navigation_timeout(),
        }
    }
}

/// 自动化目标注册表
pub struct TargetRegistry {
    host: Arc<dyn HostEnvironment>,
    bus: Arc<dyn MessageBus>,
    options: RegistryOptions,
    targets: Mutex<HashMap<ProviderId, AutomationTarget>>,
    /// 同一个 AI 的创建过程串行执行
    launch_locks: Mutex<HashMap<ProviderId, Arc<Mutex<()>>>>,
}

impl TargetRegistry {
    pub fn new(
        host: Arc<dyn HostEnvironment>,
        bus: Arc<dyn MessageBus>,
        options: RegistryOptions,
    ) -> Self {
        Self {
            host,
            bus,
            options,
            targets: Mutex::new(HashMap::new()),
            launch_locks: Mutex::new(HashMap::new()),
        }
    }

    /// 当前保存的目标
    pub async fn target(&self, provider: ProviderId) -> Option<AutomationTarget> {
        self.targets.lock().await.get(&provider).cloned()
    }

    pub async fn state(&self, provider: ProviderId) -> TargetState {
        self.target(provider)
            .await
            .map(|t| t.state)
            .unwrap_or_default()
    }

    /// 所有处于回答中的目标
    pub async fn busy_targets(&self) -> Vec<AutomationTarget> {
        let mut busy: Vec<AutomationTarget> = self
            .targets
            .lock()
            .await
            .values()
            .filter(|t| t.state == TargetState::Busy)
            .cloned()
            .collect();
        busy.sort_by_key(|t| t.provider);
        busy
    }

    /// 获取可用的目标，必要时重新握手或重新创建
    ///
    /// `slot` / `slot_count` 决定新窗口在网格中的位置。
    pub async fn ensure_target(
        &self,
        provider: ProviderId,
        slot: usize,
        slot_count: usize,
    ) -> AppResult<AutomationTarget> {
        let lock = self.launch_lock(provider).await;
        let _launching = lock.lock().await;

        if let Some(target) = self.target(provider).await {
            if self.is_alive(&target).await {
                if target.state.is_usable() {
                    debug!("[{}] 复用已有窗口", provider);
                    return Ok(target);
                }

                debug!("[{}] 窗口状态为 {:?}，重新握手", provider, target.state);
                if self.handshake(&target).await.is_ok() {
                    self.set_state(provider, TargetState::Ready).await;
                    return Ok(AutomationTarget {
                        state: TargetState::Ready,
                        ..target
                    });
                }
                warn!("[{}] ⚠️ 重新握手失败，重建窗口", provider);
            } else {
                info!("[{}] 窗口已失效，重新创建", provider);
            }
            self.targets.lock().await.remove(&provider);
            let _ = self.host.close_window(&target.window).await;
        }

        self.launch(provider, slot, slot_count).await
    }

    async fn launch_lock(&self, provider: ProviderId) -> Arc<Mutex<()>> {
        self.launch_locks
            .lock()
            .await
            .entry(provider)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// 窗口和上下文都还在，并且仍然停留在该 AI 的域名下
    async fn is_alive(&self, target: &AutomationTarget) -> bool {
        if !self.host.window_exists(&target.window).await.unwrap_or(false) {
            return false;
        }
        match self.host.context_url(&target.context).await {
            Ok(Some(url)) => target.provider.owns_url(&url),
            _ => false,
        }
    }

    async fn launch(
        &self,
        provider: ProviderId,
        slot: usize,
        slot_count: usize,
    ) -> AppResult<AutomationTarget> {
        self.close_duplicates(provider).await;

        let area = match self.host.work_area().await {
            Ok(area) if area.width > 0 && area.height > 0 => area,
            Ok(_) | Err(_) => {
                debug!("无法获取屏幕可用区域，使用默认大小");
                FALLBACK_WORK_AREA
            }
        };
        let spec = WindowSpec {
            provider,
            url: provider.endpoint().to_string(),
            bounds: layout::tile(area, slot_count.max(1), slot),
            focused: true,
        };

        // 先订阅，避免错过创建过程中发布的导航完成事件
        let mut events = self.bus.subscribe();

        info!("[{}] 🪟 创建窗口: {}", provider, spec.url);
        let (window, context) = self
            .host
            .create_window(&spec)
            .await
            .map_err(|e| AppError::target_unavailable(provider, e.to_string()))?;

        let mut target = AutomationTarget::new(provider, window, context);
        self.targets.lock().await.insert(provider, target.clone());

        if !self.wait_for_navigation(&mut events, &target.context).await {
            warn!("[{}] ⚠️ 未等到导航完成通知，直接开始握手", provider);
        }
        if let Err(e) = self.host.focus_window(&target.window).await {
            debug!("[{}] 聚焦新窗口失败: {}", provider, e);
        }

        match self.handshake(&target).await {
            Ok(()) => {
                info!("[{}] ✓ 窗口已就绪", provider);
                target.state = TargetState::Ready;
                self.set_state(provider, TargetState::Ready).await;
                Ok(target)
            }
            Err(e) => {
                self.set_state(provider, TargetState::Stale).await;
                Err(e)
            }
        }
    }

    /// 关闭其他指向同一 AI 的窗口，避免重复会话
    async fn close_duplicates(&self, provider: ProviderId) {
        let windows = match self.host.list_windows().await {
            Ok(windows) => windows,
            Err(e) => {
                debug!("列出窗口失败: {}", e);
                return;
            }
        };

        for info in windows.into_iter().filter(|w| provider.owns_url(&w.url)) {
            info!("[{}] 关闭重复窗口 {}", provider, info.window);
            if let Err(e) = self.host.close_window(&info.window).await {
                warn!("[{}] ⚠️ 关闭重复窗口失败: {}", provider, e);
            }
        }
    }

    async fn wait_for_navigation(
        &self,
        events: &mut broadcast::Receiver<BusEvent>,
        context: &ContextHandle,
    ) -> bool {
        let wait = async {
            loop {
                match events.recv().await {
                    Ok(BusEvent::Lifecycle(LifecycleEvent::NavigationComplete {
                        context: navigated,
                        ..
                    })) if navigated == *context => return true,
                    Ok(_) | Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => return false,
                }
            }
        };
        timeout(self.options.navigation_timeout, wait)
            .await
            .unwrap_or(false)
    }

    /// 轮询 `CHECK_READY` 直到就绪
    async fn handshake(&self, target: &AutomationTarget) -> AppResult<()> {
        let max_polls = self.options.handshake_max_polls.max(1);
        for poll in 1..=max_polls {
            match self.bus.request(&target.context, BusRequest::CheckReady).await {
                Ok(Some(BusResponse::Ready { ready: true })) => {
                    debug!("[{}] 握手成功 (第 {} 次)", target.provider, poll);
                    return Ok(());
                }
                Ok(_) => debug!("[{}] 页面尚未就绪 (第 {} 次)", target.provider, poll),
                Err(e) => debug!("[{}] 握手失败 (第 {} 次): {}", target.provider, poll, e),
            }
            if poll < max_polls {
                sleep(self.options.handshake_interval).await;
            }
        }

        warn!("[{}] ❌ 握手 {} 次后仍未就绪", target.provider, max_polls);
        Err(AppError::target_unavailable(
            target.provider,
            format!("握手 {} 次后仍未就绪", max_polls),
        ))
    }

    async fn set_state(&self, provider: ProviderId, state: TargetState) {
        if let Some(target) = self.targets.lock().await.get_mut(&provider) {
            target.state = state;
        }
    }

    pub async fn mark_busy(&self, provider: ProviderId) {
        self.set_state(provider, TargetState::Busy).await;
    }

    pub async fn mark_ready(&self, provider: ProviderId) {
        self.set_state(provider, TargetState::Ready).await;
    }

    /// 收到答案说明页面已经空闲：回答中或失效的目标恢复为就绪
    pub async fn mark_answered(&self, provider: ProviderId) {
        if let Some(target) = self.targets.lock().await.get_mut(&provider) {
            if matches!(target.state, TargetState::Busy | TargetState::Stale) {
                debug!("[{}] 收到答案，目标恢复就绪", provider);
                target.state = TargetState::Ready;
            }
        }
    }

    /// 下次使用前需要重新验证
    pub async fn mark_stale(&self, provider: ProviderId) {
        self.set_state(provider, TargetState::Stale).await;
    }

    /// 处理宿主环境的生命周期通知
    ///
    /// 返回因此失效的 AI。
    pub async fn handle_lifecycle(&self, event: &LifecycleEvent) -> Vec<ProviderId> {
        match event {
            LifecycleEvent::ContextClosed { context } => {
                self.forget_where(|t| t.context == *context).await
            }
            LifecycleEvent::WindowClosed { window } => {
                self.forget_where(|t| t.window == *window).await
            }
            LifecycleEvent::HostPageClosed | LifecycleEvent::HostPageReloaded => {
                info!("答题页面已关闭或重新加载，关闭所有 AI 窗口");
                self.teardown_all().await
            }
            LifecycleEvent::ContextCreated { .. } | LifecycleEvent::NavigationComplete { .. } => {
                Vec::new()
            }
        }
    }

    async fn forget_where(&self, matches: impl Fn(&AutomationTarget) -> bool) -> Vec<ProviderId> {
        let mut targets = self.targets.lock().await;
        let gone: Vec<ProviderId> = targets
            .values()
            .filter(|t| matches(t))
            .map(|t| t.provider)
            .collect();
        for provider in &gone {
            targets.remove(provider);
            info!("[{}] 🚪 窗口已关闭", provider);
        }
        gone
    }

    /// 在后台持续处理生命周期通知
    pub fn spawn_lifecycle_watcher(self: &Arc<Self>) -> JoinHandle<()> {
        let registry = self.clone();
        let mut events = self.bus.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(BusEvent::Lifecycle(event)) => {
                        registry.handle_lifecycle(&event).await;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("⚠️ 生命周期监听落后，丢失 {} 条事件", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// 关闭并清除所有目标
    pub async fn teardown_all(&self) -> Vec<ProviderId> {
        let drained: Vec<AutomationTarget> =
            self.targets.lock().await.drain().map(|(_, t)| t).collect();

        let mut closed = Vec::with_capacity(drained.len());
        for target in drained {
            if let Err(e) = self.host.close_window(&target.window).await {
                warn!("[{}] ⚠️ 关闭窗口失败: {}", target.provider, e);
            }
            closed.push(target.provider);
        }
        closed.sort();
        closed
    }

    /// 把某个 AI 的窗口切到前台
    ///
    /// 目标不存在或窗口已失效时清除记录并返回 `NotFound`。
    pub async fn focus_target(&self, provider: ProviderId) -> AppResult<()> {
        let Some(target) = self.target(provider).await else {
            return Err(TargetError::NotFound { provider }.into());
        };

        if !self.host.window_exists(&target.window).await.unwrap_or(false) {
            self.targets.lock().await.remove(&provider);
            return Err(TargetError::NotFound { provider }.into());
        }

        self.host.focus_window(&target.window).await
    }

    /// 关闭某个 AI 的窗口
    pub async fn close_target(&self, provider: ProviderId) -> AppResult<()> {
        let removed = self.targets.lock().await.remove(&provider);
        if let Some(target) = removed {
            info!("[{}] 关闭窗口", provider);
            self.host.close_window(&target.window).await?;
        }
        Ok(())
    }
}
