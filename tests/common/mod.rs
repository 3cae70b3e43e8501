//! 不依赖浏览器的测试替身

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use quiz_consensus::config::{SessionSettings, SettingsStore};
use quiz_consensus::error::{AppError, AppResult, ConfigError};
use quiz_consensus::infrastructure::{
    ContextEndpoint, EventPublisher, HostEnvironment, LocalBus, MessageBus, WindowInfo,
    WindowSpec,
};
use quiz_consensus::models::{
    BusEvent, BusRequest, BusResponse, ContextHandle, LifecycleEvent, ProviderConfig, ProviderId,
    ProviderRoster, QuizQuestion, Rect, WindowHandle,
};
use quiz_consensus::orchestrator::{DispatchOptions, RegistryOptions};

/// AI 页面在测试中的表现
#[derive(Debug, Clone)]
pub enum Behavior {
    /// 接受问题，`delay` 之后发出答案
    Answer { text: String, delay: Duration },
    /// 接受问题，但永远不回答
    Silent,
    /// 拒绝问题
    Reject(String),
    /// 握手永远不就绪
    NeverReady,
    /// 窗口创建失败
    FailCreate,
}

pub fn answer(text: &str, delay_ms: u64) -> Behavior {
    Behavior::Answer {
        text: text.to_string(),
        delay: Duration::from_millis(delay_ms),
    }
}

/// 焦点记录
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Host,
    Window(ProviderId),
}

struct FakeEndpoint {
    provider: ProviderId,
    behavior: Behavior,
    publisher: EventPublisher,
}

#[async_trait]
impl ContextEndpoint for FakeEndpoint {
    async fn handle(&self, request: BusRequest) -> Option<BusResponse> {
        match request {
            BusRequest::CheckReady => Some(BusResponse::Ready {
                ready: !matches!(self.behavior, Behavior::NeverReady),
            }),
            BusRequest::AskQuestion { .. } => match &self.behavior {
                Behavior::Reject(reason) => Some(BusResponse::rejected(reason.clone())),
                Behavior::Answer { text, delay } => {
                    let publisher = self.publisher.clone();
                    let provider = self.provider;
                    let text = text.clone();
                    let delay = *delay;
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        publisher.publish(BusEvent::AnswerReady {
                            provider_id: provider,
                            answer: text,
                            timed_out: false,
                        });
                    });
                    Some(BusResponse::accepted())
                }
                _ => Some(BusResponse::accepted()),
            },
        }
    }
}

/// 内存中的宿主环境
pub struct FakeHost {
    bus: Arc<LocalBus>,
    behaviors: Mutex<HashMap<ProviderId, Behavior>>,
    create_delays: Mutex<HashMap<ProviderId, Duration>>,
    windows: Mutex<HashMap<WindowHandle, (ProviderId, String)>>,
    focus_log: Mutex<Vec<(Focus, Instant)>>,
    created: AtomicU64,
}

impl FakeHost {
    pub fn new(bus: Arc<LocalBus>) -> Arc<Self> {
        Arc::new(Self {
            bus,
            behaviors: Mutex::new(HashMap::new()),
            create_delays: Mutex::new(HashMap::new()),
            windows: Mutex::new(HashMap::new()),
            focus_log: Mutex::new(Vec::new()),
            created: AtomicU64::new(0),
        })
    }

    pub fn set_behavior(&self, provider: ProviderId, behavior: Behavior) {
        self.behaviors.lock().unwrap().insert(provider, behavior);
    }

    /// 创建窗口前等待一段时间（模拟打开很慢的页面）
    pub fn set_create_delay(&self, provider: ProviderId, delay: Duration) {
        self.create_delays.lock().unwrap().insert(provider, delay);
    }

    pub fn created_count(&self) -> u64 {
        self.created.load(Ordering::SeqCst)
    }

    pub fn open_windows(&self) -> Vec<ProviderId> {
        let mut open: Vec<ProviderId> = self
            .windows
            .lock()
            .unwrap()
            .values()
            .map(|(p, _)| *p)
            .collect();
        open.sort();
        open
    }

    pub fn focus_log(&self) -> Vec<(Focus, Instant)> {
        self.focus_log.lock().unwrap().clone()
    }

    /// 预先放一个指向某个 AI 的窗口（模拟上次运行留下的窗口）
    pub fn add_stray_window(&self, provider: ProviderId) -> WindowHandle {
        let handle = WindowHandle(format!("stray-{}", provider));
        self.windows
            .lock()
            .unwrap()
            .insert(handle.clone(), (provider, provider.endpoint().to_string()));
        handle
    }

    /// 模拟用户手动关闭某个 AI 的窗口
    pub async fn close_by_user(&self, provider: ProviderId) {
        let closed: Vec<WindowHandle> = {
            let mut windows = self.windows.lock().unwrap();
            let handles: Vec<WindowHandle> = windows
                .iter()
                .filter(|(_, (p, _))| *p == provider)
                .map(|(h, _)| h.clone())
                .collect();
            for handle in &handles {
                windows.remove(handle);
            }
            handles
        };

        for window in closed {
            let context = ContextHandle(window.0.clone());
            self.bus.unregister(&context).await;
            self.bus
                .publish(BusEvent::Lifecycle(LifecycleEvent::ContextClosed { context }));
            self.bus
                .publish(BusEvent::Lifecycle(LifecycleEvent::WindowClosed { window }));
        }
    }
}

#[async_trait]
impl HostEnvironment for FakeHost {
    async fn create_window(&self, spec: &WindowSpec) -> AppResult<(WindowHandle, ContextHandle)> {
        let delay = self.create_delays.lock().unwrap().get(&spec.provider).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let behavior = self
            .behaviors
            .lock()
            .unwrap()
            .get(&spec.provider)
            .cloned()
            .unwrap_or(Behavior::Silent);
        if matches!(behavior, Behavior::FailCreate) {
            return Err(AppError::Other("无法创建窗口".to_string()));
        }

        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("{}-{}", spec.provider, n);
        let window = WindowHandle(id.clone());
        let context = ContextHandle(id);

        self.windows
            .lock()
            .unwrap()
            .insert(window.clone(), (spec.provider, spec.url.clone()));
        if spec.focused {
            self.focus_log
                .lock()
                .unwrap()
                .push((Focus::Window(spec.provider), Instant::now()));
        }

        let endpoint = FakeEndpoint {
            provider: spec.provider,
            behavior,
            publisher: self.bus.publisher(),
        };
        self.bus.register(context.clone(), Arc::new(endpoint)).await;
        self.bus
            .publish(BusEvent::Lifecycle(LifecycleEvent::NavigationComplete {
                context: context.clone(),
                url: spec.url.clone(),
            }));

        Ok((window, context))
    }

    async fn close_window(&self, window: &WindowHandle) -> AppResult<()> {
        self.windows.lock().unwrap().remove(window);
        self.bus.unregister(&ContextHandle(window.0.clone())).await;
        Ok(())
    }

    async fn focus_window(&self, window: &WindowHandle) -> AppResult<()> {
        let provider = self
            .windows
            .lock()
            .unwrap()
            .get(window)
            .map(|(p, _)| *p)
            .ok_or_else(|| AppError::Other(format!("窗口 {} 不存在", window)))?;
        self.focus_log
            .lock()
            .unwrap()
            .push((Focus::Window(provider), Instant::now()));
        Ok(())
    }

    async fn focus_host_page(&self) -> AppResult<()> {
        self.focus_log
            .lock()
            .unwrap()
            .push((Focus::Host, Instant::now()));
        Ok(())
    }

    async fn context_url(&self, context: &ContextHandle) -> AppResult<Option<String>> {
        Ok(self
            .windows
            .lock()
            .unwrap()
            .get(&WindowHandle(context.0.clone()))
            .map(|(_, url)| url.clone()))
    }

    async fn window_exists(&self, window: &WindowHandle) -> AppResult<bool> {
        Ok(self.windows.lock().unwrap().contains_key(window))
    }

    async fn list_windows(&self) -> AppResult<Vec<WindowInfo>> {
        Ok(self
            .windows
            .lock()
            .unwrap()
            .iter()
            .map(|(window, (_, url))| WindowInfo {
                window: window.clone(),
                context: ContextHandle(window.0.clone()),
                url: url.clone(),
            })
            .collect())
    }

    async fn work_area(&self) -> AppResult<Rect> {
        Ok(Rect::new(0, 0, 1920, 1080))
    }
}

/// 内存中的设置存储
#[derive(Default)]
pub struct MemoryStore {
    pub settings: Mutex<SessionSettings>,
    pub saves: AtomicU64,
}

impl MemoryStore {
    pub fn with_settings(settings: SessionSettings) -> Arc<Self> {
        Arc::new(Self {
            settings: Mutex::new(settings),
            saves: AtomicU64::new(0),
        })
    }
}

impl SettingsStore for MemoryStore {
    fn load(&self) -> Result<SessionSettings, ConfigError> {
        Ok(self.settings.lock().unwrap().clone())
    }

    fn save(&self, settings: &SessionSettings) -> Result<(), ConfigError> {
        *self.settings.lock().unwrap() = settings.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// 只启用给定 AI 的设置，权重大于 1 的为权重 AI
pub fn settings_with(providers: &[(ProviderId, u32)]) -> SessionSettings {
    let configs = providers
        .iter()
        .map(|&(id, weight)| ProviderConfig {
            weight,
            ..ProviderConfig::new(id, true)
        })
        .collect();
    let mut settings = SessionSettings::default();
    settings.set_roster(&ProviderRoster::from_configs(configs));
    settings
}

pub fn registry_options() -> RegistryOptions {
    RegistryOptions {
        handshake_interval: Duration::from_millis(100),
        handshake_max_polls: 3,
        navigation_timeout: Duration::from_secs(1),
    }
}

pub fn dispatch_options() -> DispatchOptions {
    DispatchOptions {
        hard_timeout: Duration::from_secs(10),
        flicker_interval: Duration::from_millis(500),
        flicker_dwell: Duration::from_millis(10),
        send_attempts: 2,
        send_retry_delay: Duration::from_millis(100),
    }
}

pub fn question(number: u32, content: &str) -> QuizQuestion {
    QuizQuestion {
        number,
        type_label: "单选题".to_string(),
        content: content.to_string(),
        options: vec!["A. 甲".into(), "B. 乙".into(), "C. 丙".into()],
        blank_count: 0,
    }
}

pub fn new_bus() -> Arc<LocalBus> {
    Arc::new(LocalBus::new(Duration::from_secs(5)))
}

/// 让出执行权，等后台任务处理完已到达的事件
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

pub fn as_bus(bus: &Arc<LocalBus>) -> Arc<dyn MessageBus> {
    bus.clone()
}
