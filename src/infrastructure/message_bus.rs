//! 消息总线 - 基础设施层
//!
//! 调度端与各个 AI 上下文之间的异步通道：
//! - 请求 / 响应：发往某个上下文，响应可能为空
//! - 广播事件：答案、切换窗口请求、生命周期通知
//!
//! 广播是有损的：订阅者处理太慢时会丢失旧事件。

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};

use crate::error::{AppResult, BusError};
use crate::models::{BusEvent, BusRequest, BusResponse, ContextHandle};

const EVENT_CAPACITY: usize = 256;

/// 上下文一侧的请求处理者
#[async_trait]
pub trait ContextEndpoint: Send + Sync {
    async fn handle(&self, request: BusRequest) -> Option<BusResponse>;
}

/// 消息总线
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// 向某个上下文发送请求
    async fn request(
        &self,
        context: &ContextHandle,
        request: BusRequest,
    ) -> AppResult<Option<BusResponse>>;

    /// 广播事件（没有订阅者时直接丢弃）
    fn publish(&self, event: BusEvent);

    /// 订阅广播事件
    fn subscribe(&self) -> broadcast::Receiver<BusEvent>;
}

/// 只能发布事件的句柄
///
/// 适配器持有它来发出答案，避免反向持有整个总线。
#[derive(Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<BusEvent>,
}

impl EventPublisher {
    pub fn publish(&self, event: BusEvent) {
        if self.sender.send(event).is_err() {
            debug!("没有事件订阅者，事件已丢弃");
        }
    }
}

/// 进程内的消息总线实现
pub struct LocalBus {
    endpoints: RwLock<HashMap<ContextHandle, Arc<dyn ContextEndpoint>>>,
    events: broadcast::Sender<BusEvent>,
    request_timeout: Duration,
}

impl LocalBus {
    pub fn new(request_timeout: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            endpoints: RwLock::new(HashMap::new()),
            events,
            request_timeout,
        }
    }

    /// 为上下文注册处理者（同一上下文重复注册时替换）
    pub async fn register(&self, context: ContextHandle, endpoint: Arc<dyn ContextEndpoint>) {
        debug!("注册上下文 {}", context);
        self.endpoints.write().await.insert(context, endpoint);
    }

    pub async fn unregister(&self, context: &ContextHandle) {
        if self.endpoints.write().await.remove(context).is_some() {
            debug!("注销上下文 {}", context);
        }
    }

    pub async fn is_registered(&self, context: &ContextHandle) -> bool {
        self.endpoints.read().await.contains_key(context)
    }

    pub fn publisher(&self) -> EventPublisher {
        EventPublisher {
            sender: self.events.clone(),
        }
    }
}

#[async_trait]
impl MessageBus for LocalBus {
    async fn request(
        &self,
        context: &ContextHandle,
        request: BusRequest,
    ) -> AppResult<Option<BusResponse>> {
        let endpoint = self.endpoints.read().await.get(context).cloned();
        let Some(endpoint) = endpoint else {
            return Err(BusError::NoReceiver {
                context: context.to_string(),
            }
            .into());
        };

        match tokio::time::timeout(self.request_timeout, endpoint.handle(request)).await {
            Ok(response) => Ok(response),
            Err(_) => {
                warn!("⚠️ 请求上下文 {} 超时", context);
                Err(BusError::Timeout {
                    context: context.to_string(),
                    millis: self.request_timeout.as_millis() as u64,
                }
                .into())
            }
        }
    }

    fn publish(&self, event: BusEvent) {
        self.publisher().publish(event);
    }

    fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.events.subscribe()
    }
}
