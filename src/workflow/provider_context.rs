//! AI 上下文一侧的消息处理
//!
//! 挂在每个 AI 窗口上，回应握手与提问请求。
//! 提问请求在提交后立即应答，回答完成后通过广播发出 `AnswerReady`。

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::infrastructure::{ContextEndpoint, EventPublisher};
use crate::models::{BusEvent, BusRequest, BusResponse};
use crate::services::normalize_answer;
use crate::workflow::question_flow::ProviderAdapter;

pub struct ProviderContext {
    adapter: Arc<ProviderAdapter>,
    publisher: EventPublisher,
}

impl ProviderContext {
    pub fn new(adapter: Arc<ProviderAdapter>, publisher: EventPublisher) -> Self {
        Self { adapter, publisher }
    }

    pub fn adapter(&self) -> &Arc<ProviderAdapter> {
        &self.adapter
    }
}

#[async_trait]
impl ContextEndpoint for ProviderContext {
    async fn handle(&self, request: BusRequest) -> Option<BusResponse> {
        match request {
            BusRequest::CheckReady => Some(BusResponse::Ready {
                ready: self.adapter.is_ready().await,
            }),
            BusRequest::AskQuestion { question } => {
                let run = match self.adapter.begin(&question).await {
                    Ok(run) => run,
                    Err(e) => {
                        warn!("[{}] ⛔ 拒绝提问: {}", self.adapter.provider(), e);
                        return Some(BusResponse::rejected(e.to_string()));
                    }
                };

                let adapter = self.adapter.clone();
                let publisher = self.publisher.clone();
                tokio::spawn(async move {
                    let report = adapter.await_completion(run).await;
                    debug!(
                        "[{}] 发出答案 ({} 字, 超时: {})",
                        report.provider,
                        report.content.chars().count(),
                        report.timed_out
                    );
                    // 超时或空内容也要发出，让调度端能结束这个 AI 的等待
                    publisher.publish(BusEvent::AnswerReady {
                        provider_id: report.provider,
                        answer: normalize_answer(&report.content),
                        timed_out: report.timed_out,
                    });
                });

                Some(BusResponse::accepted())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::{LocalBus, MessageBus};
    use crate::models::{ContextHandle, ProviderId};
    use crate::workflow::question_flow::tests::{frame, ScriptedStrategy};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_ask_is_acknowledged_then_answer_published() {
        let bus = LocalBus::new(Duration::from_secs(5));
        let mut events = bus.subscribe();
        let strategy = ScriptedStrategy::new(ProviderId::Kimi, vec![frame("问题 1 答案：B", false)]);
        let context = ProviderContext::new(
            Arc::new(ProviderAdapter::new(Arc::new(strategy))),
            bus.publisher(),
        );
        let handle = ContextHandle("kimi-1".into());
        bus.register(handle.clone(), Arc::new(context)).await;

        let ready = bus.request(&handle, BusRequest::CheckReady).await.unwrap();
        assert_eq!(ready, Some(BusResponse::Ready { ready: true }));

        let response = bus
            .request(&handle, BusRequest::AskQuestion { question: "q".into() })
            .await
            .unwrap();
        assert_eq!(response, Some(BusResponse::accepted()));

        // 回答过程中再次提问会被拒绝
        let busy = bus
            .request(&handle, BusRequest::AskQuestion { question: "q2".into() })
            .await
            .unwrap();
        assert!(matches!(busy, Some(BusResponse::Ask { success: false, .. })));

        let event = events.recv().await.unwrap();
        assert_eq!(
            event,
            BusEvent::AnswerReady {
                provider_id: ProviderId::Kimi,
                answer: "问题1答案：B".into(),
                timed_out: false,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_answer_is_still_published() {
        let bus = LocalBus::new(Duration::from_secs(5));
        let mut events = bus.subscribe();
        let strategy = ScriptedStrategy::new(ProviderId::Tongyi, Vec::new());
        let context = ProviderContext::new(
            Arc::new(ProviderAdapter::new(Arc::new(strategy))),
            bus.publisher(),
        );

        let response = context
            .handle(BusRequest::AskQuestion { question: "q".into() })
            .await;
        assert_eq!(response, Some(BusResponse::accepted()));

        assert_eq!(
            events.recv().await.unwrap(),
            BusEvent::AnswerReady {
                provider_id: ProviderId::Tongyi,
                answer: String::new(),
                timed_out: true,
            }
        );
    }
}
