//! 分发调度器 - 编排层
//!
//! ## 职责
//!
//! 把一个批次同时发给所有待完成的 AI，跟踪待完成集合，实现两种运行模式：
//! - 稳定模式：所有 AI 都结束（回答、失败或超时）后才把焦点还给答题页面
//! - 快速模式：第一个 AI 提交成功后立即还给答题页面
//!
//! 单个 AI 的失败只影响它自己，永远不会让整个批次失败。

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::broadcast::Receiver;
use tokio::sync::mpsc;
use tokio::time::{sleep, sleep_until};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::AppError;
use crate::infrastructure::{HostEnvironment, MessageBus};
use crate::models::{
    AutomationTarget, BatchReport, BusEvent, BusRequest, BusResponse, ChatStrategy,
    DispatchBatch, LifecycleEvent, ProviderId, ProviderOutcome, RunMode,
};
use crate::orchestrator::focus::FocusFlicker;
use crate::orchestrator::target_registry::TargetRegistry;

/// 调度参数
#[derive(Debug, Clone, Copy)]
pub struct DispatchOptions {
    /// 整个批次的最长等待时间
    pub hard_timeout: Duration,
    pub flicker_interval: Duration,
    pub flicker_dwell: Duration,
    pub send_attempts: u32,
    pub send_retry_delay: Duration,
}

impl DispatchOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            hard_timeout: config.batch_timeout(),
            flicker_interval: config.flicker_interval(),
            flicker_dwell: config.flicker_dwell(),
            send_attempts: config.send_attempts,
            send_retry_delay: config.send_retry_delay(),
        }
    }
}

/// 答案的接收方（聚合引擎）
#[async_trait]
pub trait AnswerSink: Send + Sync {
    async fn accept(&self, provider: ProviderId, answer: &str, timed_out: bool);
}

/// 单个 AI 的提交结果：Ok 表示已提交，等待答案
type Submission = (ProviderId, Result<AutomationTarget, ProviderOutcome>);

/// 正在进行的批次计数，离开作用域时减一
struct ActiveBatch(Arc<AtomicUsize>);

impl ActiveBatch {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter.clone())
    }
}

impl Drop for ActiveBatch {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// 分发调度器
#[derive(Clone)]
pub struct DispatchCoordinator {
    registry: Arc<TargetRegistry>,
    bus: Arc<dyn MessageBus>,
    host: Arc<dyn HostEnvironment>,
    options: DispatchOptions,
    sink: Option<Arc<dyn AnswerSink>>,
    active: Arc<AtomicUsize>,
}

impl DispatchCoordinator {
    pub fn new(
        registry: Arc<TargetRegistry>,
        bus: Arc<dyn MessageBus>,
        host: Arc<dyn HostEnvironment>,
        options: DispatchOptions,
    ) -> Self {
        Self {
            registry,
            bus,
            host,
            options,
            sink: None,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn AnswerSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn options(&self) -> &DispatchOptions {
        &self.options
    }

    /// 是否有批次正在监听答案
    ///
    /// 批次进行期间收到的所有 ANSWER_READY（包括不属于该批次的）都由调度器交给 sink。
    pub fn is_dispatching(&self) -> bool {
        self.active.load(Ordering::Acquire) > 0
    }

    /// 分发一个批次，直到待完成集合为空或批次超时
    pub async fn dispatch(
        &self,
        mut batch: DispatchBatch,
        chat_strategy: ChatStrategy,
    ) -> BatchReport {
        info!(
            "{} 📨 分发给 {} 个 AI ({})",
            batch.id,
            batch.providers.len(),
            batch.run_mode
        );

        // 先订阅再登记，避免错过很快到达的答案
        let mut events = self.bus.subscribe();
        let active = ActiveBatch::enter(&self.active);
        let slot_count = batch.providers.len();
        let (tx, mut rx) = mpsc::channel::<Submission>(slot_count.max(1));

        let pending: Vec<ProviderId> = batch.pending().iter().collect();
        let mut submitters = Vec::with_capacity(pending.len());
        for provider in pending {
            let slot = batch
                .providers
                .iter()
                .position(|p| *p == provider)
                .unwrap_or(0);
            let this = self.clone();
            let question = batch.question.clone();
            let tx = tx.clone();
            submitters.push(tokio::spawn(async move {
                let result = this.submit_one(provider, slot, slot_count, &question).await;
                let _ = tx.send((provider, result)).await;
            }));
        }
        drop(tx);

        let return_to_host = Arc::new(AtomicBool::new(false));
        let flicker = FocusFlicker::start(
            self.registry.clone(),
            self.host.clone(),
            self.options.flicker_interval,
            self.options.flicker_dwell,
            return_to_host.clone(),
        );

        let deadline = batch.deadline();
        let mut submissions_open = true;
        let mut host_focused = false;
        let mut submitted: HashMap<ProviderId, AutomationTarget> = HashMap::new();

        while !batch.is_complete() {
            tokio::select! {
                submission = rx.recv(), if submissions_open => match submission {
                    Some((provider, Ok(target))) => {
                        debug!("{} [{}] 已提交，等待答案", batch.id, provider);
                        submitted.insert(provider, target);
                        if batch.run_mode == RunMode::Fast && !host_focused {
                            self.focus_host().await;
                            host_focused = true;
                            return_to_host.store(true, Ordering::Release);
                        }
                    }
                    Some((provider, Err(outcome))) => {
                        warn!("{} [{}] {}", batch.id, provider, outcome);
                        batch.settle(provider, outcome);
                    }
                    None => submissions_open = false,
                },
                event = events.recv() => match event {
                    Ok(event) => self.on_event(&mut batch, &submitted, event, chat_strategy).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("⚠️ {} 事件监听落后，丢失 {} 条事件", batch.id, skipped);
                    }
                    Err(RecvError::Closed) => {
                        warn!("⚠️ 消息总线已关闭，结束 {}", batch.id);
                        break;
                    }
                },
                _ = sleep_until(deadline) => {
                    let remaining: Vec<ProviderId> = batch.pending().iter().collect();
                    warn!("⏰ {} 超时，未完成: {:?}", batch.id, remaining);
                    break;
                }
            }
        }

        // 批次结束后不再继续准备目标或发送问题
        for submitter in &submitters {
            submitter.abort();
        }
        // 超时（或总线关闭）时剩余的 AI 按超时处理
        let timed_out: Vec<ProviderId> = batch.pending().iter().collect();
        batch.expire();
        for provider in timed_out {
            self.registry.mark_stale(provider).await;
        }

        drop(active);
        self.drain_answers(&mut events).await;

        flicker.stop();
        if !host_focused {
            self.focus_host().await;
        }

        let report = batch.into_report();
        info!(
            "{} 完成: {}/{} 个 AI 成功",
            report.id,
            report.success_count(),
            report.outcomes.len()
        );
        report
    }

    async fn on_event(
        &self,
        batch: &mut DispatchBatch,
        submitted: &HashMap<ProviderId, AutomationTarget>,
        event: BusEvent,
        chat_strategy: ChatStrategy,
    ) {
        match event {
            BusEvent::AnswerReady {
                provider_id,
                answer,
                timed_out,
            } => {
                // 不属于本批次的迟到答案同样交给聚合引擎
                if !batch.pending().contains(provider_id) {
                    self.accept_late_answer(provider_id, &answer, timed_out).await;
                    return;
                }
                if let Some(sink) = &self.sink {
                    sink.accept(provider_id, &answer, timed_out).await;
                }

                batch.settle(provider_id, ProviderOutcome::Answered { timed_out });
                info!("{} [{}] 📥 收到答案", batch.id, provider_id);
                if chat_strategy == ChatStrategy::Single {
                    if let Err(e) = self.registry.close_target(provider_id).await {
                        debug!("[{}] 关闭窗口失败: {}", provider_id, e);
                    }
                } else {
                    self.registry.mark_ready(provider_id).await;
                }
            }
            BusEvent::Lifecycle(
                LifecycleEvent::HostPageClosed | LifecycleEvent::HostPageReloaded,
            ) => {
                let remaining: Vec<ProviderId> = batch.pending().iter().collect();
                for provider in remaining {
                    batch.settle(provider, ProviderOutcome::Closed);
                }
            }
            BusEvent::Lifecycle(LifecycleEvent::ContextClosed { context }) => {
                self.close_pending(batch, submitted, |t| t.context == context).await;
            }
            BusEvent::Lifecycle(LifecycleEvent::WindowClosed { window }) => {
                self.close_pending(batch, submitted, |t| t.window == window).await;
            }
            BusEvent::Lifecycle(_) | BusEvent::SwitchTarget { .. } => {}
        }
    }

    /// 批次之外的答案：交给 sink，并让对应目标恢复就绪
    pub async fn accept_late_answer(&self, provider: ProviderId, answer: &str, timed_out: bool) {
        debug!("[{}] 收到批次之外的答案", provider);
        if let Some(sink) = &self.sink {
            sink.accept(provider, answer, timed_out).await;
        }
        self.registry.mark_answered(provider).await;
    }

    /// 循环结束时已经到达但还没处理的答案
    async fn drain_answers(&self, events: &mut Receiver<BusEvent>) {
        loop {
            match events.try_recv() {
                Ok(BusEvent::AnswerReady {
                    provider_id,
                    answer,
                    timed_out,
                }) => self.accept_late_answer(provider_id, &answer, timed_out).await,
                Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
    }

    /// 窗口在回答过程中被关闭的 AI 按失败结束
    async fn close_pending(
        &self,
        batch: &mut DispatchBatch,
        submitted: &HashMap<ProviderId, AutomationTarget>,
        closed: impl Fn(&AutomationTarget) -> bool,
    ) {
        let gone: Vec<ProviderId> = submitted
            .values()
            .filter(|t| batch.pending().contains(t.provider) && closed(t))
            .map(|t| t.provider)
            .collect();
        for provider in gone {
            warn!("{} [{}] 🚪 回答过程中窗口被关闭", batch.id, provider);
            batch.settle(provider, ProviderOutcome::Closed);
        }
    }

    /// 准备目标并发送问题
    async fn submit_one(
        &self,
        provider: ProviderId,
        slot: usize,
        slot_count: usize,
        question: &str,
    ) -> Result<AutomationTarget, ProviderOutcome> {
        let target = self
            .registry
            .ensure_target(provider, slot, slot_count)
            .await
            .map_err(|e| ProviderOutcome::Unavailable(e.to_string()))?;

        self.registry.mark_busy(provider).await;

        let attempts = self.options.send_attempts.max(1);
        let mut last_error = String::new();
        for attempt in 1..=attempts {
            let request = BusRequest::AskQuestion {
                question: question.to_string(),
            };
            match self.bus.request(&target.context, request).await {
                Ok(Some(BusResponse::Ask { success: true, .. })) => return Ok(target),
                Ok(Some(BusResponse::Ask {
                    success: false,
                    error,
                })) => {
                    let reason = error.unwrap_or_else(|| "未知错误".to_string());
                    self.registry.mark_stale(provider).await;
                    return Err(ProviderOutcome::Rejected(reason));
                }
                Ok(other) => {
                    last_error = format!("无效响应: {:?}", other);
                }
                Err(e) => {
                    last_error = e.to_string();
                }
            }

            if attempt < attempts {
                debug!(
                    "[{}] 发送失败 ({}/{}): {}，{}ms 后重试",
                    provider,
                    attempt,
                    attempts,
                    last_error,
                    self.options.send_retry_delay.as_millis()
                );
                sleep(self.options.send_retry_delay).await;
            }
        }

        self.registry.mark_stale(provider).await;
        Err(ProviderOutcome::Unavailable(
            AppError::target_unavailable(provider, last_error).to_string(),
        ))
    }

    async fn focus_host(&self) {
        if let Err(e) = self.host.focus_host_page().await {
            debug!("切回答题页面失败: {}", e);
        }
    }
}
