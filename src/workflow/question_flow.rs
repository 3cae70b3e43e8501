//! 单个问题的处理流程 - 流程层
//!
//! 核心职责：定义"一个 AI 回答一个问题"的完整流程
//!
//! 流程顺序：
//! 1. 检查是否有进行中的问题（同一时刻最多一个）
//! 2. 写入问题并提交
//! 3. 等待提交生效，然后按固定间隔轮询，交给完成检测状态机判断
//! 4. 返回最终内容（完成或超时）

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::{AppResult, SubmissionError};
use crate::models::ProviderId;
use crate::services::{AdapterStrategy, Observation, SubmitReceipt};
use crate::workflow::completion::{CompletionTracker, TickOutcome};
use crate::workflow::question_ctx::QuestionCtx;

/// 进行中标志，离开作用域时自动清除
struct InFlight(Arc<AtomicBool>);

impl InFlight {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(flag.clone()))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// 已提交、等待完成的问题
pub struct QuestionRun {
    pub ctx: QuestionCtx,
    receipt: SubmitReceipt,
    tracker: CompletionTracker,
    _guard: InFlight,
}

/// 问题处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionReport {
    pub provider: ProviderId,
    /// 规范化后的回答（超时且没有内容时为空）
    pub content: String,
    pub timed_out: bool,
    pub polls: u32,
}

/// 单个 AI 的适配器
///
/// - 同一时刻最多一个进行中的问题
/// - 页面操作全部委托给策略
pub struct ProviderAdapter {
    strategy: Arc<dyn AdapterStrategy>,
    in_flight: Arc<AtomicBool>,
    sequence: AtomicU64,
}

impl ProviderAdapter {
    pub fn new(strategy: Arc<dyn AdapterStrategy>) -> Self {
        Self {
            strategy,
            in_flight: Arc::new(AtomicBool::new(false)),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn provider(&self) -> ProviderId {
        self.strategy.provider()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// 握手：空闲且输入框已加载
    pub async fn is_ready(&self) -> bool {
        if self.is_busy() {
            return false;
        }
        match self.strategy.is_ready().await {
            Ok(ready) => ready,
            Err(e) => {
                debug!("[{}] 就绪检查失败: {}", self.provider(), e);
                false
            }
        }
    }

    /// 提交问题
    ///
    /// 已有进行中的问题时返回 `AdapterBusy`；提交失败时立即释放进行中标志。
    pub async fn begin(&self, question: &str) -> AppResult<QuestionRun> {
        let provider = self.provider();
        let guard =
            InFlight::acquire(&self.in_flight).ok_or(SubmissionError::AdapterBusy { provider })?;

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let ctx = QuestionCtx::new(provider, sequence);

        let mut tracker = CompletionTracker::new(self.strategy.timing());
        tracker.begin_submit();

        let receipt = self.strategy.submit(question).await?;
        info!("{} 📤 问题已提交", ctx);

        Ok(QuestionRun {
            ctx,
            receipt,
            tracker,
            _guard: guard,
        })
    }

    /// 等待回答完成
    pub async fn await_completion(&self, run: QuestionRun) -> CompletionReport {
        let QuestionRun {
            ctx,
            receipt,
            mut tracker,
            _guard,
        } = run;
        let timing = self.strategy.timing();

        sleep(timing.settle).await;
        tracker.settled();

        let mut ticker = interval(timing.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let observation = match self.strategy.observe(&receipt).await {
                Ok(observation) => observation,
                Err(e) => {
                    debug!("{} 读取页面失败: {}", ctx, e);
                    Observation::default()
                }
            };

            match tracker.observe(observation) {
                TickOutcome::Pending => continue,
                TickOutcome::Complete(content) => {
                    info!("{} ✅ 回答完成 ({} 次轮询)", ctx, tracker.checks());
                    return CompletionReport {
                        provider: ctx.provider,
                        content,
                        timed_out: false,
                        polls: tracker.checks(),
                    };
                }
                TickOutcome::TimedOut(content) => {
                    warn!(
                        "{} ⏳ 稳定检测超时，使用已有内容 ({} 字)",
                        ctx,
                        content.chars().count()
                    );
                    return CompletionReport {
                        provider: ctx.provider,
                        content,
                        timed_out: true,
                        polls: tracker.checks(),
                    };
                }
            }
        }
    }

    /// 提交并等待完成
    pub async fn ask(&self, question: &str) -> AppResult<CompletionReport> {
        let run = self.begin(question).await?;
        Ok(self.await_completion(run).await)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::services::CompletionTiming;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// 按顺序返回预设页面状态的策略，内容用完后一直返回最后一个
    pub(crate) struct ScriptedStrategy {
        provider: ProviderId,
        timing: CompletionTiming,
        frames: Mutex<Vec<Observation>>,
        pub(crate) submitted: Mutex<Vec<String>>,
        fail_submit: bool,
    }

    impl ScriptedStrategy {
        pub(crate) fn new(provider: ProviderId, frames: Vec<Observation>) -> Self {
            Self {
                provider,
                timing: CompletionTiming {
                    settle: Duration::from_millis(100),
                    poll_interval: Duration::from_millis(50),
                    required_stability: 3,
                    max_checks: 20,
                    min_content_len: 2,
                },
                frames: Mutex::new(frames),
                submitted: Mutex::new(Vec::new()),
                fail_submit: false,
            }
        }

        pub(crate) fn failing(provider: ProviderId) -> Self {
            Self {
                fail_submit: true,
                ..Self::new(provider, Vec::new())
            }
        }
    }

    #[async_trait]
    impl AdapterStrategy for ScriptedStrategy {
        fn provider(&self) -> ProviderId {
            self.provider
        }

        fn timing(&self) -> CompletionTiming {
            self.timing
        }

        async fn is_ready(&self) -> AppResult<bool> {
            Ok(true)
        }

        async fn submit(&self, question: &str) -> AppResult<SubmitReceipt> {
            if self.fail_submit {
                return Err(SubmissionError::InputNotFound {
                    provider: self.provider,
                }
                .into());
            }
            self.submitted.lock().unwrap().push(question.to_string());
            Ok(SubmitReceipt::default())
        }

        async fn is_generating(&self) -> AppResult<bool> {
            Ok(false)
        }

        async fn extract_normalized_content(
            &self,
            _receipt: &SubmitReceipt,
        ) -> AppResult<Option<String>> {
            Ok(None)
        }

        async fn observe(&self, _receipt: &SubmitReceipt) -> AppResult<Observation> {
            let mut frames = self.frames.lock().unwrap();
            if frames.len() > 1 {
                Ok(frames.remove(0))
            } else {
                Ok(frames.first().cloned().unwrap_or_default())
            }
        }
    }

    pub(crate) fn frame(content: &str, generating: bool) -> Observation {
        Observation {
            generating,
            content: Some(content.to_string()),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ask_returns_stable_content() {
        let strategy = Arc::new(ScriptedStrategy::new(
            ProviderId::Kimi,
            vec![
                Observation::default(),
                frame("问题1", true),
                frame("问题1答案: A", true),
                frame("问题1答案: A", false),
            ],
        ));
        let adapter = ProviderAdapter::new(strategy.clone());

        let report = adapter.ask("1+1=?").await.unwrap();
        assert_eq!(report.content, "问题1答案: A");
        assert!(!report.timed_out);
        assert_eq!(strategy.submitted.lock().unwrap().as_slice(), ["1+1=?"]);
        assert!(!adapter.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_question_is_rejected_while_in_flight() {
        let strategy = Arc::new(ScriptedStrategy::new(ProviderId::Deepseek, Vec::new()));
        let adapter = ProviderAdapter::new(strategy);

        let run = adapter.begin("第一个问题").await.unwrap();
        assert!(adapter.is_busy());
        assert!(!adapter.is_ready().await);

        let err = adapter.begin("第二个问题").await.err().unwrap();
        assert!(matches!(
            err,
            AppError::Submission(SubmissionError::AdapterBusy { .. })
        ));

        drop(run);
        assert!(!adapter.is_busy());
        assert!(adapter.is_ready().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_submit_releases_in_flight() {
        let adapter = ProviderAdapter::new(Arc::new(ScriptedStrategy::failing(ProviderId::Tongyi)));
        assert!(adapter.begin("q").await.is_err());
        assert!(!adapter.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_returns_partial_content() {
        let frames = (0..30).map(|i| frame(&format!("片段{}", i), false)).collect();
        let adapter = ProviderAdapter::new(Arc::new(ScriptedStrategy::new(ProviderId::Chatglm, frames)));

        let report = adapter.ask("q").await.unwrap();
        assert!(report.timed_out);
        assert_eq!(report.polls, 20);
        assert_eq!(report.content, "片段19");
    }
}
