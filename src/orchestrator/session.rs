//! 答题会话 - 编排层
//!
//! 把设置、目标注册表、分发调度器和聚合引擎组装在一起，
//! 对外提供"发送题目 / 重试 / 修改配置 / 查看结果"等操作。
//! 配置修改会立即持久化，并刷新已有的聚合结果。

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{Config, SessionSettings, SettingsStore};
use crate::error::{AppError, AppResult};
use crate::infrastructure::{HostEnvironment, MessageBus};
use crate::models::{
    compose_prompt, AggregationResult, AnswerStructure, AnswerTemplate, BatchReport, BusEvent,
    ChatStrategy, DispatchBatch, ProviderId, ProviderRoster, QuizQuestion, RunMode,
};
use crate::orchestrator::aggregation::AggregationEngine;
use crate::orchestrator::dispatch::{AnswerSink, DispatchCoordinator, DispatchOptions};
use crate::orchestrator::target_registry::{RegistryOptions, TargetRegistry};
use crate::utils::logging::{log_batch_complete, log_batch_start};

/// 把答案交给聚合引擎
struct EngineSink {
    engine: Arc<Mutex<AggregationEngine>>,
    roster: Arc<RwLock<ProviderRoster>>,
}

#[async_trait]
impl AnswerSink for EngineSink {
    async fn accept(&self, provider: ProviderId, answer: &str, timed_out: bool) {
        let roster = self.roster.read().await.clone();
        self.engine
            .lock()
            .await
            .ingest(provider, answer, timed_out, &roster);
    }
}

/// 答题会话
pub struct Session {
    store: Arc<dyn SettingsStore>,
    settings: Mutex<SessionSettings>,
    roster: Arc<RwLock<ProviderRoster>>,
    registry: Arc<TargetRegistry>,
    coordinator: DispatchCoordinator,
    engine: Arc<Mutex<AggregationEngine>>,
    bus: Arc<dyn MessageBus>,
    /// 最近一次发送的问题，用于单个 AI 重试
    last_question: Mutex<Option<String>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Session {
    pub fn new(
        store: Arc<dyn SettingsStore>,
        host: Arc<dyn HostEnvironment>,
        bus: Arc<dyn MessageBus>,
        registry_options: RegistryOptions,
        dispatch_options: DispatchOptions,
    ) -> AppResult<Self> {
        let settings = store.load()?;
        let roster = Arc::new(RwLock::new(settings.roster()));
        let engine = Arc::new(Mutex::new(AggregationEngine::new()));
        let sink = Arc::new(EngineSink {
            engine: engine.clone(),
            roster: roster.clone(),
        });

        let registry = Arc::new(TargetRegistry::new(
            host.clone(),
            bus.clone(),
            registry_options,
        ));
        let coordinator = DispatchCoordinator::new(registry.clone(), bus.clone(), host, dispatch_options)
            .with_sink(sink);

        Ok(Self {
            store,
            settings: Mutex::new(settings),
            roster,
            registry,
            coordinator,
            engine,
            bus,
            last_question: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn from_config(
        config: &Config,
        store: Arc<dyn SettingsStore>,
        host: Arc<dyn HostEnvironment>,
        bus: Arc<dyn MessageBus>,
    ) -> AppResult<Self> {
        Self::new(
            store,
            host,
            bus,
            RegistryOptions::from_config(config),
            DispatchOptions::from_config(config),
        )
    }

    pub fn registry(&self) -> &Arc<TargetRegistry> {
        &self.registry
    }

    pub async fn settings(&self) -> SessionSettings {
        self.settings.lock().await.clone()
    }

    pub async fn roster(&self) -> ProviderRoster {
        self.roster.read().await.clone()
    }

    /// 启动后台任务：生命周期监听、答案监听、切换窗口请求
    pub async fn start(&self) {
        let mut tasks = self.tasks.lock().await;
        tasks.push(self.registry.spawn_lifecycle_watcher());

        let mut events = self.bus.subscribe();
        let coordinator = self.coordinator.clone();
        let registry = self.registry.clone();
        tasks.push(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    // 批次进行中由调度器收入，这里只处理批次之外到达的答案
                    Ok(BusEvent::AnswerReady {
                        provider_id,
                        answer,
                        timed_out,
                    }) => {
                        if !coordinator.is_dispatching() {
                            coordinator
                                .accept_late_answer(provider_id, &answer, timed_out)
                                .await;
                        }
                    }
                    Ok(BusEvent::SwitchTarget { provider_id }) => {
                        if let Err(e) = registry.focus_target(provider_id).await {
                            warn!("[{}] ⚠️ 切换窗口失败: {}", provider_id, e);
                        }
                    }
                    Ok(BusEvent::Lifecycle(_)) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("⚠️ 答案监听落后，丢失 {} 条事件", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }));
        debug!("会话后台任务已启动");
    }

    /// 把一组题目发给所有启用的 AI，等待批次结束
    pub async fn send_all(&self, questions: &[QuizQuestion]) -> AppResult<BatchReport> {
        let settings = self.settings().await;
        {
            let mut engine = self.engine.lock().await;
            for question in questions {
                engine.set_question_type(question.number, question.question_type());
            }
        }

        let payload = compose_prompt(settings.prompt(), questions);
        *self.last_question.lock().await = Some(payload.clone());

        let providers = self.roster.read().await.enabled_ids();
        if providers.is_empty() {
            return Err(AppError::Other("没有启用的 AI".to_string()));
        }

        let batch = DispatchBatch::new(
            payload,
            settings.run_mode,
            providers.clone(),
            self.coordinator.options().hard_timeout,
        );
        log_batch_start(&batch.id.to_string(), questions.len(), providers.len());

        let report = self.coordinator.dispatch(batch, settings.chat_strategy).await;
        log_batch_complete(&report);
        Ok(report)
    }

    /// 把最近一次的问题重新发给某个 AI
    pub async fn retry_provider(&self, provider: ProviderId) -> AppResult<BatchReport> {
        let Some(question) = self.last_question.lock().await.clone() else {
            return Err(AppError::Other("还没有发送过问题".to_string()));
        };
        if !self.roster.read().await.is_enabled(provider) {
            return Err(AppError::Other(format!("{} 未启用", provider)));
        }

        info!("[{}] 🔁 手动重试", provider);
        self.bus.publish(BusEvent::SwitchTarget {
            provider_id: provider,
        });

        let settings = self.settings().await;
        let batch = DispatchBatch::new(
            question,
            settings.run_mode,
            vec![provider],
            self.coordinator.options().hard_timeout,
        );
        let report = self.coordinator.dispatch(batch, settings.chat_strategy).await;
        log_batch_complete(&report);
        Ok(report)
    }

    /// 把某个 AI 的窗口切到前台
    pub async fn switch_to(&self, provider: ProviderId) -> AppResult<()> {
        self.registry.focus_target(provider).await
    }

    /// 设置权重 AI（None 表示取消）
    pub async fn set_favorite(&self, provider: Option<ProviderId>) -> AppResult<()> {
        self.update_roster(|roster| roster.set_favorite(provider).map_err(AppError::from))
            .await
    }

    /// 启用或停用某个 AI，停用时关闭它的窗口
    pub async fn set_enabled(&self, provider: ProviderId, enabled: bool) -> AppResult<()> {
        self.update_roster(|roster| {
            roster.set_enabled(provider, enabled);
            Ok(())
        })
        .await?;

        if !enabled {
            self.registry.close_target(provider).await?;
        }
        Ok(())
    }

    async fn update_roster(
        &self,
        change: impl FnOnce(&mut ProviderRoster) -> AppResult<()>,
    ) -> AppResult<()> {
        let mut settings = self.settings.lock().await;
        let roster = {
            let mut roster = self.roster.write().await;
            change(&mut roster)?;
            roster.clone()
        };

        settings.set_roster(&roster);
        self.store.save(&settings)?;
        self.engine.lock().await.refresh_derived(&roster);
        Ok(())
    }

    pub async fn set_run_mode(&self, run_mode: RunMode) -> AppResult<()> {
        self.update_settings(|s| s.run_mode = run_mode).await
    }

    pub async fn set_chat_strategy(&self, chat_strategy: ChatStrategy) -> AppResult<()> {
        self.update_settings(|s| s.chat_strategy = chat_strategy).await
    }

    pub async fn set_answer_template(&self, template: AnswerTemplate) -> AppResult<()> {
        self.update_settings(|s| s.answer_template = template).await
    }

    pub async fn set_custom_prompt(&self, prompt: Option<String>) -> AppResult<()> {
        self.update_settings(|s| s.custom_prompt = prompt).await
    }

    async fn update_settings(&self, change: impl FnOnce(&mut SessionSettings)) -> AppResult<()> {
        let mut settings = self.settings.lock().await;
        change(&mut settings);
        self.store.save(&settings)?;
        Ok(())
    }

    /// 用户手动修改最终答案
    pub async fn edit_final_answer(&self, question: u32, text: impl Into<String>) -> bool {
        self.engine.lock().await.edit_final_answer(question, text)
    }

    /// 丢弃手动编辑，按当前答案重新计算
    pub async fn recompute(&self, question: u32) -> Option<AggregationResult> {
        let roster = self.roster().await;
        self.engine.lock().await.recompute(question, &roster)
    }

    /// 所有题目的当前结果（按题号排序）
    pub async fn final_answers(&self) -> Vec<AggregationResult> {
        self.engine.lock().await.results()
    }

    pub async fn answer_structure(&self, question: u32) -> Option<AnswerStructure> {
        self.engine.lock().await.answer_structure(question)
    }

    /// 停止后台任务并关闭所有 AI 窗口
    pub async fn shutdown(&self) {
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
        let closed = self.registry.teardown_all().await;
        info!("会话结束，关闭了 {} 个窗口", closed.len());
    }
}
