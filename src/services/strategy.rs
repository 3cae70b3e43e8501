//! 适配策略 - 业务能力层
//!
//! 描述"在某个 AI 页面上能做什么"：提交问题、判断是否在生成、读取规范化内容。
//! 不关心完成检测的状态机，那是流程层的事。

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use crate::error::{AppResult, SubmissionError};
use crate::infrastructure::{eval_as, ScriptRunner};
use crate::models::ProviderId;
use crate::services::dom_scripts;
use crate::services::providers::{CompletionTiming, ProviderProfile};

/// 提交成功后的回执
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubmitReceipt {
    /// 提交前页面上已有的回复数量，只有新出现的回复才算本题的答案
    pub baseline_responses: usize,
}

/// 一次轮询看到的页面状态
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Observation {
    pub generating: bool,
    /// 规范化后的内容，还没有新回复时为 None
    pub content: Option<String>,
}

/// 单个 AI 的页面操作
#[async_trait]
pub trait AdapterStrategy: Send + Sync {
    fn provider(&self) -> ProviderId;

    fn timing(&self) -> CompletionTiming;

    /// 输入框是否已加载
    async fn is_ready(&self) -> AppResult<bool>;

    /// 写入问题并触发提交
    async fn submit(&self, question: &str) -> AppResult<SubmitReceipt>;

    /// AI 自己的"正在生成"标志
    async fn is_generating(&self) -> AppResult<bool>;

    /// 本题回复的规范化内容
    async fn extract_normalized_content(
        &self,
        receipt: &SubmitReceipt,
    ) -> AppResult<Option<String>>;

    /// 一次轮询
    async fn observe(&self, receipt: &SubmitReceipt) -> AppResult<Observation> {
        let generating = self.is_generating().await?;
        let content = self.extract_normalized_content(receipt).await?;
        Ok(Observation {
            generating,
            content,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SubmitResult {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    baseline: usize,
}

#[derive(Debug, Deserialize)]
struct Snapshot {
    generating: bool,
    content: Option<String>,
    responses: usize,
}

impl Snapshot {
    fn into_observation(self, receipt: &SubmitReceipt) -> Observation {
        let content = if self.responses > receipt.baseline_responses {
            self.content
        } else {
            None
        };
        Observation {
            generating: self.generating,
            content,
        }
    }
}

/// 基于页面选择器的策略（所有 AI 共用，差异由 profile 描述）
pub struct DomStrategy {
    profile: ProviderProfile,
    runner: Arc<dyn ScriptRunner>,
}

impl DomStrategy {
    pub fn new(profile: ProviderProfile, runner: Arc<dyn ScriptRunner>) -> Self {
        Self { profile, runner }
    }

    pub fn for_provider(provider: ProviderId, runner: Arc<dyn ScriptRunner>) -> Self {
        Self::new(ProviderProfile::for_provider(provider), runner)
    }

    pub fn profile(&self) -> &ProviderProfile {
        &self.profile
    }

    async fn snapshot(&self) -> AppResult<Snapshot> {
        let js = dom_scripts::snapshot_script(&self.profile)?;
        eval_as(self.runner.as_ref(), js).await
    }
}

#[async_trait]
impl AdapterStrategy for DomStrategy {
    fn provider(&self) -> ProviderId {
        self.profile.provider
    }

    fn timing(&self) -> CompletionTiming {
        self.profile.timing
    }

    async fn is_ready(&self) -> AppResult<bool> {
        let js = dom_scripts::check_ready_script(&self.profile)?;
        eval_as(self.runner.as_ref(), js).await
    }

    async fn submit(&self, question: &str) -> AppResult<SubmitReceipt> {
        let provider = self.provider();
        let js = dom_scripts::submit_script(&self.profile, question)?;
        let result: SubmitResult = eval_as(self.runner.as_ref(), js).await?;

        if result.ok {
            debug!("[{}] 问题已提交，提交前回复数 {}", provider, result.baseline);
            return Ok(SubmitReceipt {
                baseline_responses: result.baseline,
            });
        }

        match result.error.as_deref() {
            Some("input_not_found") => Err(SubmissionError::InputNotFound { provider }.into()),
            other => Err(SubmissionError::Rejected {
                provider,
                reason: other.unwrap_or("未知错误").to_string(),
            }
            .into()),
        }
    }

    async fn is_generating(&self) -> AppResult<bool> {
        Ok(self.snapshot().await?.generating)
    }

    async fn extract_normalized_content(
        &self,
        receipt: &SubmitReceipt,
    ) -> AppResult<Option<String>> {
        Ok(self.snapshot().await?.into_observation(receipt).content)
    }

    async fn observe(&self, receipt: &SubmitReceipt) -> AppResult<Observation> {
        Ok(self.snapshot().await?.into_observation(receipt))
    }
}
