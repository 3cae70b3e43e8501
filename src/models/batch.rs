//! 分发批次模型
//!
//! 每次"发送"动作（全部 AI 或单个 AI 重试）创建一个批次。
//! 批次的待完成集合只会缩小，为空时批次结束。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use super::ProviderId;

static NEXT_BATCH_ID: AtomicU64 = AtomicU64::new(1);

/// 运行模式：决定焦点何时回到答题页面
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// 所有 AI 回答完毕后才回到答题页面
    #[default]
    Stable,
    /// 第一个 AI 提交成功后立即回到答题页面
    Fast,
}

impl Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Stable => f.write_str("稳定模式"),
            RunMode::Fast => f.write_str("快速模式"),
        }
    }
}

/// 对话策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatStrategy {
    /// 保留窗口，后续批次继续在同一对话中提问
    #[default]
    Continuous,
    /// 收到答案后关闭窗口
    Single,
}

/// 批次编号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchId(pub u64);

impl BatchId {
    pub fn next() -> Self {
        BatchId(NEXT_BATCH_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "批次 {}", self.0)
    }
}

/// 待完成的 AI 集合
///
/// 只提供删除操作：一旦移除就不会再加入。
#[derive(Debug, Clone)]
pub struct PendingSet {
    members: Vec<ProviderId>,
}

impl PendingSet {
    fn new(providers: &[ProviderId]) -> Self {
        let mut members = Vec::with_capacity(providers.len());
        for id in providers {
            if !members.contains(id) {
                members.push(*id);
            }
        }
        Self { members }
    }

    /// 移除一个 AI，返回是否真的移除了（重复移除返回 false）
    pub fn remove(&mut self, provider: ProviderId) -> bool {
        match self.members.iter().position(|p| *p == provider) {
            Some(index) => {
                self.members.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, provider: ProviderId) -> bool {
        self.members.contains(&provider)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ProviderId> + '_ {
        self.members.iter().copied()
    }
}

/// 单个 AI 在批次中的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderOutcome {
    /// 收到答案（`timed_out` 表示稳定检测超时后的尽力结果）
    Answered { timed_out: bool },
    /// 适配器拒绝（忙碌 / 找不到输入框）
    Rejected(String),
    /// 目标不可用（窗口创建或握手失败，发送重试耗尽）
    Unavailable(String),
    /// 窗口在回答过程中被关闭
    Closed,
    /// 批次整体超时仍未回答
    TimedOut,
}

impl ProviderOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ProviderOutcome::Answered { .. })
    }
}

impl Display for ProviderOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderOutcome::Answered { timed_out: false } => f.write_str("✅ 已回答"),
            ProviderOutcome::Answered { timed_out: true } => f.write_str("⏳ 已回答(超时)"),
            ProviderOutcome::Rejected(reason) => write!(f, "⛔ 被拒绝: {}", reason),
            ProviderOutcome::Unavailable(reason) => write!(f, "❌ 不可用: {}", reason),
            ProviderOutcome::Closed => f.write_str("🚪 窗口已关闭"),
            ProviderOutcome::TimedOut => f.write_str("⌛ 批次超时"),
        }
    }
}

/// 分发批次
#[derive(Debug, Clone)]
pub struct DispatchBatch {
    pub id: BatchId,
    /// 问题文本（对调度层不透明）
    pub question: String,
    pub run_mode: RunMode,
    pub providers: Vec<ProviderId>,
    pending: PendingSet,
    outcomes: BTreeMap<ProviderId, ProviderOutcome>,
    deadline: Instant,
}

impl DispatchBatch {
    pub fn new(
        question: impl Into<String>,
        run_mode: RunMode,
        providers: Vec<ProviderId>,
        hard_timeout: Duration,
    ) -> Self {
        let pending = PendingSet::new(&providers);
        Self {
            id: BatchId::next(),
            question: question.into(),
            run_mode,
            providers,
            pending,
            outcomes: BTreeMap::new(),
            deadline: Instant::now() + hard_timeout,
        }
    }

    pub fn pending(&self) -> &PendingSet {
        &self.pending
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn is_complete(&self) -> bool {
        self.pending.is_empty()
    }

    /// 记录某个 AI 的结果并从待完成集合移除
    ///
    /// 已经完成的 AI 再次上报时忽略，返回 false。
    pub fn settle(&mut self, provider: ProviderId, outcome: ProviderOutcome) -> bool {
        if !self.pending.remove(provider) {
            return false;
        }
        self.outcomes.insert(provider, outcome);
        true
    }

    /// 把剩余的 AI 全部标记为超时
    pub fn expire(&mut self) {
        let remaining: Vec<ProviderId> = self.pending.iter().collect();
        for provider in remaining {
            self.settle(provider, ProviderOutcome::TimedOut);
        }
    }

    pub fn outcome(&self, provider: ProviderId) -> Option<&ProviderOutcome> {
        self.outcomes.get(&provider)
    }

    /// 生成批次报告
    pub fn into_report(self) -> BatchReport {
        BatchReport {
            id: self.id,
            outcomes: self.outcomes,
        }
    }
}

/// 批次报告
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub id: BatchId,
    pub outcomes: BTreeMap<ProviderId, ProviderOutcome>,
}

impl BatchReport {
    pub fn success_count(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> Vec<ProviderId> {
        self.outcomes
            .iter()
            .filter(|(_, o)| !o.is_success())
            .map(|(id, _)| *id)
            .collect()
    }
}
