//! 完成检测状态机
//!
//! ```text
//! Idle → Submitting → AwaitingFirstContent → Streaming ⇄ StabilityCheck → Complete
//!                                  └──────────────┴────────────┴──────→ TimedOut
//! ```
//!
//! 状态机本身不睡眠也不访问页面：调用方每轮询一次就调用一次 `observe`，
//! 所以可以用合成的内容序列直接测试。

use crate::services::normalizer::is_placeholder;
use crate::services::{CompletionTiming, Observation};

/// 完成检测的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionPhase {
    Idle,
    Submitting,
    AwaitingFirstContent,
    Streaming,
    StabilityCheck,
    Complete,
    TimedOut,
}

impl CompletionPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, CompletionPhase::Complete | CompletionPhase::TimedOut)
    }
}

/// 一次轮询后的结论
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// 继续轮询
    Pending,
    /// 内容稳定，得到最终答案
    Complete(String),
    /// 达到轮询上限，返回当时已有的内容（可能为空）
    TimedOut(String),
}

/// 完成检测状态机（每个问题一个新实例）
#[derive(Debug, Clone)]
pub struct CompletionTracker {
    timing: CompletionTiming,
    phase: CompletionPhase,
    checks: u32,
    stable: u32,
    last: Option<String>,
}

impl CompletionTracker {
    pub fn new(timing: CompletionTiming) -> Self {
        Self {
            timing,
            phase: CompletionPhase::Idle,
            checks: 0,
            stable: 0,
            last: None,
        }
    }

    pub fn phase(&self) -> CompletionPhase {
        self.phase
    }

    pub fn checks(&self) -> u32 {
        self.checks
    }

    pub fn stable_count(&self) -> u32 {
        self.stable
    }

    /// 开始写入问题
    pub fn begin_submit(&mut self) {
        if self.phase == CompletionPhase::Idle {
            self.phase = CompletionPhase::Submitting;
        }
    }

    /// 提交后的等待结束，开始等待第一段内容
    pub fn settled(&mut self) {
        if self.phase == CompletionPhase::Submitting {
            self.phase = CompletionPhase::AwaitingFirstContent;
        }
    }

    fn is_real(&self, content: &str) -> bool {
        content.chars().count() >= self.timing.min_content_len && !is_placeholder(content)
    }

    /// 处理一次轮询结果
    pub fn observe(&mut self, observation: Observation) -> TickOutcome {
        match self.phase {
            CompletionPhase::Idle | CompletionPhase::Submitting => return TickOutcome::Pending,
            CompletionPhase::Complete => {
                return TickOutcome::Complete(self.last.clone().unwrap_or_default())
            }
            CompletionPhase::TimedOut => {
                return TickOutcome::TimedOut(self.last.clone().unwrap_or_default())
            }
            _ => {}
        }

        self.checks += 1;
        let content = observation.content.filter(|c| self.is_real(c));

        match self.phase {
            CompletionPhase::AwaitingFirstContent => {
                if let Some(content) = content {
                    self.last = Some(content);
                    self.stable = 0;
                    self.phase = CompletionPhase::Streaming;
                }
            }
            CompletionPhase::Streaming | CompletionPhase::StabilityCheck => match content {
                Some(content) if self.last.as_deref() != Some(content.as_str()) => {
                    self.last = Some(content);
                    self.stable = 0;
                    self.phase = CompletionPhase::Streaming;
                }
                Some(_) if !observation.generating => {
                    self.stable += 1;
                    self.phase = CompletionPhase::StabilityCheck;
                    if self.stable >= self.timing.required_stability {
                        self.phase = CompletionPhase::Complete;
                        return TickOutcome::Complete(self.last.clone().unwrap_or_default());
                    }
                }
                _ => {
                    // 内容不变但仍在生成，或内容暂时消失
                    self.stable = 0;
                    self.phase = CompletionPhase::Streaming;
                }
            },
            _ => {}
        }

        if self.checks >= self.timing.max_checks {
            self.phase = CompletionPhase::TimedOut;
            return TickOutcome::TimedOut(self.last.clone().unwrap_or_default());
        }

        TickOutcome::Pending
    }
}
