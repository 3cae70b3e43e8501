//! 问题处理上下文
//!
//! 封装"哪个 AI 正在回答第几问"这一信息，只用于日志

use std::fmt::Display;

use crate::models::ProviderId;

/// 问题处理上下文
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestionCtx {
    pub provider: ProviderId,

    /// 该适配器收到的第几个问题（从1开始）
    pub sequence: u64,
}

impl QuestionCtx {
    pub fn new(provider: ProviderId, sequence: u64) -> Self {
        Self { provider, sequence }
    }
}

impl Display for QuestionCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{} 第{}问]", self.provider, self.sequence)
    }
}
