//! 答案与聚合结果

use chrono::{DateTime, Local};
use serde::Serialize;

use super::ProviderId;

/// 某个 AI 对某道题的答案
///
/// 以 (question_number, provider) 为键，后写覆盖先写。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionAnswer {
    pub question_number: u32,
    pub provider: ProviderId,
    /// AI 返回的完整文本（规范化之后）
    pub raw_answer_text: String,
    /// 属于本题的片段
    pub parsed_fragment: String,
    pub timestamp: DateTime<Local>,
    /// 稳定检测超时后的尽力结果
    pub low_confidence: bool,
}

/// 投票中的一组相同答案
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoteGroup {
    /// 比较用的规范化键
    pub key: String,
    /// 该组的显示值（组内出现次数最多的原始写法）
    pub display: String,
    /// 组内的 AI 及其权重（按配置顺序）
    pub members: Vec<(ProviderId, u32)>,
    pub count: usize,
    pub weight: u32,
}

/// 最终答案的产生方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Decision {
    /// 多数票（或票数相同按权重）
    Majority,
    /// 所有答案互不相同，采用权重 AI 的答案
    FavoriteFallback,
    /// 所有答案互不相同且权重 AI 没有回答，采用权重最高（配置顺序最靠前）的答案
    HighestWeightFallback,
}

/// 单题聚合结果（派生数据，可随时从答案重新计算）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationResult {
    pub question_number: u32,
    pub final_answer_text: String,
    pub decision: Decision,
    /// 所有分组，获胜组排在第一位
    pub voting_trace: Vec<VoteGroup>,
    /// 获胜组中包含超时答案
    pub low_confidence: bool,
    /// 最终答案来自用户手动编辑
    pub manually_edited: bool,
}

impl AggregationResult {
    /// 获胜组
    pub fn winner(&self) -> Option<&VoteGroup> {
        self.voting_trace.first()
    }

    /// 某个 AI 在投票记录中出现的次数
    pub fn membership_count(&self, provider: ProviderId) -> usize {
        self.voting_trace
            .iter()
            .flat_map(|g| g.members.iter())
            .filter(|(id, _)| *id == provider)
            .count()
    }
}
