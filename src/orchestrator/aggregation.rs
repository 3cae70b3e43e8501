//! 答案聚合引擎
//!
//! ## 职责
//!
//! - 保存每道题每个 AI 的最新答案片段
//! - 每收到一个答案就重新计算受影响题目的最终答案
//! - 用户手动编辑的最终答案优先，只有显式 `recompute` 才会覆盖
//!
//! 聚合结果是派生数据，任何时候都可以从当前答案重新算出。

use chrono::Local;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

use crate::models::{
    structure_answer, AggregationResult, AnswerStructure, ProviderId, ProviderRoster,
    QuestionAnswer, QuestionType,
};
use crate::services::{parse_answer, tally, Ballot};

#[derive(Debug, Default)]
pub struct AggregationEngine {
    answers: BTreeMap<u32, BTreeMap<ProviderId, QuestionAnswer>>,
    results: BTreeMap<u32, AggregationResult>,
    manual_edits: HashMap<u32, String>,
    question_types: HashMap<u32, QuestionType>,
}

impl AggregationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// 收入一个 AI 的完整回答
    ///
    /// 返回最终答案可能变化的题号。同一片段重复收入不会产生变化。
    pub fn ingest(
        &mut self,
        provider: ProviderId,
        raw_answer_text: &str,
        low_confidence: bool,
        roster: &ProviderRoster,
    ) -> Vec<u32> {
        let fragments = parse_answer(raw_answer_text);
        if fragments.is_empty() {
            debug!("[{}] 回答为空，忽略", provider);
            return Vec::new();
        }

        let mut changed = Vec::new();
        for fragment in fragments {
            let per_question = self.answers.entry(fragment.question_number).or_default();
            let unchanged = per_question.get(&provider).is_some_and(|existing| {
                existing.parsed_fragment == fragment.text
                    && existing.low_confidence == low_confidence
            });
            if unchanged {
                continue;
            }

            per_question.insert(
                provider,
                QuestionAnswer {
                    question_number: fragment.question_number,
                    provider,
                    raw_answer_text: raw_answer_text.to_string(),
                    parsed_fragment: fragment.text,
                    timestamp: Local::now(),
                    low_confidence,
                },
            );
            changed.push(fragment.question_number);
        }

        for &question in &changed {
            self.derive(question, roster);
        }
        if !changed.is_empty() {
            info!("[{}] 更新了 {} 道题的答案", provider, changed.len());
        }
        changed
    }

    /// 从当前答案重新计算某道题，丢弃手动编辑
    ///
    /// 这道题还没有任何答案时返回 None。
    pub fn recompute(&mut self, question: u32, roster: &ProviderRoster) -> Option<AggregationResult> {
        self.manual_edits.remove(&question);
        self.derive(question, roster)
    }

    /// AI 配置（权重 / 启用状态）变化后刷新所有结果，保留手动编辑
    pub fn refresh_derived(&mut self, roster: &ProviderRoster) {
        let questions: Vec<u32> = self.answers.keys().copied().collect();
        for question in questions {
            self.derive(question, roster);
        }
    }

    /// 只统计当前启用的 AI 的答案
    fn derive(&mut self, question: u32, roster: &ProviderRoster) -> Option<AggregationResult> {
        let ballots: Vec<Ballot> = self
            .answers
            .get(&question)
            .map(|per_question| {
                per_question
                    .values()
                    .filter(|answer| roster.is_enabled(answer.provider))
                    .map(|answer| Ballot {
                        provider: answer.provider,
                        text: answer.parsed_fragment.clone(),
                        weight: roster.weight_of(answer.provider),
                        position: roster.position(answer.provider),
                        low_confidence: answer.low_confidence,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let Some(tally) = tally(&ballots, roster.favorite()) else {
            self.results.remove(&question);
            return None;
        };

        let (final_answer_text, manually_edited) = match self.manual_edits.get(&question) {
            Some(edited) => (edited.clone(), true),
            None => (tally.final_text, false),
        };

        let result = AggregationResult {
            question_number: question,
            final_answer_text,
            decision: tally.decision,
            voting_trace: tally.groups,
            low_confidence: tally.low_confidence,
            manually_edited,
        };
        self.results.insert(question, result.clone());
        Some(result)
    }

    /// 用户手动修改最终答案
    ///
    /// 只能修改已有结果的题目，返回是否修改成功。
    pub fn edit_final_answer(&mut self, question: u32, text: impl Into<String>) -> bool {
        let Some(result) = self.results.get_mut(&question) else {
            return false;
        };
        let text = text.into();
        result.final_answer_text = text.clone();
        result.manually_edited = true;
        self.manual_edits.insert(question, text);
        true
    }

    pub fn final_answer(&self, question: u32) -> Option<&str> {
        self.results
            .get(&question)
            .map(|r| r.final_answer_text.as_str())
    }

    pub fn result(&self, question: u32) -> Option<&AggregationResult> {
        self.results.get(&question)
    }

    /// 所有已有结果（按题号排序）
    pub fn results(&self) -> Vec<AggregationResult> {
        self.results.values().cloned().collect()
    }

    /// 某道题各 AI 的答案（按 AI 标识排序）
    pub fn answers_for(&self, question: u32) -> Vec<&QuestionAnswer> {
        self.answers
            .get(&question)
            .map(|per_question| per_question.values().collect())
            .unwrap_or_default()
    }

    pub fn set_question_type(&mut self, question: u32, question_type: QuestionType) {
        self.question_types.insert(question, question_type);
    }

    pub fn question_type(&self, question: u32) -> QuestionType {
        self.question_types
            .get(&question)
            .copied()
            .unwrap_or_default()
    }

    /// 按题型拆解最终答案，供展示层构造可编辑控件
    pub fn answer_structure(&self, question: u32) -> Option<AnswerStructure> {
        let text = self.final_answer(question)?;
        Some(structure_answer(self.question_type(question), text))
    }

    /// 收到过答案的题号
    pub fn question_numbers(&self) -> Vec<u32> {
        self.answers.keys().copied().collect()
    }

    /// 清空答案和结果（题型保留）
    pub fn clear(&mut self) {
        self.answers.clear();
        self.results.clear();
        self.manual_edits.clear();
    }
}
