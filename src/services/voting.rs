//! 加权多数投票
//!
//! 输入是某道题各 AI 的最新答案，输出最终答案和投票记录。
//! 结果只由当前答案决定，与到达顺序无关。

use std::cmp::Ordering;

use crate::models::{Decision, ProviderId, VoteGroup};

/// 一张选票
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ballot {
    pub provider: ProviderId,
    pub text: String,
    pub weight: u32,
    /// 在配置中的顺序，用于最后的平局裁决
    pub position: usize,
    pub low_confidence: bool,
}

/// 投票结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tally {
    pub final_text: String,
    pub decision: Decision,
    /// 获胜组排在第一位，其余按名次排列
    pub groups: Vec<VoteGroup>,
    pub low_confidence: bool,
}

/// 比较用的键：忽略大小写，连续空白视为一个空格
pub fn comparison_key(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

struct GroupAcc<'a> {
    key: String,
    members: Vec<&'a Ballot>,
}

impl GroupAcc<'_> {
    fn count(&self) -> usize {
        self.members.len()
    }

    fn weight(&self) -> u32 {
        self.members.iter().map(|b| b.weight).sum()
    }

    fn has(&self, provider: Option<ProviderId>) -> bool {
        provider.is_some_and(|p| self.members.iter().any(|b| b.provider == p))
    }

    fn first_position(&self) -> usize {
        self.members.iter().map(|b| b.position).min().unwrap_or(usize::MAX)
    }

    /// 组内出现次数最多的原始写法，次数相同取先出现的
    fn display(&self) -> String {
        let mut variants: Vec<(&str, usize)> = Vec::new();
        for ballot in &self.members {
            let text = ballot.text.trim();
            match variants.iter_mut().find(|(v, _)| *v == text) {
                Some((_, n)) => *n += 1,
                None => variants.push((text, 1)),
            }
        }
        let mut best: Option<(&str, usize)> = None;
        for (text, n) in variants {
            if best.map_or(true, |(_, m)| n > m) {
                best = Some((text, n));
            }
        }
        best.map(|(t, _)| t.to_string()).unwrap_or_default()
    }

    fn to_vote_group(&self) -> VoteGroup {
        VoteGroup {
            key: self.key.clone(),
            display: self.display(),
            members: self.members.iter().map(|b| (b.provider, b.weight)).collect(),
            count: self.count(),
            weight: self.weight(),
        }
    }
}

/// 统计一道题的投票
///
/// 排名依次比较：票数、权重和、是否包含权重 AI、配置顺序。
/// 所有答案互不相同时，不按多数逻辑，直接采用权重 AI 的原始答案；
/// 权重 AI 没有回答时采用权重最高（其次配置顺序最靠前）的答案。
/// 没有任何非空答案时返回 None。
pub fn tally(ballots: &[Ballot], favorite: Option<ProviderId>) -> Option<Tally> {
    let mut ballots: Vec<&Ballot> = ballots.iter().filter(|b| !b.text.trim().is_empty()).collect();
    if ballots.is_empty() {
        return None;
    }
    ballots.sort_by_key(|b| (b.position, b.provider));

    let mut groups: Vec<GroupAcc> = Vec::new();
    for ballot in ballots {
        let key = comparison_key(&ballot.text);
        match groups.iter_mut().find(|g| g.key == key) {
            Some(group) => group.members.push(ballot),
            None => groups.push(GroupAcc {
                key,
                members: vec![ballot],
            }),
        }
    }

    groups.sort_by(|a, b| rank(a, b, favorite));

    let all_distinct = groups.iter().all(|g| g.count() == 1);
    let (winner_index, decision, final_text) = if all_distinct {
        match groups.iter().position(|g| g.has(favorite)) {
            Some(index) => (
                index,
                Decision::FavoriteFallback,
                groups[index].members[0].text.trim().to_string(),
            ),
            None => (
                0,
                Decision::HighestWeightFallback,
                groups[0].members[0].text.trim().to_string(),
            ),
        }
    } else {
        (0, Decision::Majority, groups[0].display())
    };

    let winner = groups.remove(winner_index);
    let low_confidence = winner.members.iter().any(|b| b.low_confidence);

    let mut vote_groups = Vec::with_capacity(groups.len() + 1);
    vote_groups.push(winner.to_vote_group());
    vote_groups.extend(groups.iter().map(GroupAcc::to_vote_group));

    Some(Tally {
        final_text,
        decision,
        groups: vote_groups,
        low_confidence,
    })
}

fn rank(a: &GroupAcc, b: &GroupAcc, favorite: Option<ProviderId>) -> Ordering {
    b.count()
        .cmp(&a.count())
        .then_with(|| b.weight().cmp(&a.weight()))
        .then_with(|| b.has(favorite).cmp(&a.has(favorite)))
        .then_with(|| a.first_position().cmp(&b.first_position()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ballot(provider: ProviderId, text: &str, weight: u32) -> Ballot {
        Ballot {
            provider,
            text: text.to_string(),
            weight,
            position: ProviderId::ALL
                .iter()
                .position(|p| *p == provider)
                .unwrap(),
            low_confidence: false,
        }
    }

    #[test]
    fn test_majority_wins() {
        let ballots = vec![
            ballot(ProviderId::Kimi, "A", 1),
            ballot(ProviderId::Deepseek, "A", 1),
            ballot(ProviderId::Tongyi, "B", 1),
        ];
        let result = tally(&ballots, None).unwrap();
        assert_eq!(result.final_text, "A");
        assert_eq!(result.decision, Decision::Majority);
        assert_eq!(result.groups[0].count, 2);
        assert_eq!(result.groups[1].key, "b");
    }

    #[test]
    fn test_count_tie_broken_by_weight() {
        let ballots = vec![
            ballot(ProviderId::Kimi, "A", 1),
            ballot(ProviderId::Tongyi, "a", 1),
            ballot(ProviderId::Deepseek, "B", 2),
            ballot(ProviderId::Chatglm, "b", 1),
        ];
        let result = tally(&ballots, Some(ProviderId::Deepseek)).unwrap();
        assert_eq!(result.decision, Decision::Majority);
        assert_eq!(result.final_text, "B");
        assert_eq!(result.groups[0].weight, 3);
    }

    #[test]
    fn test_all_distinct_uses_favorite() {
        let ballots = vec![
            ballot(ProviderId::Kimi, "A", 1),
            ballot(ProviderId::Tongyi, "B", 1),
            ballot(ProviderId::Deepseek, "C", 2),
        ];
        let result = tally(&ballots, Some(ProviderId::Deepseek)).unwrap();
        assert_eq!(result.final_text, "C");
        assert_eq!(result.decision, Decision::FavoriteFallback);
        assert_eq!(result.groups[0].members, vec![(ProviderId::Deepseek, 2)]);
    }

    #[test]
    fn test_all_distinct_without_favorite_uses_roster_order() {
        let ballots = vec![
            ballot(ProviderId::Tongyi, "B", 1),
            ballot(ProviderId::Kimi, "A", 1),
        ];
        let result = tally(&ballots, Some(ProviderId::Deepseek)).unwrap();
        assert_eq!(result.final_text, "A");
        assert_eq!(result.decision, Decision::HighestWeightFallback);
    }

    #[test]
    fn test_order_independent() {
        let mut ballots = vec![
            ballot(ProviderId::Kimi, "x", 1),
            ballot(ProviderId::Chatglm, "y", 1),
            ballot(ProviderId::Tongyi, "z", 2),
        ];
        let first = tally(&ballots, Some(ProviderId::Tongyi)).unwrap();
        ballots.reverse();
        let second = tally(&ballots, Some(ProviderId::Tongyi)).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.final_text, "z");
    }

    #[test]
    fn test_display_prefers_most_common_casing() {
        let ballots = vec![
            ballot(ProviderId::Kimi, "paris", 1),
            ballot(ProviderId::Deepseek, "Paris", 1),
            ballot(ProviderId::Tongyi, " Paris ", 1),
        ];
        let result = tally(&ballots, None).unwrap();
        assert_eq!(result.final_text, "Paris");
        assert_eq!(result.groups.len(), 1);
    }

    #[test]
    fn test_empty_ballots_are_ignored() {
        let ballots = vec![ballot(ProviderId::Kimi, "  ", 1)];
        assert!(tally(&ballots, None).is_none());
        assert!(tally(&[], None).is_none());
    }

    #[test]
    fn test_low_confidence_follows_winner() {
        let mut timed_out = ballot(ProviderId::Kimi, "A", 1);
        timed_out.low_confidence = true;
        let ballots = vec![timed_out, ballot(ProviderId::Tongyi, "A", 1)];
        assert!(tally(&ballots, None).unwrap().low_confidence);
    }

    #[test]
    fn test_comparison_key() {
        assert_eq!(comparison_key("  第1空：北京\n第2空： 上海 "), "第1空：北京 第2空： 上海");
        assert_eq!(comparison_key("A;B"), "a;b");
    }
}
