//! 答案拆分
//!
//! 按 `问题N答案:` 标记把一个 AI 的完整回答拆成逐题片段。

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

static ANSWER_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:问题\s*(\d+)\s*答案|question\s*(\d+)\s*answer)\s*[:：]")
        .expect("answer marker regex is valid")
});

/// 某道题的答案片段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerFragment {
    pub question_number: u32,
    pub text: String,
}

/// 拆分完整回答
///
/// - 两个标记之间（或标记到结尾）的文字属于前一个标记的题号
/// - 同一题号出现多次时以最后一次为准
/// - 空片段丢弃
/// - 完全没有标记时，整段文字归为第 1 题
pub fn parse_answer(text: &str) -> Vec<AnswerFragment> {
    let markers: Vec<(usize, usize, Option<u32>)> = ANSWER_MARKER
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let number = caps
                .get(1)
                .or_else(|| caps.get(2))
                .and_then(|m| m.as_str().parse::<u32>().ok());
            Some((whole.start(), whole.end(), number))
        })
        .collect();

    if markers.is_empty() {
        let whole = text.trim();
        if whole.is_empty() {
            return Vec::new();
        }
        return vec![AnswerFragment {
            question_number: 1,
            text: whole.to_string(),
        }];
    }

    let mut fragments: BTreeMap<u32, String> = BTreeMap::new();
    for (i, (_, body_start, number)) in markers.iter().enumerate() {
        let body_end = markers.get(i + 1).map(|m| m.0).unwrap_or(text.len());
        let Some(number) = number else {
            continue;
        };
        let body = text[*body_start..body_end].trim();
        if body.is_empty() {
            continue;
        }
        fragments.insert(*number, body.to_string());
    }

    fragments
        .into_iter()
        .map(|(question_number, text)| AnswerFragment {
            question_number,
            text,
        })
        .collect()
}
