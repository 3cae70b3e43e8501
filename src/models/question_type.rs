//! 题型与最终答案的结构化表示
//!
//! 投票只处理原始文本；这里把胜出的文本拆成展示层可以直接编辑的结构。

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::LazyLock;
use tracing::debug;

static BLANK_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:第\s*(\d+)\s*空|blank\s*(\d+))\s*[:：]\s*(.*)").expect("blank regex")
});

static CHOICE_LETTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z]").expect("choice regex"));

/// 题型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    SingleChoice,
    MultipleChoice,
    FillBlank,
    Judge,
    ShortAnswer,
    WordDefinition,
    #[default]
    Other,
}

impl QuestionType {
    /// 中文题型名
    pub fn label(self) -> &'static str {
        match self {
            QuestionType::SingleChoice => "单选题",
            QuestionType::MultipleChoice => "多选题",
            QuestionType::FillBlank => "填空题",
            QuestionType::Judge => "判断题",
            QuestionType::ShortAnswer => "简答题",
            QuestionType::WordDefinition => "名词解释",
            QuestionType::Other => "其他",
        }
    }

    /// 从题型标签识别题型，无法识别时返回 `Other`
    pub fn from_label(label: &str) -> Self {
        let lower = label.trim().to_lowercase();
        let contains = |keys: &[&str]| keys.iter().any(|k| lower.contains(k));

        if contains(&["多选", "multiple"]) {
            QuestionType::MultipleChoice
        } else if contains(&["单选", "选择", "single", "choice"]) {
            QuestionType::SingleChoice
        } else if contains(&["填空", "blank"]) {
            QuestionType::FillBlank
        } else if contains(&["判断", "judge", "true/false", "true or false"]) {
            QuestionType::Judge
        } else if contains(&["名词解释", "definition"]) {
            QuestionType::WordDefinition
        } else if contains(&["简答", "问答", "论述", "short answer", "essay"]) {
            QuestionType::ShortAnswer
        } else {
            QuestionType::Other
        }
    }
}

impl FromStr for QuestionType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(QuestionType::from_label(s))
    }
}

/// 单选题的选择
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Choice {
    /// A-D 中的一个
    Letter(char),
    /// 其他写法，原样保留
    Other(String),
}

/// 展示层可编辑的答案结构
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum AnswerStructure {
    SingleChoice(Choice),
    /// 排序去重后的大写字母
    MultipleChoice(Vec<char>),
    /// 按空的序号排列，至少一个
    Blanks(Vec<String>),
    /// 无法识别时为 None
    Judge(Option<bool>),
    /// 去掉空行后的文本行
    FreeText(Vec<String>),
}

/// 根据题型把最终答案文本结构化
pub fn structure_answer(question_type: QuestionType, text: &str) -> AnswerStructure {
    match question_type {
        QuestionType::SingleChoice => AnswerStructure::SingleChoice(parse_single_choice(text)),
        QuestionType::MultipleChoice => AnswerStructure::MultipleChoice(parse_multiple_choice(text)),
        QuestionType::FillBlank => AnswerStructure::Blanks(parse_blanks(text)),
        QuestionType::Judge => AnswerStructure::Judge(parse_judge(text)),
        QuestionType::ShortAnswer | QuestionType::WordDefinition | QuestionType::Other => {
            AnswerStructure::FreeText(free_text_lines(text))
        }
    }
}

fn parse_single_choice(text: &str) -> Choice {
    let trimmed = text.trim();
    let first = trimmed.chars().next().map(|c| c.to_ascii_uppercase());
    let second = trimmed.chars().nth(1);

    match first {
        Some(letter @ 'A'..='D')
            if second.map_or(true, |c| !c.is_ascii_alphanumeric()) =>
        {
            Choice::Letter(letter)
        }
        _ => Choice::Other(trimmed.to_string()),
    }
}

fn parse_multiple_choice(text: &str) -> Vec<char> {
    let first_line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let mut letters: Vec<char> = CHOICE_LETTER
        .find_iter(first_line)
        .filter_map(|m| m.as_str().chars().next())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    letters.sort_unstable();
    letters.dedup();
    letters
}

/// 一道题最多的空数，超出的序号忽略
pub const MAX_BLANKS: usize = 100;

/// 提取 `第N空：` / `blank N:` 格式的填空答案
///
/// 没有任何标记时整段文本作为第 1 空。序号超过 `MAX_BLANKS` 的行忽略。
pub fn parse_blanks(text: &str) -> Vec<String> {
    let mut indexed: Vec<(usize, String)> = Vec::new();

    for line in text.lines() {
        if let Some(caps) = BLANK_LINE.captures(line) {
            let index = caps
                .get(1)
                .or_else(|| caps.get(2))
                .and_then(|m| m.as_str().parse::<usize>().ok());
            if let Some(index) = index.filter(|i| (1..=MAX_BLANKS).contains(i)) {
                let value = caps.get(3).map(|m| m.as_str().trim()).unwrap_or("");
                indexed.push((index, value.to_string()));
            }
        }
    }

    if indexed.is_empty() {
        debug!("填空答案中没有有效的空序号，整段作为第 1 空");
        return vec![text.trim().to_string()];
    }

    let len = indexed.iter().map(|(i, _)| *i).max().unwrap_or(1);
    let mut blanks = vec![String::new(); len];
    for (index, value) in indexed {
        blanks[index - 1] = value;
    }
    blanks
}

fn parse_judge(text: &str) -> Option<bool> {
    let trimmed = text.trim();
    let lower = trimmed.to_lowercase();

    const TRUE_PREFIXES: [&str; 5] = ["a", "对", "正确", "true", "√"];
    const FALSE_PREFIXES: [&str; 5] = ["b", "错", "错误", "false", "×"];

    if FALSE_PREFIXES.iter().any(|p| lower.starts_with(p)) {
        return Some(false);
    }
    if TRUE_PREFIXES.iter().any(|p| lower.starts_with(p)) {
        return Some(true);
    }
    None
}

fn free_text_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}
