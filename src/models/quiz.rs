//! 题目与提示词组装
//!
//! 题目本身由外部从答题页面提取，这里只负责把题目和回答模板拼成发送给 AI 的文本。

use serde::{Deserialize, Serialize};

use super::question_type::QuestionType;

/// 一道待回答的题目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    /// 题号
    pub number: u32,
    /// 题型标签（原样显示，如 "单选题"）
    #[serde(rename = "type")]
    pub type_label: String,
    /// 题干
    pub content: String,
    /// 选项（"A. xxx"）
    #[serde(default)]
    pub options: Vec<String>,
    /// 填空题的空数
    #[serde(default)]
    pub blank_count: u32,
}

impl QuizQuestion {
    pub fn question_type(&self) -> QuestionType {
        QuestionType::from_label(&self.type_label)
    }

    /// 单题文本：`题号 题型\n题干\n选项...`
    pub fn render(&self) -> String {
        let mut text = format!("{} {}\n{}", self.number, self.type_label, self.content);
        if !self.options.is_empty() {
            text.push('\n');
            text.push_str(&self.options.join("\n"));
        }
        if self.question_type() == QuestionType::FillBlank && self.blank_count > 0 {
            text.push_str(&format!("\n(本题共有 {} 个空，请按顺序填写)", self.blank_count));
        }
        text
    }
}

/// 回答模板
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerTemplate {
    /// 只要答案，便于自动解析
    #[default]
    Concise,
    /// 答案后附带解析，题量大时不建议使用
    Detailed,
}

const CONCISE_PROMPT: &str = "请用中文回答以下题目。
每个答案必须以\"问题X答案:\"开头，X为题号，格式如下：

选择题：
问题1答案:
A

多选题（分号分隔）：
问题2答案:
A;B;C

填空题（题目有几个空就写几个\"第N空：\"，数字两边不要有空格）：
问题3答案:
第1空：xxx
第2空：xxx

判断题：
问题4答案:
A. 对

简答题 / 名词解释（数字列表）：
问题5答案:
1. xxx
2. xxx

要求：
1. 选择题只给选项字母，不带选项内容
2. 答案之间空一行
3. 不要添加解释性文字
4. 除非题目要求英文，否则一律用中文回答

题目如下：
";

const DETAILED_PROMPT: &str = "请用中文回答以下题目。
每个答案必须以\"问题X答案:\"开头，X为题号，先给出标准答案，再给出\"解析：\"：

选择题：
问题1答案:
A
解析：
1. 选择A的原因
2. 其他选项错误的原因

多选题（分号分隔）：
问题2答案:
A;B;C
解析：
1. 各选项的理由

填空题：
问题3答案:
第1空：xxx
第2空：xxx
解析：
1. 每个空的解释

判断题：
问题4答案:
A. 对
解析：
1. 判断依据

简答题 / 名词解释（数字列表）：
问题5答案:
1. xxx
2. xxx
解析：
1. 要点说明

要求：
1. 选择题只给选项字母，填空题用\"第N空：\"格式
2. 解析分点说明，每点一行
3. 答案之间空一行
4. 除非题目要求英文，否则一律用中文回答

题目如下：
";

impl AnswerTemplate {
    pub fn prompt(self) -> &'static str {
        match self {
            AnswerTemplate::Concise => CONCISE_PROMPT,
            AnswerTemplate::Detailed => DETAILED_PROMPT,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AnswerTemplate::Concise => "简洁模式",
            AnswerTemplate::Detailed => "解析模式",
        }
    }
}

/// 组装发送给 AI 的完整文本：提示词 + 空行 + 各题（空行分隔）
pub fn compose_prompt(prompt: &str, questions: &[QuizQuestion]) -> String {
    let body = questions
        .iter()
        .map(QuizQuestion::render)
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("{}\n\n{}", prompt.trim_end(), body)
}
