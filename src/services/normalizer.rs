//! 答案文本规范化
//!
//! DOM 一侧已经处理了列表、代码块和换行；这里去掉残留的界面文字，
//! 统一题号 / 填空标记的写法。

use regex::Regex;
use std::sync::LazyLock;

/// 单独成行时需要删除的界面文字
static UI_LABELS: phf::Set<&'static str> = phf::phf_set! {
    "复制",
    "复制代码",
    "已复制",
    "深色版本",
    "浅色版本",
    "重新生成",
    "分享",
    "Copy",
    "Copy code",
    "Copied!",
    "Toggle theme",
};

/// 可能混在正文中的主题切换文字
static INLINE_THEME_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"深色版本|浅色版本").expect("theme label regex is valid"));

static QUESTION_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"问题\s*(\d+)\s*答案\s*([:：])").expect("question marker regex is valid")
});

static BLANK_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"第\s*(\d+)\s*空\s*([:：])").expect("blank marker regex is valid")
});

static EXTRA_NEWLINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("newline regex is valid"));

/// 占位内容（AI 开始输出前页面上显示的东西）
static PLACEHOLDERS: phf::Set<&'static str> = phf::phf_set! {
    "\u{200b}",
    "...",
    "…",
    "思考中",
    "思考中...",
    "正在思考",
    "正在思考...",
    "正在搜索",
    "Thinking",
    "Thinking...",
};

/// 规范化 AI 返回的文本
pub fn normalize_answer(text: &str) -> String {
    let text = text.replace("\r\n", "\n").replace('\u{a0}', " ");

    let kept: Vec<String> = text
        .lines()
        .filter(|line| !UI_LABELS.contains(line.trim()))
        .map(|line| INLINE_THEME_LABEL.replace_all(line, "").trim_end().to_string())
        .collect();
    let text = kept.join("\n");

    let text = QUESTION_MARKER.replace_all(&text, "问题${1}答案${2}");
    let text = BLANK_MARKER.replace_all(&text, "第${1}空${2}");
    let text = EXTRA_NEWLINES.replace_all(&text, "\n\n");

    text.trim().to_string()
}

/// 是否只是占位内容
pub fn is_placeholder(text: &str) -> bool {
    let trimmed = text.trim_matches(|c: char| c.is_whitespace() || c == '\u{200b}');
    trimmed.is_empty() || PLACEHOLDERS.contains(trimmed) || PLACEHOLDERS.contains(text.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_ui_labels() {
        let raw = "问题1答案:\n复制\nprint(1)\n深色版本\nCopy code\n";
        assert_eq!(normalize_answer(raw), "问题1答案:\nprint(1)");
    }

    #[test]
    fn test_keeps_copy_inside_sentences() {
        let raw = "复制粘贴是常见操作";
        assert_eq!(normalize_answer(raw), "复制粘贴是常见操作");
    }

    #[test]
    fn test_canonicalizes_markers() {
        let raw = "问题 1 答案：\n第 1 空 ：北京\n第2空:上海";
        assert_eq!(normalize_answer(raw), "问题1答案：\n第1空：北京\n第2空:上海");
    }

    #[test]
    fn test_collapses_blank_lines() {
        let raw = "问题1答案:\nA   \n\n\n\n问题2答案:\nB\r\n";
        assert_eq!(normalize_answer(raw), "问题1答案:\nA\n\n问题2答案:\nB");
    }

    #[test]
    fn test_placeholder_detection() {
        assert!(is_placeholder(""));
        assert!(is_placeholder("\u{200b}"));
        assert!(is_placeholder("  思考中... "));
        assert!(!is_placeholder("A"));
        assert!(!is_placeholder("问题1答案:A"));
    }
}
