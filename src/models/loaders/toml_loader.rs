use crate::models::quiz::QuizQuestion;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

/// 题目文件内容
///
/// ```toml
/// title = "第三章测验"
///
/// [[questions]]
/// number = 1
/// type = "单选题"
/// content = "..."
/// options = ["A. ...", "B. ..."]
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuizFile {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub questions: Vec<QuizQuestion>,
    #[serde(skip)]
    pub file_path: Option<String>,
}

/// 从 TOML 文件加载题目列表
pub async fn load_quiz_file(toml_file_path: &Path) -> Result<QuizFile> {
    let content = fs::read_to_string(toml_file_path)
        .await
        .with_context(|| format!("无法读取TOML文件: {}", toml_file_path.display()))?;

    let mut quiz: QuizFile = toml::from_str(&content)
        .with_context(|| format!("无法解析TOML文件: {}", toml_file_path.display()))?;

    // 按题号排序并去掉重复题号
    quiz.questions.sort_by_key(|q| q.number);
    let before = quiz.questions.len();
    quiz.questions.dedup_by_key(|q| q.number);
    if quiz.questions.len() != before {
        tracing::warn!(
            "{} 中有 {} 道重复题号的题目已忽略",
            toml_file_path.display(),
            before - quiz.questions.len()
        );
    }

    quiz.file_path = Some(toml_file_path.to_string_lossy().to_string());
    tracing::info!("成功加载 {} 个题目", quiz.questions.len());

    Ok(quiz)
}
