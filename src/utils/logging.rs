//! 日志工具模块
//!
//! 提供日志初始化、格式化和输出的辅助函数

use anyhow::Result;
use std::fs;
use std::io::Write;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::models::{AggregationResult, BatchReport, ProviderRoster};

/// 初始化 tracing 日志
///
/// 支持 `RUST_LOG` 环境变量，默认 info 级别；重复调用不会报错。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 初始化日志文件
///
/// # 参数
/// - `log_file_path`: 日志文件路径
pub fn init_log_file(log_file_path: &str) -> Result<()> {
    let log_header = format!(
        "{}\n多 AI 答题日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)?;
    Ok(())
}

/// 向日志文件追加一段内容
pub fn append_log(log_file_path: &str, content: &str) -> Result<()> {
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path)?;
    writeln!(file, "{}", content)?;
    Ok(())
}

/// 记录程序启动信息
///
/// # 参数
/// - `roster`: 当前的 AI 配置
pub fn log_startup(roster: &ProviderRoster) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 多 AI 并发答题模式");
    let enabled: Vec<&str> = roster
        .configs()
        .iter()
        .filter(|p| p.enabled)
        .map(|p| p.display_name.as_str())
        .collect();
    info!("🤖 已启用的 AI: {}", enabled.join("、"));
    match roster.favorite().and_then(|id| roster.get(id)) {
        Some(favorite) => info!("⭐ 权重 AI: {}", favorite.display_name),
        None => info!("⭐ 未设置权重 AI"),
    }
    info!("{}", "=".repeat(60));
}

/// 记录批次开始信息
///
/// # 参数
/// - `batch`: 批次描述（如 "批次 3"）
/// - `question_count`: 本批题目数
/// - `provider_count`: 参与的 AI 数
pub fn log_batch_start(batch: &str, question_count: usize, provider_count: usize) {
    info!("\n{}", "=".repeat(60));
    info!("📦 开始 {}", batch);
    info!("📄 题目: {} 道 | AI: {} 个", question_count, provider_count);
    info!("{}", "=".repeat(60));
}

/// 记录批次完成信息
pub fn log_batch_complete(report: &BatchReport) {
    info!("\n{}", "─".repeat(60));
    info!(
        "✓ {} 完成: 成功 {}/{}",
        report.id,
        report.success_count(),
        report.outcomes.len()
    );
    for (provider, outcome) in &report.outcomes {
        info!("   [{}] {}", provider, outcome);
    }
    info!("{}", "─".repeat(60));
}

/// 把单题投票结果格式化成日志文本
pub fn format_result(result: &AggregationResult) -> String {
    let mut lines = vec![format!(
        "问题{} 最终答案: {}{}",
        result.question_number,
        truncate_text(&result.final_answer_text.replace('\n', " / "), 80),
        if result.low_confidence { " (低置信度)" } else { "" }
    )];
    for group in &result.voting_trace {
        let members: Vec<String> = group
            .members
            .iter()
            .map(|(id, weight)| format!("{}×{}", id, weight))
            .collect();
        lines.push(format!(
            "    票数 {} 权重 {} [{}] {}",
            group.count,
            group.weight,
            members.join(", "),
            truncate_text(&group.display.replace('\n', " / "), 40)
        ));
    }
    lines.join("\n")
}

/// 打印最终统计信息
///
/// # 参数
/// - `results`: 各题的投票结果
/// - `unanswered`: 没有任何 AI 回答的题目数
/// - `log_file_path`: 日志文件路径
pub fn print_final_stats(results: &[AggregationResult], unanswered: usize, log_file_path: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    for result in results {
        info!("{}", format_result(result));
    }
    info!("{}", "=".repeat(60));
    let low = results.iter().filter(|r| r.low_confidence).count();
    info!("✅ 已得出答案: {}", results.len());
    info!("⚠️ 低置信度: {}", low);
    info!("❌ 无答案: {}", unanswered);
    info!("{}", "=".repeat(60));
    info!("\n日志已保存至: {}", log_file_path);
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("你好世界", 2), "你好...");
        assert_eq!(truncate_text("abc", 5), "abc");
    }

    #[test]
    fn test_init_is_idempotent() {
        init(false);
        init(true);
    }

    #[test]
    fn test_log_file_header_and_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.txt");
        let path = path.to_string_lossy().to_string();

        init_log_file(&path).unwrap();
        append_log(&path, "问题1 最终答案: A").unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with(&"=".repeat(60)));
        assert!(content.contains("多 AI 答题日志"));
        assert!(content.ends_with("问题1 最终答案: A\n"));
    }
}
