//! # Quiz Consensus
//!
//! 把一组题目同时发给多个 AI 对话网页，等待各自回答完毕，
//! 再按加权多数投票得出每道题的最终答案。
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（Page、窗口、消息通道），只暴露能力
//! - `JsExecutor` / `ScriptRunner` - 在页面中执行 JS
//! - `HostEnvironment` - 窗口的创建、关闭、聚焦与查询
//! - `MessageBus` - 调度端与各 AI 上下文之间的请求 / 广播
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"
//! - `AdapterStrategy` / `DomStrategy` - 在某个 AI 页面上提交问题、读取回复
//! - `normalizer` / `answer_parser` - 回复规范化与按题拆分
//! - `voting` - 加权多数投票
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个 AI 回答一个问题"的完整流程
//! - `CompletionTracker` - 完成检测状态机
//! - `ProviderAdapter` - 提交 → 等待 → 稳定检测
//! - `ProviderContext` - 挂在 AI 窗口上，回应总线请求并发出答案
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/target_registry` - 每个 AI 一个窗口，创建与握手
//! - `orchestrator/dispatch` - 批次分发与运行模式
//! - `orchestrator/aggregation` - 答案聚合
//! - `orchestrator/session` / `orchestrator/app` - 组装与生命周期
//!
//! ## 模块结构

pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use browser::{connect_to_browser_and_page, ChromiumHost};
pub use config::{Config, SessionSettings, SettingsStore, TomlSettingsStore};
pub use error::{AppError, AppResult};
pub use infrastructure::{HostEnvironment, JsExecutor, LocalBus, MessageBus};
pub use models::{AggregationResult, ProviderId, ProviderRoster, QuizQuestion};
pub use orchestrator::{AggregationEngine, App, DispatchCoordinator, Session, TargetRegistry};
pub use workflow::{CompletionTracker, ProviderAdapter, ProviderContext};
