//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责窗口管理、批次分发和结果聚合，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `app` - 应用入口
//! - 管理应用生命周期（初始化、运行、清理）
//! - 持有浏览器资源
//!
//! ### `session` - 答题会话
//! - 组装设置、注册表、调度器和聚合引擎
//! - 配置修改的持久化
//!
//! ### `target_registry` / `layout` - 自动化目标
//! - 每个 AI 一个窗口，创建、握手、复用、失效
//! - 窗口平铺
//!
//! ### `dispatch` / `focus` - 分发调度
//! - 并发分发、待完成集合、运行模式、发送重试
//! - 焦点轮换
//!
//! ### `aggregation` - 答案聚合
//! - 按题拆分答案、加权投票、手动编辑
//!
//! ## 层次关系
//!
//! ```text
//! app → session
//!         ├─ dispatch ─→ target_registry ─→ infrastructure::HostEnvironment
//!         │      └──────→ infrastructure::MessageBus ─→ workflow::ProviderContext
//!         └─ aggregation ─→ services (answer_parser / voting)
//! ```

pub mod aggregation;
pub mod app;
pub mod dispatch;
pub mod focus;
pub mod layout;
pub mod session;
pub mod target_registry;

// 重新导出主要类型
pub use aggregation::AggregationEngine;
pub use app::App;
pub use dispatch::{AnswerSink, DispatchCoordinator, DispatchOptions};
pub use focus::FocusFlicker;
pub use session::Session;
pub use target_registry::{RegistryOptions, TargetRegistry};
