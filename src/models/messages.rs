//! 消息总线上的消息类型
//!
//! 与传输方式无关，字段名与浏览器扩展中的 JSON 消息保持一致。

use serde::{Deserialize, Serialize};

use super::target::{ContextHandle, WindowHandle};
use super::ProviderId;

/// 调度端发给 AI 上下文的请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BusRequest {
    /// 握手：页面是否可以接收问题
    CheckReady,
    /// 发送问题
    AskQuestion { question: String },
}

/// AI 上下文对请求的响应
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BusResponse {
    Ready {
        ready: bool,
    },
    Ask {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl BusResponse {
    pub fn accepted() -> Self {
        BusResponse::Ask {
            success: true,
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        BusResponse::Ask {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// 广播事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BusEvent {
    /// AI 回答完毕（或稳定检测超时后的尽力结果）
    AnswerReady {
        #[serde(rename = "providerId")]
        provider_id: ProviderId,
        answer: String,
        #[serde(default)]
        timed_out: bool,
    },
    /// 请求把某个 AI 的窗口切到前台（手动重试时使用）
    SwitchTarget {
        #[serde(rename = "providerId")]
        provider_id: ProviderId,
    },
    /// 宿主环境的生命周期通知
    Lifecycle(LifecycleEvent),
}

/// 生命周期通知（由宿主环境产生，本系统只消费）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LifecycleEvent {
    ContextCreated { context: ContextHandle },
    NavigationComplete { context: ContextHandle, url: String },
    ContextClosed { context: ContextHandle },
    WindowClosed { window: WindowHandle },
    /// 答题页面被关闭
    HostPageClosed,
    /// 答题页面被重新加载
    HostPageReloaded,
}
