//! 自动化目标模型
//!
//! 一个自动化目标 = 一个 AI 的窗口 + 该窗口中的执行上下文

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

use super::ProviderId;

/// 执行上下文句柄（页面 / 标签页）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextHandle(pub String);

/// 窗口句柄
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowHandle(pub String);

impl Display for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 目标状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetState {
    /// 尚未创建
    #[default]
    Absent,
    /// 窗口已创建，正在握手
    Launching,
    /// 握手通过，可以发送问题
    Ready,
    /// 正在回答问题
    Busy,
    /// 握手或发送失败，下次使用前需要重新验证
    Stale,
}

impl TargetState {
    /// 可以直接复用（仍需验证窗口是否存活）
    pub fn is_usable(self) -> bool {
        matches!(self, TargetState::Ready | TargetState::Busy)
    }
}

/// 自动化目标
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutomationTarget {
    pub provider: ProviderId,
    pub window: WindowHandle,
    pub context: ContextHandle,
    pub state: TargetState,
}

impl AutomationTarget {
    pub fn new(provider: ProviderId, window: WindowHandle, context: ContextHandle) -> Self {
        Self {
            provider,
            window,
            context,
            state: TargetState::Launching,
        }
    }
}

/// 屏幕矩形（像素）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(left: i32, top: i32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> i32 {
        self.left + self.width as i32
    }

    pub fn bottom(&self) -> i32 {
        self.top + self.height as i32
    }

    /// 两个矩形是否重叠（边界相接不算）
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.left < other.right()
            && other.left < self.right()
            && self.top < other.bottom()
            && other.top < self.bottom()
    }
}
