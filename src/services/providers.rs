//! 各 AI 页面的选择器与时间参数
//!
//! 每个 AI 的页面结构不同，但交互步骤一致：
//! 填写输入框 → 提交 → 找到回复节点 → 判断是否仍在生成 → 读取内容。
//! 差异全部收敛在 `ProviderProfile` 中，由注入脚本统一解释。

use serde::Serialize;
use std::time::Duration;

use crate::models::ProviderId;

/// 输入框的填写方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMethod {
    /// textarea 直接赋值并触发 input 事件
    TextareaValue,
    /// contenteditable 编辑器，模拟粘贴
    ContentEditablePaste,
    /// contenteditable 编辑器，execCommand('insertText')
    ExecCommandInsert,
    /// 清空编辑器后按段落写入 <p>
    ParagraphReplace,
}

/// 提交方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubmitMethod {
    /// 在输入框上按回车
    EnterKey,
    /// 等待按钮可用后点击
    Button { selector: &'static str },
    /// 先按回车，输入框未清空时再点击按钮
    EnterThenButton { selector: &'static str },
}

/// 取第一个还是最后一个回复节点
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponsePick {
    First,
    Last,
}

/// 判断"正在生成"的依据（任一成立即视为正在生成）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GeneratingIndicator {
    /// 页面上存在停止按钮
    StopControl { selector: &'static str },
    /// 回复节点中存在停止按钮
    StopInResponse { selector: &'static str },
    /// 回复节点（或其父节点）中缺少复制 / 工具栏
    MissingControl {
        selector: &'static str,
        in_parent: bool,
    },
    /// 内容节点带有流式输出的类名
    StreamingClass { class_name: &'static str },
    /// 回复节点中出现指定文字的元素，且没有完成标记
    StopText {
        text: &'static str,
        done_selector: &'static str,
    },
}

/// 完成检测的时间参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionTiming {
    /// 提交后等待多久才开始轮询
    pub settle: Duration,
    /// 轮询间隔
    pub poll_interval: Duration,
    /// 连续多少次内容不变才算完成
    pub required_stability: u32,
    /// 最大轮询次数
    pub max_checks: u32,
    /// 少于这个长度的内容不算真正的回复
    pub min_content_len: usize,
}

impl CompletionTiming {
    /// 轮询上限对应的总时长
    pub fn ceiling(&self) -> Duration {
        self.poll_interval * self.max_checks
    }
}

impl Default for CompletionTiming {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(3),
            poll_interval: Duration::from_millis(250),
            required_stability: 5,
            max_checks: 240,
            min_content_len: 2,
        }
    }
}

/// 单个 AI 的页面描述
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderProfile {
    #[serde(skip)]
    pub provider: ProviderId,
    pub input_selector: &'static str,
    pub input_method: InputMethod,
    pub submit: SubmitMethod,
    pub response_selector: &'static str,
    pub response_pick: ResponsePick,
    /// 回复节点内的正文节点，None 表示回复节点本身就是正文
    pub content_selector: Option<&'static str>,
    pub generating: &'static [GeneratingIndicator],
    /// 代码块节点
    pub code_block_selector: &'static str,
    /// 需要删除的界面元素（代码块上的复制按钮等）
    pub affordance_selectors: &'static [&'static str],
    #[serde(skip)]
    pub timing: CompletionTiming,
}

impl ProviderProfile {
    pub fn for_provider(provider: ProviderId) -> Self {
        let base = CompletionTiming::default();
        match provider {
            ProviderId::Deepseek => Self {
                provider,
                input_selector: "#chat-input",
                input_method: InputMethod::TextareaValue,
                submit: SubmitMethod::EnterKey,
                response_selector: ".ds-markdown--block",
                response_pick: ResponsePick::Last,
                content_selector: None,
                generating: &[GeneratingIndicator::MissingControl {
                    selector: ".ds-icon-button",
                    in_parent: true,
                }],
                code_block_selector: ".md-code-block pre",
                affordance_selectors: &[".md-code-block-action"],
                timing: CompletionTiming {
                    max_checks: 120,
                    ..base
                },
            },
            ProviderId::Kimi => Self {
                provider,
                input_selector: ".chat-input-editor",
                input_method: InputMethod::ContentEditablePaste,
                submit: SubmitMethod::EnterThenButton {
                    selector: ".send-button",
                },
                response_selector: ".segment-assistant",
                response_pick: ResponsePick::Last,
                content_selector: Some(".markdown"),
                generating: &[GeneratingIndicator::StopInResponse {
                    selector: "div[class*=\"stopBlock\"] button",
                }],
                code_block_selector: "pre code",
                affordance_selectors: &[],
                timing: CompletionTiming {
                    settle: Duration::from_secs(2),
                    ..base
                },
            },
            ProviderId::Tongyi => Self {
                provider,
                input_selector: "textarea[class*=\"textarea--\"]",
                input_method: InputMethod::TextareaValue,
                submit: SubmitMethod::Button {
                    selector: "div[class*=\"operateBtn--\"]:not([class*=\"disabled--\"])",
                },
                response_selector: "div[class*=\"answerItem--\"]",
                response_pick: ResponsePick::Last,
                content_selector: Some(".tongyi-markdown"),
                generating: &[GeneratingIndicator::MissingControl {
                    selector: "div[class*=\"tools--\"]",
                    in_parent: false,
                }],
                code_block_selector: "pre code",
                affordance_selectors: &[".tongyi-design-highlighter-right-actions"],
                timing: base,
            },
            ProviderId::Chatglm => Self {
                provider,
                input_selector: ".input-box-inner textarea",
                input_method: InputMethod::TextareaValue,
                submit: SubmitMethod::Button {
                    selector: ".enter_icon",
                },
                response_selector: ".answer",
                response_pick: ResponsePick::Last,
                content_selector: Some(".markdown-body"),
                generating: &[GeneratingIndicator::StopControl {
                    selector: ".enter.searching",
                }],
                code_block_selector: "pre code",
                affordance_selectors: &[],
                timing: CompletionTiming {
                    poll_interval: Duration::from_millis(500),
                    max_checks: 120,
                    ..base
                },
            },
            ProviderId::Doubao => Self {
                provider,
                input_selector: "[data-testid=\"chat_input_input\"]",
                input_method: InputMethod::TextareaValue,
                submit: SubmitMethod::Button {
                    selector: "[data-testid=\"chat_input_send_button\"]",
                },
                response_selector: "[data-testid=\"receive_message\"]",
                response_pick: ResponsePick::Last,
                content_selector: Some("[data-testid=\"message_text_content\"]"),
                generating: &[GeneratingIndicator::StopControl {
                    selector: "[data-testid=\"chat_input_local_break_button\"]:not(.\\!hidden)",
                }],
                code_block_selector: "pre code",
                affordance_selectors: &[],
                timing: CompletionTiming {
                    settle: Duration::from_secs(5),
                    ..base
                },
            },
            ProviderId::Yiyan => Self {
                provider,
                input_selector: ".yc-editor[contenteditable=\"true\"]",
                input_method: InputMethod::ExecCommandInsert,
                submit: SubmitMethod::Button { selector: "#sendBtn" },
                response_selector: ".dialog-card-wrapper",
                response_pick: ResponsePick::First,
                content_selector: Some(".custom-html"),
                generating: &[GeneratingIndicator::StopText {
                    text: "停止生成",
                    done_selector: "#copy-container",
                }],
                code_block_selector: "pre code",
                affordance_selectors: &[],
                timing: CompletionTiming {
                    settle: Duration::from_secs(5),
                    required_stability: 6,
                    ..base
                },
            },
            ProviderId::Xinghuo => Self {
                provider,
                input_selector: "#askwindow-textarea",
                input_method: InputMethod::TextareaValue,
                submit: SubmitMethod::Button {
                    selector: "#ask_window_send_btn",
                },
                response_selector: "[class*=\"ChatWindow_content_gpt__\"]",
                response_pick: ResponsePick::Last,
                content_selector: Some(".result-inner"),
                generating: &[
                    GeneratingIndicator::StopControl {
                        selector: "[class*=\"AskWindow_stop_btn_wrap__\"]",
                    },
                    GeneratingIndicator::StreamingClass {
                        class_name: "result-streaming",
                    },
                    GeneratingIndicator::StreamingClass {
                        class_name: "last-chat-loading",
                    },
                ],
                code_block_selector: "pre code",
                affordance_selectors: &[],
                timing: base,
            },
            ProviderId::Chatgpt => Self {
                provider,
                input_selector: "#prompt-textarea",
                input_method: InputMethod::ExecCommandInsert,
                submit: SubmitMethod::Button {
                    selector: "button[data-testid=\"send-button\"]",
                },
                response_selector: "div[data-message-author-role=\"assistant\"]",
                response_pick: ResponsePick::Last,
                content_selector: Some(".markdown"),
                generating: &[GeneratingIndicator::StopControl {
                    selector: "button[data-testid=\"stop-generating-button\"]",
                }],
                code_block_selector: "pre code",
                affordance_selectors: &[],
                timing: base,
            },
            ProviderId::Gemini => Self {
                provider,
                input_selector: ".ql-editor",
                input_method: InputMethod::ParagraphReplace,
                submit: SubmitMethod::Button {
                    selector: "button.send-button",
                },
                response_selector: ".markdown",
                response_pick: ResponsePick::Last,
                content_selector: None,
                generating: &[GeneratingIndicator::StopControl {
                    selector: ".stop-icon",
                }],
                code_block_selector: "pre code",
                affordance_selectors: &[],
                timing: base,
            },
        }
    }
}
