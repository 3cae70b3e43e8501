//! JS 执行器 - 基础设施层
//!
//! 持有唯一的 page 资源，只暴露"执行 JS"的能力

use async_trait::async_trait;
use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::error::AppResult;

/// 执行页面脚本的能力
///
/// AI 适配器只通过这个接口接触页面，测试中可以用脚本化的假实现替换。
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    /// 执行 JS 代码并返回 JSON 结果
    async fn eval(&self, js_code: String) -> AppResult<JsonValue>;
}

/// 执行 JS 代码并反序列化为指定类型
pub async fn eval_as<T: DeserializeOwned>(
    runner: &dyn ScriptRunner,
    js_code: impl Into<String>,
) -> AppResult<T> {
    let json_value = runner.eval(js_code.into()).await?;
    let typed_value = serde_json::from_value(json_value)?;
    Ok(typed_value)
}

/// JS 执行器
///
/// 职责：
/// - 持有唯一的 Page 资源
/// - 暴露 eval() 能力
/// - 不认识 AI / 题目
/// - 不处理业务流程
#[derive(Clone)]
pub struct JsExecutor {
    page: Page,
}

impl JsExecutor {
    /// 创建新的 JS 执行器
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// 获取 page 的引用（用于其他操作）
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// 执行 JS 代码并反序列化为指定类型
    pub async fn eval_as<T: DeserializeOwned>(&self, js_code: impl Into<String>) -> AppResult<T> {
        eval_as(self, js_code).await
    }
}

#[async_trait]
impl ScriptRunner for JsExecutor {
    async fn eval(&self, js_code: String) -> AppResult<JsonValue> {
        let result = self.page.evaluate(js_code).await?;
        let json_value = result.into_value()?;
        Ok(json_value)
    }
}
