use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::error::{AppResult, BrowserError};

/// 连接到浏览器并找到答题页面
///
/// 依次按 URL 前缀和标题查找已打开的页面，都找不到时新建一个并导航到 `host_url`。
pub async fn connect_to_browser_and_page(
    port: u16,
    host_url: Option<&str>,
    host_title: Option<&str>,
) -> AppResult<(Browser, Page)> {
    let browser_url = format!("http://localhost:{}", port);
    info!("正在连接到浏览器: {}", browser_url);
    debug!("答题页面 URL: {:?}, 标题: {:?}", host_url, host_title);

    let (browser, mut handler) = Browser::connect(&browser_url).await.map_err(|e| {
        error!("连接浏览器失败: {}", e);
        BrowserError::ConnectionFailed {
            port,
            reason: e.to_string(),
        }
    })?;
    debug!("浏览器连接成功");

    // 在后台处理浏览器事件
    tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    // 添加短暂延迟以等待浏览器状态同步
    sleep(tokio::time::Duration::from_millis(300)).await;

    let pages = browser.pages().await?;
    debug!("获取到 {} 个页面", pages.len());

    if let Some(url) = host_url.filter(|u| *u != "about:blank") {
        for p in pages.iter() {
            if let Ok(Some(page_url)) = p.url().await {
                if page_url.starts_with(url) {
                    info!("✓ 找到答题页面: {}", page_url);
                    return Ok((browser, p.clone()));
                }
            }
        }
    }

    if let Some(title) = host_title {
        debug!("正在查找标题包含 '{}' 的页面", title);
        for p in pages.iter() {
            if let Ok(Some(page_title)) = p.get_title().await {
                if page_title.contains(title) {
                    info!("✓ 找到答题页面: {}", page_title);
                    return Ok((browser, p.clone()));
                }
            }
        }
    }

    debug!("未找到答题页面，将创建新页面");
    let url = host_url.unwrap_or("about:blank");
    let page = browser.new_page("about:blank").await.map_err(|e| {
        error!("创建新页面失败: {}", e);
        BrowserError::WindowCreationFailed(e.to_string())
    })?;
    if url != "about:blank" {
        page.goto(url).await.map_err(|e| {
            error!("导航到 {} 失败: {}", url, e);
            BrowserError::NavigationFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        })?;
        info!("已导航到: {}", url);
    }

    Ok((browser, page))
}
