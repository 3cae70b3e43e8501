//! 焦点轮换
//!
//! 部分 AI 页面在后台时会暂停生成。批次进行期间，定期把每个回答中的窗口
//! 短暂切到前台；快速模式下每轮结束后再切回答题页面。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::debug;

use crate::infrastructure::HostEnvironment;
use crate::orchestrator::target_registry::TargetRegistry;

/// 后台焦点轮换任务，`stop` 或离开作用域时结束
pub struct FocusFlicker {
    task: JoinHandle<()>,
}

impl FocusFlicker {
    /// 启动轮换
    ///
    /// `return_to_host` 为 true 时，每轮结束后把焦点还给答题页面。
    pub fn start(
        registry: Arc<TargetRegistry>,
        host: Arc<dyn HostEnvironment>,
        every: Duration,
        dwell: Duration,
        return_to_host: Arc<AtomicBool>,
    ) -> Self {
        let task = tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // 第一次 tick 立即返回，跳过
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let busy = registry.busy_targets().await;
                if busy.is_empty() {
                    continue;
                }

                for target in &busy {
                    if let Err(e) = host.focus_window(&target.window).await {
                        debug!("[{}] 轮换焦点失败: {}", target.provider, e);
                        continue;
                    }
                    sleep(dwell).await;
                }

                if return_to_host.load(Ordering::Acquire) {
                    if let Err(e) = host.focus_host_page().await {
                        debug!("切回答题页面失败: {}", e);
                    }
                }
            }
        });

        Self { task }
    }

    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for FocusFlicker {
    fn drop(&mut self) {
        self.task.abort();
    }
}
