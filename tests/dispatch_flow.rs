//! 分发流程测试：用内存宿主环境代替浏览器

mod common;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_test::{assert_err, assert_ok};

use common::*;
use quiz_consensus::infrastructure::MessageBus;
use quiz_consensus::models::{
    BusEvent, ChatStrategy, DispatchBatch, LifecycleEvent, ProviderId, ProviderOutcome, RunMode,
    TargetState,
};
use quiz_consensus::orchestrator::{
    AnswerSink, DispatchCoordinator, DispatchOptions, Session, TargetRegistry,
};

use ProviderId::{Chatglm, Deepseek, Kimi, Tongyi};

fn session_with(
    host: &Arc<FakeHost>,
    bus: &Arc<quiz_consensus::infrastructure::LocalBus>,
    store: Arc<MemoryStore>,
) -> Session {
    Session::new(
        store,
        host.clone(),
        bus.clone(),
        registry_options(),
        dispatch_options(),
    )
    .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_all_providers_answer() {
    let bus = new_bus();
    let host = FakeHost::new(bus.clone());
    host.set_behavior(Kimi, answer("问题1答案: A\n问题2答案: B", 500));
    host.set_behavior(Deepseek, answer("问题1答案: A\n问题2答案: C", 800));
    host.set_behavior(Tongyi, answer("问题1答案: B\n问题2答案: C", 300));
    let store = MemoryStore::with_settings(settings_with(&[(Kimi, 1), (Deepseek, 2), (Tongyi, 1)]));
    let session = session_with(&host, &bus, store);

    let report = session
        .send_all(&[question(1, "第一题"), question(2, "第二题")])
        .await
        .unwrap();

    assert_eq!(report.success_count(), 3);
    assert!(report.failed().is_empty());

    let results = session.final_answers().await;
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].final_answer_text, "A");
    assert_eq!(results[1].final_answer_text, "C");
    assert_eq!(host.open_windows(), vec![Kimi, Deepseek, Tongyi]);
}

#[tokio::test(start_paused = true)]
async fn test_window_closed_mid_stream() {
    let bus = new_bus();
    let host = FakeHost::new(bus.clone());
    host.set_behavior(Kimi, Behavior::Silent);
    host.set_behavior(Deepseek, answer("问题1答案: A", 1000));
    host.set_behavior(Tongyi, answer("问题1答案: A", 1000));
    let store = MemoryStore::with_settings(settings_with(&[(Kimi, 2), (Deepseek, 1), (Tongyi, 1)]));
    let session = session_with(&host, &bus, store);

    let closer = host.clone();
    tokio::spawn(async move {
        sleep(Duration::from_secs(2)).await;
        closer.close_by_user(Kimi).await;
    });

    let started = Instant::now();
    let report = session.send_all(&[question(1, "题目")]).await.unwrap();

    // 不需要等到批次超时
    assert!(started.elapsed() < dispatch_options().hard_timeout);
    assert_eq!(report.outcomes[&Kimi], ProviderOutcome::Closed);
    assert_eq!(report.success_count(), 2);

    let results = session.final_answers().await;
    assert_eq!(results[0].final_answer_text, "A");
    assert_eq!(results[0].membership_count(Kimi), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failures_are_contained_per_provider() {
    let bus = new_bus();
    let host = FakeHost::new(bus.clone());
    host.set_behavior(Kimi, Behavior::Reject("busy".into()));
    host.set_behavior(Deepseek, Behavior::NeverReady);
    host.set_behavior(Tongyi, Behavior::FailCreate);
    host.set_behavior(Chatglm, answer("问题1答案: D", 200));
    let session = session_with(&host, &bus, MemoryStore::with_settings(settings_with(&[
        (Kimi, 1),
        (Deepseek, 1),
        (Tongyi, 1),
        (Chatglm, 1),
    ])));

    let report = session.send_all(&[question(1, "题目")]).await.unwrap();

    assert_eq!(report.outcomes[&Kimi], ProviderOutcome::Rejected("busy".into()));
    assert!(matches!(
        &report.outcomes[&Deepseek],
        ProviderOutcome::Unavailable(reason) if reason.contains("握手")
    ));
    assert!(matches!(report.outcomes[&Tongyi], ProviderOutcome::Unavailable(_)));
    assert_eq!(report.outcomes[&Chatglm], ProviderOutcome::Answered { timed_out: false });

    assert_eq!(session.registry().state(Deepseek).await, TargetState::Stale);
    assert_eq!(session.registry().state(Tongyi).await, TargetState::Absent);
    assert_eq!(
        session.final_answers().await[0].final_answer_text,
        "D"
    );
}

#[tokio::test(start_paused = true)]
async fn test_batch_timeout_marks_pending_as_timed_out() {
    let bus = new_bus();
    let host = FakeHost::new(bus.clone());
    host.set_behavior(Kimi, Behavior::Silent);
    host.set_behavior(Deepseek, answer("问题1答案: A", 100));
    let session = session_with(
        &host,
        &bus,
        MemoryStore::with_settings(settings_with(&[(Kimi, 1), (Deepseek, 1)])),
    );

    let started = Instant::now();
    let report = session.send_all(&[question(1, "题目")]).await.unwrap();

    assert!(started.elapsed() >= dispatch_options().hard_timeout);
    assert_eq!(report.outcomes[&Kimi], ProviderOutcome::TimedOut);
    assert_eq!(report.outcomes[&Deepseek], ProviderOutcome::Answered { timed_out: false });
    assert_eq!(session.registry().state(Kimi).await, TargetState::Stale);
}

#[tokio::test(start_paused = true)]
async fn test_late_answer_is_still_ingested() {
    let bus = new_bus();
    let host = FakeHost::new(bus.clone());
    host.set_behavior(Kimi, answer("问题1答案: B", 15_000));
    host.set_behavior(Deepseek, answer("问题1答案: A", 100));
    let session = session_with(
        &host,
        &bus,
        MemoryStore::with_settings(settings_with(&[(Kimi, 1), (Deepseek, 1)])),
    );
    session.start().await;

    let report = session.send_all(&[question(1, "题目")]).await.unwrap();
    assert_eq!(report.outcomes[&Kimi], ProviderOutcome::TimedOut);
    assert_eq!(session.final_answers().await[0].membership_count(Kimi), 0);

    sleep(Duration::from_secs(10)).await;
    settle().await;

    let results = session.final_answers().await;
    assert_eq!(results[0].membership_count(Kimi), 1);
    assert_eq!(results[0].voting_trace.len(), 2);
    // 超时时标记为失效，收到答案后恢复就绪
    assert_eq!(session.registry().state(Kimi).await, TargetState::Ready);
    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_slow_target_after_deadline_is_not_left_busy() {
    let bus = new_bus();
    let host = FakeHost::new(bus.clone());
    host.set_behavior(Kimi, Behavior::Silent);
    host.set_create_delay(Kimi, Duration::from_secs(3));
    host.set_behavior(Deepseek, answer("问题1答案: A", 100));
    let session = Session::new(
        MemoryStore::with_settings(settings_with(&[(Kimi, 1), (Deepseek, 1)])),
        host.clone(),
        bus.clone(),
        registry_options(),
        DispatchOptions {
            hard_timeout: Duration::from_secs(2),
            ..dispatch_options()
        },
    )
    .unwrap();

    let report = session.send_all(&[question(1, "题目")]).await.unwrap();
    assert_eq!(report.outcomes[&Kimi], ProviderOutcome::TimedOut);

    // 原本的创建完成时间已经过去
    sleep(Duration::from_secs(5)).await;
    settle().await;

    assert!(session.registry().busy_targets().await.is_empty());
    assert_ne!(session.registry().state(Kimi).await, TargetState::Busy);
    assert!(!host.open_windows().contains(&Kimi));
}

/// 记录每个 AI 的答案被收入的次数
#[derive(Default)]
struct CountingSink {
    accepted: Mutex<HashMap<ProviderId, usize>>,
}

impl CountingSink {
    fn count(&self, provider: ProviderId) -> usize {
        self.accepted
            .lock()
            .unwrap()
            .get(&provider)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl AnswerSink for CountingSink {
    async fn accept(&self, provider: ProviderId, _answer: &str, _timed_out: bool) {
        *self.accepted.lock().unwrap().entry(provider).or_default() += 1;
    }
}

#[tokio::test(start_paused = true)]
async fn test_each_answer_is_accepted_once() {
    let bus = new_bus();
    let host = FakeHost::new(bus.clone());
    host.set_behavior(Kimi, answer("问题1答案: A", 500));
    host.set_behavior(Deepseek, answer("问题1答案: B", 800));
    let sink = Arc::new(CountingSink::default());
    let registry = Arc::new(TargetRegistry::new(
        host.clone(),
        as_bus(&bus),
        registry_options(),
    ));
    let coordinator =
        DispatchCoordinator::new(registry, as_bus(&bus), host.clone(), dispatch_options())
            .with_sink(sink.clone());
    assert!(!coordinator.is_dispatching());

    // 批次进行中，另一个 AI 发来不属于本批次的答案
    let watcher = coordinator.clone();
    let publisher = bus.clone();
    let during = tokio::spawn(async move {
        sleep(Duration::from_millis(200)).await;
        publisher.publish(BusEvent::AnswerReady {
            provider_id: Tongyi,
            answer: "问题1答案: C".to_string(),
            timed_out: false,
        });
        watcher.is_dispatching()
    });

    let batch = DispatchBatch::new(
        "题目",
        RunMode::Stable,
        vec![Kimi, Deepseek],
        Duration::from_secs(10),
    );
    let report = coordinator.dispatch(batch, ChatStrategy::Continuous).await;

    assert_eq!(report.success_count(), 2);
    assert!(assert_ok!(during.await));
    assert!(!coordinator.is_dispatching());
    assert_eq!(sink.count(Kimi), 1);
    assert_eq!(sink.count(Deepseek), 1);
    assert_eq!(sink.count(Tongyi), 1);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_provider_answer_is_not_counted() {
    let bus = new_bus();
    let host = FakeHost::new(bus.clone());
    host.set_behavior(Kimi, answer("问题1答案: B", 100));
    host.set_behavior(Tongyi, answer("问题1答案: B", 200));
    host.set_behavior(Deepseek, answer("问题1答案: A", 300));
    let store = MemoryStore::with_settings(settings_with(&[(Kimi, 1), (Tongyi, 1), (Deepseek, 1)]));
    let session = session_with(&host, &bus, store);
    session.start().await;

    session.send_all(&[question(1, "题目")]).await.unwrap();
    assert_eq!(session.final_answers().await[0].final_answer_text, "B");

    assert_ok!(session.set_enabled(Kimi, false).await);
    assert_ok!(session.set_enabled(Tongyi, false).await);
    let results = session.final_answers().await;
    assert_eq!(results[0].final_answer_text, "A");
    assert_eq!(results[0].membership_count(Kimi), 0);
    assert_eq!(results[0].voting_trace.len(), 1);
    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_fast_mode_returns_focus_after_first_submission() {
    let bus = new_bus();
    let host = FakeHost::new(bus.clone());
    host.set_behavior(Kimi, answer("问题1答案: A", 3000));
    host.set_behavior(Deepseek, answer("问题1答案: A", 3000));
    let mut settings = settings_with(&[(Kimi, 1), (Deepseek, 1)]);
    settings.run_mode = RunMode::Fast;
    let session = session_with(&host, &bus, MemoryStore::with_settings(settings));

    let started = Instant::now();
    session.send_all(&[question(1, "题目")]).await.unwrap();

    let first_host_focus = host
        .focus_log()
        .into_iter()
        .find(|(focus, _)| *focus == Focus::Host)
        .map(|(_, at)| at)
        .unwrap();
    assert!(first_host_focus < started + Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_stable_mode_returns_focus_only_when_all_done() {
    let bus = new_bus();
    let host = FakeHost::new(bus.clone());
    host.set_behavior(Kimi, answer("问题1答案: A", 3000));
    host.set_behavior(Deepseek, answer("问题1答案: A", 3000));
    let session = session_with(
        &host,
        &bus,
        MemoryStore::with_settings(settings_with(&[(Kimi, 1), (Deepseek, 1)])),
    );

    let started = Instant::now();
    session.send_all(&[question(1, "题目")]).await.unwrap();

    let log = host.focus_log();
    let host_focus: Vec<Instant> = log
        .iter()
        .filter(|(focus, _)| *focus == Focus::Host)
        .map(|(_, at)| *at)
        .collect();
    assert!(!host_focus.is_empty());
    assert!(host_focus
        .iter()
        .all(|at| *at >= started + Duration::from_secs(3)));

    // 回答期间焦点在各个 AI 窗口之间轮换
    assert!(log
        .iter()
        .any(|(focus, at)| *focus == Focus::Window(Kimi) && *at > started + Duration::from_secs(1)));
}

#[tokio::test(start_paused = true)]
async fn test_single_chat_strategy_closes_windows() {
    let bus = new_bus();
    let host = FakeHost::new(bus.clone());
    host.set_behavior(Kimi, answer("问题1答案: A", 100));
    host.set_behavior(Deepseek, answer("问题1答案: A", 100));
    let mut settings = settings_with(&[(Kimi, 1), (Deepseek, 1)]);
    settings.chat_strategy = ChatStrategy::Single;
    let session = session_with(&host, &bus, MemoryStore::with_settings(settings));

    let report = session.send_all(&[question(1, "题目")]).await.unwrap();
    assert_eq!(report.success_count(), 2);
    assert!(host.open_windows().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_continuous_strategy_reuses_windows_and_closes_duplicates() {
    let bus = new_bus();
    let host = FakeHost::new(bus.clone());
    host.set_behavior(Kimi, answer("问题1答案: A", 100));
    let stray = host.add_stray_window(Kimi);
    let session = session_with(
        &host,
        &bus,
        MemoryStore::with_settings(settings_with(&[(Kimi, 1)])),
    );

    session.send_all(&[question(1, "题目")]).await.unwrap();
    session.send_all(&[question(1, "题目")]).await.unwrap();

    assert_eq!(host.created_count(), 1);
    assert_eq!(host.open_windows(), vec![Kimi]);
    let target = session.registry().target(Kimi).await.unwrap();
    assert_ne!(target.window, stray);
    assert_eq!(target.state, TargetState::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_host_page_closed_ends_batch_and_tears_down() {
    let bus = new_bus();
    let host = FakeHost::new(bus.clone());
    host.set_behavior(Kimi, Behavior::Silent);
    host.set_behavior(Deepseek, Behavior::Silent);
    let session = session_with(
        &host,
        &bus,
        MemoryStore::with_settings(settings_with(&[(Kimi, 1), (Deepseek, 1)])),
    );
    session.start().await;

    let publisher = bus.clone();
    tokio::spawn(async move {
        sleep(Duration::from_secs(1)).await;
        publisher.publish(BusEvent::Lifecycle(LifecycleEvent::HostPageClosed));
    });

    let report = session.send_all(&[question(1, "题目")]).await.unwrap();
    assert_eq!(report.outcomes[&Kimi], ProviderOutcome::Closed);
    assert_eq!(report.outcomes[&Deepseek], ProviderOutcome::Closed);

    settle().await;
    assert!(host.open_windows().is_empty());
    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_retry_provider_after_failure() {
    let bus = new_bus();
    let host = FakeHost::new(bus.clone());
    host.set_behavior(Kimi, Behavior::FailCreate);
    host.set_behavior(Deepseek, answer("问题1答案: A", 100));
    let session = session_with(
        &host,
        &bus,
        MemoryStore::with_settings(settings_with(&[(Kimi, 1), (Deepseek, 1)])),
    );

    assert_err!(session.retry_provider(Kimi).await);

    let report = session.send_all(&[question(1, "题目")]).await.unwrap();
    assert!(matches!(report.outcomes[&Kimi], ProviderOutcome::Unavailable(_)));

    host.set_behavior(Kimi, answer("问题1答案: A", 100));
    let retry = assert_ok!(session.retry_provider(Kimi).await);
    assert_eq!(retry.outcomes.len(), 1);
    assert_eq!(retry.outcomes[&Kimi], ProviderOutcome::Answered { timed_out: false });

    let results = session.final_answers().await;
    assert_eq!(results[0].winner().unwrap().count, 2);
}

#[tokio::test(start_paused = true)]
async fn test_switch_target_focuses_window() {
    let bus = new_bus();
    let host = FakeHost::new(bus.clone());
    host.set_behavior(Kimi, answer("问题1答案: A", 100));
    let session = session_with(
        &host,
        &bus,
        MemoryStore::with_settings(settings_with(&[(Kimi, 1)])),
    );
    session.start().await;
    session.send_all(&[question(1, "题目")]).await.unwrap();

    bus.publish(BusEvent::SwitchTarget { provider_id: Kimi });
    settle().await;
    assert_eq!(host.focus_log().last().map(|(f, _)| *f), Some(Focus::Window(Kimi)));

    // 窗口被关闭后切换失败，记录被清除
    host.close_by_user(Kimi).await;
    assert!(session.switch_to(Kimi).await.is_err());
    assert!(session.registry().target(Kimi).await.is_none());
    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_configuration_changes_persist_and_refresh_results() {
    let bus = new_bus();
    let host = FakeHost::new(bus.clone());
    host.set_behavior(Kimi, answer("问题1答案: A", 100));
    host.set_behavior(Deepseek, answer("问题1答案: B", 100));
    host.set_behavior(Tongyi, answer("问题1答案: C", 100));
    let store = MemoryStore::with_settings(settings_with(&[(Kimi, 1), (Deepseek, 2), (Tongyi, 1)]));
    let session = session_with(&host, &bus, store.clone());

    session.send_all(&[question(1, "题目")]).await.unwrap();
    assert_eq!(session.final_answers().await[0].final_answer_text, "B");

    session.set_favorite(Some(Tongyi)).await.unwrap();
    assert_eq!(session.final_answers().await[0].final_answer_text, "C");
    assert_eq!(store.settings.lock().unwrap().roster().favorite(), Some(Tongyi));

    // 未启用的 AI 不能设为权重 AI
    assert!(session.set_favorite(Some(Chatglm)).await.is_err());

    session.set_enabled(Kimi, false).await.unwrap();
    assert!(!host.open_windows().contains(&Kimi));
    assert!(!store.settings.lock().unwrap().roster().is_enabled(Kimi));

    session.set_run_mode(RunMode::Fast).await.unwrap();
    assert_eq!(store.settings.lock().unwrap().run_mode, RunMode::Fast);
    assert!(store.saves.load(Ordering::SeqCst) >= 3);
}
