//! 路由器 - 决定入站条目走前台直发还是延迟投递
//!
//! 每个条目独立决策，不跨条目保存状态：
//!
//! ```text
//! 入站消息 ── 有通知 && 前台 ──▶ Emitter.publish(NotificationDisplayed)
//!          └─ 其他 ─────────────▶ Runner.submit(BackgroundMessageTask)
//!
//! 通知操作 ── 不是通知交互 ─────▶ 丢弃（debug）
//!          ├─ 前台 ─────────────▶ 重建 → Emitter.publish(NotificationOpened)
//!          └─ 其他 ─────────────▶ Runner.submit(NotificationActionTask)
//! ```
//!
//! 每次决策只调用一次 `is_foreground()`。Runner 拒绝时只报告
//! `DeferredDeliveryRefused`，不重试；Router 从不等待延迟任务完成。

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::deferred::{
    DeferredTaskRunner, HandoffError, TaskDescriptor, TASK_BACKGROUND_MESSAGE,
    TASK_NOTIFICATION_ACTION,
};
use crate::emitter::{Delivery, EventEmitter};
use crate::error::{BridgeError, Result};
use crate::event::{Event, EventKind, InboundMessage, Payload};
use crate::oracle::AppStateOracle;
use crate::reconstructor::ActionReconstructor;
use crate::serializer::{is_background_notification_payload, MessageSerializer};

/// 单个条目的路由结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RouteOutcome {
    /// 已通过 Emitter 发布（或在无订阅者时进入缓冲）
    Published { kind: EventKind },
    /// 已交给 Runner
    Deferred { task_key: String },
    /// Runner 拒绝，条目丢失
    Refused { task_key: String },
    /// 不是通知交互，静默丢弃
    Dropped,
}

pub struct Router {
    serializer: MessageSerializer,
    reconstructor: ActionReconstructor,
    oracle: Arc<dyn AppStateOracle>,
    emitter: Arc<EventEmitter>,
    runner: Arc<dyn DeferredTaskRunner>,
}

impl Router {
    pub fn new(
        reconstructor: ActionReconstructor,
        oracle: Arc<dyn AppStateOracle>,
        emitter: Arc<EventEmitter>,
        runner: Arc<dyn DeferredTaskRunner>,
    ) -> Self {
        Self {
            serializer: reconstructor.serializer().clone(),
            reconstructor,
            oracle,
            emitter,
            runner,
        }
    }

    pub fn emitter(&self) -> &Arc<EventEmitter> {
        &self.emitter
    }

    /// 路由一条入站消息
    pub fn route_message(&self, message: &InboundMessage) -> Result<RouteOutcome> {
        let foreground = self.oracle.is_foreground();

        if foreground && message.has_notification() {
            let event = self.serializer.to_remote_notification_event(message)?;
            return Ok(self.publish(event));
        }

        debug!(
            foreground,
            has_notification = message.has_notification(),
            message_id = message.message_id.as_deref().unwrap_or(""),
            "Message routed to deferred path"
        );
        let payload = self.serializer.to_deferred_message_payload(message);
        self.submit(TASK_BACKGROUND_MESSAGE, payload)
    }

    /// 路由一次通知操作（平台交回的原始 payload）
    pub fn route_action(&self, raw: &Payload) -> Result<RouteOutcome> {
        if !is_background_notification_payload(raw) {
            debug!("Payload is not a notification interaction, dropped");
            return Ok(RouteOutcome::Dropped);
        }

        let foreground = self.oracle.is_foreground();

        // 先规范化：回复文本在此时从平台保留 key 中取出
        let event = match self.reconstructor.reconstruct_payload(raw) {
            Ok(event) => event,
            Err(e @ BridgeError::MalformedActionPayload(_)) => {
                debug!(error = %e, "Action payload dropped");
                return Ok(RouteOutcome::Dropped);
            }
            Err(e) => return Err(e),
        };

        if foreground {
            return Ok(self.publish(event));
        }
        self.submit(TASK_NOTIFICATION_ACTION, event.into_payload())
    }

    /// token 刷新直接发布，不区分前后台
    pub fn on_new_token(&self, token: &str) -> Result<RouteOutcome> {
        let event = self.serializer.token_refreshed_event(token)?;
        Ok(self.publish(event))
    }

    /// 上行消息发送失败
    pub fn on_send_error(
        &self,
        message_id: &str,
        code: &str,
        message: Option<&str>,
    ) -> Result<RouteOutcome> {
        let event = Event::message_send_error(message_id, code, message)?;
        Ok(self.publish(event))
    }

    /// 服务端删除了待投递消息
    pub fn on_deleted_messages(&self) -> Result<RouteOutcome> {
        let event = Event::messages_deleted()?;
        Ok(self.publish(event))
    }

    fn publish(&self, event: Event) -> RouteOutcome {
        let kind = event.kind();
        match self.emitter.publish(event) {
            Delivery::Delivered(n) => debug!(kind = %kind, subscribers = n, "Event published"),
            Delivery::Buffered => debug!(kind = %kind, "Event buffered"),
        }
        RouteOutcome::Published { kind }
    }

    fn submit(&self, task_key: &str, payload: Payload) -> Result<RouteOutcome> {
        let task = TaskDescriptor::new(task_key, payload, self.reconstructor.timeout_ms());

        match self.runner.submit(task) {
            Ok(()) => {
                info!(task_key, runner = self.runner.name(), "Deferred task submitted");
                Ok(RouteOutcome::Deferred {
                    task_key: task_key.to_string(),
                })
            }
            Err(HandoffError::PriorityTooLow) => {
                let err = BridgeError::DeferredDeliveryRefused {
                    task_key: task_key.to_string(),
                    reason: HandoffError::PriorityTooLow.to_string(),
                };
                warn!(task_key, runner = self.runner.name(), error = %err, "Deferred delivery refused");
                Ok(RouteOutcome::Refused {
                    task_key: task_key.to_string(),
                })
            }
            Err(HandoffError::Unavailable(reason)) => {
                warn!(task_key, runner = self.runner.name(), reason = %reason, "Deferred task runner unavailable");
                Err(BridgeError::DeferredRunnerUnavailable(reason))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::Subscriber;
    use crate::event::NotificationContent;
    use crate::serializer::EmptyCatalog;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// 记录调用次数的 oracle
    struct CountingOracle {
        foreground: AtomicBool,
        calls: AtomicUsize,
    }

    impl CountingOracle {
        fn new(foreground: bool) -> Arc<Self> {
            Arc::new(Self {
                foreground: AtomicBool::new(foreground),
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl AppStateOracle for CountingOracle {
        fn is_foreground(&self) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.foreground.load(Ordering::SeqCst)
        }
    }

    /// 收集提交任务的 runner
    struct MockRunner {
        tasks: Mutex<Vec<TaskDescriptor>>,
        refuse: Option<HandoffError>,
    }

    impl MockRunner {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                tasks: Mutex::new(Vec::new()),
                refuse: None,
            })
        }

        fn refusing(err: HandoffError) -> Arc<Self> {
            Arc::new(Self {
                tasks: Mutex::new(Vec::new()),
                refuse: Some(err),
            })
        }

        fn tasks(&self) -> Vec<TaskDescriptor> {
            self.tasks.lock().unwrap().clone()
        }
    }

    impl DeferredTaskRunner for MockRunner {
        fn name(&self) -> &str {
            "mock"
        }

        fn submit(&self, task: TaskDescriptor) -> std::result::Result<(), HandoffError> {
            if let Some(err) = &self.refuse {
                return Err(err.clone());
            }
            self.tasks.lock().unwrap().push(task);
            Ok(())
        }
    }

    struct KindRecorder {
        kinds: Mutex<Vec<EventKind>>,
    }

    impl Subscriber for KindRecorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn on_event(&self, event: &Event) {
            self.kinds.lock().unwrap().push(event.kind());
        }
    }

    fn router(oracle: Arc<CountingOracle>, runner: Arc<MockRunner>) -> (Router, Arc<EventEmitter>) {
        let emitter = Arc::new(EventEmitter::default());
        let reconstructor = ActionReconstructor::new(MessageSerializer::new(Arc::new(EmptyCatalog)));
        (
            Router::new(reconstructor, oracle, emitter.clone(), runner),
            emitter,
        )
    }

    fn as_payload(value: Value) -> Payload {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_foreground_notification_published() {
        let oracle = CountingOracle::new(true);
        let runner = MockRunner::new();
        let (router, emitter) = router(oracle.clone(), runner.clone());
        let recorder = Arc::new(KindRecorder {
            kinds: Mutex::new(Vec::new()),
        });
        emitter.subscribe(recorder.clone());

        let message = InboundMessage::default().with_notification(NotificationContent::new("1"));
        let outcome = router.route_message(&message).unwrap();

        assert_eq!(outcome, RouteOutcome::Published { kind: EventKind::NotificationDisplayed });
        assert_eq!(*recorder.kinds.lock().unwrap(), vec![EventKind::NotificationDisplayed]);
        assert!(runner.tasks().is_empty());
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_foreground_data_only_deferred() {
        let oracle = CountingOracle::new(true);
        let runner = MockRunner::new();
        let (router, emitter) = router(oracle.clone(), runner.clone());

        let outcome = router
            .route_message(&InboundMessage::default().with_data("k", "v"))
            .unwrap();

        assert!(matches!(outcome, RouteOutcome::Deferred { .. }));
        assert_eq!(runner.tasks().len(), 1);
        assert_eq!(emitter.buffered_len(), 0);
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_background_message_task_shape() {
        let runner = MockRunner::new();
        let (router, _) = router(CountingOracle::new(false), runner.clone());

        let message = InboundMessage::default()
            .with_data("k", "v")
            .with_notification(NotificationContent::new("1").with_title("Hi"));
        router.route_message(&message).unwrap();

        let tasks = runner.tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].task_key, TASK_BACKGROUND_MESSAGE);
        assert_eq!(tasks[0].timeout_millis, 60000);
        assert!(tasks[0].allowed_in_foreground);
        assert_eq!(tasks[0].payload["data"], json!({"k": "v"}));
        assert_eq!(tasks[0].payload["notification"]["title"], json!("Hi"));
    }

    #[test]
    fn test_refused_handoff_reported() {
        let runner = MockRunner::refusing(HandoffError::PriorityTooLow);
        let (router, _) = router(CountingOracle::new(false), runner.clone());

        let outcome = router.route_message(&InboundMessage::default()).unwrap();
        assert_eq!(
            outcome,
            RouteOutcome::Refused {
                task_key: TASK_BACKGROUND_MESSAGE.to_string()
            }
        );
    }

    #[test]
    fn test_unavailable_runner_is_error() {
        let runner = MockRunner::refusing(HandoffError::Unavailable("closed".into()));
        let (router, _) = router(CountingOracle::new(false), runner);

        let result = router.route_message(&InboundMessage::default());
        assert!(matches!(result, Err(BridgeError::DeferredRunnerUnavailable(_))));
    }

    #[test]
    fn test_unrelated_action_dropped() {
        let oracle = CountingOracle::new(false);
        let runner = MockRunner::new();
        let (router, emitter) = router(oracle.clone(), runner.clone());

        let raw = as_payload(json!({"action": "android.intent.action.BOOT_COMPLETED"}));
        assert_eq!(router.route_action(&raw).unwrap(), RouteOutcome::Dropped);
        assert!(runner.tasks().is_empty());
        assert_eq!(emitter.buffered_len(), 0);
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_foreground_action_published() {
        let (router, emitter) = router(CountingOracle::new(true), MockRunner::new());
        let raw = as_payload(json!({"action": "OPEN", "notification": {"notificationId": "9"}}));

        let outcome = router.route_action(&raw).unwrap();
        assert_eq!(outcome, RouteOutcome::Published { kind: EventKind::NotificationOpened });
        assert_eq!(emitter.buffered_len(), 1);
    }

    #[test]
    fn test_background_action_carries_reply() {
        let runner = MockRunner::new();
        let (router, _) = router(CountingOracle::new(false), runner.clone());
        let raw = as_payload(json!({
            "action": "reply",
            "notification": {"notificationId": "42"},
            "result": {"reply": "yes"}
        }));

        router.route_action(&raw).unwrap();
        let tasks = runner.tasks();
        assert_eq!(tasks[0].task_key, TASK_NOTIFICATION_ACTION);
        assert_eq!(tasks[0].payload["reply"], json!("yes"));
        assert_eq!(tasks[0].payload["notificationId"], json!("42"));
    }

    #[test]
    fn test_token_refresh() {
        let (router, emitter) = router(CountingOracle::new(false), MockRunner::new());
        assert_eq!(
            router.on_new_token("tok").unwrap(),
            RouteOutcome::Published { kind: EventKind::TokenRefreshed }
        );
        assert!(matches!(router.on_new_token(""), Err(BridgeError::InvalidToken)));
        assert_eq!(emitter.buffered_len(), 1);
    }

    #[test]
    fn test_send_error_and_deleted() {
        let (router, emitter) = router(CountingOracle::new(false), MockRunner::new());
        router.on_send_error("m1", "service_not_available", None).unwrap();
        router.on_deleted_messages().unwrap();
        assert_eq!(emitter.buffered_len(), 2);
    }
}
