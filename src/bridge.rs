//! 进程级桥接状态
//!
//! 进程启动时用配置构建一次 `Bridge`，它持有唯一的 `EventEmitter`，并把它
//! 注入 Router 和延迟执行器；进程退出时调用 `shutdown` 清空订阅者和缓冲。
//! 没有隐藏的全局变量，需要访问的地方显式传递 `Arc<Bridge>` 或其组件。

use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::config::BridgeConfig;
use crate::deferred::{
    DeferredExecutor, DeferredTaskRunner, EmitterHandler, HeadlessTaskHandler, SpoolRunner,
    WakeLock,
};
use crate::emitter::EventEmitter;
use crate::error::Result;
use crate::event::{Event, NotificationContent};
use crate::intent::{PendingIntentDescriptor, PendingIntentRegistry};
use crate::oracle::{AppStateOracle, AppStateTracker};
use crate::reconstructor::ActionReconstructor;
use crate::router::Router;
use crate::serializer::{resolve_localized, resolve_sound, MessageSerializer, SoundSource};

/// 交给通知展示层的完整内容
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Presentation {
    /// 标题/正文已本地化
    pub content: NotificationContent,
    pub sound: SoundSource,
    pub content_intent: PendingIntentDescriptor,
    pub action_intents: Vec<PendingIntentDescriptor>,
}

pub struct BridgeBuilder {
    config: BridgeConfig,
    oracle: Option<Arc<dyn AppStateOracle>>,
    runner: Option<Arc<dyn DeferredTaskRunner>>,
    handler: Option<Arc<dyn HeadlessTaskHandler>>,
    wake_lock: Option<Arc<dyn WakeLock>>,
    launch_action: Option<String>,
}

impl BridgeBuilder {
    pub fn oracle(mut self, oracle: Arc<dyn AppStateOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn runner(mut self, runner: Arc<dyn DeferredTaskRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    /// 唤醒后处理事件的入口，默认发布到发射器
    pub fn handler(mut self, handler: Arc<dyn HeadlessTaskHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn wake_lock(mut self, wake_lock: Arc<dyn WakeLock>) -> Self {
        self.wake_lock = Some(wake_lock);
        self
    }

    /// 点击通知正文时启动宿主应用使用的 intent action
    pub fn launch_action(mut self, action: impl Into<String>) -> Self {
        self.launch_action = Some(action.into());
        self
    }

    pub fn build(self) -> Bridge {
        let config = self.config;
        let emitter = Arc::new(EventEmitter::new(config.emitter_buffer_capacity));
        let serializer = MessageSerializer::new(Arc::new(config.catalog()));
        let reconstructor =
            ActionReconstructor::new(serializer).with_timeout_ms(config.deferred_task_timeout_ms);

        let oracle: Arc<dyn AppStateOracle> = match self.oracle {
            Some(oracle) => oracle,
            None => Arc::new(AppStateTracker::default()),
        };
        let runner: Arc<dyn DeferredTaskRunner> = match self.runner {
            Some(runner) => runner,
            None => Arc::new(SpoolRunner::new(config.spool_path.clone())),
        };
        let handler: Arc<dyn HeadlessTaskHandler> = match self.handler {
            Some(handler) => handler,
            None => Arc::new(EmitterHandler::new(emitter.clone())),
        };

        let mut executor = DeferredExecutor::new(reconstructor.clone(), handler);
        if let Some(wake_lock) = self.wake_lock {
            executor = executor.with_wake_lock(wake_lock);
        }

        let router = Router::new(reconstructor, oracle, emitter.clone(), runner);

        info!(
            timeout_ms = config.deferred_task_timeout_ms,
            buffer_capacity = config.emitter_buffer_capacity,
            "Bridge initialized"
        );

        Bridge {
            config,
            emitter,
            router,
            executor: Arc::new(executor),
            registry: PendingIntentRegistry::new(),
            launch_action: self.launch_action,
        }
    }
}

pub struct Bridge {
    config: BridgeConfig,
    emitter: Arc<EventEmitter>,
    router: Router,
    executor: Arc<DeferredExecutor>,
    registry: PendingIntentRegistry,
    launch_action: Option<String>,
}

impl Bridge {
    pub fn builder(config: BridgeConfig) -> BridgeBuilder {
        BridgeBuilder {
            config,
            oracle: None,
            runner: None,
            handler: None,
            wake_lock: None,
            launch_action: None,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn emitter(&self) -> &Arc<EventEmitter> {
        &self.emitter
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn executor(&self) -> &Arc<DeferredExecutor> {
        &self.executor
    }

    pub fn registry(&self) -> &PendingIntentRegistry {
        &self.registry
    }

    /// 准备展示一条通知：本地化、解析声音、挂上正文和各个操作的 intent
    pub fn present(&self, content: &NotificationContent, action_ids: &[&str]) -> Result<Presentation> {
        let catalog = self.executor.reconstructor().serializer().catalog();

        let mut localized = content.clone();
        localized.title = resolve_localized(
            catalog,
            content.title.as_deref(),
            content.title_loc_key.as_deref(),
            &content.title_loc_args,
        );
        localized.body = resolve_localized(
            catalog,
            content.body.as_deref(),
            content.body_loc_key.as_deref(),
            &content.body_loc_args,
        );
        let sound = resolve_sound(catalog, content.sound.as_deref());

        let (content_intent, _) = self
            .registry
            .build_content_intent(content, self.launch_action.as_deref())?;
        let action_intents = action_ids
            .iter()
            .map(|action_id| {
                self.registry
                    .build_action_pending_intent(content, action_id)
                    .map(|(intent, _)| intent)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Presentation {
            content: localized,
            sound,
            content_intent,
            action_intents,
        })
    }

    /// 通知被移除后撤销它的所有 intent
    pub fn dismiss(&self, notification_id: &str) -> usize {
        self.registry.cancel(notification_id)
    }

    /// 唤醒时执行 spool 中积压的任务，全部执行完才从文件中移除
    pub async fn drain_spool(&self) -> Result<Vec<Result<Event>>> {
        let spool = SpoolRunner::new(self.config.spool_path.clone());
        let batch = spool.peek()?;
        let results = self.executor.run_all(batch.tasks).await;
        spool.acknowledge(batch.consumed)?;
        Ok(results)
    }

    pub fn shutdown(&self) {
        self.emitter.shutdown();
        info!("Bridge shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::AppState;
    use crate::router::RouteOutcome;
    use crate::event::{EventKind, InboundMessage};
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> BridgeConfig {
        BridgeConfig::default()
            .with_spool_path(dir.path().join("spool.jsonl"))
            .with_resource("greeting", "Hello %1$s")
    }

    #[tokio::test]
    async fn test_killed_app_spools_then_drains() {
        let dir = TempDir::new().unwrap();
        let bridge = Bridge::builder(config(&dir)).build();

        let outcome = bridge
            .router()
            .route_message(&InboundMessage::default().with_data("k", "v"))
            .unwrap();
        assert!(matches!(outcome, RouteOutcome::Deferred { .. }));

        let results = bridge.drain_spool().await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].as_ref().unwrap().kind(), EventKind::MessageReceived);
        assert_eq!(bridge.emitter().buffered_len(), 1);
        assert_eq!(SpoolRunner::new(&bridge.config().spool_path).pending().unwrap(), 0);
    }

    #[test]
    fn test_foreground_tracker() {
        let dir = TempDir::new().unwrap();
        let tracker = Arc::new(AppStateTracker::new(AppState::Foreground));
        let bridge = Bridge::builder(config(&dir)).oracle(tracker).build();

        let message = InboundMessage::default().with_notification(NotificationContent::new("1"));
        assert_eq!(
            bridge.router().route_message(&message).unwrap(),
            RouteOutcome::Published { kind: EventKind::NotificationDisplayed }
        );
    }

    #[test]
    fn test_present_localizes_and_arms_intents() {
        let dir = TempDir::new().unwrap();
        let bridge = Bridge::builder(config(&dir)).launch_action("MAIN").build();

        let mut content = NotificationContent::new("42");
        content.title_loc_key = Some("greeting".to_string());
        content.title_loc_args = vec!["Ana".to_string()];
        content.sound = Some("default".to_string());

        let presentation = bridge.present(&content, &["reply", "archive"]).unwrap();
        assert_eq!(presentation.content.title.as_deref(), Some("Hello Ana"));
        assert_eq!(presentation.sound, SoundSource::Default);
        assert_eq!(presentation.content_intent.intent_action.as_deref(), Some("MAIN"));
        assert_eq!(presentation.action_intents.len(), 2);
        assert_eq!(bridge.registry().len(), 3);

        assert_eq!(bridge.dismiss("42"), 3);
        assert!(bridge.registry().is_empty());
    }

    #[test]
    fn test_shutdown_clears_emitter() {
        let dir = TempDir::new().unwrap();
        let bridge = Bridge::builder(config(&dir)).build();
        bridge.router().on_new_token("tok").unwrap();
        assert_eq!(bridge.emitter().buffered_len(), 1);

        bridge.shutdown();
        assert_eq!(bridge.emitter().buffered_len(), 0);
    }
}
