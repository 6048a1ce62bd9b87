//! Push Event Bridge - 推送消息与通知交互的事件桥接层
//!
//! 把消息传输层交来的入站消息、用户在通知上的操作，归一化成带 `kind` 的事件：
//! 应用在前台时直接发布给订阅者，否则交给延迟任务 Runner，唤醒后重建再投递。

pub mod bridge;
pub mod config;
pub mod deferred;
pub mod emitter;
pub mod error;
pub mod event;
pub mod intent;
pub mod oracle;
pub mod reconstructor;
pub mod router;
pub mod serializer;

pub use bridge::{Bridge, BridgeBuilder, Presentation};
pub use config::BridgeConfig;
pub use deferred::{
    ChannelRunner, CountingWakeLock, DeferredExecutor, DeferredTaskRunner, EmitterHandler,
    HandoffError, HeadlessTaskHandler, SpoolRunner, TaskDescriptor, WakeLock, WakeLockGuard,
    TASK_BACKGROUND_MESSAGE, TASK_NOTIFICATION_ACTION,
};
pub use emitter::{ChannelSubscriber, Delivery, EventEmitter, Subscriber, SubscriptionId};
pub use error::{BridgeError, Result};
pub use event::{
    Event, EventKind, InboundMessage, NotificationContent, Payload, PendingAction,
    UnknownEventKind,
};
pub use intent::{PendingIntentDescriptor, PendingIntentRegistry, Registration};
pub use oracle::{AppState, AppStateOracle, AppStateTracker};
pub use reconstructor::ActionReconstructor;
pub use router::{RouteOutcome, Router};
pub use serializer::{MapCatalog, MessageSerializer, ResourceCatalog};
