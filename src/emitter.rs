//! 事件发射器 - 进程级广播点
//!
//! - 没有订阅者时 `publish` 把事件放进有界缓冲（溢出丢最旧的）
//! - 第一个 `subscribe` 按到达顺序一次性收到全部缓冲事件
//! - 有订阅者时按订阅顺序同步投递；投递基于订阅者快照，
//!   投递过程中增删订阅者不影响本次广播
//!
//! 订阅者的 `on_event` 不能阻塞，也不能在回调里同步调用发射器；
//! 需要做重活的订阅者应使用 `ChannelSubscriber` 转到自己的任务里处理。

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::event::Event;

/// 默认缓冲容量
pub const DEFAULT_BUFFER_CAPACITY: usize = 100;

/// 事件订阅者（宿主监听器）
pub trait Subscriber: Send + Sync {
    /// 订阅者名称（用于日志）
    fn name(&self) -> &str;

    /// 收到事件，不能阻塞
    fn on_event(&self, event: &Event);
}

/// 订阅句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// `publish` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// 已投递给 n 个订阅者
    Delivered(usize),
    /// 暂无订阅者，已缓冲
    Buffered,
}

#[derive(Default)]
struct EmitterState {
    subscribers: Vec<(SubscriptionId, Arc<dyn Subscriber>)>,
    buffer: VecDeque<Event>,
    next_id: u64,
    dropped: u64,
}

/// 进程级事件发射器，进程启动时创建一次，通过 `Arc` 注入 Router
pub struct EventEmitter {
    state: Mutex<EmitterState>,
    capacity: usize,
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(EmitterState::default()),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EmitterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 注册订阅者；若有缓冲事件，按到达顺序全部投递给它
    ///
    /// 冲刷期间持有内部锁，其他线程的 `publish` 会等待，最长等待时间是
    /// 缓冲容量乘以单次 `on_event` 的耗时。
    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) -> SubscriptionId {
        let mut state = self.lock();
        let id = SubscriptionId(state.next_id);
        state.next_id += 1;
        state.subscribers.push((id, subscriber.clone()));

        let buffered: Vec<Event> = state.buffer.drain(..).collect();
        info!(
            subscriber = subscriber.name(),
            flushed = buffered.len(),
            "Subscriber registered"
        );

        // 持锁冲刷：保证缓冲事件先于之后任何 publish 到达
        for event in &buffered {
            deliver(subscriber.as_ref(), event);
        }

        id
    }

    /// 注销订阅者，返回是否存在
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = self.lock();
        let before = state.subscribers.len();
        state.subscribers.retain(|(sid, _)| *sid != id);
        let removed = state.subscribers.len() != before;
        if removed {
            debug!(?id, "Subscriber removed");
        }
        removed
    }

    /// 发布事件
    pub fn publish(&self, event: Event) -> Delivery {
        let snapshot: Vec<Arc<dyn Subscriber>> = {
            let mut state = self.lock();
            if state.subscribers.is_empty() {
                if state.buffer.len() >= self.capacity {
                    state.buffer.pop_front();
                    state.dropped += 1;
                    warn!(
                        capacity = self.capacity,
                        dropped_total = state.dropped,
                        "Event buffer full, dropped oldest event"
                    );
                }
                debug!(kind = %event.kind(), "No subscribers, event buffered");
                state.buffer.push_back(event);
                return Delivery::Buffered;
            }
            state.subscribers.iter().map(|(_, s)| s.clone()).collect()
        };

        for subscriber in &snapshot {
            deliver(subscriber.as_ref(), &event);
        }
        Delivery::Delivered(snapshot.len())
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    pub fn buffered_len(&self) -> usize {
        self.lock().buffer.len()
    }

    /// 因缓冲溢出被丢弃的事件总数
    pub fn dropped_count(&self) -> u64 {
        self.lock().dropped
    }

    /// 进程退出时清空订阅者和缓冲
    pub fn shutdown(&self) {
        let mut state = self.lock();
        let pending = state.buffer.len();
        state.subscribers.clear();
        state.buffer.clear();
        info!(discarded = pending, "Event emitter shut down");
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }
}

/// 单个订阅者 panic 不影响其他订阅者
fn deliver(subscriber: &dyn Subscriber, event: &Event) {
    let result = catch_unwind(AssertUnwindSafe(|| subscriber.on_event(event)));
    if result.is_err() {
        warn!(
            subscriber = subscriber.name(),
            kind = %event.kind(),
            "Subscriber panicked while handling event"
        );
    }
}

/// 把事件转发到无界通道的订阅者，接收端在自己的任务里处理
///
/// `on_event` 只做一次入队，作为第一个订阅者时冲刷缓冲不会拖住并发的
/// `publish`。回调较慢的订阅者应包在它后面。
pub struct ChannelSubscriber {
    name: String,
    tx: mpsc::UnboundedSender<Event>,
}

impl ChannelSubscriber {
    pub fn new(name: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                name: name.into(),
                tx,
            },
            rx,
        )
    }
}

impl Subscriber for ChannelSubscriber {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_event(&self, event: &Event) {
        if self.tx.send(event.clone()).is_err() {
            debug!(subscriber = %self.name, "Receiver dropped, event discarded");
        }
    }
}
