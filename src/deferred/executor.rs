//! 延迟任务执行器
//!
//! Runner 唤醒进程后调用 `run`：持有唤醒锁 → 重建事件 → 在时限内交给
//! headless 处理器。超时只记录诊断，不再等待投递结果，不重试。

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::task::TaskDescriptor;
use super::wake_lock::{CountingWakeLock, WakeLock, WakeLockGuard};
use crate::emitter::EventEmitter;
use crate::error::{BridgeError, Result};
use crate::event::Event;
use crate::reconstructor::ActionReconstructor;

/// 唤醒后处理重建事件的宿主入口
///
/// `handle` 运行在时限之内，不能阻塞 runtime 线程；同步工作放进
/// `spawn_blocking`，否则时限无法生效。
#[async_trait]
pub trait HeadlessTaskHandler: Send + Sync {
    async fn handle(&self, event: Event);
}

/// 默认处理器：把事件发布到进程级发射器（无订阅者时进入缓冲）
///
/// 订阅者回调是同步的，发布放在阻塞线程上执行，超时后不再等待。
pub struct EmitterHandler {
    emitter: Arc<EventEmitter>,
}

impl EmitterHandler {
    pub fn new(emitter: Arc<EventEmitter>) -> Self {
        Self { emitter }
    }
}

#[async_trait]
impl HeadlessTaskHandler for EmitterHandler {
    async fn handle(&self, event: Event) {
        let emitter = self.emitter.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || emitter.publish(event)).await {
            warn!(error = %e, "Emitter delivery task failed");
        }
    }
}

pub struct DeferredExecutor {
    reconstructor: ActionReconstructor,
    handler: Arc<dyn HeadlessTaskHandler>,
    wake_lock: Arc<dyn WakeLock>,
}

impl DeferredExecutor {
    pub fn new(reconstructor: ActionReconstructor, handler: Arc<dyn HeadlessTaskHandler>) -> Self {
        Self {
            reconstructor,
            handler,
            wake_lock: Arc::new(CountingWakeLock::new()),
        }
    }

    pub fn with_wake_lock(mut self, wake_lock: Arc<dyn WakeLock>) -> Self {
        self.wake_lock = wake_lock;
        self
    }

    pub fn reconstructor(&self) -> &ActionReconstructor {
        &self.reconstructor
    }

    /// 执行一个延迟任务，返回已交付的事件
    pub async fn run(&self, task: TaskDescriptor) -> Result<Event> {
        let _guard = WakeLockGuard::acquire(self.wake_lock.clone(), task.task_key.clone());

        let timeout_ms = if task.timeout_millis == 0 {
            self.reconstructor.timeout_ms()
        } else {
            task.timeout_millis
        };
        // 时限从唤醒开始计算，覆盖重建和投递
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);

        let event = match self.reconstructor.reconstruct_task(&task) {
            Ok(event) => event,
            Err(e) => {
                if e.is_diagnostic() {
                    debug!(task_key = %task.task_key, error = %e, "Deferred task dropped");
                } else {
                    warn!(task_key = %task.task_key, error = %e, "Deferred task could not be reconstructed");
                }
                return Err(e);
            }
        };

        let delivered = event.clone();
        match tokio::time::timeout_at(deadline, self.handler.handle(event)).await {
            Ok(()) => {
                info!(task_key = %task.task_key, kind = %delivered.kind(), "Deferred task delivered");
                Ok(delivered)
            }
            Err(_) => {
                warn!(
                    task_key = %task.task_key,
                    timeout_ms,
                    "Deferred task timed out, delivery abandoned"
                );
                Err(BridgeError::DeferredTaskTimeout {
                    task_key: task.task_key,
                    timeout_ms,
                })
            }
        }
    }

    /// 依次执行一批任务（spool 唤醒时使用）
    pub async fn run_all(&self, tasks: Vec<TaskDescriptor>) -> Vec<Result<Event>> {
        let mut results = Vec::with_capacity(tasks.len());
        for task in tasks {
            results.push(self.run(task).await);
        }
        results
    }
}
