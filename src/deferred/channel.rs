//! 进程内通道 Runner
//!
//! 有界 tokio mpsc 队列 + 一个 worker 任务，worker 依次驱动 `DeferredExecutor`。
//! 队列满时拒绝提交（等价于平台的"优先级太低"），关闭后返回不可用。
//! 每个任务在独立的 tokio 任务中执行，处理器 panic 不会终止 worker。

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::executor::DeferredExecutor;
use super::task::{DeferredTaskRunner, HandoffError, TaskDescriptor};

/// 默认队列长度
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

pub struct ChannelRunner {
    tx: mpsc::Sender<TaskDescriptor>,
}

impl ChannelRunner {
    /// 只创建队列，由调用方自行消费
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<TaskDescriptor>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// 创建队列并启动 worker（需在 tokio runtime 内调用）
    pub fn spawn(executor: Arc<DeferredExecutor>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (runner, mut rx) = Self::new(capacity);
        let handle = tokio::spawn(async move {
            while let Some(task) = rx.recv().await {
                let task_key = task.task_key.clone();
                let executor = executor.clone();
                match tokio::spawn(async move { executor.run(task).await }).await {
                    Ok(Ok(_)) => {}
                    // 失败已在 executor 中记录
                    Ok(Err(_)) => {
                        debug!(task_key = %task_key, "Deferred task finished without delivery");
                    }
                    Err(e) => {
                        warn!(task_key = %task_key, error = %e, "Deferred task panicked");
                    }
                }
            }
            info!("Deferred task worker stopped");
        });
        (runner, handle)
    }
}

impl DeferredTaskRunner for ChannelRunner {
    fn name(&self) -> &str {
        "channel"
    }

    fn submit(&self, task: TaskDescriptor) -> Result<(), HandoffError> {
        match self.tx.try_send(task) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(HandoffError::PriorityTooLow),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(HandoffError::Unavailable("worker stopped".to_string()))
            }
        }
    }
}
