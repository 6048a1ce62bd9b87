//! 延迟投递 - 进程不在前台时把工作交给外部 Runner，唤醒后再执行

pub mod channel;
pub mod executor;
pub mod spool;
pub mod task;
pub mod wake_lock;

pub use channel::ChannelRunner;
pub use executor::{DeferredExecutor, EmitterHandler, HeadlessTaskHandler};
pub use spool::{SpoolBatch, SpoolRecord, SpoolRunner};
pub use task::{
    DeferredTaskRunner, HandoffError, TaskDescriptor, TASK_BACKGROUND_MESSAGE,
    TASK_NOTIFICATION_ACTION,
};
pub use wake_lock::{CountingWakeLock, WakeLock, WakeLockGuard};
