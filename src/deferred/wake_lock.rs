//! 唤醒锁
//!
//! 延迟任务执行期间持有，任何退出路径（成功、失败、超时、panic）都由
//! `WakeLockGuard` 的 `Drop` 释放。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// 平台唤醒锁
pub trait WakeLock: Send + Sync {
    fn acquire(&self, tag: &str);
    fn release(&self, tag: &str);
}

/// 作用域内持有唤醒锁
pub struct WakeLockGuard {
    lock: Arc<dyn WakeLock>,
    tag: String,
}

impl WakeLockGuard {
    pub fn acquire(lock: Arc<dyn WakeLock>, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        lock.acquire(&tag);
        debug!(tag = %tag, "Wake lock acquired");
        Self { lock, tag }
    }
}

impl Drop for WakeLockGuard {
    fn drop(&mut self) {
        self.lock.release(&self.tag);
        debug!(tag = %self.tag, "Wake lock released");
    }
}

/// 只计数的唤醒锁，宿主没有提供平台实现时使用
#[derive(Debug, Default)]
pub struct CountingWakeLock {
    held: AtomicUsize,
    acquired_total: AtomicUsize,
}

impl CountingWakeLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前持有数
    pub fn held(&self) -> usize {
        self.held.load(Ordering::SeqCst)
    }

    pub fn acquired_total(&self) -> usize {
        self.acquired_total.load(Ordering::SeqCst)
    }
}

impl WakeLock for CountingWakeLock {
    fn acquire(&self, _tag: &str) {
        self.held.fetch_add(1, Ordering::SeqCst);
        self.acquired_total.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&self, _tag: &str) {
        let _ = self
            .held
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }
}
