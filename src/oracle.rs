//! 应用前后台状态查询
//!
//! Router 每次路由决策只调用一次 `is_foreground()`，不缓存。

use std::sync::atomic::{AtomicU8, Ordering};

/// 应用是否在前台
pub trait AppStateOracle: Send + Sync {
    fn is_foreground(&self) -> bool;
}

impl<F> AppStateOracle for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn is_foreground(&self) -> bool {
        self()
    }
}

/// 应用生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AppState {
    Foreground = 0,
    Background = 1,
    Killed = 2,
}

impl AppState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => AppState::Foreground,
            1 => AppState::Background,
            _ => AppState::Killed,
        }
    }
}

/// 由宿主生命周期回调更新的状态，可在任意线程读取
#[derive(Debug)]
pub struct AppStateTracker {
    state: AtomicU8,
}

impl AppStateTracker {
    pub fn new(initial: AppState) -> Self {
        Self {
            state: AtomicU8::new(initial as u8),
        }
    }

    pub fn set(&self, state: AppState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    pub fn get(&self) -> AppState {
        AppState::from_u8(self.state.load(Ordering::SeqCst))
    }
}

impl Default for AppStateTracker {
    fn default() -> Self {
        Self::new(AppState::Killed)
    }
}

impl AppStateOracle for AppStateTracker {
    fn is_foreground(&self) -> bool {
        self.get() == AppState::Foreground
    }
}
