//! 错误类型
//!
//! 路由核心只暴露一个错误枚举。哪些错误需要上抛、哪些只记录诊断日志，
//! 由调用方（Router / DeferredExecutor）决定：
//!
//! | 变体 | 处理方式 |
//! |------|----------|
//! | `SchemaViolation` | 上抛给调用方，不重试 |
//! | `MalformedActionPayload` | 丢弃条目，debug 日志 |
//! | `InvalidToken` | 上抛给调用方 |
//! | `DeferredDeliveryRefused` | warn 日志，不重试 |
//! | `DeferredTaskTimeout` | warn 日志，释放 wake lock，不重试 |

use crate::event::EventKind;

/// 桥接层错误
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// 构造事件时缺少必填字段或带有 schema 之外的字段
    #[error("schema violation for {kind}: {reason}")]
    SchemaViolation { kind: EventKind, reason: String },

    /// 原始 action payload 缺少 `action` 或 `notification`
    #[error("malformed action payload: {0}")]
    MalformedActionPayload(String),

    /// 刷新 token 时 token 为空
    #[error("refreshed token must not be empty")]
    InvalidToken,

    /// 平台拒绝为低优先级消息唤醒进程
    #[error("deferred delivery refused for task {task_key}: {reason}")]
    DeferredDeliveryRefused { task_key: String, reason: String },

    /// 延迟任务超出执行时限
    #[error("deferred task {task_key} timed out after {timeout_ms}ms")]
    DeferredTaskTimeout { task_key: String, timeout_ms: u64 },

    /// Runner 已关闭或无法接受任务
    #[error("deferred task runner unavailable: {0}")]
    DeferredRunnerUnavailable(String),

    /// 唤醒后收到无法识别的任务 key
    #[error("unknown deferred task key: {0}")]
    UnknownTask(String),

    /// 文件 spool 读写失败
    #[error("spool error: {0}")]
    Spool(#[from] std::io::Error),
}

impl BridgeError {
    pub(crate) fn schema(kind: EventKind, reason: impl Into<String>) -> Self {
        Self::SchemaViolation {
            kind,
            reason: reason.into(),
        }
    }

    /// 是否属于“可观察但非致命”的情况（只记录日志，不当作失败）
    pub fn is_diagnostic(&self) -> bool {
        matches!(
            self,
            Self::MalformedActionPayload(_)
                | Self::DeferredDeliveryRefused { .. }
                | Self::DeferredTaskTimeout { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
