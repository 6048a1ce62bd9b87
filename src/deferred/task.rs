//! 延迟任务描述符与 Runner 接口

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::Payload;

/// 入站消息的延迟任务
pub const TASK_BACKGROUND_MESSAGE: &str = "BackgroundMessageTask";
/// 通知操作的延迟任务
pub const TASK_NOTIFICATION_ACTION: &str = "NotificationActionTask";

/// 交给 Runner 的任务描述符
///
/// `payload` 是事件形态的映射，唤醒后无需再向平台查询即可重建事件。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDescriptor {
    pub task_key: String,
    pub payload: Payload,
    pub timeout_millis: u64,
    pub allowed_in_foreground: bool,
}

impl TaskDescriptor {
    pub fn new(task_key: impl Into<String>, payload: Payload, timeout_millis: u64) -> Self {
        Self {
            task_key: task_key.into(),
            payload,
            timeout_millis,
            allowed_in_foreground: true,
        }
    }
}

/// Runner 拒绝接收任务的原因
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandoffError {
    /// 平台认为消息优先级太低，不值得唤醒进程
    #[error("delivery priority too low to wake the process")]
    PriorityTooLow,
    /// Runner 已关闭或暂时不可用
    #[error("runner unavailable: {0}")]
    Unavailable(String),
}

/// 外部延迟任务执行设施
///
/// `submit` 只负责接收任务，不等待执行完成；Router 不会重试失败的提交。
pub trait DeferredTaskRunner: Send + Sync {
    /// Runner 名称（用于日志）
    fn name(&self) -> &str;

    fn submit(&self, task: TaskDescriptor) -> std::result::Result<(), HandoffError>;
}
