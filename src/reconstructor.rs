//! Action 重建器
//!
//! 把一次通知操作（内存里的 `PendingAction`，或者平台交回、经 spool 持久化的
//! 序列化形态）还原成恰好一个 `NotificationOpened` 事件；同时负责把唤醒后的
//! 延迟任务还原成事件。只做内存转换，不访问平台。

use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::deferred::{TaskDescriptor, TASK_BACKGROUND_MESSAGE, TASK_NOTIFICATION_ACTION};
use crate::error::{BridgeError, Result};
use crate::event::model::{KEY_ACTION, KEY_NOTIFICATION, KEY_NOTIFICATION_ID, KEY_REPLY};
use crate::event::{Event, PendingAction, Payload};
use crate::serializer::{
    content_from_payload, content_to_payload, is_background_notification_payload, MessageSerializer,
};

/// 延迟任务默认执行时限（毫秒）
pub const DEFAULT_TASK_TIMEOUT_MS: u64 = 60_000;

#[derive(Clone)]
pub struct ActionReconstructor {
    serializer: MessageSerializer,
    timeout_ms: u64,
}

impl ActionReconstructor {
    pub fn new(serializer: MessageSerializer) -> Self {
        Self {
            serializer,
            timeout_ms: DEFAULT_TASK_TIMEOUT_MS,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn serializer(&self) -> &MessageSerializer {
        &self.serializer
    }

    /// `PendingAction` 的序列化形态，附在延迟任务上
    pub fn action_payload(&self, action: &PendingAction) -> Payload {
        let mut payload = Payload::new();
        payload.insert(KEY_ACTION.to_string(), Value::String(action.action_id.clone()));
        payload.insert(
            KEY_NOTIFICATION.to_string(),
            Value::Object(content_to_payload(&action.original_notification)),
        );
        payload.insert(
            KEY_NOTIFICATION_ID.to_string(),
            Value::String(action.notification_id.clone()),
        );
        if let Some(reply) = &action.free_text_reply {
            payload.insert(KEY_REPLY.to_string(), Value::String(reply.clone()));
        }
        payload
    }

    /// 平台原始 payload → `PendingAction`
    pub fn pending_action(&self, raw: &Payload) -> Result<PendingAction> {
        if !is_background_notification_payload(raw) {
            return Err(BridgeError::MalformedActionPayload(
                "payload lacks `action` or `notification`".to_string(),
            ));
        }
        let opened = self.serializer.to_notification_opened_event(raw)?;
        let payload = opened.payload();

        let action_id = payload
            .get(KEY_ACTION)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let content = payload
            .get(KEY_NOTIFICATION)
            .and_then(Value::as_object)
            .map(content_from_payload)
            .unwrap_or_default();
        let notification_id = payload
            .get(KEY_NOTIFICATION_ID)
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| content.notification_id.clone())
            .unwrap_or_default();

        let mut action = PendingAction::new(notification_id, action_id, content);
        action.free_text_reply = payload
            .get(KEY_REPLY)
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(action)
    }

    /// `PendingAction` → `NotificationOpened`
    pub fn reconstruct(&self, action: &PendingAction) -> Result<Event> {
        self.serializer
            .to_notification_opened_event(&self.action_payload(action))
    }

    /// 原始或已序列化的 action payload → `NotificationOpened`
    pub fn reconstruct_payload(&self, raw: &Payload) -> Result<Event> {
        self.serializer.to_notification_opened_event(raw)
    }

    /// 唤醒后的延迟任务 → 事件
    pub fn reconstruct_task(&self, task: &TaskDescriptor) -> Result<Event> {
        let event = match task.task_key.as_str() {
            TASK_NOTIFICATION_ACTION => self.reconstruct_payload(&task.payload)?,
            TASK_BACKGROUND_MESSAGE => Event::message_received(task.payload.clone())?,
            other => return Err(BridgeError::UnknownTask(other.to_string())),
        };
        debug!(task_key = %task.task_key, kind = %event.kind(), "Deferred task reconstructed");
        Ok(event)
    }
}
