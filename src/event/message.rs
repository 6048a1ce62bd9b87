//! 传输层原生对象
//!
//! `InboundMessage` / `NotificationContent` 由消息传输层创建，路由期间只读；
//! `PendingAction` 记录用户在已展示通知上的一次操作。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 推送消息（传输层原生形态）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collapse_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<String>,
    /// 存活时间（秒）
    #[serde(default)]
    pub ttl: i64,
    /// 发送时间（毫秒时间戳）
    #[serde(default)]
    pub sent_time: i64,
    /// 自定义数据
    #[serde(default)]
    pub data: BTreeMap<String, String>,
    /// 通知内容（data-only 消息为空）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification: Option<NotificationContent>,
}

impl InboundMessage {
    pub fn has_notification(&self) -> bool {
        self.notification.is_some()
    }

    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn with_notification(mut self, notification: NotificationContent) -> Self {
        self.notification = Some(notification);
        self
    }
}

/// 通知内容
///
/// 标题和正文可以是字面量，也可以是资源 key + 位置参数；
/// 布尔字段未设置时取平台默认值 `false`。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_loc_key: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub title_loc_args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_loc_key: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub body_loc_args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub click_action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_priority: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_count: Option<i32>,
    /// 事件时间（毫秒时间戳）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_time: Option<i64>,
    #[serde(default)]
    pub sticky: bool,
    #[serde(default)]
    pub local_only: bool,
    #[serde(default)]
    pub default_sound: bool,
    #[serde(default)]
    pub default_vibrate_settings: bool,
    #[serde(default)]
    pub default_light_settings: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vibrate_timings: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub light_settings: Option<Vec<i32>>,
}

impl NotificationContent {
    pub fn new(notification_id: impl Into<String>) -> Self {
        Self {
            notification_id: Some(notification_id.into()),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// 用户在已展示通知上的操作
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAction {
    pub notification_id: String,
    pub action_id: String,
    pub original_notification: NotificationContent,
    pub free_text_reply: Option<String>,
}

impl PendingAction {
    pub fn new(
        notification_id: impl Into<String>,
        action_id: impl Into<String>,
        original_notification: NotificationContent,
    ) -> Self {
        Self {
            notification_id: notification_id.into(),
            action_id: action_id.into(),
            original_notification,
            free_text_reply: None,
        }
    }

    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.free_text_reply = Some(reply.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_message_from_json() {
        let message: InboundMessage = serde_json::from_str(
            r#"{
                "messageId": "0:1",
                "from": "1234",
                "ttl": 2419200,
                "sentTime": 1700000000000,
                "data": {"k": "v"},
                "notification": {"title": "Hi", "sticky": true}
            }"#,
        )
        .unwrap();

        assert_eq!(message.message_id.as_deref(), Some("0:1"));
        assert_eq!(message.collapse_key, None);
        assert_eq!(message.data.get("k").map(String::as_str), Some("v"));
        let notification = message.notification.unwrap();
        assert!(notification.sticky);
        assert!(!notification.local_only);
    }

    #[test]
    fn test_data_only_message() {
        let message = InboundMessage::default().with_data("a", "1");
        assert!(!message.has_notification());
        assert_eq!(message.data.len(), 1);
    }

    #[test]
    fn test_pending_action_with_reply() {
        let action = PendingAction::new("42", "reply", NotificationContent::new("42"))
            .with_reply("yes");
        assert_eq!(action.free_text_reply.as_deref(), Some("yes"));
    }
}
