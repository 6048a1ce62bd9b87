//! 归一化事件模型
//!
//! 每个事件由 `kind` 和一个有序 payload 组成，payload 的字段集合完全由
//! `kind` 决定。所有构造函数都会校验 schema，构造完成后事件不可变。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::error::{BridgeError, Result};

/// 有序 payload（serde_json 开启了 preserve_order）
pub type Payload = Map<String, Value>;

pub const KEY_TOKEN: &str = "token";
pub const KEY_DATA: &str = "data";
pub const KEY_TTL: &str = "ttl";
pub const KEY_SENT_TIME: &str = "sentTime";
pub const KEY_COLLAPSE_KEY: &str = "collapseKey";
pub const KEY_FROM: &str = "from";
pub const KEY_TO: &str = "to";
pub const KEY_MESSAGE_ID: &str = "messageId";
pub const KEY_MESSAGE_TYPE: &str = "messageType";
pub const KEY_ERROR: &str = "error";
pub const KEY_ACTION: &str = "action";
pub const KEY_NOTIFICATION: &str = "notification";
pub const KEY_NOTIFICATION_ID: &str = "notificationId";
pub const KEY_REPLY: &str = "reply";

pub const KEY_STICKY: &str = "sticky";
pub const KEY_LOCAL_ONLY: &str = "localOnly";
pub const KEY_DEFAULT_SOUND: &str = "defaultSound";
pub const KEY_DEFAULT_VIBRATING_SETTING: &str = "defaultVibratingSetting";
pub const KEY_DEFAULT_LIGHT_SETTING: &str = "defaultLightSetting";

/// 通知展示事件中始终出现的五个布尔字段
pub const NOTIFICATION_FLAGS: [&str; 5] = [
    KEY_STICKY,
    KEY_LOCAL_ONLY,
    KEY_DEFAULT_SOUND,
    KEY_DEFAULT_VIBRATING_SETTING,
    KEY_DEFAULT_LIGHT_SETTING,
];

/// 通知内容在事件里可以出现的可选字段
pub const NOTIFICATION_FIELDS: [&str; 19] = [
    KEY_NOTIFICATION_ID,
    "title",
    "body",
    "icon",
    "imageUrl",
    "soundUrl",
    "notificationSound",
    "tag",
    "color",
    "clickAction",
    "channelId",
    "link",
    "ticker",
    "notificationPriority",
    "visibility",
    "notificationCount",
    "eventTime",
    "vibrateTimings",
    "lightSettings",
];

/// 事件类型（封闭枚举）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    TokenRefreshed,
    MessageReceived,
    NotificationDisplayed,
    NotificationOpened,
    MessageSendError,
    MessagesDeleted,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::TokenRefreshed,
        EventKind::MessageReceived,
        EventKind::NotificationDisplayed,
        EventKind::NotificationOpened,
        EventKind::MessageSendError,
        EventKind::MessagesDeleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::TokenRefreshed => "TokenRefreshed",
            EventKind::MessageReceived => "MessageReceived",
            EventKind::NotificationDisplayed => "NotificationDisplayed",
            EventKind::NotificationOpened => "NotificationOpened",
            EventKind::MessageSendError => "MessageSendError",
            EventKind::MessagesDeleted => "MessagesDeleted",
        }
    }

    /// 宿主桥接层使用的事件通道名
    pub fn bridge_name(&self) -> &'static str {
        match self {
            EventKind::TokenRefreshed => "messaging_token_refresh",
            EventKind::MessageReceived => "messaging_message_received",
            EventKind::NotificationDisplayed => "notifications_notification_displayed",
            EventKind::NotificationOpened => "notifications_notification_opened",
            EventKind::MessageSendError => "messaging_message_send_error",
            EventKind::MessagesDeleted => "messaging_message_deleted",
        }
    }

    fn required_fields(&self) -> &'static [&'static str] {
        match self {
            EventKind::TokenRefreshed => &[KEY_TOKEN],
            EventKind::MessageReceived => &[KEY_DATA, KEY_TTL, KEY_SENT_TIME],
            EventKind::NotificationDisplayed => &NOTIFICATION_FLAGS,
            EventKind::NotificationOpened => &[KEY_ACTION, KEY_NOTIFICATION],
            EventKind::MessageSendError => &[KEY_MESSAGE_ID, KEY_ERROR],
            EventKind::MessagesDeleted => &[],
        }
    }

    fn allows(&self, key: &str) -> bool {
        if self.required_fields().contains(&key) {
            return true;
        }
        match self {
            EventKind::MessageReceived => matches!(
                key,
                KEY_COLLAPSE_KEY
                    | KEY_FROM
                    | KEY_TO
                    | KEY_MESSAGE_ID
                    | KEY_MESSAGE_TYPE
                    | KEY_NOTIFICATION
            ),
            EventKind::NotificationDisplayed => {
                NOTIFICATION_FIELDS.contains(&key)
                    || matches!(key, KEY_DATA | KEY_TTL | KEY_SENT_TIME)
            }
            EventKind::NotificationOpened => matches!(key, KEY_NOTIFICATION_ID | KEY_REPLY),
            _ => false,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 无法识别的事件名
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown event kind: {0}")]
pub struct UnknownEventKind(pub String);

/// 同时接受事件名和宿主通道名
impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s || kind.bridge_name() == s)
            .ok_or_else(|| UnknownEventKind(s.to_string()))
    }
}

/// 归一化事件
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    kind: EventKind,
    payload: Payload,
}

impl Event {
    /// 校验 schema 后创建事件
    pub fn new(kind: EventKind, payload: Payload) -> Result<Self> {
        for field in kind.required_fields() {
            match payload.get(*field) {
                None | Some(Value::Null) => {
                    return Err(BridgeError::schema(
                        kind,
                        format!("missing required field `{}`", field),
                    ))
                }
                Some(_) => {}
            }
        }

        if let Some(unknown) = payload.keys().find(|key| !kind.allows(key)) {
            return Err(BridgeError::schema(
                kind,
                format!("field `{}` is not part of the schema", unknown),
            ));
        }

        match kind {
            EventKind::MessageReceived => {
                if !payload.get(KEY_DATA).is_some_and(Value::is_object) {
                    return Err(BridgeError::schema(kind, "`data` must be a mapping"));
                }
            }
            EventKind::NotificationDisplayed => {
                if let Some(flag) = NOTIFICATION_FLAGS
                    .iter()
                    .find(|flag| !payload.get(**flag).is_some_and(Value::is_boolean))
                {
                    return Err(BridgeError::schema(
                        kind,
                        format!("`{}` must be a boolean", flag),
                    ));
                }
            }
            EventKind::NotificationOpened => {
                if !payload.get(KEY_ACTION).is_some_and(Value::is_string) {
                    return Err(BridgeError::schema(kind, "`action` must be a string"));
                }
                if !payload.get(KEY_NOTIFICATION).is_some_and(Value::is_object) {
                    return Err(BridgeError::schema(kind, "`notification` must be a mapping"));
                }
            }
            _ => {}
        }

        Ok(Self { kind, payload })
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    pub fn into_payload(self) -> Payload {
        self.payload
    }
}

/// 便捷构造函数
impl Event {
    /// token 刷新事件，token 不能为空
    pub fn token_refreshed(token: &str) -> Result<Self> {
        if token.is_empty() {
            return Err(BridgeError::InvalidToken);
        }
        let mut payload = Payload::new();
        payload.insert(KEY_TOKEN.to_string(), Value::String(token.to_string()));
        Self::new(EventKind::TokenRefreshed, payload)
    }

    pub fn message_received(payload: Payload) -> Result<Self> {
        Self::new(EventKind::MessageReceived, payload)
    }

    pub fn notification_displayed(payload: Payload) -> Result<Self> {
        Self::new(EventKind::NotificationDisplayed, payload)
    }

    pub fn notification_opened(payload: Payload) -> Result<Self> {
        Self::new(EventKind::NotificationOpened, payload)
    }

    /// 上行消息发送失败
    pub fn message_send_error(
        message_id: &str,
        code: &str,
        message: Option<&str>,
    ) -> Result<Self> {
        let mut error = Payload::new();
        error.insert("code".to_string(), Value::String(code.to_string()));
        if let Some(message) = message {
            error.insert("message".to_string(), Value::String(message.to_string()));
        }

        let mut payload = Payload::new();
        payload.insert(KEY_MESSAGE_ID.to_string(), Value::String(message_id.to_string()));
        payload.insert(KEY_ERROR.to_string(), Value::Object(error));
        Self::new(EventKind::MessageSendError, payload)
    }

    /// 服务端删除了待投递消息
    pub fn messages_deleted() -> Result<Self> {
        Self::new(EventKind::MessagesDeleted, Payload::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_payload(value: Value) -> Payload {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_token_refreshed() {
        let event = Event::token_refreshed("abc").unwrap();
        assert_eq!(event.kind(), EventKind::TokenRefreshed);
        assert_eq!(event.get("token"), Some(&json!("abc")));
    }

    #[test]
    fn test_token_refreshed_rejects_empty() {
        assert!(matches!(
            Event::token_refreshed(""),
            Err(BridgeError::InvalidToken)
        ));
        // 只要求非空，原样保留
        let event = Event::token_refreshed(" ").unwrap();
        assert_eq!(event.get("token"), Some(&json!(" ")));
    }

    #[test]
    fn test_message_received_allows_empty_data() {
        let event = Event::message_received(as_payload(json!({
            "data": {},
            "ttl": 0,
            "sentTime": 0
        })))
        .unwrap();
        assert_eq!(event.get("data"), Some(&json!({})));
    }

    #[test]
    fn test_message_received_missing_ttl() {
        let result = Event::message_received(as_payload(json!({
            "data": {},
            "sentTime": 0
        })));
        match result {
            Err(BridgeError::SchemaViolation { kind, reason }) => {
                assert_eq!(kind, EventKind::MessageReceived);
                assert!(reason.contains("ttl"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = Event::message_received(as_payload(json!({
            "data": {},
            "ttl": 0,
            "sentTime": 0,
            "title": "not allowed here"
        })));
        assert!(matches!(result, Err(BridgeError::SchemaViolation { .. })));
    }

    #[test]
    fn test_null_required_field_rejected() {
        let result = Event::notification_opened(as_payload(json!({
            "action": null,
            "notification": {}
        })));
        assert!(matches!(result, Err(BridgeError::SchemaViolation { .. })));
    }

    #[test]
    fn test_notification_displayed_requires_flags() {
        let result = Event::notification_displayed(as_payload(json!({
            "title": "hi",
            "sticky": false
        })));
        assert!(matches!(result, Err(BridgeError::SchemaViolation { .. })));

        let event = Event::notification_displayed(as_payload(json!({
            "title": "hi",
            "sticky": false,
            "localOnly": false,
            "defaultSound": true,
            "defaultVibratingSetting": false,
            "defaultLightSetting": false
        })))
        .unwrap();
        assert_eq!(event.get("defaultSound"), Some(&json!(true)));
    }

    #[test]
    fn test_message_send_error() {
        let event = Event::message_send_error("m-1", "service-not-available", None).unwrap();
        assert_eq!(event.get("error"), Some(&json!({"code": "service-not-available"})));
    }

    #[test]
    fn test_messages_deleted_is_empty() {
        let event = Event::messages_deleted().unwrap();
        assert!(event.payload().is_empty());
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(EventKind::NotificationOpened.to_string(), "NotificationOpened");
        assert_eq!(
            "messaging_token_refresh".parse::<EventKind>(),
            Ok(EventKind::TokenRefreshed)
        );
        assert_eq!(
            "MessagesDeleted".parse::<EventKind>(),
            Ok(EventKind::MessagesDeleted)
        );
        assert_eq!(
            "unknown".parse::<EventKind>(),
            Err(UnknownEventKind("unknown".to_string()))
        );
    }

    #[test]
    fn test_serialization_tags_kind() {
        let event = Event::token_refreshed("tok").unwrap();
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json, json!({"kind": "TokenRefreshed", "payload": {"token": "tok"}}));
    }
}
