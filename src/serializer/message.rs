//! 传输层对象 → 归一化事件
//!
//! 约定：上游缺失的可选字段在事件里同样缺失（不填 null、不填空串）；
//! 通知的五个布尔字段始终输出。

use serde_json::{Number, Value};
use std::sync::Arc;

use super::localization::{resolve_localized, ResourceCatalog};
use crate::error::{BridgeError, Result};
use crate::event::model::{
    KEY_ACTION, KEY_COLLAPSE_KEY, KEY_DATA, KEY_DEFAULT_LIGHT_SETTING, KEY_DEFAULT_SOUND,
    KEY_DEFAULT_VIBRATING_SETTING, KEY_FROM, KEY_LOCAL_ONLY, KEY_MESSAGE_ID, KEY_MESSAGE_TYPE,
    KEY_NOTIFICATION, KEY_NOTIFICATION_ID, KEY_REPLY, KEY_SENT_TIME, KEY_STICKY, KEY_TO, KEY_TTL,
};
use crate::event::{Event, EventKind, InboundMessage, NotificationContent, Payload};

/// 平台放置自由文本回复的保留 key
pub const KEY_RESULT: &str = "result";
/// 回复输入框的默认 key
pub const REPLY_INPUT_KEY: &str = "reply";

/// 消息/通知序列化器
///
/// 只做内存内转换，持有一个只读资源目录用于标题/正文本地化，可并发调用。
#[derive(Clone)]
pub struct MessageSerializer {
    catalog: Arc<dyn ResourceCatalog>,
}

impl MessageSerializer {
    pub fn new(catalog: Arc<dyn ResourceCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &dyn ResourceCatalog {
        self.catalog.as_ref()
    }

    /// token 刷新事件
    pub fn token_refreshed_event(&self, token: &str) -> Result<Event> {
        Event::token_refreshed(token)
    }

    /// 消息头字段 + data / ttl / sentTime
    pub fn message_payload(&self, message: &InboundMessage) -> Payload {
        let mut payload = Payload::new();

        put_opt(&mut payload, KEY_COLLAPSE_KEY, message.collapse_key.as_deref());
        put_opt(&mut payload, KEY_FROM, message.from.as_deref());
        put_opt(&mut payload, KEY_TO, message.to.as_deref());
        put_opt(&mut payload, KEY_MESSAGE_ID, message.message_id.as_deref());
        put_opt(&mut payload, KEY_MESSAGE_TYPE, message.message_type.as_deref());

        put_common(&mut payload, message);
        payload
    }

    /// `MessageReceived` 事件，不携带通知内容
    pub fn to_message_received_event(&self, message: &InboundMessage) -> Result<Event> {
        Event::message_received(self.message_payload(message))
    }

    /// 通知内容的事件形态（本地化后的标题/正文，布尔字段总是存在）
    pub fn notification_fields(&self, content: &NotificationContent) -> Payload {
        let mut payload = Payload::new();

        put_opt(&mut payload, KEY_NOTIFICATION_ID, content.notification_id.as_deref());

        let title = resolve_localized(
            self.catalog(),
            content.title.as_deref(),
            content.title_loc_key.as_deref(),
            &content.title_loc_args,
        );
        put_opt(&mut payload, "title", title.as_deref());

        let body = resolve_localized(
            self.catalog(),
            content.body.as_deref(),
            content.body_loc_key.as_deref(),
            &content.body_loc_args,
        );
        put_opt(&mut payload, "body", body.as_deref());

        put_opt(&mut payload, "icon", content.icon.as_deref());
        put_opt(&mut payload, "channelId", content.channel_id.as_deref());
        put_opt(&mut payload, "imageUrl", content.image_url.as_deref());
        put_opt(&mut payload, "soundUrl", content.sound.as_deref());
        put_opt(&mut payload, "notificationSound", content.sound.as_deref());
        put_opt(&mut payload, "tag", content.tag.as_deref());
        put_opt(&mut payload, "color", content.color.as_deref());
        put_opt(&mut payload, "clickAction", content.click_action.as_deref());
        put_opt(&mut payload, "link", content.link.as_deref());
        put_opt(&mut payload, "ticker", content.ticker.as_deref());

        if let Some(priority) = content.notification_priority {
            payload.insert("notificationPriority".to_string(), Value::from(priority));
        }
        if let Some(visibility) = content.visibility {
            payload.insert("visibility".to_string(), Value::from(visibility));
        }
        if let Some(count) = content.notification_count {
            payload.insert("notificationCount".to_string(), Value::from(count));
        }
        if let Some(event_time) = content.event_time {
            payload.insert("eventTime".to_string(), Value::from(event_time));
        }
        if let Some(lights) = &content.light_settings {
            payload.insert("lightSettings".to_string(), Value::from(lights.clone()));
        }
        if let Some(timings) = &content.vibrate_timings {
            payload.insert("vibrateTimings".to_string(), Value::from(timings.clone()));
        }

        payload.insert(KEY_STICKY.to_string(), Value::Bool(content.sticky));
        payload.insert(KEY_LOCAL_ONLY.to_string(), Value::Bool(content.local_only));
        payload.insert(KEY_DEFAULT_SOUND.to_string(), Value::Bool(content.default_sound));
        payload.insert(
            KEY_DEFAULT_VIBRATING_SETTING.to_string(),
            Value::Bool(content.default_vibrate_settings),
        );
        payload.insert(
            KEY_DEFAULT_LIGHT_SETTING.to_string(),
            Value::Bool(content.default_light_settings),
        );

        payload
    }

    /// `NotificationDisplayed` 事件（只含通知内容）
    pub fn to_notification_displayed_event(&self, content: &NotificationContent) -> Result<Event> {
        Event::notification_displayed(self.notification_fields(content))
    }

    /// 前台收到带通知的消息：通知字段 + 消息的 data / ttl / sentTime
    pub fn to_remote_notification_event(&self, message: &InboundMessage) -> Result<Event> {
        let content = message.notification.as_ref().ok_or_else(|| {
            BridgeError::schema(
                EventKind::NotificationDisplayed,
                "message carries no notification",
            )
        })?;

        let mut payload = self.notification_fields(content);
        put_common(&mut payload, message);
        Event::notification_displayed(payload)
    }

    /// 延迟投递用的消息 payload：`MessageReceived` 形态，附带通知内容（如有）
    pub fn to_deferred_message_payload(&self, message: &InboundMessage) -> Payload {
        let mut payload = self.message_payload(message);
        if let Some(content) = &message.notification {
            payload.insert(
                KEY_NOTIFICATION.to_string(),
                Value::Object(self.notification_fields(content)),
            );
        }
        payload
    }

    /// 平台交回的原始 action payload → `NotificationOpened`
    ///
    /// 必须同时包含 `action` 和 `notification`，否则返回 `MalformedActionPayload`。
    pub fn to_notification_opened_event(&self, raw: &Payload) -> Result<Event> {
        let action = raw
            .get(KEY_ACTION)
            .and_then(Value::as_str)
            .ok_or_else(|| BridgeError::MalformedActionPayload("missing `action`".to_string()))?;
        let notification = raw
            .get(KEY_NOTIFICATION)
            .and_then(Value::as_object)
            .ok_or_else(|| {
                BridgeError::MalformedActionPayload("missing `notification`".to_string())
            })?;

        let mut payload = Payload::new();
        payload.insert(KEY_ACTION.to_string(), Value::String(action.to_string()));
        payload.insert(KEY_NOTIFICATION.to_string(), Value::Object(notification.clone()));

        let notification_id = match notification.get(KEY_NOTIFICATION_ID) {
            Some(Value::String(id)) => Some(id.clone()),
            Some(Value::Number(id)) => Some(id.to_string()),
            _ => None,
        };
        put_opt(&mut payload, KEY_NOTIFICATION_ID, notification_id.as_deref());

        // 已重建过的 payload 直接带 `reply`，平台原始 payload 放在 `result` 下
        let reply = raw
            .get(KEY_REPLY)
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| extract_reply(raw));
        put_opt(&mut payload, KEY_REPLY, reply.as_deref());

        Event::notification_opened(payload)
    }
}

/// 是否是后台通知交互的 payload（同时带 action id 和通知内容）
pub fn is_background_notification_payload(raw: &Payload) -> bool {
    raw.get(KEY_ACTION).is_some_and(Value::is_string)
        && raw.get(KEY_NOTIFICATION).is_some_and(Value::is_object)
}

/// 从保留的 `result` key 中取出自由文本回复
///
/// `result` 可以是字符串，也可以是“输入框 key → 文本”的映射；
/// 映射时优先取 `reply`，否则取第一个字符串值。
pub fn extract_reply(raw: &Payload) -> Option<String> {
    match raw.get(KEY_RESULT)? {
        Value::String(text) => Some(text.clone()),
        Value::Object(results) => results
            .get(REPLY_INPUT_KEY)
            .and_then(Value::as_str)
            .or_else(|| results.values().find_map(Value::as_str))
            .map(str::to_string),
        _ => None,
    }
}

fn put_opt(payload: &mut Payload, key: &str, value: Option<&str>) {
    if let Some(value) = value {
        payload.insert(key.to_string(), Value::String(value.to_string()));
    }
}

fn put_common(payload: &mut Payload, message: &InboundMessage) {
    let data: Payload = message
        .data
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    payload.insert(KEY_DATA.to_string(), Value::Object(data));
    payload.insert(KEY_TTL.to_string(), Value::Number(Number::from(message.ttl)));
    payload.insert(KEY_SENT_TIME.to_string(), Value::Number(Number::from(message.sent_time)));
}
