//! NotificationContent 与扁平 payload（intent extras）之间的转换
//!
//! 写出方向直接使用 serde；读入方向逐字段宽松解析：类型不符的可选字段
//! 被忽略（记 debug 日志），而不是让整个 payload 失败。

use serde_json::Value;
use tracing::debug;

use crate::event::{NotificationContent, Payload};

/// 转成可重新挂到 pending intent 上的扁平 payload
pub fn content_to_payload(content: &NotificationContent) -> Payload {
    match serde_json::to_value(content) {
        Ok(Value::Object(map)) => map,
        // NotificationContent 只包含字符串/数字/布尔/数组，总是序列化为对象
        _ => Payload::new(),
    }
}

/// 从平台交回的 payload 宽松地还原通知内容
pub fn content_from_payload(payload: &Payload) -> NotificationContent {
    let reader = FieldReader { payload };

    NotificationContent {
        notification_id: reader.id("notificationId"),
        title: reader.string("title"),
        title_loc_key: reader.string("titleLocKey"),
        title_loc_args: reader.strings("titleLocArgs").unwrap_or_default(),
        body: reader.string("body"),
        body_loc_key: reader.string("bodyLocKey"),
        body_loc_args: reader.strings("bodyLocArgs").unwrap_or_default(),
        icon: reader.string("icon"),
        image_url: reader.string("imageUrl"),
        sound: reader
            .string("sound")
            .or_else(|| reader.string("notificationSound"))
            .or_else(|| reader.string("soundUrl")),
        tag: reader.string("tag"),
        channel_id: reader.string("channelId"),
        color: reader.string("color"),
        click_action: reader.string("clickAction"),
        link: reader.string("link"),
        ticker: reader.string("ticker"),
        visibility: reader.int("visibility"),
        notification_priority: reader.int("notificationPriority"),
        notification_count: reader.int("notificationCount"),
        event_time: reader.long("eventTime"),
        sticky: reader.flag(&["sticky"]),
        local_only: reader.flag(&["localOnly"]),
        default_sound: reader.flag(&["defaultSound"]),
        default_vibrate_settings: reader.flag(&["defaultVibrateSettings", "defaultVibratingSetting"]),
        default_light_settings: reader.flag(&["defaultLightSettings", "defaultLightSetting"]),
        vibrate_timings: reader.longs("vibrateTimings"),
        light_settings: reader
            .longs("lightSettings")
            .map(|values| values.into_iter().filter_map(|v| i32::try_from(v).ok()).collect()),
    }
}

struct FieldReader<'a> {
    payload: &'a Payload,
}

impl FieldReader<'_> {
    fn present(&self, key: &str) -> Option<&Value> {
        match self.payload.get(key) {
            None | Some(Value::Null) => None,
            Some(value) => Some(value),
        }
    }

    fn ignore(&self, key: &str, expected: &str) {
        debug!(field = %key, expected = %expected, "Ignoring notification field with unexpected type");
    }

    fn string(&self, key: &str) -> Option<String> {
        match self.present(key)? {
            Value::String(s) => Some(s.clone()),
            _ => {
                self.ignore(key, "string");
                None
            }
        }
    }

    /// 平台有时把 id 存成数字
    fn id(&self, key: &str) -> Option<String> {
        match self.present(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => {
                self.ignore(key, "string or number");
                None
            }
        }
    }

    fn long(&self, key: &str) -> Option<i64> {
        let value = self.present(key)?;
        let parsed = match value {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        if parsed.is_none() {
            self.ignore(key, "integer");
        }
        parsed
    }

    fn int(&self, key: &str) -> Option<i32> {
        self.long(key).and_then(|v| i32::try_from(v).ok())
    }

    fn flag(&self, keys: &[&str]) -> bool {
        keys.iter()
            .find_map(|key| match self.present(key)? {
                Value::Bool(b) => Some(*b),
                Value::String(s) => s.parse().ok(),
                _ => {
                    self.ignore(key, "boolean");
                    None
                }
            })
            .unwrap_or(false)
    }

    fn strings(&self, key: &str) -> Option<Vec<String>> {
        match self.present(key)? {
            Value::Array(items) => Some(
                items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect(),
            ),
            _ => {
                self.ignore(key, "array");
                None
            }
        }
    }

    fn longs(&self, key: &str) -> Option<Vec<i64>> {
        match self.present(key)? {
            Value::Array(items) => Some(
                items
                    .iter()
                    .filter_map(|item| item.as_i64().or_else(|| item.as_f64().map(|f| f as i64)))
                    .collect(),
            ),
            _ => {
                self.ignore(key, "array");
                None
            }
        }
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
    fn test_to_payload_keeps_flags_and_omits_absent() {
        let content = NotificationContent::new("42").with_title("Hi");
        let payload = content_to_payload(&content);

        assert_eq!(payload.get("notificationId"), Some(&json!("42")));
        assert_eq!(payload.get("title"), Some(&json!("Hi")));
        assert_eq!(payload.get("sticky"), Some(&json!(false)));
        assert!(!payload.contains_key("body"));
        assert!(!payload.contains_key("titleLocArgs"));
    }

    #[test]
    fn test_from_payload_restores_content() {
        let mut content = NotificationContent::new("42")
            .with_title("Hi")
            .with_body("There");
        content.title_loc_key = Some("greeting".to_string());
        content.title_loc_args = vec!["Bo".to_string()];
        content.visibility = Some(1);
        content.vibrate_timings = Some(vec![0, 250, 250]);
        content.sticky = true;

        let restored = content_from_payload(&content_to_payload(&content));
        assert_eq!(restored, content);
    }

    #[test]
    fn test_from_payload_is_lenient() {
        let payload = as_payload(json!({
            "notificationId": 7,
            "title": 12,
            "body": "ok",
            "visibility": "2",
            "sticky": "true",
            "localOnly": {"nested": true},
            "vibrateTimings": "not-a-list"
        }));

        let content = content_from_payload(&payload);
        assert_eq!(content.notification_id.as_deref(), Some("7"));
        assert_eq!(content.title, None);
        assert_eq!(content.body.as_deref(), Some("ok"));
        assert_eq!(content.visibility, Some(2));
        assert!(content.sticky);
        assert!(!content.local_only);
        assert_eq!(content.vibrate_timings, None);
    }

    #[test]
    fn test_from_payload_accepts_event_form_keys() {
        let payload = as_payload(json!({
            "notificationSound": "chime",
            "defaultVibratingSetting": true,
            "defaultLightSetting": true
        }));

        let content = content_from_payload(&payload);
        assert_eq!(content.sound.as_deref(), Some("chime"));
        assert!(content.default_vibrate_settings);
        assert!(content.default_light_settings);
    }
}
