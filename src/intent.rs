//! Pending-intent descriptors for notification actions
//!
//! A displayed notification carries one intent per action control. The
//! platform identifies an intent by its request code, so the code is a
//! deterministic hash of `(notificationId, actionId)`: registering the same
//! pair again replaces the stored extras instead of adding a second entry.

use serde::Serialize;
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use tracing::debug;

use crate::error::{BridgeError, Result};
use crate::event::model::{KEY_ACTION, KEY_NOTIFICATION};
use crate::event::{EventKind, NotificationContent, Payload};
use crate::serializer::content_to_payload;

/// Intent action used for broadcasts aimed at the background action receiver.
pub const ACTION_BACKGROUND_NOTIFICATION: &str = "push_event_bridge.notifications.BackgroundAction";

/// Deterministic de-duplication key for an action control.
pub fn action_dedup_key(notification_id: &str, action_id: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    (notification_id, action_id).hash(&mut hasher);
    hasher.finish()
}

/// Deterministic de-duplication key for the notification body (tap) intent.
pub fn content_dedup_key(notification_id: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    notification_id.hash(&mut hasher);
    hasher.finish()
}

/// Which component the platform should deliver the intent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentTarget {
    /// Background receiver that hands the action to the router.
    ActionReceiver,
    /// Host application's launch entry point.
    LaunchEntry,
}

/// Opaque descriptor handed to the platform's pending-intent mechanism.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingIntentDescriptor {
    #[serde(serialize_with = "serialize_hex")]
    pub request_code: u64,
    pub target: IntentTarget,
    pub intent_action: Option<String>,
    pub extras: Payload,
    pub single_top: bool,
    pub update_current: bool,
}

impl PendingIntentDescriptor {
    /// Hex form of the request code, as used in logs.
    pub fn dedup_key(&self) -> String {
        format!("{:016x}", self.request_code)
    }
}

fn serialize_hex<S: serde::Serializer>(code: &u64, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("{:016x}", code))
}

/// Whether a registration created a new entry or replaced an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Created,
    Updated,
}

/// Pending intents currently armed on displayed notifications.
#[derive(Default)]
pub struct PendingIntentRegistry {
    entries: Mutex<HashMap<(IntentTarget, u64), PendingIntentDescriptor>>,
}

impl PendingIntentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build (or update) the intent for one action control on `content`.
    pub fn build_action_pending_intent(
        &self,
        content: &NotificationContent,
        action_id: &str,
    ) -> Result<(PendingIntentDescriptor, Registration)> {
        let notification_id = require_notification_id(content)?;
        if action_id.is_empty() {
            return Err(BridgeError::schema(
                EventKind::NotificationOpened,
                "action id must not be empty",
            ));
        }

        let mut extras = Payload::new();
        extras.insert(KEY_ACTION.to_string(), Value::String(action_id.to_string()));
        extras.insert(
            KEY_NOTIFICATION.to_string(),
            Value::Object(content_to_payload(content)),
        );

        let descriptor = PendingIntentDescriptor {
            request_code: action_dedup_key(notification_id, action_id),
            target: IntentTarget::ActionReceiver,
            intent_action: Some(ACTION_BACKGROUND_NOTIFICATION.to_string()),
            extras,
            single_top: true,
            update_current: true,
        };

        let registration = self.register(descriptor.clone());
        debug!(
            notification_id = %notification_id,
            action_id = %action_id,
            key = %descriptor.dedup_key(),
            ?registration,
            "Action pending intent armed"
        );
        Ok((descriptor, registration))
    }

    /// Build (or update) the intent fired when the notification body is tapped.
    pub fn build_content_intent(
        &self,
        content: &NotificationContent,
        launch_action: Option<&str>,
    ) -> Result<(PendingIntentDescriptor, Registration)> {
        let notification_id = require_notification_id(content)?;

        let descriptor = PendingIntentDescriptor {
            request_code: content_dedup_key(notification_id),
            target: IntentTarget::LaunchEntry,
            intent_action: launch_action.map(str::to_string),
            extras: content_to_payload(content),
            single_top: true,
            update_current: true,
        };

        let registration = self.register(descriptor.clone());
        Ok((descriptor, registration))
    }

    fn register(&self, descriptor: PendingIntentDescriptor) -> Registration {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.insert((descriptor.target, descriptor.request_code), descriptor) {
            Some(_) => Registration::Updated,
            None => Registration::Created,
        }
    }

    pub fn get_action(&self, notification_id: &str, action_id: &str) -> Option<PendingIntentDescriptor> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .get(&(
                IntentTarget::ActionReceiver,
                action_dedup_key(notification_id, action_id),
            ))
            .cloned()
    }

    /// Drop every intent armed for `notification_id` (notification dismissed).
    pub fn cancel(&self, notification_id: &str) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, descriptor| {
            let id = descriptor
                .extras
                .get(KEY_NOTIFICATION)
                .and_then(|n| n.get("notificationId"))
                .or_else(|| descriptor.extras.get("notificationId"))
                .and_then(Value::as_str);
            id != Some(notification_id)
        });
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn require_notification_id(content: &NotificationContent) -> Result<&str> {
    content
        .notification_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            BridgeError::schema(
                EventKind::NotificationOpened,
                "notification has no `notificationId`",
            )
        })
}
