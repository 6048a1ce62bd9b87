//! 事件模型：归一化事件与传输层原生对象

pub mod message;
pub mod model;

pub use message::{InboundMessage, NotificationContent, PendingAction};
pub use model::{Event, EventKind, Payload, UnknownEventKind};
