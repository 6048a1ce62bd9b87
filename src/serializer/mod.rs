//! 序列化层 - 传输层原生对象与归一化事件之间的转换

pub mod localization;
pub mod message;
pub mod payload;

pub use localization::{
    format_resource, resolve_localized, resolve_sound, EmptyCatalog, MapCatalog, ResourceCatalog,
    SoundSource,
};
pub use message::{extract_reply, is_background_notification_payload, MessageSerializer, KEY_RESULT};
pub use payload::{content_from_payload, content_to_payload};
