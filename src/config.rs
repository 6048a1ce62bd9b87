//! 桥接配置
//!
//! 加载优先级（高 → 低）：
//! 1. 代码里显式调用的 `with_*` 设置
//! 2. 环境变量 `PEB_DEFERRED_TASK_TIMEOUT_MS` / `PEB_SPOOL_PATH`
//! 3. 配置文件 `~/.config/push-event-bridge/config.json`
//! 4. 默认值
//!
//! 配置文件示例：
//! ```json
//! {
//!   "deferred_task_timeout_ms": 30000,
//!   "emitter_buffer_capacity": 200,
//!   "resources": { "new_message": "New message from %1$s" },
//!   "raw_resources": ["chime"]
//! }
//! ```
//! 旧 key `notification_android_headless_task_timeout` 同样会被识别。

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::emitter::DEFAULT_BUFFER_CAPACITY;
use crate::reconstructor::DEFAULT_TASK_TIMEOUT_MS;
use crate::serializer::MapCatalog;

pub const ENV_TIMEOUT: &str = "PEB_DEFERRED_TASK_TIMEOUT_MS";
pub const ENV_SPOOL_PATH: &str = "PEB_SPOOL_PATH";

const KEY_TIMEOUT: &str = "deferred_task_timeout_ms";
const KEY_LEGACY_TIMEOUT: &str = "notification_android_headless_task_timeout";
const KEY_BUFFER_CAPACITY: &str = "emitter_buffer_capacity";
const KEY_SPOOL_PATH: &str = "spool_path";
const KEY_RESOURCES: &str = "resources";
const KEY_RAW_RESOURCES: &str = "raw_resources";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BridgeConfig {
    pub deferred_task_timeout_ms: u64,
    pub emitter_buffer_capacity: usize,
    pub spool_path: PathBuf,
    pub resources: BTreeMap<String, String>,
    pub raw_resources: BTreeSet<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            deferred_task_timeout_ms: DEFAULT_TASK_TIMEOUT_MS,
            emitter_buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            spool_path: config_dir().join("spool.jsonl"),
            resources: BTreeMap::new(),
            raw_resources: BTreeSet::new(),
        }
    }
}

/// `~/.config/push-event-bridge`
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("push-event-bridge")
}

impl BridgeConfig {
    /// 按优先级从配置文件和环境变量加载
    pub fn auto_load() -> Self {
        let path = config_dir().join("config.json");
        let config = if path.exists() {
            match Self::load_from(&path) {
                Ok(config) => {
                    debug!(path = %path.display(), "Loaded bridge config");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to read config, using defaults");
                    Self::default()
                }
            }
        } else {
            Self::default()
        };

        config.apply_env_with(|key| std::env::var(key).ok())
    }

    /// 读取指定 JSON 配置文件
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let value: Value = serde_json::from_str(&content)
            .with_context(|| format!("Invalid JSON in {}", path.display()))?;
        Ok(Self::from_json_value(&value))
    }

    /// 在默认值之上应用 JSON 配置；类型不对的字段忽略并告警
    pub fn from_json_value(value: &Value) -> Self {
        let mut config = Self::default();

        let timeout = value
            .get(KEY_TIMEOUT)
            .map(|v| (KEY_TIMEOUT, v))
            .or_else(|| value.get(KEY_LEGACY_TIMEOUT).map(|v| (KEY_LEGACY_TIMEOUT, v)));
        if let Some((key, raw)) = timeout {
            match positive_u64(raw) {
                Some(ms) => config.deferred_task_timeout_ms = ms,
                None => warn!(key, value = %raw, "Invalid timeout in config, using default"),
            }
        }

        if let Some(raw) = value.get(KEY_BUFFER_CAPACITY) {
            match positive_u64(raw) {
                Some(n) => config.emitter_buffer_capacity = n as usize,
                None => warn!(value = %raw, "Invalid emitter_buffer_capacity, using default"),
            }
        }

        if let Some(path) = value.get(KEY_SPOOL_PATH).and_then(Value::as_str) {
            if !path.is_empty() {
                config.spool_path = PathBuf::from(path);
            }
        }

        if let Some(resources) = value.get(KEY_RESOURCES).and_then(Value::as_object) {
            for (key, format) in resources {
                match format.as_str() {
                    Some(format) => {
                        config.resources.insert(key.clone(), format.to_string());
                    }
                    None => debug!(key = %key, "Ignoring non-string resource"),
                }
            }
        }

        if let Some(raw) = value.get(KEY_RAW_RESOURCES).and_then(Value::as_array) {
            config.raw_resources = raw
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
        }

        config
    }

    /// 应用环境变量覆盖（lookup 便于测试注入）
    pub fn apply_env_with<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_TIMEOUT) {
            match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => self.deferred_task_timeout_ms = ms,
                _ => warn!(var = ENV_TIMEOUT, value = %raw, "Invalid timeout in environment, ignored"),
            }
        }
        if let Some(path) = lookup(ENV_SPOOL_PATH).filter(|p| !p.is_empty()) {
            self.spool_path = PathBuf::from(path);
        }
        self
    }

    pub fn with_deferred_task_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.deferred_task_timeout_ms = timeout_ms;
        self
    }

    pub fn with_emitter_buffer_capacity(mut self, capacity: usize) -> Self {
        self.emitter_buffer_capacity = capacity;
        self
    }

    pub fn with_spool_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.spool_path = path.into();
        self
    }

    pub fn with_resource(mut self, key: impl Into<String>, format: impl Into<String>) -> Self {
        self.resources.insert(key.into(), format.into());
        self
    }

    /// 由 `resources` / `raw_resources` 构建资源目录
    pub fn catalog(&self) -> MapCatalog {
        MapCatalog::from_parts(
            self.resources.clone().into_iter().collect(),
            self.raw_resources.iter().cloned(),
        )
    }
}

/// 正整数（数字或数字字符串）
fn positive_u64(value: &Value) -> Option<u64> {
    let n = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }?;
    (n > 0).then_some(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializer::ResourceCatalog;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.deferred_task_timeout_ms, 60000);
        assert_eq!(config.emitter_buffer_capacity, 100);
        assert!(config.spool_path.ends_with("push-event-bridge/spool.jsonl"));
    }

    #[test]
    fn test_from_json_value() {
        let config = BridgeConfig::from_json_value(&json!({
            "deferred_task_timeout_ms": 30000,
            "emitter_buffer_capacity": 5,
            "spool_path": "/tmp/peb.jsonl",
            "resources": {"greeting": "Hi %1$s", "bad": 1},
            "raw_resources": ["chime"]
        }));
        assert_eq!(config.deferred_task_timeout_ms, 30000);
        assert_eq!(config.emitter_buffer_capacity, 5);
        assert_eq!(config.spool_path, PathBuf::from("/tmp/peb.jsonl"));
        assert_eq!(config.resources.len(), 1);

        let catalog = config.catalog();
        assert_eq!(catalog.string("greeting").as_deref(), Some("Hi %1$s"));
        assert!(catalog.has_raw("chime"));
    }

    #[test]
    fn test_legacy_timeout_key() {
        let config = BridgeConfig::from_json_value(&json!({
            "notification_android_headless_task_timeout": "15000"
        }));
        assert_eq!(config.deferred_task_timeout_ms, 15000);
    }

    #[test]
    fn test_malformed_timeout_falls_back() {
        for raw in [json!(-1), json!(0), json!("soon"), json!(true)] {
            let config = BridgeConfig::from_json_value(&json!({ "deferred_task_timeout_ms": raw }));
            assert_eq!(config.deferred_task_timeout_ms, 60000);
        }
    }

    #[test]
    fn test_env_overrides_file() {
        let config = BridgeConfig::from_json_value(&json!({"deferred_task_timeout_ms": 30000}))
            .apply_env_with(|key| match key {
                ENV_TIMEOUT => Some("45000".to_string()),
                ENV_SPOOL_PATH => Some("/var/tmp/spool.jsonl".to_string()),
                _ => None,
            });
        assert_eq!(config.deferred_task_timeout_ms, 45000);
        assert_eq!(config.spool_path, PathBuf::from("/var/tmp/spool.jsonl"));
    }

    #[test]
    fn test_invalid_env_ignored() {
        let config = BridgeConfig::default().apply_env_with(|key| {
            (key == ENV_TIMEOUT).then(|| "abc".to_string())
        });
        assert_eq!(config.deferred_task_timeout_ms, 60000);
    }

    #[test]
    fn test_setters_win() {
        let config = BridgeConfig::default()
            .apply_env_with(|_| Some("45000".to_string()))
            .with_deferred_task_timeout_ms(10);
        assert_eq!(config.deferred_task_timeout_ms, 10);
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"deferred_task_timeout_ms": 1234}"#).unwrap();
        let config = BridgeConfig::load_from(&path).unwrap();
        assert_eq!(config.deferred_task_timeout_ms, 1234);

        fs::write(&path, "{not json").unwrap();
        assert!(BridgeConfig::load_from(&path).is_err());
    }
}
