//! Localized title/body resolution and notification sound lookup.
//!
//! Resource strings use positional format specifiers (`%1$s`, `%2$d`) or
//! sequential ones (`%s`, `%d`); `%%` is a literal percent sign. A key that
//! cannot be resolved, or a format string that references a missing argument,
//! is not an error: the caller falls back to the literal value.

use regex::Regex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;
use tracing::debug;

/// Read-only view of the host application's bundled resources.
pub trait ResourceCatalog: Send + Sync {
    /// Format string registered under `key`.
    fn string(&self, key: &str) -> Option<String>;

    /// Whether a raw (sound) resource named `name` is bundled.
    fn has_raw(&self, name: &str) -> bool;
}

/// Catalog with no resources; every lookup misses.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyCatalog;

impl ResourceCatalog for EmptyCatalog {
    fn string(&self, _key: &str) -> Option<String> {
        None
    }

    fn has_raw(&self, _name: &str) -> bool {
        false
    }
}

/// In-memory catalog, usually filled from configuration.
#[derive(Debug, Default, Clone)]
pub struct MapCatalog {
    strings: HashMap<String, String>,
    raw: HashSet<String>,
}

impl MapCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_string(mut self, key: impl Into<String>, format: impl Into<String>) -> Self {
        self.strings.insert(key.into(), format.into());
        self
    }

    pub fn with_raw(mut self, name: impl Into<String>) -> Self {
        self.raw.insert(name.into());
        self
    }

    pub fn from_parts(
        strings: HashMap<String, String>,
        raw: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            strings,
            raw: raw.into_iter().collect(),
        }
    }
}

impl ResourceCatalog for MapCatalog {
    fn string(&self, key: &str) -> Option<String> {
        self.strings.get(key).cloned()
    }

    fn has_raw(&self, name: &str) -> bool {
        self.raw.contains(name)
    }
}

fn specifier_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"%(?:(\d+)\$)?([sd%])").ok())
        .as_ref()
}

/// Substitute `args` into `format`. Returns `None` if a specifier points past
/// the end of `args` or a `%d` argument is not an integer.
pub fn format_resource(format: &str, args: &[String]) -> Option<String> {
    let re = specifier_regex()?;
    let mut result = String::with_capacity(format.len());
    let mut last = 0;
    let mut next_sequential = 0;

    for caps in re.captures_iter(format) {
        let whole = caps.get(0)?;
        result.push_str(&format[last..whole.start()]);
        last = whole.end();

        let conversion = caps.get(2)?.as_str();
        if conversion == "%" {
            result.push('%');
            continue;
        }

        let index = match caps.get(1) {
            Some(pos) => pos.as_str().parse::<usize>().ok()?.checked_sub(1)?,
            None => {
                let index = next_sequential;
                next_sequential += 1;
                index
            }
        };

        let arg = args.get(index)?;
        if conversion == "d" && arg.trim().parse::<i64>().is_err() {
            return None;
        }
        result.push_str(arg);
    }

    result.push_str(&format[last..]);
    Some(result)
}

/// Resolve a title or body: the localized string when `loc_key` is set and
/// resolvable, otherwise the raw literal (which may itself be absent).
pub fn resolve_localized(
    catalog: &dyn ResourceCatalog,
    literal: Option<&str>,
    loc_key: Option<&str>,
    loc_args: &[String],
) -> Option<String> {
    let Some(key) = loc_key else {
        return literal.map(str::to_string);
    };

    match catalog
        .string(key)
        .and_then(|format| format_resource(&format, loc_args))
    {
        Some(localized) => Some(localized),
        None => {
            debug!(loc_key = %key, "Localization key not resolved, using literal");
            literal.map(str::to_string)
        }
    }
}

/// Where the presenter should load a notification sound from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", content = "value", rename_all = "snake_case")]
pub enum SoundSource {
    /// Platform default notification sound.
    Default,
    /// Absolute URI, used as-is.
    Uri(String),
    /// Bundled raw resource name.
    Resource(String),
}

pub fn resolve_sound(catalog: &dyn ResourceCatalog, sound: Option<&str>) -> SoundSource {
    let Some(sound) = sound else {
        return SoundSource::Default;
    };

    if sound.contains("://") {
        return SoundSource::Uri(sound.to_string());
    }

    if sound.eq_ignore_ascii_case("default") {
        return SoundSource::Default;
    }

    if catalog.has_raw(sound) {
        return SoundSource::Resource(sound.to_string());
    }

    if let Some((stem, _)) = sound.rsplit_once('.') {
        if catalog.has_raw(stem) {
            return SoundSource::Resource(stem.to_string());
        }
    }

    debug!(sound = %sound, "Could not find specified sound, using default");
    SoundSource::Default
}
