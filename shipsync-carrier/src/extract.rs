//! Carrier response normalization.
//!
//! The tracking endpoint has answered with several JSON shapes over time:
//! a flat object carrying the current status, the same object wrapped in
//! `data`, or a timeline of events (newest first). Each shape is handled by
//! one [`StatusExtractor`]; the [`ExtractionChain`] tries them in order and
//! the first one that yields a non-blank status wins.

use serde_json::Value;
use tracing::trace;

/// Current-status field names, highest priority first.
pub const DEFAULT_STATUS_KEYS: &[&str] =
    &["status", "current_status", "last_status", "statut", "state"];

/// Keys under which a timeline of events may appear.
pub const DEFAULT_TIMELINE_KEYS: &[&str] = &["history", "events", "timeline", "tracking"];

/// Status field names inside one timeline entry.
pub const DEFAULT_EVENT_STATUS_KEYS: &[&str] = &["status", "status_name", "statut", "state"];

pub trait StatusExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    fn extract(&self, body: &Value) -> Option<String>;
}

/// Explicit single "current status" field on the root object or on a
/// `data` object wrapper.
pub struct CurrentStatusField {
    keys: Vec<&'static str>,
}

impl CurrentStatusField {
    pub fn new(keys: Vec<&'static str>) -> Self {
        Self { keys }
    }
}

impl Default for CurrentStatusField {
    fn default() -> Self {
        Self::new(DEFAULT_STATUS_KEYS.to_vec())
    }
}

impl StatusExtractor for CurrentStatusField {
    fn name(&self) -> &'static str {
        "current_status_field"
    }

    fn extract(&self, body: &Value) -> Option<String> {
        object_scopes(body)
            .into_iter()
            .find_map(|scope| first_text(scope, &self.keys))
    }
}

/// Newest entry of a timeline list.
pub struct TimelineHead {
    list_keys: Vec<&'static str>,
    entry_keys: Vec<&'static str>,
}

impl TimelineHead {
    pub fn new(list_keys: Vec<&'static str>, entry_keys: Vec<&'static str>) -> Self {
        Self { list_keys, entry_keys }
    }

    fn head_status(&self, list: &[Value]) -> Option<String> {
        match list.first()? {
            Value::String(s) => non_blank(s),
            entry => first_text(entry, &self.entry_keys),
        }
    }
}

impl Default for TimelineHead {
    fn default() -> Self {
        Self::new(DEFAULT_TIMELINE_KEYS.to_vec(), DEFAULT_EVENT_STATUS_KEYS.to_vec())
    }
}

impl StatusExtractor for TimelineHead {
    fn name(&self) -> &'static str {
        "timeline_head"
    }

    fn extract(&self, body: &Value) -> Option<String> {
        let mut lists: Vec<&Vec<Value>> = Vec::new();
        for scope in object_scopes(body) {
            for key in &self.list_keys {
                if let Some(list) = scope.get(key).and_then(Value::as_array) {
                    lists.push(list);
                }
            }
        }
        if let Some(list) = body.as_array() {
            lists.push(list);
        }
        if let Some(list) = body.get("data").and_then(Value::as_array) {
            lists.push(list);
        }

        lists.into_iter().find_map(|list| self.head_status(list))
    }
}

/// Ordered list of extraction strategies.
pub struct ExtractionChain {
    strategies: Vec<Box<dyn StatusExtractor>>,
}

impl ExtractionChain {
    pub fn empty() -> Self {
        Self { strategies: Vec::new() }
    }

    pub fn with(mut self, strategy: impl StatusExtractor + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    pub fn extract(&self, body: &Value) -> Option<String> {
        self.strategies.iter().find_map(|strategy| {
            let found = strategy.extract(body);
            if found.is_some() {
                trace!(strategy = strategy.name(), "Status extracted");
            }
            found
        })
    }
}

impl Default for ExtractionChain {
    fn default() -> Self {
        Self::empty()
            .with(CurrentStatusField::default())
            .with(TimelineHead::default())
    }
}

fn object_scopes(body: &Value) -> Vec<&Value> {
    let mut scopes = Vec::with_capacity(2);
    if body.is_object() {
        scopes.push(body);
        if let Some(data) = body.get("data").filter(|d| d.is_object()) {
            scopes.push(data);
        }
    }
    scopes
}

fn first_text(scope: &Value, keys: &[&'static str]) -> Option<String> {
    keys.iter()
        .find_map(|key| scope.get(key).and_then(Value::as_str).and_then(non_blank))
}

fn non_blank(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
