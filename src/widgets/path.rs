//! # Hierarchical widget names.
//!
//! A [`WidgetPath`] is a `.`- or `/`-separated name such as `app.workers.queue_depth`.
//! It is the primary key of the registry and the only way subscriptions and activity
//! state refer to a widget.
//!
//! ## Rules
//! - Non-empty, at most [`MAX_PATH_LEN`] bytes.
//! - No empty segments (`a..b`, `.a`, `a/` are rejected).
//! - Segment characters: ASCII alphanumerics, `_` and `-`.
//! - Separators are kept verbatim, so `a.b` and `a/b` are different keys.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Maximum length of a widget path in bytes.
pub const MAX_PATH_LEN: usize = 256;

/// Validated, cheaply cloneable widget name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WidgetPath(Arc<str>);

impl WidgetPath {
    /// Parses and validates a path.
    ///
    /// # Example
    /// ```
    /// use livedash::WidgetPath;
    ///
    /// let p = WidgetPath::new("app.workers/queue_depth").unwrap();
    /// assert_eq!(p.segments().collect::<Vec<_>>(), ["app", "workers", "queue_depth"]);
    /// assert!(WidgetPath::new("app..x").is_err());
    /// ```
    pub fn new(raw: impl AsRef<str>) -> Result<Self, EngineError> {
        let raw = raw.as_ref();
        validate(raw)?;
        Ok(Self(Arc::from(raw)))
    }

    /// Returns the path as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterates over the segments between separators.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(is_separator)
    }

    /// Returns the last segment.
    pub fn leaf(&self) -> &str {
        self.segments().last().unwrap_or(self.as_str())
    }

    /// Returns true if `self` equals `prefix` or lies below it.
    pub fn starts_with(&self, prefix: &WidgetPath) -> bool {
        let (me, p) = (self.as_str(), prefix.as_str());
        me == p
            || (me.len() > p.len()
                && me.starts_with(p)
                && me[p.len()..].starts_with(is_separator))
    }
}

fn is_separator(c: char) -> bool {
    c == '.' || c == '/'
}

fn validate(raw: &str) -> Result<(), EngineError> {
    let fail = |reason: &str| {
        Err(EngineError::InvalidPath {
            path: raw.chars().take(64).collect(),
            reason: reason.to_string(),
        })
    };

    if raw.is_empty() {
        return fail("path is empty");
    }
    if raw.len() > MAX_PATH_LEN {
        return fail("path is too long");
    }
    for segment in raw.split(is_separator) {
        if segment.is_empty() {
            return fail("empty segment");
        }
        if !segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return fail("segments may only contain ASCII alphanumerics, '_' and '-'");
        }
    }
    Ok(())
}

impl fmt::Display for WidgetPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for WidgetPath {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for WidgetPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for WidgetPath {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        WidgetPath::new(value)
    }
}

impl TryFrom<&str> for WidgetPath {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        WidgetPath::new(value)
    }
}

impl From<WidgetPath> for String {
    fn from(value: WidgetPath) -> Self {
        value.0.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_mixed_separators() {
        let p = WidgetPath::new("app.workers/queue-depth_1").unwrap();
        assert_eq!(p.leaf(), "queue-depth_1");
        assert_eq!(p.segments().count(), 3);
    }

    #[test]
    fn test_rejects_malformed_paths() {
        for raw in ["", ".", "a.", "/a", "a..b", "a b", "a.ü", "a\0b"] {
            let err = WidgetPath::new(raw).unwrap_err();
            assert_eq!(err.as_label(), "invalid_path", "raw={raw:?}");
        }
        let long = "a".repeat(MAX_PATH_LEN + 1);
        assert!(WidgetPath::new(long).is_err());
    }

    #[test]
    fn test_separators_are_distinct_keys() {
        assert_ne!(WidgetPath::new("a.b").unwrap(), WidgetPath::new("a/b").unwrap());
    }

    #[test]
    fn test_starts_with_respects_segment_boundaries() {
        let root = WidgetPath::new("app.jobs").unwrap();
        assert!(WidgetPath::new("app.jobs").unwrap().starts_with(&root));
        assert!(WidgetPath::new("app.jobs.done").unwrap().starts_with(&root));
        assert!(!WidgetPath::new("app.jobsx").unwrap().starts_with(&root));
    }

    #[test]
    fn test_serde_validates() {
        let p: WidgetPath = serde_json::from_str("\"a.b\"").unwrap();
        assert_eq!(p.as_str(), "a.b");
        assert!(serde_json::from_str::<WidgetPath>("\"a..b\"").is_err());
    }
}
