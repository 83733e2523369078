//! Endpoint identity used to key the connection cache.

use std::fmt;

use crate::error::{CacheError, CacheResult};

/// Key identifying a cacheable endpoint — connections with the same key
/// are interchangeable.
///
/// Two keys are equal only when their targets match and their principals
/// are either both absent or both present and equal. An absent principal
/// never matches a present one, not even `Some("")`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    target: String,
    principal: Option<String>,
}

impl CacheKey {
    /// Build a key for `target`, optionally bound to `principal`.
    ///
    /// Fails when `target` is empty or only whitespace.
    pub fn new(target: &str, principal: Option<&str>) -> CacheResult<Self> {
        if target.trim().is_empty() {
            return Err(CacheError::InvalidKey(
                "connection target must not be empty".to_string(),
            ));
        }
        Ok(Self {
            target: target.to_string(),
            principal: principal.map(str::to_string),
        })
    }

    /// Connection target string (e.g. `db://host:1521/service`).
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Principal the connection was opened as, if any.
    pub fn principal(&self) -> Option<&str> {
        self.principal.as_deref()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.principal {
            Some(principal) => write!(f, "{}/{}", self.target, principal),
            None => write!(f, "{}/-", self.target),
        }
    }
}
