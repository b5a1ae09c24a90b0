//! Scope-based cache invalidation.
//!
//! # Responsibilities
//! - Map a logical scope and id to the key patterns and tags it owns
//! - Delete them from the external store and the local layer
//!
//! # Design Decisions
//! - Tags are naming conventions: a tag resolves to key patterns, not to an
//!   index kept in the store
//! - Best effort: a failed pattern is logged and the rest still run
//! - Ids are encoded as a JSON string, then glob-escaped, so they match the
//!   way string arguments appear in keys; numeric arguments never match

use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::cache::key::escape_pattern;
use crate::cache::layer::CacheLayer;
use crate::observability::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidationScope {
    User,
    Vocabulary,
    Practice,
    Translation,
    Global,
}

#[derive(Debug, Clone, Error, PartialEq)]
#[error("unknown invalidation scope: {0}")]
pub struct UnknownScope(pub String);

impl InvalidationScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Vocabulary => "vocabulary",
            Self::Practice => "practice",
            Self::Translation => "translation",
            Self::Global => "global",
        }
    }

    /// Key patterns owned by this scope for `id`. Only string arguments equal
    /// to `id` are matched.
    pub fn patterns(&self, id: &str) -> Vec<String> {
        let id = escape_pattern(&serde_json::Value::from(id).to_string());
        let owned = |domain: &str| format!("{}:*{}*", domain, id);
        match self {
            Self::User => vec![owned("user"), owned("vocabulary"), owned("practice")],
            Self::Vocabulary => vec![owned("vocabulary")],
            Self::Practice => vec![owned("practice")],
            Self::Translation => vec![owned("translation")],
            Self::Global => vec!["*".to_string()],
        }
    }

    /// Local-layer tags owned by this scope for `id`.
    pub fn tags(&self, id: &str) -> Vec<String> {
        match self {
            Self::User => vec![
                format!("user-{}", id),
                format!("vocabulary-{}", id),
                format!("practice-{}", id),
            ],
            Self::Vocabulary => vec![format!("vocabulary-{}", id)],
            Self::Practice => vec![format!("practice-{}", id)],
            Self::Translation => vec![format!("translation-{}", id)],
            Self::Global => Vec::new(),
        }
    }
}

impl fmt::Display for InvalidationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvalidationScope {
    type Err = UnknownScope;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "vocabulary" => Ok(Self::Vocabulary),
            "practice" => Ok(Self::Practice),
            "translation" => Ok(Self::Translation),
            "global" => Ok(Self::Global),
            _ => Err(UnknownScope(s.to_string())),
        }
    }
}

/// Outcome of one invalidation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InvalidationReport {
    pub patterns: Vec<String>,
    /// Keys removed across both layers.
    pub deleted: u64,
    /// Patterns the external store failed to delete.
    pub failures: Vec<String>,
}

impl CacheLayer {
    /// Delete everything `scope` owns for `id`. Never fails.
    pub async fn invalidate(&self, scope: InvalidationScope, id: &str) -> InvalidationReport {
        let patterns = scope.patterns(id);
        let mut report = InvalidationReport {
            patterns: patterns.clone(),
            ..Default::default()
        };

        if let Some(store) = self.store() {
            for pattern in &patterns {
                match store.del_pattern(pattern).await {
                    Ok(n) => report.deleted += n,
                    Err(e) => {
                        tracing::warn!(scope = %scope, pattern = %pattern, error = %e, "Cache invalidation failed");
                        metrics::record_cache_backend_error("del_pattern");
                        report.failures.push(pattern.clone());
                    }
                }
            }
        }

        if let Some(local) = self.local() {
            for pattern in &patterns {
                report.deleted += local.remove_matching(pattern);
            }
            for tag in scope.tags(id) {
                report.deleted += local.invalidate_tag(&tag);
            }
        }

        metrics::record_invalidation(scope.as_str());
        tracing::info!(
            scope = %scope,
            id = %id,
            deleted = report.deleted,
            failures = report.failures.len(),
            "Cache invalidated"
        );
        report
    }
}
