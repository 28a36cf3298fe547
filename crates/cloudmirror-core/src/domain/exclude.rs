//! Exclude rule set applied to every sync invocation
//!
//! Patterns use glob syntax and are handed to the external tool unchanged
//! as `--exclude` arguments. Validation goes through [`glob::Pattern`] so a
//! malformed pattern is rejected before it can break every sync.

use glob::Pattern;
use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Patterns excluded when nothing else is configured
pub const DEFAULT_EXCLUDES: &[&str] = &[
    ".git/**",
    "node_modules/**",
    "__pycache__/**",
    ".cache/**",
    ".Trash-*/**",
    "*.tmp",
    "*.swp",
    "*.partial",
    "~$*",
    ".~lock.*#",
    ".DS_Store",
    "Thumbs.db",
];

/// Ordered, duplicate-free list of exclude globs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExcludeRules {
    patterns: Vec<String>,
}

impl ExcludeRules {
    /// Builds a rule set, rejecting the first invalid pattern
    ///
    /// Duplicates are dropped silently so a hand-edited config file with a
    /// repeated line still loads.
    pub fn new<I, S>(patterns: I) -> Result<Self, DomainError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut rules = Self {
            patterns: Vec::new(),
        };
        for pattern in patterns {
            let pattern = pattern.into();
            validate_pattern(&pattern)?;
            if !rules.contains(&pattern) {
                rules.patterns.push(pattern);
            }
        }
        Ok(rules)
    }

    /// Rule set with no patterns
    pub fn empty() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn contains(&self, pattern: &str) -> bool {
        self.patterns.iter().any(|p| p == pattern)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Appends a pattern
    ///
    /// # Errors
    /// [`DomainError::InvalidPattern`] for a malformed glob,
    /// [`DomainError::DuplicatePattern`] if it is already present.
    pub fn add(&mut self, pattern: &str) -> Result<(), DomainError> {
        validate_pattern(pattern)?;
        if self.contains(pattern) {
            return Err(DomainError::DuplicatePattern(pattern.to_string()));
        }
        self.patterns.push(pattern.to_string());
        Ok(())
    }

    /// Removes a pattern
    ///
    /// # Errors
    /// [`DomainError::UnknownPattern`] if the pattern is not in the set.
    pub fn remove(&mut self, pattern: &str) -> Result<(), DomainError> {
        let index = self
            .patterns
            .iter()
            .position(|p| p == pattern)
            .ok_or_else(|| DomainError::UnknownPattern(pattern.to_string()))?;
        self.patterns.remove(index);
        Ok(())
    }
}

impl Default for ExcludeRules {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_EXCLUDES.iter().map(|p| p.to_string()).collect(),
        }
    }
}

fn validate_pattern(pattern: &str) -> Result<(), DomainError> {
    if pattern.trim().is_empty() {
        return Err(DomainError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: "pattern must not be empty".to_string(),
        });
    }
    Pattern::new(pattern).map_err(|e| DomainError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })?;
    Ok(())
}
