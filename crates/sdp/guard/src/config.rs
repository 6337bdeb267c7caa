//! Configuration for safeguards.

use serde::{Deserialize, Serialize};

use crate::error::{GuardError, Result};
use crate::risk::RiskRule;

/// Which targets may be deployed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetPolicyConfig {
    /// Exact target names that are always allowed.
    pub allowed: Vec<String>,

    /// Case-insensitive substrings that mark a target as production.
    pub production_indicators: Vec<String>,

    /// Reject targets that are neither allow-listed nor production.
    pub strict: bool,
}

impl Default for TargetPolicyConfig {
    fn default() -> Self {
        Self {
            allowed: Vec::new(),
            production_indicators: default_production_indicators(),
            strict: true,
        }
    }
}

fn default_production_indicators() -> Vec<String> {
    ["production", "prod", "live", "main"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl TargetPolicyConfig {
    /// Strict policy allowing exactly the given targets.
    pub fn allow(targets: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            allowed: targets.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn relaxed(mut self) -> Self {
        self.strict = false;
        self
    }

    /// Reject configurations in which an allow-list entry would itself be
    /// blocked as production; such an entry can never be deployed to.
    pub fn validate(&self) -> Result<()> {
        if self.production_indicators.iter().any(|t| t.trim().is_empty()) {
            return Err(GuardError::InvalidConfig(
                "production indicator tokens must not be empty".into(),
            ));
        }
        for entry in &self.allowed {
            let lower = entry.to_lowercase();
            if let Some(token) = self
                .production_indicators
                .iter()
                .find(|t| lower.contains(&t.to_lowercase()))
            {
                return Err(GuardError::InvalidConfig(format!(
                    "allow-list entry '{}' contains production indicator '{}'",
                    entry, token
                )));
            }
        }
        Ok(())
    }
}

/// Circuit breaker thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Failures before the breaker opens.
    pub failure_threshold: u32,

    /// Seconds after the last failure before the breaker resets.
    pub reset_timeout_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout_secs: 300,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.failure_threshold == 0 {
            return Err(GuardError::InvalidConfig(
                "circuit breaker failure_threshold must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Tuning for the pattern risk scanner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskScanConfig {
    /// Words that make a debug/log statement sensitive.
    pub sensitive_terms: Vec<String>,

    /// Additional regular expressions treated as hardcoded secrets.
    pub extra_secret_patterns: Vec<String>,

    /// Rules to skip entirely.
    pub disabled_rules: Vec<RiskRule>,
}

impl Default for RiskScanConfig {
    fn default() -> Self {
        Self {
            sensitive_terms: ["password", "token", "secret", "ssn", "credit", "session"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            extra_secret_patterns: Vec::new(),
            disabled_rules: Vec::new(),
        }
    }
}
