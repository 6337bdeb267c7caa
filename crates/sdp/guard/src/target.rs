//! Target validation.
//!
//! The single chokepoint every deployment passes before any mutation:
//!
//! 1. A target containing a production-indicator token (case-insensitive
//!    substring) is blocked. Nothing overrides this, not even the allow-list.
//! 2. A target that exactly matches an allow-list entry is allowed.
//! 3. Anything else is blocked in strict mode, or allowed with a warning in
//!    relaxed mode.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::TargetPolicyConfig;
use crate::error::{GuardError, Result};

/// Why a target was allowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "clearance", rename_all = "snake_case")]
pub enum TargetClearance {
    /// Exact allow-list match.
    Allowlisted,
    /// Not allow-listed, allowed because the policy is relaxed.
    Unlisted { warning: String },
}

impl TargetClearance {
    pub fn warning(&self) -> Option<&str> {
        match self {
            TargetClearance::Allowlisted => None,
            TargetClearance::Unlisted { warning } => Some(warning),
        }
    }
}

/// Decides whether a target may be deployed to.
#[derive(Debug, Clone)]
pub struct TargetValidator {
    config: TargetPolicyConfig,
    indicators: Vec<String>,
}

impl TargetValidator {
    /// Build a validator; fails on a self-contradicting configuration.
    pub fn new(config: TargetPolicyConfig) -> Result<Self> {
        config.validate()?;
        let indicators = config
            .production_indicators
            .iter()
            .map(|t| t.to_lowercase())
            .collect();
        Ok(Self { config, indicators })
    }

    pub fn config(&self) -> &TargetPolicyConfig {
        &self.config
    }

    /// Validate a target name.
    pub fn validate(&self, target: &str) -> Result<TargetClearance> {
        let lower = target.to_lowercase();

        if let Some(token) = self.indicators.iter().find(|t| lower.contains(t.as_str())) {
            warn!(target = %target, token = %token, "Blocked production target");
            return Err(GuardError::BlockedTarget {
                target: target.to_string(),
                reason: format!("name contains production indicator '{}'", token),
            });
        }

        if self.config.allowed.iter().any(|a| a == target) {
            debug!(target = %target, "Target is allow-listed");
            return Ok(TargetClearance::Allowlisted);
        }

        if self.config.strict {
            warn!(target = %target, "Blocked target not on allow-list");
            return Err(GuardError::BlockedTarget {
                target: target.to_string(),
                reason: "not whitelisted".to_string(),
            });
        }

        let warning = format!("target '{}' is not on the allow-list", target);
        warn!(target = %target, "Allowing unlisted target in relaxed mode");
        Ok(TargetClearance::Unlisted { warning })
    }

    /// Convenience check used by read-only surfaces.
    pub fn is_allowed(&self, target: &str) -> bool {
        self.validate(target).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn strict() -> TargetValidator {
        TargetValidator::new(TargetPolicyConfig::allow(["dev-sandbox", "uat-acme"])).unwrap()
    }

    #[test]
    fn production_blocked_even_when_relaxed() {
        let validator = TargetValidator::new(TargetPolicyConfig::default().relaxed()).unwrap();
        for name in ["production", "acme-PROD", "Live-EU", "main"] {
            let err = validator.validate(name).unwrap_err();
            assert!(matches!(err, GuardError::BlockedTarget { .. }), "{name}");
        }
    }

    #[test]
    fn allow_listed_target_passes_in_strict_mode() {
        assert_eq!(
            strict().validate("dev-sandbox").unwrap(),
            TargetClearance::Allowlisted
        );
    }

    #[test]
    fn allow_list_is_exact_match() {
        let err = strict().validate("dev-sandbox-2").unwrap_err();
        assert!(err.to_string().contains("not whitelisted"));
    }

    #[test]
    fn relaxed_mode_warns() {
        let validator = TargetValidator::new(TargetPolicyConfig::default().relaxed()).unwrap();
        let clearance = validator.validate("scratch-42").unwrap();
        assert!(clearance.warning().unwrap().contains("scratch-42"));
    }

    #[test]
    fn conflicting_allow_list_is_rejected_at_construction() {
        let result = TargetValidator::new(TargetPolicyConfig::allow(["live-mirror"]));
        assert!(matches!(result, Err(GuardError::InvalidConfig(_))));
    }

    proptest! {
        #[test]
        fn any_name_with_indicator_is_blocked(
            prefix in "[a-z0-9-]{0,8}",
            suffix in "[a-z0-9-]{0,8}",
            token in prop_oneof![Just("production"), Just("PROD"), Just("Live"), Just("main")],
            strict_mode in any::<bool>(),
        ) {
            let mut config = TargetPolicyConfig::allow(["dev-sandbox"]);
            config.strict = strict_mode;
            let validator = TargetValidator::new(config).unwrap();
            let name = format!("{prefix}{token}{suffix}");
            let blocked = matches!(
                validator.validate(&name),
                Err(GuardError::BlockedTarget { .. })
            );
            prop_assert!(blocked);
        }

        #[test]
        fn allow_listed_names_always_pass(name in "dev-[a-k]{1,10}") {
            let validator = TargetValidator::new(TargetPolicyConfig::allow([name.clone()])).unwrap();
            prop_assert_eq!(validator.validate(&name).unwrap(), TargetClearance::Allowlisted);
        }
    }
}
