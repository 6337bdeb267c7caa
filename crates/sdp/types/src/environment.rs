//! Environment classes used to pick deployment windows.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Broad class of a target environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentClass {
    Development,
    Uat,
    Production,
}

impl EnvironmentClass {
    /// Guess a class from a target name. Used when no metadata source knows
    /// the target.
    pub fn infer(target: &str) -> Self {
        let lower = target.to_ascii_lowercase();
        if ["prod", "live", "main"].iter().any(|t| lower.contains(t)) {
            EnvironmentClass::Production
        } else if ["uat", "staging", "qa", "preprod"]
            .iter()
            .any(|t| lower.contains(t))
        {
            EnvironmentClass::Uat
        } else {
            EnvironmentClass::Development
        }
    }
}

impl fmt::Display for EnvironmentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvironmentClass::Development => write!(f, "development"),
            EnvironmentClass::Uat => write!(f, "uat"),
            EnvironmentClass::Production => write!(f, "production"),
        }
    }
}

impl FromStr for EnvironmentClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(EnvironmentClass::Development),
            "uat" => Ok(EnvironmentClass::Uat),
            "production" | "prod" => Ok(EnvironmentClass::Production),
            other => Err(format!("unknown environment class: {}", other)),
        }
    }
}
