//! SDP Guard - pre-deployment safeguards
//!
//! Every deployment passes through the components in this crate before
//! anything reaches a remote target:
//!
//! - [`TargetValidator`]: production-indicator block list and allow-list
//! - [`RiskScanner`]: static pattern checks over artifact text
//! - [`CircuitBreaker`]: process-wide pause after repeated failures
//! - [`DeploymentWindows`]: per-environment-class time windows

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod risk;
pub mod target;
pub mod window;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerState};
pub use config::{CircuitBreakerConfig, RiskScanConfig, TargetPolicyConfig};
pub use error::{GuardError, Result};
pub use risk::{
    CompositeRiskScanner, Finding, FindingSeverity, PatternRiskScanner, RiskRule, RiskScanner,
    ScanReport,
};
pub use target::{TargetClearance, TargetValidator};
pub use window::{DeploymentWindow, DeploymentWindows};
