//! SDP Pipeline - Staged deployment with snapshot and automatic rollback
//!
//! The pipeline sequences one deployment attempt:
//!
//! ```text
//! breaker-check -> window-check -> target-validate -> snapshot -> package
//!   -> [quality-gate] -> static-validate -> push -> verify
//!   -> success | rollback
//! ```
//!
//! Refusals before target validation passes are returned as
//! [`DeployError`]. Everything after that produces a [`DeploymentRecord`]
//! that is appended to the [`DeploymentHistory`]; collaborator errors never
//! escape as errors.
//!
//! [`DeploymentRecord`]: sdp_types::DeploymentRecord

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod config;
pub mod error;
pub mod events;
pub mod generator;
pub mod history;
pub mod metadata;
pub mod package;
pub mod pipeline;
pub mod remote;
pub mod simulated;

pub use config::PipelineConfig;
pub use error::{DeployError, Result};
pub use events::DeploymentEvent;
pub use generator::{CodeGenerator, GeneratedChange, GenerationError, GenerationTask};
pub use history::{
    DeploymentHistory, FileDeploymentHistory, HistoryError, HistorySummary,
    InMemoryDeploymentHistory,
};
pub use metadata::{StaticTargetMetadata, TargetMetadataSource};
pub use package::{DeploymentPackage, ManifestEntry, PackageError};
pub use pipeline::{AttemptContext, DeploymentPipeline, PipelineBuilder};
pub use remote::{PushReceipt, RemoteDeployer, RemoteError, RemoteValidation, VerificationReport};
pub use simulated::{PushBehavior, SimulatedRemoteDeployer};
