//! SDP Types - Core vocabulary for guarded deployments
//!
//! SDP (Safe Deployment Pipeline) pushes generated or hand-written artifacts
//! into remote platform environments behind a layered set of safeguards:
//! target allow-listing, static risk scanning, pre-deploy snapshots with
//! automatic rollback, an optional external quality gate, and a process-wide
//! circuit breaker. Deployments can also be scheduled for later execution
//! inside per-environment windows.
//!
//! ## Key Concepts
//!
//! - **ArtifactSet**: Named source and metadata artifacts to deploy
//! - **DeploymentRequest**: Artifacts + target + options, immutable once submitted
//! - **Snapshot**: Captured pre-deploy state of the artifacts a request touches
//! - **DeploymentRecord**: Outcome of one executed attempt
//! - **ScheduledDeployment**: A deferred request with its status machine

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod artifact;
pub mod clock;
pub mod environment;
pub mod ids;
pub mod record;
pub mod request;
pub mod review;
pub mod schedule;
pub mod snapshot;

pub use artifact::{Artifact, ArtifactKind, ArtifactSet};
pub use clock::{Clock, ManualClock, SystemClock};
pub use environment::EnvironmentClass;
pub use ids::{DeploymentId, IdParseError, ScheduleId, SnapshotId};
pub use record::{
    AttemptFailure, DeploymentOutcome, DeploymentRecord, FailureKind, PipelineStage,
    RollbackStatus, Severity, VerificationSummary,
};
pub use request::{ChangeProposal, DeploymentOptions, DeploymentRequest, RiskLevel};
pub use review::QualityGateReview;
pub use schedule::{
    NotificationFlags, RetryPolicy, ScheduleStatus, ScheduledDeployment, TransitionError,
};
pub use snapshot::{CapturedArtifact, Snapshot};
