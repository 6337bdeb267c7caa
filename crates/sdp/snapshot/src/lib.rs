//! SDP Snapshot - capture and restore of pre-deploy target state
//!
//! Before a deployment pushes anything, the pipeline captures the current
//! state of every artifact the request touches. If the push or the
//! verification fails, the snapshot is restored so the target returns to
//! exactly the captured state, including removal of artifacts that did not
//! exist before.
//!
//! ## Components
//!
//! - [`SnapshotStore`]: the contract the pipeline depends on
//! - [`SnapshotManager`]: reader + writer + storage composed into a store
//! - [`SnapshotStorage`]: persistence backends (memory, JSON files)
//! - [`InMemoryTargets`]: simulated target environments

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod error;
pub mod manager;
pub mod simulated;
pub mod state;
pub mod storage;

pub use error::{Result, SnapshotError};
pub use manager::{RestoreReport, SnapshotManager, SnapshotStore};
pub use simulated::InMemoryTargets;
pub use state::{TargetStateReader, TargetStateWriter};
pub use storage::{FileSnapshotStorage, InMemorySnapshotStorage, SnapshotStorage};
