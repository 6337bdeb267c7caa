//! SDP Quality Gate - external review of automatically authored changes
//!
//! Proposed code is sent to an external reviewer process together with the
//! code it replaces and the author's claims. The reviewer answers with a
//! JSON payload embedded somewhere in its output. The gate fails closed:
//! timeouts, crashes, empty output and unparseable or mis-shaped payloads
//! all count as rejection. An approval may carry refined code that then
//! supersedes the proposal.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod error;
pub mod gate;
pub mod process;
pub mod prompt;
pub mod reviewer;
pub mod verdict;

pub use error::{Result, ReviewerError};
pub use gate::{BatchReviewReport, QualityGate, QualityGateConfig};
pub use process::{run_with_input, ProcessOutput};
pub use prompt::{build_prompt, ReviewProposal};
pub use reviewer::{CommandReviewer, ExternalReviewer, ReviewerResponse, ScriptedReviewer};
pub use verdict::{parse_verdict, ReviewVerdict};
