//! Review prompt construction.

use sdp_types::{ChangeProposal, RiskLevel};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Everything the reviewer sees about one proposed change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewProposal {
    pub artifact: String,
    pub original_code: String,
    pub proposed_code: String,
    #[serde(default)]
    pub improvements: Vec<String>,
    #[serde(default)]
    pub coverage_pct: Option<f64>,
    #[serde(default)]
    pub risk_level: RiskLevel,
}

impl ReviewProposal {
    /// Pair a request's proposal with the proposed artifact content.
    pub fn from_change(change: &ChangeProposal, proposed_code: impl Into<String>) -> Self {
        Self {
            artifact: change.artifact.clone(),
            original_code: change.original_code.clone(),
            proposed_code: proposed_code.into(),
            improvements: change.improvements.clone(),
            coverage_pct: change.coverage_pct,
            risk_level: change.risk_level,
        }
    }
}

const INSTRUCTIONS: &str = r#"You are the final quality gate before an automatically authored code change is deployed.

Review the proposed code against the original. Check that the claimed improvements are real,
that behaviour is preserved unless a change is claimed, and that the code is safe to deploy:
no queries or data mutations inside loops, no hardcoded credentials or record ids, and no
unguarded null dereferences.

If the change is acceptable but needs small fixes, approve it and return the complete corrected
code in "final_code". If it is not acceptable, reject it and explain why.

Respond with exactly one JSON object in this format:

{
  "approved": true | false,
  "reason": "<short explanation>",
  "changes": ["<each change you made to the proposed code>"],
  "final_code": "<complete code to deploy, or null to deploy the proposal unchanged>"
}"#;

/// Build the full prompt sent on the reviewer's stdin.
pub fn build_prompt(proposal: &ReviewProposal) -> String {
    let request = json!({
        "artifact": proposal.artifact,
        "risk_level": proposal.risk_level,
        "coverage_pct": proposal.coverage_pct,
        "claimed_improvements": proposal.improvements,
        "original_code": proposal.original_code,
        "proposed_code": proposal.proposed_code,
    });
    let request = serde_json::to_string_pretty(&request).unwrap_or_else(|_| "{}".to_string());
    format!("{}\n\nReview request:\n{}\n", INSTRUCTIONS, request)
}
