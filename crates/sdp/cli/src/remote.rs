//! Collaborators backed by an external platform CLI.
//!
//! Artifacts travel through a staging directory with one file per
//! artifact, named after the artifact. Argument templates are expanded per
//! call; see [`RemoteConfig`].

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sdp_pipeline::{
    DeploymentPackage, PushReceipt, RemoteDeployer, RemoteError, RemoteValidation,
    VerificationReport,
};
use sdp_quality_gate::{run_with_input, ProcessOutput};
use sdp_snapshot::{SnapshotError, TargetStateReader, TargetStateWriter};
use sdp_types::{ArtifactSet, CapturedArtifact};
use serde::Deserialize;
use serde_json::Value;
use tempfile::TempDir;
use tracing::{debug, instrument, warn};

use crate::config::RemoteConfig;

// ── Templates and staging ─────────────────────────────────────────────

/// Values substituted into argument templates.
#[derive(Debug)]
struct Placeholders<'a> {
    target: &'a str,
    dir: Option<&'a Path>,
    names: Vec<&'a str>,
}

impl Placeholders<'_> {
    fn expand(&self, template: &[String]) -> Vec<String> {
        let dir = self
            .dir
            .map(|d| d.display().to_string())
            .unwrap_or_default();
        let names = self.names.join(",");
        template
            .iter()
            .map(|arg| {
                arg.replace("{target}", self.target)
                    .replace("{dir}", &dir)
                    .replace("{names}", &names)
            })
            .collect()
    }
}

/// Artifact names become file names; anything that could escape the
/// staging directory is refused.
fn staged_file_name(name: &str) -> Result<&str, String> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
    {
        return Err(format!("artifact name '{}' cannot be staged as a file", name));
    }
    Ok(name)
}

async fn stage<'a>(
    artifacts: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> Result<TempDir, String> {
    let dir = TempDir::new().map_err(|e| format!("cannot create staging directory: {}", e))?;
    for (name, content) in artifacts {
        let file = dir.path().join(staged_file_name(name)?);
        tokio::fs::write(&file, content)
            .await
            .map_err(|e| format!("cannot stage '{}': {}", name, e))?;
    }
    Ok(dir)
}

// ── Response envelope ─────────────────────────────────────────────────

/// `{"status": 0, "message": "...", "result": {...}}`, the shape most
/// platform CLIs print with a JSON flag. Every field is optional.
#[derive(Debug, Default, Deserialize)]
struct Envelope {
    #[serde(default)]
    status: Option<i64>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    result: Value,
}

impl Envelope {
    /// Empty stdout is an empty envelope; non-JSON stdout is malformed.
    fn parse(stdout: &str) -> Result<(Self, Value), RemoteError> {
        let trimmed = stdout.trim();
        if trimmed.is_empty() {
            return Ok((Self::default(), Value::Null));
        }
        let raw: Value = serde_json::from_str(trimmed)
            .map_err(|e| RemoteError::Malformed(format!("stdout is not JSON: {}", e)))?;
        let envelope = Self::deserialize(&raw)
            .map_err(|e| RemoteError::Malformed(format!("unexpected response shape: {}", e)))?;
        Ok((envelope, raw))
    }

    fn succeeded(&self, output: &ProcessOutput) -> bool {
        output.success() && self.status.unwrap_or(0) == 0
    }
}

/// Test counts, accepting both snake_case and camelCase spellings.
#[derive(Debug, Default, Deserialize)]
struct TestSummary {
    #[serde(default, alias = "testsRan", alias = "testsRun")]
    tests_run: Option<u32>,
    #[serde(default, alias = "failing")]
    failures: Option<u32>,
    #[serde(default)]
    outcome: Option<String>,
}

impl TestSummary {
    fn from_result(result: &Value) -> Result<Self, RemoteError> {
        let summary = result.get("summary").unwrap_or(result);
        if summary.is_null() {
            return Ok(Self::default());
        }
        Self::deserialize(summary)
            .map_err(|e| RemoteError::Malformed(format!("unexpected test summary: {}", e)))
    }
}

fn failure_lines(output: &ProcessOutput, envelope: &Envelope) -> Vec<String> {
    let mut lines: Vec<String> = envelope.message.iter().cloned().collect();
    lines.extend(
        output
            .stderr
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string),
    );
    if lines.is_empty() {
        lines.push(format!("command exited with {:?}", output.exit_code));
    }
    lines
}

// ── Shared runner ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct CommandRunner {
    program: String,
    timeout: Duration,
}

impl CommandRunner {
    fn from_config(config: &RemoteConfig) -> Option<Self> {
        config.program.as_ref().map(|program| Self {
            program: program.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    async fn run(&self, args: Vec<String>) -> Result<ProcessOutput, String> {
        debug!(program = %self.program, args = ?args, "Running platform command");
        let output = run_with_input(&self.program, &args, "", self.timeout, None)
            .await
            .map_err(|e| e.to_string())?;
        debug!(
            program = %self.program,
            exit_code = ?output.exit_code,
            "Platform command finished"
        );
        Ok(output)
    }
}

// ── Remote deployer ───────────────────────────────────────────────────

/// Pushes and verifies through the configured platform CLI.
#[derive(Debug, Clone)]
pub struct CommandRemoteDeployer {
    runner: CommandRunner,
    validate_args: Vec<String>,
    push_args: Vec<String>,
    verify_args: Vec<String>,
}

impl CommandRemoteDeployer {
    /// `None` unless `program` and `push_args` are configured.
    pub fn from_config(config: &RemoteConfig) -> Option<Self> {
        if config.push_args.is_empty() {
            return None;
        }
        Some(Self {
            runner: CommandRunner::from_config(config)?,
            validate_args: config.validate_args.clone(),
            push_args: config.push_args.clone(),
            verify_args: config.verify_args.clone(),
        })
    }

    async fn run_with_package(
        &self,
        template: &[String],
        package: &DeploymentPackage,
        target: &str,
    ) -> Result<ProcessOutput, RemoteError> {
        let staged = stage(
            package
                .artifacts
                .iter()
                .map(|a| (a.name.as_str(), a.content.as_str()))
                .collect::<Vec<(&str, &str)>>(),
        )
        .await
        .map_err(RemoteError::Call)?;
        let args = Placeholders {
            target,
            dir: Some(staged.path()),
            names: package.artifacts.iter().map(|a| a.name.as_str()).collect(),
        }
        .expand(template);
        self.runner.run(args).await.map_err(RemoteError::Call)
    }
}

#[async_trait]
impl RemoteDeployer for CommandRemoteDeployer {
    #[instrument(skip(self, package), fields(deployment_id = %package.deployment_id))]
    async fn validate(
        &self,
        package: &DeploymentPackage,
        target: &str,
    ) -> Result<RemoteValidation, RemoteError> {
        if self.validate_args.is_empty() {
            return Ok(RemoteValidation::ok());
        }
        let output = self
            .run_with_package(&self.validate_args, package, target)
            .await?;
        let (envelope, _) = Envelope::parse(&output.stdout)?;
        if envelope.succeeded(&output) {
            Ok(RemoteValidation::ok())
        } else {
            Ok(RemoteValidation {
                errors: failure_lines(&output, &envelope),
            })
        }
    }

    #[instrument(skip(self, package), fields(deployment_id = %package.deployment_id))]
    async fn push(
        &self,
        package: &DeploymentPackage,
        target: &str,
    ) -> Result<PushReceipt, RemoteError> {
        let output = self.run_with_package(&self.push_args, package, target).await?;
        let (envelope, payload) = Envelope::parse(&output.stdout)?;
        let success = envelope.succeeded(&output);
        let remote_id = envelope
            .result
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string);
        let message = if success {
            envelope
                .message
                .clone()
                .unwrap_or_else(|| "pushed".to_string())
        } else {
            failure_lines(&output, &envelope).join("; ")
        };
        Ok(PushReceipt {
            success,
            remote_id,
            message,
            payload,
        })
    }

    #[instrument(skip(self, affected))]
    async fn run_verification(
        &self,
        target: &str,
        affected: &[String],
    ) -> Result<VerificationReport, RemoteError> {
        if self.verify_args.is_empty() {
            warn!(target = %target, "No verify command configured; reporting zero tests");
            return Ok(VerificationReport {
                passed: true,
                tests_run: 0,
                failures: 0,
                details: vec!["no verify command configured".to_string()],
            });
        }
        let args = Placeholders {
            target,
            dir: None,
            names: affected.iter().map(String::as_str).collect(),
        }
        .expand(&self.verify_args);
        let output = self.runner.run(args).await.map_err(RemoteError::Call)?;
        let (envelope, _) = Envelope::parse(&output.stdout)?;
        let summary = TestSummary::from_result(&envelope.result)?;

        let failures = summary.failures.unwrap_or(0);
        let outcome_failed = summary
            .outcome
            .as_deref()
            .map(|o| !o.eq_ignore_ascii_case("passed"))
            .unwrap_or(false);
        let passed = envelope.succeeded(&output) && failures == 0 && !outcome_failed;
        Ok(VerificationReport {
            passed,
            tests_run: summary.tests_run.unwrap_or(0),
            failures,
            details: if passed {
                Vec::new()
            } else {
                failure_lines(&output, &envelope)
            },
        })
    }

    fn name(&self) -> &str {
        &self.runner.program
    }
}

// ── Target state ──────────────────────────────────────────────────────

/// Snapshot reader and writer over the platform CLI.
///
/// Capture retrieves the named artifacts into a staging directory; a
/// missing file means the artifact does not exist on the target. Restore
/// re-pushes captured content and deletes artifacts captured as absent.
#[derive(Debug, Clone)]
pub struct CommandTargetState {
    runner: CommandRunner,
    retrieve_args: Vec<String>,
    push_args: Vec<String>,
    delete_args: Vec<String>,
}

impl CommandTargetState {
    /// `None` unless `program` and `retrieve_args` are configured.
    pub fn from_config(config: &RemoteConfig) -> Option<Self> {
        if config.retrieve_args.is_empty() {
            return None;
        }
        Some(Self {
            runner: CommandRunner::from_config(config)?,
            retrieve_args: config.retrieve_args.clone(),
            push_args: config.push_args.clone(),
            delete_args: config.delete_args.clone(),
        })
    }

    fn storage_error(target: &str, reason: impl std::fmt::Display) -> SnapshotError {
        SnapshotError::Storage(format!("{}: {}", target, reason))
    }
}

#[async_trait]
impl TargetStateReader for CommandTargetState {
    #[instrument(skip(self, artifacts))]
    async fn fetch(
        &self,
        target: &str,
        artifacts: &ArtifactSet,
    ) -> sdp_snapshot::Result<Vec<CapturedArtifact>> {
        let capture_error = |reason: String| SnapshotError::Capture {
            target: target.to_string(),
            reason,
        };

        let staged = stage(std::iter::empty()).await.map_err(capture_error)?;
        let args = Placeholders {
            target,
            dir: Some(staged.path()),
            names: artifacts.iter().map(|a| a.name.as_str()).collect(),
        }
        .expand(&self.retrieve_args);
        let output = self.runner.run(args).await.map_err(capture_error)?;
        if !output.success() {
            return Err(capture_error(format!(
                "retrieve exited with {:?}: {}",
                output.exit_code,
                output.stderr.trim()
            )));
        }

        let mut captured = Vec::with_capacity(artifacts.len());
        for artifact in artifacts.iter() {
            let file = staged
                .path()
                .join(staged_file_name(&artifact.name).map_err(capture_error)?);
            let content = match tokio::fs::read_to_string(&file).await {
                Ok(content) => Some(content),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
                Err(e) => {
                    return Err(capture_error(format!(
                        "cannot read retrieved '{}': {}",
                        artifact.name, e
                    )))
                }
            };
            captured.push(CapturedArtifact {
                name: artifact.name.clone(),
                kind: artifact.kind,
                content,
            });
        }
        Ok(captured)
    }
}

#[async_trait]
impl TargetStateWriter for CommandTargetState {
    #[instrument(skip(self, artifacts))]
    async fn apply(&self, target: &str, artifacts: &[CapturedArtifact]) -> sdp_snapshot::Result<()> {
        let (present, absent): (Vec<_>, Vec<_>) = artifacts.iter().partition(|a| a.existed());

        if !absent.is_empty() && self.delete_args.is_empty() {
            return Err(Self::storage_error(
                target,
                format!(
                    "restore must delete {} artifact(s) but no delete command is configured",
                    absent.len()
                ),
            ));
        }

        if !present.is_empty() {
            let staged = stage(
                present
                    .iter()
                    .filter_map(|a| a.content.as_deref().map(|c| (a.name.as_str(), c)))
                    .collect::<Vec<(&str, &str)>>(),
            )
            .await
            .map_err(|e| Self::storage_error(target, e))?;
            let args = Placeholders {
                target,
                dir: Some(staged.path()),
                names: present.iter().map(|a| a.name.as_str()).collect(),
            }
            .expand(&self.push_args);
            let output = self
                .runner
                .run(args)
                .await
                .map_err(|e| Self::storage_error(target, e))?;
            if !output.success() {
                return Err(Self::storage_error(
                    target,
                    format!("re-push exited with {:?}: {}", output.exit_code, output.stderr.trim()),
                ));
            }
        }

        if !absent.is_empty() {
            let args = Placeholders {
                target,
                dir: None,
                names: absent.iter().map(|a| a.name.as_str()).collect(),
            }
            .expand(&self.delete_args);
            let output = self
                .runner
                .run(args)
                .await
                .map_err(|e| Self::storage_error(target, e))?;
            if !output.success() {
                return Err(Self::storage_error(
                    target,
                    format!("delete exited with {:?}: {}", output.exit_code, output.stderr.trim()),
                ));
            }
        }
        Ok(())
    }
}
