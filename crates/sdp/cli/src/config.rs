//! Configuration for the `sdp` binary.
//!
//! Sources, lowest precedence first: built-in defaults, an optional TOML
//! file, then `SDP_*` environment variables (`__` separates sections, e.g.
//! `SDP_CIRCUIT_BREAKER__FAILURE_THRESHOLD=5`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use sdp_guard::{CircuitBreakerConfig, DeploymentWindows, RiskScanConfig, TargetPolicyConfig};
use sdp_pipeline::PipelineConfig;
use sdp_quality_gate::QualityGateConfig;
use sdp_scheduler::SchedulerConfig;
use sdp_types::EnvironmentClass;
use serde::{Deserialize, Serialize};

/// Complete binary configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SdpConfig {
    pub targets: TargetsConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub windows: DeploymentWindows,
    pub risk: RiskScanConfig,
    pub pipeline: PipelineConfig,
    pub scheduler: SchedulerConfig,
    pub quality_gate: QualityGateConfig,
    pub remote: RemoteConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// Target policy plus the environment class of known targets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetsConfig {
    pub allowed: Vec<String>,
    pub production_indicators: Vec<String>,
    pub strict: bool,

    /// Environment class per target name; unknown targets are classified
    /// from their name.
    pub classes: HashMap<String, EnvironmentClass>,
}

impl Default for TargetsConfig {
    fn default() -> Self {
        let policy = TargetPolicyConfig::default();
        Self {
            allowed: policy.allowed,
            production_indicators: policy.production_indicators,
            strict: policy.strict,
            classes: HashMap::new(),
        }
    }
}

impl TargetsConfig {
    pub fn policy(&self) -> TargetPolicyConfig {
        TargetPolicyConfig {
            allowed: self.allowed.clone(),
            production_indicators: self.production_indicators.clone(),
            strict: self.strict,
        }
    }
}

/// Which remote collaborator the binary talks to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteMode {
    /// Shell out to `remote.program`.
    #[default]
    Command,
    /// In-process simulated targets; state lasts for one invocation.
    Simulated,
}

/// External platform CLI used to push, verify and snapshot.
///
/// Every `*_args` entry may contain `{target}`, `{dir}` (a staging
/// directory holding one file per artifact) and `{names}` (comma-separated
/// artifact names).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub mode: RemoteMode,
    pub program: Option<String>,
    /// Dry-run validation; skipped when empty.
    pub validate_args: Vec<String>,
    pub push_args: Vec<String>,
    pub verify_args: Vec<String>,
    /// Download current artifact state into `{dir}` for snapshots.
    pub retrieve_args: Vec<String>,
    /// Remove artifacts that a restore must delete; restores that need a
    /// deletion fail when this is empty.
    pub delete_args: Vec<String>,
    /// Upper bound on a single command, in seconds
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            mode: RemoteMode::Command,
            program: None,
            validate_args: Vec::new(),
            push_args: Vec::new(),
            verify_args: Vec::new(),
            retrieve_args: Vec::new(),
            delete_args: Vec::new(),
            timeout_secs: 900,
        }
    }
}

/// Where durable state lives
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Defaults to the platform data directory (`~/.local/share/sdp` on
    /// Linux).
    pub data_dir: Option<PathBuf>,
}

impl StorageConfig {
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("sdp")
        })
    }

    pub fn history_path(&self) -> PathBuf {
        self.data_dir().join("history.jsonl")
    }

    pub fn schedule_path(&self) -> PathBuf {
        self.data_dir().join("schedules.json")
    }

    pub fn snapshot_dir(&self) -> PathBuf {
        self.data_dir().join("snapshots")
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter; `RUST_LOG` overrides it.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl SdpConfig {
    /// Load configuration from defaults, an optional file and the
    /// environment.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&SdpConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }

        builder = builder.add_source(
            config::Environment::with_prefix("SDP")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("targets.allowed")
                .with_list_parse_key("targets.production_indicators"),
        );

        builder.build()?.try_deserialize()
    }
}
