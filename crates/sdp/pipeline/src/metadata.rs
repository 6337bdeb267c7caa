//! Environment class lookup for deployment-window selection.

use std::collections::HashMap;

use async_trait::async_trait;
use sdp_types::EnvironmentClass;

/// Read-only lookup of the environment class a target belongs to.
#[async_trait]
pub trait TargetMetadataSource: Send + Sync {
    async fn environment_class(&self, target: &str) -> EnvironmentClass;
}

/// Explicit target -> class table, falling back to name inference.
#[derive(Debug, Clone, Default)]
pub struct StaticTargetMetadata {
    classes: HashMap<String, EnvironmentClass>,
}

impl StaticTargetMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_class(mut self, target: impl Into<String>, class: EnvironmentClass) -> Self {
        self.classes.insert(target.into(), class);
        self
    }

    pub fn from_map(classes: HashMap<String, EnvironmentClass>) -> Self {
        Self { classes }
    }

    pub fn class_of(&self, target: &str) -> EnvironmentClass {
        self.classes
            .get(target)
            .copied()
            .unwrap_or_else(|| EnvironmentClass::infer(target))
    }
}

#[async_trait]
impl TargetMetadataSource for StaticTargetMetadata {
    async fn environment_class(&self, target: &str) -> EnvironmentClass {
        self.class_of(target)
    }
}
