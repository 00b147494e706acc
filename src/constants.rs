//! # System Constants
//!
//! Core enums and constants that define the operational boundaries of the
//! metadata control-plane: execution statuses, stack component taxonomy,
//! and the permission vocabulary consumed by the access control layer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Execution status of a pipeline run or step run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Currently being executed by the orchestrator
    Running,
    /// Completed successfully
    Completed,
    /// Failed with an error
    Failed,
    /// Skipped; prior outputs were reused
    Cached,
}

impl ExecutionStatus {
    /// Check if the execution has reached a terminal state.
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cached)
    }

    /// Check if the execution produced usable outputs.
    pub fn is_successful(&self) -> bool {
        matches!(self, Self::Completed | Self::Cached)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cached => write!(f, "cached"),
        }
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cached" => Ok(Self::Cached),
            _ => Err(format!("Invalid execution status: {s}")),
        }
    }
}

/// Taxonomy of infrastructure capabilities a stack component can provide.
///
/// A stack bundles at most one component per type; `required()` marks the
/// types a stack cannot run without.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum StackComponentType {
    Alerter,
    ArtifactStore,
    ContainerRegistry,
    DataValidator,
    ExperimentTracker,
    FeatureStore,
    ModelDeployer,
    Orchestrator,
    SecretsManager,
    StepOperator,
}

impl StackComponentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alerter => "alerter",
            Self::ArtifactStore => "artifact_store",
            Self::ContainerRegistry => "container_registry",
            Self::DataValidator => "data_validator",
            Self::ExperimentTracker => "experiment_tracker",
            Self::FeatureStore => "feature_store",
            Self::ModelDeployer => "model_deployer",
            Self::Orchestrator => "orchestrator",
            Self::SecretsManager => "secrets_manager",
            Self::StepOperator => "step_operator",
        }
    }

    /// Component types every runnable stack must provide.
    pub fn required(&self) -> bool {
        matches!(self, Self::Orchestrator | Self::ArtifactStore)
    }
}

impl fmt::Display for StackComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for StackComponentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "alerter" => Ok(Self::Alerter),
            "artifact_store" => Ok(Self::ArtifactStore),
            "container_registry" => Ok(Self::ContainerRegistry),
            "data_validator" => Ok(Self::DataValidator),
            "experiment_tracker" => Ok(Self::ExperimentTracker),
            "feature_store" => Ok(Self::FeatureStore),
            "model_deployer" => Ok(Self::ModelDeployer),
            "orchestrator" => Ok(Self::Orchestrator),
            "secrets_manager" => Ok(Self::SecretsManager),
            "step_operator" => Ok(Self::StepOperator),
            _ => Err(format!("Invalid stack component type: {s}")),
        }
    }
}

/// Permission levels a role can grant on a resource scope.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PermissionType {
    Read,
    Write,
    Admin,
}

impl fmt::Display for PermissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for PermissionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            "admin" => Ok(Self::Admin),
            _ => Err(format!("Invalid permission type: {s}")),
        }
    }
}

/// System-wide constants
pub mod system {
    /// Version marker reported alongside run records
    pub const CORE_VERSION: &str = env!("CARGO_PKG_VERSION");

    /// Default page size for list operations
    pub const DEFAULT_PAGE_SIZE: u32 = 50;

    /// Upper bound a caller can request per page
    pub const MAX_PAGE_SIZE: u32 = 1000;

    /// Maximum length of resource names
    pub const MAX_NAME_LENGTH: usize = 250;

    /// Maximum length of artifact URIs
    pub const MAX_URI_LENGTH: usize = 4096;
}
