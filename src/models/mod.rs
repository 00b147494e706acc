//! # Resource Models
//!
//! Typed request/response/update/filter families for every resource kind the
//! store manages. Each entity is a small family of plain data structures
//! sharing a common field subset by composition; conversion between these
//! models and persisted rows lives in the store backends, never here.

pub mod artifact;
pub mod component;
pub mod flavor;
pub mod page;
pub mod pipeline;
pub mod project;
pub mod role;
pub mod run;
pub mod stack;
pub mod step_run;
pub mod team;
pub mod user;

// Re-export models for easy access
pub use artifact::{ArtifactFilter, ArtifactRequest, ArtifactResponse};
pub use component::{
    ComponentFilter, ComponentRequest, ComponentResponse, ComponentUpdate,
};
pub use flavor::{FlavorFilter, FlavorRequest, FlavorResponse};
pub use page::{Page, Pagination};
pub use pipeline::{
    PipelineFilter, PipelineRequest, PipelineResponse, PipelineSpec, PipelineUpdate, StepSpec,
};
pub use project::{ProjectFilter, ProjectRequest, ProjectResponse, ProjectUpdate};
pub use role::{
    RoleAssignmentFilter, RoleAssignmentRequest, RoleAssignmentResponse, RoleFilter, RoleRequest,
    RoleResponse, RoleUpdate,
};
pub use run::{run_status_from_steps, RunFilter, RunRequest, RunResponse, RunUpdate};
pub use stack::{StackFilter, StackRequest, StackResponse, StackUpdate};
pub use step_run::{StepRunFilter, StepRunRequest, StepRunResponse, StepRunUpdate};
pub use team::{TeamFilter, TeamRequest, TeamResponse, TeamUpdate};
pub use user::{UserFilter, UserRequest, UserResponse, UserUpdate};
