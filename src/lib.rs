#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Pipestack Core
//!
//! Metadata control-plane for ML pipeline orchestration: tracks pipelines,
//! their runs, the steps within each run, the artifacts produced and
//! consumed, the infrastructure stacks runs execute on, and the users,
//! teams, and roles authorized to act on these resources.
//!
//! ## Overview
//!
//! Everything goes through one abstract [`Store`] interface. External
//! collaborators (REST adapters, orchestrator runtimes, visualization
//! clients) call the store; the store validates requests, enforces
//! scoped-uniqueness and referential invariants, and persists one
//! normalized record per resource. Two read-only consumers sit on top:
//! the [lineage graph builder](lineage::LineageGraphBuilder), which derives
//! a run's step/artifact DAG from its flat execution records, and the
//! [cache eligibility evaluator](cache::is_cache_enabled), which resolves
//! whether a step may reuse its prior outputs.
//!
//! ## Module Organization
//!
//! - [`models`] - Request/response/update/filter families per resource kind
//! - [`store`] - The store contract with in-memory and PostgreSQL backings
//! - [`lineage`] - Run lineage DAG derivation
//! - [`cache`] - Cache eligibility, cache-key fingerprints, cached-run lookup
//! - [`auth`] - Role-assignment resolution to authorization decisions
//! - [`config`] - Environment-driven backend selection
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pipestack_core::config::StoreConfig;
//! use pipestack_core::models::ProjectRequest;
//! use pipestack_core::store;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = StoreConfig::from_env()?;
//! let store = store::connect(&config).await?;
//!
//! let project = store
//!     .create_project(ProjectRequest {
//!         name: "ml-platform".to_string(),
//!         description: None,
//!     })
//!     .await?;
//! println!("created project {}", project.id);
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod cache;
pub mod config;
pub mod constants;
pub mod error;
pub mod identifier;
pub mod lineage;
pub mod logging;
pub mod models;
pub mod store;
pub mod validation;

pub use auth::{AccessControl, ResourceScope};
pub use cache::{find_cached_step_run, generate_cache_key, is_cache_enabled, CacheKeyInputs};
pub use config::{StoreBackend, StoreConfig};
pub use constants::{ExecutionStatus, PermissionType, StackComponentType};
pub use error::{Result, StoreError};
pub use identifier::NameOrId;
pub use lineage::{LineageGraph, LineageGraphBuilder};
pub use store::{connect, MemoryStore, SqlStore, Store};
