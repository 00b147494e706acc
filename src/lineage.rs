//! # Lineage Graph Builder
//!
//! Derives the DAG of a pipeline run from its flat execution records: one
//! node per step run and per artifact, a `Produced` edge from each step to
//! every artifact it materialized, and a `Consumed` edge from an artifact
//! to every later step that declared its output name as an input.
//!
//! The graph is acyclic by construction — consumed edges only resolve
//! against artifacts produced by strictly earlier steps, and execution
//! order is the step insertion order within the run. A declared input name
//! that matches the outputs of two or more upstream steps is a
//! configuration error and fails the build; a name with no upstream match
//! produces no edge (the artifact was materialized outside the run).
//!
//! The builder holds no locks and reads a point-in-time snapshot, so it is
//! safe to re-run at any time; two builds over the same run state return
//! structurally identical graphs.

use crate::constants::ExecutionStatus;
use crate::error::{Result, StoreError};
use crate::identifier::NameOrId;
use crate::models::{ArtifactResponse, StepRunResponse};
use crate::store::{collect_run_steps, collect_step_artifacts, Store};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// A step-run node of the lineage graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepNode {
    pub id: Uuid,
    pub name: String,
    pub status: ExecutionStatus,
}

/// An artifact node of the lineage graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactNode {
    pub id: Uuid,
    pub name: String,
    pub uri: String,
    pub is_cached: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LineageNode {
    Step(StepNode),
    Artifact(ArtifactNode),
}

impl LineageNode {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Step(step) => step.id,
            Self::Artifact(artifact) => artifact.id,
        }
    }
}

/// Edge direction follows the data: a step produces an artifact, an
/// artifact is consumed by a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Produced,
    Consumed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageEdge {
    pub source: Uuid,
    pub target: Uuid,
    pub kind: EdgeKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageGraph {
    pub run: Uuid,
    pub nodes: Vec<LineageNode>,
    pub edges: Vec<LineageEdge>,
}

impl LineageGraph {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

/// Resolve the declared inputs of `steps[step_index]` against the outputs
/// of strictly earlier steps. Returns a map of input name to artifact.
pub(crate) fn resolve_declared_inputs(
    step_index: usize,
    steps: &[StepRunResponse],
    artifacts_by_step: &HashMap<Uuid, Vec<ArtifactResponse>>,
) -> Result<BTreeMap<String, ArtifactResponse>> {
    let step = &steps[step_index];
    let mut resolved = BTreeMap::new();
    for input_name in &step.inputs {
        let mut candidates = steps[..step_index].iter().flat_map(|upstream| {
            artifacts_by_step
                .get(&upstream.id)
                .into_iter()
                .flatten()
                .filter(|artifact| artifact.name == *input_name)
        });
        let Some(artifact) = candidates.next() else {
            // Materialized outside the run, e.g. by a skipped cached step.
            continue;
        };
        if candidates.next().is_some() {
            return Err(StoreError::Validation(format!(
                "input '{input_name}' of step '{}' matches multiple upstream artifacts",
                step.name
            )));
        }
        resolved.insert(input_name.clone(), artifact.clone());
    }
    Ok(resolved)
}

/// Builds lineage graphs from a store reference injected at construction.
pub struct LineageGraphBuilder<'a> {
    store: &'a dyn Store,
}

impl<'a> LineageGraphBuilder<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Build the lineage graph for one pipeline run.
    pub async fn build(&self, run: &NameOrId) -> Result<LineageGraph> {
        let run = self.store.get_run(run).await?;
        let steps = collect_run_steps(self.store, run.id).await?;
        let artifacts_by_step = collect_step_artifacts(self.store, &steps).await?;

        let mut nodes = Vec::new();
        let mut edges = Vec::new();

        for step in &steps {
            nodes.push(LineageNode::Step(StepNode {
                id: step.id,
                name: step.name.clone(),
                status: step.status,
            }));
        }

        // Produced edges, in step order with each step's outputs ordered by
        // name so repeated builds are structurally identical.
        for step in &steps {
            let mut produced: Vec<&ArtifactResponse> = artifacts_by_step
                .get(&step.id)
                .into_iter()
                .flatten()
                .collect();
            produced.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
            for artifact in produced {
                nodes.push(LineageNode::Artifact(ArtifactNode {
                    id: artifact.id,
                    name: artifact.name.clone(),
                    uri: artifact.uri.clone(),
                    is_cached: artifact.is_cached,
                }));
                edges.push(LineageEdge {
                    source: step.id,
                    target: artifact.id,
                    kind: EdgeKind::Produced,
                });
            }
        }

        // Consumed edges: declared input names resolved against upstream
        // outputs; the BTreeMap keeps them name-ordered per step.
        for (index, step) in steps.iter().enumerate() {
            let resolved = resolve_declared_inputs(index, &steps, &artifacts_by_step)?;
            for artifact in resolved.values() {
                edges.push(LineageEdge {
                    source: artifact.id,
                    target: step.id,
                    kind: EdgeKind::Consumed,
                });
            }
        }

        Ok(LineageGraph {
            run: run.id,
            nodes,
            edges,
        })
    }
}
