//! Lineage graph derivation tests: node/edge shape, idempotence, and the
//! ambiguous-input configuration error.

mod common;

use common::*;
use pipestack_core::lineage::{EdgeKind, LineageGraphBuilder, LineageNode};
use pipestack_core::store::MemoryStore;
use pipestack_core::{NameOrId, StoreError};

#[tokio::test]
async fn producer_consumer_pair_yields_three_nodes_and_two_edges() {
    let store = MemoryStore::new();
    let scope = test_scope(&store).await;
    let run = RunBuilder::new(&scope).build(&store).await;

    let step_a = StepRunBuilder::new(&run).with_name("a").build(&store).await;
    let artifact = ArtifactBuilder::new(&step_a)
        .with_name("dataset")
        .build(&store)
        .await;
    let step_b = StepRunBuilder::new(&run)
        .with_name("b")
        .with_input("dataset")
        .build(&store)
        .await;

    let graph = LineageGraphBuilder::new(&store)
        .build(&NameOrId::Id(run.id))
        .await
        .unwrap();

    assert_eq!(graph.node_count(), 3);
    assert_eq!(graph.edge_count(), 2);

    let produced = graph
        .edges
        .iter()
        .find(|edge| edge.kind == EdgeKind::Produced)
        .unwrap();
    assert_eq!(produced.source, step_a.id);
    assert_eq!(produced.target, artifact.id);

    let consumed = graph
        .edges
        .iter()
        .find(|edge| edge.kind == EdgeKind::Consumed)
        .unwrap();
    assert_eq!(consumed.source, artifact.id);
    assert_eq!(consumed.target, step_b.id);
}

#[tokio::test]
async fn rebuilding_yields_an_identical_graph() {
    let store = MemoryStore::new();
    let scope = test_scope(&store).await;
    let run = RunBuilder::new(&scope).build(&store).await;

    let loader = StepRunBuilder::new(&run).with_name("load").build(&store).await;
    ArtifactBuilder::new(&loader)
        .with_name("raw")
        .build(&store)
        .await;
    ArtifactBuilder::new(&loader)
        .with_name("labels")
        .build(&store)
        .await;
    StepRunBuilder::new(&run)
        .with_name("train")
        .with_input("raw")
        .with_input("labels")
        .build(&store)
        .await;

    let builder = LineageGraphBuilder::new(&store);
    let first = builder.build(&NameOrId::Id(run.id)).await.unwrap();
    let second = builder.build(&NameOrId::Id(run.id)).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn edges_always_point_forward_in_execution_order() {
    let store = MemoryStore::new();
    let scope = test_scope(&store).await;
    let run = RunBuilder::new(&scope).build(&store).await;

    let mut step_ids = Vec::new();
    let mut previous_output: Option<String> = None;
    for index in 0..4 {
        let output = format!("stage-{index}");
        let mut builder = StepRunBuilder::new(&run).with_name(&format!("step-{index}"));
        if let Some(input) = &previous_output {
            builder = builder.with_input(input);
        }
        let step = builder.build(&store).await;
        ArtifactBuilder::new(&step)
            .with_name(&output)
            .build(&store)
            .await;
        step_ids.push(step.id);
        previous_output = Some(output);
    }

    let graph = LineageGraphBuilder::new(&store)
        .build(&NameOrId::Id(run.id))
        .await
        .unwrap();

    // Position of every step node in execution order.
    let order: std::collections::HashMap<_, _> = step_ids
        .iter()
        .enumerate()
        .map(|(index, id)| (*id, index))
        .collect();
    // An artifact's producer must come strictly before every consumer.
    for edge in graph.edges.iter().filter(|e| e.kind == EdgeKind::Consumed) {
        let producer = graph
            .edges
            .iter()
            .find(|e| e.kind == EdgeKind::Produced && e.target == edge.source)
            .expect("consumed artifact has a producer");
        assert!(order[&producer.source] < order[&edge.target]);
    }
}

#[tokio::test]
async fn steps_without_inputs_or_consumers_stay_disconnected() {
    let store = MemoryStore::new();
    let scope = test_scope(&store).await;
    let run = RunBuilder::new(&scope).build(&store).await;

    StepRunBuilder::new(&run).with_name("solo").build(&store).await;

    let graph = LineageGraphBuilder::new(&store)
        .build(&NameOrId::Id(run.id))
        .await
        .unwrap();
    assert_eq!(graph.node_count(), 1);
    assert_eq!(graph.edge_count(), 0);
    assert!(matches!(graph.nodes[0], LineageNode::Step(_)));
}

#[tokio::test]
async fn input_without_upstream_producer_yields_no_edge() {
    let store = MemoryStore::new();
    let scope = test_scope(&store).await;
    let run = RunBuilder::new(&scope).build(&store).await;

    // The declared input was materialized outside this run.
    StepRunBuilder::new(&run)
        .with_name("consumer")
        .with_input("external-dataset")
        .build(&store)
        .await;

    let graph = LineageGraphBuilder::new(&store)
        .build(&NameOrId::Id(run.id))
        .await
        .unwrap();
    assert_eq!(graph.edge_count(), 0);
}

#[tokio::test]
async fn ambiguous_input_names_fail_the_build() {
    let store = MemoryStore::new();
    let scope = test_scope(&store).await;
    let run = RunBuilder::new(&scope).build(&store).await;

    let first = StepRunBuilder::new(&run).with_name("a").build(&store).await;
    ArtifactBuilder::new(&first)
        .with_name("dataset")
        .build(&store)
        .await;
    let second = StepRunBuilder::new(&run).with_name("b").build(&store).await;
    ArtifactBuilder::new(&second)
        .with_name("dataset")
        .build(&store)
        .await;
    StepRunBuilder::new(&run)
        .with_name("c")
        .with_input("dataset")
        .build(&store)
        .await;

    let err = LineageGraphBuilder::new(&store)
        .build(&NameOrId::Id(run.id))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
    assert!(err.to_string().contains("dataset"));
}

#[tokio::test]
async fn unknown_run_fails_with_not_found() {
    let store = MemoryStore::new();
    let err = LineageGraphBuilder::new(&store)
        .build(&NameOrId::Id(uuid::Uuid::new_v4()))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn step_input_resolution_maps_names_to_artifacts() {
    let store = MemoryStore::new();
    let scope = test_scope(&store).await;
    let run = RunBuilder::new(&scope).build(&store).await;

    let producer = StepRunBuilder::new(&run).with_name("load").build(&store).await;
    let artifact = ArtifactBuilder::new(&producer)
        .with_name("raw")
        .build(&store)
        .await;
    let consumer = StepRunBuilder::new(&run)
        .with_name("train")
        .with_input("raw")
        .build(&store)
        .await;

    use pipestack_core::store::Store;
    let inputs = store.get_run_step_inputs(consumer.id).await.unwrap();
    assert_eq!(inputs.len(), 1);
    assert_eq!(inputs["raw"].id, artifact.id);
}
