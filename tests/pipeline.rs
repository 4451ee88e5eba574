//! Workspace-level end-to-end pipeline tests: flow0 capabilities,
//! weir-block-memory engine, and weir composition working together.

use std::sync::Arc;
use weir::{Container, ContainerConfig};
use weir_block_memory::{SinkBlock, StageBlock};

fn parser() -> (Container<String, u32>, Arc<StageBlock<String, u32>>) {
    let stage = StageBlock::new("parse", |s: String| {
        s.trim().parse::<u32>().map(Some).map_err(|e| e.into())
    });
    let container =
        Container::pipeline_named("parser", ContainerConfig::default(), stage.clone(), stage.clone());
    container.register(stage.clone()).unwrap();
    (container, stage)
}

fn writer() -> (Container<u32, ()>, Arc<SinkBlock<u32>>) {
    let sink = SinkBlock::<u32>::new("write");
    let container: Container<u32, ()> =
        Container::sink("writer", ContainerConfig::default(), sink.clone());
    container.register(sink.clone()).unwrap();
    (container, sink)
}

#[tokio::test]
async fn two_stage_pipeline_completes_cleanly() {
    let (parse, _) = parser();
    let (write, sink) = writer();
    parse.link_to(&write).unwrap();

    let pulled = parse
        .pull_from(["1", "2", "3"].map(String::from))
        .await
        .unwrap();
    assert_eq!(pulled, 3);
    parse.seal_input().unwrap();

    assert!(parse.completion().unwrap().wait().await.is_success());
    assert!(write.completion().unwrap().wait().await.is_success());
    assert_eq!(sink.collected(), vec![1, 2, 3]);
}

#[tokio::test]
async fn parse_failure_stops_the_whole_pipeline() {
    let (parse, _) = parser();
    let (write, _) = writer();
    parse.link_to(&write).unwrap();

    parse
        .pull_from(["1", "oops"].map(String::from))
        .await
        .unwrap();

    // The parser fails with the genuine cause; the writer is stopped with
    // a propagated marker, never mistaken for a second root cause.
    let parse_outcome = parse.completion().unwrap().wait().await;
    let cause = parse_outcome.fault().unwrap();
    assert!(!cause.is_propagated());

    let write_outcome = write.completion().unwrap().wait().await;
    assert!(write_outcome.fault().unwrap().is_propagated());
}
