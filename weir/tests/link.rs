use flow0::test_utils::ManualBlock;
use flow0::{Fault, InputPort, OutputPort, PropagatedFault};
use std::sync::Arc;
use weir::{Container, ContainerConfig, GarbageRecorder};
use weir_block_memory::{SinkBlock, StageBlock};

fn config() -> ContainerConfig {
    ContainerConfig::default()
}

/// Identity container around a single stage, exposing both ports.
fn passthrough(name: &str) -> (Container<u32, u32>, Arc<StageBlock<u32, u32>>) {
    let stage = StageBlock::new(format!("{name}-stage"), |n: u32| Ok(Some(n)));
    let container =
        Container::pipeline_named(name, config(), stage.clone(), stage.clone());
    container.register(stage.clone()).unwrap();
    (container, stage)
}

/// Collector container around a single sink.
fn collector(name: &str) -> (Container<u32, ()>, Arc<SinkBlock<u32>>) {
    let sink = SinkBlock::<u32>::new(format!("{name}-sink"));
    let container: Container<u32, ()> = Container::sink(name, config(), sink.clone());
    container.register(sink.clone()).unwrap();
    (container, sink)
}

// --- LinkTo protocol ---

#[tokio::test]
async fn clean_source_completion_flows_to_target() {
    let (a, _) = passthrough("a");
    let (b, sink) = collector("b");
    a.link_to(&b).unwrap();

    a.pull_from(1..=3u32).await.unwrap();
    a.seal_input().unwrap();

    assert!(a.completion().unwrap().wait().await.is_success());
    // Rule A signals normal completion, not a fault.
    assert!(b.completion().unwrap().wait().await.is_success());
    assert_eq!(sink.collected(), vec![1, 2, 3]);
}

#[tokio::test]
async fn source_failure_faults_target() {
    let stage = StageBlock::new("a-stage", |n: u32| {
        if n == 2 {
            Err("boom".into())
        } else {
            Ok(Some(n))
        }
    });
    let a = Container::pipeline_named("a", config(), stage.clone(), stage.clone());
    a.register(stage.clone()).unwrap();
    let (b, _) = collector("b");
    a.link_to(&b).unwrap();

    a.pull_from([1, 2]).await.unwrap();

    let a_outcome = a.completion().unwrap().wait().await;
    assert_eq!(a_outcome.fault().unwrap().to_string(), "boom");

    let b_outcome = b.completion().unwrap().wait().await;
    assert!(matches!(
        b_outcome.fault().unwrap(),
        Fault::Propagated(PropagatedFault::LinkedContainerFailed)
    ));
}

#[tokio::test]
async fn target_failure_faults_source() {
    let (a, _) = passthrough("a");
    let sink = SinkBlock::with_handler("b-sink", |_: &u32| Err("sink-broke".into()));
    let b: Container<u32, ()> = Container::sink("b", config(), sink.clone());
    b.register(sink.clone()).unwrap();
    a.link_to(&b).unwrap();

    // Feed one item; leave the source running so Rule B has something to
    // stop.
    a.pull_from([1]).await.unwrap();

    let b_outcome = b.completion().unwrap().wait().await;
    assert_eq!(b_outcome.fault().unwrap().to_string(), "sink-broke");

    let a_outcome = a.completion().unwrap().wait().await;
    assert!(matches!(
        a_outcome.fault().unwrap(),
        Fault::Propagated(PropagatedFault::LinkedContainerFailed)
    ));
}

#[tokio::test]
async fn completed_source_is_not_refaulted() {
    let (a, _) = passthrough("a");

    // The target holds the collector plus a hand-driven block, so it can
    // fail after the source already finished.
    let sink = SinkBlock::<u32>::new("b-sink");
    let b: Container<u32, ()> = Container::sink("b", config(), sink.clone());
    b.register(sink.clone()).unwrap();
    let late = ManualBlock::new("late");
    b.register(late.clone()).unwrap();
    a.link_to(&b).unwrap();

    a.pull_from([1]).await.unwrap();
    a.seal_input().unwrap();
    assert!(a.completion().unwrap().wait().await.is_success());

    late.fail("late-failure");
    let b_outcome = b.completion().unwrap().wait().await;
    assert_eq!(b_outcome.fault().unwrap().to_string(), "late-failure");

    // Rule B checked the source first: already terminal, never re-faulted.
    assert!(a.completion().unwrap().wait().await.is_success());
}

#[tokio::test]
async fn link_from_feeds_an_external_block() {
    let external = StageBlock::new("external", |n: u32| Ok(Some(n)));
    let (b, sink) = collector("b");
    let output: Arc<dyn OutputPort<u32>> = external.clone();
    b.link_from(&output).unwrap();

    external.push(7).await.unwrap();
    external.push(8).await.unwrap();
    external.complete();

    assert!(b.completion().unwrap().wait().await.is_success());
    assert_eq!(sink.collected(), vec![7, 8]);
}

// --- Transforming links ---

#[tokio::test]
async fn transform_and_link_converts_matching_items_only() {
    let (a, _) = passthrough("a");
    let sink = SinkBlock::<String>::new("b-sink");
    let b: Container<String, ()> = Container::sink("b", config(), sink.clone());
    b.register(sink.clone()).unwrap();

    a.transform_and_link(&b, |n| format!("#{n}"), |n| n % 2 == 0)
        .unwrap();

    a.pull_from(1..=4u32).await.unwrap();
    a.seal_input().unwrap();

    assert!(a.completion().unwrap().wait().await.is_success());
    assert!(b.completion().unwrap().wait().await.is_success());
    assert_eq!(sink.collected(), vec!["#2".to_string(), "#4".to_string()]);
}

#[tokio::test]
async fn transform_and_link_all_converts_everything() {
    let (a, _) = passthrough("a");
    let sink = SinkBlock::<String>::new("b-sink");
    let b: Container<String, ()> = Container::sink("b", config(), sink.clone());
    b.register(sink.clone()).unwrap();

    a.transform_and_link_all(&b, |n| format!("{n}!")).unwrap();

    a.pull_from([1, 2]).await.unwrap();
    a.seal_input().unwrap();

    assert!(a.completion().unwrap().wait().await.is_success());
    assert!(b.completion().unwrap().wait().await.is_success());
    assert_eq!(sink.collected(), vec!["1!".to_string(), "2!".to_string()]);
}

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Num(u32),
    Text(String),
}

#[tokio::test]
async fn link_case_routes_variants() {
    let stage = StageBlock::new("events", |e: Event| Ok(Some(e)));
    let a = Container::pipeline_named("a", config(), stage.clone(), stage.clone());
    a.register(stage.clone()).unwrap();

    let (nums, num_sink) = collector("nums");
    let text_sink = SinkBlock::<String>::new("texts-sink");
    let texts: Container<String, ()> =
        Container::sink("texts", config(), text_sink.clone());
    texts.register(text_sink.clone()).unwrap();

    a.link_case(&nums, |e: &Event| match e {
        Event::Num(n) => Some(*n),
        _ => None,
    })
    .unwrap();
    a.link_case(&texts, |e: &Event| match e {
        Event::Text(s) => Some(s.clone()),
        _ => None,
    })
    .unwrap();

    a.pull_from([
        Event::Num(1),
        Event::Text("hi".into()),
        Event::Num(2),
    ])
    .await
    .unwrap();
    a.seal_input().unwrap();

    assert!(a.completion().unwrap().wait().await.is_success());
    assert!(nums.completion().unwrap().wait().await.is_success());
    assert!(texts.completion().unwrap().wait().await.is_success());
    assert_eq!(num_sink.collected(), vec![1, 2]);
    assert_eq!(text_sink.collected(), vec!["hi".to_string()]);
}

// --- Discard sink ---

#[derive(Debug, Clone)]
struct Unrouted(u32);

#[tokio::test]
async fn link_left_to_null_counts_unmatched_items() {
    let stage = StageBlock::new("u-stage", |u: Unrouted| Ok(Some(u)));
    let a = Container::pipeline_named("a", config(), stage.clone(), stage.clone());
    a.register(stage.clone()).unwrap();

    let sink = SinkBlock::<u32>::new("routed-sink");
    let routed: Container<u32, ()> = Container::sink("routed", config(), sink.clone());
    routed.register(sink.clone()).unwrap();

    a.transform_and_link(&routed, |u| u.0, |u| u.0 < 10).unwrap();
    a.link_left_to_null().unwrap();

    let key = std::any::type_name::<Unrouted>();
    let before = GarbageRecorder::global().count(key);

    a.pull_from([Unrouted(5), Unrouted(50), Unrouted(60)])
        .await
        .unwrap();
    a.seal_input().unwrap();

    assert!(a.completion().unwrap().wait().await.is_success());
    assert!(routed.completion().unwrap().wait().await.is_success());

    // The two unmatched items were discarded and counted; the matched one
    // went to its stage untouched.
    assert_eq!(GarbageRecorder::global().count(key), before + 2);
    assert_eq!(sink.collected(), vec![5]);
}
