//! Adding and removing conveyors on a started runner

use std::sync::Arc;
use std::sync::atomic::Ordering;

use assert_matches::assert_matches;
use metraflow::Metric;
use metraflow::error::RunnerError;

use crate::helpers::*;

#[tokio::test]
async fn test_add_input_while_started_delivers_pending_metric() {
    let (runner, received) = counting_dummy_runner("relay");
    let output = conveyor("output", 10);
    runner.add_output(Arc::clone(&output)).await.unwrap();
    runner.start().await.unwrap();

    let late = conveyor("late", 10);
    late.put(Metric::new("pending")).unwrap();
    runner.add_input(late).await.unwrap();

    assert!(runner.is_started().await);
    wait_until(|| received.load(Ordering::SeqCst) == 1).await;
    runner.stop().await.unwrap();

    let metrics = drain(&output);
    assert_eq!(metrics.len(), 1);
    assert_eq!(metrics[0].name, "pending");
    assert_eq!(metrics[0].tag("dummy"), Some("received"));
}

#[tokio::test]
async fn test_removed_input_is_no_longer_read() {
    let (runner, received) = counting_dummy_runner("relay");
    let kept = conveyor("kept", 10);
    let removed = conveyor("removed", 10);
    runner.add_input(Arc::clone(&kept)).await.unwrap();
    runner.add_input(Arc::clone(&removed)).await.unwrap();
    runner.start().await.unwrap();

    runner.remove_input("removed").await.unwrap();
    removed.put(Metric::new("ignored")).unwrap();
    kept.put(Metric::new("read")).unwrap();

    wait_until(|| received.load(Ordering::SeqCst) == 1).await;
    runner.stop().await.unwrap();

    assert_eq!(received.load(Ordering::SeqCst), 1);
    assert_eq!(removed.try_recv().unwrap().name, "ignored");
}

#[tokio::test]
async fn test_added_output_receives_after_restart() {
    let (runner, received) = counting_dummy_runner("relay");
    let input = conveyor("input", 10);
    let first = conveyor("first", 10);
    runner.add_input(Arc::clone(&input)).await.unwrap();
    runner.add_output(Arc::clone(&first)).await.unwrap();
    runner.start().await.unwrap();

    input.put(Metric::new("before")).unwrap();
    wait_until(|| received.load(Ordering::SeqCst) == 1).await;

    let second = conveyor("second", 10);
    runner.add_output(Arc::clone(&second)).await.unwrap();
    input.put(Metric::new("after")).unwrap();
    wait_until(|| received.load(Ordering::SeqCst) == 2).await;

    runner.remove_output("first").await.unwrap();
    input.put(Metric::new("last")).unwrap();
    wait_until(|| received.load(Ordering::SeqCst) == 3).await;
    runner.stop().await.unwrap();

    let first_names: Vec<_> = drain(&first).into_iter().map(|m| m.name).collect();
    let second_names: Vec<_> = drain(&second).into_iter().map(|m| m.name).collect();
    assert_eq!(first_names, vec!["before", "after"]);
    assert_eq!(second_names, vec!["after", "last"]);
}

#[tokio::test]
async fn test_concurrent_mutations_are_serialized() {
    let (runner, _received) = counting_dummy_runner("relay");
    let runner = Arc::new(runner);
    runner.start().await.unwrap();

    let mut tasks = vec![];
    for i in 0..16 {
        let runner = Arc::clone(&runner);
        tasks.push(tokio::spawn(async move {
            runner.add_input(conveyor(&format!("input{i}"), 1)).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert!(runner.is_started().await);
    assert_eq!(runner.input_names().await.len(), 16);

    assert_matches!(
        runner.add_input(conveyor("input0", 1)).await,
        Err(RunnerError::Duplicate { .. })
    );
    assert_matches!(
        runner.remove_output("missing").await,
        Err(RunnerError::NotFound { .. })
    );
    assert!(runner.is_started().await);

    runner.stop().await.unwrap();
}
