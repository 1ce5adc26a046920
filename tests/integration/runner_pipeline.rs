//! Runner scenarios driving the built-in dummy processor
//!
//! - timer ticks fanned out to several outputs
//! - several inputs drained into several outputs
//! - copies delivered to different outputs are independent
//! - a pending stop is honoured before queued inputs

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use metraflow::{ProcessorConfig, ProcessorRegistry, ProcessorRunner};
use pretty_assertions::assert_eq;

use crate::helpers::*;

#[tokio::test(start_paused = true)]
async fn test_timer_every_second_for_five_seconds() {
    let registry = ProcessorRegistry::with_builtins();
    let runner = ProcessorRunner::new(
        &registry,
        ProcessorConfig::new("ticker", "dummy").with_cron("@every 1s"),
    )
    .unwrap();

    let outputs: Vec<_> = ["output1", "output2", "output3"]
        .into_iter()
        .map(|name| conveyor(name, 10))
        .collect();
    for output in &outputs {
        runner.add_output(Arc::clone(output)).await.unwrap();
    }

    runner.start().await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;
    runner.stop().await.unwrap();

    for output in &outputs {
        let metrics = drain(output);
        assert_eq!(metrics.len(), 5, "conveyor {}", output.name());
        for metric in metrics {
            assert_eq!(metric.name, "dummy");
            assert_eq!(metric.tag("dummy"), Some("cron"));
        }
    }
}

#[tokio::test]
async fn test_two_inputs_drained_into_two_outputs() {
    let (runner, received) = counting_dummy_runner("relay");

    let input1 = conveyor("input1", 10);
    let input2 = conveyor("input2", 10);
    input1.put(metraflow::Metric::new("a")).unwrap();
    input2.put(metraflow::Metric::new("b")).unwrap();
    input2.put(metraflow::Metric::new("c")).unwrap();

    let output1 = conveyor("output1", 10);
    let output2 = conveyor("output2", 10);

    runner.add_input(Arc::clone(&input1)).await.unwrap();
    runner.add_input(Arc::clone(&input2)).await.unwrap();
    runner.add_output(Arc::clone(&output1)).await.unwrap();
    runner.add_output(Arc::clone(&output2)).await.unwrap();

    runner.start().await.unwrap();
    wait_until(|| received.load(Ordering::SeqCst) == 3).await;
    runner.stop().await.unwrap();

    assert_eq!(received.load(Ordering::SeqCst), 3);
    for output in [&output1, &output2] {
        let mut names: Vec<_> = drain(output).into_iter().map(|m| m.name).collect();
        names.sort();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}

#[tokio::test]
async fn test_single_input_keeps_fifo_order() {
    let (runner, received) = counting_dummy_runner("relay");
    let input = conveyor("input", 100);
    let output = conveyor("output", 100);
    for i in 0..50 {
        input.put(metraflow::Metric::new(format!("m{i:02}"))).unwrap();
    }
    runner.add_input(input).await.unwrap();
    runner.add_output(Arc::clone(&output)).await.unwrap();

    runner.start().await.unwrap();
    wait_until(|| received.load(Ordering::SeqCst) == 50).await;
    runner.stop().await.unwrap();

    let names: Vec<_> = drain(&output).into_iter().map(|m| m.name).collect();
    let expected: Vec<_> = (0..50).map(|i| format!("m{i:02}")).collect();
    assert_eq!(names, expected);
}

#[tokio::test]
async fn test_fan_out_copies_are_independent() {
    let (runner, received) = counting_dummy_runner("relay");
    let input = conveyor("input", 1);
    let left = conveyor("left", 1);
    let right = conveyor("right", 1);
    runner.add_input(Arc::clone(&input)).await.unwrap();
    runner.add_output(Arc::clone(&left)).await.unwrap();
    runner.add_output(Arc::clone(&right)).await.unwrap();

    runner.start().await.unwrap();
    input
        .put(metraflow::Metric::new("shared").with_field("value", 1i64))
        .unwrap();
    wait_until(|| received.load(Ordering::SeqCst) == 1).await;
    runner.stop().await.unwrap();

    let mut from_left = left.try_recv().unwrap();
    from_left.set_tag("dummy", "mutated");
    from_left.set_field("value", 2i64);

    let from_right = right.try_recv().unwrap();
    assert_eq!(from_right.tag("dummy"), Some("received"));
    assert_eq!(from_right.field("value"), Some(&1i64.into()));
}

#[tokio::test]
async fn test_stop_wins_over_queued_inputs() {
    let processor = Gated::new();
    let received = Arc::clone(&processor.received);
    let entered = Arc::clone(&processor.entered);
    let permits = Arc::clone(&processor.permits);
    let runner = Arc::new(ProcessorRunner::with_processor(
        ProcessorConfig::new("gated", "gated"),
        None,
        Box::new(processor),
    ));

    let input = conveyor("input", 10);
    for name in ["first", "second", "third"] {
        input.put(metraflow::Metric::new(name)).unwrap();
    }
    runner.add_input(Arc::clone(&input)).await.unwrap();
    runner.start().await.unwrap();

    // the handler is now blocked on the first metric
    entered.notified().await;

    let stopping = {
        let runner = Arc::clone(&runner);
        tokio::spawn(async move { runner.stop().await })
    };
    // give stop time to cancel the loop while the handler is still blocked
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!stopping.is_finished());

    // enough permits that a wrongly handled metric would not hang the test
    permits.add_permits(10);
    stopping.await.unwrap().unwrap();

    assert!(!runner.is_started().await);
    assert_eq!(received.load(Ordering::SeqCst), 1);
    let left: Vec<_> = drain(&input).into_iter().map(|m| m.name).collect();
    assert_eq!(left, vec!["second", "third"]);
}
