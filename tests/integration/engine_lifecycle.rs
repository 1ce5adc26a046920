//! Engine scenarios loading pipelines from a config file
//!
//! - metrics flow from a timer-driven source through a transformer to a sink
//! - reload picks up a rewritten file
//! - bad configuration surfaces as an error and leaves no topology behind

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use assert_matches::assert_matches;
use metraflow::error::{ConfigError, EngineError, TopologyError};
use metraflow::{Engine, FileConfigSource, PipelineConfig, ProcessorRegistry};
use serde_json::json;
use tempfile::NamedTempFile;

use crate::helpers::*;

fn write_config(path: &Path, config: serde_json::Value) {
    let mut file = std::fs::File::create(path).unwrap();
    write!(file, "{config}").unwrap();
}

fn tagged_pipeline(version: &str) -> serde_json::Value {
    json!({
        "processors": [
            { "name": "source", "type": "dummy", "cronSpec": "@every 1s" },
            { "name": "tag", "type": "tagger", "params": { "tags": { "version": version } } },
            { "name": "sink", "type": "capture" }
        ],
        "conveyors": [
            { "name": "source2tag", "size": 10, "input": "source", "output": "tag" },
            { "name": "tag2sink", "size": 10, "input": "tag", "output": "sink" }
        ]
    })
}

#[tokio::test(start_paused = true)]
async fn test_metrics_flow_through_pipeline() {
    let file = NamedTempFile::new().unwrap();
    write_config(file.path(), tagged_pipeline("1"));
    let (registry, captured) = registry_with_capture();
    let (mut engine, handle) = Engine::new(registry, FileConfigSource::new(file.path()));

    let task = tokio::spawn(async move {
        let result = engine.run().await;
        (engine, result)
    });

    tokio::time::sleep(Duration::from_secs(3)).await;
    handle.shutdown().await.unwrap();
    let (engine, result) = task.await.unwrap();

    result.unwrap();
    assert!(engine.is_idle());

    let metrics = captured.lock().unwrap();
    assert_eq!(metrics.len(), 3);
    for metric in metrics.iter() {
        assert_eq!(metric.name, "dummy");
        assert_eq!(metric.tag("dummy"), Some("received"));
        assert_eq!(metric.tag("version"), Some("1"));
    }
}

#[tokio::test(start_paused = true)]
async fn test_reload_picks_up_changed_file() {
    let file = NamedTempFile::new().unwrap();
    write_config(file.path(), tagged_pipeline("1"));
    let (registry, captured) = registry_with_capture();
    let (mut engine, handle) = Engine::new(registry, FileConfigSource::new(file.path()));

    let task = tokio::spawn(async move {
        let result = engine.run().await;
        (engine, result)
    });

    wait_until(|| !captured.lock().unwrap().is_empty()).await;

    write_config(file.path(), tagged_pipeline("2"));
    handle.reload().await.unwrap();

    wait_until(|| {
        captured
            .lock()
            .unwrap()
            .iter()
            .any(|metric| metric.tag("version") == Some("2"))
    })
    .await;

    handle.shutdown().await.unwrap();
    let (engine, result) = task.await.unwrap();
    result.unwrap();
    assert!(engine.is_idle());
}

#[tokio::test]
async fn test_unreadable_file_fails_to_load() {
    let file = NamedTempFile::new().unwrap();
    std::fs::write(file.path(), "{ not json").unwrap();
    let (registry, _captured) = registry_with_capture();
    let (mut engine, _handle) = Engine::new(registry, FileConfigSource::new(file.path()));

    let result = engine.run().await;

    assert_matches!(result, Err(EngineError::Load(ConfigError::Parse { .. })));
    assert!(engine.is_idle());
}

#[tokio::test]
async fn test_unknown_endpoint_leaves_no_topology() {
    let config: PipelineConfig = serde_json::from_value(json!({
        "processors": [
            { "name": "source", "type": "dummy", "cronSpec": "@every 1s" }
        ],
        "conveyors": [
            { "name": "source2sink", "size": 10, "input": "source", "output": "sink" }
        ]
    }))
    .unwrap();
    let (mut engine, _handle) = Engine::new(ProcessorRegistry::with_builtins(), config);

    let result = engine.run().await;

    assert_matches!(
        result,
        Err(EngineError::Topology(TopologyError::UnknownProcessor { processor, .. })) if processor == "sink"
    );
    assert!(engine.is_idle());
    assert!(engine.runner_names().is_empty());
    assert!(engine.conveyor_names().is_empty());
}

#[tokio::test]
async fn test_bootstrap_exposes_wired_topology() {
    let config: PipelineConfig = serde_json::from_value(tagged_pipeline("1")).unwrap();
    let (registry, _captured) = registry_with_capture();
    let (mut engine, _handle) = Engine::new(registry, PipelineConfig::default());

    engine.bootstrap(config).await.unwrap();

    assert_eq!(engine.runner_names(), vec!["sink", "source", "tag"]);
    assert_eq!(engine.conveyor_names(), vec!["source2tag", "tag2sink"]);
    let tag = engine.runner("tag").unwrap();
    assert_eq!(tag.input_names().await, vec!["source2tag"]);
    assert_eq!(tag.output_names().await, vec!["tag2sink"]);

    engine.teardown().await.unwrap();
    assert!(engine.is_idle());
}
