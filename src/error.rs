//! Error types for the pipeline
//!
//! Steady-state failures (`ConveyorError`, handler errors) are contained by
//! the runner and logged. Bootstrap failures (`ConfigError`,
//! `ValidationError`, `TopologyError`) abort a (re)load and surface through
//! `EngineError`.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Errors produced when editing a metric
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetricError {
    #[error("tag \"{0}\" already exists")]
    DuplicateTag(String),

    #[error("field \"{0}\" already exists")]
    DuplicateField(String),
}

/// Errors produced by a conveyor
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConveyorError {
    /// Capacity exhausted, the metric was not enqueued
    #[error("conveyor \"{0}\" is full")]
    Full(String),

    /// The conveyor was disposed, no further puts are accepted
    #[error("conveyor \"{0}\" is disposed")]
    Disposed(String),

    #[error("conveyor \"{name}\" must have a positive capacity, got {capacity}")]
    InvalidCapacity { name: String, capacity: usize },
}

/// Which side of a runner a conveyor is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => write!(f, "input"),
            Direction::Output => write!(f, "output"),
        }
    }
}

/// Errors produced by a processor runner's control operations
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("processor \"{0}\" already started")]
    AlreadyStarted(String),

    #[error("processor \"{0}\" not started")]
    NotStarted(String),

    #[error("{direction} conveyor \"{conveyor}\" already exists on processor \"{processor}\"")]
    Duplicate {
        processor: String,
        direction: Direction,
        conveyor: String,
    },

    #[error("{direction} conveyor \"{conveyor}\" not found on processor \"{processor}\"")]
    NotFound {
        processor: String,
        direction: Direction,
        conveyor: String,
    },

    /// The processor's setup hook failed, the runner stays stopped
    #[error("processor \"{processor}\" failed to set up: {source:#}")]
    Setup {
        processor: String,
        #[source]
        source: anyhow::Error,
    },

    /// The control loop task panicked; the runner is marked stopped
    #[error("control loop of processor \"{0}\" panicked")]
    LoopPanicked(String),
}

/// Errors loading a configuration document
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A configuration element that failed validation
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("processor #{index}: name is required")]
    BlankProcessorName { index: usize },

    #[error("processor \"{processor}\": type is required")]
    BlankType { processor: String },

    #[error("processor \"{processor}\": unknown type \"{kind}\"")]
    UnknownType { processor: String, kind: String },

    #[error("processor \"{processor}\": invalid cron spec: {source}")]
    InvalidCron {
        processor: String,
        #[source]
        source: ScheduleError,
    },

    #[error("processor \"{processor}\": invalid params: {source:#}")]
    InvalidParams {
        processor: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("processor \"{0}\" is defined more than once")]
    DuplicateProcessor(String),

    #[error("conveyor #{index}: name is required")]
    BlankConveyorName { index: usize },

    #[error("conveyor \"{conveyor}\": size must be a positive number")]
    ZeroSize { conveyor: String },

    #[error("conveyor \"{conveyor}\": {side} is required")]
    BlankEndpoint {
        conveyor: String,
        side: &'static str,
    },

    #[error("conveyor \"{0}\" is defined more than once")]
    DuplicateConveyor(String),
}

/// A schedule expression that could not be parsed
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid duration in \"{spec}\": {source}")]
    Duration {
        spec: String,
        #[source]
        source: humantime::DurationError,
    },

    #[error("interval in \"{0}\" must be greater than zero")]
    ZeroInterval(String),

    #[error("invalid cron expression \"{spec}\": {source}")]
    Cron {
        spec: String,
        #[source]
        source: cron::error::Error,
    },
}

/// Failures while building the runner/conveyor graph
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("unknown processor type \"{kind}\", available: [{available}]")]
    UnknownType { kind: String, available: String },

    #[error("failed to construct processor \"{processor}\": {source:#}")]
    Construction {
        processor: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("processor \"{0}\" is already part of the topology")]
    DuplicateProcessor(String),

    #[error("conveyor \"{0}\" is already part of the topology")]
    DuplicateConveyor(String),

    #[error("conveyor \"{conveyor}\" references unknown processor \"{processor}\"")]
    UnknownProcessor { conveyor: String, processor: String },

    #[error(transparent)]
    Conveyor(#[from] ConveyorError),

    #[error(transparent)]
    Wiring(#[from] RunnerError),
}

/// One step of a teardown that did not succeed
#[derive(Debug)]
pub enum TeardownFailure {
    /// Stopping a runner failed
    Stop(RunnerError),

    /// Detaching a conveyor from a runner failed
    Detach(RunnerError),

    /// A conveyor recorded an endpoint that is not in the runner map
    MissingProcessor { conveyor: String, processor: String },
}

impl fmt::Display for TeardownFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TeardownFailure::Stop(err) => write!(f, "stop: {err}"),
            TeardownFailure::Detach(err) => write!(f, "detach: {err}"),
            TeardownFailure::MissingProcessor {
                conveyor,
                processor,
            } => write!(
                f,
                "conveyor \"{conveyor}\" is attached to processor \"{processor}\" which is not registered"
            ),
        }
    }
}

/// Errors surfaced by the engine's run loop
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("invalid configuration: {0}")]
    Validation(#[from] ValidationError),

    #[error("failed to build topology: {0}")]
    Topology(#[from] TopologyError),

    #[error("failed to start processor: {0}")]
    Start(#[source] RunnerError),

    #[error("teardown failed with {} error(s): {}", .0.len(), join_failures(.0))]
    Teardown(Vec<TeardownFailure>),
}

fn join_failures(failures: &[TeardownFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
