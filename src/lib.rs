//! Metrics pipeline agent
//!
//! Processors (collectors, transformers, sinks) are wired together through
//! bounded [`Conveyor`]s. Each processor is driven by its own
//! [`ProcessorRunner`]; the [`Engine`] builds the whole topology from a
//! [`PipelineConfig`], tears it down and rebuilds it on reload.
//!
//! ```text
//! [system] ──cpu2tag──> [tagger] ──tag2log──> [log]
//! ```

pub mod config;
pub mod conveyor;
pub mod engine;
pub mod error;
pub mod metric;
pub mod processor;
pub mod processors;
pub mod schedule;
pub mod util;

pub use config::{ConfigSource, ConveyorConfig, FileConfigSource, PipelineConfig, ProcessorConfig};
pub use conveyor::Conveyor;
pub use engine::{Engine, EngineHandle, EngineSignal};
pub use metric::{Field, FieldValue, Metric, Tag};
pub use processor::{Processor, ProcessorFactory, ProcessorRegistry, ProcessorRunner};
pub use schedule::Schedule;
