//! Processors and the machinery that runs them
//!
//! A processor is a pluggable unit of metric production or transformation.
//! It never touches conveyors directly: its [`ProcessorRunner`] feeds it
//! inbound metrics and timer ticks and fans its output out to every
//! connected conveyor.
//!
//! ## Message Flow
//!
//! ```text
//! input conveyors ──┐
//! timer tick ───────┼─> control loop ─> on_receive / on_timer ─> clone per output ─> output conveyors
//! stop signal ──────┘
//! ```

pub mod registry;
pub mod runner;

use anyhow::Result;
use async_trait::async_trait;

use crate::metric::Metric;

pub use registry::{ProcessorFactory, ProcessorRegistry};
pub use runner::ProcessorRunner;

/// Behaviour every concrete processor implements
///
/// Handlers take `&mut self`: a processor instance is only ever driven by
/// its own runner's control loop, one event at a time.
#[async_trait]
pub trait Processor: Send {
    /// Called once on every start, before any event is delivered
    ///
    /// Typically used to establish connections or open files. A failure
    /// keeps the runner stopped.
    async fn setup(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called once on every stop, after the last event was handled
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// Handle one metric read from an input conveyor
    ///
    /// The returned metrics are sent to every output conveyor.
    async fn on_receive(&mut self, metric: Metric) -> Result<Vec<Metric>>;

    /// Handle a tick of the configured schedule
    ///
    /// The returned metrics are sent to every output conveyor.
    async fn on_timer(&mut self) -> Result<Vec<Metric>>;
}
