//! Engine - owns the pipeline topology and its lifecycle
//!
//! ## Lifecycle
//!
//! ```text
//!        ┌──────────────────────── Reload ───────────────────────┐
//!        v                                                       │
//! load ─> validate ─> bootstrap ─> wait for signal ─> teardown ──┤
//!                                                                 └── Shutdown ─> exit
//! ```
//!
//! A reload is a full teardown and rebuild, never an incremental diff.
//! Between two iterations the engine holds no runners and no conveyors.
//!
//! Signals are delivered through an [`EngineHandle`]; where they originate
//! (OS signals, an admin command, a test) is up to the caller.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{ConfigSource, PipelineConfig};
use crate::conveyor::Conveyor;
use crate::error::{EngineError, TeardownFailure, TopologyError};
use crate::processor::{ProcessorRegistry, ProcessorRunner};

const SIGNAL_BUFFER: usize = 8;

/// External triggers consumed by [`Engine::run`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineSignal {
    /// Tear the topology down and return
    Shutdown,

    /// Tear the topology down and rebuild it from a fresh configuration load
    Reload,
}

/// A conveyor together with the runners it was attached to
#[derive(Debug)]
struct ConveyorEntry {
    conveyor: Arc<Conveyor>,

    /// Runner writing into the conveyor, once attached
    producer: Option<String>,

    /// Runner reading from the conveyor, once attached
    consumer: Option<String>,
}

pub struct Engine {
    registry: ProcessorRegistry,
    source: Box<dyn ConfigSource>,
    signals: mpsc::Receiver<EngineSignal>,
    runners: HashMap<String, Arc<ProcessorRunner>>,
    conveyors: HashMap<String, ConveyorEntry>,
    config: Option<PipelineConfig>,
}

impl Engine {
    /// Create an idle engine and the handle used to signal it
    pub fn new<S>(registry: ProcessorRegistry, source: S) -> (Self, EngineHandle)
    where
        S: ConfigSource + 'static,
    {
        let (sender, signals) = mpsc::channel(SIGNAL_BUFFER);

        let engine = Self {
            registry,
            source: Box::new(source),
            signals,
            runners: HashMap::new(),
            conveyors: HashMap::new(),
            config: None,
        };

        (engine, EngineHandle { sender })
    }

    pub fn registry(&self) -> &ProcessorRegistry {
        &self.registry
    }

    /// Configuration of the running topology, if any
    pub fn config(&self) -> Option<&PipelineConfig> {
        self.config.as_ref()
    }

    pub fn runner(&self, name: &str) -> Option<&Arc<ProcessorRunner>> {
        self.runners.get(name)
    }

    pub fn conveyor(&self, name: &str) -> Option<&Arc<Conveyor>> {
        self.conveyors.get(name).map(|entry| &entry.conveyor)
    }

    pub fn runner_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.runners.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn conveyor_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.conveyors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Whether no topology is currently built
    pub fn is_idle(&self) -> bool {
        self.runners.is_empty() && self.conveyors.is_empty()
    }

    /// Run load, validate, bootstrap and teardown until a shutdown signal
    ///
    /// Returns the first load, validation or bootstrap error, or the
    /// aggregated teardown failures. A dropped [`EngineHandle`] counts as
    /// a shutdown.
    pub async fn run(&mut self) -> Result<(), EngineError> {
        info!("starting engine");

        loop {
            let config = self.source.load()?;
            config.validate(&self.registry)?;
            self.bootstrap(config).await?;

            info!(
                processors = self.runners.len(),
                conveyors = self.conveyors.len(),
                "pipeline running"
            );

            let signal = self.signals.recv().await.unwrap_or_else(|| {
                debug!("all engine handles dropped");
                EngineSignal::Shutdown
            });

            match signal {
                EngineSignal::Shutdown => info!("got shutdown signal, exiting gracefully"),
                EngineSignal::Reload => info!("got reload signal, reloading"),
            }

            self.teardown().await?;

            if signal == EngineSignal::Shutdown {
                break;
            }
        }

        info!("engine stopped");
        Ok(())
    }

    /// Build and start the topology described by `config`
    ///
    /// On failure everything built so far is torn down before the error is
    /// returned, leaving the engine idle.
    #[instrument(skip_all)]
    pub async fn bootstrap(&mut self, config: PipelineConfig) -> Result<(), EngineError> {
        if !self.is_idle() {
            warn!("bootstrapping over an existing topology, tearing it down first");
            self.teardown().await?;
        }

        debug!("bootstrapping");
        if let Err(e) = self.build(&config).await {
            error!("bootstrap failed: {e}");
            if let Err(teardown) = self.teardown().await {
                error!("rollback after failed bootstrap: {teardown}");
            }
            return Err(e);
        }

        self.config = Some(config);
        Ok(())
    }

    async fn build(&mut self, config: &PipelineConfig) -> Result<(), EngineError> {
        for processor in &config.processors {
            if self.runners.contains_key(&processor.name) {
                return Err(TopologyError::DuplicateProcessor(processor.name.clone()).into());
            }
            let runner = ProcessorRunner::new(&self.registry, processor.clone())?;
            self.runners
                .insert(processor.name.clone(), Arc::new(runner));
        }

        for conveyor_config in &config.conveyors {
            if self.conveyors.contains_key(&conveyor_config.name) {
                return Err(TopologyError::DuplicateConveyor(conveyor_config.name.clone()).into());
            }
            let producer = self.endpoint(&conveyor_config.name, &conveyor_config.input)?;
            let consumer = self.endpoint(&conveyor_config.name, &conveyor_config.output)?;

            let conveyor = Arc::new(
                Conveyor::new(&conveyor_config.name, conveyor_config.size)
                    .map_err(TopologyError::from)?,
            );
            self.conveyors.insert(
                conveyor_config.name.clone(),
                ConveyorEntry {
                    conveyor: Arc::clone(&conveyor),
                    producer: None,
                    consumer: None,
                },
            );

            producer
                .add_output(Arc::clone(&conveyor))
                .await
                .map_err(TopologyError::from)?;
            self.record_endpoint(&conveyor_config.name, |entry| {
                entry.producer = Some(conveyor_config.input.clone());
            });

            consumer
                .add_input(conveyor)
                .await
                .map_err(TopologyError::from)?;
            self.record_endpoint(&conveyor_config.name, |entry| {
                entry.consumer = Some(conveyor_config.output.clone());
            });

            debug!(
                conveyor = %conveyor_config.name,
                "wired {} -> {}",
                conveyor_config.input,
                conveyor_config.output
            );
        }

        for processor in &config.processors {
            if let Some(runner) = self.runners.get(&processor.name) {
                runner.start().await.map_err(EngineError::Start)?;
            }
        }

        Ok(())
    }

    fn endpoint(&self, conveyor: &str, processor: &str) -> Result<Arc<ProcessorRunner>, TopologyError> {
        self.runners
            .get(processor)
            .cloned()
            .ok_or_else(|| TopologyError::UnknownProcessor {
                conveyor: conveyor.to_string(),
                processor: processor.to_string(),
            })
    }

    fn record_endpoint(&mut self, conveyor: &str, update: impl FnOnce(&mut ConveyorEntry)) {
        if let Some(entry) = self.conveyors.get_mut(conveyor) {
            update(entry);
        }
    }

    /// Stop every runner, detach and dispose every conveyor, then forget them
    ///
    /// Individual failures do not abort the teardown; they are collected and
    /// returned together once everything has been attempted.
    #[instrument(skip_all)]
    pub async fn teardown(&mut self) -> Result<(), EngineError> {
        debug!("tearing down");
        let mut failures = vec![];

        for runner in self.runners.values() {
            if !runner.is_started().await {
                continue;
            }
            if let Err(e) = runner.stop().await {
                error!("failed to stop processor \"{}\": {e}", runner.name());
                failures.push(TeardownFailure::Stop(e));
            }
        }

        for (name, entry) in self.conveyors.drain() {
            if let Some(producer) = &entry.producer {
                match self.runners.get(producer) {
                    Some(runner) => {
                        if let Err(e) = runner.remove_output(&name).await {
                            failures.push(TeardownFailure::Detach(e));
                        }
                    }
                    None => failures.push(TeardownFailure::MissingProcessor {
                        conveyor: name.clone(),
                        processor: producer.clone(),
                    }),
                }
            }

            if let Some(consumer) = &entry.consumer {
                match self.runners.get(consumer) {
                    Some(runner) => {
                        if let Err(e) = runner.remove_input(&name).await {
                            failures.push(TeardownFailure::Detach(e));
                        }
                    }
                    None => failures.push(TeardownFailure::MissingProcessor {
                        conveyor: name.clone(),
                        processor: consumer.clone(),
                    }),
                }
            }

            entry.conveyor.dispose();
        }

        self.runners.clear();
        self.config = None;

        if failures.is_empty() {
            debug!("teardown complete");
            Ok(())
        } else {
            Err(EngineError::Teardown(failures))
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("runners", &self.runner_names())
            .field("conveyors", &self.conveyor_names())
            .finish_non_exhaustive()
    }
}

/// Handle for signalling a running [`Engine`]
///
/// Cheap to clone; every clone feeds the same engine.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    sender: mpsc::Sender<EngineSignal>,
}

impl EngineHandle {
    pub async fn signal(&self, signal: EngineSignal) -> Result<()> {
        self.sender
            .send(signal)
            .await
            .with_context(|| format!("failed to send {signal:?} signal, engine is gone"))
    }

    /// Rebuild the topology from a fresh configuration load
    pub async fn reload(&self) -> Result<()> {
        self.signal(EngineSignal::Reload).await
    }

    /// Tear the topology down and make [`Engine::run`] return
    pub async fn shutdown(&self) -> Result<()> {
        self.signal(EngineSignal::Shutdown).await
    }
}
