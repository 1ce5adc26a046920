//! ProcessorRunner - drives one processor's event loop
//!
//! Each started runner owns one spawned control loop. The loop waits on the
//! stop signal, the schedule's ticker and every input conveyor at once and
//! handles whichever becomes ready first.
//!
//! ## Live reconfiguration
//!
//! The loop works on a snapshot of the input/output sets taken when it
//! starts. Adding or removing a conveyor while started therefore stops the
//! loop, edits the sets and starts a new loop, all under the runner's lock.
//! Metrics still queued in a conveyor are unaffected by the restart and are
//! picked up by the next loop.
//!
//! ```text
//! add_input ──lock──> stop loop ──> edit inputs ──> start loop ──unlock──>
//! ```

use std::sync::Arc;

use futures::StreamExt;
use futures::stream::SelectAll;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, trace, warn};

use crate::config::ProcessorConfig;
use crate::conveyor::Conveyor;
use crate::error::{Direction, RunnerError, TopologyError, ValidationError};
use crate::metric::Metric;
use crate::schedule::{self, Schedule, Ticker};

use super::Processor;
use super::registry::ProcessorRegistry;

type SharedProcessor = Arc<Mutex<Box<dyn Processor>>>;

pub struct ProcessorRunner {
    config: ProcessorConfig,
    schedule: Option<Schedule>,
    processor: SharedProcessor,
    state: Mutex<RunnerState>,
}

#[derive(Default)]
struct RunnerState {
    inputs: Vec<Arc<Conveyor>>,
    outputs: Vec<Arc<Conveyor>>,
    running: Option<RunningLoop>,
}

struct RunningLoop {
    stop: CancellationToken,
    task: JoinHandle<()>,
}

impl RunnerState {
    fn set(&mut self, direction: Direction) -> &mut Vec<Arc<Conveyor>> {
        match direction {
            Direction::Input => &mut self.inputs,
            Direction::Output => &mut self.outputs,
        }
    }
}

impl ProcessorRunner {
    /// Construct the processor registered for `config.kind` and wrap it
    pub fn new(registry: &ProcessorRegistry, config: ProcessorConfig) -> Result<Self, TopologyError> {
        let processor = registry.create(&config)?;
        let schedule = Schedule::parse_optional(config.cron_spec.as_deref()).map_err(|source| {
            TopologyError::Construction {
                processor: config.name.clone(),
                source: ValidationError::InvalidCron {
                    processor: config.name.clone(),
                    source,
                }
                .into(),
            }
        })?;

        Ok(Self::with_processor(config, schedule, processor))
    }

    /// Wrap an already constructed processor
    pub fn with_processor(
        config: ProcessorConfig,
        schedule: Option<Schedule>,
        processor: Box<dyn Processor>,
    ) -> Self {
        Self {
            config,
            schedule,
            processor: Arc::new(Mutex::new(processor)),
            state: Mutex::new(RunnerState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub async fn is_started(&self) -> bool {
        self.state.lock().await.running.is_some()
    }

    pub async fn input_names(&self) -> Vec<String> {
        names(&self.state.lock().await.inputs)
    }

    pub async fn output_names(&self) -> Vec<String> {
        names(&self.state.lock().await.outputs)
    }

    pub async fn add_input(&self, input: Arc<Conveyor>) -> Result<(), RunnerError> {
        self.attach(Direction::Input, input).await
    }

    pub async fn remove_input(&self, name: &str) -> Result<(), RunnerError> {
        self.detach(Direction::Input, name).await
    }

    pub async fn add_output(&self, output: Arc<Conveyor>) -> Result<(), RunnerError> {
        self.attach(Direction::Output, output).await
    }

    pub async fn remove_output(&self, name: &str) -> Result<(), RunnerError> {
        self.detach(Direction::Output, name).await
    }

    /// Run setup, arm the timer and spawn the control loop
    pub async fn start(&self) -> Result<(), RunnerError> {
        let mut state = self.state.lock().await;
        self.start_locked(&mut state).await
    }

    /// Signal the control loop and wait until it has fully exited
    pub async fn stop(&self) -> Result<(), RunnerError> {
        let mut state = self.state.lock().await;
        self.stop_locked(&mut state).await
    }

    async fn attach(&self, direction: Direction, conveyor: Arc<Conveyor>) -> Result<(), RunnerError> {
        let mut state = self.state.lock().await;

        if state
            .set(direction)
            .iter()
            .any(|existing| existing.name() == conveyor.name())
        {
            return Err(RunnerError::Duplicate {
                processor: self.name().to_string(),
                direction,
                conveyor: conveyor.name().to_string(),
            });
        }

        debug!(processor = %self.name(), conveyor = %conveyor.name(), "attaching {direction} conveyor");
        self.mutate_locked(&mut state, |state| state.set(direction).push(conveyor))
            .await
    }

    async fn detach(&self, direction: Direction, name: &str) -> Result<(), RunnerError> {
        let mut state = self.state.lock().await;

        let Some(index) = state
            .set(direction)
            .iter()
            .position(|existing| existing.name() == name)
        else {
            return Err(RunnerError::NotFound {
                processor: self.name().to_string(),
                direction,
                conveyor: name.to_string(),
            });
        };

        debug!(processor = %self.name(), conveyor = %name, "detaching {direction} conveyor");
        self.mutate_locked(&mut state, |state| {
            state.set(direction).remove(index);
        })
        .await
    }

    /// Apply `edit` to the state, bouncing the control loop around it if it
    /// is running. The caller holds the lock for the whole sequence.
    async fn mutate_locked<F>(&self, state: &mut RunnerState, edit: F) -> Result<(), RunnerError>
    where
        F: FnOnce(&mut RunnerState),
    {
        let was_started = state.running.is_some();
        if was_started {
            self.stop_locked(state).await?;
        }

        edit(state);

        if was_started {
            self.start_locked(state).await?;
        }

        Ok(())
    }

    async fn start_locked(&self, state: &mut RunnerState) -> Result<(), RunnerError> {
        if state.running.is_some() {
            return Err(RunnerError::AlreadyStarted(self.name().to_string()));
        }

        self.processor
            .lock()
            .await
            .setup()
            .await
            .map_err(|source| RunnerError::Setup {
                processor: self.name().to_string(),
                source,
            })?;

        let stop = CancellationToken::new();
        let control = ControlLoop {
            name: self.name().to_string(),
            processor: Arc::clone(&self.processor),
            inputs: state.inputs.clone(),
            outputs: state.outputs.clone(),
            ticker: self.schedule.as_ref().map(Schedule::ticker),
            stop: stop.clone(),
        };

        let task = tokio::spawn(control.run());
        state.running = Some(RunningLoop { stop, task });

        debug!(processor = %self.name(), "processor started");
        Ok(())
    }

    async fn stop_locked(&self, state: &mut RunnerState) -> Result<(), RunnerError> {
        let Some(RunningLoop { stop, task }) = state.running.take() else {
            return Err(RunnerError::NotStarted(self.name().to_string()));
        };

        stop.cancel();
        if let Err(e) = task.await {
            error!(processor = %self.name(), "control loop terminated abnormally: {e}");
            return Err(RunnerError::LoopPanicked(self.name().to_string()));
        }

        debug!(processor = %self.name(), "processor stopped");
        Ok(())
    }
}

impl std::fmt::Debug for ProcessorRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorRunner")
            .field("name", &self.config.name)
            .field("type", &self.config.kind)
            .finish_non_exhaustive()
    }
}

fn names(conveyors: &[Arc<Conveyor>]) -> Vec<String> {
    conveyors
        .iter()
        .map(|conveyor| conveyor.name().to_string())
        .collect()
}

/// State moved into the spawned task of a started runner
struct ControlLoop {
    name: String,
    processor: SharedProcessor,
    inputs: Vec<Arc<Conveyor>>,
    outputs: Vec<Arc<Conveyor>>,
    ticker: Option<Ticker>,
    stop: CancellationToken,
}

impl ControlLoop {
    /// Run until the stop token is cancelled
    ///
    /// The stop branch is polled first, so once stop is requested no further
    /// tick or input is accepted. An in-flight handler always completes.
    #[instrument(skip(self), fields(processor = %self.name))]
    async fn run(self) {
        let ControlLoop {
            name,
            processor,
            inputs,
            outputs,
            mut ticker,
            stop,
        } = self;

        debug!(inputs = inputs.len(), outputs = outputs.len(), "starting control loop");

        // held for the loop's lifetime, released before the runner can restart
        let mut processor = processor.lock().await;

        let mut incoming: SelectAll<_> = inputs
            .into_iter()
            .map(|input| Box::pin(input.stream()))
            .collect();

        loop {
            tokio::select! {
                biased;

                _ = stop.cancelled() => {
                    debug!("received stop signal");
                    break;
                }

                _ = schedule::next_tick(&mut ticker) => {
                    trace!("timer fired");
                    match processor.on_timer().await {
                        Ok(metrics) => send(&name, &outputs, metrics),
                        Err(e) => error!("failed to process timer tick: {e:#}"),
                    }
                }

                Some((input, metric)) = incoming.next() => {
                    trace!(conveyor = %input.name(), "received metric");
                    match processor.on_receive(metric).await {
                        Ok(metrics) => send(&name, &outputs, metrics),
                        Err(e) => error!(
                            conveyor = %input.name(),
                            "failed to process metric: {e:#}"
                        ),
                    }
                }
            }
        }

        drop(ticker);

        if let Err(e) = processor.close().await {
            error!("failed to close processor: {e:#}");
        }

        debug!("control loop stopped");
    }
}

/// Deliver an independent copy of every metric to every output
///
/// A rejected put is logged and skipped; it never blocks the loop or the
/// remaining outputs.
fn send(processor: &str, outputs: &[Arc<Conveyor>], metrics: Vec<Metric>) {
    for output in outputs {
        for metric in &metrics {
            if let Err(e) = output.put(metric.clone()) {
                warn!(
                    processor = %processor,
                    conveyor = %output.name(),
                    "dropping metric \"{}\": {e}",
                    metric.name
                );
            }
        }
    }
}
