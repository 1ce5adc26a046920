//! Helper functions for integration tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use metraflow::processors::dummy::{Dummy, DummyParams};
use metraflow::{Conveyor, Metric, Processor, ProcessorConfig, ProcessorRegistry, ProcessorRunner};
use tokio::sync::{Notify, Semaphore};

/// Wraps a processor and counts handler invocations
pub struct Counting<P> {
    inner: P,
    pub received: Arc<AtomicUsize>,
}

impl<P> Counting<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            received: Arc::default(),
        }
    }
}

#[async_trait]
impl<P: Processor> Processor for Counting<P> {
    async fn setup(&mut self) -> Result<()> {
        self.inner.setup().await
    }

    async fn close(&mut self) -> Result<()> {
        self.inner.close().await
    }

    async fn on_receive(&mut self, metric: Metric) -> Result<Vec<Metric>> {
        self.received.fetch_add(1, Ordering::SeqCst);
        self.inner.on_receive(metric).await
    }

    async fn on_timer(&mut self) -> Result<Vec<Metric>> {
        self.inner.on_timer().await
    }
}

/// A dummy runner without schedule, plus its receive counter
pub fn counting_dummy_runner(name: &str) -> (ProcessorRunner, Arc<AtomicUsize>) {
    let processor = Counting::new(Dummy::new(name, DummyParams::default()));
    let received = Arc::clone(&processor.received);
    let runner =
        ProcessorRunner::with_processor(ProcessorConfig::new(name, "dummy"), None, Box::new(processor));
    (runner, received)
}

/// Handler that announces each metric and then waits for a permit before
/// returning it
pub struct Gated {
    pub received: Arc<AtomicUsize>,
    pub entered: Arc<Notify>,
    pub permits: Arc<Semaphore>,
}

impl Gated {
    pub fn new() -> Self {
        Self {
            received: Arc::default(),
            entered: Arc::new(Notify::new()),
            permits: Arc::new(Semaphore::new(0)),
        }
    }
}

#[async_trait]
impl Processor for Gated {
    async fn on_receive(&mut self, metric: Metric) -> Result<Vec<Metric>> {
        self.received.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        self.permits.acquire().await?.forget();
        Ok(vec![metric])
    }

    async fn on_timer(&mut self) -> Result<Vec<Metric>> {
        Ok(vec![])
    }
}

/// Sink storing every received metric
pub struct Capture {
    metrics: Arc<Mutex<Vec<Metric>>>,
}

#[async_trait]
impl Processor for Capture {
    async fn on_receive(&mut self, metric: Metric) -> Result<Vec<Metric>> {
        self.metrics.lock().unwrap().push(metric);
        Ok(vec![])
    }

    async fn on_timer(&mut self) -> Result<Vec<Metric>> {
        Ok(vec![])
    }
}

/// Built-in registry extended with a `capture` type sharing one buffer
pub fn registry_with_capture() -> (ProcessorRegistry, Arc<Mutex<Vec<Metric>>>) {
    let captured = Arc::new(Mutex::new(vec![]));
    let mut registry = ProcessorRegistry::with_builtins();

    let metrics = Arc::clone(&captured);
    registry.register_fn("capture", move |_| {
        Ok(Box::new(Capture {
            metrics: Arc::clone(&metrics),
        }))
    });

    (registry, captured)
}

pub fn conveyor(name: &str, capacity: usize) -> Arc<Conveyor> {
    Arc::new(Conveyor::new(name, capacity).unwrap())
}

/// Read everything currently queued in a conveyor
pub fn drain(conveyor: &Conveyor) -> Vec<Metric> {
    std::iter::from_fn(|| conveyor.try_recv()).collect()
}

/// Poll `condition` until it holds, panicking after a generous timeout
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
