//! Conveyor - bounded FIFO queue connecting two processors
//!
//! A conveyor is written by exactly one producing runner and read by one
//! consuming runner. Writes never block: a full conveyor rejects the metric
//! so a slow consumer applies backpressure instead of growing memory.
//!
//! ## Disposal
//!
//! The sender half lives behind a lock as an `Option`. Disposing takes it,
//! which closes the channel; every later `put` sees `None` under the same lock
//! and fails with `Disposed`. Metrics already enqueued stay readable until
//! drained, after which `recv` returns `None`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::Stream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace};

use crate::error::ConveyorError;
use crate::metric::Metric;

pub struct Conveyor {
    name: String,
    capacity: usize,
    sender: Mutex<Option<mpsc::Sender<Metric>>>,
    receiver: tokio::sync::Mutex<mpsc::Receiver<Metric>>,
}

impl Conveyor {
    /// Create an open conveyor holding at most `capacity` metrics
    pub fn new(name: impl Into<String>, capacity: usize) -> Result<Self, ConveyorError> {
        let name = name.into();
        if capacity == 0 {
            return Err(ConveyorError::InvalidCapacity { name, capacity });
        }

        let (sender, receiver) = mpsc::channel(capacity);

        Ok(Self {
            name,
            capacity,
            sender: Mutex::new(Some(sender)),
            receiver: tokio::sync::Mutex::new(receiver),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_disposed(&self) -> bool {
        self.sender_slot().is_none()
    }

    /// Enqueue a metric without waiting
    pub fn put(&self, metric: Metric) -> Result<(), ConveyorError> {
        let slot = self.sender_slot();
        let Some(sender) = slot.as_ref() else {
            return Err(ConveyorError::Disposed(self.name.clone()));
        };

        match sender.try_send(metric) {
            Ok(()) => {
                trace!(conveyor = %self.name, "metric enqueued");
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(ConveyorError::Full(self.name.clone())),
            Err(TrySendError::Closed(_)) => Err(ConveyorError::Disposed(self.name.clone())),
        }
    }

    /// Wait for the next metric
    ///
    /// Returns `None` once the conveyor is disposed and drained. Cancel safe:
    /// a metric is only removed when this future completes.
    pub async fn recv(&self) -> Option<Metric> {
        self.receiver.lock().await.recv().await
    }

    /// Take the next metric if one is immediately available
    ///
    /// Returns `None` when the queue is empty or another task is currently
    /// reading.
    pub fn try_recv(&self) -> Option<Metric> {
        let mut receiver = self.receiver.try_lock().ok()?;
        receiver.try_recv().ok()
    }

    /// Close the conveyor for writing. Idempotent.
    pub fn dispose(&self) {
        if self.sender_slot().take().is_some() {
            debug!(conveyor = %self.name, "conveyor disposed");
        }
    }

    /// Stream every metric read from this conveyor, paired with the conveyor
    /// itself so fan-in consumers know where it came from
    pub fn stream(self: Arc<Self>) -> impl Stream<Item = (Arc<Conveyor>, Metric)> + Send + 'static {
        futures::stream::unfold(self, |conveyor| async move {
            let metric = conveyor.recv().await?;
            Some(((Arc::clone(&conveyor), metric), conveyor))
        })
    }

    fn sender_slot(&self) -> MutexGuard<'_, Option<mpsc::Sender<Metric>>> {
        // the guarded section never panics, so a poisoned lock still holds a valid slot
        self.sender.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Conveyor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conveyor")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
