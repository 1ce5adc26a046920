//! Sink writing every received metric to the log as JSON

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::config::ProcessorConfig;
use crate::metric::Metric;
use crate::processor::{Processor, ProcessorFactory};

pub const TYPE_NAME: &str = "log";

#[derive(Debug)]
pub struct LogSink {
    name: String,
}

impl LogSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Processor for LogSink {
    async fn on_receive(&mut self, metric: Metric) -> Result<Vec<Metric>> {
        let line = serde_json::to_string(&metric)?;
        info!(processor = %self.name, "{line}");
        Ok(vec![])
    }

    async fn on_timer(&mut self) -> Result<Vec<Metric>> {
        Ok(vec![])
    }
}

pub struct LogFactory;

impl ProcessorFactory for LogFactory {
    fn create(&self, config: &ProcessorConfig) -> Result<Box<dyn Processor>> {
        Ok(Box::new(LogSink::new(&config.name)))
    }
}
