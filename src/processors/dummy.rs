//! Dummy processor, useful to exercise a topology end to end
//!
//! On every tick it emits `dummy{dummy=cron} dummy="cron"`; every received
//! metric is tagged `dummy=received` and forwarded unchanged otherwise.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::config::ProcessorConfig;
use crate::metric::Metric;
use crate::processor::{Processor, ProcessorFactory};

use super::{params_of, parse_params};

pub const TYPE_NAME: &str = "dummy";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DummyParams {
    pub prop_value: String,
}

#[derive(Debug)]
pub struct Dummy {
    name: String,
    params: DummyParams,
    received: usize,
    sent: usize,
}

impl Dummy {
    pub fn new(name: impl Into<String>, params: DummyParams) -> Self {
        Self {
            name: name.into(),
            params,
            received: 0,
            sent: 0,
        }
    }
}

#[async_trait]
impl Processor for Dummy {
    async fn setup(&mut self) -> Result<()> {
        debug!(processor = %self.name, prop_value = %self.params.prop_value, "dummy set up");
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        debug!(
            processor = %self.name,
            received = self.received,
            sent = self.sent,
            "dummy closed"
        );
        Ok(())
    }

    async fn on_receive(&mut self, mut metric: Metric) -> Result<Vec<Metric>> {
        self.received += 1;
        metric.set_tag("dummy", "received");
        self.sent += 1;
        Ok(vec![metric])
    }

    async fn on_timer(&mut self) -> Result<Vec<Metric>> {
        self.sent += 1;
        Ok(vec![
            Metric::new("dummy")
                .with_tag("dummy", "cron")
                .with_field("dummy", "cron"),
        ])
    }
}

pub struct DummyFactory;

impl ProcessorFactory for DummyFactory {
    fn create(&self, config: &ProcessorConfig) -> Result<Box<dyn Processor>> {
        Ok(Box::new(Dummy::new(&config.name, params_of(config)?)))
    }

    fn validate_params(&self, params: &serde_json::Value) -> Result<()> {
        parse_params::<DummyParams>(Some(params)).map(|_| ())
    }
}
