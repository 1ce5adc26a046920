//! Adds a fixed set of tags to every received metric

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

use crate::config::ProcessorConfig;
use crate::metric::Metric;
use crate::processor::{Processor, ProcessorFactory};

use super::{params_of, parse_params};

pub const TYPE_NAME: &str = "tagger";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaggerParams {
    pub tags: BTreeMap<String, String>,

    /// Replace the value of tags the metric already carries
    pub overwrite: bool,
}

#[derive(Debug)]
pub struct Tagger {
    params: TaggerParams,
}

impl Tagger {
    pub fn new(params: TaggerParams) -> Self {
        Self { params }
    }
}

#[async_trait]
impl Processor for Tagger {
    async fn on_receive(&mut self, mut metric: Metric) -> Result<Vec<Metric>> {
        for (key, value) in &self.params.tags {
            if self.params.overwrite {
                metric.set_tag(key.as_str(), value.as_str());
            } else {
                // an existing tag wins
                let _ = metric.add_tag(key.as_str(), value.as_str());
            }
        }
        Ok(vec![metric])
    }

    async fn on_timer(&mut self) -> Result<Vec<Metric>> {
        Ok(vec![])
    }
}

pub struct TaggerFactory;

impl ProcessorFactory for TaggerFactory {
    fn create(&self, config: &ProcessorConfig) -> Result<Box<dyn Processor>> {
        Ok(Box::new(Tagger::new(params_of(config)?)))
    }

    fn validate_params(&self, params: &serde_json::Value) -> Result<()> {
        parse_params::<TaggerParams>(Some(params)).map(|_| ())
    }
}
