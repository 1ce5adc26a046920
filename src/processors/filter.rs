//! Drops metrics by name
//!
//! A metric passes when its name matches `include` (if set) and does not
//! match `exclude` (if set).

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tracing::trace;

use crate::config::ProcessorConfig;
use crate::metric::Metric;
use crate::processor::{Processor, ProcessorFactory};

use super::{params_of, parse_params};

pub const TYPE_NAME: &str = "filter";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterParams {
    pub include: Option<String>,
    pub exclude: Option<String>,
}

#[derive(Debug)]
pub struct Filter {
    include: Option<Regex>,
    exclude: Option<Regex>,
}

impl Filter {
    pub fn new(params: &FilterParams) -> Result<Self> {
        Ok(Self {
            include: compile(params.include.as_deref()).context("invalid include pattern")?,
            exclude: compile(params.exclude.as_deref()).context("invalid exclude pattern")?,
        })
    }

    pub fn accepts(&self, metric: &Metric) -> bool {
        self.include
            .as_ref()
            .is_none_or(|include| include.is_match(&metric.name))
            && !self
                .exclude
                .as_ref()
                .is_some_and(|exclude| exclude.is_match(&metric.name))
    }
}

fn compile(pattern: Option<&str>) -> Result<Option<Regex>, regex::Error> {
    pattern.map(Regex::new).transpose()
}

#[async_trait]
impl Processor for Filter {
    async fn on_receive(&mut self, metric: Metric) -> Result<Vec<Metric>> {
        if self.accepts(&metric) {
            Ok(vec![metric])
        } else {
            trace!("filtered out metric \"{}\"", metric.name);
            Ok(vec![])
        }
    }

    async fn on_timer(&mut self) -> Result<Vec<Metric>> {
        Ok(vec![])
    }
}

pub struct FilterFactory;

impl ProcessorFactory for FilterFactory {
    fn create(&self, config: &ProcessorConfig) -> Result<Box<dyn Processor>> {
        let params: FilterParams = params_of(config)?;
        Ok(Box::new(Filter::new(&params)?))
    }

    fn validate_params(&self, params: &serde_json::Value) -> Result<()> {
        let params: FilterParams = parse_params(Some(params))?;
        Filter::new(&params).map(|_| ())
    }
}
