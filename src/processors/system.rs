//! System resource collector
//!
//! Emits one `system` metric per tick:
//!
//! | field            | unit    |
//! |------------------|---------|
//! | `cpu_count`      |         |
//! | `cpu_usage`      | percent |
//! | `memory_total`   | bytes   |
//! | `memory_used`    | bytes   |
//! | `swap_total`     | bytes   |
//! | `swap_used`      | bytes   |

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use sysinfo::System;
use tracing::trace;

use crate::config::ProcessorConfig;
use crate::metric::Metric;
use crate::processor::{Processor, ProcessorFactory};

use super::{params_of, parse_params};

pub const TYPE_NAME: &str = "system";

pub const METRIC_NAME: &str = "system";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SystemParams {
    /// Tag every metric with `host=<hostname>`
    pub host_tag: bool,
}

impl Default for SystemParams {
    fn default() -> Self {
        Self { host_tag: true }
    }
}

pub struct SystemCollector {
    params: SystemParams,
    sys: System,
    host_name: Option<String>,
}

impl SystemCollector {
    pub fn new(params: SystemParams) -> Self {
        Self {
            params,
            sys: System::new(),
            host_name: None,
        }
    }

    fn collect(&mut self) -> Metric {
        self.sys.refresh_cpu_usage();
        self.sys.refresh_memory();

        let cpus = self.sys.cpus();
        let average_usage = if cpus.is_empty() {
            0.0
        } else {
            cpus.iter().map(|cpu| cpu.cpu_usage()).sum::<f32>() / cpus.len() as f32
        };

        let mut metric = Metric::new(METRIC_NAME)
            .with_field("cpu_count", cpus.len())
            .with_field("cpu_usage", average_usage)
            .with_field("memory_total", self.sys.total_memory())
            .with_field("memory_used", self.sys.used_memory())
            .with_field("swap_total", self.sys.total_swap())
            .with_field("swap_used", self.sys.used_swap());

        if self.params.host_tag
            && let Some(host_name) = &self.host_name
        {
            metric.set_tag("host", host_name.as_str());
        }

        metric
    }
}

#[async_trait]
impl Processor for SystemCollector {
    async fn setup(&mut self) -> Result<()> {
        // prime the CPU counters, usage is computed between two refreshes
        self.sys.refresh_cpu_usage();
        self.host_name = System::host_name();
        Ok(())
    }

    async fn on_receive(&mut self, metric: Metric) -> Result<Vec<Metric>> {
        Ok(vec![metric])
    }

    async fn on_timer(&mut self) -> Result<Vec<Metric>> {
        let metric = self.collect();
        trace!("collected system metric: {metric:?}");
        Ok(vec![metric])
    }
}

pub struct SystemFactory;

impl ProcessorFactory for SystemFactory {
    fn create(&self, config: &ProcessorConfig) -> Result<Box<dyn Processor>> {
        Ok(Box::new(SystemCollector::new(params_of(config)?)))
    }

    fn validate_params(&self, params: &serde_json::Value) -> Result<()> {
        parse_params::<SystemParams>(Some(params)).map(|_| ())
    }
}
