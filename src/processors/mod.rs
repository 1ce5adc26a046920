//! Processor types shipped with the agent
//!
//! | type     | role                                              |
//! |----------|---------------------------------------------------|
//! | `dummy`  | emits a marker metric on every tick, tags inputs  |
//! | `system` | collects CPU and memory usage                     |
//! | `tagger` | adds static tags                                  |
//! | `filter` | drops metrics by name                             |
//! | `log`    | writes every metric to the log                    |

pub mod dummy;
pub mod filter;
pub mod logger;
pub mod system;
pub mod tagger;

use anyhow::Context;
use serde::de::DeserializeOwned;

use crate::config::ProcessorConfig;
use crate::processor::ProcessorRegistry;

pub fn register_builtins(registry: &mut ProcessorRegistry) {
    registry
        .register(dummy::TYPE_NAME, dummy::DummyFactory)
        .register(system::TYPE_NAME, system::SystemFactory)
        .register(tagger::TYPE_NAME, tagger::TaggerFactory)
        .register(filter::TYPE_NAME, filter::FilterFactory)
        .register(logger::TYPE_NAME, logger::LogFactory);
}

/// Deserialize the `params` object of a processor, defaulting when absent
fn parse_params<T>(params: Option<&serde_json::Value>) -> anyhow::Result<T>
where
    T: DeserializeOwned + Default,
{
    match params {
        None | Some(serde_json::Value::Null) => Ok(T::default()),
        Some(value) => serde_json::from_value(value.clone()).context("malformed params"),
    }
}

fn params_of<T>(config: &ProcessorConfig) -> anyhow::Result<T>
where
    T: DeserializeOwned + Default,
{
    parse_params(config.params.as_ref())
}
