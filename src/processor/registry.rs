//! Processor registry - maps type names to factories
//!
//! The registry is populated once at process start and handed to the
//! engine, which uses it to validate configuration and to construct a
//! processor for every configured runner.
//!
//! ```ignore
//! let mut registry = ProcessorRegistry::new();
//! registry.register_fn("passthrough", |_config| Ok(Box::new(Passthrough)));
//! let processor = registry.create(&ProcessorConfig::new("p", "passthrough"))?;
//! ```

use std::collections::HashMap;

use anyhow::Result;
use tracing::debug;

use crate::config::ProcessorConfig;
use crate::error::TopologyError;
use crate::processors;

use super::Processor;

/// Creates processors of one type
pub trait ProcessorFactory: Send + Sync {
    /// Build a processor from a configuration already validated by
    /// [`ProcessorFactory::validate_params`]
    fn create(&self, config: &ProcessorConfig) -> Result<Box<dyn Processor>>;

    /// Check the type-specific `params` of a configuration
    fn validate_params(&self, _params: &serde_json::Value) -> Result<()> {
        Ok(())
    }
}

/// Adapter registering a plain constructor function
struct FnFactory<F>(F);

impl<F> ProcessorFactory for FnFactory<F>
where
    F: Fn(&ProcessorConfig) -> Result<Box<dyn Processor>> + Send + Sync,
{
    fn create(&self, config: &ProcessorConfig) -> Result<Box<dyn Processor>> {
        (self.0)(config)
    }
}

#[derive(Default)]
pub struct ProcessorRegistry {
    factories: HashMap<String, Box<dyn ProcessorFactory>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every processor type shipped with the crate
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        processors::register_builtins(&mut registry);
        registry
    }

    /// Register a factory, replacing any previous one for the same type
    pub fn register<F>(&mut self, type_name: impl Into<String>, factory: F) -> &mut Self
    where
        F: ProcessorFactory + 'static,
    {
        let type_name = type_name.into();
        if self
            .factories
            .insert(type_name.clone(), Box::new(factory))
            .is_some()
        {
            debug!("replaced factory for processor type \"{type_name}\"");
        }
        self
    }

    /// Register a constructor closure
    pub fn register_fn<F>(&mut self, type_name: impl Into<String>, constructor: F) -> &mut Self
    where
        F: Fn(&ProcessorConfig) -> Result<Box<dyn Processor>> + Send + Sync + 'static,
    {
        self.register(type_name, FnFactory(constructor))
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// Registered type names, sorted
    pub fn available_types(&self) -> Vec<&str> {
        let mut types: Vec<_> = self.factories.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Validate `params` with the factory registered for `type_name`
    pub fn validate_params(&self, type_name: &str, params: &serde_json::Value) -> Result<()> {
        match self.factories.get(type_name) {
            Some(factory) => factory.validate_params(params),
            None => anyhow::bail!("unknown processor type \"{type_name}\""),
        }
    }

    /// Construct a processor for `config` using the factory of its type
    pub fn create(&self, config: &ProcessorConfig) -> Result<Box<dyn Processor>, TopologyError> {
        let factory = self
            .factories
            .get(&config.kind)
            .ok_or_else(|| TopologyError::UnknownType {
                kind: config.kind.clone(),
                available: self.available_types().join(", "),
            })?;

        factory
            .create(config)
            .map_err(|source| TopologyError::Construction {
                processor: config.name.clone(),
                source,
            })
    }
}
