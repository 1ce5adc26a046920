use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{ConfigError, ValidationError};
use crate::processor::registry::ProcessorRegistry;
use crate::schedule::Schedule;

/// Top-level pipeline document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub processors: Vec<ProcessorConfig>,

    #[serde(default)]
    pub conveyors: Vec<ConveyorConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessorConfig {
    pub name: String,

    #[serde(rename = "type")]
    pub kind: String,

    /// Optional timer schedule, see [`crate::schedule`]
    #[serde(rename = "cronSpec", default, skip_serializing_if = "Option::is_none")]
    pub cron_spec: Option<String>,

    /// Type-specific parameters, interpreted by the processor's factory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

/// A connection between two processors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConveyorConfig {
    pub name: String,
    pub size: usize,

    /// Name of the processor writing into the conveyor
    pub input: String,

    /// Name of the processor reading from the conveyor
    pub output: String,
}

impl ProcessorConfig {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            cron_spec: None,
            params: None,
        }
    }

    pub fn with_cron(mut self, spec: impl Into<String>) -> Self {
        self.cron_spec = Some(spec.into());
        self
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = Some(params);
        self
    }

    /// Validate the fields shared by every processor type
    pub fn validate(&self, index: usize, registry: &ProcessorRegistry) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::BlankProcessorName { index });
        }

        if self.kind.trim().is_empty() {
            return Err(ValidationError::BlankType {
                processor: self.name.clone(),
            });
        }

        if !registry.contains(&self.kind) {
            return Err(ValidationError::UnknownType {
                processor: self.name.clone(),
                kind: self.kind.clone(),
            });
        }

        Schedule::parse_optional(self.cron_spec.as_deref()).map_err(|source| {
            ValidationError::InvalidCron {
                processor: self.name.clone(),
                source,
            }
        })?;

        if let Some(params) = &self.params {
            registry
                .validate_params(&self.kind, params)
                .map_err(|source| ValidationError::InvalidParams {
                    processor: self.name.clone(),
                    source,
                })?;
        }

        Ok(())
    }
}

impl ConveyorConfig {
    pub fn new(
        name: impl Into<String>,
        size: usize,
        input: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            size,
            input: input.into(),
            output: output.into(),
        }
    }

    pub fn validate(&self, index: usize) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::BlankConveyorName { index });
        }

        if self.size == 0 {
            return Err(ValidationError::ZeroSize {
                conveyor: self.name.clone(),
            });
        }

        for (side, endpoint) in [("input", &self.input), ("output", &self.output)] {
            if endpoint.trim().is_empty() {
                return Err(ValidationError::BlankEndpoint {
                    conveyor: self.name.clone(),
                    side,
                });
            }
        }

        Ok(())
    }
}

impl PipelineConfig {
    /// Validate every processor, then every conveyor, stopping at the first
    /// invalid element
    pub fn validate(&self, registry: &ProcessorRegistry) -> Result<(), ValidationError> {
        let mut seen = HashSet::new();
        for (index, processor) in self.processors.iter().enumerate() {
            processor.validate(index, registry)?;
            if !seen.insert(processor.name.as_str()) {
                return Err(ValidationError::DuplicateProcessor(processor.name.clone()));
            }
        }

        let mut seen = HashSet::new();
        for (index, conveyor) in self.conveyors.iter().enumerate() {
            conveyor.validate(index)?;
            if !seen.insert(conveyor.name.as_str()) {
                return Err(ValidationError::DuplicateConveyor(conveyor.name.clone()));
            }
        }

        Ok(())
    }
}

/// Where the engine loads its configuration from on every (re)load
pub trait ConfigSource: Send + Sync {
    fn load(&mut self) -> Result<PipelineConfig, ConfigError>;
}

/// Always yields the same in-memory configuration
impl ConfigSource for PipelineConfig {
    fn load(&mut self) -> Result<PipelineConfig, ConfigError> {
        Ok(self.clone())
    }
}

/// Reads a JSON document from disk on every load
#[derive(Debug, Clone)]
pub struct FileConfigSource {
    path: PathBuf,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigSource for FileConfigSource {
    fn load(&mut self) -> Result<PipelineConfig, ConfigError> {
        read_config_file(&self.path)
    }
}

pub fn read_config_file(path: &Path) -> Result<PipelineConfig, ConfigError> {
    let file_content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&file_content)
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
        .inspect(|config| trace!("loaded config: {config:?}"))
}
