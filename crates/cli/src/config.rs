//! Configuration loading from preflight.toml.

use capability::{ScriptedProvider, ScriptedStatus};
use runtime::{CapabilityCondition, Condition, EngineConfig, Negated, Silent};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Engine settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// The operation to gate.
    #[serde(default)]
    pub operation: OperationConfig,

    /// Scripted capabilities the operation requires.
    #[serde(default, rename = "capability")]
    pub capabilities: Vec<CapabilityConfig>,
}

/// The gated operation.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct OperationConfig {
    pub name: String,

    /// How long the work takes once it starts.
    pub work_ms: u64,

    /// Deadline for this operation, on top of `engine.timeout_ms`.
    pub timeout_ms: Option<u64>,

    /// Refuse to run if any authorization dependency was cancelled.
    pub require_no_cancelled_dependencies: bool,
}

impl Default for OperationConfig {
    fn default() -> Self {
        Self {
            name: default_operation_name(),
            work_ms: 0,
            timeout_ms: None,
            require_no_cancelled_dependencies: false,
        }
    }
}

fn default_operation_name() -> String {
    "operation".to_string()
}

/// One scripted capability and the condition built on it.
#[derive(Debug, Deserialize)]
pub struct CapabilityConfig {
    pub name: String,

    /// Status reported before any authorization.
    pub status: ScriptedStatus,

    /// Status an authorization request resolves to.
    #[serde(default = "default_authorize")]
    pub authorize: ScriptedStatus,

    /// Simulated prompt latency.
    #[serde(default)]
    pub latency_ms: u64,

    /// Request authorization if the status is undetermined.
    #[serde(default = "default_request")]
    pub request: bool,

    /// Require the capability to be missing instead.
    #[serde(default)]
    pub negate: bool,

    /// Check without ever prompting.
    #[serde(default)]
    pub silent: bool,
}

fn default_authorize() -> ScriptedStatus {
    ScriptedStatus::Authorized
}

fn default_request() -> bool {
    true
}

impl CapabilityConfig {
    pub fn provider(&self) -> ScriptedProvider {
        ScriptedProvider::new(&self.name, self.status)
            .authorizes_to(self.authorize)
            .with_prompt_latency(Duration::from_millis(self.latency_ms))
    }

    /// Build the condition for `provider`, applying `silent` then `negate`.
    ///
    /// With `allow_request` unset the condition only checks, whatever
    /// `request` says.
    pub fn condition(
        &self,
        provider: Arc<ScriptedProvider>,
        allow_request: bool,
    ) -> Arc<dyn Condition> {
        let base = CapabilityCondition::with_request(provider, self.request && allow_request);
        match (self.silent, self.negate) {
            (false, false) => Arc::new(base),
            (true, false) => Arc::new(Silent::new(base)),
            (false, true) => Arc::new(Negated::new(base)),
            (true, true) => Arc::new(Negated::new(Silent::new(base))),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        if self.operation.name.trim().is_empty() {
            return Err(ConfigError::EmptyName("operation"));
        }
        if self.operation.timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "operation.timeout_ms must be greater than zero".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for capability in &self.capabilities {
            if capability.name.trim().is_empty() {
                return Err(ConfigError::EmptyName("capability"));
            }
            if !seen.insert(capability.name.as_str()) {
                return Err(ConfigError::DuplicateCapability(capability.name.clone()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("{0} name must not be empty")]
    EmptyName(&'static str),

    #[error("capability '{0}' is declared more than once")]
    DuplicateCapability(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}
