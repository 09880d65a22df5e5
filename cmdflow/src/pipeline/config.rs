//! Pipeline configuration.

use crate::errors::PipelineError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default capacity of each inter-stage pipe, in bytes.
pub const DEFAULT_PIPE_CAPACITY: usize = 64 * 1024;

/// Where the first stage reads its standard input from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    /// Inherit the host process's stdin.
    Inherit,
    /// Connect stdin to the null device.
    #[default]
    Null,
    /// Feed the given bytes, then close stdin.
    Bytes(Vec<u8>),
}

/// Where the last stage writes its standard output to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Inherit the host process's stdout.
    #[default]
    Inherit,
    /// Discard output.
    Null,
    /// Collect output into [`crate::core::PipelineOutput::stdout`].
    Capture,
}

/// Configuration for a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Name used in spans and events.
    pub name: String,
    /// Capacity of each inter-stage pipe in bytes.
    pub pipe_capacity: usize,
    /// Deadline applied by `Pipeline::run`, in milliseconds.
    pub deadline_ms: Option<u64>,
    /// Treat SIGPIPE termination of a non-last stage as success.
    pub tolerate_broken_pipe: bool,
    /// Source of the first stage's stdin.
    pub stdin: InputMode,
    /// Destination of the last stage's stdout.
    pub stdout: OutputMode,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: "pipeline".to_string(),
            pipe_capacity: DEFAULT_PIPE_CAPACITY,
            deadline_ms: None,
            tolerate_broken_pipe: true,
            stdin: InputMode::default(),
            stdout: OutputMode::default(),
        }
    }
}

impl PipelineConfig {
    /// Creates a new config with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a config from JSON. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the JSON is malformed or fails validation.
    pub fn from_json(json: &str) -> Result<Self, PipelineError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the pipeline name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the pipe capacity.
    #[must_use]
    pub fn with_pipe_capacity(mut self, capacity: usize) -> Self {
        self.pipe_capacity = capacity;
        self
    }

    /// Sets the default deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline_ms = Some(u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Sets whether SIGPIPE termination is tolerated.
    #[must_use]
    pub fn with_tolerate_broken_pipe(mut self, tolerate: bool) -> Self {
        self.tolerate_broken_pipe = tolerate;
        self
    }

    /// Sets the first stage's stdin source.
    #[must_use]
    pub fn with_stdin(mut self, stdin: InputMode) -> Self {
        self.stdin = stdin;
        self
    }

    /// Sets the last stage's stdout destination.
    #[must_use]
    pub fn with_stdout(mut self, stdout: OutputMode) -> Self {
        self.stdout = stdout;
        self
    }

    /// Returns the configured deadline, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for a zero pipe capacity.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.pipe_capacity == 0 {
            return Err(PipelineError::InvalidConfig(
                "pipe_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::new();
        assert_eq!(config.pipe_capacity, DEFAULT_PIPE_CAPACITY);
        assert_eq!(config.stdin, InputMode::Null);
        assert_eq!(config.stdout, OutputMode::Inherit);
        assert!(config.deadline().is_none());
        assert!(config.tolerate_broken_pipe);
    }

    #[test]
    fn test_builders() {
        let config = PipelineConfig::new()
            .with_name("sorter")
            .with_deadline(Duration::from_millis(1500))
            .with_stdout(OutputMode::Capture)
            .with_stdin(InputMode::Bytes(b"b\na\n".to_vec()));

        assert_eq!(config.name, "sorter");
        assert_eq!(config.deadline(), Some(Duration::from_millis(1500)));
        assert_eq!(config.stdout, OutputMode::Capture);
    }

    #[test]
    fn test_from_json_partial() {
        let config =
            PipelineConfig::from_json(r#"{"name": "etl", "deadline_ms": 250, "stdout": "capture"}"#)
                .unwrap();

        assert_eq!(
            config,
            PipelineConfig::new()
                .with_name("etl")
                .with_deadline(Duration::from_millis(250))
                .with_stdout(OutputMode::Capture)
        );
    }

    #[test]
    fn test_from_json_rejects_zero_capacity() {
        let err = PipelineConfig::from_json(r#"{"pipe_capacity": 0}"#).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        let err = PipelineConfig::from_json("not json").unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }
}
