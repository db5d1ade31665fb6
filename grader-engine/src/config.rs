use crate::interp::Limits;

use grader_sandbox::ResourceLimits;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use ubyte::{ByteUnit, ToByteUnit};
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Default, Validate, Serialize, Deserialize)]
pub struct Config {
    #[validate(nested)]
    #[serde(default)]
    pub executor: Executor,

    #[validate(nested)]
    #[serde(default)]
    pub interpreter: Interpreter,
}

#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
#[serde(default)]
pub struct Executor {
    /// Parent of per-call work areas. The system temp dir when absent.
    pub workspace_root: Option<PathBuf>,

    #[validate(range(min = 100, max = 60000))]
    pub compile_timeout: u64, // milliseconds

    #[validate(range(min = 100, max = 60000))]
    pub run_timeout: u64, // milliseconds

    #[validate(nested)]
    pub hard_limit: HardLimit,
}

#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
#[serde(default)]
pub struct HardLimit {
    #[validate(range(min = 1, max = 60))]
    pub cpu_time: u64, // seconds

    #[validate(custom(function = "at_least_one_mebibyte"))]
    pub address_space: ByteUnit,

    #[validate(range(min = 1, max = 1024))]
    pub processes: u64,

    #[validate(custom(function = "at_least_one_mebibyte"))]
    pub file_size: ByteUnit,
}

#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
#[serde(default)]
pub struct Interpreter {
    #[validate(range(min = 1000))]
    pub step_limit: u64,

    #[validate(range(min = 10, max = 60000))]
    pub wall_time: u64, // milliseconds

    #[validate(range(min = 1, max = 1000))]
    pub max_depth: usize,

    #[validate(range(min = 1))]
    pub max_len: usize,

    pub max_output: ByteUnit,

    /// Estimated heap a program may hold at once.
    #[validate(custom(function = "at_least_one_mebibyte"))]
    pub max_memory: ByteUnit,
}

fn at_least_one_mebibyte(size: &ByteUnit) -> Result<(), ValidationError> {
    if *size < 1.mebibytes() {
        return Err(ValidationError::new("at_least_one_mebibyte"));
    }
    Ok(())
}

impl Default for Executor {
    fn default() -> Self {
        Self {
            workspace_root: None,
            compile_timeout: 5000,
            run_timeout: 2000,
            hard_limit: HardLimit::default(),
        }
    }
}

impl Default for HardLimit {
    fn default() -> Self {
        let limits = ResourceLimits::default();
        Self {
            cpu_time: limits.cpu_time,
            address_space: limits.address_space.bytes(),
            processes: limits.processes,
            file_size: limits.file_size.bytes(),
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        let limits = Limits::default();
        Self {
            step_limit: limits.step_limit,
            wall_time: limits.wall_time.as_millis() as u64,
            max_depth: limits.max_depth,
            max_len: limits.max_len,
            max_output: (limits.max_output as u64).bytes(),
            max_memory: (limits.max_memory as u64).bytes(),
        }
    }
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config: path = {}", path.display()))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Config> {
        let config: Config = toml::from_str(content).context("failed to parse config")?;
        config.validate().context("invalid config")?;
        Ok(config)
    }
}

impl HardLimit {
    pub fn to_resource_limits(&self) -> ResourceLimits {
        ResourceLimits {
            cpu_time: self.cpu_time,
            address_space: self.address_space.as_u64(),
            processes: self.processes,
            file_size: self.file_size.as_u64(),
        }
    }
}

impl Interpreter {
    pub fn to_limits(&self) -> Limits {
        Limits {
            step_limit: self.step_limit,
            wall_time: Duration::from_millis(self.wall_time),
            max_depth: self.max_depth,
            max_len: self.max_len,
            max_output: usize::try_from(self.max_output.as_u64()).unwrap_or(usize::MAX),
            max_memory: usize::try_from(self.max_memory.as_u64()).unwrap_or(usize::MAX),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_means_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.executor.compile_timeout, 5000);
        assert_eq!(config.executor.run_timeout, 2000);
        assert_eq!(
            config.executor.hard_limit.to_resource_limits(),
            ResourceLimits::default()
        );
        let limits = config.interpreter.to_limits();
        assert_eq!(limits.step_limit, 10_000_000);
        assert_eq!(limits.wall_time, Duration::from_millis(2000));
        assert_eq!(limits.max_output, 64 * 1024);
        assert_eq!(limits.max_memory, 256 * 1024 * 1024);
    }

    #[test]
    fn sizes_and_overrides() {
        let config = Config::from_toml(
            r#"
            [executor]
            run_timeout = 1000

            [executor.hard_limit]
            address_space = "256 MiB"

            [interpreter]
            step_limit = 5000
            max_output = "1 KiB"
            max_memory = "64 MiB"
            "#,
        )
        .unwrap();
        assert_eq!(config.executor.run_timeout, 1000);
        assert_eq!(config.executor.compile_timeout, 5000);
        assert_eq!(
            config.executor.hard_limit.address_space.as_u64(),
            256 * 1024 * 1024
        );
        assert_eq!(config.executor.hard_limit.processes, 20);
        assert_eq!(config.interpreter.to_limits().step_limit, 5000);
        assert_eq!(config.interpreter.to_limits().max_output, 1024);
        assert_eq!(config.interpreter.to_limits().max_memory, 64 * 1024 * 1024);
    }

    #[test]
    fn out_of_range_is_rejected() {
        assert!(Config::from_toml("[executor]\nrun_timeout = 1").is_err());
        assert!(Config::from_toml("[executor.hard_limit]\naddress_space = \"1 KiB\"").is_err());
        assert!(Config::from_toml("[interpreter]\nmax_depth = 0").is_err());
        assert!(Config::from_toml("[interpreter]\nmax_memory = \"4 KiB\"").is_err());
    }
}
