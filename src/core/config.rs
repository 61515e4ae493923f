//! Configuration system: TOML file + env var overrides + defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{DtpError, Result};

/// Full dirtop configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
#[derive(Default)]
pub struct Config {
    pub traversal: TraversalConfig,
    pub ignore: IgnoreConfig,
    pub output: OutputConfig,
}

/// Traversal tuning: gate width and reporting threshold.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TraversalConfig {
    /// Maximum filesystem operations in flight at once.
    pub max_concurrent: usize,
    /// Minimum aggregate size (bytes) for a directory to be reported.
    /// Does not affect the totals propagated to parent directories.
    pub min_size_threshold_bytes: u64,
}

/// Basenames excluded from traversal and size counting.
///
/// Matching is case-insensitive and exact; entries here may be written in
/// any case and are normalized on use.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IgnoreConfig {
    pub files: Vec<String>,
    pub dirs: Vec<String>,
}

/// Output artifact locations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OutputConfig {
    pub report_file: PathBuf,
    pub error_log: PathBuf,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 20,
            min_size_threshold_bytes: 512 * 1024 * 1024,
        }
    }
}

impl Default for IgnoreConfig {
    fn default() -> Self {
        // Windows system entries that inflate totals without being
        // reclaimable or interesting.
        Self {
            files: vec![
                "pagefile.sys".to_string(),
                "hiberfil.sys".to_string(),
                "swapfile.sys".to_string(),
                "dumpstack.log.tmp".to_string(),
                "memory.dmp".to_string(),
            ],
            dirs: vec![
                "perflogs".to_string(),
                "recovery".to_string(),
                "system volume information".to_string(),
                "$recycle.bin".to_string(),
                "program files".to_string(),
                "program files (x86)".to_string(),
            ],
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            report_file: PathBuf::from("results.txt"),
            error_log: PathBuf::from("error.log"),
        }
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        let home_dir = env::var_os("HOME").map_or_else(|| PathBuf::from("/tmp"), PathBuf::from);
        home_dir.join(".config").join("dirtop").join("config.toml")
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from the default
    /// path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| DtpError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(DtpError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_env_overrides_from(|name| env::var(name).ok())
    }

    /// Apply overrides through an injected lookup, keeping tests independent
    /// of process-global env state.
    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        set_env_usize(
            "DIRTOP_MAX_CONCURRENT",
            &mut self.traversal.max_concurrent,
            &mut lookup,
        )?;
        set_env_u64(
            "DIRTOP_MIN_SIZE_THRESHOLD_BYTES",
            &mut self.traversal.min_size_threshold_bytes,
            &mut lookup,
        )?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.traversal.max_concurrent == 0 {
            return Err(DtpError::InvalidConfig {
                details: "traversal.max_concurrent must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

fn set_env_u64<F>(name: &str, slot: &mut u64, lookup: &mut F) -> Result<()>
where
    F: FnMut(&str) -> Option<String>,
{
    if let Some(raw) = lookup(name).filter(|v| !v.is_empty()) {
        *slot = raw.parse::<u64>().map_err(|_| DtpError::InvalidConfig {
            details: format!("{name} must be a non-negative integer, got {raw:?}"),
        })?;
    }
    Ok(())
}

fn set_env_usize<F>(name: &str, slot: &mut usize, lookup: &mut F) -> Result<()>
where
    F: FnMut(&str) -> Option<String>,
{
    if let Some(raw) = lookup(name).filter(|v| !v.is_empty()) {
        *slot = raw.parse::<usize>().map_err(|_| DtpError::InvalidConfig {
            details: format!("{name} must be a non-negative integer, got {raw:?}"),
        })?;
    }
    Ok(())
}
