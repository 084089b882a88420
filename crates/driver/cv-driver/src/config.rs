//! Driver configuration
//!
//! Loaded from a TOML file; every key is optional.
//!
//! ```toml
//! [emit]
//! workers = 4
//! output = "out/app.tables"
//!
//! [lowering]
//! name_prefix = "<>d__"
//! ```

use anyhow::{Context, Result};
use cv_iterator_lower::LoweringOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::num::NonZero;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::thread;

/// Driver configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Emission settings
    pub emit: EmitConfig,
    /// Lowering settings
    pub lowering: LoweringConfig,
}

/// Emission settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitConfig {
    /// Worker threads for lowering and indexing
    pub workers: usize,
    /// Where to write the encoded tables image; nothing is written when unset
    pub output: Option<PathBuf>,
}

impl Default for EmitConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            output: None,
        }
    }
}

fn default_workers() -> usize {
    thread::available_parallelism().map_or(1, NonZero::get)
}

/// Lowering settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoweringConfig {
    /// Prefix of generated state machine type names
    pub name_prefix: String,
}

impl Default for LoweringConfig {
    fn default() -> Self {
        Self {
            name_prefix: LoweringOptions::default().name_prefix,
        }
    }
}

impl DriverConfig {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        contents
            .parse()
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Worker count, never zero
    #[must_use]
    pub fn workers(&self) -> usize {
        self.emit.workers.max(1)
    }

    /// Options handed to the iterator lowering
    #[must_use]
    pub fn lowering_options(&self) -> LoweringOptions {
        LoweringOptions {
            name_prefix: self.lowering.name_prefix.clone(),
        }
    }
}

impl FromStr for DriverConfig {
    type Err = toml::de::Error;

    fn from_str(contents: &str) -> Result<Self, Self::Err> {
        toml::from_str(contents)
    }
}
